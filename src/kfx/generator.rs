//! The kfxgen generator-information block.
//!
//! Between the container-info value and the entity data, containers carry a
//! small JSON-like array of `{key, value}` records describing the tool that
//! produced them. Producers write it with bare `key:`/`value:` names and
//! sometimes stray escape bytes, so parsing first normalizes it into JSON.

use serde::{Deserialize, Serialize};

use crate::diagnostics::{DiagnosticKind, Diagnostics};

const APPLICATION_VERSION_KEYS: [&str; 2] = ["appVersion", "kfxgen_application_version"];
const PACKAGE_VERSION_KEYS: [&str; 2] = ["buildVersion", "kfxgen_package_version"];
const PAYLOAD_SHA1_KEY: &str = "kfxgen_payload_sha1";
const ACR_KEY: &str = "kfxgen_acr";

/// What the generator block says about its producer and payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratorInfo {
    pub application_version: String,
    pub package_version: String,
    /// Lowercase hex SHA-1 of the entity data, if recorded.
    pub payload_sha1: Option<String>,
    /// Container id echoed by the producer, if recorded.
    pub acr: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Entry {
    key: String,
    value: serde_json::Value,
}

impl GeneratorInfo {
    /// Parse a generator block. Unknown or malformed content is reported and
    /// skipped; it never fails the decode.
    pub fn parse(data: &[u8], diag: &mut Diagnostics) -> Self {
        let mut info = GeneratorInfo::default();
        if data.is_empty() {
            return info;
        }

        let text = String::from_utf8_lossy(data);
        let json = normalize(&text);
        let entries: Vec<Entry> = match serde_json::from_str(&json) {
            Ok(entries) => entries,
            Err(e) => {
                diag.error(
                    DiagnosticKind::SchemaViolation,
                    format!("kfxgen info is not valid: {e}: {text}"),
                );
                return info;
            }
        };

        for Entry { key, value } in entries {
            let value = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            let key = key.as_str();
            if APPLICATION_VERSION_KEYS.contains(&key) {
                info.application_version = value;
            } else if PACKAGE_VERSION_KEYS.contains(&key) {
                info.package_version = value;
            } else if key == PAYLOAD_SHA1_KEY {
                info.payload_sha1 = Some(value);
            } else if key == ACR_KEY {
                info.acr = Some(value);
            } else {
                diag.error(
                    DiagnosticKind::SchemaViolation,
                    format!("kfxgen_info has unknown key: {key}={value}"),
                );
            }
        }
        info
    }

    /// Render the block the way kfxgen writes it: compact JSON with the
    /// `key` and `value` names left unquoted.
    pub fn render(&self, payload_sha1: &str, container_id: &str) -> String {
        let entries = [
            ("kfxgen_package_version", self.package_version.as_str()),
            ("kfxgen_application_version", self.application_version.as_str()),
            (PAYLOAD_SHA1_KEY, payload_sha1),
            (ACR_KEY, container_id),
        ]
        .map(|(key, value)| Entry {
            key: key.to_string(),
            value: serde_json::Value::String(value.to_string()),
        });

        // Serializing strings and plain structs cannot fail.
        serde_json::to_string(&entries)
            .unwrap_or_default()
            .replace("\"key\":", "key:")
            .replace("\"value\":", "value:")
    }
}

/// Rewrite the block as strict JSON: drop ESC bytes and quote every bare
/// name or value.
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 32);
    let mut chars = text.chars().filter(|&c| c != '\u{1b}').peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                out.push(c);
                let mut escaped = false;
                for c in chars.by_ref() {
                    out.push(c);
                    if escaped {
                        escaped = false;
                    } else if c == '\\' {
                        escaped = true;
                    } else if c == '"' {
                        break;
                    }
                }
            }
            '[' | ']' | '{' | '}' | ',' | ':' => out.push(c),
            c if c.is_whitespace() => out.push(c),
            c => {
                let mut token = String::from(c);
                while let Some(&next) = chars.peek() {
                    if matches!(next, ',' | ':' | '{' | '}' | '[' | ']' | '"') {
                        break;
                    }
                    token.push(next);
                    chars.next();
                }
                let token = token.trim_end();
                out.push_str(&serde_json::Value::String(token.to_string()).to_string());
            }
        }
    }
    out
}
