use std::collections::BTreeMap;
use std::fs;
use std::process::ExitCode;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use clap::Parser;
use kfx_codec::kfx::ion::{self, GZIP_MAGIC, ION_MAGIC};
use kfx_codec::{
    Decoded, DecodeOptions, Diagnostics, EncodeOptions, Result, SymbolTable, Value, decode_with,
    encode_with,
};
use tracing_subscriber::EnvFilter;

/// Dump KFX/Ion files for debugging
#[derive(Parser, Debug)]
#[command(name = "kfx-dump")]
#[command(
    about = "Dumps KFX container files (.kfx) and raw Ion binary files (.ion) as JSON"
)]
struct Args {
    /// File to dump
    file: String,

    /// Show statistics (fragment counts by type)
    #[arg(short, long)]
    stat: bool,

    /// Re-encode the decoded fragments and compare with the input
    #[arg(short, long)]
    roundtrip: bool,

    /// Keep root fragment ids as stored
    #[arg(short, long)]
    pure: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {e}", args.file);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let data = fs::read(&args.file)?;

    if data.starts_with(&ION_MAGIC) || data.starts_with(&GZIP_MAGIC) {
        eprintln!("Detected raw Ion binary format");
        let mut diag = Diagnostics::new();
        let mut symtab = SymbolTable::for_kfx(&mut diag);
        let values = ion::decode_stream(&data, &mut symtab, &mut diag)?;
        print_diagnostics(&diag);
        let json: Vec<_> = values.iter().map(to_json).collect();
        println!("{}", pretty(&serde_json::Value::Array(json)));
        return Ok(());
    }

    let options = DecodeOptions::new().with_pure(args.pure);
    let decoded = decode_with(&data, &options)?;
    print_diagnostics(&decoded.diagnostics);

    if args.stat {
        print_stats(&decoded, data.len());
    } else if !args.roundtrip {
        let json: Vec<_> = decoded
            .fragments
            .iter()
            .map(|f| {
                serde_json::json!({
                    "type": f.ftype.as_str(),
                    "id": f.fid.as_ref().map(|s| s.as_str()),
                    "value": to_json(&f.value),
                })
            })
            .collect();
        println!("{}", pretty(&serde_json::Value::Array(json)));
    }

    if args.roundtrip {
        let encoded = encode_with(&decoded.fragments, &EncodeOptions::default())?;
        print_diagnostics(&encoded.diagnostics);
        match first_difference(&data, &encoded.bytes) {
            None => println!("roundtrip: identical ({} bytes)", data.len()),
            Some(offset) => println!(
                "roundtrip: differs at offset {offset} (input {} bytes, output {} bytes)",
                data.len(),
                encoded.bytes.len()
            ),
        }
    }
    Ok(())
}

fn print_diagnostics(diag: &Diagnostics) {
    for d in diag.iter() {
        eprintln!("{d}");
    }
}

fn print_stats(decoded: &Decoded, container_size: usize) {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for fragment in &decoded.fragments {
        *counts.entry(fragment.ftype.as_str()).or_insert(0) += 1;
    }

    let mut sorted: Vec<_> = counts.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    println!("{} {} ({})", decoded.format, decoded.container_id, format_size(container_size));
    println!("{:<25} {:>8}", "Type", "Count");
    println!("{}", "-".repeat(34));
    for (ftype, count) in &sorted {
        println!("{ftype:<25} {count:>8}");
    }
    println!("{}", "-".repeat(34));
    println!("{:<25} {:>8}", "TOTAL", decoded.fragments.len());
}

fn format_size(bytes: usize) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}

fn first_difference(a: &[u8], b: &[u8]) -> Option<usize> {
    a.iter()
        .zip(b)
        .position(|(x, y)| x != y)
        .or_else(|| (a.len() != b.len()).then(|| a.len().min(b.len())))
}

fn pretty(json: &serde_json::Value) -> String {
    serde_json::to_string_pretty(json).unwrap_or_default()
}

fn to_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as Json;

    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(n) => match i64::try_from(n) {
            Ok(n) => Json::from(n),
            Err(_) => Json::String(n.to_string()),
        },
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(Json::Number)
            .unwrap_or_else(|| Json::String(f.to_string())),
        Value::Decimal(d) => Json::String(d.to_string()),
        Value::Timestamp(ts) => Json::String(ts.to_string()),
        Value::Symbol(s) => Json::String(s.as_str().to_string()),
        Value::String(s) => Json::String(s.clone()),
        Value::Clob(bytes) | Value::Blob(bytes) => Json::String(BASE64.encode(bytes)),
        Value::List(items) | Value::SExp(items) => Json::Array(items.iter().map(to_json).collect()),
        Value::Struct(fields) => Json::Object(
            fields
                .iter()
                .map(|(k, v)| (k.as_str().to_string(), to_json(v)))
                .collect(),
        ),
        Value::Annotated(annotated) => serde_json::json!({
            "annotations": annotated.annotations().iter().map(|a| a.as_str()).collect::<Vec<_>>(),
            "value": to_json(annotated.value()),
        }),
    }
}
