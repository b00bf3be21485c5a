//! Ion timestamps with explicit precision.
//!
//! A timestamp always has a year; month, day, hour:minute, second and
//! fractional second are each present only if every coarser field is. The
//! [`TimestampPrecision`] records which fields were actually written, so a
//! year-and-month timestamp never reads back as the first of the month.

use std::fmt;

use super::decimal::Decimal;

/// The finest field present in a [`Timestamp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimestampPrecision {
    Year,
    Month,
    Day,
    Minute,
    Second,
    Fraction,
}

#[derive(Debug, Clone)]
pub struct Timestamp {
    year: u32,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
    fraction: Option<Decimal>,
    offset_minutes: Option<i32>,
    precision: TimestampPrecision,
}

impl Timestamp {
    /// A year-precision timestamp. Refine it with the builder methods.
    pub fn new(year: u32) -> Self {
        Self {
            year,
            month: 1,
            day: 1,
            hour: 0,
            minute: 0,
            second: 0,
            fraction: None,
            offset_minutes: None,
            precision: TimestampPrecision::Year,
        }
    }

    pub fn month(mut self, month: u8) -> Self {
        self.month = month;
        self.raise(TimestampPrecision::Month);
        self
    }

    pub fn day(mut self, day: u8) -> Self {
        self.day = day;
        self.raise(TimestampPrecision::Day);
        self
    }

    pub fn time(mut self, hour: u8, minute: u8) -> Self {
        self.hour = hour;
        self.minute = minute;
        self.raise(TimestampPrecision::Minute);
        self
    }

    pub fn second(mut self, second: u8) -> Self {
        self.second = second;
        self.raise(TimestampPrecision::Second);
        self
    }

    /// Fractional seconds, `0 <= fraction < 1`.
    ///
    /// A zero without fractional digits (`0d0`) has no encoding and is
    /// dropped. Values outside the range are rejected by the writer.
    pub fn fraction(mut self, fraction: Decimal) -> Self {
        if fraction.is_zero() && fraction.exponent() >= 0 {
            return self;
        }
        self.fraction = Some(fraction);
        self.raise(TimestampPrecision::Fraction);
        self
    }

    /// Local offset in minutes. `None` is the unknown offset (`-00:00`),
    /// `Some(0)` is UTC. Ignored below minute precision.
    pub fn offset(mut self, offset_minutes: Option<i32>) -> Self {
        self.offset_minutes = offset_minutes;
        self
    }

    fn raise(&mut self, precision: TimestampPrecision) {
        if precision > self.precision {
            self.precision = precision;
        }
    }

    #[inline]
    pub fn precision(&self) -> TimestampPrecision {
        self.precision
    }

    #[inline]
    pub fn year_value(&self) -> u32 {
        self.year
    }

    fn field<T: Copy>(&self, needed: TimestampPrecision, value: T) -> Option<T> {
        (self.precision >= needed).then_some(value)
    }

    pub fn month_value(&self) -> Option<u8> {
        self.field(TimestampPrecision::Month, self.month)
    }

    pub fn day_value(&self) -> Option<u8> {
        self.field(TimestampPrecision::Day, self.day)
    }

    pub fn hour_value(&self) -> Option<u8> {
        self.field(TimestampPrecision::Minute, self.hour)
    }

    pub fn minute_value(&self) -> Option<u8> {
        self.field(TimestampPrecision::Minute, self.minute)
    }

    pub fn second_value(&self) -> Option<u8> {
        self.field(TimestampPrecision::Second, self.second)
    }

    pub fn fraction_value(&self) -> Option<&Decimal> {
        if self.precision == TimestampPrecision::Fraction {
            self.fraction.as_ref()
        } else {
            None
        }
    }

    /// The offset, which only exists from minute precision on.
    pub fn offset_minutes(&self) -> Option<i32> {
        if self.precision >= TimestampPrecision::Minute {
            self.offset_minutes
        } else {
            None
        }
    }
}

impl PartialEq for Timestamp {
    /// Compares only the fields the precision makes visible.
    fn eq(&self, other: &Self) -> bool {
        self.precision == other.precision
            && self.year == other.year
            && self.month_value() == other.month_value()
            && self.day_value() == other.day_value()
            && self.hour_value() == other.hour_value()
            && self.minute_value() == other.minute_value()
            && self.second_value() == other.second_value()
            && self.fraction_value() == other.fraction_value()
            && self.offset_minutes() == other.offset_minutes()
    }
}

impl Eq for Timestamp {}

impl fmt::Display for Timestamp {
    /// Ion text form: `2024T`, `2024-05T`, `2024-05-06`, `2024-05-06T10:30Z`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use TimestampPrecision::*;

        write!(f, "{:04}", self.year)?;
        match self.precision {
            Year => return f.write_str("T"),
            Month => return write!(f, "-{:02}T", self.month),
            _ => write!(f, "-{:02}-{:02}", self.month, self.day)?,
        }
        if self.precision == Day {
            return Ok(());
        }

        write!(f, "T{:02}:{:02}", self.hour, self.minute)?;
        if self.precision >= Second {
            write!(f, ":{:02}", self.second)?;
        }
        if let Some(fraction) = self.fraction_value() {
            let digits = fraction.coefficient().to_string();
            let places = fraction.exponent().unsigned_abs() as usize;
            if places > 0 {
                write!(f, ".{digits:0>places$}")?;
            }
        }

        match self.offset_minutes {
            None => f.write_str("-00:00"),
            Some(0) => f.write_str("Z"),
            Some(m) => {
                let sign = if m < 0 { '-' } else { '+' };
                write!(f, "{sign}{:02}:{:02}", m.abs() / 60, m.abs() % 60)
            }
        }
    }
}
