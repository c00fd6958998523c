//! Coordinate string to decimal degree conversion
//!
//! Bibliographic records encode bounding box corners in one of five forms:
//!
//! | Form           | Example        |
//! |----------------|----------------|
//! | `hdddmmss`     | `W1234567`     |
//! | `hddd.dddddd`  | `E123.456789`  |
//! | signed degrees | `-123.456789`  |
//! | `hdddmm.mmmm`  | `S12345.6789`  |
//! | `hdddmmss.sss` | `W1234567.89`  |
//!
//! The hemisphere letter is case-insensitive and optional.

use bigdecimal::BigDecimal;
use regex::Regex;
use std::str::FromStr;
use std::sync::LazyLock;

static COORD_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?P<hemisphere>[NSEW+-])?(?P<degrees>\d{3}(?:\.\d+)?)(?P<minutes>\d{2}(?:\.\d+)?)?(?P<seconds>\d{2}(?:\.\d+)?)?",
    )
    .unwrap_or_else(|e| panic!("coordinate pattern is invalid: {e}"))
});

/// The captured pieces of a coordinate string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinateParts<'a> {
    pub hemisphere: Option<&'a str>,
    pub degrees: &'a str,
    pub minutes: Option<&'a str>,
    pub seconds: Option<&'a str>,
}

impl CoordinateParts<'_> {
    /// South, west and a leading minus all mean a negative value
    pub fn is_negative(&self) -> bool {
        matches!(
            self.hemisphere.map(str::to_ascii_uppercase).as_deref(),
            Some("S") | Some("W") | Some("-")
        )
    }
}

/// Locate the first coordinate in `value`.
pub fn coordinate_parts(value: &str) -> Option<CoordinateParts<'_>> {
    let captures = COORD_REGEX.captures(value)?;
    Some(CoordinateParts {
        hemisphere: captures.name("hemisphere").map(|m| m.as_str()),
        degrees: captures.name("degrees")?.as_str(),
        minutes: captures.name("minutes").map(|m| m.as_str()),
        seconds: captures.name("seconds").map(|m| m.as_str()),
    })
}

/// Convert a coordinate string to signed decimal degrees.
///
/// `precision` is a number of significant digits applied to the result
/// only. Returns `None` when no coordinate can be found.
pub fn convert_coord(value: &str, precision: Option<u64>) -> Option<BigDecimal> {
    let parts = coordinate_parts(value)?;

    let mut degrees = BigDecimal::from_str(parts.degrees).ok()?;
    if let Some(minutes) = parts.minutes {
        degrees += BigDecimal::from_str(minutes).ok()? / BigDecimal::from(60i64);
    }
    if let Some(seconds) = parts.seconds {
        degrees += BigDecimal::from_str(seconds).ok()? / BigDecimal::from(3600i64);
    }
    if parts.is_negative() {
        degrees = -degrees;
    }

    Some(match precision {
        Some(digits) => degrees.with_prec(digits),
        None => degrees,
    })
}
