use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    str::FromStr,
};

/// A Kubernetes resource quantity (e.g. `500m`, `2`, `1Gi`, `1e3`).
///
/// Values are held as a signed count of billionths of a unit, which covers
/// every suffix in the quantity grammar from `n` through `Ei`. Fractions
/// smaller than a nano-unit are rounded up, as the API server does.
///
/// Equality and ordering compare the numeric value only: `1Gi` equals
/// `1073741824`, regardless of how either was written.
#[derive(Copy, Clone)]
pub struct Quantity {
    nanos: i128,
    format: Format,
}

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum ParseError {
    #[error("quantity must not be empty")]
    Empty,

    #[error("invalid number")]
    InvalidNumber,

    #[error("invalid suffix {0:?}: {expected}", expected = EXPECTED_SUFFIXES)]
    InvalidSuffix(String),

    #[error("quantity is out of range")]
    OutOfRange,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Format {
    DecimalSi,
    BinarySi,
    DecimalExponent,
}

const EXPECTED_SUFFIXES: &str =
    "expected one of 'n', 'u', 'm', 'k', 'M', 'G', 'T', 'P', 'E', 'Ki', 'Mi', 'Gi', 'Ti', 'Pi', 'Ei', or an exponent";

const NANOS_PER_UNIT: i128 = 1_000_000_000;

// Ordered largest first so that formatting picks the shortest rendering.
const DECIMAL_SUFFIXES: [(&str, i128); 10] = [
    ("E", NANOS_PER_UNIT * 1_000_000_000_000_000_000),
    ("P", NANOS_PER_UNIT * 1_000_000_000_000_000),
    ("T", NANOS_PER_UNIT * 1_000_000_000_000),
    ("G", NANOS_PER_UNIT * 1_000_000_000),
    ("M", NANOS_PER_UNIT * 1_000_000),
    ("k", NANOS_PER_UNIT * 1_000),
    ("", NANOS_PER_UNIT),
    ("m", 1_000_000),
    ("u", 1_000),
    ("n", 1),
];

const BINARY_SUFFIXES: [(&str, u32); 6] = [
    ("Ei", 60),
    ("Pi", 50),
    ("Ti", 40),
    ("Gi", 30),
    ("Mi", 20),
    ("Ki", 10),
];

// === impl Quantity ===

impl Quantity {
    #[inline]
    #[must_use]
    pub fn is_positive(&self) -> bool {
        self.nanos > 0
    }
}

impl FromStr for Quantity {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (negative, s) = match s.as_bytes().first() {
            None => return Err(ParseError::Empty),
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            Some(_) => (false, s),
        };

        let end = s
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(s.len());
        let (number, suffix) = s.split_at(end);
        let (whole, frac) = number.split_once('.').unwrap_or((number, ""));
        if (whole.is_empty() && frac.is_empty()) || frac.contains('.') {
            return Err(ParseError::InvalidNumber);
        }

        let (format, shift, exp) = parse_suffix(suffix)?;

        // Digits below the last one that can reach a nano-unit only decide
        // whether the value rounds up, so they collapse into a single `1`.
        let frac = frac.trim_end_matches('0');
        let whole_len = i32::try_from(whole.len()).unwrap_or(i32::MAX);
        let precision = exp
            .saturating_add(9 + 19)
            .min(36i32.saturating_sub(whole_len))
            .max(0) as usize;
        let (frac, truncated) = match frac.get(..precision) {
            Some(kept) if kept.len() < frac.len() => (kept, true),
            _ => (frac, false),
        };

        let mut mantissa = 0i128;
        let digits = whole.bytes().chain(frac.bytes()).map(|d| d - b'0');
        for digit in digits.chain(truncated.then_some(1)) {
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add(i128::from(digit)))
                .ok_or(ParseError::OutOfRange)?;
        }
        if mantissa == 0 {
            return Ok(Self { nanos: 0, format });
        }

        let mut nanos = mantissa
            .checked_mul(1i128 << shift)
            .ok_or(ParseError::OutOfRange)?;

        // The mantissa carries one implied decimal place per fraction digit.
        let places = frac.len() + usize::from(truncated);
        let scale = i32::try_from(places)
            .ok()
            .and_then(|places| exp.checked_add(9)?.checked_sub(places))
            .ok_or(ParseError::OutOfRange)?;
        if scale >= 0 {
            nanos = nanos
                .checked_mul(pow10(scale)?)
                .ok_or(ParseError::OutOfRange)?;
        } else {
            // Anything smaller than one nano-unit rounds up to one.
            nanos = match scale.checked_neg().map(pow10) {
                Some(Ok(divisor)) => div_ceil(nanos, divisor),
                _ => 1,
            };
        }

        if negative {
            nanos = -nanos;
        }
        Ok(Self { nanos, format })
    }
}

fn parse_suffix(suffix: &str) -> Result<(Format, u32, i32), ParseError> {
    let parsed = match suffix {
        "" => (Format::DecimalSi, 0, 0),
        "n" => (Format::DecimalSi, 0, -9),
        "u" => (Format::DecimalSi, 0, -6),
        "m" => (Format::DecimalSi, 0, -3),
        "k" => (Format::DecimalSi, 0, 3),
        "M" => (Format::DecimalSi, 0, 6),
        "G" => (Format::DecimalSi, 0, 9),
        "T" => (Format::DecimalSi, 0, 12),
        "P" => (Format::DecimalSi, 0, 15),
        "E" => (Format::DecimalSi, 0, 18),
        "Ki" => (Format::BinarySi, 10, 0),
        "Mi" => (Format::BinarySi, 20, 0),
        "Gi" => (Format::BinarySi, 30, 0),
        "Ti" => (Format::BinarySi, 40, 0),
        "Pi" => (Format::BinarySi, 50, 0),
        "Ei" => (Format::BinarySi, 60, 0),
        s => {
            let exp = s
                .strip_prefix(['e', 'E'])
                .and_then(|exp| exp.parse::<i32>().ok())
                .ok_or_else(|| ParseError::InvalidSuffix(s.to_string()))?;
            (Format::DecimalExponent, 0, exp)
        }
    };
    Ok(parsed)
}

fn pow10(exp: i32) -> Result<i128, ParseError> {
    u32::try_from(exp)
        .ok()
        .and_then(|exp| 10i128.checked_pow(exp))
        .ok_or(ParseError::OutOfRange)
}

fn div_ceil(n: i128, d: i128) -> i128 {
    let q = n / d;
    if n % d > 0 {
        q + 1
    } else {
        q
    }
}

impl PartialEq for Quantity {
    fn eq(&self, other: &Self) -> bool {
        self.nanos == other.nanos
    }
}

impl Eq for Quantity {}

impl PartialOrd for Quantity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Quantity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.nanos.cmp(&other.nanos)
    }
}

impl Hash for Quantity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.nanos.hash(state)
    }
}

impl fmt::Display for Quantity {
    /// Renders the canonical form: binary quantities keep the largest binary
    /// suffix that divides them evenly, everything else uses the largest
    /// decimal suffix that does.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nanos == 0 {
            return f.write_str("0");
        }

        if self.format == Format::BinarySi && self.nanos % NANOS_PER_UNIT == 0 {
            let units = self.nanos / NANOS_PER_UNIT;
            for (suffix, shift) in BINARY_SUFFIXES {
                let base = 1i128 << shift;
                if units % base == 0 {
                    return write!(f, "{}{}", units / base, suffix);
                }
            }
        }

        for (suffix, base) in DECIMAL_SUFFIXES {
            if self.nanos % base == 0 {
                return write!(f, "{}{}", self.nanos / base, suffix);
            }
        }
        unreachable!("every quantity is a whole number of nano-units")
    }
}

impl fmt::Debug for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Quantity({self})")
    }
}
