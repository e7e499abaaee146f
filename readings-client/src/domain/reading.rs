use std::{fmt, str::FromStr};

use time::OffsetDateTime;
use uuid::Uuid;

use super::DomainError;

/// Register code (S, DY, NT, 01, TO, A1, ...). Kept as an open set; only the
/// shape of the token is checked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(transparent)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct RegisterId(String);

impl RegisterId {
    pub const MAX_LEN: usize = 2;

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RegisterId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if !s.is_empty() && s.len() <= Self::MAX_LEN && s.bytes().all(|b| b.is_ascii_alphanumeric()) {
            Ok(Self(s.to_string()))
        } else {
            Err(DomainError::InvalidRegister(s.to_string()))
        }
    }
}

impl fmt::Display for RegisterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Non-negative register reading with three decimal places, matching a
/// `NUMERIC(12,3)` column. Stored as thousandths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ReadingValue {
    thousandths: u64,
}

impl ReadingValue {
    pub const SCALE: usize = 3;
    pub const MAX_INTEGER_DIGITS: usize = 9;

    pub fn from_thousandths(thousandths: u64) -> Self {
        Self { thousandths }
    }

    pub fn thousandths(&self) -> u64 {
        self.thousandths
    }
}

impl FromStr for ReadingValue {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let invalid = || DomainError::InvalidReadingValue(raw.to_string());

        let (negative, unsigned) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, raw.strip_prefix('+').unwrap_or(raw)),
        };
        let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if frac_part.len() > Self::SCALE {
            return Err(invalid());
        }

        let int_digits = int_part.trim_start_matches('0');
        if int_digits.len() > Self::MAX_INTEGER_DIGITS {
            return Err(invalid());
        }

        let whole: u64 = if int_digits.is_empty() {
            0
        } else {
            int_digits.parse().map_err(|_| invalid())?
        };
        let fraction: u64 = format!("{frac_part:0<3}").parse().map_err(|_| invalid())?;
        let thousandths = whole * 1000 + fraction;

        if negative && thousandths > 0 {
            return Err(DomainError::NegativeReadingValue(raw.to_string()));
        }

        Ok(Self { thousandths })
    }
}

impl TryFrom<String> for ReadingValue {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for ReadingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03}", self.thousandths / 1000, self.thousandths % 1000)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for ReadingValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Provenance of a reading value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum ReadingType {
    #[default]
    Actual,
    Customer,
    Estimated,
}

impl ReadingType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Actual => "ACTUAL",
            Self::Customer => "CUSTOMER",
            Self::Estimated => "ESTIMATED",
        }
    }
}

impl FromStr for ReadingType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ACTUAL" => Ok(Self::Actual),
            "CUSTOMER" => Ok(Self::Customer),
            "ESTIMATED" => Ok(Self::Estimated),
            other => Err(DomainError::InvalidReadingType(other.to_string())),
        }
    }
}

impl TryFrom<String> for ReadingType {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for ReadingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Reading {
    pub id: i64,
    pub meter_id: i64,
    pub flow_file_id: Uuid,
    pub register_id: RegisterId,
    pub reading_date: OffsetDateTime,
    #[sqlx(try_from = "String")]
    pub reading_value: ReadingValue,
    #[sqlx(try_from = "String")]
    pub reading_type: ReadingType,
    pub created_at: OffsetDateTime,
}

/// A validated reading that has not been persisted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    pub meter_id: i64,
    pub flow_file_id: Uuid,
    pub register_id: RegisterId,
    pub reading_date: OffsetDateTime,
    pub reading_value: ReadingValue,
    pub reading_type: ReadingType,
}
