use std::{fmt, str::FromStr};

use time::OffsetDateTime;

use super::DomainError;

/// Meter Point Administration Number: exactly 13 ASCII digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, sqlx::Type)]
#[sqlx(transparent)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Mpan(String);

impl Mpan {
    pub const LEN: usize = 13;

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Mpan {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() == Self::LEN && s.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(s.to_string()))
        } else {
            Err(DomainError::InvalidMpan(s.to_string()))
        }
    }
}

impl fmt::Display for Mpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MeterPoint {
    pub id: i64,
    pub mpan: Mpan,
    pub created_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_thirteen_digits() {
        let mpan: Mpan = "1200023305967".parse().unwrap();
        assert_eq!(mpan.as_str(), "1200023305967");
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let mpan: Mpan = " 1200023305967 ".parse().unwrap();
        assert_eq!(mpan.to_string(), "1200023305967");
    }

    #[test]
    fn rejects_wrong_length_and_non_digits() {
        for raw in ["120002330596", "12000233059671", "12000233059AB", "", "INVALID"] {
            assert!(
                matches!(raw.parse::<Mpan>(), Err(DomainError::InvalidMpan(_))),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_non_ascii_digits() {
        // Arabic-Indic digits are numeric but not ASCII.
        assert!("١٢٠٠٠٢٣٣٠٥٩٦٧".parse::<Mpan>().is_err());
    }
}
