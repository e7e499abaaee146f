use std::{fmt, str::FromStr};

use time::OffsetDateTime;

use super::DomainError;

/// Physical meter serial number, never empty once trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(transparent)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct SerialNumber(String);

impl SerialNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for SerialNumber {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            Err(DomainError::EmptySerial)
        } else {
            Ok(Self(trimmed.to_string()))
        }
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Meter type code carried on the `028` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum MeterType {
    /// `D`
    Standard,
    /// `C`
    Credit,
    /// `P`
    Prepayment,
}

impl MeterType {
    pub fn code(self) -> &'static str {
        match self {
            Self::Standard => "D",
            Self::Credit => "C",
            Self::Prepayment => "P",
        }
    }
}

impl FromStr for MeterType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "D" => Ok(Self::Standard),
            "C" => Ok(Self::Credit),
            "P" => Ok(Self::Prepayment),
            other => Err(DomainError::InvalidMeterType(other.to_string())),
        }
    }
}

impl TryFrom<String> for MeterType {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for MeterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Meter {
    pub id: i64,
    pub meter_point_id: i64,
    pub serial_number: SerialNumber,
    #[sqlx(try_from = "String")]
    pub meter_type: MeterType,
    pub created_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_keeps_inner_spaces() {
        let serial: SerialNumber = " F75A 00802 ".parse().unwrap();
        assert_eq!(serial.as_str(), "F75A 00802");
    }

    #[test]
    fn blank_serial_is_rejected() {
        assert!(matches!("   ".parse::<SerialNumber>(), Err(DomainError::EmptySerial)));
    }

    #[test]
    fn meter_type_codes() {
        assert_eq!("D".parse::<MeterType>().unwrap(), MeterType::Standard);
        assert_eq!("C".parse::<MeterType>().unwrap(), MeterType::Credit);
        assert_eq!("P".parse::<MeterType>().unwrap(), MeterType::Prepayment);
        assert_eq!(MeterType::Prepayment.to_string(), "P");
        assert!(matches!(
            "X".parse::<MeterType>(),
            Err(DomainError::InvalidMeterType(code)) if code == "X"
        ));
    }
}
