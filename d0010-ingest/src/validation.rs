use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use readings_client::domain::{DomainError, MeterType, Mpan, ReadingValue, RegisterId, SerialNumber};
use time::OffsetDateTime;

use crate::parse::{RecordError, RecordErrorKind};

/// A failed rule, not yet tied to a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub kind: RecordErrorKind,
    pub message: String,
}

impl Violation {
    pub fn new(kind: RecordErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn at(self, line: u64) -> RecordError {
        RecordError::new(line, self.kind, self.message)
    }
}

impl From<DomainError> for Violation {
    fn from(err: DomainError) -> Self {
        let kind = match &err {
            DomainError::InvalidMpan(_) => RecordErrorKind::InvalidMpan,
            DomainError::EmptySerial => RecordErrorKind::InvalidSerial,
            DomainError::InvalidMeterType(_) => RecordErrorKind::InvalidMeterType,
            DomainError::InvalidReadingValue(_) | DomainError::NegativeReadingValue(_) => {
                RecordErrorKind::InvalidReadingValue
            }
            DomainError::InvalidRegister(_) | DomainError::InvalidReadingType(_) => {
                RecordErrorKind::MalformedRecord
            }
        };
        Self::new(kind, err.to_string())
    }
}

/// MPAN must be exactly 13 digits.
pub fn validate_mpan(raw: &str) -> Result<Mpan, Violation> {
    Ok(raw.parse()?)
}

/// Serial must be non-empty once trimmed.
pub fn validate_serial(raw: &str) -> Result<SerialNumber, Violation> {
    Ok(raw.parse()?)
}

pub fn validate_meter_type(raw: &str) -> Result<MeterType, Violation> {
    Ok(raw.parse()?)
}

/// Any short alphanumeric token; no closed set of register codes.
pub fn validate_register(raw: &str) -> Result<RegisterId, Violation> {
    Ok(raw.parse()?)
}

/// Non-negative decimal with at most three decimal places.
pub fn validate_reading_value(raw: &str) -> Result<ReadingValue, Violation> {
    Ok(raw.parse()?)
}

/// Interpret a wall-clock time in `tz`.
///
/// Ambiguous times during a DST fall-back resolve to standard time, the later
/// occurrence. Times inside a spring-forward gap are read with the offset in
/// force before the gap.
pub fn local_to_utc(naive: NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(_, latest) => latest.with_timezone(&Utc),
        LocalResult::None => {
            let before_gap = tz.offset_from_utc_datetime(&(naive - Duration::days(1))).fix();
            let shifted = naive - Duration::seconds(i64::from(before_gap.local_minus_utc()));
            Utc.from_utc_datetime(&shifted)
        }
    }
}

/// Parse a `YYYYMMDDHHMMSS` timestamp.
pub fn parse_compact_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if raw.len() != 14 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let num = |range: std::ops::Range<usize>| raw[range].parse::<u32>().ok();

    let year = i32::try_from(num(0..4)?).ok()?;
    NaiveDate::from_ymd_opt(year, num(4..6)?, num(6..8)?)?.and_hms_opt(num(8..10)?, num(10..12)?, num(12..14)?)
}

/// Rules that depend on where and when an import runs.
#[derive(Debug, Clone, Copy)]
pub struct ValidationRules {
    reference_tz: Tz,
    import_instant: OffsetDateTime,
}

impl ValidationRules {
    pub fn new(reference_tz: Tz, import_instant: OffsetDateTime) -> Self {
        Self {
            reference_tz,
            import_instant,
        }
    }

    pub fn reference_tz(&self) -> Tz {
        self.reference_tz
    }

    pub fn import_instant(&self) -> OffsetDateTime {
        self.import_instant
    }

    /// Reading dates are 14-digit local timestamps in the reference zone and
    /// may not be later than the import instant.
    pub fn reading_date(&self, raw: &str) -> Result<OffsetDateTime, Violation> {
        let raw = raw.trim();
        let naive = parse_compact_timestamp(raw).ok_or_else(|| {
            Violation::new(
                RecordErrorKind::InvalidDate,
                format!("could not parse reading date '{raw}' (expected YYYYMMDDHHMMSS)"),
            )
        })?;

        let utc = local_to_utc(naive, self.reference_tz);
        let ts = OffsetDateTime::from_unix_timestamp(utc.timestamp()).map_err(|e| {
            Violation::new(RecordErrorKind::InvalidDate, format!("reading date '{raw}' out of range: {e}"))
        })?;

        if ts > self.import_instant {
            return Err(Violation::new(
                RecordErrorKind::FutureDate,
                format!("reading date '{raw}' is in the future"),
            ));
        }

        Ok(ts)
    }
}
