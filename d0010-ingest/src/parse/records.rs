//! Positional field layouts for each D0010 record type.
//!
//! Field indexes below count from zero *after* the record-type code, so the
//! MPAN in `026|1200023305967|V| | |` is field 0.

use readings_client::domain::{MeterType, Mpan, ReadingType, ReadingValue, RegisterId, SerialNumber};
use time::OffsetDateTime;

use super::{RawRecord, RecordError};
use crate::validation::{self, ValidationRules};

fn require_fields(record: &RawRecord, min: usize, layout: &str) -> Result<(), RecordError> {
    if record.fields.len() < min {
        return Err(RecordError::malformed(
            record.line,
            format!(
                "invalid {} record: expected {layout}, got {} field(s)",
                record.record_type.code(),
                record.fields.len()
            ),
        ));
    }
    Ok(())
}

fn parse_count(raw: Option<&str>) -> Option<u64> {
    raw.and_then(|s| s.parse().ok())
}

/// `ZHV` file header. Only the file reference is required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRecord {
    pub file_reference: String,
    pub flow_version: Option<String>,
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub created_at: Option<String>,
}

impl HeaderRecord {
    pub fn parse(record: &RawRecord) -> Result<Self, RecordError> {
        require_fields(record, 1, "ZHV|file_reference|...")?;
        let own = |idx| record.field(idx).map(str::to_string);

        Ok(Self {
            file_reference: record.field(0).unwrap_or_default().to_string(),
            flow_version: own(1),
            sender: own(3),
            recipient: own(5),
            created_at: own(6),
        })
    }
}

/// `026` meter point: `mpan | flag | ...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeterPointRecord {
    pub mpan: Mpan,
    pub flag: Option<String>,
}

impl MeterPointRecord {
    pub fn parse(record: &RawRecord) -> Result<Self, RecordError> {
        require_fields(record, 1, "026|MPAN|...")?;
        let mpan = validation::validate_mpan(&record.fields[0]).map_err(|v| v.at(record.line))?;

        Ok(Self {
            mpan,
            flag: record.field(1).map(str::to_string),
        })
    }
}

/// `028` meter: `serial | meter_type | ...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeterRecord {
    pub serial_number: SerialNumber,
    pub meter_type: MeterType,
}

impl MeterRecord {
    pub fn parse(record: &RawRecord) -> Result<Self, RecordError> {
        require_fields(record, 2, "028|SERIAL|TYPE|...")?;
        let serial_number = validation::validate_serial(&record.fields[0]).map_err(|v| v.at(record.line))?;
        let meter_type = validation::validate_meter_type(&record.fields[1]).map_err(|v| v.at(record.line))?;

        Ok(Self {
            serial_number,
            meter_type,
        })
    }
}

/// `030` reading: `register | date | value | - | - | actual_flag | ...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadingRecord {
    pub register_id: RegisterId,
    pub reading_date: OffsetDateTime,
    pub reading_value: ReadingValue,
    pub reading_type: ReadingType,
}

/// `T` or blank is an actual read; `C` a customer read; `F`/`E` estimated.
fn reading_type_from_flag(flag: Option<&str>) -> ReadingType {
    match flag {
        Some("C") => ReadingType::Customer,
        Some("F") | Some("E") => ReadingType::Estimated,
        _ => ReadingType::Actual,
    }
}

impl ReadingRecord {
    pub const ACTUAL_FLAG_FIELD: usize = 5;

    pub fn parse(record: &RawRecord, rules: &ValidationRules) -> Result<Self, RecordError> {
        require_fields(record, 3, "030|REG_ID|DATE|VALUE|...")?;
        let line = record.line;

        let register_id = validation::validate_register(&record.fields[0]).map_err(|v| v.at(line))?;
        let reading_date = rules.reading_date(&record.fields[1]).map_err(|v| v.at(line))?;
        let reading_value = validation::validate_reading_value(&record.fields[2]).map_err(|v| v.at(line))?;

        Ok(Self {
            register_id,
            reading_date,
            reading_value,
            reading_type: reading_type_from_flag(record.field(Self::ACTUAL_FLAG_FIELD)),
        })
    }
}

/// `ZPT` trailer: `id | total_count | - | record_count | timestamp`.
/// Every field is optional; unparseable counts are treated as absent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrailerRecord {
    pub file_reference: Option<String>,
    pub total_count: Option<u64>,
    pub flow_count: Option<u64>,
    pub created_at: Option<String>,
}

impl TrailerRecord {
    pub fn parse(record: &RawRecord) -> Self {
        Self {
            file_reference: record.field(0).map(str::to_string),
            total_count: parse_count(record.field(1)),
            flow_count: parse_count(record.field(3)),
            created_at: record.field(4).map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{RecordErrorKind, RecordReader};
    use time::macros::datetime;

    fn raw(line: &str) -> RawRecord {
        RecordReader::new(line).next().unwrap()
    }

    fn rules() -> ValidationRules {
        ValidationRules::new(chrono_tz::Europe::London, datetime!(2025-01-01 00:00:00 UTC))
    }

    #[test]
    fn header_exposes_reference_and_parties() {
        let header =
            HeaderRecord::parse(&raw("ZHV|0000475656|D0010002|D|UDMS|X|MRCY|20160302153151||||OPER| | |")).unwrap();
        assert_eq!(header.file_reference, "0000475656");
        assert_eq!(header.flow_version.as_deref(), Some("D0010002"));
        assert_eq!(header.sender.as_deref(), Some("UDMS"));
        assert_eq!(header.recipient.as_deref(), Some("MRCY"));
        assert_eq!(header.created_at.as_deref(), Some("20160302153151"));
    }

    #[test]
    fn bare_header_is_malformed() {
        let err = HeaderRecord::parse(&raw("ZHV")).unwrap_err();
        assert_eq!(err.kind, RecordErrorKind::MalformedRecord);
    }

    #[test]
    fn meter_point_record() {
        let mp = MeterPointRecord::parse(&raw("026|1200023305967|V| | |")).unwrap();
        assert_eq!(mp.mpan.as_str(), "1200023305967");
        assert_eq!(mp.flag.as_deref(), Some("V"));
    }

    #[test]
    fn meter_point_with_bad_mpan() {
        let err = MeterPointRecord::parse(&raw("026|INVALID")).unwrap_err();
        assert_eq!(err.kind, RecordErrorKind::InvalidMpan);
        assert_eq!(err.line, 1);
    }

    #[test]
    fn meter_point_without_fields() {
        let err = MeterPointRecord::parse(&raw("026")).unwrap_err();
        assert_eq!(err.kind, RecordErrorKind::MalformedRecord);
        assert!(err.message.contains("026"));
    }

    #[test]
    fn meter_record() {
        let meter = MeterRecord::parse(&raw("028|F75A 00802|D| | |")).unwrap();
        assert_eq!(meter.serial_number.as_str(), "F75A 00802");
        assert_eq!(meter.meter_type, MeterType::Standard);
    }

    #[test]
    fn meter_record_failures() {
        assert_eq!(
            MeterRecord::parse(&raw("028")).unwrap_err().kind,
            RecordErrorKind::MalformedRecord
        );
        assert_eq!(
            MeterRecord::parse(&raw("028|SN123")).unwrap_err().kind,
            RecordErrorKind::MalformedRecord
        );
        assert_eq!(
            MeterRecord::parse(&raw("028||D")).unwrap_err().kind,
            RecordErrorKind::InvalidSerial
        );
        assert_eq!(
            MeterRecord::parse(&raw("028|SN123|Q")).unwrap_err().kind,
            RecordErrorKind::InvalidMeterType
        );
    }

    #[test]
    fn reading_record() {
        let reading = ReadingRecord::parse(&raw("030|S|20240115000000|45123.500|||T|N| | |"), &rules()).unwrap();
        assert_eq!(reading.register_id.as_str(), "S");
        assert_eq!(reading.reading_date, datetime!(2024-01-15 00:00:00 UTC));
        assert_eq!(reading.reading_value.to_string(), "45123.500");
        assert_eq!(reading.reading_type, ReadingType::Actual);
    }

    #[test]
    fn reading_type_follows_actual_flag() {
        let parse = |line: &str| ReadingRecord::parse(&raw(line), &rules()).unwrap().reading_type;
        assert_eq!(parse("030|S|20240115000000|1.0|||C|N"), ReadingType::Customer);
        assert_eq!(parse("030|S|20240115000000|1.0|||F|N"), ReadingType::Estimated);
        assert_eq!(parse("030|S|20240115000000|1.0"), ReadingType::Actual);
    }

    #[test]
    fn reading_record_failures() {
        let kind = |line: &str| ReadingRecord::parse(&raw(line), &rules()).unwrap_err().kind;
        assert_eq!(kind("030"), RecordErrorKind::MalformedRecord);
        assert_eq!(kind("030|S|20240115000000"), RecordErrorKind::MalformedRecord);
        assert_eq!(kind("030|S|BADDATE|100.5|||T|N| | |"), RecordErrorKind::InvalidDate);
        assert_eq!(kind("030|S|20990101000000|100.5|||T|N"), RecordErrorKind::FutureDate);
        assert_eq!(kind("030|S|20160222000000|INVALID|||T|N"), RecordErrorKind::InvalidReadingValue);
        assert_eq!(kind("030|S|20160222000000|-5.0|||T|N"), RecordErrorKind::InvalidReadingValue);
        assert_eq!(kind("030||20160222000000|5.0"), RecordErrorKind::MalformedRecord);
    }

    #[test]
    fn trailer_counts() {
        let trailer = TrailerRecord::parse(&raw("ZPT|0000475656|35||11|20160302154650| |"));
        assert_eq!(trailer.file_reference.as_deref(), Some("0000475656"));
        assert_eq!(trailer.total_count, Some(35));
        assert_eq!(trailer.flow_count, Some(11));
        assert_eq!(trailer.created_at.as_deref(), Some("20160302154650"));
    }

    #[test]
    fn trailer_tolerates_missing_or_junk_counts() {
        let trailer = TrailerRecord::parse(&raw("ZPT|TEST|abc"));
        assert_eq!(trailer.total_count, None);
        assert_eq!(TrailerRecord::parse(&raw("ZPT")), TrailerRecord::default());
    }
}
