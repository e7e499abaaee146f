/// Record-type code found in the first field of every line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordType {
    /// `ZHV`
    Header,
    /// `026`
    MeterPoint,
    /// `028`
    Meter,
    /// `030`
    Reading,
    /// `ZPT`
    Trailer,
    Unrecognized(String),
}

impl RecordType {
    pub fn from_code(code: &str) -> Self {
        match code {
            "ZHV" => Self::Header,
            "026" => Self::MeterPoint,
            "028" => Self::Meter,
            "030" => Self::Reading,
            "ZPT" => Self::Trailer,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::Header => "ZHV",
            Self::MeterPoint => "026",
            Self::Meter => "028",
            Self::Reading => "030",
            Self::Trailer => "ZPT",
            Self::Unrecognized(code) => code,
        }
    }
}

/// One non-blank line, split on `|`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// 1-based physical line number.
    pub line: u64,
    pub record_type: RecordType,
    /// Fields after the record-type code, untrimmed.
    pub fields: Vec<String>,
}

impl RawRecord {
    /// Trimmed field at `idx`, `None` when missing or blank.
    pub fn field(&self, idx: usize) -> Option<&str> {
        self.fields
            .get(idx)
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
    }
}

/// Lazy, single-pass iterator over the records of one flow file.
///
/// Blank and whitespace-only lines are skipped and a leading byte-order mark
/// is ignored. Field counts may vary from line to line; the parsers check the
/// minimum each record type needs.
pub struct RecordReader<'a> {
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
}

impl<'a> RecordReader<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            lines: input.strip_prefix('\u{feff}').unwrap_or(input).lines().enumerate(),
        }
    }
}

fn to_raw_record(line: u64, text: &str) -> RawRecord {
    let mut fields = text.split('|');
    let code = fields.next().unwrap_or_default().trim();

    RawRecord {
        line,
        record_type: RecordType::from_code(code),
        fields: fields.map(str::to_string).collect(),
    }
}

impl Iterator for RecordReader<'_> {
    type Item = RawRecord;

    fn next(&mut self) -> Option<Self::Item> {
        self.lines
            .by_ref()
            .find(|(_, text)| !text.trim().is_empty())
            .map(|(idx, text)| to_raw_record(idx as u64 + 1, text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(input: &str) -> Vec<RawRecord> {
        RecordReader::new(input).collect()
    }

    #[test]
    fn splits_fields_and_classifies_codes() {
        let records = read_all(
            "ZHV|0000475656|D0010002|D|UDMS|X|MRCY|20160302153151||||OPER| | |\n\
             026|1200023305967|V| | |\n\
             028|F75A 00802|D| | |\n\
             030|S|20160222000000|56311.0|||T|N| | |\n\
             ZPT|0000475656|35||11|20160302154650| |\n",
        );

        let types: Vec<_> = records.iter().map(|r| r.record_type.clone()).collect();
        assert_eq!(
            types,
            vec![
                RecordType::Header,
                RecordType::MeterPoint,
                RecordType::Meter,
                RecordType::Reading,
                RecordType::Trailer,
            ]
        );
        assert_eq!(records[2].field(0), Some("F75A 00802"));
        assert_eq!(records[3].fields.len(), 10);
        assert_eq!(records[3].field(5), Some("T"));
        assert_eq!(records[3].field(3), None);
    }

    #[test]
    fn skips_blank_lines_and_keeps_physical_line_numbers() {
        let records = read_all("ZHV|TEST\n\n026|1234567890123\n   \n028|SN123|D\n");
        let lines: Vec<_> = records.iter().map(|r| r.line).collect();
        assert_eq!(lines, vec![1, 3, 5]);
    }

    #[test]
    fn handles_crlf_and_missing_final_newline() {
        let records = read_all("026|1234567890123\r\n028|SN123|D");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].field(0), Some("1234567890123"));
        assert_eq!(records[1].field(1), Some("D"));
    }

    #[test]
    fn unknown_codes_are_surfaced_not_dropped() {
        let records = read_all("ZHD|TEST|FLOW\n");
        assert_eq!(records[0].record_type, RecordType::Unrecognized("ZHD".into()));
        assert_eq!(records[0].record_type.code(), "ZHD");
    }

    #[test]
    fn quotes_are_plain_characters() {
        let records = read_all("028|\"SN|1\"|D\n");
        assert_eq!(records[0].fields, vec!["\"SN", "1\"", "D"]);
    }

    #[test]
    fn ignores_byte_order_mark() {
        let records = read_all("\u{feff}ZHV|TEST\n");
        assert_eq!(records[0].record_type, RecordType::Header);
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(read_all("").is_empty());
        assert!(read_all("\n\n").is_empty());
    }
}
