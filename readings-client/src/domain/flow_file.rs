use time::OffsetDateTime;
use uuid::Uuid;

/// One imported D0010 file. The filename is the re-import guard.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FlowFile {
    pub id: Uuid,
    pub filename: String,
    pub file_reference: String,
    pub imported_at: OffsetDateTime,
    pub record_count: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewFlowFile {
    pub id: Uuid,
    pub filename: String,
    pub file_reference: String,
    pub record_count: i64,
}
