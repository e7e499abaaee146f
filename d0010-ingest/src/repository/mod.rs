//! Storage collaborator used by the importer.

pub mod dry_run;
pub mod memory;
pub mod postgres;

pub use dry_run::DryRunRepository;
pub use memory::MemoryRepository;
pub use postgres::PgRepository;

use readings_client::domain::{FlowFile, Meter, MeterPoint, MeterType, Mpan, NewFlowFile, NewReading, Reading, SerialNumber};
use uuid::Uuid;

#[derive(thiserror::Error, Debug)]
pub enum RepositoryError {
    #[error("flow file '{0}' has already been imported")]
    DuplicateFlowFile(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("storage error: {0}")]
    Storage(String),
}

/// An entity returned by a get-or-create call, and whether this call created it.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub entity: T,
    pub created: bool,
}

impl<T> Resolved<T> {
    pub fn created(entity: T) -> Self {
        Self { entity, created: true }
    }

    pub fn existing(entity: T) -> Self {
        Self { entity, created: false }
    }
}

/// Persistence operations the import pipeline relies on.
///
/// Both get-or-create operations must be idempotent under concurrent callers:
/// implementations back them with a uniqueness constraint (MPAN; meter point +
/// serial) rather than a check-then-insert.
#[async_trait::async_trait]
pub trait Repository: Send + Sync {
    async fn flow_file_exists(&self, filename: &str) -> Result<bool, RepositoryError>;

    async fn find_meter_point(&self, mpan: &Mpan) -> Result<Option<MeterPoint>, RepositoryError>;

    async fn find_meter(
        &self,
        serial: &SerialNumber,
        meter_point: &MeterPoint,
    ) -> Result<Option<Meter>, RepositoryError>;

    async fn get_or_create_meter_point(&self, mpan: &Mpan) -> Result<Resolved<MeterPoint>, RepositoryError>;

    /// Meters are unique per (serial, meter point). An existing meter keeps
    /// the type it was created with.
    async fn get_or_create_meter(
        &self,
        serial: &SerialNumber,
        meter_point: &MeterPoint,
        meter_type: MeterType,
    ) -> Result<Resolved<Meter>, RepositoryError>;

    /// Always inserts; readings are never deduplicated.
    async fn insert_reading(&self, reading: &NewReading) -> Result<Reading, RepositoryError>;

    /// Fails with [`RepositoryError::DuplicateFlowFile`] if the filename exists.
    async fn create_flow_file(&self, flow_file: &NewFlowFile) -> Result<FlowFile, RepositoryError>;

    /// Remove readings written under an import that was later aborted.
    async fn discard_readings(&self, flow_file_id: Uuid) -> Result<u64, RepositoryError>;
}
