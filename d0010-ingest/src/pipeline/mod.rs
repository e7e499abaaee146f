//! Per-file import orchestration.
//!
//! [`Importer`] drives one flow file at a time through the record reader,
//! the [`ParseContext`] tracker, the field parsers and the repository. Record
//! level failures are collected and processing continues; a duplicate
//! filename rejects the file up front and a critical failure (undecodable
//! input, storage failure) aborts it.

pub mod context;

pub use context::{ContextState, ParseContext};

use chrono_tz::Tz;
use futures::StreamExt;
use readings_client::domain::{NewFlowFile, NewReading};
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    parse::{
        HeaderRecord, MeterPointRecord, MeterRecord, RawRecord, ReadingRecord, RecordError, RecordReader,
        RecordType, RecordWarning, TrailerRecord, WarningKind,
    },
    repository::{DryRunRepository, Repository, RepositoryError},
    sources::{FlowFileInput, FlowFileSource},
    validation::ValidationRules,
};

#[derive(Debug, Clone, Copy)]
pub struct ImportSettings {
    /// Zone the 14-digit reading timestamps are expressed in.
    pub reference_tz: Tz,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            reference_tz: chrono_tz::Europe::London,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImportStatus {
    Done,
    Rejected,
    Aborted,
}

/// Why a file was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AbortCause {
    /// Contents are not valid UTF-8. Retrying cannot help.
    Undecodable,
    /// The source could not read the file.
    Unreadable,
    Storage,
}

/// Outcome of one file.
#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub filename: String,
    pub status: ImportStatus,
    pub dry_run: bool,
    pub flow_file_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_reference: Option<String>,
    pub readings_imported: u64,
    pub meter_points_created: u64,
    pub meters_created: u64,
    pub errors: Vec<RecordError>,
    pub warnings: Vec<RecordWarning>,
    /// Reason for a rejected or aborted import.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_cause: Option<AbortCause>,
}

impl ImportSummary {
    fn failed(err: &ImportError, dry_run: bool) -> Self {
        Self {
            filename: err.filename().to_string(),
            status: err.status(),
            dry_run,
            flow_file_id: Uuid::nil(),
            file_reference: None,
            readings_imported: 0,
            meter_points_created: 0,
            meters_created: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            detail: Some(err.to_string()),
            abort_cause: err.abort_cause(),
        }
    }

    /// Aborted for a reason that may clear up on another attempt.
    pub fn is_retryable(&self) -> bool {
        self.status == ImportStatus::Aborted && self.abort_cause != Some(AbortCause::Undecodable)
    }

    pub fn is_done(&self) -> bool {
        self.status == ImportStatus::Done
    }

    /// Turn a rejected or aborted summary back into the error that ended it.
    pub fn into_result(self) -> Result<Self, ImportError> {
        match self.status {
            ImportStatus::Done => Ok(self),
            ImportStatus::Rejected => Err(ImportError::DuplicateFile {
                filename: self.filename,
            }),
            ImportStatus::Aborted => Err(ImportError::Critical {
                filename: self.filename,
                cause: self.abort_cause.unwrap_or(AbortCause::Storage),
                reason: self.detail.unwrap_or_default(),
            }),
        }
    }
}

/// File-level failures. Both stop the file they occur in.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ImportError {
    #[error("DuplicateFileError: flow file '{filename}' has already been imported")]
    DuplicateFile { filename: String },
    #[error("CriticalError: {filename}: {reason}")]
    Critical {
        filename: String,
        cause: AbortCause,
        reason: String,
    },
}

impl ImportError {
    pub fn status(&self) -> ImportStatus {
        match self {
            Self::DuplicateFile { .. } => ImportStatus::Rejected,
            Self::Critical { .. } => ImportStatus::Aborted,
        }
    }

    pub fn abort_cause(&self) -> Option<AbortCause> {
        match self {
            Self::DuplicateFile { .. } => None,
            Self::Critical { cause, .. } => Some(*cause),
        }
    }

    pub fn filename(&self) -> &str {
        match self {
            Self::DuplicateFile { filename } | Self::Critical { filename, .. } => filename,
        }
    }
}

enum RecordFailure {
    Record(RecordError),
    Storage(RepositoryError),
}

impl From<RecordError> for RecordFailure {
    fn from(e: RecordError) -> Self {
        Self::Record(e)
    }
}

impl From<RepositoryError> for RecordFailure {
    fn from(e: RepositoryError) -> Self {
        Self::Storage(e)
    }
}

/// Mutable state of one import in progress.
struct FileImport {
    filename: String,
    dry_run: bool,
    flow_file_id: Uuid,
    rules: ValidationRules,
    header: Option<HeaderRecord>,
    trailer: Option<(u64, TrailerRecord)>,
    body_records: u64,
    readings_imported: u64,
    meter_points_created: u64,
    meters_created: u64,
    errors: Vec<RecordError>,
    warnings: Vec<RecordWarning>,
}

impl FileImport {
    fn new(filename: &str, dry_run: bool, rules: ValidationRules) -> Self {
        Self {
            filename: filename.to_string(),
            dry_run,
            flow_file_id: Uuid::new_v4(),
            rules,
            header: None,
            trailer: None,
            body_records: 0,
            readings_imported: 0,
            meter_points_created: 0,
            meters_created: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn record_error(&mut self, err: RecordError) {
        tracing::warn!(filename = %self.filename, line = err.line, kind = %err.kind, "{}", err.message);
        metrics::counter!("d0010_record_errors_total", "kind" => err.kind.as_str()).increment(1);
        self.errors.push(err);
    }

    fn warn(&mut self, warning: RecordWarning) {
        tracing::info!(filename = %self.filename, line = ?warning.line, kind = %warning.kind, "{}", warning.message);
        self.warnings.push(warning);
    }

    fn file_reference(&self) -> String {
        self.header
            .as_ref()
            .map(|h| h.file_reference.clone())
            .unwrap_or_default()
    }

    /// File-level checks that can only run after the last record.
    fn check_envelope(&mut self) {
        if self.header.is_none() {
            self.warn(RecordWarning::new(
                None,
                WarningKind::MissingHeader,
                "file has no ZHV header record",
            ));
        }

        if let Some((line, trailer)) = self.trailer.clone() {
            if let Some(expected) = trailer.total_count {
                if expected != self.body_records {
                    self.warn(RecordWarning::new(
                        Some(line),
                        WarningKind::TrailerCountMismatch,
                        format!(
                            "trailer declares {expected} record(s) but the file contains {}",
                            self.body_records
                        ),
                    ));
                }
            }
        }
    }

    fn into_summary(self, status: ImportStatus, failure: Option<&ImportError>) -> ImportSummary {
        ImportSummary {
            file_reference: self.header.map(|h| h.file_reference),
            filename: self.filename,
            status,
            dry_run: self.dry_run,
            flow_file_id: self.flow_file_id,
            readings_imported: self.readings_imported,
            meter_points_created: self.meter_points_created,
            meters_created: self.meters_created,
            errors: self.errors,
            warnings: self.warnings,
            detail: failure.map(ToString::to_string),
            abort_cause: failure.and_then(ImportError::abort_cause),
        }
    }
}

/// Imports D0010 flow files into a [`Repository`].
pub struct Importer<R> {
    repository: R,
    settings: ImportSettings,
}

impl<R: Repository> Importer<R> {
    pub fn new(repository: R, settings: ImportSettings) -> Self {
        Self { repository, settings }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn settings(&self) -> &ImportSettings {
        &self.settings
    }

    /// Import one file and always return a summary, whatever the outcome.
    pub async fn import(&self, input: &FlowFileInput, dry_run: bool) -> ImportSummary {
        let rules = ValidationRules::new(self.settings.reference_tz, OffsetDateTime::now_utc());
        let summary = if dry_run {
            let staging = DryRunRepository::new(&self.repository);
            self.run(&staging, input, rules, true).await
        } else {
            self.run(&self.repository, input, rules, false).await
        };

        match summary.status {
            ImportStatus::Done => {
                metrics::counter!("d0010_files_imported_total").increment(1);
                if !dry_run {
                    metrics::counter!("d0010_readings_imported_total").increment(summary.readings_imported);
                }
                tracing::info!(
                    filename = %summary.filename,
                    dry_run,
                    readings = summary.readings_imported,
                    meter_points_created = summary.meter_points_created,
                    meters_created = summary.meters_created,
                    errors = summary.errors.len(),
                    warnings = summary.warnings.len(),
                    "flow file imported"
                );
            }
            ImportStatus::Rejected => {
                metrics::counter!("d0010_files_rejected_total").increment(1);
                tracing::warn!(filename = %summary.filename, detail = ?summary.detail, "flow file rejected");
            }
            ImportStatus::Aborted => {
                metrics::counter!("d0010_files_aborted_total").increment(1);
                tracing::error!(filename = %summary.filename, detail = ?summary.detail, "flow file aborted");
            }
        }
        summary
    }

    /// Like [`import`](Self::import) but surfaces rejection and abort as errors.
    pub async fn try_import(&self, input: &FlowFileInput, dry_run: bool) -> Result<ImportSummary, ImportError> {
        self.import(input, dry_run).await.into_result()
    }

    /// Import files strictly in order, one summary each.
    pub async fn import_all(&self, inputs: &[FlowFileInput], dry_run: bool) -> Vec<ImportSummary> {
        let mut summaries = Vec::with_capacity(inputs.len());
        for input in inputs {
            summaries.push(self.import(input, dry_run).await);
        }
        summaries
    }

    /// Import everything a source yields. A file the source could not read
    /// gets an aborted summary.
    pub async fn import_source(&self, source: &dyn FlowFileSource, dry_run: bool) -> Vec<ImportSummary> {
        let mut stream = source.stream().await;
        let mut summaries = Vec::new();

        while let Some(item) = stream.next().await {
            match item {
                Ok(input) => summaries.push(self.import(&input, dry_run).await),
                Err(e) => {
                    metrics::counter!("d0010_files_aborted_total").increment(1);
                    tracing::error!(error = %e, "failed to read flow file");
                    let err = ImportError::Critical {
                        filename: e.filename(),
                        cause: AbortCause::Unreadable,
                        reason: e.to_string(),
                    };
                    summaries.push(ImportSummary::failed(&err, dry_run));
                }
            }
        }
        summaries
    }

    async fn run(
        &self,
        repo: &dyn Repository,
        input: &FlowFileInput,
        rules: ValidationRules,
        dry_run: bool,
    ) -> ImportSummary {
        let mut file = FileImport::new(&input.filename, dry_run, rules);
        match process(repo, input, &mut file).await {
            Ok(()) => file.into_summary(ImportStatus::Done, None),
            Err(e) => file.into_summary(e.status(), Some(&e)),
        }
    }
}

fn critical(file: &FileImport, cause: AbortCause, reason: impl Into<String>) -> ImportError {
    ImportError::Critical {
        filename: file.filename.clone(),
        cause,
        reason: reason.into(),
    }
}

async fn process(repo: &dyn Repository, input: &FlowFileInput, file: &mut FileImport) -> Result<(), ImportError> {
    let exists = repo
        .flow_file_exists(&file.filename)
        .await
        .map_err(|e| critical(file, AbortCause::Storage, format!("duplicate check failed: {e}")))?;
    if exists {
        return Err(ImportError::DuplicateFile {
            filename: file.filename.clone(),
        });
    }

    let text = std::str::from_utf8(&input.contents)
        .map_err(|e| critical(file, AbortCause::Undecodable, format!("input is not valid UTF-8: {e}")))?;

    tracing::debug!(filename = %file.filename, flow_file_id = %file.flow_file_id, "parsing flow file");

    let mut ctx = ParseContext::default();
    for record in RecordReader::new(text) {
        match process_record(repo, &record, &mut ctx, file).await {
            Ok(()) => {}
            Err(RecordFailure::Record(err)) => file.record_error(err),
            Err(RecordFailure::Storage(e)) => {
                discard(repo, file).await;
                return Err(critical(file, AbortCause::Storage, format!("storage failure at line {}: {e}", record.line)));
            }
        }
    }

    file.check_envelope();

    let new_flow_file = NewFlowFile {
        id: file.flow_file_id,
        filename: file.filename.clone(),
        file_reference: file.file_reference(),
        record_count: i64::try_from(file.readings_imported).unwrap_or(i64::MAX),
    };
    match repo.create_flow_file(&new_flow_file).await {
        Ok(_) => Ok(()),
        Err(RepositoryError::DuplicateFlowFile(filename)) => {
            discard(repo, file).await;
            Err(ImportError::DuplicateFile { filename })
        }
        Err(e) => {
            discard(repo, file).await;
            Err(critical(file, AbortCause::Storage, format!("could not record flow file: {e}")))
        }
    }
}

/// Drop readings already written under this import.
async fn discard(repo: &dyn Repository, file: &mut FileImport) {
    match repo.discard_readings(file.flow_file_id).await {
        Ok(removed) => {
            tracing::info!(filename = %file.filename, removed, "discarded readings of failed import");
            file.readings_imported = 0;
        }
        Err(e) => {
            tracing::error!(
                filename = %file.filename,
                flow_file_id = %file.flow_file_id,
                error = %e,
                "failed to discard readings of failed import"
            );
        }
    }
}

async fn process_record(
    repo: &dyn Repository,
    record: &RawRecord,
    ctx: &mut ParseContext,
    file: &mut FileImport,
) -> Result<(), RecordFailure> {
    let line = record.line;
    match &record.record_type {
        RecordType::Header => {
            let header = HeaderRecord::parse(record)?;
            file.header = Some(header);
        }
        RecordType::Trailer => {
            file.trailer = Some((line, TrailerRecord::parse(record)));
        }
        RecordType::MeterPoint => {
            file.body_records += 1;
            ctx.reset();
            let parsed = MeterPointRecord::parse(record)?;
            let resolved = repo.get_or_create_meter_point(&parsed.mpan).await?;
            if resolved.created {
                file.meter_points_created += 1;
            }
            ctx.enter_meter_point(resolved.entity);
        }
        RecordType::Meter => {
            file.body_records += 1;
            ctx.leave_meter();
            let meter_point = ctx.require_meter_point(line)?.clone();
            let parsed = MeterRecord::parse(record)?;
            let resolved = repo
                .get_or_create_meter(&parsed.serial_number, &meter_point, parsed.meter_type)
                .await?;
            if resolved.created {
                file.meters_created += 1;
            }
            ctx.enter_meter(resolved.entity);
        }
        RecordType::Reading => {
            file.body_records += 1;
            let meter_id = ctx.require_meter(line)?.id;
            let parsed = ReadingRecord::parse(record, &file.rules)?;
            repo.insert_reading(&NewReading {
                meter_id,
                flow_file_id: file.flow_file_id,
                register_id: parsed.register_id,
                reading_date: parsed.reading_date,
                reading_value: parsed.reading_value,
                reading_type: parsed.reading_type,
            })
            .await?;
            file.readings_imported += 1;
        }
        RecordType::Unrecognized(code) => {
            file.body_records += 1;
            file.warn(RecordWarning::new(
                Some(line),
                WarningKind::UnrecognizedRecordType,
                format!("unrecognized record type '{code}', line ignored"),
            ));
        }
    }
    Ok(())
}
