use std::{future::Future, time::Duration};

use readings_client::domain::{FlowFile, Meter, MeterPoint, MeterType, Mpan, NewFlowFile, NewReading, Reading, SerialNumber};
use sqlx::postgres::PgPool;
use uuid::Uuid;

use super::{Repository, RepositoryError, Resolved};

const METER_POINT_COLUMNS: &str = "id, mpan, created_at";
const METER_COLUMNS: &str = "id, meter_point_id, serial_number, meter_type, created_at";
const READING_COLUMNS: &str = "id, meter_id, flow_file_id, register_id, reading_date, \
     reading_value::TEXT AS reading_value, reading_type, created_at";
const FLOW_FILE_COLUMNS: &str = "id, filename, file_reference, imported_at, record_count";

/// Errors worth another attempt: the statement never reached the database or
/// the pool was momentarily exhausted.
fn is_transient(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::WorkerCrashed
    )
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

/// Postgres-backed repository. Get-or-create is a single
/// `INSERT .. ON CONFLICT DO NOTHING RETURNING` followed, on conflict, by a
/// select of the row the other writer inserted.
pub struct PgRepository {
    pool: PgPool,
    max_retries: u32,
    retry_backoff: Duration,
}

impl PgRepository {
    pub fn new(pool: PgPool, max_retries: u32, retry_backoff: Duration) -> Self {
        Self {
            pool,
            max_retries,
            retry_backoff,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn with_retry<T, F, Fut>(&self, op: &'static str, mut f: F) -> Result<T, sqlx::Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_retries && is_transient(&e) => {
                    attempt += 1;
                    let sleep_for = self.retry_backoff * attempt;
                    metrics::counter!("d0010_repository_retries_total").increment(1);
                    tracing::warn!(error = %e, attempt, op, "repository operation failed, retrying with backoff");
                    tokio::time::sleep(sleep_for).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, op, "repository operation failed, giving up");
                    return Err(e);
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl Repository for PgRepository {
    async fn flow_file_exists(&self, filename: &str) -> Result<bool, RepositoryError> {
        let pool = &self.pool;
        let exists = self
            .with_retry("flow_file_exists", || async move {
                sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM flow_files WHERE filename = $1)")
                    .bind(filename)
                    .fetch_one(pool)
                    .await
            })
            .await?;
        Ok(exists)
    }

    async fn find_meter_point(&self, mpan: &Mpan) -> Result<Option<MeterPoint>, RepositoryError> {
        let pool = &self.pool;
        let sql = format!("SELECT {METER_POINT_COLUMNS} FROM meter_points WHERE mpan = $1");
        let sql = sql.as_str();
        let row = self
            .with_retry("find_meter_point", || async move {
                sqlx::query_as::<_, MeterPoint>(sql).bind(mpan).fetch_optional(pool).await
            })
            .await?;
        Ok(row)
    }

    async fn find_meter(
        &self,
        serial: &SerialNumber,
        meter_point: &MeterPoint,
    ) -> Result<Option<Meter>, RepositoryError> {
        let pool = &self.pool;
        let meter_point_id = meter_point.id;
        let sql = format!("SELECT {METER_COLUMNS} FROM meters WHERE meter_point_id = $1 AND serial_number = $2");
        let sql = sql.as_str();
        let row = self
            .with_retry("find_meter", || async move {
                sqlx::query_as::<_, Meter>(sql)
                    .bind(meter_point_id)
                    .bind(serial)
                    .fetch_optional(pool)
                    .await
            })
            .await?;
        Ok(row)
    }

    async fn get_or_create_meter_point(&self, mpan: &Mpan) -> Result<Resolved<MeterPoint>, RepositoryError> {
        let pool = &self.pool;
        let sql = format!(
            "INSERT INTO meter_points (mpan) VALUES ($1) \
             ON CONFLICT (mpan) DO NOTHING \
             RETURNING {METER_POINT_COLUMNS}"
        );
        let sql = sql.as_str();
        let inserted = self
            .with_retry("insert_meter_point", || async move {
                sqlx::query_as::<_, MeterPoint>(sql).bind(mpan).fetch_optional(pool).await
            })
            .await?;

        if let Some(meter_point) = inserted {
            tracing::debug!(mpan = %mpan, id = meter_point.id, "created meter point");
            return Ok(Resolved::created(meter_point));
        }

        self.find_meter_point(mpan)
            .await?
            .map(Resolved::existing)
            .ok_or_else(|| RepositoryError::Storage(format!("meter point {mpan} conflicted but could not be read back")))
    }

    async fn get_or_create_meter(
        &self,
        serial: &SerialNumber,
        meter_point: &MeterPoint,
        meter_type: MeterType,
    ) -> Result<Resolved<Meter>, RepositoryError> {
        let pool = &self.pool;
        let meter_point_id = meter_point.id;
        let sql = format!(
            "INSERT INTO meters (meter_point_id, serial_number, meter_type) VALUES ($1, $2, $3) \
             ON CONFLICT (meter_point_id, serial_number) DO NOTHING \
             RETURNING {METER_COLUMNS}"
        );
        let sql = sql.as_str();
        let inserted = self
            .with_retry("insert_meter", || async move {
                sqlx::query_as::<_, Meter>(sql)
                    .bind(meter_point_id)
                    .bind(serial)
                    .bind(meter_type.code())
                    .fetch_optional(pool)
                    .await
            })
            .await?;

        if let Some(meter) = inserted {
            tracing::debug!(serial = %serial, mpan = %meter_point.mpan, id = meter.id, "created meter");
            return Ok(Resolved::created(meter));
        }

        let existing = self.find_meter(serial, meter_point).await?.ok_or_else(|| {
            RepositoryError::Storage(format!(
                "meter {serial} under {} conflicted but could not be read back",
                meter_point.mpan
            ))
        })?;
        if existing.meter_type != meter_type {
            tracing::debug!(
                serial = %serial,
                stored = %existing.meter_type,
                incoming = %meter_type,
                "meter type differs from stored meter, keeping stored type"
            );
        }
        Ok(Resolved::existing(existing))
    }

    async fn insert_reading(&self, reading: &NewReading) -> Result<Reading, RepositoryError> {
        let pool = &self.pool;
        let value = reading.reading_value.to_string();
        let value = value.as_str();
        let sql = format!(
            "INSERT INTO readings \
                 (meter_id, flow_file_id, register_id, reading_date, reading_value, reading_type) \
             VALUES ($1, $2, $3, $4, CAST($5 AS NUMERIC(12, 3)), $6) \
             RETURNING {READING_COLUMNS}"
        );
        let sql = sql.as_str();
        let row = self
            .with_retry("insert_reading", || async move {
                sqlx::query_as::<_, Reading>(sql)
                    .bind(reading.meter_id)
                    .bind(reading.flow_file_id)
                    .bind(&reading.register_id)
                    .bind(reading.reading_date)
                    .bind(value)
                    .bind(reading.reading_type.as_str())
                    .fetch_one(pool)
                    .await
            })
            .await?;
        Ok(row)
    }

    async fn create_flow_file(&self, flow_file: &NewFlowFile) -> Result<FlowFile, RepositoryError> {
        let pool = &self.pool;
        let sql = format!(
            "INSERT INTO flow_files (id, filename, file_reference, record_count) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {FLOW_FILE_COLUMNS}"
        );
        let sql = sql.as_str();
        let res = self
            .with_retry("create_flow_file", || async move {
                sqlx::query_as::<_, FlowFile>(sql)
                    .bind(flow_file.id)
                    .bind(&flow_file.filename)
                    .bind(&flow_file.file_reference)
                    .bind(flow_file.record_count)
                    .fetch_one(pool)
                    .await
            })
            .await;

        match res {
            Ok(row) => Ok(row),
            Err(e) if is_unique_violation(&e) => Err(RepositoryError::DuplicateFlowFile(flow_file.filename.clone())),
            Err(e) => Err(e.into()),
        }
    }

    async fn discard_readings(&self, flow_file_id: Uuid) -> Result<u64, RepositoryError> {
        let pool = &self.pool;
        let result = self
            .with_retry("discard_readings", || async move {
                sqlx::query("DELETE FROM readings WHERE flow_file_id = $1")
                    .bind(flow_file_id)
                    .execute(pool)
                    .await
            })
            .await?;
        Ok(result.rows_affected())
    }
}
