use anyhow::Result;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::domain::{FlowFile, MeterPoint, MeterType, Mpan, ReadingType, ReadingValue, RegisterId, SerialNumber};

/// A reading joined with the meter, meter point and flow file it belongs to.
#[derive(Debug, Clone, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ReadingRow {
    pub reading_id: i64,
    pub mpan: Mpan,
    pub serial_number: SerialNumber,
    #[sqlx(try_from = "String")]
    pub meter_type: MeterType,
    pub register_id: RegisterId,
    pub reading_date: OffsetDateTime,
    #[sqlx(try_from = "String")]
    pub reading_value: ReadingValue,
    #[sqlx(try_from = "String")]
    pub reading_type: ReadingType,
    pub filename: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ReadingTypeCount {
    #[sqlx(try_from = "String")]
    pub reading_type: ReadingType,
    pub count: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ReadingTotals {
    pub total_readings: i64,
    pub total_meter_points: i64,
    pub total_meters: i64,
    pub earliest_reading: Option<OffsetDateTime>,
    pub latest_reading: Option<OffsetDateTime>,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ReadingSummary {
    pub totals: ReadingTotals,
    pub by_type: Vec<ReadingTypeCount>,
}

const READING_ROW_SELECT: &str = r#"
    SELECT
        r.id AS reading_id,
        mp.mpan,
        m.serial_number,
        m.meter_type::TEXT AS meter_type,
        r.register_id,
        r.reading_date,
        r.reading_value::TEXT AS reading_value,
        r.reading_type,
        ff.filename
    FROM readings r
    JOIN meters m ON r.meter_id = m.id
    JOIN meter_points mp ON m.meter_point_id = mp.id
    LEFT JOIN flow_files ff ON r.flow_file_id = ff.id
"#;

/// Time-ordered readings for every meter under one MPAN, `start <= date < end`.
pub async fn readings_for_mpan(
    pool: &PgPool,
    mpan: &Mpan,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> Result<Vec<ReadingRow>> {
    let sql = format!(
        "{READING_ROW_SELECT}
        WHERE mp.mpan = $1
          AND r.reading_date >= $2
          AND r.reading_date <  $3
        ORDER BY r.reading_date, m.serial_number, r.register_id"
    );

    let rows = sqlx::query_as::<_, ReadingRow>(&sql)
        .bind(mpan)
        .bind(start)
        .bind(end)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Readings for a meter serial. Serials are only unique per meter point, so
/// this can span several meter points.
pub async fn readings_for_serial(
    pool: &PgPool,
    serial: &SerialNumber,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> Result<Vec<ReadingRow>> {
    let sql = format!(
        "{READING_ROW_SELECT}
        WHERE m.serial_number = $1
          AND r.reading_date >= $2
          AND r.reading_date <  $3
        ORDER BY r.reading_date, mp.mpan, r.register_id"
    );

    let rows = sqlx::query_as::<_, ReadingRow>(&sql)
        .bind(serial)
        .bind(start)
        .bind(end)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Readings imported from a single flow file, in file order.
pub async fn readings_for_flow_file(pool: &PgPool, filename: &str) -> Result<Vec<ReadingRow>> {
    let sql = format!(
        "{READING_ROW_SELECT}
        WHERE ff.filename = $1
        ORDER BY r.id"
    );

    let rows = sqlx::query_as::<_, ReadingRow>(&sql)
        .bind(filename)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

pub async fn flow_file_by_filename(pool: &PgPool, filename: &str) -> Result<Option<FlowFile>> {
    let row = sqlx::query_as::<_, FlowFile>(
        r#"
        SELECT id, filename, file_reference, imported_at, record_count
        FROM flow_files
        WHERE filename = $1
        "#,
    )
    .bind(filename)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

pub async fn meter_point_by_mpan(pool: &PgPool, mpan: &Mpan) -> Result<Option<MeterPoint>> {
    let row = sqlx::query_as::<_, MeterPoint>(
        r#"
        SELECT id, mpan, created_at
        FROM meter_points
        WHERE mpan = $1
        "#,
    )
    .bind(mpan)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Store-wide totals plus a per-reading-type breakdown.
pub async fn reading_summary(pool: &PgPool) -> Result<ReadingSummary> {
    let totals = sqlx::query_as::<_, ReadingTotals>(
        r#"
        SELECT
            COUNT(r.id) AS total_readings,
            COUNT(DISTINCT m.meter_point_id) AS total_meter_points,
            COUNT(DISTINCT r.meter_id) AS total_meters,
            MIN(r.reading_date) AS earliest_reading,
            MAX(r.reading_date) AS latest_reading
        FROM readings r
        JOIN meters m ON r.meter_id = m.id
        "#,
    )
    .fetch_one(pool)
    .await?;

    let by_type = sqlx::query_as::<_, ReadingTypeCount>(
        r#"
        SELECT reading_type, COUNT(*) AS count
        FROM readings
        GROUP BY reading_type
        ORDER BY reading_type
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(ReadingSummary { totals, by_type })
}
