use anyhow::Result;
use sqlx::PgPool;

/// DDL for the readings store. Every statement is idempotent so `migrate`
/// can run on each service start.
///
/// Concurrent importers rely on the unique constraints for get-or-create.
/// `readings.flow_file_id` has no foreign key: the `flow_files` row is only
/// written once the import finishes.
pub const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS flow_files (
        id             UUID PRIMARY KEY,
        filename       TEXT NOT NULL UNIQUE,
        file_reference TEXT NOT NULL DEFAULT '',
        imported_at    TIMESTAMPTZ NOT NULL DEFAULT now(),
        record_count   BIGINT NOT NULL DEFAULT 0 CHECK (record_count >= 0)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS meter_points (
        id         BIGSERIAL PRIMARY KEY,
        mpan       VARCHAR(13) NOT NULL UNIQUE CHECK (mpan ~ '^[0-9]{13}$'),
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS meters (
        id             BIGSERIAL PRIMARY KEY,
        meter_point_id BIGINT NOT NULL REFERENCES meter_points (id) ON DELETE CASCADE,
        serial_number  TEXT NOT NULL CHECK (length(btrim(serial_number)) > 0),
        meter_type     VARCHAR(1) NOT NULL CHECK (meter_type IN ('D', 'C', 'P')),
        created_at     TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (meter_point_id, serial_number)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS readings (
        id            BIGSERIAL PRIMARY KEY,
        meter_id      BIGINT NOT NULL REFERENCES meters (id) ON DELETE CASCADE,
        flow_file_id  UUID NOT NULL,
        register_id   VARCHAR(2) NOT NULL,
        reading_date  TIMESTAMPTZ NOT NULL,
        reading_value NUMERIC(12, 3) NOT NULL CHECK (reading_value >= 0),
        reading_type  VARCHAR(10) NOT NULL DEFAULT 'ACTUAL'
            CHECK (reading_type IN ('ACTUAL', 'CUSTOMER', 'ESTIMATED')),
        created_at    TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_meter_serial ON meters (serial_number)",
    "CREATE INDEX IF NOT EXISTS idx_reading_date ON readings (reading_date)",
    "CREATE INDEX IF NOT EXISTS idx_reading_meter_date ON readings (meter_id, reading_date)",
    "CREATE INDEX IF NOT EXISTS idx_reading_flow_file ON readings (flow_file_id)",
];

/// Create tables and indexes if they do not exist yet.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
