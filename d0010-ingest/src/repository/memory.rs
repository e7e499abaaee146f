use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use readings_client::domain::{FlowFile, Meter, MeterPoint, MeterType, Mpan, NewFlowFile, NewReading, Reading, SerialNumber};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{Repository, RepositoryError, Resolved};

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    meter_points: HashMap<Mpan, MeterPoint>,
    meters: HashMap<(i64, SerialNumber), Meter>,
    readings: Vec<Reading>,
    flow_files: HashMap<String, FlowFile>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Mutex-guarded in-process store with the same uniqueness rules as the
/// Postgres schema. Used for tests and as the staging area of dry runs.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    state: Mutex<MemoryState>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn meter_points(&self) -> Vec<MeterPoint> {
        let mut all: Vec<_> = self.lock().meter_points.values().cloned().collect();
        all.sort_by_key(|mp| mp.id);
        all
    }

    pub fn meters(&self) -> Vec<Meter> {
        let mut all: Vec<_> = self.lock().meters.values().cloned().collect();
        all.sort_by_key(|m| m.id);
        all
    }

    pub fn readings(&self) -> Vec<Reading> {
        self.lock().readings.clone()
    }

    pub fn flow_files(&self) -> Vec<FlowFile> {
        let mut all: Vec<_> = self.lock().flow_files.values().cloned().collect();
        all.sort_by_key(|f| f.imported_at);
        all
    }

    pub fn flow_file(&self, filename: &str) -> Option<FlowFile> {
        self.lock().flow_files.get(filename).cloned()
    }
}

#[async_trait::async_trait]
impl Repository for MemoryRepository {
    async fn flow_file_exists(&self, filename: &str) -> Result<bool, RepositoryError> {
        Ok(self.lock().flow_files.contains_key(filename))
    }

    async fn find_meter_point(&self, mpan: &Mpan) -> Result<Option<MeterPoint>, RepositoryError> {
        Ok(self.lock().meter_points.get(mpan).cloned())
    }

    async fn find_meter(
        &self,
        serial: &SerialNumber,
        meter_point: &MeterPoint,
    ) -> Result<Option<Meter>, RepositoryError> {
        Ok(self.lock().meters.get(&(meter_point.id, serial.clone())).cloned())
    }

    async fn get_or_create_meter_point(&self, mpan: &Mpan) -> Result<Resolved<MeterPoint>, RepositoryError> {
        let mut state = self.lock();
        if let Some(existing) = state.meter_points.get(mpan) {
            return Ok(Resolved::existing(existing.clone()));
        }

        let meter_point = MeterPoint {
            id: state.next_id(),
            mpan: mpan.clone(),
            created_at: OffsetDateTime::now_utc(),
        };
        state.meter_points.insert(mpan.clone(), meter_point.clone());
        Ok(Resolved::created(meter_point))
    }

    async fn get_or_create_meter(
        &self,
        serial: &SerialNumber,
        meter_point: &MeterPoint,
        meter_type: MeterType,
    ) -> Result<Resolved<Meter>, RepositoryError> {
        let mut state = self.lock();
        let key = (meter_point.id, serial.clone());
        if let Some(existing) = state.meters.get(&key) {
            return Ok(Resolved::existing(existing.clone()));
        }

        let meter = Meter {
            id: state.next_id(),
            meter_point_id: meter_point.id,
            serial_number: serial.clone(),
            meter_type,
            created_at: OffsetDateTime::now_utc(),
        };
        state.meters.insert(key, meter.clone());
        Ok(Resolved::created(meter))
    }

    async fn insert_reading(&self, reading: &NewReading) -> Result<Reading, RepositoryError> {
        let mut state = self.lock();
        if !state.meters.values().any(|m| m.id == reading.meter_id) {
            return Err(RepositoryError::Storage(format!("unknown meter id {}", reading.meter_id)));
        }

        let stored = Reading {
            id: state.next_id(),
            meter_id: reading.meter_id,
            flow_file_id: reading.flow_file_id,
            register_id: reading.register_id.clone(),
            reading_date: reading.reading_date,
            reading_value: reading.reading_value,
            reading_type: reading.reading_type,
            created_at: OffsetDateTime::now_utc(),
        };
        state.readings.push(stored.clone());
        Ok(stored)
    }

    async fn create_flow_file(&self, flow_file: &NewFlowFile) -> Result<FlowFile, RepositoryError> {
        let mut state = self.lock();
        if state.flow_files.contains_key(&flow_file.filename) {
            return Err(RepositoryError::DuplicateFlowFile(flow_file.filename.clone()));
        }

        let stored = FlowFile {
            id: flow_file.id,
            filename: flow_file.filename.clone(),
            file_reference: flow_file.file_reference.clone(),
            imported_at: OffsetDateTime::now_utc(),
            record_count: flow_file.record_count,
        };
        state.flow_files.insert(stored.filename.clone(), stored.clone());
        Ok(stored)
    }

    async fn discard_readings(&self, flow_file_id: Uuid) -> Result<u64, RepositoryError> {
        let mut state = self.lock();
        let before = state.readings.len();
        state.readings.retain(|r| r.flow_file_id != flow_file_id);
        Ok((before - state.readings.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use readings_client::domain::{ReadingType, ReadingValue};
    use time::macros::datetime;

    fn mpan(s: &str) -> Mpan {
        s.parse().unwrap()
    }

    fn serial(s: &str) -> SerialNumber {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn meter_points_are_idempotent() {
        let repo = MemoryRepository::new();
        let first = repo.get_or_create_meter_point(&mpan("1200023305967")).await.unwrap();
        let second = repo.get_or_create_meter_point(&mpan("1200023305967")).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.entity.id, second.entity.id);
        assert_eq!(repo.meter_points().len(), 1);
    }

    #[tokio::test]
    async fn meters_are_scoped_to_their_meter_point() {
        let repo = MemoryRepository::new();
        let a = repo.get_or_create_meter_point(&mpan("1200023305967")).await.unwrap().entity;
        let b = repo.get_or_create_meter_point(&mpan("1234567890123")).await.unwrap().entity;

        let on_a = repo.get_or_create_meter(&serial("SN1"), &a, MeterType::Standard).await.unwrap();
        let on_b = repo.get_or_create_meter(&serial("SN1"), &b, MeterType::Credit).await.unwrap();
        let again = repo.get_or_create_meter(&serial("SN1"), &a, MeterType::Prepayment).await.unwrap();

        assert!(on_a.created && on_b.created && !again.created);
        assert_ne!(on_a.entity.id, on_b.entity.id);
        assert_eq!(again.entity.meter_type, MeterType::Standard);
        assert_eq!(repo.find_meter(&serial("SN1"), &b).await.unwrap().unwrap().id, on_b.entity.id);
    }

    #[tokio::test]
    async fn duplicate_flow_file_is_rejected() {
        let repo = MemoryRepository::new();
        let new = NewFlowFile {
            id: Uuid::new_v4(),
            filename: "a.uff".into(),
            file_reference: "REF".into(),
            record_count: 0,
        };
        repo.create_flow_file(&new).await.unwrap();
        assert!(repo.flow_file_exists("a.uff").await.unwrap());

        let err = repo
            .create_flow_file(&NewFlowFile { id: Uuid::new_v4(), ..new })
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::DuplicateFlowFile(name) if name == "a.uff"));
    }

    #[tokio::test]
    async fn discard_only_touches_one_import() {
        let repo = MemoryRepository::new();
        let mp = repo.get_or_create_meter_point(&mpan("1200023305967")).await.unwrap().entity;
        let meter = repo.get_or_create_meter(&serial("SN1"), &mp, MeterType::Standard).await.unwrap().entity;
        let (keep, drop) = (Uuid::new_v4(), Uuid::new_v4());

        for flow_file_id in [keep, drop, drop] {
            repo.insert_reading(&NewReading {
                meter_id: meter.id,
                flow_file_id,
                register_id: "S".parse().unwrap(),
                reading_date: datetime!(2024-01-15 00:00:00 UTC),
                reading_value: ReadingValue::from_thousandths(1_000),
                reading_type: ReadingType::Actual,
            })
            .await
            .unwrap();
        }

        assert_eq!(repo.discard_readings(drop).await.unwrap(), 2);
        assert_eq!(repo.readings().len(), 1);
        assert_eq!(repo.readings()[0].flow_file_id, keep);
    }
}
