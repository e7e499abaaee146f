use std::{
    collections::HashSet,
    sync::{Mutex, PoisonError},
};

use readings_client::domain::{FlowFile, Meter, MeterPoint, MeterType, Mpan, NewFlowFile, NewReading, Reading, SerialNumber};
use uuid::Uuid;

use super::{MemoryRepository, Repository, RepositoryError, Resolved};

/// Read-through, write-nowhere view of another repository.
///
/// Lookups go to the wrapped store; anything that would be created is staged
/// in a private [`MemoryRepository`] instead. A dry-run import therefore sees
/// exactly the entities a real import would see and reports the same counts,
/// while the wrapped store is never written.
pub struct DryRunRepository<'a> {
    inner: &'a dyn Repository,
    staged: MemoryRepository,
    staged_mpans: Mutex<HashSet<Mpan>>,
}

impl<'a> DryRunRepository<'a> {
    pub fn new(inner: &'a dyn Repository) -> Self {
        Self {
            inner,
            staged: MemoryRepository::new(),
            staged_mpans: Mutex::new(HashSet::new()),
        }
    }

    /// Entities that would have been written.
    pub fn staged(&self) -> &MemoryRepository {
        &self.staged
    }

    fn is_staged(&self, meter_point: &MeterPoint) -> bool {
        self.staged_mpans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&meter_point.mpan)
    }
}

#[async_trait::async_trait]
impl Repository for DryRunRepository<'_> {
    async fn flow_file_exists(&self, filename: &str) -> Result<bool, RepositoryError> {
        if self.staged.flow_file_exists(filename).await? {
            return Ok(true);
        }
        self.inner.flow_file_exists(filename).await
    }

    async fn find_meter_point(&self, mpan: &Mpan) -> Result<Option<MeterPoint>, RepositoryError> {
        match self.inner.find_meter_point(mpan).await? {
            Some(mp) => Ok(Some(mp)),
            None => self.staged.find_meter_point(mpan).await,
        }
    }

    async fn find_meter(
        &self,
        serial: &SerialNumber,
        meter_point: &MeterPoint,
    ) -> Result<Option<Meter>, RepositoryError> {
        if self.is_staged(meter_point) {
            self.staged.find_meter(serial, meter_point).await
        } else {
            match self.inner.find_meter(serial, meter_point).await? {
                Some(meter) => Ok(Some(meter)),
                None => self.staged.find_meter(serial, meter_point).await,
            }
        }
    }

    async fn get_or_create_meter_point(&self, mpan: &Mpan) -> Result<Resolved<MeterPoint>, RepositoryError> {
        if let Some(existing) = self.inner.find_meter_point(mpan).await? {
            return Ok(Resolved::existing(existing));
        }

        let resolved = self.staged.get_or_create_meter_point(mpan).await?;
        self.staged_mpans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(mpan.clone());
        Ok(resolved)
    }

    async fn get_or_create_meter(
        &self,
        serial: &SerialNumber,
        meter_point: &MeterPoint,
        meter_type: MeterType,
    ) -> Result<Resolved<Meter>, RepositoryError> {
        if !self.is_staged(meter_point) {
            if let Some(existing) = self.inner.find_meter(serial, meter_point).await? {
                return Ok(Resolved::existing(existing));
            }
        }
        self.staged.get_or_create_meter(serial, meter_point, meter_type).await
    }

    async fn insert_reading(&self, reading: &NewReading) -> Result<Reading, RepositoryError> {
        // Not staged: meters found in the wrapped store are unknown to the
        // staging area.
        Ok(Reading {
            id: 0,
            meter_id: reading.meter_id,
            flow_file_id: reading.flow_file_id,
            register_id: reading.register_id.clone(),
            reading_date: reading.reading_date,
            reading_value: reading.reading_value,
            reading_type: reading.reading_type,
            created_at: time::OffsetDateTime::now_utc(),
        })
    }

    async fn create_flow_file(&self, flow_file: &NewFlowFile) -> Result<FlowFile, RepositoryError> {
        if self.inner.flow_file_exists(&flow_file.filename).await? {
            return Err(RepositoryError::DuplicateFlowFile(flow_file.filename.clone()));
        }
        self.staged.create_flow_file(flow_file).await
    }

    async fn discard_readings(&self, _flow_file_id: Uuid) -> Result<u64, RepositoryError> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mpan(s: &str) -> Mpan {
        s.parse().unwrap()
    }

    fn serial(s: &str) -> SerialNumber {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn existing_entities_come_from_the_wrapped_store() {
        let real = MemoryRepository::new();
        let mp = real.get_or_create_meter_point(&mpan("1200023305967")).await.unwrap().entity;
        let meter = real.get_or_create_meter(&serial("SN1"), &mp, MeterType::Standard).await.unwrap().entity;

        let dry = DryRunRepository::new(&real);
        let seen_mp = dry.get_or_create_meter_point(&mpan("1200023305967")).await.unwrap();
        let seen_meter = dry.get_or_create_meter(&serial("SN1"), &seen_mp.entity, MeterType::Standard).await.unwrap();

        assert!(!seen_mp.created);
        assert!(!seen_meter.created);
        assert_eq!(seen_meter.entity.id, meter.id);
    }

    #[tokio::test]
    async fn new_entities_are_staged_not_written() {
        let real = MemoryRepository::new();
        let dry = DryRunRepository::new(&real);

        let mp = dry.get_or_create_meter_point(&mpan("1200023305967")).await.unwrap();
        let again = dry.get_or_create_meter_point(&mpan("1200023305967")).await.unwrap();
        let meter = dry.get_or_create_meter(&serial("SN1"), &mp.entity, MeterType::Credit).await.unwrap();
        dry.create_flow_file(&NewFlowFile {
            id: Uuid::new_v4(),
            filename: "a.uff".into(),
            file_reference: String::new(),
            record_count: 0,
        })
        .await
        .unwrap();

        assert!(mp.created && !again.created && meter.created);
        assert!(dry.flow_file_exists("a.uff").await.unwrap());
        assert_eq!(dry.staged().meter_points().len(), 1);
        assert!(real.meter_points().is_empty());
        assert!(real.meters().is_empty());
        assert!(!real.flow_file_exists("a.uff").await.unwrap());
    }

    #[tokio::test]
    async fn staged_meter_point_ids_never_match_real_meters() {
        let real = MemoryRepository::new();
        // Real meter point id 1 with a meter "SN1".
        let real_mp = real.get_or_create_meter_point(&mpan("1200023305967")).await.unwrap().entity;
        real.get_or_create_meter(&serial("SN1"), &real_mp, MeterType::Standard).await.unwrap();

        let dry = DryRunRepository::new(&real);
        // Staged meter point also gets id 1 from its own sequence.
        let staged_mp = dry.get_or_create_meter_point(&mpan("1234567890123")).await.unwrap().entity;
        assert_eq!(staged_mp.id, real_mp.id);

        let meter = dry.get_or_create_meter(&serial("SN1"), &staged_mp, MeterType::Standard).await.unwrap();
        assert!(meter.created);
    }
}
