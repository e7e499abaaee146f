use readings_client::domain::{Meter, MeterPoint};

use crate::parse::{RecordError, RecordErrorKind};

/// Data-free view of [`ParseContext`], for logging and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    NoContext,
    HasMeterPoint,
    HasMeterPointAndMeter,
}

/// Current meter point / meter for one file.
///
/// D0010 child records refer to their parents only by position, so the
/// importer threads this value through the file in line order. A fresh value
/// is created for every file.
#[derive(Debug, Clone, Default)]
pub enum ParseContext {
    #[default]
    NoContext,
    HasMeterPoint(MeterPoint),
    HasMeterPointAndMeter(MeterPoint, Meter),
}

impl ParseContext {
    pub fn state(&self) -> ContextState {
        match self {
            Self::NoContext => ContextState::NoContext,
            Self::HasMeterPoint(_) => ContextState::HasMeterPoint,
            Self::HasMeterPointAndMeter(..) => ContextState::HasMeterPointAndMeter,
        }
    }

    pub fn meter_point(&self) -> Option<&MeterPoint> {
        match self {
            Self::NoContext => None,
            Self::HasMeterPoint(mp) | Self::HasMeterPointAndMeter(mp, _) => Some(mp),
        }
    }

    pub fn meter(&self) -> Option<&Meter> {
        match self {
            Self::HasMeterPointAndMeter(_, meter) => Some(meter),
            _ => None,
        }
    }

    /// Forget everything. Used when a meter-point record starts, so a failed
    /// one leaves its children orphaned rather than attached to the previous
    /// meter point.
    pub fn reset(&mut self) {
        *self = Self::NoContext;
    }

    /// A new meter point always supersedes the previous context.
    pub fn enter_meter_point(&mut self, meter_point: MeterPoint) {
        *self = Self::HasMeterPoint(meter_point);
    }

    /// Drop the current meter but keep the meter point.
    pub fn leave_meter(&mut self) {
        *self = match std::mem::take(self) {
            Self::HasMeterPoint(mp) | Self::HasMeterPointAndMeter(mp, _) => Self::HasMeterPoint(mp),
            Self::NoContext => Self::NoContext,
        };
    }

    /// Make `meter` current. Ignored without a current meter point; callers
    /// check with [`require_meter_point`](Self::require_meter_point) first.
    pub fn enter_meter(&mut self, meter: Meter) {
        match std::mem::take(self) {
            Self::HasMeterPoint(mp) | Self::HasMeterPointAndMeter(mp, _) => {
                *self = Self::HasMeterPointAndMeter(mp, meter);
            }
            Self::NoContext => {}
        }
    }

    pub fn require_meter_point(&self, line: u64) -> Result<&MeterPoint, RecordError> {
        self.meter_point().ok_or_else(|| {
            RecordError::new(
                line,
                RecordErrorKind::OrphanMeter,
                "meter record without a preceding meter point (026) record",
            )
        })
    }

    pub fn require_meter(&self, line: u64) -> Result<&Meter, RecordError> {
        self.meter().ok_or_else(|| {
            RecordError::new(
                line,
                RecordErrorKind::OrphanReading,
                "reading record without a preceding meter point (026) and meter (028) record",
            )
        })
    }
}
