pub mod flow_file;
pub mod meter;
pub mod meter_point;
pub mod reading;

pub use flow_file::{FlowFile, NewFlowFile};
pub use meter::{Meter, MeterType, SerialNumber};
pub use meter_point::{MeterPoint, Mpan};
pub use reading::{NewReading, Reading, ReadingType, ReadingValue, RegisterId};

/// Rejections raised while constructing domain values from raw text.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid MPAN '{0}': must be exactly 13 digits")]
    InvalidMpan(String),
    #[error("meter serial number cannot be empty")]
    EmptySerial,
    #[error("invalid meter type '{0}': expected D, C or P")]
    InvalidMeterType(String),
    #[error("invalid register id '{0}'")]
    InvalidRegister(String),
    #[error("invalid reading value '{0}'")]
    InvalidReadingValue(String),
    #[error("reading value cannot be negative: {0}")]
    NegativeReadingValue(String),
    #[error("invalid reading type '{0}'")]
    InvalidReadingType(String),
}
