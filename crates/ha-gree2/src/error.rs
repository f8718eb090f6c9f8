//! Integration errors

use ha_core::EntityIdError;
use thiserror::Error;

use crate::device::DeviceError;

#[derive(Debug, Error)]
pub enum GreeError {
    #[error("Invalid gree2 configuration: {0}")]
    InvalidConfig(#[from] serde_json::Error),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("Device {mac} is not connected")]
    DeviceNotReady { mac: String },

    #[error("Unsupported {kind} mode: {mode}")]
    UnsupportedMode { kind: &'static str, mode: String },

    #[error(transparent)]
    InvalidEntityId(#[from] EntityIdError),
}

pub type GreeResult<T> = Result<T, GreeError>;
