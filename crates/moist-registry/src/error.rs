use moist_protocol::DeviceId;
use thiserror::Error;

pub type Result<T, E = RegistryError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no such device: {0}")]
    NotFound(DeviceId),
    #[error("snapshot codec error: {0}")]
    Codec(#[from] bincode::Error),
}
