use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to open capture device: {0}")]
    DeviceOpen(String),
    #[error("failed to install capture filter: {0}")]
    FilterInstall(String),
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
    #[error(transparent)]
    IoError(#[from] io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
