use thiserror::Error;

/// Per-packet failures. All of these are recoverable: the dispatcher logs
/// and moves on to the next packet, it never unwinds the capture loop.
#[derive(Debug, Error)]
pub enum Error {
    #[error("packet ports {src}/{dst} match neither side of the observed port")]
    UnexpectedPorts { src: u16, dst: u16 },
    #[error("zero payload len")]
    ZeroPayloadLen,
    #[error("parse packet failed: {0}")]
    ParsePacketFailed(&'static str),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
