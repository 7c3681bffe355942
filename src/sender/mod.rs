mod uniform_sender;
pub mod zmtp;

pub use uniform_sender::{SenderCounter, UniformSenderThread};
