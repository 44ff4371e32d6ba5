pub mod config;
pub mod jitter_buffer;
pub mod slots;

pub use config::{ConcealmentMode, DepthBounds, JitterBufferConfig, JitterBufferConfigBuilder};
pub use jitter_buffer::JitterBuffer;

use derive_builder::UninitializedFieldError;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum BufferError {
    #[error("Element size must be greater than zero.")]
    ZeroElementSize,
    #[error("Packets must be allowed to carry at least one element.")]
    ZeroPacketElements,
    #[error("Minimum length {min_length_ms}ms is greater than maximum length {max_length_ms}ms.")]
    InvalidDepthRange {
        min_length_ms: u64,
        max_length_ms: u64,
    },
    #[error("Maximum length {max_length_ms}ms at clock rate {clock_rate} holds no elements.")]
    ZeroCapacity { clock_rate: u64, max_length_ms: u64 },
    #[error("Missing configuration field {0:?}.")]
    MissingField(String),
    #[error("Destination holds {available} bytes, {required} are needed.")]
    DestinationTooSmall { required: usize, available: usize },
}

impl From<UninitializedFieldError> for BufferError {
    fn from(error: UninitializedFieldError) -> Self {
        BufferError::MissingField(error.field_name().to_string())
    }
}
