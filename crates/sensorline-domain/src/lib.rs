pub mod decoder;
pub mod error;
pub mod reading;
pub mod sink;

pub use decoder::Decoder;
pub use error::{DecodeError, SinkError};
pub use reading::SensorReading;
pub use sink::ReadingSink;

#[cfg(any(test, feature = "testing"))]
pub use sink::MockReadingSink;
