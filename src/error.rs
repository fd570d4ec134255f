use std::time::Duration;

/// # Explanation
/// Every fault the sensor stack can produce, from the I2C transfer level up
/// to the session handshake. The lower layers (bus, framer, codec) report
/// what they saw; the session manager maps library faults into this taxonomy
/// and the supervisor is the only place that decides how to recover.
#[derive(Debug, thiserror::Error)]
pub enum ImuError {
    /// No complete frame arrived within the polling window.
    #[error("no frame within {0:?}")]
    Timeout(Duration),

    /// OS-level transport fault (device open, address bind or transfer).
    #[error("i2c bus fault: {0}")]
    Bus(String),

    #[error("short read: expected {expected} octets, got {got}")]
    ShortRead { expected: usize, got: usize },

    #[error("short write: expected {expected} octets, got {got}")]
    ShortWrite { expected: usize, got: usize },

    /// The frame header advertised a length below the header size.
    #[error("invalid frame header (length {0})")]
    InvalidHeader(u16),

    /// The frame header advertised a length above the transfer limit.
    #[error("oversize frame ({0} octets)")]
    OversizeFrame(usize),

    /// A protocol rule was violated below the report layer.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A malformed payload at the report layer; recoverable by re-enabling.
    #[error("communication fault: {0}")]
    Comm(String),

    /// The hub announced an autonomous reset; reports must be re-enabled.
    #[error("sensor announced a reset")]
    SensorReset,

    /// The product id handshake never completed.
    #[error("product id handshake failed")]
    ProductId,
}
