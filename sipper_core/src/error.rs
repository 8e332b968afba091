use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SipError {
    /// Invalid construction parameters; the engine is not created.
    #[error("configuration error: {0}")]
    Config(String),
    /// A tick's sensor read failed; the tick is skipped.
    #[error("sensor read error: {0}")]
    SensorRead(String),
    #[error("timeout waiting for sensor")]
    Timeout,
    /// A sip handler or signal sink failed; the loop keeps ticking.
    #[error("handler error: {0}")]
    Callback(String),
    #[error("invalid state: {0}")]
    State(String),
    #[error("io error: {0}")]
    Io(String),
}
