//! Error types for the panel core.

/// Errors returned by calls to the device API.
///
/// Every failure mode of a device call is normalized into one of these at
/// the [`DeviceApi`](crate::DeviceApi) boundary. The type is `Clone` so the
/// most recent failure can be published to observers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    /// The request could not be delivered or no response arrived.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The device answered with something that is not the expected JSON.
    #[error("Invalid response: {0}")]
    Parse(String),

    /// The device understood the request and refused it.
    #[error("Device rejected request: {0}")]
    Rejected(String),
}

impl From<serde_json::Error> for DeviceError {
    fn from(err: serde_json::Error) -> Self {
        DeviceError::Parse(err.to_string())
    }
}

/// Errors raised by local panel operations before anything is sent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PanelError {
    /// The requested effect is not part of the fetched catalog.
    #[error("Unknown effect '{0}'")]
    UnknownEffect(String),

    /// Failed to parse a configuration document.
    #[error("Invalid configuration: {0}")]
    Config(String),
}
