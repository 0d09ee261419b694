use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PilotError {
    #[error("Connect error: {0}")]
    Connect(String),

    #[error("Device not ready after {attempts} attempts")]
    DeviceNotReady { attempts: u32 },

    #[error("Surface not connected")]
    NotConnected,

    #[error("Invalid `{field}`: {message}")]
    Validation { field: String, message: String },

    #[error("Unknown key: {0}")]
    UnknownKey(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Device bridge error: {0}")]
    Device(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Decision service error: {0}")]
    DecisionService(String),

    #[error("SSE parsing error: {0}")]
    SseParsing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl PilotError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Recover an owned error from the result of a shared connect attempt.
    /// The last holder gets the original; everyone else gets an equivalent copy.
    pub fn from_shared(err: Arc<PilotError>) -> Self {
        match Arc::try_unwrap(err) {
            Ok(owned) => owned,
            Err(shared) => match shared.as_ref() {
                Self::Connect(msg) => Self::Connect(msg.clone()),
                Self::DeviceNotReady { attempts } => Self::DeviceNotReady { attempts: *attempts },
                Self::NotConnected => Self::NotConnected,
                Self::Capture(msg) => Self::Capture(msg.clone()),
                Self::Protocol(msg) => Self::Protocol(msg.clone()),
                Self::Device(msg) => Self::Device(msg.clone()),
                other => Self::Connect(other.to_string()),
            },
        }
    }
}

impl serde::Serialize for PilotError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type PilotResult<T> = Result<T, PilotError>;
