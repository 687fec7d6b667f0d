use thiserror::Error;

/// Errors that can occur during camera capture operations.
///
/// Every variant is delivered through the same single-slot listener
/// (`CaptureDelegate::on_error`) as a `(code, description, reason)` triple:
/// [`CaptureError::code`], the `Display` text and [`CaptureError::reason`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// An operation was called in a state that does not allow it.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("camera unavailable")]
    CameraUnavailable,

    #[error("camera access denied")]
    AccessDenied,

    #[error("preset not supported: {0}")]
    PresetUnsupported(String),

    #[error("device setup error: {0}")]
    DeviceSetup(String),

    #[error("no capture session")]
    NoCaptureSession,

    #[error("unsupported output mode: {0}")]
    UnsupportedOutputMode(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("encoding failed: {0}")]
    EncodingFailed(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("persistence failed: {0}")]
    PersistenceFailed(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

/// Stable code reported alongside each error on the error channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidState,
    CameraUnavailable,
    AccessDenied,
    PresetUnsupported,
    DeviceSetupError,
    NoCaptureSession,
    UnsupportedOutputMode,
    Configuration,
    Encoding,
    Storage,
    Persistence,
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidState => "invalid-state",
            Self::CameraUnavailable => "camera-unavailable",
            Self::AccessDenied => "access-denied",
            Self::PresetUnsupported => "preset-unsupported",
            Self::DeviceSetupError => "device-setup-error",
            Self::NoCaptureSession => "no-capture-session",
            Self::UnsupportedOutputMode => "unsupported-output-mode",
            Self::Configuration => "configuration",
            Self::Encoding => "encoding",
            Self::Storage => "storage",
            Self::Persistence => "persistence",
            Self::Unknown => "unknown",
        }
    }
}

impl CaptureError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidState(_) => ErrorCode::InvalidState,
            Self::CameraUnavailable => ErrorCode::CameraUnavailable,
            Self::AccessDenied => ErrorCode::AccessDenied,
            Self::PresetUnsupported(_) => ErrorCode::PresetUnsupported,
            Self::DeviceSetup(_) => ErrorCode::DeviceSetupError,
            Self::NoCaptureSession => ErrorCode::NoCaptureSession,
            Self::UnsupportedOutputMode(_) => ErrorCode::UnsupportedOutputMode,
            Self::ConfigurationFailed(_) => ErrorCode::Configuration,
            Self::EncodingFailed(_) => ErrorCode::Encoding,
            Self::StorageError(_) => ErrorCode::Storage,
            Self::PersistenceFailed(_) => ErrorCode::Persistence,
            Self::Unknown(_) => ErrorCode::Unknown,
        }
    }

    /// Human-readable failure reason, suitable for showing next to the description.
    pub fn reason(&self) -> String {
        match self {
            Self::CameraUnavailable => "The device does not have a camera.".into(),
            Self::AccessDenied => {
                "Go to settings and grant access to the camera device to use it.".into()
            }
            Self::NoCaptureSession => "No capture session setup.".into(),
            Self::InvalidState(detail)
            | Self::PresetUnsupported(detail)
            | Self::DeviceSetup(detail)
            | Self::UnsupportedOutputMode(detail)
            | Self::ConfigurationFailed(detail)
            | Self::EncodingFailed(detail)
            | Self::StorageError(detail)
            | Self::PersistenceFailed(detail)
            | Self::Unknown(detail) => detail.clone(),
        }
    }
}
