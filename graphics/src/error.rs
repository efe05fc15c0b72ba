//! Graphics error types.

use std::fmt;

/// Errors that can occur in the graphics runtime.
///
/// Every variant except [`InvalidParameter`](Self::InvalidParameter) and
/// [`Config`](Self::Config) describes a device-level failure. Those are not
/// retried anywhere in the crate: they bubble up to the frame loop and
/// terminate it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// Failed to initialize the graphics system.
    InitializationFailed(String),
    /// Failed to create a resource, heap, list or fence.
    ResourceCreationFailed(String),
    /// A device call failed with a native error code.
    DeviceCall {
        /// Name of the failing call.
        call: &'static str,
        /// Native error code returned by the driver.
        code: i32,
    },
    /// Out of GPU memory.
    OutOfMemory,
    /// The GPU device was lost (removed, hung or reset).
    DeviceLost,
    /// An invalid parameter was provided.
    InvalidParameter(String),
    /// The runtime configuration could not be read or is inconsistent.
    Config(String),
    /// An internal error occurred.
    Internal(String),
}

impl GraphicsError {
    /// Whether the error leaves the device unusable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::InvalidParameter(_) | Self::Config(_))
    }
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitializationFailed(msg) => write!(f, "initialization failed: {msg}"),
            Self::ResourceCreationFailed(msg) => write!(f, "resource creation failed: {msg}"),
            Self::DeviceCall { call, code } => {
                write!(f, "device call {call} failed with code {code:#010x}")
            }
            Self::OutOfMemory => write!(f, "out of GPU memory"),
            Self::DeviceLost => write!(f, "GPU device lost"),
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for GraphicsError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphicsError::OutOfMemory;
        assert_eq!(err.to_string(), "out of GPU memory");

        let err = GraphicsError::InitializationFailed("no GPU found".to_string());
        assert_eq!(err.to_string(), "initialization failed: no GPU found");
    }

    #[test]
    fn test_device_call_display_carries_code() {
        let err = GraphicsError::DeviceCall {
            call: "CreateFence",
            code: 0x887A0005_u32 as i32,
        };
        assert_eq!(
            err.to_string(),
            "device call CreateFence failed with code 0x887a0005"
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(GraphicsError::DeviceLost.is_fatal());
        assert!(GraphicsError::OutOfMemory.is_fatal());
        assert!(!GraphicsError::InvalidParameter("x".into()).is_fatal());
        assert!(!GraphicsError::Config("x".into()).is_fatal());
    }
}
