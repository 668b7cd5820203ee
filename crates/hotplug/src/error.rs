//! Error types for the hotplug library

use thiserror::Error;

/// Errors surfaced by the hotplug manager and its backends
#[derive(Debug, Error)]
pub enum HotplugError {
    /// `start` was called with an empty filter list
    #[error("filter list is empty")]
    EmptyFilterSet,

    /// The enumeration backend refused a watch registration
    #[error("watch registration failed: {0}")]
    Registration(String),

    /// The enumeration backend failed to list attached devices
    #[error("device enumeration failed: {0}")]
    Enumeration(String),

    /// The manager has been shut down and cannot be restarted
    #[error("manager has been shut down")]
    ShutDown,

    /// Error from the underlying USB context
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),
}

/// Result type alias for hotplug operations
pub type Result<T> = std::result::Result<T, HotplugError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HotplugError::EmptyFilterSet;
        assert_eq!(err.to_string(), "filter list is empty");

        let err = HotplugError::Registration("no kernel resources".to_string());
        assert_eq!(err.to_string(), "watch registration failed: no kernel resources");

        let err = HotplugError::Enumeration("bus reset in progress".to_string());
        assert_eq!(err.to_string(), "device enumeration failed: bus reset in progress");

        let err = HotplugError::ShutDown;
        assert_eq!(err.to_string(), "manager has been shut down");
    }

    #[test]
    fn test_usb_error_conversion() {
        let err: HotplugError = rusb::Error::NoDevice.into();
        assert!(matches!(err, HotplugError::Usb(_)));
        assert!(err.to_string().starts_with("USB error:"));
    }
}
