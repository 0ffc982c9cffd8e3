//! # Error Module
//!
//! Fatal errors surfaced by the tuner core. Estimation degeneracy (silence,
//! noise) is never an error; it is reported as a zero-confidence estimate.
//! Mid-stream faults do not come through here either: they end the capture
//! thread and are reported as [`EngineEvent::Fault`](crate::engine::EngineEvent).

/// Errors returned from configuration validation and [`TunerEngine::start`].
///
/// [`TunerEngine::start`]: crate::engine::TunerEngine::start
#[derive(Debug, thiserror::Error)]
pub enum TunerError {
    /// A configuration value is out of its valid range.
    #[error("invalid configuration: {field} {reason}")]
    InvalidConfig {
        /// Name of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The host has no default input device.
    #[error("no input device available")]
    NoInputDevice,

    /// A named input device could not be found.
    #[error("input device not found: {name}")]
    DeviceNotFound {
        /// Name that was requested.
        name: String,
    },

    /// The device offers no configuration usable for mono analysis at the requested rate.
    #[error("no supported input configuration for {sample_rate} Hz: {reason}")]
    UnsupportedStreamConfig {
        /// Requested sample rate.
        sample_rate: u32,
        /// What was missing.
        reason: String,
    },

    /// An error from the audio backend (cpal).
    #[error("audio backend error: {0}")]
    Backend(String),

    /// The capture thread could not be spawned.
    #[error("failed to spawn capture thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// The capture thread ended before it reported whether the stream opened.
    #[error("capture thread exited before the stream was opened")]
    CaptureThreadExited,
}

impl TunerError {
    /// Creates an [`TunerError::InvalidConfig`] for `field`.
    pub fn invalid_config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}

impl From<cpal::DevicesError> for TunerError {
    fn from(err: cpal::DevicesError) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<cpal::DeviceNameError> for TunerError {
    fn from(err: cpal::DeviceNameError) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<cpal::SupportedStreamConfigsError> for TunerError {
    fn from(err: cpal::SupportedStreamConfigsError) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<cpal::BuildStreamError> for TunerError {
    fn from(err: cpal::BuildStreamError) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<cpal::PlayStreamError> for TunerError {
    fn from(err: cpal::PlayStreamError) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<cpal::PauseStreamError> for TunerError {
    fn from(err: cpal::PauseStreamError) -> Self {
        Self::Backend(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_names_the_field() {
        let err = TunerError::invalid_config("block_size", "must be at least 64");
        assert_eq!(
            err.to_string(),
            "invalid configuration: block_size must be at least 64"
        );
    }

    #[test]
    fn device_not_found_display() {
        let err = TunerError::DeviceNotFound {
            name: "USB Mic".to_string(),
        };
        assert_eq!(err.to_string(), "input device not found: USB Mic");
    }
}
