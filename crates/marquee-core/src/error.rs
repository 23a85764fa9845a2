//! Error types for Marquee Core

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for orchestration operations
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classes that decide how an error is surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Fatal for the current item (no source, provider unavailable)
    Setup,
    /// Play refused by the runtime; the user can retry with a gesture
    PlaybackRejected,
    /// Ad playback failure, recovered inside the ad break when possible
    Ad,
    /// Mid-session media fault reported by a provider
    Provider,
    /// Invalid configuration
    Config,
    /// Bug or invariant violation
    Internal,
}

/// Why the runtime refused a play attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayRejection {
    /// Autoplay policy: a user gesture is required
    NotAllowed,
    /// The attempt was interrupted by a new load or pause
    Aborted,
    /// The element cannot play the source
    NotSupported,
    /// Anything else
    Other,
}

/// Orchestration error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Setup errors
    #[error("No media: the playlist item has no playable source")]
    NoMedia,

    #[error("Playlist item {0} not found")]
    ItemNotFound(usize),

    #[error("No suitable provider for source: {0}")]
    NoSuitableProvider(String),

    #[error("Failed to load provider {name}: {reason}")]
    ProviderLoad { name: String, reason: String },

    #[error("Media setup failed: {0}")]
    SetupFailed(String),

    #[error("Media setup error {code}: {message}")]
    MediaSetup { code: u32, message: String },

    #[error("Item transition superseded by a newer request")]
    Superseded,

    // Playback errors
    #[error("Play attempt rejected ({rejection:?}): {message}")]
    PlayRejected {
        rejection: PlayRejection,
        message: String,
    },

    #[error("Playback cancelled")]
    PlaybackCancelled,

    #[error("Media error {code}: {message}")]
    Media { code: u32, message: String },

    // Autoplay
    #[error("Autoplay test was cancelled")]
    AutoplayCancelled,

    // Ad errors
    #[error("Instream not set up")]
    InstreamNotSetup,

    #[error("Ad {index} failed: {message}")]
    AdFailed { index: usize, message: String },

    #[error("Ad break failed: all {count} ads errored")]
    AdQueueExhausted { count: usize },

    #[error("Invalid instream state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a play rejection
    pub fn rejected(rejection: PlayRejection, message: impl Into<String>) -> Self {
        Error::PlayRejected {
            rejection,
            message: message.into(),
        }
    }

    /// Create a provider media error
    pub fn media(code: u32, message: impl Into<String>) -> Self {
        Error::Media {
            code,
            message: message.into(),
        }
    }

    /// Create a setup error raised while preparing media
    pub fn media_setup(code: u32, message: impl Into<String>) -> Self {
        Error::MediaSetup {
            code,
            message: message.into(),
        }
    }

    /// Recast a failure to prepare media as a setup error, keeping its code.
    /// Cancellations pass through untouched.
    pub fn into_setup(self) -> Self {
        match self {
            Error::MediaSetup { .. } => self,
            e if e.is_cancellation() => e,
            e => Error::media_setup(e.code(), e.to_string()),
        }
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NoMedia
            | Error::ItemNotFound(_)
            | Error::NoSuitableProvider(_)
            | Error::ProviderLoad { .. }
            | Error::SetupFailed(_)
            | Error::MediaSetup { .. }
            | Error::Superseded => ErrorKind::Setup,
            Error::PlayRejected { .. } | Error::PlaybackCancelled | Error::AutoplayCancelled => {
                ErrorKind::PlaybackRejected
            }
            Error::Media { .. } => ErrorKind::Provider,
            Error::InstreamNotSetup
            | Error::AdFailed { .. }
            | Error::AdQueueExhausted { .. }
            | Error::InvalidStateTransition { .. } => ErrorKind::Ad,
            Error::InvalidConfig(_) => ErrorKind::Config,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns true if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::PlayRejected { .. }
                | Error::PlaybackCancelled
                | Error::AutoplayCancelled
                | Error::Superseded
                | Error::AdFailed { .. }
        )
    }

    /// True for errors that only mean "someone newer took over"
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            Error::Superseded | Error::PlaybackCancelled | Error::AutoplayCancelled
        )
    }

    /// Numeric code carried by error events
    pub fn code(&self) -> u32 {
        match self {
            Error::NoMedia => 100_001,
            Error::ItemNotFound(_) => 100_002,
            Error::NoSuitableProvider(_) => 100_101,
            Error::ProviderLoad { .. } => 100_102,
            Error::SetupFailed(_) => 100_200,
            Error::MediaSetup { code, .. } => *code,
            Error::Superseded => 100_900,
            Error::PlayRejected { rejection, .. } => match rejection {
                PlayRejection::Other => 303_200,
                PlayRejection::NotAllowed => 303_210,
                PlayRejection::Aborted => 303_220,
                PlayRejection::NotSupported => 303_230,
            },
            Error::PlaybackCancelled => 303_900,
            Error::AutoplayCancelled => 303_910,
            Error::Media { code, .. } => *code,
            Error::InstreamNotSetup => 600_001,
            Error::AdFailed { .. } => 600_100,
            Error::AdQueueExhausted { .. } => 600_200,
            Error::InvalidStateTransition { .. } => 600_300,
            Error::InvalidConfig(_) => 900_001,
            Error::Internal(_) => 900_000,
        }
    }

    /// Returns the error code for event payloads and logs
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::NoMedia => "NO_MEDIA",
            Error::ItemNotFound(_) => "ITEM_NOT_FOUND",
            Error::NoSuitableProvider(_) => "NO_PROVIDER",
            Error::ProviderLoad { .. } => "PROVIDER_LOAD",
            Error::SetupFailed(_) => "SETUP_FAILED",
            Error::MediaSetup { .. } => "MEDIA_SETUP",
            Error::Superseded => "SUPERSEDED",
            Error::PlayRejected { .. } => "PLAY_REJECTED",
            Error::PlaybackCancelled => "PLAYBACK_CANCELLED",
            Error::Media { .. } => "MEDIA",
            Error::AutoplayCancelled => "AUTOPLAY_CANCELLED",
            Error::InstreamNotSetup => "INSTREAM_NOT_SETUP",
            Error::AdFailed { .. } => "AD_FAILED",
            Error::AdQueueExhausted { .. } => "AD_QUEUE_EXHAUSTED",
            Error::InvalidStateTransition { .. } => "INVALID_STATE",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Internal(_) => "INTERNAL",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(Error::NoMedia.kind(), ErrorKind::Setup);
        assert_eq!(
            Error::rejected(PlayRejection::NotAllowed, "gesture").kind(),
            ErrorKind::PlaybackRejected
        );
        assert_eq!(Error::media(224_003, "decode").kind(), ErrorKind::Provider);
        assert_eq!(Error::AdQueueExhausted { count: 2 }.kind(), ErrorKind::Ad);
    }

    #[test]
    fn test_codes() {
        assert_eq!(Error::media(224_003, "decode").code(), 224_003);
        assert_eq!(
            Error::rejected(PlayRejection::NotAllowed, "gesture").code(),
            303_210
        );
        assert!(Error::Superseded.is_cancellation());
        assert!(!Error::NoMedia.is_recoverable());
    }

    #[test]
    fn test_into_setup_keeps_code() {
        let err = Error::SetupFailed("no decoder".to_string()).into_setup();
        assert_eq!(err.code(), 100_200);
        assert_eq!(err.error_code(), "MEDIA_SETUP");
        assert_eq!(Error::media_setup(324_002, "x").into_setup().code(), 324_002);
        assert_eq!(Error::Superseded.into_setup(), Error::Superseded);
    }
}
