//! Marquee Core - Playback orchestration for Marquee
//!
//! This crate provides the sequencing layer of the player:
//! - Per-item media controllers wrapping pluggable providers
//! - Program-level item transitions with background preloading
//! - Instream ad breaks over a parked primary item
//! - Memoized autoplay capability probing
//! - Caption track selection and background cue loading
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Orchestrator                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │   Autoplay   │  │   Captions   │  │   Instream   │           │
//! │  │    Probe     │  │   Manager    │  │   Adapter    │           │
//! │  └──────────────┘  └──────────────┘  └──────┬───────┘           │
//! │                                             │                   │
//! │                    ┌────────────────────────┘                   │
//! │                    │                                            │
//! │             ┌──────┴──────┐                                     │
//! │             │   Program   │──── background / next media         │
//! │             │ Controller  │                                     │
//! │             └──────┬──────┘                                     │
//! │                    │                                            │
//! │  ┌──────────────┐  │  ┌──────────────┐  ┌──────────────┐        │
//! │  │    Media     │──┴──│   Provider   │  │    Media     │        │
//! │  │  Controller  │     │   Registry   │  │     Pool     │        │
//! │  └──────────────┘     └──────────────┘  └──────────────┘        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod types;
pub mod config;
pub mod cancel;
pub mod events;
pub mod model;
pub mod pool;
pub mod provider;
pub mod media_controller;
pub mod program_controller;
pub mod autoplay;
pub mod captions;
pub mod instream;
pub mod orchestrator;
pub mod simulated;

pub use error::{Error, ErrorKind, PlayRejection, Result};
pub use types::*;
pub use config::{NextUpOffset, PlayerConfig};
pub use cancel::CancelToken;
pub use events::{EventBus, EventEmitter, MediaEvent, PlayerEvent, PlayerEventRecord};
pub use model::{MediaAttributes, MediaModel};
pub use pool::{MediaContainer, MediaElement, MediaPool};
pub use provider::{Provider, ProviderContext, ProviderEvent, ProviderFactory, ProviderRegistry};
pub use media_controller::MediaController;
pub use program_controller::{ElementSource, ProgramController};
pub use autoplay::{AutoplayOptions, AutoplayOutcome, AutoplayProbe, AutoplayTester, DisabledReason};
pub use captions::{CaptionsEvent, CaptionsTrack, CaptionsTrackManager, Cue, TrackParser};
pub use instream::{AdEvent, InstreamAdapter, InstreamOptions, InstreamState};
pub use orchestrator::{Collaborators, Orchestrator};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the player library with default configuration
pub fn init() {
    tracing::info!(version = VERSION, "Marquee Core initialized");
}
