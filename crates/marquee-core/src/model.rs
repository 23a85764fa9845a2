//! Per-item media attributes

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::types::*;

/// Attribute snapshot of one media item
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MediaAttributes {
    pub media_state: MediaState,
    pub position: f64,
    pub duration: f64,
    pub current_time: f64,
    /// Buffered percentage, 0-100
    pub buffer: f64,
    pub seek_range: Option<SeekRange>,
    pub visual_quality: Option<VisualQuality>,
    pub setup: bool,
    pub started: bool,
    pub preloaded: bool,
    pub play_rejected: bool,
    pub media_type: Option<MediaType>,
    pub levels: Vec<QualityLevel>,
    pub current_level: Option<usize>,
    pub audio_tracks: Vec<AudioTrack>,
    pub current_audio_track: Option<usize>,
}

/// Attribute bag of the item a controller is playing.
///
/// A controller replaces its model whenever its item changes; holders of an
/// old model compare [`MediaModel::id`] against the controller's current one
/// before writing.
#[derive(Debug)]
pub struct MediaModel {
    id: ModelId,
    attrs: Mutex<MediaAttributes>,
}

impl MediaModel {
    pub fn new() -> Self {
        Self {
            id: ModelId::new(),
            attrs: Mutex::new(MediaAttributes::default()),
        }
    }

    /// Fresh model for `item`: position from its start time, duration from its hint
    pub fn for_item(item: &PlaylistItem) -> Self {
        let model = Self::new();
        {
            let mut attrs = model.attrs.lock();
            attrs.position = item.starttime.unwrap_or(0.0);
            attrs.duration = item.duration.unwrap_or(0.0);
        }
        model
    }

    pub fn id(&self) -> ModelId {
        self.id
    }

    pub fn snapshot(&self) -> MediaAttributes {
        self.attrs.lock().clone()
    }

    /// Mutate attributes under the lock
    pub fn update<R>(&self, f: impl FnOnce(&mut MediaAttributes) -> R) -> R {
        f(&mut self.attrs.lock())
    }

    pub fn media_state(&self) -> MediaState {
        self.attrs.lock().media_state
    }

    /// Set the media state, returning the previous one when it changed
    pub fn set_media_state(&self, state: MediaState) -> Option<MediaState> {
        let mut attrs = self.attrs.lock();
        let old = attrs.media_state;
        if old == state {
            return None;
        }
        attrs.media_state = state;
        Some(old)
    }

    pub fn position(&self) -> f64 {
        self.attrs.lock().position
    }

    pub fn duration(&self) -> f64 {
        self.attrs.lock().duration
    }

    pub fn is_setup(&self) -> bool {
        self.attrs.lock().setup
    }

    pub fn set_setup(&self, setup: bool) {
        self.attrs.lock().setup = setup;
    }

    pub fn is_started(&self) -> bool {
        self.attrs.lock().started
    }

    pub fn set_started(&self, started: bool) {
        self.attrs.lock().started = started;
    }

    pub fn is_preloaded(&self) -> bool {
        self.attrs.lock().preloaded
    }

    /// Forget everything tied to the loaded source
    pub fn src_reset(&self) {
        let mut attrs = self.attrs.lock();
        attrs.setup = false;
        attrs.started = false;
        attrs.preloaded = false;
        attrs.visual_quality = None;
        attrs.buffer = 0.0;
        attrs.current_time = 0.0;
    }

    pub fn play_rejected(&self) -> bool {
        self.attrs.lock().play_rejected
    }

    pub fn set_play_rejected(&self, rejected: bool) {
        self.attrs.lock().play_rejected = rejected;
    }
}

impl Default for MediaModel {
    fn default() -> Self {
        Self::new()
    }
}
