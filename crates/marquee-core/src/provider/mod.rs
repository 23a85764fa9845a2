//! Media providers
//!
//! A provider is an engine that loads and renders one family of sources.
//! Controllers drive it through [`Provider`] and receive its notifications
//! through the [`ProviderEventSink`] handed over at construction.

mod registry;

pub use registry::{ProviderEntry, ProviderLoader, ProviderRegistry};

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::pool::{MediaContainer, MediaElement};
use crate::types::*;
use crate::Result;

/// Notifications raised by a provider
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    MediaType(MediaType),
    State(MediaState),
    Meta {
        duration: f64,
        width: Option<u32>,
        height: Option<u32>,
    },
    BufferChange {
        percent: f64,
        position: f64,
        duration: f64,
    },
    Time {
        position: f64,
        duration: f64,
        seek_range: Option<SeekRange>,
    },
    Seek {
        position: f64,
        offset: f64,
    },
    Seeked,
    FirstFrame,
    VisualQuality(VisualQuality),
    Mute(bool),
    Volume(u8),
    Levels {
        levels: Vec<QualityLevel>,
        current: usize,
    },
    LevelsChanged(usize),
    AudioTracks {
        tracks: Vec<AudioTrack>,
        current: usize,
    },
    AudioTrackChanged(usize),
    SubtitlesTracks(Vec<ItemTrack>),
    Complete,
    Error {
        code: u32,
        message: String,
    },
}

/// Receiver of provider notifications
pub trait ProviderEventHandler: Send + Sync {
    fn on_provider_event(&self, event: ProviderEvent);
}

/// Channel from a provider to the controller that owns it.
///
/// Holds a weak reference so a provider never keeps its controller alive.
#[derive(Clone, Default)]
pub struct ProviderEventSink {
    target: Arc<Mutex<Option<Weak<dyn ProviderEventHandler>>>>,
}

impl ProviderEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, handler: Weak<dyn ProviderEventHandler>) {
        *self.target.lock() = Some(handler);
    }

    pub fn unbind(&self) {
        *self.target.lock() = None;
    }

    pub fn is_bound(&self) -> bool {
        self.target
            .lock()
            .as_ref()
            .map_or(false, |w| w.strong_count() > 0)
    }

    /// Forward an event; dropped when nothing is bound
    pub fn emit(&self, event: ProviderEvent) {
        let target = self.target.lock().as_ref().and_then(Weak::upgrade);
        if let Some(handler) = target {
            handler.on_provider_event(event);
        }
    }
}

impl std::fmt::Debug for ProviderEventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderEventSink")
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// What a factory needs to build a provider
#[derive(Debug, Clone)]
pub struct ProviderContext {
    /// Element to render into; `None` for element-less providers (casting)
    pub element: Option<Arc<MediaElement>>,
    pub events: ProviderEventSink,
    pub muted: bool,
    pub volume: u8,
}

/// Playback engine for one family of sources
#[async_trait]
pub trait Provider: Send + Sync {
    /// Registry name, used for reuse decisions
    fn name(&self) -> &str;

    /// Prepare for a new item without loading it
    fn init(&self, _item: &PlaylistItem) {}

    /// Load the item's source
    async fn load(&self, item: &PlaylistItem) -> Result<()>;

    /// Start or resume playback
    async fn play(&self) -> Result<()>;

    /// Fetch enough of the item to start quickly
    fn preload(&self, _item: &PlaylistItem) {}

    fn pause(&self);

    fn stop(&self);

    fn seek(&self, position: f64);

    fn set_mute(&self, muted: bool);

    fn set_volume(&self, volume: u8);

    fn set_playback_rate(&self, _rate: f64) {}

    /// Hook up the media element
    fn attach_media(&self);

    /// Unhook the media element and hand it back
    fn detach_media(&self) -> Option<Arc<MediaElement>>;

    fn set_container(&self, container: Option<Arc<MediaContainer>>);

    fn container(&self) -> Option<Arc<MediaContainer>>;

    fn media_element(&self) -> Option<Arc<MediaElement>>;

    /// Take the element out of its container
    fn remove(&self) {
        if let (Some(container), Some(element)) = (self.container(), self.media_element()) {
            container.remove(&element);
        }
    }

    fn destroy(&self);

    fn set_current_quality(&self, _index: usize) {}

    fn set_current_audio_track(&self, _index: usize) {}
}

/// Builds providers of one kind
pub trait ProviderFactory: Send + Sync {
    fn name(&self) -> &str;

    fn create(&self, context: ProviderContext) -> Result<Arc<dyn Provider>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);

    impl ProviderEventHandler for Counter {
        fn on_provider_event(&self, _event: ProviderEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_sink_forwards_while_bound() {
        let sink = ProviderEventSink::new();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let handler: Arc<dyn ProviderEventHandler> = counter.clone();

        sink.emit(ProviderEvent::Seeked);
        sink.bind(Arc::downgrade(&handler));
        sink.clone().emit(ProviderEvent::Seeked);
        sink.unbind();
        sink.emit(ProviderEvent::Seeked);

        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_sink_does_not_keep_handler_alive() {
        let sink = ProviderEventSink::new();
        let handler: Arc<dyn ProviderEventHandler> = Arc::new(Counter(AtomicUsize::new(0)));
        sink.bind(Arc::downgrade(&handler));
        assert!(sink.is_bound());
        drop(handler);
        assert!(!sink.is_bound());
    }
}
