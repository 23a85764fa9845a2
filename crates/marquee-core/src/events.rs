//! Event plumbing
//!
//! Every controller owns one [`EventBus`]. Listeners are called synchronously
//! in registration order; `subscribe()` hands out channel receivers for
//! consumers that prefer to await events. Provider events are parked in an
//! [`EventQueue`] while a controller is detached or backgrounded.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::trace;
use uuid::Uuid;

use crate::instream::AdEvent;
use crate::types::*;

/// Handle returned by [`EventBus::on`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct BusInner<E> {
    next_id: u64,
    listeners: Vec<(ListenerId, Listener<E>)>,
    subscribers: Vec<mpsc::UnboundedSender<E>>,
}

/// Synchronous fan-out of events of type `E`
pub struct EventBus<E> {
    inner: Mutex<BusInner<E>>,
}

impl<E: Clone + Send + 'static> EventBus<E> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BusInner {
                next_id: 0,
                listeners: Vec::new(),
                subscribers: Vec::new(),
            }),
        }
    }

    /// Register a listener
    pub fn on<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = ListenerId(inner.next_id);
        inner.listeners.push((id, Arc::new(f)));
        id
    }

    /// Remove one listener
    pub fn off(&self, id: ListenerId) {
        self.inner.lock().listeners.retain(|(lid, _)| *lid != id);
    }

    /// Remove every listener and subscriber
    pub fn off_all(&self) {
        let mut inner = self.inner.lock();
        inner.listeners.clear();
        inner.subscribers.clear();
    }

    /// Receive events through a channel
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<E> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().subscribers.push(tx);
        rx
    }

    pub fn listener_count(&self) -> usize {
        let inner = self.inner.lock();
        inner.listeners.len() + inner.subscribers.len()
    }

    /// Deliver an event to all listeners, then to subscribers.
    ///
    /// The lock is released before listeners run, so a listener may emit or
    /// (un)register on the same bus.
    pub fn emit(&self, event: E) {
        let listeners: Vec<Listener<E>> = {
            let inner = self.inner.lock();
            inner.listeners.iter().map(|(_, l)| l.clone()).collect()
        };
        for listener in listeners {
            listener(&event);
        }
        let mut inner = self.inner.lock();
        inner
            .subscribers
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl<E: Clone + Send + 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// FIFO of events held back while their receiver is not ready
pub struct EventQueue<E> {
    queue: Mutex<VecDeque<E>>,
}

impl<E> EventQueue<E> {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push(&self, event: E) {
        self.queue.lock().push_back(event);
    }

    /// Pop the oldest queued event
    pub fn pop(&self) -> Option<E> {
        self.queue.lock().pop_front()
    }

    pub fn clear(&self) {
        self.queue.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Events emitted by a MediaController
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    PlayAttempt { reason: PlayReason },
    PlayAttemptFailed { reason: PlayReason, code: u32, message: String },
    MediaType { media_type: MediaType },
    State { old: MediaState, new: MediaState },
    Meta { duration: f64, width: Option<u32>, height: Option<u32> },
    BufferChange { percent: f64, position: f64, duration: f64 },
    Time { position: f64, duration: f64 },
    Seek { position: f64, offset: f64 },
    Seeked,
    FirstFrame,
    VisualQuality(VisualQuality),
    Mute { muted: bool },
    Volume { volume: u8 },
    Levels { levels: Vec<QualityLevel>, current: usize },
    LevelsChanged { current: usize },
    AudioTracks { tracks: Vec<AudioTrack>, current: usize },
    AudioTrackChanged { current: usize },
    SubtitlesTracks { tracks: Vec<ItemTrack> },
    BeforeComplete,
    Complete,
    MediaError { code: u32, message: String },
    SetupError { code: u32, message: String },
}

/// Events delivered to the player facade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlayerEvent {
    /// Playlist accepted
    PlaylistLoaded { count: usize },

    /// A playlist item became current
    PlaylistItem { index: usize, title: String },

    /// Player state change
    State {
        old: PlayerState,
        new: PlayerState,
    },

    PlayAttempt { reason: PlayReason },

    PlayAttemptFailed {
        reason: PlayReason,
        code: u32,
        message: String,
    },

    Pause { reason: PauseReason },

    Time { position: f64, duration: f64 },

    Buffer { percent: f64 },

    Seek { position: f64, offset: f64 },

    Seeked,

    FirstFrame,

    Meta { duration: f64 },

    MediaType { media_type: MediaType },

    Mute { muted: bool },

    Volume { volume: u8 },

    VisualQuality { quality: VisualQuality },

    Levels { levels: Vec<QualityLevel>, current: usize },

    AudioTracks { tracks: Vec<AudioTrack>, current: usize },

    /// Captions menu contents
    CaptionsList { tracks: Vec<String>, current: usize },

    CaptionsChanged { current: usize },

    /// The next item started preloading in the background
    NextUp { index: usize },

    BeforeComplete,

    Complete,

    PlaylistComplete,

    /// Autoplay probe settled
    Autostart { muted: bool },

    AutostartNotAllowed { reason: String },

    Ad { ad: AdEvent },

    CastStarted,

    CastStopped,

    SetupError { code: u32, message: String },

    Error { code: u32, message: String },

    Warning { code: u32, message: String },
}

/// Facade event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerEventRecord {
    /// Unique event ID
    pub id: Uuid,
    /// Timestamp
    pub timestamp: DateTime<Utc>,
    /// Sequence number
    pub sequence: u64,
    /// The event
    #[serde(flatten)]
    pub event: PlayerEvent,
}

/// Stamps facade events and keeps a bounded history
pub struct EventEmitter {
    sequence: AtomicU64,
    history: Mutex<VecDeque<PlayerEventRecord>>,
    max_history: usize,
    bus: EventBus<PlayerEventRecord>,
}

impl EventEmitter {
    pub fn new(max_history: usize) -> Self {
        Self {
            sequence: AtomicU64::new(0),
            history: Mutex::new(VecDeque::new()),
            max_history,
            bus: EventBus::new(),
        }
    }

    /// Stamp and deliver an event
    pub fn emit(&self, event: PlayerEvent) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let record = PlayerEventRecord {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            sequence,
            event,
        };
        trace!(sequence, event = ?record.event, "Player event");

        {
            let mut history = self.history.lock();
            history.push_back(record.clone());
            while history.len() > self.max_history {
                history.pop_front();
            }
        }
        self.bus.emit(record);
    }

    pub fn bus(&self) -> &EventBus<PlayerEventRecord> {
        &self.bus
    }

    /// Recorded events, oldest first
    pub fn history(&self) -> Vec<PlayerEventRecord> {
        self.history.lock().iter().cloned().collect()
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(10_000)
    }
}
