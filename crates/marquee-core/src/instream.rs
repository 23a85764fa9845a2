//! Ad breaks layered over the primary program
//!
//! The adapter runs ads through a second [`ProgramController`] bound to the
//! pool's ad element. The primary controller is parked in the background for
//! the duration of the break and restored on [`InstreamAdapter::destroy`].

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::config::DEFAULT_NEXTUP_LEAD;
use crate::error::{Error, ErrorKind, Result};
use crate::events::{EventBus, MediaEvent};
use crate::media_controller::MediaController;
use crate::program_controller::{ElementSource, ProgramController};
use crate::types::*;

/// Earliest ad position at which the primary may start preloading
pub const AD_PRELOAD_MIN_POSITION: f64 = 2.0;

/// Ad position at which the primary starts preloading its next item.
///
/// Counted back from the skip offset when the ad has one, so the primary is
/// ready by the time the viewer can skip.
pub fn primary_preload_point(skipoffset: Option<f64>, duration: f64) -> f64 {
    let end = skipoffset.filter(|s| *s > 0.0).unwrap_or(duration);
    (end - DEFAULT_NEXTUP_LEAD).max(AD_PRELOAD_MIN_POSITION)
}

/// Ad break state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstreamState {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Complete,
    Error,
    Destroyed,
}

impl InstreamState {
    /// Check if transition to target state is valid
    pub fn can_transition_to(&self, target: InstreamState) -> bool {
        use InstreamState::*;
        matches!(
            (self, target),
            // From Idle
            (Idle, Loading) | (Idle, Destroyed) |
            // From Loading (a failed ad moves straight on to the next one)
            (Loading, Loading) | (Loading, Playing) | (Loading, Paused) | (Loading, Error) | (Loading, Destroyed) |
            // From Playing
            (Playing, Paused) | (Playing, Complete) | (Playing, Error) | (Playing, Loading) | (Playing, Destroyed) |
            // From Paused
            (Paused, Playing) | (Paused, Complete) | (Paused, Error) | (Paused, Loading) | (Paused, Destroyed) |
            // From Complete
            (Complete, Loading) | (Complete, Destroyed) |
            // From Error
            (Error, Loading) | (Error, Destroyed)
        )
    }
}

impl std::fmt::Display for InstreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstreamState::Idle => write!(f, "idle"),
            InstreamState::Loading => write!(f, "loading"),
            InstreamState::Playing => write!(f, "playing"),
            InstreamState::Paused => write!(f, "paused"),
            InstreamState::Complete => write!(f, "complete"),
            InstreamState::Error => write!(f, "error"),
            InstreamState::Destroyed => write!(f, "destroyed"),
        }
    }
}

/// Ad-specific events, kept apart from primary playback events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "ad_event", rename_all = "snake_case")]
pub enum AdEvent {
    BreakStart {
        count: usize,
    },
    Item {
        index: usize,
        title: String,
        skipoffset: Option<f64>,
    },
    State {
        old: InstreamState,
        new: InstreamState,
    },
    Play {
        index: usize,
    },
    Pause {
        index: usize,
    },
    Time {
        index: usize,
        position: f64,
        duration: f64,
    },
    Complete {
        index: usize,
    },
    Skipped {
        index: usize,
    },
    Error {
        index: usize,
        code: u32,
        message: String,
    },
    /// Every ad of the break failed
    BreakFailed {
        count: usize,
        code: u32,
    },
    BreakEnd,
}

/// Per-ad presentation options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstreamOptions {
    /// Seconds before the ad may be skipped; the item's own value wins
    pub skipoffset: Option<f64>,
    /// Ad tag the ad came from
    pub tag: Option<String>,
}

struct AdapterState {
    state: InstreamState,
    initialized: bool,
    destroyed: bool,
    queue: Vec<PlaylistItem>,
    options: Vec<InstreamOptions>,
    index: usize,
    no_resume: bool,
    /// Primary had finished (or was finishing) when the break began
    primary_completed: bool,
    /// Primary was playing or buffering when the break began
    primary_playing: bool,
    position: f64,
    skipoffset: Option<f64>,
    preloaded_primary: bool,
}

/// Runs an ad break and guarantees the primary resumes afterwards
pub struct InstreamAdapter {
    this: Weak<InstreamAdapter>,
    primary: Arc<ProgramController>,
    ads: Arc<ProgramController>,
    events: EventBus<AdEvent>,
    state: Mutex<AdapterState>,
}

impl InstreamAdapter {
    pub fn new(primary: Arc<ProgramController>) -> Arc<Self> {
        let ads = ProgramController::new(primary.registry().clone(), primary.pool().clone(), ElementSource::Ad);
        let adapter = Arc::new_cyclic(|this: &Weak<InstreamAdapter>| Self {
            this: this.clone(),
            primary,
            ads,
            events: EventBus::new(),
            state: Mutex::new(AdapterState {
                state: InstreamState::Idle,
                initialized: false,
                destroyed: false,
                queue: Vec::new(),
                options: Vec::new(),
                index: 0,
                no_resume: false,
                primary_completed: false,
                primary_playing: false,
                position: 0.0,
                skipoffset: None,
                preloaded_primary: false,
            }),
        });
        let weak = adapter.this.clone();
        adapter.ads.events().on(move |event| {
            if let Some(adapter) = weak.upgrade() {
                adapter.handle_ad_event(event);
            }
        });
        adapter
    }

    pub fn events(&self) -> &EventBus<AdEvent> {
        &self.events
    }

    pub fn state(&self) -> InstreamState {
        self.state.lock().state
    }

    /// Index of the ad in the current queue
    pub fn index(&self) -> usize {
        self.state.lock().index
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.lock().destroyed
    }

    /// Controller playing the current ad
    pub fn ad_controller(&self) -> Option<Arc<MediaController>> {
        self.ads.active()
    }

    /// Keep the primary where it is when the break ends
    pub fn set_no_resume(&self, no_resume: bool) {
        self.state.lock().no_resume = no_resume;
    }

    pub fn no_resume(&self) -> bool {
        self.state.lock().no_resume
    }

    /// The ad has played past its skip offset
    pub fn is_skippable(&self) -> bool {
        let state = self.state.lock();
        state.skipoffset.map_or(false, |offset| state.position >= offset)
    }

    fn transition(&self, new: InstreamState) -> Result<()> {
        let old = {
            let mut state = self.state.lock();
            let old = state.state;
            if old == new && new != InstreamState::Loading {
                return Ok(());
            }
            if !old.can_transition_to(new) {
                return Err(Error::InvalidStateTransition {
                    from: old.to_string(),
                    to: new.to_string(),
                });
            }
            state.state = new;
            old
        };
        debug!(from = %old, to = %new, "Instream state transition");
        self.events.emit(AdEvent::State { old, new });
        Ok(())
    }

    /// Park the primary and take over its container
    #[instrument(skip(self))]
    pub fn init(&self) -> Result<()> {
        {
            let state = self.state.lock();
            if state.initialized || state.destroyed {
                return Err(Error::InvalidStateTransition {
                    from: state.state.to_string(),
                    to: "init".to_string(),
                });
            }
        }

        let primary = self.primary.active();
        let media_state = primary
            .as_ref()
            .map_or(MediaState::Idle, |c| c.model().media_state());
        let completed = self.primary.before_complete() || media_state == MediaState::Complete;
        {
            let mut state = self.state.lock();
            state.initialized = true;
            state.primary_completed = completed;
            state.primary_playing = matches!(media_state, MediaState::Playing | MediaState::Buffering);
        }

        self.primary.background_active_media();
        if let Some(primary) = primary {
            primary.pause();
        }
        self.ads.set_container(self.primary.container());
        info!(primary_state = %media_state, completed, "Instream initialized");
        Ok(())
    }

    pub async fn load_item(&self, item: PlaylistItem, options: InstreamOptions) -> Result<()> {
        self.load_items(vec![item], vec![options]).await
    }

    /// Play a queue of ads in order.
    ///
    /// An ad that fails to load or play hands over to the next one; the
    /// break fails with [`Error::AdQueueExhausted`] once none are left.
    #[instrument(skip(self, items, options), fields(count = items.len()))]
    pub async fn load_items(&self, items: Vec<PlaylistItem>, options: Vec<InstreamOptions>) -> Result<()> {
        {
            let mut state = self.state.lock();
            if !state.initialized || state.destroyed {
                return Err(Error::InstreamNotSetup);
            }
            state.queue = items
                .into_iter()
                .map(|mut item| {
                    item.starttime = None;
                    item
                })
                .collect();
            state.options = options;
            state.index = 0;
        }
        let queue = self.state.lock().queue.clone();
        if queue.is_empty() {
            return Err(Error::AdQueueExhausted { count: 0 });
        }
        self.ads.set_playlist(queue.clone());
        self.events.emit(AdEvent::BreakStart { count: queue.len() });
        self.play_from(0).await
    }

    async fn play_from(&self, mut index: usize) -> Result<()> {
        loop {
            let error = match self.play_ad(index).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_cancellation() => return Err(e),
                Err(e) if e.kind() == ErrorKind::PlaybackRejected => {
                    self.transition(InstreamState::Paused)?;
                    return Err(e);
                }
                Err(e) => e,
            };
            let count = self.state.lock().queue.len();
            self.ad_failed(index, &error);
            if index + 1 < count {
                index += 1;
                continue;
            }
            return Err(self.break_failed(count).await);
        }
    }

    async fn play_ad(&self, index: usize) -> Result<()> {
        let item = {
            let mut state = self.state.lock();
            if state.destroyed {
                return Err(Error::InstreamNotSetup);
            }
            let item = state.queue.get(index).cloned().ok_or(Error::ItemNotFound(index))?;
            let option_offset = state.options.get(index).and_then(|o| o.skipoffset);
            state.index = index;
            state.position = 0.0;
            state.preloaded_primary = false;
            state.skipoffset = item.skipoffset.or(option_offset);
            item
        };
        self.transition(InstreamState::Loading)?;
        self.events.emit(AdEvent::Item {
            index,
            title: item.display_title().to_string(),
            skipoffset: self.state.lock().skipoffset,
        });

        self.ads.stop_video();
        self.ads.set_active_item(index).await?;
        if self.is_destroyed() {
            return Err(Error::PlaybackCancelled);
        }
        self.ads.play_video(PlayReason::External).await
    }

    fn ad_failed(&self, index: usize, error: &Error) {
        warn!(index, error = %error, "Ad failed");
        self.events.emit(AdEvent::Error {
            index,
            code: error.code(),
            message: error.to_string(),
        });
    }

    async fn break_failed(&self, count: usize) -> Error {
        let error = Error::AdQueueExhausted { count };
        if let Err(e) = self.transition(InstreamState::Error) {
            debug!(error = %e, "Ad break already torn down");
        }
        self.events.emit(AdEvent::BreakFailed {
            count,
            code: error.code(),
        });
        if let Err(e) = self.destroy().await {
            warn!(error = %e, "Primary did not resume after failed ad break");
        }
        error
    }

    /// Move past the current ad, ending the break after the last one
    async fn advance(&self) -> Result<()> {
        let (next, count) = {
            let state = self.state.lock();
            (state.index + 1, state.queue.len())
        };
        if next < count {
            self.play_from(next).await
        } else {
            self.destroy().await
        }
    }

    fn spawn_advance(&self) {
        let Some(this) = self.this.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = this.advance().await {
                if !e.is_cancellation() {
                    warn!(error = %e, "Ad break did not continue");
                }
            }
        });
    }

    /// Skip the current ad
    #[instrument(skip(self))]
    pub async fn skip_ad(&self) -> Result<()> {
        let index = {
            let state = self.state.lock();
            if !state.initialized || state.destroyed {
                return Err(Error::InstreamNotSetup);
            }
            state.index
        };
        info!(index, "Ad skipped");
        self.events.emit(AdEvent::Skipped { index });
        self.advance().await
    }

    pub async fn play(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(Error::InstreamNotSetup);
        }
        self.ads.play_video(PlayReason::Interaction).await
    }

    pub fn pause(&self) {
        if !self.is_destroyed() {
            self.ads.pause();
        }
    }

    pub fn set_mute(&self, muted: bool) {
        self.ads.set_mute(muted);
    }

    pub fn set_volume(&self, volume: u8) {
        self.ads.set_volume(volume);
    }

    /// End the break and hand playback back to the primary.
    ///
    /// Unless `no_resume` is set the primary is stopped if it had completed,
    /// played if it was playing, and otherwise left paused.
    #[instrument(skip(self))]
    pub async fn destroy(&self) -> Result<()> {
        let (initialized, no_resume, completed, playing) = {
            let mut state = self.state.lock();
            if state.destroyed {
                return Ok(());
            }
            state.destroyed = true;
            (state.initialized, state.no_resume, state.primary_completed, state.primary_playing)
        };
        let old = std::mem::replace(&mut self.state.lock().state, InstreamState::Destroyed);
        self.events.emit(AdEvent::State {
            old,
            new: InstreamState::Destroyed,
        });
        self.events.emit(AdEvent::BreakEnd);
        self.events.off_all();
        self.ads.destroy();

        if !initialized {
            return Ok(());
        }
        self.primary.restore_background_media();
        self.primary.forward_events();
        info!(no_resume, completed, playing, "Instream destroyed");
        if no_resume {
            return Ok(());
        }
        if completed {
            self.primary.stop_video();
            Ok(())
        } else if playing {
            self.primary.play_video(PlayReason::External).await
        } else {
            Ok(())
        }
    }

    fn handle_ad_event(&self, event: &MediaEvent) {
        let (index, state) = {
            let state = self.state.lock();
            if state.destroyed {
                return;
            }
            (state.index, state.state)
        };
        let in_progress = matches!(state, InstreamState::Playing | InstreamState::Paused);

        match event {
            MediaEvent::State { old, new } if old != new => {
                let (target, upward) = match new {
                    MediaState::Playing => (InstreamState::Playing, AdEvent::Play { index }),
                    MediaState::Paused => (InstreamState::Paused, AdEvent::Pause { index }),
                    _ => return,
                };
                match self.transition(target) {
                    Ok(()) => self.events.emit(upward),
                    Err(e) => debug!(error = %e, "Ignoring ad state change"),
                }
            }
            MediaEvent::Time { position, duration } => {
                let preload = {
                    let mut state = self.state.lock();
                    state.position = *position;
                    let point = primary_preload_point(state.skipoffset, *duration);
                    let due = !state.preloaded_primary && duration.is_finite() && *position >= point;
                    if due {
                        state.preloaded_primary = true;
                    }
                    due
                };
                if preload {
                    debug!(index, "Preloading primary ahead of ad end");
                    self.primary.preload_video();
                }
                self.events.emit(AdEvent::Time {
                    index,
                    position: *position,
                    duration: *duration,
                });
            }
            MediaEvent::Complete if in_progress => {
                if let Err(e) = self.transition(InstreamState::Complete) {
                    debug!(error = %e, "Ignoring ad completion");
                    return;
                }
                self.events.emit(AdEvent::Complete { index });
                self.spawn_advance();
            }
            MediaEvent::MediaError { code, message } | MediaEvent::SetupError { code, message } if in_progress => {
                let error = Error::AdFailed {
                    index,
                    message: format!("{code}: {message}"),
                };
                self.ad_failed(index, &error);
                let count = self.state.lock().queue.len();
                if index + 1 < count {
                    self.spawn_advance();
                } else if let Some(this) = self.this.upgrade() {
                    tokio::spawn(async move {
                        this.break_failed(count).await;
                    });
                }
            }
            _ => {}
        }
    }
}

impl std::fmt::Debug for InstreamAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("InstreamAdapter")
            .field("state", &state.state)
            .field("index", &state.index)
            .field("queued", &state.queue.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{MediaContainer, MediaPool};
    use crate::provider::{ProviderEntry, ProviderRegistry};
    use crate::simulated::{SimulatedLoader, SimulatedProviderFactory};
    use parking_lot::Mutex as PlMutex;

    struct Fixture {
        primary: Arc<ProgramController>,
        factory: Arc<SimulatedProviderFactory>,
        loader: Arc<SimulatedLoader>,
        container: Arc<MediaContainer>,
    }

    fn fixture() -> Fixture {
        let factory = Arc::new(SimulatedProviderFactory::new("html5"));
        let loader = Arc::new(SimulatedLoader::new());
        let registry = Arc::new(ProviderRegistry::with_loader(loader.clone()));
        registry.register(ProviderEntry::loaded(factory.clone(), vec![SourceKind::Mp4]));
        registry.register(ProviderEntry::deferred("hlsjs", vec![SourceKind::Hls]));
        let primary = ProgramController::new(registry, Arc::new(MediaPool::new(2)), ElementSource::Pooled);
        let container = Arc::new(MediaContainer::new());
        primary.set_container(Some(container.clone()));
        primary.set_playlist(vec![PlaylistItem::new("movie.mp4").with_duration(600.0)]);
        Fixture {
            primary,
            factory,
            loader,
            container,
        }
    }

    fn record(adapter: &InstreamAdapter) -> Arc<PlMutex<Vec<AdEvent>>> {
        let seen = Arc::new(PlMutex::new(Vec::new()));
        let s = seen.clone();
        adapter.events().on(move |e| s.lock().push(e.clone()));
        seen
    }

    #[test]
    fn test_state_transitions() {
        assert!(InstreamState::Idle.can_transition_to(InstreamState::Loading));
        assert!(InstreamState::Loading.can_transition_to(InstreamState::Playing));
        assert!(InstreamState::Playing.can_transition_to(InstreamState::Paused));
        assert!(InstreamState::Paused.can_transition_to(InstreamState::Playing));
        assert!(InstreamState::Error.can_transition_to(InstreamState::Destroyed));
        assert!(!InstreamState::Idle.can_transition_to(InstreamState::Playing));
        assert!(!InstreamState::Destroyed.can_transition_to(InstreamState::Loading));
    }

    #[tokio::test]
    async fn test_load_before_init_fails() {
        let f = fixture();
        let adapter = InstreamAdapter::new(f.primary.clone());
        let result = adapter.load_item(PlaylistItem::new("ad.mp4"), InstreamOptions::default()).await;
        assert_eq!(result, Err(Error::InstreamNotSetup));
    }

    #[tokio::test]
    async fn test_break_resumes_playing_primary() {
        let f = fixture();
        let primary = f.primary.set_active_item(0).await.unwrap();
        f.primary.play_video(PlayReason::External).await.unwrap();
        assert_eq!(primary.model().media_state(), MediaState::Playing);

        let adapter = InstreamAdapter::new(f.primary.clone());
        adapter.init().unwrap();
        assert!(primary.is_background());

        adapter
            .load_item(PlaylistItem::new("ad.mp4"), InstreamOptions::default())
            .await
            .unwrap();
        assert_eq!(adapter.state(), InstreamState::Playing);
        assert!(f.container.contains(&f.primary.pool().ad_element()));

        adapter.destroy().await.unwrap();
        let restored = f.primary.active().unwrap();
        assert!(Arc::ptr_eq(&restored, &primary));
        assert_eq!(primary.model().media_state(), MediaState::Playing);
        assert!(!primary.is_background());
    }

    #[tokio::test]
    async fn test_break_leaves_paused_primary_paused() {
        let f = fixture();
        let primary = f.primary.set_active_item(0).await.unwrap();
        f.primary.play_video(PlayReason::External).await.unwrap();
        f.primary.pause();
        let plays = f.factory.created()[0].play_count();

        let adapter = InstreamAdapter::new(f.primary.clone());
        adapter.init().unwrap();
        adapter
            .load_item(PlaylistItem::new("ad.mp4"), InstreamOptions::default())
            .await
            .unwrap();
        adapter.destroy().await.unwrap();

        assert_eq!(primary.model().media_state(), MediaState::Paused);
        assert_eq!(f.factory.created()[0].play_count(), plays);
    }

    #[tokio::test]
    async fn test_no_resume_keeps_primary_parked_state() {
        let f = fixture();
        let primary = f.primary.set_active_item(0).await.unwrap();
        f.primary.play_video(PlayReason::External).await.unwrap();
        let plays = f.factory.created()[0].play_count();

        let adapter = InstreamAdapter::new(f.primary.clone());
        adapter.init().unwrap();
        adapter.set_no_resume(true);
        adapter.destroy().await.unwrap();
        assert_eq!(f.factory.created()[0].play_count(), plays);
        assert!(Arc::ptr_eq(&f.primary.active().unwrap(), &primary));
    }

    #[tokio::test]
    async fn test_failed_ad_advances_to_next() {
        let f = fixture();
        f.primary.set_active_item(0).await.unwrap();
        f.loader.fail("hlsjs");
        let adapter = InstreamAdapter::new(f.primary.clone());
        let seen = record(&adapter);
        adapter.init().unwrap();

        adapter
            .load_items(
                vec![PlaylistItem::new("bad.m3u8"), PlaylistItem::new("good.mp4")],
                vec![InstreamOptions::default(), InstreamOptions::default()],
            )
            .await
            .unwrap();
        assert_eq!(adapter.index(), 1);
        assert!(seen.lock().iter().any(|e| matches!(e, AdEvent::Error { index: 0, .. })));
    }

    #[tokio::test]
    async fn test_exhausted_queue_fails_break() {
        let f = fixture();
        f.primary.set_active_item(0).await.unwrap();
        f.loader.fail("hlsjs");
        let adapter = InstreamAdapter::new(f.primary.clone());
        let seen = record(&adapter);
        adapter.init().unwrap();

        let result = adapter
            .load_items(
                vec![PlaylistItem::new("a.m3u8"), PlaylistItem::new("b.m3u8")],
                vec![],
            )
            .await;
        assert_eq!(result, Err(Error::AdQueueExhausted { count: 2 }));
        assert!(adapter.is_destroyed());
        assert!(seen
            .lock()
            .iter()
            .any(|e| matches!(e, AdEvent::BreakFailed { count: 2, .. })));
    }

    #[tokio::test]
    async fn test_skip_last_ad_ends_break() {
        let f = fixture();
        f.primary.set_active_item(0).await.unwrap();
        let adapter = InstreamAdapter::new(f.primary.clone());
        let seen = record(&adapter);
        adapter.init().unwrap();
        let mut ad = PlaylistItem::new("ad.mp4");
        ad.skipoffset = Some(5.0);
        adapter.load_item(ad, InstreamOptions::default()).await.unwrap();
        assert!(!adapter.is_skippable());

        adapter.skip_ad().await.unwrap();
        assert!(adapter.is_destroyed());
        let seen = seen.lock();
        assert!(seen.iter().any(|e| matches!(e, AdEvent::Skipped { index: 0 })));
        assert!(seen.iter().any(|e| matches!(e, AdEvent::BreakEnd)));
    }

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_primary_preload_point() {
        assert_eq!(primary_preload_point(None, 30.0), 20.0);
        assert_eq!(primary_preload_point(Some(15.0), 30.0), 5.0);
        assert_eq!(primary_preload_point(Some(5.0), 30.0), AD_PRELOAD_MIN_POSITION);
        assert_eq!(primary_preload_point(None, 8.0), AD_PRELOAD_MIN_POSITION);
    }

    #[tokio::test]
    async fn test_ad_error_mid_playback_moves_on() {
        let f = fixture();
        let primary = f.primary.set_active_item(0).await.unwrap();
        f.primary.play_video(PlayReason::External).await.unwrap();
        let primary_plays = f.factory.created()[0].play_count();

        let adapter = InstreamAdapter::new(f.primary.clone());
        let seen = record(&adapter);
        adapter.init().unwrap();
        adapter
            .load_items(
                vec![PlaylistItem::new("first.mp4"), PlaylistItem::new("second.mp4")],
                vec![InstreamOptions::default(), InstreamOptions::default()],
            )
            .await
            .unwrap();
        assert_eq!(adapter.state(), InstreamState::Playing);

        f.factory.last().unwrap().fail(3, "decode error");
        settle().await;
        assert_eq!(adapter.index(), 1);
        assert_eq!(adapter.state(), InstreamState::Playing);
        assert!(!adapter.is_destroyed());

        f.factory.last().unwrap().fail(3, "decode error");
        settle().await;
        assert!(adapter.is_destroyed());
        {
            let seen = seen.lock();
            assert!(seen.iter().any(|e| matches!(e, AdEvent::Error { index: 0, .. })));
            assert!(seen.iter().any(|e| matches!(e, AdEvent::Error { index: 1, .. })));
            assert!(seen.iter().any(|e| matches!(e, AdEvent::BreakFailed { count: 2, .. })));
        }

        assert!(Arc::ptr_eq(&f.primary.active().unwrap(), &primary));
        assert!(!primary.is_background());
        assert_eq!(primary.model().media_state(), MediaState::Playing);
        assert_eq!(f.factory.created()[0].play_count(), primary_plays + 1);
    }
}
