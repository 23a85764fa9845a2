//! In-memory providers and probes
//!
//! These back the headless CLI and the test suites. A simulated provider
//! renders nothing; it walks the media element and raises the same events a
//! real engine would, with knobs for rejections, delays and failures.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::autoplay::AutoplayTester;
use crate::captions::{Cue, TrackParser};
use crate::error::{Error, PlayRejection, Result};
use crate::pool::{MediaContainer, MediaElement};
use crate::provider::{Provider, ProviderContext, ProviderEvent, ProviderEventSink, ProviderFactory, ProviderLoader};
use crate::types::*;

/// How a simulated provider answers `play`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayOutcome {
    #[default]
    Resolve,
    /// Reject every attempt
    Reject(PlayRejection),
    /// Clear the source and reject the first attempt, resolve afterwards
    RejectOnceBlank(PlayRejection),
}

#[derive(Default)]
struct Counters {
    load: AtomicUsize,
    play: AtomicUsize,
    pause: AtomicUsize,
    stop: AtomicUsize,
    seek: AtomicUsize,
    preload: AtomicUsize,
    destroy: AtomicUsize,
}

struct SimulatedState {
    outcome: PlayOutcome,
    load_delay: Option<Duration>,
    load_error: Option<Error>,
    container: Option<Arc<MediaContainer>>,
    attached: bool,
    item: Option<PlaylistItem>,
}

/// Provider that plays nothing and reports as if it did
pub struct SimulatedProvider {
    name: String,
    element: Option<Arc<MediaElement>>,
    sink: ProviderEventSink,
    counters: Counters,
    state: Mutex<SimulatedState>,
}

impl SimulatedProvider {
    pub fn new(name: impl Into<String>, element: Option<Arc<MediaElement>>, sink: ProviderEventSink) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            element,
            sink,
            counters: Counters::default(),
            state: Mutex::new(SimulatedState {
                outcome: PlayOutcome::Resolve,
                load_delay: None,
                load_error: None,
                container: None,
                attached: true,
                item: None,
            }),
        })
    }

    pub fn set_play_outcome(&self, outcome: PlayOutcome) {
        self.state.lock().outcome = outcome;
    }

    pub fn set_load_delay(&self, delay: Duration) {
        self.state.lock().load_delay = Some(delay);
    }

    /// Fail the next load with `error`
    pub fn fail_next_load(&self, error: Error) {
        self.state.lock().load_error = Some(error);
    }

    /// Raise an arbitrary provider event
    pub fn emit(&self, event: ProviderEvent) {
        self.sink.emit(event);
    }

    pub fn emit_state(&self, state: MediaState) {
        self.emit(ProviderEvent::State(state));
    }

    pub fn emit_time(&self, position: f64, duration: f64) {
        self.emit(ProviderEvent::Time {
            position,
            duration,
            seek_range: None,
        });
    }

    /// Report the end of the media
    pub fn finish(&self) {
        if let Some(element) = &self.element {
            element.set_paused(true);
        }
        self.emit(ProviderEvent::Complete);
    }

    /// Report a media fault
    pub fn fail(&self, code: u32, message: &str) {
        self.emit(ProviderEvent::Error {
            code,
            message: message.to_string(),
        });
    }

    pub fn is_attached(&self) -> bool {
        self.state.lock().attached
    }

    /// Item passed to the last `init` or `load`
    pub fn current_item(&self) -> Option<PlaylistItem> {
        self.state.lock().item.clone()
    }

    pub fn load_count(&self) -> usize {
        self.counters.load.load(Ordering::SeqCst)
    }

    pub fn play_count(&self) -> usize {
        self.counters.play.load(Ordering::SeqCst)
    }

    pub fn pause_count(&self) -> usize {
        self.counters.pause.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.counters.stop.load(Ordering::SeqCst)
    }

    pub fn seek_count(&self) -> usize {
        self.counters.seek.load(Ordering::SeqCst)
    }

    pub fn preload_count(&self) -> usize {
        self.counters.preload.load(Ordering::SeqCst)
    }

    pub fn destroy_count(&self) -> usize {
        self.counters.destroy.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for SimulatedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&self, item: &PlaylistItem) {
        self.state.lock().item = Some(item.clone());
    }

    async fn load(&self, item: &PlaylistItem) -> Result<()> {
        self.counters.load.fetch_add(1, Ordering::SeqCst);
        let (delay, error) = {
            let mut state = self.state.lock();
            state.item = Some(item.clone());
            (state.load_delay, state.load_error.take())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = error {
            return Err(error);
        }

        let file = item.first_source().map(|s| s.file.clone());
        let media_type = match item.first_source().map(MediaSource::kind) {
            Some(SourceKind::Mp3 | SourceKind::Aac | SourceKind::Ogg) => MediaType::Audio,
            _ => MediaType::Video,
        };
        if let Some(element) = &self.element {
            element.set_src(file);
            element.set_paused(true);
        }
        self.emit(ProviderEvent::MediaType(media_type));
        self.emit_state(MediaState::Buffering);
        if let Some(duration) = item.duration {
            self.emit(ProviderEvent::Meta {
                duration,
                width: None,
                height: None,
            });
        }
        Ok(())
    }

    async fn play(&self) -> Result<()> {
        self.counters.play.fetch_add(1, Ordering::SeqCst);
        let outcome = {
            let mut state = self.state.lock();
            let outcome = state.outcome;
            if let PlayOutcome::RejectOnceBlank(_) = outcome {
                state.outcome = PlayOutcome::Resolve;
            }
            outcome
        };
        match outcome {
            PlayOutcome::Resolve => {
                if let Some(element) = &self.element {
                    element.set_paused(false);
                }
                self.emit_state(MediaState::Playing);
                Ok(())
            }
            PlayOutcome::Reject(rejection) => Err(Error::rejected(rejection, "play() was refused")),
            PlayOutcome::RejectOnceBlank(rejection) => {
                if let Some(element) = &self.element {
                    element.set_src(None);
                }
                Err(Error::rejected(rejection, "play() interrupted before the source was set"))
            }
        }
    }

    fn preload(&self, _item: &PlaylistItem) {
        self.counters.preload.fetch_add(1, Ordering::SeqCst);
    }

    fn pause(&self) {
        self.counters.pause.fetch_add(1, Ordering::SeqCst);
        if let Some(element) = &self.element {
            element.set_paused(true);
        }
        self.emit_state(MediaState::Paused);
    }

    fn stop(&self) {
        self.counters.stop.fetch_add(1, Ordering::SeqCst);
        if let Some(element) = &self.element {
            element.set_paused(true);
            element.set_src(None);
        }
        self.emit_state(MediaState::Idle);
    }

    fn seek(&self, position: f64) {
        self.counters.seek.fetch_add(1, Ordering::SeqCst);
        self.emit(ProviderEvent::Seek { position, offset: position });
        self.emit(ProviderEvent::Seeked);
    }

    fn set_mute(&self, muted: bool) {
        if let Some(element) = &self.element {
            element.set_muted(muted);
        }
        self.emit(ProviderEvent::Mute(muted));
    }

    fn set_volume(&self, volume: u8) {
        if let Some(element) = &self.element {
            element.set_volume(volume);
        }
        self.emit(ProviderEvent::Volume(volume));
    }

    fn set_playback_rate(&self, rate: f64) {
        if let Some(element) = &self.element {
            element.set_playback_rate(rate);
        }
    }

    fn attach_media(&self) {
        self.state.lock().attached = true;
    }

    fn detach_media(&self) -> Option<Arc<MediaElement>> {
        self.state.lock().attached = false;
        self.element.clone()
    }

    fn set_container(&self, container: Option<Arc<MediaContainer>>) {
        if let (Some(container), Some(element)) = (&container, &self.element) {
            container.append(element);
        }
        self.state.lock().container = container;
    }

    fn container(&self) -> Option<Arc<MediaContainer>> {
        self.state.lock().container.clone()
    }

    fn media_element(&self) -> Option<Arc<MediaElement>> {
        self.element.clone()
    }

    fn destroy(&self) {
        self.counters.destroy.fetch_add(1, Ordering::SeqCst);
        self.state.lock().container = None;
    }
}

/// Factory producing [`SimulatedProvider`]s and remembering them
pub struct SimulatedProviderFactory {
    name: String,
    outcome: Mutex<PlayOutcome>,
    fail_create: Mutex<Option<String>>,
    created: Mutex<Vec<Arc<SimulatedProvider>>>,
}

impl SimulatedProviderFactory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcome: Mutex::new(PlayOutcome::Resolve),
            fail_create: Mutex::new(None),
            created: Mutex::new(Vec::new()),
        }
    }

    /// Play outcome given to providers created from now on
    pub fn set_play_outcome(&self, outcome: PlayOutcome) {
        *self.outcome.lock() = outcome;
    }

    /// Make `create` fail with `reason`; `None` restores it
    pub fn set_create_failure(&self, reason: Option<String>) {
        *self.fail_create.lock() = reason;
    }

    pub fn created(&self) -> Vec<Arc<SimulatedProvider>> {
        self.created.lock().clone()
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().len()
    }

    /// Most recently created provider
    pub fn last(&self) -> Option<Arc<SimulatedProvider>> {
        self.created.lock().last().cloned()
    }
}

impl ProviderFactory for SimulatedProviderFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn create(&self, context: ProviderContext) -> Result<Arc<dyn Provider>> {
        if let Some(reason) = self.fail_create.lock().clone() {
            return Err(Error::SetupFailed(reason));
        }
        if let Some(element) = &context.element {
            element.set_muted(context.muted);
            element.set_volume(context.volume);
        }
        let provider = SimulatedProvider::new(self.name.clone(), context.element, context.events);
        provider.set_play_outcome(*self.outcome.lock());
        self.created.lock().push(provider.clone());
        Ok(provider)
    }
}

/// Loader handing out a [`SimulatedProviderFactory`] for any name
#[derive(Default)]
pub struct SimulatedLoader {
    loads: AtomicUsize,
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
    factories: Mutex<HashMap<String, Arc<SimulatedProviderFactory>>>,
}

impl SimulatedLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make loading `name` fail
    pub fn fail(&self, name: &str) {
        self.failing.lock().insert(name.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Factory handed out for `name`, once loaded
    pub fn factory(&self, name: &str) -> Option<Arc<SimulatedProviderFactory>> {
        self.factories.lock().get(name).cloned()
    }
}

#[async_trait]
impl ProviderLoader for SimulatedLoader {
    async fn load(&self, name: &str) -> Result<Arc<dyn ProviderFactory>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        match delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }
        if self.failing.lock().contains(name) {
            return Err(Error::ProviderLoad {
                name: name.to_string(),
                reason: "chunk failed to load".to_string(),
            });
        }
        let factory = self
            .factories
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(SimulatedProviderFactory::new(name)))
            .clone();
        Ok(factory)
    }
}

/// How the simulated runtime treats autoplay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoplayBehavior {
    Allow,
    /// Only muted playback is allowed
    MutedOnly,
    Block,
    /// The test element never settles
    Hang,
}

pub struct SimulatedAutoplayTester {
    behavior: Mutex<AutoplayBehavior>,
    delay: Mutex<Option<Duration>>,
    attempts: AtomicUsize,
}

impl SimulatedAutoplayTester {
    pub fn new(behavior: AutoplayBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            delay: Mutex::new(None),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn set_behavior(&self, behavior: AutoplayBehavior) {
        *self.behavior.lock() = behavior;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AutoplayTester for SimulatedAutoplayTester {
    async fn try_play(&self, element: &MediaElement, muted: bool) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let behavior = *self.behavior.lock();
        match behavior {
            AutoplayBehavior::Allow => {}
            AutoplayBehavior::MutedOnly if muted => {}
            AutoplayBehavior::MutedOnly | AutoplayBehavior::Block => {
                return Err(Error::rejected(PlayRejection::NotAllowed, "autoplay is not allowed"));
            }
            AutoplayBehavior::Hang => futures::future::pending::<()>().await,
        }
        element.set_paused(false);
        element.set_paused(true);
        Ok(())
    }
}

/// Track parser serving cues from memory
#[derive(Default)]
pub struct StaticTrackParser {
    tracks: Mutex<HashMap<String, Vec<Cue>>>,
    failing: Mutex<HashSet<String>>,
}

impl StaticTrackParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: &str, cues: Vec<Cue>) {
        self.tracks.lock().insert(url.to_string(), cues);
    }

    pub fn fail(&self, url: &str) {
        self.failing.lock().insert(url.to_string());
    }
}

#[async_trait]
impl TrackParser for StaticTrackParser {
    async fn parse(&self, url: &str) -> Result<Vec<Cue>> {
        tokio::task::yield_now().await;
        if self.failing.lock().contains(url) {
            return Err(Error::media(404, format!("track {url} not found")));
        }
        Ok(self.tracks.lock().get(url).cloned().unwrap_or_default())
    }
}
