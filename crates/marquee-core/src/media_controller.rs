//! Lifecycle of one provider playing one playlist item

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::events::{EventBus, EventQueue, MediaEvent};
use crate::model::MediaModel;
use crate::pool::{MediaContainer, MediaElement, MediaPool};
use crate::provider::{Provider, ProviderEvent, ProviderEventHandler, ProviderEventSink};
use crate::types::*;

/// Offset added to provider error codes raised before the media was set up
pub const SETUP_ERROR_CODE_OFFSET: u32 = 100_000;

struct ControllerState {
    item: PlaylistItem,
    model: Arc<MediaModel>,
    attached: bool,
    before_complete: bool,
    then_play: CancelToken,
    /// Container the element was pulled out of when backgrounded
    parked_container: Option<Arc<MediaContainer>>,
    muted: Option<bool>,
    playback_rate: f64,
    destroyed: bool,
}

/// Binds a provider to a playlist item and its [`MediaModel`].
///
/// Upward events go through [`MediaController::events`]. While the controller
/// is detached or backgrounded they are held in a queue and delivered in order
/// once it is attached and in the foreground again.
pub struct MediaController {
    id: ControllerId,
    provider: Arc<dyn Provider>,
    sink: ProviderEventSink,
    pool: Arc<MediaPool>,
    element: Option<Arc<MediaElement>>,
    events: EventBus<MediaEvent>,
    queue: EventQueue<MediaEvent>,
    state: Mutex<ControllerState>,
}

impl MediaController {
    /// Wrap `provider` and make `item` its active item.
    ///
    /// `sink` must be the sink the provider was created with.
    pub fn new(
        provider: Arc<dyn Provider>,
        sink: ProviderEventSink,
        item: PlaylistItem,
        pool: Arc<MediaPool>,
    ) -> Arc<Self> {
        let element = provider.media_element();
        let controller = Arc::new(Self {
            id: ControllerId::new(),
            provider,
            sink,
            pool,
            element,
            events: EventBus::new(),
            queue: EventQueue::new(),
            state: Mutex::new(ControllerState {
                item: PlaylistItem::default(),
                model: Arc::new(MediaModel::new()),
                attached: true,
                before_complete: false,
                then_play: CancelToken::new(),
                parked_container: None,
                muted: None,
                playback_rate: 1.0,
                destroyed: false,
            }),
        });
        let handler: Arc<dyn ProviderEventHandler> = controller.clone();
        controller.sink.bind(Arc::downgrade(&handler));
        controller.set_active_item(item);
        debug!(controller = %controller.id, provider = controller.provider.name(), "Media controller created");
        controller
    }

    pub fn id(&self) -> ControllerId {
        self.id
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn events(&self) -> &EventBus<MediaEvent> {
        &self.events
    }

    pub fn item(&self) -> PlaylistItem {
        self.state.lock().item.clone()
    }

    pub fn model(&self) -> Arc<MediaModel> {
        self.state.lock().model.clone()
    }

    /// Rewrite the resume position of the active item
    pub fn set_starttime(&self, starttime: Option<f64>) {
        self.state.lock().item.starttime = starttime;
    }

    /// Install `item` with a fresh model
    pub fn set_active_item(&self, item: PlaylistItem) {
        let model = Arc::new(MediaModel::for_item(&item));
        {
            let mut state = self.state.lock();
            state.item = item.clone();
            state.model = model;
            state.before_complete = false;
        }
        self.provider.init(&item);
    }

    pub fn is_attached(&self) -> bool {
        self.state.lock().attached
    }

    /// Attached, but the element is not shown in any container
    pub fn is_background(&self) -> bool {
        if !self.is_attached() {
            return false;
        }
        let Some(element) = self.provider.media_element() else {
            return false;
        };
        match self.provider.container() {
            Some(container) => !container.contains(&element),
            None => true,
        }
    }

    pub fn before_complete(&self) -> bool {
        self.state.lock().before_complete
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.lock().destroyed
    }

    pub fn is_setup(&self) -> bool {
        self.model().is_setup()
    }

    pub fn is_started(&self) -> bool {
        self.model().is_started()
    }

    pub fn is_preloaded(&self) -> bool {
        self.model().is_preloaded()
    }

    pub fn media_element(&self) -> Option<Arc<MediaElement>> {
        self.provider.media_element()
    }

    pub fn container(&self) -> Option<Arc<MediaContainer>> {
        self.provider.container()
    }

    pub fn set_container(&self, container: Option<Arc<MediaContainer>>) {
        self.provider.set_container(container);
    }

    fn is_current_model(&self, model: &Arc<MediaModel>) -> bool {
        Arc::ptr_eq(&self.state.lock().model, model)
    }

    /// Emit upward, or queue while detached or backgrounded
    fn trigger(&self, event: MediaEvent) {
        if !self.is_attached() || self.is_background() {
            self.queue.push(event);
        } else {
            self.events.emit(event);
        }
    }

    fn flush_queue(&self) {
        while let Some(event) = self.queue.pop() {
            self.events.emit(event);
        }
    }

    fn set_media_state(&self, model: &MediaModel, new: MediaState) {
        if let Some(old) = model.set_media_state(new) {
            self.trigger(MediaEvent::State { old, new });
        }
    }

    /// Start playback, loading the item first if needed
    #[instrument(skip(self), fields(controller = %self.id))]
    pub async fn play(&self, reason: PlayReason) -> Result<()> {
        let (model, item) = {
            let state = self.state.lock();
            if state.destroyed {
                return Err(Error::PlaybackCancelled);
            }
            (state.model.clone(), state.item.clone())
        };
        model.set_play_rejected(false);

        if model.is_setup() {
            return self.provider.play().await;
        }
        model.set_setup(true);

        if model.is_started() {
            return self.load_and_play(&model, &item).await.map(|_| ());
        }

        self.trigger(MediaEvent::PlayAttempt { reason });
        let result = self.load_and_play(&model, &item).await;
        self.settle_play_attempt(&model, &item, reason, result).await
    }

    /// Load, then play unless the then-play token was cancelled meanwhile.
    ///
    /// Resolves to whether play was actually invoked.
    async fn load_and_play(&self, model: &MediaModel, item: &PlaylistItem) -> Result<bool> {
        let token = CancelToken::new();
        self.state.lock().then_play = token.clone();

        if let Err(e) = self.provider.load(item).await {
            let error = e.into_setup();
            warn!(controller = %self.id, error = %error, "Provider load failed");
            model.src_reset();
            self.trigger(MediaEvent::SetupError {
                code: error.code(),
                message: error.to_string(),
            });
            return Err(error);
        }

        match token.continue_with(|| self.provider.play()).await {
            Some(result) => result.map(|_| true),
            None => {
                debug!(controller = %self.id, "Play after load suppressed");
                Ok(false)
            }
        }
    }

    async fn settle_play_attempt(
        &self,
        model: &Arc<MediaModel>,
        item: &PlaylistItem,
        reason: PlayReason,
        result: Result<bool>,
    ) -> Result<()> {
        let mut error = match result {
            Ok(played) => {
                if played && model.is_setup() {
                    model.set_started(true);
                }
                return Ok(());
            }
            Err(e @ Error::PlayRejected { .. }) => e,
            Err(e) => return Err(e),
        };

        if self.is_destroyed() || !self.is_current_model(model) {
            return Err(error);
        }
        model.set_play_rejected(true);

        if let Some(element) = self.provider.media_element() {
            if element.is_paused() {
                if element.has_blank_source() {
                    debug!(controller = %self.id, "Play rejected before the source was set, retrying");
                    match self.load_and_play(model, item).await {
                        Ok(played) => {
                            if played && model.is_setup() {
                                model.set_started(true);
                            }
                            return Ok(());
                        }
                        Err(e) => error = e,
                    }
                } else {
                    self.set_media_state(model, MediaState::Paused);
                }
            }
        }

        info!(controller = %self.id, code = error.code(), "Play attempt failed");
        self.trigger(MediaEvent::PlayAttemptFailed {
            reason,
            code: error.code(),
            message: error.to_string(),
        });
        Err(error)
    }

    pub fn pause(&self) {
        self.state.lock().before_complete = false;
        self.provider.pause();
    }

    pub fn stop(&self) {
        self.state.lock().before_complete = false;
        self.provider.stop();
    }

    /// Seek, or move the start position when the media is not set up yet
    pub fn seek(&self, position: f64) {
        let model = self.model();
        if model.is_setup() {
            self.provider.seek(position);
        } else {
            self.state.lock().item.starttime = Some(position);
            model.update(|attrs| attrs.position = position);
        }
    }

    /// Ask the provider to preload the item once
    pub fn preload(&self) {
        let (item, model, attached) = {
            let state = self.state.lock();
            (state.item.clone(), state.model.clone(), state.attached)
        };
        if item.preload == Preload::None || !attached || model.is_setup() || model.is_preloaded() {
            return;
        }
        model.update(|attrs| attrs.preloaded = true);
        debug!(controller = %self.id, item = item.display_title(), "Preloading");
        self.provider.preload(&item);
    }

    /// Hook the element back up and deliver queued events
    pub fn attach(&self) {
        let rate = self.state.lock().playback_rate;
        self.provider.set_playback_rate(rate);
        self.provider.attach_media();
        self.state.lock().attached = true;
        self.flush_queue();
        if self.before_complete() {
            self.playback_complete();
        }
    }

    /// Unhook the element; a pending play-after-load becomes a no-op
    pub fn detach(&self) -> Option<Arc<MediaElement>> {
        self.state.lock().then_play.cancel();
        let element = self.provider.detach_media();
        self.state.lock().attached = false;
        element
    }

    /// Pull the element out of (or put it back into) its container.
    ///
    /// Backgrounding does not pause. Element-less providers detach instead.
    pub fn set_background(&self, background: bool) {
        let Some(element) = self.provider.media_element() else {
            if background {
                self.detach();
            } else {
                self.attach();
            }
            return;
        };

        if background {
            if self.is_background() {
                self.state.lock().then_play.cancel();
                return;
            }
            self.state.lock().then_play.cancel();
            if let Some(container) = self.provider.container() {
                container.remove(&element);
                self.provider.set_container(None);
                self.state.lock().parked_container = Some(container);
            }
            debug!(controller = %self.id, "Backgrounded");
        } else {
            let parked = self.state.lock().parked_container.take();
            if self.provider.container().is_none() {
                if let Some(container) = parked {
                    self.provider.set_container(Some(container));
                }
            }
            self.flush_queue();
            if self.before_complete() {
                self.playback_complete();
            }
            debug!(controller = %self.id, "Foregrounded");
        }
    }

    fn playback_complete(&self) {
        let model = {
            let mut state = self.state.lock();
            state.item.starttime = None;
            state.before_complete = false;
            state.model.clone()
        };
        self.set_media_state(&model, MediaState::Complete);
        self.trigger(MediaEvent::Complete);
    }

    pub fn set_mute(&self, muted: bool) {
        self.provider.set_mute(muted);
    }

    pub fn set_volume(&self, volume: u8) {
        self.provider.set_volume(volume);
    }

    pub fn set_playback_rate(&self, rate: f64) {
        self.state.lock().playback_rate = rate;
        self.provider.set_playback_rate(rate);
    }

    pub fn set_current_quality(&self, index: usize) {
        self.provider.set_current_quality(index);
    }

    pub fn set_current_audio_track(&self, index: usize) {
        self.provider.set_current_audio_track(index);
    }

    pub fn quality_levels(&self) -> Vec<QualityLevel> {
        self.model().snapshot().levels
    }

    pub fn audio_tracks(&self) -> Vec<AudioTrack> {
        self.model().snapshot().audio_tracks
    }

    /// Tear down. Safe to call more than once.
    pub fn destroy(&self) {
        let then_play = {
            let mut state = self.state.lock();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            state.then_play.clone()
        };
        self.sink.unbind();
        self.events.off_all();
        self.queue.clear();
        then_play.cancel();

        self.detach();
        if self.provider.container().is_some() {
            self.provider.remove();
        }
        self.provider.destroy();
        if let Some(element) = &self.element {
            self.pool.recycle(element);
        }
        info!(controller = %self.id, provider = self.provider.name(), "Media controller destroyed");
    }

    fn handle_provider_event(&self, event: ProviderEvent) {
        let model = self.model();
        let upward = match event {
            ProviderEvent::MediaType(media_type) => {
                let duplicate = model.update(|attrs| {
                    let same = attrs.media_type == Some(media_type);
                    attrs.media_type = Some(media_type);
                    same
                });
                if duplicate {
                    return;
                }
                MediaEvent::MediaType { media_type }
            }
            ProviderEvent::Mute(muted) => {
                {
                    let mut state = self.state.lock();
                    if state.muted == Some(muted) {
                        return;
                    }
                    state.muted = Some(muted);
                }
                MediaEvent::Mute { muted }
            }
            ProviderEvent::State(new) => {
                if new == MediaState::Idle {
                    self.state.lock().then_play.cancel();
                    model.src_reset();
                }
                match model.set_media_state(new) {
                    Some(old) => MediaEvent::State { old, new },
                    None => return,
                }
            }
            ProviderEvent::Complete => {
                self.state.lock().before_complete = true;
                self.trigger(MediaEvent::BeforeComplete);
                if self.is_attached() && !self.is_background() {
                    self.playback_complete();
                }
                return;
            }
            ProviderEvent::Error { code, message } => {
                if model.is_setup() {
                    self.state.lock().then_play.cancel();
                    model.src_reset();
                    let error = Error::media(code, message.clone());
                    warn!(controller = %self.id, error = %error, "Media error");
                    MediaEvent::MediaError {
                        code: error.code(),
                        message,
                    }
                } else {
                    let error = Error::media_setup(code + SETUP_ERROR_CODE_OFFSET, message.clone());
                    warn!(controller = %self.id, error = %error, "Media setup error");
                    MediaEvent::SetupError {
                        code: error.code(),
                        message,
                    }
                }
            }
            ProviderEvent::Meta {
                duration,
                width,
                height,
            } => {
                if duration.is_finite() {
                    model.update(|attrs| attrs.duration = duration);
                }
                MediaEvent::Meta {
                    duration,
                    width,
                    height,
                }
            }
            ProviderEvent::BufferChange {
                percent,
                position,
                duration,
            } => {
                model.update(|attrs| {
                    attrs.buffer = percent;
                    attrs.position = position;
                    attrs.current_time = position;
                    if duration.is_finite() {
                        attrs.duration = duration;
                    }
                });
                MediaEvent::BufferChange {
                    percent,
                    position,
                    duration,
                }
            }
            ProviderEvent::Time {
                position,
                duration,
                seek_range,
            } => {
                model.update(|attrs| {
                    attrs.position = position;
                    attrs.current_time = position;
                    attrs.seek_range = seek_range;
                    if duration.is_finite() {
                        attrs.duration = duration;
                    }
                });
                self.state.lock().item.starttime = None;
                MediaEvent::Time { position, duration }
            }
            ProviderEvent::Seek { position, offset } => MediaEvent::Seek { position, offset },
            ProviderEvent::Seeked => MediaEvent::Seeked,
            ProviderEvent::FirstFrame => MediaEvent::FirstFrame,
            ProviderEvent::VisualQuality(quality) => {
                model.update(|attrs| attrs.visual_quality = Some(quality.clone()));
                MediaEvent::VisualQuality(quality)
            }
            ProviderEvent::Volume(volume) => MediaEvent::Volume { volume },
            ProviderEvent::Levels { levels, current } => {
                model.update(|attrs| {
                    attrs.levels = levels.clone();
                    if levels.len() > 1 && current < levels.len() {
                        attrs.current_level = Some(current);
                    }
                });
                MediaEvent::Levels { levels, current }
            }
            ProviderEvent::LevelsChanged(current) => {
                model.update(|attrs| {
                    if attrs.levels.len() > 1 && current < attrs.levels.len() {
                        attrs.current_level = Some(current);
                    }
                });
                MediaEvent::LevelsChanged { current }
            }
            ProviderEvent::AudioTracks { tracks, current } => {
                model.update(|attrs| {
                    attrs.audio_tracks = tracks.clone();
                    if current < tracks.len() {
                        attrs.current_audio_track = Some(current);
                    }
                });
                MediaEvent::AudioTracks { tracks, current }
            }
            ProviderEvent::AudioTrackChanged(current) => {
                model.update(|attrs| {
                    if current < attrs.audio_tracks.len() {
                        attrs.current_audio_track = Some(current);
                    }
                });
                MediaEvent::AudioTrackChanged { current }
            }
            ProviderEvent::SubtitlesTracks(tracks) => MediaEvent::SubtitlesTracks { tracks },
        };
        self.trigger(upward);
    }
}

impl ProviderEventHandler for MediaController {
    fn on_provider_event(&self, event: ProviderEvent) {
        if self.is_destroyed() {
            return;
        }
        self.handle_provider_event(event);
    }
}

impl std::fmt::Debug for MediaController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaController")
            .field("id", &self.id)
            .field("provider", &self.provider.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlayRejection;
    use crate::simulated::{PlayOutcome, SimulatedProvider};
    use parking_lot::Mutex as PlMutex;

    fn controller(item: PlaylistItem) -> (Arc<MediaController>, Arc<SimulatedProvider>, Arc<MediaPool>) {
        let pool = Arc::new(MediaPool::new(2));
        let sink = ProviderEventSink::new();
        let provider = SimulatedProvider::new("html5", Some(pool.get_primed_element()), sink.clone());
        let controller = MediaController::new(provider.clone(), sink, item, pool.clone());
        let container = Arc::new(MediaContainer::new());
        controller.set_container(Some(container));
        (controller, provider, pool)
    }

    fn record(controller: &MediaController) -> Arc<PlMutex<Vec<MediaEvent>>> {
        let seen = Arc::new(PlMutex::new(Vec::new()));
        let s = seen.clone();
        controller.events().on(move |e| s.lock().push(e.clone()));
        seen
    }

    #[tokio::test]
    async fn test_first_play_loads_then_plays() {
        let (controller, provider, _) = controller(PlaylistItem::new("a.mp4"));
        let seen = record(&controller);

        controller.play(PlayReason::Interaction).await.unwrap();

        assert_eq!(provider.load_count(), 1);
        assert_eq!(provider.play_count(), 1);
        assert!(controller.is_started());
        assert!(matches!(seen.lock()[0], MediaEvent::PlayAttempt { reason: PlayReason::Interaction }));

        controller.play(PlayReason::External).await.unwrap();
        assert_eq!(provider.load_count(), 1);
        assert_eq!(provider.play_count(), 2);
    }

    #[tokio::test]
    async fn test_rejection_flags_model_and_emits_failure() {
        let (controller, provider, _) = controller(PlaylistItem::new("a.mp4"));
        provider.set_play_outcome(PlayOutcome::Reject(PlayRejection::NotAllowed));
        let seen = record(&controller);

        let err = controller.play(PlayReason::Autostart).await.unwrap_err();
        assert_eq!(err.code(), 303_210);
        assert!(controller.model().play_rejected());
        assert_eq!(controller.model().media_state(), MediaState::Paused);
        assert!(seen
            .lock()
            .iter()
            .any(|e| matches!(e, MediaEvent::PlayAttemptFailed { code: 303_210, .. })));
        // source was set by load, so no retry
        assert_eq!(provider.load_count(), 1);
    }

    #[tokio::test]
    async fn test_rejection_with_blank_source_retries_once() {
        let (controller, provider, _) = controller(PlaylistItem::new("a.mp4"));
        provider.set_play_outcome(PlayOutcome::RejectOnceBlank(PlayRejection::Aborted));

        controller.play(PlayReason::External).await.unwrap();
        assert_eq!(provider.load_count(), 2);
        assert_eq!(provider.play_count(), 2);
        assert!(controller.is_started());
    }

    #[tokio::test]
    async fn test_detach_mid_load_suppresses_play() {
        let (controller, provider, _) = controller(PlaylistItem::new("a.mp4"));
        provider.set_load_delay(std::time::Duration::from_millis(50));

        let c = controller.clone();
        let play = tokio::spawn(async move { c.play(PlayReason::External).await });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        controller.detach();

        play.await.unwrap().unwrap();
        assert_eq!(provider.load_count(), 1);
        assert_eq!(provider.play_count(), 0);
        assert!(!controller.is_started());
    }

    #[tokio::test]
    async fn test_detached_events_delivered_in_order_on_attach() {
        let (controller, provider, _) = controller(PlaylistItem::new("a.mp4"));
        let seen = record(&controller);

        controller.detach();
        provider.emit_state(MediaState::Buffering);
        provider.emit_time(1.0, 10.0);
        provider.emit_time(2.0, 10.0);
        assert!(seen.lock().is_empty());

        controller.attach();
        let seen = seen.lock();
        assert_eq!(seen.len(), 3);
        assert!(matches!(seen[0], MediaEvent::State { new: MediaState::Buffering, .. }));
        assert!(matches!(seen[1], MediaEvent::Time { position, .. } if position == 1.0));
        assert!(matches!(seen[2], MediaEvent::Time { position, .. } if position == 2.0));
    }

    #[tokio::test]
    async fn test_complete_in_background_is_deferred() {
        let (controller, provider, _) = controller(PlaylistItem::new("a.mp4"));
        let seen = record(&controller);

        controller.set_background(true);
        assert!(controller.is_background());
        provider.finish();
        assert!(controller.before_complete());
        assert!(seen.lock().is_empty());

        controller.set_background(false);
        assert!(!controller.before_complete());
        let seen = seen.lock();
        assert!(matches!(seen[0], MediaEvent::BeforeComplete));
        assert!(matches!(seen.last(), Some(MediaEvent::Complete)));
    }

    #[tokio::test]
    async fn test_background_does_not_pause() {
        let (controller, provider, _) = controller(PlaylistItem::new("a.mp4"));
        controller.play(PlayReason::External).await.unwrap();
        controller.set_background(true);
        assert_eq!(provider.pause_count(), 0);
        controller.set_background(false);
        assert!(!controller.is_background());
    }

    #[tokio::test]
    async fn test_provider_error_before_setup_is_setup_error() {
        let (controller, provider, _) = controller(PlaylistItem::new("a.mp4"));
        let seen = record(&controller);
        provider.fail(224_002, "decode");
        assert!(matches!(seen.lock()[0], MediaEvent::SetupError { code: 324_002, .. }));
    }

    #[tokio::test]
    async fn test_load_failure_becomes_setup_error() {
        let (controller, provider, _) = controller(PlaylistItem::new("a.mp4"));
        provider.fail_next_load(Error::Internal("decoder missing".to_string()));
        let seen = record(&controller);

        let err = controller.play(PlayReason::External).await.unwrap_err();
        assert!(matches!(err, Error::MediaSetup { code: 900_000, .. }));
        assert_eq!(err.kind(), crate::error::ErrorKind::Setup);
        assert!(seen
            .lock()
            .iter()
            .any(|e| matches!(e, MediaEvent::SetupError { code: 900_000, .. })));
        assert_eq!(provider.play_count(), 0);
    }

    #[tokio::test]
    async fn test_provider_error_after_setup_is_media_error() {
        let (controller, provider, _) = controller(PlaylistItem::new("a.mp4"));
        controller.play(PlayReason::External).await.unwrap();
        let seen = record(&controller);
        provider.fail(224_003, "decode");
        assert!(matches!(
            seen.lock().last(),
            Some(MediaEvent::MediaError { code: 224_003, .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_media_type_dropped() {
        let (controller, provider, _) = controller(PlaylistItem::new("a.mp4"));
        let seen = record(&controller);
        provider.emit(ProviderEvent::MediaType(MediaType::Video));
        provider.emit(ProviderEvent::MediaType(MediaType::Video));
        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_time_clears_starttime() {
        let mut item = PlaylistItem::new("a.mp4");
        item.starttime = Some(12.0);
        let (controller, provider, _) = controller(item);
        provider.emit_time(12.5, 60.0);
        assert_eq!(controller.item().starttime, None);
    }

    #[tokio::test]
    async fn test_seek_before_setup_moves_start() {
        let (controller, provider, _) = controller(PlaylistItem::new("a.mp4"));
        controller.seek(30.0);
        assert_eq!(controller.item().starttime, Some(30.0));
        assert_eq!(provider.seek_count(), 0);
    }

    #[tokio::test]
    async fn test_preload_once() {
        let (controller, provider, _) = controller(PlaylistItem::new("a.mp4"));
        controller.preload();
        controller.preload();
        assert_eq!(provider.preload_count(), 1);
    }

    #[tokio::test]
    async fn test_destroy_idempotent_and_recycles() {
        let (controller, provider, pool) = controller(PlaylistItem::new("a.mp4"));
        let available = pool.available();
        controller.destroy();
        controller.destroy();
        assert_eq!(provider.destroy_count(), 1);
        assert_eq!(pool.available(), available + 1);
        assert_eq!(
            controller.play(PlayReason::External).await,
            Err(Error::PlaybackCancelled)
        );
    }
}
