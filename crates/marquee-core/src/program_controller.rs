//! Transitions between playlist items
//!
//! The program controller owns the playlist, the single active
//! [`MediaController`] and a background slot. The slot holds at most one
//! controller preloading the upcoming item ("next") and at most one
//! controller parked while an ad plays ("current").

use std::future::Future;
use std::sync::{Arc, Weak};

use futures::future::{self, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::events::{EventBus, MediaEvent};
use crate::media_controller::MediaController;
use crate::model::MediaModel;
use crate::pool::{MediaContainer, MediaElement, MediaPool};
use crate::provider::{ProviderContext, ProviderEventSink, ProviderFactory, ProviderRegistry};
use crate::types::*;

type LoadFuture = Shared<BoxFuture<'static, Result<Arc<MediaController>>>>;
type NextFuture = Shared<BoxFuture<'static, Option<Arc<MediaController>>>>;

/// Where controllers get their media element from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementSource {
    /// A fresh element from the pool per controller
    Pooled,
    /// The pool's dedicated ad element
    Ad,
}

struct NextMedia {
    seq: u64,
    item: PlaylistItem,
    load: NextFuture,
}

#[derive(Default)]
struct BackgroundSlot {
    next: Option<NextMedia>,
    current: Option<Arc<MediaController>>,
}

struct ProgramState {
    playlist: Vec<PlaylistItem>,
    index: usize,
    active: Option<Arc<MediaController>>,
    background: BackgroundSlot,
    load: Option<LoadFuture>,
    transition: CancelToken,
    next_seq: u64,
    attached: bool,
    ad_playing: bool,
    cast_active: bool,
    container: Option<Arc<MediaContainer>>,
    muted: bool,
    volume: u8,
}

/// Sequences media controllers across playlist items
pub struct ProgramController {
    registry: Arc<ProviderRegistry>,
    pool: Arc<MediaPool>,
    elements: ElementSource,
    events: EventBus<MediaEvent>,
    state: Mutex<ProgramState>,
}

fn spawn_shared<T, F>(fut: F) -> Shared<BoxFuture<'static, Result<T>>>
where
    T: Clone + Send + Sync + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    let handle = tokio::spawn(fut);
    async move { handle.await.map_err(|e| Error::Internal(e.to_string()))? }
        .boxed()
        .shared()
}

impl ProgramController {
    pub fn new(registry: Arc<ProviderRegistry>, pool: Arc<MediaPool>, elements: ElementSource) -> Arc<Self> {
        Arc::new(Self {
            registry,
            pool,
            elements,
            events: EventBus::new(),
            state: Mutex::new(ProgramState {
                playlist: Vec::new(),
                index: 0,
                active: None,
                background: BackgroundSlot::default(),
                load: None,
                transition: CancelToken::new(),
                next_seq: 0,
                attached: true,
                ad_playing: false,
                cast_active: false,
                container: None,
                muted: false,
                volume: 100,
            }),
        })
    }

    /// Events of the active controller
    pub fn events(&self) -> &EventBus<MediaEvent> {
        &self.events
    }

    pub fn pool(&self) -> &Arc<MediaPool> {
        &self.pool
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn set_playlist(&self, playlist: Vec<PlaylistItem>) {
        let mut state = self.state.lock();
        state.playlist = playlist;
        state.index = 0;
    }

    pub fn playlist(&self) -> Vec<PlaylistItem> {
        self.state.lock().playlist.clone()
    }

    pub fn playlist_len(&self) -> usize {
        self.state.lock().playlist.len()
    }

    pub fn item(&self, index: usize) -> Option<PlaylistItem> {
        self.state.lock().playlist.get(index).cloned()
    }

    pub fn current_index(&self) -> usize {
        self.state.lock().index
    }

    pub fn active(&self) -> Option<Arc<MediaController>> {
        self.state.lock().active.clone()
    }

    /// Model of the active controller, if any
    pub fn active_model(&self) -> Option<Arc<MediaModel>> {
        self.active().map(|c| c.model())
    }

    /// Controller parked while an ad plays
    pub fn background_media(&self) -> Option<Arc<MediaController>> {
        self.state.lock().background.current.clone()
    }

    /// Item staged in the background "next" slot
    pub fn next_item(&self) -> Option<PlaylistItem> {
        self.state.lock().background.next.as_ref().map(|n| n.item.clone())
    }

    pub fn is_attached(&self) -> bool {
        self.state.lock().attached
    }

    pub fn is_cast_active(&self) -> bool {
        self.state.lock().cast_active
    }

    pub fn is_ad_playing(&self) -> bool {
        self.state.lock().ad_playing
    }

    pub fn set_container(&self, container: Option<Arc<MediaContainer>>) {
        let active = {
            let mut state = self.state.lock();
            state.container = container.clone();
            state.active.clone()
        };
        if let (Some(active), Some(_)) = (active, &container) {
            active.set_container(container);
        }
    }

    pub fn container(&self) -> Option<Arc<MediaContainer>> {
        self.state.lock().container.clone()
    }

    /// Make playlist entry `index` the active item.
    ///
    /// Later calls supersede earlier ones: a superseded call destroys the
    /// controller it built and resolves to [`Error::Superseded`].
    #[instrument(skip(self))]
    pub async fn set_active_item(self: &Arc<Self>, index: usize) -> Result<Arc<MediaController>> {
        let (item, token, is_next, cast_active) = {
            let mut state = self.state.lock();
            let item = state
                .playlist
                .get(index)
                .cloned()
                .ok_or(Error::ItemNotFound(index))?;
            state.index = index;
            state.transition.cancel();
            state.transition = CancelToken::new();
            let is_next = state
                .background
                .next
                .as_ref()
                .map_or(false, |next| next.item.same_first_source(&item));
            (item, state.transition.clone(), is_next, state.cast_active)
        };
        if item.first_source().is_none() {
            return Err(Error::NoMedia);
        }

        if is_next {
            debug!(index, "Promoting background media");
            self.destroy_active_media();
            let this = self.clone();
            let load = spawn_shared(async move { this.activate_background_media(item, token).await });
            self.state.lock().load = Some(load.clone());
            return load.await;
        }

        self.destroy_background_media();

        if let Some(active) = self.active() {
            if cast_active || self.registry.provider_can_play(active.provider().as_ref(), &item) {
                debug!(index, provider = active.provider_name(), "Reusing active media");
                active.set_active_item(item);
                self.set_active_media(&active, None);
                self.state.lock().load = Some(future::ready(Ok(active.clone())).boxed().shared());
                return Ok(active);
            }
            self.destroy_active_media();
        }

        let this = self.clone();
        let load = spawn_shared(async move { this.build_active_media(item, token).await });
        self.state.lock().load = Some(load.clone());
        load.await
    }

    async fn build_active_media(
        self: Arc<Self>,
        item: PlaylistItem,
        token: CancelToken,
    ) -> Result<Arc<MediaController>> {
        let controller = self.setup_media_controller(&item).await?;
        if !self.set_active_media(&controller, Some(&token)) {
            debug!("Discarding superseded media");
            controller.destroy();
            return Err(Error::Superseded);
        }
        Ok(controller)
    }

    async fn activate_background_media(
        self: Arc<Self>,
        item: PlaylistItem,
        token: CancelToken,
    ) -> Result<Arc<MediaController>> {
        let (parked, next) = {
            let mut state = self.state.lock();
            (state.background.current.take(), state.background.next.take())
        };
        if let Some(parked) = parked {
            parked.destroy();
        }
        let controller = match next {
            Some(next) => next.load.await,
            None => None,
        };
        let Some(controller) = controller else {
            warn!("Background preload failed, building fresh media");
            return self.build_active_media(item, token).await;
        };

        let ad_playing = {
            let mut state = self.state.lock();
            if token.is_cancelled() {
                None
            } else if state.ad_playing {
                state.background.current = Some(controller.clone());
                Some(true)
            } else {
                Some(false)
            }
        };
        match ad_playing {
            None => {
                controller.destroy();
                Err(Error::Superseded)
            }
            Some(true) => Ok(controller),
            Some(false) => {
                if !self.set_active_media(&controller, Some(&token)) {
                    controller.destroy();
                    return Err(Error::Superseded);
                }
                controller.set_background(false);
                Ok(controller)
            }
        }
    }

    /// Install `controller` as the active media.
    ///
    /// With a `token`, nothing happens once that token was superseded; the
    /// check and the install happen under one lock.
    fn set_active_media(self: &Arc<Self>, controller: &Arc<MediaController>, token: Option<&CancelToken>) -> bool {
        let container = {
            let mut state = self.state.lock();
            if token.map_or(false, CancelToken::is_cancelled) {
                return false;
            }
            state.active = Some(controller.clone());
            state.container.clone()
        };
        if container.is_some() {
            controller.set_container(container);
        }
        self.forward(controller, Arc::downgrade(self));
        let media_state = controller.model().media_state();
        self.events.emit(MediaEvent::State {
            old: media_state,
            new: media_state,
        });
        true
    }

    fn forward(&self, controller: &MediaController, target: Weak<ProgramController>) {
        controller.events().off_all();
        controller.events().on(move |event| {
            if let Some(program) = target.upgrade() {
                program.events.emit(event.clone());
            }
        });
    }

    /// Deliver the active controller's events through this controller again
    pub fn forward_events(self: &Arc<Self>) {
        if let Some(active) = self.active() {
            self.forward(&active, Arc::downgrade(self));
        }
    }

    /// Send the active controller's events to `target` instead; `None` mutes them
    pub fn route_events(&self, target: Option<Arc<EventBus<MediaEvent>>>) {
        let Some(active) = self.active() else {
            return;
        };
        active.events().off_all();
        if let Some(target) = target {
            active.events().on(move |event| target.emit(event.clone()));
        }
    }

    async fn setup_media_controller(&self, item: &PlaylistItem) -> Result<Arc<MediaController>> {
        let name = self.registry.choose(item)?;
        let factory = self.registry.factory(&name).await?;
        let element = match self.elements {
            ElementSource::Pooled => self.pool.get_primed_element(),
            ElementSource::Ad => self.pool.ad_element(),
        };
        self.create_controller(factory.as_ref(), Some(element), item.clone())
    }

    fn create_controller(
        &self,
        factory: &dyn ProviderFactory,
        element: Option<Arc<MediaElement>>,
        item: PlaylistItem,
    ) -> Result<Arc<MediaController>> {
        let (muted, volume) = {
            let state = self.state.lock();
            (state.muted, state.volume)
        };
        let sink = ProviderEventSink::new();
        let context = ProviderContext {
            element: element.clone(),
            events: sink.clone(),
            muted,
            volume,
        };
        match factory.create(context) {
            Ok(provider) => Ok(MediaController::new(provider, sink, item, self.pool.clone())),
            Err(e) => {
                if let Some(element) = &element {
                    self.pool.recycle(element);
                }
                Err(match e {
                    Error::NoSuitableProvider(_) | Error::ProviderLoad { .. } | Error::SetupFailed(_) => e,
                    other => Error::SetupFailed(other.to_string()),
                })
            }
        }
    }

    fn destroy_active_media(&self) {
        let active = self.state.lock().active.take();
        if let Some(active) = active {
            active.detach();
            active.destroy();
        }
    }

    fn destroy_background_media(&self) {
        let (current, next) = {
            let mut state = self.state.lock();
            (state.background.current.take(), state.background.next.take())
        };
        if let Some(current) = current {
            current.destroy();
        }
        if let Some(next) = next {
            destroy_when_loaded(next.load);
        }
    }

    /// Build and preload a controller for `item` in the background slot
    pub fn background_load(self: &Arc<Self>, item: PlaylistItem) {
        let (seq, stale) = {
            let mut state = self.state.lock();
            if let Some(next) = &state.background.next {
                if next.item.same_first_source(&item) {
                    debug!(item = item.display_title(), "Background load already staged");
                    return;
                }
            }
            state.next_seq += 1;
            (state.next_seq, state.background.next.take())
        };
        if let Some(stale) = stale {
            destroy_when_loaded(stale.load);
        }

        info!(item = item.display_title(), "Background loading");
        let this = self.clone();
        let staged = item.clone();
        let handle = tokio::spawn(async move {
            match this.setup_media_controller(&staged).await {
                Ok(controller) => {
                    controller.preload();
                    Some(controller)
                }
                Err(e) => {
                    warn!(error = %e, "Background load failed");
                    let mut state = this.state.lock();
                    if state.background.next.as_ref().map(|n| n.seq) == Some(seq) {
                        state.background.next = None;
                    }
                    None
                }
            }
        });
        let load = async move { handle.await.ok().flatten() }.boxed().shared();
        self.state.lock().background.next = Some(NextMedia { seq, item, load });
    }

    /// Resume position is recorded into the item on detach
    pub fn set_attached(&self, attached: bool) -> Option<Arc<MediaElement>> {
        let active = {
            let mut state = self.state.lock();
            state.attached = attached;
            state.active.clone()
        };
        let active = active?;
        if attached {
            active.attach();
            return None;
        }
        let element = active.detach();
        let position = active.model().position();
        if position > 0.0 {
            active.set_starttime(Some(position));
            let mut state = self.state.lock();
            let index = state.index;
            if let Some(item) = state.playlist.get_mut(index) {
                item.starttime = Some(position);
            }
        }
        element
    }

    /// Play the active item, waiting for an in-flight load first
    #[instrument(skip(self))]
    pub async fn play_video(&self, reason: PlayReason) -> Result<()> {
        let (active, load) = {
            let state = self.state.lock();
            if state.playlist.get(state.index).is_none() {
                return Err(Error::NoMedia);
            }
            (state.active.clone(), state.load.clone())
        };
        if let Some(active) = active {
            return active.play(reason).await;
        }
        let Some(load) = load else {
            return Err(Error::PlaybackCancelled);
        };
        let controller = load.await?;
        let still_active = self
            .active()
            .map_or(false, |a| Arc::ptr_eq(&a, &controller));
        if still_active {
            controller.play(reason).await
        } else {
            Err(Error::PlaybackCancelled)
        }
    }

    /// Stop and reset the active model to the item's start
    pub fn stop_video(&self) {
        let (active, item) = {
            let state = self.state.lock();
            (state.active.clone(), state.playlist.get(state.index).cloned())
        };
        let Some(active) = active else {
            return;
        };
        if let Some(item) = item {
            active.model().update(|attrs| {
                attrs.play_rejected = false;
                attrs.position = item.starttime.unwrap_or(0.0);
                attrs.current_time = 0.0;
                attrs.duration = item.duration.unwrap_or(0.0);
            });
        }
        active.stop();
    }

    pub fn preload_video(&self) {
        let media = {
            let state = self.state.lock();
            state.active.clone().or_else(|| state.background.current.clone())
        };
        if let Some(media) = media {
            media.preload();
        }
    }

    pub fn pause(&self) {
        if let Some(active) = self.active() {
            active.pause();
        }
    }

    pub fn seek(&self, position: f64) {
        if let Some(active) = self.active() {
            active.seek(position);
        }
    }

    pub fn set_mute(&self, muted: bool) {
        let media = {
            let mut state = self.state.lock();
            state.muted = muted;
            [state.active.clone(), state.background.current.clone()]
        };
        self.pool.sync_mute(muted);
        for controller in media.into_iter().flatten() {
            controller.set_mute(muted);
        }
    }

    pub fn set_volume(&self, volume: u8) {
        let media = {
            let mut state = self.state.lock();
            state.volume = volume;
            [state.active.clone(), state.background.current.clone()]
        };
        self.pool.sync_volume(volume);
        for controller in media.into_iter().flatten() {
            controller.set_volume(volume);
        }
    }

    pub fn set_playback_rate(&self, rate: f64) {
        if let Some(active) = self.active() {
            active.set_playback_rate(rate);
        }
    }

    /// Completion is pending on the active or parked controller
    pub fn before_complete(&self) -> bool {
        let state = self.state.lock();
        match (&state.active, &state.background.current) {
            (Some(active), _) => active.before_complete(),
            (None, Some(current)) => current.before_complete(),
            (None, None) => false,
        }
    }

    /// Hand playback to an element-less provider, keeping the position
    #[instrument(skip(self, factory, item))]
    pub fn cast_video(self: &Arc<Self>, factory: &dyn ProviderFactory, item: PlaylistItem) -> Result<()> {
        let current_time = self
            .active_model()
            .map_or(0.0, |m| m.snapshot().current_time);
        let mut cast_item = item;
        cast_item.starttime = Some(current_time);

        self.destroy_active_media();
        let controller = self.create_controller(factory, None, cast_item)?;
        {
            let mut state = self.state.lock();
            state.cast_active = true;
            state.transition.cancel();
            state.transition = CancelToken::new();
            state.load = Some(future::ready(Ok(controller.clone())).boxed().shared());
        }
        self.set_active_media(&controller, None);
        controller.model().update(|attrs| attrs.current_time = current_time);
        info!(provider = factory.name(), position = current_time, "Casting");
        Ok(())
    }

    /// Return from casting to local playback at the cast position
    pub async fn stop_cast(self: &Arc<Self>) -> Result<Arc<MediaController>> {
        let current_time = self
            .active_model()
            .map_or(0.0, |m| m.snapshot().current_time);
        let index = {
            let mut state = self.state.lock();
            state.cast_active = false;
            let index = state.index;
            if let Some(item) = state.playlist.get_mut(index) {
                item.starttime = Some(current_time);
            }
            index
        };
        self.stop_video();
        self.destroy_active_media();
        self.set_active_item(index).await
    }

    /// Park the active controller while an ad takes over
    pub fn background_active_media(&self) {
        let (active, previous) = {
            let mut state = self.state.lock();
            state.ad_playing = true;
            let Some(active) = state.active.take() else {
                return;
            };
            let previous = state.background.current.replace(active.clone());
            (active, previous)
        };
        if let Some(previous) = previous {
            previous.destroy();
        }
        active.set_background(true);
        debug!(controller = %active.id(), "Active media backgrounded");
    }

    /// Bring the parked controller back after an ad
    pub fn restore_background_media(self: &Arc<Self>) {
        let (current, has_active) = {
            let mut state = self.state.lock();
            state.ad_playing = false;
            (state.background.current.take(), state.active.is_some())
        };
        let Some(current) = current else {
            return;
        };
        if has_active {
            current.destroy();
            return;
        }
        current.model().update(|attrs| {
            attrs.media_state = match attrs.media_state {
                MediaState::Idle => MediaState::Paused,
                MediaState::Paused => MediaState::Paused,
                _ => MediaState::Buffering,
            };
        });
        self.set_active_media(&current, None);
        current.set_background(false);
        debug!(controller = %current.id(), "Background media restored");
    }

    pub fn set_current_quality(&self, index: usize) {
        if let Some(active) = self.active() {
            active.set_current_quality(index);
        }
    }

    pub fn set_current_audio_track(&self, index: usize) {
        if let Some(active) = self.active() {
            active.set_current_audio_track(index);
        }
    }

    /// Tear down every controller
    pub fn destroy(&self) {
        self.events.off_all();
        self.state.lock().transition.cancel();
        self.destroy_background_media();
        self.destroy_active_media();
    }
}

/// Destroy a staged controller once its preload settles
fn destroy_when_loaded(load: NextFuture) {
    if let Some(controller) = load.clone().now_or_never() {
        if let Some(controller) = controller {
            controller.destroy();
        }
        return;
    }
    tokio::spawn(async move {
        if let Some(controller) = load.await {
            controller.destroy();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderEntry;
    use crate::simulated::{SimulatedLoader, SimulatedProviderFactory};
    use std::time::Duration;

    fn program(items: Vec<PlaylistItem>) -> (Arc<ProgramController>, Arc<SimulatedProviderFactory>) {
        let factory = Arc::new(SimulatedProviderFactory::new("html5"));
        let registry = Arc::new(ProviderRegistry::with_loader(Arc::new(SimulatedLoader::new())));
        registry.register(ProviderEntry::loaded(
            factory.clone(),
            vec![SourceKind::Mp4, SourceKind::Webm],
        ));
        registry.register(ProviderEntry::deferred("hlsjs", vec![SourceKind::Hls]));
        let program = ProgramController::new(registry, Arc::new(MediaPool::new(3)), ElementSource::Pooled);
        program.set_container(Some(Arc::new(MediaContainer::new())));
        program.set_playlist(items);
        (program, factory)
    }

    #[tokio::test]
    async fn test_reuses_controller_for_same_provider() {
        let (program, _) = program(vec![PlaylistItem::new("a.mp4"), PlaylistItem::new("b.mp4")]);
        let first = program.set_active_item(0).await.unwrap();
        let second = program.set_active_item(1).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.item().sources[0].file, "b.mp4");
    }

    #[tokio::test]
    async fn test_provider_switch_destroys_old() {
        let (program, _) = program(vec![PlaylistItem::new("a.mp4"), PlaylistItem::new("b.m3u8")]);
        let first = program.set_active_item(0).await.unwrap();
        let second = program.set_active_item(1).await.unwrap();
        assert!(first.is_destroyed());
        assert_eq!(second.provider_name(), "hlsjs");
    }

    #[tokio::test]
    async fn test_missing_source_is_no_media() {
        let (program, _) = program(vec![PlaylistItem::default()]);
        assert_eq!(program.set_active_item(0).await.unwrap_err(), Error::NoMedia);
        assert_eq!(program.set_active_item(4).await.unwrap_err(), Error::ItemNotFound(4));
    }

    #[tokio::test]
    async fn test_set_attached_records_resume_position() {
        let (program, factory) = program(vec![PlaylistItem::new("a.mp4")]);
        let controller = program.set_active_item(0).await.unwrap();
        controller.play(PlayReason::External).await.unwrap();
        factory.last().unwrap().emit_time(42.0, 100.0);

        program.set_attached(false);
        assert_eq!(program.item(0).unwrap().starttime, Some(42.0));
        assert!(!controller.is_attached());
        program.set_attached(true);
        assert!(controller.is_attached());
    }

    #[tokio::test]
    async fn test_play_video_waits_for_load() {
        let (program, _) = program(vec![PlaylistItem::new("a.m3u8")]);
        let (controller, played) = tokio::join!(
            program.set_active_item(0),
            program.play_video(PlayReason::External)
        );
        played.unwrap();
        assert!(controller.unwrap().is_started());
    }

    #[tokio::test]
    async fn test_background_load_same_item_ignored() {
        let (program, factory) = program(vec![PlaylistItem::new("a.mp4"), PlaylistItem::new("b.mp4")]);
        program.set_active_item(0).await.unwrap();
        let created = factory.created_count();

        program.background_load(PlaylistItem::new("b.mp4"));
        program.background_load(PlaylistItem::new("b.mp4"));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(factory.created_count(), created + 1);
        assert_eq!(factory.last().unwrap().preload_count(), 1);
    }

    #[tokio::test]
    async fn test_background_and_restore() {
        let (program, factory) = program(vec![PlaylistItem::new("a.mp4")]);
        let controller = program.set_active_item(0).await.unwrap();
        controller.play(PlayReason::External).await.unwrap();
        factory.last().unwrap().emit_state(MediaState::Playing);

        program.background_active_media();
        assert!(program.active().is_none());
        assert!(controller.is_background());
        assert!(program.is_ad_playing());

        program.restore_background_media();
        let restored = program.active().unwrap();
        assert!(Arc::ptr_eq(&restored, &controller));
        assert!(!restored.is_background());
        assert_eq!(restored.model().media_state(), MediaState::Buffering);
    }

    #[tokio::test]
    async fn test_replaced_background_load_destroyed_once_settled() {
        let (program, factory) = program(vec![
            PlaylistItem::new("a.mp4"),
            PlaylistItem::new("b.mp4"),
            PlaylistItem::new("c.mp4"),
        ]);
        program.set_active_item(0).await.unwrap();

        program.background_load(PlaylistItem::new("b.mp4"));
        program.background_load(PlaylistItem::new("c.mp4"));
        tokio::time::sleep(Duration::from_millis(10)).await;

        let created = factory.created();
        assert_eq!(created.len(), 3);
        assert_eq!(created[1].destroy_count(), 1);
        assert_eq!(created[2].destroy_count(), 0);
        assert_eq!(created[2].preload_count(), 1);

        let promoted = program.set_active_item(2).await.unwrap();
        assert_eq!(factory.created_count(), 3);
        assert_eq!(promoted.item().sources[0].file, "c.mp4");
        assert!(std::ptr::eq(
            Arc::as_ptr(promoted.provider()) as *const u8,
            Arc::as_ptr(&created[2]) as *const u8
        ));
    }

    #[tokio::test]
    async fn test_cast_handoff_and_back() {
        let (program, factory) = program(vec![PlaylistItem::new("a.mp4")]);
        let local = program.set_active_item(0).await.unwrap();
        local.play(PlayReason::External).await.unwrap();
        factory.last().unwrap().emit_time(30.0, 100.0);

        let cast = SimulatedProviderFactory::new("cast");
        program.cast_video(&cast, program.item(0).unwrap()).unwrap();
        assert!(program.is_cast_active());
        assert!(local.is_destroyed());
        let remote = program.active().unwrap();
        assert_eq!(remote.provider_name(), "cast");
        assert_eq!(remote.model().snapshot().current_time, 30.0);

        let rebuilt = program.stop_cast().await.unwrap();
        assert!(!program.is_cast_active());
        assert!(remote.is_destroyed());
        assert_eq!(rebuilt.provider_name(), "html5");
        assert!(!Arc::ptr_eq(&rebuilt, &local));
        assert_eq!(factory.created_count(), 2);
        assert_eq!(program.item(0).unwrap().starttime, Some(30.0));
    }
}
