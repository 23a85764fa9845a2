//! Facade-side sequencing
//!
//! The orchestrator turns high-level intents (load, play, seek, next, ads,
//! autoplay) into calls on the program controller, and turns the active
//! controller's media events into [`PlayerEvent`]s.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::autoplay::{AutoplayOptions, AutoplayOutcome, AutoplayProbe, AutoplayTester};
use crate::cancel::CancelToken;
use crate::captions::{CaptionsEvent, CaptionsTrackManager, TrackParser};
use crate::config::{NextUpOffset, PlayerConfig};
use crate::error::{Error, Result};
use crate::events::{EventBus, EventEmitter, MediaEvent, PlayerEvent, PlayerEventRecord};
use crate::instream::{AdEvent, InstreamAdapter};
use crate::pool::{MediaContainer, MediaPool};
use crate::program_controller::{ElementSource, ProgramController};
use crate::provider::{ProviderFactory, ProviderRegistry};
use crate::types::*;

/// Playback rate bounds
pub const MIN_PLAYBACK_RATE: f64 = 0.25;
pub const MAX_PLAYBACK_RATE: f64 = 4.0;

/// Volume restored when unmuting from silence
const MIN_UNMUTE_VOLUME: u8 = 10;

/// Code attached to caption track warnings
const CAPTIONS_WARNING_CODE: u32 = 306_001;

/// External collaborators the orchestrator drives
#[derive(Clone)]
pub struct Collaborators {
    pub registry: Arc<ProviderRegistry>,
    pub autoplay: Arc<dyn AutoplayTester>,
    pub track_parser: Arc<dyn TrackParser>,
}

struct OrchestratorState {
    player_state: PlayerState,
    muted: bool,
    volume: u8,
    autostart_muted: bool,
    playback_rate: f64,
    play_reason: PlayReason,
    instream: Option<Arc<InstreamAdapter>>,
    autoplay_token: Option<CancelToken>,
    nextup_fired: bool,
    destroyed: bool,
}

/// Top-level coordinator behind the player facade
pub struct Orchestrator {
    this: Weak<Orchestrator>,
    config: PlayerConfig,
    program: Arc<ProgramController>,
    autoplay: AutoplayProbe,
    captions: Arc<CaptionsTrackManager>,
    emitter: EventEmitter,
    state: Mutex<OrchestratorState>,
}

impl Orchestrator {
    /// Build an orchestrator with its own media pool and container
    pub fn new(config: PlayerConfig, collaborators: Collaborators) -> Result<Arc<Self>> {
        config.validate()?;
        let pool = Arc::new(MediaPool::new(config.pool_size));
        let program = ProgramController::new(collaborators.registry, pool.clone(), ElementSource::Pooled);
        program.set_container(Some(Arc::new(MediaContainer::new())));
        program.set_mute(config.mute);
        program.set_volume(config.volume);

        let orchestrator = Arc::new_cyclic(|this: &Weak<Orchestrator>| Self {
            this: this.clone(),
            autoplay: AutoplayProbe::new(collaborators.autoplay, pool),
            captions: CaptionsTrackManager::new(collaborators.track_parser),
            emitter: EventEmitter::default(),
            state: Mutex::new(OrchestratorState {
                player_state: PlayerState::Idle,
                muted: config.mute,
                volume: config.volume,
                autostart_muted: false,
                playback_rate: 1.0,
                play_reason: PlayReason::External,
                instream: None,
                autoplay_token: None,
                nextup_fired: false,
                destroyed: false,
            }),
            program,
            config,
        });

        let weak = orchestrator.this.clone();
        orchestrator.program.events().on(move |event| {
            if let Some(orchestrator) = weak.upgrade() {
                orchestrator.handle_media_event(event);
            }
        });
        let weak = orchestrator.this.clone();
        orchestrator.captions.events().on(move |event| {
            if let Some(orchestrator) = weak.upgrade() {
                orchestrator.handle_captions_event(event);
            }
        });
        info!(pool_size = orchestrator.config.pool_size, "Orchestrator created");
        Ok(orchestrator)
    }

    /// Facade events
    pub fn events(&self) -> &EventBus<PlayerEventRecord> {
        self.emitter.bus()
    }

    /// Every facade event emitted so far
    pub fn history(&self) -> Vec<PlayerEventRecord> {
        self.emitter.history()
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn program(&self) -> &Arc<ProgramController> {
        &self.program
    }

    pub fn captions(&self) -> &Arc<CaptionsTrackManager> {
        &self.captions
    }

    pub fn state(&self) -> PlayerState {
        self.state.lock().player_state
    }

    pub fn is_muted(&self) -> bool {
        self.state.lock().muted
    }

    pub fn volume(&self) -> u8 {
        self.state.lock().volume
    }

    pub fn autostart_muted(&self) -> bool {
        self.state.lock().autostart_muted
    }

    pub fn playback_rate(&self) -> f64 {
        self.state.lock().playback_rate
    }

    /// Reason given to the last play attempt
    pub fn play_reason(&self) -> PlayReason {
        self.state.lock().play_reason
    }

    pub fn instream(&self) -> Option<Arc<InstreamAdapter>> {
        self.state.lock().instream.clone()
    }

    pub fn current_index(&self) -> usize {
        self.program.current_index()
    }

    fn emit(&self, event: PlayerEvent) {
        self.emitter.emit(event);
    }

    fn set_player_state(&self, new: PlayerState) {
        let old = std::mem::replace(&mut self.state.lock().player_state, new);
        if old != new {
            self.emit(PlayerEvent::State { old, new });
        }
    }

    fn cancel_autoplay(&self) {
        if let Some(token) = self.state.lock().autoplay_token.take() {
            token.cancel();
        }
    }

    /// Replace the playlist and activate its first item
    #[instrument(skip(self, playlist), fields(count = playlist.len()))]
    pub async fn load(&self, playlist: Vec<PlaylistItem>) -> Result<()> {
        self.cancel_autoplay();
        if let Some(instream) = self.instream() {
            instream.set_no_resume(true);
            self.destroy_instream().await?;
        }
        self.program.stop_video();

        if playlist.is_empty() {
            let error = Error::NoMedia;
            self.emit(PlayerEvent::Error {
                code: error.code(),
                message: error.to_string(),
            });
            return Err(error);
        }
        let count = playlist.len();
        self.program.set_playlist(playlist);
        self.set_player_state(PlayerState::Idle);
        self.emit(PlayerEvent::PlaylistLoaded { count });
        info!(count, "Playlist loaded");

        self.activate(0).await?;
        if self.config.autostart {
            match self.start_autoplay().await {
                Err(e) if e.is_cancellation() => debug!("Autostart cancelled"),
                Err(e) => return Err(e),
                Ok(_) => {}
            }
        }
        Ok(())
    }

    /// Make `index` the active item, optionally skipping items that fail to set up
    async fn activate(&self, index: usize) -> Result<()> {
        let len = self.program.playlist_len();
        if len == 0 {
            return Err(Error::NoMedia);
        }
        let mut index = index % len;
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.program.set_active_item(index).await {
                Ok(_) => {
                    self.item_activated(index);
                    return Ok(());
                }
                Err(e) if e.is_cancellation() => return Err(e),
                Err(e) => {
                    warn!(index, error = %e, "Item setup failed");
                    self.emit(PlayerEvent::SetupError {
                        code: e.code(),
                        message: e.to_string(),
                    });
                    self.set_player_state(PlayerState::Error);
                    if !self.config.advance_on_setup_error || attempts >= len {
                        return Err(e);
                    }
                    index = (index + 1) % len;
                }
            }
        }
    }

    fn item_activated(&self, index: usize) {
        self.state.lock().nextup_fired = false;
        let Some(item) = self.program.item(index) else {
            return;
        };
        self.emit(PlayerEvent::PlaylistItem {
            index,
            title: item.display_title().to_string(),
        });
        self.captions.set_item(&item);
        let rate = self.state.lock().playback_rate;
        if rate != 1.0 {
            self.program.set_playback_rate(rate);
        }
    }

    /// Start or resume playback.
    ///
    /// Playing from `complete` restarts the playlist at item 0.
    #[instrument(skip(self))]
    pub async fn play(&self, reason: PlayReason) -> Result<()> {
        self.cancel_autoplay();
        if let Some(instream) = self.instream() {
            return instream.play().await;
        }
        if self.state() == PlayerState::Complete {
            debug!("Restarting playlist");
            self.program.stop_video();
            self.activate(0).await?;
        }
        self.state.lock().play_reason = reason;
        self.program.play_video(reason).await
    }

    pub fn pause(&self, reason: PauseReason) {
        self.cancel_autoplay();
        match self.instream() {
            Some(instream) => instream.pause(),
            None => self.program.pause(),
        }
        self.emit(PlayerEvent::Pause { reason });
    }

    /// Stop playback, ending any ad break without resuming the primary
    pub async fn stop(&self) -> Result<()> {
        self.cancel_autoplay();
        if let Some(instream) = self.instream() {
            instream.set_no_resume(true);
            self.destroy_instream().await?;
        }
        self.program.stop_video();
        self.set_player_state(PlayerState::Idle);
        Ok(())
    }

    pub fn seek(&self, position: f64) {
        if self.instream().is_some() {
            debug!(position, "Seek ignored during ad break");
            return;
        }
        self.program.seek(position);
    }

    /// Switch to item `index`, wrapping around the playlist
    #[instrument(skip(self))]
    pub async fn set_item(&self, index: usize) -> Result<()> {
        self.cancel_autoplay();
        self.program.stop_video();
        self.activate(index).await
    }

    /// Advance to the following item and play it
    pub async fn next(&self) -> Result<()> {
        let index = self.program.current_index() + 1;
        self.set_item(index).await?;
        self.play(PlayReason::Playlist).await
    }

    /// Probe autoplay and start playback if the runtime allows it
    #[instrument(skip(self))]
    pub async fn start_autoplay(&self) -> Result<AutoplayOutcome> {
        let token = CancelToken::new();
        let (muted, previous) = {
            let mut state = self.state.lock();
            (state.muted, state.autoplay_token.replace(token.clone()))
        };
        if let Some(previous) = previous {
            previous.cancel();
        }
        let options = AutoplayOptions {
            muted,
            allow_muted: self.config.allow_muted_autoplay,
            timeout: self.config.autoplay_timeout(),
        };

        let outcome = self.autoplay.test(options, &token).await?;
        // A newer probe or a user intent cancels ours before replacing it
        if token.is_cancelled() {
            return Err(Error::AutoplayCancelled);
        }
        self.state.lock().autoplay_token = None;

        match outcome {
            AutoplayOutcome::Enabled => {
                self.emit(PlayerEvent::Autostart { muted });
            }
            AutoplayOutcome::MutedRequired => {
                info!("Autoplay requires mute");
                self.set_mute(true);
                self.state.lock().autostart_muted = true;
                if self.config.enable_default_captions && self.captions.captions_list().len() > 1 {
                    self.set_captions(1);
                }
                self.emit(PlayerEvent::Autostart { muted: true });
            }
            AutoplayOutcome::Disabled(reason) => {
                info!(%reason, "Autoplay not allowed");
                self.emit(PlayerEvent::AutostartNotAllowed {
                    reason: reason.to_string(),
                });
                return Ok(outcome);
            }
        }
        self.state.lock().play_reason = PlayReason::Autostart;
        self.program.play_video(PlayReason::Autostart).await?;
        Ok(outcome)
    }

    /// Mute or unmute; unmuting clears the muted-autostart flag
    pub fn set_mute(&self, muted: bool) {
        let volume = {
            let mut state = self.state.lock();
            state.muted = muted;
            if !muted {
                state.autostart_muted = false;
                state.volume = state.volume.max(MIN_UNMUTE_VOLUME);
            }
            state.volume
        };
        self.program.set_mute(muted);
        if !muted {
            self.program.set_volume(volume);
        }
        if let Some(instream) = self.instream() {
            instream.set_mute(muted);
        }
        self.emit(PlayerEvent::Mute { muted });
    }

    /// Set the volume; zero mutes
    pub fn set_volume(&self, volume: u8) {
        let volume = volume.min(100);
        let mute_change = {
            let mut state = self.state.lock();
            state.volume = volume;
            let muted = volume == 0;
            (state.muted != muted).then_some(muted)
        };
        self.program.set_volume(volume);
        if let Some(instream) = self.instream() {
            instream.set_volume(volume);
        }
        self.emit(PlayerEvent::Volume { volume });
        if let Some(muted) = mute_change {
            if muted {
                self.set_mute(true);
            } else {
                self.state.lock().muted = false;
                self.program.set_mute(false);
                self.emit(PlayerEvent::Mute { muted: false });
            }
        }
    }

    /// Clamped to 0.25-4
    pub fn set_playback_rate(&self, rate: f64) -> f64 {
        let rate = rate.clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE);
        self.state.lock().playback_rate = rate;
        self.program.set_playback_rate(rate);
        rate
    }

    pub fn set_current_quality(&self, index: usize) {
        self.program.set_current_quality(index);
    }

    pub fn set_current_audio_track(&self, index: usize) {
        self.program.set_current_audio_track(index);
    }

    /// Select a captions entry; 0 turns captions off
    pub fn set_captions(&self, index: usize) -> usize {
        self.captions.select(index)
    }

    /// Start an ad break over the current item
    #[instrument(skip(self))]
    pub fn create_instream(&self) -> Result<Arc<InstreamAdapter>> {
        if let Some(existing) = self.instream() {
            if !existing.is_destroyed() {
                return Err(Error::InvalidStateTransition {
                    from: existing.state().to_string(),
                    to: "init".to_string(),
                });
            }
        }
        self.cancel_autoplay();
        let adapter = InstreamAdapter::new(self.program.clone());
        let weak = self.this.clone();
        let ad_weak = Arc::downgrade(&adapter);
        adapter.events().on(move |ad| {
            if let Some(orchestrator) = weak.upgrade() {
                orchestrator.handle_ad_event(ad, &ad_weak);
            }
        });
        adapter.init()?;
        let (muted, volume) = {
            let mut state = self.state.lock();
            state.instream = Some(adapter.clone());
            (state.muted, state.volume)
        };
        adapter.set_mute(muted);
        adapter.set_volume(volume);
        Ok(adapter)
    }

    /// End the ad break, resuming the primary as the adapter decides
    pub async fn destroy_instream(&self) -> Result<()> {
        let adapter = self.state.lock().instream.take();
        match adapter {
            Some(adapter) => adapter.destroy().await,
            None => Ok(()),
        }
    }

    /// Hand playback to a cast provider
    pub fn cast(&self, factory: &dyn ProviderFactory) -> Result<()> {
        let index = self.program.current_index();
        let item = self.program.item(index).ok_or(Error::ItemNotFound(index))?;
        self.program.cast_video(factory, item)?;
        self.emit(PlayerEvent::CastStarted);
        Ok(())
    }

    pub async fn stop_cast(&self) -> Result<()> {
        self.program.stop_cast().await?;
        self.emit(PlayerEvent::CastStopped);
        Ok(())
    }

    /// Detach the media element; the resume position is remembered
    pub fn detach_media(&self) {
        if self.instream().is_none() {
            self.program.set_attached(false);
        }
    }

    pub fn attach_media(&self) {
        if self.instream().is_none() {
            self.program.set_attached(true);
        }
    }

    /// Tear everything down
    pub async fn destroy(&self) {
        {
            let mut state = self.state.lock();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
        }
        self.cancel_autoplay();
        if let Some(instream) = self.instream() {
            instream.set_no_resume(true);
            if let Err(e) = self.destroy_instream().await {
                warn!(error = %e, "Ad break teardown failed");
            }
        }
        self.program.destroy();
        self.autoplay.clear();
        info!("Orchestrator destroyed");
    }

    fn handle_ad_event(&self, ad: &AdEvent, adapter: &Weak<InstreamAdapter>) {
        if matches!(ad, AdEvent::BreakEnd) {
            let mut state = self.state.lock();
            let current = state
                .instream
                .as_ref()
                .map_or(false, |i| std::ptr::eq(Arc::as_ptr(i), adapter.as_ptr()));
            if current {
                state.instream = None;
            }
        }
        self.emit(PlayerEvent::Ad { ad: ad.clone() });
    }

    fn handle_captions_event(&self, event: &CaptionsEvent) {
        match event {
            CaptionsEvent::List { tracks, current } => self.emit(PlayerEvent::CaptionsList {
                tracks: tracks.clone(),
                current: *current,
            }),
            CaptionsEvent::Changed { current, .. } => {
                self.emit(PlayerEvent::CaptionsChanged { current: *current })
            }
            CaptionsEvent::Loaded { .. } => {}
            CaptionsEvent::Error { id, message } => self.emit(PlayerEvent::Warning {
                code: CAPTIONS_WARNING_CODE,
                message: format!("{id}: {message}"),
            }),
        }
    }

    fn handle_media_event(&self, event: &MediaEvent) {
        if self.state.lock().destroyed {
            return;
        }
        let upward = match event {
            MediaEvent::PlayAttempt { reason } => PlayerEvent::PlayAttempt { reason: *reason },
            MediaEvent::PlayAttemptFailed { reason, code, message } => {
                self.set_player_state(PlayerState::Paused);
                PlayerEvent::PlayAttemptFailed {
                    reason: *reason,
                    code: *code,
                    message: message.clone(),
                }
            }
            MediaEvent::State { new, .. } => {
                if *new != MediaState::Complete {
                    self.set_player_state(PlayerState::from(*new));
                }
                return;
            }
            MediaEvent::Time { position, duration } => {
                self.check_nextup(*position, *duration);
                PlayerEvent::Time {
                    position: *position,
                    duration: *duration,
                }
            }
            MediaEvent::BufferChange { percent, .. } => PlayerEvent::Buffer { percent: *percent },
            MediaEvent::Seek { position, offset } => PlayerEvent::Seek {
                position: *position,
                offset: *offset,
            },
            MediaEvent::Seeked => PlayerEvent::Seeked,
            MediaEvent::FirstFrame => PlayerEvent::FirstFrame,
            MediaEvent::Meta { duration, .. } => PlayerEvent::Meta { duration: *duration },
            MediaEvent::MediaType { media_type } => PlayerEvent::MediaType {
                media_type: *media_type,
            },
            MediaEvent::Mute { muted } => PlayerEvent::Mute { muted: *muted },
            MediaEvent::Volume { volume } => PlayerEvent::Volume { volume: *volume },
            MediaEvent::VisualQuality(quality) => PlayerEvent::VisualQuality {
                quality: quality.clone(),
            },
            MediaEvent::Levels { levels, current } => PlayerEvent::Levels {
                levels: levels.clone(),
                current: *current,
            },
            MediaEvent::AudioTracks { tracks, current } => PlayerEvent::AudioTracks {
                tracks: tracks.clone(),
                current: *current,
            },
            MediaEvent::LevelsChanged { .. } | MediaEvent::AudioTrackChanged { .. } => return,
            MediaEvent::SubtitlesTracks { tracks } => {
                self.captions.set_subtitles_tracks(tracks);
                return;
            }
            MediaEvent::BeforeComplete => PlayerEvent::BeforeComplete,
            MediaEvent::Complete => {
                self.emit(PlayerEvent::Complete);
                self.spawn_item_complete();
                return;
            }
            MediaEvent::MediaError { code, message } => {
                self.set_player_state(PlayerState::Error);
                PlayerEvent::Error {
                    code: *code,
                    message: message.clone(),
                }
            }
            MediaEvent::SetupError { code, message } => {
                self.set_player_state(PlayerState::Error);
                PlayerEvent::SetupError {
                    code: *code,
                    message: message.clone(),
                }
            }
        };
        self.emit(upward);
    }

    /// Start preloading the next item once playback reaches the next-up point
    fn check_nextup(&self, position: f64, duration: f64) {
        if !duration.is_finite() || duration <= 0.0 {
            return;
        }
        let point = NextUpOffset::resolve(self.config.nextup_offset.as_ref(), duration);
        {
            let mut state = self.state.lock();
            if state.nextup_fired || position < point {
                return;
            }
            state.nextup_fired = true;
        }

        let len = self.program.playlist_len();
        let current = self.program.current_index();
        let next = if current + 1 < len {
            current + 1
        } else if self.config.repeat && len > 1 {
            0
        } else {
            return;
        };
        if let Some(item) = self.program.item(next) {
            debug!(next, point, position, "Next up");
            self.program.background_load(item);
            self.emit(PlayerEvent::NextUp { index: next });
        }
    }

    fn spawn_item_complete(&self) {
        let Some(this) = self.this.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = this.item_complete().await {
                if !e.is_cancellation() {
                    warn!(error = %e, "Advancing after completion failed");
                }
            }
        });
    }

    /// Advance, repeat, or finish the playlist after an item completes
    async fn item_complete(&self) -> Result<()> {
        if self.instream().is_some() {
            return Ok(());
        }
        let len = self.program.playlist_len();
        let index = self.program.current_index();
        if self.config.auto_advance && index + 1 < len {
            self.set_item(index + 1).await?;
            return self.play(PlayReason::Playlist).await;
        }
        if self.config.repeat && len > 0 {
            self.set_item((index + 1) % len).await?;
            return self.play(PlayReason::Repeat).await;
        }
        self.set_player_state(PlayerState::Complete);
        self.emit(PlayerEvent::PlaylistComplete);
        info!("Playlist complete");
        Ok(())
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("state", &self.state())
            .field("index", &self.program.current_index())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instream::InstreamOptions;
    use crate::provider::ProviderEntry;
    use crate::simulated::{AutoplayBehavior, SimulatedAutoplayTester, SimulatedLoader, SimulatedProviderFactory, StaticTrackParser};
    use std::time::Duration;

    struct Harness {
        orchestrator: Arc<Orchestrator>,
        factory: Arc<SimulatedProviderFactory>,
        events: Arc<Mutex<Vec<PlayerEvent>>>,
    }

    fn harness(config: PlayerConfig, behavior: AutoplayBehavior) -> Harness {
        let factory = Arc::new(SimulatedProviderFactory::new("html5"));
        let registry = Arc::new(ProviderRegistry::with_loader(Arc::new(SimulatedLoader::new())));
        registry.register(ProviderEntry::loaded(factory.clone(), vec![SourceKind::Mp4, SourceKind::Mp3]));
        registry.register(ProviderEntry::deferred("hlsjs", vec![SourceKind::Hls]));
        let orchestrator = Orchestrator::new(
            config,
            Collaborators {
                registry,
                autoplay: Arc::new(SimulatedAutoplayTester::new(behavior)),
                track_parser: Arc::new(StaticTrackParser::new()),
            },
        )
        .unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let seen = events.clone();
        orchestrator.events().on(move |record| seen.lock().push(record.event.clone()));
        Harness {
            orchestrator,
            factory,
            events,
        }
    }

    fn playlist() -> Vec<PlaylistItem> {
        vec![
            PlaylistItem::new("a.mp4").with_title("A").with_duration(100.0),
            PlaylistItem::new("b.mp4").with_title("B").with_duration(60.0),
        ]
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_load_and_play() {
        let h = harness(PlayerConfig::default(), AutoplayBehavior::Allow);
        h.orchestrator.load(playlist()).await.unwrap();
        h.orchestrator.play(PlayReason::Interaction).await.unwrap();

        assert_eq!(h.orchestrator.state(), PlayerState::Playing);
        let events = h.events.lock();
        assert!(matches!(events[0], PlayerEvent::PlaylistLoaded { count: 2 }));
        assert!(events
            .iter()
            .any(|e| matches!(e, PlayerEvent::PlaylistItem { index: 0, .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, PlayerEvent::PlayAttempt { reason: PlayReason::Interaction })));
    }

    #[tokio::test]
    async fn test_nextup_fires_at_default_offset() {
        let h = harness(PlayerConfig::default(), AutoplayBehavior::Allow);
        h.orchestrator.load(playlist()).await.unwrap();
        h.orchestrator.play(PlayReason::External).await.unwrap();
        let provider = h.factory.last().unwrap();

        provider.emit_time(89.0, 100.0);
        assert!(h.orchestrator.program().next_item().is_none());
        provider.emit_time(90.0, 100.0);
        assert_eq!(h.orchestrator.program().next_item().unwrap().sources[0].file, "b.mp4");
        assert!(h.events.lock().iter().any(|e| matches!(e, PlayerEvent::NextUp { index: 1 })));
    }

    #[tokio::test]
    async fn test_completion_advances() {
        let h = harness(PlayerConfig::default(), AutoplayBehavior::Allow);
        h.orchestrator.load(playlist()).await.unwrap();
        h.orchestrator.play(PlayReason::External).await.unwrap();

        h.factory.last().unwrap().finish();
        settle().await;
        assert_eq!(h.orchestrator.current_index(), 1);
        assert_eq!(h.orchestrator.play_reason(), PlayReason::Playlist);
        assert_eq!(h.orchestrator.state(), PlayerState::Playing);
    }

    #[tokio::test]
    async fn test_playlist_complete_then_restart() {
        let h = harness(PlayerConfig::default(), AutoplayBehavior::Allow);
        h.orchestrator.load(vec![PlaylistItem::new("a.mp4")]).await.unwrap();
        h.orchestrator.play(PlayReason::External).await.unwrap();

        h.factory.last().unwrap().finish();
        settle().await;
        assert_eq!(h.orchestrator.state(), PlayerState::Complete);
        assert!(h.events.lock().iter().any(|e| matches!(e, PlayerEvent::PlaylistComplete)));

        h.orchestrator.play(PlayReason::Interaction).await.unwrap();
        assert_eq!(h.orchestrator.current_index(), 0);
        assert_eq!(h.orchestrator.state(), PlayerState::Playing);
    }

    #[tokio::test]
    async fn test_set_item_wraps() {
        let h = harness(PlayerConfig::default(), AutoplayBehavior::Allow);
        h.orchestrator.load(playlist()).await.unwrap();
        h.orchestrator.set_item(5).await.unwrap();
        assert_eq!(h.orchestrator.current_index(), 1);
    }

    #[tokio::test]
    async fn test_muted_autostart() {
        let config = PlayerConfig {
            autostart: true,
            ..Default::default()
        };
        let h = harness(config, AutoplayBehavior::MutedOnly);
        h.orchestrator.load(playlist()).await.unwrap();

        assert!(h.orchestrator.is_muted());
        assert!(h.orchestrator.autostart_muted());
        assert_eq!(h.orchestrator.state(), PlayerState::Playing);
        assert!(h
            .events
            .lock()
            .iter()
            .any(|e| matches!(e, PlayerEvent::Autostart { muted: true })));

        h.orchestrator.set_mute(false);
        assert!(!h.orchestrator.autostart_muted());
    }

    #[tokio::test]
    async fn test_blocked_autostart_waits_for_gesture() {
        let config = PlayerConfig {
            autostart: true,
            ..Default::default()
        };
        let h = harness(config, AutoplayBehavior::Block);
        h.orchestrator.load(playlist()).await.unwrap();
        assert_ne!(h.orchestrator.state(), PlayerState::Playing);
        assert!(h
            .events
            .lock()
            .iter()
            .any(|e| matches!(e, PlayerEvent::AutostartNotAllowed { .. })));
    }

    #[tokio::test]
    async fn test_volume_and_rate() {
        let h = harness(PlayerConfig::default(), AutoplayBehavior::Allow);
        h.orchestrator.set_volume(0);
        assert!(h.orchestrator.is_muted());
        h.orchestrator.set_mute(false);
        assert_eq!(h.orchestrator.volume(), 10);
        assert_eq!(h.orchestrator.set_playback_rate(8.0), 4.0);
        assert_eq!(h.orchestrator.set_playback_rate(0.1), 0.25);
    }

    #[tokio::test]
    async fn test_ad_break_resumes_primary() {
        let h = harness(PlayerConfig::default(), AutoplayBehavior::Allow);
        h.orchestrator.load(playlist()).await.unwrap();
        h.orchestrator.play(PlayReason::External).await.unwrap();

        let adapter = h.orchestrator.create_instream().unwrap();
        adapter
            .load_item(PlaylistItem::new("ad.mp4"), InstreamOptions::default())
            .await
            .unwrap();
        h.orchestrator.destroy_instream().await.unwrap();

        assert!(h.orchestrator.instream().is_none());
        assert_eq!(h.orchestrator.state(), PlayerState::Playing);
        assert!(h
            .events
            .lock()
            .iter()
            .any(|e| matches!(e, PlayerEvent::Ad { ad: AdEvent::BreakStart { count: 1 } })));
    }

    #[tokio::test]
    async fn test_stop_during_ad_does_not_resume() {
        let h = harness(PlayerConfig::default(), AutoplayBehavior::Allow);
        h.orchestrator.load(playlist()).await.unwrap();
        h.orchestrator.play(PlayReason::External).await.unwrap();
        let primary = h.factory.last().unwrap();
        let plays = primary.play_count();

        let adapter = h.orchestrator.create_instream().unwrap();
        h.orchestrator.stop().await.unwrap();
        assert!(adapter.no_resume());
        assert!(adapter.is_destroyed());
        assert_eq!(primary.play_count(), plays);
        assert_eq!(h.orchestrator.state(), PlayerState::Idle);
    }

    #[tokio::test]
    async fn test_cast_round_trip() {
        let h = harness(PlayerConfig::default(), AutoplayBehavior::Allow);
        h.orchestrator.load(playlist()).await.unwrap();
        h.orchestrator.play(PlayReason::External).await.unwrap();
        h.factory.last().unwrap().emit_time(12.0, 100.0);

        let cast = SimulatedProviderFactory::new("cast");
        h.orchestrator.cast(&cast).unwrap();
        assert!(h.orchestrator.program().is_cast_active());
        assert_eq!(h.orchestrator.program().active().unwrap().provider_name(), "cast");

        h.orchestrator.stop_cast().await.unwrap();
        assert!(!h.orchestrator.program().is_cast_active());
        assert_eq!(h.orchestrator.program().active().unwrap().provider_name(), "html5");
        assert_eq!(h.orchestrator.program().item(0).unwrap().starttime, Some(12.0));

        let events = h.events.lock();
        let started = events.iter().position(|e| matches!(e, PlayerEvent::CastStarted));
        let stopped = events.iter().position(|e| matches!(e, PlayerEvent::CastStopped));
        assert!(started.unwrap() < stopped.unwrap());
    }
}
