//! Scripted playback scenarios
//!
//! A scenario is a playlist, a simulated runtime, and a list of steps. Steps
//! either call the orchestrator or make the simulated provider of whatever is
//! on screen (the ad during a break, the primary item otherwise) report
//! progress. Runs on tokio's paused clock, so `wait` steps cost no real time.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use marquee_core::captions::Cue;
use marquee_core::provider::ProviderEntry;
use marquee_core::simulated::{
    AutoplayBehavior, SimulatedAutoplayTester, SimulatedLoader, SimulatedProvider, SimulatedProviderFactory,
    StaticTrackParser,
};
use marquee_core::{
    Collaborators, InstreamOptions, MediaController, Orchestrator, PauseReason, PlayReason, PlayerConfig,
    PlayerEventRecord, PlaylistItem, ProviderRegistry, SourceKind,
};

/// How the simulated runtime answers autoplay probes
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeAutoplay {
    #[default]
    Allow,
    MutedOnly,
    Block,
}

impl From<RuntimeAutoplay> for AutoplayBehavior {
    fn from(autoplay: RuntimeAutoplay) -> Self {
        match autoplay {
            RuntimeAutoplay::Allow => AutoplayBehavior::Allow,
            RuntimeAutoplay::MutedOnly => AutoplayBehavior::MutedOnly,
            RuntimeAutoplay::Block => AutoplayBehavior::Block,
        }
    }
}

/// One scripted action
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Play,
    Pause,
    Stop,
    Next,
    SetItem { index: usize },
    Seek { position: f64 },
    Mute { muted: bool },
    Volume { volume: u8 },
    Rate { rate: f64 },
    Captions { index: usize },
    Detach,
    Attach,
    /// Report playback progress
    Time { position: f64, duration: f64 },
    /// Play the on-screen item to its end
    Finish,
    /// Report a media error
    Fail { code: u32, message: String },
    /// Start an ad break with these items
    Ad { items: Vec<PlaylistItem> },
    SkipAd,
    EndAd,
    /// Let spawned work settle
    Wait { ms: u64 },
}

/// Cue file served to the captions manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CueFile {
    pub url: String,
    pub cues: Vec<Cue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub name: Option<String>,
    pub config: PlayerConfig,
    pub autoplay: RuntimeAutoplay,
    /// Source kinds served by the deferred "hlsjs" provider
    pub deferred_kinds: Vec<SourceKind>,
    pub cue_files: Vec<CueFile>,
    pub playlist: Vec<PlaylistItem>,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("parsing {}", path.display()))
    }
}

/// Orchestrator wired to simulated collaborators
pub struct Runner {
    orchestrator: Arc<Orchestrator>,
    factory: Arc<SimulatedProviderFactory>,
    loader: Arc<SimulatedLoader>,
}

/// Registry serving the scenario's sources from simulated providers
pub fn registry(scenario: &Scenario) -> (Arc<ProviderRegistry>, Arc<SimulatedProviderFactory>, Arc<SimulatedLoader>) {
    let loader = Arc::new(SimulatedLoader::new());
    let factory = Arc::new(SimulatedProviderFactory::new("html5"));
    let registry = Arc::new(ProviderRegistry::with_loader(loader.clone()));
    registry.register(ProviderEntry::loaded(
        factory.clone(),
        vec![SourceKind::Mp4, SourceKind::Webm, SourceKind::Mp3, SourceKind::Aac],
    ));
    let deferred = if scenario.deferred_kinds.is_empty() {
        vec![SourceKind::Hls, SourceKind::Dash]
    } else {
        scenario.deferred_kinds.clone()
    };
    registry.register(ProviderEntry::deferred("hlsjs", deferred));
    (registry, factory, loader)
}

impl Runner {
    pub fn new(scenario: &Scenario) -> anyhow::Result<Self> {
        let (registry, factory, loader) = registry(scenario);
        let parser = Arc::new(StaticTrackParser::new());
        for file in &scenario.cue_files {
            parser.insert(&file.url, file.cues.clone());
        }

        let orchestrator = Orchestrator::new(
            scenario.config.clone(),
            Collaborators {
                registry,
                autoplay: Arc::new(SimulatedAutoplayTester::new(scenario.autoplay.into())),
                track_parser: parser,
            },
        )?;
        Ok(Self {
            orchestrator,
            factory,
            loader,
        })
    }

    /// Load the playlist and run every step, returning the event log
    pub async fn run(&self, scenario: &Scenario) -> anyhow::Result<Vec<PlayerEventRecord>> {
        info!(name = scenario.name.as_deref().unwrap_or("unnamed"), "Running scenario");
        self.orchestrator.load(scenario.playlist.clone()).await?;
        for (i, step) in scenario.steps.iter().enumerate() {
            if let Err(e) = self.step(step).await {
                warn!(step = i, ?step, error = %e, "Step failed");
            }
        }
        settle().await;
        self.orchestrator.destroy().await;
        Ok(self.orchestrator.history())
    }

    async fn step(&self, step: &Step) -> anyhow::Result<()> {
        let o = &self.orchestrator;
        match step {
            Step::Play => o.play(PlayReason::External).await?,
            Step::Pause => o.pause(PauseReason::External),
            Step::Stop => o.stop().await?,
            Step::Next => o.next().await?,
            Step::SetItem { index } => o.set_item(*index).await?,
            Step::Seek { position } => o.seek(*position),
            Step::Mute { muted } => o.set_mute(*muted),
            Step::Volume { volume } => o.set_volume(*volume),
            Step::Rate { rate } => {
                o.set_playback_rate(*rate);
            }
            Step::Captions { index } => {
                o.set_captions(*index);
            }
            Step::Detach => o.detach_media(),
            Step::Attach => o.attach_media(),
            Step::Time { position, duration } => self.on_screen()?.emit_time(*position, *duration),
            Step::Finish => self.on_screen()?.finish(),
            Step::Fail { code, message } => self.on_screen()?.fail(*code, message),
            Step::Ad { items } => {
                let adapter = o.create_instream()?;
                let options = vec![InstreamOptions::default(); items.len()];
                adapter.load_items(items.clone(), options).await?;
            }
            Step::SkipAd => {
                let adapter = o.instream().ok_or_else(|| anyhow!("no ad break running"))?;
                adapter.skip_ad().await?;
            }
            Step::EndAd => o.destroy_instream().await?,
            Step::Wait { ms } => tokio::time::sleep(Duration::from_millis(*ms)).await,
        }
        settle().await;
        Ok(())
    }

    /// Simulated provider behind the ad, or behind the active item
    fn on_screen(&self) -> anyhow::Result<Arc<SimulatedProvider>> {
        let controller = self
            .orchestrator
            .instream()
            .and_then(|adapter| adapter.ad_controller())
            .or_else(|| self.orchestrator.program().active())
            .ok_or_else(|| anyhow!("nothing on screen"))?;
        self.simulated(&controller)
            .ok_or_else(|| anyhow!("provider {} is not simulated", controller.provider_name()))
    }

    fn simulated(&self, controller: &MediaController) -> Option<Arc<SimulatedProvider>> {
        let target = Arc::as_ptr(controller.provider()) as *const u8;
        let mut candidates = self.factory.created();
        if let Some(hls) = self.loader.factory("hlsjs") {
            candidates.extend(hls.created());
        }
        candidates
            .into_iter()
            .find(|p| Arc::as_ptr(p) as *const u8 == target)
    }
}

async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marquee_core::PlayerEvent;

    fn scenario(json: &str) -> Scenario {
        serde_json::from_str(json).unwrap()
    }

    fn names(records: &[PlayerEventRecord]) -> Vec<&PlayerEvent> {
        records.iter().map(|r| &r.event).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_playlist_runs_to_completion() {
        let scenario = scenario(
            r#"{
                "playlist": [
                    { "sources": [{ "file": "a.mp4" }], "duration": 30 },
                    { "sources": [{ "file": "b.m3u8" }], "duration": 30 }
                ],
                "steps": [
                    { "action": "play" },
                    { "action": "time", "position": 25.0, "duration": 30.0 },
                    { "action": "finish" },
                    { "action": "wait", "ms": 100 },
                    { "action": "finish" },
                    { "action": "wait", "ms": 100 }
                ]
            }"#,
        );
        let runner = Runner::new(&scenario).unwrap();
        let records = runner.run(&scenario).await.unwrap();
        let events = names(&records);

        assert!(events.iter().any(|e| matches!(e, PlayerEvent::NextUp { index: 1 })));
        assert!(events.iter().any(|e| matches!(e, PlayerEvent::PlaylistItem { index: 1, .. })));
        assert!(matches!(events.last(), Some(PlayerEvent::PlaylistComplete)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocked_autoplay_reported() {
        let scenario = scenario(
            r#"{
                "autoplay": "block",
                "config": { "autostart": true },
                "playlist": [{ "sources": [{ "file": "a.mp4" }] }]
            }"#,
        );
        let runner = Runner::new(&scenario).unwrap();
        let records = runner.run(&scenario).await.unwrap();
        assert!(names(&records)
            .iter()
            .any(|e| matches!(e, PlayerEvent::AutostartNotAllowed { reason } if reason == "autoplayDisabled")));
    }

    #[test]
    fn test_steps_parse() {
        let scenario = scenario(
            r#"{ "steps": [
                { "action": "set_item", "index": 2 },
                { "action": "ad", "items": [{ "sources": [{ "file": "ad.mp4" }] }] },
                { "action": "skip_ad" }
            ] }"#,
        );
        assert!(matches!(scenario.steps[0], Step::SetItem { index: 2 }));
        assert!(matches!(&scenario.steps[1], Step::Ad { items } if items.len() == 1));
        assert!(matches!(scenario.steps[2], Step::SkipAd));
    }
}
