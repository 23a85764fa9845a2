//! Caption and subtitle track selection
//!
//! Index 0 of the captions list is always "Off". Track files are fetched in
//! the background through a [`TrackParser`]; selection never waits for them.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::events::EventBus;
use crate::types::{ItemTrack, PlaylistItem, TextTrackKind};

/// Label of the entry that disables captions
pub const OFF_LABEL: &str = "Off";

/// Label used when a track has neither label nor language
pub const UNKNOWN_LABEL: &str = "Unknown CC";

/// A timed text cue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    /// Start time in seconds
    pub begin: f64,
    /// End time in seconds
    pub end: f64,
    pub text: String,
}

impl Cue {
    pub fn new(begin: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            begin,
            end,
            text: text.into(),
        }
    }

    pub fn is_active_at(&self, time: f64) -> bool {
        time >= self.begin && time < self.end
    }
}

/// Turns a track file into cues
#[async_trait]
pub trait TrackParser: Send + Sync {
    async fn parse(&self, url: &str) -> Result<Vec<Cue>>;
}

/// One selectable caption track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionsTrack {
    pub id: String,
    pub label: String,
    pub language: Option<String>,
    pub kind: TextTrackKind,
    pub default: bool,
    /// Source file; absent for tracks rendered by the provider
    pub file: Option<String>,
    /// Cues once fetched
    pub data: Option<Vec<Cue>>,
}

impl CaptionsTrack {
    fn from_item_track(track: &ItemTrack, index: usize) -> Self {
        let label = track
            .label
            .clone()
            .filter(|l| !l.is_empty())
            .or_else(|| track.language.clone().filter(|l| !l.is_empty()))
            .unwrap_or_else(|| UNKNOWN_LABEL.to_string());
        let id = if track.file.is_empty() {
            format!("{:?}{}", track.kind, index).to_lowercase()
        } else {
            track.file.clone()
        };
        Self {
            id,
            label,
            language: track.language.clone(),
            kind: track.kind,
            default: track.default,
            file: (!track.file.is_empty()).then(|| track.file.clone()),
            data: None,
        }
    }
}

/// Notifications from the captions manager
#[derive(Debug, Clone, PartialEq)]
pub enum CaptionsEvent {
    /// The list changed; labels include "Off" at index 0
    List { tracks: Vec<String>, current: usize },
    Changed { current: usize, label: String },
    /// Cues for a track arrived
    Loaded { id: String, cues: usize },
    Error { id: String, message: String },
}

#[derive(Default)]
struct CaptionsState {
    tracks: Vec<CaptionsTrack>,
    current: usize,
    remembered_label: Option<String>,
    generation: u64,
}

/// Tracks and selects captions for the active item
pub struct CaptionsTrackManager {
    parser: Arc<dyn TrackParser>,
    events: EventBus<CaptionsEvent>,
    state: Mutex<CaptionsState>,
}

impl CaptionsTrackManager {
    pub fn new(parser: Arc<dyn TrackParser>) -> Arc<Self> {
        Arc::new(Self {
            parser,
            events: EventBus::new(),
            state: Mutex::new(CaptionsState::default()),
        })
    }

    pub fn events(&self) -> &EventBus<CaptionsEvent> {
        &self.events
    }

    /// Label to reselect on the next item, `"Off"` for none
    pub fn set_remembered_label(&self, label: Option<String>) {
        self.state.lock().remembered_label = label;
    }

    pub fn remembered_label(&self) -> Option<String> {
        self.state.lock().remembered_label.clone()
    }

    /// Rebuild the list from the item's caption and subtitle tracks
    pub fn set_item(self: &Arc<Self>, item: &PlaylistItem) {
        let tracks: Vec<CaptionsTrack> = item
            .tracks
            .iter()
            .filter(|t| t.kind.is_caption())
            .enumerate()
            .map(|(i, t)| CaptionsTrack::from_item_track(t, i))
            .collect();
        let generation = self.replace_tracks(tracks);

        let pending: Vec<(String, String)> = self
            .state
            .lock()
            .tracks
            .iter()
            .filter_map(|t| t.file.clone().map(|f| (t.id.clone(), f)))
            .collect();
        for (id, file) in pending {
            self.fetch(generation, id, file);
        }
    }

    /// Merge tracks exposed by the provider itself into the list.
    ///
    /// Tracks already known by id keep their entry and cues. An empty list
    /// clears every track, sideloaded ones included.
    pub fn set_subtitles_tracks(&self, tracks: &[ItemTrack]) {
        if tracks.is_empty() {
            self.replace_tracks(Vec::new());
            return;
        }
        let (list, current) = {
            let mut state = self.state.lock();
            let before = signature(&state.tracks);
            for (i, track) in tracks.iter().filter(|t| t.kind.is_caption()).enumerate() {
                let mut track = CaptionsTrack::from_item_track(track, i);
                if state.tracks.iter().any(|t| t.id == track.id) {
                    continue;
                }
                track.file = None;
                state.tracks.push(track);
            }
            if signature(&state.tracks) == before {
                return;
            }
            state.current = default_index(&state.tracks, state.remembered_label.as_deref());
            (labels(&state.tracks), state.current)
        };
        debug!(count = list.len() - 1, current, "Provider captions merged");
        self.events.emit(CaptionsEvent::List { tracks: list, current });
    }

    fn replace_tracks(&self, tracks: Vec<CaptionsTrack>) -> u64 {
        let (generation, list, current) = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.tracks = tracks;
            state.current = default_index(&state.tracks, state.remembered_label.as_deref());
            (state.generation, labels(&state.tracks), state.current)
        };
        debug!(count = list.len() - 1, current, "Captions list updated");
        self.events.emit(CaptionsEvent::List { tracks: list, current });
        generation
    }

    fn fetch(self: &Arc<Self>, generation: u64, id: String, file: String) {
        let this = self.clone();
        tokio::spawn(async move {
            let result = this.parser.parse(&file).await;
            let event = {
                let mut state = this.state.lock();
                if state.generation != generation {
                    return;
                }
                match result {
                    Ok(cues) => {
                        let count = cues.len();
                        if let Some(track) = state.tracks.iter_mut().find(|t| t.id == id) {
                            track.data = Some(cues);
                        }
                        CaptionsEvent::Loaded { id, cues: count }
                    }
                    Err(e) => {
                        warn!(track = %id, error = %e, "Captions track failed to load");
                        CaptionsEvent::Error {
                            id,
                            message: e.to_string(),
                        }
                    }
                }
            };
            this.events.emit(event);
        });
    }

    /// Index the current list would select by default
    pub fn select_default_index(&self) -> usize {
        let state = self.state.lock();
        default_index(&state.tracks, state.remembered_label.as_deref())
    }

    /// Select a track; out-of-range indices select the last track
    pub fn select(&self, index: usize) -> usize {
        let (current, label) = {
            let mut state = self.state.lock();
            let current = index.min(state.tracks.len());
            state.current = current;
            let label = match current {
                0 => OFF_LABEL.to_string(),
                i => state.tracks[i - 1].label.clone(),
            };
            state.remembered_label = Some(label.clone());
            (current, label)
        };
        self.events.emit(CaptionsEvent::Changed {
            current,
            label: label.clone(),
        });
        current
    }

    /// Labels shown in the captions menu, "Off" first
    pub fn captions_list(&self) -> Vec<String> {
        labels(&self.state.lock().tracks)
    }

    pub fn current_index(&self) -> usize {
        self.state.lock().current
    }

    pub fn current_track(&self) -> Option<CaptionsTrack> {
        let state = self.state.lock();
        match state.current {
            0 => None,
            i => state.tracks.get(i - 1).cloned(),
        }
    }

    /// Cues of the selected track showing at `time`
    pub fn active_cues(&self, time: f64) -> Vec<Cue> {
        self.current_track()
            .and_then(|t| t.data)
            .map(|cues| cues.into_iter().filter(|c| c.is_active_at(time)).collect())
            .unwrap_or_default()
    }
}

fn labels(tracks: &[CaptionsTrack]) -> Vec<String> {
    std::iter::once(OFF_LABEL.to_string())
        .chain(tracks.iter().map(|t| t.label.clone()))
        .collect()
}

fn signature(tracks: &[CaptionsTrack]) -> Vec<(String, String)> {
    tracks.iter().map(|t| (t.id.clone(), t.label.clone())).collect()
}

fn default_index(tracks: &[CaptionsTrack], remembered: Option<&str>) -> usize {
    match remembered {
        Some(OFF_LABEL) => 0,
        Some(label) => tracks
            .iter()
            .position(|t| t.label == label)
            .map_or(0, |i| i + 1),
        None => tracks.iter().position(|t| t.default).map_or(0, |i| i + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::StaticTrackParser;
    use std::time::Duration;

    fn item() -> PlaylistItem {
        PlaylistItem::new("a.mp4")
            .with_track(ItemTrack::captions("en.vtt", "English").with_language("en"))
            .with_track(ItemTrack::captions("fr.vtt", "Français").with_default(true))
            .with_track(ItemTrack {
                file: "thumbs.vtt".to_string(),
                kind: TextTrackKind::Thumbnails,
                label: None,
                language: None,
                default: false,
            })
            .with_track(ItemTrack {
                file: "x.vtt".to_string(),
                kind: TextTrackKind::Subtitles,
                label: None,
                language: None,
                default: false,
            })
    }

    fn manager() -> (Arc<CaptionsTrackManager>, Arc<StaticTrackParser>) {
        let parser = Arc::new(StaticTrackParser::new());
        (CaptionsTrackManager::new(parser.clone()), parser)
    }

    #[tokio::test]
    async fn test_list_filters_and_names() {
        let (manager, _) = manager();
        manager.set_item(&item());
        assert_eq!(
            manager.captions_list(),
            vec!["Off", "English", "Français", "Unknown CC"]
        );
    }

    #[tokio::test]
    async fn test_default_flag_without_remembered_label() {
        let (manager, _) = manager();
        manager.set_item(&item());
        assert_eq!(manager.current_index(), 2);
    }

    #[tokio::test]
    async fn test_remembered_label_wins_else_off() {
        let (manager, _) = manager();
        manager.set_item(&item());
        manager.select(1);

        manager.set_item(&item());
        assert_eq!(manager.current_index(), 1);

        manager.set_remembered_label(Some("Deutsch".to_string()));
        manager.set_item(&item());
        assert_eq!(manager.current_index(), 0);
    }

    #[tokio::test]
    async fn test_select_clamps() {
        let (manager, _) = manager();
        manager.set_item(&item());
        assert_eq!(manager.select(42), 3);
        assert_eq!(manager.remembered_label().as_deref(), Some("Unknown CC"));
        assert_eq!(manager.select(0), 0);
        assert_eq!(manager.remembered_label().as_deref(), Some(OFF_LABEL));
    }

    #[tokio::test]
    async fn test_cues_fetched_in_background() {
        let (manager, parser) = manager();
        parser.insert("en.vtt", vec![Cue::new(0.0, 2.0, "Hello"), Cue::new(2.0, 4.0, "World")]);
        parser.fail("fr.vtt");
        let mut rx = manager.events().subscribe();

        manager.set_item(&item());
        manager.select(1);
        assert!(manager.active_cues(1.0).is_empty());

        let mut loaded = false;
        let mut failed = false;
        while !(loaded && failed) {
            match tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
                Ok(Some(CaptionsEvent::Loaded { id, .. })) if id == "en.vtt" => loaded = true,
                Ok(Some(CaptionsEvent::Error { id, .. })) if id == "fr.vtt" => failed = true,
                Ok(Some(_)) => {}
                _ => panic!("captions events missing"),
            }
        }
        assert_eq!(manager.active_cues(2.5)[0].text, "World");
    }

    #[tokio::test]
    async fn test_provider_tracks_merge_with_sideloaded() {
        let (manager, parser) = manager();
        parser.insert("en.vtt", vec![Cue::new(0.0, 2.0, "Hello")]);
        let mut rx = manager.events().subscribe();

        manager.set_item(&item());
        manager.set_subtitles_tracks(&[ItemTrack::captions("", "Deutsch")]);
        assert_eq!(
            manager.captions_list(),
            vec!["Off", "English", "Français", "Unknown CC", "Deutsch"]
        );
        assert_eq!(manager.current_index(), 2);

        // The same report again changes nothing
        manager.set_subtitles_tracks(&[ItemTrack::captions("", "Deutsch")]);
        assert_eq!(manager.captions_list().len(), 5);

        // Cue fetches started by set_item still land
        loop {
            match tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
                Ok(Some(CaptionsEvent::Loaded { id, .. })) if id == "en.vtt" => break,
                Ok(Some(_)) => {}
                _ => panic!("sideloaded cues never arrived"),
            }
        }
        manager.select(1);
        assert_eq!(manager.active_cues(1.0)[0].text, "Hello");

        manager.select(4);
        assert!(manager.current_track().unwrap().file.is_none());
    }

    #[tokio::test]
    async fn test_empty_provider_report_clears_list() {
        let (manager, _) = manager();
        manager.set_item(&item());
        manager.set_subtitles_tracks(&[]);
        assert_eq!(manager.captions_list(), vec![OFF_LABEL]);
        assert_eq!(manager.current_index(), 0);
    }
}
