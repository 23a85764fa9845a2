//! Core types for Marquee

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// Identity of one MediaModel instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelId(pub Uuid);

impl ModelId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ModelId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one MediaController instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControllerId(pub Uuid);

impl ControllerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ControllerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ControllerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Playback state of a single media item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaState {
    /// Nothing loaded, or the source was reset
    #[default]
    Idle,
    /// Loading or waiting for data
    Buffering,
    /// Content is playing
    Playing,
    /// Playback paused
    Paused,
    /// Reached the end of the item
    Complete,
}

impl std::fmt::Display for MediaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaState::Idle => write!(f, "idle"),
            MediaState::Buffering => write!(f, "buffering"),
            MediaState::Playing => write!(f, "playing"),
            MediaState::Paused => write!(f, "paused"),
            MediaState::Complete => write!(f, "complete"),
        }
    }
}

/// Orchestrator-visible player state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    #[default]
    Idle,
    Buffering,
    Playing,
    Paused,
    Complete,
    Error,
}

impl From<MediaState> for PlayerState {
    fn from(state: MediaState) -> Self {
        match state {
            MediaState::Idle => PlayerState::Idle,
            MediaState::Buffering => PlayerState::Buffering,
            MediaState::Playing => PlayerState::Playing,
            MediaState::Paused => PlayerState::Paused,
            MediaState::Complete => PlayerState::Complete,
        }
    }
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerState::Idle => write!(f, "idle"),
            PlayerState::Buffering => write!(f, "buffering"),
            PlayerState::Playing => write!(f, "playing"),
            PlayerState::Paused => write!(f, "paused"),
            PlayerState::Complete => write!(f, "complete"),
            PlayerState::Error => write!(f, "error"),
        }
    }
}

/// Why playback was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayReason {
    /// Direct user gesture
    Interaction,
    /// Autostart after a successful autoplay probe
    Autostart,
    /// Advancing through the playlist
    Playlist,
    /// Restarting because repeat is on
    Repeat,
    /// Player became viewable
    Viewable,
    /// API call
    #[default]
    External,
}

impl std::fmt::Display for PlayReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayReason::Interaction => write!(f, "interaction"),
            PlayReason::Autostart => write!(f, "autostart"),
            PlayReason::Playlist => write!(f, "playlist"),
            PlayReason::Repeat => write!(f, "repeat"),
            PlayReason::Viewable => write!(f, "viewable"),
            PlayReason::External => write!(f, "external"),
        }
    }
}

/// Why playback was paused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    Interaction,
    Viewable,
    #[default]
    External,
}

/// Audio-only or video content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Audio,
    Video,
}

/// Seekable window reported by a provider
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SeekRange {
    pub start: f64,
    pub end: f64,
}

/// One rendition a provider can switch between
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityLevel {
    pub label: String,
    pub bitrate: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Rendition currently shown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualQuality {
    pub level: QualityLevel,
    /// "auto" or "manual"
    pub mode: String,
    pub reason: String,
}

/// Alternate audio rendition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioTrack {
    pub name: String,
    pub language: Option<String>,
}

/// Kind of source a provider must handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Mp4,
    Webm,
    Hls,
    Dash,
    Mp3,
    Aac,
    Ogg,
    Unknown,
}

impl SourceKind {
    /// Resolve from an explicit type hint ("hls", "video/mp4", ...)
    pub fn from_type(hint: &str) -> Self {
        match hint.trim().to_ascii_lowercase().as_str() {
            "hls" | "m3u8" | "application/vnd.apple.mpegurl" | "application/x-mpegurl" => {
                SourceKind::Hls
            }
            "dash" | "mpd" | "application/dash+xml" => SourceKind::Dash,
            "mp4" | "m4v" | "mov" | "video/mp4" => SourceKind::Mp4,
            "webm" | "video/webm" => SourceKind::Webm,
            "mp3" | "mpeg" | "audio/mpeg" | "audio/mp3" => SourceKind::Mp3,
            "aac" | "m4a" | "audio/aac" | "audio/mp4" => SourceKind::Aac,
            "ogg" | "oga" | "audio/ogg" => SourceKind::Ogg,
            _ => SourceKind::Unknown,
        }
    }

    /// Resolve from the extension of a file path or URL
    pub fn from_file(file: &str) -> Self {
        let path = match Url::parse(file) {
            Ok(url) => url.path().to_string(),
            Err(_) => file.split(['?', '#']).next().unwrap_or(file).to_string(),
        };
        match path.rsplit_once('.') {
            Some((_, ext)) if !ext.contains('/') => SourceKind::from_type(ext),
            _ => SourceKind::Unknown,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SourceKind::Mp4 => "mp4",
            SourceKind::Webm => "webm",
            SourceKind::Hls => "hls",
            SourceKind::Dash => "dash",
            SourceKind::Mp3 => "mp3",
            SourceKind::Aac => "aac",
            SourceKind::Ogg => "ogg",
            SourceKind::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// A single source description of a playlist item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaSource {
    /// URL or path of the media
    pub file: String,
    /// Explicit type hint
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub default: bool,
}

impl MediaSource {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            mime_type: None,
            label: None,
            default: false,
        }
    }

    pub fn with_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Source kind, preferring the explicit type hint over the extension
    pub fn kind(&self) -> SourceKind {
        match self.mime_type.as_deref().map(SourceKind::from_type) {
            Some(kind) if kind != SourceKind::Unknown => kind,
            _ => SourceKind::from_file(&self.file),
        }
    }
}

/// Text track kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextTrackKind {
    #[default]
    Captions,
    Subtitles,
    Chapters,
    Thumbnails,
    Metadata,
}

impl TextTrackKind {
    /// Whether tracks of this kind show up in the captions menu
    pub fn is_caption(&self) -> bool {
        matches!(self, TextTrackKind::Captions | TextTrackKind::Subtitles)
    }
}

/// Track declared on a playlist item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemTrack {
    pub file: String,
    #[serde(default)]
    pub kind: TextTrackKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub default: bool,
}

impl ItemTrack {
    pub fn captions(file: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            kind: TextTrackKind::Captions,
            label: Some(label.into()),
            language: None,
            default: false,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_default(mut self, is_default: bool) -> Self {
        self.default = is_default;
        self
    }
}

/// Preload hint of a playlist item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preload {
    Auto,
    #[default]
    Metadata,
    None,
}

/// Static descriptor of one playlist entry
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlaylistItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub sources: Vec<MediaSource>,
    /// Resume position; rewritten after detach/reattach and cast hand-off
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starttime: Option<f64>,
    /// Duration hint in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default)]
    pub tracks: Vec<ItemTrack>,
    /// Seconds before an ad can be skipped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipoffset: Option<f64>,
    #[serde(default)]
    pub preload: Preload,
}

impl PlaylistItem {
    /// Create an item with a single source
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            sources: vec![MediaSource::new(file)],
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_track(mut self, track: ItemTrack) -> Self {
        self.tracks.push(track);
        self
    }

    pub fn with_source(mut self, source: MediaSource) -> Self {
        self.sources.push(source);
        self
    }

    /// The source providers are matched against
    pub fn first_source(&self) -> Option<&MediaSource> {
        self.sources
            .iter()
            .find(|s| s.default)
            .or_else(|| self.sources.first())
    }

    /// Compare the [`first_source`](Self::first_source) of two items by their
    /// serialized form
    pub fn same_first_source(&self, other: &PlaylistItem) -> bool {
        let a = self.first_source().map(serde_json::to_value);
        let b = other.first_source().map(serde_json::to_value);
        match (a, b) {
            (Some(Ok(a)), Some(Ok(b))) => a == b,
            _ => false,
        }
    }

    /// Title for logs
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .or_else(|| self.first_source().map(|s| s.file.as_str()))
            .unwrap_or("untitled")
    }
}
