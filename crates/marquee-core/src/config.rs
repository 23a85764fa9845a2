//! Player configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Lead, in seconds before the end, at which the next item is preloaded by default
pub const DEFAULT_NEXTUP_LEAD: f64 = 10.0;

/// The next-up point is never later than this many seconds before the end
pub const MIN_NEXTUP_LEAD: f64 = 5.0;

/// Default autoplay probe timeout
pub const DEFAULT_AUTOPLAY_TIMEOUT_MS: u64 = 10_000;

/// Configuration consumed by the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Attempt playback as soon as the first item is loaded
    pub autostart: bool,
    /// Start muted
    pub mute: bool,
    /// Volume, 0-100
    pub volume: u8,
    /// Fall back to muted autoplay when unmuted autoplay is refused
    pub allow_muted_autoplay: bool,
    /// Autoplay probe timeout
    pub autoplay_timeout_ms: u64,
    /// Where next-item preloading starts
    pub nextup_offset: Option<NextUpOffset>,
    /// Wrap to the first item after the last one completes
    pub repeat: bool,
    /// Continue with the next item on completion
    pub auto_advance: bool,
    /// Select the first caption track when autostarting muted
    pub enable_default_captions: bool,
    /// Number of media elements kept by the pool
    pub pool_size: usize,
    /// Skip to the next item when an item fails to set up
    pub advance_on_setup_error: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            autostart: false,
            mute: false,
            volume: 90,
            allow_muted_autoplay: true,
            autoplay_timeout_ms: DEFAULT_AUTOPLAY_TIMEOUT_MS,
            nextup_offset: None,
            repeat: false,
            auto_advance: true,
            enable_default_captions: false,
            pool_size: 3,
            advance_on_setup_error: false,
        }
    }
}

impl PlayerConfig {
    /// Parse from a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: PlayerConfig =
            serde_json::from_str(json).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.volume > 100 {
            return Err(Error::InvalidConfig(format!(
                "volume must be within 0-100, got {}",
                self.volume
            )));
        }
        if self.autoplay_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "autoplay_timeout_ms must be positive".to_string(),
            ));
        }
        if self.pool_size == 0 {
            return Err(Error::InvalidConfig("pool_size must be at least 1".to_string()));
        }
        if let Some(NextUpOffset::Percent(p)) = &self.nextup_offset {
            if !(0.0..=100.0).contains(p) {
                return Err(Error::InvalidConfig(format!(
                    "nextup_offset percentage must be within 0-100, got {}",
                    p
                )));
            }
        }
        Ok(())
    }

    /// Autoplay probe timeout as a Duration
    pub fn autoplay_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.autoplay_timeout_ms)
    }
}

/// Next-item preload point.
///
/// Accepts a number of seconds (negative counts back from the end) or a
/// percentage string such as `"85%"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "OffsetRepr", into = "OffsetRepr")]
pub enum NextUpOffset {
    Seconds(f64),
    Percent(f64),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum OffsetRepr {
    Number(f64),
    Text(String),
}

impl TryFrom<OffsetRepr> for NextUpOffset {
    type Error = String;

    fn try_from(repr: OffsetRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            OffsetRepr::Number(n) => Ok(NextUpOffset::Seconds(n)),
            OffsetRepr::Text(s) => s.parse(),
        }
    }
}

impl From<NextUpOffset> for OffsetRepr {
    fn from(offset: NextUpOffset) -> Self {
        match offset {
            NextUpOffset::Seconds(n) => OffsetRepr::Number(n),
            NextUpOffset::Percent(p) => OffsetRepr::Text(format!("{}%", p)),
        }
    }
}

impl std::str::FromStr for NextUpOffset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(pct) = s.strip_suffix('%') {
            return pct
                .trim()
                .parse::<f64>()
                .map(NextUpOffset::Percent)
                .map_err(|_| format!("invalid percentage offset: {}", s));
        }
        s.parse::<f64>()
            .map(NextUpOffset::Seconds)
            .map_err(|_| format!("invalid offset: {}", s))
    }
}

impl NextUpOffset {
    /// Resolve the preload point for an item of `duration` seconds.
    ///
    /// `None` means the default of ten seconds before the end. The result is
    /// clamped to `[0, duration - 5]`.
    pub fn resolve(offset: Option<&NextUpOffset>, duration: f64) -> f64 {
        let raw = match offset {
            None => duration - DEFAULT_NEXTUP_LEAD,
            Some(NextUpOffset::Percent(p)) => duration * p / 100.0,
            Some(NextUpOffset::Seconds(s)) if *s < 0.0 => duration + s,
            Some(NextUpOffset::Seconds(s)) => *s,
        };
        raw.min(duration - MIN_NEXTUP_LEAD).max(0.0)
    }
}
