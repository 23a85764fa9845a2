//! Output formatting for CLI

use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use marquee_core::PlayerEventRecord;

/// Output format options
pub enum OutputFormat {
    Text,
    Json,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Text,
        }
    }
}

/// Format output based on selected format
pub fn format_output<T: Serialize>(data: &T, format: &str) -> String {
    match OutputFormat::from(format) {
        OutputFormat::Json => {
            serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
        }
        OutputFormat::Text => {
            format!("{:?}", serde_json::to_value(data).unwrap_or_default())
        }
    }
}

#[derive(Tabled)]
struct EventRow {
    #[tabled(rename = "#")]
    sequence: u64,
    #[tabled(rename = "+ms")]
    offset_ms: i64,
    event: String,
    details: String,
}

/// Render an event log as a table
pub fn event_table(records: &[PlayerEventRecord]) -> String {
    let start = records.first().map(|r| r.timestamp);
    let rows = records.iter().map(|record| {
        let (event, details) = split_event(record);
        EventRow {
            sequence: record.sequence,
            offset_ms: start.map_or(0, |s| (record.timestamp - s).num_milliseconds()),
            event,
            details,
        }
    });
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Event tag and the remaining fields
fn split_event(record: &PlayerEventRecord) -> (String, String) {
    let Ok(serde_json::Value::Object(mut fields)) = serde_json::to_value(&record.event) else {
        return ("?".to_string(), String::new());
    };
    let event = match fields.remove("event") {
        Some(serde_json::Value::String(name)) => name,
        _ => "?".to_string(),
    };
    let details = if fields.is_empty() {
        String::new()
    } else {
        serde_json::Value::Object(fields).to_string()
    };
    (event, details)
}

#[cfg(test)]
mod tests {
    use super::*;
    use marquee_core::{EventEmitter, PlayerEvent, PlayerState};

    #[test]
    fn test_split_event() {
        let emitter = EventEmitter::new(10);
        emitter.emit(PlayerEvent::State {
            old: PlayerState::Idle,
            new: PlayerState::Playing,
        });
        emitter.emit(PlayerEvent::Seeked);
        let history = emitter.history();

        let (event, details) = split_event(&history[0]);
        assert_eq!(event, "state");
        assert!(details.contains("\"new\":\"playing\""));
        assert_eq!(split_event(&history[1]), ("seeked".to_string(), String::new()));
    }

    #[test]
    fn test_event_table_lists_every_record() {
        let emitter = EventEmitter::new(10);
        emitter.emit(PlayerEvent::PlaylistLoaded { count: 2 });
        emitter.emit(PlayerEvent::PlaylistComplete);
        let table = event_table(&emitter.history());
        assert!(table.contains("playlist_loaded"));
        assert!(table.contains("playlist_complete"));
    }
}
