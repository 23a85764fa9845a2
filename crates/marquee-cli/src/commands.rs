//! CLI command implementations

use std::path::{Path, PathBuf};

use anyhow::Context;
use console::style;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use marquee_core::{NextUpOffset, PlayerConfig};

use crate::output::{self, OutputFormat};
use crate::scenario::{self, Runner, Scenario};

#[derive(Serialize, Tabled)]
struct ItemReport {
    #[tabled(rename = "#")]
    index: usize,
    title: String,
    #[tabled(display_with = "display_or_dash")]
    provider: Option<String>,
    #[tabled(rename = "next up at", display_with = "display_seconds")]
    nextup_at: Option<f64>,
    #[tabled(display_with = "display_or_dash")]
    problem: Option<String>,
}

/// Check a scenario's configuration and playlist
pub fn validate(path: &Path, config: Option<&Path>, format: &str) -> anyhow::Result<()> {
    let scenario = load_scenario(path, config)?;
    scenario.config.validate()?;
    let (registry, _, _) = scenario::registry(&scenario);

    let items: Vec<ItemReport> = scenario
        .playlist
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let (provider, problem) = match registry.choose(item) {
                Ok(name) => (Some(name), None),
                Err(e) => (None, Some(e.to_string())),
            };
            ItemReport {
                index,
                title: item.display_title().to_string(),
                provider,
                nextup_at: item
                    .duration
                    .map(|d| NextUpOffset::resolve(scenario.config.nextup_offset.as_ref(), d)),
                problem,
            }
        })
        .collect();
    let failures = items.iter().filter(|i| i.problem.is_some()).count();

    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", output::format_output(&items, format)),
        OutputFormat::Text => {
            let config = &scenario.config;
            println!("Scenario: {}", scenario.name.as_deref().unwrap_or("unnamed"));
            println!("  Autostart: {} (muted fallback: {})", config.autostart, config.allow_muted_autoplay);
            println!("  Mute: {} / Volume: {}", config.mute, config.volume);
            println!(
                "  Next up: {}",
                config
                    .nextup_offset
                    .as_ref()
                    .map_or_else(|| "10s before the end".to_string(), describe_offset)
            );
            println!("  Repeat: {} / Auto advance: {}", config.repeat, config.auto_advance);
            println!("{}", Table::new(&items).with(Style::rounded()));
            if failures == 0 {
                println!("{} {} items", style("VALID").green().bold(), items.len());
            } else {
                println!("{} {} of {} items unplayable", style("INVALID").red().bold(), failures, items.len());
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} playlist items have no usable provider", failures);
    }
    Ok(())
}

fn display_or_dash(value: &Option<String>) -> String {
    value.clone().unwrap_or_else(|| "-".to_string())
}

fn display_seconds(value: &Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |s| format!("{:.1}s", s))
}

fn load_scenario(path: &Path, config: Option<&Path>) -> anyhow::Result<Scenario> {
    let mut scenario = Scenario::from_file(path)?;
    if let Some(config) = config {
        scenario.config = PlayerConfig::from_json_file(config)?;
    }
    Ok(scenario)
}

#[derive(Serialize)]
struct NextUpReport {
    duration: f64,
    offset: Option<NextUpOffset>,
    preload_at: f64,
}

/// Resolve the next-up preload point for a duration
pub fn nextup(duration: f64, offset: Option<&str>, format: &str) -> anyhow::Result<()> {
    let offset = offset
        .map(|s| s.parse::<NextUpOffset>())
        .transpose()
        .map_err(|e| anyhow::anyhow!(e))?;
    let report = NextUpReport {
        duration,
        preload_at: NextUpOffset::resolve(offset.as_ref(), duration),
        offset,
    };

    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", output::format_output(&report, format)),
        OutputFormat::Text => {
            println!("Duration: {:.1}s", report.duration);
            if let Some(offset) = &report.offset {
                println!("Offset: {}", describe_offset(offset));
            }
            println!("Preload starts at {:.1}s", report.preload_at);
        }
    }
    Ok(())
}

/// Run a scenario against simulated providers
pub async fn simulate(
    path: &Path,
    config: Option<&Path>,
    output_file: Option<PathBuf>,
    format: &str,
) -> anyhow::Result<()> {
    let scenario = load_scenario(path, config)?;
    if let Some(name) = &scenario.name {
        eprintln!("{} {}", style("Scenario").cyan().bold(), name);
    }

    // Simulated providers never touch the wall clock
    tokio::time::pause();
    let runner = Runner::new(&scenario)?;
    let records = runner.run(&scenario).await?;

    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", output::format_output(&records, format)),
        OutputFormat::Text => println!("{}", output::event_table(&records)),
    }

    if let Some(out) = output_file {
        let json = serde_json::to_string_pretty(&records)?;
        std::fs::write(&out, json).with_context(|| format!("writing {}", out.display()))?;
        eprintln!("Event log written to {}", out.display());
    }
    Ok(())
}

fn describe_offset(offset: &NextUpOffset) -> String {
    match offset {
        NextUpOffset::Percent(p) => format!("{}% of the duration", p),
        NextUpOffset::Seconds(s) if *s < 0.0 => format!("{}s before the end", -s),
        NextUpOffset::Seconds(s) => format!("{}s from the start", s),
    }
}
