//! Colorful console output for shadow-variable maintenance.
//!
//! Provides a custom `tracing` layer that formats engine events with colors.
//!
//! ## Log Levels
//!
//! - **INFO**: Initial load
//! - **DEBUG**: Edit sessions, entity arrivals and departures
//! - **TRACE**: Individual derived commits (when enabled in the engine config)
//! - **WARN/ERROR**: Aborted sessions and failed verification

use num_format::{Locale, ToFormattedString};
use owo_colors::OwoColorize;
use std::io::{self, Write};
use std::sync::OnceLock;
use std::time::Instant;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};


static INIT: OnceLock<()> = OnceLock::new();
static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Package version for banner display.
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(not(feature = "verbose-logging"))]
const DEFAULT_DIRECTIVE: &str = "shadowforge_engine=info";
#[cfg(feature = "verbose-logging")]
const DEFAULT_DIRECTIVE: &str = "shadowforge_engine=debug";

/// Initializes the console output.
///
/// Safe to call multiple times - only the first call has effect.
/// Prints the ShadowForge banner and sets up tracing. `RUST_LOG` overrides
/// the default filter.
pub fn init() {
    INIT.get_or_init(|| {
        EPOCH.get_or_init(Instant::now);
        print_banner();

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(ShadowConsoleLayer)
            .try_init();
    });
}

fn elapsed_secs() -> f64 {
    EPOCH.get().map_or(0.0, |epoch| epoch.elapsed().as_secs_f64())
}

fn print_banner() {
    let banner = r#"
 ____  _               _               _____
/ ___|| |__   __ _  __| | _____      _|  ___|__  _ __ __ _  ___
\___ \| '_ \ / _` |/ _` |/ _ \ \ /\ / / |_ / _ \| '__/ _` |/ _ \
 ___) | | | | (_| | (_| | (_) \ V  V /|  _| (_) | | | (_| |  __/
|____/|_| |_|\__,_|\__,_|\___/ \_/\_/ |_|  \___/|_|  \__, |\___|
                                                     |___/
"#;

    let version_line = format!(
        "                   v{} - Incremental Shadow Variables\n",
        VERSION
    );

    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{}", banner.bright_cyan());
    let _ = writeln!(stdout, "{}", version_line.bright_white().bold());
    let _ = stdout.flush();
}

/// A tracing layer that formats engine events with colors.
pub struct ShadowConsoleLayer;

impl<S: Subscriber> Layer<S> for ShadowConsoleLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let target = metadata.target();

        // Accept events from engine modules
        if !target.starts_with("shadowforge_engine") && !target.starts_with("shadowforge::") {
            return;
        }

        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);

        let output = format_event(&visitor, *metadata.level());
        if !output.is_empty() {
            let _ = writeln!(io::stdout(), "{}", output);
        }
    }
}

#[derive(Debug, Default)]
struct EventVisitor {
    event: Option<String>,
    entity: Option<String>,
    node: Option<String>,
    attribute: Option<String>,
    old: Option<String>,
    new: Option<String>,
    error: Option<String>,
    entities: Option<u64>,
    derived_nodes: Option<u64>,
    changes: Option<u64>,
    added: Option<u64>,
    removed: Option<u64>,
    duration_ms: Option<u64>,
    elapsed_us: Option<u64>,
    aborted: Option<bool>,
}

impl Visit for EventVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let s = format!("{:?}", value);
        let s = s.trim_matches('"').to_string();
        match field.name() {
            "event" => self.event = Some(s),
            "entity" => self.entity = Some(s),
            "node" => self.node = Some(s),
            "attribute" => self.attribute = Some(s),
            "old" => self.old = Some(s),
            "new" => self.new = Some(s),
            "error" => self.error = Some(s),
            _ => {}
        }
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        match field.name() {
            "entities" => self.entities = Some(value),
            "derived_nodes" => self.derived_nodes = Some(value),
            "changes" => self.changes = Some(value),
            "added" => self.added = Some(value),
            "removed" => self.removed = Some(value),
            "duration_ms" => self.duration_ms = Some(value),
            "elapsed_us" => self.elapsed_us = Some(value),
            _ => {}
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record_u64(field, value.max(0) as u64);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        if field.name() == "aborted" {
            self.aborted = Some(value);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "event" => self.event = Some(value.to_string()),
            "entity" => self.entity = Some(value.to_string()),
            "node" => self.node = Some(value.to_string()),
            "attribute" => self.attribute = Some(value.to_string()),
            "old" => self.old = Some(value.to_string()),
            "new" => self.new = Some(value.to_string()),
            "error" => self.error = Some(value.to_string()),
            _ => {}
        }
    }
}

fn format_event(v: &EventVisitor, level: Level) -> String {
    let event = v.event.as_deref().unwrap_or("");

    match event {
        "load" => format_load(v),
        "edit_end" => format_edit_end(v),
        "entity_added" => format_entity(v, "+".bright_green().bold().to_string(), "added"),
        "entity_removed" => format_entity(v, "-".bright_red().bold().to_string(), "removed"),
        "edit_aborted" => format_aborted(v),
        "verification_failed" => format_verification_failed(v),
        "recompute_drift" => format_drift(v),
        "commit" => format_commit(v, level),
        _ => String::new(),
    }
}

fn format_elapsed() -> String {
    format!("{:>7.3}s", elapsed_secs())
        .bright_black()
        .to_string()
}

fn format_count(n: u64) -> String {
    n.to_formatted_string(&Locale::en)
}

fn format_load(v: &EventVisitor) -> String {
    let entities = v.entities.unwrap_or(0);
    let nodes = v.derived_nodes.unwrap_or(0);
    let duration = v.duration_ms.unwrap_or(0);

    format!(
        "{} {} Loaded │ {} entities │ {} derived attributes │ {}",
        format_elapsed(),
        "▶".bright_green().bold(),
        format_count(entities).bright_yellow(),
        format_count(nodes).bright_yellow(),
        format_duration_ms(duration).yellow()
    )
}

fn format_edit_end(v: &EventVisitor) -> String {
    let changes = v.changes.unwrap_or(0);
    let added = v.added.unwrap_or(0);
    let removed = v.removed.unwrap_or(0);
    let elapsed = v.elapsed_us.unwrap_or(0);

    let mut output = format!(
        "{} {} Edit │ {} changes │ {}",
        format_elapsed(),
        "◆".bright_blue(),
        format_count(changes).white().bold(),
        format_duration_us(elapsed).yellow()
    );

    if added > 0 {
        output.push_str(&format!(" │ {} added", format_count(added).bright_green()));
    }
    if removed > 0 {
        output.push_str(&format!(" │ {} removed", format_count(removed).bright_red()));
    }
    if v.aborted.unwrap_or(false) {
        output.push_str(&format!(" │ {}", "ABORTED".bright_red().bold()));
    }

    output
}

fn format_entity(v: &EventVisitor, icon: String, verb: &str) -> String {
    let entity = v.entity.as_deref().unwrap_or("?");

    format!(
        "{} {} Entity {} {}",
        format_elapsed(),
        icon,
        entity.white().bold(),
        verb
    )
}

fn format_aborted(v: &EventVisitor) -> String {
    let entity = v.entity.as_deref().unwrap_or("?");

    format!(
        "{} {} Session aborted │ unknown entity {}",
        format_elapsed(),
        "✗".bright_red().bold(),
        entity.bright_red()
    )
}

fn format_verification_failed(v: &EventVisitor) -> String {
    let error = v.error.as_deref().unwrap_or("unknown");

    format!(
        "{} {} Verification failed │ {}",
        format_elapsed(),
        "✗".bright_red().bold(),
        error.bright_red()
    )
}

fn format_drift(v: &EventVisitor) -> String {
    format!(
        "{} {} Recompute corrected {} values",
        format_elapsed(),
        "!".bright_yellow().bold(),
        format_count(v.changes.unwrap_or(0)).bright_yellow()
    )
}

fn format_commit(v: &EventVisitor, level: Level) -> String {
    if level != Level::TRACE {
        return String::new();
    }

    let node = v.node.as_deref().unwrap_or("?");
    let attribute = v.attribute.as_deref().unwrap_or("?");
    let old = v.old.as_deref().unwrap_or("null");
    let new = v.new.as_deref().unwrap_or("null");

    format!(
        "{}   {} {:<12} {:<24} {} → {}",
        format_elapsed(),
        "·".bright_black(),
        node.bright_black(),
        attribute.white(),
        old.bright_black(),
        new.bright_cyan()
    )
}

fn format_duration_ms(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.2}s", ms as f64 / 1000.0)
    } else {
        let mins = ms / 60_000;
        let secs = (ms % 60_000) / 1000;
        format!("{}m {}s", mins, secs)
    }
}

fn format_duration_us(us: u64) -> String {
    if us < 1000 {
        format!("{}µs", us)
    } else {
        format_duration_ms(us / 1000)
    }
}
