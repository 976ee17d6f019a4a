mod scan;
mod watch;

pub use scan::cmd_scan;
pub use watch::cmd_watch;

use std::path::Path;

use owo_colors::OwoColorize;

use crate::config::Config;
use crate::error::{LightboxError, Result};
use crate::record::FileRecord;
use crate::store::{CollectionChange, CollectionStore, StoreStatus, WatchState};

/// Format options for record display
#[derive(Default)]
pub struct FormatOptions {
    pub show_dimensions: bool,
}

/// Load the folder's configuration, refusing paths that are not folders.
fn load_folder_config(dir: &Path) -> Result<Config> {
    if !dir.is_dir() {
        return Err(LightboxError::NotADirectory(dir.to_path_buf()));
    }
    Config::load(dir)
}

/// Format a byte count the way file browsers do (1000-based).
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1000 {
        return format!("{} bytes", bytes);
    }
    let mut value = bytes as f64 / 1000.0;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// Format a record for single-line display
pub fn format_record_line(record: &FileRecord, options: &FormatOptions) -> String {
    let name = format!("{:32}", record.file_name());
    let mut line = format!(
        "{} {:12} {:>10}",
        name.cyan(),
        record.type_description(),
        format_size(record.size())
    );
    if options.show_dimensions {
        let dimensions = record.dimensions_description();
        if dimensions == "unknown" {
            line.push_str(&format!("  {}", dimensions.dimmed()));
        } else {
            line.push_str(&format!("  {}", dimensions));
        }
    }
    line
}

/// Print the collection grouped by tag, then the untagged files.
pub fn print_collection(store: &CollectionStore, options: &FormatOptions) {
    for tag in store.tags() {
        if tag.is_empty() {
            continue;
        }
        println!("{}", format!("{} ({})", tag.name(), tag.len()).bold());
        for record in tag.members() {
            println!("  {}", format_record_line(record, options));
        }
    }

    let untagged = store.untagged();
    if !untagged.is_empty() {
        println!("{}", format!("Untagged ({})", untagged.len()).bold());
        for record in untagged {
            println!("  {}", format_record_line(record, options));
        }
    }

    println!(
        "{}",
        format!("{} images in {}", store.len(), store.root().display()).dimmed()
    );
}

/// Format one change notification as display lines
pub fn format_change(change: &CollectionChange) -> Vec<String> {
    let name = |path: &Path| {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string())
    };

    let mut lines = Vec::new();
    for tag in &change.tags_created {
        lines.push(format!("{} {}", "#".magenta(), tag));
    }
    for entry in &change.removed {
        lines.push(format!("{} {}", "-".red(), name(&entry.path)));
    }
    for entry in &change.inserted {
        lines.push(format!("{} {}", "+".green(), name(&entry.path)));
    }
    for path in &change.refreshed {
        lines.push(format!("{} {}", "~".yellow(), name(path)));
    }
    for entry in &change.moved {
        lines.push(format!(
            "{} {} ({} -> {})",
            ">".blue(),
            name(&entry.path),
            entry.from,
            entry.to
        ));
    }
    lines
}

pub fn format_status(status: &StoreStatus) -> String {
    let watch = match &status.watch {
        WatchState::Active => "watching".green().to_string(),
        WatchState::Degraded(reason) => format!("{} ({})", "not watching".red(), reason),
        WatchState::Disabled => "not watching".dimmed().to_string(),
        WatchState::Stopped => "stopped".dimmed().to_string(),
    };
    if status.scan.is_failed() {
        format!("{}, {}", watch, "last scan failed".red())
    } else {
        watch
    }
}
