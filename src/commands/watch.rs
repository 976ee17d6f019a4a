use std::path::Path;

use owo_colors::OwoColorize;
use tokio::sync::broadcast::{self, error::TryRecvError};

use super::{FormatOptions, format_change, format_status, load_folder_config, print_collection};
use crate::error::Result;
use crate::store::{CollectionStore, StoreEvent};

/// Watch a folder and print changes until Ctrl-C
pub async fn cmd_watch(dir: &Path) -> Result<()> {
    let config = load_folder_config(dir)?;
    let mut store = CollectionStore::open(dir, config)?;
    let mut events = store.subscribe();

    store.run_until(|s| !s.status().scan.is_scanning()).await;
    drain_events(&mut events, false);
    print_collection(&store, &FormatOptions::default());
    println!("{}", format_status(store.status()));

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            more = store.process_next() => {
                if !more {
                    break;
                }
                drain_events(&mut events, true);
            }
        }
    }

    store.stop_watching();
    println!("{}", "Stopped watching".dimmed());
    Ok(())
}

fn drain_events(events: &mut broadcast::Receiver<StoreEvent>, print: bool) {
    loop {
        match events.try_recv() {
            Ok(event) if print => print_event(&event),
            Ok(_) => {}
            Err(TryRecvError::Lagged(skipped)) => {
                tracing::warn!("missed {} notifications", skipped);
            }
            Err(_) => break,
        }
    }
}

fn print_event(event: &StoreEvent) {
    match event {
        StoreEvent::Changed(change) => {
            for line in format_change(change) {
                println!("{}", line);
            }
        }
        StoreEvent::StatusChanged(status) => println!("{}", format_status(status)),
        StoreEvent::MetadataFailed { path, reason } | StoreEvent::PreviewFailed { path, reason } => {
            eprintln!("{} {}: {}", "error:".red(), path.display(), reason);
        }
        StoreEvent::MetadataLoaded { .. } | StoreEvent::PreviewLoaded { .. } => {}
    }
}
