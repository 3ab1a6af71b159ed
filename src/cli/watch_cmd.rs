use anyhow::Result;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::cli::output::{OutputFormat, OutputOptions};
use crate::cli::usage_cmd;
use crate::core::aggregator::{self, SnapshotMap};
use crate::core::config::AppConfig;
use crate::core::providers::Provider;

/// Poll on a fixed interval until interrupted. At most one poll cycle is
/// in flight at a time; a slow cycle delays the next tick instead of
/// stacking requests.
pub async fn run(
    provider_filter: Option<String>,
    interval_override: Option<u64>,
    opts: &OutputOptions,
) -> Result<()> {
    let config = AppConfig::load().unwrap_or_default();
    let providers = match usage_cmd::resolve_providers(provider_filter.as_deref(), &config) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };
    if providers.is_empty() {
        eprintln!("No providers enabled. Run `pace config init` to set up providers.");
        return Ok(());
    }

    let interval_secs = interval_override
        .unwrap_or(config.settings.refresh_interval_secs)
        .max(1);

    let (tx, mut rx) = mpsc::channel::<SnapshotMap>(1);
    let verbose = opts.verbose;
    let poller = tokio::spawn(poll_loop(providers, interval_secs, verbose, tx));

    loop {
        tokio::select! {
            maybe_snapshots = rx.recv() => {
                match maybe_snapshots {
                    Some(snapshots) => print_cycle(&snapshots, interval_secs, opts)?,
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    // Dropping the receiver ends the poll loop at its next send.
    drop(rx);
    poller.abort();
    Ok(())
}

async fn poll_loop(
    providers: Vec<Provider>,
    interval_secs: u64,
    verbose: bool,
    tx: mpsc::Sender<SnapshotMap>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let snapshots = aggregator::poll_all(&providers, verbose).await;
        if tx.send(snapshots).await.is_err() {
            return;
        }
    }
}

fn print_cycle(snapshots: &SnapshotMap, interval_secs: u64, opts: &OutputOptions) -> Result<()> {
    match opts.format {
        OutputFormat::Text => {
            // Repaint in place when writing to a terminal.
            if opts.use_color {
                print!("\x1b[2J\x1b[H");
            }
            println!("{}", usage_cmd::render_all(snapshots, opts)?);
            println!();
            println!(
                " Updated {} · refreshing every {}s · Ctrl-C to quit",
                chrono::Local::now().format("%H:%M:%S"),
                interval_secs
            );
        }
        OutputFormat::Json => {
            // One JSON document per cycle, line-delimited unless pretty.
            println!("{}", usage_cmd::render_all(snapshots, opts)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::snapshot::ProviderSnapshot;

    // The scheduler must stop once the consumer goes away.
    #[tokio::test]
    async fn poll_loop_ends_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel::<SnapshotMap>(1);
        drop(rx);
        // No providers: the loop reaches the send immediately.
        let handle = tokio::spawn(poll_loop(Vec::new(), 1, false, tx));
        let result = tokio::time::timeout(Duration::from_secs(5), handle).await;
        assert!(result.is_ok(), "poll loop should exit after channel close");
    }

    #[tokio::test]
    async fn poll_loop_delivers_cycles() {
        let (tx, mut rx) = mpsc::channel::<SnapshotMap>(1);
        let handle = tokio::spawn(poll_loop(Vec::new(), 1, false, tx));
        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("first cycle should arrive");
        assert!(first.is_some());
        assert!(first.unwrap().is_empty());
        handle.abort();
    }

    #[test]
    fn print_cycle_text_smoke() {
        let mut map = SnapshotMap::new();
        map.insert(
            Provider::Claude,
            ProviderSnapshot::not_authenticated(Provider::Claude, Provider::Claude.auth_hint()),
        );
        let opts = OutputOptions {
            format: OutputFormat::Text,
            pretty: false,
            use_color: false,
            verbose: false,
        };
        assert!(print_cycle(&map, 60, &opts).is_ok());
    }
}
