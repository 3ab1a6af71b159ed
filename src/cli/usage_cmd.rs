use anyhow::Result;
use serde::Serialize;

use crate::cli::output::{OutputFormat, OutputOptions};
use crate::cli::renderer;
use crate::core::aggregator::{self, SnapshotMap};
use crate::core::config::AppConfig;
use crate::core::models::snapshot::ProviderSnapshot;
use crate::core::providers::Provider;

#[derive(Serialize)]
struct UsagePayload<'a> {
    timestamp: chrono::DateTime<chrono::Utc>,
    providers: Vec<&'a ProviderSnapshot>,
}

/// Resolve the provider set for a run: an explicit filter wins, otherwise
/// every enabled provider from config.
pub fn resolve_providers(
    provider_filter: Option<&str>,
    config: &AppConfig,
) -> Result<Vec<Provider>> {
    match provider_filter {
        Some("all") | None => Ok(config.enabled_providers()),
        Some(filter) => match Provider::from_id(filter) {
            Some(p) => Ok(vec![p]),
            None => anyhow::bail!("Unknown provider: '{}'", filter),
        },
    }
}

/// Order snapshots deterministically for output.
fn ordered<'a>(snapshots: &'a SnapshotMap) -> Vec<&'a ProviderSnapshot> {
    Provider::all()
        .iter()
        .filter_map(|p| snapshots.get(p))
        .collect()
}

pub fn render_all(snapshots: &SnapshotMap, opts: &OutputOptions) -> Result<String> {
    match opts.format {
        OutputFormat::Text => {
            let sections: Vec<String> = ordered(snapshots)
                .iter()
                .map(|snap| renderer::render_provider(snap, opts.use_color))
                .collect();
            Ok(sections.join("\n\n"))
        }
        OutputFormat::Json => {
            let payload = UsagePayload {
                timestamp: chrono::Utc::now(),
                providers: ordered(snapshots),
            };
            Ok(if opts.pretty {
                serde_json::to_string_pretty(&payload)?
            } else {
                serde_json::to_string(&payload)?
            })
        }
    }
}

pub async fn run(provider_filter: Option<String>, opts: &OutputOptions) -> Result<()> {
    let config = AppConfig::load().unwrap_or_default();
    let providers = match resolve_providers(provider_filter.as_deref(), &config) {
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

    let snapshots = aggregator::poll_all(&providers, opts.verbose).await;
    println!("{}", render_all(&snapshots, opts)?);
    Ok(())
}
