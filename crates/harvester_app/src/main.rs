mod config;
mod progress;
mod session;

use clap::Parser;
use engine_logging::{engine_error, engine_info, engine_warn};
use harvester_core::RunEnd;

use config::{AppConfig, Cli, RunPlan};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    engine_logging::initialize(cli.log.into(), cli.log_level(), cli.log_file.as_deref());

    let config = AppConfig::load(&cli.config)?;
    let plan = RunPlan::resolve(&cli, config)?;
    engine_info!(
        "harvester {} ({:?} mode) -> {}",
        env!("CARGO_PKG_VERSION"),
        plan.harvest.mode,
        plan.harvest.output_dir.display()
    );

    let summary = match session::run(plan).await {
        Ok(Some(summary)) => summary,
        Ok(None) => return Ok(()),
        Err(err) => {
            engine_error!("Harvest failed: {:#}", err);
            return Err(err);
        }
    };

    let view = &summary.view;
    engine_info!(
        "Done: {} pages, {} entries handled ({} saved, {} empty, {} failed), {} already done",
        view.stats.pages_visited,
        view.stats.items_attempted,
        view.stats.items_harvested,
        view.stats.items_empty,
        view.stats.items_failed,
        view.stats.entries_skipped
    );
    for path in &summary.artifacts_written {
        engine_info!("  wrote {}", path.display());
    }
    match summary.end {
        RunEnd::Completed => engine_info!("All pages processed"),
        RunEnd::Cancelled => engine_warn!("Stopped early; run again to continue"),
        RunEnd::ListingUnavailable { reason } => {
            engine_warn!("Listing unavailable ({}); run again to continue", reason)
        }
        RunEnd::Aborted { cause } => engine_error!("Run aborted: {}", cause),
    }
    Ok(())
}
