//! Browser session, operator handoff and the harvest itself.
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use dialoguer::Confirm;
use engine_logging::{engine_info, engine_warn};
use harvester_engine::{Browser, ChromiumBrowser, Harvester, RunSummary};

use crate::config::RunPlan;
use crate::progress::LogProgressSink;

/// `None` when the operator declined the handoff.
pub async fn run(plan: RunPlan) -> anyhow::Result<Option<RunSummary>> {
    let target = plan
        .browser
        .connect_url
        .clone()
        .unwrap_or_else(|| "a new browser window".to_string());
    let browser = ChromiumBrowser::start(plan.browser.clone())
        .await
        .with_context(|| format!("could not drive {target}"))?;
    let browser = Arc::new(browser);

    let outcome = harvest(browser.clone(), plan).await;
    if let Err(err) = browser.quit().await {
        engine_warn!("Could not close the browser: {}", err);
    }
    outcome
}

async fn harvest(
    browser: Arc<ChromiumBrowser>,
    plan: RunPlan,
) -> anyhow::Result<Option<RunSummary>> {
    let listing = browser.current_view().await?;
    browser.navigate(&listing, plan.start_url.as_str()).await?;
    engine_info!(">>> Opened {}", plan.start_url);
    engine_info!(">>> Log in and open page one of the listing in this window, then confirm here");

    if !confirm_handoff().await? {
        engine_info!(">>> Not confirmed; exiting without touching {:?}", plan.harvest.checkpoint_path);
        return Ok(None);
    }
    engine_info!(">>> Resuming automated operation");

    let mut harvester = Harvester::new(browser, plan.harvest)
        .with_sink(Arc::new(LogProgressSink::new()))
        .with_clock(Arc::new(|| Utc::now().to_rfc3339()));
    let token = harvester.cancellation_token();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            engine_warn!(">>> Interrupted; stopping after the current item");
            token.cancel();
        }
    });

    let summary = harvester.run(&listing).await;
    ctrl_c.abort();
    Ok(Some(summary?))
}

async fn confirm_handoff() -> anyhow::Result<bool> {
    let confirmed = tokio::task::spawn_blocking(|| {
        Confirm::new()
            .with_prompt("Is page one of the listing open?")
            .default(true)
            .interact()
    })
    .await??;
    Ok(confirmed)
}
