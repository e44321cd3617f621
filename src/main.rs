use anyhow::{Context, Result};
use reqwest::Client;
use std::sync::Arc;
use surveyboard::{
    config::Config,
    feed::{FeedState, SurveyFeed},
    fetch::HttpSource,
    summary::DashboardSummary,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};
use url::Url;

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,surveyboard=info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) configuration ────────────────────────────────────────────
    let cfg = Config::load().context("loading configuration")?;
    info!(
        url = %cfg.source_url,
        poll_ms = cfg.poll_interval_ms,
        auto_refresh = cfg.auto_refresh,
        ordered_commits = cfg.ordered_commits,
        "configured"
    );
    let url = Url::parse(&cfg.source_url)
        .with_context(|| format!("parsing source URL {}", cfg.source_url))?;

    // ─── 3) build the feed ───────────────────────────────────────────
    let source = HttpSource::new(Client::new(), url);
    let feed = Arc::new(
        SurveyFeed::new(source, cfg.expected_fields.clone())
            .with_ordered_commits(cfg.ordered_commits),
    );

    // ─── 4) one-shot mode ────────────────────────────────────────────
    if !cfg.auto_refresh {
        feed.refresh().await.context("fetching survey export")?;
        report(&feed.snapshot())?;
        return Ok(());
    }

    // ─── 5) poll and report every new snapshot until Ctrl-C ──────────
    let mut updates = feed.subscribe();
    let mut reported = 0;
    feed.start_polling(cfg.poll_interval());

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                // one report per committed outcome; loading-only changes are skipped
                if state.revision != reported {
                    reported = state.revision;
                    report(&state)?;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    feed.stop_polling();
    info!("all done");
    Ok(())
}

/// Log the current state and print the summary JSON to stdout.
fn report(state: &FeedState) -> Result<()> {
    if let Some(err) = &state.error {
        error!(error = %err, "latest refresh failed");
    }
    let Some(data) = &state.data else {
        warn!("no survey data yet");
        return Ok(());
    };
    for w in &data.warnings {
        warn!("{}", w);
    }
    let summary = DashboardSummary::build(data, &data.rows);
    println!("{}", serde_json::to_string_pretty(&summary)?);
    info!(
        responses = summary.total_responses,
        updated = ?state.last_updated,
        "reported snapshot"
    );
    Ok(())
}
