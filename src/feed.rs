// src/feed.rs

use crate::{
    error::SurveyError,
    fetch::Source,
    process::{self, ParseResult},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Phase {
    #[default]
    Idle,
    Loading,
    Ready,
    Error,
}

/// What a consumer sees: the last good snapshot plus freshness/error flags.
#[derive(Debug, Clone, Default)]
pub struct FeedState {
    pub phase: Phase,
    /// Last successful parse. Survives later failures.
    pub data: Option<Arc<ParseResult>>,
    /// True while any fetch is outstanding.
    pub loading: bool,
    pub error: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
    /// Bumped on every committed outcome, success or failure.
    pub revision: u64,
    /// Phase of the last committed outcome; `phase` falls back to it once
    /// nothing is in flight.
    settled: Phase,
}

/// Owns the fetch → parse → publish cycle for one source.
///
/// Every completed fetch replaces the published state wholesale. Overlapping
/// refreshes all run to completion; by default the last one to finish wins.
/// With `ordered_commits` a result older than the last committed one is
/// dropped instead. `phase` stays `Loading` until the last outstanding fetch
/// settles, even if an earlier one already committed data.
pub struct SurveyFeed<S: Source> {
    source: S,
    expected_fields: Vec<String>,
    ordered_commits: bool,
    state: watch::Sender<FeedState>,
    next_seq: AtomicU64,
    committed_seq: AtomicU64,
    in_flight: AtomicUsize,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl<S: Source + 'static> SurveyFeed<S> {
    pub fn new(source: S, expected_fields: Vec<String>) -> Self {
        let (state, _) = watch::channel(FeedState::default());
        Self {
            source,
            expected_fields,
            ordered_commits: false,
            state,
            next_seq: AtomicU64::new(0),
            committed_seq: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            poller: Mutex::new(None),
        }
    }

    pub fn with_ordered_commits(mut self, ordered: bool) -> Self {
        self.ordered_commits = ordered;
        self
    }

    /// Current state, cloned out (the parse result itself is shared).
    pub fn snapshot(&self) -> FeedState {
        self.state.borrow().clone()
    }

    /// Receiver that wakes on every state change.
    pub fn subscribe(&self) -> watch::Receiver<FeedState> {
        self.state.subscribe()
    }

    /// Fetch and parse once, then publish the outcome.
    ///
    /// Dropping the returned future before it resolves still releases its
    /// hold on the loading flag.
    pub async fn refresh(&self) -> Result<Arc<ParseResult>, SurveyError> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let guard = InFlight::enter(self, seq);
        debug!(seq, source = %self.source.describe(), "refresh started");

        let outcome = match self.source.fetch().await {
            Ok(fetched) => process::parse_content(
                &fetched.body,
                fetched.name_hint.as_deref(),
                &self.expected_fields,
            )
            .map(Arc::new),
            Err(e) => Err(e),
        };
        guard.complete(&outcome);

        match &outcome {
            Ok(result) => info!(
                seq,
                rows = result.rows.len(),
                warnings = result.warnings.len(),
                "survey snapshot refreshed"
            ),
            Err(e) => warn!(seq, error = %e, "survey refresh failed"),
        }
        outcome
    }

    /// Refresh now and then every `every` until stopped or the feed is
    /// dropped. Replaces any running poller. A tick that lands while the
    /// previous poll is still fetching is skipped.
    pub fn start_polling(self: &Arc<Self>, every: Duration) {
        self.stop_polling();
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut pending: Option<JoinHandle<()>> = None;
            loop {
                ticker.tick().await;
                if pending.as_ref().is_some_and(|h| !h.is_finished()) {
                    debug!("previous poll still running; tick skipped");
                    continue;
                }
                let Some(feed) = weak.upgrade() else {
                    debug!("feed dropped; poller exiting");
                    break;
                };
                // a slow fetch must not hold back the ticker itself
                pending = Some(tokio::spawn(async move {
                    let _ = feed.refresh().await;
                }));
            }
        });
        *self.poller.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        info!(every_ms = every.as_millis() as u64, "auto-refresh on");
    }

    pub fn stop_polling(&self) {
        if let Some(handle) = self
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
            info!("auto-refresh off");
        }
    }

    pub fn is_polling(&self) -> bool {
        self.poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl<S: Source> SurveyFeed<S> {
    /// Release one in-flight slot and publish `outcome` if there is one and
    /// it is not stale. `None` means the refresh was cancelled.
    fn settle(&self, seq: u64, outcome: Option<&Result<Arc<ParseResult>, SurveyError>>) {
        let remaining = self.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        self.state.send_modify(|st| {
            st.loading = remaining > 0;

            match outcome {
                None => debug!(seq, "refresh cancelled"),
                Some(_)
                    if self.ordered_commits
                        && seq < self.committed_seq.load(Ordering::SeqCst) =>
                {
                    debug!(seq, "stale refresh result dropped");
                }
                Some(outcome) => {
                    self.committed_seq.store(seq, Ordering::SeqCst);
                    st.revision += 1;
                    match outcome {
                        Ok(result) => {
                            st.settled = Phase::Ready;
                            st.data = Some(Arc::clone(result));
                            st.error = None;
                            st.last_updated = Some(Utc::now());
                        }
                        Err(e) => {
                            st.settled = Phase::Error;
                            st.error = Some(e.to_string());
                        }
                    }
                }
            }

            st.phase = if st.loading { Phase::Loading } else { st.settled };
        });
    }
}

/// Holds one slot of the in-flight count for the life of a refresh.
struct InFlight<'a, S: Source> {
    feed: &'a SurveyFeed<S>,
    seq: u64,
    armed: bool,
}

impl<'a, S: Source> InFlight<'a, S> {
    fn enter(feed: &'a SurveyFeed<S>, seq: u64) -> Self {
        feed.in_flight.fetch_add(1, Ordering::SeqCst);
        feed.state.send_modify(|st| {
            st.phase = Phase::Loading;
            st.loading = true;
            st.error = None;
        });
        Self {
            feed,
            seq,
            armed: true,
        }
    }

    fn complete(mut self, outcome: &Result<Arc<ParseResult>, SurveyError>) {
        self.armed = false;
        self.feed.settle(self.seq, Some(outcome));
    }
}

impl<S: Source> Drop for InFlight<'_, S> {
    fn drop(&mut self) {
        if self.armed {
            self.feed.settle(self.seq, None);
        }
    }
}

impl<S: Source> Drop for SurveyFeed<S> {
    fn drop(&mut self) {
        if let Some(handle) = self
            .poller
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::default_expected_fields, fetch::Fetched};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use tokio::time::sleep;

    /// Plays back scripted responses; once the script runs out it keeps
    /// returning `fallback`.
    struct ScriptedSource {
        script: Mutex<VecDeque<(Duration, Result<String, SurveyError>)>>,
        fallback: String,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        fn new(script: Vec<(u64, Result<&str, SurveyError>)>, fallback: &str) -> Self {
            Self {
                script: Mutex::new(
                    script
                        .into_iter()
                        .map(|(ms, r)| (Duration::from_millis(ms), r.map(str::to_string)))
                        .collect(),
                ),
                fallback: fallback.to_string(),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl Source for ScriptedSource {
        async fn fetch(&self) -> Result<Fetched, SurveyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            let (delay, body) = next.unwrap_or((Duration::ZERO, Ok(self.fallback.clone())));
            sleep(delay).await;
            body.map(|body| Fetched {
                body,
                name_hint: Some("responses.csv".into()),
            })
        }

        fn describe(&self) -> String {
            "scripted".into()
        }
    }

    const ONE_ROW: &str = "Name,Profession\nAda,Nurse\n";
    const TWO_ROWS: &str = "Name,Profession\nAda,Nurse\nBo,Teacher\n";

    fn feed(source: ScriptedSource) -> SurveyFeed<ScriptedSource> {
        SurveyFeed::new(source, default_expected_fields())
    }

    fn row_count(state: &FeedState) -> Option<usize> {
        state.data.as_ref().map(|d| d.rows.len())
    }

    #[tokio::test]
    async fn starts_idle() {
        let f = feed(ScriptedSource::new(vec![], ONE_ROW));
        let st = f.snapshot();
        assert_eq!(st.phase, Phase::Idle);
        assert!(st.data.is_none() && st.error.is_none() && !st.loading);
    }

    #[tokio::test]
    async fn successful_refresh_publishes_snapshot() -> anyhow::Result<()> {
        let f = feed(ScriptedSource::new(vec![], TWO_ROWS));
        let result = f.refresh().await?;
        assert_eq!(result.rows.len(), 2);

        let st = f.snapshot();
        assert_eq!(st.phase, Phase::Ready);
        assert_eq!(row_count(&st), Some(2));
        assert!(!st.loading);
        assert!(st.error.is_none());
        assert!(st.last_updated.is_some());
        assert_eq!(st.data.as_ref().map(|d| d.warnings.len()), Some(10));
        Ok(())
    }

    #[tokio::test]
    async fn failure_keeps_previous_data() -> anyhow::Result<()> {
        let f = feed(ScriptedSource::new(
            vec![
                (0, Ok(ONE_ROW)),
                (0, Err(SurveyError::fetch("http://x/responses.csv", "connection reset"))),
                (0, Ok("   ")),
            ],
            ONE_ROW,
        ));
        f.refresh().await?;
        let first_update = f.snapshot().last_updated;

        assert!(f.refresh().await.is_err());
        let st = f.snapshot();
        assert_eq!(st.phase, Phase::Error);
        assert_eq!(row_count(&st), Some(1));
        assert_eq!(st.last_updated, first_update);
        assert!(st.error.as_deref().unwrap_or_default().contains("connection reset"));

        let err = f.refresh().await.unwrap_err();
        assert!(matches!(err, SurveyError::MalformedInput(_)));
        let st = f.snapshot();
        assert_eq!(row_count(&st), Some(1));
        assert!(st.error.as_deref().unwrap_or_default().contains("CSV file is empty"));

        // next good cycle clears the error
        f.refresh().await?;
        assert!(f.snapshot().error.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn slower_earlier_fetch_wins_by_default() {
        let f = feed(ScriptedSource::new(
            vec![(150, Ok(ONE_ROW)), (10, Ok(TWO_ROWS))],
            ONE_ROW,
        ));
        let (a, b) = futures::future::join(f.refresh(), async {
            sleep(Duration::from_millis(20)).await;
            f.refresh().await
        })
        .await;
        assert!(a.is_ok() && b.is_ok());

        let st = f.snapshot();
        assert_eq!(row_count(&st), Some(1));
        assert!(!st.loading);
    }

    #[tokio::test]
    async fn ordered_commits_drop_stale_results() {
        let f = feed(ScriptedSource::new(
            vec![(150, Ok(ONE_ROW)), (10, Ok(TWO_ROWS))],
            ONE_ROW,
        ))
        .with_ordered_commits(true);
        let _ = futures::future::join(f.refresh(), async {
            sleep(Duration::from_millis(20)).await;
            f.refresh().await
        })
        .await;

        let st = f.snapshot();
        assert_eq!(row_count(&st), Some(2));
        assert_eq!(st.phase, Phase::Ready);
        assert!(!st.loading);
    }

    #[tokio::test]
    async fn loading_flag_tracks_in_flight_fetches() {
        let f = Arc::new(feed(ScriptedSource::new(vec![(100, Ok(ONE_ROW))], ONE_ROW)));
        let bg = {
            let f = Arc::clone(&f);
            tokio::spawn(async move { f.refresh().await })
        };
        sleep(Duration::from_millis(30)).await;
        let st = f.snapshot();
        assert!(st.loading);
        assert_eq!(st.phase, Phase::Loading);

        let _ = bg.await;
        assert!(!f.snapshot().loading);
    }

    #[tokio::test]
    async fn cancelled_refresh_releases_loading_flag() -> anyhow::Result<()> {
        let f = feed(ScriptedSource::new(vec![(200, Ok(TWO_ROWS))], ONE_ROW));
        let timed_out = tokio::time::timeout(Duration::from_millis(20), f.refresh()).await;
        assert!(timed_out.is_err());

        let st = f.snapshot();
        assert!(!st.loading);
        assert_eq!(st.phase, Phase::Idle);
        assert_eq!(st.revision, 0);

        f.refresh().await?;
        let st = f.snapshot();
        assert!(!st.loading);
        assert_eq!(st.phase, Phase::Ready);
        assert_eq!(row_count(&st), Some(1));
        Ok(())
    }

    #[tokio::test]
    async fn phase_stays_loading_until_last_fetch_settles() -> anyhow::Result<()> {
        let f = Arc::new(feed(ScriptedSource::new(
            vec![(150, Ok(ONE_ROW)), (10, Ok(TWO_ROWS))],
            ONE_ROW,
        )));
        let slow = {
            let f = Arc::clone(&f);
            tokio::spawn(async move { f.refresh().await })
        };
        sleep(Duration::from_millis(20)).await;

        f.refresh().await?;
        let st = f.snapshot();
        assert_eq!(row_count(&st), Some(2));
        assert_eq!(st.revision, 1);
        assert!(st.loading);
        assert_eq!(st.phase, Phase::Loading);

        slow.await??;
        let st = f.snapshot();
        assert!(!st.loading);
        assert_eq!(st.phase, Phase::Ready);
        assert_eq!(st.revision, 2);
        assert_eq!(row_count(&st), Some(1));
        Ok(())
    }

    #[tokio::test]
    async fn slow_polls_do_not_pile_up() {
        let source = ScriptedSource::new(vec![(250, Ok(TWO_ROWS))], ONE_ROW);
        let calls = Arc::clone(&source.calls);
        let f = Arc::new(feed(source));

        f.start_polling(Duration::from_millis(20));
        sleep(Duration::from_millis(150)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(f.snapshot().loading);

        sleep(Duration::from_millis(200)).await;
        assert!(calls.load(Ordering::SeqCst) >= 2);
        let st = f.snapshot();
        assert!(st.revision >= 2);
        assert_eq!(row_count(&st), Some(1));
        f.stop_polling();
    }

    #[tokio::test]
    async fn subscribers_see_new_snapshots() -> anyhow::Result<()> {
        let f = feed(ScriptedSource::new(vec![], ONE_ROW));
        let mut rx = f.subscribe();
        f.refresh().await?;
        rx.changed().await?;
        assert_eq!(row_count(&rx.borrow()), Some(1));
        Ok(())
    }

    #[tokio::test]
    async fn polling_starts_and_stops() {
        let source = ScriptedSource::new(vec![], ONE_ROW);
        let calls = Arc::clone(&source.calls);
        let f = Arc::new(feed(source));

        f.start_polling(Duration::from_millis(30));
        assert!(f.is_polling());
        sleep(Duration::from_millis(110)).await;
        assert!(calls.load(Ordering::SeqCst) >= 2);
        assert_eq!(f.snapshot().phase, Phase::Ready);

        f.stop_polling();
        assert!(!f.is_polling());
        sleep(Duration::from_millis(20)).await;
        let after_stop = calls.load(Ordering::SeqCst);
        sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test]
    async fn dropping_the_feed_ends_polling() {
        let source = ScriptedSource::new(vec![], ONE_ROW);
        let calls = Arc::clone(&source.calls);
        let f = Arc::new(feed(source));

        f.start_polling(Duration::from_millis(30));
        sleep(Duration::from_millis(50)).await;
        drop(f);
        sleep(Duration::from_millis(20)).await;
        let after_drop = calls.load(Ordering::SeqCst);
        sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), after_drop);
    }
}
