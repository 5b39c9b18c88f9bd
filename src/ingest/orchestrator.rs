//! # Fetch Orchestrator
//! Fans out to every live provider concurrently and fans back in under two clocks:
//! a per-source timeout and one global deadline for the whole live phase.
//!
//! - Each provider runs in its own task inside a `JoinSet`, wrapped in `tokio::time::timeout`.
//! - The collector races `join_next` against the deadline in `tokio::select!`.
//! - On deadline the shared `CancellationToken` is cancelled and the set is aborted; late
//!   results are never awaited. A synthetic `deadline` entry records the cut-off.
//! - A failing, slow or panicking provider never affects its siblings. A panic is reported
//!   against its provider even when the deadline fires later.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::task::{self, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::ingest::providers::BaselineProvider;
use crate::ingest::types::{
    CandidateRecord, FetchContext, SourceError, SourceOutcome, SourceProvider,
};

pub const DEADLINE_SOURCE: &str = "deadline";

/// Everything one fetch cycle produced.
#[derive(Debug, Clone)]
pub struct FetchOutput {
    pub baseline: Vec<CandidateRecord>,
    /// Resolved live outcomes, sorted by provider name.
    pub live: Vec<(String, SourceOutcome)>,
    /// Set when the global deadline cut the live phase short.
    pub deadline: Option<SourceError>,
    /// Providers still in flight when the deadline fired.
    pub abandoned: Vec<String>,
}

impl FetchOutput {
    pub fn any_live_confirmed(&self) -> bool {
        self.live.iter().any(|(_, o)| o.is_confirmed())
    }
}

pub struct Orchestrator {
    baseline: BaselineProvider,
    live: Vec<Arc<dyn SourceProvider>>,
    per_source_timeout: Duration,
    deadline: Duration,
}

impl Orchestrator {
    pub fn new(
        baseline: BaselineProvider,
        live: Vec<Arc<dyn SourceProvider>>,
        per_source_timeout: Duration,
        deadline: Duration,
    ) -> Self {
        Self {
            baseline,
            live,
            per_source_timeout,
            deadline,
        }
    }

    pub fn baseline(&self) -> &BaselineProvider {
        &self.baseline
    }

    pub fn live_names(&self) -> Vec<String> {
        self.live.iter().map(|p| p.name().to_string()).collect()
    }

    /// Baseline unconditionally, live sources raced against the deadline.
    pub async fn fetch(&self, ctx: &FetchContext) -> FetchOutput {
        let baseline = self.baseline.load();
        let (live, deadline, abandoned) = self.fetch_live(ctx).await;
        FetchOutput {
            baseline,
            live,
            deadline,
            abandoned,
        }
    }

    async fn fetch_live(
        &self,
        ctx: &FetchContext,
    ) -> (Vec<(String, SourceOutcome)>, Option<SourceError>, Vec<String>) {
        let deadline_at = tokio::time::Instant::now() + self.deadline;
        let cancel = CancellationToken::new();
        let per_ms = self.per_source_timeout.as_millis() as u64;

        let mut set = JoinSet::new();
        // In-flight tasks; a panicked task is named through its `JoinError::id`.
        let mut names: HashMap<task::Id, String> = HashMap::new();
        for provider in &self.live {
            let provider = Arc::clone(provider);
            let ctx = ctx.clone();
            let token = cancel.child_token();
            let per_source = self.per_source_timeout;
            let name = provider.name().to_string();

            let handle = set.spawn(async move {
                let name = provider.name().to_string();
                let outcome = tokio::select! {
                    _ = token.cancelled() => SourceOutcome::Unconfirmed(SourceError::Deadline(0)),
                    res = tokio::time::timeout(per_source, provider.fetch(&ctx)) => match res {
                        Ok(outcome) => outcome,
                        Err(_) => SourceOutcome::Unconfirmed(SourceError::Timeout(per_ms)),
                    },
                };
                (name, outcome)
            });
            names.insert(handle.id(), name);
        }

        let mut outcomes = Vec::with_capacity(names.len());
        let mut deadline_hit = false;
        let sleep = tokio::time::sleep_until(deadline_at);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;
                joined = set.join_next() => match joined {
                    None => break,
                    Some(Ok((name, outcome))) => {
                        names.retain(|_, n| *n != name);
                        outcomes.push((name, outcome));
                    }
                    Some(Err(e)) => {
                        let name = names.remove(&e.id()).unwrap_or_default();
                        tracing::error!(
                            target: "ingest",
                            provider = %name,
                            error = %e,
                            "live source task failed"
                        );
                        outcomes.push((
                            name,
                            SourceOutcome::Unconfirmed(SourceError::Panicked(e.to_string())),
                        ));
                    }
                },
                _ = &mut sleep => {
                    deadline_hit = true;
                    cancel.cancel();
                    set.abort_all();
                    break;
                }
            }
        }

        let deadline_ms = self.deadline.as_millis() as u64;
        let (deadline, abandoned) = if deadline_hit {
            let mut abandoned: Vec<String> = names.into_values().collect();
            abandoned.sort();
            tracing::warn!(
                target: "ingest",
                deadline_ms,
                abandoned = ?abandoned,
                resolved = outcomes.len(),
                "global deadline reached, continuing with partial live results"
            );
            counter!("listings_source_errors_total", "source" => DEADLINE_SOURCE).increment(1);
            (Some(SourceError::Deadline(deadline_ms)), abandoned)
        } else {
            (None, Vec::new())
        };

        for (name, outcome) in &outcomes {
            if let SourceOutcome::Unconfirmed(err) = outcome {
                tracing::warn!(
                    target: "ingest",
                    provider = %name,
                    error = %err,
                    "live source unconfirmed"
                );
                counter!("listings_source_errors_total", "source" => name.clone()).increment(1);
            }
        }

        outcomes.sort_by(|a, b| a.0.cmp(&b.0));
        (outcomes, deadline, abandoned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Fixed {
        name: &'static str,
        delay: Duration,
        outcome: SourceOutcome,
        finished: Arc<AtomicBool>,
    }

    impl Fixed {
        fn new(name: &'static str, delay_ms: u64, outcome: SourceOutcome) -> Self {
            Self {
                name,
                delay: Duration::from_millis(delay_ms),
                outcome,
                finished: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    #[async_trait]
    impl SourceProvider for Fixed {
        async fn fetch(&self, _ctx: &FetchContext) -> SourceOutcome {
            tokio::time::sleep(self.delay).await;
            self.finished.store(true, Ordering::SeqCst);
            self.outcome.clone()
        }
        fn name(&self) -> &str {
            self.name
        }
    }

    struct Panics;

    #[async_trait]
    impl SourceProvider for Panics {
        async fn fetch(&self, _ctx: &FetchContext) -> SourceOutcome {
            panic!("provider blew up");
        }
        fn name(&self) -> &str {
            "panics"
        }
    }

    fn orch(live: Vec<Arc<dyn SourceProvider>>, per_ms: u64, deadline_ms: u64) -> Orchestrator {
        Orchestrator::new(
            BaselineProvider::default(),
            live,
            Duration::from_millis(per_ms),
            Duration::from_millis(deadline_ms),
        )
    }

    #[tokio::test]
    async fn slow_source_times_out_without_affecting_siblings() {
        let o = orch(
            vec![
                Arc::new(Fixed::new("fast", 5, SourceOutcome::confirmed(vec![]))),
                Arc::new(Fixed::new("slow", 2_000, SourceOutcome::confirmed(vec![]))),
            ],
            100,
            1_000,
        );
        let out = o.fetch(&FetchContext::default()).await;
        assert!(out.deadline.is_none());
        assert_eq!(out.live.len(), 2);
        assert_eq!(out.live[0].0, "fast");
        assert!(out.live[0].1.is_confirmed());
        assert_eq!(out.live[1].0, "slow");
        assert_eq!(
            out.live[1].1,
            SourceOutcome::Unconfirmed(SourceError::Timeout(100))
        );
    }

    #[tokio::test]
    async fn deadline_returns_partial_results_and_abandons_the_rest() {
        let slow = Fixed::new("slow", 1_000, SourceOutcome::confirmed(vec![]));
        let slow_done = Arc::clone(&slow.finished);
        let o = orch(
            vec![
                Arc::new(Fixed::new("fast", 5, SourceOutcome::confirmed(vec![]))),
                Arc::new(slow),
            ],
            5_000,
            150,
        );

        let t0 = std::time::Instant::now();
        let out = o.fetch(&FetchContext::default()).await;
        assert!(t0.elapsed() < Duration::from_millis(900));

        assert_eq!(out.deadline, Some(SourceError::Deadline(150)));
        assert_eq!(out.abandoned, vec!["slow".to_string()]);
        assert_eq!(out.live.len(), 1);
        assert_eq!(out.live[0].0, "fast");

        // the abandoned call is cancelled, not left running to completion
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert!(!slow_done.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn panicking_provider_is_isolated() {
        let o = orch(
            vec![
                Arc::new(Panics),
                Arc::new(Fixed::new("ok", 1, SourceOutcome::confirmed(vec![]))),
            ],
            500,
            1_000,
        );
        let out = o.fetch(&FetchContext::default()).await;
        assert_eq!(out.live.len(), 2);
        let ok = out.live.iter().find(|(n, _)| n == "ok").unwrap();
        assert!(ok.1.is_confirmed());
        let bad = out.live.iter().find(|(n, _)| n == "panics").unwrap();
        assert!(matches!(bad.1, SourceOutcome::Unconfirmed(SourceError::Panicked(_))));
    }

    #[tokio::test]
    async fn panic_before_deadline_is_reported_as_panicked_not_abandoned() {
        let o = orch(
            vec![
                Arc::new(Panics),
                Arc::new(Fixed::new("slow", 1_000, SourceOutcome::confirmed(vec![]))),
            ],
            5_000,
            150,
        );
        let out = o.fetch(&FetchContext::default()).await;

        assert_eq!(out.deadline, Some(SourceError::Deadline(150)));
        assert_eq!(out.abandoned, vec!["slow".to_string()]);
        assert_eq!(out.live.len(), 1);
        assert_eq!(out.live[0].0, "panics");
        match &out.live[0].1 {
            SourceOutcome::Unconfirmed(SourceError::Panicked(msg)) => {
                assert!(msg.contains("panicked"), "{msg}");
            }
            other => panic!("expected a panicked outcome, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_live_sources_is_immediate() {
        let o = orch(vec![], 100, 100);
        let out = o.fetch(&FetchContext::default()).await;
        assert!(out.live.is_empty());
        assert!(out.deadline.is_none());
        assert!(!out.any_live_confirmed());
    }
}
