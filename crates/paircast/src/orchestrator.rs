//! Outer publish cycle driver.
//!
//! One `run()` call drives gather and publish through the state machine
//! until an update is durably recorded or the run's budget is spent. Two
//! budgets apply: the outer cycle count and wall-clock timeout owned here,
//! and the inner retry policy handed down into the publish phase. The time
//! budget is checked with look-ahead so the run refuses a retry interval it
//! cannot afford instead of sleeping through its own deadline.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error, info, warn};

use crate::backoff::Backoff;
use crate::budget::BudgetClock;
use crate::compose::{MessageComposer, PairSelector};
use crate::config::CycleSettings;
use crate::endpoint::PostingEndpoint;
use crate::error::{PublishError, PublishResult};
use crate::gather::gather;
use crate::publish::{publish, Published};
use crate::state_machine::{CycleMachine, CycleState};
use crate::store::{PairSource, PostStore};
use crate::types::{Draft, Pair, PostReceipt, RecordId};

/// Everything a cycle needs to talk to the outside world.
///
/// Held as `Arc<dyn Trait>` so one Postgres client can serve as both the
/// pair source and the post store.
pub struct Collaborators {
    pub source: Arc<dyn PairSource>,
    pub selector: Arc<dyn PairSelector>,
    pub composer: Arc<dyn MessageComposer>,
    pub endpoint: Arc<dyn PostingEndpoint>,
    pub store: Arc<dyn PostStore>,
}

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub pair: Pair,
    pub receipt: PostReceipt,
    pub record_id: RecordId,
    /// Outer cycles spent, including the one that succeeded.
    pub cycles: u32,
    pub elapsed: Duration,
}

/// Drives publish cycles against a set of collaborators.
pub struct Orchestrator {
    settings: CycleSettings,
    clock: BudgetClock,
    machine: CycleMachine,
    outer: Backoff,
    inner: Backoff,
    collaborators: Collaborators,
}

impl Orchestrator {
    /// Build an orchestrator. The clock is passed in rather than started
    /// here so connection setup time counts against the run budget.
    pub fn new(settings: CycleSettings, clock: BudgetClock, collaborators: Collaborators) -> Self {
        let outer = Backoff::new(settings.global_retry, settings.global_interval);
        let inner = Backoff::new(settings.inner_retry, settings.inner_interval);
        Self {
            settings,
            clock,
            machine: CycleMachine::new(),
            outer,
            inner,
            collaborators,
        }
    }

    /// Run publish cycles until one succeeds or the budget runs out.
    pub async fn run(&mut self) -> Result<RunReport> {
        info!(
            global_retry = self.outer.limit(),
            global_timeout_secs = self.settings.global_timeout,
            inner_retry = self.inner.limit(),
            "starting publish run"
        );

        loop {
            let cycle = self.machine.cycle();
            info!(cycle, "starting publish cycle");

            let draft = match gather(
                self.collaborators.source.as_ref(),
                self.collaborators.selector.as_ref(),
                self.collaborators.composer.as_ref(),
            )
            .await
            {
                Ok(draft) => draft,
                Err(e) => {
                    self.retry_or_fail(e).await?;
                    continue;
                }
            };
            self.machine
                .advance(CycleState::Publishing, Some("draft composed"))?;

            match self.publish_with_resend(&draft).await {
                Ok(published) => {
                    self.machine
                        .advance(CycleState::Published, Some("record confirmed"))?;
                    let elapsed = self.clock.elapsed();
                    info!(
                        cycle,
                        pair = %draft.pair,
                        receipt = %published.receipt,
                        record_id = %published.record_id,
                        elapsed_secs = elapsed.as_secs(),
                        summary = %self.machine.summary(),
                        "publish cycle succeeded"
                    );
                    return Ok(RunReport {
                        pair: draft.pair,
                        receipt: published.receipt,
                        record_id: published.record_id,
                        cycles: cycle,
                        elapsed,
                    });
                }
                Err(e) => self.retry_or_fail(e).await?,
            }
        }
    }

    /// Publish phase plus its send wrapper.
    ///
    /// Re-invoking the phase is only safe while no post exists, so the
    /// wrapper retries send failures alone. A record failure arrives here
    /// with a live post behind it and falls through to the outer cycle,
    /// where sending again is an explicit new decision.
    async fn publish_with_resend(&self, draft: &Draft) -> PublishResult<Published> {
        let mut attempt: u32 = 1;
        loop {
            match publish(
                self.collaborators.endpoint.as_ref(),
                self.collaborators.store.as_ref(),
                draft,
                &self.inner,
            )
            .await
            {
                Ok(published) => return Ok(published),
                Err(e @ PublishError::SendFailure { .. }) => {
                    warn!(
                        attempt,
                        limit = self.inner.limit(),
                        error = %e,
                        "send failed, nothing posted"
                    );
                    attempt += 1;
                    if !self.inner.allows(attempt) {
                        return Err(e);
                    }
                    self.inner.wait().await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Decide whether the failed cycle gets a successor.
    ///
    /// The time budget is checked before the interval sleep so the run never
    /// starts a wait it cannot afford. The attempt limit is checked after
    /// the sleep, once the next cycle number is known.
    async fn retry_or_fail(&mut self, err: PublishError) -> Result<()> {
        let elapsed = self.clock.elapsed();
        warn!(
            cycle = self.machine.cycle(),
            elapsed_secs = elapsed.as_secs(),
            error = %err,
            "publish cycle failed"
        );

        if self
            .clock
            .lookahead_exhausted(self.settings.global_timeout, self.settings.global_interval)
        {
            self.machine.fail("time budget exhausted")?;
            error!(summary = %self.machine.summary(), "giving up: time budget exhausted");
            return Err(PublishError::exhausted(
                self.machine.cycle(),
                elapsed,
                format!("no time budget left for another cycle; last failure: {err}"),
            )
            .into());
        }

        if let Some(remaining) = self.clock.remaining(self.settings.global_timeout) {
            debug!(
                remaining_secs = remaining.as_secs(),
                "budget left for further cycles"
            );
        }
        self.machine
            .advance(CycleState::WaitingRetry, Some("waiting out retry interval"))?;
        self.outer.wait().await;

        let next = self.machine.cycle() + 1;
        if !self.outer.allows(next) {
            self.machine.fail("outer retry limit reached")?;
            error!(summary = %self.machine.summary(), "giving up: outer retry limit reached");
            return Err(PublishError::exhausted(
                self.machine.cycle(),
                self.clock.elapsed(),
                format!("outer retry limit reached; last failure: {err}"),
            )
            .into());
        }
        self.machine.set_cycle(next);
        self.machine
            .advance(CycleState::Gathering, Some("starting retry cycle"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::{MockMessageComposer, MockPairSelector};
    use crate::endpoint::MockPostingEndpoint;
    use crate::store::{MockPairSource, MockPostStore};

    fn settings(
        global_timeout: u64,
        global_retry: u32,
        global_interval: u64,
        inner_retry: u32,
    ) -> CycleSettings {
        CycleSettings {
            global_timeout,
            global_retry,
            global_interval,
            inner_retry,
            inner_interval: 0,
        }
    }

    fn picking_selector() -> MockPairSelector {
        let mut selector = MockPairSelector::new();
        selector
            .expect_select()
            .returning(|pairs| pairs.first().cloned());
        selector
    }

    fn echo_composer() -> MockMessageComposer {
        let mut composer = MockMessageComposer::new();
        composer
            .expect_compose()
            .returning(|pair| Some(format!("update for {pair}")));
        composer
    }

    fn collaborators(
        source: MockPairSource,
        endpoint: MockPostingEndpoint,
        store: MockPostStore,
    ) -> Collaborators {
        Collaborators {
            source: Arc::new(source),
            selector: Arc::new(picking_selector()),
            composer: Arc::new(echo_composer()),
            endpoint: Arc::new(endpoint),
            store: Arc::new(store),
        }
    }

    fn ranked_pair() -> Vec<Pair> {
        vec![Pair::new("BTC/USDT", 1_200_000.0, &["binance"])]
    }

    #[tokio::test]
    async fn test_single_cycle_success() {
        let mut source = MockPairSource::new();
        source
            .expect_fetch_top_pairs()
            .times(1)
            .returning(|| Ok(ranked_pair()));
        let mut endpoint = MockPostingEndpoint::new();
        endpoint
            .expect_send()
            .times(1)
            .returning(|_, _| Ok(PostReceipt("tid1".into())));
        let mut store = MockPostStore::new();
        store
            .expect_record()
            .times(1)
            .returning(|_| Ok(RecordId("rid1".into())));

        let mut orchestrator = Orchestrator::new(
            settings(0, 3, 0, 3),
            BudgetClock::start(),
            collaborators(source, endpoint, store),
        );
        let report = orchestrator.run().await.unwrap();

        assert_eq!(report.cycles, 1);
        assert_eq!(report.pair.symbol, "BTC/USDT");
        assert_eq!(report.receipt, PostReceipt("tid1".into()));
        assert_eq!(report.record_id, RecordId("rid1".into()));
    }

    #[tokio::test]
    async fn test_send_failure_reinvokes_publish_within_the_cycle() {
        // One gather only: the re-send happens inside the cycle, not via the
        // outer loop.
        let mut source = MockPairSource::new();
        source
            .expect_fetch_top_pairs()
            .times(1)
            .returning(|| Ok(ranked_pair()));
        let mut endpoint = MockPostingEndpoint::new();
        endpoint
            .expect_send()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("endpoint timeout")));
        endpoint
            .expect_send()
            .times(1)
            .returning(|_, _| Ok(PostReceipt("tid2".into())));
        let mut store = MockPostStore::new();
        store
            .expect_record()
            .times(1)
            .returning(|_| Ok(RecordId("rid2".into())));

        let mut orchestrator = Orchestrator::new(
            settings(0, 1, 0, 3),
            BudgetClock::start(),
            collaborators(source, endpoint, store),
        );
        let report = orchestrator.run().await.unwrap();

        assert_eq!(report.cycles, 1);
        assert_eq!(report.receipt, PostReceipt("tid2".into()));
    }

    #[tokio::test]
    async fn test_record_exhaustion_never_resends_within_the_cycle() {
        let mut source = MockPairSource::new();
        source
            .expect_fetch_top_pairs()
            .times(1)
            .returning(|| Ok(ranked_pair()));
        // Exactly one send: once a receipt exists the cycle may not send again.
        let mut endpoint = MockPostingEndpoint::new();
        endpoint
            .expect_send()
            .times(1)
            .returning(|_, _| Ok(PostReceipt("tid3".into())));
        let mut store = MockPostStore::new();
        store
            .expect_record()
            .times(2)
            .returning(|_| Err(anyhow::anyhow!("store refused")));

        let mut orchestrator = Orchestrator::new(
            settings(0, 1, 0, 2),
            BudgetClock::start(),
            collaborators(source, endpoint, store),
        );
        let err = orchestrator.run().await.unwrap_err();

        match err.downcast_ref::<PublishError>() {
            Some(PublishError::BudgetExhausted {
                attempts, detail, ..
            }) => {
                assert_eq!(*attempts, 1);
                assert!(detail.contains("outer retry limit"));
                assert!(detail.contains("tid3"));
            }
            other => panic!("expected BudgetExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_recovers_on_a_later_cycle() {
        let mut source = MockPairSource::new();
        source
            .expect_fetch_top_pairs()
            .times(1)
            .returning(|| Err(anyhow::anyhow!("db connection reset")));
        source
            .expect_fetch_top_pairs()
            .times(1)
            .returning(|| Ok(ranked_pair()));
        let mut endpoint = MockPostingEndpoint::new();
        endpoint
            .expect_send()
            .times(1)
            .returning(|_, _| Ok(PostReceipt("tid4".into())));
        let mut store = MockPostStore::new();
        store
            .expect_record()
            .times(1)
            .returning(|_| Ok(RecordId("rid4".into())));

        let mut orchestrator = Orchestrator::new(
            settings(0, 3, 0, 3),
            BudgetClock::start(),
            collaborators(source, endpoint, store),
        );
        let report = orchestrator.run().await.unwrap();

        assert_eq!(report.cycles, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookahead_stops_before_a_sleep_it_cannot_afford() {
        // 10s budget, 5s interval, unbounded retries. Cycles fail at t=0, 5
        // and 10; at t=10 the next interval would land past the deadline, so
        // the run fails there instead of sleeping a fourth time.
        let mut source = MockPairSource::new();
        source
            .expect_fetch_top_pairs()
            .times(3)
            .returning(|| Ok(Vec::new()));

        let mut orchestrator = Orchestrator::new(
            settings(10, 0, 5, 3),
            BudgetClock::start(),
            collaborators(source, MockPostingEndpoint::new(), MockPostStore::new()),
        );
        let err = orchestrator.run().await.unwrap_err();

        match err.downcast_ref::<PublishError>() {
            Some(PublishError::BudgetExhausted {
                attempts,
                elapsed_secs,
                detail,
            }) => {
                assert_eq!(*attempts, 3);
                assert_eq!(*elapsed_secs, 10);
                assert!(detail.contains("time budget"));
            }
            other => panic!("expected BudgetExhausted, got {other:?}"),
        }
    }
}
