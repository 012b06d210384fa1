use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{error, info, warn};

use super::round::RoundOrchestrator;
use super::summary::Summarizer;
use crate::event::{Event, EventSender};
use crate::model::{Council, Debate, DebateStatus, HistoryEntry};
use crate::storage::{DebateStore, StatusUpdate};

/// Cooperative cancellation flag shared between a caller and a running debate.
///
/// Checked between rounds; a round already in flight always seals.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives one debate through its lifecycle:
/// `pending -> in_progress -> {consensus_reached | round_limit_reached | cancelled | error}`.
pub struct DebateEngine {
    orchestrator: RoundOrchestrator,
    summarizer: Summarizer,
    store: Arc<dyn DebateStore>,
    /// 0 disables the check
    max_consecutive_failed_rounds: u32,
}

impl DebateEngine {
    pub fn new(
        orchestrator: RoundOrchestrator,
        summarizer: Summarizer,
        store: Arc<dyn DebateStore>,
        max_consecutive_failed_rounds: u32,
    ) -> Self {
        Self {
            orchestrator,
            summarizer,
            store,
            max_consecutive_failed_rounds,
        }
    }

    /// Run `debate` to a terminal status and return it.
    ///
    /// The debate must already be stored. Failures never escape: they end the
    /// debate in `error` with a message. A debate that is already terminal is
    /// returned unchanged.
    pub async fn run(
        &self,
        council: &Council,
        mut debate: Debate,
        cancel: &CancelToken,
        events: &EventSender,
    ) -> Debate {
        if debate.is_terminal() {
            warn!(debate_id = %debate.id, status = %debate.status, "debate already finished");
            return debate;
        }

        if let Err(e) = council.validate() {
            warn!(debate_id = %debate.id, error = %e, "council cannot run a debate");
            self.finalize(
                council,
                &mut debate,
                DebateStatus::Error,
                Some(e.to_string()),
                events,
            )
            .await;
            return debate;
        }

        debate.status = DebateStatus::InProgress;
        match self.persist_status(&debate).await {
            Ok(true) => {}
            Ok(false) => {
                // Finished in the store before it could start
                let (status, message) = self
                    .stored_outcome(&debate.id)
                    .await
                    .unwrap_or((DebateStatus::Cancelled, None));
                self.finalize(council, &mut debate, status, message, events).await;
                return debate;
            }
            Err(e) => {
                self.finalize(council, &mut debate, DebateStatus::Error, Some(e), events).await;
                return debate;
            }
        }
        self.record(&debate, "debate started").await;

        info!(
            debate_id = %debate.id,
            council = %council.name,
            max_rounds = council.max_rounds,
            threshold = council.consensus_threshold,
            "debate started"
        );
        events
            .emit_blocking(Event::DebateStart {
                topic: debate.topic.clone(),
                council_id: council.id.clone(),
                agent_count: council.agents.len(),
                max_rounds: council.max_rounds,
            })
            .await;

        let (status, error_message) = self.run_rounds(council, &mut debate, cancel, events).await;
        self.finalize(council, &mut debate, status, error_message, events).await;
        debate
    }

    /// Schedule rounds until a terminal condition holds.
    async fn run_rounds(
        &self,
        council: &Council,
        debate: &mut Debate,
        cancel: &CancelToken,
        events: &EventSender,
    ) -> (DebateStatus, Option<String>) {
        let mut consecutive_failed = 0;

        loop {
            if cancel.is_cancelled() {
                info!(debate_id = %debate.id, round = debate.current_round, "debate cancelled");
                return (DebateStatus::Cancelled, None);
            }
            if let Some(outcome) = self.stored_outcome(&debate.id).await {
                return outcome;
            }
            if debate.current_round >= council.max_rounds {
                return (DebateStatus::RoundLimitReached, None);
            }

            let round_number = debate.current_round + 1;
            let round = self
                .orchestrator
                .run_round(council, &debate.topic, &debate.rounds, round_number, events)
                .await;

            let consensus = round.consensus_reached;
            let degraded = round.is_degraded();
            let tally = round.tally.unwrap_or_default();

            // A round that finishes after the stored debate ended is dropped
            if let Some(outcome) = self.stored_outcome(&debate.id).await {
                return outcome;
            }
            if let Err(e) = self.store.save_round(&debate.id, &round).await {
                if let Some(outcome) = self.stored_outcome(&debate.id).await {
                    return outcome;
                }
                error!(
                    debate_id = %debate.id,
                    round = round_number,
                    error = %e,
                    "failed to persist round"
                );
                return (
                    DebateStatus::Error,
                    Some(format!("failed to persist round {}: {}", round_number, e)),
                );
            }
            if let Err(e) = debate.push_round(round) {
                error!(debate_id = %debate.id, error = %e, "round rejected");
                return (DebateStatus::Error, Some(e.to_string()));
            }
            self.record(debate, &format!("round {} sealed ({})", round_number, tally)).await;

            // Cancellation requested while the round was in flight wins over
            // whatever the round decided.
            if cancel.is_cancelled() {
                info!(debate_id = %debate.id, round = round_number, "debate cancelled");
                return (DebateStatus::Cancelled, None);
            }
            if consensus {
                return (DebateStatus::ConsensusReached, None);
            }

            consecutive_failed = if degraded { consecutive_failed + 1 } else { 0 };
            if degraded {
                warn!(
                    debate_id = %debate.id,
                    round = round_number,
                    consecutive_failed,
                    "every agent failed this round"
                );
            }
            if self.max_consecutive_failed_rounds > 0
                && consecutive_failed >= self.max_consecutive_failed_rounds
            {
                return (
                    DebateStatus::Error,
                    Some(format!(
                        "every agent failed in {} consecutive rounds",
                        consecutive_failed
                    )),
                );
            }
        }
    }

    /// Enter a terminal status, summarize when due, persist and announce.
    async fn finalize(
        &self,
        council: &Council,
        debate: &mut Debate,
        status: DebateStatus,
        error_message: Option<String>,
        events: &EventSender,
    ) {
        if !debate.finish(status, error_message) {
            return;
        }

        if status.wants_summary() {
            match self.summarizer.summarize(council, debate).await {
                Ok(report) => {
                    debate.summary = Some(report.summary);
                    debate.pro_points = Some(report.pro_points);
                    debate.against_points = Some(report.against_points);
                }
                Err(e) => {
                    warn!(debate_id = %debate.id, error = %e, "summary generation failed");
                }
            }
        }

        match self.persist_status(debate).await {
            Ok(true) => {
                let message = match debate.error_message {
                    Some(ref reason) => format!("debate ended: {} ({})", debate.status, reason),
                    None => format!("debate ended: {}", debate.status),
                };
                self.record(debate, &message).await;
            }
            // The writer that finished it owns the stored outcome and its history
            Ok(false) => match self.store.load_debate(&debate.id).await {
                Ok(Some(stored)) => StatusUpdate::from_debate(&stored).apply(debate),
                Ok(None) => {}
                Err(e) => {
                    warn!(debate_id = %debate.id, error = %e, "failed to reload finished debate");
                }
            },
            Err(e) => {
                error!(debate_id = %debate.id, error = %e, "failed to persist final status");
            }
        }

        info!(
            debate_id = %debate.id,
            status = %debate.status,
            rounds = debate.current_round,
            "debate finished"
        );
        events
            .emit_blocking(Event::DebateComplete {
                status: debate.status,
                rounds: debate.current_round,
                summary: debate.summary.clone(),
                pro_points: debate.pro_points.clone(),
                against_points: debate.against_points.clone(),
                error_message: debate.error_message.clone(),
            })
            .await;
    }

    /// Returns `false` when the stored debate had already finished.
    async fn persist_status(&self, debate: &Debate) -> Result<bool, String> {
        self.store
            .update_debate_status(&debate.id, &StatusUpdate::from_debate(debate))
            .await
            .map_err(|e| format!("failed to persist debate status: {}", e))
    }

    /// Terminal outcome written to the store by someone other than this
    /// driver, such as a cancel or restart recovery run by another process.
    async fn stored_outcome(&self, debate_id: &str) -> Option<(DebateStatus, Option<String>)> {
        match self.store.load_debate(debate_id).await {
            Ok(Some(stored)) if stored.is_terminal() => {
                info!(debate_id, status = %stored.status, "debate finished by another writer");
                Some((stored.status, stored.error_message))
            }
            Ok(_) => None,
            Err(e) => {
                warn!(debate_id, error = %e, "failed to reload debate status");
                None
            }
        }
    }

    /// Append to the debate's history; failures are logged only.
    async fn record(&self, debate: &Debate, message: &str) {
        if let Err(e) = self
            .store
            .append_history(&HistoryEntry::new(debate, message))
            .await
        {
            warn!(debate_id = %debate.id, error = %e, "failed to append history");
        }
    }
}
