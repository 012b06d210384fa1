use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::debate::CancelToken;
use crate::error::CouncilError;
use crate::event::DebateUpdate;
use crate::model::Debate;

/// Handle to a running debate.
///
/// Provides the debate's event stream, a way to request cancellation, and
/// a way to wait for the finished [`Debate`].
///
/// # Event consumption
///
/// Call [`next_event()`](Self::next_event) in a loop to receive events,
/// then call [`wait()`](Self::wait) to get the final debate.
///
/// # Example
///
/// ```no_run
/// # use agents_council::{CouncilError, Debate, DebateHandle};
/// # async fn example(mut handle: DebateHandle) -> Result<Debate, CouncilError> {
/// while let Some(update) = handle.next_event().await {
///     println!("{}: {}", update.event_type(), update.payload());
/// }
/// handle.wait().await
/// # }
/// ```
#[derive(Debug)]
pub struct DebateHandle {
    debate_id: String,
    events: mpsc::Receiver<DebateUpdate>,
    completion: JoinHandle<Debate>,
    cancel: CancelToken,
}

impl DebateHandle {
    pub(crate) fn new(
        debate_id: String,
        events: mpsc::Receiver<DebateUpdate>,
        completion: JoinHandle<Debate>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            debate_id,
            events,
            completion,
            cancel,
        }
    }

    pub fn debate_id(&self) -> &str {
        &self.debate_id
    }

    /// Receive the next event from the running debate.
    ///
    /// Returns `None` when the event stream is closed (the debate finished).
    pub async fn next_event(&mut self) -> Option<DebateUpdate> {
        self.events.recv().await
    }

    /// Ask the debate to stop after the round in flight.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the debate to reach a terminal status.
    ///
    /// Events not yet received are discarded.
    pub async fn wait(self) -> Result<Debate, CouncilError> {
        let Self {
            events, completion, ..
        } = self;
        // Closing the stream lets the debate run without a reader
        drop(events);
        completion
            .await
            .map_err(|e| CouncilError::Internal(anyhow::anyhow!("debate task join error: {}", e)))
    }

    /// Convenience: drain all events and wait for the result.
    pub async fn output(mut self) -> Result<Debate, CouncilError> {
        while self.events.recv().await.is_some() {}
        self.wait().await
    }
}
