//! Evaluation wait coordination.
//!
//! One gate exists per session, created at start and discarded at
//! teardown. The data-channel handler delivers into it; the stop path
//! races the delivery notification against the grace window. No state is
//! shared through closures and nothing polls on an interval.

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;
use voxcoach_types::EvaluationPayload;

/// One-shot holder for the evaluation result of a single session.
#[derive(Debug, Default)]
pub struct EvaluationGate {
    slot: Mutex<Option<EvaluationPayload>>,
    arrived: Notify,
}

impl EvaluationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a result. First arrival wins; returns false when a result
    /// was already present and this one was ignored.
    pub fn deliver(&self, payload: EvaluationPayload) -> bool {
        let Ok(mut slot) = self.slot.lock() else {
            tracing::error!("evaluation slot poisoned; dropping result");
            return false;
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(payload);
        drop(slot);
        // notify_one stores a permit, so delivery before wait() is not lost.
        self.arrived.notify_one();
        true
    }

    pub fn has_result(&self) -> bool {
        self.slot.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    pub fn result(&self) -> Option<EvaluationPayload> {
        self.slot.lock().ok().and_then(|slot| slot.clone())
    }

    /// Race "result arrived" against the grace window. Returns whatever is
    /// in the slot when either side resolves; a timeout is not an error.
    pub async fn wait(&self, grace: Duration) -> Option<EvaluationPayload> {
        if let Some(result) = self.result() {
            return Some(result);
        }
        tokio::select! {
            _ = self.arrived.notified() => self.result(),
            _ = tokio::time::sleep(grace) => {
                // The result may still have landed on the final tick.
                let result = self.result();
                if result.is_none() {
                    tracing::info!(grace_secs = grace.as_secs(), "evaluation grace window elapsed without a result");
                }
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    fn payload(summary: &str) -> EvaluationPayload {
        EvaluationPayload {
            summary: Some(summary.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn first_arrival_wins() {
        let gate = EvaluationGate::new();
        assert!(gate.deliver(payload("first")));
        assert!(!gate.deliver(payload("second")));
        assert_eq!(gate.result().unwrap().summary.as_deref(), Some("first"));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_resolves_immediately_when_delivered_first() {
        let gate = EvaluationGate::new();
        gate.deliver(payload("early"));
        let started = Instant::now();
        let result = gate.wait(Duration::from_secs(45)).await;
        assert_eq!(result.unwrap().summary.as_deref(), Some("early"));
        assert!(started.elapsed() < Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out_within_the_grace_window() {
        let gate = EvaluationGate::new();
        let started = Instant::now();
        let result = gate.wait(Duration::from_secs(10)).await;
        assert!(result.is_none());
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert!(started.elapsed() < Duration::from_millis(10_500));
    }

    #[tokio::test(start_paused = true)]
    async fn delivery_during_the_wait_unblocks_it() {
        let gate = std::sync::Arc::new(EvaluationGate::new());
        let deliverer = gate.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            deliverer.deliver(payload("late but in time"));
        });
        let started = Instant::now();
        let result = gate.wait(Duration::from_secs(45)).await;
        assert_eq!(
            result.unwrap().summary.as_deref(),
            Some("late but in time")
        );
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
