//! Two-phase start barrier for the workers of one concurrency level.
//!
//! Phase one: every participant signals ready once its backend session is up.
//! Phase two: the controller observes exactly `n` ready signals and broadcasts
//! the release. After release the same channel carries the stop signal that
//! ends the timed loop early when the level is abandoned. A barrier instance
//! serves a single level and is never reused.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

use crate::error::BarrierError;

/// Observable phase of a barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierPhase {
    /// Collecting ready signals
    AwaitingReady,
    /// Go was broadcast; terminal
    Released,
    /// The level was abandoned before go; terminal
    Aborted,
    /// The level was abandoned after go; terminal
    Stopped,
}

struct Shared {
    expected: usize,
    ready: watch::Sender<usize>,
    phase: watch::Sender<BarrierPhase>,
}

/// Controller side of the barrier
pub struct Rendezvous {
    shared: Arc<Shared>,
}

/// Worker side of the barrier, before the ready signal
pub struct Participant {
    shared: Arc<Shared>,
}

/// Worker side of the barrier, after the ready signal
pub struct ReadyParticipant {
    phase: watch::Receiver<BarrierPhase>,
}

/// Worker side of the barrier, after release
pub struct StopSignal {
    phase: watch::Receiver<BarrierPhase>,
}

impl Rendezvous {
    /// Create a barrier for `expected` workers along with exactly that many participant handles
    pub fn new(expected: usize) -> (Self, Vec<Participant>) {
        let (ready, _) = watch::channel(0usize);
        let (phase, _) = watch::channel(BarrierPhase::AwaitingReady);
        let shared = Arc::new(Shared {
            expected,
            ready,
            phase,
        });

        let participants = (0..expected)
            .map(|_| Participant {
                shared: shared.clone(),
            })
            .collect();

        (Self { shared }, participants)
    }

    pub fn expected(&self) -> usize {
        self.shared.expected
    }

    pub fn ready_count(&self) -> usize {
        *self.shared.ready.borrow()
    }

    pub fn phase(&self) -> BarrierPhase {
        *self.shared.phase.borrow()
    }

    /// Suspend until every participant has signaled ready
    ///
    /// Wakes on the final signal; there is no polling interval.
    pub async fn wait_all_ready(&self) {
        let expected = self.shared.expected;
        let mut ready = self.shared.ready.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = ready.wait_for(|count| *count >= expected).await;
    }

    /// Broadcast go to every participant and return the release instant
    pub fn release(&self) -> Result<Instant, BarrierError> {
        let ready = self.ready_count();
        if ready != self.shared.expected {
            return Err(BarrierError::Premature {
                ready,
                expected: self.shared.expected,
            });
        }
        if self.phase() != BarrierPhase::AwaitingReady {
            return Err(BarrierError::Aborted);
        }

        let released_at = Instant::now();
        self.shared.phase.send_replace(BarrierPhase::Released);
        Ok(released_at)
    }

    /// Wake every waiting participant with an error; no-op once released
    pub fn abort(&self) {
        self.shared.phase.send_if_modified(|phase| {
            if *phase == BarrierPhase::AwaitingReady {
                *phase = BarrierPhase::Aborted;
                true
            } else {
                false
            }
        });
    }

    /// Abandon the level: abort before release, stop released workers after it
    pub fn stop(&self) {
        self.shared.phase.send_if_modified(|phase| match *phase {
            BarrierPhase::AwaitingReady => {
                *phase = BarrierPhase::Aborted;
                true
            }
            BarrierPhase::Released => {
                *phase = BarrierPhase::Stopped;
                true
            }
            BarrierPhase::Aborted | BarrierPhase::Stopped => false,
        });
    }
}

impl Drop for Rendezvous {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Participant {
    /// Signal ready; consuming the handle makes a second signal impossible
    pub fn signal_ready(self) -> ReadyParticipant {
        let phase = self.shared.phase.subscribe();
        self.shared.ready.send_modify(|count| *count += 1);
        ReadyParticipant { phase }
    }
}

impl ReadyParticipant {
    /// Suspend until the controller releases or aborts the barrier
    pub async fn await_release(mut self) -> Result<StopSignal, BarrierError> {
        let phase = *self
            .phase
            .wait_for(|phase| *phase != BarrierPhase::AwaitingReady)
            .await
            .map_err(|_| BarrierError::Aborted)?;

        match phase {
            BarrierPhase::Released => Ok(StopSignal { phase: self.phase }),
            _ => Err(BarrierError::Aborted),
        }
    }
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        *self.phase.borrow() == BarrierPhase::Stopped
    }

    /// Resolve once the controller stops the level or goes away
    pub async fn stopped(&mut self) {
        let _ = self
            .phase
            .wait_for(|phase| *phase == BarrierPhase::Stopped)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_new_hands_out_exactly_n_participants() {
        let (barrier, participants) = Rendezvous::new(4);
        assert_eq!(participants.len(), 4);
        assert_eq!(barrier.expected(), 4);
        assert_eq!(barrier.ready_count(), 0);
        assert_eq!(barrier.phase(), BarrierPhase::AwaitingReady);
    }

    #[test]
    fn test_release_refused_before_all_ready() {
        let (barrier, mut participants) = Rendezvous::new(3);
        let _a = participants.pop().unwrap().signal_ready();
        let _b = participants.pop().unwrap().signal_ready();

        let err = barrier.release().unwrap_err();
        assert_eq!(
            err,
            BarrierError::Premature {
                ready: 2,
                expected: 3
            }
        );
        assert_eq!(barrier.phase(), BarrierPhase::AwaitingReady);
    }

    #[tokio::test]
    async fn test_release_after_all_ready_wakes_participants() {
        let (barrier, participants) = Rendezvous::new(3);

        let handles: Vec<_> = participants
            .into_iter()
            .map(|p| {
                tokio::spawn(async move {
                    let ready = p.signal_ready();
                    ready.await_release().await.map(|_| Instant::now())
                })
            })
            .collect();

        tokio::time::timeout(Duration::from_secs(5), barrier.wait_all_ready())
            .await
            .expect("all participants should become ready");
        assert_eq!(barrier.ready_count(), 3);

        let released_at = barrier.release().unwrap();
        assert_eq!(barrier.phase(), BarrierPhase::Released);

        for handle in handles {
            let woke_at = handle.await.unwrap().unwrap();
            assert!(woke_at >= released_at);
        }
    }

    #[tokio::test]
    async fn test_wait_all_ready_blocks_on_partial_count() {
        let (barrier, mut participants) = Rendezvous::new(2);
        let _first = participants.pop().unwrap().signal_ready();

        let waited =
            tokio::time::timeout(Duration::from_millis(50), barrier.wait_all_ready()).await;
        assert!(waited.is_err());

        let _second = participants.pop().unwrap().signal_ready();
        tokio::time::timeout(Duration::from_secs(1), barrier.wait_all_ready())
            .await
            .expect("final signal should wake the controller");
    }

    #[tokio::test]
    async fn test_abort_wakes_waiting_participant_with_error() {
        let (barrier, mut participants) = Rendezvous::new(2);
        let ready = participants.pop().unwrap().signal_ready();
        let waiter = tokio::spawn(ready.await_release());

        barrier.abort();
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(BarrierError::Aborted)));
        assert_eq!(barrier.phase(), BarrierPhase::Aborted);
    }

    #[tokio::test]
    async fn test_dropping_controller_aborts() {
        let (barrier, mut participants) = Rendezvous::new(2);
        let ready = participants.pop().unwrap().signal_ready();
        drop(barrier);
        assert!(matches!(ready.await_release().await, Err(BarrierError::Aborted)));
    }

    #[test]
    fn test_abort_after_release_is_noop() {
        let (barrier, participants) = Rendezvous::new(1);
        let _ready: Vec<_> = participants.into_iter().map(|p| p.signal_ready()).collect();
        barrier.release().unwrap();
        barrier.abort();
        assert_eq!(barrier.phase(), BarrierPhase::Released);
    }

    #[tokio::test]
    async fn test_stop_after_release_wakes_stop_signal() {
        let (barrier, participants) = Rendezvous::new(1);
        let ready: Vec<_> = participants.into_iter().map(|p| p.signal_ready()).collect();
        barrier.release().unwrap();

        let mut signal = ready.into_iter().next().unwrap().await_release().await.unwrap();
        assert!(!signal.is_stopped());

        let waiter = tokio::spawn(async move {
            signal.stopped().await;
            signal.is_stopped()
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        barrier.stop();
        assert_eq!(barrier.phase(), BarrierPhase::Stopped);
        let stopped = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("stop should wake the worker")
            .unwrap();
        assert!(stopped);
    }

    #[tokio::test]
    async fn test_stop_before_release_aborts() {
        let (barrier, mut participants) = Rendezvous::new(2);
        let ready = participants.pop().unwrap().signal_ready();
        barrier.stop();
        assert_eq!(barrier.phase(), BarrierPhase::Aborted);
        assert!(matches!(ready.await_release().await, Err(BarrierError::Aborted)));
    }

    #[tokio::test]
    async fn test_dropping_controller_after_release_stops() {
        let (barrier, participants) = Rendezvous::new(1);
        let ready: Vec<_> = participants.into_iter().map(|p| p.signal_ready()).collect();
        barrier.release().unwrap();
        let mut signal = ready.into_iter().next().unwrap().await_release().await.unwrap();

        drop(barrier);
        tokio::time::timeout(Duration::from_secs(1), signal.stopped())
            .await
            .expect("dropping the controller should stop the worker");
    }

    #[test]
    fn test_release_refused_after_abort() {
        let (barrier, participants) = Rendezvous::new(1);
        let _ready: Vec<_> = participants.into_iter().map(|p| p.signal_ready()).collect();
        barrier.abort();
        assert_eq!(barrier.release(), Err(BarrierError::Aborted));
    }
}
