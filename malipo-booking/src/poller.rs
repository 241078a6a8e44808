use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

use malipo_core::{PaymentError, PaymentGateway, PaymentHandle, StkStatus};

/// Bound on a status poll sequence: `max_attempts × interval` is a hard
/// wall-clock ceiling, no sequence runs indefinitely.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(5_000),
            max_attempts: 6,
        }
    }
}

/// A lazy, finite, non-restartable sequence of payment status observations.
///
/// Each call to [`next_status`](Self::next_status) yields one observation,
/// sleeping the configured interval between attempts. The sequence ends
/// after the first terminal observation, after a per-attempt transport error
/// (fail-fast: errors are surfaced, never silently retried), or when the
/// attempt budget runs out while still pending; that last case is the
/// timed-out outcome, signalled by `None`. Every payment attempt gets a
/// fresh poller.
pub struct StatusPoller {
    gateway: Arc<dyn PaymentGateway>,
    handle: PaymentHandle,
    policy: PollPolicy,
    attempts_made: u32,
    finished: bool,
}

impl StatusPoller {
    pub fn new(gateway: Arc<dyn PaymentGateway>, handle: PaymentHandle, policy: PollPolicy) -> Self {
        Self {
            gateway,
            handle,
            policy,
            attempts_made: 0,
            finished: false,
        }
    }

    pub fn attempts_made(&self) -> u32 {
        self.attempts_made
    }

    pub async fn next_status(&mut self) -> Option<Result<StkStatus, PaymentError>> {
        if self.finished || self.attempts_made >= self.policy.max_attempts {
            return None;
        }

        if self.attempts_made > 0 {
            sleep(self.policy.interval).await;
        }
        self.attempts_made += 1;

        match self.gateway.payment_status(&self.handle).await {
            Ok(status) => {
                debug!(
                    payment_id = %self.handle.payment_id,
                    attempt = self.attempts_made,
                    ?status,
                    "status observation"
                );
                if status.is_terminal() {
                    self.finished = true;
                }
                Some(Ok(status))
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}
