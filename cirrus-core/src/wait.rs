//! Wait - Poll an asynchronous operation until it reaches a target status
//!
//! Cloud APIs answer long-running requests (provisioning, activation,
//! assignment creation) with a request id whose status moves from a pending
//! state to a target state. `StateChangeConf` drives that polling loop.

use std::future::Future;
use std::time::Duration;

use log::debug;
use tokio::time::{Instant, sleep};

use crate::provider::{ProviderError, ProviderResult};

/// Result of a single refresh: the latest object (if found) and its status
pub type Refresh<T> = (Option<T>, String);

/// Polling configuration
#[derive(Debug, Clone)]
pub struct StateChangeConf {
    pub pending: Vec<String>,
    pub target: Vec<String>,
    pub timeout: Duration,
    /// Wait before the first refresh
    pub delay: Duration,
    pub poll_interval: Duration,
    /// Consecutive "not found" refreshes tolerated before failing
    pub not_found_checks: u32,
}

impl StateChangeConf {
    pub fn new(pending: &[&str], target: &[&str]) -> Self {
        Self {
            pending: pending.iter().map(|s| s.to_string()).collect(),
            target: target.iter().map(|s| s.to_string()).collect(),
            timeout: Duration::from_secs(10 * 60),
            delay: Duration::ZERO,
            poll_interval: Duration::from_secs(5),
            not_found_checks: 20,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_not_found_checks(mut self, checks: u32) -> Self {
        self.not_found_checks = checks;
        self
    }

    /// Poll `refresh` until the status reaches one of the target states
    pub async fn wait_for_state<T, F, Fut>(&self, mut refresh: F) -> ProviderResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<Refresh<T>>>,
    {
        let deadline = Instant::now() + self.timeout;
        let mut not_found = 0;
        let mut last_status = String::new();

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        loop {
            let (result, status) = refresh().await?;

            match result {
                None => {
                    not_found += 1;
                    if not_found > self.not_found_checks {
                        return Err(ProviderError::new(format!(
                            "couldn't find resource ({} retries)",
                            self.not_found_checks
                        )));
                    }
                }
                Some(result) => {
                    not_found = 0;
                    if self.target.contains(&status) {
                        return Ok(result);
                    }
                    if !self.pending.contains(&status) {
                        return Err(ProviderError::new(format!(
                            "unexpected state '{}', wanted target '{}'",
                            status,
                            self.target.join(", ")
                        )));
                    }
                }
            }

            if status != last_status {
                debug!("waiting for state to become '{}', current: '{}'", self.target.join(", "), status);
                last_status = status;
            }

            if Instant::now() + self.poll_interval > deadline {
                return Err(ProviderError::new(format!(
                    "timeout while waiting for state to become '{}' (last state: '{}', timeout: {:?})",
                    self.target.join(", "),
                    last_status,
                    self.timeout
                )));
            }
            sleep(self.poll_interval).await;
        }
    }
}
