//! Action protocol client
//!
//! Drives one action end to end:
//! preflight association check, start request, settle delay, recovery wait,
//! then a bounded poll loop with escalating per-attempt timeouts.

use crate::{
    action::{Action, ActionSpec, ActionValue, Readiness},
    connectivity::{ConnectivityGuard, ConnectivityState, NetworkMonitor},
    error::ActionError,
    http_client::DeviceTransport,
    parser::TimestampsReport,
};
use log::{debug, info, warn};
use std::time::Duration;
use tokio::time::sleep;

/// Delays and waits of the action protocol
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProtocolTiming {
    /// Pause after a start request before polling begins
    pub settle_delay: Duration,
    /// Pause between two poll attempts
    pub attempt_spacing: Duration,
    /// Wait for the link to come back after the settle delay
    pub recovery_timeout: Duration,
    /// Wait for the link before each poll attempt
    pub attempt_recovery_timeout: Duration,
}

impl Default for ProtocolTiming {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(1500),
            attempt_spacing: Duration::from_secs(1),
            recovery_timeout: Duration::from_secs(10),
            attempt_recovery_timeout: Duration::from_secs(5),
        }
    }
}

pub type ActionOutcome = Result<ActionValue, ActionError>;

pub struct DeviceClient<T, N> {
    transport: T,
    guard: ConnectivityGuard<N>,
    device_count: usize,
    timing: ProtocolTiming,
}

impl<T, N> DeviceClient<T, N>
where
    T: DeviceTransport + Sync,
    N: NetworkMonitor + Send + Sync + 'static,
{
    pub fn new(transport: T, guard: ConnectivityGuard<N>, device_count: usize) -> Self {
        Self {
            transport,
            guard,
            device_count,
            timing: ProtocolTiming::default(),
        }
    }

    pub fn with_timing(mut self, timing: ProtocolTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn device_count(&self) -> usize {
        self.device_count
    }

    pub async fn connectivity(&self) -> ConnectivityState {
        self.guard.state().await
    }

    /// `true` iff the device answers `/status` with its identity string
    pub async fn check_status(&self) -> Result<bool, ActionError> {
        match self.run(Action::CheckStatus).await? {
            ActionValue::Status(healthy) => Ok(healthy),
            _ => Err(ActionError::InvalidResponseFormat),
        }
    }

    /// Capture timestamps; a device advisory comes back inside the report
    pub async fn get_timestamps(&self) -> Result<TimestampsReport, ActionError> {
        match self.run(Action::GetTimestamps).await? {
            ActionValue::Timestamps(report) => Ok(report),
            _ => Err(ActionError::InvalidResponseFormat),
        }
    }

    pub async fn clear_timestamps(&self) -> Result<(), ActionError> {
        match self.run(Action::ClearTimestamps).await? {
            ActionValue::Cleared => Ok(()),
            _ => Err(ActionError::InvalidResponseFormat),
        }
    }

    pub async fn activate_starter(&self) -> Result<(), ActionError> {
        match self.run(Action::ActivateStarter).await? {
            ActionValue::StarterActivated => Ok(()),
            _ => Err(ActionError::InvalidResponseFormat),
        }
    }

    /// Run `action` against the device
    ///
    /// Dropping the returned future abandons the action; the in-flight
    /// request and any path observation are released with it.
    pub async fn run(&self, action: Action) -> ActionOutcome {
        let spec = action.spec();
        info!("{action}: starting");

        let outcome = self.execute(spec).await;

        match &outcome {
            Ok(_) => info!("{action}: succeeded"),
            Err(e) => warn!("{action}: failed: {e}"),
        }

        outcome
    }

    async fn execute(&self, spec: &ActionSpec) -> ActionOutcome {
        if !self.guard.is_associated().await {
            return Err(ActionError::InitiallyNotConnected);
        }

        let started = match self.transport.get(spec.start_path, spec.start_timeout).await {
            Ok(response) if response.is_ok() => response,
            Ok(response) => {
                debug!("{}: start refused with status {}", spec.action, response.status);
                return Err(ActionError::CouldNotStartProcess);
            }
            Err(e) => {
                debug!("{}: start request failed: {e:#}", spec.action);
                return Err(ActionError::CouldNotStartProcess);
            }
        };

        let Some(result_path) = spec.result_path else {
            return match spec.shape.interpret(&started.body, self.device_count)? {
                Readiness::Ready(value) => Ok(value),
                Readiness::Pending => Err(ActionError::InvalidResponseFormat),
            };
        };

        sleep(self.timing.settle_delay).await;

        if !self
            .guard
            .await_association(self.timing.recovery_timeout)
            .await
        {
            return Err(ActionError::CouldNotReconnect);
        }

        self.poll(spec, result_path).await
    }

    async fn poll(&self, spec: &ActionSpec, result_path: &str) -> ActionOutcome {
        for attempt in 0..spec.max_attempts {
            if attempt > 0 {
                sleep(self.timing.attempt_spacing).await;
            }

            if !self
                .guard
                .await_association(self.timing.attempt_recovery_timeout)
                .await
            {
                return Err(ActionError::CouldNotReconnect);
            }

            let timeout = (spec.attempt_timeout)(attempt);
            debug!("{}: poll attempt {attempt} (timeout {timeout:?})", spec.action);

            let response = match self.transport.get(result_path, timeout).await {
                Ok(response) if response.is_ok() => response,
                Ok(response) => {
                    debug!("{}: poll returned status {}", spec.action, response.status);
                    continue;
                }
                Err(e) => {
                    debug!("{}: poll failed: {e:#}", spec.action);
                    continue;
                }
            };

            match spec.shape.interpret(&response.body, self.device_count)? {
                Readiness::Ready(value) => return Ok(value),
                Readiness::Pending => debug!("{}: result not ready yet", spec.action),
            }
        }

        Err(ActionError::CouldNotReceiveResponseInTime)
    }
}
