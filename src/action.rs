//! Static descriptions of the actions the device exposes
//!
//! One driver runs every action; what differs between them is captured here
//! as data: endpoints, timeouts and the shape of the final response.

use crate::{
    error::ActionError,
    parser::{self, TimestampsReport},
};
use std::time::Duration;

/// Exact body of a healthy `/status` response
pub const STATUS_IDENTITY: &str = "Valokenno toiminnassa";

/// Exact body of an accepted `/starter` response
pub const STARTER_ACCEPTED: &str = "ok";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    CheckStatus,
    GetTimestamps,
    ClearTimestamps,
    ActivateStarter,
}

/// How the final response body of an action is read
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseShape {
    /// Body compared against the device identity string
    StatusText,
    /// Body must be exactly `"ok"`
    Acknowledgement,
    /// `{timestamps, error}` payload or the legacy delimited body
    Timestamps,
    /// `{success, error}` payload
    ClearResult,
}

#[derive(Clone, Copy, Debug)]
pub struct ActionSpec {
    pub action: Action,
    pub start_path: &'static str,
    /// Polled endpoint; `None` means the start response is the result
    pub result_path: Option<&'static str>,
    pub start_timeout: Duration,
    pub max_attempts: u32,
    /// Timeout of poll attempt `i` (0-indexed)
    pub attempt_timeout: fn(u32) -> Duration,
    pub shape: ResponseShape,
}

/// Successful value of an action
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionValue {
    Status(bool),
    Timestamps(TimestampsReport),
    Cleared,
    StarterActivated,
}

/// Outcome of reading one result body
#[derive(Debug, PartialEq, Eq)]
pub enum Readiness {
    Pending,
    Ready(ActionValue),
}

fn escalating_timeout(attempt: u32) -> Duration {
    Duration::from_secs(1 + u64::from(attempt))
}

const POLL_ATTEMPTS: u32 = 5;

static CHECK_STATUS: ActionSpec = ActionSpec {
    action: Action::CheckStatus,
    start_path: "/status",
    result_path: None,
    start_timeout: Duration::from_secs(2),
    max_attempts: 0,
    attempt_timeout: escalating_timeout,
    shape: ResponseShape::StatusText,
};

static GET_TIMESTAMPS: ActionSpec = ActionSpec {
    action: Action::GetTimestamps,
    start_path: "/timestamps",
    result_path: Some("/timestamps/result"),
    start_timeout: Duration::from_secs(1),
    max_attempts: POLL_ATTEMPTS,
    attempt_timeout: escalating_timeout,
    shape: ResponseShape::Timestamps,
};

static CLEAR_TIMESTAMPS: ActionSpec = ActionSpec {
    action: Action::ClearTimestamps,
    start_path: "/clear",
    result_path: Some("/clear/result"),
    start_timeout: Duration::from_secs(1),
    max_attempts: POLL_ATTEMPTS,
    attempt_timeout: escalating_timeout,
    shape: ResponseShape::ClearResult,
};

static ACTIVATE_STARTER: ActionSpec = ActionSpec {
    action: Action::ActivateStarter,
    start_path: "/starter",
    result_path: None,
    start_timeout: Duration::from_secs(2),
    max_attempts: 0,
    attempt_timeout: escalating_timeout,
    shape: ResponseShape::Acknowledgement,
};

impl Action {
    pub const ALL: [Action; 4] = [
        Action::CheckStatus,
        Action::GetTimestamps,
        Action::ClearTimestamps,
        Action::ActivateStarter,
    ];

    pub fn spec(self) -> &'static ActionSpec {
        match self {
            Action::CheckStatus => &CHECK_STATUS,
            Action::GetTimestamps => &GET_TIMESTAMPS,
            Action::ClearTimestamps => &CLEAR_TIMESTAMPS,
            Action::ActivateStarter => &ACTIVATE_STARTER,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Action::CheckStatus => "check status",
            Action::GetTimestamps => "get timestamps",
            Action::ClearTimestamps => "clear timestamps",
            Action::ActivateStarter => "activate starter",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl ResponseShape {
    /// Interpret a 200 response body
    ///
    /// Polled shapes treat an empty body as not ready yet. Every other body
    /// must decode; a decoding failure is never retried.
    pub fn interpret(self, body: &[u8], device_count: usize) -> Result<Readiness, ActionError> {
        match self {
            ResponseShape::StatusText => Ok(Readiness::Ready(ActionValue::Status(
                body == STATUS_IDENTITY.as_bytes(),
            ))),
            ResponseShape::Acknowledgement if body == STARTER_ACCEPTED.as_bytes() => {
                Ok(Readiness::Ready(ActionValue::StarterActivated))
            }
            ResponseShape::Acknowledgement => Err(ActionError::InvalidResponseFormat),
            _ if body.trim_ascii().is_empty() => Ok(Readiness::Pending),
            ResponseShape::Timestamps => parser::decode_timestamps_result(body, device_count)
                .map(|report| Readiness::Ready(ActionValue::Timestamps(report))),
            ResponseShape::ClearResult => {
                parser::decode_clear_result(body).map(|()| Readiness::Ready(ActionValue::Cleared))
            }
        }
    }
}
