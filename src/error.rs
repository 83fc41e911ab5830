//! Error types surfaced by the action protocol and the response parsers.

use serde::Serialize;
use thiserror::Error;

/// Terminal failure of one action exchange with the device
///
/// Exactly one variant describes why an action did not produce a value.
/// Transient failures (a refused poll, a poll that timed out) never show up
/// here individually; they are absorbed by the poll loop.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "camelCase")]
pub enum ActionError {
    #[error("failed to start the action on the device")]
    CouldNotStartProcess,

    #[error("not connected to the device network")]
    InitiallyNotConnected,

    #[error("lost the connection to the device network and could not reconnect")]
    CouldNotReconnect,

    #[error("received a response in an unexpected format")]
    InvalidResponseFormat,

    #[error("did not receive a response from the device in time")]
    CouldNotReceiveResponseInTime,

    #[error("device reported an error: {0}")]
    MasterReportedError(String),
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid timestamp data")]
    Invalid,
}

impl From<ParseError> for ActionError {
    fn from(_: ParseError) -> Self {
        ActionError::InvalidResponseFormat
    }
}
