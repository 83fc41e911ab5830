//! Decoding of the device's timestamp and clear-result payloads
//!
//! Two wire formats exist for timestamps: the legacy delimited body
//! `dev1,ts,ts;dev2,ts` and the structured JSON body
//! `{"timestamps":{"dev1":[ts]},"error":""}`. All functions here are pure and
//! either return a complete value or fail without partial output.

use crate::error::{ActionError, ParseError};
use serde::Deserialize;
use std::collections::BTreeMap;

const DEVICE_SEPARATOR: char = ';';
const TIMESTAMP_SEPARATOR: char = ',';

/// Key the device uses for photogate `number` (1-based)
pub fn device_key(number: usize) -> String {
    format!("dev{number}")
}

/// Per-device millisecond timestamps as reported by the device
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct DeviceTimestamps {
    devices: BTreeMap<String, Vec<u32>>,
}

/// A configured device whose key was absent from the payload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MissingDevice {
    pub key: String,
}

impl DeviceTimestamps {
    pub fn device(&self, number: usize) -> Option<&[u32]> {
        self.devices.get(&device_key(number)).map(Vec::as_slice)
    }

    /// Timestamps of devices `1..=device_count`, in device order
    ///
    /// A configured device without an entry yields `Err(MissingDevice)`; the
    /// other devices still load.
    pub fn device_loads(&self, device_count: usize) -> Vec<Result<&[u32], MissingDevice>> {
        (1..=device_count)
            .map(|number| {
                self.device(number).ok_or_else(|| MissingDevice {
                    key: device_key(number),
                })
            })
            .collect()
    }

    /// Keys present that do not belong to any configured device
    pub fn unexpected_keys(&self, device_count: usize) -> Vec<&str> {
        let expected: Vec<String> = (1..=device_count).map(device_key).collect();
        self.devices
            .keys()
            .filter(|key| !expected.contains(key))
            .map(String::as_str)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl FromIterator<(String, Vec<u32>)> for DeviceTimestamps {
    fn from_iter<I: IntoIterator<Item = (String, Vec<u32>)>>(iter: I) -> Self {
        Self {
            devices: iter.into_iter().collect(),
        }
    }
}

/// Parse the legacy delimited body into one sequence per device
///
/// The body must contain exactly `device_count` segments labelled `dev1`,
/// `dev2`, ... in that order. Empty segments and empty tokens are skipped.
pub fn parse_legacy(body: &str, device_count: usize) -> Result<Vec<Vec<u32>>, ParseError> {
    let segments: Vec<&str> = body
        .split(DEVICE_SEPARATOR)
        .filter(|segment| !segment.is_empty())
        .collect();

    if segments.len() != device_count {
        return Err(ParseError::Invalid);
    }

    segments
        .into_iter()
        .enumerate()
        .map(|(index, segment)| parse_legacy_device(segment, index + 1))
        .collect()
}

fn parse_legacy_device(segment: &str, number: usize) -> Result<Vec<u32>, ParseError> {
    let mut tokens = segment
        .split(TIMESTAMP_SEPARATOR)
        .filter(|token| !token.is_empty());

    match tokens.next() {
        Some(label) if label == device_key(number) => {}
        _ => return Err(ParseError::Invalid),
    }

    tokens
        .map(|token| token.parse::<u32>().map_err(|_| ParseError::Invalid))
        .collect()
}

/// Legacy body converted to keyed form
pub fn parse_legacy_timestamps(
    body: &str,
    device_count: usize,
) -> Result<DeviceTimestamps, ParseError> {
    Ok(parse_legacy(body, device_count)?
        .into_iter()
        .enumerate()
        .map(|(index, timestamps)| (device_key(index + 1), timestamps))
        .collect())
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TimestampsPayload {
    timestamps: DeviceTimestamps,
    error: String,
}

/// Decoded timestamps plus the advisory message the device attached, if any
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TimestampsReport {
    pub timestamps: DeviceTimestamps,
    pub soft_error: Option<String>,
}

/// Decode the structured `{"timestamps": {...}, "error": "..."}` body
///
/// A non-empty `error` is advisory and returned next to the timestamps.
pub fn decode_timestamps(body: &[u8]) -> Result<TimestampsReport, ActionError> {
    let payload: TimestampsPayload =
        serde_json::from_slice(body).map_err(|_| ActionError::InvalidResponseFormat)?;

    Ok(TimestampsReport {
        timestamps: payload.timestamps,
        soft_error: (!payload.error.is_empty()).then_some(payload.error),
    })
}

/// Decode a `/timestamps/result` body in either wire format
pub fn decode_timestamps_result(
    body: &[u8],
    device_count: usize,
) -> Result<TimestampsReport, ActionError> {
    if body.trim_ascii_start().starts_with(b"{") {
        return decode_timestamps(body);
    }

    let text = std::str::from_utf8(body).map_err(|_| ActionError::InvalidResponseFormat)?;
    Ok(TimestampsReport {
        timestamps: parse_legacy_timestamps(text, device_count)?,
        soft_error: None,
    })
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClearPayload {
    success: bool,
    error: String,
}

/// Decode the `{"success": bool, "error": "..."}` body of a clear result
///
/// A device error message is a hard failure. A failure without a message
/// breaks the device contract and is reported as an invalid response.
pub fn decode_clear_result(body: &[u8]) -> Result<(), ActionError> {
    let payload: ClearPayload =
        serde_json::from_slice(body).map_err(|_| ActionError::InvalidResponseFormat)?;

    match (payload.success, payload.error.is_empty()) {
        (_, false) => Err(ActionError::MasterReportedError(payload.error)),
        (false, true) => Err(ActionError::InvalidResponseFormat),
        (true, true) => Ok(()),
    }
}
