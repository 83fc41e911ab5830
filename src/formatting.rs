pub const DEFAULT_FRACTION_DIGITS: usize = 3;

/// Render a millisecond timestamp as seconds, e.g. `12345` -> `"12.345"`
pub fn format_timestamp(timestamp_ms: u32, digits: usize) -> String {
    let seconds = f64::from(timestamp_ms) / 1000.0;
    format!("{seconds:.digits$}")
}

/// Render a device's timestamps, space separated
pub fn format_timestamps(timestamps: &[u32]) -> String {
    timestamps
        .iter()
        .map(|&ts| format_timestamp(ts, DEFAULT_FRACTION_DIGITS))
        .collect::<Vec<_>>()
        .join(" ")
}
