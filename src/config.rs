use anyhow::{Context, Result, ensure};
use std::{env, time::Duration};

/// Application configuration loaded and validated at startup
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    /// Timing device configuration
    pub device: DeviceConfig,

    /// Host network observation configuration
    pub network: NetworkConfig,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceConfig {
    pub base_url: String,
    pub ssid: String,
    pub device_count: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkConfig {
    pub wifi_interface: Option<String>,
    pub path_poll_interval: Duration,
}

impl AppConfig {
    /// Load all configuration from environment variables
    ///
    /// Every variable has a default; a variable that is set but cannot be
    /// parsed is an error.
    pub fn load() -> Result<Self> {
        Self::load_from(|key| env::var(key).ok())
    }

    fn load_from(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            device: DeviceConfig::load(&var)?,
            network: NetworkConfig::load(&var)?,
        })
    }
}

impl DeviceConfig {
    fn load(var: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let base_url =
            var("VALOKENNO_URL").unwrap_or_else(|| "http://192.168.4.1".to_string());
        let ssid = var("VALOKENNO_SSID").unwrap_or_else(|| "Valokenno".to_string());
        let device_count = var("VALOKENNO_DEVICE_COUNT")
            .unwrap_or_else(|| "2".to_string())
            .parse::<usize>()
            .context("failed to parse VALOKENNO_DEVICE_COUNT: invalid format")?;

        ensure!(
            device_count >= 1,
            "failed to load device config: VALOKENNO_DEVICE_COUNT must be at least 1"
        );
        ensure!(
            !ssid.is_empty(),
            "failed to load device config: VALOKENNO_SSID must not be empty"
        );

        Ok(Self {
            base_url,
            ssid,
            device_count,
        })
    }
}

impl NetworkConfig {
    fn load(var: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let wifi_interface = var("VALOKENNO_WIFI_INTERFACE").filter(|iface| !iface.is_empty());
        let poll_ms = var("VALOKENNO_PATH_POLL_MS")
            .unwrap_or_else(|| "500".to_string())
            .parse::<u64>()
            .context("failed to parse VALOKENNO_PATH_POLL_MS: invalid format")?;

        Ok(Self {
            wifi_interface,
            path_poll_interval: Duration::from_millis(poll_ms),
        })
    }
}
