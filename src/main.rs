use anyhow::{Context, Result, bail};
use env_logger::{Builder, Env, Target};
use log::{error, info, warn};
use std::io::Write;
use valokenno::{
    Action, ActionValue,
    config::AppConfig,
    connectivity::ConnectivityGuard,
    device_client::DeviceClient,
    formatting::format_timestamps,
    http_client::HttpTransport,
    parser::TimestampsReport,
    system_network::SystemNetworkMonitor,
};

const USAGE: &str = "usage: valokenno <status|timestamps|clear|starter>";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("application error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    initialize();

    let action = parse_action(std::env::args().nth(1).as_deref())?;
    let config = AppConfig::load().context("failed to load configuration")?;
    info!("{}", banner(&config));

    let monitor = SystemNetworkMonitor::new(
        config.network.wifi_interface.clone(),
        config.network.path_poll_interval,
    );
    let client = DeviceClient::new(
        HttpTransport::new(&config.device.base_url),
        ConnectivityGuard::new(monitor, &config.device.ssid),
        config.device.device_count,
    );

    let state = client.connectivity().await;
    info!(
        "expecting network {:?}, currently on {:?}",
        config.device.ssid, state.ssid
    );

    let outcome = tokio::select! {
        outcome = client.run(action) => outcome,
        _ = tokio::signal::ctrl_c() => {
            warn!("{action} abandoned");
            return Ok(());
        }
    };

    match outcome {
        Ok(value) => {
            report(&value, config.device.device_count);
            Ok(())
        }
        Err(e) => bail!("{action} failed: {e}"),
    }
}

fn initialize() {
    log_panics::init();

    let mut builder = if cfg!(debug_assertions) {
        Builder::from_env(Env::default().default_filter_or("debug"))
    } else {
        Builder::from_env(Env::default().default_filter_or("info"))
    };

    builder.format(|f, record| match record.level() {
        log::Level::Error => {
            eprintln!("{}", record.args());
            Ok(())
        }
        _ => {
            writeln!(f, "{}", record.args())
        }
    });

    builder.target(Target::Stdout).init();
}

fn banner(config: &AppConfig) -> String {
    format!(
        "valokenno {}: device at {} on network {:?}, {} gate(s)",
        env!("CARGO_PKG_VERSION"),
        config.device.base_url,
        config.device.ssid,
        config.device.device_count
    )
}

fn parse_action(arg: Option<&str>) -> Result<Action> {
    match arg {
        Some("status") => Ok(Action::CheckStatus),
        Some("timestamps") => Ok(Action::GetTimestamps),
        Some("clear") => Ok(Action::ClearTimestamps),
        Some("starter") => Ok(Action::ActivateStarter),
        Some(other) => bail!("unknown action {other:?}; {USAGE}"),
        None => bail!("{USAGE}"),
    }
}

fn report(value: &ActionValue, device_count: usize) {
    match value {
        ActionValue::Status(true) => info!("device is up"),
        ActionValue::Status(false) => warn!("device answered with an unexpected status"),
        ActionValue::Timestamps(timestamps) => report_timestamps(timestamps, device_count),
        ActionValue::Cleared => info!("timestamps cleared"),
        ActionValue::StarterActivated => info!("starter activated"),
    }
}

fn report_timestamps(report: &TimestampsReport, device_count: usize) {
    if let Some(advisory) = &report.soft_error {
        warn!("device reported: {advisory}");
    }

    for (index, load) in report.timestamps.device_loads(device_count).iter().enumerate() {
        match load {
            Ok(timestamps) => info!("dev{}: {}", index + 1, format_timestamps(timestamps)),
            Err(missing) => warn!("{}: no data", missing.key),
        }
    }

    for key in report.timestamps.unexpected_keys(device_count) {
        warn!("{key}: not a configured device");
    }
}
