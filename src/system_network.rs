//! Linux network monitor
//!
//! The SSID comes from `iwgetid -r`; the path state is sampled from
//! `/sys/class/net/<iface>/{wireless,operstate}`.

use crate::connectivity::{NetworkMonitor, NetworkPath};
use anyhow::{Context, Result};
use log::debug;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::{fs, process::Command, sync::watch, time::sleep};

const SYS_CLASS_NET: &str = "/sys/class/net";

#[derive(Clone, Debug)]
pub struct SystemNetworkMonitor {
    interface: Option<String>,
    poll_interval: Duration,
    sys_class_net: PathBuf,
}

impl SystemNetworkMonitor {
    pub fn new(interface: Option<String>, poll_interval: Duration) -> Self {
        Self {
            interface,
            poll_interval,
            sys_class_net: PathBuf::from(SYS_CLASS_NET),
        }
    }

    #[cfg(test)]
    fn with_sys_class_net(mut self, root: &Path) -> Self {
        self.sys_class_net = root.to_path_buf();
        self
    }

    async fn sample_path(&self) -> NetworkPath {
        let interfaces = match &self.interface {
            Some(name) => vec![self.sys_class_net.join(name)],
            None => match list_interfaces(&self.sys_class_net).await {
                Ok(interfaces) => interfaces,
                Err(e) => {
                    debug!("failed to list network interfaces: {e:#}");
                    return NetworkPath::default();
                }
            },
        };

        let mut path = NetworkPath::default();
        for iface in interfaces {
            let wifi = fs::try_exists(iface.join("wireless")).await.unwrap_or(false);
            let usable = fs::read_to_string(iface.join("operstate"))
                .await
                .is_ok_and(|state| state.trim() == "up");

            if usable && wifi {
                return NetworkPath::WIFI;
            }
            path.usable |= usable;
        }
        path
    }
}

async fn list_interfaces(root: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(root)
        .await
        .context(format!("failed to read {root:?}"))?;

    let mut interfaces = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .context("failed to read interface entry")?
    {
        if entry.file_name() != "lo" {
            interfaces.push(entry.path());
        }
    }
    interfaces.sort();
    Ok(interfaces)
}

impl NetworkMonitor for SystemNetworkMonitor {
    async fn current_ssid(&self) -> Result<Option<String>> {
        let mut cmd = Command::new("iwgetid");
        cmd.arg("-r");
        if let Some(iface) = &self.interface {
            cmd.arg(iface);
        }

        let output = cmd
            .kill_on_drop(true)
            .output()
            .await
            .context("failed to run iwgetid")?;

        // iwgetid exits non-zero when not associated
        if !output.status.success() {
            return Ok(None);
        }

        let ssid = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!ssid.is_empty()).then_some(ssid))
    }

    fn observe_paths(&self) -> watch::Receiver<NetworkPath> {
        let (tx, rx) = watch::channel(NetworkPath::default());
        let monitor = self.clone();

        tokio::spawn(async move {
            loop {
                let path = monitor.sample_path().await;
                tx.send_if_modified(|current| {
                    let changed = *current != path;
                    *current = path;
                    changed
                });

                tokio::select! {
                    _ = tx.closed() => break,
                    _ = sleep(monitor.poll_interval) => {}
                }
            }
            debug!("stopped network path sampling");
        });

        rx
    }
}
