//! Route-metric fallback back-end (§4.7.B), used when the policy-mwan
//! layer isn't present (§7 "external-bus unavailable").
//!
//! Writes `metric=10` for the chosen interface and `metric=100` for the
//! rest via the network config store, commits, reloads the network
//! service, then runs a verified-apply loop: read the default route up to
//! 5 times with exponential backoff starting at 100ms, succeeding only
//! when the observed default-route device matches the chosen interface.

use super::ControllerBackend;
use crate::error::ControllerError;
use crate::registry::Member;
use std::process::Command;
use std::thread;
use std::time::Duration;

const PRIMARY_METRIC: u32 = 10;
const SECONDARY_METRIC: u32 = 100;
const MAX_VERIFY_ATTEMPTS: u32 = 5;
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Reads the kernel's default-route device. Split out as a trait so tests
/// can substitute a scripted sequence of answers without touching `/proc`.
pub trait DefaultRouteReader: Send + Sync {
    fn current_default_device(&self) -> Option<String>;
}

/// Reads `ip route show default` (or `ubus call network.interface show
/// default` equivalent) and extracts the device name.
pub struct IpRouteReader {
    pub ip_binary: String,
}

impl IpRouteReader {
    pub fn new(ip_binary: impl Into<String>) -> Self {
        IpRouteReader {
            ip_binary: ip_binary.into(),
        }
    }
}

impl DefaultRouteReader for IpRouteReader {
    fn current_default_device(&self) -> Option<String> {
        let output = Command::new(&self.ip_binary)
            .args(["route", "show", "default"])
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let text = String::from_utf8_lossy(&output.stdout);
        text.split_whitespace()
            .collect::<Vec<_>>()
            .windows(2)
            .find(|pair| pair[0] == "dev")
            .map(|pair| pair[1].to_string())
    }
}

pub struct RouteMetricBackend {
    uci_binary: String,
    reader: Box<dyn DefaultRouteReader>,
    dry_run: bool,
    sleep: Box<dyn Fn(Duration) + Send + Sync>,
}

impl RouteMetricBackend {
    pub fn new(uci_binary: impl Into<String>, reader: Box<dyn DefaultRouteReader>, dry_run: bool) -> Self {
        RouteMetricBackend {
            uci_binary: uci_binary.into(),
            reader,
            dry_run,
            sleep: Box::new(thread::sleep),
        }
    }

    /// Override the backoff sleep, used by tests to run the retry loop
    /// without real delays.
    pub fn with_sleep(mut self, sleep: Box<dyn Fn(Duration) + Send + Sync>) -> Self {
        self.sleep = sleep;
        self
    }

    fn run_uci(&self, args: &[&str]) -> Result<(), ControllerError> {
        if self.dry_run {
            tracing::debug!(args = ?args, "dry-run: skipping uci command");
            return Ok(());
        }
        let status = Command::new(&self.uci_binary)
            .args(args)
            .status()
            .map_err(ControllerError::Exec)?;
        if !status.success() {
            return Err(ControllerError::ApplyFailed {
                backend: "route_metric".to_string(),
                message: format!("{} {:?} exited with {status}", self.uci_binary, args),
            });
        }
        Ok(())
    }

    fn verify(&self, primary_iface: &str) -> Result<(), ControllerError> {
        if self.dry_run {
            return Ok(());
        }
        let mut backoff = INITIAL_BACKOFF;
        for attempt in 1..=MAX_VERIFY_ATTEMPTS {
            if self.reader.current_default_device().as_deref() == Some(primary_iface) {
                return Ok(());
            }
            if attempt < MAX_VERIFY_ATTEMPTS {
                (self.sleep)(backoff);
                backoff *= 2;
            }
        }
        Err(ControllerError::VerificationFailed {
            member: primary_iface.to_string(),
            attempts: MAX_VERIFY_ATTEMPTS,
        })
    }
}

impl ControllerBackend for RouteMetricBackend {
    fn name(&self) -> &'static str {
        "route_metric"
    }

    fn is_available(&self) -> bool {
        Command::new(&self.uci_binary)
            .arg("show")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn apply(&self, members: &[Member], primary: &str) -> Result<(), ControllerError> {
        let primary_member = members
            .iter()
            .find(|m| m.name == primary)
            .ok_or_else(|| ControllerError::ApplyFailed {
                backend: "route_metric".to_string(),
                message: format!("unknown member `{primary}`"),
            })?;

        for member in members {
            let metric = if member.name == primary {
                PRIMARY_METRIC
            } else {
                SECONDARY_METRIC
            };
            let path = format!("network.{}.metric", member.name);
            let value = metric.to_string();
            self.run_uci(&["set", &path, &value])?;
        }
        self.run_uci(&["commit", "network"])?;
        self.run_uci(&["reload_config"])?;

        self.verify(&primary_member.iface)
    }

    fn get_current_primary(&self, members: &[Member]) -> Result<Option<String>, ControllerError> {
        let Some(device) = self.reader.current_default_device() else {
            return Ok(None);
        };
        Ok(members
            .iter()
            .find(|m| m.iface == device)
            .map(|m| m.name.clone()))
    }
}
