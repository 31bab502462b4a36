//! Cellular modem collector (§4.2): queries the modem via the local
//! management bus, `ubus` first, falling back to a raw AT command channel
//! when no ubus object is registered for the device.

use super::{CollectContext, Collector};
use crate::error::CollectorError;
use crate::model::{CellularMetrics, ClassMetrics, Metrics, RegistrationState};
use crate::registry::Member;
use std::io::{Read, Write};
use std::process::Command;
use std::time::Duration;

pub struct CellularCollector {
    pub ubus_binary: String,
    pub ubus_object_prefix: String,
    pub at_device: Option<String>,
}

impl CellularCollector {
    pub fn new(ubus_binary: impl Into<String>, at_device: Option<String>) -> Self {
        CellularCollector {
            ubus_binary: ubus_binary.into(),
            ubus_object_prefix: "network.device".to_string(),
            at_device,
        }
    }

    fn query_ubus(&self, member: &Member, timeout: Duration) -> Option<CellularMetrics> {
        let object = format!("{}.{}", self.ubus_object_prefix, member.iface);
        let output = Command::new(&self.ubus_binary)
            .args(["-t", &timeout.as_secs().to_string(), "call", &object, "signal"])
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let json: serde_json::Value =
            serde_json::from_slice(&output.stdout).ok()?;
        Some(CellularMetrics {
            rsrp: json.get("rsrp").and_then(|v| v.as_f64()).unwrap_or(-140.0),
            rsrq: json.get("rsrq").and_then(|v| v.as_f64()).unwrap_or(-20.0),
            sinr: json.get("sinr").and_then(|v| v.as_f64()).unwrap_or(0.0),
            signal_pct: json.get("signal_pct").and_then(|v| v.as_f64()).unwrap_or(0.0),
            network_type: json
                .get("network_type")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string(),
            operator: json.get("operator").and_then(|v| v.as_str()).unwrap_or("").to_string(),
            band: json.get("band").and_then(|v| v.as_str()).unwrap_or("").to_string(),
            cell_id: json.get("cell_id").and_then(|v| v.as_str()).unwrap_or("").to_string(),
            roaming: json.get("roaming").and_then(|v| v.as_bool()).unwrap_or(false),
            thermal_c: json.get("thermal_c").and_then(|v| v.as_f64()).unwrap_or(0.0),
            registration_state: match json.get("registration").and_then(|v| v.as_str()) {
                Some("registered") => RegistrationState::Registered,
                Some("roaming") => RegistrationState::Roaming,
                Some("searching") => RegistrationState::Searching,
                Some("denied") => RegistrationState::Denied,
                _ => RegistrationState::Unknown,
            },
        })
    }

    /// Minimal AT command round-trip over the serial management port,
    /// used only when the modem has no registered ubus object. Assumes the
    /// kernel driver already left the tty in an 8N1 raw-mode default, as
    /// OpenWrt's `option` and `qmi_wwan` drivers do for their AT port.
    fn query_at(&self, device: &str, timeout: Duration) -> Option<CellularMetrics> {
        let mut port = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(device)
            .ok()?;
        port.write_all(b"AT+QCSQ\r\n").ok()?;

        let deadline = std::time::Instant::now() + timeout;
        let mut buf = [0u8; 256];
        let mut response = String::new();
        while std::time::Instant::now() < deadline {
            match port.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    response.push_str(&String::from_utf8_lossy(&buf[..n]));
                    if response.contains("OK") {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
        parse_qcsq(&response)
    }
}

/// Parse a Quectel-style `+QCSQ: "LTE",<rsrp>,<rsrq>,...` response line
/// into the RF fields we care about. Unrecognized content yields `None`.
fn parse_qcsq(response: &str) -> Option<CellularMetrics> {
    let line = response.lines().find(|l| l.contains("+QCSQ"))?;
    let fields: Vec<&str> = line.split(':').nth(1)?.split(',').map(|s| s.trim()).collect();
    let network_type = fields.first()?.trim_matches('"').to_string();
    let rsrp = fields.get(1)?.parse().ok()?;
    let rsrq = fields.get(2).and_then(|v| v.parse().ok()).unwrap_or(-20.0);
    let sinr = fields.get(3).and_then(|v| v.parse().ok()).unwrap_or(0.0);
    Some(CellularMetrics {
        rsrp,
        rsrq,
        sinr,
        signal_pct: 0.0,
        network_type,
        operator: String::new(),
        band: String::new(),
        cell_id: String::new(),
        roaming: false,
        thermal_c: 0.0,
        registration_state: RegistrationState::Registered,
    })
}

impl Collector for CellularCollector {
    fn class_name(&self) -> &'static str {
        "cellular"
    }

    fn collect(&self, member: &Member, ctx: &CollectContext) -> Result<Metrics, CollectorError> {
        if ctx.dry_run {
            return Err(CollectorError::Unsupported("dry_run"));
        }
        let cellular = self
            .query_ubus(member, ctx.timeout)
            .or_else(|| self.at_device.as_deref().and_then(|d| self.query_at(d, ctx.timeout)))
            .ok_or_else(|| CollectorError::Timeout(ctx.timeout))?;

        Ok(Metrics {
            common: Default::default(),
            class: ClassMetrics {
                cellular: Some(cellular),
                ..Default::default()
            },
            link: Default::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_qcsq_line() {
        let response = "AT+QCSQ\r\r\n+QCSQ: \"LTE\",-85,-10,12,0\r\n\r\nOK\r\n";
        let metrics = parse_qcsq(response).unwrap();
        assert_eq!(metrics.network_type, "LTE");
        assert!((metrics.rsrp - (-85.0)).abs() < f64::EPSILON);
        assert!((metrics.rsrq - (-10.0)).abs() < f64::EPSILON);
    }

    #[test]
    fn unparseable_response_yields_none() {
        assert!(parse_qcsq("garbage").is_none());
    }
}
