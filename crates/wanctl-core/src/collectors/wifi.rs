//! Wi-Fi STA collector (§4.2), grounded on the teacher's
//! `/proc/net/wireless` reader — extended here to also capture noise, not
//! just the signal watermark the teacher needed for its own scheduling.

use super::{CollectContext, Collector};
use crate::error::CollectorError;
use crate::model::{ClassMetrics, Metrics, WifiMetrics};
use crate::registry::Member;
use std::fs;

/// Read the `link`, `level`, `noise` triple for `iface` from
/// `/proc/net/wireless`. Returns `None` if the interface isn't present —
/// e.g. not a wireless device.
fn read_wireless_fields(iface: &str) -> Option<(f64, f64)> {
    let contents = fs::read_to_string("/proc/net/wireless").ok()?;
    for line in contents.lines().skip(2) {
        let trimmed = line.trim();
        let Some(rest) = trimmed.strip_prefix(iface) else {
            continue;
        };
        let Some(rest) = rest.strip_prefix(':') else {
            continue;
        };
        let fields: Vec<&str> = rest.split_whitespace().collect();
        if fields.len() >= 3 {
            let level = fields[1].trim_end_matches('.').parse::<f64>().ok()?;
            let noise = fields[2].trim_end_matches('.').parse::<f64>().ok()?;
            return Some((level, noise));
        }
    }
    None
}

fn read_bitrate_mbps(iface: &str) -> f64 {
    fs::read_to_string(format!("/sys/class/net/{iface}/speed"))
        .ok()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .unwrap_or(0.0)
}

pub struct WifiCollector;

impl Collector for WifiCollector {
    fn class_name(&self) -> &'static str {
        "wifi"
    }

    fn collect(&self, member: &Member, ctx: &CollectContext) -> Result<Metrics, CollectorError> {
        if ctx.dry_run {
            return Err(CollectorError::Unsupported("dry_run"));
        }
        let Some((signal_dbm, noise_dbm)) = read_wireless_fields(&member.iface) else {
            return Err(CollectorError::NoAddress(member.iface.clone()));
        };
        let wifi = WifiMetrics {
            signal_dbm,
            noise_dbm,
            bitrate: read_bitrate_mbps(&member.iface),
        };
        Ok(Metrics {
            common: Default::default(),
            class: ClassMetrics {
                wifi: Some(wifi),
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
    fn missing_interface_returns_no_address_error() {
        let err = read_wireless_fields("nonexistent_wifi9");
        assert!(err.is_none());
    }

    #[test]
    fn parses_signal_and_noise() {
        // simulate the file format directly, same approach as the source
        // this was grounded on
        let fake = "Inter-| sta-|   Quality        |   Discarded packets               | Missed | WE\n face | tus | link level noise |  nwid  crypt   frag  retry   misc | beacon | 22\n wlan0: 0000   -42.  -95.  0 0 0 0 0 0";
        let mut found = None;
        for line in fake.lines().skip(2) {
            let trimmed = line.trim();
            if let Some(rest) = trimmed.strip_prefix("wlan0") {
                if let Some(rest) = rest.strip_prefix(':') {
                    let fields: Vec<&str> = rest.split_whitespace().collect();
                    found = Some((
                        fields[1].trim_end_matches('.').parse::<f64>().unwrap(),
                        fields[2].trim_end_matches('.').parse::<f64>().unwrap(),
                    ));
                }
            }
        }
        assert_eq!(found, Some((-42.0, -95.0)));
    }
}
