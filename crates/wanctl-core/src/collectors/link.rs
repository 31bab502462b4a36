//! Link-counter collector (§4.2, §3 `link` metrics), grounded on the
//! teacher's `net::util::resolve_iface_ipv4` sysfs-probing style — here
//! reading `/sys/class/net/<if>/statistics/*` instead of address info.

use super::{CollectContext, Collector};
use crate::error::CollectorError;
use crate::model::{LinkCounters, Metrics};
use crate::registry::Member;
use std::fs;

fn read_counter(iface: &str, name: &str) -> u64 {
    fs::read_to_string(format!("/sys/class/net/{iface}/statistics/{name}"))
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(0)
}

/// Whether `iface` is present under `/sys/class/net`, the same existence
/// check the teacher runs before trusting sysfs-derived state.
fn iface_exists(iface: &str) -> bool {
    fs::metadata(format!("/sys/class/net/{iface}")).is_ok()
}

pub struct LinkCounterCollector;

impl Collector for LinkCounterCollector {
    fn class_name(&self) -> &'static str {
        "link"
    }

    fn collect(&self, member: &Member, ctx: &CollectContext) -> Result<Metrics, CollectorError> {
        if ctx.dry_run {
            return Err(CollectorError::Unsupported("dry_run"));
        }
        if !iface_exists(&member.iface) {
            return Err(CollectorError::NoAddress(member.iface.clone()));
        }
        let link = LinkCounters {
            rx_bytes: read_counter(&member.iface, "rx_bytes"),
            tx_bytes: read_counter(&member.iface, "tx_bytes"),
            rx_errors: read_counter(&member.iface, "rx_errors"),
            tx_errors: read_counter(&member.iface, "tx_errors"),
        };
        Ok(Metrics::common_only(Default::default(), link))
    }
}
