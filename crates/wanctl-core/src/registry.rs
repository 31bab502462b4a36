//! Member registry and discovery (§4.1).
//!
//! Discovery is behind a trait so the policy-mwan-backed reader and the
//! netifd-backed reader present one contract to the scheduler, the same
//! shape the teacher uses for its interchangeable link backends.

use crate::model::MemberClass;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::process::Command;
use std::str::FromStr;

/// A candidate uplink interface (§3).
#[derive(Debug, Clone)]
pub struct Member {
    pub name: String,
    pub class: MemberClass,
    pub iface: String,
    pub weight: u8,
    pub policy_group: String,
    pub eligible: bool,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    missed_cycles: u32,
}

impl Member {
    pub fn new(name: impl Into<String>, class: MemberClass, iface: impl Into<String>) -> Self {
        let now = Utc::now();
        Member {
            name: name.into(),
            class,
            iface: iface.into(),
            weight: 50,
            policy_group: "wan".to_string(),
            eligible: true,
            created_at: now,
            last_seen: now,
            missed_cycles: 0,
        }
    }

    pub fn with_weight(mut self, weight: u8) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_policy_group(mut self, group: impl Into<String>) -> Self {
        self.policy_group = group.into();
        self
    }
}

/// Reads a list of [`Member`]s from some external source. Implementations
/// never block the decision tick — discovery runs on its own interval
/// (§4.1).
pub trait Discoverer: Send + Sync {
    fn discover(&self) -> anyhow::Result<Vec<Member>>;
}

/// Classifies an interface name into a [`MemberClass`] by pattern, the way
/// the original controller infers class from device naming conventions
/// when no explicit hint is configured. Unknown patterns default to `lan`
/// per §4.1.
pub fn classify_by_name(name: &str, hint: Option<&str>) -> MemberClass {
    if let Some(hint) = hint {
        if let Ok(class) = MemberClass::from_str(hint) {
            return class;
        }
    }
    let lower = name.to_ascii_lowercase();
    if lower.contains("starlink") || lower.contains("dish") {
        MemberClass::Starlink
    } else if lower.starts_with("wwan") || lower.contains("modem") || lower.contains("lte") {
        MemberClass::Cellular
    } else if lower.starts_with("wlan") || lower.contains("wifi") {
        MemberClass::Wifi
    } else if lower.contains("vpn") || lower.starts_with("tun") || lower.starts_with("wg") {
        MemberClass::Vpn
    } else {
        MemberClass::Lan
    }
}

/// Reads members from the policy-mwan configuration via its `show` command,
/// preferred when the mwan3 binary and config are present (§4.1, §6).
pub struct MwanDiscoverer {
    pub binary: String,
    pub config: String,
}

impl MwanDiscoverer {
    pub fn new(binary: impl Into<String>, config: impl Into<String>) -> Self {
        MwanDiscoverer {
            binary: binary.into(),
            config: config.into(),
        }
    }

    /// Whether the mwan3 binary and its configuration are present on this
    /// system (§7, "external-bus unavailable" fallback).
    pub fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("status")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn parse_show_output(&self, text: &str) -> Vec<Member> {
        let mut members = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            let Some(rest) = line.strip_prefix("interface ") else {
                continue;
            };
            let Some((name, tail)) = rest.split_once(' ') else {
                continue;
            };
            let iface = tail
                .split_whitespace()
                .find_map(|tok| tok.strip_prefix("device="))
                .unwrap_or(name);
            let weight = tail
                .split_whitespace()
                .find_map(|tok| tok.strip_prefix("weight="))
                .and_then(|v| v.parse::<u8>().ok())
                .unwrap_or(50);
            let hint = tail
                .split_whitespace()
                .find_map(|tok| tok.strip_prefix("class="));
            let class = classify_by_name(name, hint);
            members.push(Member::new(name, class, iface).with_weight(weight));
        }
        members
    }
}

impl Discoverer for MwanDiscoverer {
    fn discover(&self) -> anyhow::Result<Vec<Member>> {
        let output = Command::new(&self.binary)
            .args(["show", &self.config])
            .output()?;
        if !output.status.success() {
            anyhow::bail!(
                "{} show {} exited with {}",
                self.binary,
                self.config,
                output.status
            );
        }
        Ok(self.parse_show_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Reads members by enumerating interfaces known to the network supervisor
/// (netifd/ubus), used when the policy-mwan layer is absent.
pub struct NetifdDiscoverer {
    pub ubus_binary: String,
}

impl NetifdDiscoverer {
    pub fn new(ubus_binary: impl Into<String>) -> Self {
        NetifdDiscoverer {
            ubus_binary: ubus_binary.into(),
        }
    }

    fn parse_dump(&self, text: &str) -> Vec<Member> {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
            return Vec::new();
        };
        let Some(interfaces) = value.get("interface").and_then(|v| v.as_array()) else {
            return Vec::new();
        };
        interfaces
            .iter()
            .filter_map(|iface| {
                let name = iface.get("interface")?.as_str()?.to_string();
                let device = iface
                    .get("device")
                    .and_then(|v| v.as_str())
                    .unwrap_or(&name)
                    .to_string();
                let class = classify_by_name(&name, None);
                Some(Member::new(name, class, device))
            })
            .collect()
    }
}

impl Discoverer for NetifdDiscoverer {
    fn discover(&self) -> anyhow::Result<Vec<Member>> {
        let output = Command::new(&self.ubus_binary)
            .args(["call", "network.interface", "dump"])
            .output()?;
        if !output.status.success() {
            anyhow::bail!("ubus dump exited with {}", output.status);
        }
        Ok(self.parse_dump(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Fixed member list, used in tests and dry-run mode.
pub struct StaticDiscoverer {
    pub members: Vec<Member>,
}

impl Discoverer for StaticDiscoverer {
    fn discover(&self) -> anyhow::Result<Vec<Member>> {
        Ok(self.members.clone())
    }
}

/// The live set of members the scheduler owns exclusively (§3 ownership).
/// Discovery reconciles into this map; nothing else mutates it.
#[derive(Debug, Default)]
pub struct Registry {
    members: HashMap<String, Member>,
    grace_period_cycles: u32,
}

impl Registry {
    pub fn new(grace_period_cycles: u32) -> Self {
        Registry {
            members: HashMap::new(),
            grace_period_cycles,
        }
    }

    /// Reconcile a freshly discovered list against the current registry.
    /// New members are inserted; seen members have `last_seen` bumped and
    /// their miss counter reset; members absent from `discovered` accrue a
    /// missed cycle and are marked ineligible once past the grace period.
    /// Members are never deleted here (§4.1).
    pub fn reconcile(&mut self, discovered: Vec<Member>) {
        let now = Utc::now();
        let seen: std::collections::HashSet<String> =
            discovered.iter().map(|m| m.name.clone()).collect();

        for member in discovered {
            match self.members.get_mut(&member.name) {
                Some(existing) => {
                    existing.last_seen = now;
                    existing.missed_cycles = 0;
                    existing.eligible = true;
                    existing.iface = member.iface;
                    existing.weight = member.weight;
                }
                None => {
                    self.members.insert(member.name.clone(), member);
                }
            }
        }

        for (name, member) in self.members.iter_mut() {
            if !seen.contains(name) {
                member.missed_cycles += 1;
                if member.missed_cycles >= self.grace_period_cycles {
                    member.eligible = false;
                }
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }

    pub fn all(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    pub fn eligible(&self) -> impl Iterator<Item = &Member> {
        self.members.values().filter(|m| m.eligible)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_patterns() {
        assert_eq!(classify_by_name("starlink0", None), MemberClass::Starlink);
        assert_eq!(classify_by_name("wwan0", None), MemberClass::Cellular);
        assert_eq!(classify_by_name("wlan0", None), MemberClass::Wifi);
        assert_eq!(classify_by_name("wg0", None), MemberClass::Vpn);
        assert_eq!(classify_by_name("eth2", None), MemberClass::Lan);
    }

    #[test]
    fn hint_overrides_pattern() {
        assert_eq!(
            classify_by_name("eth1", Some("starlink")),
            MemberClass::Starlink
        );
    }

    #[test]
    fn grace_period_marks_ineligible_without_deleting() {
        let mut registry = Registry::new(2);
        registry.reconcile(vec![Member::new("wan", MemberClass::Starlink, "eth1")]);
        assert_eq!(registry.len(), 1);

        registry.reconcile(vec![]);
        assert!(registry.get("wan").unwrap().eligible);
        registry.reconcile(vec![]);
        assert!(!registry.get("wan").unwrap().eligible);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn rediscovery_clears_missed_cycles() {
        let mut registry = Registry::new(2);
        registry.reconcile(vec![Member::new("wan", MemberClass::Starlink, "eth1")]);
        registry.reconcile(vec![]);
        registry.reconcile(vec![Member::new("wan", MemberClass::Starlink, "eth1")]);
        assert!(registry.get("wan").unwrap().eligible);
    }
}
