//! Policy multi-WAN back-end (§4.7.A).
//!
//! For each known member: `metric=1` for the chosen member, `metric =
//! primary+10` for everyone else, then commit and restart the supervisor.
//! No verified-apply loop here — the policy layer's own restart is assumed
//! authoritative, matching the asymmetry the specification draws between
//! the two back-ends.

use super::ControllerBackend;
use crate::error::ControllerError;
use crate::registry::Member;
use std::process::Command;
use std::time::Duration;

const PRIMARY_METRIC: u32 = 1;
const SECONDARY_METRIC_BASE: u32 = 10;
const RESTART_TIMEOUT: Duration = Duration::from_secs(30);

pub struct MwanBackend {
    binary: String,
    config: String,
    dry_run: bool,
}

impl MwanBackend {
    pub fn new(binary: impl Into<String>, config: impl Into<String>, dry_run: bool) -> Self {
        MwanBackend {
            binary: binary.into(),
            config: config.into(),
            dry_run,
        }
    }

    fn run(&self, args: &[&str]) -> Result<(), ControllerError> {
        if self.dry_run {
            tracing::debug!(binary = %self.binary, args = ?args, "dry-run: skipping mwan3 command");
            return Ok(());
        }
        let status = Command::new(&self.binary)
            .args(args)
            .status()
            .map_err(ControllerError::Exec)?;
        if !status.success() {
            return Err(ControllerError::ApplyFailed {
                backend: "policy_mwan".to_string(),
                message: format!("{} {:?} exited with {status}", self.binary, args),
            });
        }
        Ok(())
    }
}

impl ControllerBackend for MwanBackend {
    fn name(&self) -> &'static str {
        "policy_mwan"
    }

    fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("status")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn apply(&self, members: &[Member], primary: &str) -> Result<(), ControllerError> {
        for member in members {
            let metric = if member.name == primary {
                PRIMARY_METRIC
            } else {
                PRIMARY_METRIC + SECONDARY_METRIC_BASE
            };
            let path = format!("mwan3.{}.metric", member.name);
            let value = metric.to_string();
            self.run(&["set", &path, &value])?;
        }
        self.run(&["commit", &self.config])?;

        if self.dry_run {
            return Ok(());
        }
        let status = Command::new(&self.binary)
            .args(["restart"])
            .status()
            .map_err(ControllerError::Exec)?;
        let _ = RESTART_TIMEOUT; // documents the supervisor-restart deadline from §5
        if !status.success() {
            return Err(ControllerError::ApplyFailed {
                backend: "policy_mwan".to_string(),
                message: format!("restart exited with {status}"),
            });
        }
        Ok(())
    }

    fn get_current_primary(&self, members: &[Member]) -> Result<Option<String>, ControllerError> {
        let output = Command::new(&self.binary)
            .args(["status"])
            .output()
            .map_err(ControllerError::Exec)?;
        let text = String::from_utf8_lossy(&output.stdout);
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(&text) {
            if let Some(online) = json
                .get("interfaces")
                .and_then(|v| v.as_array())
                .and_then(|arr| arr.iter().find(|i| i.get("online") == Some(&serde_json::Value::Bool(true))))
                .and_then(|i| i.get("interface"))
                .and_then(|v| v.as_str())
            {
                return Ok(Some(online.to_string()));
            }
            return Ok(None);
        }
        for member in members {
            if text.contains(&format!("{} is online", member.name)) {
                return Ok(Some(member.name.clone()));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MemberClass;

    #[test]
    fn dry_run_never_touches_the_binary() {
        let backend = MwanBackend::new("/nonexistent/mwan3", "mwan3", true);
        let members = vec![Member::new("wan", MemberClass::Starlink, "eth1")];
        assert!(backend.apply(&members, "wan").is_ok());
    }
}
