//! Configuration loading.
//!
//! The on-disk format is a flat `KEY=value` text file (one setting per
//! line, `#` comments, blank lines ignored) rather than a structured
//! format, so upgrades never invalidate a router's existing config. We
//! parse it into a raw string map first, then resolve that map into a
//! fully-typed [`Config`] with every field defaulted — the same
//! two-phase `*Input` → resolved shape the rest of the corpus uses for
//! layered config, just fed by a flat map instead of a deserializer.

use crate::error::ConfigError;
use crate::model::MemberClass;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Per-class weight vector used by scoring (§4.5). The nine components
/// must sum to 100.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub latency: f64,
    pub loss: f64,
    pub bandwidth: f64,
    pub uptime: f64,
    pub stability: f64,
    pub connection_state: f64,
    pub signal: f64,
    pub data_usage: f64,
    pub priority: f64,
}

impl ScoreWeights {
    pub fn sum(&self) -> f64 {
        self.latency
            + self.loss
            + self.bandwidth
            + self.uptime
            + self.stability
            + self.connection_state
            + self.signal
            + self.data_usage
            + self.priority
    }

    pub fn validate(&self, class: &str) -> Result<(), ConfigError> {
        let sum = self.sum();
        if (sum - 100.0).abs() > 0.5 {
            return Err(ConfigError::WeightsNotNormalized {
                class: class.to_string(),
                sum,
            });
        }
        Ok(())
    }
}

impl Default for ScoreWeights {
    fn default() -> Self {
        ScoreWeights {
            latency: 20.0,
            loss: 20.0,
            bandwidth: 12.0,
            uptime: 10.0,
            stability: 12.0,
            connection_state: 8.0,
            signal: 10.0,
            data_usage: 3.0,
            priority: 5.0,
        }
    }
}

/// Benchmark pair used to linearly normalize a raw metric into `[0,100]`.
#[derive(Debug, Clone, Copy)]
pub struct Benchmark {
    pub excellent: f64,
    pub poor: f64,
}

impl Benchmark {
    /// Normalize `value` against this benchmark, clamped to `[0,100]`.
    /// Handles both "lower is better" (excellent < poor) and "higher is
    /// better" (excellent > poor) benchmarks.
    pub fn normalize(&self, value: f64) -> f64 {
        if (self.poor - self.excellent).abs() < f64::EPSILON {
            return 100.0;
        }
        let t = (value - self.poor) / (self.excellent - self.poor);
        (t * 100.0).clamp(0.0, 100.0)
    }
}

/// Obstruction sub-thresholds used by the refined starlink-only rule (§4.5).
#[derive(Debug, Clone, Copy)]
pub struct ObstructionThresholds {
    pub hist_threshold_pct: f64,
    pub prolonged_threshold_s: f64,
    pub min_patches: u32,
    pub min_valid_s: f64,
    pub normal_obstruction_pct: f64,
    pub emergency_multiplier: f64,
}

impl Default for ObstructionThresholds {
    fn default() -> Self {
        ObstructionThresholds {
            hist_threshold_pct: 1.0,
            prolonged_threshold_s: 30.0,
            min_patches: 50,
            min_valid_s: 60.0,
            normal_obstruction_pct: 25.0,
            emergency_multiplier: 3.0,
        }
    }
}

/// Per-class probe sizing used by the ICMP collector (§4.2).
#[derive(Debug, Clone, Copy)]
pub struct ProbeCounts {
    pub unlimited: u32,
    pub metered: u32,
    pub vpn: u32,
    pub satellite: u32,
}

impl Default for ProbeCounts {
    fn default() -> Self {
        ProbeCounts {
            unlimited: 3,
            metered: 1,
            vpn: 2,
            satellite: 2,
        }
    }
}

impl ProbeCounts {
    pub fn for_class(&self, class: MemberClass) -> u32 {
        match class {
            MemberClass::Starlink => self.satellite,
            MemberClass::Cellular => self.metered,
            MemberClass::Vpn => self.vpn,
            MemberClass::Wifi | MemberClass::Lan => self.unlimited,
        }
    }
}

/// Fully resolved configuration. Every field has a default, so a missing
/// or empty config file is always a valid configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub starlink_ip: String,
    pub starlink_port: u16,
    pub starlink_api_endpoints: Vec<String>,

    pub base_interval_unlimited: Duration,
    pub base_interval_metered: Duration,
    pub rediscovery_interval: Duration,
    pub grace_period_cycles: u32,

    pub cellular_timeout: Duration,
    pub probe_counts: ProbeCounts,

    pub kill_loss_pct: f64,
    pub kill_latency_ms: f64,
    pub kill_obstruction_pct: f64,

    pub weights: ScoreWeights,
    pub latency_benchmark: Benchmark,
    pub loss_benchmark: Benchmark,

    pub ewma_alpha_initial: f64,
    pub ewma_alpha_steady: f64,
    pub ewma_initial_samples: u32,
    pub window_samples: usize,

    pub obstruction: ObstructionThresholds,

    pub cooldown_s: u64,
    pub min_uptime_s: u64,
    pub switch_margin: f64,
    pub fail_min_duration_s: u64,
    pub failback_margin: f64,
    pub stability_checks: u32,
    pub warn_window_s: i64,
    pub snr_drop_threshold: f64,
    pub trend_window: usize,
    pub latency_spike_threshold: f64,
    pub loss_spike_threshold: f64,

    pub retention_hours: u64,
    pub ram_cap_mib: u64,

    pub use_mwan3: bool,
    pub dry_run: bool,
    pub debug: String,

    pub audit_dir: String,
    pub audit_rotate_mib: u64,
    pub audit_keep_files: u32,

    pub rpc_bind: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            starlink_ip: "192.168.100.1".to_string(),
            starlink_port: 9200,
            starlink_api_endpoints: vec!["192.168.100.1:9200".to_string()],

            base_interval_unlimited: Duration::from_secs(1),
            base_interval_metered: Duration::from_secs(60),
            rediscovery_interval: Duration::from_secs(60),
            grace_period_cycles: 3,

            cellular_timeout: Duration::from_secs(5),
            probe_counts: ProbeCounts::default(),

            kill_loss_pct: 20.0,
            kill_latency_ms: 2000.0,
            kill_obstruction_pct: 80.0,

            weights: ScoreWeights::default(),
            latency_benchmark: Benchmark {
                excellent: 20.0,
                poor: 500.0,
            },
            loss_benchmark: Benchmark {
                excellent: 0.0,
                poor: 5.0,
            },

            ewma_alpha_initial: 0.3,
            ewma_alpha_steady: 0.1,
            ewma_initial_samples: 10,
            window_samples: 10,

            obstruction: ObstructionThresholds::default(),

            cooldown_s: 30,
            min_uptime_s: 60,
            switch_margin: 10.0,
            fail_min_duration_s: 10,
            failback_margin: 5.0,
            stability_checks: 3,
            warn_window_s: 600,
            snr_drop_threshold: 3.0,
            trend_window: 5,
            latency_spike_threshold: 300.0,
            loss_spike_threshold: 5.0,

            retention_hours: 24,
            ram_cap_mib: 10,

            use_mwan3: true,
            dry_run: false,
            debug: "info".to_string(),

            audit_dir: "/var/log/wanctl".to_string(),
            audit_rotate_mib: 50,
            audit_keep_files: 10,

            rpc_bind: "127.0.0.1:7780".to_string(),
        }
    }
}

/// Parse a `KEY=value` text file into a raw string map. `#`-prefixed and
/// blank lines are skipped; malformed lines are reported with their line
/// number.
pub fn parse_raw(text: &str) -> Result<HashMap<String, String>, ConfigError> {
    let mut raw = HashMap::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let (key, value) = trimmed.split_once('=').ok_or_else(|| ConfigError::Parse {
            line: idx + 1,
            message: "expected KEY=value".to_string(),
        })?;
        let key = key.trim().to_string();
        let value = value.trim().trim_matches('"').to_string();
        if key.is_empty() {
            return Err(ConfigError::Parse {
                line: idx + 1,
                message: "empty key".to_string(),
            });
        }
        raw.insert(key, value);
    }
    Ok(raw)
}

/// Load and resolve a config file from disk. A missing file is not an
/// error — it resolves to all-defaults, matching the policy that the
/// daemon must run unconfigured on first boot.
pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(err) => {
            return Err(ConfigError::Read {
                path: path.display().to_string(),
                source: err,
            })
        }
    };
    resolve(parse_raw(&text)?)
}

fn get_str(raw: &HashMap<String, String>, key: &str, default: &str) -> String {
    raw.get(key).cloned().unwrap_or_else(|| default.to_string())
}

fn get_parsed<T: std::str::FromStr>(
    raw: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match raw.get(key) {
        None => Ok(default),
        Some(v) => v.parse::<T>().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("could not parse `{v}`"),
        }),
    }
}

fn get_bool(raw: &HashMap<String, String>, key: &str, default: bool) -> Result<bool, ConfigError> {
    match raw.get(key).map(|s| s.to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if v == "1" || v == "true" || v == "yes" || v == "on" => Ok(true),
        Some(v) if v == "0" || v == "false" || v == "no" || v == "off" => Ok(false),
        Some(_) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "expected boolean".to_string(),
        }),
    }
}

/// Known config keys. Anything outside this set is ignored with a warning,
/// never a hard error — firmware upgrades carry forward stale keys.
const KNOWN_KEYS: &[&str] = &[
    "STARLINK_IP",
    "STARLINK_PORT",
    "STARLINK_API_ENDPOINTS",
    "POLL_INTERVAL_UNLIMITED_MS",
    "POLL_INTERVAL_METERED_MS",
    "REDISCOVERY_INTERVAL_S",
    "GRACE_PERIOD_CYCLES",
    "CELLULAR_TIMEOUT_S",
    "PROBE_COUNT_UNLIMITED",
    "PROBE_COUNT_METERED",
    "PROBE_COUNT_VPN",
    "PROBE_COUNT_SATELLITE",
    "KILL_LOSS",
    "KILL_LATENCY",
    "KILL_OBSTRUCTION",
    "WEIGHT_LATENCY",
    "WEIGHT_LOSS",
    "WEIGHT_BANDWIDTH",
    "WEIGHT_UPTIME",
    "WEIGHT_STABILITY",
    "WEIGHT_CONNECTION_STATE",
    "WEIGHT_SIGNAL",
    "WEIGHT_DATA_USAGE",
    "WEIGHT_PRIORITY",
    "LATENCY_EXCELLENT_MS",
    "LATENCY_POOR_MS",
    "LOSS_EXCELLENT_PCT",
    "LOSS_POOR_PCT",
    "EWMA_ALPHA_INITIAL",
    "EWMA_ALPHA_STEADY",
    "EWMA_INITIAL_SAMPLES",
    "WINDOW_SAMPLES",
    "OBSTRUCTION_HIST_THRESHOLD",
    "OBSTRUCTION_PROLONGED_THRESHOLD_S",
    "OBSTRUCTION_MIN_PATCHES",
    "OBSTRUCTION_MIN_VALID_S",
    "OBSTRUCTION_NORMAL_PCT",
    "OBSTRUCTION_EMERGENCY_MULTIPLIER",
    "COOLDOWN_S",
    "MIN_UPTIME_S",
    "SWITCH_MARGIN",
    "FAIL_MIN_DURATION_S",
    "FAILBACK_MARGIN",
    "STABILITY_CHECKS",
    "WARN_WINDOW_S",
    "SNR_DROP_THRESHOLD",
    "TREND_WINDOW",
    "LATENCY_SPIKE_THRESHOLD",
    "LOSS_SPIKE_THRESHOLD",
    "RETENTION_HOURS",
    "RAM_CAP_MIB",
    "USE_MWAN3",
    "DRY_RUN",
    "DEBUG",
    "AUDIT_DIR",
    "AUDIT_ROTATE_MIB",
    "AUDIT_KEEP_FILES",
    "RPC_BIND",
];

/// Resolve a raw string map (from [`parse_raw`]) into a validated [`Config`].
pub fn resolve(raw: HashMap<String, String>) -> Result<Config, ConfigError> {
    for key in raw.keys() {
        if !KNOWN_KEYS.contains(&key.as_str()) {
            tracing::warn!(key = %key, "ignoring unknown config key");
        }
    }

    let d = Config::default();

    let weights = ScoreWeights {
        latency: get_parsed(&raw, "WEIGHT_LATENCY", d.weights.latency)?,
        loss: get_parsed(&raw, "WEIGHT_LOSS", d.weights.loss)?,
        bandwidth: get_parsed(&raw, "WEIGHT_BANDWIDTH", d.weights.bandwidth)?,
        uptime: get_parsed(&raw, "WEIGHT_UPTIME", d.weights.uptime)?,
        stability: get_parsed(&raw, "WEIGHT_STABILITY", d.weights.stability)?,
        connection_state: get_parsed(
            &raw,
            "WEIGHT_CONNECTION_STATE",
            d.weights.connection_state,
        )?,
        signal: get_parsed(&raw, "WEIGHT_SIGNAL", d.weights.signal)?,
        data_usage: get_parsed(&raw, "WEIGHT_DATA_USAGE", d.weights.data_usage)?,
        priority: get_parsed(&raw, "WEIGHT_PRIORITY", d.weights.priority)?,
    };
    weights.validate("global")?;

    let endpoints = raw
        .get("STARLINK_API_ENDPOINTS")
        .map(|v| {
            v.split_whitespace()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
        })
        .filter(|v| !v.is_empty())
        .unwrap_or(d.starlink_api_endpoints);

    Ok(Config {
        starlink_ip: get_str(&raw, "STARLINK_IP", &d.starlink_ip),
        starlink_port: get_parsed(&raw, "STARLINK_PORT", d.starlink_port)?,
        starlink_api_endpoints: endpoints,

        base_interval_unlimited: Duration::from_millis(get_parsed(
            &raw,
            "POLL_INTERVAL_UNLIMITED_MS",
            d.base_interval_unlimited.as_millis() as u64,
        )?),
        base_interval_metered: Duration::from_millis(get_parsed(
            &raw,
            "POLL_INTERVAL_METERED_MS",
            d.base_interval_metered.as_millis() as u64,
        )?),
        rediscovery_interval: Duration::from_secs(get_parsed(
            &raw,
            "REDISCOVERY_INTERVAL_S",
            d.rediscovery_interval.as_secs(),
        )?),
        grace_period_cycles: get_parsed(&raw, "GRACE_PERIOD_CYCLES", d.grace_period_cycles)?,

        cellular_timeout: Duration::from_secs(get_parsed(
            &raw,
            "CELLULAR_TIMEOUT_S",
            d.cellular_timeout.as_secs(),
        )?),
        probe_counts: ProbeCounts {
            unlimited: get_parsed(&raw, "PROBE_COUNT_UNLIMITED", d.probe_counts.unlimited)?,
            metered: get_parsed(&raw, "PROBE_COUNT_METERED", d.probe_counts.metered)?,
            vpn: get_parsed(&raw, "PROBE_COUNT_VPN", d.probe_counts.vpn)?,
            satellite: get_parsed(&raw, "PROBE_COUNT_SATELLITE", d.probe_counts.satellite)?,
        },

        kill_loss_pct: get_parsed(&raw, "KILL_LOSS", d.kill_loss_pct)?,
        kill_latency_ms: get_parsed(&raw, "KILL_LATENCY", d.kill_latency_ms)?,
        kill_obstruction_pct: get_parsed(&raw, "KILL_OBSTRUCTION", d.kill_obstruction_pct)?,

        weights,
        latency_benchmark: Benchmark {
            excellent: get_parsed(
                &raw,
                "LATENCY_EXCELLENT_MS",
                d.latency_benchmark.excellent,
            )?,
            poor: get_parsed(&raw, "LATENCY_POOR_MS", d.latency_benchmark.poor)?,
        },
        loss_benchmark: Benchmark {
            excellent: get_parsed(&raw, "LOSS_EXCELLENT_PCT", d.loss_benchmark.excellent)?,
            poor: get_parsed(&raw, "LOSS_POOR_PCT", d.loss_benchmark.poor)?,
        },

        ewma_alpha_initial: get_parsed(&raw, "EWMA_ALPHA_INITIAL", d.ewma_alpha_initial)?,
        ewma_alpha_steady: get_parsed(&raw, "EWMA_ALPHA_STEADY", d.ewma_alpha_steady)?,
        ewma_initial_samples: get_parsed(
            &raw,
            "EWMA_INITIAL_SAMPLES",
            d.ewma_initial_samples,
        )?,
        window_samples: get_parsed(&raw, "WINDOW_SAMPLES", d.window_samples)?,

        obstruction: ObstructionThresholds {
            hist_threshold_pct: get_parsed(
                &raw,
                "OBSTRUCTION_HIST_THRESHOLD",
                d.obstruction.hist_threshold_pct,
            )?,
            prolonged_threshold_s: get_parsed(
                &raw,
                "OBSTRUCTION_PROLONGED_THRESHOLD_S",
                d.obstruction.prolonged_threshold_s,
            )?,
            min_patches: get_parsed(
                &raw,
                "OBSTRUCTION_MIN_PATCHES",
                d.obstruction.min_patches,
            )?,
            min_valid_s: get_parsed(&raw, "OBSTRUCTION_MIN_VALID_S", d.obstruction.min_valid_s)?,
            normal_obstruction_pct: get_parsed(
                &raw,
                "OBSTRUCTION_NORMAL_PCT",
                d.obstruction.normal_obstruction_pct,
            )?,
            emergency_multiplier: get_parsed(
                &raw,
                "OBSTRUCTION_EMERGENCY_MULTIPLIER",
                d.obstruction.emergency_multiplier,
            )?,
        },

        cooldown_s: get_parsed(&raw, "COOLDOWN_S", d.cooldown_s)?,
        min_uptime_s: get_parsed(&raw, "MIN_UPTIME_S", d.min_uptime_s)?,
        switch_margin: get_parsed(&raw, "SWITCH_MARGIN", d.switch_margin)?,
        fail_min_duration_s: get_parsed(&raw, "FAIL_MIN_DURATION_S", d.fail_min_duration_s)?,
        failback_margin: get_parsed(&raw, "FAILBACK_MARGIN", d.failback_margin)?,
        stability_checks: get_parsed(&raw, "STABILITY_CHECKS", d.stability_checks)?,
        warn_window_s: get_parsed(&raw, "WARN_WINDOW_S", d.warn_window_s)?,
        snr_drop_threshold: get_parsed(&raw, "SNR_DROP_THRESHOLD", d.snr_drop_threshold)?,
        trend_window: get_parsed(&raw, "TREND_WINDOW", d.trend_window)?,
        latency_spike_threshold: get_parsed(
            &raw,
            "LATENCY_SPIKE_THRESHOLD",
            d.latency_spike_threshold,
        )?,
        loss_spike_threshold: get_parsed(&raw, "LOSS_SPIKE_THRESHOLD", d.loss_spike_threshold)?,

        retention_hours: get_parsed(&raw, "RETENTION_HOURS", d.retention_hours)?,
        ram_cap_mib: get_parsed(&raw, "RAM_CAP_MIB", d.ram_cap_mib)?,

        use_mwan3: get_bool(&raw, "USE_MWAN3", d.use_mwan3)?,
        dry_run: get_bool(&raw, "DRY_RUN", d.dry_run)?,
        debug: get_str(&raw, "DEBUG", &d.debug),

        audit_dir: get_str(&raw, "AUDIT_DIR", &d.audit_dir),
        audit_rotate_mib: get_parsed(&raw, "AUDIT_ROTATE_MIB", d.audit_rotate_mib)?,
        audit_keep_files: get_parsed(&raw, "AUDIT_KEEP_FILES", d.audit_keep_files)?,

        rpc_bind: get_str(&raw, "RPC_BIND", &d.rpc_bind),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve_and_validate() {
        let cfg = resolve(HashMap::new()).unwrap();
        assert_eq!(cfg.starlink_port, 9200);
        assert!((cfg.weights.sum() - 100.0).abs() < 0.5);
    }

    #[test]
    fn rejects_unbalanced_weights() {
        let mut raw = HashMap::new();
        raw.insert("WEIGHT_LATENCY".to_string(), "90".to_string());
        let err = resolve(raw).unwrap_err();
        assert!(matches!(err, ConfigError::WeightsNotNormalized { .. }));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let mut raw = HashMap::new();
        raw.insert("SOME_FUTURE_KEY".to_string(), "1".to_string());
        assert!(resolve(raw).is_ok());
    }

    #[test]
    fn parses_endpoint_list() {
        let text = "STARLINK_API_ENDPOINTS=192.168.100.1:9200 10.0.0.1:9200\n";
        let raw = parse_raw(text).unwrap();
        let cfg = resolve(raw).unwrap();
        assert_eq!(cfg.starlink_api_endpoints.len(), 2);
    }

    #[test]
    fn rejects_malformed_line() {
        let err = parse_raw("not_a_kv_line\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { line: 1, .. }));
    }
}
