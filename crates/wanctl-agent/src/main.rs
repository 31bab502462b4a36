//! wanctl-agent: the multi-WAN failover daemon.
//!
//! Wires config (§6), member discovery (§4.1), the collector/decision
//! thread pair (§5, `scheduler::CoreHandle`), and the local RPC surface
//! (§6) into one process. Grounded on `strata_agent::main`'s CLI/tracing
//! shell and shutdown-signal handling.

mod api;
mod scheduler;
mod state;
mod trend;

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use wanctl_core::audit::AuditLogger;
use wanctl_core::collectors::cellular::CellularCollector;
use wanctl_core::collectors::icmp::IcmpCollector;
use wanctl_core::collectors::link::LinkCounterCollector;
use wanctl_core::collectors::starlink::StarlinkCollector;
use wanctl_core::collectors::wifi::WifiCollector;
use wanctl_core::config::{self, Config};
use wanctl_core::controller::mwan::MwanBackend;
use wanctl_core::controller::route_metric::{IpRouteReader, RouteMetricBackend};
use wanctl_core::controller::Controller;
use wanctl_core::decision::DecisionEngine;
use wanctl_core::registry::{classify_by_name, Member, MwanDiscoverer, NetifdDiscoverer, Registry};
use wanctl_core::scoring::ScoringEngine;
use wanctl_core::telemetry::TelemetryStore;

use scheduler::{CollectorSet, CoreHandle, Shared};

/// wanctl-agent: multi-WAN failover daemon.
#[derive(Parser, Debug)]
#[command(name = "wanctl-agent", about = "Multi-WAN failover controller daemon")]
struct Cli {
    /// Path to the key=value config file (§6).
    #[arg(long, default_value = "/etc/wanctl/wanctl.conf")]
    config: String,

    /// Comma-separated static member list, used in place of discovery
    /// (e.g. "wan:starlink:eth1,lte:cellular:wwan0"). Mainly for dry-run
    /// testing on a dev box without policy-mwan or netifd.
    #[arg(long)]
    static_members: Option<String>,

    /// Bound drain window at shutdown, in seconds (§5).
    #[arg(long, default_value_t = 5)]
    drain_timeout_s: u64,
}

fn parse_static_members(spec: &str) -> Vec<Member> {
    spec.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|entry| {
            let mut parts = entry.trim().splitn(3, ':');
            let name = parts.next().unwrap_or("wan0");
            let class_hint = parts.next();
            let iface = parts.next().unwrap_or(name);
            let class = classify_by_name(name, class_hint);
            Member::new(name, class, iface)
        })
        .collect()
}

fn build_controller(config: &Config) -> Controller {
    let mwan = MwanDiscoverer::new("mwan3", "mwan3");
    let backend: Box<dyn wanctl_core::controller::ControllerBackend> =
        if config.use_mwan3 && mwan.is_available() {
            Box::new(MwanBackend::new("mwan3", "mwan3", config.dry_run))
        } else {
            Box::new(RouteMetricBackend::new(
                "uci",
                Box::new(IpRouteReader::new("ip")),
                config.dry_run,
            ))
        };
    Controller::new(backend, Duration::from_secs(config.cooldown_s))
}

fn discover_members(config: &Config, static_members: &Option<String>) -> Vec<Member> {
    if let Some(spec) = static_members {
        return parse_static_members(spec);
    }
    let mwan = MwanDiscoverer::new("mwan3", "mwan3");
    if config.use_mwan3 && mwan.is_available() {
        mwan.discover().unwrap_or_default()
    } else {
        NetifdDiscoverer::new("ubus").discover().unwrap_or_default()
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let config = match config::load(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, path = %cli.config, "failed to load config");
            return ExitCode::from(1);
        }
    };
    let backend_name = if config.use_mwan3 { "mwan3" } else { "route_metric" };
    tracing::info!(path = %cli.config, backend = %backend_name, "wanctl-agent starting");

    let discovered = discover_members(&config, &cli.static_members);
    if discovered.is_empty() {
        tracing::warn!("no members discovered at startup; scheduler will idle until rediscovery");
    }
    let mut registry = Registry::new(config.grace_period_cycles);
    registry.reconcile(discovered);

    let tokio_rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(err) => {
            tracing::error!(error = %err, "failed to build tokio runtime");
            return ExitCode::from(2);
        }
    };
    let handle = tokio_rt.handle().clone();

    let starlink_addr: std::net::IpAddr = config.starlink_ip.parse().unwrap_or([192, 168, 100, 1].into());
    let collectors = CollectorSet {
        icmp: IcmpCollector::new(starlink_addr, None, handle.clone()),
        link: LinkCounterCollector,
        wifi: WifiCollector,
        cellular: CellularCollector::new("ubus", None),
        starlink: StarlinkCollector::new(config.starlink_api_endpoints.clone(), handle.clone()),
    };

    let audit = AuditLogger::new(config.audit_dir.clone(), config.audit_rotate_mib, config.audit_keep_files);
    let store = TelemetryStore::new(config.window_samples.max(256), config.ram_cap_mib, config.retention_hours);
    let controller = build_controller(&config);

    let shared = Arc::new(Shared {
        config: config.clone(),
        registry: Mutex::new(registry),
        store,
        collectors,
        controller,
        audit,
        decision: Mutex::new(DecisionEngine::new()),
        scoring: Mutex::new(ScoringEngine::new()),
        shutdown: AtomicBool::new(false),
        started_at: chrono::Utc::now(),
    });

    let core = CoreHandle::spawn(shared.clone());

    let rpc_bind = config.rpc_bind.clone();
    let app_state = state::AppState::new(shared.clone());
    let exit = tokio_rt.block_on(run_rpc_server(rpc_bind, app_state));

    tracing::info!("shutting down, draining scheduler threads");
    core.shutdown(&shared, Duration::from_secs(cli.drain_timeout_s));
    tracing::info!("wanctl-agent stopped");

    exit
}

async fn run_rpc_server(bind: String, app_state: state::AppState) -> ExitCode {
    let addr: SocketAddr = match bind.parse() {
        Ok(addr) => addr,
        Err(err) => {
            tracing::error!(error = %err, bind = %bind, "invalid RPC_BIND address");
            return ExitCode::from(1);
        }
    };

    let router = api::router().with_state(app_state);
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, %addr, "failed to bind RPC listener");
            return ExitCode::from(2);
        }
    };
    tracing::info!(%addr, "RPC listener bound");

    tokio::select! {
        result = axum::serve(listener, router) => {
            if let Err(err) = result {
                tracing::error!(error = %err, "RPC server exited unexpectedly");
                return ExitCode::from(2);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received SIGINT, shutting down");
        }
    }
    ExitCode::SUCCESS
}
