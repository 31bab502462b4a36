//! Starlink dish collector (§4.2): gRPC-over-HTTP/2 request to the dish's
//! status endpoint. Tries a configurable ordered list of endpoints and
//! fails fast on connection refusal rather than waiting out the full
//! collector timeout against a dead address.

use super::{CollectContext, Collector};
use crate::error::CollectorError;
use crate::model::{ClassMetrics, Metrics, RebootState, StarlinkMetrics};
use crate::registry::Member;
use std::time::Duration;
use tonic::transport::Channel;

pub mod dish_proto {
    tonic::include_proto!("dish");
}

use dish_proto::device_service_client::DeviceServiceClient;
use dish_proto::{GetStatusRequest, Request as DishRequest};

pub struct StarlinkCollector {
    pub endpoints: Vec<String>,
    runtime: tokio::runtime::Handle,
}

impl StarlinkCollector {
    pub fn new(endpoints: Vec<String>, runtime: tokio::runtime::Handle) -> Self {
        StarlinkCollector { endpoints, runtime }
    }

    async fn connect_ordered(&self, timeout: Duration) -> Option<DeviceServiceClient<Channel>> {
        for endpoint in &self.endpoints {
            let url = format!("http://{endpoint}");
            let Ok(channel) = Channel::from_shared(url) else {
                continue;
            };
            match tokio::time::timeout(timeout, channel.connect()).await {
                Ok(Ok(channel)) => return Some(DeviceServiceClient::new(channel)),
                // connection refused or timed out: fail fast, try the next
                // endpoint immediately rather than waiting out the budget.
                Ok(Err(_)) | Err(_) => continue,
            }
        }
        None
    }

    async fn query(&self, timeout: Duration) -> Result<StarlinkMetrics, CollectorError> {
        let mut client = self
            .connect_ordered(timeout)
            .await
            .ok_or_else(|| CollectorError::Refused(self.endpoints.join(",")))?;

        let request = tonic::Request::new(DishRequest {
            get_status: Some(GetStatusRequest {}),
        });
        let response = tokio::time::timeout(timeout, client.handle(request))
            .await
            .map_err(|_| CollectorError::Timeout(timeout))?
            .map_err(|status| CollectorError::Transport(anyhow::anyhow!(status.to_string())))?
            .into_inner();

        let status = response
            .dish_get_status
            .ok_or_else(|| CollectorError::Transport(anyhow::anyhow!("empty dish status response")))?;

        let uptime_s = status.device_state.as_ref().map(|d| d.uptime_s).unwrap_or(0);
        let obstruction = status.obstruction_stats.unwrap_or_default();

        Ok(StarlinkMetrics {
            obstruction_pct: obstruction.fraction_obstructed * 100.0,
            time_obstructed_pct: obstruction.time_obstructed * 100.0,
            avg_prolonged_obstruction_s: obstruction.avg_prolonged_obstruction_duration_s,
            patches_valid: obstruction.patches_valid.max(0) as u32,
            valid_s: obstruction.valid_s,
            snr_db: status.snr,
            pop_ping_drop_rate: status.pop_ping_drop_rate,
            uplink_throughput: status.uplink_throughput_bps / 1000.0,
            downlink_throughput: status.downlink_throughput_bps / 1000.0,
            reboot_state: RebootState::Idle,
            reboot_time_epoch: None,
        }
        .with_uptime(uptime_s))
    }
}

impl StarlinkMetrics {
    /// Dish uptime isn't part of the metrics struct's own fields, but a
    /// very low uptime right after boot is the strongest "just rebooted"
    /// signal available; the scheduler derives `reboot_state` transitions
    /// from it alongside the explicit reboot-schedule fields.
    fn with_uptime(self, uptime_s: u64) -> Self {
        if uptime_s < 30 {
            StarlinkMetrics {
                reboot_state: RebootState::UpdateApplied,
                ..self
            }
        } else {
            self
        }
    }
}

impl Collector for StarlinkCollector {
    fn class_name(&self) -> &'static str {
        "starlink"
    }

    fn collect(&self, _member: &Member, ctx: &CollectContext) -> Result<Metrics, CollectorError> {
        if ctx.dry_run {
            return Err(CollectorError::Unsupported("dry_run"));
        }
        let starlink = self.runtime.block_on(self.query(ctx.timeout))?;
        Ok(Metrics {
            common: Default::default(),
            class: ClassMetrics {
                starlink: Some(starlink),
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
    fn empty_endpoint_list_fails_fast() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let collector = StarlinkCollector::new(Vec::new(), rt.handle().clone());
        let err = rt.block_on(collector.query(Duration::from_millis(50))).unwrap_err();
        assert!(matches!(err, CollectorError::Refused(_)));
    }

    #[test]
    fn low_uptime_is_treated_as_just_rebooted() {
        let metrics = StarlinkMetrics {
            obstruction_pct: 0.0,
            time_obstructed_pct: 0.0,
            avg_prolonged_obstruction_s: 0.0,
            patches_valid: 0,
            valid_s: 0.0,
            snr_db: 8.0,
            pop_ping_drop_rate: 0.0,
            uplink_throughput: 0.0,
            downlink_throughput: 0.0,
            reboot_state: RebootState::Idle,
            reboot_time_epoch: None,
        }
        .with_uptime(5);
        assert_eq!(metrics.reboot_state, RebootState::UpdateApplied);
    }
}
