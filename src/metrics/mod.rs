use prometheus::{
    Encoder, Gauge, GaugeVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
    register_gauge_vec_with_registry, register_gauge_with_registry,
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
};
use lazy_static::lazy_static;
use std::sync::Arc;

use crate::models::ProcessStats;

pub struct MetricsRegistry {
    registry: Registry,

    // Gauge metrics
    pub server_up: Gauge,
    pub log_subscribers: Gauge,
    pub server_cpu_usage: GaugeVec,
    pub server_memory_bytes: GaugeVec,

    // Counter metrics
    pub server_starts_total: IntCounterVec,
    pub server_exits_total: IntCounter,
    pub log_lines_total: IntCounterVec,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let registry = Registry::new();

        let server_up = register_gauge_with_registry!(
            Opts::new("modix_server_up", "Game server process is running (1) or stopped (0)"),
            registry
        ).expect("register modix_server_up");

        let log_subscribers = register_gauge_with_registry!(
            Opts::new("modix_log_subscribers", "Live log stream subscribers"),
            registry
        ).expect("register modix_log_subscribers");

        let server_cpu_usage = register_gauge_vec_with_registry!(
            Opts::new("modix_server_cpu_usage_percent", "Game server CPU usage percentage"),
            &["os"],
            registry
        ).expect("register modix_server_cpu_usage_percent");

        let server_memory_bytes = register_gauge_vec_with_registry!(
            Opts::new("modix_server_memory_bytes", "Game server resident memory in bytes"),
            &["os"],
            registry
        ).expect("register modix_server_memory_bytes");

        let server_starts_total = register_int_counter_vec_with_registry!(
            Opts::new("modix_server_starts_total", "Start requests by result"),
            &["result"],
            registry
        ).expect("register modix_server_starts_total");

        let server_exits_total = register_int_counter_with_registry!(
            Opts::new("modix_server_exits_total", "Game server process exits"),
            registry
        ).expect("register modix_server_exits_total");

        let log_lines_total = register_int_counter_vec_with_registry!(
            Opts::new("modix_log_lines_total", "Log lines appended by type"),
            &["type"],
            registry
        ).expect("register modix_log_lines_total");

        Self {
            registry,
            server_up,
            log_subscribers,
            server_cpu_usage,
            server_memory_bytes,
            server_starts_total,
            server_exits_total,
            log_lines_total,
        }
    }

    pub fn render(&self) -> Result<String, Box<dyn std::error::Error>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// 记录一次资源采样；进程已停止时传 None 清掉旧值
    pub fn observe_stats(&self, os: &str, stats: Option<&ProcessStats>) {
        match stats {
            Some(s) => {
                self.server_cpu_usage.with_label_values(&[os]).set(s.cpu_usage as f64);
                self.server_memory_bytes.with_label_values(&[os]).set(s.memory_bytes as f64);
            }
            None => {
                self.server_cpu_usage.reset();
                self.server_memory_bytes.reset();
            }
        }
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static! {
    pub static ref METRICS: Arc<MetricsRegistry> = Arc::new(MetricsRegistry::new());
}
