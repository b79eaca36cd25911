use actix_web::{web, HttpResponse, Responder};

use crate::metrics::METRICS;
use crate::state::AppState;

pub async fn get_metrics(data: web::Data<AppState>) -> impl Responder {
    let current = data.supervisor.registry().current();

    // 只有进程运行时才输出资源 metrics
    match current.as_ref().and_then(|info| info.pid.map(|pid| (pid, info.os))) {
        Some((pid, os)) => {
            let stats = data.stats_collector.collect_stats(pid);
            METRICS.observe_stats(os.as_str(), stats.as_ref().filter(|s| s.is_valid()));
        }
        None => METRICS.observe_stats("", None),
    }

    match METRICS.render() {
        Ok(metrics_text) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(metrics_text),
        Err(e) => {
            log::error!("Failed to render metrics: {}", e);
            HttpResponse::InternalServerError().body("Failed to render metrics")
        }
    }
}
