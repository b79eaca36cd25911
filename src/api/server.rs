use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::error::SupervisorError;
use crate::metrics::METRICS;
use crate::state::AppState;

#[derive(Deserialize, Default)]
pub struct StartRequest {
    pub os: Option<String>,
}

/// POST /start-server[?os=windows|linux]
///
/// 查询参数优先于 JSON body 中的 `os`。
pub async fn start_server(
    data: web::Data<AppState>,
    query: web::Query<StartRequest>,
    body: Option<web::Json<StartRequest>>,
) -> Result<HttpResponse, SupervisorError> {
    let selector = query
        .into_inner()
        .os
        .or_else(|| body.and_then(|b| b.into_inner().os));

    let outcome = data.supervisor.start(selector.as_deref())?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "running",
        "message": format!("Server started using {}", outcome.script.display()),
        "pid": outcome.pid,
        "os": outcome.os,
    })))
}

/// POST /stop-server
pub async fn stop_server(data: web::Data<AppState>) -> Result<HttpResponse, SupervisorError> {
    let info = data.supervisor.stop()?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "stopped",
        "message": "Termination signal sent to server process",
        "pid": info.pid,
    })))
}

/// GET /server-status
pub async fn server_status(data: web::Data<AppState>) -> HttpResponse {
    let mut report = data.supervisor.status();

    if let (Some(pid), Some(os)) = (report.pid, report.os) {
        report.stats = data.stats_collector.collect_stats(pid);
        METRICS.observe_stats(os.as_str(), report.stats.as_ref());
    }

    HttpResponse::Ok().json(report)
}

/// GET /logs
pub async fn get_logs(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(data.supervisor.hub().snapshot())
}
