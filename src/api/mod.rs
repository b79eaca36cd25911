pub mod metrics;
pub mod server;
pub mod stream;

pub use metrics::get_metrics;
pub use server::{get_logs, server_status, start_server, stop_server};
pub use stream::log_stream;

use actix_web::{web, HttpResponse, Responder};

pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy"
    }))
}

/// 查询参数解析失败时同样返回 JSON `{error}`
fn query_error_handler(
    err: actix_web::error::QueryPayloadError,
    _req: &actix_web::HttpRequest,
) -> actix_web::Error {
    let body = serde_json::json!({ "error": err.to_string() });
    actix_web::error::InternalError::from_response(err, HttpResponse::BadRequest().json(body))
        .into()
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::QueryConfig::default().error_handler(query_error_handler))
        .route("/start-server", web::post().to(start_server))
        .route("/stop-server", web::post().to(stop_server))
        .route("/server-status", web::get().to(server_status))
        .route("/log-stream", web::get().to(log_stream))
        .route("/logs", web::get().to(get_logs))
        .route("/metrics", web::get().to(get_metrics))
        .route("/health", web::get().to(health));
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::cli::CommandArgs;
    use crate::state::{new_state, AppState};
    use actix_web::body::MessageBody;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use clap::Parser;
    use serde_json::Value;
    use std::path::Path;
    use std::pin::Pin;
    use std::time::Duration;
    use tempfile::TempDir;

    fn state_with(script: &Path, extra: &[&str]) -> AppState {
        let mut argv = vec![
            "modix-supervisor".to_string(),
            "--linux-script".to_string(),
            script.display().to_string(),
            "--windows-script".to_string(),
            script.with_extension("bat").display().to_string(),
        ];
        argv.extend(extra.iter().map(|s| s.to_string()));
        new_state(&CommandArgs::parse_from(argv))
    }

    fn sleeper(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("start-server.sh");
        std::fs::write(&path, "echo server booting\nexec sleep 30\n").unwrap();
        path
    }

    macro_rules! app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($state.clone()))
                    .configure(configure),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn status_and_stop_when_stopped() {
        let dir = TempDir::new().unwrap();
        let state = state_with(&sleeper(&dir), &[]);
        let app = app!(state);

        let req = test::TestRequest::get().uri("/server-status").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "stopped");

        let req = test::TestRequest::post().uri("/stop-server").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Server is not running");
    }

    #[actix_web::test]
    async fn start_stop_lifecycle() {
        let dir = TempDir::new().unwrap();
        let state = state_with(&sleeper(&dir), &[]);
        let app = app!(state);

        let req = test::TestRequest::post().uri("/start-server?os=linux").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "running");
        assert_eq!(body["os"], "linux");

        let req = test::TestRequest::post().uri("/start-server").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::get().uri("/server-status").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "running");
        assert_eq!(body["state"], "running");
        assert!(body["pid"].is_u64());

        let req = test::TestRequest::post().uri("/stop-server").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "stopped");

        assert!(state.supervisor.wait_stopped(Duration::from_secs(10)).await);
        let req = test::TestRequest::get().uri("/server-status").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "stopped");

        let req = test::TestRequest::get().uri("/logs").to_request();
        let logs: Vec<Value> = test::call_and_read_body_json(&app, req).await;
        assert!(logs.iter().any(|l| l["type"] == "info"
            && l["text"].as_str().unwrap().ends_with("server booting")));
        assert_eq!(logs.last().unwrap()["type"], "system");
    }

    #[actix_web::test]
    async fn missing_script_is_not_found() {
        let dir = TempDir::new().unwrap();
        let state = state_with(&dir.path().join("absent.sh"), &[]);
        let app = app!(state);

        let req = test::TestRequest::post().uri("/start-server").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert!(state.supervisor.registry().is_empty());
    }

    #[actix_web::test]
    async fn body_selects_os_when_query_absent() {
        let dir = TempDir::new().unwrap();
        let state = state_with(&sleeper(&dir), &[]);
        let app = app!(state);

        // windows 脚本不存在
        let req = test::TestRequest::post()
            .uri("/start-server")
            .set_json(serde_json::json!({"os": "windows"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("start-server.bat"));
    }

    #[actix_web::test]
    async fn malformed_query_returns_json_error() {
        let dir = TempDir::new().unwrap();
        let state = state_with(&sleeper(&dir), &[]);
        let app = app!(state);

        let req = test::TestRequest::post()
            .uri("/start-server?os=linux&os=windows")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("os"));
        assert!(state.supervisor.registry().is_empty());
    }

    #[actix_web::test]
    async fn strict_mode_rejects_unknown_os() {
        let dir = TempDir::new().unwrap();
        let state = state_with(&sleeper(&dir), &["--strict-os"]);
        let app = app!(state);

        let req = test::TestRequest::post().uri("/start-server?os=amiga").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn spawn_failure_is_internal_error() {
        let dir = TempDir::new().unwrap();
        let state = state_with(&sleeper(&dir), &["--linux-shell", "/no/such/shell"]);
        let app = app!(state);

        let req = test::TestRequest::post().uri("/start-server").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(state.supervisor.registry().is_empty());
    }

    #[actix_web::test]
    async fn log_stream_replays_backlog() {
        let dir = TempDir::new().unwrap();
        let state = state_with(&sleeper(&dir), &["--keepalive-secs", "1"]);
        state.supervisor.hub().append(crate::models::LogEntry::system("hello"));
        let app = app!(state);

        let req = test::TestRequest::get().uri("/log-stream").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "text/event-stream"
        );

        let mut body = resp.into_body().boxed();
        let first = futures_util::future::poll_fn(|cx| Pin::new(&mut body).poll_next(cx))
            .await
            .unwrap()
            .unwrap();
        let text = String::from_utf8(first.to_vec()).unwrap();
        assert!(text.starts_with("data: {"));
        assert!(text.contains("hello"));
        assert!(text.contains("\"type\":\"system\""));

        let second = futures_util::future::poll_fn(|cx| Pin::new(&mut body).poll_next(cx))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second, stream::KEEPALIVE_FRAME);
    }

    #[actix_web::test]
    async fn health_and_metrics() {
        let dir = TempDir::new().unwrap();
        let state = state_with(&sleeper(&dir), &[]);
        let app = app!(state);

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "healthy");

        let req = test::TestRequest::get().uri("/metrics").to_request();
        let body = test::call_and_read_body(&app, req).await;
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("modix_server_up"));
    }
}
