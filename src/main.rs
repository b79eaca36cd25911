use actix_web::{web, App, HttpServer};
use anyhow::Context;
use clap::Parser;
use std::time::Duration;

mod api;
mod cli;
mod error;
mod metrics;
mod models;
mod services;
mod state;

use cli::CommandArgs;
use state::new_state;

/// 服务退出时等待游戏服务器进程结束的时间
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = CommandArgs::parse();
    let bind_address = format!("{}:{}", args.address, args.port);

    let state = new_state(&args);

    for (os, path) in [("linux", &args.linux_script), ("windows", &args.windows_script)] {
        if path.is_file() {
            log::info!("{} launch script: {}", os, path.display());
        } else {
            log::warn!("{} launch script not found: {}", os, path.display());
        }
    }

    print_banner(&args);

    let app_state = state.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .configure(api::configure)
    })
    .bind(&bind_address)
    .with_context(|| format!("failed to bind {}", bind_address))?
    .disable_signals()
    .shutdown_timeout(5)
    .run();

    // 监视任务运行在 worker 上，必须先停游戏服务器再停 HTTP 服务
    let handle = server.handle();
    actix_rt::spawn(async move {
        shutdown_signal().await;
        log::info!("Shutdown signal received, stopping game server if running");
        state.supervisor.shutdown(SHUTDOWN_GRACE).await;
        handle.stop(true).await;
    });

    server.await.context("http server terminated with an error")?;
    log::info!("Modix supervisor stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn print_banner(args: &CommandArgs) {
    println!("╔═══════════════════════════════════════════════════════════╗");
    println!("║      Modix Supervisor v{:<35}║", env!("CARGO_PKG_VERSION"));
    println!("║      Game Server Process Control & Log Streaming          ║");
    println!("╚═══════════════════════════════════════════════════════════╝");
    println!();
    println!("🚀 Server starting on http://{}:{}", args.address, args.port);
    println!();
    println!("📋 Available endpoints:");
    println!("  POST   /start-server[?os=]     - Start the game server");
    println!("  POST   /stop-server            - Stop the game server");
    println!("  GET    /server-status          - Running / stopped");
    println!("  GET    /log-stream             - Live log stream (SSE)");
    println!("  GET    /logs                   - Buffered log lines");
    println!("  GET    /metrics                - Prometheus metrics");
    println!("  GET    /health                 - Health check");
    println!();
    println!("💡 Settings:");
    println!("  • Default OS: {}{}", args.default_os, if args.strict_os { " (strict)" } else { "" });
    println!("  • Log buffer: {} lines", args.log_capacity);
    println!("  • Keep-alive: {}s", args.keepalive_secs);
    println!("═══════════════════════════════════════════════════════════");
}
