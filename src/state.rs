use crate::cli::CommandArgs;
use crate::services::{LogHub, ProcessRegistry, ScriptResolver, StatsCollector, Supervisor};
use std::sync::Arc;
use std::time::Duration;

pub struct AppStateInner {
    pub supervisor: Supervisor,
    pub stats_collector: StatsCollector,
    /// SSE 空闲时的 keep-alive 间隔
    pub keepalive: Duration,
}

pub type AppState = Arc<AppStateInner>;

pub fn new_state(args: &CommandArgs) -> AppState {
    let resolver = ScriptResolver::new(&args.linux_script, &args.windows_script)
        .with_default_os(args.default_os)
        .strict(args.strict_os);
    let supervisor = Supervisor::new(
        resolver,
        Arc::new(ProcessRegistry::new()),
        Arc::new(LogHub::new(args.log_capacity as usize)),
    )
    .with_linux_shell(args.linux_shell.clone())
    .with_server_args(args.server_args.clone());

    Arc::new(AppStateInner {
        supervisor,
        stats_collector: StatsCollector::new(),
        keepalive: args.keepalive(),
    })
}
