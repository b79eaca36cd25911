use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::SupervisorError;
use crate::metrics::METRICS;
use crate::models::{LogEntry, LogType, OsType, ProcessInfo, StartOutcome, StatusReport};
use crate::services::log_hub::LogHub;
use crate::services::registry::ProcessRegistry;
use crate::services::script_resolver::{ResolvedScript, ScriptResolver};

/// 进程退出后等待输出读取任务收尾的最长时间
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// 单行最大字节数，超长的行被切成多条日志
const MAX_LINE_BYTES: u64 = 16 * 1024;

/// 游戏服务器进程监督器
///
/// 负责启动/停止唯一的子进程，把 stdout/stderr 写入日志发布器，
/// 并在进程退出时清理注册表。
pub struct Supervisor {
    resolver: ScriptResolver,
    registry: Arc<ProcessRegistry>,
    hub: Arc<LogHub>,
    linux_shell: String,
    server_args: Vec<String>,
}

impl Supervisor {
    pub fn new(resolver: ScriptResolver, registry: Arc<ProcessRegistry>, hub: Arc<LogHub>) -> Self {
        Self {
            resolver,
            registry,
            hub,
            linux_shell: "sh".to_string(),
            server_args: Vec::new(),
        }
    }

    /// Linux 下用来执行启动脚本的 shell
    pub fn with_linux_shell(mut self, shell: impl Into<String>) -> Self {
        self.linux_shell = shell.into();
        self
    }

    pub fn with_server_args(mut self, args: Vec<String>) -> Self {
        self.server_args = args;
        self
    }

    pub fn hub(&self) -> &Arc<LogHub> {
        &self.hub
    }

    pub fn registry(&self) -> &Arc<ProcessRegistry> {
        &self.registry
    }

    #[cfg(test)]
    pub fn state(&self) -> crate::models::SupervisorState {
        crate::models::SupervisorState::from(self.registry.current().map(|info| info.phase))
    }

    pub fn status(&self) -> StatusReport {
        StatusReport::from_info(self.registry.current().as_ref())
    }

    /// 启动游戏服务器；子进程创建成功即返回，不等待服务就绪
    ///
    /// 必须在 tokio 运行时内调用。
    pub fn start(&self, selector: Option<&str>) -> Result<StartOutcome, SupervisorError> {
        let result = self.try_start(selector);
        let label = match &result {
            Ok(_) => "success",
            Err(SupervisorError::AlreadyRunning) => "already_running",
            Err(SupervisorError::ScriptNotFound(_)) => "script_not_found",
            Err(SupervisorError::UnsupportedOs(_)) => "unsupported_os",
            Err(_) => "spawn_error",
        };
        METRICS.server_starts_total.with_label_values(&[label]).inc();
        result
    }

    fn try_start(&self, selector: Option<&str>) -> Result<StartOutcome, SupervisorError> {
        if !self.registry.is_empty() {
            return Err(SupervisorError::AlreadyRunning);
        }

        let resolved = self.resolver.resolve(selector)?;
        if !resolved.path.is_file() {
            log::warn!("Launch script missing: {}", resolved.path.display());
            return Err(SupervisorError::ScriptNotFound(resolved.path));
        }

        let run_id = self.registry.try_reserve(resolved.os, resolved.path.clone())?;
        log::info!(
            "Starting {} server (run {}) using {}",
            resolved.os,
            run_id,
            resolved.path.display()
        );

        let mut child = match self.launch_command(&resolved).spawn() {
            Ok(child) => child,
            Err(e) => {
                log::error!("Failed to spawn {}: {}", resolved.path.display(), e);
                self.registry.clear(run_id);
                return Err(SupervisorError::Spawn(e));
            }
        };
        let pid = child.id();

        self.hub.open_run(run_id);
        self.hub.append(LogEntry::system(&format!(
            "Starting {} server using {}",
            resolved.os,
            resolved.path.display()
        )));

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_line_reader(stdout, LogType::Info, self.hub.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_line_reader(stderr, LogType::Error, self.hub.clone()));
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        self.registry.mark_running(run_id, pid, stop_tx);
        METRICS.server_up.set(1.0);
        log::info!("Server process spawned (run {}, pid {:?})", run_id, pid);

        tokio::spawn(monitor_exit(
            child,
            stop_rx,
            readers,
            run_id,
            self.registry.clone(),
            self.hub.clone(),
        ));

        Ok(StartOutcome {
            run_id,
            pid,
            os: resolved.os,
            script: resolved.path,
        })
    }

    fn launch_command(&self, resolved: &ResolvedScript) -> Command {
        let mut cmd = match resolved.os {
            OsType::Linux => Command::new(&self.linux_shell),
            OsType::Windows => {
                let mut cmd = Command::new("cmd");
                cmd.arg("/C");
                cmd
            }
        };
        cmd.arg(&resolved.path).args(&self.server_args);

        if let Some(dir) = resolved.path.parent() {
            cmd.current_dir(dir);
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    /// 发送终止信号；状态在进程真正退出后才变为 Stopped
    pub fn stop(&self) -> Result<ProcessInfo, SupervisorError> {
        let info = self.registry.request_stop()?;
        log::info!("Stop requested for run {} (pid {:?})", info.run_id, info.pid);
        self.hub
            .append(LogEntry::system("Stop requested, sending termination signal"));
        Ok(info)
    }

    /// 等待注册表清空，超时返回 false
    pub async fn wait_stopped(&self, timeout: Duration) -> bool {
        let mut rx = self.registry.watch();
        let stopped = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|occupied| !*occupied)).await,
            Ok(Ok(_))
        );
        stopped
    }

    /// 宿主服务退出前停止仍在运行的子进程
    pub async fn shutdown(&self, grace: Duration) {
        if self.stop().is_err() {
            return;
        }
        if !self.wait_stopped(grace).await {
            log::warn!("Server process did not exit within {:?}", grace);
        }
    }
}

/// 按行读取子进程输出，非 UTF-8 字节做有损解码
///
/// 没有换行的超长输出按 `MAX_LINE_BYTES` 分段，缓冲区不会无限增长。
fn spawn_line_reader(
    stream: impl AsyncRead + Unpin + Send + 'static,
    kind: LogType,
    hub: Arc<LogHub>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf: Vec<u8> = Vec::with_capacity(1024);

        loop {
            buf.clear();
            match (&mut reader).take(MAX_LINE_BYTES).read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    if buf.last() == Some(&b'\n') {
                        buf.pop();
                    }
                    if buf.last() == Some(&b'\r') {
                        buf.pop();
                    }

                    let line = String::from_utf8_lossy(&buf);
                    if line.trim().is_empty() {
                        continue;
                    }
                    hub.append(LogEntry::now(kind, &line));
                }
                Err(e) => {
                    log::debug!("{} reader exiting after read error: {}", kind.as_str(), e);
                    break;
                }
            }
        }

        log::debug!("{} reader task exiting", kind.as_str());
    })
}

async fn monitor_exit(
    mut child: Child,
    stop_rx: oneshot::Receiver<()>,
    readers: Vec<JoinHandle<()>>,
    run_id: u64,
    registry: Arc<ProcessRegistry>,
    hub: Arc<LogHub>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        requested = stop_rx => {
            if requested.is_ok() {
                terminate(&mut child);
            }
            child.wait().await
        }
    };

    // 孙进程可能继承了管道，不能无限等待 EOF
    let aborts: Vec<_> = readers.iter().map(|r| r.abort_handle()).collect();
    if tokio::time::timeout(DRAIN_TIMEOUT, join_all(readers)).await.is_err() {
        log::debug!("Output readers for run {} did not finish, aborting", run_id);
        for abort in aborts {
            abort.abort();
        }
    }

    let exit_code = status.as_ref().ok().and_then(|s| s.code());
    let message = match &status {
        Ok(status) => describe_exit(status),
        Err(e) => format!("Failed to wait for server process: {}", e),
    };
    log::info!("Run {}: {}", run_id, message);

    hub.append(LogEntry::system(&message));
    hub.finish_run(run_id, exit_code);
    registry.clear(run_id);

    METRICS.server_up.set(0.0);
    METRICS.server_exits_total.inc();
}

fn describe_exit(status: &ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("Server process exited with code {}", code);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("Server process terminated by signal {}", signal);
        }
    }

    "Server process exited without an exit code".to_string()
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };
    if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        // ESRCH: 已经退出
        if e != nix::errno::Errno::ESRCH {
            log::warn!("Failed to send SIGTERM to pid {}: {}", pid, e);
        }
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        log::warn!("Failed to terminate server process: {}", e);
    }
}
