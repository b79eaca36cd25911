use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::models::stats::ProcessStats;

/// 启动脚本对应的操作系统
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OsType {
    #[default]
    Linux,
    Windows,
}

impl OsType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OsType::Linux => "linux",
            OsType::Windows => "windows",
        }
    }
}

impl fmt::Display for OsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OsType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linux" => Ok(OsType::Linux),
            "windows" => Ok(OsType::Windows),
            other => Err(other.to_string()),
        }
    }
}

/// 注册表中活动进程所处的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ProcessPhase {
    Starting,
    Running,
    StoppingRequested,
}

/// 对外可见的监督器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SupervisorState {
    Stopped,
    Starting,
    Running,
    StoppingRequested,
}

impl SupervisorState {
    /// Dashboard 只认识 running / stopped 两种状态
    pub fn is_running(&self) -> bool {
        !matches!(self, SupervisorState::Stopped)
    }
}

impl From<Option<ProcessPhase>> for SupervisorState {
    fn from(phase: Option<ProcessPhase>) -> Self {
        match phase {
            None => SupervisorState::Stopped,
            Some(ProcessPhase::Starting) => SupervisorState::Starting,
            Some(ProcessPhase::Running) => SupervisorState::Running,
            Some(ProcessPhase::StoppingRequested) => SupervisorState::StoppingRequested,
        }
    }
}

/// 活动进程的只读快照（不含原生句柄）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInfo {
    pub run_id: u64,
    pub os: OsType,
    pub script: PathBuf,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
    pub phase: ProcessPhase,
}

/// `start` 成功后的返回值
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOutcome {
    pub run_id: u64,
    pub pid: Option<u32>,
    pub os: OsType,
    pub script: PathBuf,
}

/// `/server-status` 的响应体
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub status: &'static str,
    pub state: SupervisorState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<OsType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_secs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<ProcessStats>,
}

impl StatusReport {
    pub fn from_info(info: Option<&ProcessInfo>) -> Self {
        let state = SupervisorState::from(info.map(|i| i.phase));
        Self {
            status: if state.is_running() { "running" } else { "stopped" },
            state,
            pid: info.and_then(|i| i.pid),
            os: info.map(|i| i.os),
            started_at: info.map(|i| i.started_at),
            uptime_secs: info.map(|i| (Utc::now() - i.started_at).num_seconds()),
            stats: None,
        }
    }
}
