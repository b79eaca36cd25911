use chrono::Local;
use serde::{Deserialize, Serialize};

/// 日志来源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
    /// 子进程 stdout
    Info,
    /// 子进程 stderr
    Error,
    /// 监督器自身产生的事件（启动、停止、退出码）
    System,
}

impl LogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogType::Info => "info",
            LogType::Error => "error",
            LogType::System => "system",
        }
    }
}

/// 一条带时间戳前缀的日志，创建后不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: LogType,
}

impl LogEntry {
    /// 使用当前本地时间加上 `[HH:MM:SS]` 前缀
    pub fn now(kind: LogType, line: &str) -> Self {
        Self {
            text: format!("[{}] {}", Local::now().format("%H:%M:%S"), line),
            kind,
        }
    }

    pub fn system(line: &str) -> Self {
        Self::now(LogType::System, line)
    }
}

/// 推送给订阅者的事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Log(LogEntry),
    /// 进程已退出，之后不会再有日志
    Finished { exit_code: Option<i32> },
}
