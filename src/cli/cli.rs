use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::models::OsType;

/// Modix Supervisor - 游戏服务器进程监督与日志推送
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// 监听端口
    #[arg(short, long, env = "PORT", default_value_t = 3001)]
    pub port: u16,

    /// 监听地址
    #[arg(short = 'a', long, env = "ADDRESS", default_value = "0.0.0.0")]
    pub address: String,

    /// Linux 启动脚本
    #[arg(long, env = "MODIX_LINUX_SCRIPT", default_value = "/opt/pzserver/start-server.sh")]
    pub linux_script: PathBuf,

    /// Windows 启动脚本
    #[arg(long, env = "MODIX_WINDOWS_SCRIPT", default_value = r"C:\PZServer\StartServer64.bat")]
    pub windows_script: PathBuf,

    /// Linux 下执行启动脚本的 shell
    #[arg(long, env = "MODIX_LINUX_SHELL", default_value = "sh")]
    pub linux_shell: String,

    /// 未指定 os 时使用的系统
    #[arg(long, env = "MODIX_DEFAULT_OS", default_value = "linux", value_parser = parse_os)]
    pub default_os: OsType,

    /// 拒绝无法识别的 os 参数，而不是回退到 linux
    #[arg(long, env = "MODIX_STRICT_OS")]
    pub strict_os: bool,

    /// 日志环形缓冲区容量
    #[arg(long, env = "MODIX_LOG_CAPACITY", default_value_t = 500,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub log_capacity: u64,

    /// 空闲时 SSE keep-alive 间隔（秒）
    #[arg(long, env = "MODIX_KEEPALIVE_SECS", default_value_t = 10,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub keepalive_secs: u64,

    /// 追加到启动脚本后的参数，可重复
    #[arg(long = "server-arg", env = "MODIX_SERVER_ARGS", value_delimiter = ',',
          allow_hyphen_values = true)]
    pub server_args: Vec<String>,
}

impl CommandArgs {
    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }
}

fn parse_os(value: &str) -> Result<OsType, String> {
    value
        .parse()
        .map_err(|other| format!("unknown os '{}', expected linux or windows", other))
}
