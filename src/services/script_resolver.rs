use std::path::{Path, PathBuf};

use crate::error::SupervisorError;
use crate::models::OsType;

/// 解析结果：目标系统 + 绝对脚本路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedScript {
    pub os: OsType,
    pub path: PathBuf,
}

/// 把 os 选择器映射到磁盘上的启动脚本
///
/// 不访问文件系统，存在性检查由 supervisor 负责。
#[derive(Debug, Clone)]
pub struct ScriptResolver {
    linux: PathBuf,
    windows: PathBuf,
    default_os: OsType,
    strict: bool,
}

impl ScriptResolver {
    pub fn new(linux: impl Into<PathBuf>, windows: impl Into<PathBuf>) -> Self {
        Self {
            linux: linux.into(),
            windows: windows.into(),
            default_os: OsType::Linux,
            strict: false,
        }
    }

    pub fn with_default_os(mut self, os: OsType) -> Self {
        self.default_os = os;
        self
    }

    /// 严格模式下未知选择器返回 `UnsupportedOs`，否则回退到 linux
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn resolve(&self, selector: Option<&str>) -> Result<ResolvedScript, SupervisorError> {
        let os = match selector.map(str::trim).filter(|s| !s.is_empty()) {
            None => self.default_os,
            Some(raw) => match raw.parse::<OsType>() {
                Ok(os) => os,
                Err(_) if self.strict => {
                    return Err(SupervisorError::UnsupportedOs(raw.to_string()));
                }
                Err(_) => {
                    log::warn!("Unrecognized os selector '{}', falling back to linux", raw);
                    OsType::Linux
                }
            },
        };

        let path = match os {
            OsType::Linux => &self.linux,
            OsType::Windows => &self.windows,
        };

        Ok(ResolvedScript {
            os,
            path: absolutize(path),
        })
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
