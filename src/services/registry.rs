use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::{oneshot, watch};

use crate::error::SupervisorError;
use crate::models::{OsType, ProcessInfo, ProcessPhase};

struct ActiveProcess {
    info: ProcessInfo,
    /// 通知监视任务去终止子进程
    stop_trigger: Option<oneshot::Sender<()>>,
}

/// 进程句柄注册表：任何时刻最多一个活动进程
pub struct ProcessRegistry {
    slot: Mutex<Option<ActiveProcess>>,
    next_run: AtomicU64,
    /// 注册表清空时广播 false
    occupied: watch::Sender<bool>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        let (occupied, _) = watch::channel(false);
        Self {
            slot: Mutex::new(None),
            next_run: AtomicU64::new(1),
            occupied,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<ActiveProcess>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 原子地占用空槽位，返回本次运行编号
    pub fn try_reserve(&self, os: OsType, script: PathBuf) -> Result<u64, SupervisorError> {
        let mut slot = self.lock();
        if slot.is_some() {
            return Err(SupervisorError::AlreadyRunning);
        }

        let run_id = self.next_run.fetch_add(1, Ordering::Relaxed);
        *slot = Some(ActiveProcess {
            info: ProcessInfo {
                run_id,
                os,
                script,
                pid: None,
                started_at: Utc::now(),
                phase: ProcessPhase::Starting,
            },
            stop_trigger: None,
        });
        self.occupied.send_replace(true);
        Ok(run_id)
    }

    /// 子进程已成功启动
    pub fn mark_running(&self, run_id: u64, pid: Option<u32>, stop_trigger: oneshot::Sender<()>) {
        let mut slot = self.lock();
        match slot.as_mut() {
            Some(active) if active.info.run_id == run_id => {
                active.info.pid = pid;
                active.info.phase = ProcessPhase::Running;
                active.stop_trigger = Some(stop_trigger);
            }
            _ => log::warn!("Run {} is no longer registered, cannot mark running", run_id),
        }
    }

    /// 请求停止当前进程；实际的清理由退出事件完成
    pub fn request_stop(&self) -> Result<ProcessInfo, SupervisorError> {
        let mut slot = self.lock();
        let active = match slot.as_mut() {
            Some(active) if active.info.phase != ProcessPhase::Starting => active,
            _ => return Err(SupervisorError::NotRunning),
        };

        active.info.phase = ProcessPhase::StoppingRequested;
        if let Some(trigger) = active.stop_trigger.take() {
            let _ = trigger.send(());
        }
        Ok(active.info.clone())
    }

    /// 仅当槽位属于 `run_id` 时清空
    pub fn clear(&self, run_id: u64) -> bool {
        let mut slot = self.lock();
        match slot.as_ref() {
            Some(active) if active.info.run_id == run_id => {
                *slot = None;
                self.occupied.send_replace(false);
                true
            }
            _ => false,
        }
    }

    pub fn current(&self) -> Option<ProcessInfo> {
        self.lock().as_ref().map(|active| active.info.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }

    /// 订阅占用状态变化
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.occupied.subscribe()
    }
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::new()
    }
}
