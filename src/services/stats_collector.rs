use crate::models::ProcessStats;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use std::sync::Mutex;

/// 对受监督的游戏服务器进程做资源采样
pub struct StatsCollector {
    system: Mutex<System>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    pub fn collect_stats(&self, pid: u32) -> Option<ProcessStats> {
        let mut sys = self.system.lock().ok()?;

        let sysinfo_pid = Pid::from_u32(pid);
        sys.refresh_memory();
        sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[sysinfo_pid]),
            true,
            ProcessRefreshKind::everything(),
        );

        let process = sys.process(sysinfo_pid)?;
        let total_memory = sys.total_memory();

        Some(ProcessStats {
            cpu_usage: process.cpu_usage(),
            memory_bytes: process.memory(),
            memory_percent: if total_memory > 0 {
                (process.memory() as f32 / total_memory as f32) * 100.0
            } else {
                0.0
            },
            virtual_memory_bytes: process.virtual_memory(),
            disk_read_bytes: process.disk_usage().total_read_bytes,
            disk_written_bytes: process.disk_usage().total_written_bytes,
        })
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}
