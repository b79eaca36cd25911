use serde::Serialize;

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStats {
    /// CPU 使用率 (百分比，0-100 * 核数)
    pub cpu_usage: f32,

    /// 内存使用量 (字节)
    pub memory_bytes: u64,

    /// 内存使用率 (百分比，0-100)
    pub memory_percent: f32,

    /// 虚拟内存使用量 (字节)
    pub virtual_memory_bytes: u64,

    /// 磁盘读取字节数
    pub disk_read_bytes: u64,

    /// 磁盘写入字节数
    pub disk_written_bytes: u64,
}

impl ProcessStats {
    /// 判断是否有有效数据
    pub fn is_valid(&self) -> bool {
        self.cpu_usage > 0.0 || self.memory_bytes > 0
    }
}
