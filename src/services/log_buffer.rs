use std::collections::VecDeque;

use crate::models::LogEntry;

/// 日志环形缓冲区默认容量
pub const DEFAULT_LOG_CAPACITY: usize = 500;

/// 固定容量的 FIFO 日志缓冲区，满了之后淘汰最旧的条目
///
/// 本身不加锁，由 `LogHub` 在互斥锁内持有。
#[derive(Debug)]
pub struct LogBuffer {
    lines: VecDeque<LogEntry>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: LogEntry) {
        if self.lines.len() >= self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(entry);
    }

    /// 当前所有条目的拷贝，最旧的在前
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.lines.iter().cloned().collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[cfg(test)]
    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LogType;

    fn entry(i: usize) -> LogEntry {
        LogEntry {
            text: format!("line {}", i),
            kind: LogType::Info,
        }
    }

    #[test]
    fn keeps_most_recent_entries_in_order() {
        let mut buffer = LogBuffer::default();
        for i in 0..1234 {
            buffer.push(entry(i));
            assert!(buffer.len() <= DEFAULT_LOG_CAPACITY);
        }

        let snapshot = buffer.snapshot();
        assert_eq!(snapshot.len(), DEFAULT_LOG_CAPACITY);
        assert_eq!(snapshot.first().unwrap().text, "line 734");
        assert_eq!(snapshot.last().unwrap().text, "line 1233");
        for (offset, e) in snapshot.iter().enumerate() {
            assert_eq!(e.text, format!("line {}", 734 + offset));
        }
    }

    #[test]
    fn below_capacity_keeps_everything() {
        let mut buffer = LogBuffer::new(3);
        buffer.push(entry(0));
        buffer.push(entry(1));
        assert_eq!(buffer.snapshot(), vec![entry(0), entry(1)]);
    }

    #[test]
    fn evicts_exactly_one_per_push_when_full() {
        let mut buffer = LogBuffer::new(2);
        buffer.push(entry(0));
        buffer.push(entry(1));
        buffer.push(entry(2));
        assert_eq!(buffer.snapshot(), vec![entry(1), entry(2)]);
    }

    #[test]
    fn snapshot_is_independent_copy() {
        let mut buffer = LogBuffer::new(4);
        buffer.push(entry(0));
        let snapshot = buffer.snapshot();
        buffer.push(entry(1));
        buffer.clear();
        assert_eq!(snapshot, vec![entry(0)]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut buffer = LogBuffer::new(0);
        buffer.push(entry(0));
        buffer.push(entry(1));
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.snapshot(), vec![entry(1)]);
    }
}
