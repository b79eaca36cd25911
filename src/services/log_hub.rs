use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use crate::metrics::METRICS;
use crate::models::{LogEntry, StreamEvent};
use crate::services::log_buffer::LogBuffer;

struct HubInner {
    buffer: LogBuffer,
    /// 当前被实时跟随的运行编号
    active_run: Option<u64>,
    subscribers: HashMap<u64, mpsc::UnboundedSender<StreamEvent>>,
}

/// 日志发布器：持有环形缓冲区，并把新日志转发给在线订阅者
///
/// 缓冲区追加与订阅登记在同一把锁内完成，所以
/// "先回放快照再跟随" 不会漏掉也不会重复任何一条日志。
pub struct LogHub {
    inner: Mutex<HubInner>,
    next_id: AtomicU64,
}

impl LogHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(HubInner {
                buffer: LogBuffer::new(capacity),
                active_run: None,
                subscribers: HashMap::new(),
            }),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 追加一条日志；stdout 与 stderr 的读取任务可以并发调用
    pub fn append(&self, entry: LogEntry) {
        METRICS
            .log_lines_total
            .with_label_values(&[entry.kind.as_str()])
            .inc();

        let mut inner = self.lock();
        inner.buffer.push(entry.clone());

        if inner.subscribers.is_empty() {
            return;
        }
        inner
            .subscribers
            .retain(|_, tx| tx.send(StreamEvent::Log(entry.clone())).is_ok());
        METRICS.log_subscribers.set(inner.subscribers.len() as f64);
    }

    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.lock().buffer.snapshot()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().buffer.len()
    }

    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    #[cfg(test)]
    pub fn active_run(&self) -> Option<u64> {
        self.lock().active_run
    }

    /// 新的进程开始运行，之后的订阅者会实时跟随它的输出
    pub fn open_run(&self, run_id: u64) {
        let mut inner = self.lock();
        if !inner.subscribers.is_empty() {
            log::warn!(
                "Dropping {} stale log subscribers before run {}",
                inner.subscribers.len(),
                run_id
            );
            inner.subscribers.clear();
        }
        inner.active_run = Some(run_id);
        METRICS.log_subscribers.set(0.0);
    }

    /// 进程退出：向所有订阅者发送结束事件并注销它们
    pub fn finish_run(&self, run_id: u64, exit_code: Option<i32>) {
        let mut inner = self.lock();
        if inner.active_run != Some(run_id) {
            log::debug!("Ignoring finish for inactive run {}", run_id);
            return;
        }
        inner.active_run = None;

        let subscribers = std::mem::take(&mut inner.subscribers);
        log::debug!(
            "Run {} finished, closing {} log subscribers",
            run_id,
            subscribers.len()
        );
        for tx in subscribers.into_values() {
            let _ = tx.send(StreamEvent::Finished { exit_code });
        }
        METRICS.log_subscribers.set(0.0);
    }

    /// 订阅日志流：返回当前快照，若有进程运行则同时登记实时通道
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.lock();
        let backlog = inner.buffer.snapshot();

        let receiver = if inner.active_run.is_some() {
            let (tx, rx) = mpsc::unbounded_channel();
            inner.subscribers.insert(id, tx);
            METRICS.log_subscribers.set(inner.subscribers.len() as f64);
            Some(rx)
        } else {
            None
        };
        drop(inner);

        log::debug!(
            "Log subscriber {} attached (backlog {}, live {})",
            id,
            backlog.len(),
            receiver.is_some()
        );

        Subscription {
            id,
            backlog,
            receiver,
            hub: Arc::clone(self),
        }
    }

    fn unsubscribe(&self, id: u64) {
        let mut inner = self.lock();
        if inner.subscribers.remove(&id).is_some() {
            METRICS.log_subscribers.set(inner.subscribers.len() as f64);
        }
    }
}

/// 一个客户端的订阅；drop 时自动从发布器注销
pub struct Subscription {
    id: u64,
    backlog: Vec<LogEntry>,
    receiver: Option<mpsc::UnboundedReceiver<StreamEvent>>,
    hub: Arc<LogHub>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 订阅时刻的缓冲区快照，只能取一次
    pub fn take_backlog(&mut self) -> Vec<LogEntry> {
        std::mem::take(&mut self.backlog)
    }

    /// 是否仍在跟随某个运行中的进程
    pub fn is_live(&self) -> bool {
        self.receiver.is_some()
    }

    /// 下一条实时事件；结束事件之后或没有实时通道时返回 `None`
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        let rx = self.receiver.as_mut()?;
        let event = rx.recv().await;
        if matches!(event, None | Some(StreamEvent::Finished { .. })) {
            self.receiver = None;
        }
        event
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        log::debug!("Log subscriber {} detached", self.id);
        self.hub.unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LogType;

    fn line(i: usize) -> LogEntry {
        LogEntry {
            text: format!("line {}", i),
            kind: LogType::Info,
        }
    }

    #[tokio::test]
    async fn idle_subscriber_gets_backlog_only() {
        let hub = Arc::new(LogHub::new(10));
        hub.append(line(0));
        hub.append(line(1));

        let mut sub = hub.subscribe();
        assert_eq!(sub.take_backlog(), vec![line(0), line(1)]);
        assert!(!sub.is_live());
        assert_eq!(sub.recv().await, None);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn live_subscriber_receives_appends_then_sentinel() {
        let hub = Arc::new(LogHub::new(10));
        hub.open_run(7);
        hub.append(line(0));

        let mut sub = hub.subscribe();
        assert_eq!(sub.take_backlog(), vec![line(0)]);
        assert!(sub.is_live());

        hub.append(line(1));
        hub.finish_run(7, Some(0));

        assert_eq!(sub.recv().await, Some(StreamEvent::Log(line(1))));
        assert_eq!(
            sub.recv().await,
            Some(StreamEvent::Finished { exit_code: Some(0) })
        );
        assert!(!sub.is_live());
        assert_eq!(sub.recv().await, None);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn staggered_subscribers_see_no_gap_and_no_duplicate() {
        let hub = Arc::new(LogHub::new(1000));
        hub.open_run(1);

        let total = 300;
        let join_points = [0, 1, 50, 123, 299];
        let mut subs = Vec::new();
        for i in 0..total {
            if join_points.contains(&i) {
                subs.push(hub.subscribe());
            }
            hub.append(line(i));
        }
        hub.finish_run(1, Some(0));

        for mut sub in subs {
            let mut seen = sub.take_backlog();
            while let Some(event) = sub.recv().await {
                match event {
                    StreamEvent::Log(entry) => seen.push(entry),
                    StreamEvent::Finished { .. } => break,
                }
            }
            let expected: Vec<_> = (0..total).map(line).collect();
            assert_eq!(seen, expected);
        }
    }

    #[tokio::test]
    async fn concurrent_appends_are_all_delivered() {
        let hub = Arc::new(LogHub::new(1000));
        hub.open_run(1);
        let mut sub = hub.subscribe();

        let mut tasks = Vec::new();
        for t in 0..4 {
            let hub = hub.clone();
            tasks.push(tokio::spawn(async move {
                for i in 0..50 {
                    hub.append(line(t * 1000 + i));
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        hub.finish_run(1, None);

        let mut per_task: HashMap<usize, Vec<usize>> = HashMap::new();
        while let Some(StreamEvent::Log(entry)) = sub.recv().await {
            let n: usize = entry.text.trim_start_matches("line ").parse().unwrap();
            per_task.entry(n / 1000).or_default().push(n % 1000);
        }
        assert_eq!(per_task.len(), 4);
        for seq in per_task.values() {
            assert_eq!(seq, &(0..50).collect::<Vec<_>>());
        }
        assert_eq!(hub.len(), 200);
    }

    #[tokio::test]
    async fn dropping_subscription_deregisters_it() {
        let hub = Arc::new(LogHub::new(10));
        hub.open_run(1);
        let a = hub.subscribe();
        let b = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 2);

        drop(a);
        assert_eq!(hub.subscriber_count(), 1);
        drop(b);
        assert_eq!(hub.subscriber_count(), 0);

        hub.append(line(0));
        assert_eq!(hub.len(), 1);
    }

    #[tokio::test]
    async fn finish_for_other_run_is_ignored() {
        let hub = Arc::new(LogHub::new(10));
        hub.open_run(2);
        let sub = hub.subscribe();

        hub.finish_run(1, Some(0));
        assert_eq!(hub.active_run(), Some(2));
        assert!(sub.is_live());
        assert_eq!(hub.subscriber_count(), 1);
    }
}
