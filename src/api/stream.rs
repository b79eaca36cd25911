use actix_web::http::header;
use actix_web::{web, HttpResponse};
use futures_util::stream::{self, Stream};
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::models::{LogEntry, StreamEvent};
use crate::services::Subscription;
use crate::state::AppState;

/// 进程结束标记，日志查看器据此区分 "流结束" 与 "连接断开"
///
/// 不带 `event:` 名称，浏览器 EventSource 的 `onmessage` 才能收到。
pub const END_FRAME: &[u8] = b"data: [DONE]\n\n";
pub const KEEPALIVE_FRAME: &[u8] = b": keep-alive\n\n";

/// GET /log-stream
pub async fn log_stream(data: web::Data<AppState>) -> HttpResponse {
    let subscription = data.supervisor.hub().subscribe();
    log::debug!("SSE client attached as subscriber {}", subscription.id());

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(event_stream(subscription, data.keepalive))
}

struct StreamState {
    subscription: Subscription,
    backlog: std::vec::IntoIter<LogEntry>,
    keepalive: Interval,
}

/// 先回放快照，再跟随实时日志；空闲时输出 keep-alive 注释
///
/// 客户端断开时 actix 丢弃该流，`Subscription` 随之注销。
pub fn event_stream(
    mut subscription: Subscription,
    period: Duration,
) -> impl Stream<Item = Result<web::Bytes, actix_web::Error>> {
    let backlog = subscription.take_backlog().into_iter();
    let mut keepalive = interval_at(Instant::now() + period, period);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let state = StreamState {
        subscription,
        backlog,
        keepalive,
    };

    stream::unfold(state, |mut st| async move {
        if let Some(entry) = st.backlog.next() {
            return Some((Ok(entry_frame(&entry)), st));
        }

        let frame = if st.subscription.is_live() {
            tokio::select! {
                event = st.subscription.recv() => match event {
                    Some(StreamEvent::Log(entry)) => {
                        st.keepalive.reset();
                        entry_frame(&entry)
                    }
                    Some(StreamEvent::Finished { exit_code }) => {
                        log::debug!(
                            "Subscriber {} reached end of run (exit code {:?})",
                            st.subscription.id(),
                            exit_code
                        );
                        web::Bytes::from_static(END_FRAME)
                    }
                    None => web::Bytes::from_static(KEEPALIVE_FRAME),
                },
                _ = st.keepalive.tick() => web::Bytes::from_static(KEEPALIVE_FRAME),
            }
        } else {
            st.keepalive.tick().await;
            web::Bytes::from_static(KEEPALIVE_FRAME)
        };

        Some((Ok(frame), st))
    })
}

fn entry_frame(entry: &LogEntry) -> web::Bytes {
    match serde_json::to_string(entry) {
        Ok(json) => web::Bytes::from(format!("data: {}\n\n", json)),
        Err(e) => {
            log::warn!("Failed to serialize log entry: {}", e);
            web::Bytes::from_static(KEEPALIVE_FRAME)
        }
    }
}
