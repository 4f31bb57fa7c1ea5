//! Heartbeat fill during model think time.
//!
//! Large vision models can sit silent for tens of seconds before the first
//! token. The heartbeat task emits a `thinking` event every 3 seconds until
//! the first token arrives, walking an ordered list of reassurance messages
//! and sticking on the last one.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::event::GradeEvent;

/// Seconds between heartbeat messages.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(3);

/// Reassurance sequence for whole-page grading.
pub const WHOLE_PAGE_THINKING: &[&str] = &[
    "正在上传图片到 AI 模型...",
    "AI 正在观察作业整体布局...",
    "正在分析字的间架结构...",
    "正在评估笔画力度与走势...",
    "正在识别每个字的特征...",
    "正在对比标准字帖...",
    "正在撰写专业点评...",
    "AI 思考中，大型模型需要更多时间...",
    "即将完成，请再稍等片刻...",
];

/// Reassurance sequence for single-character grading.
pub const SINGLE_CHAR_THINKING: &[&str] = &[
    "正在上传图片到 AI 模型...",
    "AI 正在细察这个字的每一笔...",
    "正在分析结构比例...",
    "正在评估笔画力度...",
    "正在分析重心与间架...",
    "正在撰写深度点评...",
    "AI 思考中，请稍等...",
];

/// Spawn the heartbeat task.
///
/// The task exits as soon as `first_token` flips, the message channel
/// closes, or it is aborted. The caller should still abort the handle on
/// completion so the task does not linger for a final sleep.
pub fn spawn_heartbeat(
    events: UnboundedSender<GradeEvent>,
    first_token: Arc<AtomicBool>,
    messages: &'static [&'static str],
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut idx = 0usize;
        loop {
            tokio::time::sleep(HEARTBEAT_INTERVAL).await;
            if first_token.load(Ordering::SeqCst) {
                return;
            }
            let message = messages[idx.min(messages.len() - 1)];
            if events
                .send(GradeEvent::Thinking(message.to_owned()))
                .is_err()
            {
                return;
            }
            idx += 1;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn emits_every_three_seconds_until_flag() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let flag = Arc::new(AtomicBool::new(false));
        let handle = spawn_heartbeat(tx, flag.clone(), WHOLE_PAGE_THINKING);

        tokio::time::sleep(Duration::from_secs(10)).await;
        flag.store(true, Ordering::SeqCst);
        handle.await.unwrap();

        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            seen.push(event);
        }
        // 3 heartbeats fit into 10 seconds.
        assert_eq!(seen.len(), 3);
        assert_eq!(
            seen[0],
            GradeEvent::Thinking(WHOLE_PAGE_THINKING[0].to_owned())
        );
        assert_eq!(
            seen[2],
            GradeEvent::Thinking(WHOLE_PAGE_THINKING[2].to_owned())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn last_message_is_sticky() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let flag = Arc::new(AtomicBool::new(false));
        let messages: &[&str] = &["first", "last"];
        let handle = spawn_heartbeat(tx, flag.clone(), messages);

        tokio::time::sleep(Duration::from_secs(13)).await;
        flag.store(true, Ordering::SeqCst);
        handle.await.unwrap();

        let mut seen = Vec::new();
        while let Ok(GradeEvent::Thinking(msg)) = rx.try_recv() {
            seen.push(msg);
        }
        assert_eq!(seen, vec!["first", "last", "last", "last"]);
    }

    #[tokio::test(start_paused = true)]
    async fn flag_set_before_first_interval_emits_nothing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let flag = Arc::new(AtomicBool::new(true));
        let handle = spawn_heartbeat(tx, flag, WHOLE_PAGE_THINKING);
        handle.await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}
