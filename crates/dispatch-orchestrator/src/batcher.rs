use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::warn;

/// Flush when this many lines are buffered.
const MAX_LINES: usize = 5;
/// Flush after this much time has elapsed since the first buffered line.
const FLUSH_DELAY: Duration = Duration::from_millis(500);
/// Minimum gap enforced between consecutive sends to the chat API.
const MIN_SEND_INTERVAL: Duration = Duration::from_millis(200);

enum BatcherMsg {
    Push(String),
    Destroy,
}

/// Per-channel output relay (spec §4.5.6). Absorbs a high-frequency line
/// stream from a Job's `onMessage` callback and emits consolidated
/// messages to `sender` under the flush/rate-limit constraints above.
///
/// Runs its own background task so `push` never blocks the caller and a
/// slow/failing `sender` never stalls Job processing.
pub struct MessageBatcher {
    tx: mpsc::UnboundedSender<BatcherMsg>,
}

impl MessageBatcher {
    pub fn new<F>(sender: F) -> Self
    where
        F: Fn(&str) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(rx, sender));
        Self { tx }
    }

    /// Queue a line for the channel's next flush. Silently dropped if the
    /// batcher has already been destroyed.
    pub fn push(&self, line: impl Into<String>) {
        let _ = self.tx.send(BatcherMsg::Push(line.into()));
    }

    /// Flush whatever is buffered and stop the background task. No further
    /// flushes occur after this call returns — the task exits and drops
    /// its timer (spec §4.5.6, "no leaked timers after shutdown").
    pub fn destroy(&self) {
        let _ = self.tx.send(BatcherMsg::Destroy);
    }
}

async fn run<F>(mut rx: mpsc::UnboundedReceiver<BatcherMsg>, sender: F)
where
    F: Fn(&str) -> std::result::Result<(), String> + Send + Sync + 'static,
{
    let mut buffer: Vec<String> = Vec::new();
    let mut first_buffered_at: Option<Instant> = None;

    loop {
        let deadline = first_buffered_at.map(|at| at + FLUSH_DELAY);
        let timer = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            msg = rx.recv() => {
                match msg {
                    Some(BatcherMsg::Push(line)) => {
                        if buffer.is_empty() {
                            first_buffered_at = Some(Instant::now());
                        }
                        buffer.push(line);
                        if buffer.len() >= MAX_LINES {
                            flush(&sender, &mut buffer).await;
                            first_buffered_at = None;
                        }
                    }
                    Some(BatcherMsg::Destroy) => {
                        if !buffer.is_empty() {
                            flush(&sender, &mut buffer).await;
                        }
                        break;
                    }
                    None => break,
                }
            }
            _ = timer => {
                flush(&sender, &mut buffer).await;
                first_buffered_at = None;
            }
        }
    }
}

async fn flush<F>(sender: &F, buffer: &mut Vec<String>)
where
    F: Fn(&str) -> std::result::Result<(), String> + Send + Sync + 'static,
{
    if buffer.is_empty() {
        return;
    }
    let text = buffer.join("\n");
    buffer.clear();
    if let Err(err) = sender(&text) {
        warn!(error = %err, "chat relay send failed");
    }
    tokio::time::sleep(MIN_SEND_INTERVAL).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn collecting_sender() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> std::result::Result<(), String> + Send + Sync + 'static) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sent2 = sent.clone();
        let sender = move |text: &str| {
            sent2.lock().expect("poisoned").push(text.to_string());
            Ok(())
        };
        (sent, sender)
    }

    #[tokio::test]
    async fn flushes_at_max_lines() {
        let (sent, sender) = collecting_sender();
        let batcher = MessageBatcher::new(sender);
        for i in 0..MAX_LINES {
            batcher.push(format!("line {i}"));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sent.lock().expect("poisoned").len(), 1);
    }

    #[tokio::test]
    async fn flushes_after_delay_with_fewer_than_max_lines() {
        let (sent, sender) = collecting_sender();
        let batcher = MessageBatcher::new(sender);
        batcher.push("only one line");
        tokio::time::sleep(FLUSH_DELAY + Duration::from_millis(100)).await;
        let flushed = sent.lock().expect("poisoned").clone();
        assert_eq!(flushed, vec!["only one line".to_string()]);
    }

    #[tokio::test]
    async fn destroy_flushes_pending_and_stops() {
        let (sent, sender) = collecting_sender();
        let batcher = MessageBatcher::new(sender);
        batcher.push("last words");
        batcher.destroy();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sent.lock().expect("poisoned").clone(), vec!["last words".to_string()]);

        // Pushes after destroy are silently dropped — no further flush.
        batcher.push("should never arrive");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sent.lock().expect("poisoned").len(), 1);
    }

    #[tokio::test]
    async fn send_failure_is_swallowed_and_future_pushes_still_work() {
        let attempt = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let attempt2 = attempt.clone();
        let sender = move |_: &str| {
            let n = attempt2.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if n == 0 {
                Err("boom".to_string())
            } else {
                Ok(())
            }
        };
        let batcher = MessageBatcher::new(sender);
        batcher.push("first batch triggers failure");
        tokio::time::sleep(FLUSH_DELAY + Duration::from_millis(100)).await;
        batcher.push("second batch should still flush");
        tokio::time::sleep(FLUSH_DELAY + MIN_SEND_INTERVAL + Duration::from_millis(200)).await;
        assert_eq!(attempt.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
