use futures_util::{Sink, SinkExt};
use std::borrow::Cow;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, warn};

use crate::domain::message::OutboundEvent;
use crate::registry::DoneSignal;

/// 写循环参数 / Write loop tunables
#[derive(Clone, Copy, Debug)]
pub struct WriteLoopConfig {
    pub ping_interval: Duration,
    pub write_timeout: Duration,
}

/// 写循环：排空出站队列并定期发送 Ping；结束信号触发后发送 Close 帧
/// Write loop: drains the outbound queue and pings on a fixed interval; once the
/// done signal fires it sends a Close frame and stops
///
/// 写失败或写超时同样会关闭结束信号，使读循环一并退出。
/// A failed or timed-out write also closes the done signal so the read loop exits too.
pub async fn write_loop<S>(
    mut sink: S,
    mut outbound: mpsc::Receiver<OutboundEvent>,
    done: DoneSignal,
    config: WriteLoopConfig,
    identity: String,
) where
    S: Sink<Message, Error = WsError> + Unpin,
{
    let mut ticker = tokio::time::interval_at(
        Instant::now() + config.ping_interval,
        config.ping_interval,
    );

    loop {
        let frame = tokio::select! {
            biased;
            _ = done.closed() => break,
            item = outbound.recv() => match item {
                Some(event) => match serde_json::to_string(&event) {
                    Ok(text) => Message::Text(text),
                    Err(e) => {
                        warn!("failed to encode outbound event for {}: {}", identity, e);
                        continue;
                    }
                },
                None => break,
            },
            _ = ticker.tick() => Message::Ping(Vec::new()),
        };

        match timeout(config.write_timeout, sink.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!("write to {} failed: {}", identity, e);
                done.close();
                return;
            }
            Err(_) => {
                warn!("⏱️ write to {} timed out", identity);
                done.close();
                return;
            }
        }
    }

    let close = Message::Close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: Cow::Borrowed("connection closed"),
    }));
    // 对端可能已先行关闭，结果忽略 / the peer may already be gone
    let _ = timeout(config.write_timeout, sink.send(close)).await;
    let _ = timeout(config.write_timeout, sink.close()).await;
    debug!("🔒 write loop for {} finished", identity);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::{AckStatus, Acknowledgement};
    use std::pin::Pin;

    type FrameSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;

    /// 把写出的帧转入无界队列，便于断言 / Route written frames into a queue the test reads
    fn frame_sink() -> (FrameSink, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = futures_util::sink::unfold(tx, |tx, frame: Message| async move {
            tx.send(frame).map_err(|_| WsError::ConnectionClosed)?;
            Ok::<_, WsError>(tx)
        });
        (Box::pin(sink), rx)
    }

    fn config() -> WriteLoopConfig {
        WriteLoopConfig {
            ping_interval: Duration::from_secs(3600),
            write_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_drains_queue_then_closes_on_done() {
        let (sink, mut frames) = frame_sink();
        let (tx, rx) = mpsc::channel(4);
        let done = DoneSignal::new();
        let task = tokio::spawn(write_loop(sink, rx, done.clone(), config(), "alice".into()));

        tx.send(Acknowledgement::delivered("m1", AckStatus::Sent, None).into())
            .await
            .unwrap();
        match frames.recv().await.unwrap() {
            Message::Text(text) => {
                let json: serde_json::Value = serde_json::from_str(&text).unwrap();
                assert_eq!(json["message_id"], "m1");
                assert_eq!(json["status"], "sent");
            }
            other => panic!("unexpected frame {:?}", other),
        }

        done.close();
        task.await.unwrap();
        assert!(matches!(frames.recv().await, Some(Message::Close(Some(_)))));
    }

    #[tokio::test]
    async fn test_pings_on_interval() {
        let (sink, mut frames) = frame_sink();
        let (_tx, rx) = mpsc::channel(4);
        let done = DoneSignal::new();
        let cfg = WriteLoopConfig {
            ping_interval: Duration::from_millis(20),
            write_timeout: Duration::from_secs(1),
        };
        let task = tokio::spawn(write_loop(sink, rx, done.clone(), cfg, "alice".into()));

        assert!(matches!(frames.recv().await, Some(Message::Ping(_))));
        done.close();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_write_failure_closes_done() {
        let (sink, frames) = frame_sink();
        drop(frames);
        let (tx, rx) = mpsc::channel(4);
        let done = DoneSignal::new();
        let task = tokio::spawn(write_loop(sink, rx, done.clone(), config(), "alice".into()));

        tx.send(Acknowledgement::delivered("m1", AckStatus::Sent, None).into())
            .await
            .unwrap();
        task.await.unwrap();
        assert!(done.is_closed());
    }
}
