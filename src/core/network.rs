use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::core::clock::TimeControl;
use crate::core::error::ProtocolError;
use crate::core::game::{MoveRequest, Side};

/// Upper bound for a single frame. Real messages are a few dozen bytes.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Everything two peers ever say to each other. Encoded as JSON tagged by `type`.
/// No version field, no acknowledgement, no sequence numbers: ordering comes from
/// the underlying stream.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireMsg {
    /// First message in each direction. Carries the sender's own role; the acceptor's
    /// reply also carries the authoritative time control.
    Hello {
        role: Side,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        time_control: Option<TimeControl>,
    },
    Move {
        #[serde(rename = "move")]
        mv: MoveRequest,
    },
    /// Free-form chat, never interpreted.
    Message { text: String },
    Resign,
}

pub async fn write_frame<W>(writer: &mut W, msg: &WireMsg) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = serde_json::to_vec(msg).map_err(ProtocolError::Encode)?;
    if bytes.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(bytes.len()));
    }
    writer.write_u32(bytes.len() as u32).await?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame. `Ok(None)` is a clean end of stream between frames.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<WireMsg>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    serde_json::from_slice(&buf)
        .map(Some)
        .map_err(ProtocolError::Decode)
}

/// What the reader task reports to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Message(WireMsg),
    /// The stream ended or broke. Nothing follows.
    PeerLeft,
}

/// The session's view of an established channel: an outbox drained by a writer task
/// and an inbox filled by a reader task, both running on their own.
#[derive(Debug)]
pub struct PeerLink {
    outbox: mpsc::UnboundedSender<WireMsg>,
    inbox: mpsc::Receiver<LinkEvent>,
    writer: JoinHandle<()>,
}

impl PeerLink {
    pub fn spawn<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::spawn_with_settle(reader, writer, |_| async {})
    }

    /// Like [`PeerLink::spawn`], but once the outgoing stream is finished the writer
    /// is handed to `settle`, and [`PeerLink::shutdown`] only returns after it
    /// completes. Transports use it to wait until the peer holds the last frame.
    pub fn spawn_with_settle<R, W, F, Fut>(mut reader: R, mut writer: W, settle: F) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
        F: FnOnce(W) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (outbox, mut outbox_rx) = mpsc::unbounded_channel::<WireMsg>();
        let (inbox_tx, inbox) = mpsc::channel::<LinkEvent>(64);

        tokio::spawn(async move {
            loop {
                match read_frame(&mut reader).await {
                    Ok(Some(msg)) => {
                        if inbox_tx.send(LinkEvent::Message(msg)).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => {
                        debug!("peer stream finished");
                        break;
                    }
                    // Length-prefixed framing survives a bad payload; skip it.
                    Err(ProtocolError::Decode(e)) => {
                        warn!(error = %e, "dropping malformed frame");
                    }
                    Err(e) => {
                        warn!(error = %e, "peer stream failed");
                        break;
                    }
                }
            }
            let _ = inbox_tx.send(LinkEvent::PeerLeft).await;
        });

        let writer = tokio::spawn(async move {
            while let Some(msg) = outbox_rx.recv().await {
                if let Err(e) = write_frame(&mut writer, &msg).await {
                    warn!(error = %e, "failed to send frame");
                    return;
                }
            }
            if let Err(e) = writer.shutdown().await {
                debug!(error = %e, "failed to finish outgoing stream");
                return;
            }
            settle(writer).await;
        });

        Self {
            outbox,
            inbox,
            writer,
        }
    }

    /// Queues a message. Returns false once the writer has gone away.
    pub fn send(&self, msg: WireMsg) -> bool {
        self.outbox.send(msg).is_ok()
    }

    pub async fn recv(&mut self) -> Option<LinkEvent> {
        self.inbox.recv().await
    }

    /// Flushes everything queued so far, finishes the outgoing stream and waits
    /// for the transport to settle.
    pub async fn shutdown(self) {
        let PeerLink { outbox, writer, .. } = self;
        drop(outbox);
        let _ = writer.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_message_matches_the_wire_format() {
        let msg = WireMsg::Move {
            mv: MoveRequest::new("e7", "e8").with_promotion("q"),
        };
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "move", "move": {"from": "e7", "to": "e8", "promotion": "q"}})
        );

        let chat: WireMsg = serde_json::from_str(r#"{"type":"message","text":"gg"}"#).unwrap();
        assert_eq!(chat, WireMsg::Message { text: "gg".into() });

        let plain: WireMsg =
            serde_json::from_str(r#"{"type":"move","move":{"from":"e2","to":"e4"}}"#).unwrap();
        assert_eq!(plain, WireMsg::Move { mv: MoveRequest::new("e2", "e4") });
    }

    #[tokio::test]
    async fn frames_survive_a_stream() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        let hello = WireMsg::Hello {
            role: Side::White,
            name: Some("alice".into()),
            time_control: Some(TimeControl::new(3, 2)),
        };
        write_frame(&mut a, &hello).await.unwrap();
        write_frame(&mut a, &WireMsg::Resign).await.unwrap();
        drop(a);

        assert_eq!(read_frame(&mut b).await.unwrap(), Some(hello));
        assert_eq!(read_frame(&mut b).await.unwrap(), Some(WireMsg::Resign));
        assert_eq!(read_frame(&mut b).await.unwrap(), None);
    }

    #[tokio::test]
    async fn oversized_frames_are_rejected() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_u32(MAX_FRAME_LEN as u32 + 1).await.unwrap();
        let err = read_frame(&mut b).await.unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge(_)));
    }

    #[tokio::test]
    async fn link_relays_in_order_and_reports_departure() {
        let (left, right) = tokio::io::duplex(4096);
        let (left_r, left_w) = tokio::io::split(left);
        let (right_r, right_w) = tokio::io::split(right);
        let sender = PeerLink::spawn(left_r, left_w);
        let mut receiver = PeerLink::spawn(right_r, right_w);

        assert!(sender.send(WireMsg::Move { mv: MoveRequest::new("e2", "e4") }));
        assert!(sender.send(WireMsg::Message { text: "hi".into() }));
        sender.shutdown().await;

        assert_eq!(
            receiver.recv().await,
            Some(LinkEvent::Message(WireMsg::Move { mv: MoveRequest::new("e2", "e4") }))
        );
        assert_eq!(
            receiver.recv().await,
            Some(LinkEvent::Message(WireMsg::Message { text: "hi".into() }))
        );
        assert_eq!(receiver.recv().await, Some(LinkEvent::PeerLeft));
    }

    #[tokio::test]
    async fn shutdown_returns_only_after_the_peer_read_the_last_frame() {
        use tokio::sync::oneshot;

        let (ours, mut theirs) = tokio::io::duplex(64);
        let (r, w) = tokio::io::split(ours);

        let (drained_tx, drained_rx) = oneshot::channel::<Vec<WireMsg>>();
        let peer = tokio::spawn(async move {
            let mut got = Vec::new();
            while let Some(msg) = read_frame(&mut theirs).await.unwrap() {
                got.push(msg);
            }
            drained_tx.send(got).unwrap();
        });

        let (settled_tx, mut settled_rx) = oneshot::channel::<Vec<WireMsg>>();
        let link = PeerLink::spawn_with_settle(r, w, move |_writer| async move {
            let got = drained_rx.await.unwrap_or_default();
            let _ = settled_tx.send(got);
        });

        assert!(link.send(WireMsg::Message { text: "gg".into() }));
        assert!(link.send(WireMsg::Resign));
        link.shutdown().await;

        assert_eq!(
            settled_rx.try_recv().unwrap(),
            [WireMsg::Message { text: "gg".into() }, WireMsg::Resign]
        );
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn malformed_frames_are_skipped() {
        let (mut raw, theirs) = tokio::io::duplex(1024);
        let (r, w) = tokio::io::split(theirs);
        let mut link = PeerLink::spawn(r, w);

        let junk = b"{not json";
        raw.write_u32(junk.len() as u32).await.unwrap();
        raw.write_all(junk).await.unwrap();
        write_frame(&mut raw, &WireMsg::Resign).await.unwrap();

        assert_eq!(link.recv().await, Some(LinkEvent::Message(WireMsg::Resign)));
    }
}
