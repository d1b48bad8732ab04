use iroh::endpoint::{Connection, Endpoint, RecvStream, SendStream};
use iroh::EndpointId;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::core::clock::TimeControl;
use crate::core::error::ConnectionError;
use crate::core::game::Side;
use crate::core::network::{read_frame, write_frame, PeerLink, WireMsg};

pub const ALPN: &[u8] = b"lanchess/0";

/// Default bound on dial + handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

/// How long a closing side waits for the peer to read its last frames.
pub const CLOSE_LINGER: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Idle,
    Advertising,
    Connecting,
    Connected,
    Closed,
    Errored,
}

/// Roles depend only on who dialed: the initiator plays Black, the acceptor White.
pub fn role_for(initiated: bool) -> Side {
    if initiated {
        Side::Black
    } else {
        Side::White
    }
}

/// What both sides agreed on during the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub role: Side,
    pub time_control: TimeControl,
    pub peer_name: Option<String>,
}

/// Rejects empty or malformed ids before anything touches the network.
pub fn validate_peer_id(raw: &str) -> Result<EndpointId, ConnectionError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConnectionError::InvalidPeerId {
            id: raw.to_string(),
            reason: "empty".into(),
        });
    }
    trimmed
        .parse::<EndpointId>()
        .map_err(|e| ConnectionError::InvalidPeerId {
            id: raw.to_string(),
            reason: e.to_string(),
        })
}

/// Initiator side: announce ourselves as Black, then adopt the acceptor's time control.
pub async fn handshake_initiator<R, W>(
    reader: &mut R,
    writer: &mut W,
    name: Option<String>,
) -> Result<Handshake, ConnectionError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let role = role_for(true);
    write_frame(
        writer,
        &WireMsg::Hello {
            role,
            name,
            time_control: None,
        },
    )
    .await?;

    match read_frame(reader).await? {
        Some(WireMsg::Hello {
            role: peer_role,
            name,
            time_control,
        }) => {
            if peer_role != role.opponent() {
                return Err(ConnectionError::handshake(format!(
                    "peer claimed {peer_role}, but the acceptor plays {}",
                    role.opponent()
                )));
            }
            let time_control = time_control
                .ok_or_else(|| ConnectionError::handshake("acceptor sent no time control"))?;
            Ok(Handshake {
                role,
                time_control,
                peer_name: name,
            })
        }
        Some(other) => Err(ConnectionError::handshake(format!(
            "expected hello, got {other:?}"
        ))),
        None => Err(ConnectionError::handshake("peer closed during handshake")),
    }
}

/// Acceptor side: check the initiator's claim, reply as White with the time control.
pub async fn handshake_acceptor<R, W>(
    reader: &mut R,
    writer: &mut W,
    time_control: TimeControl,
    name: Option<String>,
) -> Result<Handshake, ConnectionError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let role = role_for(false);
    let peer_name = match read_frame(reader).await? {
        Some(WireMsg::Hello {
            role: peer_role,
            name,
            ..
        }) => {
            if peer_role != role.opponent() {
                return Err(ConnectionError::handshake(format!(
                    "initiator claimed {peer_role}, but the initiator plays {}",
                    role.opponent()
                )));
            }
            name
        }
        Some(other) => {
            return Err(ConnectionError::handshake(format!(
                "expected hello, got {other:?}"
            )))
        }
        None => return Err(ConnectionError::handshake("peer closed during handshake")),
    };

    write_frame(
        writer,
        &WireMsg::Hello {
            role,
            name,
            time_control: Some(time_control),
        },
    )
    .await?;

    Ok(Handshake {
        role,
        time_control,
        peer_name,
    })
}

type Established = (Connection, SendStream, RecvStream, Handshake);

/// Owns the iroh endpoint and the single peer connection of a session.
pub struct ConnectionManager {
    status: ConnectionStatus,
    endpoint: Option<Endpoint>,
    conn: Option<Connection>,
    handshake_timeout: Duration,
}

impl ConnectionManager {
    pub fn new(handshake_timeout: Duration) -> Self {
        Self {
            status: ConnectionStatus::Idle,
            endpoint: None,
            conn: None,
            handshake_timeout,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Binds the local endpoint and returns the id to share out of band.
    pub async fn initialize(&mut self) -> Result<EndpointId, ConnectionError> {
        let bound = Endpoint::builder()
            .alpns(vec![ALPN.to_vec()])
            .bind()
            .await;

        match bound {
            Ok(endpoint) => {
                let id = endpoint.id();
                info!(local = %id, "endpoint bound, advertising");
                self.endpoint = Some(endpoint);
                self.status = ConnectionStatus::Advertising;
                Ok(id)
            }
            Err(e) => {
                self.status = ConnectionStatus::Errored;
                Err(ConnectionError::Bind {
                    reason: e.to_string(),
                })
            }
        }
    }

    fn advertising_endpoint(&self) -> Result<Endpoint, ConnectionError> {
        match (&self.endpoint, self.status) {
            (Some(endpoint), ConnectionStatus::Advertising) => Ok(endpoint.clone()),
            _ => Err(ConnectionError::NotAdvertising {
                status: self.status,
            }),
        }
    }

    /// Waits for one inbound connection and plays White.
    pub async fn accept(
        &mut self,
        time_control: TimeControl,
        name: Option<String>,
    ) -> Result<(PeerLink, Handshake), ConnectionError> {
        let endpoint = self.advertising_endpoint()?;

        let Some(incoming) = endpoint.accept().await else {
            self.status = ConnectionStatus::Errored;
            return Err(ConnectionError::Closed);
        };
        self.status = ConnectionStatus::Connecting;
        info!("inbound connection, starting handshake");

        let attempt = tokio::time::timeout(self.handshake_timeout, async move {
            let accepting = incoming
                .accept()
                .map_err(|e| ConnectionError::transport("accept", e))?;
            let conn = accepting
                .await
                .map_err(|e| ConnectionError::transport("accept", e))?;
            let (mut send, mut recv) = conn
                .accept_bi()
                .await
                .map_err(|e| ConnectionError::transport("accept stream", e))?;
            let handshake =
                handshake_acceptor(&mut recv, &mut send, time_control, name).await?;
            Ok((conn, send, recv, handshake))
        })
        .await;

        self.establish(attempt)
    }

    /// Dials `remote_id` and plays Black.
    pub async fn connect(
        &mut self,
        remote_id: &str,
        name: Option<String>,
    ) -> Result<(PeerLink, Handshake), ConnectionError> {
        let peer = validate_peer_id(remote_id)?;
        let endpoint = self.advertising_endpoint()?;
        self.status = ConnectionStatus::Connecting;
        info!(remote = %peer, "dialing peer");

        let attempt = tokio::time::timeout(self.handshake_timeout, async move {
            let conn = endpoint
                .connect(peer, ALPN)
                .await
                .map_err(|e| ConnectionError::transport("connect", e))?;
            // The stream only becomes visible to the acceptor once we write to it,
            // which the hello below does.
            let (mut send, mut recv) = conn
                .open_bi()
                .await
                .map_err(|e| ConnectionError::transport("open stream", e))?;
            let handshake = handshake_initiator(&mut recv, &mut send, name).await?;
            Ok((conn, send, recv, handshake))
        })
        .await;

        self.establish(attempt)
    }

    fn establish(
        &mut self,
        attempt: Result<Result<Established, ConnectionError>, tokio::time::error::Elapsed>,
    ) -> Result<(PeerLink, Handshake), ConnectionError> {
        match attempt {
            Ok(Ok((conn, send, recv, handshake))) => {
                info!(
                    role = %handshake.role,
                    time_control = %handshake.time_control,
                    "peer connected"
                );
                self.conn = Some(conn);
                self.status = ConnectionStatus::Connected;
                Ok((PeerLink::spawn_with_settle(recv, send, linger), handshake))
            }
            Ok(Err(e)) => {
                warn!(error = %e, "connection attempt failed");
                self.status = ConnectionStatus::Errored;
                Err(e)
            }
            Err(_) => {
                warn!(timeout = ?self.handshake_timeout, "connection attempt timed out");
                self.status = ConnectionStatus::Errored;
                Err(ConnectionError::Timeout(self.handshake_timeout))
            }
        }
    }

    /// Tears the channel down. Shut the [`PeerLink`] down first so that frames
    /// still queued reach the peer before the connection goes away.
    pub async fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            conn.close(0u32.into(), b"bye");
        }
        if let Some(endpoint) = self.endpoint.take() {
            endpoint.close().await;
        }
        if self.status != ConnectionStatus::Errored {
            self.status = ConnectionStatus::Closed;
        }
        info!("connection closed");
    }
}

/// Waits until the peer has read our finished stream, so closing the connection
/// right after cannot discard a final resign.
async fn linger(mut send: SendStream) {
    match tokio::time::timeout(CLOSE_LINGER, send.stopped()).await {
        Ok(Ok(None)) => debug!("peer read the whole stream"),
        Ok(Ok(Some(code))) => debug!(%code, "peer stopped the stream early"),
        Ok(Err(e)) => debug!(error = %e, "stream ended before the peer acknowledged"),
        Err(_) => warn!(timeout = ?CLOSE_LINGER, "peer did not acknowledge the last frames"),
    }
}
