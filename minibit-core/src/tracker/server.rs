//! TCP front end of the tracker: one handler task per connection

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};

use super::Registry;
use crate::config::TrackerConfig;
use crate::piece::PeerAddress;
use crate::protocol::{
    MessageCodec, ProtocolError, TrackerRequest, TrackerResponse, read_request, write_response,
};
use crate::{Result, SwarmError};

/// Tracker listening socket bound to a shared registry.
pub struct TrackerServer {
    listener: TcpListener,
    registry: Arc<Registry>,
    io_timeout: Duration,
}

impl TrackerServer {
    /// Binds the tracker socket.
    ///
    /// # Errors
    ///
    /// - `SwarmError::Io` - If the bind address is unavailable
    pub async fn bind(config: &TrackerConfig, registry: Arc<Registry>) -> Result<Self> {
        let listener = TcpListener::bind(&config.bind_address).await?;
        tracing::info!("Tracker listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            registry,
            io_timeout: config.io_timeout,
        })
    }

    /// Address actually bound, useful when binding port 0.
    ///
    /// # Errors
    ///
    /// - `SwarmError::Io` - If the socket address cannot be queried
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Accepts connections forever.
    ///
    /// Handler failures are logged and only close their own connection.
    pub async fn serve(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, source)) => {
                    let registry = self.registry.clone();
                    let timeout = self.io_timeout;
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, source, &registry, timeout).await
                        {
                            tracing::warn!("Tracker connection from {} failed: {}", source, e);
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!("Failed to accept tracker connection: {}", e);
                }
            }
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    source: SocketAddr,
    registry: &Registry,
    timeout: Duration,
) -> Result<()> {
    let response = match read_request(&mut stream, timeout).await {
        Ok(request) => handle_request(registry, source, &request),
        Err(SwarmError::Protocol(e @ ProtocolError::MessageTooLarge { .. })) => {
            tracing::warn!("Rejected request from {}: {}", source, e);
            TrackerResponse::Error {
                reason: e.to_string(),
            }
        }
        Err(e) => return Err(e),
    };
    let encoded = MessageCodec::encode_tracker_response(&response).map_err(SwarmError::from)?;
    write_response(&mut stream, &encoded, timeout).await
}

/// Applies one raw request to the registry and builds the reply.
///
/// Malformed requests produce `ERROR` or `UNKNOWN_COMMAND` and leave the
/// registry untouched. The requester's identity is the connection's source
/// host combined with the listen port it declares.
pub fn handle_request(registry: &Registry, source: SocketAddr, data: &[u8]) -> TrackerResponse {
    let request = match MessageCodec::decode_tracker_request(data) {
        Ok(request) => request,
        Err(ProtocolError::UnknownCommand { command }) => {
            tracing::debug!("Unknown tracker command {:?} from {}", command, source);
            return TrackerResponse::UnknownCommand;
        }
        Err(ProtocolError::EmptyMessage) => return TrackerResponse::UnknownCommand,
        Err(e) => {
            tracing::warn!("Rejected request from {}: {}", source, e);
            return TrackerResponse::Error {
                reason: e.to_string(),
            };
        }
    };

    match request {
        TrackerRequest::Register { port, pieces } => {
            registry.register(PeerAddress::from_source(source, port), pieces);
            TrackerResponse::Ok
        }
        TrackerRequest::GetPeers { port } => {
            let requester = port.map(|port| PeerAddress::from_source(source, port));
            TrackerResponse::Peers(registry.discover(requester.as_ref()))
        }
        TrackerRequest::UpdatePieces {
            port: Some(port),
            pieces,
        } => {
            registry.update_pieces(PeerAddress::from_source(source, port), &pieces);
            TrackerResponse::Ok
        }
        TrackerRequest::UpdatePieces { port: None, pieces } => {
            tracing::debug!(
                "Unattributed update of {} pieces from {}",
                pieces.len(),
                source
            );
            TrackerResponse::Ok
        }
    }
}
