//! Inbound transfer server answering other agents' queries

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};

use super::AgentContext;
use crate::protocol::{
    MessageCodec, PeerRequest, PeerResponse, ProtocolError, read_request, write_response,
};
use crate::storage::PieceStore;
use crate::{Result, SwarmError};

/// Accepts connections until the task is aborted, one handler per connection.
pub(crate) async fn serve<S>(listener: TcpListener, context: Arc<AgentContext<S>>)
where
    S: PieceStore + 'static,
{
    loop {
        match listener.accept().await {
            Ok((stream, source)) => {
                let context = context.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, source, &context).await {
                        tracing::debug!("Connection from {} failed: {}", source, e);
                    }
                });
            }
            Err(e) => {
                tracing::warn!("Failed to accept peer connection: {}", e);
            }
        }
    }
}

async fn handle_connection<S>(
    mut stream: TcpStream,
    source: SocketAddr,
    context: &AgentContext<S>,
) -> Result<()>
where
    S: PieceStore,
{
    let timeout = context.config.serve_timeout;
    let decoded = match read_request(&mut stream, timeout).await {
        Ok(data) => MessageCodec::decode_peer_request(&data),
        Err(SwarmError::Protocol(e @ ProtocolError::MessageTooLarge { .. })) => Err(e),
        Err(e) => return Err(e),
    };

    let response = match decoded {
        Ok(request) => {
            tracing::debug!("{} from {}", request.verb(), source);
            answer(context, request).await
        }
        Err(e) => {
            tracing::debug!("Unrecognized request from {}: {}", source, e);
            PeerResponse::UnknownCommand
        }
    };

    write_response(&mut stream, &MessageCodec::encode_peer_response(&response), timeout).await
}

/// Builds the reply to one decoded request.
///
/// Membership is checked under the state lock; reading the piece happens
/// after the lock is released.
pub(crate) async fn answer<S>(context: &AgentContext<S>, request: PeerRequest) -> PeerResponse
where
    S: PieceStore,
{
    match request {
        PeerRequest::ListPieces => PeerResponse::Pieces(context.state.lock().pieces.clone()),
        PeerRequest::Have(piece) => PeerResponse::Have(context.state.lock().pieces.contains(&piece)),
        PeerRequest::Request(piece) => {
            let owned = context.state.lock().pieces.contains(&piece);
            if !owned {
                return PeerResponse::NotAvailable;
            }
            match context.store.read_piece(piece).await {
                Ok(data) => PeerResponse::Payload(data),
                Err(e) => {
                    tracing::warn!("Cannot serve piece {}: {}", piece, e);
                    PeerResponse::NotAvailable
                }
            }
        }
    }
}
