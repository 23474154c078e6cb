//! One-shot request/response exchanges over TCP with bounded timeouts

use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::ProtocolError;
use crate::SwarmError;

/// Largest request a server accepts.
///
/// Leaves room for a `REGISTER` listing roughly a million piece ids.
pub const MAX_REQUEST_BYTES: usize = 8 * 1024 * 1024;

/// Quiet period after which buffered bytes count as a whole request when the
/// client neither sends a newline nor half-closes.
pub const REQUEST_IDLE_GAP: Duration = Duration::from_millis(100);

/// Sends one request and reads the full reply until the server closes.
///
/// Connects with `timeout`, writes `request`, half-closes the write side so
/// the server sees end-of-request, then reads to end-of-stream under the
/// same timeout.
///
/// # Errors
///
/// - `SwarmError::PeerUnreachable` - If the connection is refused or reset
/// - `SwarmError::Timeout` - If connecting or the exchange takes too long
/// - `SwarmError::Io` - If writing or reading fails mid-exchange
pub async fn exchange(
    address: &str,
    request: &[u8],
    timeout: Duration,
) -> Result<Bytes, SwarmError> {
    let mut stream = match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            return Err(SwarmError::PeerUnreachable {
                address: address.to_string(),
                reason: e.to_string(),
            });
        }
        Err(_) => {
            return Err(SwarmError::Timeout {
                operation: "connect",
                address: address.to_string(),
            });
        }
    };

    let transfer = async {
        stream.write_all(request).await?;
        stream.shutdown().await?;

        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await?;
        Ok::<_, std::io::Error>(reply)
    };

    match tokio::time::timeout(timeout, transfer).await {
        Ok(Ok(reply)) => Ok(Bytes::from(reply)),
        Ok(Err(e)) => Err(SwarmError::Io(e)),
        Err(_) => Err(SwarmError::Timeout {
            operation: "exchange",
            address: address.to_string(),
        }),
    }
}

/// Reads one request from an inbound connection.
///
/// The request ends at the first newline, when the client half-closes, or
/// once some bytes have arrived and the client stays quiet for
/// [`REQUEST_IDLE_GAP`]. Anything after a newline is ignored.
///
/// # Errors
///
/// - `SwarmError::Timeout` - If the client does not finish its request in time
/// - `SwarmError::Protocol` - If the request exceeds [`MAX_REQUEST_BYTES`]
/// - `SwarmError::Io` - If reading fails
pub async fn read_request(
    stream: &mut TcpStream,
    timeout: Duration,
) -> Result<Vec<u8>, SwarmError> {
    let peer = peer_label(stream);

    match tokio::time::timeout(timeout, read_until_complete(stream)).await {
        Ok(result) => result,
        Err(_) => Err(SwarmError::Timeout {
            operation: "read request",
            address: peer,
        }),
    }
}

async fn read_until_complete(stream: &mut TcpStream) -> Result<Vec<u8>, SwarmError> {
    let mut request = Vec::with_capacity(256);
    let mut scanned = 0;

    loop {
        let read = if request.is_empty() {
            stream.read_buf(&mut request).await?
        } else {
            match tokio::time::timeout(REQUEST_IDLE_GAP, stream.read_buf(&mut request)).await {
                Ok(read) => read?,
                Err(_) => return Ok(request),
            }
        };

        if let Some(offset) = request[scanned..].iter().position(|&byte| byte == b'\n') {
            request.truncate(scanned + offset);
            break;
        }
        if read == 0 || request.len() > MAX_REQUEST_BYTES {
            break;
        }
        scanned = request.len();
    }

    if request.len() > MAX_REQUEST_BYTES {
        return Err(ProtocolError::MessageTooLarge {
            limit: MAX_REQUEST_BYTES,
        }
        .into());
    }
    Ok(request)
}

/// Writes a complete reply and closes the write side of the connection.
///
/// # Errors
///
/// - `SwarmError::Timeout` - If the client does not drain the reply in time
/// - `SwarmError::Io` - If writing fails
pub async fn write_response(
    stream: &mut TcpStream,
    response: &[u8],
    timeout: Duration,
) -> Result<(), SwarmError> {
    let peer = peer_label(stream);
    let write = async {
        stream.write_all(response).await?;
        stream.shutdown().await
    };

    match tokio::time::timeout(timeout, write).await {
        Ok(result) => result.map_err(SwarmError::Io),
        Err(_) => Err(SwarmError::Timeout {
            operation: "write response",
            address: peer,
        }),
    }
}

fn peer_label(stream: &TcpStream) -> String {
    stream
        .peer_addr()
        .map(|address| address.to_string())
        .unwrap_or_else(|_| "unknown peer".to_string())
}
