//! Per-connection I/O task (spec §3 connection state machine, §5
//! concurrency model).
//!
//! Each accepted socket gets one task that reads exactly one request frame,
//! forwards it to the dispatcher loop along with a liveness token and a
//! reply channel, awaits the reply, and writes it back — enforcing the
//! spec's bounded in-flight window of one per connection. Any I/O error
//! forces the connection to `DISCONNECTED` and flips the liveness token so
//! the dispatcher collects this connection's deferred requests.

use std::sync::atomic::Ordering;

use object_protocol::{decode_frame, encode_frame, DecodeOutcome, FrameFailureKind, Reply, Request};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::dispatcher::{new_connection_token, DispatchRequest};

enum Frame {
    Request(Request),
    Malformed { reason: String, kind: FrameFailureKind },
}

pub async fn serve<S>(mut stream: S, cmd_tx: mpsc::Sender<DispatchRequest>)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let token = new_connection_token();
    let mut read_buf = Vec::new();

    loop {
        let request = match read_one_frame(&mut stream, &mut read_buf).await {
            Ok(Some(Frame::Request(req))) => req,
            Ok(Some(Frame::Malformed { reason, kind })) => {
                let reply = Reply::Error {
                    code: kind.error_code().to_string(),
                    message: reason,
                };
                match encode_frame(&reply) {
                    Ok(frame) if stream.write_all(&frame).await.is_ok() => continue,
                    _ => break,
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "connection read failed, closing");
                break;
            }
        };

        let is_exit = matches!(request, Request::Exit);
        let (reply_tx, mut reply_rx) = oneshot::channel();
        let dispatch = DispatchRequest {
            connection_token: token.clone(),
            request,
            reply: reply_tx,
        };
        if cmd_tx.send(dispatch).await.is_err() {
            break;
        }

        // A deferred request (get_data/get_name with wait=true) can sit
        // unanswered for a long time; race the reply against the peer
        // closing its end so a dropped client is noticed without waiting
        // for a request that may never come.
        let reply = tokio::select! {
            r = &mut reply_rx => {
                match r {
                    Ok(reply) => reply,
                    Err(_) => break,
                }
            }
            () = detect_peer_close(&mut stream) => {
                debug!("peer closed while a reply was outstanding");
                token.store(false, Ordering::Release);
                break;
            }
        };

        let frame = match encode_frame(&reply) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "failed to encode reply frame");
                break;
            }
        };
        if stream.write_all(&frame).await.is_err() {
            break;
        }
        if is_exit {
            break;
        }
    }

    token.store(false, Ordering::Release);
    let _ = stream.shutdown().await;
}

/// Resolves once the peer has half-closed its write side, even though
/// nothing is actually read from it (per protocol, the client does not
/// send another frame while a reply is outstanding). Any unexpected bytes
/// are discarded rather than treated as a frame.
async fn detect_peer_close<S>(stream: &mut S)
where
    S: tokio::io::AsyncRead + Unpin,
{
    let mut probe = [0u8; 64];
    loop {
        match stream.read(&mut probe).await {
            Ok(0) => return,
            Ok(_) => continue,
            Err(_) => return,
        }
    }
}

async fn read_one_frame<S>(stream: &mut S, buf: &mut Vec<u8>) -> std::io::Result<Option<Frame>>
where
    S: tokio::io::AsyncRead + Unpin,
{
    loop {
        match decode_frame::<Request>(buf) {
            DecodeOutcome::Frame { value, consumed } => {
                buf.drain(..consumed);
                return Ok(Some(Frame::Request(value)));
            }
            DecodeOutcome::Malformed { reason, consumed, kind } => {
                buf.drain(..consumed);
                return Ok(Some(Frame::Malformed { reason, kind }));
            }
            DecodeOutcome::Incomplete => {
                let mut chunk = [0u8; 4096];
                let n = stream.read(&mut chunk).await?;
                if n == 0 {
                    return Ok(None);
                }
                buf.extend_from_slice(&chunk[..n]);
            }
        }
    }
}
