//! Newline-delimited JSON protocol between the host and the worker.
//!
//! One request per input line, one reply per request on the output. Requests
//! are handled concurrently, so replies may arrive out of order; hosts that
//! pipeline requests correlate them by `id`.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use shellcache_core::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::intercept::{InterceptedRequest, InterceptedResponse, ResponseSource};
use crate::registration::Registration;

/// One output line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ResponseSource>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Reply {
    pub fn response(request: &InterceptedRequest, response: InterceptedResponse) -> Self {
        Self {
            id: request.id,
            path: request.path.clone(),
            status: Some(response.status),
            source: Some(response.source),
            headers: response.headers,
            body_base64: Some(STANDARD.encode(&response.body)),
            error: None,
        }
    }

    pub fn failure(id: Option<u64>, path: impl Into<String>, error: &Error) -> Self {
        Self {
            id,
            path: path.into(),
            status: None,
            source: None,
            headers: Vec::new(),
            body_base64: None,
            error: Some(error.to_string()),
        }
    }
}

/// Parse one input line.
///
/// Lines that are not valid UTF-8 or not a request object are rejected with
/// `INVALID_INPUT`.
pub fn decode_request(line: &[u8]) -> Result<InterceptedRequest, Error> {
    serde_json::from_slice(line).map_err(|e| Error::InvalidInput(format!("bad request line: {e}")))
}

/// Serve requests from `reader` until it closes, writing replies to `writer`.
///
/// Returns once every accepted request has been answered. A read failure
/// stops intake but still drains the requests already in flight.
pub async fn serve<R, W>(registration: Arc<Registration>, mut reader: R, mut writer: W) -> Result<(), Error>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Reply>();
    let mut line = Vec::new();
    let mut reading = true;
    let mut pending = 0usize;

    while reading || pending > 0 {
        tokio::select! {
            read = reader.read_until(b'\n', &mut line), if reading => {
                match read {
                    Ok(0) => {
                        tracing::debug!(pending, "input closed");
                        reading = false;
                    }
                    Ok(_) => {
                        if !line.trim_ascii().is_empty() {
                            pending += 1;
                            dispatch(&registration, &tx, &line);
                        }
                        line.clear();
                    }
                    Err(e) => {
                        tracing::error!(error = %e, pending, "input read failed, draining in-flight requests");
                        reading = false;
                    }
                }
            }
            Some(reply) = rx.recv(), if pending > 0 => {
                pending -= 1;
                write_reply(&mut writer, &reply).await?;
            }
        }
    }

    writer.flush().await?;
    Ok(())
}

fn dispatch(registration: &Arc<Registration>, tx: &mpsc::UnboundedSender<Reply>, line: &[u8]) {
    let request = match decode_request(line) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, "rejected request line");
            let _ = tx.send(Reply::failure(None, "", &e));
            return;
        }
    };

    if request.path.trim().is_empty() {
        let e = Error::InvalidInput("path must not be empty".to_string());
        tracing::warn!(id = ?request.id, error = %e, "rejected request");
        let _ = tx.send(Reply::failure(request.id, request.path.as_str(), &e));
        return;
    }

    let registration = Arc::clone(registration);
    let tx = tx.clone();
    tokio::spawn(async move {
        let reply = match registration.handle_fetch(&request).await {
            Ok(response) => {
                tracing::debug!(
                    path = %request.path,
                    source = response.source.as_str(),
                    status = response.status,
                    "served"
                );
                Reply::response(&request, response)
            }
            Err(e) => {
                tracing::warn!(path = %request.path, error = %e, "interception failed");
                Reply::failure(request.id, request.path.as_str(), &e)
            }
        };
        let _ = tx.send(reply);
    });
}

async fn write_reply<W: AsyncWrite + Unpin>(writer: &mut W, reply: &Reply) -> Result<(), Error> {
    let mut line = serde_json::to_vec(reply).map_err(std::io::Error::from)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}
