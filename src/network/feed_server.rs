// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Live sweep feed over HTTP.
//!
//! A deliberately small HTTP/1.1 responder on a tokio listener:
//!
//! - `GET /stream/scans`: server-sent events; `init` carries the whole
//!   history once, then `scan` carries every completed sweep
//! - `GET /spectrum`: the averaged spectrum as `[[frequency, db], ...]`
//! - `GET /`: feed title and assembly status
//!
//! Sweeps are JSON; non-finite bins (silence) are encoded as `null`.

use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;
use spectrum_sweep::{BroadcastConfig, Broadcaster};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::spectrum::SharedSpectrum;

/// Event name for the history snapshot sent to every new client.
pub const INIT_EVENT: &str = "init";

/// Route of the event stream.
pub const STREAM_ROUTE: &str = "/stream/scans";

const MAX_LINE: u64 = 8 * 1024;
const MAX_HEADERS: usize = 64;

/// Everything a connection handler needs.
#[derive(Debug, Clone)]
pub struct FeedState {
    pub spectrum: SharedSpectrum,
    pub feed: Broadcaster<Arc<str>>,
    pub title: Arc<str>,
}

/// Create the sweep broadcaster. Every new subscriber first receives the
/// current history as an `init` event.
#[must_use]
pub fn feed_broadcaster(spectrum: SharedSpectrum, config: BroadcastConfig) -> Broadcaster<Arc<str>> {
    Broadcaster::with_connect_hook(config, move |subscriber| match spectrum.history_json() {
        Ok(history) => {
            if !subscriber.send(INIT_EVENT, Arc::from(history)) {
                warn!("Subscriber {} missed its history snapshot", subscriber.id());
            }
        }
        Err(e) => warn!("Failed to encode history for subscriber {}: {}", subscriber.id(), e),
    })
}

#[derive(Serialize)]
struct Status<'a> {
    title: &'a str,
    sweeps: usize,
    hops: Option<u32>,
    subscribers: usize,
}

/// Accept connections until cancelled.
pub async fn serve(listener: TcpListener, state: FeedState, cancel_token: CancellationToken) {
    if let Ok(addr) = listener.local_addr() {
        info!("Live feed on http://{}{}", addr, STREAM_ROUTE);
    }

    loop {
        let (stream, peer) = tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Feed server stopped");
                return;
            }
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    continue;
                }
            },
        };

        debug!("Connection from {}", peer);
        let state = state.clone();
        let cancel = cancel_token.child_token();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, state, cancel).await {
                debug!("Connection from {} ended: {}", peer, e);
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    state: FeedState,
    cancel_token: CancellationToken,
) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let Some((method, target)) = read_request(&mut reader).await? else {
        return respond(&mut write_half, "400 Bad Request", "text/plain", "bad request\n").await;
    };
    let path = target.split('?').next().unwrap_or_default();

    if method != "GET" {
        return respond(&mut write_half, "405 Method Not Allowed", "text/plain", "GET only\n").await;
    }

    match path {
        STREAM_ROUTE => stream_events(&mut write_half, &state, &cancel_token).await,
        "/spectrum" => match serde_json::to_string(&state.spectrum.spectrum()) {
            Ok(body) => respond(&mut write_half, "200 OK", "application/json", &body).await,
            Err(e) => {
                warn!("Failed to encode spectrum: {}", e);
                respond(&mut write_half, "500 Internal Server Error", "text/plain", "encoding failed\n").await
            }
        },
        "/" => {
            let status = Status {
                title: &state.title,
                sweeps: state.spectrum.sweeps().len(),
                hops: state.spectrum.expected_hops(),
                subscribers: state.feed.subscriber_count().await,
            };
            let body = serde_json::to_string(&status).unwrap_or_default();
            respond(&mut write_half, "200 OK", "application/json", &body).await
        }
        _ => respond(&mut write_half, "404 Not Found", "text/plain", "not found\n").await,
    }
}

/// Read the request line and skip the headers.
///
/// Returns `None` for anything that does not look like an HTTP request.
async fn read_request<R>(reader: &mut BufReader<R>) -> std::io::Result<Option<(String, String)>>
where
    R: AsyncRead + Unpin,
{
    let mut line = String::new();
    if (&mut *reader).take(MAX_LINE).read_line(&mut line).await? == 0 {
        return Ok(None);
    }

    let mut parts = line.split_whitespace();
    let (Some(method), Some(target), Some(version)) = (parts.next(), parts.next(), parts.next()) else {
        return Ok(None);
    };
    if !version.starts_with("HTTP/") {
        return Ok(None);
    }
    let request = (method.to_string(), target.to_string());

    for _ in 0..MAX_HEADERS {
        let mut header = String::new();
        let read = (&mut *reader).take(MAX_LINE).read_line(&mut header).await?;
        if read == 0 || header.trim().is_empty() {
            return Ok(Some(request));
        }
    }
    Ok(None)
}

async fn respond<W>(out: &mut W, status: &str, content_type: &str, body: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let head = format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nAccess-Control-Allow-Origin: *\r\nConnection: close\r\n\r\n",
        body.len()
    );
    out.write_all(head.as_bytes()).await?;
    out.write_all(body.as_bytes()).await?;
    out.flush().await
}

async fn stream_events<W>(
    out: &mut W,
    state: &FeedState,
    cancel_token: &CancellationToken,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    out.write_all(
        b"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nCache-Control: no-cache\r\nConnection: keep-alive\r\nAccess-Control-Allow-Origin: *\r\n\r\n",
    )
    .await?;
    out.flush().await?;

    let mut subscription = state.feed.subscribe();
    info!("Feed client {} connected", subscription.id());

    let result = loop {
        let event = tokio::select! {
            () = cancel_token.cancelled() => break Ok(()),
            event = subscription.recv() => event,
        };
        let Some(event) = event else {
            break Ok(());
        };

        let frame = format!("event: {}\ndata: {}\n\n", event.name, event.value);
        if let Err(e) = out.write_all(frame.as_bytes()).await {
            break Err(e);
        }
        if let Err(e) = out.flush().await {
            break Err(e);
        }
    };

    info!(
        "Feed client {} disconnected, {} events dropped",
        subscription.id(),
        subscription.dropped()
    );
    result
}
