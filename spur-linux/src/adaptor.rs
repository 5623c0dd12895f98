//! Radio adaptor link: JSON datagrams over UDP, frames base64-encoded in `data`.
//! Outbound frames go to whichever peer last sent us radio data.

use std::net::SocketAddr;

use anyhow::Context;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dispatch::Event;

/// Adaptor characteristic carrying Spur radio traffic.
pub const CHARACTERISTIC: &str = "spur";

/// Identifier we announce in command datagrams.
const APP_ID: &str = "spur";

#[derive(Debug, Deserialize)]
struct DataDatagram {
    characteristic: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct CommandDatagram<'a> {
    id: &'a str,
    length: usize,
    request: &'a str,
    data: String,
}

/// Radio frame carried by an adaptor datagram; `None` for other characteristics.
pub fn parse_datagram(bytes: &[u8]) -> anyhow::Result<Option<Vec<u8>>> {
    let d: DataDatagram = serde_json::from_slice(bytes).context("invalid adaptor JSON")?;
    if d.characteristic != CHARACTERISTIC {
        return Ok(None);
    }
    let frame = STANDARD
        .decode(d.data.trim())
        .context("invalid base64 in adaptor data")?;
    Ok(Some(frame))
}

/// Wrap a frame for transmission.
pub fn command_datagram(frame: &[u8]) -> anyhow::Result<Vec<u8>> {
    Ok(serde_json::to_vec(&CommandDatagram {
        id: APP_ID,
        length: frame.len(),
        request: "command",
        data: STANDARD.encode(frame),
    })?)
}

pub async fn run_adaptor(
    port: u16,
    events: mpsc::Sender<Event>,
    mut frames: mpsc::Receiver<Vec<u8>>,
) -> anyhow::Result<()> {
    let socket = UdpSocket::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("binding adaptor port {port}"))?;
    info!(port, "adaptor link listening");
    let mut peer: Option<SocketAddr> = None;
    let mut buf = vec![0u8; 65536];
    loop {
        tokio::select! {
            received = socket.recv_from(&mut buf) => {
                let (n, from) = match received {
                    Ok(r) => r,
                    Err(e) => {
                        warn!(error = %e, "adaptor receive failed");
                        continue;
                    }
                };
                match parse_datagram(&buf[..n]) {
                    Ok(Some(frame)) => {
                        if peer != Some(from) {
                            info!(%from, "adaptor peer learned");
                            peer = Some(from);
                        }
                        if events.send(Event::Radio(frame)).await.is_err() {
                            return Ok(());
                        }
                    }
                    Ok(None) => debug!(%from, "ignoring datagram for another characteristic"),
                    Err(e) => warn!(%from, error = %format!("{e:#}"), "bad adaptor datagram"),
                }
            }
            frame = frames.recv() => {
                let Some(frame) = frame else {
                    return Ok(());
                };
                let Some(to) = peer else {
                    debug!("no adaptor peer yet, frame dropped");
                    continue;
                };
                let datagram = command_datagram(&frame)?;
                if let Err(e) = socket.send_to(&datagram, to).await {
                    warn!(%to, error = %e, "adaptor send failed");
                }
            }
        }
    }
}
