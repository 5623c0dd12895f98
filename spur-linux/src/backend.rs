//! Backend link: newline-delimited JSON over TCP. The most recent connection
//! receives notifications; every connection may send requests.

use std::net::SocketAddr;

use anyhow::Context;
use spur_core::ClientMessage;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dispatch::Event;

pub async fn run_backend(
    port: u16,
    events: mpsc::Sender<Event>,
    mut outbound: mpsc::Receiver<String>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("binding backend port {port}"))?;
    info!(port, "backend link listening");
    let mut writer: Option<OwnedWriteHalf> = None;
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, from)) => {
                    info!(%from, "backend connected");
                    let (r, w) = stream.into_split();
                    writer = Some(w);
                    tokio::spawn(read_requests(r, from, events.clone()));
                }
                Err(e) => warn!(error = %e, "backend accept failed"),
            },
            line = outbound.recv() => {
                let Some(line) = line else {
                    return Ok(());
                };
                let Some(w) = writer.as_mut() else {
                    debug!("no backend connected, message dropped");
                    continue;
                };
                if let Err(e) = write_line(w, &line).await {
                    warn!(error = %e, "backend write failed, dropping connection");
                    writer = None;
                }
            }
        }
    }
}

async fn write_line(w: &mut OwnedWriteHalf, line: &str) -> std::io::Result<()> {
    w.write_all(line.as_bytes()).await?;
    w.write_all(b"\n").await?;
    w.flush().await
}

async fn read_requests(r: OwnedReadHalf, from: SocketAddr, events: mpsc::Sender<Event>) {
    let mut lines = BufReader::new(r).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let Some(msg) = parse_request(&line) else {
                    continue;
                };
                if events.send(Event::Client(msg)).await.is_err() {
                    return;
                }
            }
            Ok(None) => {
                info!(%from, "backend disconnected");
                return;
            }
            Err(e) => {
                warn!(%from, error = %e, "backend read failed");
                return;
            }
        }
    }
}

fn parse_request(line: &str) -> Option<ClientMessage> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match ClientMessage::from_json(line) {
        Ok(msg) => Some(msg),
        Err(e) => {
            warn!(error = %e, "unusable backend message");
            None
        }
    }
}
