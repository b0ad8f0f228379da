//! WebSocket fan-out endpoint.
//!
//! Outbound frames come from the bridge broadcast; each client drains
//! through its own [`OutQueue`] so a slow consumer sheds its own load.
//! Inbound binary frames are parsed and queued for the real-time thread.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tracing::{info, warn};

use airlink::ClientRequest;

use super::WebState;
use super::queue::{self, OutQueue};
use crate::bridge::{RxCmd, RxQueue};

pub async fn handle_socket(socket: WebSocket, state: Arc<WebState>, peer: SocketAddr) {
    let client_id = uuid::Uuid::new_v4().simple().to_string();
    info!("WS: {peer} connected ({client_id})");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut bus_rx = state.bus.subscribe();

    let mut send_task = tokio::spawn(async move {
        let mut queue = OutQueue::new(queue::DEFAULT_CAP);
        loop {
            // Pull everything pending into the queue, then ship one frame.
            loop {
                match bus_rx.try_recv() {
                    Ok(msg) => queue.push(msg),
                    Err(broadcast::error::TryRecvError::Empty) => break,
                    Err(broadcast::error::TryRecvError::Lagged(n)) => {
                        warn!("WS: lagged, dropped {n} frames");
                    }
                    Err(broadcast::error::TryRecvError::Closed) => return,
                }
            }
            match queue.pop() {
                Some(msg) => {
                    if ws_tx.send(Message::Binary(msg.frame)).await.is_err() {
                        return;
                    }
                }
                None => match bus_rx.recv().await {
                    Ok(msg) => queue.push(msg),
                    Err(broadcast::error::RecvError::Closed) => return,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("WS: lagged, dropped {n} frames");
                    }
                },
            }
        }
    });

    let rx_queue = Arc::clone(&state.rx);
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Binary(data) => handle_frame(&data, &rx_queue),
                Message::Close(_) => break,
                // Text frames and pings are not part of the protocol.
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("WS: {peer} disconnected ({client_id})");
}

/// Parse one inbound frame and enqueue the resulting commands. Malformed
/// frames are dropped without closing the connection.
fn handle_frame(data: &[u8], rx: &RxQueue) {
    match airlink::decode_request(data) {
        Ok(ClientRequest::SendAllData) => rx.push(RxCmd::Resync, 0),
        Ok(ClientRequest::ModifySystemState { sim, server }) => {
            if let Some(value) = sim {
                rx.push(RxCmd::ChangeSimLinkStatus, u64::from(value));
            }
            if let Some(value) = server {
                rx.push(RxCmd::ChangeServerStatus, u64::from(value));
            }
        }
        Ok(ClientRequest::ModifySystemProps { reconnect }) => {
            if let Some(value) = reconnect {
                rx.push(RxCmd::ReconnectToSim, u64::from(value));
            }
        }
        Err(e) => warn!("WS: message discarded: {e}"),
    }
}
