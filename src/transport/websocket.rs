use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tracing::{debug, info, warn};
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::protocol::Message as WsMessage;

use super::guard::ClientGuard;
use crate::broker::{BrokerConsumerPool, StreamEvent};
use crate::client::StreamClient;
use crate::transport::message::{ClientMessage, StreamQuery};
use crate::utils::error::ServerError;

/// Per-connection settings for the WebSocket stream.
#[derive(Debug, Clone, Copy)]
pub struct WsOptions {
    pub keepalive: Duration,
    pub client_buffer: usize,
}

pub async fn start_websocket_server(
    addr: &str,
    pool: Arc<BrokerConsumerPool>,
    options: WsOptions,
) -> Result<(), ServerError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;

    info!("WebSocket server listening on ws://{}", addr);
    serve_websocket(listener, pool, options).await
}

/// Accept loop on an already bound listener.
pub async fn serve_websocket(
    listener: TcpListener,
    pool: Arc<BrokerConsumerPool>,
    options: WsOptions,
) -> Result<(), ServerError> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let pool = pool.clone();
        tokio::spawn(handle_connection(stream, peer, pool, options));
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    pool: Arc<BrokerConsumerPool>,
    options: WsOptions,
) {
    let mut query = None;
    let capture_topics = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        if let Some(raw) = req.uri().query() {
            match StreamQuery::parse(raw) {
                Ok(parsed) => query = parsed.topics,
                Err(e) => warn!(peer = %peer, error = %e, "ignoring malformed query"),
            }
        }
        Ok(resp)
    };
    let ws_stream = match accept_hdr_async(stream, capture_topics).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(peer = %peer, "WebSocket handshake error: {}", e);
            return;
        }
    };

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let topics = pool.topics().parse_interest(query.as_deref());
    let (tx, mut rx) = mpsc::channel::<StreamEvent>(options.client_buffer.max(1));
    let client = StreamClient::new(tx, topics);
    let client_id = client.id.clone();

    if let Err(e) = pool.register(client) {
        warn!(client_id = %client_id, error = %e, "rejecting stream");
        return;
    }
    let guard = ClientGuard::new(pool.clone(), client_id.clone());

    // Forward pool events to the socket, pinging when idle
    let forward_id = client_id.clone();
    let keepalive = options.keepalive;
    let forward = tokio::spawn(async move {
        let mut ping = tokio::time::interval(keepalive);
        ping.tick().await;

        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => {
                        if let Err(e) = ws_sender.send(event.to_ws_frame()).await {
                            debug!(client_id = %forward_id, "Failed to send message: {}", e);
                            break;
                        }
                    }
                    // Evicted by the registry.
                    None => break,
                },
                _ = ping.tick() => {
                    if ws_sender.send(WsMessage::Ping(Default::default())).await.is_err() {
                        break;
                    }
                }
            }
        }

        let _ = ws_sender.close().await;
        debug!(client_id = %forward_id, "send loop closed");
    });

    while let Some(Ok(msg)) = ws_receiver.next().await {
        match msg {
            WsMessage::Text(text) => apply_client_message(&pool, guard.client_id(), text.as_str()),
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    forward.abort();
    drop(guard);
    info!(client_id = %client_id, peer = %peer, "WebSocket client disconnected");
}

fn apply_client_message(pool: &BrokerConsumerPool, client_id: &str, text: &str) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Subscribe { topic }) => {
            if pool.subscribe(client_id, &topic) {
                info!(client_id = %client_id, topic = %topic, "subscribed");
            } else {
                warn!(client_id = %client_id, topic = %topic, "cannot subscribe to unknown topic");
            }
        }

        Ok(ClientMessage::Unsubscribe { topic }) => {
            pool.unsubscribe(client_id, &topic);
            info!(client_id = %client_id, topic = %topic, "unsubscribed");
        }

        Err(err) => {
            warn!(client_id = %client_id, "Invalid client message: {} | {}", err, text);
        }
    }
}
