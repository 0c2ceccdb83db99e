//! CLI for Telecast
//!
//! Subcommands:
//! - `server`: run the SSE and WebSocket endpoints
//! - `watch`: print the events of a running server (useful for smoke tests)

use clap::Parser;
use telecast::broker::{BrokerConsumerPool, PoolConfig};
use telecast::config::{Settings, load_config};
use telecast::source;
use telecast::transport::{AppState, WsOptions, start_http_server, start_websocket_server};
use telecast::utils::logging;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "telecast")]
enum Command {
    /// Start the streaming server
    Server,
    /// Connect to the WebSocket stream and print every event
    Watch {
        /// WebSocket URL to connect to
        #[arg(long, default_value = "ws://127.0.0.1:8081/")]
        url: String,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cmd = Command::parse();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    logging::init(&config.logging.level);

    let result = match cmd {
        Command::Server => run_server(config).await,
        Command::Watch { url } => run_watch(&url).await,
    };

    if let Err(e) = result {
        error!("Exited with error: {}", e);
        std::process::exit(1);
    }
}

async fn run_server(config: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let upstream = source::from_settings(&config.broker)?;
    info!(source = upstream.name(), "starting telecast");

    let pool = BrokerConsumerPool::new(upstream, PoolConfig::from(&config));
    let sweeper = pool.spawn_sweeper();

    let http_addr = format!("{}:{}", config.server.host, config.server.port);
    let ws_addr = format!("{}:{}", config.server.host, config.server.ws_port);
    let state = AppState::new(
        pool.clone(),
        config.stream.keepalive(),
        config.stream.client_buffer,
    );
    let ws_options = WsOptions {
        keepalive: config.stream.keepalive(),
        client_buffer: config.stream.client_buffer,
    };

    let outcome = tokio::select! {
        res = start_http_server(&http_addr, state) => {
            error!("HTTP server exited unexpectedly.");
            res
        }
        res = start_websocket_server(&ws_addr, pool.clone(), ws_options) => {
            error!("WebSocket server exited unexpectedly.");
            res
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
            Ok(())
        }
    };

    pool.shutdown().await;
    if let Err(e) = sweeper.await {
        error!(error = %e, "cache sweeper failed");
    }

    Ok(outcome?)
}

async fn run_watch(url: &str) -> Result<(), Box<dyn std::error::Error>> {
    use futures_util::StreamExt;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    let (ws_stream, _response) = connect_async(url).await?;
    info!("Connected to {}", url);
    let (_sink, mut events) = ws_stream.split();

    loop {
        tokio::select! {
            msg = events.next() => match msg {
                Some(Ok(WsMessage::Text(text))) => println!("{text}"),
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}
