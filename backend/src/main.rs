use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

mod config;
mod elevation;
mod session;

use config::ServerConfig;
use session::Session;

// Application State
struct AppState {
    config: ServerConfig,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = ServerConfig::from_env();
    let addr = config.addr;
    let static_dir = config.static_dir.clone();
    let shared_state = Arc::new(AppState { config });

    let mut app = Router::new().route("/ws", get(ws_handler));
    app = match static_dir {
        Some(dir) => {
            info!("serving static files from {}", dir);
            app.fallback_service(ServeDir::new(dir))
        }
        None => app.route("/", get(root)),
    };
    let app = app.layer(TraceLayer::new_for_http()).with_state(shared_state);

    info!("listening on {}", addr);
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("cannot bind {}: {}", addr, e);
            return;
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        error!("server stopped: {}", e);
    }
}

async fn root() -> &'static str {
    "PV area backend"
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    info!("Client connected");
    let (mut sink, mut stream) = socket.split();

    // Everything for the client goes through one queue so elevation
    // requests from running jobs interleave with command replies.
    let (outbound, mut queue) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        while let Some(text) = queue.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let (mut session, mut jobs) = Session::new(&state.config, outbound.clone());
    let send_all = |frames: Vec<String>| frames.into_iter().all(|f| outbound.send(f).is_ok());

    if send_all(session.greeting()) {
        loop {
            let replies = tokio::select! {
                msg = stream.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        debug!("Received message: {}", text);
                        session.handle_frame(&text)
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => continue,
                },
                Some(outcome) = jobs.recv() => session.finish_job(outcome),
            };
            if !send_all(replies) {
                break;
            }
        }
    }

    session.shutdown();
    writer.abort();
    info!("Client disconnected");
}
