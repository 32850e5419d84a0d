use actix::prelude::*;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, warn};

use crate::auth::bearer_token;
use crate::websocket::{ClientEvent, ConnectionContext, Gateway, ServerEvent};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub token: Option<String>,
}

/// WebSocket connection handler
/// Upgrades the request and starts a [`ChatSession`] for it. The token may
/// come from `?token=` or from a bearer header on the upgrade request.
pub async fn websocket_route(
    req: HttpRequest,
    stream: web::Payload,
    query: Option<web::Query<ConnectQuery>>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let peer_addr = req
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    // A query string that does not parse is treated like a missing token.
    let token = query
        .and_then(|q| q.into_inner().token)
        .or_else(|| bearer_token(&req));

    info!("New WebSocket connection request from: {}", peer_addr);

    let ws_config = &state.config.websocket;
    ws::start(
        ChatSession::new(
            state.gateway.clone(),
            peer_addr,
            token,
            Duration::from_secs(ws_config.heartbeat_interval_secs),
            Duration::from_secs(ws_config.client_timeout_secs),
        ),
        &req,
        stream,
    )
}

/// Actor bridging one WebSocket to the [`Gateway`].
///
/// Each client frame is handled with `ctx.wait`, so the next frame is not
/// read until the previous operation has finished.
pub struct ChatSession {
    gateway: Arc<Gateway>,
    peer_addr: String,
    token: Option<String>,
    conn: Option<ConnectionContext>,
    last_heartbeat: Instant,
    heartbeat_interval: Duration,
    client_timeout: Duration,
}

impl ChatSession {
    pub fn new(
        gateway: Arc<Gateway>,
        peer_addr: String,
        token: Option<String>,
        heartbeat_interval: Duration,
        client_timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            peer_addr,
            token,
            conn: None,
            last_heartbeat: Instant::now(),
            heartbeat_interval,
            client_timeout,
        }
    }

    fn start_heartbeat(&self, ctx: &mut <Self as Actor>::Context) {
        ctx.run_interval(self.heartbeat_interval, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > act.client_timeout {
                warn!("Heartbeat timeout for {}, closing", act.peer_addr);
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn handle_text(&mut self, text: &str, ctx: &mut <Self as Actor>::Context) {
        let event = match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => event,
            Err(e) => {
                debug!("Ignoring malformed frame from {}: {}", self.peer_addr, e);
                return;
            }
        };

        let conn = match &self.conn {
            Some(conn) => conn.clone(),
            None => return,
        };
        let gateway = self.gateway.clone();

        ctx.wait(
            async move {
                if let Err(e) = gateway.handle_event(&conn, event).await {
                    error!("Failed to handle event on connection {}: {}", conn.id, e);
                }
            }
            .into_actor(self),
        );
    }
}

impl Actor for ChatSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.start_heartbeat(ctx);

        let (tx, rx) = mpsc::unbounded_channel();
        ctx.add_stream(UnboundedReceiverStream::new(rx));

        let gateway = self.gateway.clone();
        let token = self.token.take();
        ctx.wait(
            async move { gateway.connect(token.as_deref(), tx).await }
                .into_actor(self)
                .map(|conn, act, _ctx| {
                    info!("WebSocket connection established with {} (id: {})", act.peer_addr, conn.id);
                    act.conn = Some(conn);
                }),
        );
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if let Some(conn) = self.conn.take() {
            let gateway = self.gateway.clone();
            actix::spawn(async move { gateway.disconnect(conn.id).await });
        }
        info!("WebSocket connection closed with {}", self.peer_addr);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ChatSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                self.handle_text(&text, ctx);
            }
            Ok(ws::Message::Binary(bin)) => {
                debug!("Ignoring binary frame of {} bytes from {}", bin.len(), self.peer_addr);
            }
            Ok(ws::Message::Close(reason)) => {
                info!("WebSocket closed from {}: {:?}", self.peer_addr, reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(_) => {}
            Err(e) => {
                error!("Error handling WebSocket message from {}: {}", self.peer_addr, e);
                ctx.stop();
            }
        }
    }
}

/// Events routed to this connection by the gateway.
impl StreamHandler<ServerEvent> for ChatSession {
    fn handle(&mut self, event: ServerEvent, ctx: &mut Self::Context) {
        match serde_json::to_string(&event) {
            Ok(json) => ctx.text(json),
            Err(e) => error!("Failed to serialize server event: {}", e),
        }
    }
}
