use std::sync::Arc;

use actix::{Actor, ActorContext, AsyncContext, Handler, Message as ActixMessage, StreamHandler};
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;

use pty_session::PtySession;

use crate::cookies::read_session_id;
use crate::state::AppState;

#[derive(ActixMessage)]
#[rtype(result = "()")]
struct PtyOutput(Vec<u8>);

/// One actor per browser WebSocket connection, owning the PTY it spawned.
/// The single `PtySession::read()` loop lives in a spawned task so it
/// keeps draining output even between `StreamHandler` polls; results are
/// relayed back into the actor's mailbox as `PtyOutput` messages, the
/// standard actix pattern for feeding actor state from outside its own
/// stream. See SPEC_FULL.md §4.1/§4.2.
struct PtyWsActor {
    pty: Arc<PtySession>,
}

impl Actor for PtyWsActor {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let pty = self.pty.clone();
        let addr = ctx.address();
        tokio::spawn(async move {
            loop {
                let chunk = pty.read().await;
                if chunk.is_empty() {
                    break;
                }
                if addr.try_send(PtyOutput(chunk)).is_err() {
                    break;
                }
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.pty.close();
    }
}

impl Handler<PtyOutput> for PtyWsActor {
    type Result = ();

    fn handle(&mut self, msg: PtyOutput, ctx: &mut Self::Context) {
        ctx.binary(msg.0);
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ControlMessage {
    Resize { cols: u16, rows: u16 },
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for PtyWsActor {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                if let Ok(ControlMessage::Resize { cols, rows }) = serde_json::from_str(&text) {
                    self.pty.resize(cols, rows);
                } else if let Err(e) = self.pty.write(&text) {
                    log::warn!("pty write failed: {e}");
                }
            }
            Ok(ws::Message::Binary(bin)) => {
                if let Ok(text) = std::str::from_utf8(&bin) {
                    if let Err(e) = self.pty.write(text) {
                        log::warn!("pty write failed: {e}");
                    }
                }
            }
            Ok(ws::Message::Ping(bytes)) => ctx.pong(&bytes),
            Ok(ws::Message::Close(reason)) => {
                self.pty.close();
                ctx.close(reason);
                ctx.stop();
            }
            _ => {}
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TerminalQuery {
    #[serde(default = "default_cols")]
    cols: u16,
    #[serde(default = "default_rows")]
    rows: u16,
}

fn default_cols() -> u16 {
    80
}

fn default_rows() -> u16 {
    24
}

pub async fn terminal(
    req: HttpRequest,
    stream: web::Payload,
    query: web::Query<TerminalQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let session_id =
        read_session_id(&req, &state.config).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let pty = Arc::new(
        PtySession::spawn(query.cols, query.rows, None)
            .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?,
    );
    state.pty_registry.register(session_id, pty.clone());

    ws::start(PtyWsActor { pty }, &req, stream)
}
