use actix::*;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use log::{info, warn};
use uuid::Uuid;

use crate::models::messages::{ClientEvent, ServerEvent, SessionMessage};
use crate::models::AppState;
use crate::websocket::game_handlers::connected_sessions;

/// WebSocket session for one connected player.
pub struct FogChessWebSocket {
    pub id: String,
    pub app_state: web::Data<AppState>,
}

impl Actor for FogChessWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        // Register the actor with the application state
        let addr = ctx.address();
        self.app_state
            .sessions
            .lock()
            .unwrap()
            .insert(self.id.clone(), addr);

        let total_sessions = self.app_state.sessions.lock().unwrap().len();
        info!("WebSocket connection started: {}", self.id);
        info!("Total active sessions: {}", total_sessions);
    }

    fn stopping(&mut self, _: &mut Self::Context) -> Running {
        // A dropped connection counts as leaving every room it was seated in
        for (room_id, handle) in self.app_state.registry.rooms_for_session(&self.id) {
            let left = {
                let mut room = handle.lock().unwrap();
                match room.leave_by_session(&self.id) {
                    Ok(outcome) => {
                        Some((outcome, room.game_state_view(), connected_sessions(&room)))
                    }
                    Err(_) => None,
                }
            };
            if let Some((outcome, game_state, recipients)) = left {
                info!(
                    "Removed disconnected player {} from room {}",
                    outcome.player.id, room_id
                );
                if outcome.destroy_room {
                    self.app_state.registry.remove_if_empty(&room_id);
                } else {
                    self.send_to_sessions(
                        &recipients,
                        &ServerEvent::PlayerLeft {
                            player_id: outcome.player.id,
                        },
                    );
                    self.send_to_sessions(&recipients, &ServerEvent::GameUpdated { game_state });
                }
            }
        }

        self.app_state.sessions.lock().unwrap().remove(&self.id);
        let total_sessions = self.app_state.sessions.lock().unwrap().len();
        info!("WebSocket connection closed: {}", self.id);
        info!("Total active sessions: {}", total_sessions);

        Running::Stop
    }
}

impl Handler<SessionMessage> for FogChessWebSocket {
    type Result = ();

    fn handle(&mut self, msg: SessionMessage, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

// WebSocket message handler
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for FogChessWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                // Do nothing for pong messages
            }
            Ok(ws::Message::Text(text)) => {
                info!("Received text message: {}", text);
                match serde_json::from_str::<ClientEvent>(text.as_ref()) {
                    Ok(event) => {
                        self.handle_event(event, ctx);
                    }
                    Err(e) => {
                        warn!("Error parsing client message: {}", e);
                        self.send_self(
                            ctx,
                            &ServerEvent::Error {
                                message: format!("Invalid message format: {}", e),
                            },
                        );
                    }
                }
            }
            Ok(ws::Message::Binary(_)) => {
                warn!("Binary messages are not supported");
                self.send_self(
                    ctx,
                    &ServerEvent::Error {
                        message: "Binary messages are not supported".to_string(),
                    },
                );
            }
            Ok(ws::Message::Close(reason)) => {
                info!("Connection closed: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            _ => {
                ctx.stop();
            }
        }
    }
}

impl FogChessWebSocket {
    pub fn handle_event(&mut self, event: ClientEvent, ctx: &mut ws::WebsocketContext<Self>) {
        match event {
            ClientEvent::CreateRoom {
                room_name,
                player_name,
                timer_mode,
                game_mode,
                user_id,
            } => self.handle_create_room(room_name, player_name, timer_mode, game_mode, user_id, ctx),
            ClientEvent::JoinRoom {
                room_id,
                player_name,
                user_id,
            } => self.handle_join_room(room_id, player_name, user_id, ctx),
            ClientEvent::MakeMove { room_id, mv } => self.handle_make_move(room_id, mv, ctx),
            ClientEvent::GetLegalMoves { room_id, square } => {
                self.handle_get_legal_moves(room_id, square, ctx)
            }
            ClientEvent::RequestUndo { room_id } => self.handle_request_undo(room_id, ctx),
            ClientEvent::RespondUndo { room_id, accepted } => {
                self.handle_respond_undo(room_id, accepted, ctx)
            }
            ClientEvent::RequestDraw { room_id } => self.handle_request_draw(room_id, ctx),
            ClientEvent::RespondDraw { room_id, accepted } => {
                self.handle_respond_draw(room_id, accepted, ctx)
            }
            ClientEvent::Surrender { room_id } => self.handle_surrender(room_id, ctx),
            ClientEvent::ReportTimeout { room_id, player } => {
                self.handle_report_timeout(room_id, player, ctx)
            }
            ClientEvent::LeaveRoom { room_id } => self.handle_leave_room(room_id, ctx),
            ClientEvent::TimeSync { room_id } => self.handle_time_sync(room_id, ctx),
        }
    }

    /// Sends one event to this session only.
    pub fn send_self(&self, ctx: &mut ws::WebsocketContext<Self>, event: &ServerEvent) {
        match serde_json::to_string(event) {
            Ok(payload) => ctx.text(payload),
            Err(e) => warn!("Error serializing message: {}", e),
        }
    }

    /// Fans one event out to the given session ids.
    pub fn send_to_sessions(&self, session_ids: &[String], event: &ServerEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(s) => s,
            Err(e) => {
                warn!("Error serializing message: {}", e);
                return;
            }
        };
        let sessions = self.app_state.sessions.lock().unwrap();
        for session_id in session_ids {
            if let Some(addr) = sessions.get(session_id) {
                addr.do_send(SessionMessage(payload.clone()));
            } else {
                warn!("Session not found for connection ID: {}", session_id);
            }
        }
    }
}

/// WebSocket connection handler
pub async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let id = Uuid::new_v4().to_string();
    info!("New WebSocket connection request: {}", id);

    let session = FogChessWebSocket {
        id,
        app_state: app_state.clone(),
    };
    let resp = ws::start(session, &req, stream)?;
    Ok(resp)
}
