use std::time::Instant;

use actix::AsyncContext;
use actix_web_actors::ws;
use log::{debug, info, warn};

use crate::game::ai::THINK_DELAY;
use crate::game::{Color, GameError, MoveRequest, Square, TimerMode, UndoDecision};
use crate::models::messages::{PlayerView, ServerEvent, WireMoveRequest};
use crate::models::room::{GameMode, Room};
use crate::websocket::handler::FogChessWebSocket;

/// Session ids of every human still seated in the room.
pub fn connected_sessions(room: &Room) -> Vec<String> {
    room.players()
        .iter()
        .filter_map(|p| p.session_id.clone())
        .collect()
}

impl FogChessWebSocket {
    pub fn handle_create_room(
        &mut self,
        room_name: String,
        player_name: String,
        timer_mode: Option<TimerMode>,
        game_mode: Option<GameMode>,
        user_id: Option<i64>,
        ctx: &mut ws::WebsocketContext<Self>,
    ) {
        info!("Creating new room: {}", room_name);

        let timer_mode = timer_mode.unwrap_or(TimerMode::Unlimited);
        let game_mode = game_mode.unwrap_or(GameMode::Normal);

        let (handle, _creator) = self.app_state.registry.create_room(
            room_name,
            player_name,
            self.id.clone(),
            user_id,
            timer_mode,
            game_mode,
        );

        let (room_view, game_state) = {
            let room = handle.lock().unwrap();
            (room.room_view(), room.game_state_view())
        };

        self.send_self(ctx, &ServerEvent::RoomCreated { room: room_view });
        self.send_self(ctx, &ServerEvent::GameUpdated { game_state });
    }

    pub fn handle_join_room(
        &mut self,
        room_id: String,
        player_name: String,
        user_id: Option<i64>,
        ctx: &mut ws::WebsocketContext<Self>,
    ) {
        info!("Session {} joining room {}", self.id, room_id);

        let handle = match self.app_state.registry.get(&room_id) {
            Some(handle) => handle,
            None => return self.send_error(ctx, &GameError::RoomNotFound),
        };

        let joined = {
            let mut room = handle.lock().unwrap();
            match room.join(player_name, self.id.clone(), user_id) {
                Ok(player) => Ok((
                    PlayerView::from(&player),
                    room.room_view(),
                    room.game_state_view(),
                    connected_sessions(&room),
                )),
                Err(err) => Err(err),
            }
        };

        match joined {
            Ok((player, room_view, game_state, recipients)) => {
                self.send_self(
                    ctx,
                    &ServerEvent::RoomJoined {
                        room: room_view.clone(),
                        player: player.clone(),
                    },
                );
                self.send_to_sessions(
                    &recipients,
                    &ServerEvent::PlayerJoined {
                        player,
                        room: room_view,
                    },
                );
                self.send_to_sessions(&recipients, &ServerEvent::GameUpdated { game_state });
            }
            Err(err) => self.send_error(ctx, &err),
        }
    }

    pub fn handle_make_move(
        &mut self,
        room_id: String,
        mv: WireMoveRequest,
        ctx: &mut ws::WebsocketContext<Self>,
    ) {
        info!("Processing move in room {}: {} -> {}", room_id, mv.from, mv.to);

        let handle = match self.app_state.registry.get(&room_id) {
            Some(handle) => handle,
            None => return self.send_error(ctx, &GameError::RoomNotFound),
        };

        let req = MoveRequest {
            from: mv.from,
            to: mv.to,
            promotion: mv.promotion,
        };

        let result = {
            let mut room = handle.lock().unwrap();
            match room.player_by_session(&self.id).map(|p| p.color) {
                None => Err(GameError::PlayerNotFound),
                Some(color) => room.make_move(color, &req, Instant::now()).map(|outcome| {
                    (
                        outcome,
                        room.game_state_view(),
                        connected_sessions(&room),
                        room.ai_turn_pending(),
                    )
                }),
            }
        };

        match result {
            Ok((outcome, game_state, recipients, ai_pending)) => {
                self.send_to_sessions(
                    &recipients,
                    &ServerEvent::MoveMade {
                        mv: outcome.record,
                        game_state: game_state.clone(),
                    },
                );
                if outcome.finished {
                    self.send_to_sessions(&recipients, &ServerEvent::GameUpdated { game_state });
                }
                if ai_pending {
                    self.schedule_ai_move(room_id, ctx);
                }
            }
            Err(err) => self.send_error(ctx, &err),
        }
    }

    pub fn handle_get_legal_moves(
        &mut self,
        room_id: String,
        square: Square,
        ctx: &mut ws::WebsocketContext<Self>,
    ) {
        let handle = match self.app_state.registry.get(&room_id) {
            Some(handle) => handle,
            None => return self.send_error(ctx, &GameError::RoomNotFound),
        };

        let result = {
            let room = handle.lock().unwrap();
            match room.player_by_session(&self.id).map(|p| p.color) {
                None => Err(GameError::PlayerNotFound),
                Some(color) => room.reachable_for(color, square),
            }
        };

        match result {
            Ok(moves) => self.send_self(ctx, &ServerEvent::LegalMoves { square, moves }),
            Err(err) => self.send_error(ctx, &err),
        }
    }

    pub fn handle_request_undo(&mut self, room_id: String, ctx: &mut ws::WebsocketContext<Self>) {
        let handle = match self.app_state.registry.get(&room_id) {
            Some(handle) => handle,
            None => return self.send_error(ctx, &GameError::RoomNotFound),
        };

        let result = {
            let mut room = handle.lock().unwrap();
            match room
                .player_by_session(&self.id)
                .map(|p| (p.color, p.name.clone()))
            {
                None => Err(GameError::PlayerNotFound),
                Some((color, name)) => room
                    .request_undo(color)
                    .map(|attempts_left| (name, attempts_left, connected_sessions(&room))),
            }
        };

        match result {
            Ok((from_player, attempts_left, recipients)) => {
                let others = without_session(recipients, &self.id);
                self.send_to_sessions(
                    &others,
                    &ServerEvent::UndoRequested {
                        from_player,
                        attempts_left,
                    },
                );
            }
            Err(err) => self.send_error(ctx, &err),
        }
    }

    pub fn handle_respond_undo(
        &mut self,
        room_id: String,
        accepted: bool,
        ctx: &mut ws::WebsocketContext<Self>,
    ) {
        let handle = match self.app_state.registry.get(&room_id) {
            Some(handle) => handle,
            None => return self.send_error(ctx, &GameError::RoomNotFound),
        };

        let result = {
            let mut room = handle.lock().unwrap();
            match room.player_by_session(&self.id).map(|p| p.color) {
                None => Err(GameError::PlayerNotFound),
                Some(color) => room.respond_undo(color, accepted).map(|decision| {
                    let executed = matches!(decision, UndoDecision::Execute { .. });
                    let game_state = executed.then(|| room.game_state_view());
                    (game_state, connected_sessions(&room))
                }),
            }
        };

        match result {
            Ok((game_state, recipients)) => {
                let others = without_session(recipients.clone(), &self.id);
                self.send_to_sessions(&others, &ServerEvent::UndoResponse { accepted });
                if let Some(game_state) = game_state {
                    self.send_to_sessions(&recipients, &ServerEvent::UndoExecuted { game_state });
                }
            }
            Err(err) => self.send_error(ctx, &err),
        }
    }

    pub fn handle_request_draw(&mut self, room_id: String, ctx: &mut ws::WebsocketContext<Self>) {
        let handle = match self.app_state.registry.get(&room_id) {
            Some(handle) => handle,
            None => return self.send_error(ctx, &GameError::RoomNotFound),
        };

        let result = {
            let mut room = handle.lock().unwrap();
            match room
                .player_by_session(&self.id)
                .map(|p| (p.color, p.name.clone()))
            {
                None => Err(GameError::PlayerNotFound),
                Some((color, name)) => room
                    .request_draw(color)
                    .map(|()| (name, connected_sessions(&room))),
            }
        };

        match result {
            Ok((from_player, recipients)) => {
                let others = without_session(recipients, &self.id);
                self.send_to_sessions(&others, &ServerEvent::DrawRequested { from_player });
            }
            Err(err) => self.send_error(ctx, &err),
        }
    }

    pub fn handle_respond_draw(
        &mut self,
        room_id: String,
        accepted: bool,
        ctx: &mut ws::WebsocketContext<Self>,
    ) {
        let handle = match self.app_state.registry.get(&room_id) {
            Some(handle) => handle,
            None => return self.send_error(ctx, &GameError::RoomNotFound),
        };

        let result = {
            let mut room = handle.lock().unwrap();
            match room.player_by_session(&self.id).map(|p| p.color) {
                None => Err(GameError::PlayerNotFound),
                Some(color) => room.respond_draw(color, accepted).map(|agreed| {
                    let game_state = agreed.then(|| room.game_state_view());
                    (game_state, connected_sessions(&room))
                }),
            }
        };

        match result {
            Ok((game_state, recipients)) => {
                let others = without_session(recipients.clone(), &self.id);
                self.send_to_sessions(&others, &ServerEvent::DrawResponse { accepted });
                if let Some(game_state) = game_state {
                    self.send_to_sessions(&recipients, &ServerEvent::GameUpdated { game_state });
                }
            }
            Err(err) => self.send_error(ctx, &err),
        }
    }

    pub fn handle_surrender(&mut self, room_id: String, ctx: &mut ws::WebsocketContext<Self>) {
        let handle = match self.app_state.registry.get(&room_id) {
            Some(handle) => handle,
            None => return self.send_error(ctx, &GameError::RoomNotFound),
        };

        let result = {
            let mut room = handle.lock().unwrap();
            match room.player_by_session(&self.id).map(|p| p.color) {
                None => Err(GameError::PlayerNotFound),
                Some(color) => room
                    .surrender(color)
                    .map(|()| (room.game_state_view(), connected_sessions(&room))),
            }
        };

        match result {
            Ok((game_state, recipients)) => {
                self.send_to_sessions(&recipients, &ServerEvent::GameUpdated { game_state });
            }
            Err(err) => self.send_error(ctx, &err),
        }
    }

    pub fn handle_report_timeout(
        &mut self,
        room_id: String,
        player: Color,
        ctx: &mut ws::WebsocketContext<Self>,
    ) {
        info!("Timeout reported in room {} against {}", room_id, player);

        let handle = match self.app_state.registry.get(&room_id) {
            Some(handle) => handle,
            None => return self.send_error(ctx, &GameError::RoomNotFound),
        };

        let result = {
            let mut room = handle.lock().unwrap();
            room.report_timeout(player, Instant::now())
                .map(|()| (room.game_state_view(), connected_sessions(&room)))
        };

        match result {
            Ok((game_state, recipients)) => {
                self.send_to_sessions(&recipients, &ServerEvent::GameUpdated { game_state });
            }
            Err(err) => self.send_error(ctx, &err),
        }
    }

    pub fn handle_leave_room(&mut self, room_id: String, ctx: &mut ws::WebsocketContext<Self>) {
        info!("Session {} leaving room {}", self.id, room_id);

        let handle = match self.app_state.registry.get(&room_id) {
            Some(handle) => handle,
            None => return self.send_error(ctx, &GameError::RoomNotFound),
        };

        let result = {
            let mut room = handle.lock().unwrap();
            match room.leave_by_session(&self.id) {
                Ok(outcome) => Ok((outcome, room.game_state_view(), connected_sessions(&room))),
                Err(err) => Err(err),
            }
        };

        match result {
            Ok((outcome, game_state, recipients)) => {
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
            Err(err) => self.send_error(ctx, &err),
        }
    }

    pub fn handle_time_sync(&mut self, room_id: String, ctx: &mut ws::WebsocketContext<Self>) {
        let handle = match self.app_state.registry.get(&room_id) {
            Some(handle) => handle,
            None => return self.send_error(ctx, &GameError::RoomNotFound),
        };

        let result = {
            let room = handle.lock().unwrap();
            room.clocks_view()
        };

        match result {
            Ok(clocks) => self.send_self(ctx, &ServerEvent::ClockUpdate { clocks }),
            Err(err) => self.send_error(ctx, &err),
        }
    }

    pub fn send_error(&self, ctx: &mut ws::WebsocketContext<Self>, err: &GameError) {
        warn!("Rejected client request: {}", err);
        self.send_self(
            ctx,
            &ServerEvent::Error {
                message: err.to_string(),
            },
        );
    }

    /// Queues the computer reply after a short pause so the move does not
    /// land instantly on the opponent's screen.
    pub fn schedule_ai_move(&self, room_id: String, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_later(THINK_DELAY, move |act, _ctx| {
            act.drive_ai_move(&room_id);
        });
    }

    fn drive_ai_move(&self, room_id: &str) {
        let handle = match self.app_state.registry.get(room_id) {
            Some(handle) => handle,
            None => return,
        };

        // Snapshot the engine under the lock, search outside it
        let ai = {
            let room = handle.lock().unwrap();
            if !room.ai_turn_pending() {
                return;
            }
            room.ai_replica()
        };
        let ai = match ai {
            Some(ai) => ai,
            None => return,
        };

        let mut rng = rand::rng();
        let chosen = ai.choose_move(&mut rng);

        let (events, recipients) = {
            let mut room = handle.lock().unwrap();
            // The game may have ended while the search ran
            if !room.ai_turn_pending() {
                return;
            }
            let events = match chosen {
                None => match room.finish_by_stall() {
                    Ok(()) => vec![ServerEvent::GameUpdated {
                        game_state: room.game_state_view(),
                    }],
                    Err(err) => {
                        debug!("AI stall finish rejected in room {}: {}", room_id, err);
                        return;
                    }
                },
                Some(req) => match room.make_move(ai.color(), &req, Instant::now()) {
                    Ok(outcome) => {
                        let game_state = room.game_state_view();
                        let mut events = vec![ServerEvent::MoveMade {
                            mv: outcome.record,
                            game_state: game_state.clone(),
                        }];
                        if outcome.finished {
                            events.push(ServerEvent::GameUpdated { game_state });
                        }
                        events
                    }
                    Err(err) => {
                        debug!("AI move rejected in room {}: {}", room_id, err);
                        return;
                    }
                },
            };
            (events, connected_sessions(&room))
        };

        for event in &events {
            self.send_to_sessions(&recipients, event);
        }
    }
}

fn without_session(mut session_ids: Vec<String>, session_id: &str) -> Vec<String> {
    session_ids.retain(|id| id != session_id);
    session_ids
}
