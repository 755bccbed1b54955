use std::sync::Arc;
use std::time::Instant;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::ai::DEFAULT_DIFFICULTY;
use crate::game::{
    fog, AIOpponent, BoardEngine, ClockArbiter, Color, GameError, Move, MoveRequest, Square,
    TimerMode, UndoDecision, UndoNegotiator,
};
use crate::models::messages::{ClocksView, GameStateView, PlayerView, RoomView};
use crate::models::now_millis;
use crate::storage::{ArchivedGame, GameArchiver, RoomStore, StoredPlayer, StoredRoom};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Waiting,
    Playing,
    Finished,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    Normal,
    Ai,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    White,
    Black,
    Draw,
}

impl Winner {
    pub fn from_color(color: Color) -> Winner {
        match color {
            Color::White => Winner::White,
            Color::Black => Winner::Black,
        }
    }
}

/// How a finished game ended, recorded for the archive.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    KingCapture,
    Surrender,
    DrawAgreement,
    Timeout,
    NoMoves,
}

/// A seated player. The computer seat has no session.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: String,
    pub name: String,
    pub color: Color,
    pub session_id: Option<String>,
    pub user_id: Option<i64>,
}

impl Player {
    pub fn is_ai(&self) -> bool {
        self.session_id.is_none()
    }
}

/// Result of applying a move through the room.
#[derive(Debug, Clone)]
pub struct MoveOutcome {
    pub record: Move,
    pub finished: bool,
}

#[derive(Debug, Clone)]
pub struct LeaveOutcome {
    pub player: Player,
    pub destroy_room: bool,
}

/// One game room: seats, board, clock, and the negotiation state that goes
/// with them. All methods expect the caller to hold the room's lock.
pub struct Room {
    pub id: String,
    pub name: String,
    players: Vec<Player>,
    engine: BoardEngine,
    clock: Option<ClockArbiter>,
    undo: UndoNegotiator,
    draw_pending: Option<Color>,
    ai: Option<AIOpponent>,
    timer_mode: TimerMode,
    game_mode: GameMode,
    status: RoomStatus,
    winner: Option<Winner>,
    timed_out: bool,
    closed: bool,
    created_at: u64,
    store: Arc<dyn RoomStore>,
    archiver: Arc<dyn GameArchiver>,
}

impl Room {
    pub fn new(
        name: String,
        timer_mode: TimerMode,
        game_mode: GameMode,
        store: Arc<dyn RoomStore>,
        archiver: Arc<dyn GameArchiver>,
    ) -> Self {
        Room {
            id: Uuid::new_v4().to_string(),
            name,
            players: Vec::new(),
            engine: BoardEngine::new(),
            clock: None,
            undo: UndoNegotiator::new(),
            draw_pending: None,
            ai: None,
            timer_mode,
            game_mode,
            status: RoomStatus::Waiting,
            winner: None,
            timed_out: false,
            closed: false,
            created_at: now_millis(),
            store,
            archiver,
        }
    }

    /// Seats the creating player on white. For an AI room this also fills
    /// the black seat with the computer and starts the game on the spot.
    pub fn seat_creator(
        &mut self,
        name: String,
        session_id: String,
        user_id: Option<i64>,
    ) -> Player {
        let player = Player {
            id: Uuid::new_v4().to_string(),
            name,
            color: Color::White,
            session_id: Some(session_id),
            user_id,
        };
        self.players.push(player.clone());
        if self.game_mode == GameMode::Ai {
            self.ai = Some(AIOpponent::new(Color::Black, DEFAULT_DIFFICULTY));
            self.players.push(Player {
                id: Uuid::new_v4().to_string(),
                name: "AI".to_string(),
                color: Color::Black,
                session_id: None,
                user_id: None,
            });
            self.start_fresh_game();
        }
        self.persist();
        self.persist_players();
        player
    }

    /// Fills the second seat. The game starts immediately on a fresh board
    /// and clock.
    pub fn join(
        &mut self,
        name: String,
        session_id: String,
        user_id: Option<i64>,
    ) -> Result<Player, GameError> {
        if self.closed {
            return Err(GameError::RoomNotFound);
        }
        if self.players.len() >= 2 {
            return Err(GameError::RoomFull);
        }
        if self.status != RoomStatus::Waiting {
            return Err(GameError::WrongState);
        }
        let color = self
            .players
            .first()
            .map(|p| p.color.opponent())
            .unwrap_or(Color::White);
        let player = Player {
            id: Uuid::new_v4().to_string(),
            name,
            color,
            session_id: Some(session_id),
            user_id,
        };
        self.players.push(player.clone());
        self.start_fresh_game();
        self.persist();
        self.persist_players();
        Ok(player)
    }

    fn start_fresh_game(&mut self) {
        self.engine = BoardEngine::new();
        self.undo = UndoNegotiator::new();
        self.draw_pending = None;
        self.winner = None;
        self.timed_out = false;
        self.status = RoomStatus::Playing;
        self.clock = if self.timer_mode.is_timed() {
            Some(ClockArbiter::start(self.timer_mode, Instant::now()))
        } else {
            None
        };
        if let Some(ai) = &mut self.ai {
            ai.sync(&self.engine);
        }
        self.persist_moves_rewrite();
    }

    /// Applies a move for `color`, settling the clock against `now`, and
    /// finishes the game on a captured king or a fallen flag. A flag that
    /// fell during the move wins for the opponent even if this very move
    /// captured a king.
    pub fn make_move(
        &mut self,
        color: Color,
        req: &MoveRequest,
        now: Instant,
    ) -> Result<MoveOutcome, GameError> {
        if self.status != RoomStatus::Playing {
            return Err(GameError::WrongState);
        }
        if color != self.engine.side_to_move() {
            return Err(GameError::NotYourTurn);
        }
        let applied = self.engine.apply_move(req, now_millis())?;
        self.undo.on_move_applied(self.engine.history().len() - 1);

        let timeout = self
            .clock
            .as_mut()
            .and_then(|clock| clock.on_move_applied(color, now));
        if let Some(timeout) = timeout {
            self.finish(Winner::from_color(timeout.winner), EndReason::Timeout);
        } else if applied.captured_king.is_some() {
            self.finish(Winner::from_color(color), EndReason::KingCapture);
        }

        if let Some(ai) = &mut self.ai {
            ai.sync(&self.engine);
        }
        if let Err(err) = self.store.append_move(&self.id, &applied.record) {
            warn!("Failed to store move for room {}: {}", self.id, err);
        }
        self.persist();
        Ok(MoveOutcome {
            record: applied.record,
            finished: self.status == RoomStatus::Finished,
        })
    }

    pub fn surrender(&mut self, color: Color) -> Result<(), GameError> {
        if self.status != RoomStatus::Playing {
            return Err(GameError::WrongState);
        }
        self.finish(Winner::from_color(color.opponent()), EndReason::Surrender);
        Ok(())
    }

    /// A client says `reported`'s flag fell. The server clock decides,
    /// reading it at `now`.
    pub fn report_timeout(&mut self, reported: Color, now: Instant) -> Result<(), GameError> {
        if self.status != RoomStatus::Playing {
            return Err(GameError::WrongState);
        }
        let clock = self.clock.as_mut().ok_or(GameError::ClockDisabled)?;
        let timeout = clock
            .confirm_reported_timeout(reported, now)
            .ok_or(GameError::TimeoutNotConfirmed)?;
        self.finish(Winner::from_color(timeout.winner), EndReason::Timeout);
        Ok(())
    }

    pub fn request_undo(&mut self, color: Color) -> Result<u8, GameError> {
        if self.status != RoomStatus::Playing {
            return Err(GameError::WrongState);
        }
        self.undo
            .request(color, self.engine.history().len(), self.engine.side_to_move())
    }

    /// Answers a pending undo request. An accept replays the shortened
    /// history and frees the quota slot of the removed move.
    pub fn respond_undo(
        &mut self,
        responder: Color,
        accepted: bool,
    ) -> Result<UndoDecision, GameError> {
        if self.status != RoomStatus::Playing {
            return Err(GameError::WrongState);
        }
        let decision = self.undo.respond(responder, accepted)?;
        if matches!(decision, UndoDecision::Execute { .. }) {
            let removed_index = self.engine.history().len().saturating_sub(1);
            self.engine.undo_last()?;
            self.undo.on_undo_executed(removed_index);
            if let Some(ai) = &mut self.ai {
                ai.sync(&self.engine);
            }
            self.persist_moves_rewrite();
            self.persist();
        }
        Ok(decision)
    }

    pub fn request_draw(&mut self, color: Color) -> Result<(), GameError> {
        if self.status != RoomStatus::Playing {
            return Err(GameError::WrongState);
        }
        self.draw_pending = Some(color);
        Ok(())
    }

    pub fn respond_draw(&mut self, responder: Color, accepted: bool) -> Result<bool, GameError> {
        if self.status != RoomStatus::Playing {
            return Err(GameError::WrongState);
        }
        match self.draw_pending {
            Some(requester) if requester != responder => {
                self.draw_pending = None;
                if accepted {
                    self.finish(Winner::Draw, EndReason::DrawAgreement);
                }
                Ok(accepted)
            }
            _ => Err(GameError::NoPendingDraw),
        }
    }

    /// Reachable squares for one of the asking side's own pieces. Pieces of
    /// the other side stay behind the fog.
    pub fn reachable_for(&self, color: Color, square: Square) -> Result<Vec<String>, GameError> {
        let piece = self
            .engine
            .board()
            .piece_at(square)
            .ok_or(GameError::InvalidMove("no piece on that square"))?;
        if piece.color != color {
            return Err(GameError::NotYourPiece);
        }
        Ok(self
            .engine
            .reachable_squares(square)
            .iter()
            .map(|sq| sq.to_string())
            .collect())
    }

    /// Removes the player attached to `session_id`. The room is either left
    /// for the remaining player on a reset board, or flagged for teardown.
    pub fn leave_by_session(&mut self, session_id: &str) -> Result<LeaveOutcome, GameError> {
        let index = self
            .players
            .iter()
            .position(|p| p.session_id.as_deref() == Some(session_id))
            .ok_or(GameError::PlayerNotFound)?;
        let player = self.players.remove(index);
        if self.human_count() == 0 {
            return Ok(LeaveOutcome {
                player,
                destroy_room: true,
            });
        }
        self.status = RoomStatus::Waiting;
        self.engine = BoardEngine::new();
        self.clock = None;
        self.undo = UndoNegotiator::new();
        self.draw_pending = None;
        self.winner = None;
        self.timed_out = false;
        self.persist_moves_rewrite();
        self.persist();
        self.persist_players();
        Ok(LeaveOutcome {
            player,
            destroy_room: false,
        })
    }

    fn finish(&mut self, winner: Winner, reason: EndReason) {
        debug_assert_eq!(self.status, RoomStatus::Playing);
        self.status = RoomStatus::Finished;
        self.winner = Some(winner);
        self.timed_out = reason == EndReason::Timeout;
        let record = self.archived_game(winner, reason);
        if let Err(err) = self.archiver.archive_finished_game(&record) {
            warn!("Failed to archive game in room {}: {}", self.id, err);
        }
        self.persist();
        info!("Room {} finished: {:?} by {:?}", self.id, winner, reason);
    }

    fn archived_game(&self, winner: Winner, reason: EndReason) -> ArchivedGame {
        let seat = |color| self.players.iter().find(|p: &&Player| p.color == color);
        ArchivedGame {
            room_id: self.id.clone(),
            room_name: self.name.clone(),
            white_player: seat(Color::White)
                .map(|p| p.name.clone())
                .unwrap_or_default(),
            black_player: seat(Color::Black)
                .map(|p| p.name.clone())
                .unwrap_or_default(),
            white_user_id: seat(Color::White).and_then(|p| p.user_id),
            black_user_id: seat(Color::Black).and_then(|p| p.user_id),
            timer_mode: self.timer_mode,
            result: winner,
            end_reason: reason,
            moves: self.engine.history().to_vec(),
            final_position: self.engine.export(),
            created_at: self.created_at,
            finished_at: now_millis(),
        }
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player_by_session(&self, session_id: &str) -> Option<&Player> {
        self.players
            .iter()
            .find(|p| p.session_id.as_deref() == Some(session_id))
    }

    pub fn contains_session(&self, session_id: &str) -> bool {
        self.player_by_session(session_id).is_some()
    }

    pub fn human_count(&self) -> usize {
        self.players.iter().filter(|p| !p.is_ai()).count()
    }

    pub fn status(&self) -> RoomStatus {
        self.status
    }

    pub fn game_mode(&self) -> GameMode {
        self.game_mode
    }

    pub fn timer_mode(&self) -> TimerMode {
        self.timer_mode
    }

    pub fn winner(&self) -> Option<Winner> {
        self.winner
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Marks the room as torn down, so a joiner racing the sweeper sees a
    /// missing room instead of a ghost.
    pub fn mark_closed(&mut self) {
        self.closed = true;
    }

    pub fn ai_turn_pending(&self) -> bool {
        self.status == RoomStatus::Playing
            && self
                .ai
                .as_ref()
                .map(|ai| ai.color() == self.engine.side_to_move())
                .unwrap_or(false)
    }

    /// Clone of the computer opponent with its current replica, for running
    /// the search outside the room lock.
    pub fn ai_replica(&self) -> Option<AIOpponent> {
        self.ai.clone()
    }

    /// The computer has no move at all: the human wins immediately.
    pub fn finish_by_stall(&mut self) -> Result<(), GameError> {
        if self.status != RoomStatus::Playing {
            return Err(GameError::WrongState);
        }
        let ai_color = self
            .ai
            .as_ref()
            .map(|ai| ai.color())
            .ok_or(GameError::WrongState)?;
        self.finish(Winner::from_color(ai_color.opponent()), EndReason::NoMoves);
        Ok(())
    }

    pub fn game_state_view(&self) -> GameStateView {
        GameStateView {
            board: self.engine.export(),
            current_player: self.engine.side_to_move(),
            game_status: self.status,
            winner: self.winner,
            move_history: self.engine.history().to_vec(),
            fog_of_war: fog::compute(&self.engine),
            timeout: self.timed_out,
            clocks: self.clock.as_ref().map(|clock| self.clocks_from(clock)),
        }
    }

    fn clocks_from(&self, clock: &ClockArbiter) -> ClocksView {
        let now = Instant::now();
        let read = |color| {
            if self.status == RoomStatus::Playing {
                clock.remaining_for(color, now)
            } else {
                clock.stored_remaining(color)
            }
        };
        ClocksView {
            white: read(Color::White),
            black: read(Color::Black),
            increment: clock.increment(),
            mode: clock.mode(),
        }
    }

    /// Live clock readings for a time-sync request.
    pub fn clocks_view(&self) -> Result<ClocksView, GameError> {
        let clock = self.clock.as_ref().ok_or(GameError::ClockDisabled)?;
        Ok(self.clocks_from(clock))
    }

    pub fn room_view(&self) -> RoomView {
        RoomView {
            id: self.id.clone(),
            name: self.name.clone(),
            players: self.players.iter().map(PlayerView::from).collect(),
            game_state: self.game_state_view(),
            timer_mode: self.timer_mode,
            game_mode: self.game_mode,
        }
    }

    fn stored_room(&self) -> StoredRoom {
        StoredRoom {
            id: self.id.clone(),
            name: self.name.clone(),
            status: self.status,
            timer_mode: self.timer_mode,
            game_mode: self.game_mode,
            current_position: self.engine.export(),
            current_player: self.engine.side_to_move(),
            is_full: self.players.len() >= 2,
            created_at: self.created_at,
        }
    }

    fn persist(&self) {
        if let Err(err) = self.store.save_room(&self.stored_room()) {
            warn!("Failed to persist room {}: {}", self.id, err);
        }
    }

    fn persist_players(&self) {
        let players: Vec<StoredPlayer> = self
            .players
            .iter()
            .map(|p| StoredPlayer {
                id: p.id.clone(),
                name: p.name.clone(),
                color: p.color,
                user_id: p.user_id,
            })
            .collect();
        if let Err(err) = self.store.set_players(&self.id, &players) {
            warn!("Failed to persist players for room {}: {}", self.id, err);
        }
    }

    fn persist_moves_rewrite(&self) {
        if let Err(err) = self.store.clear_moves(&self.id) {
            warn!("Failed to clear stored moves for room {}: {}", self.id, err);
            return;
        }
        for mv in self.engine.history() {
            if let Err(err) = self.store.append_move(&self.id, mv) {
                warn!("Failed to store move for room {}: {}", self.id, err);
                break;
            }
        }
    }
}
