use std::collections::HashMap;
use std::sync::Mutex;

use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::{Color, Move, TimerMode};
use crate::models::room::{EndReason, GameMode, RoomStatus, Winner};

/// K-factor applied to rating updates for identified players.
pub const RATING_K: f64 = 24.0;

#[derive(Debug, Error)]
#[error("storage backend error: {0}")]
pub struct StorageError(pub String);

/// Room snapshot as handed to a store backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRoom {
    pub id: String,
    pub name: String,
    pub status: RoomStatus,
    pub timer_mode: TimerMode,
    pub game_mode: GameMode,
    pub current_position: String,
    pub current_player: Color,
    pub is_full: bool,
    pub created_at: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredPlayer {
    pub id: String,
    pub name: String,
    pub color: Color,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
}

/// Persistence seam for live room state. Callers treat every operation as
/// best-effort: a failing backend is logged and the game plays on.
pub trait RoomStore: Send + Sync {
    fn save_room(&self, room: &StoredRoom) -> Result<(), StorageError>;
    fn get_room(&self, room_id: &str) -> Result<Option<StoredRoom>, StorageError>;
    fn delete_room(&self, room_id: &str) -> Result<(), StorageError>;
    fn set_players(&self, room_id: &str, players: &[StoredPlayer]) -> Result<(), StorageError>;
    fn append_move(&self, room_id: &str, mv: &Move) -> Result<(), StorageError>;
    fn get_moves(&self, room_id: &str) -> Result<Vec<Move>, StorageError>;
    fn clear_moves(&self, room_id: &str) -> Result<(), StorageError>;
}

/// Completed game record passed to the archiver when a room finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedGame {
    pub room_id: String,
    pub room_name: String,
    pub white_player: String,
    pub black_player: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub white_user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub black_user_id: Option<i64>,
    pub timer_mode: TimerMode,
    pub result: Winner,
    pub end_reason: EndReason,
    pub moves: Vec<Move>,
    pub final_position: String,
    pub created_at: u64,
    pub finished_at: u64,
}

impl ArchivedGame {
    /// Rating deltas (white, black) for this result, only when both seats
    /// belong to identified users.
    pub fn rating_deltas(&self, white_rating: f64, black_rating: f64) -> Option<(i32, i32)> {
        if self.white_user_id.is_none() || self.black_user_id.is_none() {
            return None;
        }
        let (white_score, black_score) = match self.result {
            Winner::White => (1.0, 0.0),
            Winner::Black => (0.0, 1.0),
            Winner::Draw => (0.5, 0.5),
        };
        Some((
            rating_delta(white_rating, black_rating, white_score),
            rating_delta(black_rating, white_rating, black_score),
        ))
    }
}

/// Elo expected score for `rating` against `opponent`.
pub fn expected_score(rating: f64, opponent: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((opponent - rating) / 400.0))
}

pub fn rating_delta(rating: f64, opponent: f64, score: f64) -> i32 {
    (RATING_K * (score - expected_score(rating, opponent))).round() as i32
}

/// Archive sink for finished games. Invoked exactly once per game.
pub trait GameArchiver: Send + Sync {
    fn archive_finished_game(&self, game: &ArchivedGame) -> Result<(), StorageError>;
}

/// Process-local store used when no external backend is configured. State
/// disappears with the process, which is all the live server needs.
#[derive(Default)]
pub struct MemoryRoomStore {
    rooms: Mutex<HashMap<String, StoredRoom>>,
    players: Mutex<HashMap<String, Vec<StoredPlayer>>>,
    moves: Mutex<HashMap<String, Vec<Move>>>,
}

impl MemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RoomStore for MemoryRoomStore {
    fn save_room(&self, room: &StoredRoom) -> Result<(), StorageError> {
        self.rooms
            .lock()
            .unwrap()
            .insert(room.id.clone(), room.clone());
        Ok(())
    }

    fn get_room(&self, room_id: &str) -> Result<Option<StoredRoom>, StorageError> {
        Ok(self.rooms.lock().unwrap().get(room_id).cloned())
    }

    fn delete_room(&self, room_id: &str) -> Result<(), StorageError> {
        self.rooms.lock().unwrap().remove(room_id);
        self.players.lock().unwrap().remove(room_id);
        self.moves.lock().unwrap().remove(room_id);
        Ok(())
    }

    fn set_players(&self, room_id: &str, players: &[StoredPlayer]) -> Result<(), StorageError> {
        self.players
            .lock()
            .unwrap()
            .insert(room_id.to_string(), players.to_vec());
        Ok(())
    }

    fn append_move(&self, room_id: &str, mv: &Move) -> Result<(), StorageError> {
        self.moves
            .lock()
            .unwrap()
            .entry(room_id.to_string())
            .or_default()
            .push(mv.clone());
        Ok(())
    }

    fn get_moves(&self, room_id: &str) -> Result<Vec<Move>, StorageError> {
        Ok(self
            .moves
            .lock()
            .unwrap()
            .get(room_id)
            .cloned()
            .unwrap_or_default())
    }

    fn clear_moves(&self, room_id: &str) -> Result<(), StorageError> {
        self.moves.lock().unwrap().remove(room_id);
        Ok(())
    }
}

/// Archiver used when no database is configured: the result only goes to
/// the log.
pub struct LogArchiver;

impl GameArchiver for LogArchiver {
    fn archive_finished_game(&self, game: &ArchivedGame) -> Result<(), StorageError> {
        info!(
            "Archived game in room {} ({}): {:?} by {:?} after {} moves",
            game.room_id,
            game.room_name,
            game.result,
            game.end_reason,
            game.moves.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{PieceType, Square};

    fn sample_move() -> Move {
        Move {
            from: Square::from_algebraic("e2").unwrap(),
            to: Square::from_algebraic("e4").unwrap(),
            piece: PieceType::Pawn,
            captured: None,
            promotion: None,
            timestamp: 1,
            color: Color::White,
        }
    }

    fn sample_room(id: &str) -> StoredRoom {
        StoredRoom {
            id: id.to_string(),
            name: "test".to_string(),
            status: RoomStatus::Waiting,
            timer_mode: TimerMode::Unlimited,
            game_mode: GameMode::Normal,
            current_position: crate::game::BoardEngine::new().export(),
            current_player: Color::White,
            is_full: false,
            created_at: 0,
        }
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryRoomStore::new();
        store.save_room(&sample_room("r1")).unwrap();
        assert_eq!(store.get_room("r1").unwrap().unwrap().name, "test");
        store.append_move("r1", &sample_move()).unwrap();
        store.append_move("r1", &sample_move()).unwrap();
        assert_eq!(store.get_moves("r1").unwrap().len(), 2);
        store.clear_moves("r1").unwrap();
        assert!(store.get_moves("r1").unwrap().is_empty());
        store.delete_room("r1").unwrap();
        assert!(store.get_room("r1").unwrap().is_none());
    }

    #[test]
    fn equal_ratings_swing_half_k() {
        assert_eq!(expected_score(1500.0, 1500.0), 0.5);
        assert_eq!(rating_delta(1500.0, 1500.0, 1.0), 12);
        assert_eq!(rating_delta(1500.0, 1500.0, 0.0), -12);
        assert_eq!(rating_delta(1500.0, 1500.0, 0.5), 0);
    }

    #[test]
    fn underdog_gains_more() {
        let gain = rating_delta(1400.0, 1600.0, 1.0);
        let favourite_gain = rating_delta(1600.0, 1400.0, 1.0);
        assert!(gain > favourite_gain);
        assert!(gain > 12);
    }

    #[test]
    fn anonymous_games_do_not_rate() {
        let mut game = ArchivedGame {
            room_id: "r".into(),
            room_name: "r".into(),
            white_player: "w".into(),
            black_player: "b".into(),
            white_user_id: Some(1),
            black_user_id: None,
            timer_mode: TimerMode::Rapid,
            result: Winner::White,
            end_reason: EndReason::KingCapture,
            moves: vec![],
            final_position: String::new(),
            created_at: 0,
            finished_at: 0,
        };
        assert!(game.rating_deltas(1500.0, 1500.0).is_none());
        game.black_user_id = Some(2);
        assert_eq!(game.rating_deltas(1500.0, 1500.0), Some((12, -12)));
    }
}
