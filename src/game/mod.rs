pub mod ai;
pub mod board;
pub mod clock;
pub mod engine;
pub mod error;
pub mod fog;
pub mod undo;

pub use ai::AIOpponent;
pub use board::{Board, Color, Piece, PieceType, Square};
pub use clock::{ClockArbiter, TimerMode, Timeout};
pub use engine::{AppliedMove, BoardEngine, Move, MoveRequest};
pub use error::GameError;
pub use fog::FogOfWar;
pub use undo::{UndoDecision, UndoNegotiator, MAX_UNDO_ATTEMPTS};
