use thiserror::Error;

/// Everything a client request can fail with. The display strings are sent
/// verbatim in error events, so they are phrased for players.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("Invalid move: {0}")]
    InvalidMove(&'static str),
    #[error("Not your turn")]
    NotYourTurn,
    #[error("Not your piece")]
    NotYourPiece,
    #[error("Game is not in playing state")]
    WrongState,
    #[error("No moves to undo")]
    NoMovesToUndo,
    #[error("Cannot undo on your own turn")]
    NotYourTurnToUndo,
    #[error("Maximum undo attempts reached for this move")]
    MaxAttemptsReached,
    #[error("No pending undo request")]
    NoPendingUndo,
    #[error("No pending draw request")]
    NoPendingDraw,
    #[error("Room not found")]
    RoomNotFound,
    #[error("Room is full")]
    RoomFull,
    #[error("Player not found in room")]
    PlayerNotFound,
    #[error("Timers are disabled in this room")]
    ClockDisabled,
    #[error("Timeout rejected: that clock has not run out")]
    TimeoutNotConfirmed,
}
