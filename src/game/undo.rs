use std::collections::HashMap;

use super::board::Color;
use super::error::GameError;

/// Each move index grants this many undo requests before the side that
/// played it has to live with the move.
pub const MAX_UNDO_ATTEMPTS: u8 = 2;

/// Outcome of an undo response, carrying who asked so the caller can route
/// notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoDecision {
    Execute { requester: Color },
    Declined { requester: Color },
}

/// Tracks undo negotiation for one game. Attempt counters are keyed by the
/// history index of the move being taken back, so playing a new move at an
/// index starts its quota fresh.
#[derive(Debug, Clone, Default)]
pub struct UndoNegotiator {
    attempts: HashMap<usize, u8>,
    pending: Option<Color>,
}

impl UndoNegotiator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A request to take back the last move. Only the side that just moved
    /// may ask, which is the side whose turn it is not.
    pub fn request(
        &mut self,
        requester: Color,
        history_len: usize,
        side_to_move: Color,
    ) -> Result<u8, GameError> {
        if history_len == 0 {
            return Err(GameError::NoMovesToUndo);
        }
        if requester == side_to_move {
            return Err(GameError::NotYourTurnToUndo);
        }
        let index = history_len - 1;
        let used = self.attempts.entry(index).or_insert(0);
        if *used >= MAX_UNDO_ATTEMPTS {
            return Err(GameError::MaxAttemptsReached);
        }
        *used += 1;
        let left = MAX_UNDO_ATTEMPTS - *used;
        self.pending = Some(requester);
        Ok(left)
    }

    /// The opponent's answer to a pending request. Consumes the pending
    /// marker either way; an accept still leaves the attempt spent.
    pub fn respond(&mut self, responder: Color, accepted: bool) -> Result<UndoDecision, GameError> {
        match self.pending {
            Some(requester) if requester != responder => {
                self.pending = None;
                Ok(if accepted {
                    UndoDecision::Execute { requester }
                } else {
                    UndoDecision::Declined { requester }
                })
            }
            _ => Err(GameError::NoPendingUndo),
        }
    }

    /// Called when the undone move has been removed from history, so a
    /// replacement move at that index gets a fresh quota.
    pub fn on_undo_executed(&mut self, removed_index: usize) {
        self.attempts.remove(&removed_index);
    }

    /// Called after any move is applied: a pending request (if the opponent
    /// moved on instead of answering) is moot, and the counter for the index
    /// now holding a brand-new move is cleared.
    pub fn on_move_applied(&mut self, index: usize) {
        self.attempts.remove(&index);
        self.pending = None;
    }

    pub fn pending_requester(&self) -> Option<Color> {
        self.pending
    }

    #[cfg(test)]
    fn used_for(&self, index: usize) -> u8 {
        self.attempts.get(&index).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_mover_may_ask() {
        let mut undo = UndoNegotiator::new();
        // white just played move 0, so black is to move
        assert_eq!(
            undo.request(Color::Black, 1, Color::Black),
            Err(GameError::NotYourTurnToUndo)
        );
        assert_eq!(undo.request(Color::White, 1, Color::Black), Ok(1));
    }

    #[test]
    fn nothing_to_undo() {
        let mut undo = UndoNegotiator::new();
        assert_eq!(
            undo.request(Color::White, 0, Color::White),
            Err(GameError::NoMovesToUndo)
        );
    }

    #[test]
    fn two_attempts_then_exhausted() {
        let mut undo = UndoNegotiator::new();
        assert_eq!(undo.request(Color::White, 1, Color::Black), Ok(1));
        undo.respond(Color::Black, false).unwrap();
        assert_eq!(undo.request(Color::White, 1, Color::Black), Ok(0));
        undo.respond(Color::Black, false).unwrap();
        assert_eq!(
            undo.request(Color::White, 1, Color::Black),
            Err(GameError::MaxAttemptsReached)
        );
    }

    #[test]
    fn new_move_at_the_index_resets_the_quota() {
        let mut undo = UndoNegotiator::new();
        undo.request(Color::White, 1, Color::Black).unwrap();
        let decision = undo.respond(Color::Black, true).unwrap();
        assert_eq!(decision, UndoDecision::Execute { requester: Color::White });
        undo.on_undo_executed(0);
        // white plays a different move at index 0
        undo.on_move_applied(0);
        assert_eq!(undo.used_for(0), 0);
        assert_eq!(undo.request(Color::White, 1, Color::Black), Ok(1));
    }

    #[test]
    fn respond_needs_a_pending_request_from_the_other_side() {
        let mut undo = UndoNegotiator::new();
        assert_eq!(
            undo.respond(Color::Black, true),
            Err(GameError::NoPendingUndo)
        );
        undo.request(Color::White, 1, Color::Black).unwrap();
        // the requester cannot answer their own request
        assert_eq!(
            undo.respond(Color::White, true),
            Err(GameError::NoPendingUndo)
        );
        assert!(undo.respond(Color::Black, true).is_ok());
    }

    #[test]
    fn moving_on_clears_a_pending_request() {
        let mut undo = UndoNegotiator::new();
        undo.request(Color::White, 1, Color::Black).unwrap();
        undo.on_move_applied(1);
        assert_eq!(
            undo.respond(Color::Black, true),
            Err(GameError::NoPendingUndo)
        );
    }

    #[test]
    fn counters_are_per_index() {
        let mut undo = UndoNegotiator::new();
        undo.request(Color::White, 1, Color::Black).unwrap();
        undo.respond(Color::Black, false).unwrap();
        undo.request(Color::White, 1, Color::Black).unwrap();
        undo.respond(Color::Black, false).unwrap();
        // black moves (index 1), then asks about their own move
        undo.on_move_applied(1);
        assert_eq!(undo.request(Color::Black, 2, Color::White), Ok(1));
    }
}
