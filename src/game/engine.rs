use serde::{Deserialize, Serialize};

use super::board::{Board, Color, PieceType, Square};
use super::error::GameError;

const ROOK_RAYS: [(i8, i8); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];
const BISHOP_RAYS: [(i8, i8); 4] = [(1, 1), (1, -1), (-1, 1), (-1, -1)];
const KNIGHT_JUMPS: [(i8, i8); 8] = [
    (1, 2),
    (2, 1),
    (2, -1),
    (1, -2),
    (-1, -2),
    (-2, -1),
    (-2, 1),
    (-1, 2),
];
const KING_STEPS: [(i8, i8); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

/// A move as submitted by a player: source, destination, and the promotion
/// piece when a pawn reaches the last rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveRequest {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<PieceType>,
}

/// An applied move exactly as recorded in history and broadcast to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    pub from: Square,
    pub to: Square,
    pub piece: PieceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captured: Option<PieceType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion: Option<PieceType>,
    pub timestamp: u64,
    #[serde(rename = "player")]
    pub color: Color,
}

/// Result of applying a move: the history record plus the color of a king
/// that was captured by it, if any.
#[derive(Debug, Clone)]
pub struct AppliedMove {
    pub record: Move,
    pub captured_king: Option<Color>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CastlingRights {
    white_kingside: bool,
    white_queenside: bool,
    black_kingside: bool,
    black_queenside: bool,
}

impl CastlingRights {
    fn initial() -> Self {
        CastlingRights {
            white_kingside: true,
            white_queenside: true,
            black_kingside: true,
            black_queenside: true,
        }
    }

    fn for_color(&self, color: Color) -> (bool, bool) {
        match color {
            Color::White => (self.white_kingside, self.white_queenside),
            Color::Black => (self.black_kingside, self.black_queenside),
        }
    }

    /// A move touching a king or rook home square retires the matching
    /// rights, whether the piece moved away or was captured there.
    fn note_square_touched(&mut self, sq: Square) {
        match (sq.file(), sq.rank()) {
            (4, 0) => {
                self.white_kingside = false;
                self.white_queenside = false;
            }
            (0, 0) => self.white_queenside = false,
            (7, 0) => self.white_kingside = false,
            (4, 7) => {
                self.black_kingside = false;
                self.black_queenside = false;
            }
            (0, 7) => self.black_queenside = false,
            (7, 7) => self.black_kingside = false,
            _ => {}
        }
    }

    fn export_part(&self) -> String {
        let mut out = String::new();
        if self.white_kingside {
            out.push('K');
        }
        if self.white_queenside {
            out.push('Q');
        }
        if self.black_kingside {
            out.push('k');
        }
        if self.black_queenside {
            out.push('q');
        }
        if out.is_empty() {
            out.push('-');
        }
        out
    }
}

/// Board state plus move history. Move generation is pseudo-legal only:
/// there is no notion of check, so moves that expose or ignore the king are
/// allowed and a game ends when a king is actually captured.
#[derive(Debug, Clone)]
pub struct BoardEngine {
    board: Board,
    side_to_move: Color,
    castling: CastlingRights,
    en_passant: Option<Square>,
    halfmove_clock: u32,
    fullmove_number: u32,
    history: Vec<Move>,
    frozen_board_part: Option<String>,
}

impl Default for BoardEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl BoardEngine {
    pub fn new() -> Self {
        BoardEngine {
            board: Board::initial(),
            side_to_move: Color::White,
            castling: CastlingRights::initial(),
            en_passant: None,
            halfmove_clock: 0,
            fullmove_number: 1,
            history: Vec::new(),
            frozen_board_part: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_position(board: Board, side_to_move: Color) -> Self {
        BoardEngine {
            board,
            side_to_move,
            castling: CastlingRights::initial(),
            en_passant: None,
            halfmove_clock: 0,
            fullmove_number: 1,
            history: Vec::new(),
            frozen_board_part: None,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn side_to_move(&self) -> Color {
        self.side_to_move
    }

    pub fn history(&self) -> &[Move] {
        &self.history
    }

    pub fn last_move(&self) -> Option<&Move> {
        self.history.last()
    }

    /// All squares the piece on `from` could move to right now, regardless
    /// of whose turn it is. Sliders stop at the first occupied square and
    /// include it when it holds an enemy piece. There is deliberately no
    /// filtering of moves through or into attacked squares.
    pub fn reachable_squares(&self, from: Square) -> Vec<Square> {
        let piece = match self.board.piece_at(from) {
            Some(p) => p,
            None => return Vec::new(),
        };
        let mut targets = Vec::new();
        match piece.kind {
            PieceType::Pawn => self.pawn_targets(from, piece.color, &mut targets),
            PieceType::Knight => self.step_targets(from, piece.color, &KNIGHT_JUMPS, &mut targets),
            PieceType::Bishop => self.ray_targets(from, piece.color, &BISHOP_RAYS, &mut targets),
            PieceType::Rook => self.ray_targets(from, piece.color, &ROOK_RAYS, &mut targets),
            PieceType::Queen => {
                self.ray_targets(from, piece.color, &ROOK_RAYS, &mut targets);
                self.ray_targets(from, piece.color, &BISHOP_RAYS, &mut targets);
            }
            PieceType::King => {
                self.step_targets(from, piece.color, &KING_STEPS, &mut targets);
                self.castling_targets(from, piece.color, &mut targets);
            }
        }
        targets
    }

    fn step_targets(&self, from: Square, color: Color, steps: &[(i8, i8)], out: &mut Vec<Square>) {
        for &(df, dr) in steps {
            if let Some(to) = from.offset(df, dr) {
                match self.board.piece_at(to) {
                    Some(p) if p.color == color => {}
                    _ => out.push(to),
                }
            }
        }
    }

    fn ray_targets(&self, from: Square, color: Color, rays: &[(i8, i8)], out: &mut Vec<Square>) {
        for &(df, dr) in rays {
            let mut current = from;
            while let Some(next) = current.offset(df, dr) {
                match self.board.piece_at(next) {
                    None => {
                        out.push(next);
                        current = next;
                    }
                    Some(p) => {
                        if p.color != color {
                            out.push(next);
                        }
                        break;
                    }
                }
            }
        }
    }

    fn pawn_targets(&self, from: Square, color: Color, out: &mut Vec<Square>) {
        let (dir, start_rank, en_passant_rank) = match color {
            Color::White => (1i8, 1u8, 5u8),
            Color::Black => (-1i8, 6u8, 2u8),
        };
        if let Some(one) = from.offset(0, dir) {
            if self.board.piece_at(one).is_none() {
                out.push(one);
                if from.rank() == start_rank {
                    if let Some(two) = one.offset(0, dir) {
                        if self.board.piece_at(two).is_none() {
                            out.push(two);
                        }
                    }
                }
            }
        }
        for df in [-1i8, 1i8] {
            if let Some(diag) = from.offset(df, dir) {
                match self.board.piece_at(diag) {
                    Some(p) if p.color != color => out.push(diag),
                    // the en-passant target from the previous move, which is
                    // only capturable from the matching side
                    None if self.en_passant == Some(diag) && diag.rank() == en_passant_rank => {
                        out.push(diag)
                    }
                    _ => {}
                }
            }
        }
    }

    /// Castling needs intact rights (king and that rook unmoved) and empty
    /// squares between them. The king's path may be attacked; with no check
    /// rule that is not this engine's concern.
    fn castling_targets(&self, from: Square, color: Color, out: &mut Vec<Square>) {
        let home_rank = match color {
            Color::White => 0,
            Color::Black => 7,
        };
        if from != Square::at(4, home_rank) {
            return;
        }
        let (kingside, queenside) = self.castling.for_color(color);
        let empty = |file| self.board.piece_at(Square::at(file, home_rank)).is_none();
        if kingside && empty(5) && empty(6) {
            out.push(Square::at(6, home_rank));
        }
        if queenside && empty(3) && empty(2) && empty(1) {
            out.push(Square::at(2, home_rank));
        }
    }

    /// Validates and applies a move for the side to move. `timestamp` is
    /// recorded on the history entry as-is.
    pub fn apply_move(
        &mut self,
        req: &MoveRequest,
        timestamp: u64,
    ) -> Result<AppliedMove, GameError> {
        let piece = self
            .board
            .piece_at(req.from)
            .ok_or(GameError::InvalidMove("no piece on the source square"))?;
        if piece.color != self.side_to_move {
            return Err(GameError::NotYourTurn);
        }
        if !self.reachable_squares(req.from).contains(&req.to) {
            return Err(GameError::InvalidMove("that square is not reachable"));
        }
        let promotion_rank = match piece.color {
            Color::White => 7,
            Color::Black => 0,
        };
        let promoting = piece.kind == PieceType::Pawn && req.to.rank() == promotion_rank;
        match (promoting, req.promotion) {
            (true, None) => return Err(GameError::InvalidMove("promotion piece required")),
            (true, Some(PieceType::Pawn | PieceType::King)) => {
                return Err(GameError::InvalidMove("cannot promote to that piece"))
            }
            (false, Some(_)) => {
                return Err(GameError::InvalidMove(
                    "promotion is only possible on the last rank",
                ))
            }
            _ => {}
        }

        // resolve the capture before touching the board, since a captured
        // king freezes the exported position as it stood pre-capture
        let mut captured_square = req.to;
        let mut captured = self.board.piece_at(req.to);
        if piece.kind == PieceType::Pawn
            && captured.is_none()
            && self.en_passant == Some(req.to)
            && req.from.file() != req.to.file()
        {
            captured_square = Square::at(req.to.file(), req.from.rank());
            captured = self.board.piece_at(captured_square);
        }
        let captured_king = captured
            .filter(|p| p.kind == PieceType::King)
            .map(|p| p.color);
        if captured_king.is_some() && self.frozen_board_part.is_none() {
            self.frozen_board_part = Some(self.board.export_part());
        }

        self.board.take(captured_square);
        self.board.take(req.from);
        let mut moved = piece;
        if let Some(kind) = req.promotion {
            moved.kind = kind;
        }
        self.board.set(req.to, Some(moved));

        // castling is encoded as the king stepping two files; bring the rook over
        if piece.kind == PieceType::King && req.from.file().abs_diff(req.to.file()) == 2 {
            let rank = req.from.rank();
            let (rook_from, rook_to) = if req.to.file() == 6 {
                (Square::at(7, rank), Square::at(5, rank))
            } else {
                (Square::at(0, rank), Square::at(3, rank))
            };
            let rook = self.board.take(rook_from);
            self.board.set(rook_to, rook);
        }

        self.en_passant = if piece.kind == PieceType::Pawn
            && req.from.rank().abs_diff(req.to.rank()) == 2
        {
            Square::new(req.from.file(), (req.from.rank() + req.to.rank()) / 2)
        } else {
            None
        };
        self.castling.note_square_touched(req.from);
        self.castling.note_square_touched(req.to);
        self.halfmove_clock = if piece.kind == PieceType::Pawn || captured.is_some() {
            0
        } else {
            self.halfmove_clock + 1
        };
        if piece.color == Color::Black {
            self.fullmove_number += 1;
        }
        self.side_to_move = piece.color.opponent();

        let record = Move {
            from: req.from,
            to: req.to,
            piece: piece.kind,
            captured: captured.map(|p| p.kind),
            promotion: req.promotion,
            timestamp,
            color: piece.color,
        };
        self.history.push(record.clone());
        Ok(AppliedMove {
            record,
            captured_king,
        })
    }

    /// Removes the last move by replaying the rest of the history on a fresh
    /// board. Replaying recomputes every derived field, so en-passant and
    /// castling state come back exactly as they were.
    pub fn undo_last(&mut self) -> Result<Move, GameError> {
        let removed = self.history.pop().ok_or(GameError::NoMovesToUndo)?;
        let remaining = std::mem::take(&mut self.history);
        *self = BoardEngine::new();
        for past in remaining {
            let req = MoveRequest {
                from: past.from,
                to: past.to,
                promotion: past.promotion,
            };
            // each record was validated when it was first applied, so the
            // replay cannot fail on a consistent history
            self.apply_move(&req, past.timestamp)?;
        }
        Ok(removed)
    }

    /// Six-field position string: board, side to move, castling rights,
    /// en-passant target, halfmove clock, fullmove number. Once a king has
    /// been captured the board field stays frozen at the pre-capture
    /// position while the other fields keep tracking engine state.
    pub fn export(&self) -> String {
        let board_part = match &self.frozen_board_part {
            Some(frozen) => frozen.clone(),
            None => self.board.export_part(),
        };
        let turn = match self.side_to_move {
            Color::White => "w",
            Color::Black => "b",
        };
        let en_passant = self
            .en_passant
            .map(|sq| sq.to_string())
            .unwrap_or_else(|| "-".to_string());
        format!(
            "{} {} {} {} {} {}",
            board_part,
            turn,
            self.castling.export_part(),
            en_passant,
            self.halfmove_clock,
            self.fullmove_number
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sq(s: &str) -> Square {
        Square::from_algebraic(s).unwrap()
    }

    fn mv(engine: &mut BoardEngine, from: &str, to: &str) -> AppliedMove {
        engine
            .apply_move(
                &MoveRequest {
                    from: sq(from),
                    to: sq(to),
                    promotion: None,
                },
                0,
            )
            .unwrap()
    }

    #[test]
    fn initial_export() {
        assert_eq!(
            BoardEngine::new().export(),
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1"
        );
    }

    #[test]
    fn double_push_sets_en_passant_target() {
        let mut engine = BoardEngine::new();
        mv(&mut engine, "e2", "e4");
        assert_eq!(
            engine.export(),
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1"
        );
    }

    #[test]
    fn wrong_side_is_rejected() {
        let mut engine = BoardEngine::new();
        let err = engine
            .apply_move(
                &MoveRequest {
                    from: sq("e7"),
                    to: sq("e5"),
                    promotion: None,
                },
                0,
            )
            .unwrap_err();
        assert_eq!(err, GameError::NotYourTurn);
    }

    #[test]
    fn empty_source_is_rejected() {
        let mut engine = BoardEngine::new();
        let err = engine
            .apply_move(
                &MoveRequest {
                    from: sq("e4"),
                    to: sq("e5"),
                    promotion: None,
                },
                0,
            )
            .unwrap_err();
        assert!(matches!(err, GameError::InvalidMove(_)));
    }

    #[test]
    fn kingside_castling_moves_both_pieces() {
        let mut engine = BoardEngine::new();
        for (from, to) in [
            ("e2", "e4"),
            ("e7", "e5"),
            ("g1", "f3"),
            ("b8", "c6"),
            ("f1", "c4"),
            ("g8", "f6"),
        ] {
            mv(&mut engine, from, to);
        }
        assert!(engine.reachable_squares(sq("e1")).contains(&sq("g1")));
        mv(&mut engine, "e1", "g1");
        assert_eq!(
            engine.board().piece_at(sq("g1")).unwrap().kind,
            PieceType::King
        );
        assert_eq!(
            engine.board().piece_at(sq("f1")).unwrap().kind,
            PieceType::Rook
        );
        assert!(engine.board().piece_at(sq("h1")).is_none());
        assert!(engine.export().contains(" b kq - "));
    }

    #[test]
    fn rook_move_retires_one_castling_right() {
        let mut engine = BoardEngine::new();
        mv(&mut engine, "h2", "h4");
        mv(&mut engine, "h7", "h5");
        mv(&mut engine, "h1", "h3");
        assert!(engine.export().contains(" Qkq "));
    }

    #[test]
    fn promotion_requires_a_piece_choice() {
        let mut engine = BoardEngine::new();
        for (from, to) in [
            ("a2", "a4"),
            ("b7", "b5"),
            ("a4", "b5"),
            ("b8", "c6"),
            ("b5", "b6"),
            ("h7", "h6"),
            ("b6", "b7"),
            ("h6", "h5"),
        ] {
            mv(&mut engine, from, to);
        }
        let bare = engine.apply_move(
            &MoveRequest {
                from: sq("b7"),
                to: sq("a8"),
                promotion: None,
            },
            0,
        );
        assert_eq!(
            bare.unwrap_err(),
            GameError::InvalidMove("promotion piece required")
        );
        let promoted = engine
            .apply_move(
                &MoveRequest {
                    from: sq("b7"),
                    to: sq("a8"),
                    promotion: Some(PieceType::Queen),
                },
                0,
            )
            .unwrap();
        assert_eq!(promoted.record.captured, Some(PieceType::Rook));
        assert_eq!(
            engine.board().piece_at(sq("a8")).unwrap().kind,
            PieceType::Queen
        );
    }

    #[test]
    fn stray_promotion_is_rejected() {
        let mut engine = BoardEngine::new();
        let err = engine
            .apply_move(
                &MoveRequest {
                    from: sq("e2"),
                    to: sq("e4"),
                    promotion: Some(PieceType::Queen),
                },
                0,
            )
            .unwrap_err();
        assert_eq!(
            err,
            GameError::InvalidMove("promotion is only possible on the last rank")
        );
    }

    #[test]
    fn undo_restores_en_passant_and_counters() {
        let mut engine = BoardEngine::new();
        mv(&mut engine, "e2", "e4");
        mv(&mut engine, "d7", "d5");
        let after_two = engine.export();
        mv(&mut engine, "e4", "d5");
        engine.undo_last().unwrap();
        assert_eq!(engine.export(), after_two);
        assert_eq!(engine.history().len(), 2);
    }

    #[test]
    fn undo_on_empty_history_fails() {
        let mut engine = BoardEngine::new();
        assert_eq!(engine.undo_last().unwrap_err(), GameError::NoMovesToUndo);
    }
}
