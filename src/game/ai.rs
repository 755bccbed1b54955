use std::time::Duration;

use rand::Rng;

use super::board::{Color, PieceType, Square};
use super::engine::{BoardEngine, MoveRequest};

/// Difficulty used for rooms created against the computer.
pub const DEFAULT_DIFFICULTY: u8 = 6;

/// Pause before the computer's reply is searched and applied, so its moves
/// do not land instantly on the board.
pub const THINK_DELAY: Duration = Duration::from_millis(1000);

const KING_SCORE: f64 = 10_000.0;
const NEAR_BEST_WINDOW: f64 = 0.75;
const SLIP_WINDOW: f64 = 1.5;
const NEAR_BEST_CHANCE: f64 = 0.15;
const SLIP_CHANCE: f64 = 0.05;

const CENTER: [&str; 4] = ["d4", "d5", "e4", "e5"];
const EXTENDED_CENTER: [&str; 12] = [
    "c3", "d3", "e3", "f3", "c4", "f4", "c5", "f5", "c6", "d6", "e6", "f6",
];

/// Computer opponent for one seat. It keeps its own engine replica, synced
/// from the authoritative game after every applied move, so searching never
/// touches live state and can run outside the room lock.
#[derive(Debug, Clone)]
pub struct AIOpponent {
    replica: BoardEngine,
    color: Color,
    difficulty: u8,
}

impl AIOpponent {
    pub fn new(color: Color, difficulty: u8) -> Self {
        AIOpponent {
            replica: BoardEngine::new(),
            color,
            difficulty: difficulty.clamp(1, 10),
        }
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn difficulty(&self) -> u8 {
        self.difficulty
    }

    pub fn sync(&mut self, engine: &BoardEngine) {
        self.replica = engine.clone();
    }

    /// Picks the computer's next move, or None when its side has no move at
    /// all. A move that captures the enemy king is always taken on the spot.
    pub fn choose_move<R: Rng>(&self, rng: &mut R) -> Option<MoveRequest> {
        let moves = legal_requests(&self.replica, self.color);
        if moves.is_empty() {
            return None;
        }
        if let Some(decisive) = moves
            .iter()
            .find(|req| captures_king(&self.replica, req))
        {
            return Some(*decisive);
        }
        if self.difficulty <= 3 {
            return Some(self.casual_move(&moves, rng));
        }
        Some(self.searched_move(&moves, rng))
    }

    /// Low tier: random, with a 70% preference for some capture when one is
    /// on the board.
    fn casual_move<R: Rng>(&self, moves: &[MoveRequest], rng: &mut R) -> MoveRequest {
        let captures: Vec<MoveRequest> = moves
            .iter()
            .copied()
            .filter(|req| is_capture(&self.replica, req))
            .collect();
        if !captures.is_empty() && rng.random_bool(0.7) {
            captures[rng.random_range(0..captures.len())]
        } else {
            moves[rng.random_range(0..moves.len())]
        }
    }

    /// Mid and high tier: score every root move with an alpha-beta search.
    /// The mid tier occasionally swaps the best move for a close one to keep
    /// games beatable.
    fn searched_move<R: Rng>(&self, moves: &[MoveRequest], rng: &mut R) -> MoveRequest {
        let depth = search_depth(self.difficulty, moves.len());
        let mut ordered: Vec<MoveRequest> = moves.to_vec();
        ordered.sort_by_key(|req| !is_capture(&self.replica, req));

        let mut scored: Vec<(MoveRequest, f64)> = Vec::with_capacity(ordered.len());
        let mut best = match self.color {
            Color::White => f64::NEG_INFINITY,
            Color::Black => f64::INFINITY,
        };
        for req in ordered {
            let mut child = self.replica.clone();
            if child.apply_move(&req, 0).is_err() {
                continue;
            }
            let score = minimax(&child, depth - 1, f64::NEG_INFINITY, f64::INFINITY);
            best = match self.color {
                Color::White => best.max(score),
                Color::Black => best.min(score),
            };
            scored.push((req, score));
        }

        if self.difficulty <= 6 {
            let distance = |score: f64| match self.color {
                Color::White => best - score,
                Color::Black => score - best,
            };
            let roll: f64 = rng.random();
            if roll < SLIP_CHANCE {
                let slips: Vec<MoveRequest> = scored
                    .iter()
                    .filter(|(_, s)| distance(*s) > 0.0 && distance(*s) <= SLIP_WINDOW)
                    .map(|(req, _)| *req)
                    .collect();
                if !slips.is_empty() {
                    return slips[rng.random_range(0..slips.len())];
                }
            } else if roll < SLIP_CHANCE + NEAR_BEST_CHANCE {
                let nears: Vec<MoveRequest> = scored
                    .iter()
                    .filter(|(_, s)| distance(*s) > 0.0 && distance(*s) <= NEAR_BEST_WINDOW)
                    .map(|(req, _)| *req)
                    .collect();
                if !nears.is_empty() {
                    return nears[rng.random_range(0..nears.len())];
                }
            }
        }

        scored
            .iter()
            .find(|(_, s)| *s == best)
            .map(|(req, _)| *req)
            // scored is non-empty because every root move replays cleanly
            .unwrap_or(moves[0])
    }
}

/// Deeper search when the branching is small, per difficulty tier.
fn search_depth(difficulty: u8, move_count: usize) -> u32 {
    if difficulty >= 7 {
        match move_count {
            0..=4 => 6,
            5..=9 => 5,
            _ => 4,
        }
    } else {
        match move_count {
            0..=4 => 5,
            5..=9 => 4,
            _ => 3,
        }
    }
}

/// Every move the given side could play, with pawn promotions expanded to
/// each promotion piece.
pub fn legal_requests(engine: &BoardEngine, color: Color) -> Vec<MoveRequest> {
    let mut requests = Vec::new();
    for (from, piece) in engine.board().pieces_of(color) {
        let promotion_rank = match color {
            Color::White => 7,
            Color::Black => 0,
        };
        for to in engine.reachable_squares(from) {
            if piece.kind == PieceType::Pawn && to.rank() == promotion_rank {
                for kind in [
                    PieceType::Queen,
                    PieceType::Rook,
                    PieceType::Bishop,
                    PieceType::Knight,
                ] {
                    requests.push(MoveRequest {
                        from,
                        to,
                        promotion: Some(kind),
                    });
                }
            } else {
                requests.push(MoveRequest {
                    from,
                    to,
                    promotion: None,
                });
            }
        }
    }
    requests
}

fn is_capture(engine: &BoardEngine, req: &MoveRequest) -> bool {
    if engine.board().piece_at(req.to).is_some() {
        return true;
    }
    // a pawn changing file onto an empty square is an en-passant capture
    matches!(engine.board().piece_at(req.from), Some(p) if p.kind == PieceType::Pawn)
        && req.from.file() != req.to.file()
}

fn captures_king(engine: &BoardEngine, req: &MoveRequest) -> bool {
    matches!(engine.board().piece_at(req.to), Some(p) if p.kind == PieceType::King)
}

/// Plain minimax with alpha-beta pruning. White maximizes; a position with
/// a king already off the board is terminal.
fn minimax(engine: &BoardEngine, depth: u32, mut alpha: f64, mut beta: f64) -> f64 {
    if engine.board().king_square(Color::White).is_none() {
        return -KING_SCORE;
    }
    if engine.board().king_square(Color::Black).is_none() {
        return KING_SCORE;
    }
    if depth == 0 {
        return evaluate(engine);
    }
    let side = engine.side_to_move();
    let mut moves = legal_requests(engine, side);
    if moves.is_empty() {
        return evaluate(engine);
    }
    moves.sort_by_key(|req| !is_capture(engine, req));

    let maximizing = side == Color::White;
    let mut best = if maximizing {
        f64::NEG_INFINITY
    } else {
        f64::INFINITY
    };
    for req in moves {
        let mut child = engine.clone();
        if child.apply_move(&req, 0).is_err() {
            continue;
        }
        let score = minimax(&child, depth - 1, alpha, beta);
        if maximizing {
            best = best.max(score);
            alpha = alpha.max(best);
        } else {
            best = best.min(score);
            beta = beta.min(best);
        }
        if beta <= alpha {
            break;
        }
    }
    best
}

fn material(kind: PieceType) -> f64 {
    match kind {
        PieceType::Pawn => 1.0,
        PieceType::Knight | PieceType::Bishop => 3.0,
        PieceType::Rook => 5.0,
        PieceType::Queen => 9.0,
        PieceType::King => 0.0,
    }
}

/// Static evaluation, positive for white: material, center control, piece
/// development, king safety off the back rank, and doubled pawns.
pub fn evaluate(engine: &BoardEngine) -> f64 {
    let board = engine.board();
    let mut score = 0.0;

    for color in [Color::White, Color::Black] {
        let sign = match color {
            Color::White => 1.0,
            Color::Black => -1.0,
        };
        let mut pawns_per_file = [0u8; 8];
        for (square, piece) in board.pieces_of(color) {
            score += sign * material(piece.kind);
            if piece.kind == PieceType::Pawn {
                pawns_per_file[square.file() as usize] += 1;
            }
            let name = square.to_string();
            if CENTER.contains(&name.as_str()) {
                score += sign * 1.5;
            } else if EXTENDED_CENTER.contains(&name.as_str()) {
                score += sign * 0.5;
            }
        }
        for count in pawns_per_file {
            if count > 1 {
                score -= sign * 0.3 * f64::from(count - 1);
            }
        }

        let home_rank = match color {
            Color::White => 0,
            Color::Black => 7,
        };
        for (file, kind) in [
            (1u8, PieceType::Knight),
            (6u8, PieceType::Knight),
            (2u8, PieceType::Bishop),
            (5u8, PieceType::Bishop),
        ] {
            let home = Square::at(file, home_rank);
            if matches!(board.piece_at(home), Some(p) if p.color == color && p.kind == kind) {
                score -= sign * 0.5;
            }
        }
        if board.king_square(color) == Some(Square::at(4, home_rank)) {
            score -= sign * 0.2;
        }
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::board::{Board, Piece};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sq(s: &str) -> Square {
        Square::from_algebraic(s).unwrap()
    }

    fn place(board: &mut Board, at: &str, kind: PieceType, color: Color) {
        board.set(sq(at), Some(Piece::new(kind, color)));
    }

    #[test]
    fn initial_position_is_balanced() {
        assert!(evaluate(&BoardEngine::new()).abs() < 1e-9);
    }

    #[test]
    fn material_swing_shows_in_the_score() {
        let mut board = Board::empty();
        place(&mut board, "a1", PieceType::King, Color::White);
        place(&mut board, "h8", PieceType::King, Color::Black);
        place(&mut board, "b2", PieceType::Queen, Color::White);
        let engine = BoardEngine::with_position(board, Color::White);
        assert!(evaluate(&engine) > 8.0);
    }

    #[test]
    fn exposed_king_is_captured_at_every_difficulty() {
        // scholar's-mate style exposure: after these four plies the black
        // queen on h4 has a clear diagonal to the white king on e1
        for difficulty in [1, 5, 9] {
            let mut engine = BoardEngine::new();
            for (from, to) in [("f2", "f3"), ("e7", "e5"), ("g2", "g4"), ("d8", "h4")] {
                engine
                    .apply_move(
                        &MoveRequest {
                            from: sq(from),
                            to: sq(to),
                            promotion: None,
                        },
                        0,
                    )
                    .unwrap();
            }
            // white obliges with a move that leaves the king exposed
            engine
                .apply_move(
                    &MoveRequest {
                        from: sq("a2"),
                        to: sq("a3"),
                        promotion: None,
                    },
                    0,
                )
                .unwrap();
            let mut ai = AIOpponent::new(Color::Black, difficulty);
            ai.sync(&engine);
            let mut rng = StdRng::seed_from_u64(7);
            let chosen = ai.choose_move(&mut rng).unwrap();
            assert_eq!(chosen.from, sq("h4"), "difficulty {}", difficulty);
            assert_eq!(chosen.to, sq("e1"), "difficulty {}", difficulty);
        }
    }

    #[test]
    fn search_takes_a_hanging_queen() {
        let mut board = Board::empty();
        place(&mut board, "a1", PieceType::King, Color::White);
        place(&mut board, "d5", PieceType::Queen, Color::White);
        place(&mut board, "h8", PieceType::King, Color::Black);
        place(&mut board, "d8", PieceType::Rook, Color::Black);
        let engine = BoardEngine::with_position(board, Color::Black);
        let mut ai = AIOpponent::new(Color::Black, 8);
        ai.sync(&engine);
        let mut rng = StdRng::seed_from_u64(11);
        let chosen = ai.choose_move(&mut rng).unwrap();
        assert_eq!(chosen.from, sq("d8"));
        assert_eq!(chosen.to, sq("d5"));
    }

    #[test]
    fn no_pieces_means_no_move() {
        let mut board = Board::empty();
        place(&mut board, "a1", PieceType::King, Color::White);
        let engine = BoardEngine::with_position(board, Color::Black);
        let mut ai = AIOpponent::new(Color::Black, 6);
        ai.sync(&engine);
        let mut rng = StdRng::seed_from_u64(3);
        assert!(ai.choose_move(&mut rng).is_none());
    }

    #[test]
    fn deeper_search_with_fewer_moves() {
        assert_eq!(search_depth(6, 30), 3);
        assert_eq!(search_depth(6, 7), 4);
        assert_eq!(search_depth(6, 3), 5);
        assert_eq!(search_depth(9, 30), 4);
        assert_eq!(search_depth(9, 3), 6);
    }

    #[test]
    fn promotions_are_expanded() {
        let mut board = Board::empty();
        place(&mut board, "a1", PieceType::King, Color::White);
        place(&mut board, "h8", PieceType::King, Color::Black);
        place(&mut board, "b7", PieceType::Pawn, Color::White);
        let engine = BoardEngine::with_position(board, Color::White);
        let promotions: Vec<MoveRequest> = legal_requests(&engine, Color::White)
            .into_iter()
            .filter(|req| req.from == sq("b7"))
            .collect();
        assert_eq!(promotions.len(), 4);
        assert!(promotions.iter().all(|req| req.promotion.is_some()));
    }
}
