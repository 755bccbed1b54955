use std::fmt;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Side to move / piece ownership.
#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn opponent(self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Color::White => "white",
            Color::Black => "black",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PieceType {
    Pawn,
    Knight,
    Bishop,
    Rook,
    Queen,
    King,
}

impl PieceType {
    /// Lower-case piece letter used on the wire and in the export string.
    pub fn letter(self) -> char {
        match self {
            PieceType::Pawn => 'p',
            PieceType::Knight => 'n',
            PieceType::Bishop => 'b',
            PieceType::Rook => 'r',
            PieceType::Queen => 'q',
            PieceType::King => 'k',
        }
    }

    pub fn from_letter(c: char) -> Option<PieceType> {
        match c.to_ascii_lowercase() {
            'p' => Some(PieceType::Pawn),
            'n' => Some(PieceType::Knight),
            'b' => Some(PieceType::Bishop),
            'r' => Some(PieceType::Rook),
            'q' => Some(PieceType::Queen),
            'k' => Some(PieceType::King),
            _ => None,
        }
    }
}

impl Serialize for PieceType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_char(self.letter())
    }
}

impl<'de> Deserialize<'de> for PieceType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => PieceType::from_letter(c)
                .ok_or_else(|| de::Error::custom(format!("unknown piece letter: {}", s))),
            _ => Err(de::Error::custom(format!("unknown piece letter: {}", s))),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Piece {
    pub kind: PieceType,
    pub color: Color,
}

impl Piece {
    pub fn new(kind: PieceType, color: Color) -> Self {
        Piece { kind, color }
    }

    /// Export-string character: white pieces upper-case, black lower-case.
    pub fn to_char(self) -> char {
        match self.color {
            Color::White => self.kind.letter().to_ascii_uppercase(),
            Color::Black => self.kind.letter(),
        }
    }
}

/// A square on the 8x8 board. Rank 0 is white's back rank ("1"), file 0 is
/// the a-file. Serialized as algebraic notation ("e4").
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Square {
    file: u8,
    rank: u8,
}

impl Square {
    pub fn new(file: u8, rank: u8) -> Option<Square> {
        if file < 8 && rank < 8 {
            Some(Square { file, rank })
        } else {
            None
        }
    }

    /// Constructor for coordinates already known to be in range.
    pub(crate) fn at(file: u8, rank: u8) -> Square {
        debug_assert!(file < 8 && rank < 8);
        Square { file, rank }
    }

    pub fn from_algebraic(s: &str) -> Option<Square> {
        let bytes = s.as_bytes();
        if bytes.len() != 2 {
            return None;
        }
        let file = bytes[0].checked_sub(b'a')?;
        let rank = bytes[1].checked_sub(b'1')?;
        Square::new(file, rank)
    }

    pub fn file(self) -> u8 {
        self.file
    }

    pub fn rank(self) -> u8 {
        self.rank
    }

    /// Steps by the given file/rank deltas, returning None off the board.
    pub fn offset(self, df: i8, dr: i8) -> Option<Square> {
        let file = self.file as i8 + df;
        let rank = self.rank as i8 + dr;
        if (0..8).contains(&file) && (0..8).contains(&rank) {
            Some(Square {
                file: file as u8,
                rank: rank as u8,
            })
        } else {
            None
        }
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            (b'a' + self.file) as char,
            (b'1' + self.rank) as char
        )
    }
}

impl Serialize for Square {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Square {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Square::from_algebraic(&s)
            .ok_or_else(|| de::Error::custom(format!("invalid square notation: {}", s)))
    }
}

/// 8x8 mailbox board, indexed by rank then file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    squares: [[Option<Piece>; 8]; 8],
}

impl Board {
    pub fn empty() -> Self {
        Board {
            squares: [[None; 8]; 8],
        }
    }

    /// Standard starting position.
    pub fn initial() -> Self {
        use PieceType::*;
        let mut board = Board::empty();
        let back_rank = [Rook, Knight, Bishop, Queen, King, Bishop, Knight, Rook];
        for (file, &kind) in back_rank.iter().enumerate() {
            board.squares[0][file] = Some(Piece::new(kind, Color::White));
            board.squares[1][file] = Some(Piece::new(Pawn, Color::White));
            board.squares[6][file] = Some(Piece::new(Pawn, Color::Black));
            board.squares[7][file] = Some(Piece::new(kind, Color::Black));
        }
        board
    }

    pub fn piece_at(&self, sq: Square) -> Option<Piece> {
        self.squares[sq.rank as usize][sq.file as usize]
    }

    pub fn set(&mut self, sq: Square, piece: Option<Piece>) {
        self.squares[sq.rank as usize][sq.file as usize] = piece;
    }

    pub fn take(&mut self, sq: Square) -> Option<Piece> {
        self.squares[sq.rank as usize][sq.file as usize].take()
    }

    /// All squares currently holding a piece of the given color, in
    /// rank-then-file order.
    pub fn pieces_of(&self, color: Color) -> Vec<(Square, Piece)> {
        let mut found = Vec::new();
        for rank in 0..8u8 {
            for file in 0..8u8 {
                if let Some(piece) = self.squares[rank as usize][file as usize] {
                    if piece.color == color {
                        found.push((Square { file, rank }, piece));
                    }
                }
            }
        }
        found
    }

    pub fn king_square(&self, color: Color) -> Option<Square> {
        for rank in 0..8u8 {
            for file in 0..8u8 {
                if self.squares[rank as usize][file as usize]
                    == Some(Piece::new(PieceType::King, color))
                {
                    return Some(Square { file, rank });
                }
            }
        }
        None
    }

    /// The board field of the export string: ranks 8 down to 1, empty runs
    /// collapsed to digits.
    pub fn export_part(&self) -> String {
        let mut out = String::new();
        for rank in (0..8).rev() {
            let mut empty = 0;
            for file in 0..8 {
                match self.squares[rank][file] {
                    Some(piece) => {
                        if empty > 0 {
                            out.push((b'0' + empty) as char);
                            empty = 0;
                        }
                        out.push(piece.to_char());
                    }
                    None => empty += 1,
                }
            }
            if empty > 0 {
                out.push((b'0' + empty) as char);
            }
            if rank > 0 {
                out.push('/');
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algebraic_round_trip() {
        for s in ["a1", "e4", "h8", "c7"] {
            let sq = Square::from_algebraic(s).unwrap();
            assert_eq!(sq.to_string(), s);
        }
        assert!(Square::from_algebraic("i1").is_none());
        assert!(Square::from_algebraic("a9").is_none());
        assert!(Square::from_algebraic("e44").is_none());
    }

    #[test]
    fn offset_respects_edges() {
        let a1 = Square::from_algebraic("a1").unwrap();
        assert!(a1.offset(-1, 0).is_none());
        assert!(a1.offset(0, -1).is_none());
        assert_eq!(a1.offset(1, 1), Square::from_algebraic("b2"));
    }

    #[test]
    fn initial_export_part() {
        assert_eq!(
            Board::initial().export_part(),
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR"
        );
    }

    #[test]
    fn king_lookup() {
        let board = Board::initial();
        assert_eq!(
            board.king_square(Color::White),
            Square::from_algebraic("e1")
        );
        assert_eq!(
            board.king_square(Color::Black),
            Square::from_algebraic("e8")
        );
    }
}
