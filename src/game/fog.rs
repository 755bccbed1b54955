use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::board::Color;
use super::engine::BoardEngine;

/// Per-side visibility masks, recomputed from scratch whenever they are
/// needed. A side sees every square one of its pieces stands on plus every
/// square one of its pieces could currently move to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FogOfWar {
    pub white_visible: Vec<String>,
    pub black_visible: Vec<String>,
}

pub fn compute(engine: &BoardEngine) -> FogOfWar {
    FogOfWar {
        white_visible: visible_for(engine, Color::White),
        black_visible: visible_for(engine, Color::Black),
    }
}

fn visible_for(engine: &BoardEngine, color: Color) -> Vec<String> {
    let mut seen = BTreeSet::new();
    for (square, _) in engine.board().pieces_of(color) {
        seen.insert(square);
        for target in engine.reachable_squares(square) {
            seen.insert(target);
        }
    }
    seen.into_iter().map(|sq| sq.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::board::Square;
    use crate::game::engine::MoveRequest;

    #[test]
    fn initial_position_counts() {
        let fog = compute(&BoardEngine::new());
        // each side sees its own two ranks (occupied) plus the two ranks of
        // pawn pushes; the knight targets fall inside the push ranks
        assert_eq!(fog.white_visible.len(), 32);
        assert_eq!(fog.black_visible.len(), 32);
        for sq in ["e1", "e2", "e3", "e4", "a3", "h3"] {
            assert!(fog.white_visible.iter().any(|s| s == sq), "missing {}", sq);
        }
        for sq in ["e8", "e7", "e6", "e5", "a6", "h6"] {
            assert!(fog.black_visible.iter().any(|s| s == sq), "missing {}", sq);
        }
        // neither side sees the other's home ranks yet
        assert!(!fog.white_visible.iter().any(|s| s == "e7"));
        assert!(!fog.black_visible.iter().any(|s| s == "e2"));
    }

    #[test]
    fn advancing_extends_sight() {
        let mut engine = BoardEngine::new();
        engine
            .apply_move(
                &MoveRequest {
                    from: Square::from_algebraic("e2").unwrap(),
                    to: Square::from_algebraic("e4").unwrap(),
                    promotion: None,
                },
                0,
            )
            .unwrap();
        let fog = compute(&engine);
        // the vacated e2 square opens the queen, bishop and king lines
        for sq in ["e2", "e5", "h5", "a6", "c4"] {
            assert!(fog.white_visible.iter().any(|s| s == sq), "missing {}", sq);
        }
        // the pawn's capture diagonals stay dark while they are empty
        assert!(!fog.white_visible.iter().any(|s| s == "d5"));
        assert!(!fog.white_visible.iter().any(|s| s == "e7"));
    }
}
