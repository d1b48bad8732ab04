//! Rules engine binding.
//!
//! The session never inspects a position itself: it only asks a [`RulesEngine`]
//! whether a move applies and which terminal predicates hold afterwards.
//! [`ChessRules`] binds that interface to `shakmaty`; on top of it sits only the
//! repetition history and PGN movetext.

use shakmaty::{
    fen::Fen,
    san::San,
    uci::UciMove,
    zobrist::{Zobrist64, ZobristHash},
    CastlingMode, Chess, EnPassantMode, Move, Position, Rank, Role, Square,
};

use crate::core::game::{MoveRequest, Side};

/// Result of a successfully applied move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMove {
    pub color: Side,
    pub san: String,
}

pub trait RulesEngine: Send + 'static {
    fn side_to_move(&self) -> Side;

    /// Applies `mv` to the current position. `None` means the move is illegal and the
    /// position is untouched.
    fn apply(&mut self, mv: &MoveRequest) -> Option<AppliedMove>;

    fn is_checkmate(&self) -> bool;
    fn is_stalemate(&self) -> bool;
    fn is_threefold_repetition(&self) -> bool;
    fn is_insufficient_material(&self) -> bool;

    /// Any draw condition, including the specific ones above.
    fn is_draw(&self) -> bool;

    /// Portable notation of the whole move history.
    fn export_history(&self) -> String;

    fn fen(&self) -> String;
}

/// Positions stay drawable for 50 moves per side without a capture or pawn move.
const FIFTY_MOVE_PLIES: u32 = 100;

#[derive(Debug, Clone)]
pub struct ChessRules {
    position: Chess,
    san_history: Vec<String>,
    /// Hash of every position reached, the starting one included.
    seen: Vec<Zobrist64>,
}

impl Default for ChessRules {
    fn default() -> Self {
        Self::new()
    }
}

impl ChessRules {
    pub fn new() -> Self {
        Self::from_position(Chess::default())
    }

    /// Starts from an arbitrary FEN, halfmove clock included. Returns `None` if the
    /// FEN does not parse or describes an impossible position.
    pub fn from_fen(fen: &str) -> Option<Self> {
        let fen: Fen = fen.trim().parse().ok()?;
        let position: Chess = fen.into_position(CastlingMode::Standard).ok()?;
        Some(Self::from_position(position))
    }

    fn from_position(position: Chess) -> Self {
        let start = position.zobrist_hash::<Zobrist64>(EnPassantMode::Legal);
        Self {
            position,
            san_history: Vec::new(),
            seen: vec![start],
        }
    }

    pub fn position(&self) -> &Chess {
        &self.position
    }

    pub fn san_history(&self) -> &[String] {
        &self.san_history
    }

    /// Plies since the last capture or pawn move.
    pub fn halfmove_clock(&self) -> u32 {
        self.position.halfmoves()
    }

    fn resolve(&self, mv: &MoveRequest) -> Option<Move> {
        let from: Square = mv.from.trim().to_ascii_lowercase().parse().ok()?;
        let to: Square = mv.to.trim().to_ascii_lowercase().parse().ok()?;

        let promoting = self.position.board().role_at(from) == Some(Role::Pawn)
            && matches!(to.rank(), Rank::First | Rank::Eighth);
        let suffix = if promoting {
            match mv.promotion.as_deref() {
                None => "q".to_string(),
                Some(letter) => promotion_letter(letter)?,
            }
        } else {
            String::new()
        };

        let uci: UciMove = format!("{from}{to}{suffix}").parse().ok()?;
        let m = uci.to_move(&self.position).ok()?;
        self.position.is_legal(&m).then_some(m)
    }
}

impl RulesEngine for ChessRules {
    fn side_to_move(&self) -> Side {
        self.position.turn().into()
    }

    fn apply(&mut self, mv: &MoveRequest) -> Option<AppliedMove> {
        let m = self.resolve(mv)?;
        let color: Side = self.position.turn().into();
        let mut san = San::from_move(&self.position, &m).to_string();

        self.position.play_unchecked(&m);
        if self.position.is_checkmate() {
            san.push('#');
        } else if self.position.is_check() {
            san.push('+');
        }
        self.seen
            .push(self.position.zobrist_hash::<Zobrist64>(EnPassantMode::Legal));
        self.san_history.push(san.clone());

        Some(AppliedMove { color, san })
    }

    fn is_checkmate(&self) -> bool {
        self.position.is_checkmate()
    }

    fn is_stalemate(&self) -> bool {
        self.position.is_stalemate()
    }

    fn is_threefold_repetition(&self) -> bool {
        let current = self.position.zobrist_hash::<Zobrist64>(EnPassantMode::Legal);
        self.seen.iter().filter(|&&h| h == current).count() >= 3
    }

    fn is_insufficient_material(&self) -> bool {
        self.position.is_insufficient_material()
    }

    fn is_draw(&self) -> bool {
        self.position.halfmoves() >= FIFTY_MOVE_PLIES
            || self.is_stalemate()
            || self.is_insufficient_material()
            || self.is_threefold_repetition()
    }

    fn export_history(&self) -> String {
        let mut out = String::new();
        for (ply, san) in self.san_history.iter().enumerate() {
            if ply % 2 == 0 {
                if ply > 0 {
                    out.push(' ');
                }
                out.push_str(&format!("{}. ", ply / 2 + 1));
            } else {
                out.push(' ');
            }
            out.push_str(san);
        }
        out
    }

    fn fen(&self) -> String {
        Fen::from_position(self.position.clone(), EnPassantMode::Legal).to_string()
    }
}

/// Normalized UCI promotion suffix, or `None` for an unknown piece letter.
fn promotion_letter(letter: &str) -> Option<String> {
    let letter = letter.trim().to_ascii_lowercase();
    matches!(letter.as_str(), "q" | "r" | "b" | "n").then_some(letter)
}
