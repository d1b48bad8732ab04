//! End-of-game detection.
//!
//! Position-based outcomes are evaluated after every applied move; timeouts,
//! resignations and departures arrive out of band. Whatever comes first wins and
//! every later trigger is ignored.

use crate::core::game::Side;
use crate::core::rules::RulesEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Checkmate { winner: Side },
    Stalemate,
    ThreefoldRepetition,
    InsufficientMaterial,
    /// Any other draw the rules engine reports, e.g. the fifty-move rule.
    Draw,
    Timeout { winner: Side },
    Resignation { winner: Side },
    /// The peer disconnected before the game ended.
    Abandoned,
}

impl Outcome {
    pub fn winner(&self) -> Option<Side> {
        match *self {
            Outcome::Checkmate { winner }
            | Outcome::Timeout { winner }
            | Outcome::Resignation { winner } => Some(winner),
            _ => None,
        }
    }

    pub fn result_text(&self) -> String {
        match *self {
            Outcome::Checkmate { winner } => format!("Checkmate! {winner} wins!"),
            Outcome::Stalemate => "Stalemate! Game drawn.".to_string(),
            Outcome::ThreefoldRepetition => "Draw by threefold repetition.".to_string(),
            Outcome::InsufficientMaterial => "Draw by insufficient material.".to_string(),
            Outcome::Draw => "Game drawn!".to_string(),
            Outcome::Timeout { winner } => format!("{winner} wins on time!"),
            Outcome::Resignation { winner } => format!("{winner} wins by resignation!"),
            Outcome::Abandoned => "Game abandoned: opponent disconnected.".to_string(),
        }
    }

    /// PGN game termination marker.
    pub fn pgn_result(&self) -> &'static str {
        match self.winner() {
            Some(Side::White) => "1-0",
            Some(Side::Black) => "0-1",
            None if *self == Outcome::Abandoned => "*",
            None => "1/2-1/2",
        }
    }
}

/// Checks the position in priority order: checkmate, stalemate, threefold
/// repetition, insufficient material, then any other draw.
pub fn evaluate<R: RulesEngine + ?Sized>(rules: &R) -> Option<Outcome> {
    if rules.is_checkmate() {
        Some(Outcome::Checkmate {
            winner: rules.side_to_move().opponent(),
        })
    } else if rules.is_stalemate() {
        Some(Outcome::Stalemate)
    } else if rules.is_threefold_repetition() {
        Some(Outcome::ThreefoldRepetition)
    } else if rules.is_insufficient_material() {
        Some(Outcome::InsufficientMaterial)
    } else if rules.is_draw() {
        Some(Outcome::Draw)
    } else {
        None
    }
}

/// Latches the first outcome.
#[derive(Debug, Default)]
pub struct TerminationDetector {
    outcome: Option<Outcome>,
}

impl TerminationDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true only for the trigger that actually ends the game.
    pub fn trigger(&mut self, outcome: Outcome) -> bool {
        if self.outcome.is_some() {
            return false;
        }
        self.outcome = Some(outcome);
        true
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    pub fn is_terminated(&self) -> bool {
        self.outcome.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::game::MoveRequest;
    use crate::core::rules::ChessRules;

    #[test]
    fn result_texts_name_cause_and_winner() {
        assert_eq!(
            Outcome::Checkmate { winner: Side::White }.result_text(),
            "Checkmate! White wins!"
        );
        assert_eq!(
            Outcome::Timeout { winner: Side::Black }.result_text(),
            "Black wins on time!"
        );
        assert_eq!(
            Outcome::Resignation { winner: Side::White }.result_text(),
            "White wins by resignation!"
        );
        assert_eq!(Outcome::Stalemate.pgn_result(), "1/2-1/2");
        assert_eq!(Outcome::Abandoned.pgn_result(), "*");
        assert_eq!(Outcome::Timeout { winner: Side::Black }.pgn_result(), "0-1");
    }

    #[test]
    fn first_trigger_wins() {
        let mut detector = TerminationDetector::new();
        assert!(detector.trigger(Outcome::Resignation { winner: Side::Black }));
        assert!(!detector.trigger(Outcome::Timeout { winner: Side::White }));
        assert_eq!(
            detector.outcome(),
            Some(Outcome::Resignation { winner: Side::Black })
        );
    }

    #[test]
    fn evaluates_checkmate_for_the_mover() {
        let mut rules = ChessRules::new();
        for (from, to) in [("f2", "f3"), ("e7", "e5"), ("g2", "g4"), ("d8", "h4")] {
            rules.apply(&MoveRequest::new(from, to)).unwrap();
        }
        assert_eq!(
            evaluate(&rules),
            Some(Outcome::Checkmate { winner: Side::Black })
        );
    }

    #[test]
    fn stalemate_outranks_the_generic_draw() {
        let mut rules = ChessRules::from_fen("7k/8/6Q1/8/8/8/8/K7 w - - 0 1").unwrap();
        rules.apply(&MoveRequest::new("g6", "f7")).unwrap();
        assert_eq!(evaluate(&rules), Some(Outcome::Stalemate));
    }

    #[test]
    fn insufficient_material_after_last_capture() {
        let mut rules = ChessRules::from_fen("8/8/4k3/8/8/4K3/4q3/8 w - - 0 1").unwrap();
        rules.apply(&MoveRequest::new("e3", "e2")).unwrap();
        assert_eq!(evaluate(&rules), Some(Outcome::InsufficientMaterial));
    }

    #[test]
    fn knight_shuffle_is_threefold_repetition() {
        let mut rules = ChessRules::new();
        let shuffle = [("g1", "f3"), ("g8", "f6"), ("f3", "g1"), ("f6", "g8")];
        for _ in 0..2 {
            for (from, to) in shuffle {
                assert_eq!(evaluate(&rules), None);
                rules.apply(&MoveRequest::new(from, to)).unwrap();
            }
        }
        let outcome = evaluate(&rules);
        assert_eq!(outcome, Some(Outcome::ThreefoldRepetition));
        assert_eq!(outcome.unwrap().pgn_result(), "1/2-1/2");
    }

    #[test]
    fn fifty_quiet_moves_are_a_plain_draw() {
        let mut rules = ChessRules::from_fen("4k3/8/8/8/8/8/8/R3K3 w - - 99 80").unwrap();
        assert_eq!(evaluate(&rules), None);
        rules.apply(&MoveRequest::new("a1", "a2")).unwrap();

        let outcome = evaluate(&rules);
        assert_eq!(outcome, Some(Outcome::Draw));
        let outcome = outcome.unwrap();
        assert_eq!(outcome.result_text(), "Game drawn!");
        assert_eq!(outcome.winner(), None);
    }

    #[test]
    fn ongoing_game_has_no_outcome() {
        let mut rules = ChessRules::new();
        rules.apply(&MoveRequest::new("e2", "e4")).unwrap();
        assert_eq!(evaluate(&rules), None);
    }
}
