//! One live game bound to one peer channel.
//!
//! The session is the single writer of game state. Every input (local action,
//! remote message, clock tick) goes through a `&mut self` method here, and methods
//! that need to tell the peer something return the message instead of sending it.

use chrono::Utc;
use std::collections::VecDeque;
use tracing::{debug, error, info, warn};

use crate::config::GameSettings;
use crate::core::clock::Clock;
use crate::core::game::{ChatLine, Move, MoveRequest, SessionState, Side};
use crate::core::lobby::Handshake;
use crate::core::network::WireMsg;
use crate::core::rules::RulesEngine;
use crate::core::termination::{evaluate, Outcome, TerminationDetector};
use crate::history::{GameRecord, RecordStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Local,
    Remote,
}

pub struct Session<R: RulesEngine> {
    local_role: Side,
    state: SessionState,
    rules: R,
    clock: Clock,
    moves: Vec<Move>,
    chat: Vec<ChatLine>,
    termination: TerminationDetector,
    settings: GameSettings,
    store: Box<dyn RecordStore + Send>,
    notices: VecDeque<String>,
}

impl<R: RulesEngine> Session<R> {
    pub fn new(
        local_role: Side,
        rules: R,
        settings: GameSettings,
        store: Box<dyn RecordStore + Send>,
    ) -> Self {
        Self {
            local_role,
            state: SessionState::Idle,
            rules,
            clock: Clock::new(settings.time_control),
            moves: Vec::new(),
            chat: Vec::new(),
            termination: TerminationDetector::new(),
            settings,
            store,
            notices: VecDeque::new(),
        }
    }

    pub fn local_role(&self) -> Side {
        self.local_role
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn rules(&self) -> &R {
        &self.rules
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn moves(&self) -> &[Move] {
        &self.moves
    }

    pub fn chat(&self) -> &[ChatLine] {
        &self.chat
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.termination.outcome()
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    pub fn is_local_turn(&self) -> bool {
        self.state == SessionState::Active && self.rules.side_to_move() == self.local_role
    }

    /// Messages for the user, oldest first.
    pub fn drain_notices(&mut self) -> Vec<String> {
        self.notices.drain(..).collect()
    }

    pub fn begin_connecting(&mut self) {
        if self.state == SessionState::Idle {
            self.state = SessionState::Connecting;
        }
    }

    /// Takes over what the handshake settled: the agreed time control and the
    /// peer's name. Refused once play has started or when the handshake assigned
    /// a different role.
    pub fn connected(&mut self, handshake: &Handshake) -> bool {
        if !matches!(self.state, SessionState::Idle | SessionState::Connecting) {
            warn!(state = ?self.state, "handshake result arrived too late");
            return false;
        }
        if handshake.role != self.local_role {
            warn!(expected = %self.local_role, got = %handshake.role, "handshake assigned the wrong role");
            return false;
        }
        let local_name = self.settings.name_of(self.local_role).to_string();
        self.settings = GameSettings::online(
            handshake.time_control,
            self.local_role,
            &local_name,
            handshake.peer_name.as_deref(),
        );
        self.clock = Clock::new(handshake.time_control);
        info!(
            time_control = %handshake.time_control,
            opponent = %self.settings.name_of(self.local_role.opponent()),
            "handshake adopted"
        );
        true
    }

    /// Starts play and the clock. The role is fixed from here on.
    pub fn activate(&mut self) {
        if matches!(self.state, SessionState::Idle | SessionState::Connecting) {
            self.state = SessionState::Active;
            self.clock.start();
            info!(role = %self.local_role, "session active");
        }
    }

    /// Applies a move made on this side. Illegal or out-of-turn moves are ignored
    /// without any message; legal ones return the message for the peer.
    pub fn local_move(&mut self, mv: MoveRequest) -> Option<WireMsg> {
        if !self.is_local_turn() {
            debug!(%mv, "ignoring move outside of our turn");
            return None;
        }
        if !self.apply(&mv, Origin::Local) {
            return None;
        }
        Some(WireMsg::Move { mv })
    }

    /// Applies a move relayed by the peer. There is no turn check: the sender
    /// validated it. A move the rules engine cannot apply is dropped.
    pub fn remote_move(&mut self, mv: MoveRequest) -> bool {
        if self.state != SessionState::Active {
            debug!(%mv, "ignoring remote move outside of an active game");
            return false;
        }
        self.apply(&mv, Origin::Remote)
    }

    fn apply(&mut self, mv: &MoveRequest, origin: Origin) -> bool {
        let Some(applied) = self.rules.apply(mv) else {
            match origin {
                Origin::Local => debug!(%mv, "illegal move ignored"),
                Origin::Remote => warn!(%mv, "peer sent a move that does not apply"),
            }
            return false;
        };

        debug!(?origin, san = %applied.san, color = %applied.color, "move applied");
        self.moves.push(Move {
            from: mv.from.clone(),
            to: mv.to.clone(),
            promotion: mv.promotion.clone(),
            color: applied.color,
            san: applied.san,
            timestamp: Utc::now(),
        });
        self.clock.on_move_completed(applied.color);

        if let Some(outcome) = evaluate(&self.rules) {
            self.finalize(outcome);
        }
        true
    }

    /// One second of the active player's time.
    pub fn tick(&mut self) {
        if self.state != SessionState::Active {
            return;
        }
        if let Some(expired) = self.clock.tick() {
            info!(side = %expired, "flag fell");
            self.finalize(Outcome::Timeout {
                winner: expired.opponent(),
            });
        }
    }

    /// The local player resigns. Allowed at any point of an active game.
    pub fn resign(&mut self) -> Option<WireMsg> {
        if self.state != SessionState::Active {
            return None;
        }
        self.finalize(Outcome::Resignation {
            winner: self.local_role.opponent(),
        });
        Some(WireMsg::Resign)
    }

    pub fn remote_resigned(&mut self) {
        if self.state != SessionState::Active {
            return;
        }
        self.finalize(Outcome::Resignation {
            winner: self.local_role,
        });
    }

    /// The channel is gone. An unfinished game is recorded as abandoned.
    pub fn peer_left(&mut self) {
        match self.state {
            SessionState::Active => {
                self.notices.push_back("Your opponent has left the game".to_string());
                self.finalize(Outcome::Abandoned);
            }
            SessionState::Terminal => {
                self.notices.push_back("Your opponent has left the game".to_string());
            }
            SessionState::Idle | SessionState::Connecting => {
                self.state = SessionState::Terminal;
            }
        }
    }

    pub fn local_chat(&mut self, text: &str) -> Option<WireMsg> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        self.chat.push(ChatLine {
            text: text.to_string(),
            own: true,
        });
        Some(WireMsg::Message {
            text: text.to_string(),
        })
    }

    /// Dispatches one message from the peer.
    pub fn handle_wire(&mut self, msg: WireMsg) {
        match msg {
            WireMsg::Move { mv } => {
                self.remote_move(mv);
            }
            WireMsg::Message { text } => self.chat.push(ChatLine { text, own: false }),
            WireMsg::Resign => self.remote_resigned(),
            WireMsg::Hello { .. } => warn!("unexpected hello after handshake"),
        }
    }

    /// Ends the game once: Terminal, clock stopped, one record written.
    fn finalize(&mut self, outcome: Outcome) {
        if !self.termination.trigger(outcome) {
            return;
        }
        self.state = SessionState::Terminal;
        self.clock.stop();

        let result_text = outcome.result_text();
        info!(result = %result_text, moves = self.moves.len(), "game over");

        let movetext = self.rules.export_history();
        let pgn = if movetext.is_empty() {
            outcome.pgn_result().to_string()
        } else {
            format!("{movetext} {}", outcome.pgn_result())
        };
        let record = GameRecord::new(
            result_text.clone(),
            self.moves.len(),
            pgn,
            self.settings.clone(),
        );

        if let Err(e) = self.store.append(record) {
            error!(error = %e, "failed to save game record");
            self.notices
                .push_back(format!("Could not save this game to history: {e}"));
        }
        self.notices.push_back(result_text);
    }
}
