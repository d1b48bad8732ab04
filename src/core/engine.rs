use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::DefaultTerminal;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info};

use crate::core::game::SessionState;
use crate::core::input::Command;
use crate::core::network::{LinkEvent, PeerLink, WireMsg};
use crate::core::renderer;
use crate::core::rules::RulesEngine;
use crate::core::session::Session;

const TICK: Duration = Duration::from_secs(1);
const KEY_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Drives one session: clock ticks, peer messages and keystrokes all land on this task.
pub struct Engine<R: RulesEngine> {
    session: Session<R>,
    link: PeerLink,
    input: String,
    log: Vec<String>,
}

impl<R: RulesEngine> Engine<R> {
    pub fn new(session: Session<R>, link: PeerLink) -> Self {
        Self {
            session,
            link,
            input: String::new(),
            log: Vec::new(),
        }
    }

    /// Runs until the player leaves, then hands the finished session back.
    pub async fn run(mut self, mut terminal: DefaultTerminal) -> Result<Session<R>> {
        let mut keys = spawn_key_reader();
        let mut ticker = interval_at(Instant::now() + TICK, TICK);
        let mut link_open = true;

        self.session.activate();
        self.log.push(format!(
            "Game on: you play {}. Time control {}.",
            self.session.local_role(),
            self.session.settings().time_control
        ));

        loop {
            self.log.extend(self.session.drain_notices());
            terminal.draw(|f| renderer::render(f, &self.session, &self.input, &self.log))?;

            tokio::select! {
                // Clock heartbeat. Stops once the game is over.
                _ = ticker.tick(), if self.session.state() == SessionState::Active => {
                    self.session.tick();
                }

                // Peer messages, in order.
                event = self.link.recv(), if link_open => match event {
                    Some(LinkEvent::Message(msg)) => self.session.handle_wire(msg),
                    Some(LinkEvent::PeerLeft) | None => {
                        info!("peer link closed");
                        link_open = false;
                        self.session.peer_left();
                    }
                },

                // Keyboard.
                key = keys.recv() => match key {
                    Some(key) => {
                        if self.on_key(key) == Flow::Quit {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        // Leaving an unfinished game concedes it.
        if let Some(msg) = self.session.resign() {
            self.send(msg);
        }
        self.link.shutdown().await;
        Ok(self.session)
    }

    fn send(&mut self, msg: WireMsg) {
        if !self.link.send(msg) {
            debug!("peer link gone, message dropped");
        }
    }

    fn on_key(&mut self, key: KeyEvent) -> Flow {
        if key.kind != KeyEventKind::Press {
            return Flow::Continue;
        }
        match key.code {
            KeyCode::Esc => return Flow::Quit,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Flow::Quit
            }
            KeyCode::Char(c) => self.input.push(c),
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Enter => {
                let line = std::mem::take(&mut self.input);
                return self.on_line(&line);
            }
            _ => {}
        }
        Flow::Continue
    }

    fn on_line(&mut self, line: &str) -> Flow {
        if line.trim().is_empty() {
            return Flow::Continue;
        }
        match Command::parse(line) {
            // Illegal and out-of-turn moves are dropped without a word.
            Some(Command::Move(mv)) => {
                if let Some(msg) = self.session.local_move(mv) {
                    self.send(msg);
                }
            }
            Some(Command::Resign) => {
                if let Some(msg) = self.session.resign() {
                    self.send(msg);
                }
            }
            Some(Command::Chat(text)) => {
                if let Some(msg) = self.session.local_chat(&text) {
                    self.send(msg);
                }
            }
            Some(Command::Quit) => return Flow::Quit,
            None => self.log.push(format!("Unrecognized input: {}", line.trim())),
        }
        Flow::Continue
    }
}

/// Reads crossterm events on a plain thread and forwards key presses.
/// The thread exits once the receiving side is dropped.
fn spawn_key_reader() -> mpsc::UnboundedReceiver<KeyEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        while !tx.is_closed() {
            match event::poll(KEY_POLL) {
                Ok(true) => match event::read() {
                    Ok(Event::Key(key)) => {
                        if tx.send(key).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(_) => break,
                },
                Ok(false) => {}
                Err(_) => break,
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameSettings;
    use crate::core::clock::TimeControl;
    use crate::core::game::{MoveRequest, Side};
    use crate::core::network::read_frame;
    use crate::core::rules::ChessRules;
    use crate::history::MemoryRecordStore;

    fn engine(role: Side) -> (Engine<ChessRules>, tokio::io::DuplexStream) {
        let (ours, theirs) = tokio::io::duplex(4096);
        let (reader, writer) = tokio::io::split(ours);
        let settings = GameSettings::online(TimeControl::new(3, 2), role, "me", None);
        let mut session = Session::new(
            role,
            ChessRules::new(),
            settings,
            Box::new(MemoryRecordStore::new()),
        );
        session.activate();
        (Engine::new(session, PeerLink::spawn(reader, writer)), theirs)
    }

    #[tokio::test]
    async fn typed_move_is_sent_to_the_peer() {
        let (mut engine, mut peer) = engine(Side::White);

        assert_eq!(engine.on_line("e2 e4"), Flow::Continue);
        assert_eq!(
            read_frame(&mut peer).await.unwrap(),
            Some(WireMsg::Move {
                mv: MoveRequest::new("e2", "e4")
            })
        );

        engine.on_line("d2d4");
        assert_eq!(engine.session.moves().len(), 1);
        assert!(engine.log.is_empty());
    }

    #[tokio::test]
    async fn illegal_moves_are_dropped_and_unknown_input_logged() {
        let (mut engine, _peer) = engine(Side::White);
        engine.on_line("e2e5");
        engine.on_line("hello");
        assert_eq!(engine.log, ["Unrecognized input: hello"]);
        assert!(engine.session.moves().is_empty());
    }

    #[tokio::test]
    async fn resign_and_chat_go_out_in_order() {
        let (mut engine, mut peer) = engine(Side::Black);
        engine.on_line("/say gl");
        engine.on_line("/resign");

        assert_eq!(
            read_frame(&mut peer).await.unwrap(),
            Some(WireMsg::Message { text: "gl".into() })
        );
        assert_eq!(read_frame(&mut peer).await.unwrap(), Some(WireMsg::Resign));
        assert_eq!(engine.session.state(), SessionState::Terminal);
        assert_eq!(engine.on_line("/quit"), Flow::Quit);
    }
}
