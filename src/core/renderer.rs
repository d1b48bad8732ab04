use ratatui::{
    layout::{Constraint, Direction, Layout},
    prelude::*,
    widgets::{Block, Borders, Paragraph, Wrap},
};

use crate::core::clock::format_clock;
use crate::core::game::{SessionState, Side};
use crate::core::rules::RulesEngine;
use crate::core::session::Session;

const FILES: &str = "abcdefgh";

/// Board rows as text, top row first, from `perspective`'s side of the table.
/// White pieces are uppercase, black lowercase, empty squares `.`.
pub fn board_lines(fen: &str, perspective: Side) -> Vec<String> {
    let placement = fen.split_whitespace().next().unwrap_or_default();
    let mut ranks: Vec<Vec<char>> = placement
        .split('/')
        .map(|rank| {
            rank.chars()
                .flat_map(|c| match c.to_digit(10) {
                    Some(n) => vec!['.'; n as usize],
                    None => vec![c],
                })
                .collect()
        })
        .collect();
    ranks.resize(8, vec!['.'; 8]);

    let mut labels: Vec<u32> = (1..=8).rev().collect();
    let mut files: Vec<char> = FILES.chars().collect();
    if perspective == Side::Black {
        ranks.reverse();
        ranks.iter_mut().for_each(|r| r.reverse());
        labels.reverse();
        files.reverse();
    }

    let mut lines: Vec<String> = ranks
        .iter()
        .zip(labels)
        .map(|(rank, label)| {
            let squares: Vec<String> = rank.iter().map(char::to_string).collect();
            format!("{label} {}", squares.join(" "))
        })
        .collect();
    let footer: Vec<String> = files.iter().map(char::to_string).collect();
    lines.push(format!("  {}", footer.join(" ")));
    lines
}

/// "1. e4 e5" style lines, one per full move.
fn move_list_lines<R: RulesEngine>(session: &Session<R>) -> Vec<Line<'static>> {
    session
        .moves()
        .chunks(2)
        .enumerate()
        .map(|(i, pair)| {
            let black = pair.get(1).map(|m| m.san.as_str()).unwrap_or_default();
            Line::from(format!("{:>3}. {:<8}{}", i + 1, pair[0].san, black))
        })
        .collect()
}

fn status_text<R: RulesEngine>(session: &Session<R>) -> String {
    match session.state() {
        SessionState::Idle | SessionState::Connecting => "Connecting...".to_string(),
        SessionState::Active if session.is_local_turn() => "Your move".to_string(),
        SessionState::Active => "Waiting for opponent...".to_string(),
        SessionState::Terminal => session
            .outcome()
            .map(|o| o.result_text())
            .unwrap_or_else(|| "Game over".to_string()),
    }
}

fn clock_line<R: RulesEngine>(session: &Session<R>, side: Side) -> Line<'static> {
    let clock = session.clock();
    let name = session.settings().name_of(side).to_string();
    let text = format!(
        " {:<5} {:>6}  {name}",
        side.to_string(),
        format_clock(clock.remaining(side))
    );
    let style = if clock.is_running() && clock.active() == side {
        Style::default().fg(Color::Black).bg(Color::Yellow).add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };
    Line::from(Span::styled(text, style))
}

pub fn render<R: RulesEngine>(frame: &mut Frame, session: &Session<R>, input: &str, log: &[String]) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),  // Status
            Constraint::Min(12),    // Board + side panels
            Constraint::Length(5),  // Log
            Constraint::Length(3),  // Input
        ])
        .split(frame.area());

    let status = Paragraph::new(status_text(session))
        .block(Block::default().borders(Borders::ALL).title("lanchess"))
        .style(Style::default().fg(Color::Yellow));
    frame.render_widget(status, chunks[0]);

    let middle = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(24),
            Constraint::Length(30),
            Constraint::Min(20),
        ])
        .split(chunks[1]);

    // Opponent's clock on top, ours at the bottom.
    let me = session.local_role();
    let mut board: Vec<Line> = vec![clock_line(session, me.opponent()), Line::from("")];
    board.extend(
        board_lines(&session.rules().fen(), me)
            .into_iter()
            .map(Line::from),
    );
    board.push(Line::from(""));
    board.push(clock_line(session, me));
    frame.render_widget(
        Paragraph::new(board).block(Block::default().borders(Borders::ALL).title(format!("You play {me}"))),
        middle[0],
    );

    let moves = move_list_lines(session);
    // Keep the latest moves visible.
    let visible = middle[1].height.saturating_sub(2) as usize;
    let skip = moves.len().saturating_sub(visible);
    frame.render_widget(
        Paragraph::new(moves.into_iter().skip(skip).collect::<Vec<_>>())
            .block(Block::default().borders(Borders::ALL).title("Moves")),
        middle[1],
    );

    let settings = session.settings();
    let chat: Vec<Line> = session
        .chat()
        .iter()
        .map(|line| {
            let (who, color) = if line.own {
                (settings.name_of(me), Color::Green)
            } else {
                (settings.name_of(me.opponent()), Color::Cyan)
            };
            Line::from(vec![
                Span::styled(format!("{who}: "), Style::default().fg(color)),
                Span::raw(line.text.clone()),
            ])
        })
        .collect();
    let chat_skip = chat.len().saturating_sub(middle[2].height.saturating_sub(2) as usize);
    frame.render_widget(
        Paragraph::new(chat.into_iter().skip(chat_skip).collect::<Vec<_>>())
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Chat")),
        middle[2],
    );

    let log_skip = log.len().saturating_sub(3);
    let log_lines: Vec<Line> = log.iter().skip(log_skip).map(|l| Line::from(l.clone())).collect();
    frame.render_widget(
        Paragraph::new(log_lines).block(Block::default().borders(Borders::ALL).title("Log")),
        chunks[2],
    );

    let border = if session.is_local_turn() {
        Color::Green
    } else {
        Color::DarkGray
    };
    let prompt = Paragraph::new(format!("> {input}_")).block(
        Block::default()
            .borders(Borders::ALL)
            .title("e2e4 | /say <text> | /resign | Esc to quit")
            .border_style(Style::default().fg(border)),
    );
    frame.render_widget(prompt, chunks[3]);
}

#[cfg(test)]
mod tests {
    use super::*;

    const START: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    #[test]
    fn white_sees_its_pieces_at_the_bottom() {
        let lines = board_lines(START, Side::White);
        assert_eq!(lines.len(), 9);
        assert_eq!(lines[0], "8 r n b q k b n r");
        assert_eq!(lines[4], "4 . . . . . . . .");
        assert_eq!(lines[7], "1 R N B Q K B N R");
        assert_eq!(lines[8], "  a b c d e f g h");
    }

    #[test]
    fn black_sees_the_board_rotated() {
        let lines = board_lines(START, Side::Black);
        assert_eq!(lines[0], "1 R N B K Q B N R");
        assert_eq!(lines[7], "8 r n b k q b n r");
        assert_eq!(lines[8], "  h g f e d c b a");
    }
}
