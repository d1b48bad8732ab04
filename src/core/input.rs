use crate::core::game::MoveRequest;

/// What the player typed into the input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Move(MoveRequest),
    Resign,
    Chat(String),
    Quit,
}

impl Command {
    /// Accepts `/resign`, `/quit`, `/say <text>` and coordinate moves such as
    /// `e2e4`, `e2 e4`, `e2-e4` or `e7e8q`. Returns `None` for anything else.
    pub fn parse(line: &str) -> Option<Command> {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix('/') {
            let (word, arg) = match rest.split_once(char::is_whitespace) {
                Some((word, arg)) => (word, arg.trim()),
                None => (rest, ""),
            };
            return match word.to_ascii_lowercase().as_str() {
                "resign" => Some(Command::Resign),
                "quit" | "q" => Some(Command::Quit),
                "say" | "s" if !arg.is_empty() => Some(Command::Chat(arg.to_string())),
                _ => None,
            };
        }
        parse_move(line).map(Command::Move)
    }
}

fn parse_move(text: &str) -> Option<MoveRequest> {
    let compact: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if !(compact.len() == 4 || compact.len() == 5) || !compact.is_ascii() {
        return None;
    }

    let (from, rest) = compact.split_at(2);
    let (to, promotion) = rest.split_at(2);
    if !is_square(from) || !is_square(to) {
        return None;
    }

    let mv = MoveRequest::new(from, to);
    match promotion {
        "" => Some(mv),
        "q" | "r" | "b" | "n" => Some(mv.with_promotion(promotion)),
        _ => None,
    }
}

fn is_square(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 2 && (b'a'..=b'h').contains(&b[0]) && (b'1'..=b'8').contains(&b[1])
}
