//! Line commands understood by the interactive `chat` loop.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Plain text: send it as a question.
    Send(String),
    /// `/q N`: send the N-th suggested question (1-based).
    Question(usize),
    /// `/up`, `/down`: rate the latest assistant reply.
    ThumbsUp,
    ThumbsDown,
    Summary,
    Analysis,
    Help,
    Exit,
    Invalid(String),
}

pub const HELP: &str = "\
Type a question and press Enter. Commands:
  /q N        ask suggested question N
  /up, /down  rate the last answer
  /summary    show the chat summary
  /analysis   show deep analysis status
  /help       show this help
  /exit       leave the chat";

impl ChatCommand {
    pub fn parse(line: &str) -> ChatCommand {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('/') else {
            return ChatCommand::Send(line.to_string());
        };

        let mut parts = rest.split_whitespace();
        let name = parts.next().unwrap_or("");
        let arg = parts.next();

        match (name, arg) {
            ("q", Some(n)) => match n.parse::<usize>() {
                Ok(n) if n >= 1 => ChatCommand::Question(n),
                _ => ChatCommand::Invalid(format!("not a question number: {}", n)),
            },
            ("q", None) => ChatCommand::Invalid("usage: /q N".to_string()),
            ("up", _) => ChatCommand::ThumbsUp,
            ("down", _) => ChatCommand::ThumbsDown,
            ("summary", _) => ChatCommand::Summary,
            ("analysis", _) => ChatCommand::Analysis,
            ("help", _) => ChatCommand::Help,
            ("exit" | "quit", _) => ChatCommand::Exit,
            (other, _) => ChatCommand::Invalid(format!("unknown command: /{}", other)),
        }
    }
}
