//! Slash-command parsing.
//!
//! ```text
//! /plugin create add-one {
//!     ...
//! }
//! ```
//!
//! The header runs to the first newline or `{`; its first token names the module and
//! the rest are arguments. Everything after the header is the body.

use crate::module::CommandError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub module: String,
    pub args: String,
    pub body: String,
}

impl Command {
    pub fn parse(text: &str) -> Result<Self, CommandError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CommandError::Parse("empty command".to_string()));
        }
        let rest = text
            .strip_prefix('/')
            .ok_or_else(|| CommandError::Parse("commands start with '/'".to_string()))?;

        let header_end = rest.find(|c: char| c == '\n' || c == '{').unwrap_or(rest.len());
        let (header, body) = rest.split_at(header_end);

        let mut parts = header.trim().splitn(2, char::is_whitespace);
        let module = parts.next().unwrap_or_default().trim();
        if module.is_empty() {
            return Err(CommandError::Parse("missing command name".to_string()));
        }
        let args = parts.next().unwrap_or_default().trim();

        Ok(Self {
            module: module.to_string(),
            args: args.to_string(),
            body: body.trim().to_string(),
        })
    }
}

/// True when every `{` has a matching `}`. Used to decide whether a multi-line
/// command has been fully entered.
pub fn braces_balanced(text: &str) -> bool {
    let mut depth: i64 = 0;
    for c in text.chars() {
        match c {
            '{' => depth += 1,
            '}' => depth -= 1,
            _ => {}
        }
    }
    depth <= 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_command() {
        let cmd = Command::parse("/help").unwrap();
        assert_eq!(cmd.module, "help");
        assert!(cmd.args.is_empty());
        assert!(cmd.body.is_empty());
    }

    #[test]
    fn parses_inline_body() {
        let cmd = Command::parse("/plugin create add-one {\npub fn x() {}\n}").unwrap();
        assert_eq!(cmd.module, "plugin");
        assert_eq!(cmd.args, "create add-one");
        assert_eq!(cmd.body, "{\npub fn x() {}\n}");
    }

    #[test]
    fn parses_body_on_next_line() {
        let cmd = Command::parse("  /memory store\n{\n  \"memory\": \"cookies\"\n}  ").unwrap();
        assert_eq!(cmd.module, "memory");
        assert_eq!(cmd.args, "store");
        assert!(cmd.body.starts_with('{') && cmd.body.ends_with('}'));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(Command::parse(""), Err(CommandError::Parse(_))));
        assert!(matches!(Command::parse("help"), Err(CommandError::Parse(_))));
        assert!(matches!(Command::parse("/ {x}"), Err(CommandError::Parse(_))));
    }

    #[test]
    fn brace_balance() {
        assert!(braces_balanced("/help"));
        assert!(!braces_balanced("/plugin create x {\nfn a() {"));
        assert!(braces_balanced("/plugin create x {\nfn a() {}\n}"));
    }
}
