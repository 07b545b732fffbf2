//! Command token detection and argument splitting.
//!
//! Commands appear inline in chat or model output as `!name arg1 arg2 ...`.
//! Arguments are separated by whitespace; double quotes group an argument
//! containing spaces. Anything after the command's declared arguments is
//! not part of the invocation.

use once_cell::sync::Lazy;
use regex::Regex;

/// Command names are ASCII; `!` followed by other scripts is ordinary chat.
static COMMAND_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!([A-Za-z0-9_]+)").expect("command pattern is valid"));

/// Location of a command token inside a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandToken<'a> {
    /// Token including the leading `!`, e.g. `!goToPlayer`.
    pub name: &'a str,
    /// Byte offset of the `!`.
    pub start: usize,
    /// Byte offset just past the token.
    pub end: usize,
}

/// First command token in `text`, if any.
pub fn find_command(text: &str) -> Option<CommandToken<'_>> {
    COMMAND_PATTERN.find(text).map(|m| CommandToken {
        name: m.as_str(),
        start: m.start(),
        end: m.end(),
    })
}

/// An argument and the byte offset (relative to the input) just past it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawArg {
    pub value: String,
    pub end: usize,
}

/// Split `text` into at most `limit` arguments.
///
/// A quoted argument keeps its inner spaces and loses its quotes. An
/// unterminated quote runs to the end of the input.
pub fn split_args(text: &str, limit: usize) -> Vec<RawArg> {
    let mut args = Vec::new();
    let mut chars = text.char_indices().peekable();

    while args.len() < limit {
        while matches!(chars.peek(), Some((_, c)) if c.is_whitespace()) {
            chars.next();
        }
        let Some(&(_, first)) = chars.peek() else {
            break;
        };

        let mut value = String::new();
        let mut end = text.len();
        if first == '"' {
            chars.next();
            for (i, c) in chars.by_ref() {
                if c == '"' {
                    end = i + 1;
                    break;
                }
                value.push(c);
            }
        } else {
            while let Some(&(i, c)) = chars.peek() {
                if c.is_whitespace() {
                    end = i;
                    break;
                }
                value.push(c);
                chars.next();
            }
        }
        args.push(RawArg { value, end });
    }

    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_command() {
        let text = "Sure! !goToPlayer Bob 3";
        let token = find_command(text).unwrap();
        assert_eq!(token.name, "!goToPlayer");
        assert_eq!(&text[..token.start], "Sure! ");
        assert_eq!(token.end, 17);
    }

    #[test]
    fn test_no_command() {
        assert!(find_command("Hello there! How are you?").is_none());
        assert!(find_command("").is_none());
    }

    #[test]
    fn test_non_ascii_after_bang_is_chat() {
        assert!(find_command("好的!走吧").is_none());
        assert!(find_command("¡Hola!¿qué tal?").is_none());

        let token = find_command("好的!goToPlayer Bob 3").unwrap();
        assert_eq!(token.name, "!goToPlayer");
    }

    #[test]
    fn test_split_args_limit() {
        let args = split_args(" Bob 3 extra trailing text", 2);
        let values: Vec<_> = args.iter().map(|a| a.value.as_str()).collect();
        assert_eq!(values, vec!["Bob", "3"]);
        assert_eq!(&" Bob 3 extra trailing text"[..args[1].end], " Bob 3");
    }

    #[test]
    fn test_split_args_quotes() {
        let args = split_args(r#" "Steve the Brave" 2"#, 5);
        let values: Vec<_> = args.iter().map(|a| a.value.as_str()).collect();
        assert_eq!(values, vec!["Steve the Brave", "2"]);
    }

    #[test]
    fn test_split_args_unterminated_quote() {
        let args = split_args(r#" "oak log"#, 1);
        assert_eq!(args[0].value, "oak log");
        assert_eq!(args[0].end, 9);
    }

    #[test]
    fn test_split_args_zero_limit() {
        assert!(split_args("anything at all", 0).is_empty());
    }
}
