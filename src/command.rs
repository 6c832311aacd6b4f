use std::{fmt, str::FromStr};

use crate::reply::Reply;

/// A command sent by the client.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Command {
    /// `HELO <domain>`
    Helo(String),
    /// `EHLO <domain>`
    Ehlo(String),
    /// `MAIL FROM:<address> [parameters]`
    Mail(Path),
    /// `RCPT TO:<address> [parameters]`
    Rcpt(Path),
    Data,
    Rset,
    Noop,
    Quit,
}

/// The verb of a [`Command`], without its arguments.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Verb {
    Helo,
    Ehlo,
    Mail,
    Rcpt,
    Data,
    Rset,
    Noop,
    Quit,
}

/// The address argument of `MAIL` and `RCPT`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Path {
    /// The mailbox, without angle brackets or source route.
    ///
    /// This is empty for the null reverse-path `<>`.
    pub address: String,

    /// Any ESMTP parameters following the path,
    /// such as `BODY=8BITMIME`.
    pub parameters: Vec<String>,
}

/// An error parsing a command line.
#[derive(thiserror::Error, PartialEq, Eq, Debug)]
pub enum ParseError {
    #[error("empty command line")]
    Empty,
    #[error("unrecognized command {0:?}")]
    Unrecognized(String),
    #[error("syntax error in {verb} arguments: {reason}")]
    Syntax { verb: Verb, reason: &'static str },
}

impl ParseError {
    /// The reply telling the client about this error.
    pub fn reply(&self) -> Reply {
        match self {
            ParseError::Empty | ParseError::Unrecognized(_) => {
                Reply::new(500, "Syntax error, command unrecognized")
            }
            ParseError::Syntax { verb, reason } => {
                Reply::new(501, format!("Syntax error in {verb} arguments: {reason}"))
            }
        }
    }
}

impl Command {
    pub fn verb(&self) -> Verb {
        match self {
            Command::Helo(_) => Verb::Helo,
            Command::Ehlo(_) => Verb::Ehlo,
            Command::Mail(_) => Verb::Mail,
            Command::Rcpt(_) => Verb::Rcpt,
            Command::Data => Verb::Data,
            Command::Rset => Verb::Rset,
            Command::Noop => Verb::Noop,
            Command::Quit => Verb::Quit,
        }
    }
}

impl Verb {
    fn as_str(self) -> &'static str {
        match self {
            Verb::Helo => "HELO",
            Verb::Ehlo => "EHLO",
            Verb::Mail => "MAIL",
            Verb::Rcpt => "RCPT",
            Verb::Data => "DATA",
            Verb::Rset => "RSET",
            Verb::Noop => "NOOP",
            Verb::Quit => "QUIT",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Verb::Helo,
            Verb::Ehlo,
            Verb::Mail,
            Verb::Rcpt,
            Verb::Data,
            Verb::Rset,
            Verb::Noop,
            Verb::Quit,
        ]
        .into_iter()
        .find(|verb| verb.as_str().eq_ignore_ascii_case(s))
        .ok_or_else(|| ParseError::Unrecognized(s.to_string()))
    }
}

impl FromStr for Command {
    type Err = ParseError;

    /// Parse one command line.
    ///
    /// The line may still carry its CRLF.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (verb, args) = match line.split_once(char::is_whitespace) {
            Some((verb, args)) => (verb, args.trim()),
            None => (line, ""),
        };
        if verb.is_empty() {
            return Err(ParseError::Empty);
        }
        let verb: Verb = verb.parse()?;
        let syntax = |reason: &'static str| ParseError::Syntax { verb, reason };
        match verb {
            Verb::Helo | Verb::Ehlo => {
                let domain = args
                    .split_whitespace()
                    .next()
                    .ok_or_else(|| syntax("missing domain"))?
                    .to_string();
                if verb == Verb::Helo {
                    Ok(Command::Helo(domain))
                } else {
                    Ok(Command::Ehlo(domain))
                }
            }
            Verb::Mail => {
                let path = strip_keyword(args, "FROM:")
                    .ok_or_else(|| syntax("expected FROM:<address>"))?;
                Ok(Command::Mail(parse_path(path).map_err(syntax)?))
            }
            Verb::Rcpt => {
                let path = strip_keyword(args, "TO:")
                    .ok_or_else(|| syntax("expected TO:<address>"))?;
                let path = parse_path(path).map_err(syntax)?;
                if path.address.is_empty() {
                    return Err(syntax("empty recipient"));
                }
                Ok(Command::Rcpt(path))
            }
            Verb::Noop => Ok(Command::Noop),
            Verb::Data | Verb::Rset | Verb::Quit if !args.is_empty() => {
                Err(syntax("no arguments allowed"))
            }
            Verb::Data => Ok(Command::Data),
            Verb::Rset => Ok(Command::Rset),
            Verb::Quit => Ok(Command::Quit),
        }
    }
}

/// Strip a case insensitive keyword such as `FROM:`.
fn strip_keyword<'a>(args: &'a str, keyword: &str) -> Option<&'a str> {
    let head = args.get(..keyword.len())?;
    if head.eq_ignore_ascii_case(keyword) {
        Some(args[keyword.len()..].trim_start())
    } else {
        None
    }
}

/// Parse `<address> [parameters]` or a bare `address [parameters]`.
fn parse_path(s: &str) -> Result<Path, &'static str> {
    let (address, rest) = if let Some(inner) = s.strip_prefix('<') {
        inner.split_once('>').ok_or("unterminated path")?
    } else {
        let (address, rest) = match s.split_once(char::is_whitespace) {
            Some((address, rest)) => (address, rest),
            None => (s, ""),
        };
        // only `<>` stands for the null path
        if address.is_empty() || is_parameter(address) {
            return Err("missing path");
        }
        (address, rest)
    };
    if address.contains(['<', '>']) {
        return Err("malformed path");
    }
    // Drop an RFC 5321 source route, `@a,@b:user@c`.
    let address = match address.strip_prefix('@') {
        Some(route) => {
            route.split_once(':').ok_or("malformed source route")?.1
        }
        None => address,
    };
    Ok(Path {
        address: address.to_string(),
        parameters: rest.split_whitespace().map(str::to_string).collect(),
    })
}

/// An ESMTP parameter such as `BODY=8BITMIME`, as opposed to an address.
fn is_parameter(s: &str) -> bool {
    s.contains('=') && !s.contains('@')
}

#[cfg(test)]
mod tests {
    use super::{Command, ParseError, Path, Verb};

    fn path(address: &str) -> Path {
        Path {
            address: address.to_string(),
            parameters: vec![],
        }
    }

    #[test]
    fn verbs_ignore_case() {
        assert_eq!("quit".parse(), Ok(Command::Quit));
        assert_eq!("NoOp".parse(), Ok(Command::Noop));
        assert_eq!("DATA\r\n".parse(), Ok(Command::Data));
        assert_eq!("rset".parse(), Ok(Command::Rset));
    }

    #[test]
    fn helo_and_ehlo() {
        assert_eq!("HELO a".parse(), Ok(Command::Helo("a".to_string())));
        assert_eq!(
            "ehlo [127.0.0.1]".parse(),
            Ok(Command::Ehlo("[127.0.0.1]".to_string()))
        );
        assert_eq!(
            "HELO".parse::<Command>(),
            Err(ParseError::Syntax {
                verb: Verb::Helo,
                reason: "missing domain"
            })
        );
    }

    #[test]
    fn mail_from_bracketed() {
        assert_eq!(
            "MAIL FROM:<sender@example.org>".parse(),
            Ok(Command::Mail(path("sender@example.org")))
        );
        assert_eq!(
            "mail from: <sender@example.org>".parse(),
            Ok(Command::Mail(path("sender@example.org")))
        );
    }

    #[test]
    fn mail_from_bare_and_null() {
        assert_eq!(
            "MAIL FROM:sender@example.org".parse(),
            Ok(Command::Mail(path("sender@example.org")))
        );
        assert_eq!("MAIL FROM:<>".parse(), Ok(Command::Mail(path(""))));
    }

    #[test]
    fn mail_from_parameters() {
        let command: Command =
            "MAIL FROM:<a@b.c> BODY=8BITMIME SIZE=42".parse().unwrap();
        assert_eq!(
            command,
            Command::Mail(Path {
                address: "a@b.c".to_string(),
                parameters: vec![
                    "BODY=8BITMIME".to_string(),
                    "SIZE=42".to_string()
                ],
            })
        );
    }

    #[test]
    fn rcpt_to() {
        assert_eq!(
            "RCPT TO:<recipient@example.net>".parse(),
            Ok(Command::Rcpt(path("recipient@example.net")))
        );
        assert_eq!(
            "RCPT TO:<@relay.one,@relay.two:user@example.net>".parse(),
            Ok(Command::Rcpt(path("user@example.net")))
        );
    }

    #[test]
    fn malformed_paths() {
        let errors = [
            "MAIL <a@b.c>",
            "MAIL FROM:<a@b.c",
            "MAIL FROM:<<a@b.c>>",
            "RCPT TO:<>",
            "RCPT FROM:<a@b.c>",
            "RCPT TO:",
        ];
        for line in errors {
            let error = line.parse::<Command>().unwrap_err();
            assert_eq!(error.reply().code(), 501, "{line}");
        }
    }

    #[test]
    fn mail_from_without_path() {
        for line in ["MAIL FROM:", "MAIL FROM: ", "MAIL FROM: BODY=8BITMIME"] {
            assert_eq!(
                line.parse::<Command>(),
                Err(ParseError::Syntax {
                    verb: Verb::Mail,
                    reason: "missing path"
                }),
                "{line}"
            );
        }
        assert_eq!(
            "MAIL FROM:<> BODY=8BITMIME".parse(),
            Ok(Command::Mail(Path {
                address: String::new(),
                parameters: vec!["BODY=8BITMIME".to_string()],
            }))
        );
    }

    #[test]
    fn tab_after_verb() {
        assert_eq!("HELO\ta".parse(), Ok(Command::Helo("a".to_string())));
        assert_eq!(
            "MAIL\tFROM:<s@x>".parse(),
            Ok(Command::Mail(path("s@x")))
        );
    }

    #[test]
    fn arguments_not_allowed() {
        assert!(matches!(
            "DATA now".parse::<Command>(),
            Err(ParseError::Syntax {
                verb: Verb::Data,
                ..
            })
        ));
        assert!("QUIT please".parse::<Command>().is_err());
        assert_eq!("NOOP anything".parse(), Ok(Command::Noop));
    }

    #[test]
    fn unrecognized() {
        let error = "VRFY user".parse::<Command>().unwrap_err();
        assert_eq!(error, ParseError::Unrecognized("VRFY".to_string()));
        assert_eq!(error.reply().code(), 500);
        assert_eq!("".parse::<Command>(), Err(ParseError::Empty));
    }
}
