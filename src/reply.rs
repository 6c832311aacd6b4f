use std::fmt;

/// A reply sent from the server to the client.
///
/// A reply has a three digit code and one or more text lines.
/// All but the last line are sent with a `-` after the code.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Reply {
    code: u16,
    lines: Vec<String>,
}

impl Reply {
    pub fn new(code: u16, text: impl Into<String>) -> Self {
        Self {
            code,
            lines: vec![text.into()],
        }
    }

    /// Create a reply spanning several lines.
    ///
    /// An empty list of lines is sent as a single empty line.
    pub fn multiline(code: u16, lines: Vec<String>) -> Self {
        if lines.is_empty() {
            Self::new(code, "")
        } else {
            Self { code, lines }
        }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Whether this is a 2xx or 3xx reply.
    pub fn is_positive(&self) -> bool {
        (200..400).contains(&self.code)
    }

    pub(crate) fn ok() -> Self {
        Self::new(250, "OK")
    }

    pub(crate) fn greeting(hostname: &str) -> Self {
        Self::new(220, format!("{hostname} ESMTP ready"))
    }

    pub(crate) fn start_data() -> Self {
        Self::new(354, "End data with <CR><LF>.<CR><LF>")
    }

    pub(crate) fn closing(hostname: &str) -> Self {
        Self::new(221, format!("{hostname} closing connection"))
    }

    pub(crate) fn line_too_long() -> Self {
        Self::new(500, "Line too long")
    }

    pub(crate) fn bad_sequence(text: &str) -> Self {
        Self::new(503, format!("Bad sequence of commands: {text}"))
    }

    /// Render the reply as sent on the wire, CRLF terminated.
    pub fn format(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let last = self.lines.len() - 1;
        for (i, line) in self.lines.iter().enumerate() {
            let separator = if i == last { ' ' } else { '-' };
            write!(f, "{}{separator}{line}\r\n", self.code)?;
        }
        Ok(())
    }
}
