/// A message as received by the server.
///
/// The envelope addresses are exactly as given in the
/// `MAIL FROM` and `RCPT TO` commands.
#[derive(Clone, PartialEq, Eq, Debug)]
#[non_exhaustive]
pub struct Message {
    /// The envelope sender.
    ///
    /// This is empty for the null reverse-path `<>`.
    pub sender: String,

    /// The envelope recipients, in the order given.
    ///
    /// Duplicates are kept.
    pub recipients: Vec<String>,

    /// The raw message, headers included.
    ///
    /// Dot-stuffing and the terminating `.` line are removed,
    /// every line ends with CRLF.
    pub body: Vec<u8>,
}

impl Message {
    pub(crate) fn new(
        sender: String,
        recipients: Vec<String>,
        body: Vec<u8>,
    ) -> Self {
        Self {
            sender,
            recipients,
            body,
        }
    }

    /// Parse the body as a MIME message.
    pub fn parse(
        &self,
    ) -> Result<mailparse::ParsedMail<'_>, mailparse::MailParseError> {
        mailparse::parse_mail(&self.body)
    }

    /// Get the first value of a header, decoded.
    ///
    /// Returns `None` if the header is absent
    /// or the header block cannot be parsed.
    pub fn header(&self, name: &str) -> Option<String> {
        use mailparse::MailHeaderMap;
        let (headers, _) = mailparse::parse_headers(&self.body).ok()?;
        headers.get_first_value(name)
    }

    /// Get the `Subject` header.
    pub fn subject(&self) -> Option<String> {
        self.header("Subject")
    }
}
