use std::sync::Arc;

use crate::{
    command::{Command, Verb},
    reply::Reply,
    Config, Message,
};

/// The error a delivery callback may return.
pub type DeliveryError = Box<dyn std::error::Error + Send + Sync>;

pub(crate) type Callback =
    Arc<dyn Fn(Message) -> Result<(), DeliveryError> + Send + Sync>;

/// Box a delivery callback, erasing its error type.
pub(crate) fn callback<F, E>(callback: F) -> Callback
where
    F: Fn(Message) -> Result<(), E> + Send + Sync + 'static,
    E: Into<DeliveryError>,
{
    Arc::new(move |message| -> Result<(), DeliveryError> {
        callback(message).map_err(Into::into)
    })
}

/// The protocol state of a session.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum State {
    /// Connected, waiting for `HELO` or `EHLO`.
    Greeting,
    /// Ready for `MAIL`.
    Idle,
    /// Sender set, waiting for `RCPT`.
    MailFrom,
    /// At least one recipient set, waiting for `RCPT` or `DATA`.
    RcptTo,
    /// Collecting the message body.
    Data,
}

/// What the connection must do after a command.
#[derive(PartialEq, Eq, Debug)]
pub enum Step {
    /// Send the reply and read the next command.
    Reply(Reply),
    /// Send the reply and collect the message body.
    Data(Reply),
    /// Send the reply and close the connection.
    Quit(Reply),
}

/// Check a verb against the state,
/// giving the next state or the rejection to send.
///
/// A rejected command leaves the state unchanged.
pub fn transition(state: State, verb: Verb) -> Result<State, Reply> {
    match (state, verb) {
        (State::Greeting | State::Idle, Verb::Helo | Verb::Ehlo) => {
            Ok(State::Idle)
        }
        (_, Verb::Helo | Verb::Ehlo) => Err(Reply::bad_sequence(
            "HELO/EHLO not allowed during a mail transaction",
        )),
        (State::Idle, Verb::Mail) => Ok(State::MailFrom),
        (State::Greeting, Verb::Mail) => {
            Err(Reply::bad_sequence("send HELO/EHLO first"))
        }
        (_, Verb::Mail) => {
            Err(Reply::bad_sequence("sender already specified"))
        }
        (State::MailFrom | State::RcptTo, Verb::Rcpt) => Ok(State::RcptTo),
        (_, Verb::Rcpt) => Err(Reply::bad_sequence("need MAIL before RCPT")),
        (State::RcptTo, Verb::Data) => Ok(State::Data),
        (State::MailFrom, Verb::Data) => {
            Err(Reply::bad_sequence("need RCPT before DATA"))
        }
        (_, Verb::Data) => Err(Reply::bad_sequence("need MAIL before DATA")),
        // without a greeting there is no idle state to return to
        (State::Greeting, Verb::Rset) => Ok(State::Greeting),
        (_, Verb::Rset) => Ok(State::Idle),
        (state, Verb::Noop | Verb::Quit) => Ok(state),
    }
}

/// The protocol state of one connection.
///
/// The session does no I/O itself:
/// it is fed command lines and message bodies
/// and answers with the reply to send.
pub struct Session {
    config: Arc<Config>,
    callback: Callback,
    state: State,
    client_domain: Option<String>,
    sender: Option<String>,
    recipients: Vec<String>,
}

impl Session {
    /// Create a session for a new connection.
    pub fn new<F, E>(config: Config, callback: F) -> Self
    where
        F: Fn(Message) -> Result<(), E> + Send + Sync + 'static,
        E: Into<DeliveryError>,
    {
        Self::from_parts(Arc::new(config), self::callback(callback))
    }

    pub(crate) fn from_parts(config: Arc<Config>, callback: Callback) -> Self {
        Self {
            config,
            callback,
            state: State::Greeting,
            client_domain: None,
            sender: None,
            recipients: Vec::new(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// The domain the client announced in `HELO` or `EHLO`.
    pub fn client_domain(&self) -> Option<&str> {
        self.client_domain.as_deref()
    }

    /// The reply sent when the client connects.
    pub fn greeting(&self) -> Reply {
        Reply::greeting(&self.config.hostname)
    }

    /// Parse and handle one command line.
    pub fn handle_line(&mut self, line: &[u8]) -> Step {
        let line = String::from_utf8_lossy(line);
        match line.parse::<Command>() {
            Ok(command) => self.handle(command),
            Err(error) => Step::Reply(error.reply()),
        }
    }

    pub fn handle(&mut self, command: Command) -> Step {
        let next = match transition(self.state, command.verb()) {
            Ok(next) => next,
            Err(reply) => return Step::Reply(reply),
        };
        let hostname = &self.config.hostname;
        let reply = match command {
            Command::Helo(domain) => {
                let reply =
                    Reply::new(250, format!("{hostname} greets {domain}"));
                self.start_over(domain);
                reply
            }
            Command::Ehlo(domain) => {
                let reply = Reply::multiline(
                    250,
                    vec![
                        format!("{hostname} greets {domain}"),
                        "8BITMIME".to_string(),
                        format!("SIZE {}", self.config.max_message_size),
                    ],
                );
                self.start_over(domain);
                reply
            }
            Command::Mail(path) => {
                // the null reverse-path is always allowed
                if !path.address.is_empty() {
                    if let Err(reason) =
                        self.config.address_check.check(&path.address)
                    {
                        return Step::Reply(invalid_address(reason));
                    }
                }
                self.sender = Some(path.address);
                self.recipients.clear();
                Reply::ok()
            }
            Command::Rcpt(path) => {
                if let Err(reason) =
                    self.config.address_check.check(&path.address)
                {
                    return Step::Reply(invalid_address(reason));
                }
                if self.recipients.len() >= self.config.max_recipients {
                    return Step::Reply(Reply::new(452, "Too many recipients"));
                }
                self.recipients.push(path.address);
                Reply::ok()
            }
            Command::Data => {
                self.state = next;
                return Step::Data(Reply::start_data());
            }
            Command::Rset => {
                self.reset();
                Reply::ok()
            }
            Command::Noop => Reply::ok(),
            Command::Quit => return Step::Quit(Reply::closing(hostname)),
        };
        self.state = next;
        Step::Reply(reply)
    }

    /// Finish the DATA phase, handing the message to the callback.
    ///
    /// The session returns to [`State::Idle`] whatever the outcome.
    /// Outside the DATA phase nothing is delivered.
    pub fn deliver(&mut self, body: Vec<u8>) -> Reply {
        if self.state != State::Data {
            return Reply::bad_sequence("no mail transaction in progress");
        }
        self.state = State::Idle;
        let recipients = std::mem::take(&mut self.recipients);
        let sender = match self.sender.take() {
            Some(sender) if !recipients.is_empty() => sender,
            _ => return Reply::bad_sequence("no mail transaction in progress"),
        };
        let message = Message::new(sender, recipients, body);
        match (self.callback)(message) {
            Ok(()) => Reply::new(250, "OK: message accepted"),
            Err(error) => {
                #[cfg(feature = "tracing")]
                {
                    use tracing::{event, Level};
                    event!(Level::WARN, %error, "delivery rejected");
                }
                Reply::new(554, format!("Transaction failed: {error}"))
            }
        }
    }

    /// Abandon the DATA phase with the given reply.
    pub fn discard(&mut self, reply: Reply) -> Reply {
        if self.state == State::Data {
            self.reset();
            self.state = State::Idle;
        }
        reply
    }

    /// Drop the transaction, keeping the greeting.
    fn reset(&mut self) {
        self.sender = None;
        self.recipients.clear();
    }

    fn start_over(&mut self, client_domain: String) {
        self.client_domain = Some(client_domain);
        self.reset();
    }
}

fn invalid_address(reason: &str) -> Reply {
    Reply::new(501, format!("Invalid address: {reason}"))
}
