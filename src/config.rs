use std::{str::FromStr, time::Duration};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// The configuration for a SMTP server.
///
/// All fields have usable defaults,
/// see [`Config::default`].
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Config {
    /// The name the server announces in its greeting.
    pub hostname: String,

    /// How long to wait for each line from the client.
    ///
    /// A client that sends nothing within this time
    /// is disconnected without a reply.
    pub read_timeout: Duration,

    /// How long to wait for each reply to be written.
    pub write_timeout: Duration,

    /// The longest accepted line, including the line ending.
    pub max_line_length: usize,

    /// The largest accepted message body in bytes.
    pub max_message_size: usize,

    /// The most recipients accepted for one message.
    pub max_recipients: usize,

    /// How strictly to check envelope addresses.
    pub address_check: AddressCheck,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            read_timeout: DEFAULT_TIMEOUT,
            write_timeout: DEFAULT_TIMEOUT,
            max_line_length: 1000,
            max_message_size: 10 * 1024 * 1024,
            max_recipients: 100,
            address_check: AddressCheck::Any,
        }
    }
}

/// The check applied to `MAIL FROM` and `RCPT TO` addresses.
///
/// This type can be parsed from a string.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub enum AddressCheck {
    /// Accept any address that is not empty.
    #[default]
    Any,
    /// Require a `local@domain` address
    /// within the RFC 5321 length limits.
    Basic,
}

impl AddressCheck {
    const MAX_LOCAL_PART: usize = 64;
    const MAX_DOMAIN: usize = 255;
    const MAX_PATH: usize = 256;

    /// Check an address, returning the reason it was refused.
    pub(crate) fn check(self, address: &str) -> Result<(), &'static str> {
        if address.is_empty() {
            return Err("empty address");
        }
        match self {
            AddressCheck::Any => Ok(()),
            AddressCheck::Basic => {
                if address.len() > Self::MAX_PATH {
                    return Err("address too long");
                }
                if address.chars().any(char::is_whitespace) {
                    return Err("address contains whitespace");
                }
                let (local, domain) =
                    address.rsplit_once('@').ok_or("address lacks '@'")?;
                if local.is_empty() || domain.is_empty() {
                    return Err("address lacks local part or domain");
                }
                if local.len() > Self::MAX_LOCAL_PART {
                    return Err("local part too long");
                }
                if domain.len() > Self::MAX_DOMAIN {
                    return Err("domain too long");
                }
                Ok(())
            }
        }
    }
}

impl FromStr for AddressCheck {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("any") {
            Ok(AddressCheck::Any)
        } else if s.eq_ignore_ascii_case("basic") {
            Ok(AddressCheck::Basic)
        } else {
            Err("unknown address check; expected \"any\" or \"basic\"")
        }
    }
}
