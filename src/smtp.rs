use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::reply::Reply;

/// An error on the connection to a client.
///
/// Apart from [`Error::LineTooLong`]
/// these end the session without a reply.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("no {0} within the deadline")]
    Timeout(Operation),
    #[error("connection closed by client")]
    Closed,
    #[error("line too long; max {max} bytes")]
    LineTooLong { max: usize },
}

/// The operation a deadline applies to.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Operation {
    Read,
    Write,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Read => f.write_str("read"),
            Operation::Write => f.write_str("write"),
        }
    }
}

/// The outcome of the DATA phase.
#[derive(PartialEq, Eq, Debug)]
pub(crate) enum Body {
    Complete(Vec<u8>),
    /// The body or one of its lines exceeded the limits.
    /// It was read up to the terminator and dropped.
    TooLarge,
}

/// Reads lines from a client, each within its own deadline.
pub(crate) struct LineReader<R> {
    inner: BufReader<R>,
    max_line_length: usize,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(reader: R, max_line_length: usize) -> Self {
        Self {
            inner: BufReader::new(reader),
            max_line_length,
        }
    }

    /// Read up to a "\n", returning the line without its ending.
    ///
    /// A line longer than the limit is consumed in full
    /// and reported as [`Error::LineTooLong`],
    /// so the next read starts at the next line.
    pub async fn read_line(
        &mut self,
        deadline: Duration,
    ) -> Result<Vec<u8>, Error> {
        let line = tokio::time::timeout(deadline, self.read_until_newline())
            .await
            .map_err(|_| Error::Timeout(Operation::Read))??;
        #[cfg(feature = "tracing")]
        {
            use tracing::{event, Level};
            event!(Level::TRACE, recv = %String::from_utf8_lossy(&line));
        }
        Ok(line)
    }

    async fn read_until_newline(&mut self) -> Result<Vec<u8>, Error> {
        let max = self.max_line_length;
        let mut line = Vec::new();
        let mut overflow = false;
        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                return Err(Error::Closed);
            }
            let (used, done) =
                match available.iter().position(|&byte| byte == b'\n') {
                    Some(end) => (end + 1, true),
                    None => (available.len(), false),
                };
            if !overflow {
                if line.len() + used > max {
                    overflow = true;
                    line.clear();
                } else {
                    line.extend_from_slice(&available[..used]);
                }
            }
            self.inner.consume(used);
            if done {
                break;
            }
        }
        if overflow {
            return Err(Error::LineTooLong { max });
        }
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Ok(line)
    }

    /// Read a message body up to the lone "." line.
    ///
    /// Dot-stuffing is undone and every line is ended with CRLF.
    /// The deadline applies to each line separately.
    pub async fn read_body(
        &mut self,
        deadline: Duration,
        max_size: usize,
    ) -> Result<Body, Error> {
        let mut body = Vec::new();
        let mut too_large = false;
        loop {
            let line = match self.read_line(deadline).await {
                Ok(line) => line,
                Err(Error::LineTooLong { .. }) => {
                    too_large = true;
                    continue;
                }
                Err(error) => return Err(error),
            };
            if line == b"." {
                break;
            }
            if too_large {
                continue;
            }
            let line = line.strip_prefix(b".").unwrap_or(&line[..]);
            if body.len() + line.len() + 2 > max_size {
                too_large = true;
                body = Vec::new();
                continue;
            }
            body.extend_from_slice(line);
            body.extend_from_slice(b"\r\n");
        }
        if too_large {
            Ok(Body::TooLarge)
        } else {
            Ok(Body::Complete(body))
        }
    }
}

/// Write a reply within the deadline.
pub(crate) async fn write_reply(
    mut writer: impl AsyncWrite + Unpin,
    reply: &Reply,
    deadline: Duration,
) -> Result<(), Error> {
    let data = reply.format();
    #[cfg(feature = "tracing")]
    {
        use tracing::{event, Level};
        event!(Level::TRACE, send = data.trim_end());
    }
    let write = async {
        writer.write_all(data.as_bytes()).await?;
        writer.flush().await
    };
    tokio::time::timeout(deadline, write)
        .await
        .map_err(|_| Error::Timeout(Operation::Write))??;
    Ok(())
}
