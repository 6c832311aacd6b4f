//! This crate provides a minimal SMTP server that receives messages
//! and hands each one to a callback.
//!
//! The [`Server`] speaks enough SMTP for a standard submission:
//! `HELO`/`EHLO`, `MAIL`, `RCPT`, `DATA`, `RSET`, `NOOP` and `QUIT`.
//! Every connection is served by its own task,
//! and every completed `DATA` calls the callback exactly once
//! with the envelope and the raw body.
//! Authentication, TLS and relaying are not supported.
//!
//! # Examples
//!
//! ```
//! # tokio_test::block_on(async {
//! use std::sync::Arc;
//!
//! use lettre::{AsyncTransport, Message};
//! use smtp_receiver::{Inbox, Server};
//!
//! let mut inbox = Inbox::new();
//! let server = Arc::new(Server::new(inbox.sender()));
//! tokio::spawn({
//!     let server = server.clone();
//!     async move { server.listen_and_serve("127.0.0.1:0").await }
//! });
//! let address = server.listening().await.unwrap();
//!
//! let client = lettre::AsyncSmtpTransport::<lettre::Tokio1Executor>
//!     ::builder_dangerous(address.ip().to_string())
//!     .port(address.port())
//!     .build();
//!
//! let message = Message::builder()
//!     .from("Friend <friend@example.com>".parse().unwrap())
//!     .to("MySelf <self@example.com>".parse().unwrap())
//!     .subject("Hello")
//!     .body("Welcome!".to_string())
//!     .unwrap();
//! client.send(message).await.unwrap();
//!
//! let received = inbox.receive().await;
//! assert_eq!(received.sender, "friend@example.com");
//! assert_eq!(received.subject().as_deref(), Some("Hello"));
//! server.close().unwrap();
//! # })
//! ```
//!
//! Any closure can serve as the callback.
//! Returning an error rejects the message with a `554` reply:
//!
//! ```
//! use smtp_receiver::{Message, Server};
//!
//! let mut server = Server::new(|message: Message| {
//!     if message.recipients.iter().any(|r| r.ends_with("@example.com")) {
//!         Ok(())
//!     } else {
//!         Err("we only take mail for example.com")
//!     }
//! });
//! server.config_mut().read_timeout = std::time::Duration::from_secs(5);
//! ```

#![forbid(unsafe_code)]

mod command;
mod config;
mod inbox;
mod message;
mod reply;
mod server;
mod session;
mod smtp;

pub use command::{Command, ParseError, Path, Verb};
pub use config::{AddressCheck, Config, DEFAULT_TIMEOUT};
pub use inbox::{Inbox, InboxClosed};
pub use message::Message;
pub use reply::Reply;
pub use server::{Error, Server};
pub use session::{transition, DeliveryError, Session, State, Step};
pub use smtp::{Error as SmtpError, Operation};
