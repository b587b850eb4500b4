//! # Mailrelay
//!
//! Mailrelay turns an HTTP request into one outgoing email.
//!
//! It sanitizes an HTML body, composes the message and submits it by
//! driving an SMTP session directly over a byte-stream transport.
//!
//! ## Quick Start
//!
//! ```no_run
//! use mailrelay::{EmailRequest, Mailer, SmtpSettings};
//!
//! # async fn run() {
//! let settings = SmtpSettings::new("mail.example.com", 587, "user", "secret", "me@example.com");
//! let mailer = Mailer::new(settings);
//!
//! let request = EmailRequest::new("you@example.com", "Hello", "<p>Hi there</p>");
//! let outcome = mailer.send(&request).await;
//! println!("delivered: {}", outcome.is_sent());
//! # }
//! ```
//!
//! To serve the HTTP endpoint, hand a [`RelayConfig`] to [`http::serve`] or
//! mount [`http::router`] yourself.
//!
//! ## SMTP commands sent
//!
//! - `EHLO` - Identify the client
//! - `AUTH LOGIN` - Authenticate with base64 user name and password
//! - `MAIL FROM` - Declare the configured sender
//! - `RCPT TO` - Declare the single recipient
//! - `DATA` - Stream the message, ended by `<CRLF>.<CRLF>`
//! - `QUIT` - Close the session
//!
//! The server's greeting is read before `EHLO`. Each reply must be in the
//! class the command expects, otherwise the session stops with a failure
//! that names the server's reply.
//!
//! ## Sanitizing
//!
//! Tags outside a small whitelist are removed (their text stays), then the
//! remaining text is HTML-escaped. The result is always inert text; see
//! [`sanitize`](sanitize::sanitize).
//!
//! ## Notes
//!
//! - One connection per message. No pooling, no retries.
//! - TLS and STARTTLS are not supported.
//! - One recipient per message.
//! - A failed delivery is still answered with HTTP 200; check `delivered`.
//!
//! ## Testing
//!
//! [`ScriptedTransport`] replays canned replies and records every write, so
//! the whole pipeline runs without a network.

pub mod config;
pub mod http;
pub mod mailer;
pub mod message;
pub mod sanitize;
pub mod smtp;

pub use config::{Cli, ConfigError, RelayConfig, SmtpSettings};
pub use mailer::{EmailRequest, Mailer, TransportFactory};
pub use message::{AddressError, MessagePayload, compose, validate_address};
pub use sanitize::{SanitizedBody, sanitize};
pub use smtp::{
    ScriptedTransport, SessionDriver, SessionOutcome, SessionState, SmtpError, SmtpLimits,
    SmtpReply, TcpTransport, Transport,
};
