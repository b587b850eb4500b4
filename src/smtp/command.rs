//! SMTP commands issued by the client

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::message::MessagePayload;
use crate::smtp::reply::{ReplyCategory, SmtpReply};

const COMPLETION: &[ReplyCategory] = &[ReplyCategory::PositiveCompletion];
const INTERMEDIATE: &[ReplyCategory] = &[ReplyCategory::PositiveIntermediate];
const COMPLETION_OR_INTERMEDIATE: &[ReplyCategory] = &[
    ReplyCategory::PositiveCompletion,
    ReplyCategory::PositiveIntermediate,
];

/// One command written to the server, followed by exactly one reply
#[derive(Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    /// `EHLO <domain>`
    Ehlo(String),
    /// `AUTH LOGIN`
    AuthLogin,
    /// Base64 user name, answering the first AUTH LOGIN challenge
    AuthUsername(String),
    /// Base64 password, answering the second AUTH LOGIN challenge
    AuthPassword(String),
    /// `MAIL FROM:<address>`
    MailFrom(String),
    /// `RCPT TO:<address>`
    RcptTo(String),
    /// `DATA`
    Data,
    /// Message content, dot-stuffed and terminated with `CRLF.CRLF`
    Content(String),
    /// `QUIT`
    Quit,
}

impl SmtpCommand {
    pub fn content(payload: &MessagePayload) -> Self {
        SmtpCommand::Content(payload.data_block())
    }

    /// Bytes written to the transport
    pub fn to_wire(&self) -> String {
        match self {
            SmtpCommand::Ehlo(domain) => format!("EHLO {domain}\r\n"),
            SmtpCommand::AuthLogin => "AUTH LOGIN\r\n".to_string(),
            SmtpCommand::AuthUsername(user) => format!("{}\r\n", STANDARD.encode(user)),
            SmtpCommand::AuthPassword(password) => format!("{}\r\n", STANDARD.encode(password)),
            SmtpCommand::MailFrom(addr) => format!("MAIL FROM:<{addr}>\r\n"),
            SmtpCommand::RcptTo(addr) => format!("RCPT TO:<{addr}>\r\n"),
            SmtpCommand::Data => "DATA\r\n".to_string(),
            SmtpCommand::Content(block) => block.clone(),
            SmtpCommand::Quit => "QUIT\r\n".to_string(),
        }
    }

    /// Reply classes that let the session move on after this command.
    ///
    /// The AUTH LOGIN exchange and DATA are answered with 3yz replies.
    pub fn accepted(&self) -> &'static [ReplyCategory] {
        match self {
            SmtpCommand::AuthLogin | SmtpCommand::AuthUsername(_) => COMPLETION_OR_INTERMEDIATE,
            SmtpCommand::Data => INTERMEDIATE,
            _ => COMPLETION,
        }
    }

    pub fn accepts(&self, reply: &SmtpReply) -> bool {
        self.accepted().contains(&reply.category())
    }

    /// QUIT's reply is read but never fails the session
    pub fn checks_reply(&self) -> bool {
        !matches!(self, SmtpCommand::Quit)
    }

    /// Short name used in logs and timeout errors
    pub fn stage(&self) -> &'static str {
        match self {
            SmtpCommand::Ehlo(_) => "EHLO",
            SmtpCommand::AuthLogin => "AUTH LOGIN",
            SmtpCommand::AuthUsername(_) => "AUTH username",
            SmtpCommand::AuthPassword(_) => "AUTH password",
            SmtpCommand::MailFrom(_) => "MAIL FROM",
            SmtpCommand::RcptTo(_) => "RCPT TO",
            SmtpCommand::Data => "DATA",
            SmtpCommand::Content(_) => "end of data",
            SmtpCommand::Quit => "QUIT",
        }
    }
}

// Credentials never reach the logs.
impl fmt::Display for SmtpCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SmtpCommand::AuthUsername(_) | SmtpCommand::AuthPassword(_) => f.write_str("<redacted>"),
            SmtpCommand::Content(block) => write!(f, "<message content, {} bytes>", block.len()),
            other => f.write_str(other.to_wire().trim_end()),
        }
    }
}

impl fmt::Debug for SmtpCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SmtpCommand({self})")
    }
}
