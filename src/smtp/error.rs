//! Error types for the SMTP client

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SmtpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport is not connected")]
    NotConnected,

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    #[error("Timed out waiting for {stage}")]
    Timeout { stage: String },

    #[error("SMTP session exceeded its deadline")]
    SessionTimeout,

    #[error("Malformed reply: {0}")]
    MalformedReply(String),

    #[error("Reply line too long (max {max} characters)")]
    ReplyTooLong { max: usize },

    #[error("SMTP Error: {0}")]
    Rejected(String),
}

impl SmtpError {
    /// Socket-level failures, as opposed to the server refusing a command.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            SmtpError::Io(_)
                | SmtpError::NotConnected
                | SmtpError::ConnectionClosed
                | SmtpError::Timeout { .. }
                | SmtpError::SessionTimeout
        )
    }

    pub(crate) fn timeout(stage: impl Into<String>) -> Self {
        SmtpError::Timeout {
            stage: stage.into(),
        }
    }
}

/// SMTP size limits as defined in RFC 5321 section 4.5.3
pub struct SmtpLimits;

impl SmtpLimits {
    /// Maximum length of a local part
    pub const USER_MAX_LENGTH: usize = 64;

    /// Maximum length of a domain name
    pub const DOMAIN_MAX_LENGTH: usize = 255;

    /// Maximum length of a path (reverse-path or forward-path)
    pub const PATH_MAX_LENGTH: usize = 256;

    /// Maximum length of a reply line including CRLF
    pub const REPLY_LINE_MAX_LENGTH: usize = 512;

    /// Maximum number of lines accepted in one multi-line reply
    pub const MAX_REPLY_LINES: usize = 64;
}
