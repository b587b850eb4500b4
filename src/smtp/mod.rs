//! SMTP client implementation

pub mod command;
pub mod error;
pub mod reply;
pub mod scripted;
pub mod session;
pub mod transport;

pub use command::SmtpCommand;
pub use error::{SmtpError, SmtpLimits};
pub use reply::{ReplyCategory, SmtpReply};
pub use scripted::{ScriptedTransport, Transcript, TranscriptHandle, accepting_replies};
pub use session::{SessionDriver, SessionOutcome, SessionState};
pub use transport::{TcpTransport, Transport};
