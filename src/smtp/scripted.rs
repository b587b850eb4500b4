//! In-memory transport with scripted replies
//!
//! Every call is recorded in a shared [`Transcript`] so tests can check what
//! the driver wrote and how often it closed the connection after the
//! transport itself has been consumed.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::smtp::error::SmtpError;
use crate::smtp::reply::SmtpReply;
use crate::smtp::transport::Transport;

/// Everything a [`ScriptedTransport`] observed
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    /// `(host, port)` of each connect attempt
    pub connects: Vec<(String, u16)>,
    /// Data written, one entry per write call
    pub writes: Vec<String>,
    /// Number of read attempts
    pub reads: usize,
    /// Number of close calls
    pub closes: usize,
}

impl Transcript {
    /// First line of each write: `EHLO x`, `MAIL FROM:<..>`, ...
    pub fn commands(&self) -> Vec<String> {
        self.writes
            .iter()
            .map(|w| w.split("\r\n").next().unwrap_or("").to_string())
            .collect()
    }

    /// Whether any write starts with `prefix`
    pub fn sent(&self, prefix: &str) -> bool {
        self.writes.iter().any(|w| w.starts_with(prefix))
    }
}

/// Shared view on a transcript that outlives the transport
#[derive(Debug, Clone, Default)]
pub struct TranscriptHandle(Arc<Mutex<Transcript>>);

impl TranscriptHandle {
    pub fn snapshot(&self) -> Transcript {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Transcript> {
        // a panic while holding the lock leaves the data usable
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Transport that replays a fixed list of replies
#[derive(Debug)]
pub struct ScriptedTransport {
    replies: VecDeque<SmtpReply>,
    connected: bool,
    fail_connect: bool,
    fail_write_at: Option<usize>,
    fail_read_at: Option<usize>,
    stall_read_at: Option<usize>,
    writes: usize,
    reads: usize,
    transcript: TranscriptHandle,
}

impl ScriptedTransport {
    pub fn new(replies: impl IntoIterator<Item = SmtpReply>) -> Self {
        Self {
            replies: replies.into_iter().collect(),
            connected: false,
            fail_connect: false,
            fail_write_at: None,
            fail_read_at: None,
            stall_read_at: None,
            writes: 0,
            reads: 0,
            transcript: TranscriptHandle::default(),
        }
    }

    /// A server that accepts every step of an authenticated submission
    pub fn accepting() -> Self {
        Self::new(accepting_replies())
    }

    /// Accept everything up to reply `index` (0 is the banner), answer it
    /// with `reply` instead
    pub fn rejecting_at(index: usize, reply: SmtpReply) -> Self {
        let mut replies = accepting_replies();
        replies.truncate(index);
        replies.push(reply);
        Self::new(replies)
    }

    /// Make `connect` fail
    pub fn fail_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    /// Make the write with this index fail (0 is EHLO)
    pub fn fail_write_at(mut self, index: usize) -> Self {
        self.fail_write_at = Some(index);
        self
    }

    /// Make the read with this index fail (0 is the banner)
    pub fn fail_read_at(mut self, index: usize) -> Self {
        self.fail_read_at = Some(index);
        self
    }

    /// Make the read with this index never complete
    pub fn stall_read_at(mut self, index: usize) -> Self {
        self.stall_read_at = Some(index);
        self
    }

    pub fn transcript(&self) -> TranscriptHandle {
        self.transcript.clone()
    }
}

/// Replies of a server accepting banner, EHLO, AUTH LOGIN (3 round-trips),
/// MAIL, RCPT, DATA, end of data and QUIT
pub fn accepting_replies() -> Vec<SmtpReply> {
    vec![
        SmtpReply::new(220, "mail.test ESMTP ready"),
        SmtpReply::new_multiline(
            250,
            vec!["mail.test".to_string(), "AUTH LOGIN PLAIN".to_string()],
        ),
        SmtpReply::new(334, "VXNlcm5hbWU6"),
        SmtpReply::new(334, "UGFzc3dvcmQ6"),
        SmtpReply::new(235, "2.7.0 Authentication successful"),
        SmtpReply::new(250, "2.1.0 Ok"),
        SmtpReply::new(250, "2.1.5 Ok"),
        SmtpReply::new(354, "End data with <CR><LF>.<CR><LF>"),
        SmtpReply::new(250, "2.0.0 Ok: queued"),
        SmtpReply::new(221, "2.0.0 Bye"),
    ]
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&mut self, host: &str, port: u16) -> Result<(), SmtpError> {
        self.transcript
            .lock()
            .connects
            .push((host.to_string(), port));
        if self.fail_connect {
            return Err(SmtpError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "scripted connect failure",
            )));
        }
        self.connected = true;
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), SmtpError> {
        if !self.connected {
            return Err(SmtpError::NotConnected);
        }
        let index = self.writes;
        self.writes += 1;
        if self.fail_write_at == Some(index) {
            return Err(SmtpError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "scripted write failure",
            )));
        }
        self.transcript
            .lock()
            .writes
            .push(String::from_utf8_lossy(data).into_owned());
        Ok(())
    }

    async fn read_response(&mut self) -> Result<String, SmtpError> {
        if !self.connected {
            return Err(SmtpError::NotConnected);
        }
        let index = self.reads;
        self.reads += 1;
        self.transcript.lock().reads += 1;
        if self.stall_read_at == Some(index) {
            std::future::pending::<()>().await;
        }
        if self.fail_read_at == Some(index) {
            return Err(SmtpError::ConnectionClosed);
        }
        self.replies
            .pop_front()
            .map(|reply| reply.format())
            .ok_or(SmtpError::ConnectionClosed)
    }

    async fn close(&mut self) {
        self.connected = false;
        self.transcript.lock().closes += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_in_order() {
        let mut transport = ScriptedTransport::new([
            SmtpReply::new(220, "hi"),
            SmtpReply::new(250, "ok"),
        ]);
        let transcript = transport.transcript();

        transport.connect("mail.test", 25).await.unwrap();
        assert_eq!(transport.read_response().await.unwrap(), "220 hi\r\n");
        transport.write(b"EHLO x\r\n").await.unwrap();
        assert_eq!(transport.read_response().await.unwrap(), "250 ok\r\n");
        assert!(matches!(
            transport.read_response().await,
            Err(SmtpError::ConnectionClosed)
        ));
        transport.close().await;

        let seen = transcript.snapshot();
        assert_eq!(seen.connects, vec![("mail.test".to_string(), 25)]);
        assert_eq!(seen.commands(), vec!["EHLO x".to_string()]);
        assert!(seen.sent("EHLO"));
        assert_eq!(seen.reads, 3);
        assert_eq!(seen.closes, 1);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let mut transport = ScriptedTransport::accepting()
            .fail_write_at(1)
            .fail_read_at(2);
        transport.connect("mail.test", 25).await.unwrap();
        transport.read_response().await.unwrap();
        transport.write(b"EHLO x\r\n").await.unwrap();
        assert!(transport.read_response().await.is_ok());
        assert!(matches!(
            transport.write(b"AUTH LOGIN\r\n").await,
            Err(SmtpError::Io(_))
        ));
        assert!(matches!(
            transport.read_response().await,
            Err(SmtpError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_fail_connect() {
        let mut transport = ScriptedTransport::accepting().fail_connect();
        assert!(transport.connect("mail.test", 25).await.is_err());
        assert!(matches!(
            transport.write(b"EHLO x\r\n").await,
            Err(SmtpError::NotConnected)
        ));
    }

    #[test]
    fn test_rejecting_at() {
        let transport = ScriptedTransport::rejecting_at(6, SmtpReply::new(550, "no such user"));
        assert_eq!(transport.replies.len(), 7);
        assert_eq!(transport.replies[6].code, 550);
    }
}
