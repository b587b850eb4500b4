//! SMTP client session: the submission handshake as a linear state machine

use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::config::SmtpSettings;
use crate::message::MessagePayload;
use crate::smtp::command::SmtpCommand;
use crate::smtp::error::SmtpError;
use crate::smtp::reply::SmtpReply;
use crate::smtp::transport::Transport;

/// Where a session stands. States only move forward; any of them may end
/// in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing opened yet
    Init,
    /// Transport open, banner accepted
    Connected,
    /// EHLO accepted
    Greeted,
    /// AUTH LOGIN, user name and password accepted
    Authenticating,
    /// MAIL FROM accepted
    SenderDeclared,
    /// RCPT TO accepted
    RecipientDeclared,
    /// DATA answered with 354
    DataStreaming,
    /// Content accepted after the end-of-data marker
    MessageSent,
    /// QUIT sent and transport closed
    Closed,
    /// A step failed; the reason names the transport error or server reply
    Failed(String),
}

/// Final result of one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Sent,
    Failed { reason: String },
}

impl SessionOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, SessionOutcome::Sent)
    }
}

/// Drives one SMTP submission per [`run`](SessionDriver::run) call
#[derive(Debug, Clone)]
pub struct SessionDriver {
    settings: SmtpSettings,
}

impl SessionDriver {
    pub fn new(settings: SmtpSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SmtpSettings {
        &self.settings
    }

    /// Relay `payload` to `recipient` over a fresh transport.
    ///
    /// Never retries and never returns an error: transport and protocol
    /// failures end up in [`SessionOutcome::Failed`]. The transport is
    /// closed exactly once on every path.
    #[instrument(skip_all, fields(host = %self.settings.host, port = self.settings.port))]
    pub async fn run<T: Transport>(
        &self,
        mut transport: T,
        recipient: &str,
        payload: &MessagePayload,
    ) -> SessionOutcome {
        let mut session = Session::new(&mut transport, self.settings.round_trip_timeout);
        session.run(&self.settings, recipient, payload).await
    }
}

struct Session<'a, T: ?Sized> {
    transport: &'a mut T,
    state: SessionState,
    round_trip_timeout: Duration,
}

impl<'a, T: Transport + ?Sized> Session<'a, T> {
    fn new(transport: &'a mut T, round_trip_timeout: Duration) -> Self {
        Self {
            transport,
            state: SessionState::Init,
            round_trip_timeout,
        }
    }

    async fn run(
        &mut self,
        settings: &SmtpSettings,
        recipient: &str,
        payload: &MessagePayload,
    ) -> SessionOutcome {
        let result = match timeout(
            settings.session_timeout,
            self.deliver(settings, recipient, payload),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(SmtpError::SessionTimeout),
        };

        let outcome = match result {
            Ok(()) => {
                self.quit().await;
                SessionOutcome::Sent
            }
            Err(e) => {
                let reason = e.to_string();
                if e.is_transport() {
                    warn!(state = ?self.state, %reason, "SMTP connection failed");
                } else {
                    warn!(state = ?self.state, %reason, "SMTP protocol failure");
                }
                self.state = SessionState::Failed(reason.clone());
                SessionOutcome::Failed { reason }
            }
        };

        self.transport.close().await;
        if outcome.is_sent() {
            self.advance(SessionState::Closed);
            info!(%recipient, "message relayed");
        }
        outcome
    }

    async fn deliver(
        &mut self,
        settings: &SmtpSettings,
        recipient: &str,
        payload: &MessagePayload,
    ) -> Result<(), SmtpError> {
        self.connect(&settings.host, settings.port).await?;
        self.advance(SessionState::Connected);

        self.exchange(SmtpCommand::Ehlo(settings.ehlo_domain.clone()))
            .await?;
        self.advance(SessionState::Greeted);

        self.exchange(SmtpCommand::AuthLogin).await?;
        self.exchange(SmtpCommand::AuthUsername(settings.username.clone()))
            .await?;
        self.exchange(SmtpCommand::AuthPassword(settings.password.clone()))
            .await?;
        self.advance(SessionState::Authenticating);

        self.exchange(SmtpCommand::MailFrom(settings.from.clone()))
            .await?;
        self.advance(SessionState::SenderDeclared);

        self.exchange(SmtpCommand::RcptTo(recipient.to_string()))
            .await?;
        self.advance(SessionState::RecipientDeclared);

        self.exchange(SmtpCommand::Data).await?;
        self.advance(SessionState::DataStreaming);

        self.exchange(SmtpCommand::content(payload)).await?;
        self.advance(SessionState::MessageSent);

        Ok(())
    }

    /// Open the transport and accept the server banner
    async fn connect(&mut self, host: &str, port: u16) -> Result<(), SmtpError> {
        timeout(self.round_trip_timeout, self.transport.connect(host, port))
            .await
            .map_err(|_| SmtpError::timeout("connect"))??;

        let banner = self.read_reply("banner").await?;
        if !banner.is_success() {
            return Err(SmtpError::Rejected(banner.to_string()));
        }
        Ok(())
    }

    /// Write one command and judge its one reply
    async fn exchange(&mut self, command: SmtpCommand) -> Result<SmtpReply, SmtpError> {
        debug!("C: {command}");
        let wire = command.to_wire();
        timeout(self.round_trip_timeout, self.transport.write(wire.as_bytes()))
            .await
            .map_err(|_| SmtpError::timeout(command.stage()))??;

        let reply = self.read_reply(command.stage()).await?;
        if command.checks_reply() && !command.accepts(&reply) {
            return Err(SmtpError::Rejected(reply.to_string()));
        }
        Ok(reply)
    }

    async fn read_reply(&mut self, stage: &str) -> Result<SmtpReply, SmtpError> {
        let raw = timeout(self.round_trip_timeout, self.transport.read_response())
            .await
            .map_err(|_| SmtpError::timeout(stage))??;
        let reply = SmtpReply::parse(&raw)?;
        debug!("S: {reply}");
        Ok(reply)
    }

    /// The message is already accepted; QUIT's fate does not change that
    async fn quit(&mut self) {
        if let Err(e) = self.exchange(SmtpCommand::Quit).await {
            debug!("QUIT failed after delivery: {e}");
        }
    }

    fn advance(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "session state");
        self.state = next;
    }
}
