//! Per-request pipeline: harden headers, sanitize, compose, drive one session

use std::sync::Arc;

use tracing::debug;

use crate::config::SmtpSettings;
use crate::message::compose;
use crate::sanitize::{sanitize, strip_line_breaks};
use crate::smtp::{SessionDriver, SessionOutcome, TcpTransport, Transport};

/// Builds a fresh, unconnected transport for each session
pub type TransportFactory = Arc<dyn Fn() -> Box<dyn Transport> + Send + Sync>;

/// A validated send request. All three fields are required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailRequest {
    pub recipient_address: String,
    pub subject: String,
    pub raw_body: String,
}

impl EmailRequest {
    pub fn new(
        recipient_address: impl Into<String>,
        subject: impl Into<String>,
        raw_body: impl Into<String>,
    ) -> Self {
        Self {
            recipient_address: recipient_address.into(),
            subject: subject.into(),
            raw_body: raw_body.into(),
        }
    }
}

#[derive(Clone)]
pub struct Mailer {
    driver: Arc<SessionDriver>,
    transports: TransportFactory,
}

impl Mailer {
    /// Mailer relaying over plain TCP
    pub fn new(settings: SmtpSettings) -> Self {
        Self::with_transport(settings, || Box::new(TcpTransport::new()))
    }

    /// Mailer using `factory` for the transport of every session
    pub fn with_transport<F>(settings: SmtpSettings, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Transport> + Send + Sync + 'static,
    {
        Self {
            driver: Arc::new(SessionDriver::new(settings)),
            transports: Arc::new(factory),
        }
    }

    pub fn settings(&self) -> &SmtpSettings {
        self.driver.settings()
    }

    /// Run one complete session for `request`
    pub async fn send(&self, request: &EmailRequest) -> SessionOutcome {
        let to = strip_line_breaks(&request.recipient_address);
        let subject = strip_line_breaks(&request.subject);
        let body = sanitize(&request.raw_body);
        let payload = compose(&self.settings().from, &to, &subject, &body);
        debug!(bytes = payload.len(), "composed message");

        let transport = (self.transports)();
        self.driver.run(transport, &to, &payload).await
    }
}

impl std::fmt::Debug for Mailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailer")
            .field("driver", &self.driver)
            .finish_non_exhaustive()
    }
}
