//! Relay configuration
//!
//! Values come from command-line flags or, more commonly, the environment
//! (`SMTP_HOST`, `SMTP_PASSWORD`, ...). They are parsed once in `main` and
//! handed to the mailer; nothing reads the environment afterwards.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use crate::message::{AddressError, validate_address};
use crate::smtp::SmtpLimits;

/// Everything the session driver needs to reach and use the mail server
#[derive(Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Envelope sender and From header
    pub from: String,
    /// Domain announced with EHLO
    pub ehlo_domain: String,
    /// Bound on connect and on each command/reply round-trip
    pub round_trip_timeout: Duration,
    /// Bound on the whole session up to the end of DATA
    pub session_timeout: Duration,
}

impl SmtpSettings {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
        from: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            from: from.into(),
            ehlo_domain: "localhost".to_string(),
            round_trip_timeout: Duration::from_secs(30),
            session_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_ehlo_domain(mut self, domain: impl Into<String>) -> Self {
        self.ehlo_domain = domain.into();
        self
    }

    pub fn with_timeouts(mut self, round_trip: Duration, session: Duration) -> Self {
        self.round_trip_timeout = round_trip;
        self.session_timeout = session;
        self
    }
}

impl fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("from", &self.from)
            .field("ehlo_domain", &self.ehlo_domain)
            .field("round_trip_timeout", &self.round_trip_timeout)
            .field("session_timeout", &self.session_timeout)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address the HTTP endpoint listens on
    pub listen: SocketAddr,
    pub smtp: SmtpSettings,
}

/// Command-line interface; every flag may also be set through its
/// environment variable
#[derive(Parser, Debug)]
#[command(name = "mailrelay", version, about = "Relay sanitized HTML mail over SMTP")]
pub struct Cli {
    /// Address to serve HTTP on
    #[arg(long, env = "LISTEN_ADDR", default_value = "127.0.0.1:8787")]
    pub listen: SocketAddr,

    /// SMTP server host name
    #[arg(long, env = "SMTP_HOST")]
    pub smtp_host: String,

    /// SMTP server port
    #[arg(long, env = "SMTP_PORT", default_value_t = 587)]
    pub smtp_port: u16,

    /// AUTH LOGIN user name
    #[arg(long, env = "SMTP_USER")]
    pub smtp_user: String,

    /// AUTH LOGIN password
    #[arg(long, env = "SMTP_PASSWORD", hide_env_values = true)]
    pub smtp_password: String,

    /// Sender address used for MAIL FROM and the From header
    #[arg(long, env = "MAIL_FROM")]
    pub from: String,

    /// Domain announced in EHLO
    #[arg(long, env = "EHLO_DOMAIN", default_value = "localhost")]
    pub ehlo_domain: String,

    /// Seconds allowed for connect and for each command round-trip
    #[arg(long, env = "SMTP_ROUND_TRIP_TIMEOUT_SECS", default_value_t = 30)]
    pub round_trip_timeout_secs: u64,

    /// Seconds allowed for a whole SMTP session
    #[arg(long, env = "SMTP_SESSION_TIMEOUT_SECS", default_value_t = 120)]
    pub session_timeout_secs: u64,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid sender address {from:?}: {source}")]
    InvalidSender {
        from: String,
        #[source]
        source: AddressError,
    },

    #[error("Invalid EHLO domain {0:?}")]
    InvalidEhloDomain(String),
}

impl Cli {
    /// Build the configuration, rejecting a sender or EHLO domain that
    /// could not be written into a command line as is
    pub fn into_config(self) -> Result<RelayConfig, ConfigError> {
        if let Err(source) = validate_address(&self.from) {
            return Err(ConfigError::InvalidSender {
                from: self.from,
                source,
            });
        }
        if !is_valid_domain(&self.ehlo_domain) {
            return Err(ConfigError::InvalidEhloDomain(self.ehlo_domain));
        }

        let smtp = SmtpSettings::new(
            self.smtp_host,
            self.smtp_port,
            self.smtp_user,
            self.smtp_password,
            self.from,
        )
        .with_ehlo_domain(self.ehlo_domain)
        .with_timeouts(
            Duration::from_secs(self.round_trip_timeout_secs),
            Duration::from_secs(self.session_timeout_secs),
        );

        Ok(RelayConfig {
            listen: self.listen,
            smtp,
        })
    }
}

fn is_valid_domain(domain: &str) -> bool {
    !domain.is_empty()
        && domain.len() <= SmtpLimits::DOMAIN_MAX_LENGTH
        && !domain
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '<' | '>'))
}
