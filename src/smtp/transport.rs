//! Byte-stream transports the session driver talks through

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use crate::smtp::error::{SmtpError, SmtpLimits};
use crate::smtp::reply::is_final_line;

/// Connection capability used by [`SessionDriver`](crate::smtp::SessionDriver).
///
/// A transport carries one session; the driver consumes it and calls
/// [`close`](Transport::close) exactly once, whatever happened before.
#[async_trait]
pub trait Transport: Send {
    async fn connect(&mut self, host: &str, port: u16) -> Result<(), SmtpError>;

    async fn write(&mut self, data: &[u8]) -> Result<(), SmtpError>;

    /// Read one complete reply, including every line of a multi-line reply
    async fn read_response(&mut self) -> Result<String, SmtpError>;

    async fn close(&mut self);
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn connect(&mut self, host: &str, port: u16) -> Result<(), SmtpError> {
        (**self).connect(host, port).await
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), SmtpError> {
        (**self).write(data).await
    }

    async fn read_response(&mut self) -> Result<String, SmtpError> {
        (**self).read_response().await
    }

    async fn close(&mut self) {
        (**self).close().await
    }
}

/// Plain TCP transport
#[derive(Debug, Default)]
pub struct TcpTransport {
    stream: Option<BufReader<TcpStream>>,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    async fn read_line(reader: &mut BufReader<TcpStream>) -> Result<String, SmtpError> {
        let mut line = String::new();
        let mut limited = (&mut *reader).take(SmtpLimits::REPLY_LINE_MAX_LENGTH as u64);
        let n = limited.read_line(&mut line).await?;
        if n == 0 {
            return Err(SmtpError::ConnectionClosed);
        }
        if !line.ends_with('\n') {
            if n >= SmtpLimits::REPLY_LINE_MAX_LENGTH {
                return Err(SmtpError::ReplyTooLong {
                    max: SmtpLimits::REPLY_LINE_MAX_LENGTH,
                });
            }
            return Err(SmtpError::ConnectionClosed);
        }
        Ok(line)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&mut self, host: &str, port: u16) -> Result<(), SmtpError> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        debug!("connected to {host}:{port}");
        self.stream = Some(BufReader::new(stream));
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), SmtpError> {
        let stream = self.stream.as_mut().ok_or(SmtpError::NotConnected)?;
        stream.get_mut().write_all(data).await?;
        stream.get_mut().flush().await?;
        Ok(())
    }

    async fn read_response(&mut self) -> Result<String, SmtpError> {
        let reader = self.stream.as_mut().ok_or(SmtpError::NotConnected)?;
        let mut reply = String::new();
        for _ in 0..SmtpLimits::MAX_REPLY_LINES {
            let line = Self::read_line(reader).await?;
            let last = is_final_line(line.trim_end());
            reply.push_str(&line);
            if last {
                return Ok(reply);
            }
        }
        Err(SmtpError::MalformedReply("too many reply lines".to_string()))
    }

    async fn close(&mut self) {
        if let Some(mut reader) = self.stream.take() {
            if let Err(e) = reader.get_mut().shutdown().await {
                debug!("error shutting down connection: {e}");
            }
        }
    }
}
