//! SMTP reply handling

use std::fmt;

use crate::smtp::error::{SmtpError, SmtpLimits};

/// Reply class, taken from the first digit of the reply code (RFC 5321 section 4.2.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyCategory {
    /// 2yz
    PositiveCompletion,
    /// 3yz
    PositiveIntermediate,
    /// 4yz
    TransientNegative,
    /// 5yz
    PermanentNegative,
}

impl ReplyCategory {
    fn from_code(code: u16) -> Option<Self> {
        match code / 100 {
            2 => Some(Self::PositiveCompletion),
            3 => Some(Self::PositiveIntermediate),
            4 => Some(Self::TransientNegative),
            5 => Some(Self::PermanentNegative),
            _ => None,
        }
    }
}

/// A reply read from an SMTP server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpReply {
    /// The three digit reply code (e.g. 250, 354, 550)
    pub code: u16,
    /// Text of each reply line, without the code and separator
    pub lines: Vec<String>,
}

impl SmtpReply {
    /// Create a single line reply
    pub fn new(code: u16, text: &str) -> Self {
        Self {
            code,
            lines: vec![text.to_owned()],
        }
    }

    /// Create a multi-line reply, as sent in answer to EHLO
    pub fn new_multiline(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// Parse one complete reply. Accepts CRLF or bare LF line endings.
    pub fn parse(raw: &str) -> Result<Self, SmtpError> {
        let mut code = None;
        let mut lines = Vec::new();
        let mut finished = false;

        for line in raw.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                continue;
            }
            if finished {
                return Err(SmtpError::MalformedReply(format!(
                    "data after final reply line: {line}"
                )));
            }
            if line.len() + 2 > SmtpLimits::REPLY_LINE_MAX_LENGTH {
                return Err(SmtpError::ReplyTooLong {
                    max: SmtpLimits::REPLY_LINE_MAX_LENGTH,
                });
            }

            let (line_code, continuation, text) = split_line(line)?;
            match code {
                None => code = Some(line_code),
                Some(c) if c != line_code => {
                    return Err(SmtpError::MalformedReply(format!(
                        "reply code changed from {c} to {line_code}"
                    )));
                }
                Some(_) => {}
            }
            lines.push(text.to_owned());
            if lines.len() > SmtpLimits::MAX_REPLY_LINES {
                return Err(SmtpError::MalformedReply("too many reply lines".to_string()));
            }
            finished = !continuation;
        }

        match code {
            Some(code) if finished => Ok(Self { code, lines }),
            Some(_) => Err(SmtpError::MalformedReply(
                "reply ended on a continuation line".to_string(),
            )),
            None => Err(SmtpError::MalformedReply("empty reply".to_string())),
        }
    }

    /// Format the reply for sending over the wire
    pub fn format(&self) -> String {
        if self.lines.is_empty() {
            return format!("{}\r\n", self.code);
        }
        let last = self.lines.len() - 1;
        let mut result = String::new();
        for (i, line) in self.lines.iter().enumerate() {
            let sep = if i == last { ' ' } else { '-' };
            result.push_str(&format!("{}{}{}\r\n", self.code, sep, line));
        }
        result
    }

    pub fn category(&self) -> ReplyCategory {
        // parse() only admits codes 200..=599
        ReplyCategory::from_code(self.code).unwrap_or(ReplyCategory::PermanentNegative)
    }

    /// Check if this is a success response (2xx)
    pub fn is_success(&self) -> bool {
        self.category() == ReplyCategory::PositiveCompletion
    }
}

/// The reply as the server sent it, one line per reply line, without CRLF
impl fmt::Display for SmtpReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.lines.is_empty() {
            return write!(f, "{}", self.code);
        }
        let last = self.lines.len() - 1;
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            let sep = if i == last { ' ' } else { '-' };
            write!(f, "{}{}{}", self.code, sep, line)?;
        }
        Ok(())
    }
}

/// Whether a raw reply line is the last one of its reply (`250 OK` vs `250-SIZE`).
pub(crate) fn is_final_line(line: &str) -> bool {
    line.as_bytes().get(3) != Some(&b'-')
}

fn split_line(line: &str) -> Result<(u16, bool, &str), SmtpError> {
    let bytes = line.as_bytes();
    if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
        return Err(SmtpError::MalformedReply(line.to_owned()));
    }
    // the first three bytes are ASCII digits, so slicing is on char boundaries
    let code: u16 = line[..3]
        .parse()
        .map_err(|_| SmtpError::MalformedReply(line.to_owned()))?;
    if ReplyCategory::from_code(code).is_none() {
        return Err(SmtpError::MalformedReply(line.to_owned()));
    }

    match bytes.get(3) {
        None => Ok((code, false, "")),
        Some(b' ') => Ok((code, false, &line[4..])),
        Some(b'-') => Ok((code, true, &line[4..])),
        Some(_) => Err(SmtpError::MalformedReply(line.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_line() {
        let reply = SmtpReply::parse("250 OK\r\n").unwrap();
        assert_eq!(reply.code, 250);
        assert_eq!(reply.lines, vec!["OK".to_string()]);
        assert!(reply.is_success());
    }

    #[test]
    fn test_parse_multiline() {
        let raw = "250-mail.example.com Hello\r\n250-PIPELINING\r\n250 AUTH LOGIN PLAIN\r\n";
        let reply = SmtpReply::parse(raw).unwrap();
        assert_eq!(reply.code, 250);
        assert_eq!(reply.lines.len(), 3);
        assert_eq!(reply.lines.last().map(String::as_str), Some("AUTH LOGIN PLAIN"));
    }

    #[test]
    fn test_parse_bare_code() {
        let reply = SmtpReply::parse("354\r\n").unwrap();
        assert_eq!(reply.code, 354);
        assert_eq!(reply.lines, vec![String::new()]);
        assert_eq!(reply.category(), ReplyCategory::PositiveIntermediate);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            SmtpReply::parse("hello\r\n"),
            Err(SmtpError::MalformedReply(_))
        ));
        assert!(matches!(
            SmtpReply::parse("\r\n"),
            Err(SmtpError::MalformedReply(_))
        ));
        assert!(matches!(
            SmtpReply::parse("999 what\r\n"),
            Err(SmtpError::MalformedReply(_))
        ));
        assert!(matches!(
            SmtpReply::parse("250xOK\r\n"),
            Err(SmtpError::MalformedReply(_))
        ));
    }

    #[test]
    fn test_parse_rejects_unfinished_multiline() {
        assert!(matches!(
            SmtpReply::parse("250-first\r\n250-second\r\n"),
            Err(SmtpError::MalformedReply(_))
        ));
    }

    #[test]
    fn test_parse_rejects_mixed_codes() {
        assert!(matches!(
            SmtpReply::parse("250-first\r\n550 second\r\n"),
            Err(SmtpError::MalformedReply(_))
        ));
    }

    #[test]
    fn test_parse_rejects_long_line() {
        let raw = format!("250 {}\r\n", "a".repeat(SmtpLimits::REPLY_LINE_MAX_LENGTH));
        assert!(matches!(
            SmtpReply::parse(&raw),
            Err(SmtpError::ReplyTooLong { .. })
        ));
    }

    #[test]
    fn test_format() {
        let reply = SmtpReply::new(250, "OK");
        assert_eq!(reply.format(), "250 OK\r\n");
    }

    #[test]
    fn test_multiline_format() {
        let reply = SmtpReply::new_multiline(
            250,
            vec!["Hello".to_owned(), "PIPELINING".to_owned(), "SIZE 1000".to_owned()],
        );
        assert_eq!(
            reply.format(),
            "250-Hello\r\n250-PIPELINING\r\n250 SIZE 1000\r\n"
        );
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            SmtpReply::new(235, "ok").category(),
            ReplyCategory::PositiveCompletion
        );
        assert_eq!(
            SmtpReply::new(334, "VXNlcm5hbWU6").category(),
            ReplyCategory::PositiveIntermediate
        );
        assert_eq!(
            SmtpReply::new(421, "busy").category(),
            ReplyCategory::TransientNegative
        );
        assert_eq!(
            SmtpReply::new(550, "no").category(),
            ReplyCategory::PermanentNegative
        );
    }

    #[test]
    fn test_display_is_verbatim_for_single_line() {
        let reply = SmtpReply::parse("550 5.1.1 user unknown\r\n").unwrap();
        assert_eq!(reply.to_string(), "550 5.1.1 user unknown");
    }

    #[test]
    fn test_display_keeps_every_line() {
        let raw = "550-5.7.1 relay denied\r\n550 5.7.1 see https://mail.test/policy\r\n";
        let reply = SmtpReply::parse(raw).unwrap();
        assert_eq!(
            reply.to_string(),
            "550-5.7.1 relay denied\n550 5.7.1 see https://mail.test/policy"
        );
        assert_eq!(reply.to_string().replace('\n', "\r\n") + "\r\n", raw);
    }

    #[test]
    fn test_is_final_line() {
        assert!(is_final_line("250 OK"));
        assert!(is_final_line("250"));
        assert!(!is_final_line("250-PIPELINING"));
    }
}
