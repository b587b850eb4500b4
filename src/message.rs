//! Message composition

use thiserror::Error;

use crate::sanitize::SanitizedBody;
use crate::smtp::SmtpLimits;

/// Header block plus body, ready to be streamed after DATA
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePayload {
    text: String,
}

/// Build the message. Header values are written as given; callers strip
/// line breaks from them first.
pub fn compose(from: &str, to: &str, subject: &str, body: &SanitizedBody) -> MessagePayload {
    let text = format!(
        "From: {from}\r\n\
         To: {to}\r\n\
         Subject: {subject}\r\n\
         Content-Type: text/html; charset=UTF-8\r\n\
         \r\n\
         {body}\r\n"
    );
    MessagePayload { text }
}

impl MessagePayload {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Size of the payload in bytes
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// The DATA section. Line breaks are normalized to CRLF (a bare CR or
    /// bare LF counts as a break), every line starting with `.` gets a
    /// second `.` (RFC 5321 section 4.5.2), then the `CRLF.CRLF` terminator.
    pub fn data_block(&self) -> String {
        let mut out = String::with_capacity(self.text.len() + 8);
        let mut line_start = true;
        let mut chars = self.text.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '\r' => {
                    chars.next_if_eq(&'\n');
                    out.push_str("\r\n");
                    line_start = true;
                }
                '\n' => {
                    out.push_str("\r\n");
                    line_start = true;
                }
                _ => {
                    if line_start && c == '.' {
                        out.push('.');
                    }
                    out.push(c);
                    line_start = false;
                }
            }
        }
        out.push_str("\r\n.\r\n");
        out
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AddressError {
    #[error("Email address must contain exactly one @ symbol")]
    MissingAt,

    #[error("Invalid email address format")]
    EmptyPart,

    #[error("Invalid character in email address: {0:?}")]
    InvalidCharacter(char),

    #[error("User name too long (max {max} characters)")]
    UserTooLong { max: usize },

    #[error("Domain name too long (max {max} characters)")]
    DomainTooLong { max: usize },

    #[error("Path too long (max {max} characters)")]
    PathTooLong { max: usize },
}

/// Validate an address before it goes into `RCPT TO:<...>` and the To header
pub fn validate_address(addr: &str) -> Result<(), AddressError> {
    if let Some(c) = addr
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || matches!(c, '<' | '>'))
    {
        return Err(AddressError::InvalidCharacter(c));
    }

    // `<` and `>` are added around the address on the wire
    if addr.len() + 2 > SmtpLimits::PATH_MAX_LENGTH {
        return Err(AddressError::PathTooLong {
            max: SmtpLimits::PATH_MAX_LENGTH,
        });
    }

    let (user_part, domain_part) = addr.split_once('@').ok_or(AddressError::MissingAt)?;
    if domain_part.contains('@') {
        return Err(AddressError::MissingAt);
    }

    if user_part.len() > SmtpLimits::USER_MAX_LENGTH {
        return Err(AddressError::UserTooLong {
            max: SmtpLimits::USER_MAX_LENGTH,
        });
    }

    if domain_part.len() > SmtpLimits::DOMAIN_MAX_LENGTH {
        return Err(AddressError::DomainTooLong {
            max: SmtpLimits::DOMAIN_MAX_LENGTH,
        });
    }

    if user_part.is_empty() || domain_part.is_empty() {
        return Err(AddressError::EmptyPart);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitize::sanitize;

    #[test]
    fn test_compose_layout() {
        let body = sanitize("Hello");
        let payload = compose("me@example.com", "a@b.com", "Hi", &body);
        assert_eq!(
            payload.as_str(),
            "From: me@example.com\r\n\
             To: a@b.com\r\n\
             Subject: Hi\r\n\
             Content-Type: text/html; charset=UTF-8\r\n\
             \r\n\
             Hello\r\n"
        );
    }

    #[test]
    fn test_compose_embeds_sanitized_body() {
        let body = sanitize("<script>x</script><p>Hello</p>");
        let payload = compose("me@example.com", "a@b.com", "Hi", &body);
        assert!(payload.as_str().ends_with("\r\n\r\nx&lt;p&gt;Hello&lt;/p&gt;\r\n"));
        assert!(!payload.as_str().contains("<script>"));
    }

    #[test]
    fn test_data_block_matches_plain_payload() {
        let payload = compose("me@example.com", "a@b.com", "Hi", &sanitize("Hello"));
        assert_eq!(
            payload.data_block(),
            format!("{}\r\n.\r\n", payload.as_str())
        );
        assert!(payload.data_block().ends_with("Hello\r\n\r\n.\r\n"));
    }

    #[test]
    fn test_data_block_stuffs_leading_dots() {
        let payload = compose(
            "me@example.com",
            "a@b.com",
            "Hi",
            &sanitize("first\r\n.\r\nQUIT\r\n..two"),
        );
        let block = payload.data_block();
        assert!(block.contains("first\r\n..\r\nQUIT\r\n...two"));
        // the only lone dot line is the terminator
        assert_eq!(block.matches("\r\n.\r\n").count(), 1);
        assert!(block.ends_with("\r\n.\r\n"));
    }

    #[test]
    fn test_data_block_stuffs_after_bare_lf() {
        let payload = compose("me@example.com", "a@b.com", "Hi", &sanitize("a\n.b"));
        assert!(payload.data_block().contains("a\r\n..b"));
    }

    #[test]
    fn test_data_block_normalizes_bare_line_breaks() {
        for (body, expected) in [
            ("hello\r.\r\nMAIL FROM:<x@evil>", "hello\r\n..\r\nMAIL FROM:"),
            ("hello\n.\nQUIT", "hello\r\n..\r\nQUIT"),
            ("hello\r\n.\rQUIT", "hello\r\n..\r\nQUIT"),
        ] {
            let payload = compose("me@example.com", "a@b.com", "Hi", &sanitize(body));
            let block = payload.data_block();
            assert!(block.contains(expected), "{body:?} -> {block:?}");
            assert!(!block.contains("\r.\r"), "{body:?} -> {block:?}");
            assert!(!block.contains("\n.\n"), "{body:?} -> {block:?}");
            // the only lone dot line is the terminator
            assert_eq!(block.matches("\r\n.\r\n").count(), 1, "{body:?}");
            assert!(block.ends_with("\r\n.\r\n"));
        }
    }

    #[test]
    fn test_data_block_has_no_bare_cr_or_lf() {
        let body = sanitize("a\rb\nc\r\rd\n\ne\r\n");
        let block = compose("me@example.com", "a@b.com", "Hi", &body).data_block();
        let bytes = block.as_bytes();
        for (i, b) in bytes.iter().enumerate() {
            match b {
                b'\r' => assert_eq!(bytes.get(i + 1), Some(&b'\n'), "{block:?}"),
                b'\n' => assert_eq!(bytes[i - 1], b'\r', "{block:?}"),
                _ => {}
            }
        }
        assert!(block.contains("a\r\nb\r\nc\r\n\r\nd\r\n\r\ne\r\n"));
    }

    #[test]
    fn test_len() {
        let payload = compose("f", "t", "s", &sanitize("b"));
        assert_eq!(payload.len(), payload.as_str().len());
        assert!(!payload.is_empty());
    }

    #[test]
    fn test_validate_address() {
        assert!(validate_address("user@example.com").is_ok());
        assert!(validate_address("a@b.com").is_ok());

        assert_eq!(validate_address("invalid"), Err(AddressError::MissingAt));
        assert_eq!(validate_address("a@b@c"), Err(AddressError::MissingAt));
        assert_eq!(validate_address("@example.com"), Err(AddressError::EmptyPart));
        assert_eq!(validate_address("user@"), Err(AddressError::EmptyPart));
        assert_eq!(
            validate_address("a@b.com>\r\nRCPT TO:<c@d.com"),
            Err(AddressError::InvalidCharacter('>'))
        );
        assert_eq!(
            validate_address("a@b.com\r\nDATA"),
            Err(AddressError::InvalidCharacter('\r'))
        );
        assert_eq!(
            validate_address("a b@c.com"),
            Err(AddressError::InvalidCharacter(' '))
        );
    }

    #[test]
    fn test_validate_address_limits() {
        let long_user = "a".repeat(SmtpLimits::USER_MAX_LENGTH + 1) + "@example.com";
        assert!(matches!(
            validate_address(&long_user),
            Err(AddressError::UserTooLong { .. })
        ));

        let long_path = "user@".to_string() + &"a".repeat(SmtpLimits::PATH_MAX_LENGTH);
        assert!(matches!(
            validate_address(&long_path),
            Err(AddressError::PathTooLong { .. })
        ));
    }
}
