//! Command reply validation
//!
//! Successful replies start with `+OK`; failures start with `-ERR` (or are
//! empty). Originate replies carry the new channel's UUID after the marker.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ProtocolError;

/// Prefix of every successful reply
pub const OK_PREFIX: &str = "+OK";

static CALL_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9A-Fa-f]{8}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{12}")
        .expect("call id pattern is valid")
});

/// Whether a reply body reports success
pub fn is_ok(reply: &str) -> bool {
    reply.starts_with(OK_PREFIX)
}

/// Require a `+OK` reply, returning it unchanged
pub fn expect_ok(reply: &str) -> Result<&str, ProtocolError> {
    if is_ok(reply) {
        Ok(reply)
    } else {
        Err(ProtocolError::NotOk(reply.trim_end().to_string()))
    }
}

/// Find the first UUID-shaped token anywhere in a reply
pub fn find_call_id(reply: &str) -> Option<&str> {
    CALL_ID_RE.find(reply).map(|m| m.as_str())
}

/// Validate an originate reply and extract the new call's identifier
pub fn parse_originate_reply(reply: &str) -> Result<&str, ProtocolError> {
    let reply = expect_ok(reply)?;
    find_call_id(reply).ok_or_else(|| ProtocolError::MissingCallId(reply.trim_end().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "1234abcd-12ab-34cd-56ef-1234567890ab";

    #[test]
    fn test_originate_reply_yields_call_id() {
        let reply = format!("+OK {}", ID);
        assert_eq!(parse_originate_reply(&reply), Ok(ID));
    }

    #[test]
    fn test_originate_reply_with_trailing_newline() {
        let reply = format!("+OK {}\n", ID);
        assert_eq!(parse_originate_reply(&reply), Ok(ID));
    }

    #[test]
    fn test_not_ok_reply_is_rejected() {
        let reply = "-ERR NORMAL_TEMPORARY_FAILURE\n";
        assert_eq!(
            parse_originate_reply(reply),
            Err(ProtocolError::NotOk("-ERR NORMAL_TEMPORARY_FAILURE".to_string()))
        );
    }

    #[test]
    fn test_ok_marker_must_be_a_prefix() {
        let reply = format!("Job failed +OK {}", ID);
        assert!(matches!(parse_originate_reply(&reply), Err(ProtocolError::NotOk(_))));
    }

    #[test]
    fn test_ok_reply_without_id() {
        assert_eq!(
            parse_originate_reply("+OK\n"),
            Err(ProtocolError::MissingCallId("+OK".to_string()))
        );
    }

    #[test]
    fn test_id_found_anywhere_in_body() {
        let upper = ID.to_uppercase();
        let reply = format!("+OK Job-UUID: {} queued", upper);
        assert_eq!(find_call_id(&reply), Some(upper.as_str()));
    }

    #[test]
    fn test_non_hex_token_is_not_an_id() {
        assert_eq!(find_call_id("+OK zzzzzzzz-zzzz-zzzz-zzzz-zzzzzzzzzzzz"), None);
    }

    #[test]
    fn test_expect_ok() {
        assert_eq!(expect_ok("+OK Success\n"), Ok("+OK Success\n"));
        assert!(expect_ok("").is_err());
        assert!(expect_ok("-ERR No such channel!\n").is_err());
    }
}
