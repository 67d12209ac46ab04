//! Author/committer/tagger identity parsing.
use chrono::{DateTime, FixedOffset, TimeZone};

use crate::error::GitError;

/// A name, email and instant, as attached to a commit/tag by its author,
/// committer, or tagger.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub when: DateTime<FixedOffset>,
}

impl Signature {
    /// Parse a raw commit/tag header value of the form
    /// `Name <email> <unix-seconds> <±HHMM>`.
    ///
    /// This is the form `git cat-file` prints for `author`/`committer`/
    /// `tagger` header lines.
    pub fn parse(raw: &str) -> Result<Self, GitError> {
        let raw = raw.trim_end();
        let email_start = raw
            .find('<')
            .ok_or_else(|| GitError::ParseError(format!("signature missing '<': {raw}")))?;
        let email_end = raw
            .rfind('>')
            .ok_or_else(|| GitError::ParseError(format!("signature missing '>': {raw}")))?;
        if email_end < email_start {
            return Err(GitError::ParseError(format!("malformed signature: {raw}")));
        }

        let name = raw[..email_start].trim().to_string();
        let email = raw[email_start + 1..email_end].trim().to_string();
        let rest = raw[email_end + 1..].trim();

        let when = Self::parse_when(rest)?;

        Ok(Signature { name, email, when })
    }

    /// Parses the trailing `<unix-seconds> <±HHMM>` (or, failing that, an
    /// RFC-2822-ish date string as seen in some tag header forms).
    fn parse_when(rest: &str) -> Result<DateTime<FixedOffset>, GitError> {
        let mut parts = rest.split_whitespace();
        if let (Some(secs_str), Some(tz_str)) = (parts.next(), parts.next()) {
            if let Ok(secs) = secs_str.parse::<i64>() {
                let offset = parse_tz_offset(tz_str).unwrap_or(FixedOffset::east_opt(0).unwrap());
                if let Some(dt) = offset.timestamp_opt(secs, 0).single() {
                    return Ok(dt);
                }
            }
        }

        DateTime::parse_from_rfc2822(rest)
            .or_else(|_| DateTime::parse_from_str(rest, "%a %b %e %T %Y %z"))
            .map_err(|e| GitError::ParseError(format!("unparsable signature date '{rest}': {e}")))
    }
}

/// Parses a `+HHMM`/`-HHMM` style offset. Returns `None` (rather than erroring)
/// on anything malformed, so that a single bad timezone degrades to UTC
/// instead of failing the whole parse.
fn parse_tz_offset(tz: &str) -> Option<FixedOffset> {
    if tz.len() != 5 {
        return None;
    }
    let sign = match tz.as_bytes()[0] {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let hours: i32 = tz[1..3].parse().ok()?;
    let mins: i32 = tz[3..5].parse().ok()?;
    let total_secs = sign * (hours * 3600 + mins * 60);
    FixedOffset::east_opt(total_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unix_seconds_form() {
        let sig = Signature::parse("Jane Doe <jane@example.com> 1700000000 +0200").unwrap();
        assert_eq!(sig.name, "Jane Doe");
        assert_eq!(sig.email, "jane@example.com");
        assert_eq!(sig.when.offset().local_minus_utc(), 7200);
    }

    #[test]
    fn parses_negative_offset() {
        let sig = Signature::parse("Jane Doe <jane@example.com> 1700000000 -0530").unwrap();
        assert_eq!(sig.when.offset().local_minus_utc(), -(5 * 3600 + 30 * 60));
    }

    #[test]
    fn malformed_timezone_degrades_to_utc() {
        let sig = Signature::parse("Jane Doe <jane@example.com> 1700000000 bogus").unwrap();
        assert_eq!(sig.when.offset().local_minus_utc(), 0);
    }

    #[test]
    fn rejects_missing_email_brackets() {
        assert!(Signature::parse("Jane Doe 1700000000 +0000").is_err());
    }
}
