//! `git blame --porcelain` parser.
use std::collections::HashMap;
use std::sync::Arc;

use chrono::TimeZone;

use crate::error::GitError;
use crate::models::{Blame, Commit};
use crate::sha::ObjectId;
use crate::signature::Signature;

/// The header fields `blame --porcelain` prints once per commit the first
/// time it appears in the output. Later occurrences of the same commit in
/// the same blame run omit all of this and go straight from the `<sha>
/// <orig> <final>` line to the tab-prefixed content line.
#[derive(Default, Clone)]
struct PendingDetails {
    author_name: Option<String>,
    author_email: Option<String>,
    author_time: Option<i64>,
    author_tz: Option<String>,
    committer_name: Option<String>,
    committer_email: Option<String>,
    committer_time: Option<i64>,
    summary: Option<String>,
    /// The sha from a `previous <sha> <path>` header, if one was seen; this
    /// commit's sole parent per spec's blame grammar.
    previous: Option<String>,
}

/// Parses the full output of `git blame --porcelain <file>` into a sparse,
/// 1-based line-number-to-commit map.
pub fn parse_blame(raw: &[u8]) -> Result<Blame, GitError> {
    let text = std::str::from_utf8(raw).map_err(|_| GitError::Undecodable)?;

    let mut blame = Blame::default();
    let mut pending: HashMap<ObjectId, PendingDetails> = HashMap::new();
    let mut finished: HashMap<ObjectId, Arc<Commit>> = HashMap::new();

    let mut current_id: Option<ObjectId> = None;
    let mut current_final_line: usize = 0;

    for line in text.lines() {
        if let Some(rest) = line.strip_prefix('\t') {
            let _ = rest; // content itself isn't retained on `Blame`
            if let (Some(id), true) = (current_id, current_final_line > 0) {
                let commit = finished.entry(id).or_insert_with(|| {
                    let details = pending.get(&id).cloned().unwrap_or_default();
                    Arc::new(build_commit(id, &details))
                });
                blame.lines.insert(current_final_line, commit.clone());
            }
            continue;
        }

        let mut parts = line.split(' ');
        let first = parts.next().unwrap_or("");

        if first.len() == 40 && first.bytes().all(|b| b.is_ascii_hexdigit()) {
            // `<sha1> <orig-line> <final-line> [<num-lines>]`
            let id: ObjectId = first
                .parse()
                .map_err(|_| GitError::ParseError(format!("bad blame sha: {first}")))?;
            let final_line: usize = parts
                .nth(1) // skip orig-line, take final-line
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| GitError::ParseError(format!("bad blame header: {line}")))?;
            current_id = Some(id);
            current_final_line = final_line;
            pending.entry(id).or_default();
            continue;
        }

        let Some(id) = current_id else { continue };
        let entry = pending.entry(id).or_default();

        if let Some(v) = line.strip_prefix("author-mail ") {
            entry.author_email = Some(clean_mail(v));
        } else if let Some(v) = line.strip_prefix("author-time ") {
            entry.author_time = v.trim().parse().ok();
        } else if let Some(v) = line.strip_prefix("author-tz ") {
            entry.author_tz = Some(v.trim().to_string());
        } else if let Some(v) = line.strip_prefix("author ") {
            entry.author_name = Some(v.to_string());
        } else if let Some(v) = line.strip_prefix("committer-mail ") {
            entry.committer_email = Some(clean_mail(v));
        } else if let Some(v) = line.strip_prefix("committer-time ") {
            entry.committer_time = v.trim().parse().ok();
        } else if line.starts_with("committer-tz ") {
            // Deliberately ignored: this crate reuses `author-tz` for the
            // committer instant too, matching an observed quirk in real
            // porcelain output pairings rather than git's documented
            // per-field offsets.
        } else if let Some(v) = line.strip_prefix("committer ") {
            entry.committer_name = Some(v.to_string());
        } else if let Some(v) = line.strip_prefix("summary ") {
            entry.summary = Some(v.to_string());
        } else if let Some(v) = line.strip_prefix("previous ") {
            entry.previous = v.split_whitespace().next().map(str::to_string);
        }
        // `filename`, `boundary` and other porcelain lines are recognized
        // implicitly by falling through unmatched.
    }

    Ok(blame)
}

fn clean_mail(raw: &str) -> String {
    raw.trim_start_matches('<').trim_end_matches('>').to_string()
}

fn build_commit(id: ObjectId, details: &PendingDetails) -> Commit {
    let author_tz = details.author_tz.as_deref().unwrap_or("+0000");
    let author_raw = format!(
        "{} <{}> {} {}",
        details.author_name.as_deref().unwrap_or(""),
        details.author_email.as_deref().unwrap_or(""),
        details.author_time.unwrap_or(0),
        author_tz,
    );
    // Quirk preserved from spec: the committer instant is built from
    // `committer-time` but `author-tz`, not `committer-tz`.
    let committer_raw = format!(
        "{} <{}> {} {}",
        details.committer_name.as_deref().unwrap_or(""),
        details.committer_email.as_deref().unwrap_or(""),
        details.committer_time.unwrap_or(0),
        author_tz,
    );

    let fallback_when = chrono::FixedOffset::east_opt(0)
        .unwrap()
        .timestamp_opt(details.author_time.unwrap_or(0), 0)
        .single()
        .unwrap_or_else(|| chrono::FixedOffset::east_opt(0).unwrap().timestamp_opt(0, 0).unwrap());

    let author = Signature::parse(&author_raw).unwrap_or(Signature {
        name: details.author_name.clone().unwrap_or_default(),
        email: details.author_email.clone().unwrap_or_default(),
        when: fallback_when,
    });
    let committer = Signature::parse(&committer_raw).unwrap_or_else(|_| author.clone());

    let parents = details
        .previous
        .as_deref()
        .and_then(|sha| sha.parse::<ObjectId>().ok())
        .map(|id| vec![id])
        .unwrap_or_default();

    Commit::new(
        id,
        ObjectId::EMPTY,
        parents,
        author,
        committer,
        details.summary.clone().unwrap_or_default(),
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "2c49687c7f9e1f5b9f6a2e6a4f3b1c8d9e0a1b2c 1 1 2\nauthor Jane Doe\nauthor-mail <jane@example.com>\nauthor-time 1700000000\nauthor-tz +0200\ncommitter Jane Doe\ncommitter-mail <jane@example.com>\ncommitter-time 1700000500\ncommitter-tz +0000\nsummary Initial commit\nfilename src/lib.rs\n\tfn main() {}\n2c49687c7f9e1f5b9f6a2e6a4f3b1c8d9e0a1b2c 2 2\nfilename src/lib.rs\n\tfn helper() {}\n";

    #[test]
    fn parses_two_lines_from_one_commit() {
        let blame = parse_blame(SAMPLE.as_bytes()).unwrap();
        assert_eq!(blame.lines.len(), 2);
        let first = blame.lines.get(&1).unwrap();
        let second = blame.lines.get(&2).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.author.name, "Jane Doe");
        assert_eq!(first.author.email, "jane@example.com");
    }

    #[test]
    fn committer_reuses_author_timezone() {
        let blame = parse_blame(SAMPLE.as_bytes()).unwrap();
        let commit = blame.lines.get(&1).unwrap();
        // author-tz is +0200; committer-tz (+0000) is ignored per the
        // preserved quirk, so the committer offset should also be +0200.
        assert_eq!(commit.committer.when.offset().local_minus_utc(), 7200);
    }

    #[test]
    fn rejects_invalid_utf8() {
        let bytes = vec![0xff, 0xfe, 0x00];
        assert!(parse_blame(&bytes).is_err());
    }

    #[test]
    fn previous_header_becomes_sole_parent() {
        let raw = "2c49687c7f9e1f5b9f6a2e6a4f3b1c8d9e0a1b2c 3 3 4\nauthor Jane Doe\nauthor-mail <jane@example.com>\nauthor-time 1585383299\nauthor-tz +0800\nsummary ci: migrate\nprevious 1111111111111111111111111111111111111111 src/lib.rs\nfilename src/lib.rs\n\tsome code\n";
        let blame = parse_blame(raw.as_bytes()).unwrap();
        let commit = blame.lines.get(&3).unwrap();
        assert_eq!(commit.parents.len(), 1);
        assert_eq!(
            commit.parents[0].to_string(),
            "1111111111111111111111111111111111111111"
        );
    }
}
