//! Parser for raw commit and tag objects as printed by
//! `git cat-file commit <id>` / `git cat-file tag <id>`.
use crate::error::GitError;
use crate::models::{Commit, ObjectType, Tag};
use crate::sha::ObjectId;
use crate::signature::Signature;

/// Parses a raw commit object body into a [`Commit`].
///
/// The grammar: a run of header lines (`tree`, `parent` repeated 0+ times,
/// `author`, `committer`, optionally a folded `gpgsig` block), a blank
/// line, then the commit message verbatim (including any trailing
/// signature-adjacent text) to end of input.
pub fn parse_commit_body(id: ObjectId, raw: &[u8]) -> Result<Commit, GitError> {
    let text = std::str::from_utf8(raw).map_err(|_| GitError::Undecodable)?;

    let mut tree_id = None;
    let mut parents = Vec::new();
    let mut author = None;
    let mut committer = None;
    let mut signature: Option<String> = None;

    let mut lines = text.lines().peekable();
    let mut message_start = text.len();
    let mut consumed = 0usize;

    while let Some(line) = lines.next() {
        consumed += line.len() + 1;
        if line.is_empty() {
            message_start = consumed.min(text.len());
            break;
        }
        if let Some(rest) = line.strip_prefix("tree ") {
            tree_id = Some(
                rest.parse()
                    .map_err(|_| GitError::ParseError(format!("bad tree id: {rest}")))?,
            );
        } else if let Some(rest) = line.strip_prefix("parent ") {
            parents.push(
                rest.parse()
                    .map_err(|_| GitError::ParseError(format!("bad parent id: {rest}")))?,
            );
        } else if let Some(rest) = line.strip_prefix("author ") {
            author = Some(Signature::parse(rest)?);
        } else if let Some(rest) = line.strip_prefix("committer ") {
            committer = Some(Signature::parse(rest)?);
        } else if let Some(rest) = line.strip_prefix("gpgsig ") {
            let mut block = String::from(rest);
            while let Some(next) = lines.peek() {
                if let Some(folded) = next.strip_prefix(' ') {
                    block.push('\n');
                    block.push_str(folded);
                    consumed += next.len() + 1;
                    lines.next();
                } else {
                    break;
                }
            }
            signature = Some(block);
        }
        // Any other header key (e.g. `encoding`, `mergetag`) is ignored;
        // its bytes stay out of the message because we only break on the
        // first genuinely blank line.
    }

    let message = text.get(message_start..).unwrap_or("").to_string();

    Ok(Commit::new(
        id,
        tree_id.ok_or_else(|| GitError::ParseError("commit missing tree header".into()))?,
        parents,
        author.ok_or_else(|| GitError::ParseError("commit missing author header".into()))?,
        committer.ok_or_else(|| GitError::ParseError("commit missing committer header".into()))?,
        message,
        signature,
    ))
}

/// Parses a raw tag object body into a [`Tag`].
///
/// The grammar mirrors the commit one but with `object`/`type`/`tag`/
/// `tagger` headers instead of `tree`/`parent`/`author`/`committer`.
pub fn parse_tag_body(id: ObjectId, raw: &[u8]) -> Result<Tag, GitError> {
    let text = std::str::from_utf8(raw).map_err(|_| GitError::Undecodable)?;

    let mut target_id = None;
    let mut object_type = None;
    let mut name = None;
    let mut tagger = None;

    let mut consumed = 0usize;
    let mut message_start = text.len();

    for line in text.lines() {
        consumed += line.len() + 1;
        if line.is_empty() {
            message_start = consumed.min(text.len());
            break;
        }
        if let Some(rest) = line.strip_prefix("object ") {
            target_id = Some(
                rest.parse()
                    .map_err(|_| GitError::ParseError(format!("bad tag object id: {rest}")))?,
            );
        } else if let Some(rest) = line.strip_prefix("type ") {
            object_type = Some(rest.parse::<ObjectType>()?);
        } else if let Some(rest) = line.strip_prefix("tag ") {
            name = Some(rest.to_string());
        } else if let Some(rest) = line.strip_prefix("tagger ") {
            tagger = Some(Signature::parse(rest)?);
        }
    }

    let message = text.get(message_start..).unwrap_or("").to_string();

    Ok(Tag {
        object_type: object_type.unwrap_or(ObjectType::Commit),
        id,
        target_id: target_id.ok_or_else(|| GitError::ParseError("tag missing object header".into()))?,
        name: name.ok_or_else(|| GitError::ParseError("tag missing tag header".into()))?,
        tagger,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TREE_ID: &str = "2c49687c7f9e1f5b9f6a2e6a4f3b1c8d9e0a1b2c";
    const PARENT_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const PARENT_B: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    #[test]
    fn parses_two_parent_commit() {
        let body = format!(
            "tree {TREE_ID}\nparent {PARENT_A}\nparent {PARENT_B}\nauthor Jane Doe <jane@example.com> 1700000000 +0000\ncommitter Jane Doe <jane@example.com> 1700000100 +0000\n\nMerge branch 'b'\n"
        );
        let commit = parse_commit_body(ObjectId::EMPTY, body.as_bytes()).unwrap();
        assert_eq!(commit.parents.len(), 2);
        assert_eq!(commit.message, "Merge branch 'b'\n");
        assert_eq!(commit.tree_id.to_string(), TREE_ID);
    }

    #[test]
    fn captures_gpgsig_block_and_keeps_message_separate() {
        let body = format!(
            "tree {TREE_ID}\nauthor Jane Doe <jane@example.com> 1700000000 +0000\ncommitter Jane Doe <jane@example.com> 1700000000 +0000\ngpgsig -----BEGIN PGP SIGNATURE-----\n iQEz\n -----END PGP SIGNATURE-----\n\nSigned commit\n"
        );
        let commit = parse_commit_body(ObjectId::EMPTY, body.as_bytes()).unwrap();
        assert!(commit.signature.is_some());
        assert!(commit.signature.as_ref().unwrap().contains("BEGIN PGP SIGNATURE"));
        assert_eq!(commit.message, "Signed commit\n");
    }

    #[test]
    fn missing_tree_header_is_parse_error() {
        let body = "author Jane Doe <jane@example.com> 1700000000 +0000\ncommitter Jane Doe <jane@example.com> 1700000000 +0000\n\nmsg\n";
        assert!(parse_commit_body(ObjectId::EMPTY, body.as_bytes()).is_err());
    }

    #[test]
    fn parses_annotated_tag() {
        let body = format!(
            "object {TREE_ID}\ntype commit\ntag v1.1.0\ntagger Jane Doe <jane@example.com> 1700000000 +0000\n\nRelease 1.1.0\n"
        );
        let tag = parse_tag_body(ObjectId::EMPTY, body.as_bytes()).unwrap();
        assert_eq!(tag.name, "v1.1.0");
        assert_eq!(tag.object_type, ObjectType::Commit);
        assert_eq!(tag.message, "Release 1.1.0\n");
    }
}
