//! The single substrate every operation in this crate builds on: running
//! `git` as a subprocess, bounded by a deadline, with three ways to consume
//! its output.
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;
use std::time::Duration;

use once_cell::sync::Lazy;
use wait_timeout::ChildExt;

use crate::error::GitError;
use crate::log;

const DEFAULT_DEADLINE: Duration = Duration::from_secs(60);

/// How long a command is allowed to run before it is killed.
#[derive(Debug, Clone, Copy)]
pub enum Deadline {
    /// Bound the command to the given duration.
    After(Duration),
    /// No bound at all. Use sparingly — reserved for operations explicitly
    /// documented as unbounded (e.g. an interactive rebase driver).
    None,
}

impl Default for Deadline {
    fn default() -> Self {
        Deadline::After(DEFAULT_DEADLINE)
    }
}

/// A fully-specified invocation of `git`.
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
    pub deadline: Deadline,
}

impl RunSpec {
    pub fn new<I, S>(cwd: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RunSpec {
            args: args.into_iter().map(Into::into).collect(),
            cwd: cwd.into(),
            env: Vec::new(),
            deadline: Deadline::default(),
        }
    }

    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Appends `--end-of-options` ahead of any caller-supplied positional
    /// arguments that could otherwise be misread as flags (paths beginning
    /// with `-`, revisions that look like options, etc).
    pub fn end_of_options(mut self) -> Self {
        self.args.push("--end-of-options".to_string());
        self
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new("git");
        cmd.current_dir(&self.cwd).args(&self.args);
        for (k, v) in &self.env {
            cmd.env(k, v);
        }
        cmd
    }
}

/// The fully captured result of a command that completed before its
/// deadline, regardless of exit status.
pub struct Collected {
    pub status: std::process::ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Runs `spec`, collecting stdout/stderr into memory. Used by every
/// operation that needs to inspect git's full output before deciding
/// success or failure.
pub fn run_collect(spec: &RunSpec) -> Result<Collected, GitError> {
    let mut cmd = spec.build_command();
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            GitError::GitNotFound
        } else {
            GitError::Execution
        }
    })?;

    let status = wait_with_deadline(&mut child, spec.deadline)?;

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    if let Some(mut out) = child.stdout.take() {
        let _ = out.read_to_end(&mut stdout);
    }
    if let Some(mut err) = child.stderr.take() {
        let _ = err.read_to_end(&mut stderr);
    }

    log::record(&spec.args, &spec.cwd, &stdout);

    Ok(Collected {
        status,
        stdout,
        stderr,
    })
}

/// Runs `spec`, streaming stdout directly to `writer` as it arrives rather
/// than buffering it (e.g. `Commit::Archive`). Stderr is still collected so
/// failures can be classified.
pub fn run_stream<W: Write>(spec: &RunSpec, mut writer: W) -> Result<std::process::ExitStatus, GitError> {
    let mut cmd = spec.build_command();
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            GitError::GitNotFound
        } else {
            GitError::Execution
        }
    })?;

    if let Some(mut out) = child.stdout.take() {
        let mut buf = [0u8; 8192];
        loop {
            let n = out.read(&mut buf).map_err(|_| GitError::Execution)?;
            if n == 0 {
                break;
            }
            writer
                .write_all(&buf[..n])
                .map_err(|_| GitError::Execution)?;
        }
    }

    let status = wait_with_deadline(&mut child, spec.deadline)?;
    log::record(&spec.args, &spec.cwd, b"");
    Ok(status)
}

/// Runs `spec`, feeding its stdout into `sink` line-by-line as the process
/// produces it, without collecting the whole output in memory first (e.g.
/// a blame or log parser consuming a long-running command).
pub fn run_piped<F>(spec: &RunSpec, mut sink: F) -> Result<std::process::ExitStatus, GitError>
where
    F: FnMut(&[u8]),
{
    let mut cmd = spec.build_command();
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            GitError::GitNotFound
        } else {
            GitError::Execution
        }
    })?;

    if let Some(mut out) = child.stdout.take() {
        let mut buf = [0u8; 8192];
        loop {
            let n = out.read(&mut buf).map_err(|_| GitError::Execution)?;
            if n == 0 {
                break;
            }
            sink(&buf[..n]);
        }
    }

    let status = wait_with_deadline(&mut child, spec.deadline)?;
    log::record(&spec.args, &spec.cwd, b"");
    Ok(status)
}

fn wait_with_deadline(
    child: &mut std::process::Child,
    deadline: Deadline,
) -> Result<std::process::ExitStatus, GitError> {
    match deadline {
        Deadline::None => child.wait().map_err(|_| GitError::Execution),
        Deadline::After(dur) => match child.wait_timeout(dur).map_err(|_| GitError::Execution)? {
            Some(status) => Ok(status),
            None => {
                let _ = child.kill();
                let _ = child.wait();
                Err(GitError::ExecTimeout)
            }
        },
    }
}

/// Maps a completed-but-failing invocation to a `GitError` variant, using
/// the command that was run, its exit code, and its stderr text.
///
/// This is the single place the crate decides what a given non-zero exit
/// from a given git subcommand *means*. Pure function: no I/O, trivially
/// testable.
pub fn classify_failure(args: &[String], exit_code: Option<i32>, stderr: &str) -> GitError {
    let subcommand = args.first().map(String::as_str).unwrap_or("");
    let stderr_lower = stderr.to_lowercase();

    match (subcommand, exit_code) {
        ("rev-parse", Some(128)) => GitError::RevisionNotExist,
        ("show-ref", Some(1)) => GitError::ReferenceNotExist,
        ("merge-base", Some(1)) => GitError::NoMergeBase,
        _ if stderr_lower.contains("not a valid ref") => GitError::ReferenceNotExist,
        _ if stderr_lower.contains("no such remote") => GitError::RemoteNotExist,
        _ if stderr_lower.contains("no such url found") => GitError::URLNotExist,
        _ if stderr_lower.contains("will not delete all non-push urls") => {
            GitError::NotDeleteNonPushURLs
        }
        _ if stderr_lower.contains("does not have a commit checked out") => {
            GitError::RevisionNotExist
        }
        _ => GitError::GitError {
            stdout: String::new(),
            stderr: stderr.to_string(),
        },
    }
}

/// `git commit` exits 1 with empty stderr when the working tree had nothing
/// staged; spec.md §4.1 normalizes that one case to success rather than a
/// `GitError`. Callers must check this *before* calling `classify_failure`.
pub fn is_commit_noop(args: &[String], exit_code: Option<i32>, stderr: &str) -> bool {
    args.first().map(String::as_str) == Some("commit") && exit_code == Some(1) && stderr.trim().is_empty()
}

/// The numeric portion of a `git --version` string (`"2.43.0"` out of
/// `"git version 2.43.0.windows.1"`), comparable so callers can gate
/// behavior on a minimum Git release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct GitVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl std::str::FromStr for GitVersion {
    type Err = GitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('.');
        let major = parts
            .next()
            .unwrap_or("")
            .parse()
            .map_err(|_| GitError::ParseError(format!("unrecognized git version: {s}")))?;
        let minor = parts.next().unwrap_or("0").parse().unwrap_or(0);
        let patch = parts.next().unwrap_or("0").parse().unwrap_or(0);
        Ok(GitVersion { major, minor, patch })
    }
}

static GIT_VERSION: OnceLock<std::sync::Mutex<Option<GitVersion>>> = OnceLock::new();

fn version_cell() -> &'static std::sync::Mutex<Option<GitVersion>> {
    GIT_VERSION.get_or_init(|| std::sync::Mutex::new(None))
}

/// Returns the installed `git` binary's parsed version, probing for it once
/// and caching the result. A failed probe is **not** cached, so a
/// transiently missing `git` (e.g. a PATH not yet set up) can succeed on a
/// later call.
pub fn git_version(cwd: &Path) -> Result<GitVersion, GitError> {
    if let Some(v) = *version_cell().lock().expect("version lock poisoned") {
        return Ok(v);
    }

    let spec = RunSpec::new(cwd, ["--version".to_string()]);
    let collected = run_collect(&spec)?;
    if !collected.status.success() {
        return Err(GitError::GitNotFound);
    }
    let text = String::from_utf8(collected.stdout).map_err(|_| GitError::Undecodable)?;
    // "git version 2.43.0.windows.1" -> third token "2.43.0.windows.1"
    let token = text
        .split_whitespace()
        .nth(2)
        .ok_or_else(|| GitError::ParseError("unrecognized git --version output".to_string()))?;
    let numeric = token.split(".windows").next().unwrap_or(token);
    let version: GitVersion = numeric.parse()?;

    *version_cell().lock().expect("version lock poisoned") = Some(version);
    Ok(version)
}

/// A compiled-once regex used to validate that stderr doesn't smuggle an
/// unexpected control character before it's logged; mirrors the teacher's
/// pattern of keeping process-wide compiled statics behind `once_cell`.
pub(crate) static CONTROL_CHARS: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"[\x00-\x08\x0b\x0c\x0e-\x1f]").unwrap());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rev_parse_128_as_revision_not_exist() {
        let err = classify_failure(&["rev-parse".to_string()], Some(128), "fatal: ambiguous");
        assert!(matches!(err, GitError::RevisionNotExist));
    }

    #[test]
    fn classifies_merge_base_1_as_no_merge_base() {
        let err = classify_failure(&["merge-base".to_string()], Some(1), "");
        assert!(matches!(err, GitError::NoMergeBase));
    }

    #[test]
    fn classifies_show_ref_1_as_reference_not_exist() {
        let err = classify_failure(&["show-ref".to_string()], Some(1), "");
        assert!(matches!(err, GitError::ReferenceNotExist));
    }

    #[test]
    fn classifies_stderr_substring_not_a_valid_ref() {
        let err = classify_failure(
            &["update-ref".to_string()],
            Some(1),
            "fatal: not a valid ref: refs/heads/x",
        );
        assert!(matches!(err, GitError::ReferenceNotExist));
    }

    #[test]
    fn unrecognized_failure_is_opaque() {
        let err = classify_failure(&["weird".to_string()], Some(2), "boom");
        assert!(matches!(err, GitError::GitError { .. }));
    }

    #[test]
    fn classifies_no_such_url_found() {
        let err = classify_failure(&["remote".to_string()], Some(2), "fatal: No such URL found: origin");
        assert!(matches!(err, GitError::URLNotExist));
    }

    #[test]
    fn classifies_will_not_delete_all_non_push_urls() {
        let err = classify_failure(
            &["remote".to_string()],
            Some(2),
            "fatal: Will not delete all non-push URLs",
        );
        assert!(matches!(err, GitError::NotDeleteNonPushURLs));
    }

    #[test]
    fn recognizes_commit_noop() {
        assert!(is_commit_noop(&["commit".to_string()], Some(1), ""));
        assert!(!is_commit_noop(&["commit".to_string()], Some(1), "fatal: oops"));
        assert!(!is_commit_noop(&["status".to_string()], Some(1), ""));
    }

    #[test]
    fn parses_plain_version() {
        let v: GitVersion = "2.43.0".parse().unwrap();
        assert_eq!(v, GitVersion { major: 2, minor: 43, patch: 0 });
    }

    #[test]
    fn version_ordering_gates_sort_by_creatordate() {
        let threshold = GitVersion { major: 2, minor: 4, patch: 9 };
        assert!(GitVersion { major: 2, minor: 43, patch: 0 } >= threshold);
        assert!(GitVersion { major: 2, minor: 4, patch: 9 } >= threshold);
        assert!(GitVersion { major: 2, minor: 4, patch: 8 } < threshold);
        assert!(GitVersion { major: 1, minor: 9, patch: 0 } < threshold);
    }
}
