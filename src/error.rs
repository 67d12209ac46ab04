//! Defines the error types used throughout the git library.
use thiserror::Error;

/// Represents errors that can occur during Git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// Failed to access the current working directory, e.g., due to permissions.
    #[error("Unable to access current working directory")]
    WorkingDirectoryInaccessible,

    /// Failed to execute the external 'git' process, e.g., 'git' not found in PATH.
    #[error("Unable to execute git process")]
    Execution,

    /// The output (stdout or stderr) from the 'git' process was not valid UTF-8.
    #[error("Unable to decode output from git executable")]
    Undecodable,

    /// The provided string is not a valid Git URL according to the library's criteria.
    #[error("git URL is invalid: {0}")]
    InvalidUrl(String), // Added the invalid URL for context

    /// The provided string is not a valid Git reference name (e.g., branch name).
    #[error("Ref name is invalid: {0}")]
    InvalidRefName(String), // Added the invalid name for context

    /// The provided string is not a valid 40-character hex object identity.
    #[error("object id is invalid: {0}")]
    InvalidObjectId(String),

    /// The 'git' command executed successfully but reported an error.
    /// Contains the captured stdout and stderr from the failed command.
    #[error("git failed with the following stdout: {stdout} stderr: {stderr}")]
    GitError { stdout: String, stderr: String },

    /// Attempted an operation requiring a remote (e.g., list remotes) but none were configured.
    #[error("No Git remote repository is available")]
    NoRemoteRepositorySet,

    /// The provided path could not be converted to a UTF-8 string, which was required
    /// for constructing the git command arguments in this specific context.
    #[error("Path contains non-UTF8 characters and cannot be used as a string argument: {0:?}")]
    PathEncodingError(std::path::PathBuf),

    /// The provided path is not a directory, or does not exist.
    #[error("not a directory: {0}")]
    NotExist(std::path::PathBuf),

    #[error("Remote name is invalid: {0}")]
    InvalidRemoteName(String),

    /// The 'git' executable was not found in the system's PATH.
    #[error("'git' command not found. Please ensure Git is installed and that its executable is included in your system's PATH environment variable.")]
    GitNotFound,

    /// A command's deadline elapsed before the `git` child process exited; the
    /// child has been killed.
    #[error("git command timed out")]
    ExecTimeout,

    /// `rev-parse` (or an operation built on it) could not resolve the given revision.
    #[error("revision does not exist")]
    RevisionNotExist,

    /// `show-ref --verify` (or an operation built on it) reports the ref does not exist.
    #[error("reference does not exist")]
    ReferenceNotExist,

    /// A commit was expected to have a parent at the given index but does not.
    #[error("parent commit does not exist")]
    ParentNotExist,

    /// A `.gitmodules` entry names a path with no corresponding submodule.
    #[error("submodule does not exist")]
    SubmoduleNotExist,

    /// `merge-base` reports the two revisions share no common ancestor.
    #[error("no merge base between the given revisions")]
    NoMergeBase,

    /// A tree entry was addressed as a blob (e.g. `Blob::bytes`) but its mode is
    /// not `blob`/`exec`.
    #[error("tree entry is not a blob")]
    NotBlob,

    /// The named remote is not configured in this repository.
    #[error("remote does not exist")]
    RemoteNotExist,

    /// `remote set-url --delete` (or similar) found no matching URL.
    #[error("no such URL found for remote")]
    URLNotExist,

    /// `remote set-url --delete` would remove every push URL for a remote.
    #[error("will not delete all non-push URLs for remote")]
    NotDeleteNonPushURLs,

    /// A parser could not make sense of the bytes it was given (malformed
    /// object body, unparsable porcelain line, etc.).
    #[error("failed to parse git output: {0}")]
    ParseError(String),
}
