//! A Rust library providing a typed interface to Git history, diffs, blame
//! and the object model, built entirely on top of the local `git`
//! executable.
//!
//! This library requires the `git` executable to be installed and
//! accessible in the system's `PATH` where the program runs.

pub mod cache;
pub mod concurrency;
pub mod error;
pub mod exec;
pub mod log;
pub mod models;
pub mod parse;
pub mod repository;
pub mod sha;
pub mod signature;
pub mod types;

// Re-export key types
pub use crate::error::GitError;
pub use crate::repository::{CloneOptions, InitOptions, Repository};
pub use crate::sha::ObjectId;
pub use crate::signature::Signature;
pub use crate::types::{BranchName, GitUrl, Remote, Result};

pub mod prelude {
    //! Convenient import for the crate's commonly used types.
    pub use crate::error::GitError;
    pub use crate::models::*;
    pub use crate::repository::{CloneOptions, InitOptions, Repository};
    pub use crate::sha::ObjectId;
    pub use crate::signature::Signature;
    pub use crate::types::{BranchName, GitUrl, Remote, Result};
}
