//! The repository's domain model: commits, trees, blobs, tags, diffs,
//! blame, and the handful of ambient types (`StatusEntry`, `ConfigEntry`,
//! ...) kept from the library's working-tree convenience layer.
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};

use crate::error::GitError;
use crate::sha::ObjectId;
use crate::signature::Signature;
use crate::types::{BranchName, GitUrl};

/// The four object kinds `git cat-file -t` can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    Commit,
    Tree,
    Blob,
    Tag,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Commit => "commit",
            ObjectType::Tree => "tree",
            ObjectType::Blob => "blob",
            ObjectType::Tag => "tag",
        }
    }
}

impl std::str::FromStr for ObjectType {
    type Err = GitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "commit" => Ok(ObjectType::Commit),
            "tree" => Ok(ObjectType::Tree),
            "blob" => Ok(ObjectType::Blob),
            "tag" => Ok(ObjectType::Tag),
            other => Err(GitError::ParseError(format!("unknown object type: {other}"))),
        }
    }
}

/// The filesystem mode a tree entry carries, as printed by `ls-tree`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryMode {
    Tree,
    Blob,
    Executable,
    Symlink,
    Commit,
}

impl EntryMode {
    pub fn as_octal(&self) -> &'static str {
        match self {
            EntryMode::Tree => "040000",
            EntryMode::Blob => "100644",
            EntryMode::Executable => "100755",
            EntryMode::Symlink => "120000",
            EntryMode::Commit => "160000",
        }
    }

    pub fn parse(mode: &str) -> Result<Self, GitError> {
        match mode {
            "040000" => Ok(EntryMode::Tree),
            "100644" => Ok(EntryMode::Blob),
            "100755" => Ok(EntryMode::Executable),
            "120000" => Ok(EntryMode::Symlink),
            "160000" => Ok(EntryMode::Commit),
            other => Err(GitError::ParseError(format!("unknown entry mode: {other}"))),
        }
    }
}

/// A one-shot cell that, unlike `OnceLock`, does not remember a failed
/// attempt: a caller that raced a transient error (e.g. the deadline
/// elapsed) gets to try again on the next call.
struct RetryableOnce<T> {
    value: Mutex<Option<Arc<T>>>,
}

impl<T> Default for RetryableOnce<T> {
    fn default() -> Self {
        RetryableOnce {
            value: Mutex::new(None),
        }
    }
}

impl<T> RetryableOnce<T> {
    fn get_or_try_init<F>(&self, init: F) -> Result<Arc<T>, GitError>
    where
        F: FnOnce() -> Result<T, GitError>,
    {
        let mut guard = self.value.lock().expect("lazy cell lock poisoned");
        if let Some(v) = guard.as_ref() {
            return Ok(v.clone());
        }
        let computed = Arc::new(init()?);
        *guard = Some(computed.clone());
        Ok(computed)
    }
}

/// The identity a caller wants attached to a new commit, distinct from
/// `Signature` in that it carries no `when` — `git commit` stamps the time
/// itself. Used by `Repository::commit_staged` and
/// `Repository::stage_and_commit_all_modified`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
}

/// A parsed commit object.
#[derive(Clone)]
pub struct Commit {
    pub id: ObjectId,
    pub tree_id: ObjectId,
    pub parents: Vec<ObjectId>,
    pub author: Signature,
    pub committer: Signature,
    pub message: String,
    /// The raw `gpgsig` block, if the commit carried one, with header
    /// folding undone but otherwise verbatim.
    pub signature: Option<String>,
    submodules: RetryableOnce<HashMap<String, Submodule>>,
}

impl std::fmt::Debug for Commit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Commit")
            .field("id", &self.id)
            .field("tree_id", &self.tree_id)
            .field("parents", &self.parents)
            .field("author", &self.author)
            .field("committer", &self.committer)
            .field("message", &self.message)
            .finish()
    }
}

impl Commit {
    pub fn new(
        id: ObjectId,
        tree_id: ObjectId,
        parents: Vec<ObjectId>,
        author: Signature,
        committer: Signature,
        message: String,
        signature: Option<String>,
    ) -> Self {
        Commit {
            id,
            tree_id,
            parents,
            author,
            committer,
            message,
            signature,
            submodules: RetryableOnce::default(),
        }
    }

    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }

    /// Returns the `.gitmodules`-derived submodule map for this commit,
    /// parsing it on first access and caching the result. A parse failure
    /// (e.g. a transient read error) is not cached, so a later call may
    /// succeed.
    pub fn submodules<F>(&self, parse: F) -> Result<Arc<HashMap<String, Submodule>>, GitError>
    where
        F: FnOnce() -> Result<HashMap<String, Submodule>, GitError>,
    {
        self.submodules.get_or_try_init(parse)
    }
}

/// A parsed tree object: a flat list of entries, each a blob, another
/// tree, or a commit (submodule gitlink).
pub struct Tree {
    pub id: ObjectId,
    entries: OnceLock<Vec<TreeEntry>>,
}

impl Tree {
    pub fn new(id: ObjectId) -> Self {
        Tree {
            id,
            entries: OnceLock::new(),
        }
    }

    /// Returns this tree's entries, sorted submodules-and-directories
    /// first, then lexicographically by name — populating the cache via
    /// `load` on first access.
    pub fn entries<F>(&self, load: F) -> Result<&[TreeEntry], GitError>
    where
        F: FnOnce() -> Result<Vec<TreeEntry>, GitError>,
    {
        if let Some(entries) = self.entries.get() {
            return Ok(entries);
        }
        let mut loaded = load()?;
        loaded.sort_by(|a, b| {
            let a_dir_like = matches!(a.mode, EntryMode::Tree | EntryMode::Commit);
            let b_dir_like = matches!(b.mode, EntryMode::Tree | EntryMode::Commit);
            match (a_dir_like, b_dir_like) {
                (true, false) => std::cmp::Ordering::Less,
                (false, true) => std::cmp::Ordering::Greater,
                _ => a.name.cmp(&b.name),
            }
        });
        let _ = self.entries.set(loaded);
        Ok(self.entries.get().expect("just set"))
    }
}

impl std::fmt::Debug for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tree").field("id", &self.id).finish()
    }
}

/// One entry of a `Tree`.
#[derive(Debug, Clone)]
pub struct TreeEntry {
    pub mode: EntryMode,
    pub object_type: ObjectType,
    pub id: ObjectId,
    pub name: String,
    size: Arc<OnceLock<u64>>,
}

impl TreeEntry {
    pub fn new(mode: EntryMode, object_type: ObjectType, id: ObjectId, name: String) -> Self {
        TreeEntry {
            mode,
            object_type,
            id,
            name,
            size: Arc::new(OnceLock::new()),
        }
    }

    /// Returns this entry's blob size in bytes, fetching it via `load` on
    /// first access (`git cat-file -s`). Only meaningful for blob/exec
    /// entries.
    pub fn size<F>(&self, load: F) -> Result<u64, GitError>
    where
        F: FnOnce() -> Result<u64, GitError>,
    {
        if let Some(v) = self.size.get() {
            return Ok(*v);
        }
        let v = load()?;
        let _ = self.size.set(v);
        Ok(v)
    }
}

/// A blob's raw content.
#[derive(Debug, Clone)]
pub struct Blob {
    pub id: ObjectId,
    pub bytes: Vec<u8>,
}

/// A parsed tag object. `Lightweight` tags (a plain ref, no tag object)
/// are represented as a `Reference`, not a `Tag`.
#[derive(Debug, Clone)]
pub struct Tag {
    pub object_type: ObjectType,
    pub id: ObjectId,
    pub target_id: ObjectId,
    pub name: String,
    pub tagger: Option<Signature>,
    pub message: String,
}

/// A `.gitmodules` entry, resolved against a specific commit.
#[derive(Clone)]
pub struct Submodule {
    pub name: String,
    pub url: GitUrl,
    commit: RetryableOnce<ObjectId>,
}

impl std::fmt::Debug for Submodule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Submodule")
            .field("name", &self.name)
            .field("url", &self.url)
            .finish()
    }
}

impl Submodule {
    pub fn new(name: String, url: GitUrl) -> Self {
        Submodule {
            name,
            url,
            commit: RetryableOnce::default(),
        }
    }

    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.name)
    }

    /// Resolves the commit this submodule is pinned to in its parent
    /// commit's tree, caching the result.
    pub fn commit<F>(&self, resolve: F) -> Result<Arc<ObjectId>, GitError>
    where
        F: FnOnce() -> Result<ObjectId, GitError>,
    {
        self.commit.get_or_try_init(resolve)
    }
}

/// A resolved reference: a name (`refs/heads/main`, `refs/tags/v1.0.0`, ...)
/// and the object id it currently points at.
#[derive(Debug, Clone)]
pub struct Reference {
    pub refspec: String,
    pub id: ObjectId,
}

/// The type of a `Reference`, inferred from its `refspec` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceType {
    LocalBranch,
    RemoteBranch,
    Tag,
    Note,
    Other,
}

impl Reference {
    pub fn ref_type(&self) -> ReferenceType {
        if self.refspec.starts_with("refs/heads/") {
            ReferenceType::LocalBranch
        } else if self.refspec.starts_with("refs/remotes/") {
            ReferenceType::RemoteBranch
        } else if self.refspec.starts_with("refs/tags/") {
            ReferenceType::Tag
        } else if self.refspec.starts_with("refs/notes/") {
            ReferenceType::Note
        } else {
            ReferenceType::Other
        }
    }
}

/// A parsed unified diff: zero or more per-file diffs.
#[derive(Debug, Clone, Default)]
pub struct Diff {
    pub files: Vec<DiffFile>,
    /// Sum of every file's `num_additions`.
    pub total_additions: usize,
    /// Sum of every file's `num_deletions`.
    pub total_deletions: usize,
    /// Set when the diff was truncated by `max_files`.
    pub truncated: bool,
}

/// One file's worth of a unified diff.
#[derive(Debug, Clone)]
pub struct DiffFile {
    pub old_name: Option<PathBuf>,
    pub new_name: Option<PathBuf>,
    pub old_mode: Option<String>,
    pub new_mode: Option<String>,
    pub is_new: bool,
    pub is_deleted: bool,
    pub is_rename: bool,
    pub is_binary: bool,
    /// Set when either mode recorded for this file is `160000` (a
    /// submodule gitlink entry rather than a regular blob).
    pub is_submodule: bool,
    pub old_index: Option<String>,
    pub new_index: Option<String>,
    pub sections: Vec<DiffSection>,
    /// Sum of `Add` lines across every section of this file.
    pub num_additions: usize,
    /// Sum of `Delete` lines across every section of this file.
    pub num_deletions: usize,
    /// Set when this file's hunks were truncated by `max_file_lines`.
    pub truncated: bool,
}

impl Default for DiffFile {
    fn default() -> Self {
        DiffFile {
            old_name: None,
            new_name: None,
            old_mode: None,
            new_mode: None,
            is_new: false,
            is_deleted: false,
            is_rename: false,
            is_binary: false,
            is_submodule: false,
            old_index: None,
            new_index: None,
            sections: Vec::new(),
            num_additions: 0,
            num_deletions: 0,
            truncated: false,
        }
    }
}

/// One `@@ ... @@` hunk of a `DiffFile`.
#[derive(Debug, Clone, Default)]
pub struct DiffSection {
    pub old_start: usize,
    pub old_lines: usize,
    pub new_start: usize,
    pub new_lines: usize,
    pub heading: Option<String>,
    pub lines: Vec<DiffLine>,
    /// Count of `Add` lines in this section.
    pub num_additions: usize,
    /// Count of `Delete` lines in this section.
    pub num_deletions: usize,
}

/// One line of a `DiffSection`.
///
/// Invariants: an `Add` line has `left_line == 0`; a `Delete` line has
/// `right_line == 0`; a `Plain` (context) line has both set; a `Section`
/// line (the `@@ ... @@` header itself, stored for display) has both at 0.
#[derive(Debug, Clone)]
pub struct DiffLine {
    pub kind: DiffLineKind,
    pub left_line: usize,
    pub right_line: usize,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffLineKind {
    Add,
    Delete,
    Plain,
    Section,
}

/// The result of `git blame --porcelain`: a sparse, 1-based map from final
/// line number to the commit that last touched it.
#[derive(Debug, Clone, Default)]
pub struct Blame {
    pub lines: BTreeMap<usize, Arc<Commit>>,
}

/// A repository hook script.
#[derive(Debug, Clone)]
pub struct Hook {
    pub name: HookName,
    pub path: PathBuf,
    pub is_sample: bool,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookName {
    PreReceive,
    Update,
    PostReceive,
}

impl HookName {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookName::PreReceive => "pre-receive",
            HookName::Update => "update",
            HookName::PostReceive => "post-receive",
        }
    }
}

// --- Ambient working-tree / testing types, kept from the library's
// --- convenience layer (see SPEC_FULL.md "Additional lifecycle/testing
// --- types"). ---

/// A file status from `git status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Unmodified,
    Modified,
    Added,
    Deleted,
    DeletedStaged,
    Renamed,
    Copied,
    UpdatedButUnmerged,
    Untracked,
    Ignored,
}

impl FileStatus {
    pub(crate) fn from_porcelain_code(index: char, worktree: char) -> FileStatus {
        match (index, worktree) {
            (' ', 'M') => FileStatus::Modified,
            ('M', _) => FileStatus::Added,
            ('A', _) => FileStatus::Added,
            ('D', _) => FileStatus::DeletedStaged,
            ('R', _) => FileStatus::Renamed,
            ('C', _) => FileStatus::Copied,
            ('U', _) => FileStatus::UpdatedButUnmerged,
            (_, 'D') => FileStatus::Deleted,
            ('?', '?') => FileStatus::Untracked,
            ('!', '!') => FileStatus::Ignored,
            _ => FileStatus::Unmodified,
        }
    }
}

/// A single entry of a `StatusResult`.
#[derive(Debug, Clone)]
pub struct StatusEntry {
    pub path: PathBuf,
    pub status: FileStatus,
    pub original_path: Option<PathBuf>,
}

/// The result of `git status`.
#[derive(Debug, Clone)]
pub struct StatusResult {
    pub branch: Option<BranchName>,
    pub files: Vec<StatusEntry>,
    pub merging: bool,
    pub rebasing: bool,
    pub cherry_picking: bool,
    pub is_clean: bool,
}

/// A local or remote-tracking branch.
#[derive(Debug, Clone)]
pub struct Branch {
    pub name: BranchName,
    pub commit: ObjectId,
    pub is_head: bool,
    pub upstream: Option<String>,
}

/// A configured remote.
#[derive(Debug, Clone)]
pub struct RemoteInfo {
    pub name: String,
    pub url: GitUrl,
    pub fetch: Option<String>,
}

/// A tag as reported by the library's tag-listing convenience method
/// (distinct from the parsed annotated-tag object `Tag`).
#[derive(Debug, Clone)]
pub struct TagInfo {
    pub name: String,
    pub target: ObjectId,
    pub annotated: bool,
    pub message: Option<String>,
}

/// One slot of a `Repository::commits_info` result: the tree entry it was
/// resolved for and the commit that last touched it. Returned in the same
/// order as the entries passed in.
#[derive(Debug, Clone)]
pub struct CommitsInfoEntry {
    pub entry: TreeEntry,
    pub commit: Arc<Commit>,
}

/// One worktree from `git worktree list`.
#[derive(Debug, Clone)]
pub struct Worktree {
    pub path: PathBuf,
    pub head: ObjectId,
    pub branch: Option<String>,
    pub is_main: bool,
    pub is_bare: bool,
    pub is_prunable: bool,
}

/// One entry of `git config --list`.
#[derive(Debug, Clone)]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
    pub scope: ConfigScope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigScope {
    System,
    Global,
    Local,
    Worktree,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig() -> Signature {
        Signature::parse("Jane Doe <jane@example.com> 1700000000 +0000").unwrap()
    }

    #[test]
    fn commit_summary_is_first_line() {
        let commit = Commit::new(
            ObjectId::EMPTY,
            ObjectId::EMPTY,
            vec![],
            sig(),
            sig(),
            "Fix thing\n\nLonger body".to_string(),
            None,
        );
        assert_eq!(commit.summary(), "Fix thing");
    }

    #[test]
    fn submodule_map_not_cached_on_failure() {
        let commit = Commit::new(ObjectId::EMPTY, ObjectId::EMPTY, vec![], sig(), sig(), String::new(), None);
        let first = commit.submodules(|| Err(GitError::NotBlob));
        assert!(first.is_err());
        let second = commit.submodules(|| Ok(HashMap::new()));
        assert!(second.is_ok());
    }

    #[test]
    fn tree_entries_sort_dirs_first() {
        let tree = Tree::new(ObjectId::EMPTY);
        let entries = tree
            .entries(|| {
                Ok(vec![
                    TreeEntry::new(EntryMode::Blob, ObjectType::Blob, ObjectId::EMPTY, "zeta.txt".into()),
                    TreeEntry::new(EntryMode::Tree, ObjectType::Tree, ObjectId::EMPTY, "alpha".into()),
                ])
            })
            .unwrap();
        assert_eq!(entries[0].name, "alpha");
        assert_eq!(entries[1].name, "zeta.txt");
    }

    #[test]
    fn reference_type_from_prefix() {
        let r = Reference {
            refspec: "refs/tags/v1.0.0".to_string(),
            id: ObjectId::EMPTY,
        };
        assert_eq!(r.ref_type(), ReferenceType::Tag);
    }
}
