//! The repository aggregate: a path on disk plus the per-repository object
//! caches, and every operation this crate exposes over it.
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use crate::cache::ObjectCache;
use crate::concurrency;
use crate::error::GitError;
use crate::exec::{self, Deadline, RunSpec};
use crate::models::*;
use crate::parse::blame::parse_blame;
use crate::parse::diff::{parse_diff, DiffLimits};
use crate::parse::object::{parse_commit_body, parse_tag_body};
use crate::sha::ObjectId;
use crate::types::{BranchName, GitUrl, Remote, Result};

/// Options accepted by [`Repository::init`]. Default-constructed for the
/// common "just give me a repo" case, per spec.md §9's "options-as-variadic"
/// note.
#[derive(Debug, Clone, Copy, Default)]
pub struct InitOptions {
    pub bare: bool,
}

/// Options accepted by [`Repository::clone`].
#[derive(Debug, Clone, Default)]
pub struct CloneOptions {
    pub mirror: bool,
    pub bare: bool,
    pub quiet: bool,
    pub branch: Option<String>,
    pub depth: Option<u32>,
    /// Additional raw flags appended ahead of `<url> <path>`.
    pub extra: Vec<String>,
}

/// A local Git repository located at a specific path on disk.
#[derive(Clone)]
pub struct Repository {
    path: PathBuf,
    commits: Arc<ObjectCache<Commit>>,
    trees: Arc<ObjectCache<Tree>>,
    tags: Arc<ObjectCache<Tag>>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository").field("path", &self.path).finish()
    }
}

impl Repository {
    /// Points at an existing local repository. Does not verify the path is
    /// actually a git repository; operations fail later if it isn't.
    pub fn new<P: AsRef<Path>>(p: P) -> Repository {
        Repository {
            path: p.as_ref().to_path_buf(),
            commits: Arc::new(ObjectCache::new()),
            trees: Arc::new(ObjectCache::new()),
            tags: Arc::new(ObjectCache::new()),
        }
    }

    /// Alias kept for the teacher's naming of this constructor.
    pub fn open<P: AsRef<Path>>(p: P) -> Repository {
        Self::new(p)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Equivalent to `git init [--bare] <path>`, creating `path` first if it
    /// doesn't already exist.
    pub fn init<P: AsRef<Path>>(p: P, opts: InitOptions) -> Result<Repository> {
        let p_ref = p.as_ref();
        std::fs::create_dir_all(p_ref).map_err(|_| GitError::WorkingDirectoryInaccessible)?;
        let mut args = vec!["init".to_string()];
        if opts.bare {
            args.push("--bare".to_string());
        }
        run_at(p_ref, args)?;
        Ok(Repository::new(p_ref))
    }

    /// Equivalent to `git clone [flags] <url> <path>`, creating `path`'s
    /// parent directory first if it doesn't already exist.
    pub fn clone<P: AsRef<Path>>(url: &GitUrl, p: P, opts: CloneOptions) -> Result<Repository> {
        let p_ref = p.as_ref();
        if let Some(parent) = p_ref.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|_| GitError::WorkingDirectoryInaccessible)?;
            }
        }
        let cwd = std::env::current_dir().map_err(|_| GitError::WorkingDirectoryInaccessible)?;
        let mut args = vec!["clone".to_string()];
        if opts.mirror {
            args.push("--mirror".to_string());
        }
        if opts.bare {
            args.push("--bare".to_string());
        }
        if opts.quiet {
            args.push("--quiet".to_string());
        }
        if let Some(branch) = &opts.branch {
            args.push("--branch".to_string());
            args.push(branch.clone());
        }
        if let Some(depth) = opts.depth {
            args.push(format!("--depth={depth}"));
        }
        args.extend(opts.extra.iter().cloned());
        args.push(url.as_ref().to_string());
        args.push(path_str(p_ref)?.to_string());
        run_at(&cwd, args)?;
        Ok(Repository::new(p_ref))
    }

    fn run<I, S>(&self, args: I) -> Result<exec::Collected>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let spec = RunSpec::new(&self.path, args);
        let collected = exec::run_collect(&spec)?;
        Ok(collected)
    }

    fn run_ok<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let collected = self.run(args.clone())?;
        if collected.status.success() {
            String::from_utf8(collected.stdout).map_err(|_| GitError::Undecodable)
        } else {
            let stderr = String::from_utf8_lossy(&collected.stderr);
            if exec::is_commit_noop(&args, collected.status.code(), &stderr) {
                return Ok(String::new());
            }
            Err(exec::classify_failure(&args, collected.status.code(), &stderr))
        }
    }

    /// Like [`Repository::run_ok`], but for commands whose final argument is
    /// a caller-supplied ref/path: `flags` is the fixed subcommand/option
    /// list, `trailing` the positional value(s) that follow
    /// `--end-of-options` so they can never be misread as flags.
    fn run_ok_eoo<I, S>(&self, flags: I, trailing: &[String]) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut spec = RunSpec::new(&self.path, flags).end_of_options();
        spec.args.extend(trailing.iter().cloned());
        let collected = exec::run_collect(&spec)?;
        if collected.status.success() {
            String::from_utf8(collected.stdout).map_err(|_| GitError::Undecodable)
        } else {
            let stderr = String::from_utf8_lossy(&collected.stderr);
            if exec::is_commit_noop(&spec.args, collected.status.code(), &stderr) {
                return Ok(String::new());
            }
            Err(exec::classify_failure(&spec.args, collected.status.code(), &stderr))
        }
    }

    // ---- Lifecycle / working tree -----------------------------------

    pub fn fetch(&self, remote: &Remote) -> Result<()> {
        self.run_ok_eoo(["fetch".to_string()], &[remote.to_string()])
            .map(|_| ())
    }

    pub fn pull(&self) -> Result<()> {
        self.run_ok(["pull".to_string()]).map(|_| ())
    }

    pub fn push(&self) -> Result<()> {
        self.run_ok(["push".to_string()]).map(|_| ())
    }

    pub fn push_to_upstream(&self, remote: &Remote, branch: &BranchName) -> Result<()> {
        self.run_ok_eoo(
            ["push".to_string(), "-u".to_string()],
            &[remote.to_string(), branch.to_string()],
        )
        .map(|_| ())
    }

    pub fn checkout(&self, revision: &str) -> Result<()> {
        self.run_ok_eoo(["checkout".to_string()], &[revision.to_string()])
            .map(|_| ())
    }

    pub fn create_local_branch(&self, name: &BranchName) -> Result<()> {
        self.run_ok_eoo(["checkout".to_string(), "-b".to_string()], &[name.to_string()])
            .map(|_| ())
    }

    pub fn create_branch_from_startpoint(&self, name: &BranchName, startpoint: &str) -> Result<()> {
        self.run_ok_eoo(
            ["checkout".to_string(), "-b".to_string()],
            &[name.to_string(), startpoint.to_string()],
        )
        .map(|_| ())
    }

    pub fn reset(&self, revision: &str, hard: bool) -> Result<()> {
        let mut flags = vec!["reset".to_string()];
        if hard {
            flags.push("--hard".to_string());
        }
        self.run_ok_eoo(flags, &[revision.to_string()]).map(|_| ())
    }

    pub fn add<S: AsRef<str>>(&self, pathspecs: &[S]) -> Result<()> {
        let trailing: Vec<String> = pathspecs.iter().map(|s| s.as_ref().to_string()).collect();
        self.run_ok_eoo(["add".to_string()], &trailing).map(|_| ())
    }

    pub fn remove<S: AsRef<str>>(&self, pathspecs: &[S], force: bool) -> Result<()> {
        let mut flags = vec!["rm".to_string()];
        if force {
            flags.push("-f".to_string());
        }
        let trailing: Vec<String> = pathspecs.iter().map(|s| s.as_ref().to_string()).collect();
        self.run_ok_eoo(flags, &trailing).map(|_| ())
    }

    pub fn mv(&self, from: &str, to: &str) -> Result<()> {
        self.run_ok_eoo(["mv".to_string()], &[from.to_string(), to.to_string()])
            .map(|_| ())
    }

    /// Equivalent to `git commit -am <message>`, attributing the commit to
    /// `author` when given (`--author="<name> <email>"` plus
    /// `GIT_COMMITTER_NAME`/`GIT_COMMITTER_EMAIL`). A clean tree (exit 1, no
    /// stderr) is treated as success, not an error.
    pub fn stage_and_commit_all_modified(&self, message: &str, author: Option<&CommitAuthor>) -> Result<()> {
        self.run_commit(["commit".to_string(), "-am".to_string()], message, author)
    }

    /// Equivalent to `git commit -m <message>`. See
    /// [`Repository::stage_and_commit_all_modified`] for `author` semantics.
    pub fn commit_staged(&self, message: &str, author: Option<&CommitAuthor>) -> Result<()> {
        self.run_commit(["commit".to_string(), "-m".to_string()], message, author)
    }

    fn run_commit(&self, flags: Vec<String>, message: &str, author: Option<&CommitAuthor>) -> Result<()> {
        let mut spec = RunSpec::new(&self.path, flags).end_of_options();
        spec.args.push(message.to_string());
        if let Some(author) = author {
            spec.args.push(format!("--author={} <{}>", author.name, author.email));
            spec = spec
                .with_env("GIT_COMMITTER_NAME", author.name.clone())
                .with_env("GIT_COMMITTER_EMAIL", author.email.clone());
        }
        let collected = exec::run_collect(&spec)?;
        if collected.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&collected.stderr);
        if exec::is_commit_noop(&spec.args, collected.status.code(), &stderr) {
            return Ok(());
        }
        Err(exec::classify_failure(&spec.args, collected.status.code(), &stderr))
    }

    // ---- Revision resolution -----------------------------------------

    /// Equivalent to `git rev-parse <revision>`, mapping exit 128 to
    /// `RevisionNotExist`.
    pub fn rev_parse(&self, revision: &str) -> Result<ObjectId> {
        let out = self.run_ok_eoo(["rev-parse".to_string()], &[revision.to_string()])?;
        out.trim().parse()
    }

    /// Equivalent to `git show-ref --verify <refspec>`.
    pub fn show_ref_verify(&self, refspec: &str) -> Result<ObjectId> {
        let out = self.run_ok_eoo(
            ["show-ref".to_string(), "--verify".to_string()],
            &[refspec.to_string()],
        )?;
        let id_str = out.split_whitespace().next().ok_or(GitError::ReferenceNotExist)?;
        id_str.parse()
    }

    pub fn has_reference(&self, refspec: &str) -> bool {
        self.show_ref_verify(refspec).is_ok()
    }

    // ---- History -------------------------------------------------------

    /// Equivalent to `git cat-file commit <id>`, result cached in this
    /// repository's commit object cache.
    pub fn cat_file_commit(&self, id: ObjectId) -> Result<Arc<Commit>> {
        if let Some(cached) = self.commits.get(&id.to_string()) {
            return Ok(cached);
        }
        let spec = RunSpec::new(&self.path, ["cat-file".to_string(), "commit".to_string(), id.to_string()]);
        let collected = exec::run_collect(&spec)?;
        if !collected.status.success() {
            let stderr = String::from_utf8_lossy(&collected.stderr);
            return Err(exec::classify_failure(&spec.args, collected.status.code(), &stderr));
        }
        let commit = parse_commit_body(id, &collected.stdout)?;
        Ok(self.commits.get_or_insert_with(&id.to_string(), || commit))
    }

    /// Equivalent to `git log --format=%H <revision-range>`.
    pub fn log(&self, revision_range: &str) -> Result<Vec<Arc<Commit>>> {
        let out = self.run_ok_eoo(
            ["log".to_string(), "--format=%H".to_string()],
            &[revision_range.to_string()],
        )?;
        out.lines()
            .filter(|l| !l.is_empty())
            .map(|l| l.parse::<ObjectId>())
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .map(|id| self.cat_file_commit(id))
            .collect()
    }

    pub fn rev_list(&self, revision_range: &str) -> Result<Vec<ObjectId>> {
        let out = self.run_ok_eoo(["rev-list".to_string()], &[revision_range.to_string()])?;
        out.lines().filter(|l| !l.is_empty()).map(|l| l.parse()).collect()
    }

    pub fn rev_list_count(&self, revision_range: &str) -> Result<usize> {
        let out = self.run_ok_eoo(
            ["rev-list".to_string(), "--count".to_string()],
            &[revision_range.to_string()],
        )?;
        out.trim()
            .parse()
            .map_err(|_| GitError::ParseError(format!("bad rev-list --count output: {out}")))
    }

    pub fn diff_name_only(&self, revision_range: &str) -> Result<Vec<PathBuf>> {
        let out = self.run_ok_eoo(
            ["diff".to_string(), "--name-only".to_string()],
            &[revision_range.to_string()],
        )?;
        Ok(out.lines().filter(|l| !l.is_empty()).map(PathBuf::from).collect())
    }

    pub fn commits_by_page(&self, revision: &str, page: usize, per_page: usize) -> Result<Vec<Arc<Commit>>> {
        let skip = page.saturating_mul(per_page);
        let out = self.run_ok_eoo(
            [
                "log".to_string(),
                "--format=%H".to_string(),
                format!("--skip={skip}"),
                format!("--max-count={per_page}"),
            ],
            &[revision.to_string()],
        )?;
        out.lines()
            .filter(|l| !l.is_empty())
            .map(|l| l.parse::<ObjectId>())
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .map(|id| self.cat_file_commit(id))
            .collect()
    }

    pub fn commits_since(&self, revision: &str, since: &str) -> Result<Vec<Arc<Commit>>> {
        let out = self.run_ok_eoo(
            ["log".to_string(), "--format=%H".to_string(), format!("--since={since}")],
            &[revision.to_string()],
        )?;
        out.lines()
            .filter(|l| !l.is_empty())
            .map(|l| l.parse::<ObjectId>())
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .map(|id| self.cat_file_commit(id))
            .collect()
    }

    pub fn commits_after(&self, revision: &str, after: ObjectId) -> Result<Vec<Arc<Commit>>> {
        self.log(&format!("{after}..{revision}"))
    }

    pub fn search_commits(&self, revision: &str, pattern: &str) -> Result<Vec<Arc<Commit>>> {
        let out = self.run_ok_eoo(
            ["log".to_string(), "--format=%H".to_string(), format!("--grep={pattern}")],
            &[revision.to_string()],
        )?;
        out.lines()
            .filter(|l| !l.is_empty())
            .map(|l| l.parse::<ObjectId>())
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .map(|id| self.cat_file_commit(id))
            .collect()
    }

    pub fn ancestors(&self, descendant: ObjectId, ancestor: ObjectId) -> Result<bool> {
        let args = [
            "merge-base".to_string(),
            "--is-ancestor".to_string(),
            ancestor.to_string(),
            descendant.to_string(),
        ];
        let collected = self.run(args)?;
        Ok(collected.status.success())
    }

    pub fn latest_commit_time(&self, revision: &str) -> Result<i64> {
        let out = self.run_ok_eoo(
            ["log".to_string(), "-1".to_string(), "--format=%ct".to_string()],
            &[revision.to_string()],
        )?;
        out.trim()
            .parse()
            .map_err(|_| GitError::ParseError(format!("bad commit timestamp: {out}")))
    }

    pub fn merge_base(&self, a: ObjectId, b: ObjectId) -> Result<ObjectId> {
        let args = ["merge-base".to_string(), a.to_string(), b.to_string()];
        let out = self.run_ok(args)?;
        out.trim().parse()
    }

    pub fn show_name_status(&self, revision: &str) -> Result<Vec<(String, PathBuf)>> {
        let out = self.run_ok_eoo(
            ["show".to_string(), "--name-status".to_string(), "--format=".to_string()],
            &[revision.to_string()],
        )?;
        Ok(out
            .lines()
            .filter(|l| !l.is_empty())
            .filter_map(|line| {
                let mut parts = line.splitn(2, '\t');
                let status = parts.next()?.to_string();
                let path = PathBuf::from(parts.next()?);
                Some((status, path))
            })
            .collect())
    }

    // ---- Tree / blob reads ---------------------------------------------

    /// Equivalent to `git ls-tree <id>`. The returned `Tree`'s entries are
    /// pre-populated (not lazily loaded) since this call already has them.
    pub fn ls_tree(&self, id: ObjectId) -> Result<Arc<Tree>> {
        if let Some(cached) = self.trees.get(&id.to_string()) {
            return Ok(cached);
        }
        let out = self.run_ok(["ls-tree".to_string(), id.to_string()])?;
        let parsed = parse_ls_tree(&out)?;
        let tree = Tree::new(id);
        let _ = tree.entries(|| Ok(parsed));
        Ok(self.trees.get_or_insert_with(&id.to_string(), || tree))
    }

    pub fn tree_entry(&self, tree_id: ObjectId, name: &str) -> Result<TreeEntry> {
        let tree = self.ls_tree(tree_id)?;
        tree.entries(|| Ok(Vec::new()))?
            .iter()
            .find(|e| e.name == name)
            .cloned()
            .ok_or(GitError::NotExist(PathBuf::from(name)))
    }

    pub fn cat_file_blob(&self, id: ObjectId) -> Result<Blob> {
        let spec = RunSpec::new(&self.path, ["cat-file".to_string(), "blob".to_string(), id.to_string()]);
        let collected = exec::run_collect(&spec)?;
        if !collected.status.success() {
            let stderr = String::from_utf8_lossy(&collected.stderr);
            return Err(exec::classify_failure(&spec.args, collected.status.code(), &stderr));
        }
        Ok(Blob {
            id,
            bytes: collected.stdout,
        })
    }

    pub fn blob_bytes(&self, entry: &TreeEntry) -> Result<Vec<u8>> {
        if !matches!(entry.mode, EntryMode::Blob | EntryMode::Executable | EntryMode::Symlink) {
            return Err(GitError::NotBlob);
        }
        Ok(self.cat_file_blob(entry.id)?.bytes)
    }

    // ---- Diff / blame ---------------------------------------------------

    pub fn diff(&self, revision_range: &str, limits: DiffLimits) -> Result<Diff> {
        let out = self.run_ok_eoo(["diff".to_string()], &[revision_range.to_string()])?;
        Ok(parse_diff(&out, limits))
    }

    pub fn blame(&self, revision: &str, path: &str) -> Result<Blame> {
        let spec = RunSpec::new(
            &self.path,
            [
                "blame".to_string(),
                "--porcelain".to_string(),
                revision.to_string(),
                "--".to_string(),
                path.to_string(),
            ],
        );
        let collected = exec::run_collect(&spec)?;
        if !collected.status.success() {
            let stderr = String::from_utf8_lossy(&collected.stderr);
            return Err(exec::classify_failure(&spec.args, collected.status.code(), &stderr));
        }
        parse_blame(&collected.stdout)
    }

    // ---- Tags ------------------------------------------------------------

    pub fn tag(&self, name: &str) -> Result<Arc<Tag>> {
        let id = self.show_ref_verify(&format!("refs/tags/{name}"))?;
        if let Some(cached) = self.tags.get(&id.to_string()) {
            return Ok(cached);
        }
        let probe = RunSpec::new(&self.path, ["cat-file".to_string(), "-t".to_string(), id.to_string()]);
        let probed = exec::run_collect(&probe)?;
        if !probed.status.success() {
            let stderr = String::from_utf8_lossy(&probed.stderr);
            return Err(exec::classify_failure(&probe.args, probed.status.code(), &stderr));
        }
        let kind = String::from_utf8_lossy(&probed.stdout).trim().to_string();
        // A lightweight tag's ref points straight at a commit: there is no
        // tag object to read, so wrap the commit id directly.
        let tag = if kind == "commit" {
            Tag {
                object_type: ObjectType::Commit,
                id,
                target_id: id,
                name: name.to_string(),
                tagger: None,
                message: String::new(),
            }
        } else {
            let spec = RunSpec::new(&self.path, ["cat-file".to_string(), "-p".to_string(), id.to_string()]);
            let collected = exec::run_collect(&spec)?;
            if !collected.status.success() {
                let stderr = String::from_utf8_lossy(&collected.stderr);
                return Err(exec::classify_failure(&spec.args, collected.status.code(), &stderr));
            }
            let mut tag = parse_tag_body(id, &collected.stdout)?;
            // `object_type` describes the ref itself (annotated tag object),
            // not the `type` header inside the object, which names what the
            // tag points at.
            tag.object_type = ObjectType::Tag;
            tag
        };
        Ok(self.tags.get_or_insert_with(&id.to_string(), || tag))
    }

    pub fn tags(&self) -> Result<Vec<TagInfo>> {
        const SORT_SINCE: exec::GitVersion = exec::GitVersion { major: 2, minor: 4, patch: 9 };
        let sort_by_creatordate = exec::git_version(&self.path)
            .map(|v| v >= SORT_SINCE)
            .unwrap_or(false);

        let mut args = vec![
            "for-each-ref".to_string(),
            "--format=%(refname:short) %(objectname) %(objecttype)".to_string(),
        ];
        if sort_by_creatordate {
            args.push("--sort=-creatordate".to_string());
        }
        args.push("refs/tags".to_string());

        let out = self.run_ok(args)?;
        let mut tags: Vec<TagInfo> = out
            .lines()
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                let name = parts.next()?.to_string();
                let target: ObjectId = parts.next()?.parse().ok()?;
                let annotated = parts.next() == Some("tag");
                Some(TagInfo {
                    name,
                    target,
                    annotated,
                    message: None,
                })
            })
            .collect();

        // Older Git can't sort by creation date server-side: fall back to a
        // version-number sort of the tag names, then reverse to newest-first.
        if !sort_by_creatordate {
            tags.sort_by(|a, b| version_sort_key(&a.name).cmp(&version_sort_key(&b.name)));
            tags.reverse();
        }

        Ok(tags)
    }

    // ---- Remotes -----------------------------------------------------------

    pub fn ls_remote(&self, remote: &Remote) -> Result<Vec<(ObjectId, String)>> {
        let out = self.run_ok(["ls-remote".to_string(), remote.to_string()])?;
        out.lines()
            .filter(|l| !l.is_empty())
            .map(|line| {
                let mut parts = line.splitn(2, '\t');
                let id: ObjectId = parts.next().unwrap_or("").parse()?;
                let refname = parts.next().unwrap_or("").to_string();
                Ok((id, refname))
            })
            .collect()
    }

    pub fn remote_add(&self, name: &Remote, url: &GitUrl) -> Result<()> {
        self.run_ok(["remote".to_string(), "add".to_string(), name.to_string(), url.to_string()])
            .map(|_| ())
    }

    pub fn remote_remove(&self, name: &Remote) -> Result<()> {
        self.run_ok(["remote".to_string(), "remove".to_string(), name.to_string()])
            .map(|_| ())
    }

    pub fn remotes(&self) -> Result<Vec<Remote>> {
        let out = self.run_ok(["remote".to_string()])?;
        let names: Vec<&str> = out.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        if names.is_empty() {
            let config = self.run_ok([
                "config".to_string(),
                "--get-regexp".to_string(),
                r"^remote\..*\.url".to_string(),
            ]);
            return match config {
                Ok(text) if text.trim().is_empty() => Err(GitError::NoRemoteRepositorySet),
                Ok(_) => Ok(Vec::new()),
                Err(e) => Err(e),
            };
        }
        names.into_iter().map(Remote::from_str).collect()
    }

    pub fn remote_get_url(&self, name: &Remote) -> Result<GitUrl> {
        let out = self.run_ok(["config".to_string(), "--get".to_string(), format!("remote.{name}.url")])?;
        GitUrl::from_str(out.trim())
    }

    pub fn remote_set_url(&self, name: &Remote, url: &GitUrl) -> Result<()> {
        self.run_ok(["remote".to_string(), "set-url".to_string(), name.to_string(), url.to_string()])
            .map(|_| ())
    }

    pub fn remote_set_url_add(&self, name: &Remote, url: &GitUrl) -> Result<()> {
        self.run_ok([
            "remote".to_string(),
            "set-url".to_string(),
            "--add".to_string(),
            name.to_string(),
            url.to_string(),
        ])
        .map(|_| ())
    }

    pub fn remote_set_url_delete(&self, name: &Remote, url_pattern: &str) -> Result<()> {
        self.run_ok([
            "remote".to_string(),
            "set-url".to_string(),
            "--delete".to_string(),
            name.to_string(),
            url_pattern.to_string(),
        ])
        .map(|_| ())
    }

    // ---- References --------------------------------------------------------

    pub fn show_ref(&self) -> Result<Vec<Reference>> {
        let out = self.run_ok(["show-ref".to_string()])?;
        out.lines()
            .filter(|l| !l.is_empty())
            .map(|line| {
                let mut parts = line.split_whitespace();
                let id: ObjectId = parts.next().unwrap_or("").parse()?;
                let refspec = parts.next().unwrap_or("").to_string();
                Ok(Reference { refspec, id })
            })
            .collect()
    }

    pub fn branches(&self) -> Result<Vec<Branch>> {
        let out = self.run_ok([
            "branch".to_string(),
            "--list".to_string(),
            "--format=%(refname:short) %(objectname) %(HEAD) %(upstream:short)".to_string(),
        ])?;
        Ok(out
            .lines()
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                let name = BranchName::from_str(parts.next()?).ok()?;
                let commit: ObjectId = parts.next()?.parse().ok()?;
                let is_head = parts.next() == Some("*");
                let upstream = parts.next().map(str::to_string);
                Some(Branch {
                    name,
                    commit,
                    is_head,
                    upstream,
                })
            })
            .collect())
    }

    pub fn delete_branch(&self, name: &BranchName, force: bool) -> Result<()> {
        let flag = if force { "-D" } else { "-d" };
        self.run_ok(["branch".to_string(), flag.to_string(), name.to_string()])
            .map(|_| ())
    }

    pub fn list_branches(&self) -> Result<Vec<BranchName>> {
        Ok(self.branches()?.into_iter().map(|b| b.name).collect())
    }

    // ---- Worktrees ----------------------------------------------------------

    pub fn worktree_add<P: AsRef<Path>>(&self, path: P, revision: &str) -> Result<()> {
        self.run_ok(["worktree".to_string(), "add".to_string(), path_str(path.as_ref())?.to_string(), revision.to_string()])
            .map(|_| ())
    }

    pub fn worktree_remove<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.run_ok(["worktree".to_string(), "remove".to_string(), path_str(path.as_ref())?.to_string()])
            .map(|_| ())
    }

    pub fn worktrees(&self) -> Result<Vec<Worktree>> {
        let out = self.run_ok(["worktree".to_string(), "list".to_string(), "--porcelain".to_string()])?;
        Ok(parse_worktree_porcelain(&out))
    }

    // ---- Archives -------------------------------------------------------------

    /// Streams `git archive <id>` into `writer` without buffering the whole
    /// archive in memory.
    pub fn archive<W: Write>(&self, id: ObjectId, format: &str, writer: W) -> Result<()> {
        let spec = RunSpec::new(&self.path, ["archive".to_string(), format!("--format={format}"), id.to_string()]);
        let status = exec::run_stream(&spec, writer)?;
        if status.success() {
            Ok(())
        } else {
            Err(GitError::GitError {
                stdout: String::new(),
                stderr: format!("git archive exited with {:?}", status.code()),
            })
        }
    }

    // ---- Submodules -----------------------------------------------------------

    /// Parses `.gitmodules` as it exists in `commit`'s tree into a name/URL
    /// map, resolving each submodule's pinned commit lazily.
    pub fn submodules_at(&self, commit: &Commit) -> Result<HashMap<String, Submodule>> {
        let tree = self.ls_tree(commit.tree_id)?;
        let entry = tree
            .entries(|| Ok(Vec::new()))?
            .iter()
            .find(|e| e.name == ".gitmodules");
        let Some(entry) = entry else {
            return Ok(HashMap::new());
        };
        let bytes = self.blob_bytes(entry)?;
        let text = String::from_utf8(bytes).map_err(|_| GitError::Undecodable)?;
        parse_gitmodules(&text)
    }

    // ---- Hooks --------------------------------------------------------------------

    fn hooks_dir(&self) -> PathBuf {
        self.path.join(".git").join("hooks")
    }

    pub fn hook(&self, name: HookName) -> Result<Hook> {
        let real = self.hooks_dir().join(name.as_str());
        let sample = self.hooks_dir().join(format!("{}.sample", name.as_str()));
        let (path, is_sample) = if real.exists() {
            (real, false)
        } else {
            (sample, true)
        };
        let content = std::fs::read_to_string(&path).ok();
        Ok(Hook {
            name,
            path,
            is_sample,
            content,
        })
    }

    pub fn hooks(&self) -> Result<Vec<Hook>> {
        [HookName::PreReceive, HookName::Update, HookName::PostReceive]
            .into_iter()
            .map(|name| self.hook(name))
            .collect()
    }

    pub fn hook_update(&self, name: HookName, content: &str) -> Result<()> {
        let path = self.hooks_dir().join(name.as_str());
        std::fs::create_dir_all(self.hooks_dir()).map_err(|_| GitError::WorkingDirectoryInaccessible)?;
        std::fs::write(&path, content).map_err(|_| GitError::WorkingDirectoryInaccessible)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(meta) = std::fs::metadata(&path) {
                let mut perms = meta.permissions();
                perms.set_mode(perms.mode() | 0o111);
                let _ = std::fs::set_permissions(&path, perms);
            }
        }
        Ok(())
    }

    // ---- Bounded fan-out --------------------------------------------------------

    /// Resolves, for each entry name in `tree_id`, the most recent commit
    /// that last modified it, using up to `max_concurrency` (never fewer
    /// than the host's CPU count) workers at once.
    pub fn commits_info(
        &self,
        tree_id: ObjectId,
        revision: &str,
        max_concurrency: usize,
    ) -> Result<Vec<CommitsInfoEntry>> {
        let tree = self.ls_tree(tree_id)?;
        let entries: Vec<TreeEntry> = tree.entries(|| Ok(Vec::new()))?.to_vec();
        let names: Vec<String> = entries.iter().map(|e| e.name.clone()).collect();

        let repo = self.clone();
        let revision = revision.to_string();
        let commits = concurrency::commits_info(names, max_concurrency, move |name| {
            let out = repo.run_ok([
                "log".to_string(),
                "-1".to_string(),
                "--format=%H".to_string(),
                revision.clone(),
                "--".to_string(),
                name.to_string(),
            ])?;
            let id: ObjectId = out
                .trim()
                .parse()
                .map_err(|_| GitError::ParseError(format!("no history for {name}")))?;
            repo.cat_file_commit(id).map(|c| (*c).clone())
        })?;

        let mut out = Vec::with_capacity(entries.len());
        for (entry, commit) in entries.into_iter().zip(commits.into_iter()) {
            if entry.mode == EntryMode::Commit {
                self.resolve_gitlink_submodule(&commit, &entry.name);
            }
            out.push(CommitsInfoEntry { entry, commit });
        }
        Ok(out)
    }

    /// For a gitlink tree entry, materialises the pinned subproject commit
    /// into `commit`'s lazy submodule map, per spec.md §4.6's "if the
    /// entry is a submodule, additionally call `commit.Submodule(entryPath)`".
    /// Best-effort: a `.gitmodules` parse failure or missing entry is
    /// swallowed, matching the submodule map's own not-cached-on-failure
    /// contract.
    fn resolve_gitlink_submodule(&self, commit: &Arc<Commit>, entry_path: &str) {
        let repo = self.clone();
        let commit_for_parse = commit.clone();
        let Ok(submodules) = commit.submodules(move || repo.submodules_at(&commit_for_parse)) else {
            return;
        };
        if let Some(submodule) = submodules.get(entry_path) {
            let repo = self.clone();
            let commit_id = commit.id;
            let path = entry_path.to_string();
            let _ = submodule.commit(move || repo.rev_parse(&format!("{commit_id}:{path}")));
        }
    }

    // ---- Status / config (kept ambient verbs) --------------------------------------

    pub fn status(&self) -> Result<StatusResult> {
        let out = self.run_ok(["status".to_string(), "--porcelain=v2".to_string(), "--branch".to_string()])?;
        parse_status(&out, &self.path)
    }

    pub fn list_tracked(&self) -> Result<Vec<String>> {
        let out = self.run_ok(["ls-files".to_string()])?;
        Ok(out.lines().map(str::to_string).collect())
    }

    pub fn config_get(&self, key: &str) -> Result<Option<String>> {
        match self.run_ok(["config".to_string(), "--get".to_string(), key.to_string()]) {
            Ok(out) => Ok(Some(out.trim().to_string())),
            Err(GitError::GitError { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn config_set(&self, key: &str, value: &str) -> Result<()> {
        self.run_ok(["config".to_string(), key.to_string(), value.to_string()])
            .map(|_| ())
    }

    pub fn config_list(&self) -> Result<Vec<ConfigEntry>> {
        let out = self.run_ok(["config".to_string(), "--list".to_string(), "--show-scope".to_string()])?;
        Ok(out
            .lines()
            .filter_map(|line| {
                let (scope_str, rest) = line.split_once('\t')?;
                let (key, value) = rest.split_once('=')?;
                let scope = match scope_str {
                    "system" => ConfigScope::System,
                    "global" => ConfigScope::Global,
                    "worktree" => ConfigScope::Worktree,
                    _ => ConfigScope::Local,
                };
                Some(ConfigEntry {
                    key: key.to_string(),
                    value: value.to_string(),
                    scope,
                })
            })
            .collect())
    }

    // ---- Generic escape hatches, kept from the convenience layer ------------------

    pub fn cmd<I, S>(&self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.run_ok(args).map(|_| ())
    }

    pub fn cmd_out<I, S>(&self, args: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(self.run_ok(args)?.lines().map(str::to_string).collect())
    }
}

// --- Rebase / cherry-pick, kept ambient verbs ---

impl Repository {
    pub fn rebase(&self, target: &str) -> Result<()> {
        self.run_ok(["rebase".to_string(), target.to_string()]).map(|_| ())
    }

    pub fn rebase_continue(&self) -> Result<()> {
        self.run_ok(["rebase".to_string(), "--continue".to_string()]).map(|_| ())
    }

    pub fn rebase_abort(&self) -> Result<()> {
        self.run_ok(["rebase".to_string(), "--abort".to_string()]).map(|_| ())
    }

    pub fn cherry_pick(&self, commits: &[ObjectId]) -> Result<()> {
        let mut args = vec!["cherry-pick".to_string()];
        args.extend(commits.iter().map(ObjectId::to_string));
        self.run_ok(args).map(|_| ())
    }

    pub fn cherry_pick_continue(&self) -> Result<()> {
        self.run_ok(["cherry-pick".to_string(), "--continue".to_string()]).map(|_| ())
    }

    pub fn cherry_pick_abort(&self) -> Result<()> {
        self.run_ok(["cherry-pick".to_string(), "--abort".to_string()]).map(|_| ())
    }

    /// Deprecated-alias-shaped convenience wrapper: resolves `branch` to a
    /// commit via `rev_parse` + `cat_file_commit`. Not part of THE CORE
    /// (spec.md §1 explicitly scopes surface wrappers that delegate to one
    /// core operation out of scope) but kept as the teacher's own
    /// `BranchCommit` was kept.
    pub fn branch_commit(&self, branch: &BranchName) -> Result<Arc<Commit>> {
        let id = self.rev_parse(branch.as_ref())?;
        self.cat_file_commit(id)
    }

    /// Deprecated-alias-shaped convenience wrapper: resolves `tag` to a
    /// commit via `rev_parse` + `cat_file_commit`. See [`Repository::branch_commit`].
    pub fn tag_commit(&self, tag: &str) -> Result<Arc<Commit>> {
        let id = self.rev_parse(tag)?;
        self.cat_file_commit(id)
    }
}

fn run_at<I, S>(dir: &Path, args: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let args: Vec<String> = args.into_iter().map(Into::into).collect();
    let spec = RunSpec::new(dir, args.clone()).with_deadline(Deadline::default());
    let collected = exec::run_collect(&spec)?;
    if collected.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&collected.stderr);
        Err(exec::classify_failure(&args, collected.status.code(), &stderr))
    }
}

fn path_str(p: &Path) -> Result<&str> {
    p.to_str().ok_or_else(|| GitError::PathEncodingError(p.to_path_buf()))
}

/// Extracts the digit runs out of a tag name (`"v1.10.2"` -> `[1, 10, 2]`)
/// so tags can be ordered numerically rather than lexicographically when
/// the Git binary is too old to sort by creation date itself.
fn version_sort_key(name: &str) -> Vec<u64> {
    name.split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u64>().unwrap_or(0))
        .collect()
}

fn parse_ls_tree(output: &str) -> Result<Vec<TreeEntry>> {
    output
        .lines()
        .filter(|l| !l.is_empty())
        .map(|line| {
            let (meta, name) = line.split_once('\t').ok_or_else(|| {
                GitError::ParseError(format!("malformed ls-tree line: {line}"))
            })?;
            let mut parts = meta.split_whitespace();
            let mode = EntryMode::parse(parts.next().unwrap_or(""))?;
            let object_type = parts.next().unwrap_or("").parse::<ObjectType>()?;
            let id: ObjectId = parts.next().unwrap_or("").parse()?;
            Ok(TreeEntry::new(mode, object_type, id, name.to_string()))
        })
        .collect()
}

fn parse_worktree_porcelain(output: &str) -> Vec<Worktree> {
    let mut worktrees = Vec::new();
    let mut path = None;
    let mut head = None;
    let mut branch = None;
    let mut is_bare = false;
    let mut is_prunable = false;

    let flush = |path: &mut Option<PathBuf>,
                 head: &mut Option<ObjectId>,
                 branch: &mut Option<String>,
                 is_bare: &mut bool,
                 is_prunable: &mut bool,
                 out: &mut Vec<Worktree>| {
        if let (Some(p), Some(h)) = (path.take(), head.take()) {
            out.push(Worktree {
                is_main: out.is_empty(),
                path: p,
                head: h,
                branch: branch.take(),
                is_bare: *is_bare,
                is_prunable: *is_prunable,
            });
        }
        *is_bare = false;
        *is_prunable = false;
    };

    for line in output.lines() {
        if line.is_empty() {
            flush(&mut path, &mut head, &mut branch, &mut is_bare, &mut is_prunable, &mut worktrees);
            continue;
        }
        if let Some(rest) = line.strip_prefix("worktree ") {
            path = Some(PathBuf::from(rest));
        } else if let Some(rest) = line.strip_prefix("HEAD ") {
            head = rest.parse().ok();
        } else if let Some(rest) = line.strip_prefix("branch ") {
            branch = Some(rest.to_string());
        } else if line == "bare" {
            is_bare = true;
        } else if line.starts_with("prunable") {
            is_prunable = true;
        }
    }
    flush(&mut path, &mut head, &mut branch, &mut is_bare, &mut is_prunable, &mut worktrees);
    worktrees
}

/// Minimal INI-style parser for `.gitmodules`: `[submodule "name"]` blocks
/// with `path` and `url` keys.
fn parse_gitmodules(text: &str) -> Result<HashMap<String, Submodule>> {
    let mut map = HashMap::new();
    let mut current_path: Option<String> = None;
    let mut current_url: Option<String> = None;

    let flush = |path: &mut Option<String>, url: &mut Option<String>, map: &mut HashMap<String, Submodule>| {
        if let (Some(p), Some(u)) = (path.take(), url.take()) {
            if let Ok(git_url) = GitUrl::from_str(&u) {
                map.insert(p.clone(), Submodule::new(p, git_url));
            }
        }
    };

    for line in text.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            flush(&mut current_path, &mut current_url, &mut map);
            continue;
        }
        if let Some(rest) = line.strip_prefix("path") {
            if let Some(v) = rest.trim_start().strip_prefix('=') {
                current_path = Some(v.trim().to_string());
            }
        } else if let Some(rest) = line.strip_prefix("url") {
            if let Some(v) = rest.trim_start().strip_prefix('=') {
                current_url = Some(v.trim().to_string());
            }
        }
    }
    flush(&mut current_path, &mut current_url, &mut map);
    Ok(map)
}

fn parse_status(porcelain: &str, repo_path: &Path) -> Result<StatusResult> {
    let mut branch_name_str = None;
    let mut files = Vec::new();

    for line in porcelain.lines() {
        if let Some(rest) = line.strip_prefix("# branch.head ") {
            branch_name_str = Some(rest.to_string());
        } else if line.starts_with("1 ") || line.starts_with("2 ") || line.starts_with("u ") {
            let parts: Vec<&str> = line.split(' ').collect();
            if parts.len() >= 2 {
                let xy = parts[1];
                let mut chars = xy.chars();
                let (x, y) = (chars.next().unwrap_or(' '), chars.next().unwrap_or(' '));
                let status = FileStatus::from_porcelain_code(x, y);
                let path_part = line.split('\t').next().unwrap_or(line);
                if let Some(path_str) = path_part.split(' ').last().filter(|s| !s.is_empty()) {
                    let original_path = line.split('\t').nth(1).map(PathBuf::from);
                    files.push(StatusEntry {
                        path: PathBuf::from(path_str),
                        status,
                        original_path,
                    });
                }
            }
        } else if let Some(rest) = line.strip_prefix("? ") {
            files.push(StatusEntry {
                path: PathBuf::from(rest),
                status: FileStatus::Untracked,
                original_path: None,
            });
        }
    }

    let branch = branch_name_str.and_then(|s| BranchName::from_str(&s).ok());
    let git_dir = repo_path.join(".git");
    let merging = git_dir.join("MERGE_HEAD").exists();
    let rebasing = git_dir.join("rebase-apply").exists() || git_dir.join("rebase-merge").exists();
    let cherry_picking = git_dir.join("CHERRY_PICK_HEAD").exists();
    let is_clean = files.iter().all(|f| matches!(f.status, FileStatus::Unmodified | FileStatus::Ignored));

    Ok(StatusResult {
        branch,
        files,
        merging,
        rebasing,
        cherry_picking,
        is_clean,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ls_tree_output() {
        let id = "2c49687c7f9e1f5b9f6a2e6a4f3b1c8d9e0a1b2c";
        let line = format!("100644 blob {id}\tfix.txt\n");
        let entries = parse_ls_tree(&line).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "fix.txt");
        assert_eq!(entries[0].mode, EntryMode::Blob);
    }

    #[test]
    fn parses_gitmodules() {
        let text = "[submodule \"libs/foo\"]\n\tpath = libs/foo\n\turl = https://github.com/example/foo.git\n";
        let map = parse_gitmodules(text).unwrap();
        assert!(map.contains_key("libs/foo"));
    }

    #[test]
    fn parses_worktree_porcelain() {
        let out = "worktree /repo\nHEAD 2c49687c7f9e1f5b9f6a2e6a4f3b1c8d9e0a1b2c\nbranch refs/heads/main\n\nworktree /repo-2\nHEAD 2c49687c7f9e1f5b9f6a2e6a4f3b1c8d9e0a1b2c\ndetached\n\n";
        let worktrees = parse_worktree_porcelain(out);
        assert_eq!(worktrees.len(), 2);
        assert!(worktrees[0].is_main);
        assert!(!worktrees[1].is_main);
    }
}

