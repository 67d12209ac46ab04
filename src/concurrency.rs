//! Bounded parallel fan-out used by `Tree::commits_info`: resolving, for
//! every entry of a tree, the most recent commit that last touched it.
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use threadpool::ThreadPool;

use crate::error::GitError;
use crate::models::Commit;

/// Resolves `last-changed commit` for each of `paths`, running up to
/// `max_concurrency` (but never fewer than the machine's CPU count)
/// lookups at once via `resolve`.
///
/// The first failure wins: once any lookup returns `Err`, that error is
/// returned and the other results are discarded, but in-flight lookups are
/// still allowed to finish (the pool is always joined before returning) so
/// no worker thread outlives this call.
pub fn commits_info<F>(
    paths: Vec<String>,
    max_concurrency: usize,
    resolve: F,
) -> Result<Vec<Arc<Commit>>, GitError>
where
    F: Fn(&str) -> Result<Commit, GitError> + Send + Sync + 'static,
{
    let worker_count = max_concurrency.max(num_cpus::get()).max(1);
    let pool = ThreadPool::new(worker_count);
    let resolve = Arc::new(resolve);
    let first_error: Arc<Mutex<Option<GitError>>> = Arc::new(Mutex::new(None));
    let (tx, rx) = mpsc::channel();

    let total = paths.len();
    for (index, path) in paths.into_iter().enumerate() {
        let tx = tx.clone();
        let resolve = resolve.clone();
        let first_error = first_error.clone();
        pool.execute(move || {
            if first_error.lock().expect("fan-out lock poisoned").is_some() {
                let _ = tx.send((index, None));
                return;
            }
            match resolve(&path) {
                Ok(commit) => {
                    let _ = tx.send((index, Some(Arc::new(commit))));
                }
                Err(e) => {
                    let mut guard = first_error.lock().expect("fan-out lock poisoned");
                    if guard.is_none() {
                        *guard = Some(e);
                    }
                    let _ = tx.send((index, None));
                }
            }
        });
    }
    drop(tx);

    let mut slots: Vec<Option<Arc<Commit>>> = vec![None; total];
    for _ in 0..total {
        if let Ok((index, value)) = rx.recv() {
            slots[index] = value;
        }
    }

    pool.join();

    if let Some(err) = first_error.lock().expect("fan-out lock poisoned").take() {
        return Err(err);
    }

    Ok(slots.into_iter().map(|s| s.expect("resolved without error")).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sha::ObjectId;
    use crate::signature::Signature;

    fn sig() -> Signature {
        Signature::parse("Jane Doe <jane@example.com> 1700000000 +0000").unwrap()
    }

    #[test]
    fn resolves_in_index_order() {
        let paths = vec!["a.txt".to_string(), "b.txt".to_string(), "c.txt".to_string()];
        let result = commits_info(paths.clone(), 2, move |path| {
            Ok(Commit::new(
                ObjectId::EMPTY,
                ObjectId::EMPTY,
                vec![],
                sig(),
                sig(),
                format!("touched {path}"),
                None,
            ))
        })
        .unwrap();
        assert_eq!(result.len(), 3);
        assert_eq!(result[0].message, "touched a.txt");
        assert_eq!(result[2].message, "touched c.txt");
    }

    #[test]
    fn first_failure_wins() {
        let paths = vec!["a.txt".to_string(), "bad.txt".to_string(), "c.txt".to_string()];
        let result = commits_info(paths, 2, |path| {
            if path == "bad.txt" {
                Err(GitError::NotBlob)
            } else {
                Ok(Commit::new(ObjectId::EMPTY, ObjectId::EMPTY, vec![], sig(), sig(), String::new(), None))
            }
        });
        assert!(result.is_err());
    }
}
