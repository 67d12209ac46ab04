//! Process-wide, optional diagnostic logging sink.
//!
//! Every `git` invocation this crate makes can be mirrored to a caller-
//! supplied writer, one line per command, so a host application can show
//! what's happening under the hood without this crate depending on `log`
//! or `tracing`.
use std::io::Write;
use std::sync::{OnceLock, RwLock};

const DEFAULT_PREFIX: &str = "[git-module] ";
const STDOUT_HEAD_LIMIT: usize = 512;

struct Sink {
    writer: Box<dyn Write + Send + Sync>,
    prefix: String,
}

// SAFETY-free: `Sink` only needs a lock because the writer isn't `Sync` by
// default assumption from callers; we require Send + Sync explicitly above.
static SINK: OnceLock<RwLock<Option<Sink>>> = OnceLock::new();

fn cell() -> &'static RwLock<Option<Sink>> {
    SINK.get_or_init(|| RwLock::new(None))
}

/// Installs a writer that receives one line per `git` invocation. Replaces
/// any previously installed sink. Pass `None` as the prefix to keep the
/// default `"[git-module] "` prefix.
pub fn set_sink<W>(writer: W, prefix: Option<String>)
where
    W: Write + Send + Sync + 'static,
{
    let sink = Sink {
        writer: Box::new(writer),
        prefix: prefix.unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
    };
    *cell().write().expect("log sink lock poisoned") = Some(sink);
}

/// Removes any installed sink; subsequent commands log nothing.
pub fn clear_sink() {
    *cell().write().expect("log sink lock poisoned") = None;
}

/// Records one command execution. Called by the executor after every `git`
/// invocation, success or failure.
pub(crate) fn record(args: &[String], cwd: &std::path::Path, stdout: &[u8]) {
    let mut guard = match cell().write() {
        Ok(g) => g,
        Err(_) => return,
    };
    if let Some(sink) = guard.as_mut() {
        let head_len = stdout.len().min(STDOUT_HEAD_LIMIT);
        let truncated = stdout.len() > STDOUT_HEAD_LIMIT;
        let head = crate::exec::CONTROL_CHARS.replace_all(
            &String::from_utf8_lossy(&stdout[..head_len]),
            " ",
        );
        let marker = if truncated { "...(truncated)" } else { "" };
        let line = format!(
            "{}git {} (cwd={}) stdout_head={:?}{}\n",
            sink.prefix,
            args.join(" "),
            cwd.display(),
            head,
            marker
        );
        let _ = sink.writer.write_all(line.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct VecSink(Arc<Mutex<Vec<u8>>>);

    impl Write for VecSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn records_when_sink_installed() {
        let sink = VecSink::default();
        let captured = sink.0.clone();
        set_sink(sink, None);
        record(
            &["status".to_string()],
            std::path::Path::new("/tmp/repo"),
            b"clean",
        );
        let out = String::from_utf8(captured.lock().unwrap().clone()).unwrap();
        assert!(out.contains("[git-module] git status"));
        assert!(out.contains("clean"));
        clear_sink();
    }

    #[test]
    fn silent_without_sink() {
        clear_sink();
        // Should not panic with no sink installed.
        record(&["log".to_string()], std::path::Path::new("."), b"");
    }
}
