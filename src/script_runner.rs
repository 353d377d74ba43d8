//! Transform script execution
//!
//! Runs a discovered transform script against a working directory. The
//! script receives the working directory path as its single argument and
//! edits the scenario files in place.
//!
//! Execution is all-or-nothing: the working directory is snapshotted before
//! the script starts, and restored byte-for-byte if the script fails to
//! spawn, exits non-zero, exceeds its timeout, or leaves the directory in a
//! state that no longer loads as a valid scenario. On success the reloaded
//! document is returned to the caller.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::document::ScenarioDocument;
use crate::error::{Result, ScenarioError};
use crate::persistence;
use crate::registry::TransformScript;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

static SNAPSHOT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Execution knobs for one transform run.
#[derive(Debug, Clone, Default)]
pub struct TransformOptions {
    /// Kill the script and roll back if it runs longer than this.
    pub timeout: Option<Duration>,
}

/// Result of a successful transform run.
#[derive(Debug)]
pub struct TransformReport {
    pub script: String,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    /// The scenario reloaded from the working directory after the script ran.
    pub document: ScenarioDocument,
}

/// Run one transform script against a working directory.
pub fn run_transform(
    script: &TransformScript,
    working_dir: &Path,
    options: &TransformOptions,
) -> Result<TransformReport> {
    if !working_dir.is_dir() {
        return Err(ScenarioError::workspace(format!(
            "working directory {} does not exist",
            working_dir.display()
        )));
    }

    let snapshot = Snapshot::take(working_dir)?;
    info!(script = %script.name, dir = %working_dir.display(), "running transform");

    let started = Instant::now();
    let outcome = execute(script, working_dir, options);
    let duration = started.elapsed();

    match outcome {
        Ok(capture) => match persistence::load(working_dir) {
            Ok(document) => {
                info!(
                    script = %script.name,
                    elapsed_ms = duration.as_millis() as u64,
                    "transform succeeded"
                );
                snapshot.discard();
                Ok(TransformReport {
                    script: script.name.clone(),
                    stdout: capture.stdout,
                    stderr: capture.stderr,
                    duration,
                    document,
                })
            }
            Err(e) => {
                warn!(script = %script.name, error = %e, "transform output invalid, rolling back");
                snapshot.restore(working_dir)?;
                Err(ScenarioError::script(
                    &script.name,
                    format!("script left an invalid scenario: {}", e),
                    capture.log(),
                ))
            }
        },
        Err(failure) => {
            warn!(script = %script.name, error = %failure.message, "transform failed, rolling back");
            snapshot.restore(working_dir)?;
            Err(ScenarioError::script(
                &script.name,
                failure.message,
                failure.log,
            ))
        }
    }
}

struct Capture {
    stdout: String,
    stderr: String,
}

impl Capture {
    fn log(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

struct Failure {
    message: String,
    log: String,
}

fn execute(
    script: &TransformScript,
    working_dir: &Path,
    options: &TransformOptions,
) -> std::result::Result<Capture, Failure> {
    let mut child = Command::new(&script.path)
        .arg(working_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Failure {
            message: format!("failed to spawn {}: {}", script.path.display(), e),
            log: String::new(),
        })?;

    // Drain both pipes on threads so a chatty script cannot block on a full
    // pipe buffer while we poll for exit.
    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();
    let stdout_thread = std::thread::spawn(move || drain(stdout_pipe));
    let stderr_thread = std::thread::spawn(move || drain(stderr_pipe));

    let deadline = options.timeout.map(|t| Instant::now() + t);
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Ok(status),
            Ok(None) => {
                if let Some(deadline) = deadline {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        break Err("timed out".to_string());
                    }
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                break Err(format!("failed to wait for script: {}", e));
            }
        }
    };

    let stdout = stdout_thread.join().unwrap_or_default();
    let stderr = stderr_thread.join().unwrap_or_default();
    let capture = Capture { stdout, stderr };

    match status {
        Ok(status) if status.success() => Ok(capture),
        Ok(status) => Err(Failure {
            message: format!(
                "exited with status {}",
                status.code().map_or_else(|| "signal".to_string(), |c| c.to_string())
            ),
            log: capture.log(),
        }),
        Err(message) => Err(Failure {
            message,
            log: capture.log(),
        }),
    }
}

fn drain(pipe: Option<impl Read>) -> String {
    let mut buf = String::new();
    if let Some(mut pipe) = pipe {
        let mut bytes = Vec::new();
        if pipe.read_to_end(&mut bytes).is_ok() {
            buf = String::from_utf8_lossy(&bytes).to_string();
        }
    }
    buf
}

/// Byte-for-byte copy of the working directory, held in the system temp dir
/// for the duration of one transform run.
struct Snapshot {
    dir: PathBuf,
}

impl Snapshot {
    fn take(working_dir: &Path) -> Result<Self> {
        let seq = SNAPSHOT_SEQ.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!(
            "scenario-snapshot-{}-{}",
            std::process::id(),
            seq
        ));
        copy_dir(working_dir, &dir)?;
        Ok(Self { dir })
    }

    fn restore(&self, working_dir: &Path) -> Result<()> {
        for entry in fs::read_dir(working_dir)? {
            let path = entry?.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
        copy_dir(&self.dir, working_dir)?;
        self.discard();
        Ok(())
    }

    fn discard(&self) {
        let _ = fs::remove_dir_all(&self.dir);
    }
}

fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let src = entry.path();
        let dst = to.join(entry.file_name());
        if src.is_dir() {
            copy_dir(&src, &dst)?;
        } else {
            fs::copy(&src, &dst)?;
        }
    }
    Ok(())
}
