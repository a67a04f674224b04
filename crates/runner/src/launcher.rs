//! Locating and spawning worker scripts.
//!
//! A worker is `<interpreter> <script> <settings args...>` with both output
//! streams piped. Each stream gets a pump task that splits it into lines and
//! feeds one shared channel, so the supervisor sees a single merged stream.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use fanfinder_core::job_type::JobType;
use fanfinder_core::settings::JobSettings;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::error::JobError;

/// Buffered lines per instance before the pumps stop reading.
const LINE_CHANNEL_CAPACITY: usize = 256;

/// Environment forced on every worker so its output is UTF-8 and unbuffered.
const WORKER_ENV: &[(&str, &str)] = &[
    ("PYTHONIOENCODING", "utf-8"),
    ("PYTHONUTF8", "1"),
    ("PYTHONUNBUFFERED", "1"),
];

/// One line of merged worker output, or the error that ended a stream.
pub type OutputLine = io::Result<String>;

/// A freshly spawned worker.
#[derive(Debug)]
pub struct LaunchedProcess {
    pub child: Child,
    pub pid: u32,
    pub script: PathBuf,
    /// Merged stdout/stderr lines. Closes once both streams hit EOF.
    pub lines: mpsc::Receiver<OutputLine>,
}

#[derive(Debug, Clone)]
pub struct Launcher {
    interpreter: String,
    script_dirs: Vec<PathBuf>,
}

impl Launcher {
    pub fn new(interpreter: impl Into<String>, script_dirs: Vec<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            script_dirs,
        }
    }

    /// First candidate directory containing the job's script.
    pub fn locate(&self, job_type: JobType) -> Result<PathBuf, JobError> {
        let script = job_type.script_file_name();
        let candidates: Vec<PathBuf> = self.script_dirs.iter().map(|d| d.join(script)).collect();

        for path in &candidates {
            tracing::debug!(path = %path.display(), "Checking for worker script");
            if path.is_file() {
                tracing::debug!(path = %path.display(), "Found worker script");
                return Ok(path.clone());
            }
        }

        Err(JobError::ScriptNotFound {
            script,
            searched: candidates,
        })
    }

    /// The full command for a job, without spawning it.
    pub fn command(&self, job_type: JobType, script: &Path, settings: &JobSettings) -> Command {
        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(script)
            .args(settings.to_args(job_type))
            .envs(WORKER_ENV.iter().copied())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Locate and spawn the worker for `job_type`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn launch(
        &self,
        job_type: JobType,
        settings: &JobSettings,
    ) -> Result<LaunchedProcess, JobError> {
        let script = self.locate(job_type)?;
        let mut cmd = self.command(job_type, &script, settings);

        tracing::info!(
            job_type = %job_type,
            interpreter = %self.interpreter,
            script = %script.display(),
            "Spawning worker"
        );

        let mut child = cmd.spawn().map_err(JobError::SpawnFailure)?;
        let pid = child.id().ok_or_else(|| {
            JobError::SpawnFailure(io::Error::other("process exited before its pid was read"))
        })?;

        let (tx, lines) = mpsc::channel(LINE_CHANNEL_CAPACITY);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump(stderr, tx));
        }

        Ok(LaunchedProcess {
            child,
            pid,
            script,
            lines,
        })
    }
}

/// Forward `reader` line by line. Invalid UTF-8 is replaced, not rejected.
async fn pump<R>(reader: R, tx: mpsc::Sender<OutputLine>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                if tx.send(Ok(line)).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                break;
            }
        }
    }
}
