//! Build executor: runs toolchain commands and streams their output into a
//! `LogSink`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::errors::{JobError, JobResult, render_invocation};
use crate::store::{LogSink, LogStream};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub cwd: PathBuf,
    /// Merged over the inherited process environment.
    pub env: BTreeMap<String, String>,
    pub job_id: String,
}

/// Runs one external command per call. No retries and no timeout: a failed
/// install or build needs different input, not a re-run.
#[derive(Debug, Clone, Default)]
pub struct BuildExecutor;

impl BuildExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Run `argv[0]` with the remaining elements as arguments.
    pub async fn run_argv<S>(&self, argv: &[String], options: &RunOptions, sink: &S) -> JobResult<()>
    where
        S: LogSink + ?Sized,
    {
        let Some((command, args)) = argv.split_first() else {
            return Err(JobError::Build("empty command".to_string()));
        };
        self.run(command, args, options, sink).await
    }

    pub async fn run<S>(
        &self,
        command: &str,
        args: &[String],
        options: &RunOptions,
        sink: &S,
    ) -> JobResult<()>
    where
        S: LogSink + ?Sized,
    {
        let invocation = render_invocation(command, args);
        tracing::info!(job_id = %options.job_id, command = %invocation, "running command");

        let mut child = Command::new(command)
            .args(args)
            .current_dir(&options.cwd)
            .envs(&options.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| JobError::Build(format!("{} failed to start: {}", invocation, e)))?;

        let (tx, mut rx) = mpsc::unbounded_channel::<(LogStream, String)>();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, LogStream::Stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, LogStream::Stderr, tx.clone()));
        }
        drop(tx);

        // Ends once both readers hit EOF.
        while let Some((stream, line)) = rx.recv().await {
            sink.emit(&options.job_id, stream, &line).await;
        }

        let status = child
            .wait()
            .await
            .map_err(|e| JobError::Build(format!("{} failed: {}", invocation, e)))?;
        if status.success() {
            Ok(())
        } else {
            Err(JobError::command_failed(command, args, status.code()))
        }
    }
}

/// Forward `reader` to `tx` one line at a time. Bytes are decoded lossily so
/// stray non-UTF-8 output never stops the pipe from being drained.
async fn forward_lines<R>(reader: R, stream: LogStream, tx: mpsc::UnboundedSender<(LogStream, String)>)
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
                let decoded = String::from_utf8_lossy(&buf);
                let line = decoded.trim_end();
                if line.trim().is_empty() {
                    continue;
                }
                if tx.send((stream, line.to_string())).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::debug!(stream = stream.as_str(), error = %e, "stopped reading process output");
                break;
            }
        }
    }
}
