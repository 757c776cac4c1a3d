//! Run a child process and capture its complete combined output.

use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use codesign_settings::BuildTranscript;

use crate::cancel::{CancelReason, CancelToken};
use crate::timeout::{TimeoutConfig, TimeoutEnforcer};

/// How often the capture loop polls the child and the cancel token
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Time the child gets to exit after SIGTERM before it is killed
const TERMINATION_GRACE: Duration = Duration::from_secs(5);

/// Errors from build output capture
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The build tool could not be started; there is no transcript.
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The build was stopped before it finished.
    #[error("build {reason}")]
    Cancelled {
        reason: CancelReason,
        /// Output captured up to the point of cancellation
        transcript: BuildTranscript,
    },

    /// Waiting on the child failed after it was started.
    #[error("failed waiting for build process: {0}")]
    Io(#[from] io::Error),
}

type LineSink = Arc<Mutex<Vec<String>>>;

fn lock_lines(sink: &LineSink) -> MutexGuard<'_, Vec<String>> {
    match sink.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Copy every line from `reader` into `sink`, in arrival order.
///
/// Invalid UTF-8 is replaced rather than dropped so no line goes missing.
fn pump<R: Read + Send + 'static>(reader: R, sink: LineSink) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    if buf.last() == Some(&b'\n') {
                        buf.pop();
                        if buf.last() == Some(&b'\r') {
                            buf.pop();
                        }
                    }
                    let line = String::from_utf8_lossy(&buf).into_owned();
                    lock_lines(&sink).push(line);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "stopped reading build output");
                    break;
                }
            }
        }
    })
}

fn collect_text(sink: &LineSink) -> String {
    let lines = lock_lines(sink);
    let mut text = lines.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    text
}

/// Run `command` to completion, capturing stdout and stderr interleaved.
///
/// Blocks until the child exits. A non-zero exit is not an error: it comes
/// back as a transcript with `succeeded() == false`. Cancellation through
/// `cancel` or the configured timeout terminates the child.
pub fn capture_command(
    mut command: Command,
    cancel: &CancelToken,
    timeout: TimeoutConfig,
) -> Result<BuildTranscript, CaptureError> {
    let program = command.get_program().to_string_lossy().into_owned();
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    // Own process group so cancellation reaches every helper xcodebuild spawns.
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let mut child = command.spawn().map_err(|source| CaptureError::Launch {
        program: program.clone(),
        source,
    })?;
    tracing::debug!(%program, pid = child.id(), "build process started");

    let sink: LineSink = Arc::new(Mutex::new(Vec::new()));
    let mut pumps = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        pumps.push(pump(stdout, Arc::clone(&sink)));
    }
    if let Some(stderr) = child.stderr.take() {
        pumps.push(pump(stderr, Arc::clone(&sink)));
    }

    let enforcer = TimeoutEnforcer::new(timeout);
    let status = loop {
        if enforcer.check().is_timeout() {
            cancel.cancel(CancelReason::Timeout);
        }
        if cancel.is_cancelled() {
            let reason = cancel.reason().unwrap_or(CancelReason::User);
            tracing::warn!(%program, %reason, "terminating build process");
            terminate_child(&mut child)?;
            join_pumps_until(pumps, Instant::now() + TERMINATION_GRACE);
            return Err(CaptureError::Cancelled {
                reason,
                transcript: BuildTranscript::new(collect_text(&sink), false),
            });
        }

        match child.try_wait()? {
            Some(status) => break status,
            None => thread::sleep(POLL_INTERVAL),
        }
    };

    // Helpers left in the process group can hold the pipes open after the
    // direct child exits, so cancellation still applies while draining.
    if let Some(reason) = drain_pumps(&pumps, cancel, &enforcer) {
        tracing::warn!(%program, %reason, "terminating processes left by the build");
        signal_group(&mut child, true);
        join_pumps_until(pumps, Instant::now() + TERMINATION_GRACE);
        return Err(CaptureError::Cancelled {
            reason,
            transcript: BuildTranscript::new(collect_text(&sink), false),
        });
    }
    join_pumps(pumps);
    tracing::debug!(
        %program,
        code = ?status.code(),
        elapsed_ms = enforcer.elapsed().as_millis() as u64,
        "build process exited"
    );

    Ok(BuildTranscript::new(collect_text(&sink), status.success()))
}

/// Wait for the readers to reach end of output, polling `cancel` and the
/// timeout. Returns the cancel reason if either fired first.
fn drain_pumps(
    pumps: &[JoinHandle<()>],
    cancel: &CancelToken,
    enforcer: &TimeoutEnforcer,
) -> Option<CancelReason> {
    while !pumps.iter().all(JoinHandle::is_finished) {
        if enforcer.check().is_timeout() {
            cancel.cancel(CancelReason::Timeout);
        }
        if cancel.is_cancelled() {
            return Some(cancel.reason().unwrap_or(CancelReason::User));
        }
        thread::sleep(POLL_INTERVAL);
    }
    None
}

fn join_pumps(pumps: Vec<JoinHandle<()>>) {
    for handle in pumps {
        let _ = handle.join();
    }
}

/// Like `join_pumps`, but gives up at `deadline`; a grandchild that
/// survived termination may still hold the pipes open.
fn join_pumps_until(pumps: Vec<JoinHandle<()>>, deadline: Instant) {
    for handle in pumps {
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(POLL_INTERVAL);
        }
        if handle.is_finished() {
            let _ = handle.join();
        }
    }
}

/// Terminate a child gracefully, then forcefully.
fn terminate_child(child: &mut Child) -> io::Result<()> {
    signal_group(child, false);

    let start = Instant::now();
    while start.elapsed() < TERMINATION_GRACE {
        if child.try_wait()?.is_some() {
            signal_group(child, true);
            return Ok(());
        }
        thread::sleep(POLL_INTERVAL);
    }

    signal_group(child, true);
    let _ = child.kill();
    let _ = child.wait();
    Ok(())
}

#[cfg(unix)]
fn signal_group(child: &Child, force: bool) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
    let _ = killpg(Pid::from_raw(child.id() as i32), signal);
}

#[cfg(not(unix))]
fn signal_group(child: &mut Child, _force: bool) {
    let _ = child.kill();
}
