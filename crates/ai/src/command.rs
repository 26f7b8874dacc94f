//! Classifier backed by an external program.
//!
//! The model usually lives in another runtime. The program receives the raw
//! image bytes on stdin and must print one JSON object on stdout:
//! `{"label": "<class>", "confidence": <number>}`. A non-zero exit status,
//! unparsable output or exceeding the timeout is an [`InferenceError`].

use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::classifier::Classifier;
use crate::result::{Classification, InferenceError};

/// Maximum stdout or stderr captured per stream (1 MiB).
const MAX_OUTPUT_BYTES: u64 = 1024 * 1024;

/// How often a running child is checked for exit.
const WAIT_TICK: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct CommandClassifier {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandClassifier {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Build from a whitespace-separated command line (`python3 model.py`).
    pub fn from_command_line(line: &str) -> Result<Self, InferenceError> {
        let mut parts = line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| InferenceError::Internal("empty classifier command".to_string()))?;
        Ok(Self::new(program).with_args(parts))
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn wait_with_timeout(&self, child: &mut Child) -> Result<ExitStatus, InferenceError> {
        let started = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) if started.elapsed() >= self.timeout => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(InferenceError::Timeout(self.timeout));
                }
                Ok(None) => thread::sleep(WAIT_TICK),
                Err(e) => return Err(InferenceError::Internal(e.to_string())),
            }
        }
    }
}

impl Classifier for CommandClassifier {
    fn classify(&self, image: &[u8]) -> Result<Classification, InferenceError> {
        if image.is_empty() {
            return Err(InferenceError::InvalidInput("empty image".to_string()));
        }

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| InferenceError::Internal(format!("spawn {}: {e}", self.program)))?;

        // Feed stdin and drain stdout/stderr on helper threads so a chatty
        // child cannot deadlock against a full pipe.
        let stdin = child.stdin.take().map(|mut pipe| {
            let payload = image.to_vec();
            thread::spawn(move || {
                // The child may exit without reading everything.
                let _ = pipe.write_all(&payload);
            })
        });
        let stdout = child.stdout.take().map(|pipe| thread::spawn(move || drain(pipe)));
        let stderr = child.stderr.take().map(|pipe| thread::spawn(move || drain(pipe)));

        let status = self.wait_with_timeout(&mut child)?;

        if let Some(h) = stdin {
            let _ = h.join();
        }
        let stdout = stdout.and_then(|h| h.join().ok()).unwrap_or_default();
        let stderr = stderr.and_then(|h| h.join().ok()).unwrap_or_default();

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            warn!(
                program = %self.program,
                status = %status,
                stderr = %stderr.trim(),
                "classifier exited with failure"
            );
            return Err(InferenceError::InferenceFailed(format!(
                "{} exited with {status}",
                self.program
            )));
        }

        let stdout = String::from_utf8_lossy(&stdout);
        debug!(program = %self.program, output = %stdout.trim(), "classifier finished");

        let parsed: Classification = serde_json::from_str(stdout.trim())
            .map_err(|e| InferenceError::InvalidOutput(e.to_string()))?;
        parsed.validate()
    }
}

fn drain<R: Read>(pipe: R) -> Vec<u8> {
    let mut buf = Vec::new();
    let _ = pipe.take(MAX_OUTPUT_BYTES).read_to_end(&mut buf);
    buf
}
