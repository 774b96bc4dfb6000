use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, warn};

use super::CustomCodeEvaluator;
use crate::errors::{CustomCodeError, CustomCodeResult};
use crate::rows::RowSet;

const HARNESS: &str = include_str!("../../resources/custom_harness.js");

/// Stderr kept for error messages.
const STDERR_LIMIT: usize = 16 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessEvaluatorConfig {
    /// Interpreter executable, `node` by default.
    pub command: String,
    pub timeout: Duration,
    /// Heap ceiling handed to the interpreter.
    pub memory_mb: u64,
    pub max_output_bytes: usize,
}

impl Default for ProcessEvaluatorConfig {
    fn default() -> Self {
        Self {
            command: "node".to_string(),
            timeout: Duration::from_secs(5),
            memory_mb: 128,
            max_output_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HarnessResponse {
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    result_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Evaluates custom code in a separate interpreter process per call. The
/// child is killed when the wall-clock limit passes or the output grows past
/// the configured size.
#[derive(Debug, Clone, Default)]
pub struct ProcessEvaluator {
    config: ProcessEvaluatorConfig,
}

impl ProcessEvaluator {
    pub fn new(config: ProcessEvaluatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProcessEvaluatorConfig {
        &self.config
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.config.command);
        command
            .arg(format!("--max-old-space-size={}", self.config.memory_mb))
            .arg("-e")
            .arg(HARNESS)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    async fn run(&self, request: Vec<u8>) -> CustomCodeResult<(Vec<u8>, String)> {
        let mut child = self.command().spawn().map_err(|source| CustomCodeError::Spawn {
            command: self.config.command.clone(),
            source,
        })?;

        let (Some(mut stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(CustomCodeError::Protocol(
                "interpreter pipes unavailable".to_string(),
            ));
        };

        let write = async move {
            stdin.write_all(&request).await?;
            stdin.shutdown().await
        };
        let limit = self.config.max_output_bytes;
        let (written, output, errors) = tokio::join!(
            write,
            read_limited(stdout, limit),
            read_limited(stderr, STDERR_LIMIT),
        );

        let output = output.map_err(|err| CustomCodeError::Protocol(err.to_string()))?;
        if output.len() > limit {
            return Err(CustomCodeError::OutputTooLarge(limit));
        }
        let errors = errors
            .map(|bytes| String::from_utf8_lossy(&bytes).trim().to_string())
            .unwrap_or_default();

        // A child that died early closes stdin; its stderr says why.
        if let Err(err) = written {
            debug!("Writing custom code request failed: {}", err);
        }

        let status = child
            .wait()
            .await
            .map_err(|err| CustomCodeError::Protocol(err.to_string()))?;
        if !status.success() && output.is_empty() {
            let reason = if errors.is_empty() {
                format!("interpreter exited with {}", status)
            } else {
                errors
            };
            return Err(CustomCodeError::Runtime(reason));
        }

        Ok((output, errors))
    }
}

/// Reads at most `limit + 1` bytes so callers can detect overflow.
async fn read_limited<R>(reader: R, limit: usize) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    reader
        .take(limit as u64 + 1)
        .read_to_end(&mut buffer)
        .await?;
    Ok(buffer)
}

#[async_trait]
impl CustomCodeEvaluator for ProcessEvaluator {
    async fn evaluate(&self, code: &str, inputs: Vec<RowSet>) -> CustomCodeResult<Value> {
        let request = serde_json::to_vec(&json!({
            "code": code,
            "inputs": inputs,
            "timeoutMs": self.config.timeout.as_millis() as u64,
        }))
        .map_err(|err| CustomCodeError::Protocol(err.to_string()))?;

        debug!(
            "Running custom code with {} input(s) via {}",
            inputs.len(),
            self.config.command
        );

        let (output, errors) = match tokio::time::timeout(self.config.timeout, self.run(request)).await
        {
            Ok(result) => result?,
            Err(_) => {
                warn!("Custom code exceeded {:?}, interpreter killed", self.config.timeout);
                return Err(CustomCodeError::Timeout(self.config.timeout));
            }
        };

        let response: HarnessResponse = serde_json::from_slice(&output).map_err(|err| {
            let detail = if errors.is_empty() {
                err.to_string()
            } else {
                format!("{} (stderr: {})", err, errors)
            };
            CustomCodeError::Protocol(detail)
        })?;

        if !response.ok {
            let message = response
                .error
                .unwrap_or_else(|| "custom code failed".to_string());
            if message.contains("Script execution timed out") {
                return Err(CustomCodeError::Timeout(self.config.timeout));
            }
            return Err(CustomCodeError::Runtime(message));
        }

        match response.result_type {
            Some(result_type) => Err(CustomCodeError::NonArrayResult(result_type)),
            None => Ok(response.result),
        }
    }
}
