//! Vendor CLI execution
//!
//! Every adapter talks to its provider through the vendor's own command-line
//! tool with JSON output. Execution sits behind [`CommandRunner`] so tests can
//! script the output.

use crate::error::{AdaptorError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` and return its stdout
    async fn run(&self, program: &str, args: &[String]) -> Result<String>;
}

/// Runs commands as child processes
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<String> {
        tracing::debug!("Running: {} {}", program, args.join(" "));

        let output = Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => AdaptorError::CliNotFound(program.to_string()),
                _ => AdaptorError::IoError(e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AdaptorError::CommandFailed {
                program: program.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// One vendor CLI bound to a runner
#[derive(Clone)]
pub struct Cli {
    program: &'static str,
    runner: Arc<dyn CommandRunner>,
}

impl Cli {
    pub fn new(program: &'static str, runner: Arc<dyn CommandRunner>) -> Self {
        Self { program, runner }
    }

    pub fn program(&self) -> &'static str {
        self.program
    }

    /// Run and decode JSON output. Empty output decodes as `T::default()`.
    pub async fn json<T>(&self, args: Vec<String>) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        let output = self.runner.run(self.program, &args).await?;
        parse_json(&output)
    }
}

pub fn parse_json<T>(output: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Ok(T::default());
    }
    Ok(serde_json::from_str(trimmed)?)
}

/// Owned argument list from string slices
pub fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}
