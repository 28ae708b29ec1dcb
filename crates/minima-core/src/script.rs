//! ============================================================================
//! Script Runner - Local Identity Helpers
//! ============================================================================
//! A few identity operations need local key material and run as helper
//! scripts instead of going through the node's HTTP interface: identity-card
//! retrieval, current Maxima address, challenge generation, signing, and
//! signature verification. Every invocation has a hard deadline; an expired
//! process is killed.
//! ============================================================================

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::types::OperatorError;

/// Hard deadline for a helper script.
const SCRIPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs the node's local helper scripts with a hard timeout.
pub struct ScriptRunner {
    dir: PathBuf,
    timeout: Duration,
}

impl ScriptRunner {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            timeout: SCRIPT_TIMEOUT,
        }
    }

    pub fn with_timeout(dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            dir: dir.into(),
            timeout,
        }
    }

    /// Run one helper script and return its stdout. Non-zero exit surfaces
    /// as [`OperatorError::Script`]; exceeding the deadline kills the
    /// process and surfaces as [`OperatorError::Timeout`].
    pub async fn run(&self, script: &str, args: &[&str]) -> Result<String, OperatorError> {
        let path = self.dir.join(script);
        debug!("Running helper script {:?} {:?}", path, args);

        let child = Command::new(&path)
            .args(args)
            .current_dir(&self.dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| OperatorError::Script {
                code: None,
                stderr: format!("failed to start {:?}: {}", path, e),
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Err(_) => {
                warn!("Helper script {:?} exceeded {:?}, killed", path, self.timeout);
                return Err(OperatorError::Timeout {
                    secs: self.timeout.as_secs(),
                });
            }
            Ok(Err(e)) => {
                return Err(OperatorError::Script {
                    code: None,
                    stderr: e.to_string(),
                })
            }
            Ok(Ok(output)) => output,
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if output.status.success() {
            Ok(stdout)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            Err(OperatorError::Script {
                code: output.status.code(),
                stderr: if stderr.trim().is_empty() { stdout } else { stderr },
            })
        }
    }

    /// Stdout as JSON when it parses, plain string otherwise.
    async fn run_json(&self, script: &str, args: &[&str]) -> Result<Value, OperatorError> {
        let stdout = self.run(script, args).await?;
        Ok(serde_json::from_str(&stdout).unwrap_or(Value::String(stdout)))
    }

    /// Identity card (JSON) for this node's MxID.
    pub async fn mxid_info(&self) -> Result<Value, OperatorError> {
        self.run_json("mxid_info.sh", &[]).await
    }

    /// Current Maxima address.
    pub async fn get_maxima(&self) -> Result<Value, OperatorError> {
        let stdout = self.run("get_maxima.sh", &[]).await?;
        Ok(serde_json::json!({ "address": stdout.trim() }))
    }

    /// Generate a signing challenge.
    pub async fn challenge(&self) -> Result<Value, OperatorError> {
        self.run_json("mxid_challenge.sh", &[]).await
    }

    /// Sign data with the local identity key.
    pub async fn sign(&self, data: &str) -> Result<Value, OperatorError> {
        self.run_json("mxid_sign.sh", &[data]).await
    }

    /// Verify a signature against a public key.
    pub async fn verify(
        &self,
        data: &str,
        signature: &str,
        publickey: &str,
    ) -> Result<Value, OperatorError> {
        self.run_json("mxid_verify.sh", &[data, signature, publickey])
            .await
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    fn write_script(dir: &std::path::Path, name: &str, body: &str) {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "#!/bin/sh\n{}", body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[tokio::test]
    async fn test_run_success() {
        let dir = std::env::temp_dir().join("minima_script_ok");
        std::fs::create_dir_all(&dir).unwrap();
        write_script(&dir, "get_maxima.sh", "echo 'MxMAXIMA01'");

        let runner = ScriptRunner::new(&dir);
        let value = runner.get_maxima().await.unwrap();
        assert_eq!(value["address"], "MxMAXIMA01");
    }

    #[tokio::test]
    async fn test_run_json_output() {
        let dir = std::env::temp_dir().join("minima_script_json");
        std::fs::create_dir_all(&dir).unwrap();
        write_script(&dir, "mxid_info.sh", r#"echo '{"mxid":"alice"}'"#);

        let runner = ScriptRunner::new(&dir);
        let value = runner.mxid_info().await.unwrap();
        assert_eq!(value["mxid"], "alice");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_script_error() {
        let dir = std::env::temp_dir().join("minima_script_fail");
        std::fs::create_dir_all(&dir).unwrap();
        write_script(&dir, "mxid_sign.sh", "echo 'no key material' >&2; exit 3");

        let runner = ScriptRunner::new(&dir);
        let err = runner.sign("0xDATA").await.unwrap_err();
        match err {
            OperatorError::Script { code, stderr } => {
                assert_eq!(code, Some(3));
                assert!(stderr.contains("no key material"));
            }
            other => panic!("expected Script error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_deadline_kills_and_times_out() {
        let dir = std::env::temp_dir().join("minima_script_slow");
        std::fs::create_dir_all(&dir).unwrap();
        write_script(&dir, "mxid_challenge.sh", "sleep 10");

        let runner = ScriptRunner::with_timeout(&dir, Duration::from_millis(100));
        let err = runner.challenge().await.unwrap_err();
        assert!(matches!(err, OperatorError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_missing_script_is_script_error() {
        let runner = ScriptRunner::new("/nonexistent/scripts");
        let err = runner.mxid_info().await.unwrap_err();
        assert!(matches!(err, OperatorError::Script { code: None, .. }));
    }
}
