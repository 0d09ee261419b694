use async_trait::async_trait;
use tokio::process::Command;

use crate::errors::{PilotError, PilotResult};

/// Runs `adb` subcommands against one device and returns raw stdout.
#[async_trait]
pub trait DeviceShell: Send + Sync {
    async fn run(&self, args: &[&str]) -> PilotResult<Vec<u8>>;
}

/// Production shell: `docker exec <container> adb …`, or a host `adb -s <serial> …`.
#[derive(Debug, Clone)]
pub struct DockerAdbShell {
    container: Option<String>,
    serial: Option<String>,
}

impl DockerAdbShell {
    pub fn new(container: Option<String>, serial: Option<String>) -> Self {
        Self { container, serial }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = match &self.container {
            Some(container) => {
                let mut cmd = Command::new("docker");
                cmd.args(["exec", container.as_str(), "adb"]);
                cmd
            }
            None => Command::new("adb"),
        };
        if let Some(serial) = &self.serial {
            cmd.args(["-s", serial.as_str()]);
        }
        cmd.args(args).kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl DeviceShell for DockerAdbShell {
    async fn run(&self, args: &[&str]) -> PilotResult<Vec<u8>> {
        tracing::trace!(?args, "adb");
        let output = self
            .command(args)
            .output()
            .await
            .map_err(|e| PilotError::Device(format!("failed to spawn adb: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PilotError::Device(format!(
                "`adb {}` exited with {}: {}",
                args.join(" "),
                output.status,
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }
}
