//! Shell commands and process control.

use crate::api::data;
use crate::error::Result;
use crate::model::{CommandResult, ProcessInfo};
use crate::sandbox::Sandbox;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Processes {
    sandbox: Sandbox,
}

impl Processes {
    pub(crate) fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }

    /// Run a shell command and wait for it to finish.
    ///
    /// A non-zero exit is a normal result; call [`CommandResult::check`] to
    /// treat it as an error. Exceeding `timeout` fails with
    /// [`Error::Timeout`](crate::Error::Timeout).
    pub async fn cmd(
        &self,
        command: &str,
        cwd: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<CommandResult> {
        let request = data::cmd(command, cwd, timeout)?;
        tracing::debug!(sandbox_id = %self.sandbox.id(), cmd = %command, "Executing command");
        let result: CommandResult = self.sandbox.live_data()?.call(request).await?;
        tracing::debug!(
            sandbox_id = %self.sandbox.id(),
            exit_code = result.exit_code,
            stdout_len = result.stdout.len(),
            stderr_len = result.stderr.len(),
            "Command completed"
        );
        Ok(result)
    }

    pub async fn list(&self) -> Result<Vec<ProcessInfo>> {
        self.sandbox
            .live_data()?
            .call_list(data::list_processes())
            .await
    }

    pub async fn get(&self, pid: &str) -> Result<ProcessInfo> {
        self.sandbox.live_data()?.call(data::get_process(pid)?).await
    }

    pub async fn kill(&self, pid: &str) -> Result<()> {
        let request = data::kill_process(pid)?;
        tracing::debug!(sandbox_id = %self.sandbox.id(), pid = %pid, "Killing process");
        self.sandbox.live_data()?.execute(request).await
    }
}
