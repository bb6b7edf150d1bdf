//! Process handle - one shell-launched OS process

use std::path::Path;
use std::process::Stdio;
use tokio::process::{Child, Command};

/// A running shell command owned by the job manager
///
/// Must be created inside a Tokio runtime. Dropping the handle does not kill the
/// process; the runtime reaps it once it exits.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    pid: u32,
    terminated: bool,
}

impl ProcessHandle {
    /// Launch `command` through the platform shell
    pub fn spawn(command: &str) -> std::io::Result<Self> {
        Self::spawn_in(command, None)
    }

    /// Launch `command` through the platform shell in `cwd`
    pub fn spawn_in(command: &str, cwd: Option<&Path>) -> std::io::Result<Self> {
        let mut cmd = shell_command(command);

        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        // Jobs write straight to our terminal, like a foreground command would
        cmd.stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        // Own process group so terminate() reaches everything the shell starts
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn()?;
        let pid = child
            .id()
            .ok_or_else(|| std::io::Error::other("spawned process has no pid"))?;

        Ok(Self {
            child,
            pid,
            terminated: false,
        })
    }

    /// Process id captured at launch
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Check if the process is still running. Never blocks.
    pub fn is_alive(&mut self) -> bool {
        self.child
            .try_wait()
            .map(|s| s.is_none())
            .unwrap_or(false)
    }

    /// Ask the process to exit (SIGTERM on Unix). Does not wait for it.
    ///
    /// Calling this on a process that already exited, or a second time, is a no-op.
    pub fn terminate(&mut self) -> crate::Result<()> {
        if self.terminated || !self.is_alive() {
            self.terminated = true;
            return Ok(());
        }
        self.terminated = true;
        send_terminate(&mut self.child, self.pid)
    }
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(not(unix))]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

#[cfg(unix)]
fn send_terminate(_child: &mut Child, pid: u32) -> crate::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    // The child leads its own group, so its pid is the group id
    match killpg(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(crate::JobError::Signal {
            pid,
            message: e.to_string(),
        }),
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child, pid: u32) -> crate::Result<()> {
    child.start_kill().map_err(|e| crate::JobError::Signal {
        pid,
        message: e.to_string(),
    })
}
