//! Process-guarded execution of external tools
//!
//! `run_tool_safe` is the only place clustergen spawns a child process. Every
//! child:
//!
//! - runs in its own process group with a parent-death signal
//! - is registered with [`ChildRegistry`] while it runs
//! - gets its arguments and environment from a [`ToolArgs`] struct
//!
//! Once a shutdown signal arrived no new tool is started, and a tool that
//! failed because it was stopped reports `Interrupted`.

use crate::error::{AssetError, Result};
use crate::process_guard::{self, ChildRegistry, CommandProcessGroup};
use crate::tool_traits::ToolArgs;
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

/// Run the tool described by `args` and capture its output.
///
/// A non-zero exit is not an error here; call
/// [`ToolOutput::ensure_success`] for that.
///
/// # Errors
///
/// `Io` if the program cannot be spawned or waited on. `Interrupted` if a
/// shutdown was requested before the tool started or while it ran.
pub fn run_tool_safe<T: ToolArgs + ?Sized>(args: &T) -> Result<ToolOutput> {
    let label = args.describe();
    if let Some(sig) = process_guard::shutdown_requested() {
        warn!("Not starting {}: shutting down", label);
        return Err(AssetError::Interrupted {
            signal: process_guard::signal_name(sig),
        });
    }

    let cli_args = args.to_cli_args();
    let env_vars = args.get_env_vars();

    info!("Running {}", label);
    debug!(
        program = %args.program().display(),
        dir = %args.working_dir().display(),
        "args={:?} env={:?}",
        cli_args,
        env_vars
    );

    let mut cmd = Command::new(args.program());
    cmd.args(&cli_args)
        .current_dir(args.working_dir())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .in_new_process_group();
    for (key, value) in &env_vars {
        cmd.env(key, value);
    }

    let child = cmd.spawn()?;
    let pid = child.id();
    ChildRegistry::with_global(|registry| registry.register(pid));

    let waited = child.wait_with_output();
    ChildRegistry::with_global(|registry| registry.unregister(pid));
    let output = waited?;

    if !output.status.success()
        && let Some(sig) = process_guard::shutdown_requested()
    {
        warn!("{} stopped by {}", label, process_guard::signal_name(sig));
        return Err(AssetError::Interrupted {
            signal: process_guard::signal_name(sig),
        });
    }

    let result = ToolOutput {
        program: label,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: output.status.code(),
        success: output.status.success(),
    };

    if result.success {
        debug!("{} exited successfully", result.program);
    } else {
        warn!(
            "{} failed with exit code {}",
            result.program,
            result.exit_code.unwrap_or(-1)
        );
    }
    Ok(result)
}

/// Captured result of a tool run.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Label from [`ToolArgs::describe`]
    pub program: String,
    pub stdout: String,
    pub stderr: String,
    /// `None` if the tool was killed by a signal
    pub exit_code: Option<i32>,
    pub success: bool,
}

impl ToolOutput {
    /// `ToolExit` unless the tool exited with status 0.
    pub fn ensure_success(self) -> Result<Self> {
        if self.success {
            return Ok(self);
        }
        Err(AssetError::ToolExit {
            program: self.program,
            code: self.exit_code.unwrap_or(-1),
            stderr: self.stderr.trim().to_string(),
        })
    }
}
