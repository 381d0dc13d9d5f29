//! Typed argument contracts for external tools.
//!
//! Each tool invocation is a struct implementing [`ToolArgs`]; the struct is
//! the single source of truth for the flags and environment a subcommand
//! receives, so a misspelt flag is a compile error rather than a failed run.

use std::path::Path;

/// Arguments for one invocation of an external tool.
///
/// # Contract
///
/// - `program()`: executable to run (a name looked up on `PATH`, or a path)
/// - `to_cli_args()`: arguments exactly as the tool expects them
/// - `get_env_vars()`: extra environment for the child
/// - `working_dir()`: directory the tool runs in
pub trait ToolArgs {
    fn program(&self) -> &Path;

    fn to_cli_args(&self) -> Vec<String>;

    fn get_env_vars(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    fn working_dir(&self) -> &Path;

    /// Short label for logs, e.g. `terraform init`
    fn describe(&self) -> String {
        let program = self
            .program()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program().display().to_string());
        match self.to_cli_args().first() {
            Some(subcommand) => format!("{} {}", program, subcommand),
            None => program,
        }
    }
}
