//! External command and confirmation seams for the trust installer.
//!
//! Every trust store change goes through a [`CommandRunner`], and every
//! privileged step asks a [`Confirm`] first. Tests substitute recording fakes
//! so no OS tool is invoked.

use std::env;
use std::fmt;
use std::io::{self, BufRead, Write};
use std::process::{Command, Stdio};

use tracing::debug;

/// How a command has to be elevated to succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Elevation {
    None,
    /// Prefixed with `sudo` unless the process already runs as root.
    Sudo,
    /// Must be run from an Administrator shell (Windows).
    Administrator,
}

/// A single external program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub elevation: Elevation,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            elevation: Elevation::None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn elevation(mut self, elevation: Elevation) -> Self {
        self.elevation = elevation;
        self
    }

    pub fn is_privileged(&self) -> bool {
        self.elevation != Elevation::None
    }
}

/// Renders the command as a user would type it.
impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.elevation == Elevation::Sudo {
            f.write_str("sudo ")?;
        }
        f.write_str(&shell_quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(arg))?;
        }
        Ok(())
    }
}

fn shell_quote(word: &str) -> String {
    if !word.is_empty() && !word.contains(|c: char| c.is_whitespace() || c == '"' || c == '\'') {
        word.to_string()
    } else {
        format!("\"{}\"", word.replace('"', "\\\""))
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success() -> Self {
        Self {
            success: true,
            code: Some(0),
            ..Self::default()
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(code),
            stderr: stderr.into(),
            ..Self::default()
        }
    }

    /// Most useful one-line description of why the command failed.
    pub fn failure_summary(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.code {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Runs external programs and reports their exit status and output.
pub trait CommandRunner {
    /// Run `command` to completion. No timeout is applied.
    fn run(&self, command: &CommandSpec) -> io::Result<CommandOutput>;

    /// True when `tool` can be found on `PATH`.
    fn tool_exists(&self, tool: &str) -> bool;
}

/// Runs commands on the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner {
    /// The process already holds the privileges `sudo` would grant.
    pub elevated: bool,
}

impl SystemRunner {
    pub fn new(elevated: bool) -> Self {
        Self { elevated }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutput> {
        let mut command = if spec.elevation == Elevation::Sudo && !self.elevated {
            let mut sudo = Command::new("sudo");
            sudo.arg(&spec.program);
            sudo
        } else {
            Command::new(&spec.program)
        };
        command.args(&spec.args);
        // sudo may need to ask for a password
        command.stdin(Stdio::inherit());

        debug!(command = %spec, "running external command");
        let output = command.output()?;

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn tool_exists(&self, tool: &str) -> bool {
        let Some(path) = env::var_os("PATH") else {
            return false;
        };
        env::split_paths(&path).any(|dir| {
            let candidate = dir.join(tool);
            candidate.is_file() || (cfg!(windows) && candidate.with_extension("exe").is_file())
        })
    }
}

/// Asks the user before a privileged step.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;

    /// Confirmation for a step that destroys existing state.
    fn confirm_destructive(&self, prompt: &str) -> bool {
        self.confirm(prompt)
    }
}

/// Interactive terminal prompt. `confirm` answers `[Y/n]` (empty means yes),
/// `confirm_destructive` answers `[y/N]` (empty means no).
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinConfirm;

impl StdinConfirm {
    fn ask(prompt: &str, default_yes: bool) -> bool {
        let hint = if default_yes { "[Y/n]" } else { "[y/N]" };
        print!("{} {} ", prompt, hint);
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        answer_is_yes(&answer, default_yes)
    }
}

impl Confirm for StdinConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        Self::ask(prompt, true)
    }

    fn confirm_destructive(&self, prompt: &str) -> bool {
        Self::ask(prompt, false)
    }
}

fn answer_is_yes(answer: &str, default_yes: bool) -> bool {
    match answer.trim().to_ascii_lowercase().as_str() {
        "" => default_yes,
        "y" | "yes" => true,
        _ => false,
    }
}

/// Non-interactive confirmation (`--yes`).
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_answer_follows_default() {
        assert!(answer_is_yes("\n", true));
        assert!(!answer_is_yes("\n", false));
        assert!(answer_is_yes(" Yes\n", false));
        assert!(!answer_is_yes("n\n", true));
        assert!(!answer_is_yes("maybe\n", true));
    }

    #[test]
    fn test_assume_yes_confirms_destructive() {
        assert!(AssumeYes.confirm_destructive("Replace the existing CA?"));
    }

    #[test]
    fn test_display_prefixes_sudo() {
        let spec = CommandSpec::new("update-ca-certificates").elevation(Elevation::Sudo);
        assert_eq!(spec.to_string(), "sudo update-ca-certificates");
        assert!(spec.is_privileged());
    }

    #[test]
    fn test_display_quotes_spaces() {
        let spec = CommandSpec::new("certutil")
            .args(["-A", "-t", "C,,", "-n"])
            .arg("localtls Local CA");
        assert_eq!(spec.to_string(), "certutil -A -t C,, -n \"localtls Local CA\"");
    }

    #[test]
    fn test_administrator_has_no_sudo() {
        let spec = CommandSpec::new("certutil")
            .args(["-addstore", "Root", "ca.crt"])
            .elevation(Elevation::Administrator);
        assert_eq!(spec.to_string(), "certutil -addstore Root ca.crt");
    }

    #[test]
    fn test_failure_summary_prefers_stderr() {
        let mut output = CommandOutput::failure(1, "  permission denied \n");
        output.stdout = "ignored".to_string();
        assert_eq!(output.failure_summary(), "permission denied");

        let output = CommandOutput::failure(3, "");
        assert_eq!(output.failure_summary(), "exit code 3");
    }

    #[test]
    fn test_assume_yes() {
        assert!(AssumeYes.confirm("anything"));
    }
}
