//! Command steps: shell commands plus their scheduling attributes.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::Serialize;

use super::{Step, StepKind};

/// A single shell command with an optional per-command timeout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Command {
    command: String,
    timeout_minutes: Option<u32>,
}

impl Command {
    /// # Panics
    ///
    /// Panics on an empty command string.
    pub fn new(command: impl Into<String>) -> Self {
        let command = command.into();
        assert!(!command.is_empty(), "command must not be empty");
        Self {
            command,
            timeout_minutes: None,
        }
    }

    /// A command that contributes `minutes` to the step's effective timeout.
    ///
    /// # Panics
    ///
    /// Panics on an empty command string or a zero timeout.
    pub fn with_timeout(command: impl Into<String>, minutes: u32) -> Self {
        assert!(minutes >= 1, "command timeout must be at least one minute");
        let mut command = Self::new(command);
        command.timeout_minutes = Some(minutes);
        command
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn set_command(&mut self, command: impl Into<String>) {
        let command = command.into();
        assert!(!command.is_empty(), "command must not be empty");
        self.command = command;
    }

    pub fn timeout_minutes(&self) -> Option<u32> {
        self.timeout_minutes
    }
}

impl From<&str> for Command {
    fn from(command: &str) -> Self {
        Command::new(command)
    }
}

impl From<String> for Command {
    fn from(command: String) -> Self {
        Command::new(command)
    }
}

/// An exit status a command step tolerates without failing the build.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExitStatus {
    Code(i32),
    All,
}

/// Step-level timeout. `Forever` suppresses the per-command sum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Timeout {
    Minutes(u32),
    Forever,
}

#[derive(Clone, Default)]
pub(crate) struct ManualRetry {
    pub(crate) allowed: bool,
    pub(crate) permit_on_passed: bool,
    pub(crate) reason: Option<String>,
}

#[derive(Clone, Default)]
pub(crate) struct Retry {
    pub(crate) automatic_limit: Option<u32>,
    pub(crate) manual: Option<ManualRetry>,
}

impl Retry {
    pub(crate) fn has_value(&self) -> bool {
        self.automatic_limit.is_some()
            || self
                .manual
                .as_ref()
                .is_some_and(|manual| !manual.allowed || manual.permit_on_passed)
    }
}

#[derive(Clone)]
pub(crate) struct Plugin {
    pub(crate) name: String,
    pub(crate) config: serde_json::Value,
}

#[derive(Clone, Default)]
pub(crate) struct CommandAttrs {
    pub(crate) label: Option<String>,
    pub(crate) commands: Vec<Command>,
    pub(crate) env: IndexMap<String, String>,
    pub(crate) agents: IndexMap<String, String>,
    pub(crate) artifact_paths: Vec<String>,
    pub(crate) branches: BTreeSet<String>,
    pub(crate) parallelism: Option<u32>,
    pub(crate) concurrency: Option<(u32, String)>,
    pub(crate) timeout: Option<Timeout>,
    pub(crate) skip: bool,
    pub(crate) soft_fail: BTreeSet<ExitStatus>,
    pub(crate) plugins: Vec<Plugin>,
    pub(crate) retry: Retry,
}

impl CommandAttrs {
    pub(crate) fn display_name(&self) -> String {
        if let Some(label) = &self.label {
            return label.clone();
        }
        let joined = self
            .commands
            .iter()
            .map(Command::command)
            .collect::<Vec<_>>()
            .join(" && ");
        format!("<{joined}>")
    }

    /// The timeout serialized for the whole step: an explicit value wins,
    /// otherwise the sum of per-command timeouts when every command carries
    /// one.
    pub(crate) fn effective_timeout_minutes(&self) -> Option<u32> {
        match self.timeout {
            Some(Timeout::Minutes(minutes)) => Some(minutes),
            Some(Timeout::Forever) => None,
            None => {
                let mut total = 0u32;
                for command in &self.commands {
                    total += command.timeout_minutes()?;
                }
                (total > 0).then_some(total)
            }
        }
    }
}

impl Step {
    /// A command step running a single shell command.
    ///
    /// # Panics
    ///
    /// Panics on an empty command string.
    pub fn command(command: impl Into<Command>) -> Step {
        Step::from_kind(StepKind::Command(CommandAttrs {
            commands: vec![command.into()],
            ..CommandAttrs::default()
        }))
    }

    fn command_attrs<R>(&self, apply: impl FnOnce(&mut CommandAttrs) -> R) -> R {
        match &mut self.state_mut().kind {
            StepKind::Command(attrs) => apply(attrs),
            _ => panic!("builder is only valid on command steps"),
        }
    }

    /// Appends another command; commands run in order within the step.
    pub fn add_command(self, command: impl Into<Command>) -> Self {
        let command = command.into();
        self.command_attrs(|attrs| attrs.commands.push(command));
        self
    }

    pub fn with_env(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let (key, value) = (key.into(), value.into());
        assert!(!key.is_empty(), "env key must not be empty");
        self.command_attrs(|attrs| attrs.env.insert(key, value));
        self
    }

    pub fn with_agent(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let (key, value) = (key.into(), value.into());
        assert!(!key.is_empty(), "agent key must not be empty");
        assert!(!value.is_empty(), "agent value must not be empty");
        self.command_attrs(|attrs| attrs.agents.insert(key, value));
        self
    }

    pub fn with_artifact_path(self, glob: impl Into<String>) -> Self {
        let glob = glob.into();
        assert!(!glob.is_empty(), "artifact path must not be empty");
        self.command_attrs(|attrs| {
            if !attrs.artifact_paths.contains(&glob) {
                attrs.artifact_paths.push(glob);
            }
        });
        self
    }

    /// # Panics
    ///
    /// Panics when `parallelism` is zero.
    pub fn with_parallelism(self, parallelism: u32) -> Self {
        assert!(parallelism >= 1, "parallelism must be at least 1");
        self.command_attrs(|attrs| attrs.parallelism = Some(parallelism));
        self
    }

    /// # Panics
    ///
    /// Panics when `concurrency` is zero.
    pub fn with_concurrency(self, concurrency: u32, group: impl Into<String>) -> Self {
        assert!(concurrency >= 1, "concurrency must be at least 1");
        let group = group.into();
        self.command_attrs(|attrs| attrs.concurrency = Some((concurrency, group)));
        self
    }

    /// # Panics
    ///
    /// Panics when `minutes` is zero.
    pub fn with_timeout_minutes(self, minutes: u32) -> Self {
        assert!(minutes >= 1, "timeout must be at least one minute");
        self.command_attrs(|attrs| attrs.timeout = Some(Timeout::Minutes(minutes)));
        self
    }

    /// Lets the step run forever, ignoring any per-command timeouts.
    pub fn with_timeout_all(self) -> Self {
        self.command_attrs(|attrs| attrs.timeout = Some(Timeout::Forever));
        self
    }

    pub fn skip(self, skip: bool) -> Self {
        self.command_attrs(|attrs| attrs.skip = skip);
        self
    }

    /// Tolerates any non-zero exit status.
    pub fn with_soft_fail_all(self) -> Self {
        self.command_attrs(|attrs| attrs.soft_fail.insert(ExitStatus::All));
        self
    }

    /// Tolerates the given exit status.
    pub fn with_soft_fail(self, exit_status: i32) -> Self {
        self.command_attrs(|attrs| attrs.soft_fail.insert(ExitStatus::Code(exit_status)));
        self
    }

    /// # Panics
    ///
    /// Panics on an empty plugin name.
    pub fn with_plugin(self, name: impl Into<String>, config: serde_json::Value) -> Self {
        let name = name.into();
        assert!(!name.is_empty(), "plugin name must not be empty");
        self.command_attrs(|attrs| attrs.plugins.push(Plugin { name, config }));
        self
    }

    /// Retries the step automatically up to `limit` times.
    ///
    /// # Panics
    ///
    /// Panics when `limit` is zero.
    pub fn with_retry_limit(self, limit: u32) -> Self {
        assert!(limit >= 1, "retry limit must be at least 1");
        self.command_attrs(|attrs| attrs.retry.automatic_limit = Some(limit));
        self
    }

    pub fn with_manual_retry(
        self,
        allowed: bool,
        permit_on_passed: bool,
        reason: Option<&str>,
    ) -> Self {
        self.command_attrs(|attrs| {
            attrs.retry.manual = Some(ManualRetry {
                allowed,
                permit_on_passed,
                reason: reason.map(str::to_string),
            })
        });
        self
    }

    /// The step's commands. Empty for block and trigger steps.
    pub fn commands(&self) -> Vec<Command> {
        match &self.state().kind {
            StepKind::Command(attrs) => attrs.commands.clone(),
            _ => Vec::new(),
        }
    }

    /// Replaces the step's commands. Valid on command steps.
    pub fn set_commands(&self, commands: Vec<Command>) {
        self.command_attrs(|attrs| attrs.commands = commands);
    }

    pub(crate) fn is_command(&self) -> bool {
        matches!(self.state().kind, StepKind::Command(_))
    }
}
