use serde_json::Value;
use thiserror::Error;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
pub type ExitCode = i32;

/// Exit code returned by commands that have nothing better to report.
pub const SUCCESS: ExitCode = 0;

/// Control-flow signal raised by a command.
///
/// Notifications travel through the same `Err` path as failures so a command
/// can raise one with `?`, but the invocation lifecycle pulls them out before
/// anything is treated as a failure. They always win over concurrent
/// failures in a pipeline.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum Notification {
    /// Leave the shell with the given code.
    #[error("exit requested with code {0}")]
    Exit(ExitCode),
}

/// Outcome of one invocation (or of a whole pipeline).
#[derive(Debug)]
pub enum CommandResult {
    Value(Value),
    Failure(anyhow::Error),
    Notification(Notification),
}

impl CommandResult {
    /// `Value(SUCCESS)`.
    pub fn success() -> Self {
        CommandResult::Value(Value::from(SUCCESS))
    }

    /// Split an action's return into the three outcomes.
    ///
    /// A [`Notification`] anywhere in the error (also under added context)
    /// becomes `Notification`; everything else is a `Failure`.
    pub fn from_outcome(outcome: anyhow::Result<Value>) -> Self {
        match outcome {
            Ok(value) => CommandResult::Value(value),
            Err(err) => match err.downcast_ref::<Notification>() {
                Some(n) => CommandResult::Notification(*n),
                None => CommandResult::Failure(err),
            },
        }
    }

    pub fn is_value(&self) -> bool {
        matches!(self, CommandResult::Value(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, CommandResult::Failure(_))
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            CommandResult::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&anyhow::Error> {
        match self {
            CommandResult::Failure(e) => Some(e),
            _ => None,
        }
    }

    pub fn notification(&self) -> Option<Notification> {
        match self {
            CommandResult::Notification(n) => Some(*n),
            _ => None,
        }
    }

    /// Collapse into a `Result`, turning a notification back into an error
    /// that can be downcast to [`Notification`].
    pub fn into_result(self) -> anyhow::Result<Value> {
        match self {
            CommandResult::Value(v) => Ok(v),
            CommandResult::Failure(e) => Err(e),
            CommandResult::Notification(n) => Err(n.into()),
        }
    }
}
