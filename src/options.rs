//! Boundary to the option processor.
//!
//! Built-in commands declare their options as `argh::FromArgs` structs; the
//! schema is generated at compile time, so turning an argument vector into a
//! command value is a pure function of `(schema, argv)`.

use argh::{EarlyExit, FromArgs};
use thiserror::Error;

/// Flags that always request usage text, wherever they appear before `--`.
pub const HELP_FLAGS: [&str; 2] = ["--help", "-h"];

/// An argument vector the option processor rejected.
#[derive(Debug, Error)]
#[error("{command}: {message}")]
pub struct ArgsError {
    pub command: String,
    pub message: String,
}

/// Result of running an argument vector through a command's schema.
#[derive(Debug)]
pub enum ArgsOutcome<T> {
    Ready(T),
    /// Usage text to print instead of running the command.
    HelpRequested(String),
    Invalid(ArgsError),
}

impl<T> ArgsOutcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ArgsOutcome<U> {
        match self {
            ArgsOutcome::Ready(t) => ArgsOutcome::Ready(f(t)),
            ArgsOutcome::HelpRequested(usage) => ArgsOutcome::HelpRequested(usage),
            ArgsOutcome::Invalid(err) => ArgsOutcome::Invalid(err),
        }
    }
}

/// Whether `args` asks for help before any `--` terminator.
pub fn wants_help(args: &[&str]) -> bool {
    args.iter()
        .take_while(|a| **a != "--")
        .any(|a| HELP_FLAGS.contains(a))
}

/// Usage text argh renders for `T` under the given command name.
pub fn usage<T: FromArgs>(name: &str) -> String {
    match T::from_args(&[name], &["--help"]) {
        Err(EarlyExit { output, .. }) => output,
        Ok(_) => format!("Usage: {name}\n"),
    }
}

/// First paragraph after the `Usage:` line of argh's help output.
pub fn summary_from_usage(usage: &str) -> String {
    usage
        .lines()
        .skip_while(|l| !l.trim().is_empty())
        .find(|l| !l.trim().is_empty())
        .map(|l| l.trim().to_string())
        .unwrap_or_default()
}

/// Run `args` through the schema of `T`.
pub fn process<T: FromArgs>(name: &str, args: &[&str]) -> ArgsOutcome<T> {
    if wants_help(args) {
        return ArgsOutcome::HelpRequested(usage::<T>(name));
    }
    match T::from_args(&[name], args) {
        Ok(value) => ArgsOutcome::Ready(value),
        Err(EarlyExit { output, status: Ok(()) }) => ArgsOutcome::HelpRequested(output),
        Err(EarlyExit { output, status: Err(()) }) => ArgsOutcome::Invalid(ArgsError {
            command: name.to_string(),
            message: output.trim().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(FromArgs, Debug)]
    /// greet somebody.
    struct Greet {
        #[argh(switch, short = 'l')]
        /// shout the greeting.
        loud: bool,

        #[argh(positional)]
        /// who to greet.
        name: String,
    }

    #[test]
    fn test_ready() {
        match process::<Greet>("greet", &["-l", "bob"]) {
            ArgsOutcome::Ready(g) => {
                assert!(g.loud);
                assert_eq!(g.name, "bob");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_help_flags_short_circuit() {
        for flag in HELP_FLAGS {
            match process::<Greet>("greet", &["bob", flag]) {
                ArgsOutcome::HelpRequested(usage) => {
                    assert!(usage.contains("greet"));
                    assert_eq!(summary_from_usage(&usage), "greet somebody.");
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_help_after_terminator_is_positional() {
        assert!(!wants_help(&["--", "--help"]));
        assert!(wants_help(&["-h", "--"]));
    }

    #[test]
    fn test_invalid_arguments() {
        match process::<Greet>("greet", &["--bogus", "bob"]) {
            ArgsOutcome::Invalid(err) => {
                assert_eq!(err.command, "greet");
                assert!(!err.message.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(process::<Greet>("greet", &[]), ArgsOutcome::Invalid(_)));
    }
}
