//! Running one resolved command against one set of streams.

use crate::command::{CommandContext, InvocationMeta};
use crate::io::Streams;
use crate::options::ArgsOutcome;
use crate::registry::{Registry, Resolved};
use crate::result::CommandResult;
use crate::scope::Scope;
use anyhow::anyhow;
use std::any::Any;
use std::io::Write;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// Invoke `resolved` with `args` (the stage's arguments after the command
/// path).
///
/// The command runs in a fresh child of `ambient`. Help flags print usage to
/// the output stream and report success without running the action. A
/// panicking action is reported as a failure. The output and error streams
/// are flushed before returning; a failed flush is logged and otherwise
/// ignored so it cannot replace the command's own result.
#[tracing::instrument(level = "debug", skip_all, fields(id = %resolved.id, seq = seq))]
pub fn invoke(
    registry: &Registry,
    resolved: &Resolved,
    args: &[String],
    ambient: &Arc<Scope>,
    io: Streams<'_>,
    seq: u64,
) -> CommandResult {
    let mut ctx = CommandContext {
        args,
        io,
        scope: Scope::child(ambient),
        meta: InvocationMeta {
            id: resolved.id.clone(),
            alias: resolved.alias.clone(),
            seq,
        },
        registry,
    };

    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    let result = match resolved.command.prepare(&resolved.path, &arg_refs) {
        ArgsOutcome::HelpRequested(usage) => match ctx.io.output.write_all(usage.as_bytes()) {
            Ok(()) => CommandResult::success(),
            Err(e) => CommandResult::Failure(e.into()),
        },
        ArgsOutcome::Invalid(err) => CommandResult::Failure(err.into()),
        ArgsOutcome::Ready(action) => match catch_unwind(AssertUnwindSafe(|| action.run(&mut ctx))) {
            Ok(outcome) => CommandResult::from_outcome(outcome),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::warn!(panic = %message, "command panicked");
                CommandResult::Failure(anyhow!("command panicked: {message}"))
            }
        },
    };

    flush_quietly(&mut ctx.io);
    result
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn flush_quietly(io: &mut Streams<'_>) {
    if let Err(e) = io.output.flush() {
        tracing::debug!(error = %e, "ignoring failed flush of output stream");
    }
    if let Err(e) = io.error.flush() {
        tracing::debug!(error = %e, "ignoring failed flush of error stream");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ClosureCommand;
    use crate::io::{MemReader, MemWriter};
    use crate::options::ArgsError;
    use crate::result::{Notification, SUCCESS};
    use anyhow::anyhow;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn setup(command: ClosureCommand) -> (Registry, Resolved) {
        let registry = Registry::default();
        registry.register(command.into_command()).unwrap();
        let resolved = registry.resolve(&Scope::root(), "cmd").unwrap();
        (registry, resolved)
    }

    fn run(registry: &Registry, resolved: &Resolved, args: &[&str], out: &MemWriter) -> CommandResult {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let io = Streams::new(MemReader::empty(), out.clone(), MemWriter::new());
        invoke(registry, resolved, &args, &Scope::root(), io, 7)
    }

    #[test]
    fn test_value_is_returned() {
        let (reg, resolved) = setup(ClosureCommand::new("cmd", |_| Ok(json!(42))));
        let out = MemWriter::new();
        assert_eq!(run(&reg, &resolved, &[], &out).value(), Some(&json!(42)));
    }

    #[test]
    fn test_context_carries_args_io_scope_and_meta() {
        let (reg, resolved) = setup(ClosureCommand::new("cmd", |ctx| {
            writeln!(ctx.io.output, "{}", ctx.args.join(","))?;
            ctx.scope.set("local", 1)?;
            assert!(ctx.scope.parent().is_some());
            Ok(json!({ "id": ctx.meta.id, "seq": ctx.meta.seq }))
        }));
        let out = MemWriter::new();
        let result = run(&reg, &resolved, &["a", "b"], &out);
        assert_eq!(result.value(), Some(&json!({"id": "cmd", "seq": 7})));
        assert_eq!(out.text(), "a,b\n");
    }

    #[test]
    fn test_child_scope_writes_do_not_leak() {
        let (reg, resolved) = setup(ClosureCommand::new("cmd", |ctx| {
            ctx.scope.set("x", 2)?;
            Ok(Value::Null)
        }));
        let ambient = Scope::root();
        ambient.set("x", 1).unwrap();
        let io = Streams::new(MemReader::empty(), MemWriter::new(), MemWriter::new());
        assert!(invoke(&reg, &resolved, &[], &ambient, io, 0).is_value());
        assert_eq!(ambient.get("x"), Some(json!(1)));
    }

    #[test]
    fn test_help_never_runs_the_action() {
        static RAN: AtomicBool = AtomicBool::new(false);
        let (reg, resolved) = setup(
            ClosureCommand::new("cmd", |_| {
                RAN.store(true, Ordering::SeqCst);
                Ok(json!(1))
            })
            .with_summary("does things"),
        );
        for flag in ["--help", "-h"] {
            let out = MemWriter::new();
            let result = run(&reg, &resolved, &["x", flag], &out);
            assert_eq!(result.value(), Some(&json!(SUCCESS)));
            assert!(out.text().starts_with("Usage: cmd"));
            assert!(out.text().contains("does things"));
        }
        assert!(!RAN.load(Ordering::SeqCst));
    }

    #[test]
    fn test_errors_become_failures_and_notifications_stay_notifications() {
        let (reg, resolved) = setup(ClosureCommand::new("cmd", |ctx| match ctx.args.first().map(String::as_str) {
            Some("exit") => Err(Notification::Exit(4).into()),
            _ => Err(anyhow!("bad input")),
        }));
        let out = MemWriter::new();
        assert_eq!(
            run(&reg, &resolved, &["exit"], &out).notification(),
            Some(Notification::Exit(4))
        );
        let failed = run(&reg, &resolved, &["other"], &out);
        assert_eq!(failed.failure().unwrap().to_string(), "bad input");
    }

    #[test]
    fn test_invalid_arguments_are_failures() {
        let registry = Registry::default();
        registry.register(crate::command::Factory::<crate::builtin::Exit>::new()).unwrap();
        let resolved = registry.resolve(&Scope::root(), "exit").unwrap();
        let out = MemWriter::new();
        let result = run(&registry, &resolved, &["--bogus"], &out);
        assert!(result.failure().unwrap().downcast_ref::<ArgsError>().is_some());
    }

    #[test]
    fn test_panicking_action_is_failure() {
        let (reg, resolved) = setup(ClosureCommand::new("cmd", |ctx| {
            writeln!(ctx.io.output, "before")?;
            if ctx.args.is_empty() {
                panic!("kaboom");
            }
            panic!("{} things went wrong", ctx.args.len())
        }));
        let out = MemWriter::new();
        let failed = run(&reg, &resolved, &[], &out);
        assert_eq!(failed.failure().unwrap().to_string(), "command panicked: kaboom");
        assert_eq!(out.text(), "before\n");

        let failed = run(&reg, &resolved, &["a", "b"], &out);
        assert_eq!(
            failed.failure().unwrap().to_string(),
            "command panicked: 2 things went wrong"
        );
    }

    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"))
        }
    }

    #[test]
    fn test_flush_failure_does_not_mask_result() {
        let (reg, resolved) = setup(ClosureCommand::new("cmd", |_| Ok(json!("done"))));
        let io = Streams::new(MemReader::empty(), BrokenWriter, BrokenWriter);
        let result = invoke(&reg, &resolved, &[], &Scope::root(), io, 0);
        assert_eq!(result.value(), Some(&json!("done")));
    }
}
