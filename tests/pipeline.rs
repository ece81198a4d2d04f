use cmdshell::{
    ClosureCommand, CommandResult, Interpreter, MemReader, MemWriter, Notification, Pipeline, ShellConfig, Stage,
    Value,
};
use serde_json::json;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

fn shell(config: ShellConfig) -> (Interpreter, MemWriter, MemWriter) {
    let (out, err) = (MemWriter::new(), MemWriter::new());
    let sh = Interpreter::new(config).with_io(MemReader::empty(), out.clone(), err.clone());
    (sh, out, err)
}

fn sum_command() -> ClosureCommand {
    ClosureCommand::new("math/sum", |ctx| {
        let mut text = String::new();
        ctx.io.input.read_to_string(&mut text)?;
        let total = text
            .split_whitespace()
            .map(str::parse::<i64>)
            .sum::<Result<i64, _>>()?;
        writeln!(ctx.io.output, "{}", total)?;
        Ok(json!(total))
    })
    .with_summary("Add the numbers read from standard input.")
}

#[test]
fn embedded_command_joins_builtin_pipeline() {
    let (mut sh, out, _) = shell(ShellConfig::default());
    sh.registry().register(sum_command().into_command()).unwrap();

    let result = sh.execute("echo 1 2 3 | math/sum").unwrap();
    assert_eq!(result.value(), Some(&json!(6)));

    assert!(sh.execute("echo 1 | sum").unwrap().is_failure());
    sh.execute("set CMD_PATH text:math").unwrap();
    let result = sh.execute("echo 4 5 | sum").unwrap();
    assert_eq!(result.value(), Some(&json!(9)));
    assert_eq!(out.text(), "6\n9\n");
}

#[test]
fn failures_carry_the_command_error() {
    let (mut sh, _, err) = shell(ShellConfig::default());
    sh.registry().register(sum_command().into_command()).unwrap();

    let result = sh.execute("echo 1 two | math/sum").unwrap();
    let failure = result.failure().unwrap();
    assert!(failure.root_cause().is::<std::num::ParseIntError>());

    sh.run_line("echo 1 two | math/sum");
    assert!(err.text().starts_with("error: invalid digit"));
}

#[test]
fn help_flags_describe_embedded_commands() {
    let (mut sh, out, _) = shell(ShellConfig::default());
    sh.registry().register(sum_command().into_command()).unwrap();

    let result = sh.execute("math/sum --help").unwrap();
    assert!(result.is_value());
    assert!(out.text().starts_with("Usage: math/sum"));
    assert!(out.text().contains("Add the numbers"));
}

#[test]
fn commands_reach_the_invoking_scope_through_parent() {
    let (mut sh, _, _) = shell(ShellConfig::default());
    sh.registry()
        .register(
            ClosureCommand::new("remember", |ctx| {
                ctx.scope.set("scratch", true)?;
                let parent = ctx.scope.parent().expect("invocation scope has a parent");
                parent.set("kept", ctx.args.join(" "))?;
                Ok(Value::Null)
            })
            .into_command(),
        )
        .unwrap();

    sh.execute("remember this line").unwrap();
    assert_eq!(sh.scope().get("kept"), Some(json!("this line")));
    assert!(!sh.scope().contains("scratch"));
}

#[test]
fn concurrent_stages_writing_one_name_leave_one_value() {
    let (mut sh, _, _) = shell(ShellConfig::default());
    sh.registry()
        .register(
            ClosureCommand::new("claim", |ctx| {
                let parent = ctx.scope.parent().expect("invocation scope has a parent");
                parent.set("owner", ctx.meta.seq)?;
                Ok(json!(ctx.meta.seq))
            })
            .into_command(),
        )
        .unwrap();

    let result = sh.execute("claim | claim | claim").unwrap();
    assert!(result.is_value());
    let owner = sh.scope().get("owner").and_then(|v| v.as_u64()).unwrap();
    assert!(owner < 3);
}

#[test]
fn invocation_ids_are_unique_for_the_session() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (mut sh, _, _) = shell(ShellConfig::default());
    let record = Arc::clone(&seen);
    sh.registry()
        .register(
            ClosureCommand::new("id", move |ctx| {
                record.lock().unwrap().push(ctx.meta.seq);
                Ok(Value::Null)
            })
            .into_command(),
        )
        .unwrap();

    sh.execute("id | id; id").unwrap();
    sh.execute("id | id | id").unwrap();

    let mut ids = seen.lock().unwrap().clone();
    assert_eq!(ids.len(), 6);
    ids.sort();
    ids.dedup();
    assert_eq!(ids, vec![0, 1, 2, 3, 4, 5]);
}

#[test]
fn alias_is_visible_in_invocation_metadata() {
    let (mut sh, _, _) = shell(ShellConfig::default());
    sh.registry()
        .register(
            ClosureCommand::new("tools/whoami", |ctx| Ok(json!({ "id": ctx.meta.id, "alias": ctx.meta.alias })))
                .with_alias("me")
                .into_command(),
        )
        .unwrap();

    let direct = sh.execute("tools/whoami").unwrap();
    assert_eq!(direct.value(), Some(&json!({"id": "tools/whoami", "alias": null})));
    let aliased = sh.execute("me").unwrap();
    assert_eq!(aliased.value(), Some(&json!({"id": "tools/whoami", "alias": "me"})));
}

#[test]
fn small_pipes_carry_large_streams() {
    let (mut sh, _, _) = shell(ShellConfig::default().pipe_capacity(16));
    sh.registry()
        .register(
            ClosureCommand::new("produce", |ctx| {
                let chunk = [b'z'; 4096];
                for _ in 0..256 {
                    ctx.io.output.write_all(&chunk)?;
                }
                Ok(Value::Null)
            })
            .into_command(),
        )
        .unwrap();

    let result = sh.execute("produce | cat | wc").unwrap();
    assert_eq!(result.value().unwrap()["bytes"], json!(1024 * 1024));
}

#[test]
fn early_exit_downstream_stops_endless_producer() {
    let (mut sh, _, _) = shell(ShellConfig::default().pipe_capacity(64));
    sh.registry()
        .register(
            ClosureCommand::new("yes", |ctx| loop {
                ctx.io.output.write_all(b"y\n")?;
            })
            .into_command(),
        )
        .unwrap();
    sh.registry()
        .register(
            ClosureCommand::new("first", |ctx| {
                let mut byte = [0u8; 1];
                ctx.io.input.read_exact(&mut byte)?;
                Err(Notification::Exit(byte[0] as i32).into())
            })
            .into_command(),
        )
        .unwrap();

    let result = sh.execute("yes | first").unwrap();
    assert_eq!(result.notification(), Some(Notification::Exit(b'y' as i32)));
}

#[test]
fn prebuilt_pipelines_run_directly() {
    let (mut sh, out, _) = shell(ShellConfig::default());
    let pipeline = Pipeline::new(vec![
        Stage::new(["echo", "${not interpolated}"]).unwrap(),
        Stage::new(["text/grep", "interp"]).unwrap(),
    ])
    .unwrap();

    let result = sh.run_pipeline(&pipeline);
    assert_eq!(result.value(), Some(&json!(1)));
    assert_eq!(out.text(), "${not interpolated}\n");
}

#[test]
fn structured_values_expand_by_member() {
    let (mut sh, out, _) = shell(ShellConfig::default());
    sh.execute(r#"set --json user '{"name": "ada", "tags": ["x", "y"]}'"#)
        .unwrap();
    sh.execute("echo ${user.name} ${user.tags.1} [${user.missing}]").unwrap();
    assert_eq!(out.text(), "ada y []\n");
}

#[test]
fn last_value_is_kept_between_lines() {
    let (mut sh, out, _) = shell(ShellConfig::default());
    sh.execute("echo a b c | wc").unwrap();
    sh.execute("echo ${_.words}").unwrap();
    assert_eq!(out.text(), "1 3 6\n3\n");
}

#[test]
fn exit_notification_wins_over_failures() {
    let (mut sh, _, _) = shell(ShellConfig::default());
    match sh.execute("nope | exit 5 | text/grep (").unwrap() {
        CommandResult::Notification(Notification::Exit(code)) => assert_eq!(code, 5),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn panicking_command_fails_without_ending_the_session() {
    let (mut sh, out, err) = shell(ShellConfig::default());
    sh.registry()
        .register(ClosureCommand::new("boom", |_| panic!("kaboom")).into_command())
        .unwrap();

    let alone = sh.execute("boom").unwrap();
    assert_eq!(alone.failure().unwrap().to_string(), "command panicked: kaboom");
    assert!(sh.execute("boom | cat").unwrap().is_failure());

    assert_eq!(sh.run_command("boom"), 1);
    assert!(err.text().contains("command panicked: kaboom"));
    sh.execute("echo still here").unwrap();
    assert_eq!(out.text(), "still here\n");
}
