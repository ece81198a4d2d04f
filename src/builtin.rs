use crate::command::{BuiltinCommand, CommandContext, Factory};
use crate::namespace::NamespaceError;
use crate::options::ArgsOutcome;
use crate::registry::Registry;
use crate::result::{ExitCode, Notification, SUCCESS};
use crate::scope::Scope;
use anyhow::{Context, Result, anyhow, bail};
use argh::FromArgs;
use regex::RegexBuilder;
use serde_json::{Map, Value, json};
use std::fs;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::sync::Arc;

/// Register every built-in command with `registry`.
pub fn register_builtins(registry: &Registry) -> Result<(), NamespaceError> {
    registry.register(Factory::<Echo>::new())?;
    registry.register(Factory::<Cat>::new())?;
    registry.register(Factory::<WC>::new())?;
    registry.register(Factory::<Grep>::new())?;
    registry.register(Factory::<Exit>::new())?;
    registry.register(Factory::<Set>::new())?;
    registry.register(Factory::<Unset>::new())?;
    registry.register(Factory::<Vars>::new())?;
    registry.register(Factory::<Alias>::new())?;
    registry.register(Factory::<Help>::new())?;
    Ok(())
}

/// Scope the session-level builtins read and write: the one the command was
/// invoked from, unless `local` asks for the invocation's own scope.
fn target_scope(ctx: &CommandContext<'_>, local: bool) -> Arc<Scope> {
    match ctx.scope.parent() {
        Some(parent) if !local => Arc::clone(parent),
        _ => Arc::clone(&ctx.scope),
    }
}

#[derive(FromArgs)]
/// Leave the shell.
pub struct Exit {
    #[argh(positional)]
    /// exit code, 0 when omitted.
    pub code: Option<ExitCode>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn aliases() -> &'static [&'static str] {
        &["quit"]
    }

    fn execute(self, _ctx: &mut CommandContext<'_>) -> Result<Value> {
        Err(Notification::Exit(self.code.unwrap_or(SUCCESS)).into())
    }
}

#[derive(FromArgs)]
/// Write the arguments to standard output, separated by spaces.
pub struct Echo {
    #[argh(switch, short = 'n')]
    /// do not output the trailing newline.
    pub no_newline: bool,

    #[argh(positional, greedy)]
    /// values to print as-is, separated by spaces.
    pub args: Vec<String>,
}

impl BuiltinCommand for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn execute(self, ctx: &mut CommandContext<'_>) -> Result<Value> {
        let s = self.args.join(" ");
        if self.no_newline {
            write!(ctx.io.output, "{}", s)?;
        } else {
            writeln!(ctx.io.output, "{}", s)?;
        }
        Ok(Value::String(s))
    }
}

fn count(text: &str) -> Value {
    json!({
        "lines": text.lines().count(),
        "words": text.split_whitespace().count(),
        "bytes": text.len(),
    })
}

#[derive(FromArgs)]
/// Count lines, words and bytes.
pub struct WC {
    #[argh(positional, greedy)]
    /// files to count; standard input when omitted.
    pub files: Vec<String>,
}

impl BuiltinCommand for WC {
    fn name() -> &'static str {
        "wc"
    }

    fn group() -> Option<&'static str> {
        Some("text")
    }

    fn execute(self, ctx: &mut CommandContext<'_>) -> Result<Value> {
        if self.files.is_empty() {
            let mut buf = String::new();
            ctx.io.input.read_to_string(&mut buf)?;
            let counts = count(&buf);
            writeln!(ctx.io.output, "{} {} {}", counts["lines"], counts["words"], counts["bytes"])?;
            return Ok(counts);
        }

        let (mut lines, mut words, mut bytes) = (0, 0, 0);
        for fname in &self.files {
            let s = fs::read_to_string(fname).map_err(|e| anyhow!("wc: {}: {}", fname, e))?;
            let counts = count(&s);
            writeln!(
                ctx.io.output,
                "{} {} {} {}",
                counts["lines"], counts["words"], counts["bytes"], fname
            )?;
            lines += s.lines().count();
            words += s.split_whitespace().count();
            bytes += s.len();
        }
        Ok(json!({ "lines": lines, "words": words, "bytes": bytes }))
    }
}

#[derive(FromArgs)]
/// Copy files, or standard input, to standard output.
pub struct Cat {
    #[argh(positional, greedy)]
    /// files to print in order.
    pub files: Vec<String>,
}

impl BuiltinCommand for Cat {
    fn name() -> &'static str {
        "cat"
    }

    fn execute(self, ctx: &mut CommandContext<'_>) -> Result<Value> {
        if self.files.is_empty() {
            let copied = io::copy(&mut ctx.io.input, &mut ctx.io.output)?;
            return Ok(json!(copied));
        }
        let mut copied = 0;
        for fname in &self.files {
            let mut f = fs::File::open(fname).map_err(|e| anyhow!("cat: {}: {}", fname, e))?;
            copied += io::copy(&mut f, &mut ctx.io.output)?;
        }
        Ok(json!(copied))
    }
}

#[derive(FromArgs)]
/// Print lines matching a pattern.
pub struct Grep {
    #[argh(positional)]
    /// the pattern to search for (a regular expression).
    pub pattern: String,

    #[argh(positional, greedy)]
    /// files to search; standard input when omitted.
    pub files: Vec<String>,

    #[argh(switch, short = 'w')]
    /// match only whole words (using non-word characters as boundaries).
    pub word_regexp: bool,

    #[argh(switch, short = 'i')]
    /// ignore case distinctions.
    pub ignore_case: bool,

    #[argh(option, short = 'A', default = "0")]
    /// print NUM lines of trailing context after matching lines.
    pub after_context: usize,
}

impl Grep {
    /// Print the matching lines of one source. Returns how many lines matched.
    fn process_source(
        &self,
        reader: &mut dyn Read,
        stdout: &mut dyn Write,
        file_name: Option<&str>,
        re: &regex::Regex,
    ) -> Result<usize> {
        let mut reader = BufReader::new(reader);

        let mut lines = Vec::new();
        let mut match_indices = Vec::new();

        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).context("read error")? == 0 {
                break;
            }
            if re.is_match(&line) {
                match_indices.push(lines.len());
            }
            lines.push(line);
        }

        let total_lines = lines.len();
        let mut to_print = vec![false; total_lines];
        for &match_line in &match_indices {
            let end_print = (match_line + self.after_context + 1).min(total_lines);
            to_print[match_line..end_print].fill(true);
        }

        let prefix = file_name.map(|name| format!("{}:", name)).unwrap_or_default();
        let mut last_printed: Option<usize> = None;

        for (i, line) in lines.iter().enumerate() {
            if !to_print[i] {
                continue;
            }
            if self.after_context > 0 && last_printed.is_some_and(|last| i > last + 1) {
                stdout.write_all(b"--\n")?;
            }
            write!(stdout, "{}{}", prefix, line)?;
            if !line.ends_with('\n') {
                writeln!(stdout)?;
            }
            last_printed = Some(i);
        }

        Ok(match_indices.len())
    }
}

impl BuiltinCommand for Grep {
    fn name() -> &'static str {
        "grep"
    }

    fn group() -> Option<&'static str> {
        Some("text")
    }

    fn execute(self, ctx: &mut CommandContext<'_>) -> Result<Value> {
        let pattern = if self.word_regexp {
            format!(r"\b({})\b", self.pattern)
        } else {
            self.pattern.clone()
        };

        let re = RegexBuilder::new(&pattern)
            .case_insensitive(self.ignore_case)
            .build()
            .with_context(|| format!("invalid regex pattern: {}", pattern))?;

        if self.files.is_empty() {
            let matches = self.process_source(&mut *ctx.io.input, &mut *ctx.io.output, None, &re)?;
            return Ok(json!(matches));
        }

        let mut matches = 0;
        let mut unreadable = 0;
        for file_name in &self.files {
            let searched = fs::File::open(file_name)
                .map_err(anyhow::Error::from)
                .and_then(|mut f| self.process_source(&mut f, &mut *ctx.io.output, Some(file_name), &re));
            match searched {
                Ok(n) => matches += n,
                Err(e) => {
                    writeln!(ctx.io.error, "grep: {}: {}", file_name, e)?;
                    unreadable += 1;
                }
            }
        }
        if unreadable > 0 {
            bail!("grep: {} of {} files could not be searched", unreadable, self.files.len());
        }
        Ok(json!(matches))
    }
}

#[derive(FromArgs)]
/// Set a variable in the scope the command was invoked from.
pub struct Set {
    #[argh(switch, short = 'r')]
    /// make the variable read-only.
    pub readonly: bool,

    #[argh(switch)]
    /// set in the command's own scope, which is discarded afterwards.
    pub local: bool,

    #[argh(switch)]
    /// parse the value as JSON instead of taking it as a string.
    pub json: bool,

    #[argh(positional)]
    /// variable name.
    pub name: String,

    #[argh(positional)]
    /// new value; prints the current value when omitted.
    pub value: Option<String>,
}

impl BuiltinCommand for Set {
    fn name() -> &'static str {
        "set"
    }

    fn execute(self, ctx: &mut CommandContext<'_>) -> Result<Value> {
        let scope = target_scope(ctx, self.local);
        let Some(raw) = self.value else {
            let current = scope.get_or(&self.name, Value::Null);
            writeln!(ctx.io.output, "{}", current)?;
            return Ok(current);
        };
        let value = if self.json {
            serde_json::from_str(&raw).with_context(|| format!("set: invalid JSON for {}", self.name))?
        } else {
            Value::String(raw)
        };
        scope.set_with(self.name.as_str(), value.clone(), !self.readonly)?;
        Ok(value)
    }
}

#[derive(FromArgs)]
/// Remove a variable from the scope the command was invoked from.
pub struct Unset {
    #[argh(switch)]
    /// remove from the command's own scope instead.
    pub local: bool,

    #[argh(positional)]
    /// variable name.
    pub name: String,
}

impl BuiltinCommand for Unset {
    fn name() -> &'static str {
        "unset"
    }

    fn execute(self, ctx: &mut CommandContext<'_>) -> Result<Value> {
        let scope = target_scope(ctx, self.local);
        Ok(scope.unset(&self.name)?.unwrap_or(Value::Null))
    }
}

#[derive(FromArgs)]
/// List the variables visible from the invoking scope.
pub struct Vars {}

impl BuiltinCommand for Vars {
    fn name() -> &'static str {
        "vars"
    }

    fn execute(self, ctx: &mut CommandContext<'_>) -> Result<Value> {
        let scope = target_scope(ctx, false);
        let mut all = Map::new();
        for name in scope.visible_names() {
            let value = scope.get_or(&name, Value::Null);
            let mut line = format!("{}={}", name, value);
            if !scope.is_mutable(&name) {
                line.push_str(" (readonly)");
            }
            if scope.is_cloaked(&name) {
                line.push_str(" (cloaked)");
            }
            writeln!(ctx.io.output, "{}", line)?;
            all.insert(name, value);
        }
        Ok(Value::Object(all))
    }
}

#[derive(FromArgs)]
/// Define, show or delete command aliases.
pub struct Alias {
    #[argh(switch, short = 'd')]
    /// delete the named alias.
    pub delete: bool,

    #[argh(positional, greedy)]
    /// alias name and the command path it resolves to; lists every alias when empty.
    pub args: Vec<String>,
}

impl BuiltinCommand for Alias {
    fn name() -> &'static str {
        "alias"
    }

    fn execute(self, ctx: &mut CommandContext<'_>) -> Result<Value> {
        match self.args.as_slice() {
            [name] if self.delete => match ctx.registry.remove_alias(name) {
                Some(target) => Ok(Value::String(target)),
                None => bail!("alias: {}: not found", name),
            },
            _ if self.delete => bail!("alias: -d takes exactly one name"),
            [] => {
                let mut all = Map::new();
                for (name, target) in ctx.registry.aliases() {
                    writeln!(ctx.io.output, "{} -> {}", name, target)?;
                    all.insert(name, Value::String(target));
                }
                Ok(Value::Object(all))
            }
            [name] => {
                let target = ctx
                    .registry
                    .aliases()
                    .into_iter()
                    .find_map(|(n, t)| (n == *name).then_some(t))
                    .ok_or_else(|| anyhow!("alias: {}: not found", name))?;
                writeln!(ctx.io.output, "{} -> {}", name, target)?;
                Ok(Value::String(target))
            }
            [name, target] => {
                ctx.registry.register_alias(name, target)?;
                Ok(Value::String(target.clone()))
            }
            _ => bail!("alias: expected a name and at most one target"),
        }
    }
}

#[derive(FromArgs)]
/// List commands, or show the usage of one.
pub struct Help {
    #[argh(positional)]
    /// command path to describe.
    pub path: Option<String>,
}

impl BuiltinCommand for Help {
    fn name() -> &'static str {
        "help"
    }

    fn aliases() -> &'static [&'static str] {
        &["?"]
    }

    fn execute(self, ctx: &mut CommandContext<'_>) -> Result<Value> {
        if let Some(path) = self.path {
            let resolved = ctx.registry.resolve(&ctx.scope, &path)?;
            return match resolved.command.prepare(&path, &["--help"]) {
                ArgsOutcome::HelpRequested(usage) => {
                    ctx.io.output.write_all(usage.as_bytes())?;
                    Ok(Value::String(resolved.id))
                }
                _ => bail!("help: {} has no usage text", path),
            };
        }

        let commands = ctx.registry.commands();
        let width = commands.iter().map(|c| c.id().len()).max().unwrap_or(0);
        for command in &commands {
            writeln!(ctx.io.output, "{:width$}  {}", command.id(), command.summary())?;
        }
        let aliases = ctx.registry.aliases();
        if !aliases.is_empty() {
            writeln!(ctx.io.output)?;
            for (name, target) in aliases {
                writeln!(ctx.io.output, "{} -> {}", name, target)?;
            }
        }
        Ok(Value::Null)
    }
}
