use crate::io::Streams;
use crate::options::{self, ArgsOutcome};
use crate::registry::Registry;
use crate::scope::Scope;
use anyhow::Result;
use argh::FromArgs;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

/// Facts about the invocation a command is running as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationMeta {
    /// Registry identifier of the resolved command.
    pub id: String,
    /// Alias the command was reached through, if any.
    pub alias: Option<String>,
    /// Session-unique sequence number of this invocation.
    pub seq: u64,
}

/// Everything a command's action can see while it runs.
pub struct CommandContext<'a> {
    /// Raw argument vector, without the command path.
    pub args: &'a [String],
    pub io: Streams<'a>,
    /// Scope private to this invocation. Its parent is the invoking scope.
    pub scope: Arc<Scope>,
    pub meta: InvocationMeta,
    pub registry: &'a Registry,
}

/// Prepared invocation of a command, ready to run.
pub trait Action: Send {
    fn run(self: Box<Self>, ctx: &mut CommandContext<'_>) -> Result<Value>;
}

/// Object-safe trait for any command the registry can hold.
pub trait Command: Send + Sync {
    /// Identifier the command is registered and placed in the namespace under.
    fn id(&self) -> &str;

    /// Extra names that resolve to this command.
    fn aliases(&self) -> Vec<String> {
        Vec::new()
    }

    /// One-line description for listings.
    fn summary(&self) -> String {
        String::new()
    }

    /// Run `args` through the command's option schema.
    ///
    /// `name` is what the user typed, used in usage and error text.
    fn prepare(&self, name: &str, args: &[&str]) -> ArgsOutcome<Box<dyn Action>>;
}

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and wrapped into
/// a [`Command`] by [`Factory`].
pub trait BuiltinCommand: Sized + FromArgs + Send + 'static {
    /// Leaf name of the command, e.g. "echo".
    fn name() -> &'static str;

    /// Group the command lives in, e.g. `Some("text")` for `text/grep`.
    fn group() -> Option<&'static str> {
        None
    }

    fn aliases() -> &'static [&'static str] {
        &[]
    }

    fn execute(self, ctx: &mut CommandContext<'_>) -> Result<Value>;
}

impl<T: BuiltinCommand> Action for T {
    fn run(self: Box<Self>, ctx: &mut CommandContext<'_>) -> Result<Value> {
        T::execute(*self, ctx)
    }
}

/// Adapter exposing a [`BuiltinCommand`] type as a registrable [`Command`].
pub struct Factory<T> {
    id: String,
    summary: String,
    _phantom: PhantomData<fn() -> T>,
}

impl<T: BuiltinCommand> Default for Factory<T> {
    fn default() -> Self {
        let id = match T::group() {
            Some(group) => crate::namespace::join(group, T::name()),
            None => T::name().to_string(),
        };
        Self {
            id,
            summary: options::summary_from_usage(&options::usage::<T>(T::name())),
            _phantom: PhantomData,
        }
    }
}

impl<T: BuiltinCommand> Factory<T> {
    pub fn new() -> Arc<dyn Command> {
        Arc::new(Self::default())
    }
}

impl<T: BuiltinCommand> Command for Factory<T> {
    fn id(&self) -> &str {
        &self.id
    }

    fn aliases(&self) -> Vec<String> {
        T::aliases().iter().map(|a| a.to_string()).collect()
    }

    fn summary(&self) -> String {
        self.summary.clone()
    }

    fn prepare(&self, name: &str, args: &[&str]) -> ArgsOutcome<Box<dyn Action>> {
        options::process::<T>(name, args).map(|cmd| Box::new(cmd) as Box<dyn Action>)
    }
}

type Handler = dyn Fn(&mut CommandContext<'_>) -> Result<Value> + Send + Sync;

/// A command made from a closure, for embedders and tests.
///
/// It has no option schema: every argument is passed through untouched in
/// [`CommandContext::args`], except that help flags still short-circuit.
pub struct ClosureCommand {
    id: String,
    summary: String,
    aliases: Vec<String>,
    handler: Arc<Handler>,
}

impl ClosureCommand {
    pub fn new(
        id: impl Into<String>,
        handler: impl Fn(&mut CommandContext<'_>) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            summary: String::new(),
            aliases: Vec::new(),
            handler: Arc::new(handler),
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn into_command(self) -> Arc<dyn Command> {
        Arc::new(self)
    }
}

struct ClosureAction(Arc<Handler>);

impl Action for ClosureAction {
    fn run(self: Box<Self>, ctx: &mut CommandContext<'_>) -> Result<Value> {
        (self.0)(ctx)
    }
}

impl Command for ClosureCommand {
    fn id(&self) -> &str {
        &self.id
    }

    fn aliases(&self) -> Vec<String> {
        self.aliases.clone()
    }

    fn summary(&self) -> String {
        self.summary.clone()
    }

    fn prepare(&self, name: &str, args: &[&str]) -> ArgsOutcome<Box<dyn Action>> {
        if options::wants_help(args) {
            let mut usage = format!("Usage: {name} [<args...>]\n");
            if !self.summary.is_empty() {
                usage.push('\n');
                usage.push_str(&self.summary);
                usage.push('\n');
            }
            return ArgsOutcome::HelpRequested(usage);
        }
        ArgsOutcome::Ready(Box::new(ClosureAction(Arc::clone(&self.handler))))
    }
}
