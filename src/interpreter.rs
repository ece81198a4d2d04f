use crate::builder::{self, BuildError, Pipeline};
use crate::builtin;
use crate::config::ShellConfig;
use crate::executor::{Executor, PipelineFailure};
use crate::io::{Input, Output, Streams};
use crate::options::ArgsError;
use crate::parser::{self, ParsingError};
use crate::registry::{Registry, ResolveError, SEARCH_PATH_VAR};
use crate::result::{CommandResult, ExitCode, Notification, SUCCESS};
use crate::scope::{Scope, ScopeError};
use crate::sequence::Sequence;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use serde_json::Value;
use std::io::{Read, Write};
use std::sync::Arc;
use thiserror::Error;

/// Read-only variable in the globals scope holding the crate version.
pub const VERSION_VAR: &str = "SHELL_VERSION";

/// Status [`Interpreter::run_command`] reports for a failed line.
pub const FAILURE: ExitCode = 1;

/// Session variable holding the value of the last successful pipeline.
pub const LAST_VALUE_VAR: &str = "_";

/// Why a line was rejected before any of it ran.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LineError {
    #[error("empty line")]
    Empty,
    #[error("syntax error: {0}")]
    Parse(#[from] ParsingError),
    #[error(transparent)]
    Build(#[from] BuildError),
}

/// A small embeddable shell.
///
/// The interpreter owns the command [`Registry`], a read-only globals scope,
/// a mutable session scope below it, the session's invocation [`Sequence`]
/// and the streams commands read from and write to. Every invocation gets
/// a private child of the session scope.
///
/// Example
/// ```
/// use cmdshell::{Interpreter, MemReader, MemWriter};
/// let out = MemWriter::new();
/// let mut sh = Interpreter::default().with_io(MemReader::empty(), out.clone(), MemWriter::new());
/// let result = sh.execute("echo hello world | wc").unwrap();
/// assert_eq!(result.value().unwrap()["words"], 2);
/// assert_eq!(out.text(), "1 2 12\n");
/// ```
pub struct Interpreter {
    registry: Registry,
    globals: Arc<Scope>,
    session: Arc<Scope>,
    ids: Sequence,
    config: ShellConfig,
    input: Input<'static>,
    output: Output<'static>,
    error: Output<'static>,
    last_status: ExitCode,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(ShellConfig::default())
    }
}

impl Interpreter {
    /// Create an interpreter with the built-in commands registered, bound to
    /// the process's standard streams.
    pub fn new(config: ShellConfig) -> Self {
        let sh = Self::empty(config);
        if let Err(e) = builtin::register_builtins(&sh.registry) {
            tracing::warn!(error = %e, "could not register builtins");
        }
        sh
    }

    /// Create an interpreter with an empty registry.
    pub fn empty(config: ShellConfig) -> Self {
        let globals = Scope::root();
        if let Err(e) = globals.set_with(VERSION_VAR, env!("CARGO_PKG_VERSION"), false) {
            tracing::warn!(error = %e, "could not define {}", VERSION_VAR);
        }
        let session = Scope::child(&globals);
        if let Err(e) = session.set(SEARCH_PATH_VAR, config.search_path.as_str()) {
            tracing::warn!(error = %e, "could not define {}", SEARCH_PATH_VAR);
        }
        let Streams { input, output, error } = Streams::inherit();
        Self {
            registry: Registry::new(config.max_alias_depth),
            globals,
            session,
            ids: Sequence::default(),
            config,
            input,
            output,
            error,
            last_status: SUCCESS,
        }
    }

    /// Replace the streams commands are connected to.
    pub fn with_io(
        mut self,
        input: impl Read + Send + 'static,
        output: impl Write + Send + 'static,
        error: impl Write + Send + 'static,
    ) -> Self {
        self.input = Box::new(input);
        self.output = Box::new(output);
        self.error = Box::new(error);
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The session scope: parent of every invocation's scope.
    pub fn scope(&self) -> &Arc<Scope> {
        &self.session
    }

    pub fn globals(&self) -> &Arc<Scope> {
        &self.globals
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    /// Parse, build and run one line.
    ///
    /// Every token of every pipeline is interpolated before the first stage
    /// starts, so a line that fails to build runs nothing. Pipelines then run
    /// in order until one ends in a failure or a notification.
    pub fn execute(&mut self, line: &str) -> Result<CommandResult, LineError> {
        if line.trim().is_empty() {
            return Err(LineError::Empty);
        }
        let ast = parser::parse(line)?;
        if ast.is_empty() {
            return Err(LineError::Empty);
        }
        let pipelines = builder::build(&ast, &*self.session)?;

        let mut last = CommandResult::success();
        for pipeline in &pipelines {
            last = self.run_pipeline(pipeline);
            if !last.is_value() {
                break;
            }
        }
        Ok(last)
    }

    /// Run already-built stage descriptors against the interpreter's streams.
    pub fn run_pipeline(&mut self, pipeline: &Pipeline) -> CommandResult {
        let executor = Executor::new(&self.registry, &self.ids, self.config.pipe_capacity);
        let io = Streams::new(&mut self.input, &mut self.output, &mut self.error);
        let result = executor.execute(pipeline, &self.session, io);
        if let CommandResult::Value(value) = &result {
            self.remember(value);
        }
        result
    }

    fn remember(&self, value: &Value) {
        if let Err(e) = self.session.set(LAST_VALUE_VAR, value.clone()) {
            tracing::debug!(error = %e, "not recording last value");
        }
    }

    /// Execute a line and report the outcome on the interpreter's streams.
    ///
    /// Returns the exit code if the line asked the shell to exit.
    pub fn run_line(&mut self, line: &str) -> Option<ExitCode> {
        let report = match self.execute(line) {
            Ok(CommandResult::Notification(Notification::Exit(code))) => return Some(code),
            Ok(CommandResult::Value(value)) => {
                if self.config.print_results && !value.is_null() {
                    if let Err(e) = writeln!(self.output, "{}", display(&value)) {
                        tracing::debug!(error = %e, "failed to print line result");
                    }
                }
                None
            }
            Ok(CommandResult::Failure(err)) => Some(self.describe(&err)),
            Err(LineError::Empty) => None,
            Err(err) => Some(err.to_string()),
        };
        self.last_status = SUCCESS;
        if let Some(report) = report {
            if let Err(e) = writeln!(self.error, "{}", report) {
                tracing::debug!(error = %e, report = %report, "failed to report line error");
            }
            self.last_status = FAILURE;
        }
        if let Err(e) = self.output.flush() {
            tracing::debug!(error = %e, "ignoring failed flush of output stream");
        }
        if let Err(e) = self.error.flush() {
            tracing::debug!(error = %e, "ignoring failed flush of error stream");
        }
        None
    }

    /// Like [`Interpreter::run_line`], mapped to a process status: the code
    /// passed to `exit`, [`FAILURE`] if the line was rejected or failed,
    /// [`SUCCESS`] otherwise.
    pub fn run_command(&mut self, line: &str) -> ExitCode {
        self.run_line(line).unwrap_or(self.last_status)
    }

    fn describe(&self, err: &anyhow::Error) -> String {
        let kind = failure_kind(err);
        if self.config.verbose {
            return format!("{}: {:?}", kind, err);
        }
        // The stage's own error, without the pipeline wrapper.
        let message = err
            .chain()
            .find(|e| !e.is::<PipelineFailure>())
            .map(|e| e.to_string())
            .unwrap_or_else(|| err.to_string());
        format!("{}: {}", kind, message)
    }

    /// Interactive loop. Returns the code passed to `exit`, or success on EOF.
    pub fn repl(&mut self) -> rustyline::Result<ExitCode> {
        let mut rl = DefaultEditor::new()?;
        loop {
            match rl.readline(&self.config.prompt) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        rl.add_history_entry(line.as_str())?;
                    }
                    if let Some(code) = self.run_line(&line) {
                        return Ok(code);
                    }
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => return Ok(SUCCESS),
                Err(err) => return Err(err),
            }
        }
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Short label for the class of a failure.
pub fn failure_kind(err: &anyhow::Error) -> &'static str {
    for cause in err.chain() {
        if cause.is::<ResolveError>() {
            return "resolve error";
        }
        if cause.is::<ArgsError>() {
            return "usage error";
        }
        if cause.is::<ScopeError>() {
            return "scope error";
        }
    }
    "error"
}
