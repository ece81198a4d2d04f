//! An embeddable command shell engine.
//!
//! Commands live in a [`Registry`] under slash-separated paths (`text/grep`),
//! are reached through aliases and a search path, and run in pipelines whose
//! stages execute concurrently, connected by bounded in-memory pipes. Every
//! invocation gets its own [`Scope`] chained to the scope it was invoked
//! from, and returns a structured [`CommandResult`] rather than only an exit
//! status.
//!
//! The main entry point is [`Interpreter`], which parses lines such as
//! `set who world; echo hello ${who} | wc`, builds them into [`Pipeline`]s and
//! runs them. The lower layers ([`scope`], [`registry`], [`interpolate`],
//! [`builder`], [`executor`], [`lifecycle`]) are public for embedders that
//! want to drive them directly.

pub mod builder;
mod builtin;
pub mod command;
pub mod config;
pub mod executor;
pub mod interpolate;
mod interpreter;
pub mod io;
pub mod lexer;
pub mod lifecycle;
pub mod namespace;
pub mod options;
pub mod parser;
pub mod pipe;
pub mod registry;
pub mod result;
pub mod scope;
pub mod sequence;

pub use builder::{Pipeline, Stage};
pub use builtin::register_builtins;
pub use command::{BuiltinCommand, ClosureCommand, Command, CommandContext, Factory};
pub use config::ShellConfig;
pub use executor::{Executor, PipelineFailure};
pub use interpreter::{FAILURE, Interpreter, LAST_VALUE_VAR, LineError, VERSION_VAR, failure_kind};
pub use io::{MemReader, MemWriter, Streams};
pub use registry::{Registry, ResolveError};
pub use result::{CommandResult, ExitCode, Notification};
pub use scope::Scope;
pub use sequence::Sequence;
pub use serde_json::Value;
