//! Pipeline execution.
//!
//! A single stage runs on the caller's thread. Longer pipelines run one
//! thread per stage, connected by bounded [`pipe`]s:
//!
//! ```text
//!   input ─▶ [stage 0] ─pipe─▶ [stage 1] ─pipe─▶ … ─▶ [stage N-1] ─▶ output
//!               │                  │                      │
//!               └──────────────────┴───────── error ──────┘
//! ```
//!
//! A stage's stream ends are dropped as soon as it finishes, which gives its
//! downstream neighbour EOF and its upstream neighbour a broken pipe.

use crate::builder::{Pipeline, Stage};
use crate::io::{Input, Output, SharedWriter, Streams};
use crate::lifecycle;
use crate::pipe::pipe;
use crate::registry::Registry;
use crate::result::CommandResult;
use crate::scope::Scope;
use crate::sequence::Sequence;
use anyhow::anyhow;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::thread;
use thiserror::Error;

/// Context attached to the surfaced failure of a multi-stage pipeline.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("pipeline stage {stage} ({command}) failed")]
pub struct PipelineFailure {
    /// Zero-based index of the failing stage.
    pub stage: usize,
    pub command: String,
}

pub struct Executor<'r> {
    registry: &'r Registry,
    ids: &'r Sequence,
    pipe_capacity: usize,
}

impl<'r> Executor<'r> {
    pub fn new(registry: &'r Registry, ids: &'r Sequence, pipe_capacity: usize) -> Self {
        Self {
            registry,
            ids,
            pipe_capacity,
        }
    }

    /// Run `pipeline` against `io`, with `scope` as the parent of every
    /// stage's own scope.
    #[tracing::instrument(level = "debug", skip_all, fields(stages = pipeline.len()))]
    pub fn execute(&self, pipeline: &Pipeline, scope: &Arc<Scope>, io: Streams<'_>) -> CommandResult {
        match pipeline.stages() {
            [stage] => self.run_stage(stage, scope, io),
            stages => self.run_concurrently(stages, scope, io),
        }
    }

    fn run_stage(&self, stage: &Stage, scope: &Arc<Scope>, io: Streams<'_>) -> CommandResult {
        let seq = self.ids.next_id();
        match self.registry.resolve(scope, stage.path()) {
            Ok(resolved) => lifecycle::invoke(self.registry, &resolved, stage.args(), scope, io, seq),
            Err(e) => CommandResult::Failure(e.into()),
        }
    }

    fn run_concurrently(&self, stages: &[Stage], scope: &Arc<Scope>, io: Streams<'_>) -> CommandResult {
        let Streams { input, output, error } = io;
        let error = Mutex::new(error);

        let mut inputs: Vec<Input<'_>> = Vec::with_capacity(stages.len());
        let mut outputs: Vec<Output<'_>> = Vec::with_capacity(stages.len());
        inputs.push(input);
        for _ in 1..stages.len() {
            let (writer, reader) = pipe(self.pipe_capacity);
            outputs.push(Box::new(writer));
            inputs.push(Box::new(reader));
        }
        outputs.push(output);

        let results: Vec<CommandResult> = thread::scope(|s| {
            let handles: Vec<_> = stages
                .iter()
                .zip(inputs.into_iter().zip(outputs))
                .enumerate()
                .map(|(i, (stage, (input, output)))| {
                    let io = Streams {
                        input,
                        output,
                        error: Box::new(SharedWriter::new(&error)),
                    };
                    thread::Builder::new()
                        .name(format!("stage-{i}"))
                        .spawn_scoped(s, move || self.run_stage(stage, scope, io))
                })
                .collect();

            handles
                .into_iter()
                .enumerate()
                .map(|(i, handle)| match handle {
                    Ok(handle) => handle.join().unwrap_or_else(|_| {
                        tracing::warn!(stage = i, "pipeline stage panicked");
                        CommandResult::Failure(anyhow!("stage {i} panicked"))
                    }),
                    Err(e) => CommandResult::Failure(anyhow!(e).context("could not start pipeline stage")),
                })
                .collect()
        });

        aggregate(stages, results)
    }
}

/// Combine per-stage outcomes, in stage order, into the pipeline outcome.
///
/// A notification beats any failure; otherwise the lowest-indexed failure is
/// surfaced and the rest are logged; otherwise the last stage's value wins.
fn aggregate(stages: &[Stage], results: Vec<CommandResult>) -> CommandResult {
    let last = results.len().saturating_sub(1);
    let mut notification = None;
    let mut failure: Option<(usize, anyhow::Error)> = None;
    let mut value = Value::Null;

    for (i, result) in results.into_iter().enumerate() {
        match result {
            CommandResult::Notification(n) => {
                if notification.is_none() {
                    notification = Some(n);
                }
            }
            CommandResult::Failure(e) => {
                if failure.is_none() {
                    failure = Some((i, e));
                } else {
                    tracing::warn!(stage = i, command = stages[i].path(), error = %e, "discarding pipeline failure");
                }
            }
            CommandResult::Value(v) if i == last => value = v,
            CommandResult::Value(_) => {}
        }
    }

    match (notification, failure) {
        (Some(n), discarded) => {
            if let Some((i, e)) = discarded {
                tracing::warn!(stage = i, command = stages[i].path(), error = %e, "discarding pipeline failure");
            }
            CommandResult::Notification(n)
        }
        (None, Some((i, e))) => CommandResult::Failure(e.context(PipelineFailure {
            stage: i,
            command: stages[i].path().to_string(),
        })),
        (None, None) => CommandResult::Value(value),
    }
}
