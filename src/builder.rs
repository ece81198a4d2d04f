//! Turns a parsed [`CommandLine`] into stage descriptors.

use crate::interpolate::{self, InterpolationError, Lookup};
use crate::lexer::WordPart;
use crate::parser::{CommandLine, Word};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("empty command line")]
    EmptyLine,
    #[error(transparent)]
    Interpolation(#[from] InterpolationError),
}

/// One command invocation: the command path followed by its arguments, all
/// already interpolated. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    argv: Vec<String>,
}

impl Stage {
    /// `None` if `argv` is empty.
    pub fn new<S: Into<String>>(argv: impl IntoIterator<Item = S>) -> Option<Self> {
        let argv: Vec<String> = argv.into_iter().map(Into::into).collect();
        if argv.is_empty() { None } else { Some(Self { argv }) }
    }

    pub fn path(&self) -> &str {
        &self.argv[0]
    }

    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }
}

/// Stages connected output-to-input. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    /// `None` if there are no stages.
    pub fn new(stages: Vec<Stage>) -> Option<Self> {
        if stages.is_empty() { None } else { Some(Self { stages }) }
    }

    /// A one-stage pipeline.
    pub fn single(stage: Stage) -> Self {
        Self { stages: vec![stage] }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

fn expand_word(word: &Word, vars: &dyn Lookup) -> Result<String, InterpolationError> {
    let mut out = String::new();
    for part in &word.0 {
        match part {
            WordPart::Text(text) => out.push_str(&interpolate::interpolate(text, vars)?),
            WordPart::Opaque(text) => out.push_str(text),
        }
    }
    Ok(out)
}

/// Interpolate every token of every stage.
///
/// Either every token expands or nothing is returned: a malformed
/// expression anywhere rejects the whole line.
pub fn build(line: &CommandLine, vars: &dyn Lookup) -> Result<Vec<Pipeline>, BuildError> {
    if line.is_empty() {
        return Err(BuildError::EmptyLine);
    }
    line.pipelines
        .iter()
        .filter_map(|node| {
            let stages = node
                .stages
                .iter()
                .filter_map(|stage| {
                    let argv = stage
                        .words
                        .iter()
                        .map(|w| expand_word(w, vars))
                        .collect::<Result<Vec<_>, _>>();
                    argv.map(Stage::new).transpose()
                })
                .collect::<Result<Vec<_>, _>>();
            stages.map(Pipeline::new).transpose()
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(BuildError::from)
}
