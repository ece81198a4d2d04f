use crate::lexer::{self, LexingError, Token, WordPart};
use thiserror::Error;

/// A parsed word: one command-line token made of quoted and unquoted parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word(pub Vec<WordPart>);

/// Stage node: the words of one command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageNode {
    pub words: Vec<Word>,
}

/// Pipeline-group node: stages joined by `|`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineNode {
    pub stages: Vec<StageNode>,
}

/// Root of the parsed tree: pipeline groups separated by `;`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLine {
    pub pipelines: Vec<PipelineNode>,
}

impl CommandLine {
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

/// Errors that can occur while turning a line into a [`CommandLine`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParsingError {
    #[error(transparent)]
    Lexing(#[from] LexingError),
    /// A `|` with nothing on one side.
    #[error("empty command in pipeline")]
    EmptyStage,
}

struct AstBuilder {
    tokens: Vec<Token>,
    pos: usize,
}

impl AstBuilder {
    fn from(tokens: Vec<Token>) -> Self {
        AstBuilder { tokens, pos: 0 }
    }

    fn build_ast(mut self) -> Result<CommandLine, ParsingError> {
        let mut line = CommandLine::default();
        while self.peek().is_some() {
            if let Some(Token::Semicolon) = self.peek() {
                self.consume();
                continue;
            }
            line.pipelines.push(self.parse_pipeline()?);
        }
        Ok(line)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Parse a pipeline: command ('|' command)*
    fn parse_pipeline(&mut self) -> Result<PipelineNode, ParsingError> {
        let mut stages = vec![self.parse_command()?];
        while let Some(Token::PipeOp) = self.peek() {
            self.consume();
            stages.push(self.parse_command()?);
        }
        Ok(PipelineNode { stages })
    }

    /// Parse a command: word+
    fn parse_command(&mut self) -> Result<StageNode, ParsingError> {
        let mut words = Vec::new();
        while let Some(Token::Word(parts)) = self.peek() {
            words.push(Word(parts.clone()));
            self.consume();
        }
        if words.is_empty() {
            return Err(ParsingError::EmptyStage);
        }
        Ok(StageNode { words })
    }
}

/// Parse a command line into pipeline groups, stages and words.
///
/// A blank line parses to an empty [`CommandLine`].
pub fn parse(line: &str) -> Result<CommandLine, ParsingError> {
    let tokens = lexer::split_into_tokens(line)?;
    AstBuilder::from(tokens).build_ast()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(stage: &StageNode) -> Vec<String> {
        stage
            .words
            .iter()
            .map(|w| {
                w.0.iter()
                    .map(|p| match p {
                        WordPart::Text(s) | WordPart::Opaque(s) => s.as_str(),
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_single_stage() {
        let line = parse("echo hello world").unwrap();
        assert_eq!(line.pipelines.len(), 1);
        assert_eq!(line.pipelines[0].stages.len(), 1);
        assert_eq!(words(&line.pipelines[0].stages[0]), vec!["echo", "hello", "world"]);
    }

    #[test]
    fn test_pipelines_and_groups() {
        let line = parse("echo a | cat | wc; echo b;").unwrap();
        assert_eq!(line.pipelines.len(), 2);
        assert_eq!(line.pipelines[0].stages.len(), 3);
        assert_eq!(words(&line.pipelines[0].stages[2]), vec!["wc"]);
        assert_eq!(words(&line.pipelines[1].stages[0]), vec!["echo", "b"]);
    }

    #[test]
    fn test_empty_sides_of_pipe_fail() {
        assert_eq!(parse("| cat"), Err(ParsingError::EmptyStage));
        assert_eq!(parse("echo |"), Err(ParsingError::EmptyStage));
        assert_eq!(parse("echo | | cat"), Err(ParsingError::EmptyStage));
        assert_eq!(parse("echo | ; cat"), Err(ParsingError::EmptyStage));
    }

    #[test]
    fn test_blank_lines_parse_empty() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("  ;  ; ").unwrap().is_empty());
    }

    #[test]
    fn test_lexing_errors_propagate() {
        assert_eq!(
            parse("echo 'open"),
            Err(ParsingError::Lexing(LexingError::UnfinishedQuote))
        );
    }
}
