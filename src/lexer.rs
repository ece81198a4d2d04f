//! Lexical analysis (tokenization) of a command line.

use thiserror::Error;

/// A part of a word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WordPart {
    /// Bare or double-quoted text. May contain `${...}` references, which are
    /// kept verbatim for the interpolator.
    Text(String),
    /// Single-quoted or backslash-escaped text, never interpolated.
    Opaque(String),
}

/// Represents a token resulting from lexical analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A word token, which may be composed of multiple parts (`WordPart`).
    Word(Vec<WordPart>),
    /// The pipe operator, `|`.
    PipeOp,
    /// The pipeline separator, `;`.
    Semicolon,
}

/// Errors that can occur during the lexical analysis process.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LexingError {
    #[error("unfinished quote")]
    UnfinishedQuote,
    #[error("unfinished ${{...}} reference")]
    UnfinishedParamSubst,
    #[error("dangling escape at end of line")]
    DanglingEscape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Start,
    ReadingWord,
    ReadingSingleQuote,
    ReadingDoubleQuote,
}

struct LexingFSM {
    input: Vec<char>,
    pos: usize,
    state: LexingState,
    current_word: Vec<WordPart>,
    buffer: String,
}

impl LexingFSM {
    fn new(line: &str) -> Self {
        LexingFSM {
            input: line.chars().collect(),
            pos: 0,
            state: LexingState::Start,
            current_word: Vec::new(),
            buffer: String::new(),
        }
    }

    fn make_tokens(&mut self) -> Result<Vec<Token>, LexingError> {
        let mut out = Vec::new();

        while let Some(ch) = self.read_char() {
            match self.state {
                LexingState::Start | LexingState::ReadingWord => self.handle_word(ch, &mut out)?,
                LexingState::ReadingSingleQuote => self.handle_single_quote(ch),
                LexingState::ReadingDoubleQuote => self.handle_double_quote(ch)?,
            }
        }

        if matches!(
            self.state,
            LexingState::ReadingSingleQuote | LexingState::ReadingDoubleQuote
        ) {
            return Err(LexingError::UnfinishedQuote);
        }
        self.finish_word(&mut out);
        Ok(out)
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn handle_word(&mut self, ch: char, out: &mut Vec<Token>) -> Result<(), LexingError> {
        match ch {
            c if c.is_whitespace() => self.finish_word(out),
            '|' | ';' => {
                self.finish_word(out);
                out.push(if ch == '|' { Token::PipeOp } else { Token::Semicolon });
            }
            '\'' => {
                self.flush_text();
                self.state = LexingState::ReadingSingleQuote;
            }
            '"' => {
                self.flush_text();
                self.state = LexingState::ReadingDoubleQuote;
            }
            '\\' => {
                let escaped = self.read_char().ok_or(LexingError::DanglingEscape)?;
                self.flush_text();
                self.current_word.push(WordPart::Opaque(escaped.to_string()));
                self.state = LexingState::ReadingWord;
            }
            '$' if self.peek_char() == Some('{') => {
                self.read_char();
                self.collect_paramsubst()?;
                self.state = LexingState::ReadingWord;
            }
            c => {
                self.buffer.push(c);
                self.state = LexingState::ReadingWord;
            }
        }
        Ok(())
    }

    fn handle_single_quote(&mut self, ch: char) {
        match ch {
            '\'' => {
                self.current_word
                    .push(WordPart::Opaque(std::mem::take(&mut self.buffer)));
                self.state = LexingState::ReadingWord
            }
            c => self.buffer.push(c),
        }
    }

    fn handle_double_quote(&mut self, ch: char) -> Result<(), LexingError> {
        match ch {
            '"' => {
                // An empty "" still yields a (zero-length) word.
                self.current_word
                    .push(WordPart::Text(std::mem::take(&mut self.buffer)));
                self.state = LexingState::ReadingWord;
            }
            '\\' if matches!(self.peek_char(), Some('"' | '\\' | '$')) => {
                let escaped = self.read_char().ok_or(LexingError::DanglingEscape)?;
                self.flush_text();
                self.current_word.push(WordPart::Opaque(escaped.to_string()));
            }
            '$' if self.peek_char() == Some('{') => {
                self.read_char();
                self.collect_paramsubst()?;
            }
            c => self.buffer.push(c),
        }
        Ok(())
    }

    /// Copies a `${...}` reference into the buffer, braces balanced.
    fn collect_paramsubst(&mut self) -> Result<(), LexingError> {
        let mut depth = 1;
        self.buffer.push_str("${");
        while let Some(ch) = self.read_char() {
            self.buffer.push(ch);
            match ch {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
        Err(LexingError::UnfinishedParamSubst)
    }

    fn flush_text(&mut self) {
        if !self.buffer.is_empty() {
            self.current_word
                .push(WordPart::Text(std::mem::take(&mut self.buffer)));
        }
    }

    fn finish_word(&mut self, out: &mut Vec<Token>) {
        self.flush_text();
        if !self.current_word.is_empty() {
            out.push(Token::Word(std::mem::take(&mut self.current_word)));
        }
        self.state = LexingState::Start;
    }
}

/// Split a command line into tokens.
pub fn split_into_tokens(line: &str) -> Result<Vec<Token>, LexingError> {
    LexingFSM::new(line).make_tokens()
}
