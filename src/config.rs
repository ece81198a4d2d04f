use crate::pipe::PIPE_BUFFER_SIZE;
use crate::registry::DEFAULT_MAX_ALIAS_DEPTH;

/// Interpreter settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    /// Bytes buffered between two pipeline stages before the writer blocks.
    pub pipe_capacity: usize,
    pub max_alias_depth: usize,
    /// Report failures with their whole cause chain.
    pub verbose: bool,
    pub prompt: String,
    /// Print non-null results of interactive lines.
    pub print_results: bool,
    /// Initial value of `CMD_PATH`.
    pub search_path: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            pipe_capacity: PIPE_BUFFER_SIZE,
            max_alias_depth: DEFAULT_MAX_ALIAS_DEPTH,
            verbose: false,
            prompt: "$ ".to_string(),
            print_results: false,
            search_path: "text".to_string(),
        }
    }
}

impl ShellConfig {
    pub fn pipe_capacity(mut self, bytes: usize) -> Self {
        self.pipe_capacity = bytes.max(1);
        self
    }

    pub fn max_alias_depth(mut self, depth: usize) -> Self {
        self.max_alias_depth = depth;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn print_results(mut self, print: bool) -> Self {
        self.print_results = print;
        self
    }

    pub fn search_path(mut self, path: impl Into<String>) -> Self {
        self.search_path = path.into();
        self
    }
}
