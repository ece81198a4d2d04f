use argh::FromArgs;
use cmdshell::{Interpreter, ShellConfig};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(FromArgs)]
/// Interactive command shell. Starts a REPL unless -c is given.
struct Cli {
    #[argh(option, short = 'c')]
    /// run this line and exit with its status.
    command: Option<String>,

    #[argh(switch, short = 'v')]
    /// report failures with their full cause chain.
    verbose: bool,

    #[argh(option)]
    /// bytes buffered between pipeline stages.
    pipe_capacity: Option<usize>,

    #[argh(option)]
    /// prompt shown by the REPL.
    prompt: Option<String>,

    #[argh(switch)]
    /// print the value of every successful line.
    print_results: bool,
}

impl Cli {
    fn config(&self) -> ShellConfig {
        let mut config = ShellConfig::default()
            .verbose(self.verbose)
            .print_results(self.print_results);
        if let Some(bytes) = self.pipe_capacity {
            config = config.pipe_capacity(bytes);
        }
        if let Some(prompt) = &self.prompt {
            config = config.prompt(prompt.as_str());
        }
        config
    }
}

fn main() -> anyhow::Result<()> {
    // Respects RUST_LOG; logs go to stderr.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli: Cli = argh::from_env();
    let mut sh = Interpreter::new(cli.config());

    let code = match &cli.command {
        Some(line) => sh.run_command(line),
        None => sh.repl()?,
    };
    std::process::exit(code)
}
