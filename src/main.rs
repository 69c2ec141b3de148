use anyhow::{Context, Result};
use argh::FromArgs;
use myshell::Interpreter;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(FromArgs)]
/// A small shell with redirection and background jobs.
struct Args {
    #[argh(positional)]
    /// script to run line by line instead of reading commands from the terminal.
    script: Option<PathBuf>,
}

fn main() -> Result<()> {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let args: Args = argh::from_env();
    let mut shell = Interpreter::default();

    match args.script {
        Some(path) => {
            let script = File::open(&path)
                .with_context(|| format!("can't open script {}", path.display()))?;
            if let Err(e) = shell.batch(BufReader::new(script)) {
                eprintln!("myshell error: {}", e);
                std::process::exit(1);
            }
        }
        None => shell.repl()?,
    }
    Ok(())
}
