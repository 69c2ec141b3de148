use crate::env::Environment;
use crate::error::{Result, ShellError};
use crate::parser::{OutputRedirect, RedirectMode};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::process::Stdio;

/// Where a task reads from.
#[derive(Debug)]
pub enum Input {
    /// The shell's own standard input. Never closed by a task.
    Inherit,
    /// A file opened for `<`, owned by the task.
    File(File),
}

/// Where a task writes to.
#[derive(Debug)]
pub enum Output {
    /// The shell's own standard output. Never closed by a task.
    Inherit,
    /// A file opened for `>` or `>>`, owned by the task.
    File(File),
}

impl Input {
    /// A [`Stdio`] handle for a child process.
    ///
    /// Files are duplicated, so the task keeps its own descriptor and still closes it
    /// exactly once after the child is done.
    pub fn stdio(&self) -> io::Result<Stdio> {
        match self {
            Input::Inherit => Ok(Stdio::inherit()),
            Input::File(file) => Ok(Stdio::from(file.try_clone()?)),
        }
    }

    pub fn is_inherited(&self) -> bool {
        matches!(self, Input::Inherit)
    }
}

impl Output {
    /// A [`Stdio`] handle for a child process. See [`Input::stdio`].
    pub fn stdio(&self) -> io::Result<Stdio> {
        match self {
            Output::Inherit => Ok(Stdio::inherit()),
            Output::File(file) => Ok(Stdio::from(file.try_clone()?)),
        }
    }

    pub fn is_inherited(&self) -> bool {
        matches!(self, Output::Inherit)
    }
}

/// The pair of streams a task is bound to.
///
/// Owns every file opened for redirection. [`Streams::close`] takes `self`, so the
/// files are released exactly once, and only by whoever ends up holding the streams
/// when the task's work is over.
#[derive(Debug)]
pub struct Streams {
    input: Input,
    output: Output,
}

impl Streams {
    pub fn new(input: Input, output: Output) -> Self {
        Self { input, output }
    }

    /// Both streams bound to the shell's standard input and output.
    pub fn inherited() -> Self {
        Self::new(Input::Inherit, Output::Inherit)
    }

    /// Open the redirection targets of one line, relative to the shell's directory.
    ///
    /// The input file is opened first; if the output file then fails to open, the
    /// input file is dropped again before the error is returned.
    pub fn open(
        env: &Environment,
        input_redirect: Option<&str>,
        output_redirect: Option<&OutputRedirect>,
    ) -> Result<Self> {
        let input = match input_redirect {
            Some(path) => {
                let path = env.resolve_path(path);
                let file = File::open(&path)
                    .map_err(|source| ShellError::RedirectionOpen { path, source })?;
                Input::File(file)
            }
            None => Input::Inherit,
        };

        let output = match output_redirect {
            Some(redirect) => {
                let path = env.resolve_path(&redirect.path);
                let mut options = OpenOptions::new();
                options.create(true);
                match redirect.mode {
                    RedirectMode::Truncate => options.write(true).truncate(true),
                    RedirectMode::Append => options.append(true),
                };
                let file = options
                    .open(&path)
                    .map_err(|source| ShellError::RedirectionOpen { path, source })?;
                Output::File(file)
            }
            None => Output::Inherit,
        };

        Ok(Self::new(input, output))
    }

    pub fn input(&self) -> &Input {
        &self.input
    }

    pub fn output(&self) -> &Output {
        &self.output
    }

    /// Run `f` with the streams as plain reader and writer, for in-process built-ins.
    pub fn with_io<R>(&mut self, f: impl FnOnce(&mut dyn Read, &mut dyn Write) -> R) -> R {
        let mut stdin;
        let mut stdout;
        let reader: &mut dyn Read = match &mut self.input {
            Input::Inherit => {
                stdin = io::stdin();
                &mut stdin
            }
            Input::File(file) => file,
        };
        let writer: &mut dyn Write = match &mut self.output {
            Output::Inherit => {
                stdout = io::stdout();
                &mut stdout
            }
            Output::File(file) => file,
        };
        f(reader, writer)
    }

    /// Release the redirection files. Inherited streams are only flushed.
    pub fn close(self) {
        if let Input::File(file) = self.input {
            tracing::debug!("closing redirected input");
            drop(file);
        }
        match self.output {
            Output::File(mut file) => {
                if let Err(e) = file.flush() {
                    tracing::warn!(error = %e, "flushing redirected output failed");
                }
                tracing::debug!("closing redirected output");
                drop(file);
            }
            Output::Inherit => {
                let _ = io::stdout().flush();
            }
        }
    }
}
