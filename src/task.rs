use crate::builtin::{Builtin, Registry};
use crate::env::Environment;
use crate::error::Result;
use crate::parser::ParsedInvocation;
use crate::resolver;
use crate::streams::Streams;
use std::path::PathBuf;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
pub type ExitCode = i32;

/// What a task runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// An in-process built-in.
    Builtin(Builtin),
    /// An executable file on disk.
    External(PathBuf),
}

/// One command invocation, ready to hand to the [`Engine`](crate::engine::Engine).
///
/// A task is built once from a single input line and is consumed by value when it
/// runs. It owns the files opened for its redirections.
#[derive(Debug)]
pub struct Task {
    pub(crate) target: Target,
    pub(crate) args: Vec<String>,
    pub(crate) streams: Streams,
    pub(crate) background: bool,
    pub(crate) command_line: String,
}

impl Task {
    /// Build a task for an already resolved target. With no typed name to go by,
    /// notices show the built-in name or the full program path.
    pub fn new(target: Target, args: Vec<String>, streams: Streams, background: bool) -> Self {
        let name = match &target {
            Target::Builtin(builtin) => builtin.name().to_string(),
            Target::External(path) => path.to_string_lossy().into_owned(),
        };
        let command_line = describe(&name, &args);
        Self {
            target,
            args,
            streams,
            background,
            command_line,
        }
    }

    /// Resolve the command and open its redirections.
    ///
    /// Resolution happens first, so a line naming an unknown command never creates or
    /// truncates its output file.
    pub fn prepare(
        parsed: ParsedInvocation,
        registry: &Registry,
        env: &Environment,
    ) -> Result<Self> {
        let target = resolver::resolve(registry, env, &parsed.command_name)?;
        let streams = Streams::open(
            env,
            parsed.input_redirect.as_deref(),
            parsed.output_redirect.as_ref(),
        )?;

        let command_line = describe(&parsed.command_name, &parsed.raw_args);

        Ok(Self {
            target,
            args: parsed.raw_args,
            streams,
            background: parsed.background,
            command_line,
        })
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn streams(&self) -> &Streams {
        &self.streams
    }

    pub fn is_background(&self) -> bool {
        self.background
    }

    /// The command as typed, without redirections or `&`, used in notices.
    pub fn command_line(&self) -> &str {
        &self.command_line
    }
}

fn describe(name: &str, args: &[String]) -> String {
    std::iter::once(name)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}
