use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while turning a line into a task and launching it.
///
/// None of these terminate an interactive session: the read loop prints them and
/// moves on to the next line. In batch mode every variant except [`ShellError::EmptyCommand`]
/// is fatal.
#[derive(Debug, Error)]
pub enum ShellError {
    /// The line contained no tokens. Never shown to the user.
    #[error("empty command")]
    EmptyCommand,

    /// The line could not be parsed: a dangling redirection operator, a missing
    /// command name or unbalanced quotes.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The name is neither a built-in, an executable file, nor found on the search path.
    #[error("{0}: command not found")]
    CommandNotFound(String),

    /// A redirection target could not be opened.
    #[error("{}: {source}", .path.display())]
    RedirectionOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The resolved executable could not be launched or waited for.
    #[error("{}: {source}", .program.display())]
    ExternalExecution {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ShellError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_input() {
        let err = ShellError::CommandNotFound("badcmd".into());
        assert_eq!(err.to_string(), "badcmd: command not found");

        let err = ShellError::RedirectionOpen {
            path: PathBuf::from("/nope/out.txt"),
            source: io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
        };
        assert_eq!(err.to_string(), "/nope/out.txt: No such file or directory");
    }
}
