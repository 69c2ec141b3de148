//! A small interactive shell with redirection and background execution.
//!
//! A line of input goes through the [`lexer`] and [`parser`] into a
//! [`ParsedInvocation`](parser::ParsedInvocation), the [`resolver`] maps the command
//! name to a built-in or an executable on disk, and the result is bundled into a
//! [`Task`](task::Task). The [`Engine`](engine::Engine) runs tasks either in the
//! foreground, blocking until they finish, or in the background, returning at once and
//! reporting completion later through a [`Notifier`](engine::Notifier).
//!
//! The main entry point is [`Interpreter`], which owns the shell [`Environment`](env::Environment)
//! and drives the interactive and batch loops.

mod builtin;
pub mod engine;
pub mod env;
pub mod error;
mod interpreter;
pub mod lexer;
mod pager;
pub mod parser;
pub mod resolver;
pub mod streams;
pub mod task;

pub use builtin::{Builtin, Registry};
pub use error::ShellError;

/// Just a convenient re-export of the command runner.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::Interpreter;
