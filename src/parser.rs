use crate::error::{Result, ShellError};
use crate::lexer::{self, Token};

/// How an output redirection opens its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectMode {
    /// `>`: create the file or cut it to zero length.
    Truncate,
    /// `>>`: create the file or write after its existing contents.
    Append,
}

/// Output redirection target together with its open mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRedirect {
    pub path: String,
    pub mode: RedirectMode,
}

/// The result of parsing one input line, before anything touches the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedInvocation {
    /// First word of the line; never empty.
    pub command_name: String,
    /// Remaining words with redirections and the background marker removed.
    pub raw_args: Vec<String>,
    /// File named after `<`.
    pub input_redirect: Option<String>,
    /// File named after `>` or `>>`.
    pub output_redirect: Option<OutputRedirect>,
    /// Whether the line ended with `&`.
    pub background: bool,
}

/// Parse a raw input line.
///
/// Runs in two passes over the token list. The first pulls every redirection operator
/// out together with the word that follows it; a later redirection of the same kind
/// replaces an earlier one. The second strips a trailing `&`, which is the only
/// position where it marks background execution; anywhere else it is a plain argument.
///
/// Fails with [`ShellError::EmptyCommand`] for a blank line and with
/// [`ShellError::InvalidArguments`] for bad quoting, an operator without a filename
/// or a line without a command word.
pub fn parse(line: &str) -> Result<ParsedInvocation> {
    let tokens =
        lexer::split_into_tokens(line).map_err(|e| ShellError::InvalidArguments(e.to_string()))?;
    if tokens.is_empty() {
        return Err(ShellError::EmptyCommand);
    }

    let mut input_redirect = None;
    let mut output_redirect = None;
    let mut remaining = Vec::with_capacity(tokens.len());

    let mut tokens = tokens.into_iter();
    while let Some(token) = tokens.next() {
        let mode = match token {
            Token::RedirectIn => {
                input_redirect = Some(redirect_target(&token, tokens.next())?);
                continue;
            }
            Token::RedirectOut => RedirectMode::Truncate,
            Token::RedirectAppend => RedirectMode::Append,
            other => {
                remaining.push(other);
                continue;
            }
        };
        let path = redirect_target(&token, tokens.next())?;
        output_redirect = Some(OutputRedirect { path, mode });
    }

    let background = matches!(remaining.last(), Some(Token::Ampersand));
    if background {
        remaining.pop();
    }

    let mut words = remaining.into_iter().map(|token| match token {
        Token::Word(w) => w,
        _ => "&".to_string(),
    });
    let command_name = words
        .next()
        .ok_or_else(|| ShellError::InvalidArguments("missing command".to_string()))?;
    if command_name.is_empty() {
        return Err(ShellError::InvalidArguments("empty command name".to_string()));
    }

    Ok(ParsedInvocation {
        command_name,
        raw_args: words.collect(),
        input_redirect,
        output_redirect,
        background,
    })
}

fn redirect_target(operator: &Token, next: Option<Token>) -> Result<String> {
    match next {
        Some(Token::Word(path)) => Ok(path),
        _ => Err(ShellError::InvalidArguments(format!(
            "expected a filename after `{}`",
            operator_symbol(operator)
        ))),
    }
}

fn operator_symbol(token: &Token) -> &'static str {
    match token {
        Token::RedirectIn => "<",
        Token::RedirectOut => ">",
        Token::RedirectAppend => ">>",
        _ => "&",
    }
}
