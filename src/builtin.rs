use crate::env::Environment;
use crate::pager;
use crate::task::ExitCode;
use anyhow::{Context, Result, anyhow, bail};
use argh::{EarlyExit, FromArgs};
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::sync::LazyLock;

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process without spawning a child process. They never deal with redirection or
/// background execution; the engine hands them whatever streams the task was bound to.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Executes the command using provided IO streams and environment.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode>;
}

/// Every built-in the shell ships with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Cd,
    Pwd,
    Clr,
    Dir,
    Environ,
    Echo,
    Help,
    Pause,
    Quit,
}

impl Builtin {
    pub const ALL: [Builtin; 9] = [
        Builtin::Cd,
        Builtin::Pwd,
        Builtin::Clr,
        Builtin::Dir,
        Builtin::Environ,
        Builtin::Echo,
        Builtin::Help,
        Builtin::Pause,
        Builtin::Quit,
    ];

    /// Canonical name of the command, e.g. "echo" or "cd".
    pub fn name(self) -> &'static str {
        match self {
            Builtin::Cd => "cd",
            Builtin::Pwd => "pwd",
            Builtin::Clr => "clr",
            Builtin::Dir => "dir",
            Builtin::Environ => "environ",
            Builtin::Echo => "echo",
            Builtin::Help => "help",
            Builtin::Pause => "pause",
            Builtin::Quit => "quit",
        }
    }

    /// Parse `args` for this built-in and run it.
    ///
    /// `on_terminal` tells whether `stdout` is the interactive terminal; `help` pages
    /// its output only in that case. A usage error comes back as `Err`, while `--help`
    /// prints the usage text and succeeds.
    pub fn invoke(
        self,
        args: &[String],
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
        on_terminal: bool,
    ) -> Result<ExitCode> {
        match self {
            Builtin::Cd => run::<Cd>(self, args, stdin, stdout, env),
            Builtin::Pwd => run::<Pwd>(self, args, stdin, stdout, env),
            Builtin::Clr => run::<Clr>(self, args, stdin, stdout, env),
            Builtin::Dir => run::<Dir>(self, args, stdin, stdout, env),
            Builtin::Environ => run::<Environ>(self, args, stdin, stdout, env),
            Builtin::Echo => run::<Echo>(self, &Echo::literal_args(args), stdin, stdout, env),
            Builtin::Help if on_terminal => match parse_args::<Help>(self, args, stdout)? {
                Some(help) => help.page(stdout, env),
                None => Ok(0),
            },
            Builtin::Help => run::<Help>(self, args, stdin, stdout, env),
            Builtin::Pause => run::<Pause>(self, args, stdin, stdout, env),
            Builtin::Quit => run::<Quit>(self, args, stdin, stdout, env),
        }
    }
}

fn parse_args<T: FromArgs>(
    builtin: Builtin,
    args: &[String],
    stdout: &mut dyn Write,
) -> Result<Option<T>> {
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    match T::from_args(&[builtin.name()], &args) {
        Ok(cmd) => Ok(Some(cmd)),
        Err(EarlyExit { output, status }) => match status {
            Ok(()) => {
                stdout.write_all(output.as_bytes())?;
                Ok(None)
            }
            Err(()) => Err(anyhow!("{}", output.trim_end())),
        },
    }
}

fn run<T: BuiltinCommand>(
    builtin: Builtin,
    args: &[String],
    stdin: &mut dyn Read,
    stdout: &mut dyn Write,
    env: &mut Environment,
) -> Result<ExitCode> {
    match parse_args::<T>(builtin, args, stdout)? {
        Some(cmd) => cmd.execute(stdin, stdout, env),
        None => Ok(0),
    }
}

/// Name to built-in lookup table. Built once at start-up and only read afterwards.
#[derive(Debug)]
pub struct Registry {
    entries: HashMap<&'static str, Builtin>,
}

impl Registry {
    pub fn new(builtins: impl IntoIterator<Item = Builtin>) -> Self {
        Self {
            entries: builtins.into_iter().map(|b| (b.name(), b)).collect(),
        }
    }

    /// The process-wide registry holding every built-in.
    pub fn standard() -> &'static Registry {
        static STANDARD: LazyLock<Registry> = LazyLock::new(|| Registry::new(Builtin::ALL));
        &STANDARD
    }

    pub fn get(&self, name: &str) -> Option<Builtin> {
        self.entries.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        writeln!(stdout, "{}", env.current_dir.to_string_lossy())?;
        Ok(0)
    }
}

#[derive(FromArgs)]
#[argh(help_triggers("-h", "--help"))]
/// Change the current working directory.
/// Without a target, print the current working directory instead.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let target = match self.target {
            Some(t) if !t.is_empty() => PathBuf::from(t),
            _ => return Pwd {}.execute(stdin, stdout, env),
        };

        let new_dir = env.resolve_path(&target);
        let canonical = fs::canonicalize(&new_dir)
            .with_context(|| format!("cd: {}", target.display()))?;
        if !canonical.is_dir() {
            bail!("cd: {}: Not a directory", target.display());
        }

        env.set_var("PWD", canonical.to_string_lossy());
        env.current_dir = canonical;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Clear the terminal screen.
pub struct Clr {}

impl BuiltinCommand for Clr {
    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        // cursor home, then erase the whole display
        write!(stdout, "\x1b[H\x1b[2J")?;
        stdout.flush()?;
        Ok(0)
    }
}

#[derive(FromArgs)]
#[argh(help_triggers("-h", "--help"))]
/// List the entries of a directory, one per line.
pub struct Dir {
    #[argh(positional)]
    /// directory to list; defaults to the current directory.
    pub target: Option<String>,

    #[argh(option, short = 'm')]
    /// only list names matching this regular expression.
    pub matching: Option<String>,
}

impl BuiltinCommand for Dir {
    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let dir = match &self.target {
            Some(t) => env.resolve_path(t),
            None => env.current_dir.clone(),
        };
        let filter = self
            .matching
            .as_deref()
            .map(Regex::new)
            .transpose()
            .context("dir: invalid pattern")?;

        let mut names: Vec<String> = fs::read_dir(&dir)
            .with_context(|| format!("dir: {}", dir.display()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| filter.as_ref().is_none_or(|re| re.is_match(name)))
            .collect();
        names.sort();

        for name in names {
            writeln!(stdout, "{}", name)?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Print every environment variable known to the shell.
pub struct Environ {}

impl BuiltinCommand for Environ {
    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let mut vars: Vec<_> = env.vars.iter().collect();
        vars.sort();
        for (key, value) in vars {
            writeln!(stdout, "{}\t{}", key, value)?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// write the arguments to standard output, separated by spaces.
/// by default, a trailing newline is printed.
pub struct Echo {
    #[argh(switch, short = 'n')]
    /// do not output the trailing newline.
    pub no_newline: bool,

    #[argh(positional, greedy)]
    /// values to print as-is, separated by spaces.
    pub args: Vec<String>,
}

impl Echo {
    /// `-n` in first position is the only flag; every other word is text, even
    /// `help` or `-5`.
    fn literal_args(args: &[String]) -> Vec<String> {
        let (flag, text) = match args.split_first() {
            Some((first, rest)) if first == "-n" => (Some(first), rest),
            _ => (None, args),
        };
        flag.into_iter()
            .cloned()
            .chain(std::iter::once("--".to_string()))
            .chain(text.iter().cloned())
            .collect()
    }
}

impl BuiltinCommand for Echo {
    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        let s = self.args.join(" ");
        if self.no_newline {
            write!(stdout, "{}", s)?;
        } else {
            writeln!(stdout, "{}", s)?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Show the user manual named by the HELP variable.
pub struct Help {}

impl Help {
    fn open(env: &Environment) -> Result<fs::File> {
        let path = env
            .get_var("HELP")
            .ok_or_else(|| anyhow!("help: HELP is not set"))?;
        let path = env.resolve_path(path);
        fs::File::open(&path)
            .with_context(|| format!("help: can't find shell help file at {}", path.display()))
    }

    /// Show the manual a screen at a time.
    fn page(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let manual = Self::open(env)?;
        pager::page(BufReader::new(manual), stdout)?;
        Ok(0)
    }
}

impl BuiltinCommand for Help {
    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let mut manual = Self::open(env)?;
        std::io::copy(&mut manual, stdout)?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Pause the shell until Enter is pressed.
pub struct Pause {}

impl BuiltinCommand for Pause {
    fn execute(
        self,
        stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        // byte at a time, so nothing past the newline is consumed
        for byte in stdin.bytes() {
            if byte? == b'\n' {
                break;
            }
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Exit the shell once the current line is done.
pub struct Quit {}

impl BuiltinCommand for Quit {
    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        env.should_exit = true;
        Ok(0)
    }
}
