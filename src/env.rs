use std::collections::HashMap;
use std::env as stdenv;
use std::path::{Path, PathBuf};

/// Mutable, user-level view of the process environment used by the interpreter.
///
/// The environment contains:
/// - `vars`: a map of environment variables that will be visible to executed commands.
/// - `current_dir`: the working directory for command execution.
/// - `should_exit`: a flag that the read loop checks after every line.
///
/// The shell never changes the process-wide working directory. Every relative path
/// (redirection targets, executables, `cd` targets) is joined with `current_dir`, so a
/// background task holding its own clone keeps the directory it was launched in.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Key-value store of environment variables (e.g., PATH, HOME).
    pub vars: HashMap<String, String>,
    /// The current working directory for command execution.
    pub current_dir: PathBuf,
    /// When set to true, indicates that the read loop should exit.
    pub should_exit: bool,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    ///
    /// This copies variables from `std::env::vars()` and initializes `current_dir`
    /// from `std::env::current_dir()`. On top of the inherited variables the shell
    /// defines `SHELL` (path of the running binary), `PWD` and `HELP` (the manual
    /// shown by `help`, `readme` in the start-up directory unless already set).
    pub fn new() -> Self {
        let vars: HashMap<String, String> = stdenv::vars().collect();
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let mut env = Self {
            vars,
            current_dir,
            should_exit: false,
        };

        if let Ok(exe) = stdenv::current_exe() {
            env.set_var("SHELL", exe.to_string_lossy());
        }
        let pwd = env.current_dir.to_string_lossy().into_owned();
        env.set_var("PWD", pwd);
        if !env.vars.contains_key("HELP") {
            let help = env.current_dir.join("readme");
            env.set_var("HELP", help.to_string_lossy());
        }
        env
    }

    /// Get the value of an environment variable.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }

    /// Set or override an environment variable in `self.vars`.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// Resolve `path` against the shell's current directory.
    pub fn resolve_path(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.current_dir.join(path)
        }
    }

    /// Current directory as shown in the prompt, with `HOME` abbreviated to `~`.
    pub fn prompt_dir(&self) -> String {
        let cwd = self.current_dir.to_string_lossy().into_owned();
        match self.get_var("HOME").filter(|h| !h.is_empty()) {
            Some(home) => match self.current_dir.strip_prefix(&home) {
                Ok(rest) if rest.as_os_str().is_empty() => "~".to_string(),
                Ok(rest) => format!("~/{}", rest.to_string_lossy()),
                Err(_) => cwd,
            },
            None => cwd,
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
