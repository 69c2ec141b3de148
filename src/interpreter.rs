use crate::builtin::Registry;
use crate::engine::{BackgroundJob, Engine, RunResult};
use crate::env::Environment;
use crate::error::ShellError;
use crate::parser::{self, ParsedInvocation};
use crate::task::{ExitCode, Task};
use rustyline::error::ReadlineError;
use rustyline::{DefaultEditor, Result};
use std::io::BufRead;

/// A minimal shell-like interpreter that can execute built-in and external commands.
///
/// The interpreter owns the shell [`Environment`], consults the built-in [`Registry`]
/// and hands every prepared [`Task`] to its [`Engine`].
///
/// Example
/// ```
/// use myshell::Interpreter;
/// let mut sh = Interpreter::default();
/// let code = sh.run("echo", &["hello", "world"]).unwrap();
/// assert_eq!(code, 0);
/// ```
pub struct Interpreter {
    env: Environment,
    registry: &'static Registry,
    engine: Engine,
    jobs: Vec<BackgroundJob>,
}

impl Interpreter {
    /// Create an interpreter that runs tasks with `engine`.
    pub fn new(engine: Engine) -> Self {
        Self::with_env(Environment::new(), engine)
    }

    /// Create an interpreter over an explicit starting environment.
    pub fn with_env(env: Environment, engine: Engine) -> Self {
        Self {
            env,
            registry: Registry::standard(),
            engine,
            jobs: Vec::new(),
        }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Run a single command invocation by name with arguments, in the foreground and
    /// without redirections.
    ///
    /// Returns the command's exit code or an error if the command cannot be resolved
    /// or launched.
    pub fn run(&mut self, name: &str, args: &[&str]) -> anyhow::Result<ExitCode> {
        let parsed = ParsedInvocation {
            command_name: name.to_string(),
            raw_args: args.iter().map(|s| s.to_string()).collect(),
            input_redirect: None,
            output_redirect: None,
            background: false,
        };
        Ok(self.execute(parsed)?.unwrap_or_default())
    }

    /// Parse, resolve and run one input line.
    ///
    /// Returns the exit code of a foreground command, or `None` once a background
    /// command has been launched.
    pub fn execute_line(
        &mut self,
        line: &str,
    ) -> std::result::Result<Option<ExitCode>, ShellError> {
        let parsed = parser::parse(line)?;
        self.execute(parsed)
    }

    fn execute(
        &mut self,
        parsed: ParsedInvocation,
    ) -> std::result::Result<Option<ExitCode>, ShellError> {
        let task = Task::prepare(parsed, self.registry, &self.env)?;
        match self.engine.run(task, &mut self.env)? {
            RunResult::Completed(code) => Ok(Some(code)),
            RunResult::Detached(job) => {
                self.jobs.retain(|running| !running.is_finished());
                self.jobs.push(job);
                Ok(None)
            }
        }
    }

    /// Block until every background job launched so far has finished.
    pub fn wait_for_jobs(&mut self) {
        for job in self.jobs.drain(..) {
            let id = job.id();
            let code = job.join();
            tracing::debug!(%id, code, "background job joined");
        }
    }

    /// The interactive Read-Eval-Print Loop.
    ///
    /// Errors are printed and the loop goes on. Ctrl-C, Ctrl-D or `quit` end it.
    pub fn repl(&mut self) -> Result<()> {
        let mut rl = DefaultEditor::new()?;

        while !self.env.should_exit {
            let readline = rl.readline(&format!("[{}] $ ", self.env.prompt_dir()));
            match readline {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        rl.add_history_entry(line.as_str())?;
                    }
                    match self.execute_line(&line) {
                        Ok(_) | Err(ShellError::EmptyCommand) => {}
                        Err(e) => eprintln!("myshell error: {}", e),
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err),
            }
        }

        Ok(())
    }

    /// Run a script line by line.
    ///
    /// Blank lines are skipped. The first failing line ends the script with its error,
    /// since nobody is there to react to a message. Background jobs still running at
    /// the end are waited for so their notices are not lost.
    pub fn batch(&mut self, script: impl BufRead) -> anyhow::Result<()> {
        for (number, line) in script.lines().enumerate() {
            let line = line?;
            match self.execute_line(&line) {
                Ok(_) | Err(ShellError::EmptyCommand) => {}
                Err(e) => {
                    tracing::debug!(line = number + 1, "script aborted");
                    return Err(e.into());
                }
            }
            if self.env.should_exit {
                break;
            }
        }
        self.wait_for_jobs();
        Ok(())
    }
}

impl Default for Interpreter {
    /// Create an interpreter reporting background work on standard output.
    fn default() -> Self {
        Self::new(Engine::default())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use crate::Interpreter;
    use crate::builtin::Builtin;
    use crate::engine::{Engine, Notice, RunResult};
    use crate::parser;
    use crate::streams::Output;
    use crate::task::{Target, Task};
    use crate::env::Environment;
    use crate::error::ShellError;
    use std::collections::HashMap;
    use std::fs;
    use std::path::Path;
    use std::sync::{Arc, mpsc};
    use tempfile::TempDir;

    fn shell_in(dir: &Path) -> (Interpreter, mpsc::Receiver<Notice>) {
        let mut vars = HashMap::new();
        vars.insert("PATH".to_string(), "/bin:/usr/bin".to_string());
        let env = Environment {
            vars,
            current_dir: dir.to_path_buf(),
            should_exit: false,
        };
        let (tx, rx) = mpsc::channel();
        (Interpreter::with_env(env, Engine::new(Arc::new(tx))), rx)
    }

    #[test]
    fn echo_redirected_to_file() {
        let tmp = TempDir::new().unwrap();
        let (mut sh, _rx) = shell_in(tmp.path());

        assert_eq!(sh.execute_line("echo hi > out.txt").unwrap(), Some(0));
        assert_eq!(sh.execute_line("echo there >> out.txt").unwrap(), Some(0));
        assert_eq!(
            fs::read_to_string(tmp.path().join("out.txt")).unwrap(),
            "hi\nthere\n"
        );
    }

    #[test]
    fn echo_writes_to_inherited_stdout() {
        let tmp = TempDir::new().unwrap();
        let (mut sh, _rx) = shell_in(tmp.path());

        let parsed = parser::parse("echo hello world").unwrap();
        let task = Task::prepare(parsed, sh.registry, &sh.env).unwrap();
        assert!(matches!(task.target(), Target::Builtin(Builtin::Echo)));
        assert_eq!(task.args(), ["hello", "world"]);
        assert!(matches!(task.streams().output(), Output::Inherit));
        assert!(!task.is_background());

        match sh.engine.run(task, &mut sh.env).unwrap() {
            RunResult::Completed(code) => assert_eq!(code, 0),
            RunResult::Detached(_) => panic!("foreground echo was detached"),
        }
    }

    #[test]
    fn unknown_command_keeps_shell_usable() {
        let tmp = TempDir::new().unwrap();
        let (mut sh, _rx) = shell_in(tmp.path());

        let err = sh.execute_line("badcmd").unwrap_err();
        assert!(matches!(err, ShellError::CommandNotFound(_)));
        assert_eq!(sh.execute_line("echo still here > ok.txt").unwrap(), Some(0));
    }

    #[test]
    fn dangling_operator_runs_nothing() {
        let tmp = TempDir::new().unwrap();
        let (mut sh, _rx) = shell_in(tmp.path());

        let err = sh.execute_line("echo a >").unwrap_err();
        assert!(matches!(err, ShellError::InvalidArguments(_)));
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn cd_then_relative_redirection() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        let (mut sh, _rx) = shell_in(tmp.path());

        sh.execute_line("cd sub").unwrap();
        sh.execute_line("echo inside > note.txt").unwrap();
        assert!(tmp.path().join("sub").join("note.txt").exists());
    }

    #[test]
    fn background_line_reports_completion() {
        let tmp = TempDir::new().unwrap();
        let (mut sh, rx) = shell_in(tmp.path());

        assert_eq!(sh.execute_line("sh -c 'exit 4' &").unwrap(), None);
        sh.wait_for_jobs();

        assert!(matches!(rx.recv().unwrap(), Notice::Launched { .. }));
        match rx.recv().unwrap() {
            Notice::Finished {
                command_line, code, ..
            } => {
                assert_eq!(command_line, "sh -c exit 4");
                assert_eq!(code, 4);
            }
            other => panic!("unexpected notice {other:?}"),
        }
    }

    #[test]
    fn batch_stops_at_first_error() {
        let tmp = TempDir::new().unwrap();
        let (mut sh, _rx) = shell_in(tmp.path());
        let script = "echo one > log.txt\n\nbadcmd\necho two >> log.txt\n";

        let err = sh.batch(script.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("badcmd"));
        assert_eq!(
            fs::read_to_string(tmp.path().join("log.txt")).unwrap(),
            "one\n"
        );
    }

    #[test]
    fn batch_waits_for_background_jobs() {
        let tmp = TempDir::new().unwrap();
        let (mut sh, rx) = shell_in(tmp.path());
        let script = "sh -c 'sleep 1; echo late' > late.txt &\n";

        sh.batch(script.as_bytes()).unwrap();
        assert_eq!(
            fs::read_to_string(tmp.path().join("late.txt")).unwrap(),
            "late\n"
        );
        assert!(matches!(rx.try_recv().unwrap(), Notice::Launched { .. }));
        assert!(matches!(rx.try_recv().unwrap(), Notice::Finished { code: 0, .. }));
    }

    #[test]
    fn quit_ends_batch() {
        let tmp = TempDir::new().unwrap();
        let (mut sh, _rx) = shell_in(tmp.path());
        let script = "quit\necho never > never.txt\n";

        sh.batch(script.as_bytes()).unwrap();
        assert!(sh.env().should_exit);
        assert!(!tmp.path().join("never.txt").exists());
    }

    #[test]
    fn run_executes_by_name() {
        let tmp = TempDir::new().unwrap();
        let (mut sh, _rx) = shell_in(tmp.path());
        assert_eq!(sh.run("true", &[]).unwrap(), 0);
        assert_eq!(sh.run("false", &[]).unwrap(), 1);
        assert!(sh.run("nonexistent_cmd_for_test", &[]).is_err());
    }
}
