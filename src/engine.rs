//! Runs [`Task`]s in the foreground or the background.

use crate::builtin::Builtin;
use crate::env::Environment;
use crate::error::{Result, ShellError};
use crate::streams::Streams;
use crate::task::{ExitCode, Target, Task};
use std::fmt;
use std::io::{self, IsTerminal, Write};
use std::path::Path;
use std::process::{Child, Command, ExitStatus};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, mpsc};
use std::thread::{self, JoinHandle};

/// Exit code reported when a built-in fails or a worker dies.
const FAILURE: ExitCode = 1;

static NEXT_WORKER: AtomicU32 = AtomicU32::new(1);

/// Identifier printed for a piece of background work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskId {
    /// The pid of an external child.
    Process(u32),
    /// A background built-in, numbered from 1 per shell process.
    Worker(u32),
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskId::Process(pid) => write!(f, "{}", pid),
            TaskId::Worker(n) => write!(f, "w{}", n),
        }
    }
}

/// Something the user should hear about background work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Launched {
        id: TaskId,
    },
    Finished {
        id: TaskId,
        command_line: String,
        code: ExitCode,
    },
    Failed {
        id: TaskId,
        command_line: String,
        message: String,
    },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Launched { id } => write!(f, "[{}]", id),
            Notice::Finished {
                id,
                command_line,
                code,
            } => write!(f, "[{}] ({}) finished with exit code: {}", id, command_line, code),
            Notice::Failed {
                id,
                command_line,
                message,
            } => write!(f, "[{}] ({}) failed: {}", id, command_line, message),
        }
    }
}

/// Receives launch and completion notices. Called from supervising threads.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Prints each notice as one line on standard output.
#[derive(Debug, Default)]
pub struct StdoutNotifier;

impl Notifier for StdoutNotifier {
    fn notify(&self, notice: Notice) {
        let mut out = io::stdout().lock();
        // the line editor may be holding the terminal in raw mode
        let _ = if out.is_terminal() {
            write!(out, "\r{}\r\n", notice)
        } else {
            writeln!(out, "{}", notice)
        };
        let _ = out.flush();
    }
}

impl Notifier for mpsc::Sender<Notice> {
    fn notify(&self, notice: Notice) {
        let _ = self.send(notice);
    }
}

/// Outcome of [`Engine::run`].
#[derive(Debug)]
pub enum RunResult {
    /// A foreground task finished with this exit code.
    Completed(ExitCode),
    /// A background task was launched and is still supervised.
    Detached(BackgroundJob),
}

/// Handle to detached work. Dropping it leaves the work running.
#[derive(Debug)]
pub struct BackgroundJob {
    id: TaskId,
    supervisor: JoinHandle<ExitCode>,
}

impl BackgroundJob {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.supervisor.is_finished()
    }

    /// Block until the work and its completion notice are done.
    pub fn join(self) -> ExitCode {
        self.supervisor.join().unwrap_or(FAILURE)
    }
}

/// Runs tasks and reports on background work through a [`Notifier`].
pub struct Engine {
    notifier: Arc<dyn Notifier>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Arc::new(StdoutNotifier))
    }
}

impl Engine {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Run `task`, consuming it.
    ///
    /// Foreground tasks block until done and return their exit code. Background tasks
    /// return as soon as they are launched; a supervising thread waits for them, closes
    /// their streams and sends the completion notice. Background work gets a clone of
    /// `env` taken here, so later changes to the shell state don't reach it.
    pub fn run(&self, task: Task, env: &mut Environment) -> Result<RunResult> {
        let Task {
            target,
            args,
            streams,
            background,
            command_line,
        } = task;
        tracing::debug!(command = %command_line, background, "running task");

        match (target, background) {
            (Target::Builtin(builtin), false) => Ok(RunResult::Completed(
                self.builtin_foreground(builtin, &args, streams, env),
            )),
            (Target::Builtin(builtin), true) => Ok(RunResult::Detached(
                self.builtin_background(builtin, args, streams, env.clone(), command_line),
            )),
            (Target::External(program), false) => self
                .external_foreground(&program, &args, streams, env)
                .map(RunResult::Completed),
            (Target::External(program), true) => self
                .external_background(&program, &args, streams, env, command_line)
                .map(RunResult::Detached),
        }
    }

    /// Runs on a scoped worker thread that borrows the shell state; the caller joins it.
    fn builtin_foreground(
        &self,
        builtin: Builtin,
        args: &[String],
        mut streams: Streams,
        env: &mut Environment,
    ) -> ExitCode {
        let on_terminal = streams.output().is_inherited() && io::stdout().is_terminal();
        let joined = thread::scope(|scope| {
            scope
                .spawn(|| run_builtin(builtin, args, &mut streams, env, on_terminal))
                .join()
        });
        streams.close();
        joined.unwrap_or_else(|_| {
            tracing::warn!(builtin = builtin.name(), "built-in worker panicked");
            FAILURE
        })
    }

    fn builtin_background(
        &self,
        builtin: Builtin,
        args: Vec<String>,
        mut streams: Streams,
        mut env: Environment,
        command_line: String,
    ) -> BackgroundJob {
        let id = TaskId::Worker(NEXT_WORKER.fetch_add(1, Ordering::Relaxed));
        self.notifier.notify(Notice::Launched { id });

        let notifier = Arc::clone(&self.notifier);
        let supervisor = thread::spawn(move || {
            let code = run_builtin(builtin, &args, &mut streams, &mut env, false);
            streams.close();
            notifier.notify(Notice::Finished {
                id,
                command_line,
                code,
            });
            code
        });
        BackgroundJob { id, supervisor }
    }

    fn external_foreground(
        &self,
        program: &Path,
        args: &[String],
        streams: Streams,
        env: &Environment,
    ) -> Result<ExitCode> {
        let mut child = match spawn(program, args, &streams, env) {
            Ok(child) => child,
            Err(e) => {
                streams.close();
                return Err(e);
            }
        };
        tracing::debug!(pid = child.id(), "waiting for foreground child");
        let waited = child.wait();
        streams.close();

        let status = waited.map_err(|source| ShellError::ExternalExecution {
            program: program.to_path_buf(),
            source,
        })?;
        Ok(exit_code(status))
    }

    fn external_background(
        &self,
        program: &Path,
        args: &[String],
        streams: Streams,
        env: &Environment,
        command_line: String,
    ) -> Result<BackgroundJob> {
        let mut child = match spawn(program, args, &streams, env) {
            Ok(child) => child,
            Err(e) => {
                streams.close();
                return Err(e);
            }
        };
        let id = TaskId::Process(child.id());
        self.notifier.notify(Notice::Launched { id });

        let notifier = Arc::clone(&self.notifier);
        let supervisor = thread::spawn(move || {
            let waited = child.wait();
            streams.close();
            match waited {
                Ok(status) => {
                    let code = exit_code(status);
                    tracing::debug!(%id, code, "background child exited");
                    notifier.notify(Notice::Finished {
                        id,
                        command_line,
                        code,
                    });
                    code
                }
                Err(e) => {
                    tracing::warn!(%id, error = %e, "waiting for background child failed");
                    notifier.notify(Notice::Failed {
                        id,
                        command_line,
                        message: e.to_string(),
                    });
                    FAILURE
                }
            }
        });
        Ok(BackgroundJob { id, supervisor })
    }
}

fn run_builtin(
    builtin: Builtin,
    args: &[String],
    streams: &mut Streams,
    env: &mut Environment,
    on_terminal: bool,
) -> ExitCode {
    let result =
        streams.with_io(|input, output| builtin.invoke(args, input, output, env, on_terminal));
    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("myshell error: {:#}", e);
            FAILURE
        }
    }
}

/// Launch `program` with its stdin/stdout bound to the task's streams and the
/// variables and directory captured in `env`.
fn spawn(program: &Path, args: &[String], streams: &Streams, env: &Environment) -> Result<Child> {
    let launch_error = |source| ShellError::ExternalExecution {
        program: program.to_path_buf(),
        source,
    };

    let _ = io::stdout().flush();
    let child = Command::new(program)
        .args(args)
        .stdin(streams.input().stdio().map_err(launch_error)?)
        .stdout(streams.output().stdio().map_err(launch_error)?)
        .envs(env.vars.iter())
        .current_dir(&env.current_dir)
        .spawn()
        .map_err(launch_error)?;
    tracing::debug!(program = %program.display(), pid = child.id(), "spawned child");
    Ok(child)
}

fn exit_code(status: ExitStatus) -> ExitCode {
    match status.code() {
        Some(x) => x,
        None => terminated_by_signal(status),
    }
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> i32 {
    -1
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::parser::{OutputRedirect, RedirectMode};
    use std::collections::HashMap;
    use std::fs;
    use std::path::PathBuf;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn env_in(dir: &Path) -> Environment {
        let mut vars = HashMap::new();
        vars.insert("PATH".to_string(), "/bin:/usr/bin".to_string());
        Environment {
            vars,
            current_dir: dir.to_path_buf(),
            should_exit: false,
        }
    }

    fn to_file(env: &Environment, name: &str) -> Streams {
        let redirect = OutputRedirect {
            path: name.to_string(),
            mode: RedirectMode::Truncate,
        };
        Streams::open(env, None, Some(&redirect)).unwrap()
    }

    fn sh(script: &str, streams: Streams, background: bool) -> Task {
        Task::new(
            Target::External(PathBuf::from("/bin/sh")),
            vec!["-c".to_string(), script.to_string()],
            streams,
            background,
        )
    }

    fn quiet_engine() -> (Engine, mpsc::Receiver<Notice>) {
        let (tx, rx) = mpsc::channel();
        (Engine::new(Arc::new(tx)), rx)
    }

    fn completed(result: RunResult) -> ExitCode {
        match result {
            RunResult::Completed(code) => code,
            RunResult::Detached(job) => panic!("expected foreground result, got {:?}", job.id()),
        }
    }

    fn detached(result: RunResult) -> BackgroundJob {
        match result {
            RunResult::Detached(job) => job,
            RunResult::Completed(code) => panic!("expected background job, got exit {code}"),
        }
    }

    #[test]
    fn foreground_builtin_writes_to_redirected_file() {
        let tmp = TempDir::new().unwrap();
        let mut env = env_in(tmp.path());
        let (engine, rx) = quiet_engine();
        let task = Task::new(
            Target::Builtin(Builtin::Echo),
            vec!["hi".into()],
            to_file(&env, "out.txt"),
            false,
        );

        let code = completed(engine.run(task, &mut env).unwrap());
        assert_eq!(code, 0);
        assert_eq!(fs::read_to_string(tmp.path().join("out.txt")).unwrap(), "hi\n");
        assert!(rx.try_recv().is_err(), "foreground work sends no notices");
    }

    #[test]
    fn foreground_builtin_mutates_shell_state() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        let mut env = env_in(tmp.path());
        let (engine, _rx) = quiet_engine();
        let task = Task::new(
            Target::Builtin(Builtin::Cd),
            vec!["sub".into()],
            Streams::inherited(),
            false,
        );

        completed(engine.run(task, &mut env).unwrap());
        assert_eq!(env.current_dir, fs::canonicalize(tmp.path().join("sub")).unwrap());
    }

    #[test]
    fn failing_builtin_reports_failure_code() {
        let tmp = TempDir::new().unwrap();
        let mut env = env_in(tmp.path());
        let (engine, _rx) = quiet_engine();
        let task = Task::new(
            Target::Builtin(Builtin::Cd),
            vec!["missing".into()],
            Streams::inherited(),
            false,
        );
        assert_eq!(completed(engine.run(task, &mut env).unwrap()), FAILURE);
    }

    #[test]
    fn foreground_external_surfaces_exit_code() {
        let tmp = TempDir::new().unwrap();
        let mut env = env_in(tmp.path());
        let (engine, _rx) = quiet_engine();

        let code = completed(
            engine
                .run(sh("exit 3", Streams::inherited(), false), &mut env)
                .unwrap(),
        );
        assert_eq!(code, 3);

        let code = completed(
            engine
                .run(sh("kill -9 $$", Streams::inherited(), false), &mut env)
                .unwrap(),
        );
        assert_eq!(code, 128 + 9);
    }

    #[test]
    fn foreground_external_uses_redirected_streams() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("in.txt"), "line one\nline two\n").unwrap();
        let mut env = env_in(tmp.path());
        let (engine, _rx) = quiet_engine();
        let redirect = OutputRedirect {
            path: "out.txt".to_string(),
            mode: RedirectMode::Truncate,
        };
        let streams = Streams::open(&env, Some("in.txt"), Some(&redirect)).unwrap();
        let task = Task::new(
            Target::External(PathBuf::from("/bin/cat")),
            vec![],
            streams,
            false,
        );

        assert_eq!(completed(engine.run(task, &mut env).unwrap()), 0);
        assert_eq!(
            fs::read_to_string(tmp.path().join("out.txt")).unwrap(),
            "line one\nline two\n"
        );
    }

    #[test]
    fn external_sees_captured_directory_and_vars() {
        let tmp = TempDir::new().unwrap();
        let mut env = env_in(tmp.path());
        env.set_var("GREETING", "hola");
        let (engine, _rx) = quiet_engine();
        let task = sh("echo \"$GREETING $(pwd)\"", to_file(&env, "out.txt"), false);

        completed(engine.run(task, &mut env).unwrap());
        let out = fs::read_to_string(tmp.path().join("out.txt")).unwrap();
        let dir = fs::canonicalize(tmp.path()).unwrap();
        assert_eq!(out.trim_end(), format!("hola {}", dir.display()));
    }

    #[test]
    fn vanished_executable_is_execution_error() {
        let tmp = TempDir::new().unwrap();
        let mut env = env_in(tmp.path());
        let (engine, _rx) = quiet_engine();
        let task = Task::new(
            Target::External(tmp.path().join("gone")),
            vec![],
            to_file(&env, "out.txt"),
            false,
        );

        let err = engine.run(task, &mut env).unwrap_err();
        assert!(matches!(err, ShellError::ExternalExecution { .. }));
    }

    #[test]
    fn background_external_reports_its_exit_code() {
        let tmp = TempDir::new().unwrap();
        let mut env = env_in(tmp.path());
        let (engine, rx) = quiet_engine();

        let job = detached(
            engine
                .run(sh("exit 7", Streams::inherited(), true), &mut env)
                .unwrap(),
        );
        let id = job.id();
        assert!(matches!(id, TaskId::Process(_)));
        assert_eq!(rx.recv().unwrap(), Notice::Launched { id });
        assert_eq!(
            rx.recv().unwrap(),
            Notice::Finished {
                id,
                command_line: "/bin/sh -c exit 7".to_string(),
                code: 7,
            }
        );
        assert_eq!(job.join(), 7);
    }

    #[test]
    fn background_returns_before_work_finishes() {
        let tmp = TempDir::new().unwrap();
        let mut env = env_in(tmp.path());
        let (engine, rx) = quiet_engine();

        let started = Instant::now();
        let job = detached(
            engine
                .run(sh("sleep 2", Streams::inherited(), true), &mut env)
                .unwrap(),
        );
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!job.is_finished());
        assert!(matches!(rx.recv().unwrap(), Notice::Launched { .. }));

        assert_eq!(job.join(), 0);
        assert!(matches!(rx.recv().unwrap(), Notice::Finished { code: 0, .. }));
    }

    #[test]
    fn background_external_writes_redirected_output() {
        let tmp = TempDir::new().unwrap();
        let mut env = env_in(tmp.path());
        let (engine, _rx) = quiet_engine();
        let task = sh("echo detached", to_file(&env, "bg.txt"), true);

        let job = detached(engine.run(task, &mut env).unwrap());
        assert_eq!(job.join(), 0);
        assert_eq!(fs::read_to_string(tmp.path().join("bg.txt")).unwrap(), "detached\n");
    }

    #[test]
    fn background_builtin_runs_on_captured_state() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        let mut env = env_in(tmp.path());
        let (engine, rx) = quiet_engine();
        let task = Task::new(
            Target::Builtin(Builtin::Cd),
            vec!["sub".into()],
            Streams::inherited(),
            true,
        );

        let job = detached(engine.run(task, &mut env).unwrap());
        let id = job.id();
        assert!(matches!(id, TaskId::Worker(_)));
        assert_eq!(job.join(), 0);
        assert_eq!(env.current_dir, tmp.path());

        assert_eq!(rx.recv().unwrap(), Notice::Launched { id });
        assert_eq!(
            rx.recv().unwrap(),
            Notice::Finished {
                id,
                command_line: "cd sub".to_string(),
                code: 0,
            }
        );
    }

    #[test]
    fn background_builtin_output_lands_in_file() {
        let tmp = TempDir::new().unwrap();
        let mut env = env_in(tmp.path());
        let (engine, _rx) = quiet_engine();
        let task = Task::new(
            Target::Builtin(Builtin::Echo),
            vec!["from".into(), "worker".into()],
            to_file(&env, "w.txt"),
            true,
        );

        let job = detached(engine.run(task, &mut env).unwrap());
        assert_eq!(job.join(), 0);
        assert_eq!(fs::read_to_string(tmp.path().join("w.txt")).unwrap(), "from worker\n");
    }

    #[test]
    fn notices_render_like_the_shell_prints_them() {
        let id = TaskId::Process(4242);
        assert_eq!(Notice::Launched { id }.to_string(), "[4242]");
        let finished = Notice::Finished {
            id,
            command_line: "sleep 5".into(),
            code: 0,
        };
        assert_eq!(finished.to_string(), "[4242] (sleep 5) finished with exit code: 0");
        assert_eq!(TaskId::Worker(3).to_string(), "w3");
    }
}
