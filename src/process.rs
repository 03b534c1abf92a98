//! External command execution
//!
//! Every process the hook starts (spark-submit, status queries, kill
//! commands) goes through a [`CommandRunner`]. The system runner gives the
//! child one pipe for both stdout and stderr, so lines arrive in the order
//! they were written; tests substitute a scripted runner.

use std::fmt;
#[cfg(unix)]
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;

use indexmap::IndexMap;

/// A complete process environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessEnv {
    vars: IndexMap<String, String>,
}

impl ProcessEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current process environment
    pub fn from_current() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Copy with `overrides` applied on top
    pub fn with_overrides<'a, I>(&self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let mut env = self.clone();
        for (key, value) in overrides {
            env.vars.insert(key.clone(), value.clone());
        }
        env
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ProcessEnv {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// A command to start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Full environment for the child; `None` inherits the parent's
    pub env: Option<ProcessEnv>,
}

impl CommandSpec {
    /// Build from a token list; the first token is the program.
    pub fn from_tokens(tokens: &[String]) -> Self {
        let (program, args) = match tokens.split_first() {
            Some((program, args)) => (program.clone(), args.to_vec()),
            None => (String::new(), Vec::new()),
        };
        Self {
            program,
            args,
            env: None,
        }
    }

    pub fn with_env(mut self, env: ProcessEnv) -> Self {
        self.env = Some(env);
        self
    }

    /// All tokens, program first
    pub fn tokens(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

/// How a process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    /// Exit code, absent when the process was killed by a signal
    pub code: Option<i32>,
    /// Terminating signal (unix only)
    pub signal: Option<i32>,
}

impl ExitOutcome {
    pub fn from_code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn from_signal(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for ExitOutcome {
    fn from(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "{}", code),
            (None, Some(signal)) => write!(f, "SIG{}", signal),
            (None, None) => f.write_str("unknown"),
        }
    }
}

/// Output of a command run to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: ExitOutcome,
    /// Combined stdout and stderr, one entry per line
    pub lines: Vec<String>,
}

/// Combined output lines of a running command
pub type OutputLines = Box<dyn Iterator<Item = String> + Send>;

/// Handle to a started process
pub trait RunningCommand: Send {
    /// OS process id, when there is one
    fn id(&self) -> Option<u32>;

    /// Take the output stream; returns `None` on the second call.
    fn take_output(&mut self) -> Option<OutputLines>;

    fn try_wait(&mut self) -> io::Result<Option<ExitOutcome>>;

    fn wait(&mut self) -> io::Result<ExitOutcome>;

    /// Ask the process to stop (SIGTERM on unix)
    fn terminate(&mut self) -> io::Result<()>;

    /// Stop the process unconditionally
    fn kill(&mut self) -> io::Result<()>;
}

/// Starts external commands
pub trait CommandRunner: Send + Sync {
    fn spawn(&self, spec: &CommandSpec) -> io::Result<Box<dyn RunningCommand>>;

    /// Run to completion, collecting output
    fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutput> {
        let mut child = self.spawn(spec)?;
        let lines = child
            .take_output()
            .map(|output| output.collect())
            .unwrap_or_default();
        let status = child.wait()?;
        Ok(CommandOutput { status, lines })
    }
}

/// Runs commands as real child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for SystemRunner {
    fn spawn(&self, spec: &CommandSpec) -> io::Result<Box<dyn RunningCommand>> {
        let mut command = Command::new(&spec.program);
        command.args(&spec.args).stdin(Stdio::null());

        if let Some(env) = &spec.env {
            command.env_clear().envs(env.iter());
        }

        let (tx, rx) = mpsc::channel();
        let child = spawn_merged(command, tx)?;

        Ok(Box::new(SystemChild {
            child,
            output: Some(Box::new(rx.into_iter())),
        }))
    }
}

/// Start `command` with stdout and stderr sharing one pipe.
#[cfg(unix)]
fn spawn_merged(mut command: Command, tx: mpsc::Sender<String>) -> io::Result<Child> {
    use std::os::fd::AsRawFd;

    use nix::fcntl::{fcntl, FcntlArg, FdFlag};

    let (read, write) = nix::unistd::pipe()?;
    // Other children started meanwhile must not inherit either end, or the
    // reader would not see EOF until they exit too.
    for fd in [&read, &write] {
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    }

    command
        .stdout(Stdio::from(write.try_clone()?))
        .stderr(Stdio::from(write));
    let child = command.spawn()?;
    // Drops the parent's copies of the write end
    drop(command);

    forward_lines(File::from(read), tx);
    Ok(child)
}

/// Two pipes read on separate threads; ordering across the streams is lost.
#[cfg(not(unix))]
fn spawn_merged(mut command: Command, tx: mpsc::Sender<String>) -> io::Result<Child> {
    command.stdout(Stdio::piped()).stderr(Stdio::piped());
    let mut child = command.spawn()?;

    if let Some(stdout) = child.stdout.take() {
        forward_lines(stdout, tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        forward_lines(stderr, tx);
    }
    Ok(child)
}

/// Read `source` line by line on a thread, sending each line to `tx`.
/// Invalid UTF-8 is replaced rather than ending the stream.
fn forward_lines<R: Read + Send + 'static>(source: R, tx: mpsc::Sender<String>) {
    thread::spawn(move || {
        let mut reader = BufReader::new(source);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\n', '\r']).to_string();
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

struct SystemChild {
    child: Child,
    output: Option<OutputLines>,
}

impl RunningCommand for SystemChild {
    fn id(&self) -> Option<u32> {
        Some(self.child.id())
    }

    fn take_output(&mut self) -> Option<OutputLines> {
        self.output.take()
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitOutcome>> {
        Ok(self.child.try_wait()?.map(ExitOutcome::from))
    }

    fn wait(&mut self) -> io::Result<ExitOutcome> {
        Ok(self.child.wait()?.into())
    }

    fn terminate(&mut self) -> io::Result<()> {
        #[cfg(unix)]
        {
            use nix::sys::signal::{self, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(self.child.id() as i32);
            signal::kill(pid, Signal::SIGTERM).map_err(io::Error::from)
        }
        #[cfg(not(unix))]
        {
            self.child.kill()
        }
    }

    fn kill(&mut self) -> io::Result<()> {
        self.child.kill()
    }
}
