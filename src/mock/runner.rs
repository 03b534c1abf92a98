use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Mutex;

use crate::hook::lock;
use crate::process::{CommandRunner, CommandSpec, ExitOutcome, OutputLines, RunningCommand};

const SIGTERM: i32 = 15;
const SIGKILL: i32 = 9;

/// Canned behaviour for one spawn
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    /// Output lines, delivered all at once
    pub lines: Vec<String>,
    /// Exit status once the process is done
    pub exit: ExitOutcome,
    /// Keep running after the output until terminated or killed
    pub hold_open: bool,
    /// Keep running after SIGTERM; only a kill stops it
    pub ignore_terminate: bool,
    /// Fail the spawn itself
    pub spawn_error: Option<io::ErrorKind>,
}

impl ScriptedResponse {
    /// Print `lines` and exit 0
    pub fn success<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::exit(0, lines)
    }

    /// Print `lines` and exit with `code`
    pub fn exit<I, S>(code: i32, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            exit: ExitOutcome::from_code(code),
            hold_open: false,
            ignore_terminate: false,
            spawn_error: None,
        }
    }

    /// Print `lines`, then keep running until stopped
    pub fn held<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hold_open: true,
            ..Self::success(lines)
        }
    }

    /// Fail to start
    pub fn spawn_failure(kind: io::ErrorKind) -> Self {
        Self {
            spawn_error: Some(kind),
            ..Self::success(Vec::<String>::new())
        }
    }

    pub fn ignoring_terminate(mut self) -> Self {
        self.ignore_terminate = true;
        self
    }
}

/// Command runner returning scripted responses per program.
///
/// Responses for a program are consumed in order; the last one repeats.
/// Programs without a script fail to spawn with `NotFound`.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    scripts: Mutex<HashMap<String, VecDeque<ScriptedResponse>>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for `program`
    pub fn script(&self, program: impl Into<String>, response: ScriptedResponse) -> &Self {
        lock(&self.scripts)
            .entry(program.into())
            .or_default()
            .push_back(response);
        self
    }

    /// Every spawned command, in order
    pub fn calls(&self) -> Vec<CommandSpec> {
        lock(&self.calls).clone()
    }

    /// Spawned commands for one program
    pub fn calls_to(&self, program: &str) -> Vec<CommandSpec> {
        lock(&self.calls)
            .iter()
            .filter(|spec| spec.program == program)
            .cloned()
            .collect()
    }

    fn next_response(&self, program: &str) -> Option<ScriptedResponse> {
        let mut scripts = lock(&self.scripts);
        let queue = scripts.get_mut(program)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

impl CommandRunner for ScriptedRunner {
    fn spawn(&self, spec: &CommandSpec) -> io::Result<Box<dyn RunningCommand>> {
        lock(&self.calls).push(spec.clone());

        let response = self.next_response(&spec.program).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no script for program '{}'", spec.program),
            )
        })?;

        if let Some(kind) = response.spawn_error {
            return Err(io::Error::new(kind, format!("cannot start '{}'", spec.program)));
        }

        Ok(Box::new(ScriptedChild {
            lines: Some(response.lines),
            exit: response.exit,
            hold_open: response.hold_open,
            ignore_terminate: response.ignore_terminate,
            stopped_by: None,
        }))
    }
}

struct ScriptedChild {
    lines: Option<Vec<String>>,
    exit: ExitOutcome,
    hold_open: bool,
    ignore_terminate: bool,
    stopped_by: Option<i32>,
}

impl ScriptedChild {
    fn status(&self) -> Option<ExitOutcome> {
        match self.stopped_by {
            Some(signal) => Some(ExitOutcome::from_signal(signal)),
            None if self.hold_open => None,
            None => Some(self.exit),
        }
    }
}

impl RunningCommand for ScriptedChild {
    fn id(&self) -> Option<u32> {
        None
    }

    fn take_output(&mut self) -> Option<OutputLines> {
        self.lines
            .take()
            .map(|lines| Box::new(lines.into_iter()) as OutputLines)
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitOutcome>> {
        Ok(self.status())
    }

    fn wait(&mut self) -> io::Result<ExitOutcome> {
        self.status().ok_or_else(|| {
            io::Error::new(io::ErrorKind::WouldBlock, "scripted process is held open")
        })
    }

    fn terminate(&mut self) -> io::Result<()> {
        if !self.ignore_terminate && self.stopped_by.is_none() {
            self.stopped_by = Some(SIGTERM);
        }
        Ok(())
    }

    fn kill(&mut self) -> io::Result<()> {
        if self.stopped_by.is_none() {
            self.stopped_by = Some(SIGKILL);
        }
        Ok(())
    }
}
