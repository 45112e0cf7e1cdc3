use crossbeam_channel::Receiver;
use std::io::{self, BufRead};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use crate::error::SequencerError;
use crate::sequencer::Sequencer;
use crate::session::SessionView;

/// Command typed by the athlete (or a script) while a drill runs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    Start,
    Pause,
    Resume,
    Reset,
    Restart,
    Quit,
}

impl Control {
    /// One command per line: `g`/`start`, `p`/`pause`, `r`/`resume`,
    /// `x`/`reset`, `s`/`restart`, `q`/`quit`
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_lowercase().as_str() {
            "g" | "go" | "start" => Some(Control::Start),
            "p" | "pause" => Some(Control::Pause),
            "r" | "resume" => Some(Control::Resume),
            "x" | "reset" => Some(Control::Reset),
            "s" | "restart" => Some(Control::Restart),
            "q" | "quit" | "exit" => Some(Control::Quit),
            _ => None,
        }
    }
}

/// Unified event type consumed by the driver loop
#[derive(Clone, Debug, PartialEq)]
pub enum DriverEvent {
    Control(Control),
    Update(SessionView),
    Tick,
}

/// Source of athlete commands
pub trait ControlSource: Send + 'static {
    /// Block for up to `timeout` waiting for a command.
    fn recv_timeout(&self, timeout: Duration) -> Result<Control, RecvTimeoutError>;
}

/// Reads line commands from stdin on a background thread
pub struct StdinControlSource {
    rx: mpsc::Receiver<Control>,
}

impl StdinControlSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                match Control::parse(&line) {
                    Some(control) => {
                        if tx.send(control).is_err() {
                            break;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => eprintln!("unknown command {line:?} (g, p, r, x, s, q)"),
                }
            }
        });

        Self { rx }
    }
}

impl Default for StdinControlSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlSource for StdinControlSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<Control, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Scripted commands for tests
pub struct TestControlSource {
    rx: mpsc::Receiver<Control>,
}

impl TestControlSource {
    pub fn new(rx: mpsc::Receiver<Control>) -> Self {
        Self { rx }
    }
}

impl ControlSource for TestControlSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<Control, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Merges session updates and athlete commands into one event stream
pub struct Runner<C: ControlSource, T: Ticker> {
    controls: C,
    updates: Receiver<SessionView>,
    ticker: T,
    controls_closed: bool,
}

impl<C: ControlSource, T: Ticker> Runner<C, T> {
    pub fn new(controls: C, updates: Receiver<SessionView>, ticker: T) -> Self {
        Self {
            controls,
            updates,
            ticker,
            controls_closed: false,
        }
    }

    /// Session updates take priority; otherwise block up to one tick for a
    /// command.
    pub fn step(&mut self) -> DriverEvent {
        if let Ok(view) = self.updates.try_recv() {
            return DriverEvent::Update(view);
        }
        if self.controls_closed {
            return match self.updates.recv_timeout(self.ticker.interval()) {
                Ok(view) => DriverEvent::Update(view),
                Err(_) => DriverEvent::Tick,
            };
        }
        match self.controls.recv_timeout(self.ticker.interval()) {
            Ok(control) => DriverEvent::Control(control),
            Err(RecvTimeoutError::Timeout) => DriverEvent::Tick,
            Err(RecvTimeoutError::Disconnected) => {
                self.controls_closed = true;
                DriverEvent::Tick
            }
        }
    }

    /// True once the command source has hung up (e.g. stdin hit EOF)
    pub fn controls_closed(&self) -> bool {
        self.controls_closed
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Forward a command to the sequencer
pub fn apply(sequencer: &Sequencer, control: Control) -> Result<Flow, SequencerError> {
    match control {
        Control::Start => sequencer.start()?,
        Control::Pause => sequencer.pause(),
        Control::Resume => sequencer.resume(),
        Control::Reset => sequencer.reset(),
        Control::Restart => sequencer.restart(),
        Control::Quit => {
            sequencer.abandon();
            return Ok(Flow::Quit);
        }
    }
    Ok(Flow::Continue)
}
