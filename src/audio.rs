use crossbeam_channel::{bounded, Receiver, Sender};
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::debug;

use crate::cancel::{CancelToken, Wait};
use crate::drill::Cue;
use crate::error::AudioError;

/// Completion handle for a cue that has started playing
#[derive(Debug)]
pub struct Playback {
    done: Option<Receiver<()>>,
}

/// Producer side of a [`Playback`]; dropping it also counts as finished
#[derive(Debug)]
pub struct PlaybackDone(Sender<()>);

impl Playback {
    /// A cue with nothing left to wait for
    pub fn finished() -> Self {
        Self { done: None }
    }

    pub fn pending() -> (Self, PlaybackDone) {
        let (tx, rx) = bounded(1);
        (Self { done: Some(rx) }, PlaybackDone(tx))
    }

    /// Block until the cue ends, the run is cancelled, or `bound` passes
    pub fn wait(&self, token: &CancelToken, bound: Duration) -> Wait {
        match &self.done {
            Some(rx) => token.wait_for(rx, bound),
            None if token.is_cancelled() => Wait::Cancelled,
            None => Wait::Completed,
        }
    }
}

impl PlaybackDone {
    pub fn finish(self) {
        let _ = self.0.try_send(());
    }
}

/// Cue output owned by the sequencer.
///
/// `play_*` must start the cue and return without waiting for it to end;
/// the sequencer calls them while holding its state lock, so they must not
/// call back into the sequencer.
pub trait AudioBackend: Send + Sync {
    fn play_down(&self) -> Result<Playback, AudioError>;
    fn play_set(&self) -> Result<Playback, AudioError>;
    fn play_whistle(&self) -> Result<Playback, AudioError>;
    fn stop_all(&self);
}

pub fn play_cue(backend: &dyn AudioBackend, cue: Cue) -> Result<Playback, AudioError> {
    match cue {
        Cue::Down => backend.play_down(),
        Cue::Set => backend.play_set(),
        Cue::Whistle => backend.play_whistle(),
        Cue::None => Ok(Playback::finished()),
    }
}

/// Terminal stand-in for speech and whistle playback: prints the cue and
/// rings the bell for the whistle.
pub struct ConsoleAudio {
    out: Mutex<Box<dyn Write + Send>>,
    cue_length: Duration,
}

impl ConsoleAudio {
    pub fn stdout(cue_length: Duration) -> Self {
        Self::with_writer(io::stdout(), cue_length)
    }

    pub fn with_writer<W: Write + Send + 'static>(out: W, cue_length: Duration) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
            cue_length,
        }
    }

    fn announce(&self, text: &str) -> Result<Playback, AudioError> {
        {
            let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
            writeln!(out, "{text}")
                .and_then(|_| out.flush())
                .map_err(|e| AudioError::Playback(e.to_string()))?;
        }

        if self.cue_length.is_zero() {
            return Ok(Playback::finished());
        }
        let (playback, done) = Playback::pending();
        let length = self.cue_length;
        thread::Builder::new()
            .name("faceoff-cue".into())
            .spawn(move || {
                thread::sleep(length);
                done.finish();
            })
            .map_err(|e| AudioError::Playback(e.to_string()))?;
        Ok(playback)
    }
}

impl AudioBackend for ConsoleAudio {
    fn play_down(&self) -> Result<Playback, AudioError> {
        self.announce("  >> DOWN")
    }

    fn play_set(&self) -> Result<Playback, AudioError> {
        self.announce("  >> SET")
    }

    fn play_whistle(&self) -> Result<Playback, AudioError> {
        self.announce("  >> *WHISTLE*\x07")
    }

    fn stop_all(&self) {
        debug!("console audio stopped");
        let _ = self
            .out
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush();
    }
}
