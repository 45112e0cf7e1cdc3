//! The practice sequencer: a pausable, cancellable run through a drill's
//! protocol, repeated for the configured number of reps.
//!
//! Each start or resume spawns one worker thread holding a [`CancelToken`].
//! The worker blocks only while a cue plays or a delay runs, and both waits
//! wake as soon as the token is cancelled. Every state change the worker
//! makes goes through [`Run::transition`], which re-checks the token under
//! the session lock; `pause`, `reset` and `abandon` cancel under that same
//! lock, so a cancelled worker can never publish another transition.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::audio::{play_cue, AudioBackend, Playback};
use crate::cancel::{cancel_pair, CancelSource, CancelToken, Wait};
use crate::delay::{resolve_delay, MISSING_RANGE_DELAY};
use crate::drill::{DrillType, RangeKey, Step};
use crate::error::{AudioError, SequencerError};
use crate::history::HistoryStore;
use crate::session::{
    CompletedSessionRecord, PausedSnapshot, Phase, Session, SessionView, Status, COMPLETE_LABEL,
    RESUMING_LABEL, REST_LABEL,
};
use crate::settings::SettingsStore;

pub const LEAD_IN: Duration = Duration::from_millis(1000);
pub const RESTART_SETTLE: Duration = Duration::from_millis(500);
pub const AUDIO_TIMEOUT: Duration = Duration::from_secs(5);

/// Fixed waits around the randomized ones
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Before the first cue of a start or resume
    pub lead_in: Duration,
    /// Between the reset and the start of a restart
    pub restart_settle: Duration,
    /// Longest wait for a cue's completion signal
    pub audio_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            lead_in: LEAD_IN,
            restart_settle: RESTART_SETTLE,
            audio_timeout: AUDIO_TIMEOUT,
        }
    }
}

/// Position a run starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    rep: u32,
    phase: Phase,
}

#[derive(Debug)]
struct Inner {
    drill: DrillType,
    session: Option<Session>,
    paused: Option<PausedSnapshot>,
    run: Option<CancelSource>,
    pending_restart: Option<CancelSource>,
}

impl Inner {
    fn is_busy(&self) -> bool {
        self.paused.is_some()
            || self
                .session
                .as_ref()
                .is_some_and(|s| s.status.is_running() || s.status == Status::Paused)
    }

    fn cancel_all(&mut self) {
        if let Some(run) = self.run.take() {
            run.cancel();
        }
        if let Some(pending) = self.pending_restart.take() {
            pending.cancel();
        }
    }
}

struct Shared {
    audio: Arc<dyn AudioBackend>,
    settings: Arc<dyn SettingsStore>,
    history: Arc<dyn HistoryStore>,
    timing: Timing,
    state: Mutex<Inner>,
    observers: Mutex<Vec<Sender<SessionView>>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn view(&self, inner: &Inner) -> SessionView {
        match &inner.session {
            Some(session) => session.view(),
            None => {
                let drill = inner.drill;
                let reps = self
                    .settings
                    .drill_settings(drill)
                    .map_or(0, |s| s.number_of_reps);
                SessionView::ready(drill, reps)
            }
        }
    }

    /// Called with the state lock held so observers see transitions in order
    fn publish(&self, inner: &Inner) {
        let view = self.view(inner);
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| tx.send(view.clone()).is_ok());
    }
}

/// Handle to a practice sequencer. Clones share the same session.
#[derive(Clone)]
pub struct Sequencer {
    shared: Arc<Shared>,
}

impl Sequencer {
    pub fn new(
        drill: DrillType,
        audio: Arc<dyn AudioBackend>,
        settings: Arc<dyn SettingsStore>,
        history: Arc<dyn HistoryStore>,
        timing: Timing,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                audio,
                settings,
                history,
                timing,
                state: Mutex::new(Inner {
                    drill,
                    session: None,
                    paused: None,
                    run: None,
                    pending_restart: None,
                }),
                observers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Current view, for polling UIs
    pub fn state(&self) -> SessionView {
        let inner = self.shared.lock();
        self.shared.view(&inner)
    }

    /// Receive a view on every transition, starting with the current one
    pub fn subscribe(&self) -> Receiver<SessionView> {
        let (tx, rx) = unbounded();
        let inner = self.shared.lock();
        let _ = tx.send(self.shared.view(&inner));
        self.shared
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn drill(&self) -> DrillType {
        self.shared.lock().drill
    }

    pub fn paused_snapshot(&self) -> Option<PausedSnapshot> {
        self.shared.lock().paused.clone()
    }

    pub fn is_active(&self) -> bool {
        self.shared.lock().is_busy()
    }

    /// Switch drills while idle
    pub fn set_drill(&self, drill: DrillType) -> Result<(), SequencerError> {
        let mut inner = self.shared.lock();
        if inner.is_busy() {
            return Err(SequencerError::AlreadyActive);
        }
        inner.cancel_all();
        inner.drill = drill;
        inner.session = None;
        self.shared.publish(&inner);
        Ok(())
    }

    /// Switch drills by id, e.g. `"three-whistle"`
    pub fn set_drill_by_id(&self, id: &str) -> Result<(), SequencerError> {
        let drill = id.parse::<DrillType>().inspect_err(|err| {
            error!(%err, "refusing to select drill");
        })?;
        self.set_drill(drill)
    }

    /// Begin a new session after the lead-in. Returns immediately.
    pub fn start(&self) -> Result<(), SequencerError> {
        let mut inner = self.shared.lock();
        self.start_locked(&mut inner)
    }

    fn start_locked(&self, inner: &mut Inner) -> Result<(), SequencerError> {
        if !self.shared.settings.is_loaded() {
            info!("settings not loaded yet; start ignored");
            return Err(SequencerError::SettingsUnavailable);
        }
        if inner.is_busy() {
            return Err(SequencerError::AlreadyActive);
        }
        let drill = inner.drill;
        let drill_settings = self
            .shared
            .settings
            .drill_settings(drill)
            .ok_or(SequencerError::SettingsUnavailable)?;
        let total_reps = drill_settings.number_of_reps.max(1);

        inner.cancel_all();
        inner.paused = None;
        inner.session = Some(Session::new(drill, total_reps));
        info!(%drill, total_reps, "practice started");
        self.shared.publish(inner);
        self.spawn_run(
            inner,
            Entry {
                rep: 1,
                phase: Phase::Step(0),
            },
        );
        Ok(())
    }

    /// Suspend a running session; no-op otherwise
    pub fn pause(&self) {
        let mut inner = self.shared.lock();
        let running = inner
            .session
            .as_ref()
            .is_some_and(|s| s.status.is_running());
        if !running {
            debug!("pause ignored: nothing running");
            return;
        }

        inner.cancel_all();
        self.shared.audio.stop_all();
        if let Some(session) = inner.session.as_mut() {
            let snapshot = PausedSnapshot::capture(session);
            info!(
                rep = snapshot.current_rep,
                phase = ?snapshot.phase,
                label = %snapshot.phase_label,
                "practice paused"
            );
            session.status = Status::Paused;
            inner.paused = Some(snapshot);
        }
        self.shared.publish(&inner);
    }

    /// Continue a paused session from the step it was paused in
    pub fn resume(&self) {
        let mut inner = self.shared.lock();
        let Some(snapshot) = inner.paused.take() else {
            debug!("resume ignored: no paused session");
            return;
        };

        let phase = match snapshot.phase {
            Phase::LeadIn => Phase::Step(0),
            other => other,
        };
        if let Some(session) = inner.session.as_mut() {
            session.current_rep = snapshot.current_rep;
            session.status = Status::Active;
            session.phase_label = RESUMING_LABEL.to_string();
        }
        info!(rep = snapshot.current_rep, ?phase, "practice resuming");
        self.shared.publish(&inner);
        self.spawn_run(
            &mut inner,
            Entry {
                rep: snapshot.current_rep,
                phase,
            },
        );
    }

    /// Stop everything and return to ready without recording
    pub fn reset(&self) {
        self.stop("practice reset");
    }

    /// Forced cancellation when the practice view goes away
    pub fn abandon(&self) {
        self.stop("practice abandoned");
    }

    /// Reset, then start again once the settle delay has passed
    pub fn restart(&self) {
        self.reset();

        let mut inner = self.shared.lock();
        let (source, token) = cancel_pair();
        inner.pending_restart = Some(source);
        let settle = self.shared.timing.restart_settle;
        let this = self.clone();
        let spawned = thread::Builder::new()
            .name("faceoff-restart".into())
            .spawn(move || {
                if token.sleep(settle) == Wait::Elapsed {
                    this.start_scheduled(&token);
                }
            });
        if let Err(err) = spawned {
            error!(%err, "could not schedule restart");
            inner.pending_restart = None;
        }
    }

    fn start_scheduled(&self, token: &CancelToken) {
        let mut inner = self.shared.lock();
        if token.is_cancelled() {
            return;
        }
        inner.pending_restart = None;
        if let Err(err) = self.start_locked(&mut inner) {
            warn!(%err, "scheduled restart did not start");
        }
    }

    fn stop(&self, reason: &'static str) {
        let mut inner = self.shared.lock();
        inner.cancel_all();
        self.shared.audio.stop_all();
        let was = inner.session.as_ref().map(|s| (s.current_rep, s.status));
        inner.paused = None;
        inner.session = None;
        info!(?was, "{reason}");
        self.shared.publish(&inner);
    }

    fn spawn_run(&self, inner: &mut Inner, entry: Entry) {
        let Some(session) = inner.session.as_ref() else {
            return;
        };
        let (source, token) = cancel_pair();
        let run = Run {
            shared: Arc::clone(&self.shared),
            token,
            drill: session.drill,
            total_reps: session.total_reps,
        };

        let spawned = thread::Builder::new()
            .name("faceoff-sequencer".into())
            .spawn(move || run.execute(entry));
        match spawned {
            Ok(_) => inner.run = Some(source),
            Err(err) => {
                error!(%err, "could not spawn sequencer thread; returning to ready");
                inner.session = None;
                inner.paused = None;
                self.shared.publish(inner);
            }
        }
    }
}

enum Outcome {
    Completed,
    Cancelled,
}

/// One worker's pass through the protocol, from an entry point to the end
/// of the session or until cancelled.
struct Run {
    shared: Arc<Shared>,
    token: CancelToken,
    drill: DrillType,
    total_reps: u32,
}

impl Run {
    fn execute(self, entry: Entry) {
        if self.token.sleep(self.shared.timing.lead_in) == Wait::Cancelled {
            return;
        }
        match self.drive(entry) {
            Ok(Outcome::Completed) => {}
            Ok(Outcome::Cancelled) => debug!(drill = %self.drill, "run cancelled"),
            Err(err) => self.fail(err),
        }
    }

    fn drive(&self, entry: Entry) -> Result<Outcome, AudioError> {
        let protocol = self.drill.protocol();
        let mut rep = entry.rep;
        let mut phase = entry.phase;

        loop {
            let first_step = match phase {
                Phase::LeadIn => Some(0),
                Phase::Step(index) => Some(index),
                Phase::Rest => None,
            };

            if let Some(first) = first_step {
                for (index, step) in protocol.iter().enumerate().skip(first) {
                    if !self.run_step(rep, index, step)? {
                        return Ok(Outcome::Cancelled);
                    }
                }
                if self.token.is_cancelled() {
                    return Ok(Outcome::Cancelled);
                }
                if rep >= self.total_reps {
                    return Ok(self.complete());
                }
            }

            let resting = self.transition(|s| {
                s.status = Status::Rest;
                s.phase = Phase::Rest;
                s.phase_label = REST_LABEL.to_string();
            });
            if resting.is_none() || self.wait_range(RangeKey::RestBetween) == Wait::Cancelled {
                return Ok(Outcome::Cancelled);
            }

            rep += 1;
            phase = Phase::Step(0);
        }
    }

    /// Play one step's cue and wait out its delay. `Ok(false)` means the
    /// run was cancelled along the way.
    fn run_step(&self, rep: u32, index: usize, step: &Step) -> Result<bool, AudioError> {
        let status = Status::for_cue(step.cue);
        let started = self.transition(|s| {
            s.current_rep = rep;
            s.phase = Phase::Step(index);
            if let Some(status) = status {
                s.status = status;
                s.phase_label = step.label.to_string();
                // started under the lock so a pause cannot slip in between
                // the transition and the cue
                play_cue(self.shared.audio.as_ref(), step.cue)
            } else {
                Ok(Playback::finished())
            }
        });
        let playback = match started {
            Some(result) => result?,
            None => return Ok(false),
        };
        debug!(drill = %self.drill, rep, step = index, label = step.label, "cue");

        match playback.wait(&self.token, self.shared.timing.audio_timeout) {
            Wait::Cancelled => return Ok(false),
            Wait::TimedOut => warn!(label = step.label, "cue never signalled completion; continuing"),
            Wait::Completed | Wait::Elapsed => {}
        }
        if self.token.is_cancelled() {
            return Ok(false);
        }

        if let Some(key) = step.delay {
            if self.wait_range(key) == Wait::Cancelled {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Resolve `key` from the settings as they are right now and sleep
    fn wait_range(&self, key: RangeKey) -> Wait {
        let range = self
            .shared
            .settings
            .drill_settings(self.drill)
            .and_then(|s| s.range(key));
        let delay = match range {
            Some(range) => {
                if !range.is_valid() {
                    warn!(drill = %self.drill, %key, ?range, "invalid delay range; clamping");
                }
                resolve_delay(range, &mut rand::thread_rng())
            }
            None => {
                warn!(drill = %self.drill, %key, "missing delay range; using default");
                MISSING_RANGE_DELAY
            }
        };
        debug!(%key, delay_ms = delay.as_millis() as u64, "waiting");
        self.token.sleep(delay)
    }

    /// Mark the session complete, record it, then announce it. The store
    /// is called outside the state lock so a slow write cannot stall
    /// commands; observers still see `Complete` only once it has returned.
    fn complete(&self) -> Outcome {
        let drill = self.drill;
        let record = self.update(
            |s| {
                s.status = Status::Complete;
                s.phase_label = COMPLETE_LABEL.to_string();
                CompletedSessionRecord {
                    drill,
                    reps: s.total_reps,
                    duration_secs: s.started_at.elapsed().as_secs(),
                }
            },
            false,
        );
        let Some(record) = record else {
            return Outcome::Cancelled;
        };
        info!(%drill, reps = record.reps, duration_secs = record.duration_secs, "practice complete");
        self.shared.history.record_session(&record);

        match self.transition(|_| ()) {
            Some(()) => Outcome::Completed,
            None => Outcome::Cancelled,
        }
    }

    /// Fail closed: back to ready, nothing recorded, no retry
    fn fail(&self, err: AudioError) {
        let mut inner = self.shared.lock();
        if self.token.is_cancelled() {
            debug!(%err, drill = %self.drill, "cue failed after cancellation");
            return;
        }
        error!(%err, drill = %self.drill, "practice sequence failed; returning to ready");
        inner.run = None;
        inner.session = None;
        inner.paused = None;
        self.shared.publish(&inner);
    }

    /// Apply `f` to the live session and publish, unless this run has been
    /// cancelled.
    fn transition<T>(&self, f: impl FnOnce(&mut Session) -> T) -> Option<T> {
        self.update(f, true)
    }

    fn update<T>(&self, f: impl FnOnce(&mut Session) -> T, publish: bool) -> Option<T> {
        let mut inner = self.shared.lock();
        if self.token.is_cancelled() {
            return None;
        }
        let out = f(inner.session.as_mut()?);
        if publish {
            self.shared.publish(&inner);
        }
        Some(out)
    }
}
