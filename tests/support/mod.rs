// Shared fixtures for the sequencer integration tests.
#![allow(dead_code)]

use crossbeam_channel::Receiver;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use faceoff::audio::{AudioBackend, Playback, PlaybackDone};
use faceoff::drill::{Cue, DrillType};
use faceoff::error::AudioError;
use faceoff::history::MemoryHistory;
use faceoff::sequencer::{Sequencer, Timing};
use faceoff::session::{SessionView, Status};
use faceoff::settings::{LiveSettings, Settings};

/// Records every cue and can be told to hang or fail on demand
#[derive(Default)]
pub struct ScriptedAudio {
    cues: Mutex<Vec<Cue>>,
    stops: AtomicU32,
    /// 1-based whistle that never signals completion
    hold_whistle: Option<usize>,
    fail_on: Option<Cue>,
    held: Mutex<Vec<PlaybackDone>>,
}

impl ScriptedAudio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn holding_whistle(n: usize) -> Self {
        Self {
            hold_whistle: Some(n),
            ..Self::default()
        }
    }

    pub fn failing_on(cue: Cue) -> Self {
        Self {
            fail_on: Some(cue),
            ..Self::default()
        }
    }

    pub fn cues(&self) -> Vec<Cue> {
        self.cues.lock().unwrap().clone()
    }

    pub fn count(&self, cue: Cue) -> usize {
        self.cues().into_iter().filter(|c| *c == cue).count()
    }

    pub fn stops(&self) -> u32 {
        self.stops.load(Ordering::SeqCst)
    }

    fn play(&self, cue: Cue) -> Result<Playback, AudioError> {
        let mut cues = self.cues.lock().unwrap();
        cues.push(cue);
        if self.fail_on == Some(cue) {
            return Err(AudioError::Playback("speaker unplugged".into()));
        }
        let whistles = cues.iter().filter(|c| **c == Cue::Whistle).count();
        if cue == Cue::Whistle && self.hold_whistle == Some(whistles) {
            let (playback, done) = Playback::pending();
            self.held.lock().unwrap().push(done);
            return Ok(playback);
        }
        Ok(Playback::finished())
    }
}

impl AudioBackend for ScriptedAudio {
    fn play_down(&self) -> Result<Playback, AudioError> {
        self.play(Cue::Down)
    }

    fn play_set(&self) -> Result<Playback, AudioError> {
        self.play(Cue::Set)
    }

    fn play_whistle(&self) -> Result<Playback, AudioError> {
        self.play(Cue::Whistle)
    }

    fn stop_all(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn quick_timing() -> Timing {
    Timing {
        lead_in: Duration::from_millis(10),
        restart_settle: Duration::from_millis(20),
        audio_timeout: Duration::from_secs(2),
    }
}

/// Loaded settings with near-zero waits everywhere
pub fn fast_settings(drill: DrillType, reps: u32) -> Arc<LiveSettings> {
    let settings = LiveSettings::loaded(Settings::default());
    for key in drill.range_keys() {
        settings.update_range(drill, key, 0.0, 0.01).unwrap();
    }
    settings.set_reps(drill, reps).unwrap();
    Arc::new(settings)
}

pub struct Harness {
    pub sequencer: Sequencer,
    pub audio: Arc<ScriptedAudio>,
    pub settings: Arc<LiveSettings>,
    pub history: Arc<MemoryHistory>,
    pub views: Receiver<SessionView>,
}

impl Harness {
    pub fn new(drill: DrillType, reps: u32, audio: ScriptedAudio, timing: Timing) -> Self {
        Self::with_settings(drill, fast_settings(drill, reps), audio, timing)
    }

    pub fn with_settings(
        drill: DrillType,
        settings: Arc<LiveSettings>,
        audio: ScriptedAudio,
        timing: Timing,
    ) -> Self {
        let audio = Arc::new(audio);
        let history = Arc::new(MemoryHistory::new());
        let sequencer = Sequencer::new(
            drill,
            audio.clone(),
            settings.clone(),
            history.clone(),
            timing,
        );
        let views = sequencer.subscribe();
        // drop the initial ready view
        let initial = views.recv().unwrap();
        assert_eq!(initial.status, Status::Ready);
        Self {
            sequencer,
            audio,
            settings,
            history,
            views,
        }
    }

    /// Collect views until one matches `done`, inclusive
    pub fn until(&self, done: impl Fn(&SessionView) -> bool) -> Vec<SessionView> {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut seen = Vec::new();
        while let Some(left) = deadline.checked_duration_since(Instant::now()) {
            match self.views.recv_timeout(left) {
                Ok(view) => {
                    let finished = done(&view);
                    seen.push(view);
                    if finished {
                        return seen;
                    }
                }
                Err(_) => break,
            }
        }
        panic!("condition never met; saw {seen:?}");
    }

    pub fn until_status(&self, status: Status) -> Vec<SessionView> {
        self.until(|v| v.status == status)
    }

    /// Assert nothing else is published for `quiet`
    pub fn assert_quiet(&self, quiet: Duration) {
        if let Ok(view) = self.views.recv_timeout(quiet) {
            panic!("unexpected transition {view:?}");
        }
    }
}

pub fn statuses(views: &[SessionView]) -> Vec<Status> {
    views.iter().map(|v| v.status).collect()
}
