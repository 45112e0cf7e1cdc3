use std::time::Instant;

use crate::drill::{Cue, DrillType};

pub const GET_READY_LABEL: &str = "Get ready...";
pub const RESUMING_LABEL: &str = "Resuming...";
pub const REST_LABEL: &str = "Rest...";
pub const COMPLETE_LABEL: &str = "Practice Complete!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Status {
    Ready,
    /// Lead-in before the first cue of a start or resume
    Active,
    Down,
    Set,
    Whistle,
    Rest,
    Paused,
    Complete,
}

impl Status {
    /// True while a run is scheduled or in flight
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            Status::Active | Status::Down | Status::Set | Status::Whistle | Status::Rest
        )
    }

    pub fn for_cue(cue: Cue) -> Option<Status> {
        match cue {
            Cue::Down => Some(Status::Down),
            Cue::Set => Some(Status::Set),
            Cue::Whistle => Some(Status::Whistle),
            Cue::None => None,
        }
    }
}

/// Where inside a rep the session currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    LeadIn,
    /// Index into the drill's protocol
    Step(usize),
    Rest,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub drill: DrillType,
    pub total_reps: u32,
    pub current_rep: u32,
    pub started_at: Instant,
    pub status: Status,
    pub phase_label: String,
    pub phase: Phase,
}

impl Session {
    pub fn new(drill: DrillType, total_reps: u32) -> Self {
        Self {
            drill,
            total_reps,
            current_rep: 1,
            started_at: Instant::now(),
            status: Status::Active,
            phase_label: GET_READY_LABEL.to_string(),
            phase: Phase::LeadIn,
        }
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            drill: self.drill,
            status: self.status,
            current_rep: self.current_rep,
            total_reps: self.total_reps,
            phase_label: self.phase_label.clone(),
        }
    }
}

/// What a UI renders; published on every transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub drill: DrillType,
    pub status: Status,
    pub current_rep: u32,
    pub total_reps: u32,
    pub phase_label: String,
}

impl SessionView {
    pub fn ready(drill: DrillType, total_reps: u32) -> Self {
        Self {
            drill,
            status: Status::Ready,
            current_rep: 0,
            total_reps,
            phase_label: String::new(),
        }
    }

    /// One-line status text in the style of the practice screen
    pub fn headline(&self) -> String {
        match self.status {
            Status::Ready => format!("Ready for {} reps", self.total_reps),
            Status::Complete => COMPLETE_LABEL.to_string(),
            Status::Paused => format!(
                "Paused at rep {}/{} ({})",
                self.current_rep, self.total_reps, self.phase_label
            ),
            _ => format!(
                "[rep {}/{}] {}",
                self.current_rep, self.total_reps, self.phase_label
            ),
        }
    }
}

/// State captured by `pause`, consumed by `resume`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PausedSnapshot {
    pub drill: DrillType,
    pub current_rep: u32,
    pub status: Status,
    pub phase_label: String,
    pub phase: Phase,
}

impl PausedSnapshot {
    pub fn capture(session: &Session) -> Self {
        Self {
            drill: session.drill,
            current_rep: session.current_rep,
            status: session.status,
            phase_label: session.phase_label.clone(),
            phase: session.phase,
        }
    }
}

/// Handed to the history store once per finished session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedSessionRecord {
    pub drill: DrillType,
    pub reps: u32,
    pub duration_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_starts_at_rep_one_in_lead_in() {
        let session = Session::new(DrillType::RapidClamp, 3);
        assert_eq!(session.current_rep, 1);
        assert_eq!(session.status, Status::Active);
        assert_eq!(session.phase, Phase::LeadIn);
        assert_eq!(session.view().headline(), "[rep 1/3] Get ready...");
    }

    #[test]
    fn running_statuses() {
        assert!(Status::Active.is_running());
        assert!(Status::Rest.is_running());
        assert!(!Status::Paused.is_running());
        assert!(!Status::Ready.is_running());
        assert!(!Status::Complete.is_running());
    }

    #[test]
    fn snapshot_keeps_phase_position() {
        let mut session = Session::new(DrillType::ThreeWhistle, 2);
        session.status = Status::Whistle;
        session.phase = Phase::Step(1);
        session.phase_label = "PULL".into();
        session.current_rep = 2;

        let snapshot = PausedSnapshot::capture(&session);
        assert_eq!(snapshot.phase, Phase::Step(1));
        assert_eq!(snapshot.current_rep, 2);
        assert_eq!(snapshot.status, Status::Whistle);
    }

    #[test]
    fn ready_headline_mentions_reps() {
        assert_eq!(
            SessionView::ready(DrillType::DownSetWhistle, 5).headline(),
            "Ready for 5 reps"
        );
        assert_eq!(Status::Whistle.to_string(), "whistle");
    }
}
