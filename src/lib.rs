// Library surface shared by the binary and the integration tests.
pub mod app_dirs;
pub mod audio;
pub mod cancel;
pub mod config;
pub mod delay;
pub mod drill;
pub mod error;
pub mod history;
pub mod logging;
pub mod runtime;
pub mod sequencer;
pub mod session;
pub mod settings;

pub use drill::{Cue, DrillType, RangeKey};
pub use error::{AudioError, SequencerError, SettingsError};
pub use sequencer::{Sequencer, Timing};
pub use session::{SessionView, Status};
