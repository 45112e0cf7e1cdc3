use rand::Rng;
use std::time::Duration;

use crate::settings::DelayRange;

/// Used when a drill's settings lack the range a step asks for
pub const MISSING_RANGE_DELAY: Duration = Duration::from_secs(1);

// upper cap for hand-edited files
const LONGEST_DELAY_SECS: f64 = 3600.0;

/// Uniform pick in `[min, max]` seconds; an inverted range resolves to `min`
pub fn resolve_delay<R: Rng + ?Sized>(range: DelayRange, rng: &mut R) -> Duration {
    let DelayRange { min, max } = range.sanitized();
    let secs = if max > min {
        min + rng.gen::<f64>() * (max - min)
    } else {
        min
    };
    Duration::from_secs_f64(secs.min(LONGEST_DELAY_SECS))
}
