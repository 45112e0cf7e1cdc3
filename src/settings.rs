use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};
use tracing::{debug, warn};

use crate::config::ConfigStore;
use crate::drill::{DrillType, RangeKey};
use crate::error::SettingsError;

/// Upper bound offered by the settings screens, in seconds
pub const MAX_DELAY_SECS: f64 = 30.0;
pub const MAX_REPS: u32 = 50;

/// Seconds bounds for one randomized wait
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min: f64,
    pub max: f64,
}

impl DelayRange {
    pub const fn fixed(secs: f64) -> Self {
        Self {
            min: secs,
            max: secs,
        }
    }

    /// Build a range, rejecting inverted or negative bounds
    pub fn checked(key: RangeKey, min: f64, max: f64) -> Result<Self, SettingsError> {
        for value in [min, max] {
            if !value.is_finite() || value < 0.0 {
                return Err(SettingsError::NegativeBound { key, value });
            }
        }
        if min > max {
            return Err(SettingsError::InvalidRange { key, min, max });
        }
        Ok(Self { min, max })
    }

    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min >= 0.0 && self.min <= self.max
    }

    /// Coerce a range read from an untrusted file into something usable:
    /// bad bounds become zero and an inverted range collapses onto `min`.
    pub fn sanitized(&self) -> Self {
        let fix = |v: f64| if v.is_finite() && v >= 0.0 { v } else { 0.0 };
        let min = fix(self.min);
        let max = fix(self.max).max(min);
        Self { min, max }
    }
}

/// Timing and rep count for a single drill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrillSettings {
    #[serde(default)]
    pub ranges: BTreeMap<RangeKey, DelayRange>,
    #[serde(default)]
    pub number_of_reps: u32,
}

impl DrillSettings {
    pub fn defaults_for(drill: DrillType) -> Self {
        let (ranges, number_of_reps) = match drill {
            DrillType::DownSetWhistle => (
                vec![
                    (RangeKey::Down, 0.5, 2.0),
                    (RangeKey::Set, 0.3, 1.5),
                    (RangeKey::RestBetween, 2.0, 4.0),
                ],
                5,
            ),
            DrillType::RapidClamp => (vec![(RangeKey::RestBetween, 1.0, 3.0)], 10),
            DrillType::ThreeWhistle => (
                vec![
                    (RangeKey::ClampToPull, 0.3, 1.0),
                    (RangeKey::PullToPop, 0.3, 1.0),
                    (RangeKey::ResetPause, 3.0, 5.0),
                    (RangeKey::RestBetween, 1.0, 1.0),
                ],
                5,
            ),
        };

        Self {
            ranges: ranges
                .into_iter()
                .map(|(key, min, max)| (key, DelayRange { min, max }))
                .collect(),
            number_of_reps,
        }
    }

    pub fn range(&self, key: RangeKey) -> Option<DelayRange> {
        self.ranges.get(&key).copied()
    }

    pub fn with_range(mut self, key: RangeKey, min: f64, max: f64) -> Self {
        self.ranges.insert(key, DelayRange { min, max });
        self
    }

    pub fn with_reps(mut self, reps: u32) -> Self {
        self.number_of_reps = reps;
        self
    }
}

/// Everything persisted between runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub selected_drill: DrillType,
    pub drills: BTreeMap<DrillType, DrillSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            selected_drill: DrillType::DownSetWhistle,
            drills: DrillType::ALL
                .into_iter()
                .map(|d| (d, DrillSettings::defaults_for(d)))
                .collect(),
        }
    }
}

impl Settings {
    /// Fill in any drill or range missing from a partially written file
    pub fn merged_with_defaults(mut self) -> Self {
        for drill in DrillType::ALL {
            let defaults = DrillSettings::defaults_for(drill);
            let entry = self.drills.entry(drill).or_insert_with(|| defaults.clone());
            for (key, range) in defaults.ranges {
                entry.ranges.entry(key).or_insert(range);
            }
            if entry.number_of_reps == 0 {
                entry.number_of_reps = defaults.number_of_reps;
            }
        }
        self
    }

    pub fn drill(&self, drill: DrillType) -> DrillSettings {
        self.drills
            .get(&drill)
            .cloned()
            .unwrap_or_else(|| DrillSettings::defaults_for(drill))
    }
}

/// Read side the sequencer depends on. Values are fetched on every delay so
/// that edits made mid-session take effect at the next wait.
pub trait SettingsStore: Send + Sync {
    fn is_loaded(&self) -> bool;
    fn drill_settings(&self, drill: DrillType) -> Option<DrillSettings>;
}

/// Shared, editable settings with optional write-through persistence
pub struct LiveSettings {
    current: RwLock<Option<Settings>>,
    store: Option<Box<dyn ConfigStore>>,
}

impl std::fmt::Debug for LiveSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSettings")
            .field("current", &self.current)
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveSettings {
    /// Not loaded yet; `start` is refused until `load` runs
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
            store: None,
        }
    }

    pub fn with_store<S: ConfigStore + 'static>(store: S) -> Self {
        Self {
            current: RwLock::new(None),
            store: Some(Box::new(store)),
        }
    }

    pub fn loaded(settings: Settings) -> Self {
        Self {
            current: RwLock::new(Some(settings.merged_with_defaults())),
            store: None,
        }
    }

    /// Read from the attached store, or fall back to defaults when detached
    pub fn load(&self) {
        let settings = match &self.store {
            Some(store) => store.load(),
            None => Settings::default(),
        };
        debug!(selected = %settings.selected_drill, "settings loaded");
        *self.current.write().unwrap_or_else(PoisonError::into_inner) =
            Some(settings.merged_with_defaults());
    }

    pub fn snapshot(&self) -> Option<Settings> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn update_range(
        &self,
        drill: DrillType,
        key: RangeKey,
        min: f64,
        max: f64,
    ) -> Result<(), SettingsError> {
        let range = DelayRange::checked(key, min, max)?;
        if range.max > MAX_DELAY_SECS {
            return Err(SettingsError::TooLong {
                key,
                max,
                limit: MAX_DELAY_SECS,
            });
        }
        self.mutate(|s| {
            s.drills
                .entry(drill)
                .or_insert_with(|| DrillSettings::defaults_for(drill))
                .ranges
                .insert(key, range);
        })
    }

    pub fn set_reps(&self, drill: DrillType, reps: u32) -> Result<(), SettingsError> {
        if reps == 0 {
            return Err(SettingsError::ZeroReps);
        }
        self.mutate(|s| {
            s.drills
                .entry(drill)
                .or_insert_with(|| DrillSettings::defaults_for(drill))
                .number_of_reps = reps.min(MAX_REPS);
        })
    }

    pub fn select_drill(&self, drill: DrillType) -> Result<(), SettingsError> {
        self.mutate(|s| s.selected_drill = drill)
    }

    pub fn reset_drill_to_defaults(&self, drill: DrillType) -> Result<(), SettingsError> {
        self.mutate(|s| {
            s.drills.insert(drill, DrillSettings::defaults_for(drill));
        })
    }

    pub fn reset_all(&self) -> Result<(), SettingsError> {
        self.mutate(|s| *s = Settings::default())
    }

    fn mutate(&self, f: impl FnOnce(&mut Settings)) -> Result<(), SettingsError> {
        let updated = {
            let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
            let settings = guard.as_mut().ok_or(SettingsError::NotLoaded)?;
            f(settings);
            settings.clone()
        };
        if let Some(store) = &self.store {
            // persistence is best effort; the in-memory value is already live
            if let Err(err) = store.save(&updated) {
                warn!(%err, "failed to persist settings");
            }
        }
        Ok(())
    }
}

impl SettingsStore for LiveSettings {
    fn is_loaded(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn drill_settings(&self, drill: DrillType) -> Option<DrillSettings> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.drill(drill))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FileConfigStore;
    use assert_matches::assert_matches;
    use tempfile::tempdir;

    #[test]
    fn defaults_cover_every_protocol_range() {
        for drill in DrillType::ALL {
            let settings = DrillSettings::defaults_for(drill);
            for key in drill.range_keys() {
                let range = settings.range(key).expect("default range present");
                assert!(range.is_valid(), "{drill} {key} default is invalid");
            }
            assert!(settings.number_of_reps >= 1);
        }
    }

    #[test]
    fn checked_rejects_inverted_and_negative() {
        assert_matches!(
            DelayRange::checked(RangeKey::Down, 2.0, 1.0),
            Err(SettingsError::InvalidRange { .. })
        );
        assert_matches!(
            DelayRange::checked(RangeKey::Set, -0.1, 1.0),
            Err(SettingsError::NegativeBound { .. })
        );
        assert_matches!(
            DelayRange::checked(RangeKey::Set, 0.0, f64::NAN),
            Err(SettingsError::NegativeBound { .. })
        );
        assert_eq!(
            DelayRange::checked(RangeKey::Set, 1.0, 1.0),
            Ok(DelayRange::fixed(1.0))
        );
    }

    #[test]
    fn sanitized_collapses_inverted_range_onto_min() {
        let range = DelayRange { min: 3.0, max: 1.0 }.sanitized();
        assert_eq!(range, DelayRange::fixed(3.0));
        let range = DelayRange {
            min: -1.0,
            max: f64::INFINITY,
        }
        .sanitized();
        assert_eq!(range, DelayRange::fixed(0.0));
    }

    #[test]
    fn merge_fills_missing_drills_and_ranges() {
        let mut partial = Settings::default();
        partial.drills.remove(&DrillType::RapidClamp);
        partial
            .drills
            .get_mut(&DrillType::DownSetWhistle)
            .unwrap()
            .ranges
            .remove(&RangeKey::Set);

        let merged = partial.merged_with_defaults();
        assert_eq!(merged, Settings::default());
    }

    #[test]
    fn unloaded_settings_refuse_edits() {
        let live = LiveSettings::new();
        assert!(!live.is_loaded());
        assert_eq!(live.drill_settings(DrillType::RapidClamp), None);
        assert_matches!(live.set_reps(DrillType::RapidClamp, 3), Err(SettingsError::NotLoaded));
    }

    #[test]
    fn edits_are_visible_immediately() {
        let live = LiveSettings::loaded(Settings::default());
        live.update_range(DrillType::DownSetWhistle, RangeKey::Down, 0.2, 0.4)
            .unwrap();
        live.set_reps(DrillType::DownSetWhistle, 2).unwrap();

        let current = live.drill_settings(DrillType::DownSetWhistle).unwrap();
        assert_eq!(current.range(RangeKey::Down), Some(DelayRange { min: 0.2, max: 0.4 }));
        assert_eq!(current.number_of_reps, 2);
    }

    #[test]
    fn invalid_edit_leaves_previous_value() {
        let live = LiveSettings::loaded(Settings::default());
        let before = live.drill_settings(DrillType::ThreeWhistle).unwrap();
        assert!(live
            .update_range(DrillType::ThreeWhistle, RangeKey::PullToPop, 1.0, 0.5)
            .is_err());
        assert_matches!(
            live.update_range(DrillType::ThreeWhistle, RangeKey::PullToPop, 1.0, 45.0),
            Err(SettingsError::TooLong { .. })
        );
        assert_matches!(live.set_reps(DrillType::ThreeWhistle, 0), Err(SettingsError::ZeroReps));
        assert_eq!(live.drill_settings(DrillType::ThreeWhistle).unwrap(), before);
    }

    #[test]
    fn reps_are_capped() {
        let live = LiveSettings::loaded(Settings::default());
        live.set_reps(DrillType::RapidClamp, 500).unwrap();
        assert_eq!(
            live.drill_settings(DrillType::RapidClamp).unwrap().number_of_reps,
            MAX_REPS
        );
    }

    #[test]
    fn mutations_write_through_to_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let live = LiveSettings::with_store(FileConfigStore::with_path(&path));
        live.load();
        live.select_drill(DrillType::ThreeWhistle).unwrap();
        live.set_reps(DrillType::ThreeWhistle, 8).unwrap();

        let reloaded = FileConfigStore::with_path(&path).load();
        assert_eq!(reloaded.selected_drill, DrillType::ThreeWhistle);
        assert_eq!(reloaded.drill(DrillType::ThreeWhistle).number_of_reps, 8);

        live.reset_drill_to_defaults(DrillType::ThreeWhistle).unwrap();
        let reloaded = FileConfigStore::with_path(&path).load();
        assert_eq!(
            reloaded.drill(DrillType::ThreeWhistle),
            DrillSettings::defaults_for(DrillType::ThreeWhistle)
        );
    }
}
