use std::collections::hash_map::Entry;

use glam::Vec3;
use outpost_protocol::UpdateFlags;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// The last-broadcast values of one entity.
#[derive(Clone, Copy, Debug)]
struct Snapshot {
    position: Vec3,
    hp: i32,
    level: i32,
}

/// The field-level outcome of one delta pass over an entity.
#[derive(Clone, Copy, Debug)]
pub struct Delta {
    pub flags: UpdateFlags,
    /// The position held by the previous broadcast. Equal to the current
    /// position on the first delta for an id.
    pub prev_position: Vec3,
}

/// Tracks the last-broadcast snapshot of every entity and reports which
/// fields changed since. Deltas with no flags set are elided by the caller:
/// the client representation is stable for a tick when nothing changed.
#[derive(Default)]
pub struct StateTracker {
    snapshots: Mutex<FxHashMap<u32, Snapshot>>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compares the current values against the stored snapshot and rewrites
    /// the snapshot when anything changed. The first call for an id reports
    /// every field as changed.
    pub fn delta(&self, id: u32, position: Vec3, hp: i32, level: i32) -> Delta {
        let mut snapshots = self.snapshots.lock();

        let snapshot = match snapshots.entry(id) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                entry.insert(Snapshot { position, hp, level });

                return Delta {
                    flags: UpdateFlags::default()
                        .with_position()
                        .with_hp()
                        .with_level(),
                    prev_position: position,
                };
            }
        };

        let mut flags = UpdateFlags::default();

        if snapshot.position != position {
            flags = flags.with_position();
        }
        if snapshot.hp != hp {
            flags = flags.with_hp();
        }
        if snapshot.level != level {
            flags = flags.with_level();
        }

        let prev_position = snapshot.position;

        if !flags.is_empty() {
            *snapshot = Snapshot { position, hp, level };
        }

        Delta {
            flags,
            prev_position,
        }
    }

    pub fn remove(&self, id: u32) {
        self.snapshots.lock().remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_delta_reports_everything() {
        let tracker = StateTracker::new();

        let delta = tracker.delta(1, Vec3::new(1.0, 0.0, 2.0), 100, 3);
        assert!(delta.flags.position() && delta.flags.hp() && delta.flags.level());
        assert_eq!(delta.prev_position, Vec3::new(1.0, 0.0, 2.0));
    }

    #[test]
    fn identical_inputs_produce_no_flags() {
        let tracker = StateTracker::new();

        tracker.delta(1, Vec3::ONE, 100, 1);
        let delta = tracker.delta(1, Vec3::ONE, 100, 1);
        assert!(delta.flags.is_empty());
    }

    #[test]
    fn changed_fields_are_flagged_individually() {
        let tracker = StateTracker::new();

        tracker.delta(1, Vec3::ZERO, 100, 1);

        let delta = tracker.delta(1, Vec3::new(0.0, 0.0, 0.1), 100, 1);
        assert!(delta.flags.position());
        assert!(!delta.flags.hp());
        assert!(!delta.flags.level());
        assert_eq!(delta.prev_position, Vec3::ZERO);

        let delta = tracker.delta(1, Vec3::new(0.0, 0.0, 0.1), 90, 2);
        assert!(!delta.flags.position());
        assert!(delta.flags.hp());
        assert!(delta.flags.level());
    }

    #[test]
    fn removed_ids_start_over() {
        let tracker = StateTracker::new();

        tracker.delta(1, Vec3::ZERO, 100, 1);
        tracker.remove(1);

        let delta = tracker.delta(1, Vec3::ZERO, 100, 1);
        assert!(delta.flags.position() && delta.flags.hp() && delta.flags.level());
    }
}
