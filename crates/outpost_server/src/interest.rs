use glam::Vec3;
use outpost_network::SessionId;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};

/// The view sphere of one session.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct InterestArea {
    pub center: Vec3,
    pub radius: f32,
}

impl InterestArea {
    pub fn contains(&self, pos: Vec3) -> bool {
        self.center.distance_squared(pos) <= self.radius * self.radius
    }
}

/// The outcome of a move resolution: who should hear about the object now,
/// and how membership changed. Sessions in `exited` saw the object at its old
/// position and get a final frame; whether that final frame is followed by a
/// despawn is the caller's decision.
#[derive(Default, Debug)]
pub struct MoveResolution {
    /// Sessions interested in the old position or the new one.
    pub union: FxHashSet<SessionId>,
    /// Sessions that gained sight of the object with this move.
    pub entered: Vec<SessionId>,
    /// Sessions that lost sight of the object with this move.
    pub exited: Vec<SessionId>,
}

/// Per-session interest areas and the per-object reverse index.
///
/// Resolution never touches the spatial grid; it iterates the interest areas,
/// of which there is at most one per connected client.
#[derive(Default)]
pub struct InterestManager {
    areas: RwLock<FxHashMap<SessionId, InterestArea>>,
    watchers: RwLock<FxHashMap<u32, FxHashSet<SessionId>>>,
}

impl InterestManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs or replaces a session's interest area.
    pub fn set_area(&self, sid: SessionId, center: Vec3, radius: f32) {
        self.areas.write().insert(sid, InterestArea { center, radius });
    }

    pub fn area_of(&self, sid: SessionId) -> Option<InterestArea> {
        self.areas.read().get(&sid).copied()
    }

    /// Drops the session's area and erases it from every reverse-index set.
    pub fn remove_area(&self, sid: SessionId) {
        self.areas.write().remove(&sid);

        let mut watchers = self.watchers.write();
        watchers.retain(|_, sids| {
            sids.remove(&sid);
            !sids.is_empty()
        });
    }

    /// The sessions whose area currently contains `pos`.
    pub fn sessions_containing(&self, pos: Vec3) -> Vec<SessionId> {
        self.areas
            .read()
            .iter()
            .filter(|(_, area)| area.contains(pos))
            .map(|(&sid, _)| sid)
            .collect()
    }

    /// Computes and stores the initial watcher set of a newly spawned object.
    pub fn resolve_on_spawn(&self, id: u32, pos: Vec3) -> FxHashSet<SessionId> {
        let set: FxHashSet<SessionId> = self.sessions_containing(pos).into_iter().collect();

        self.watchers.write().insert(id, set.clone());

        set
    }

    /// Recomputes the watcher set of a moved object, replacing the reverse
    /// index entry.
    pub fn resolve_on_move(&self, id: u32, old_pos: Vec3, new_pos: Vec3) -> MoveResolution {
        let areas = self.areas.read();
        let mut watchers = self.watchers.write();

        let previous = watchers.remove(&id).unwrap_or_default();

        let mut resolution = MoveResolution::default();
        let mut current = FxHashSet::default();

        for (&sid, area) in areas.iter() {
            let sees_old = area.contains(old_pos);
            let sees_new = area.contains(new_pos);

            if sees_new {
                current.insert(sid);
                if !previous.contains(&sid) {
                    resolution.entered.push(sid);
                }
            } else if sees_old && previous.contains(&sid) {
                resolution.exited.push(sid);
            }

            if sees_old || sees_new {
                resolution.union.insert(sid);
            }
        }

        watchers.insert(id, current);

        resolution
    }

    /// Removes the object's reverse-index entry, returning its prior value.
    pub fn resolve_on_despawn(&self, id: u32) -> FxHashSet<SessionId> {
        self.watchers.write().remove(&id).unwrap_or_default()
    }

    /// Marks a session as watching an object, without any area recomputation.
    /// Returns `true` if the session was not watching it before. Used when a
    /// session's own view moves over a stationary object.
    pub fn watch(&self, sid: SessionId, id: u32) -> bool {
        self.watchers.write().entry(id).or_default().insert(sid)
    }

    /// Inverse of [`watch`](Self::watch). Returns `true` if the session was
    /// watching the object.
    pub fn unwatch(&self, sid: SessionId, id: u32) -> bool {
        let mut watchers = self.watchers.write();

        match watchers.get_mut(&id) {
            Some(sids) => {
                let removed = sids.remove(&sid);
                if sids.is_empty() {
                    watchers.remove(&id);
                }
                removed
            }
            None => false,
        }
    }

    /// The current watcher set of an object.
    pub fn watchers_of(&self, id: u32) -> FxHashSet<SessionId> {
        self.watchers.read().get(&id).cloned().unwrap_or_default()
    }
}
