use glam::Vec3;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};

/// The X and Z coordinate of one grid cell.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash, Debug)]
pub struct CellPos {
    pub x: i32,
    pub z: i32,
}

impl CellPos {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// The cell containing a world position: `(⌊x/cell_size⌋, ⌊z/cell_size⌋)`.
    pub fn from_pos(pos: Vec3, cell_size: f32) -> Self {
        Self {
            x: (pos.x / cell_size).floor() as i32,
            z: (pos.z / cell_size).floor() as i32,
        }
    }
}

impl From<(i32, i32)> for CellPos {
    fn from((x, z): (i32, i32)) -> Self {
        Self { x, z }
    }
}

#[derive(Default)]
struct GridInner {
    cells: FxHashMap<CellPos, FxHashSet<u32>>,
    /// Side index keeping each id's cell and exact position. Invariant: an id
    /// is in `index` iff it is in the cell set `index` points at.
    index: FxHashMap<u32, (CellPos, Vec3)>,
}

/// A uniform grid over the (x, z) plane.
///
/// The grid is the authoritative position store for broadcast purposes: the
/// map writes every entity movement here, and range queries (AI scans, view
/// diffs) read it without touching the entity table.
pub struct SpatialGrid {
    cell_size: f32,
    inner: RwLock<GridInner>,
}

impl SpatialGrid {
    pub fn new(cell_size: f32) -> Self {
        assert!(cell_size > 0.0, "cell size must be positive");

        Self {
            cell_size,
            inner: RwLock::new(GridInner::default()),
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn add(&self, id: u32, pos: Vec3) {
        let cell = CellPos::from_pos(pos, self.cell_size);
        let mut inner = self.inner.write();

        if let Some((old_cell, _)) = inner.index.insert(id, (cell, pos)) {
            if old_cell != cell {
                remove_from_cell(&mut inner.cells, old_cell, id);
            }
        }

        inner.cells.entry(cell).or_default().insert(id);
    }

    /// Rewrites an id's position, moving it between cell sets when the cell
    /// changed. Unknown ids are inserted.
    pub fn update(&self, id: u32, pos: Vec3) {
        self.add(id, pos);
    }

    pub fn remove(&self, id: u32) {
        let mut inner = self.inner.write();

        if let Some((cell, _)) = inner.index.remove(&id) {
            remove_from_cell(&mut inner.cells, cell, id);
        }
    }

    pub fn position_of(&self, id: u32) -> Option<Vec3> {
        self.inner.read().index.get(&id).map(|&(_, pos)| pos)
    }

    pub fn cell_of(&self, id: u32) -> Option<CellPos> {
        self.inner.read().index.get(&id).map(|&(cell, _)| cell)
    }

    /// Every id within Euclidean distance `radius` of `center` (3D distance;
    /// the cell scan only bounds x and z).
    pub fn range(&self, center: Vec3, radius: f32) -> Vec<u32> {
        let min = CellPos::from_pos(center - Vec3::splat(radius), self.cell_size);
        let max = CellPos::from_pos(center + Vec3::splat(radius), self.cell_size);

        let radius_sq = radius * radius;
        let inner = self.inner.read();
        let mut out = vec![];

        for cx in min.x..=max.x {
            for cz in min.z..=max.z {
                let Some(ids) = inner.cells.get(&CellPos::new(cx, cz)) else {
                    continue;
                };

                for &id in ids {
                    let (_, pos) = inner.index[&id];
                    if center.distance_squared(pos) <= radius_sq {
                        out.push(id);
                    }
                }
            }
        }

        out
    }

    pub fn len(&self) -> usize {
        self.inner.read().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().index.is_empty()
    }
}

fn remove_from_cell(cells: &mut FxHashMap<CellPos, FxHashSet<u32>>, cell: CellPos, id: u32) {
    if let Some(ids) = cells.get_mut(&cell) {
        ids.remove(&id);
        if ids.is_empty() {
            cells.remove(&cell);
        }
    }
}
