//! Top-level cell arena.
//!
//! Cells live in one flat array: the natural-grid cells first, then (when a
//! zoom region is active) the zoom-grid cells, starting at
//! [`CellSpace::zoom_offset`]. Cells are addressed by stable integer ids
//! rather than pointers; the host/child relation between a void natural cell
//! and its nested zoom cells is an explicit range table.

use crate::zoom::ZoomRegionProperties;

/// Stable index of a top-level cell in the flat arena.
pub type CellId = usize;

/// Classification of a top-level cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum CellKind {
    /// Ordinary natural-grid cell, away from the zoom region.
    Plain = 0,
    /// Natural cell within the neighbour shell of the zoom region.
    Neighbour = 1,
    /// Natural cell whose volume is covered by nested zoom cells.
    VoidHost = 2,
    /// Zoom-grid cell.
    ZoomLeaf = 3,
}

impl CellKind {
    /// `true` for cells that live on the natural (coarse) grid.
    #[inline]
    pub fn is_natural(self) -> bool {
        !matches!(self, CellKind::ZoomLeaf)
    }
}

/// Capacity-bounded bit-set recording which proxies a cell is sent through.
///
/// One bit per proxy slot; the 64-bit width is what bounds the maximum
/// proxy count. Setting a bit twice is a no-op, so duplicate registrations
/// from overlapping pair walks are harmless.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendMask(u64);

impl SendMask {
    /// Number of distinct proxy slots the mask can record.
    pub const CAPACITY: usize = 64;

    /// Set the bit for `proxy_id`. The proxy registry enforces the capacity
    /// limit before ids are handed out, so an out-of-range id here is a
    /// programming error.
    #[inline]
    pub fn insert(&mut self, proxy_id: usize) {
        debug_assert!(proxy_id < Self::CAPACITY, "proxy id {proxy_id} overflows send mask");
        self.0 |= 1u64 << proxy_id;
    }

    /// Is the bit for `proxy_id` set?
    #[inline]
    pub fn contains(&self, proxy_id: usize) -> bool {
        proxy_id < Self::CAPACITY && self.0 & (1u64 << proxy_id) != 0
    }

    /// Raw bit pattern.
    #[inline]
    pub fn bits(&self) -> u64 {
        self.0
    }

    /// Clear all bits (done when proxies are rebuilt).
    #[inline]
    pub fn clear(&mut self) {
        self.0 = 0;
    }
}

/// A single top-level cell.
#[derive(Debug, Clone)]
pub struct Cell {
    /// Low corner of the cell box.
    pub loc: [f64; 3],
    /// Edge lengths of the cell box.
    pub width: [f64; 3],
    /// Current classification.
    pub kind: CellKind,
    /// Rank that owns this cell.
    pub owner: usize,
    /// Number of gas particles binned into this cell.
    pub gas_count: usize,
    /// Number of gravitating particles binned into this cell (all species).
    pub gpart_count: usize,
    /// Minimum internal scale of this cell's grid level, used for
    /// interaction-range walks.
    pub dmin: f64,
    /// For zoom cells: the natural cell hosting this cell.
    pub host: Option<CellId>,
    /// Whether multipole data is available for this cell. Always true after
    /// construction; foreign cells would lose it if the proxy exchange were
    /// skipped, which the task builder asserts against in debug builds.
    pub has_multipole: bool,
    /// Which proxies this cell's data is sent through.
    pub send_mask: SendMask,
}

impl Cell {
    /// Geometric centre of the cell box.
    #[inline]
    pub fn center(&self) -> [f64; 3] {
        [
            self.loc[0] + 0.5 * self.width[0],
            self.loc[1] + 0.5 * self.width[1],
            self.loc[2] + 0.5 * self.width[2],
        ]
    }

    /// Squared length of the cell's space diagonal.
    #[inline]
    pub fn diag2(&self) -> f64 {
        self.width[0] * self.width[0]
            + self.width[1] * self.width[1]
            + self.width[2] * self.width[2]
    }
}

/// Per-axis index range of the zoom cells nested inside a void host cell.
///
/// The range is half-open (`start[a] <= i < end[a]`) in zoom-grid index
/// space, clipped to the zoom grid for hosts that only partially overlap the
/// zoom cube.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildRange {
    /// First zoom-grid index along each axis.
    pub start: [usize; 3],
    /// One-past-last zoom-grid index along each axis.
    pub end: [usize; 3],
}

/// Flat arena of top-level cells spanning both grid resolutions.
#[derive(Debug, Clone)]
pub struct CellSpace {
    /// Natural-grid resolution per axis.
    pub cdim: [usize; 3],
    /// Global box size.
    pub dim: [f64; 3],
    /// Natural cell widths.
    pub width: [f64; 3],
    /// Inverse natural cell widths.
    pub iwidth: [f64; 3],
    /// Periodic boundary conditions?
    pub periodic: bool,
    cells: Vec<Cell>,
    /// Host -> nested-child range, parallel to the natural cells.
    children: Vec<Option<ChildRange>>,
    /// Id of the first zoom cell; equals `len()` when no zoom grid exists.
    zoom_offset: usize,
}

impl CellSpace {
    /// Build the natural top-level grid: `cdim[0] * cdim[1] * cdim[2]`
    /// cells, all `Plain`, owned by rank 0.
    pub fn new_natural(dim: [f64; 3], cdim: [usize; 3], periodic: bool) -> Self {
        let width = [
            dim[0] / cdim[0] as f64,
            dim[1] / cdim[1] as f64,
            dim[2] / cdim[2] as f64,
        ];
        let iwidth = [1.0 / width[0], 1.0 / width[1], 1.0 / width[2]];
        let dmin = width[0].min(width[1]).min(width[2]);

        let count = cdim[0] * cdim[1] * cdim[2];
        let mut cells = Vec::with_capacity(count);
        for i in 0..cdim[0] {
            for j in 0..cdim[1] {
                for k in 0..cdim[2] {
                    cells.push(Cell {
                        loc: [i as f64 * width[0], j as f64 * width[1], k as f64 * width[2]],
                        width,
                        kind: CellKind::Plain,
                        owner: 0,
                        gas_count: 0,
                        gpart_count: 0,
                        dmin,
                        host: None,
                        has_multipole: true,
                        send_mask: SendMask::default(),
                    });
                }
            }
        }

        Self {
            cdim,
            dim,
            width,
            iwidth,
            periodic,
            children: vec![None; count],
            zoom_offset: count,
            cells,
        }
    }

    /// Append the zoom-grid cells described by `props` and fill the
    /// host/child mapping for every `VoidHost` cell.
    ///
    /// Must be called once, after void hosts have been tagged against the
    /// final zoom cube.
    pub fn attach_zoom_grid(&mut self, props: &ZoomRegionProperties) {
        debug_assert_eq!(self.zoom_offset, self.cells.len(), "zoom grid already attached");
        debug_assert_eq!(props.tl_cell_offset as usize, self.zoom_offset);

        let zcdim = [
            props.cdim[0] as usize,
            props.cdim[1] as usize,
            props.cdim[2] as usize,
        ];
        let zwidth = props.width;
        let dmin_zoom = zwidth[0].min(zwidth[1]).min(zwidth[2]);
        let origin = [
            props.region_bounds[0],
            props.region_bounds[2],
            props.region_bounds[4],
        ];

        self.cells.reserve(zcdim[0] * zcdim[1] * zcdim[2]);
        for i in 0..zcdim[0] {
            for j in 0..zcdim[1] {
                for k in 0..zcdim[2] {
                    let loc = [
                        origin[0] + i as f64 * zwidth[0],
                        origin[1] + j as f64 * zwidth[1],
                        origin[2] + k as f64 * zwidth[2],
                    ];
                    // Host lookup via the centre so boundary-aligned zoom
                    // cells resolve into the natural cell they sit in.
                    let cx = loc[0] + 0.5 * zwidth[0];
                    let cy = loc[1] + 0.5 * zwidth[1];
                    let cz = loc[2] + 0.5 * zwidth[2];
                    let host = self.natural_id_of_point(cx, cy, cz);
                    self.cells.push(Cell {
                        loc,
                        width: zwidth,
                        kind: CellKind::ZoomLeaf,
                        owner: 0,
                        gas_count: 0,
                        gpart_count: 0,
                        dmin: dmin_zoom,
                        host: Some(host),
                        has_multipole: true,
                        send_mask: SendMask::default(),
                    });
                }
            }
        }

        // Host -> nested-child ranges. A zoom cell belongs to the host
        // containing its centre, matching the `host` backref above, so the
        // ranges partition the zoom grid even when the cube is not aligned
        // to the natural grid and host boxes overlap it only partially.
        let iz = props.iwidth;
        for cid in 0..self.zoom_offset {
            if self.cells[cid].kind != CellKind::VoidHost {
                continue;
            }
            let lo = self.cells[cid].loc;
            let w = self.cells[cid].width;
            let mut start = [0usize; 3];
            let mut end = [0usize; 3];
            for a in 0..3 {
                // Cell i's centre sits at origin + (i + 0.5) * width, so the
                // centres inside [lo, lo + w) are exactly this index range.
                let s = ((lo[a] - origin[a]) * iz[a] - 0.5).ceil().max(0.0) as usize;
                let e = ((lo[a] + w[a] - origin[a]) * iz[a] - 0.5).ceil().max(0.0) as usize;
                start[a] = s.min(zcdim[a]);
                end[a] = e.min(zcdim[a]);
            }
            self.children[cid] = Some(ChildRange { start, end });
        }
    }

    /// Reassemble an arena from restored state (see `snapshot`).
    pub(crate) fn from_restored(
        dim: [f64; 3],
        cdim: [usize; 3],
        periodic: bool,
        cells: Vec<Cell>,
        children: Vec<Option<ChildRange>>,
        zoom_offset: usize,
    ) -> Self {
        let width = [
            dim[0] / cdim[0] as f64,
            dim[1] / cdim[1] as f64,
            dim[2] / cdim[2] as f64,
        ];
        let iwidth = [1.0 / width[0], 1.0 / width[1], 1.0 / width[2]];
        Self {
            cdim,
            dim,
            width,
            iwidth,
            periodic,
            cells,
            children,
            zoom_offset,
        }
    }

    /// Total number of cells across both grids.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// `true` if the arena holds no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Number of natural-grid cells.
    pub fn natural_count(&self) -> usize {
        self.zoom_offset
    }

    /// Id of the first zoom cell (== `len()` without a zoom grid).
    pub fn zoom_offset(&self) -> usize {
        self.zoom_offset
    }

    /// Does `id` address a zoom-grid cell?
    #[inline]
    pub fn is_zoom(&self, id: CellId) -> bool {
        id >= self.zoom_offset
    }

    /// Borrow a cell.
    #[inline]
    pub fn cell(&self, id: CellId) -> &Cell {
        &self.cells[id]
    }

    /// Mutably borrow a cell.
    #[inline]
    pub fn cell_mut(&mut self, id: CellId) -> &mut Cell {
        &mut self.cells[id]
    }

    /// Iterate over all cells with their ids.
    pub fn iter(&self) -> impl Iterator<Item = (CellId, &Cell)> {
        self.cells.iter().enumerate()
    }

    /// Row-major natural-grid id from integer coordinates.
    #[inline]
    pub fn natural_id(&self, i: usize, j: usize, k: usize) -> CellId {
        (i * self.cdim[1] + j) * self.cdim[2] + k
    }

    /// Integer coordinates of a natural cell id.
    #[inline]
    pub fn natural_coords(&self, id: CellId) -> [usize; 3] {
        debug_assert!(id < self.zoom_offset);
        let k = id % self.cdim[2];
        let j = (id / self.cdim[2]) % self.cdim[1];
        let i = id / (self.cdim[1] * self.cdim[2]);
        [i, j, k]
    }

    /// Natural cell containing a point (point assumed inside the box;
    /// indices are clamped so face points stay in range).
    #[inline]
    pub fn natural_id_of_point(&self, x: f64, y: f64, z: f64) -> CellId {
        let i = ((x * self.iwidth[0]) as usize).min(self.cdim[0] - 1);
        let j = ((y * self.iwidth[1]) as usize).min(self.cdim[1] - 1);
        let k = ((z * self.iwidth[2]) as usize).min(self.cdim[2] - 1);
        self.natural_id(i, j, k)
    }

    /// Nested-child range of a void host, if `id` is one.
    pub fn children_of(&self, id: CellId) -> Option<&ChildRange> {
        self.children.get(id).and_then(|c| c.as_ref())
    }

    /// Assign cell owners as contiguous blocks of the flat id space, one
    /// block per rank. Deterministic, so every rank computes the same map.
    pub fn assign_ranks_contiguous(&mut self, nr_ranks: usize) {
        debug_assert!(nr_ranks > 0);
        let n = self.cells.len();
        let per_rank = n.div_ceil(nr_ranks);
        for (id, cell) in self.cells.iter_mut().enumerate() {
            cell.owner = (id / per_rank).min(nr_ranks - 1);
        }
    }

    /// Clear all proxy send bits (done at the start of each proxy rebuild).
    pub fn clear_send_masks(&mut self) {
        for cell in &mut self.cells {
            cell.send_mask.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn natural_grid_layout() {
        let space = CellSpace::new_natural([8.0, 8.0, 8.0], [4, 4, 4], true);
        assert_eq!(space.len(), 64);
        assert_eq!(space.natural_count(), 64);
        assert_eq!(space.zoom_offset(), 64);
        assert_eq!(space.width, [2.0, 2.0, 2.0]);

        let id = space.natural_id(1, 2, 3);
        assert_eq!(id, (1 * 4 + 2) * 4 + 3);
        assert_eq!(space.natural_coords(id), [1, 2, 3]);
        assert_eq!(space.cell(id).loc, [2.0, 4.0, 6.0]);
        assert_eq!(space.cell(id).kind, CellKind::Plain);
    }

    #[test]
    fn natural_id_of_point_clamps_faces() {
        let space = CellSpace::new_natural([8.0, 8.0, 8.0], [4, 4, 4], false);
        // Point exactly on the far face resolves to the last cell.
        assert_eq!(space.natural_id_of_point(8.0, 8.0, 8.0), space.natural_id(3, 3, 3));
        assert_eq!(space.natural_id_of_point(0.0, 0.0, 0.0), space.natural_id(0, 0, 0));
    }

    #[test]
    fn send_mask_bits() {
        let mut mask = SendMask::default();
        assert_eq!(mask.bits(), 0);
        mask.insert(0);
        mask.insert(5);
        mask.insert(5); // idempotent
        assert!(mask.contains(0));
        assert!(mask.contains(5));
        assert!(!mask.contains(1));
        assert_eq!(mask.bits(), 0b100001);
        mask.clear();
        assert_eq!(mask.bits(), 0);
    }

    #[test]
    fn contiguous_rank_assignment_covers_all_ranks() {
        let mut space = CellSpace::new_natural([4.0, 4.0, 4.0], [4, 4, 4], false);
        space.assign_ranks_contiguous(4);
        assert_eq!(space.cell(0).owner, 0);
        assert_eq!(space.cell(63).owner, 3);
        let owners: std::collections::HashSet<_> =
            space.iter().map(|(_, c)| c.owner).collect();
        assert_eq!(owners.len(), 4);
    }
}
