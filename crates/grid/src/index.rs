//! Spatial indexing across both grid resolutions.
//!
//! [`Decomposition`] is the strategy seam between a plain single-grid run
//! and a zoom run: callers hold a `Box<dyn Decomposition>` picked at
//! configuration time and never branch on the zoom feature themselves.

use crate::cell::{CellId, CellSpace};
use crate::classify;
use crate::error::DecompositionError;
use crate::particle::{ParticleSet, Species};
use crate::zoom::{RawZoomBounds, ZoomRegionBuilder, ZoomRegionProperties};

/// A fully constructed top-level decomposition of the simulation volume.
pub trait Decomposition {
    /// Cell containing the given position.
    ///
    /// Total for any point inside the box: out-of-range coordinates are
    /// wrapped (periodic) or clamped (non-periodic) onto the natural grid,
    /// and boundary points resolve to exactly one cell.
    fn locate(&self, pos: [f64; 3]) -> CellId;

    /// Borrow the cell arena.
    fn space(&self) -> &CellSpace;

    /// Mutably borrow the cell arena.
    fn space_mut(&mut self) -> &mut CellSpace;

    /// Zoom-region geometry, if this decomposition carries one.
    fn zoom_props(&self) -> Option<&ZoomRegionProperties>;

    /// Bin particles into cells, incrementing the per-species counts.
    fn bin_particles(&mut self, particles: &ParticleSet) {
        for i in 0..particles.len() {
            let cid = self.locate(particles.position(i));
            let cell = self.space_mut().cell_mut(cid);
            if particles.species[i] == Species::Gas {
                cell.gas_count += 1;
            }
            // Everything gravitates.
            cell.gpart_count += 1;
        }
    }
}

/// Map a coordinate onto the natural grid along one axis.
#[inline]
fn natural_axis_index(x: f64, dim: f64, iwidth: f64, cdim: usize, periodic: bool) -> usize {
    let x = if periodic { x - dim * (x / dim).floor() } else { x.clamp(0.0, dim) };
    (((x * iwidth) as isize).max(0) as usize).min(cdim - 1)
}

fn locate_natural(space: &CellSpace, pos: [f64; 3]) -> CellId {
    let i = natural_axis_index(pos[0], space.dim[0], space.iwidth[0], space.cdim[0], space.periodic);
    let j = natural_axis_index(pos[1], space.dim[1], space.iwidth[1], space.cdim[1], space.periodic);
    let k = natural_axis_index(pos[2], space.dim[2], space.iwidth[2], space.cdim[2], space.periodic);
    space.natural_id(i, j, k)
}

/// Single-resolution decomposition: just the natural grid.
#[derive(Debug, Clone)]
pub struct UniformDecomposition {
    space: CellSpace,
}

impl UniformDecomposition {
    /// Build the natural top-level grid.
    pub fn new(dim: [f64; 3], cdim: [usize; 3], periodic: bool) -> Self {
        Self {
            space: CellSpace::new_natural(dim, cdim, periodic),
        }
    }
}

impl Decomposition for UniformDecomposition {
    fn locate(&self, pos: [f64; 3]) -> CellId {
        locate_natural(&self.space, pos)
    }

    fn space(&self) -> &CellSpace {
        &self.space
    }

    fn space_mut(&mut self) -> &mut CellSpace {
        &mut self.space
    }

    fn zoom_props(&self) -> Option<&ZoomRegionProperties> {
        None
    }
}

/// Dual-resolution decomposition: natural grid plus an embedded zoom grid.
#[derive(Debug, Clone)]
pub struct ZoomDecomposition {
    space: CellSpace,
    props: ZoomRegionProperties,
}

impl ZoomDecomposition {
    /// Build both grids from first-pass zoom bounds.
    ///
    /// The natural cells overlapping the first-pass cube become void hosts
    /// and their union defines the exact cube; hosts are then re-tagged
    /// against that final cube so the host set and the cube agree, the
    /// zoom cells are attached, and the neighbour shell is tagged.
    pub fn new(
        dim: [f64; 3],
        cdim: [usize; 3],
        periodic: bool,
        raw: &RawZoomBounds,
        builder: &ZoomRegionBuilder,
        neighbour_delta: usize,
    ) -> Result<Self, DecompositionError> {
        let mut space = CellSpace::new_natural(dim, cdim, periodic);

        let union = classify::tag_void_hosts(&mut space, raw.cube()).ok_or_else(|| {
            DecompositionError::geometry(
                "first-pass zoom cube overlaps no natural cell; the grid resolution \
                 is incompatible with the high-resolution subset",
            )
        })?;

        let props = builder.refine(union, cdim, space.width, space.natural_count(), raw.com);

        // The recentred cube can extend past the first-pass hosts on the
        // shorter axes; re-tag so VoidHost <=> overlaps the final cube.
        for a in 0..3 {
            if props.region_bounds[2 * a] < 0.0 || props.region_bounds[2 * a + 1] > dim[a] {
                return Err(DecompositionError::geometry(format!(
                    "refined zoom cube [{:.3}, {:.3}] leaves the box on axis {}",
                    props.region_bounds[2 * a],
                    props.region_bounds[2 * a + 1],
                    a
                )));
            }
        }
        // The refined cube is a superset of the first-pass union, so this
        // cannot come back empty.
        classify::tag_void_hosts(&mut space, props.region_bounds).ok_or_else(|| {
            DecompositionError::geometry("refined zoom cube overlaps no natural cell")
        })?;

        space.attach_zoom_grid(&props);
        classify::find_neighbours(&mut space, neighbour_delta);

        tracing::info!(
            "zoom decomposition: {} natural + {} zoom cells, cell widths {:.4} / {:.4}",
            space.natural_count(),
            space.len() - space.natural_count(),
            space.width[0],
            props.width[0]
        );

        Ok(Self { space, props })
    }

    /// Reassemble a decomposition from restored parts (see `snapshot`).
    pub fn from_parts(space: CellSpace, props: ZoomRegionProperties) -> Self {
        Self { space, props }
    }

    /// The zoom-region geometry.
    pub fn props(&self) -> &ZoomRegionProperties {
        &self.props
    }
}

impl Decomposition for ZoomDecomposition {
    fn locate(&self, pos: [f64; 3]) -> CellId {
        let b = &self.props.region_bounds;

        // Strictly inside the cube: the zoom regime. Points exactly on a
        // face fall through to the natural grid, so each boundary point
        // resolves to exactly one cell.
        if pos[0] > b[0]
            && pos[0] < b[1]
            && pos[1] > b[2]
            && pos[1] < b[3]
            && pos[2] > b[4]
            && pos[2] < b[5]
        {
            let cdim = [
                self.props.cdim[0] as usize,
                self.props.cdim[1] as usize,
                self.props.cdim[2] as usize,
            ];
            let mut idx = [0usize; 3];
            for a in 0..3 {
                let frac = (pos[a] - b[2 * a]) * self.props.iwidth[a];
                idx[a] = ((frac as isize).max(0) as usize).min(cdim[a] - 1);
            }
            return self.space.zoom_offset() + (idx[0] * cdim[1] + idx[1]) * cdim[2] + idx[2];
        }

        locate_natural(&self.space, pos)
    }

    fn space(&self) -> &CellSpace {
        &self.space
    }

    fn space_mut(&mut self) -> &mut CellSpace {
        &mut self.space
    }

    fn zoom_props(&self) -> Option<&ZoomRegionProperties> {
        Some(&self.props)
    }
}
