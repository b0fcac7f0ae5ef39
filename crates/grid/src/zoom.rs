//! Zoom-region geometry.
//!
//! The zoom region is a cubical sub-volume, centred on the high-resolution
//! particle subset, that carries its own finer top-level grid. Its bounds
//! are computed in two passes: a first pass over the high-resolution
//! particles (globally reduced so every rank agrees), and an exact second
//! pass once the natural grid is known, snapping the cube to the union of
//! the natural cells it overlaps.

use bytemuck::{Pod, Zeroable};

use crate::comm::Collective;
use crate::error::DecompositionError;
use crate::particle::ParticleSet;

/// Geometry of the zoom region and its embedded grid.
///
/// Plain-old-data so the whole struct can be persisted as a raw byte image
/// by the restart machinery.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct ZoomRegionProperties {
    /// Cube bounds as `[x_min, x_max, y_min, y_max, z_min, z_max]`.
    pub region_bounds: [f64; 6],
    /// Cube edge lengths (all three equal).
    pub dim: [f64; 3],
    /// Zoom cell widths.
    pub width: [f64; 3],
    /// Inverse zoom cell widths.
    pub iwidth: [f64; 3],
    /// Centre of mass of the high-resolution subset.
    pub com: [f64; 3],
    /// Zoom grid resolution per axis.
    pub cdim: [i32; 3],
    /// Id of the first zoom cell (== natural cell count).
    pub tl_cell_offset: i32,
    /// Natural-to-zoom cell width ratio, rounded to the nearest integer.
    pub cell_ratio: i32,
    /// Non-zero when the zoom machinery is active.
    pub enabled: i32,
}

/// First-pass zoom bounds: extremal box, centre of mass and boosted cube
/// side, before snapping to the natural grid.
#[derive(Debug, Clone, Copy)]
pub struct RawZoomBounds {
    /// Centre of mass of the high-resolution subset.
    pub com: [f64; 3],
    /// Per-axis extremal bounds `[x_min, x_max, y_min, y_max, z_min, z_max]`.
    pub extremes: [f64; 6],
    /// Boosted cube side (max axis extent times the boost factor).
    pub side: f64,
}

impl RawZoomBounds {
    /// Cube bounds centred on the centre of mass.
    pub fn cube(&self) -> [f64; 6] {
        let h = 0.5 * self.side;
        [
            self.com[0] - h,
            self.com[0] + h,
            self.com[1] - h,
            self.com[1] + h,
            self.com[2] - h,
            self.com[2] + h,
        ]
    }
}

/// Computes the zoom-region bounding cube from the high-resolution subset.
#[derive(Debug, Clone, Copy)]
pub struct ZoomRegionBuilder {
    /// Multiplier (> 1) applied to the max axis extent to buffer the cube.
    pub boost_factor: f64,
}

impl ZoomRegionBuilder {
    /// Create a builder with the given boost factor.
    pub fn new(boost_factor: f64) -> Self {
        Self { boost_factor }
    }

    /// First pass: scan the high-resolution particles for their extremal
    /// box and centre of mass, combining partial answers across ranks.
    ///
    /// The cube must fit inside the global box; the zoom region is not
    /// allowed to span a periodic boundary.
    pub fn compute_bounds<C: Collective>(
        &self,
        particles: &ParticleSet,
        box_dim: [f64; 3],
        comm: &C,
    ) -> Result<RawZoomBounds, DecompositionError> {
        let mut lo = [f64::MAX; 3];
        let mut hi = [f64::MIN; 3];
        let mut com = [0.0; 3];
        let mut mtot = 0.0;
        let mut count = 0.0_f64;

        for (pos, mass) in particles.high_res() {
            for a in 0..3 {
                if pos[a] < lo[a] {
                    lo[a] = pos[a];
                }
                if pos[a] > hi[a] {
                    hi[a] = pos[a];
                }
            }
            mtot += mass;
            com[0] += pos[0] * mass;
            com[1] += pos[1] * mass;
            com[2] += pos[2] * mass;
            count += 1.0;
        }

        // Share answers amongst ranks.
        comm.allreduce_min(&mut lo);
        comm.allreduce_max(&mut hi);
        comm.allreduce_sum(&mut com);
        let mut sums = [mtot, count];
        comm.allreduce_sum(&mut sums);
        let (mtot, count) = (sums[0], sums[1]);

        if count == 0.0 {
            return Err(DecompositionError::config(
                "zoom region requested but no high-resolution particles exist",
            ));
        }
        if mtot <= 0.0 {
            return Err(DecompositionError::geometry(
                "total mass of the high-resolution subset is zero",
            ));
        }

        let imass = 1.0 / mtot;
        for c in com.iter_mut() {
            *c *= imass;
        }

        let widths = [hi[0] - lo[0], hi[1] - lo[1], hi[2] - lo[2]];
        let max_width = widths[0].max(widths[1]).max(widths[2]);
        let side = max_width * self.boost_factor;

        let raw = RawZoomBounds {
            com,
            extremes: [lo[0], hi[0], lo[1], hi[1], lo[2], hi[2]],
            side,
        };

        let cube = raw.cube();
        for a in 0..3 {
            if cube[2 * a] < 0.0 || cube[2 * a + 1] > box_dim[a] {
                return Err(DecompositionError::geometry(format!(
                    "zoom cube [{:.3}, {:.3}] on axis {} does not fit the box of size {:.3}; \
                     the zoom region may not span a periodic boundary",
                    cube[2 * a],
                    cube[2 * a + 1],
                    a,
                    box_dim[a],
                )));
            }
        }

        tracing::info!(
            "zoom region first pass: com [{:.3} {:.3} {:.3}], side {:.3}",
            com[0],
            com[1],
            com[2],
            side
        );

        Ok(raw)
    }

    /// Second pass: given the union of the natural cells overlapping the
    /// first-pass cube, recentre to a perfect cube of the union's max axis
    /// width and derive the embedded grid geometry.
    pub fn refine(
        &self,
        union_bounds: [f64; 6],
        zoom_cdim: [usize; 3],
        natural_width: [f64; 3],
        tl_cell_offset: usize,
        com: [f64; 3],
    ) -> ZoomRegionProperties {
        let widths = [
            union_bounds[1] - union_bounds[0],
            union_bounds[3] - union_bounds[2],
            union_bounds[5] - union_bounds[4],
        ];
        let max_width = widths[0].max(widths[1]).max(widths[2]);

        let mut bounds = [0.0; 6];
        for a in 0..3 {
            let mid = union_bounds[2 * a] + 0.5 * widths[a];
            bounds[2 * a] = mid - 0.5 * max_width;
            bounds[2 * a + 1] = mid + 0.5 * max_width;
        }

        let dim = [max_width; 3];
        let mut width = [0.0; 3];
        let mut iwidth = [0.0; 3];
        let mut cdim = [0i32; 3];
        for a in 0..3 {
            width[a] = dim[a] / zoom_cdim[a] as f64;
            iwidth[a] = 1.0 / width[a];
            cdim[a] = zoom_cdim[a] as i32;
        }

        let cell_ratio = (natural_width[0] / width[0]).round() as i32;

        tracing::info!(
            "zoom region refined: bounds x [{:.3}, {:.3}], cell width [{:.4} {:.4} {:.4}], \
             natural/zoom ratio {}",
            bounds[0],
            bounds[1],
            width[0],
            width[1],
            width[2],
            cell_ratio
        );

        ZoomRegionProperties {
            region_bounds: bounds,
            dim,
            width,
            iwidth,
            com,
            cdim,
            tl_cell_offset: tl_cell_offset as i32,
            cell_ratio,
            enabled: 1,
        }
    }
}
