//! Minimum cell-to-cell distances.
//!
//! All acceptance tests in the task builder compare against the minimum
//! possible squared separation between any two points of a cell pair, so
//! these bounds must never overestimate: underestimating only costs a
//! direct task, overestimating would silently drop an interaction.

use crate::cell::{Cell, CellKind};

/// Shift a separation to its nearest periodic image.
#[inline]
pub fn nearest(dx: f64, box_size: f64) -> f64 {
    if dx > 0.5 * box_size {
        dx - box_size
    } else if dx < -0.5 * box_size {
        dx + box_size
    } else {
        dx
    }
}

/// Minimum squared distance between two cells of the same size.
///
/// Exact for axis-aligned boxes: per axis, the centre separation (nearest
/// periodic image) minus the shared width, clamped at zero.
pub fn min_dist2_same_size(ci: &Cell, cj: &Cell, periodic: bool, dim: [f64; 3]) -> f64 {
    debug_assert!(
        ci.width[0] == cj.width[0] && ci.width[1] == cj.width[1] && ci.width[2] == cj.width[2],
        "same-size distance invoked on cells of different sizes"
    );

    let ci_c = ci.center();
    let cj_c = cj.center();

    let mut dist2 = 0.0;
    for a in 0..3 {
        let mut dx = ci_c[a] - cj_c[a];
        if periodic {
            dx = nearest(dx, dim[a]);
        }
        let gap = (dx.abs() - ci.width[a]).max(0.0);
        dist2 += gap * gap;
    }
    dist2
}

/// Minimum squared distance between two cells of different sizes (a
/// natural cell against a zoom cell).
///
/// Exact for axis-aligned boxes: per axis, the centre separation (nearest
/// periodic image) minus half the sum of the two widths, clamped at zero.
/// Zero for touching or overlapping cells.
pub fn min_dist2_diff_size(ci: &Cell, cj: &Cell, periodic: bool, dim: [f64; 3]) -> f64 {
    debug_assert!(
        ci.width[0] != cj.width[0] && ci.width[1] != cj.width[1] && ci.width[2] != cj.width[2],
        "different-size distance invoked on cells of the same size"
    );

    let ci_c = ci.center();
    let cj_c = cj.center();

    let mut dist2 = 0.0;
    for a in 0..3 {
        let mut dx = ci_c[a] - cj_c[a];
        if periodic {
            dx = nearest(dx, dim[a]);
        }
        let gap = (dx.abs() - 0.5 * (ci.width[a] + cj.width[a])).max(0.0);
        dist2 += gap * gap;
    }
    dist2
}

/// Minimum squared distance between two top-level cells, dispatching on
/// whether they live on the same grid level.
pub fn min_dist2(ci: &Cell, cj: &Cell, periodic: bool, dim: [f64; 3]) -> f64 {
    let same_level = matches!(
        (ci.kind, cj.kind),
        (CellKind::ZoomLeaf, CellKind::ZoomLeaf)
    ) || (ci.kind.is_natural() && cj.kind.is_natural());

    if same_level {
        min_dist2_same_size(ci, cj, periodic, dim)
    } else {
        min_dist2_diff_size(ci, cj, periodic, dim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::SendMask;
    use approx::assert_relative_eq;

    fn cell(loc: [f64; 3], width: [f64; 3], kind: CellKind) -> Cell {
        Cell {
            loc,
            width,
            kind,
            owner: 0,
            gas_count: 0,
            gpart_count: 0,
            dmin: width[0],
            host: None,
            has_multipole: true,
            send_mask: SendMask::default(),
        }
    }

    #[test]
    fn nearest_wraps_to_half_box() {
        assert_relative_eq!(nearest(7.0, 10.0), -3.0);
        assert_relative_eq!(nearest(-7.0, 10.0), 3.0);
        assert_relative_eq!(nearest(3.0, 10.0), 3.0);
    }

    #[test]
    fn adjacent_same_size_cells_touch() {
        let ci = cell([0.0, 0.0, 0.0], [1.0; 3], CellKind::Plain);
        let cj = cell([1.0, 0.0, 0.0], [1.0; 3], CellKind::Plain);
        assert_relative_eq!(min_dist2_same_size(&ci, &cj, false, [10.0; 3]), 0.0);
    }

    #[test]
    fn separated_same_size_cells() {
        let ci = cell([0.0, 0.0, 0.0], [1.0; 3], CellKind::Plain);
        let cj = cell([3.0, 0.0, 0.0], [1.0; 3], CellKind::Plain);
        // Gap of 2 along x.
        assert_relative_eq!(min_dist2_same_size(&ci, &cj, false, [10.0; 3]), 4.0);
    }

    #[test]
    fn periodic_wrap_shortens_same_size_distance() {
        let ci = cell([0.0, 0.0, 0.0], [1.0; 3], CellKind::Plain);
        let cj = cell([9.0, 0.0, 0.0], [1.0; 3], CellKind::Plain);
        // Across the wrap the cells are adjacent.
        assert_relative_eq!(min_dist2_same_size(&ci, &cj, true, [10.0; 3]), 0.0);
        // Without periodicity there is a gap of 8.
        assert_relative_eq!(min_dist2_same_size(&ci, &cj, false, [10.0; 3]), 64.0);
    }

    #[test]
    fn diff_size_distance_never_overestimates() {
        let big = cell([0.0, 0.0, 0.0], [2.0; 3], CellKind::Neighbour);
        let small = cell([6.0, 0.0, 0.0], [0.5; 3], CellKind::ZoomLeaf);
        let bound = min_dist2_diff_size(&big, &small, false, [20.0; 3]);
        // Nearest faces are 4 apart along x, aligned on y and z.
        assert!(bound <= 16.0);
        assert_relative_eq!(bound, 16.0);
    }

    #[test]
    fn diff_size_distance_is_zero_for_touching_cells() {
        let big = cell([0.0, 0.0, 0.0], [2.0; 3], CellKind::VoidHost);
        let small = cell([2.0, 0.0, 0.0], [0.5; 3], CellKind::ZoomLeaf);
        assert_relative_eq!(min_dist2_diff_size(&big, &small, false, [20.0; 3]), 0.0);
    }

    #[test]
    fn dispatch_picks_path_by_grid_level() {
        let natural = cell([0.0, 0.0, 0.0], [2.0; 3], CellKind::Neighbour);
        let natural2 = cell([6.0, 0.0, 0.0], [2.0; 3], CellKind::Plain);
        let zoom = cell([6.0, 0.0, 0.0], [0.5; 3], CellKind::ZoomLeaf);
        let zoom2 = cell([8.0, 0.0, 0.0], [0.5; 3], CellKind::ZoomLeaf);

        // Natural-natural and zoom-zoom use the exact same-size formula.
        assert_relative_eq!(
            min_dist2(&natural, &natural2, false, [20.0; 3]),
            min_dist2_same_size(&natural, &natural2, false, [20.0; 3])
        );
        assert_relative_eq!(
            min_dist2(&zoom, &zoom2, false, [20.0; 3]),
            min_dist2_same_size(&zoom, &zoom2, false, [20.0; 3])
        );
        // Mixed levels use the different-size formula.
        assert_relative_eq!(
            min_dist2(&natural, &zoom, false, [20.0; 3]),
            min_dist2_diff_size(&natural, &zoom, false, [20.0; 3])
        );
    }
}
