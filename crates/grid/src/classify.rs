//! Natural-cell classification against the zoom region.
//!
//! A natural cell becomes a [`CellKind::VoidHost`] iff its box overlaps the
//! zoom cube; the surrounding shell of still-plain cells within a Chebyshev
//! `delta` of any void host becomes [`CellKind::Neighbour`]. The two tags
//! are mutually exclusive by construction.

use crate::cell::{CellKind, CellSpace};

/// Tag every natural cell overlapping `cube` as a void host, resetting any
/// previous `VoidHost`/`Neighbour` tags first.
///
/// The overlap test is open-interval, so cells merely touching a cube face
/// are not hosts. Returns the union of the tagged cells' boxes as
/// `[x_min, x_max, y_min, y_max, z_min, z_max]`, or `None` if no cell
/// overlaps.
pub fn tag_void_hosts(space: &mut CellSpace, cube: [f64; 6]) -> Option<[f64; 6]> {
    let mut union: Option<[f64; 6]> = None;

    for cid in 0..space.natural_count() {
        let cell = space.cell_mut(cid);
        if matches!(cell.kind, CellKind::VoidHost | CellKind::Neighbour) {
            cell.kind = CellKind::Plain;
        }

        let lo = cell.loc;
        let hi = [
            cell.loc[0] + cell.width[0],
            cell.loc[1] + cell.width[1],
            cell.loc[2] + cell.width[2],
        ];
        let overlaps = hi[0] > cube[0]
            && lo[0] < cube[1]
            && hi[1] > cube[2]
            && lo[1] < cube[3]
            && hi[2] > cube[4]
            && lo[2] < cube[5];
        if !overlaps {
            continue;
        }

        cell.kind = CellKind::VoidHost;
        let u = union.get_or_insert([
            f64::MAX,
            f64::MIN,
            f64::MAX,
            f64::MIN,
            f64::MAX,
            f64::MIN,
        ]);
        for a in 0..3 {
            if lo[a] < u[2 * a] {
                u[2 * a] = lo[a];
            }
            if hi[a] > u[2 * a + 1] {
                u[2 * a + 1] = hi[a];
            }
        }
    }

    union
}

/// Tag the still-plain natural cells within `delta` Chebyshev steps of a
/// void host as neighbours, wrapping periodically when the space does.
///
/// Idempotent: re-running without intervening changes leaves the neighbour
/// set untouched. Returns the number of newly tagged cells.
pub fn find_neighbours(space: &mut CellSpace, delta: usize) -> usize {
    let cdim = space.cdim;
    let periodic = space.periodic;
    let delta = delta as isize;

    let mut neighbour_count = 0;

    for i in 0..cdim[0] {
        for j in 0..cdim[1] {
            for k in 0..cdim[2] {
                let cid = space.natural_id(i, j, k);
                if space.cell(cid).kind != CellKind::VoidHost {
                    continue;
                }

                for ii in -delta..=delta {
                    let mut iii = i as isize + ii;
                    if !periodic && (iii < 0 || iii >= cdim[0] as isize) {
                        continue;
                    }
                    iii = iii.rem_euclid(cdim[0] as isize);
                    for jj in -delta..=delta {
                        let mut jjj = j as isize + jj;
                        if !periodic && (jjj < 0 || jjj >= cdim[1] as isize) {
                            continue;
                        }
                        jjj = jjj.rem_euclid(cdim[1] as isize);
                        for kk in -delta..=delta {
                            let mut kkk = k as isize + kk;
                            if !periodic && (kkk < 0 || kkk >= cdim[2] as isize) {
                                continue;
                            }
                            kkk = kkk.rem_euclid(cdim[2] as isize);

                            let cjd =
                                space.natural_id(iii as usize, jjj as usize, kkk as usize);
                            let cell = space.cell_mut(cjd);
                            if cell.kind == CellKind::Plain {
                                cell.kind = CellKind::Neighbour;
                                neighbour_count += 1;
                            }
                        }
                    }
                }
            }
        }
    }

    tracing::info!("{} cells neighbouring the zoom region", neighbour_count);
    neighbour_count
}
