//! Interaction task construction.
//!
//! One pass over the top-level cells decides, for every cell pair within
//! interaction range, whether the pair is computed directly or left to the
//! long-range machinery, emits the direct tasks, and registers the
//! communication proxies for pairs that straddle a rank boundary.
//!
//! Pairs are walked per grid level. On the natural level a pair whose far
//! cell hosts the zoom region is expanded into pairs against the nested
//! zoom cells; the zoom level is walked separately and never wraps
//! periodically, since the zoom region may not touch a box boundary.

use grid::cell::{CellId, CellKind, CellSpace};
use grid::distance;
use grid::error::DecompositionError;
use grid::index::Decomposition;

use crate::config::DecompositionConfig;
use crate::proxy::{ExchangeKind, ProxyRegistry};

/// Shape of an interaction task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Interactions amongst the particles of one cell.
    SelfInteraction,
    /// Interactions between the particles of two cells.
    Pair,
}

/// Physics a task computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskSubtype {
    /// SPH neighbour loops.
    Hydro,
    /// Direct gravity between particle multipoles.
    Gravity,
}

/// A unit of interaction work over one or two top-level cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Task {
    /// Self or pair.
    pub kind: TaskKind,
    /// Physics computed.
    pub subtype: TaskSubtype,
    /// First cell.
    pub ci: CellId,
    /// Second cell for pair tasks.
    pub cj: Option<CellId>,
}

/// Receives tasks as the builder emits them.
pub trait TaskSink {
    /// Accept one task.
    fn push(&mut self, task: Task);
}

/// Sink collecting tasks into a vector.
#[derive(Debug, Default)]
pub struct VecSink {
    tasks: Vec<Task>,
}

impl VecSink {
    /// An empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// The collected tasks.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Consume the sink, returning the collected tasks.
    pub fn into_tasks(self) -> Vec<Task> {
        self.tasks
    }
}

impl TaskSink for VecSink {
    fn push(&mut self, task: Task) {
        self.tasks.push(task);
    }
}

/// Counts of what one build pass produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStats {
    /// Self tasks.
    pub n_self: usize,
    /// Natural-natural pair tasks.
    pub n_pair_natural: usize,
    /// Zoom-zoom pair tasks.
    pub n_pair_zoom: usize,
    /// Natural-zoom pair tasks from void-host expansion.
    pub n_pair_cross: usize,
}

/// Builds interaction tasks and communication proxies for one rank.
#[derive(Debug, Clone, Copy)]
pub struct TaskBuilder {
    theta_crit: f64,
    mesh_r_cut_max: Option<f64>,
    with_hydro: bool,
    with_gravity: bool,
    local_rank: usize,
}

impl TaskBuilder {
    /// A builder taking its physics switches from the run configuration.
    pub fn from_config(config: &DecompositionConfig, local_rank: usize) -> Self {
        Self {
            theta_crit: config.theta_crit,
            mesh_r_cut_max: config.mesh_r_cut_max,
            with_hydro: config.with_hydro,
            with_gravity: config.with_gravity,
            local_rank,
        }
    }

    /// Walk the decomposition, emitting tasks into `sink` and registering
    /// proxies for pairs that straddle a rank boundary.
    ///
    /// Clears and repopulates the cells' proxy send masks.
    pub fn build(
        &self,
        decomp: &mut dyn Decomposition,
        registry: &mut ProxyRegistry,
        sink: &mut dyn TaskSink,
    ) -> Result<TaskStats, DecompositionError> {
        let props = decomp.zoom_props().copied();
        let zcdim = props.map(|p| [p.cdim[0] as usize, p.cdim[1] as usize, p.cdim[2] as usize]);
        let space = decomp.space_mut();
        space.clear_send_masks();

        let mut stats = TaskStats::default();
        self.make_self_tasks(space, sink, &mut stats);
        self.walk_natural_level(space, zcdim, registry, sink, &mut stats)?;
        if let Some(zcdim) = zcdim {
            self.walk_zoom_level(space, zcdim, registry, sink, &mut stats)?;
        }

        tracing::info!(
            "built {} self, {} natural, {} zoom and {} cross-level pair tasks, {} proxies",
            stats.n_self,
            stats.n_pair_natural,
            stats.n_pair_zoom,
            stats.n_pair_cross,
            registry.len()
        );
        Ok(stats)
    }

    /// Self tasks for every populated local cell. Void hosts are usually
    /// empty, but when the refined cube covers only part of a host's box the
    /// uncovered sliver can bin particles, and those interact like any other
    /// cell's.
    fn make_self_tasks(&self, space: &CellSpace, sink: &mut dyn TaskSink, stats: &mut TaskStats) {
        for (id, cell) in space.iter() {
            if cell.owner != self.local_rank {
                continue;
            }
            if self.with_hydro && cell.gas_count > 0 {
                sink.push(Task {
                    kind: TaskKind::SelfInteraction,
                    subtype: TaskSubtype::Hydro,
                    ci: id,
                    cj: None,
                });
                stats.n_self += 1;
            }
            if self.with_gravity && cell.gpart_count > 0 {
                sink.push(Task {
                    kind: TaskKind::SelfInteraction,
                    subtype: TaskSubtype::Gravity,
                    ci: id,
                    cj: None,
                });
                stats.n_self += 1;
            }
        }
    }

    /// Does the opening-angle test force a direct interaction at squared
    /// distance `d2` for cells of extents `r_i`, `r_j`?
    #[inline]
    fn mac_is_direct(&self, r_i: f64, r_j: f64, d2: f64) -> bool {
        let r_sum = r_i + r_j;
        r_sum * r_sum > self.theta_crit * self.theta_crit * d2
    }

    fn walk_natural_level(
        &self,
        space: &mut CellSpace,
        zcdim: Option<[usize; 3]>,
        registry: &mut ProxyRegistry,
        sink: &mut dyn TaskSink,
        stats: &mut TaskStats,
    ) -> Result<(), DecompositionError> {
        let cdim = space.cdim;
        let periodic = space.periodic;
        let dmin = space.cell(0).dmin;
        let r_max = space.cell(0).diag2().sqrt();

        // Range within which a pair can still demand a direct task.
        let mut reach = 2.0 * r_max / self.theta_crit;
        if periodic {
            if let Some(r_cut) = self.mesh_r_cut_max {
                reach = reach.min(r_cut);
            }
        }
        let delta = interaction_delta(reach, dmin, cdim, periodic);

        for i in 0..cdim[0] {
            for j in 0..cdim[1] {
                for k in 0..cdim[2] {
                    let cid = space.natural_id(i, j, k);
                    {
                        // An empty void host has nothing of its own to pair;
                        // its children are reached from the other side.
                        let ci = space.cell(cid);
                        if ci.kind == CellKind::VoidHost
                            && ci.gas_count == 0
                            && ci.gpart_count == 0
                        {
                            continue;
                        }
                    }

                    for ii in -delta..=delta {
                        let Some(iii) = wrap_axis(i as isize + ii, cdim[0], periodic) else {
                            continue;
                        };
                        for jj in -delta..=delta {
                            let Some(jjj) = wrap_axis(j as isize + jj, cdim[1], periodic) else {
                                continue;
                            };
                            for kk in -delta..=delta {
                                let Some(kkk) = wrap_axis(k as isize + kk, cdim[2], periodic)
                                else {
                                    continue;
                                };

                                let cjd = space.natural_id(iii, jjj, kkk);
                                let direct_neighbour =
                                    ii.abs().max(jj.abs()).max(kk.abs()) <= 1;

                                if space.cell(cjd).kind == CellKind::VoidHost {
                                    // Cross-level expansion against the
                                    // host's children. Unordered: each
                                    // (cell, host) encounter is seen once
                                    // from the non-host side, and a
                                    // populated host meeting itself at
                                    // offset zero pairs its own sliver
                                    // content against its children.
                                    debug_assert!(
                                        zcdim.is_some(),
                                        "void host without a zoom grid"
                                    );
                                    if let Some(zcdim) = zcdim {
                                        self.expand_void_pair(
                                            space,
                                            cid,
                                            cjd,
                                            direct_neighbour,
                                            zcdim,
                                            registry,
                                            sink,
                                            stats,
                                        )?;
                                    }
                                }
                                if cjd <= cid {
                                    continue;
                                }

                                // Own-content pair, id-ordered. Count gating
                                // inside drops empty void hosts, so this
                                // fires for a void cj only when the sliver
                                // holds particles.
                                self.natural_pair(
                                    space,
                                    cid,
                                    cjd,
                                    direct_neighbour,
                                    registry,
                                    sink,
                                    stats,
                                )?;
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn natural_pair(
        &self,
        space: &mut CellSpace,
        cid: CellId,
        cjd: CellId,
        direct_neighbour: bool,
        registry: &mut ProxyRegistry,
        sink: &mut dyn TaskSink,
        stats: &mut TaskStats,
    ) -> Result<(), DecompositionError> {
        let periodic = space.periodic;
        let dim = space.dim;
        let (gas_pair, gpart_pair, gravity_direct) = {
            let (ci, cj) = (space.cell(cid), space.cell(cjd));
            if ci.owner != self.local_rank && cj.owner != self.local_rank {
                return Ok(());
            }
            let direct = if direct_neighbour {
                true
            } else {
                let d2 = distance::min_dist2_same_size(ci, cj, periodic, dim);
                let beyond_mesh = periodic
                    && self
                        .mesh_r_cut_max
                        .is_some_and(|r_cut| d2 > r_cut * r_cut);
                !beyond_mesh && self.mac_is_direct(ci.diag2().sqrt(), cj.diag2().sqrt(), d2)
            };
            (
                ci.gas_count > 0 && cj.gas_count > 0,
                ci.gpart_count > 0 && cj.gpart_count > 0,
                direct,
            )
        };

        if self.with_hydro && direct_neighbour && gas_pair {
            sink.push(Task {
                kind: TaskKind::Pair,
                subtype: TaskSubtype::Hydro,
                ci: cid,
                cj: Some(cjd),
            });
            stats.n_pair_natural += 1;
            self.register_exchange(space, registry, cid, cjd, ExchangeKind::HYDRO)?;
        }
        if self.with_gravity && gravity_direct && gpart_pair {
            sink.push(Task {
                kind: TaskKind::Pair,
                subtype: TaskSubtype::Gravity,
                ci: cid,
                cj: Some(cjd),
            });
            stats.n_pair_natural += 1;
            self.register_exchange(space, registry, cid, cjd, ExchangeKind::GRAVITY)?;
        }
        Ok(())
    }

    /// Pair a natural-level cell against the zoom cells nested in a void
    /// host. `cid` may itself be a populated void host, including `host`:
    /// sliver particles then pair against the nested children.
    ///
    /// Only gravity crosses grid levels; hydro neighbour loops stay within
    /// one resolution. When the host is a direct neighbour every child is
    /// direct; otherwise each child takes the opening-angle test at its own
    /// distance. The periodic mesh never truncates these pairs: the zoom
    /// region is compact and sits well inside the box.
    #[allow(clippy::too_many_arguments)]
    fn expand_void_pair(
        &self,
        space: &mut CellSpace,
        cid: CellId,
        host: CellId,
        direct_neighbour: bool,
        zcdim: [usize; 3],
        registry: &mut ProxyRegistry,
        sink: &mut dyn TaskSink,
        stats: &mut TaskStats,
    ) -> Result<(), DecompositionError> {
        if !self.with_gravity {
            return Ok(());
        }
        let Some(range) = space.children_of(host).copied() else {
            return Ok(());
        };
        let periodic = space.periodic;
        let dim = space.dim;
        let offset = space.zoom_offset();

        for zid in zoom_ids_in(offset, &range, zcdim) {
            let direct = {
                let (ci, cz) = (space.cell(cid), space.cell(zid));
                if ci.owner != self.local_rank && cz.owner != self.local_rank {
                    continue;
                }
                if ci.gpart_count == 0 || cz.gpart_count == 0 {
                    continue;
                }
                direct_neighbour || {
                    let d2 = distance::min_dist2_diff_size(ci, cz, periodic, dim);
                    self.mac_is_direct(ci.diag2().sqrt(), cz.diag2().sqrt(), d2)
                }
            };
            if !direct {
                continue;
            }
            sink.push(Task {
                kind: TaskKind::Pair,
                subtype: TaskSubtype::Gravity,
                ci: cid,
                cj: Some(zid),
            });
            stats.n_pair_cross += 1;
            self.register_exchange(space, registry, cid, zid, ExchangeKind::GRAVITY)?;
        }
        Ok(())
    }

    /// Zoom-zoom pairs. The zoom grid never wraps periodically.
    fn walk_zoom_level(
        &self,
        space: &mut CellSpace,
        zcdim: [usize; 3],
        registry: &mut ProxyRegistry,
        sink: &mut dyn TaskSink,
        stats: &mut TaskStats,
    ) -> Result<(), DecompositionError> {
        let offset = space.zoom_offset();
        let dim = space.dim;
        let first = space.cell(offset);
        let dmin = first.dmin;
        let r_max = first.diag2().sqrt();
        let reach = 2.0 * r_max / self.theta_crit;
        let delta = interaction_delta(reach, dmin, zcdim, false);

        for i in 0..zcdim[0] {
            for j in 0..zcdim[1] {
                for k in 0..zcdim[2] {
                    let cid = offset + (i * zcdim[1] + j) * zcdim[2] + k;

                    for ii in -delta..=delta {
                        let Some(iii) = wrap_axis(i as isize + ii, zcdim[0], false) else {
                            continue;
                        };
                        for jj in -delta..=delta {
                            let Some(jjj) = wrap_axis(j as isize + jj, zcdim[1], false) else {
                                continue;
                            };
                            for kk in -delta..=delta {
                                let Some(kkk) = wrap_axis(k as isize + kk, zcdim[2], false)
                                else {
                                    continue;
                                };

                                let cjd = offset + (iii * zcdim[1] + jjj) * zcdim[2] + kkk;
                                if cjd <= cid {
                                    continue;
                                }
                                let direct_neighbour =
                                    ii.abs().max(jj.abs()).max(kk.abs()) <= 1;

                                let (gas_pair, gpart_pair, gravity_direct) = {
                                    let (ci, cj) = (space.cell(cid), space.cell(cjd));
                                    if ci.owner != self.local_rank
                                        && cj.owner != self.local_rank
                                    {
                                        continue;
                                    }
                                    let direct = direct_neighbour || {
                                        let d2 = distance::min_dist2_same_size(
                                            ci, cj, false, dim,
                                        );
                                        self.mac_is_direct(
                                            ci.diag2().sqrt(),
                                            cj.diag2().sqrt(),
                                            d2,
                                        )
                                    };
                                    (
                                        ci.gas_count > 0 && cj.gas_count > 0,
                                        ci.gpart_count > 0 && cj.gpart_count > 0,
                                        direct,
                                    )
                                };

                                if self.with_hydro && direct_neighbour && gas_pair {
                                    sink.push(Task {
                                        kind: TaskKind::Pair,
                                        subtype: TaskSubtype::Hydro,
                                        ci: cid,
                                        cj: Some(cjd),
                                    });
                                    stats.n_pair_zoom += 1;
                                    self.register_exchange(
                                        space,
                                        registry,
                                        cid,
                                        cjd,
                                        ExchangeKind::HYDRO,
                                    )?;
                                }
                                if self.with_gravity && gravity_direct && gpart_pair {
                                    sink.push(Task {
                                        kind: TaskKind::Pair,
                                        subtype: TaskSubtype::Gravity,
                                        ci: cid,
                                        cj: Some(cjd),
                                    });
                                    stats.n_pair_zoom += 1;
                                    self.register_exchange(
                                        space,
                                        registry,
                                        cid,
                                        cjd,
                                        ExchangeKind::GRAVITY,
                                    )?;
                                }
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Register the exchange for a pair straddling a rank boundary: list
    /// the local cell on the outgoing side of the peer's proxy, the foreign
    /// cell on the incoming side, and stamp the local cell's send mask.
    fn register_exchange(
        &self,
        space: &mut CellSpace,
        registry: &mut ProxyRegistry,
        cid: CellId,
        cjd: CellId,
        kind: ExchangeKind,
    ) -> Result<(), DecompositionError> {
        let owner_i = space.cell(cid).owner;
        let owner_j = space.cell(cjd).owner;
        if owner_i == owner_j {
            return Ok(());
        }

        let (local, foreign, peer) = if owner_i == self.local_rank {
            (cid, cjd, owner_j)
        } else if owner_j == self.local_rank {
            (cjd, cid, owner_i)
        } else {
            return Ok(());
        };

        debug_assert!(
            !kind.contains(ExchangeKind::GRAVITY) || space.cell(foreign).has_multipole,
            "gravity pair against a foreign cell without multipole data"
        );

        let slot = registry.get_or_create(peer)?;
        registry.proxy_mut(slot).add_cell_out(local, kind);
        registry.proxy_mut(slot).add_cell_in(foreign, kind);
        space.cell_mut(local).send_mask.insert(slot);
        Ok(())
    }
}

/// Cell-count radius covering `reach` at cell scale `dmin`, clamped so the
/// periodic neighbourhood never aliases onto itself.
fn interaction_delta(reach: f64, dmin: f64, cdim: [usize; 3], periodic: bool) -> isize {
    let delta = (reach / dmin) as isize + 1;
    let min_cdim = cdim[0].min(cdim[1]).min(cdim[2]);
    let cap = if periodic {
        ((min_cdim - 1) / 2) as isize
    } else {
        (min_cdim - 1) as isize
    };
    delta.min(cap)
}

/// Wrap or reject an axis index, depending on periodicity.
#[inline]
fn wrap_axis(idx: isize, cdim: usize, periodic: bool) -> Option<usize> {
    let n = cdim as isize;
    if periodic {
        Some(idx.rem_euclid(n) as usize)
    } else if (0..n).contains(&idx) {
        Some(idx as usize)
    } else {
        None
    }
}

/// Flat ids of the zoom cells in a child range.
fn zoom_ids_in(
    offset: usize,
    range: &grid::cell::ChildRange,
    zcdim: [usize; 3],
) -> impl Iterator<Item = CellId> {
    let start = range.start;
    let end = range.end;
    (start[0]..end[0]).flat_map(move |i| {
        (start[1]..end[1]).flat_map(move |j| {
            (start[2]..end[2]).map(move |k| offset + (i * zcdim[1] + j) * zcdim[2] + k)
        })
    })
}
