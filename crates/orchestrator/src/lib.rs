//! Decomposition orchestration.
//!
//! This crate drives the full decomposition pipeline on top of the `grid`
//! crate: load and validate a configuration, build the (possibly
//! dual-resolution) top-level grid from the particle data, distribute cells
//! over ranks, and construct the interaction tasks and communication
//! proxies for the local rank.

#![warn(missing_docs)]

pub mod config;
pub mod proxy;
pub mod tasks;

pub use config::DecompositionConfig;
pub use proxy::{ExchangeKind, Proxy, ProxyRegistry};
pub use tasks::{Task, TaskBuilder, TaskKind, TaskSink, TaskStats, TaskSubtype, VecSink};

// The communication seam lives in the grid crate; re-exported so callers
// embedding this in an MPI harness only need one import path.
pub use grid::comm::{Collective, LocalCollective};

use grid::error::DecompositionError;
use grid::index::{Decomposition, UniformDecomposition, ZoomDecomposition};
use grid::particle::ParticleSet;
use grid::zoom::ZoomRegionBuilder;

/// Build the top-level decomposition for a run.
///
/// The pipeline:
/// 1. validate the configuration,
/// 2. with a zoom region: reduce the high-resolution particle bounds
///    across ranks and build the dual-resolution grid; otherwise build the
///    plain natural grid,
/// 3. bin the particles into cells,
/// 4. assign cells to ranks.
///
/// Every rank computes the same decomposition from the same (reduced)
/// inputs, so no rank ever has to exchange the grid itself.
pub fn build_decomposition<C: Collective>(
    config: &DecompositionConfig,
    particles: &ParticleSet,
    comm: &C,
) -> Result<Box<dyn Decomposition>, DecompositionError> {
    config.validate()?;
    tracing::info!(
        "building decomposition '{}' on rank {} of {}",
        config.name,
        comm.rank(),
        comm.size()
    );

    let mut decomp: Box<dyn Decomposition> = if config.with_zoom_region {
        let builder = ZoomRegionBuilder::new(config.zoom_boost_factor);
        let raw = builder.compute_bounds(particles, config.box_size, comm)?;
        Box::new(ZoomDecomposition::new(
            config.box_size,
            config.cdim,
            config.periodic,
            &raw,
            &builder,
            config.neighbour_delta,
        )?)
    } else {
        Box::new(UniformDecomposition::new(
            config.box_size,
            config.cdim,
            config.periodic,
        ))
    };

    decomp.bin_particles(particles);
    decomp.space_mut().assign_ranks_contiguous(comm.size());
    Ok(decomp)
}

/// Build the interaction tasks and proxies for the local rank.
///
/// Convenience wrapper gluing [`TaskBuilder`] to a fresh proxy registry.
pub fn build_interactions<C: Collective>(
    config: &DecompositionConfig,
    decomp: &mut dyn Decomposition,
    comm: &C,
) -> Result<(Vec<Task>, ProxyRegistry, TaskStats), DecompositionError> {
    let mut registry = ProxyRegistry::new(comm.size(), config.max_proxies);
    let mut sink = VecSink::new();
    let builder = TaskBuilder::from_config(config, comm.rank());
    let stats = builder.build(decomp, &mut registry, &mut sink)?;
    Ok((sink.into_tasks(), registry, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use grid::particle::Species;

    fn config() -> DecompositionConfig {
        DecompositionConfig {
            name: "pipeline".to_string(),
            box_size: [8.0; 3],
            periodic: true,
            cdim: [8, 8, 8],
            with_zoom_region: false,
            zoom_boost_factor: 1.1,
            neighbour_delta: 1,
            theta_crit: 0.5,
            mesh_r_cut_max: None,
            max_proxies: 64,
            with_hydro: false,
            with_gravity: true,
        }
    }

    #[test]
    fn uniform_pipeline_bins_and_assigns() {
        let mut ps = ParticleSet::new();
        ps.push(0.5, 0.5, 0.5, 1.0, Species::DarkMatter);
        ps.push(7.5, 7.5, 7.5, 1.0, Species::Gas);

        let decomp = build_decomposition(&config(), &ps, &LocalCollective).unwrap();
        assert!(decomp.zoom_props().is_none());
        let space = decomp.space();
        assert_eq!(space.cell(space.natural_id(0, 0, 0)).gpart_count, 1);
        let far = space.cell(space.natural_id(7, 7, 7));
        assert_eq!(far.gas_count, 1);
        assert_eq!(far.gpart_count, 1);
        // A single rank owns everything.
        assert!(space.iter().all(|(_, c)| c.owner == 0));
    }

    #[test]
    fn zoom_pipeline_requires_high_res_particles() {
        let mut cfg = config();
        cfg.with_zoom_region = true;
        let mut ps = ParticleSet::new();
        ps.push(0.5, 0.5, 0.5, 1.0, Species::DarkMatter);

        let err = match build_decomposition(&cfg, &ps, &LocalCollective) {
            Ok(_) => panic!("zoom build without high-resolution particles must fail"),
            Err(err) => err,
        };
        assert!(matches!(err, DecompositionError::Configuration(_)));
    }

    #[test]
    fn invalid_config_is_rejected_before_any_work() {
        let mut cfg = config();
        cfg.theta_crit = 2.0;
        let ps = ParticleSet::new();
        assert!(build_decomposition(&cfg, &ps, &LocalCollective).is_err());
    }
}
