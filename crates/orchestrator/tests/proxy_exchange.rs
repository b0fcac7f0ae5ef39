//! Proxy construction across a rank boundary.
//!
//! Every rank computes the same decomposition, so the proxy ledgers built
//! on two neighbouring ranks must mirror each other: what one rank sends,
//! the other expects to receive.

use grid::comm::Collective;
use grid::particle::{ParticleSet, Species};
use orchestrator::{build_decomposition, build_interactions, DecompositionConfig, ExchangeKind};

/// One rank's view of a fixed-size communicator; reductions are identities
/// since each test rank already sees the full particle set.
struct RankView {
    rank: usize,
    size: usize,
}

impl Collective for RankView {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn allreduce_min(&self, _values: &mut [f64]) {}

    fn allreduce_max(&self, _values: &mut [f64]) {}

    fn allreduce_sum(&self, _values: &mut [f64]) {}
}

fn config() -> DecompositionConfig {
    DecompositionConfig {
        name: "proxy test".to_string(),
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

/// Two particles in adjacent cells on either side of the contiguous
/// ownership split: cell (3,0,0) is the last block of rank 0's half, cell
/// (4,0,0) the first of rank 1's.
fn particles() -> ParticleSet {
    let mut ps = ParticleSet::new();
    ps.push(3.5, 0.5, 0.5, 1.0, Species::DarkMatter);
    ps.push(4.5, 0.5, 0.5, 1.0, Species::DarkMatter);
    ps
}

#[test]
fn boundary_pair_creates_one_proxy() {
    let config = config();
    let comm = RankView { rank: 0, size: 2 };
    let mut decomp = build_decomposition(&config, &particles(), &comm).unwrap();

    let space = decomp.space();
    let local_cell = space.natural_id(3, 0, 0);
    let foreign_cell = space.natural_id(4, 0, 0);
    assert_eq!(space.cell(local_cell).owner, 0);
    assert_eq!(space.cell(foreign_cell).owner, 1);

    let (tasks, registry, stats) =
        build_interactions(&config, decomp.as_mut(), &comm).unwrap();

    // One local self, one boundary pair, one proxy to rank 1.
    assert_eq!(stats.n_self, 1);
    assert_eq!(stats.n_pair_natural, 1);
    assert_eq!(tasks.len(), 2);
    assert_eq!(registry.len(), 1);

    let proxy = registry.for_rank(1).expect("proxy against rank 1");
    assert_eq!(proxy.cells_out(), &[(local_cell, ExchangeKind::GRAVITY)]);
    assert_eq!(proxy.cells_in(), &[(foreign_cell, ExchangeKind::GRAVITY)]);

    // The local cell is stamped with the proxy slot it is sent through.
    assert!(decomp.space().cell(local_cell).send_mask.contains(0));
    assert_eq!(decomp.space().cell(foreign_cell).send_mask.bits(), 0);
}

#[test]
fn proxy_ledgers_mirror_across_ranks() {
    let config = config();
    let mut ledgers = Vec::new();
    for rank in 0..2 {
        let comm = RankView { rank, size: 2 };
        let mut decomp = build_decomposition(&config, &particles(), &comm).unwrap();
        let (_, registry, _) = build_interactions(&config, decomp.as_mut(), &comm).unwrap();
        assert_eq!(registry.len(), 1);
        let peer = registry.for_rank(1 - rank).expect("one peer each");
        ledgers.push((peer.cells_out().to_vec(), peer.cells_in().to_vec()));
    }

    // Rank 0's outgoing cells are rank 1's incoming cells and vice versa.
    assert_eq!(ledgers[0].0, ledgers[1].1);
    assert_eq!(ledgers[0].1, ledgers[1].0);
}

#[test]
fn no_proxy_without_a_boundary_pair() {
    let config = config();
    let comm = RankView { rank: 0, size: 2 };

    // Both particles deep inside rank 0's half.
    let mut ps = ParticleSet::new();
    ps.push(0.5, 0.5, 0.5, 1.0, Species::DarkMatter);
    ps.push(1.5, 0.5, 0.5, 1.0, Species::DarkMatter);

    let mut decomp = build_decomposition(&config, &ps, &comm).unwrap();
    let (_, registry, stats) = build_interactions(&config, decomp.as_mut(), &comm).unwrap();
    assert!(registry.is_empty());
    assert_eq!(stats.n_pair_natural, 1);
}
