//! Communication proxies between ranks.
//!
//! A proxy is the per-peer ledger of which cells this rank must send to
//! (`cells_out`) and receive from (`cells_in`) a foreign rank, and for
//! which physics. Proxies are created lazily during the pair walk; the
//! registry caps their number so each cell's membership fits the 64-bit
//! send mask.

use bitflags::bitflags;
use grid::cell::CellId;
use grid::error::DecompositionError;

bitflags! {
    /// Which physics an exchanged cell is needed for.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExchangeKind: u32 {
        /// Particle data for hydrodynamics.
        const HYDRO = 1 << 0;
        /// Particle and multipole data for gravity.
        const GRAVITY = 1 << 1;
    }
}

/// The exchange ledger against one foreign rank.
#[derive(Debug, Clone)]
pub struct Proxy {
    /// The foreign rank this proxy talks to.
    pub rank: usize,
    /// Cells received from the foreign rank, with the physics needing them.
    cells_in: Vec<(CellId, ExchangeKind)>,
    /// Cells sent to the foreign rank, with the physics needing them.
    cells_out: Vec<(CellId, ExchangeKind)>,
}

impl Proxy {
    fn new(rank: usize) -> Self {
        Self {
            rank,
            cells_in: Vec::new(),
            cells_out: Vec::new(),
        }
    }

    /// Record a cell to receive, merging the physics flags if the cell is
    /// already listed.
    pub fn add_cell_in(&mut self, cell: CellId, kind: ExchangeKind) {
        add_cell(&mut self.cells_in, cell, kind);
    }

    /// Record a cell to send, merging the physics flags if the cell is
    /// already listed.
    pub fn add_cell_out(&mut self, cell: CellId, kind: ExchangeKind) {
        add_cell(&mut self.cells_out, cell, kind);
    }

    /// Cells received from the foreign rank.
    pub fn cells_in(&self) -> &[(CellId, ExchangeKind)] {
        &self.cells_in
    }

    /// Cells sent to the foreign rank.
    pub fn cells_out(&self) -> &[(CellId, ExchangeKind)] {
        &self.cells_out
    }
}

fn add_cell(list: &mut Vec<(CellId, ExchangeKind)>, cell: CellId, kind: ExchangeKind) {
    for entry in list.iter_mut() {
        if entry.0 == cell {
            entry.1 |= kind;
            return;
        }
    }
    list.push((cell, kind));
}

/// All proxies of the local rank, indexed by foreign rank.
#[derive(Debug)]
pub struct ProxyRegistry {
    proxies: Vec<Proxy>,
    /// Foreign rank -> proxy slot.
    index: Vec<Option<usize>>,
    max_proxies: usize,
}

impl ProxyRegistry {
    /// An empty registry for a communicator of `nr_ranks` ranks.
    pub fn new(nr_ranks: usize, max_proxies: usize) -> Self {
        Self {
            proxies: Vec::new(),
            index: vec![None; nr_ranks],
            max_proxies,
        }
    }

    /// Slot of the proxy against `rank`, creating it on first use.
    pub fn get_or_create(&mut self, rank: usize) -> Result<usize, DecompositionError> {
        if let Some(slot) = self.index[rank] {
            return Ok(slot);
        }
        if self.proxies.len() >= self.max_proxies {
            return Err(DecompositionError::config(format!(
                "rank talks to more than {} peers; increase max_proxies or \
                 repartition the domain",
                self.max_proxies
            )));
        }
        let slot = self.proxies.len();
        self.proxies.push(Proxy::new(rank));
        self.index[rank] = Some(slot);
        Ok(slot)
    }

    /// The proxy in `slot`.
    pub fn proxy(&self, slot: usize) -> &Proxy {
        &self.proxies[slot]
    }

    /// Mutable proxy in `slot`.
    pub fn proxy_mut(&mut self, slot: usize) -> &mut Proxy {
        &mut self.proxies[slot]
    }

    /// The proxy against `rank`, if one exists.
    pub fn for_rank(&self, rank: usize) -> Option<&Proxy> {
        self.index[rank].map(|slot| &self.proxies[slot])
    }

    /// Number of proxies created so far.
    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    /// `true` when no proxies exist.
    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    /// Iterate over all proxies.
    pub fn iter(&self) -> impl Iterator<Item = &Proxy> {
        self.proxies.iter()
    }

    /// Drop all proxies, keeping the communicator size. Done before a
    /// rebuild after repartitioning.
    pub fn reset(&mut self) {
        self.proxies.clear();
        for slot in self.index.iter_mut() {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxies_are_created_once_per_rank() {
        let mut registry = ProxyRegistry::new(8, 4);
        let a = registry.get_or_create(3).unwrap();
        let b = registry.get_or_create(5).unwrap();
        let a2 = registry.get_or_create(3).unwrap();
        assert_eq!(a, a2);
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.for_rank(3).unwrap().rank, 3);
        assert!(registry.for_rank(0).is_none());
    }

    #[test]
    fn capacity_overflow_is_a_configuration_error() {
        let mut registry = ProxyRegistry::new(8, 2);
        registry.get_or_create(1).unwrap();
        registry.get_or_create(2).unwrap();
        let err = registry.get_or_create(3).unwrap_err();
        assert!(matches!(err, DecompositionError::Configuration(_)));
        // The existing proxies survive the failed creation.
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn duplicate_cells_merge_their_flags() {
        let mut registry = ProxyRegistry::new(4, 4);
        let slot = registry.get_or_create(1).unwrap();
        let proxy = registry.proxy_mut(slot);
        proxy.add_cell_out(7, ExchangeKind::GRAVITY);
        proxy.add_cell_out(7, ExchangeKind::HYDRO);
        proxy.add_cell_out(9, ExchangeKind::GRAVITY);
        assert_eq!(proxy.cells_out().len(), 2);
        assert_eq!(
            proxy.cells_out()[0],
            (7, ExchangeKind::GRAVITY | ExchangeKind::HYDRO)
        );
    }

    #[test]
    fn reset_clears_proxies_and_index() {
        let mut registry = ProxyRegistry::new(4, 4);
        registry.get_or_create(1).unwrap();
        registry.reset();
        assert!(registry.is_empty());
        assert!(registry.for_rank(1).is_none());
        // Slots are handed out fresh after a reset.
        assert_eq!(registry.get_or_create(2).unwrap(), 0);
    }
}
