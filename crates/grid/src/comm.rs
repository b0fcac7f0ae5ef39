//! Collective reduction abstraction.
//!
//! The zoom-region bounds are computed from particles scattered over all
//! compute ranks, so every rank must combine its partial min/max/sum with
//! every other rank before the answer is usable. This module exposes that
//! primitive as a trait so the geometry code is independent of the transport.
//!
//! [`LocalCollective`] is the single-rank implementation used in tests and
//! non-distributed runs. A message-passing implementation can be added later
//! as a drop-in replacement; the reduction calls are the only barrier
//! synchronization point in the subsystem.

/// Collective min/max/sum reductions over all ranks.
///
/// All methods operate in place and must return the same result on every
/// rank. Calls block until every rank has contributed.
pub trait Collective {
    /// Index of the calling rank.
    fn rank(&self) -> usize;

    /// Total number of ranks.
    fn size(&self) -> usize;

    /// Element-wise minimum across ranks.
    fn allreduce_min(&self, values: &mut [f64]);

    /// Element-wise maximum across ranks.
    fn allreduce_max(&self, values: &mut [f64]);

    /// Element-wise sum across ranks.
    fn allreduce_sum(&self, values: &mut [f64]);
}

/// Trivial single-rank collective: every reduction is the identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalCollective;

impl Collective for LocalCollective {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn allreduce_min(&self, _values: &mut [f64]) {}

    fn allreduce_max(&self, _values: &mut [f64]) {}

    fn allreduce_sum(&self, _values: &mut [f64]) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_collective_is_identity() {
        let comm = LocalCollective;
        let mut v = [1.0, -2.0, 3.5];
        comm.allreduce_min(&mut v);
        comm.allreduce_max(&mut v);
        comm.allreduce_sum(&mut v);
        assert_eq!(v, [1.0, -2.0, 3.5]);
        assert_eq!(comm.rank(), 0);
        assert_eq!(comm.size(), 1);
    }
}
