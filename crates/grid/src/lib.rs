//! Dual-resolution spatial decomposition for particle simulations.
//!
//! A simulation volume is covered by a coarse natural top-level grid; when
//! a compact high-resolution particle subset exists, a finer zoom grid is
//! embedded over the cubical region containing it. This crate builds both
//! grids, classifies the natural cells around the zoom region, answers
//! point-to-cell queries across the two resolutions, and provides the
//! distance bounds the interaction machinery is built on.

#![warn(missing_docs)]

pub mod cell;
pub mod classify;
pub mod comm;
pub mod distance;
pub mod error;
pub mod index;
pub mod particle;
pub mod snapshot;
pub mod zoom;

pub use cell::{Cell, CellId, CellKind, CellSpace, ChildRange, SendMask};
pub use comm::{Collective, LocalCollective};
pub use error::DecompositionError;
pub use index::{Decomposition, UniformDecomposition, ZoomDecomposition};
pub use particle::{ParticleSet, Species};
pub use snapshot::Snapshot;
pub use zoom::{RawZoomBounds, ZoomRegionBuilder, ZoomRegionProperties};
