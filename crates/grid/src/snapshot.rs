//! Restart images of the decomposition.
//!
//! The cell arena and zoom geometry are flattened into plain-old-data
//! records and written as one contiguous byte image, so a run can be
//! brought back without re-deriving the decomposition from particles. The
//! proxy send masks are not persisted: proxies are rebuilt from the
//! restored cells.

use bytemuck::{Pod, Zeroable};

use crate::cell::{Cell, CellId, CellKind, CellSpace, ChildRange, SendMask};
use crate::error::DecompositionError;
use crate::zoom::ZoomRegionProperties;

/// Fixed-size image header.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct SnapshotHeader {
    /// Global box size.
    dim: [f64; 3],
    /// Natural-grid resolution per axis.
    cdim: [i32; 3],
    /// Periodic boundary conditions (0 or 1).
    periodic: i32,
    /// Total cell count across both grids.
    nr_cells: i32,
    /// Whether a zoom-properties block follows the cell records.
    has_zoom: i32,
}

/// One cell, flattened.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct CellRecord {
    loc: [f64; 3],
    width: [f64; 3],
    dmin: f64,
    gas_count: u64,
    gpart_count: u64,
    kind: i32,
    owner: i32,
    /// Hosting natural cell for zoom cells, -1 otherwise.
    host: i32,
    has_children: i32,
    child_start: [i32; 3],
    child_end: [i32; 3],
}

const HEADER_SIZE: usize = std::mem::size_of::<SnapshotHeader>();
const RECORD_SIZE: usize = std::mem::size_of::<CellRecord>();
const PROPS_SIZE: usize = std::mem::size_of::<ZoomRegionProperties>();

/// A decomposition flattened for persistence.
#[derive(Debug, Clone)]
pub struct Snapshot {
    header: SnapshotHeader,
    records: Vec<CellRecord>,
    props: Option<ZoomRegionProperties>,
}

impl Snapshot {
    /// Flatten a cell arena (and zoom geometry, if any) into records.
    pub fn capture(space: &CellSpace, props: Option<&ZoomRegionProperties>) -> Self {
        let records = space
            .iter()
            .map(|(id, cell)| {
                let range = space.children_of(id);
                CellRecord {
                    loc: cell.loc,
                    width: cell.width,
                    dmin: cell.dmin,
                    gas_count: cell.gas_count as u64,
                    gpart_count: cell.gpart_count as u64,
                    kind: cell.kind as i32,
                    owner: cell.owner as i32,
                    host: cell.host.map_or(-1, |h| h as i32),
                    has_children: range.is_some() as i32,
                    child_start: range.map_or([0; 3], |r| r.start.map(|v| v as i32)),
                    child_end: range.map_or([0; 3], |r| r.end.map(|v| v as i32)),
                }
            })
            .collect::<Vec<_>>();

        Self {
            header: SnapshotHeader {
                dim: space.dim,
                cdim: space.cdim.map(|v| v as i32),
                periodic: space.periodic as i32,
                nr_cells: records.len() as i32,
                has_zoom: props.is_some() as i32,
            },
            records,
            props: props.copied(),
        }
    }

    /// Serialize to one contiguous byte image.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            HEADER_SIZE
                + self.records.len() * RECORD_SIZE
                + self.props.map_or(0, |_| PROPS_SIZE),
        );
        out.extend_from_slice(bytemuck::bytes_of(&self.header));
        out.extend_from_slice(bytemuck::cast_slice(&self.records));
        if let Some(props) = &self.props {
            out.extend_from_slice(bytemuck::bytes_of(props));
        }
        out
    }

    /// Decode a byte image written by [`Snapshot::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecompositionError> {
        if bytes.len() < HEADER_SIZE {
            return Err(DecompositionError::snapshot(format!(
                "image truncated: {} bytes, header alone needs {}",
                bytes.len(),
                HEADER_SIZE
            )));
        }
        let header: SnapshotHeader = bytemuck::pod_read_unaligned(&bytes[..HEADER_SIZE]);

        if header.nr_cells < 0 || header.has_zoom & !1 != 0 {
            return Err(DecompositionError::snapshot("corrupt image header"));
        }
        let nr_cells = header.nr_cells as usize;
        let expected =
            HEADER_SIZE + nr_cells * RECORD_SIZE + header.has_zoom as usize * PROPS_SIZE;
        if bytes.len() != expected {
            return Err(DecompositionError::snapshot(format!(
                "image is {} bytes, {} cells imply {}",
                bytes.len(),
                nr_cells,
                expected
            )));
        }

        let mut records = Vec::with_capacity(nr_cells);
        let mut offset = HEADER_SIZE;
        for _ in 0..nr_cells {
            records.push(bytemuck::pod_read_unaligned::<CellRecord>(
                &bytes[offset..offset + RECORD_SIZE],
            ));
            offset += RECORD_SIZE;
        }

        let props = (header.has_zoom != 0)
            .then(|| bytemuck::pod_read_unaligned(&bytes[offset..offset + PROPS_SIZE]));

        Ok(Self {
            header,
            records,
            props,
        })
    }

    /// Rebuild the cell arena and zoom geometry from the records.
    pub fn restore(
        &self,
    ) -> Result<(CellSpace, Option<ZoomRegionProperties>), DecompositionError> {
        let cdim = [
            self.header.cdim[0] as usize,
            self.header.cdim[1] as usize,
            self.header.cdim[2] as usize,
        ];
        let natural_count = cdim[0] * cdim[1] * cdim[2];
        let nr_cells = self.records.len();
        if natural_count == 0 || nr_cells < natural_count {
            return Err(DecompositionError::snapshot(format!(
                "{} cells cannot hold a {}x{}x{} natural grid",
                nr_cells, cdim[0], cdim[1], cdim[2]
            )));
        }
        if self.props.is_none() && nr_cells != natural_count {
            return Err(DecompositionError::snapshot(
                "image carries zoom cells but no zoom geometry",
            ));
        }

        let mut cells = Vec::with_capacity(nr_cells);
        let mut children = vec![None; natural_count];
        for (id, rec) in self.records.iter().enumerate() {
            let kind = match rec.kind {
                0 => CellKind::Plain,
                1 => CellKind::Neighbour,
                2 => CellKind::VoidHost,
                3 => CellKind::ZoomLeaf,
                other => {
                    return Err(DecompositionError::snapshot(format!(
                        "cell {id} has unknown kind {other}"
                    )))
                }
            };
            let host = if rec.host < 0 {
                None
            } else if (rec.host as usize) < natural_count {
                Some(rec.host as CellId)
            } else {
                return Err(DecompositionError::snapshot(format!(
                    "cell {id} names host {} outside the natural grid",
                    rec.host
                )));
            };
            if rec.has_children != 0 {
                if id >= natural_count {
                    return Err(DecompositionError::snapshot(format!(
                        "zoom cell {id} carries a child range"
                    )));
                }
                children[id] = Some(ChildRange {
                    start: rec.child_start.map(|v| v as usize),
                    end: rec.child_end.map(|v| v as usize),
                });
            }

            cells.push(Cell {
                loc: rec.loc,
                width: rec.width,
                kind,
                owner: rec.owner as usize,
                gas_count: rec.gas_count as usize,
                gpart_count: rec.gpart_count as usize,
                dmin: rec.dmin,
                host,
                has_multipole: true,
                send_mask: SendMask::default(),
            });
        }

        let space = CellSpace::from_restored(
            self.header.dim,
            cdim,
            self.header.periodic != 0,
            cells,
            children,
            natural_count,
        );
        Ok((space, self.props))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::LocalCollective;
    use crate::index::{Decomposition, ZoomDecomposition};
    use crate::particle::{ParticleSet, Species};
    use crate::zoom::ZoomRegionBuilder;

    fn zoom_fixture() -> ZoomDecomposition {
        let mut ps = ParticleSet::new();
        ps.push(3.2, 3.2, 3.2, 1.0, Species::HighResDarkMatter);
        ps.push(4.8, 4.8, 4.8, 1.0, Species::HighResDarkMatter);
        let builder = ZoomRegionBuilder::new(1.1);
        let raw = builder
            .compute_bounds(&ps, [8.0; 3], &LocalCollective)
            .unwrap();
        ZoomDecomposition::new([8.0; 3], [8, 8, 8], true, &raw, &builder, 1).unwrap()
    }

    #[test]
    fn round_trip_preserves_the_arena() {
        let mut decomp = zoom_fixture();
        decomp.space_mut().assign_ranks_contiguous(4);
        let mut ps = ParticleSet::new();
        ps.push(0.5, 0.5, 0.5, 1.0, Species::Gas);
        ps.push(3.1, 3.1, 3.1, 1.0, Species::HighResDarkMatter);
        decomp.bin_particles(&ps);

        let image = Snapshot::capture(decomp.space(), decomp.zoom_props()).to_bytes();
        let (space, props) = Snapshot::from_bytes(&image).unwrap().restore().unwrap();

        assert_eq!(space.len(), decomp.space().len());
        assert_eq!(space.natural_count(), decomp.space().natural_count());
        assert_eq!(props.unwrap(), *decomp.props());

        for (id, cell) in decomp.space().iter() {
            let restored = space.cell(id);
            assert_eq!(restored.loc, cell.loc);
            assert_eq!(restored.kind, cell.kind);
            assert_eq!(restored.owner, cell.owner);
            assert_eq!(restored.gas_count, cell.gas_count);
            assert_eq!(restored.gpart_count, cell.gpart_count);
            assert_eq!(restored.host, cell.host);
            assert_eq!(space.children_of(id), decomp.space().children_of(id));
        }
    }

    #[test]
    fn restored_decomposition_locates_like_the_original() {
        let decomp = zoom_fixture();
        let image = Snapshot::capture(decomp.space(), decomp.zoom_props()).to_bytes();
        let (space, props) = Snapshot::from_bytes(&image).unwrap().restore().unwrap();
        let restored = ZoomDecomposition::from_parts(space, props.unwrap());

        for pos in [[0.5, 0.5, 0.5], [3.1, 3.1, 3.1], [4.9, 3.5, 4.0], [7.9, 7.9, 7.9]] {
            assert_eq!(restored.locate(pos), decomp.locate(pos));
        }
    }

    #[test]
    fn truncated_image_is_rejected() {
        let decomp = zoom_fixture();
        let image = Snapshot::capture(decomp.space(), decomp.zoom_props()).to_bytes();
        let err = Snapshot::from_bytes(&image[..image.len() - 1]).unwrap_err();
        assert!(matches!(err, DecompositionError::Snapshot(_)));
        let err = Snapshot::from_bytes(&image[..10]).unwrap_err();
        assert!(matches!(err, DecompositionError::Snapshot(_)));
    }

    #[test]
    fn corrupt_kind_is_rejected() {
        let decomp = zoom_fixture();
        let mut snap = Snapshot::capture(decomp.space(), decomp.zoom_props());
        snap.records[0].kind = 99;
        let err = snap.restore().unwrap_err();
        assert!(matches!(err, DecompositionError::Snapshot(_)));
    }

    #[test]
    fn uniform_image_has_no_zoom_block() {
        let space = CellSpace::new_natural([4.0; 3], [4, 4, 4], false);
        let image = Snapshot::capture(&space, None).to_bytes();
        let (restored, props) = Snapshot::from_bytes(&image).unwrap().restore().unwrap();
        assert!(props.is_none());
        assert_eq!(restored.len(), 64);
        assert!(!restored.periodic);
    }
}
