//! Legacy VTK snapshot of rod geometry, one line cell per rod.

use std::path::Path;

use vtkio::model::*;

use crate::error::{OutputError, OutputResult};
use crate::prelude::*;

/// Converged geometry and axial force of one rod.
#[derive(Debug, Clone, PartialEq)]
pub struct RodSegment {
    pub label: u32,
    pub points: [Vector3; 2],
    pub force: f64,
}

pub fn rods_vtk(segments: &[RodSegment]) -> Vtk {
    Vtk {
        version: Version { major: 4, minor: 2 },
        title: "rods".to_string(),
        byte_order: ByteOrder::LittleEndian,
        file_path: None,
        data: DataSet::inline(UnstructuredGridPiece {
            points: IOBuffer::F64(
                segments
                    .iter()
                    .flat_map(|s| s.points.iter().flat_map(|p| p.iter().copied()))
                    .collect_vec(),
            ),
            cells: Cells {
                cell_verts: VertexNumbers::XML {
                    connectivity: (0..2 * segments.len() as u64).collect_vec(),
                    offsets: (1..=segments.len() as u64).map(|i| 2 * i).collect_vec(),
                },
                types: vec![CellType::Line; segments.len()],
            },
            data: Attributes {
                cell: vec![
                    Attribute::DataArray(DataArrayBase {
                        name: "Label".to_string(),
                        elem: ElementType::Scalars {
                            num_comp: 1,
                            lookup_table: None,
                        },
                        data: IOBuffer::U32(segments.iter().map(|s| s.label).collect_vec()),
                    }),
                    Attribute::DataArray(DataArrayBase {
                        name: "AxialForce".to_string(),
                        elem: ElementType::Scalars {
                            num_comp: 1,
                            lookup_table: None,
                        },
                        data: IOBuffer::F64(segments.iter().map(|s| s.force).collect_vec()),
                    }),
                ],
                ..Default::default()
            },
        }),
    }
}

pub fn export_rods(path: impl AsRef<Path>, segments: &[RodSegment]) -> OutputResult<()> {
    rods_vtk(segments)
        .export_ascii(path.as_ref())
        .map_err(|e| OutputError::Vtk(format!("{e:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rod_cells() {
        let segments = vec![
            RodSegment {
                label: 1,
                points: [Vector3::zeros(), Vector3::x()],
                force: 10.,
            },
            RodSegment {
                label: 2,
                points: [Vector3::x(), Vector3::new(1., 1., 0.)],
                force: -3.,
            },
        ];
        let vtk = rods_vtk(&segments);
        let DataSet::UnstructuredGrid { pieces, .. } = vtk.data else {
            panic!("expected an unstructured grid");
        };
        let Piece::Inline(piece) = &pieces[0] else {
            panic!("expected an inline piece");
        };
        let IOBuffer::F64(points) = &piece.points else {
            panic!("expected f64 points");
        };
        assert_eq!(points.len(), 12);
        assert_eq!(piece.cells.types, vec![CellType::Line; 2]);
        assert_eq!(piece.data.cell.len(), 2);
    }
}
