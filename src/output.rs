//! Snapshots of field data: PNG slices and VTK unstructured grids.

use crate::error::{Error, Result};
use crate::field::FieldBuffer;
use crate::grid::Grid;
use crate::real::Real;
use crate::util::*;
use vtkio::model::{
    Attribute, Attributes, ByteOrder, CellType, Cells, DataArray, DataSet, ElementType, IOBuffer,
    UnstructuredGridPiece, Version, VertexNumbers, Vtk,
};

/// Map `v` in `[-scale, scale]` to `[0, 1]`, zero lands mid gradient.
fn normalize(v: f64, scale: f64) -> f64 {
    if scale > 0.0 {
        (0.5 + 0.5 * v / scale).clamp(0.0, 1.0)
    } else {
        0.5
    }
}

/// Write the domain of `buffer` as a PNG with the TURBO gradient.
///
/// Axis 0 runs along the image width and axis 1 along the height,
/// a 1D field gives a single row, and higher axes are fixed at `slice`.
pub fn write_png<T: Real, const GRID_DIMENSION: usize, P: AsRef<std::path::Path>>(
    buffer: &FieldBuffer<T, GRID_DIMENSION>,
    slice: i32,
    path: P,
) -> Result<()> {
    let domain = buffer.domain();
    let extent = domain.exclusive_bounds();
    let width = extent[0] as u32;
    let height = if GRID_DIMENSION > 1 { extent[1] as u32 } else { 1 };
    for d in 2..GRID_DIMENSION {
        if slice < domain.bounds[(d, 0)] || slice > domain.bounds[(d, 1)] {
            return Err(Error::Output(format!(
                "slice {slice} is outside {domain}"
            )));
        }
    }

    let scale = buffer.max_abs().into_f64();
    let gradient = colorous::TURBO;
    let mut img = image::RgbImage::new(width, height);
    for j in 0..height {
        for i in 0..width {
            let mut coord: Coord<GRID_DIMENSION> = Coord::zeros();
            coord.fill(slice);
            coord[0] = i as i32;
            if GRID_DIMENSION > 1 {
                coord[1] = j as i32;
            }
            let r = normalize(buffer.view(&coord).into_f64(), scale);
            let c = gradient.eval_continuous(r);
            img.put_pixel(i, j, image::Rgb(c.as_array()));
        }
    }
    img.save(path.as_ref())
        .map_err(|e| Error::Output(e.to_string()))?;
    log::info!("wrote image {}", path.as_ref().display());
    Ok(())
}

/// Write the domain of a 3D field as hexahedral cells, point
/// positions are physical coordinates of `grid`.
pub fn write_vtk3d<T: Real, const GRID_DIMENSION: usize, P: AsRef<std::path::Path>>(
    grid: &Grid<GRID_DIMENSION>,
    buffer: &FieldBuffer<T, GRID_DIMENSION>,
    name: &str,
    path: P,
) -> Result<()> {
    if GRID_DIMENSION != 3 {
        return Err(Error::Output(format!(
            "VTK snapshots need a 3D field, got {GRID_DIMENSION}D"
        )));
    }
    profiling::scope!("write_vtk3d");
    let domain = buffer.domain();

    let buffer_size = domain.buffer_size();
    let mut points = Vec::with_capacity(3 * buffer_size);
    let mut data = Vec::with_capacity(buffer_size);
    for coord in domain.coord_iter() {
        let p = grid.physical_position(&coord);
        points.extend(p.iter().map(|x| *x as f32));
        data.push(buffer.view(&coord).into_f64() as f32);
    }

    // hexahedron corners in VTK order
    let corners: [[i32; 3]; 8] = [
        [0, 0, 0],
        [1, 0, 0],
        [1, 0, 1],
        [0, 0, 1],
        [0, 1, 0],
        [1, 1, 0],
        [1, 1, 1],
        [0, 1, 1],
    ];
    let cell_bounds = domain.cell_bounds();
    let n_cells = cell_bounds.buffer_size();
    let mut connectivity = Vec::with_capacity(8 * n_cells);
    let mut offsets = Vec::with_capacity(n_cells);
    let mut cell_types = Vec::with_capacity(n_cells);
    let mut offset = 8;
    for cell_coord in cell_bounds.coord_iter() {
        for corner in &corners {
            let mut v = cell_coord;
            for d in 0..3 {
                v[d] += corner[d];
            }
            connectivity.push(domain.coord_to_linear(&v) as u64);
        }
        offsets.push(offset);
        cell_types.push(CellType::Hexahedron);
        offset += 8;
    }

    Vtk {
        version: Version::Auto,
        title: String::new(),
        byte_order: ByteOrder::LittleEndian,
        file_path: None,
        data: DataSet::inline(UnstructuredGridPiece {
            points: IOBuffer::F32(points),
            cells: Cells {
                cell_verts: VertexNumbers::XML {
                    connectivity,
                    offsets,
                },
                types: cell_types,
            },
            data: Attributes {
                point: vec![Attribute::DataArray(DataArray {
                    name: name.to_string(),
                    elem: ElementType::Scalars {
                        num_comp: 1,
                        lookup_table: None,
                    },
                    data: IOBuffer::F32(data),
                })],
                cell: vec![],
            },
        }),
    }
    .export(path.as_ref())
    .map_err(|e| Error::Output(format!("{e:?}")))?;
    log::info!("wrote vtk {}", path.as_ref().display());
    Ok(())
}
