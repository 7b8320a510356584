//! Slope and aspect from a 3×3 elevation stencil (Horn 1981)
//!
//! ```text
//!   NW  N  NE        dz/dx = ((NE + 2E + SE) − (NW + 2W + SW)) / (8 · cell)
//!   W   *  E         dz/dy = ((NW + 2N + NE) − (SW + 2S + SE)) / (8 · cell)
//!   SW  S  SE
//! ```
//!
//! `x` grows east and `y` grows north, so the downhill direction is
//! `(−dz/dx, −dz/dy)` and aspect = atan2(−dz/dx, −dz/dy), clockwise from north.

use site_suitability::{destination_point, normalize_bearing, GeoPoint};

/// Gradient magnitude below which the cell is flat and has no aspect (tan 0.01°)
const FLAT_GRADIENT_THRESHOLD: f64 = 1.745e-4;

/// Elevations in metres, row 0 is the northern row, column 0 the western
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElevationStencil {
    pub cells: [[f64; 3]; 3],
    pub cell_size_m: f64,
}

impl ElevationStencil {
    /// Sample coordinates in row-major order (NW, N, NE, W, centre, E, SW, S, SE)
    pub fn sample_points(center: GeoPoint, cell_size_m: f64) -> [GeoPoint; 9] {
        let diagonal = cell_size_m * std::f64::consts::SQRT_2;
        [
            destination_point(center, 315.0, diagonal),
            destination_point(center, 0.0, cell_size_m),
            destination_point(center, 45.0, diagonal),
            destination_point(center, 270.0, cell_size_m),
            center,
            destination_point(center, 90.0, cell_size_m),
            destination_point(center, 225.0, diagonal),
            destination_point(center, 180.0, cell_size_m),
            destination_point(center, 135.0, diagonal),
        ]
    }

    /// Build from nine row-major elevations
    pub fn from_row_major(values: &[f64], cell_size_m: f64) -> Option<Self> {
        if values.len() != 9 {
            return None;
        }
        let mut cells = [[0.0; 3]; 3];
        for (i, v) in values.iter().enumerate() {
            cells[i / 3][i % 3] = *v;
        }
        Some(Self { cells, cell_size_m })
    }

    pub fn center(&self) -> f64 {
        self.cells[1][1]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerrainDerivation {
    pub elevation_m: f64,
    pub slope_deg: f64,
    /// None on flat ground
    pub aspect_deg: Option<f64>,
}

/// Horn gradient; None when any cell is non-finite or the cell size is invalid
pub fn horn_terrain(stencil: &ElevationStencil) -> Option<TerrainDerivation> {
    let z = &stencil.cells;
    if !(stencil.cell_size_m > 0.0) || z.iter().flatten().any(|v| !v.is_finite()) {
        return None;
    }
    let (nw, n, ne) = (z[0][0], z[0][1], z[0][2]);
    let (w, e) = (z[1][0], z[1][2]);
    let (sw, s, se) = (z[2][0], z[2][1], z[2][2]);

    let dz_dx = ((ne + 2.0 * e + se) - (nw + 2.0 * w + sw)) / (8.0 * stencil.cell_size_m);
    let dz_dy = ((nw + 2.0 * n + ne) - (sw + 2.0 * s + se)) / (8.0 * stencil.cell_size_m);
    let magnitude = (dz_dx * dz_dx + dz_dy * dz_dy).sqrt();

    let aspect_deg = if magnitude < FLAT_GRADIENT_THRESHOLD {
        None
    } else {
        Some(normalize_bearing((-dz_dx).atan2(-dz_dy).to_degrees()))
    };

    Some(TerrainDerivation {
        elevation_m: stencil.center(),
        slope_deg: magnitude.atan().to_degrees(),
        aspect_deg,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stencil(rows: [[f64; 3]; 3]) -> ElevationStencil {
        ElevationStencil {
            cells: rows,
            cell_size_m: 30.0,
        }
    }

    #[test]
    fn test_flat() {
        let t = horn_terrain(&stencil([[100.0; 3]; 3])).unwrap();
        assert_eq!(t.slope_deg, 0.0);
        assert!(t.aspect_deg.is_none());
        assert_eq!(t.elevation_m, 100.0);
    }

    #[test]
    fn test_south_facing() {
        // Higher to the north: the slope faces south
        let t = horn_terrain(&stencil([
            [130.0, 130.0, 130.0],
            [100.0, 100.0, 100.0],
            [70.0, 70.0, 70.0],
        ]))
        .unwrap();
        assert!((t.aspect_deg.unwrap() - 180.0).abs() < 1e-9);
        assert!((t.slope_deg - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_east_facing() {
        let t = horn_terrain(&stencil([
            [110.0, 100.0, 90.0],
            [110.0, 100.0, 90.0],
            [110.0, 100.0, 90.0],
        ]))
        .unwrap();
        assert!((t.aspect_deg.unwrap() - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_northwest_facing() {
        let t = horn_terrain(&stencil([
            [80.0, 90.0, 100.0],
            [90.0, 100.0, 110.0],
            [100.0, 110.0, 120.0],
        ]))
        .unwrap();
        assert!((t.aspect_deg.unwrap() - 315.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_input() {
        let mut s = stencil([[100.0; 3]; 3]);
        s.cells[0][0] = f64::NAN;
        assert!(horn_terrain(&s).is_none());
        assert!(ElevationStencil::from_row_major(&[1.0; 8], 30.0).is_none());
    }

    #[test]
    fn test_sample_points_layout() {
        let center = GeoPoint::new(44.0, -110.0);
        let points = ElevationStencil::sample_points(center, 30.0);
        assert_eq!(points[4], center);
        assert!(points[1].lat > center.lat);
        assert!(points[5].lon > center.lon);
        assert!((center.distance_m(&points[0]) - 30.0 * std::f64::consts::SQRT_2).abs() < 0.01);
    }
}
