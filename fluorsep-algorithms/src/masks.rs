//! Neuropil mask construction.
//!
//! For each ROI this builds the ROI mask itself plus `n_regions` disjoint
//! neuropil submasks surrounding it: the ROI is dilated by a disc whose
//! radius scales with `expansion * sqrt(area)`, the ROI (and any pixels
//! claimed by other cells) is subtracted from the dilated patch, and the
//! remaining ring is partitioned into angular slices of approximately equal
//! pixel count around the ROI centroid.

use fluorsep_core::error::{Error, Result};
use fluorsep_core::roi::RoiShape;
use ndarray::Array2;

/// All masks derived for one cell.
#[derive(Clone, Debug)]
pub struct CellMasks {
    /// The ROI's own mask.
    pub roi: Array2<bool>,
    /// Disjoint neuropil submasks, `n_regions` of them.
    pub neuropil: Vec<Array2<bool>>,
    /// Polygon outline of the ROI, `[row, column]` pixel coordinates.
    pub outline: Vec<[f64; 2]>,
}

/// Builds the ROI mask and surrounding neuropil submasks for one cell.
///
/// `exclude` marks pixels claimed by other cells' ROIs; those never enter
/// the neuropil. The result is a pure function of the inputs.
///
/// # Errors
/// Returns [`Error::Shape`] for degenerate polygons, mismatched mask
/// shapes, or an ROI that covers no pixels.
pub fn build_masks(
    shape: &RoiShape,
    image_shape: (usize, usize),
    n_regions: usize,
    expansion: f64,
    exclude: Option<&Array2<bool>>,
) -> Result<CellMasks> {
    shape.validate(image_shape)?;
    let (roi, outline) = match shape {
        RoiShape::Polygon(points) => {
            let mask = rasterize_polygon(points, image_shape)?;
            (mask, points.clone())
        }
        RoiShape::Mask(mask) => {
            let outline = mask_outline(mask);
            (mask.clone(), outline)
        }
    };

    let area = roi.iter().filter(|&&v| v).count();
    if area == 0 {
        return Err(Error::Shape("ROI covers no pixels".into()));
    }

    let radius = expansion * (area as f64).sqrt();
    let patch = dilate_disc(&roi, radius);

    let mut ring = patch;
    ndarray::Zip::from(&mut ring).and(&roi).for_each(|p, &r| {
        if r {
            *p = false;
        }
    });
    if let Some(excluded) = exclude {
        if excluded.dim() != image_shape {
            return Err(Error::Shape(format!(
                "exclusion mask shape {:?} does not match image shape {:?}",
                excluded.dim(),
                image_shape
            )));
        }
        ndarray::Zip::from(&mut ring).and(excluded).for_each(|p, &e| {
            if e {
                *p = false;
            }
        });
    }

    let neuropil = partition_by_angle(&ring, centroid(&roi), n_regions, image_shape);
    Ok(CellMasks {
        roi,
        neuropil,
        outline,
    })
}

/// Rasterizes a closed polygon with even-odd scanline filling.
///
/// A pixel is inside when its center lies inside the polygon. Points are
/// `[row, column]` coordinates.
///
/// # Errors
/// Returns [`Error::Shape`] if the polygon has fewer than 3 points.
pub fn rasterize_polygon(
    points: &[[f64; 2]],
    image_shape: (usize, usize),
) -> Result<Array2<bool>> {
    if points.len() < 3 {
        return Err(Error::Shape(format!(
            "polygon has {} points, need at least 3",
            points.len()
        )));
    }
    let (height, width) = image_shape;
    let mut mask = Array2::from_elem(image_shape, false);
    let mut crossings: Vec<f64> = Vec::new();

    for row in 0..height {
        let yc = row as f64 + 0.5;
        crossings.clear();
        for i in 0..points.len() {
            let [y0, x0] = points[i];
            let [y1, x1] = points[(i + 1) % points.len()];
            if (y0 <= yc && y1 > yc) || (y1 <= yc && y0 > yc) {
                let t = (yc - y0) / (y1 - y0);
                crossings.push(x0 + t * (x1 - x0));
            }
        }
        crossings.sort_by(|a, b| a.total_cmp(b));
        for pair in crossings.chunks_exact(2) {
            for col in 0..width {
                let xc = col as f64 + 0.5;
                if xc >= pair[0] && xc < pair[1] {
                    mask[[row, col]] = true;
                }
            }
        }
    }
    Ok(mask)
}

/// Boundary pixels of a mask, ordered by angle around the centroid.
///
/// Used to recover a polygon outline from a mask-defined ROI. Empty masks
/// yield an empty outline.
#[must_use]
pub fn mask_outline(mask: &Array2<bool>) -> Vec<[f64; 2]> {
    let (height, width) = mask.dim();
    let (cy, cx) = centroid(mask);
    let mut boundary: Vec<(f64, [f64; 2])> = Vec::new();
    for row in 0..height {
        for col in 0..width {
            if !mask[[row, col]] {
                continue;
            }
            let on_edge = row == 0
                || col == 0
                || row + 1 == height
                || col + 1 == width
                || !mask[[row - 1, col]]
                || !mask[[row + 1, col]]
                || !mask[[row, col - 1]]
                || !mask[[row, col + 1]];
            if on_edge {
                let dy = row as f64 - cy;
                let dx = col as f64 - cx;
                boundary.push((dy.atan2(dx), [row as f64, col as f64]));
            }
        }
    }
    boundary.sort_by(|a, b| a.0.total_cmp(&b.0));
    boundary.into_iter().map(|(_, p)| p).collect()
}

fn centroid(mask: &Array2<bool>) -> (f64, f64) {
    let mut sum_r = 0.0;
    let mut sum_c = 0.0;
    let mut count = 0.0;
    for ((row, col), &v) in mask.indexed_iter() {
        if v {
            sum_r += row as f64;
            sum_c += col as f64;
            count += 1.0;
        }
    }
    if count == 0.0 {
        (0.0, 0.0)
    } else {
        (sum_r / count, sum_c / count)
    }
}

/// Dilates a mask by a euclidean disc of the given radius in pixels.
fn dilate_disc(mask: &Array2<bool>, radius: f64) -> Array2<bool> {
    let (height, width) = mask.dim();
    let r = radius.max(0.0);
    let reach = r.floor() as isize;
    let r2 = r * r;
    let mut offsets: Vec<(isize, isize)> = Vec::new();
    for dy in -reach..=reach {
        for dx in -reach..=reach {
            if (dy * dy + dx * dx) as f64 <= r2 {
                offsets.push((dy, dx));
            }
        }
    }
    if offsets.is_empty() {
        offsets.push((0, 0));
    }

    let mut out = Array2::from_elem(mask.dim(), false);
    for ((row, col), &v) in mask.indexed_iter() {
        if !v {
            continue;
        }
        for &(dy, dx) in &offsets {
            let nr = row as isize + dy;
            let nc = col as isize + dx;
            if nr >= 0 && nc >= 0 && (nr as usize) < height && (nc as usize) < width {
                out[[nr as usize, nc as usize]] = true;
            }
        }
    }
    out
}

/// Splits the neuropil ring into `n_regions` angular slices with
/// approximately equal pixel counts. An empty ring yields empty masks.
fn partition_by_angle(
    ring: &Array2<bool>,
    center: (f64, f64),
    n_regions: usize,
    image_shape: (usize, usize),
) -> Vec<Array2<bool>> {
    let mut pixels: Vec<(f64, usize, usize)> = ring
        .indexed_iter()
        .filter(|(_, &v)| v)
        .map(|((row, col), _)| {
            let dy = row as f64 - center.0;
            let dx = col as f64 - center.1;
            (dy.atan2(dx), row, col)
        })
        .collect();
    pixels.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut out: Vec<Array2<bool>> = (0..n_regions)
        .map(|_| Array2::from_elem(image_shape, false))
        .collect();
    if n_regions == 0 || pixels.is_empty() {
        return out;
    }

    let base = pixels.len() / n_regions;
    let extra = pixels.len() % n_regions;
    let mut cursor = 0;
    for (i, mask) in out.iter_mut().enumerate() {
        let take = base + usize::from(i < extra);
        for &(_, row, col) in &pixels[cursor..cursor + take] {
            mask[[row, col]] = true;
        }
        cursor += take;
    }
    out
}
