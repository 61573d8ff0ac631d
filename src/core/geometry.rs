//! Polyline simplification (Ramer–Douglas–Peucker) and small point helpers.
//!
//! Points are `[y, x]` pairs in whatever planar-ish space the caller uses:
//! `[lat, lon]` degrees for the overlay builder, `[northing, easting]` metres
//! when the caller projects first. Distances are Euclidean in that space.

use crate::domain::model::LatLon;

/// Distance from `p` to the segment `a`–`b`, clamped to the segment ends.
fn segment_distance(p: [f64; 2], a: [f64; 2], b: [f64; 2]) -> f64 {
    let (x, y) = (p[1], p[0]);
    let (x1, y1) = (a[1], a[0]);
    let (dx, dy) = (b[1] - x1, b[0] - y1);

    if dx == 0.0 && dy == 0.0 {
        return ((x - x1).powi(2) + (y - y1).powi(2)).sqrt();
    }

    let t = (((x - x1) * dx + (y - y1) * dy) / (dx * dx + dy * dy)).clamp(0.0, 1.0);
    let px = x1 + t * dx;
    let py = y1 + t * dy;
    ((x - px).powi(2) + (y - py).powi(2)).sqrt()
}

/// Indices of the points kept by RDP, ascending, always including both ends.
///
/// Uses an explicit work stack; the result matches the recursive
/// formulation, ties resolving to the first index of maximum deviation.
pub fn rdp_indices(points: &[[f64; 2]], epsilon: f64) -> Vec<usize> {
    let n = points.len();
    if n < 3 {
        return (0..n).collect();
    }

    let mut keep = vec![false; n];
    keep[0] = true;
    keep[n - 1] = true;

    let mut stack = vec![(0usize, n - 1)];
    while let Some((start, end)) = stack.pop() {
        if end <= start + 1 {
            continue;
        }

        let mut max_d = -1.0;
        let mut index = start;
        for i in start + 1..end {
            let d = segment_distance(points[i], points[start], points[end]);
            if d > max_d {
                max_d = d;
                index = i;
            }
        }

        if max_d > epsilon && index > start {
            keep[index] = true;
            stack.push((index, end));
            stack.push((start, index));
        }
    }

    keep.iter()
        .enumerate()
        .filter_map(|(i, k)| k.then_some(i))
        .collect()
}

/// RDP over the points themselves.
pub fn rdp(points: &[[f64; 2]], epsilon: f64) -> Vec<[f64; 2]> {
    rdp_indices(points, epsilon)
        .into_iter()
        .map(|i| points[i])
        .collect()
}

/// Evenly spaced subset of `0..n` with at most `max_points` entries that
/// always contains `0` and `n - 1`.
pub fn decimate_indices(n: usize, max_points: usize) -> Vec<usize> {
    let max_points = max_points.max(2);
    if n <= max_points {
        return (0..n).collect();
    }

    let step = (n - 1).div_ceil(max_points - 1);
    let mut out: Vec<usize> = (0..n - 1).step_by(step).collect();
    out.push(n - 1);
    out
}

/// RDP followed by decimation down to `max_points`.
///
/// Lines of fewer than 3 points come back unchanged.
pub fn simplify(points: &[[f64; 2]], epsilon: f64, max_points: usize) -> Vec<[f64; 2]> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let simplified = rdp(points, epsilon);
    decimate_indices(simplified.len(), max_points)
        .into_iter()
        .map(|i| simplified[i])
        .collect()
}

/// Arithmetic mean of the points, `None` when empty.
pub fn centroid(points: &[LatLon]) -> Option<LatLon> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let (lat, lon) = points
        .iter()
        .fold((0.0, 0.0), |(lat, lon), p| (lat + p.lat, lon + p.lon));
    Some(LatLon::new(lat / n, lon / n))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(n: usize) -> Vec<[f64; 2]> {
        (0..n).map(|i| [i as f64, i as f64 * 2.0]).collect()
    }

    #[test]
    fn test_colinear_points_collapse_to_endpoints() {
        let pts = line(10);
        let out = rdp(&pts, 0.001);
        assert_eq!(out, vec![pts[0], pts[9]]);
    }

    #[test]
    fn test_short_lines_are_unchanged() {
        let pts = vec![[0.0, 0.0], [1.0, 5.0]];
        assert_eq!(simplify(&pts, 10.0, 2), pts);
        assert!(simplify(&[], 1.0, 2).is_empty());
    }

    #[test]
    fn test_spike_is_kept() {
        let pts = vec![[0.0, 0.0], [0.0, 1.0], [5.0, 2.0], [0.0, 3.0], [0.0, 4.0]];
        assert_eq!(rdp_indices(&pts, 1.0), vec![0, 2, 4]);
    }

    #[test]
    fn test_zero_length_chord_uses_point_distance() {
        let pts = vec![[0.0, 0.0], [3.0, 4.0], [0.0, 0.0]];
        assert_eq!(rdp_indices(&pts, 4.9), vec![0, 1, 2]);
        assert_eq!(rdp_indices(&pts, 5.0), vec![0, 2]);
    }

    #[test]
    fn test_ties_pick_first_index() {
        let pts = vec![[0.0, 0.0], [1.0, 1.0], [1.0, 2.0], [0.0, 3.0]];
        assert_eq!(rdp_indices(&pts, 1.5), vec![0, 3]);
        // Points 1 and 2 deviate equally; splitting at 1 leaves 2 within tolerance.
        assert_eq!(rdp_indices(&pts, 0.5), vec![0, 1, 3]);
    }

    #[test]
    fn test_decimation_never_exceeds_max_and_keeps_ends() {
        for n in 3..200 {
            for max in [0, 1, 2, 3, 7, 64, 80] {
                let idx = decimate_indices(n, max);
                assert!(idx.len() <= max.max(2), "n={} max={} got {}", n, max, idx.len());
                assert_eq!(idx[0], 0);
                assert_eq!(*idx.last().unwrap(), n - 1);
                assert!(idx.windows(2).all(|w| w[0] < w[1]));
            }
        }
    }

    #[test]
    fn test_simplify_zigzag_respects_max() {
        let pts: Vec<[f64; 2]> = (0..500)
            .map(|i| [if i % 2 == 0 { 0.0 } else { 1.0 }, i as f64])
            .collect();
        let out = simplify(&pts, 0.01, 64);
        assert!(out.len() <= 64);
        assert_eq!(out[0], pts[0]);
        assert_eq!(*out.last().unwrap(), pts[499]);
    }

    #[test]
    fn test_centroid() {
        let c = centroid(&[LatLon::new(50.0, -1.0), LatLon::new(52.0, 1.0)]).unwrap();
        assert!((c.lat - 51.0).abs() < 1e-12);
        assert!(c.lon.abs() < 1e-12);
        assert!(centroid(&[]).is_none());
    }
}
