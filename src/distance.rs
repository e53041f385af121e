use ndarray::{Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;
use std::ops::Range;

/// Squared Euclidean distance between two feature vectors.
///
/// Features are accumulated left to right in `f32`, so every execution
/// strategy that goes through this function sees bit-identical distances.
#[inline]
pub fn squared_distance(a: &ArrayView1<f32>, b: &ArrayView1<f32>) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Index of the centroid closest to `point`.
///
/// Comparison is strict, so on an exact tie the first centroid found wins.
#[inline]
pub fn nearest_centroid(point: &ArrayView1<f32>, centroids: &ArrayView2<f32>) -> usize {
    let mut best = 0;
    let mut best_dist = f32::INFINITY;

    for (j, centroid) in centroids.outer_iter().enumerate() {
        let dist = squared_distance(point, &centroid);
        if dist < best_dist {
            best_dist = dist;
            best = j;
        }
    }

    best
}

/// Assign every point of `range` to its nearest centroid.
///
/// Returns the labels for `range` only, in index order.
pub fn assign_range(data: &ArrayView2<f32>, centroids: &Array2<f32>, range: Range<usize>) -> Vec<u16> {
    let centroids = centroids.view();
    range
        .map(|i| nearest_centroid(&data.row(i), &centroids) as u16)
        .collect()
}

/// Data-parallel assignment of all points using the current rayon pool.
pub fn par_assign(data: &ArrayView2<f32>, centroids: &Array2<f32>, labels: &mut [u16]) {
    let centroids = centroids.view();
    labels.par_iter_mut().enumerate().for_each(|(i, label)| {
        *label = nearest_centroid(&data.row(i), &centroids) as u16;
    });
}

/// Collect the indices in `range` whose squared distance to `reference` is
/// at most `eps_sq`. A point is its own neighbor.
pub fn neighbors_within(
    data: &ArrayView2<f32>,
    reference: usize,
    eps_sq: f32,
    range: Range<usize>,
    out: &mut Vec<usize>,
) {
    let center = data.row(reference);
    out.extend(range.filter(|&i| squared_distance(&data.row(i), &center) <= eps_sq));
}

/// Data-parallel neighbor scan over the whole dataset.
///
/// `out` is cleared and refilled in ascending index order.
pub fn par_neighbors_within(
    data: &ArrayView2<f32>,
    reference: usize,
    eps_sq: f32,
    out: &mut Vec<usize>,
) {
    let center = data.row(reference);
    out.clear();
    out.par_extend(
        (0..data.nrows())
            .into_par_iter()
            .filter(|&i| squared_distance(&data.row(i), &center) <= eps_sq),
    );
}

/// Compute centroid shift (sum of L2 norms of centroid movements)
pub fn centroid_shift(old_centroids: &ArrayView2<f32>, new_centroids: &ArrayView2<f32>) -> f64 {
    old_centroids
        .outer_iter()
        .zip(new_centroids.outer_iter())
        .map(|(old_c, new_c)| {
            let mut diff_sq = 0.0f64;
            for j in 0..old_c.len() {
                let d = (new_c[j] - old_c[j]) as f64;
                diff_sq += d * d;
            }
            diff_sq.sqrt()
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_squared_distance() {
        let data = array![[1.0f32, 2.0, 3.0], [4.0, 6.0, 3.0]];
        let dist = squared_distance(&data.row(0), &data.row(1));

        assert_relative_eq!(dist, 9.0 + 16.0, epsilon = 1e-6);
    }

    #[test]
    fn test_nearest_centroid_first_wins_ties() {
        let centroids = array![[0.0f32, 0.0], [10.0, 10.0]];
        let points = array![[0.0f32, 0.0], [10.0, 10.0], [5.0, 5.0]];

        assert_eq!(nearest_centroid(&points.row(0), &centroids.view()), 0);
        assert_eq!(nearest_centroid(&points.row(1), &centroids.view()), 1);
        // (5,5) is equidistant, the first centroid found is kept
        assert_eq!(nearest_centroid(&points.row(2), &centroids.view()), 0);
    }

    #[test]
    fn test_assign_range_matches_parallel() {
        let data = array![[0.0f32], [1.0], [9.0], [10.0], [4.9], [5.1]];
        let centroids = array![[0.0f32], [10.0]];

        let partial = assign_range(&data.view(), &centroids, 2..6);
        assert_eq!(partial, vec![1, 1, 0, 1]);

        let mut labels = vec![0u16; 6];
        par_assign(&data.view(), &centroids, &mut labels);
        assert_eq!(labels, vec![0, 0, 1, 1, 0, 1]);
    }

    #[test]
    fn test_neighbors_within_includes_self() {
        let data = array![[0.0f32, 0.0], [0.5, 0.0], [1.0, 0.0], [3.0, 0.0]];

        let mut out = Vec::new();
        neighbors_within(&data.view(), 0, 1.0, 0..4, &mut out);
        assert_eq!(out, vec![0, 1, 2]);

        let mut par = vec![42];
        par_neighbors_within(&data.view(), 0, 1.0, &mut par);
        assert_eq!(par, out);
    }

    #[test]
    fn test_neighbors_within_respects_range() {
        let data = array![[0.0f32], [0.1], [0.2], [0.3]];

        let mut out = Vec::new();
        neighbors_within(&data.view(), 0, 1.0, 2..4, &mut out);
        assert_eq!(out, vec![2, 3]);
    }

    #[test]
    fn test_centroid_shift() {
        let old = array![[0.0f32, 0.0], [1.0, 1.0]];
        let new = array![[1.0f32, 0.0], [1.0, 1.0]];

        let shift = centroid_shift(&old.view(), &new.view());
        assert_relative_eq!(shift, 1.0, epsilon = 1e-6);
    }
}
