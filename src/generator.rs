use ndarray::{Array2, ArrayView2};
use ndarray_rand::rand_distr::StandardNormal;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Scale of blob centers around the origin.
const CENTER_SCALE: f32 = 10.0;
/// Scale of the per-feature spread of a blob.
const SPREAD_SCALE: f32 = 2.5;

/// Synthetic dataset with its ground-truth blob membership
#[derive(Debug, Clone)]
pub struct GeneratedDataset {
    /// Points in rows, features in columns
    pub data: Array2<f32>,
    /// Index of the blob each row was drawn from
    pub membership: Vec<usize>,
}

impl GeneratedDataset {
    pub fn len(&self) -> usize {
        self.data.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.data.nrows() == 0
    }

    pub fn features(&self) -> usize {
        self.data.ncols()
    }
}

/// Gaussian blob generator.
///
/// Rows are shuffled after generation so that blob membership is not
/// correlated with the row index.
pub struct DataSetGenerator {
    rng: ChaCha8Rng,
}

impl DataSetGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: ChaCha8Rng::from_entropy(),
        }
    }

    /// One blob per entry of `cluster_sizes`, with random center and spread.
    ///
    /// Each blob draws a center with `N(0, 10²)` coordinates and a spread of
    /// `N(0, 2.5²)` per feature; its points are `center + N(0, 1) * spread`.
    pub fn random_blobs(&mut self, cluster_sizes: &[usize], features: usize) -> GeneratedDataset {
        let k = cluster_sizes.len();
        let mut centers = Array2::zeros((k, features));
        let mut spreads = Array2::zeros((k, features));

        for c in 0..k {
            for f in 0..features {
                centers[[c, f]] = self.normal() * CENTER_SCALE;
                spreads[[c, f]] = self.normal() * SPREAD_SCALE;
            }
        }

        self.sample(&centers.view(), &spreads.view(), cluster_sizes)
    }

    /// Blobs around fixed centers with the same isotropic spread.
    pub fn blobs_around(
        &mut self,
        centers: &ArrayView2<f32>,
        cluster_sizes: &[usize],
        spread: f32,
    ) -> GeneratedDataset {
        assert_eq!(
            centers.nrows(),
            cluster_sizes.len(),
            "one cluster size per center"
        );
        let spreads = Array2::from_elem(centers.dim(), spread);
        self.sample(centers, &spreads.view(), cluster_sizes)
    }

    fn sample(
        &mut self,
        centers: &ArrayView2<f32>,
        spreads: &ArrayView2<f32>,
        cluster_sizes: &[usize],
    ) -> GeneratedDataset {
        let features = centers.ncols();
        let total: usize = cluster_sizes.iter().sum();

        let mut order: Vec<(usize, usize)> = cluster_sizes
            .iter()
            .enumerate()
            .flat_map(|(c, &size)| (0..size).map(move |i| (c, i)))
            .collect();
        order.shuffle(&mut self.rng);

        let mut data = Array2::zeros((total, features));
        let mut membership = Vec::with_capacity(total);

        for (mut row, &(c, _)) in data.outer_iter_mut().zip(&order) {
            for f in 0..features {
                row[f] = centers[[c, f]] + self.normal() * spreads[[c, f]];
            }
            membership.push(c);
        }

        GeneratedDataset { data, membership }
    }

    #[inline]
    fn normal(&mut self) -> f32 {
        self.rng.sample(StandardNormal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_random_blobs_shape() {
        let mut gen = DataSetGenerator::new(42);
        let dataset = gen.random_blobs(&[128, 256, 64], 4);

        assert_eq!(dataset.len(), 448);
        assert_eq!(dataset.features(), 4);
        assert_eq!(dataset.membership.len(), 448);

        for c in 0..3 {
            let expected = [128, 256, 64][c];
            assert_eq!(dataset.membership.iter().filter(|&&m| m == c).count(), expected);
        }
    }

    #[test]
    fn test_seed_is_reproducible() {
        let a = DataSetGenerator::new(7).random_blobs(&[50, 50], 2);
        let b = DataSetGenerator::new(7).random_blobs(&[50, 50], 2);
        let c = DataSetGenerator::new(8).random_blobs(&[50, 50], 2);

        assert_eq!(a.data, b.data);
        assert_eq!(a.membership, b.membership);
        assert_ne!(a.data, c.data);
    }

    #[test]
    fn test_rows_are_shuffled() {
        let dataset = DataSetGenerator::new(1).random_blobs(&[100, 100], 2);
        let leading_first_blob = dataset.membership[..100].iter().filter(|&&m| m == 0).count();

        assert!(leading_first_blob < 100);
    }

    #[test]
    fn test_blobs_around_centers() {
        let centers = array![[0.0f32, 0.0], [50.0, 50.0]];
        let dataset = DataSetGenerator::new(3).blobs_around(&centers.view(), &[400, 400], 0.5);

        for c in 0..2 {
            let rows: Vec<usize> = (0..dataset.len())
                .filter(|&i| dataset.membership[i] == c)
                .collect();
            let mean_x = rows.iter().map(|&i| dataset.data[[i, 0]]).sum::<f32>() / rows.len() as f32;
            assert_abs_diff_eq!(mean_x, centers[[c, 0]], epsilon = 0.2);
        }
    }

    #[test]
    fn test_empty_request() {
        let dataset = DataSetGenerator::new(0).random_blobs(&[], 3);
        assert!(dataset.is_empty());
    }
}
