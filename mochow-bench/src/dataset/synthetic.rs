//! Deterministic synthetic datasets with exact ground truth.

use super::{InMemoryDataset, QuerySet};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use std::cmp::Ordering;

pub struct DataGen {
    rng: ChaCha8Rng,
}

impl DataGen {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Unit-length vector with normally distributed components.
    pub fn random_vector(&mut self, dim: usize) -> Vec<f32> {
        let mut v: Vec<f32> = (0..dim).map(|_| self.rng.sample(StandardNormal)).collect();
        crate::runner::l2_normalize(&mut v);
        v
    }

    pub fn random_vectors(&mut self, n: usize, dim: usize) -> Vec<Vec<f32>> {
        (0..n).map(|_| self.random_vector(dim)).collect()
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Ids of the `k` vectors in `base` closest to `query` (L2), nearest first.
/// Ties are broken by id.
pub fn exact_neighbors(base: &[Vec<f32>], query: &[f32], k: usize) -> Vec<i64> {
    let mut scored: Vec<(f32, usize)> = base
        .iter()
        .enumerate()
        .map(|(id, v)| (squared_l2(v, query), id))
        .collect();
    scored.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(Ordering::Equal)
            .then(a.1.cmp(&b.1))
    });
    scored.into_iter().take(k).map(|(_, id)| id as i64).collect()
}

/// `size` base vectors and `queries` query vectors with `k` exact neighbours
/// each, all derived from `seed`.
pub fn synthetic(
    size: usize,
    dim: usize,
    queries: usize,
    k: usize,
    seed: u64,
) -> (InMemoryDataset, QuerySet) {
    let mut gen = DataGen::new(seed);
    let base = gen.random_vectors(size, dim);
    let query_vectors = gen.random_vectors(queries, dim);
    let ground_truth = query_vectors
        .iter()
        .map(|q| exact_neighbors(&base, q, k))
        .collect();
    (
        InMemoryDataset::new(dim, base),
        QuerySet::new(query_vectors, ground_truth),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetSource;

    #[test]
    fn same_seed_same_data() {
        let (a, qa) = synthetic(50, 8, 5, 3, 7);
        let (b, qb) = synthetic(50, 8, 5, 3, 7);
        assert_eq!(a.vectors(), b.vectors());
        assert_eq!(qa.ground_truth, qb.ground_truth);
        assert_eq!(a.total_size(), 50);
        assert_eq!(qa.len(), 5);
    }

    #[test]
    fn base_vector_is_its_own_nearest_neighbor() {
        let (ds, _) = synthetic(20, 4, 0, 0, 1);
        let target = ds.vectors()[13].clone();
        assert_eq!(exact_neighbors(ds.vectors(), &target, 1), vec![13]);
    }

    #[test]
    fn vectors_are_unit_length() {
        let mut gen = DataGen::new(3);
        let v = gen.random_vector(16);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}
