//! Truncated SVD by subspace iteration.
//!
//! Only `rank` directions are ever iterated, so the cost is
//! `O(iterations * customers * products * rank)` rather than a full decomposition.
//! Each step orthonormalizes with a QR factorization and rotates the basis with a
//! `rank x rank` symmetric eigendecomposition.

use nalgebra::{DMatrix, DVector, SymmetricEigen};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::matrix::InteractionMatrix;

const RANDOM_SEED: u64 = 42;
const MAX_ITERATIONS: usize = 500;
const CONVERGENCE_TOLERANCE: f64 = 1e-10;

/// Rank-k decomposition `A ~ U * diag(sigma) * V^T`.
#[derive(Clone, Debug, PartialEq)]
pub struct LatentFactorModel {
    customer_factors: Array2<f64>,
    singular_values: Array1<f64>,
    product_factors: Array2<f64>,
    iterations: usize,
}

impl LatentFactorModel {
    pub fn rank(&self) -> usize {
        self.singular_values.len()
    }

    /// `customers x rank`
    pub fn customer_factors(&self) -> ArrayView2<'_, f64> {
        self.customer_factors.view()
    }

    /// Descending.
    pub fn singular_values(&self) -> ArrayView1<'_, f64> {
        self.singular_values.view()
    }

    /// `products x rank`
    pub fn product_factors(&self) -> ArrayView2<'_, f64> {
        self.product_factors.view()
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn predict(&self, customer: usize, product: usize) -> f64 {
        self.customer_factors
            .row(customer)
            .iter()
            .zip(self.singular_values.iter())
            .zip(self.product_factors.row(product).iter())
            .map(|((u, sigma), v)| u * sigma * v)
            .sum()
    }

    /// Row `customer` of the reconstructed affinity matrix.
    pub fn predict_row(&self, customer: usize) -> Array1<f64> {
        let weighted = &self.customer_factors.row(customer) * &self.singular_values;
        self.product_factors.dot(&weighted)
    }

    pub fn reconstruct(&self) -> Array2<f64> {
        let weighted = &self.customer_factors * &self.singular_values.view().insert_axis(Axis(0));
        weighted.dot(&self.product_factors.t())
    }

    /// Frobenius norm of `A - A_hat`.
    pub fn reconstruction_error(&self, matrix: &InteractionMatrix) -> f64 {
        let residual = &matrix.values() - &self.reconstruct();
        residual.iter().map(|value| value * value).sum::<f64>().sqrt()
    }
}

/// Clamps a requested rank into `1..=min(customers, products) - 1`, never exceeding
/// `min(customers, products)` itself when that bound is already 1.
pub fn effective_rank(requested: usize, customers: usize, products: usize) -> usize {
    let smallest = customers.min(products);
    requested.min(smallest.saturating_sub(1)).max(1).min(smallest)
}

/// Factorizes the interaction matrix at `rank` (clamped with [`effective_rank`]).
pub fn factorize(matrix: &InteractionMatrix, rank: usize) -> LatentFactorModel {
    let values = matrix.values();
    let (customers, products) = values.dim();
    let rank = effective_rank(rank, customers, products);
    truncated_svd(values, rank)
}

pub fn truncated_svd(matrix: ArrayView2<'_, f64>, rank: usize) -> LatentFactorModel {
    let (rows, columns) = matrix.dim();
    let rank = rank.min(rows).min(columns);
    if rank == 0 {
        return LatentFactorModel {
            customer_factors: Array2::zeros((rows, 0)),
            singular_values: Array1::zeros(0),
            product_factors: Array2::zeros((columns, 0)),
            iterations: 0,
        };
    }

    let a = DMatrix::from_fn(rows, columns, |row, column| matrix[[row, column]]);
    let mut rng = StdRng::seed_from_u64(RANDOM_SEED);
    let start = DMatrix::from_fn(columns, rank, |_, _| rng.gen_range(-1.0..1.0));
    let mut basis = orthonormal_basis(start);

    let mut singular_values = DVector::<f64>::zeros(rank);
    let mut iterations = 0;

    while iterations < MAX_ITERATIONS {
        iterations += 1;

        let expanded = orthonormal_basis(a.transpose() * (&a * &basis));

        // Rayleigh-Ritz: rotate the basis onto the eigenvectors of B^T B.
        let projected = &a * &expanded;
        let (eigenvalues, rotation) = ranked_eigen(projected.transpose() * &projected);
        basis = expanded * rotation;

        let next = eigenvalues.map(|value| value.max(0.0).sqrt());
        let delta = (&next - &singular_values).amax();
        let scale = next.iter().copied().fold(1.0_f64, f64::max);
        singular_values = next;

        if delta <= CONVERGENCE_TOLERANCE * scale {
            break;
        }
    }

    let scaled = &a * &basis;
    let customer_factors = Array2::from_shape_fn((rows, rank), |(row, component)| {
        let sigma = singular_values[component];
        if sigma > CONVERGENCE_TOLERANCE {
            scaled[(row, component)] / sigma
        } else {
            0.0
        }
    });

    LatentFactorModel {
        customer_factors,
        singular_values: singular_values.iter().copied().collect(),
        product_factors: Array2::from_shape_fn((columns, rank), |(product, component)| {
            basis[(product, component)]
        }),
        iterations,
    }
}

/// Thin `Q` of a QR factorization: orthonormal columns spanning `matrix`.
fn orthonormal_basis(matrix: DMatrix<f64>) -> DMatrix<f64> {
    matrix.qr().q()
}

/// Eigenvalues of a symmetric matrix in descending order, eigenvectors as matching columns.
fn ranked_eigen(matrix: DMatrix<f64>) -> (DVector<f64>, DMatrix<f64>) {
    let eigen = SymmetricEigen::new(matrix);
    let mut order: Vec<usize> = (0..eigen.eigenvalues.len()).collect();
    order.sort_by(|left, right| eigen.eigenvalues[*right].total_cmp(&eigen.eigenvalues[*left]));

    let eigenvalues =
        DVector::from_iterator(order.len(), order.iter().map(|&index| eigen.eigenvalues[index]));
    let eigenvectors = eigen.eigenvectors.select_columns(&order);
    (eigenvalues, eigenvectors)
}
