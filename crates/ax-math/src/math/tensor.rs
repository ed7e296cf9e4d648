//! Dense row-major matrices and the 3-axis transition tensor.
//!
//! These types carry the generative-model factors: the observation
//! likelihood `A` is an `O x S` matrix whose columns are distributions
//! over observations, and the transition tensor `B` stacks one `S x S`
//! column-stochastic matrix per action.

use serde::{Deserialize, Serialize};

use super::stable::EPS;

/// Tolerance for stochasticity checks.
pub const STOCHASTIC_TOL: f64 = 1e-6;

/// Dense row-major matrix of f64.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// All-zero matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Matrix {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Column-stochastic matrix with uniform columns.
    pub fn uniform_stochastic(rows: usize, cols: usize) -> Self {
        let mut m = Matrix::zeros(rows, cols);
        if rows > 0 {
            let p = 1.0 / rows as f64;
            m.data.fill(p);
        }
        m
    }

    /// Build from row vectors. Returns None when rows are ragged or empty.
    pub fn from_rows(rows: &[Vec<f64>]) -> Option<Self> {
        let nrows = rows.len();
        let ncols = rows.first()?.len();
        if ncols == 0 || rows.iter().any(|r| r.len() != ncols) {
            return None;
        }
        let mut data = Vec::with_capacity(nrows * ncols);
        for r in rows {
            data.extend_from_slice(r);
        }
        Some(Matrix {
            rows: nrows,
            cols: ncols,
            data,
        })
    }

    /// Build from a flat row-major slice.
    pub fn from_row_major(rows: usize, cols: usize, data: Vec<f64>) -> Option<Self> {
        if data.len() != rows * cols || rows == 0 || cols == 0 {
            return None;
        }
        Some(Matrix { rows, cols, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn get(&self, r: usize, c: usize) -> f64 {
        self.data[r * self.cols + c]
    }

    #[inline]
    pub fn set(&mut self, r: usize, c: usize, value: f64) {
        self.data[r * self.cols + c] = value;
    }

    /// Borrow row `r` as a slice.
    pub fn row(&self, r: usize) -> &[f64] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// Copy column `c` out as a vector.
    pub fn col(&self, c: usize) -> Vec<f64> {
        (0..self.rows).map(|r| self.get(r, c)).collect()
    }

    /// Matrix-vector product `self * v`.
    ///
    /// Returns None on a length mismatch.
    pub fn matvec(&self, v: &[f64]) -> Option<Vec<f64>> {
        if v.len() != self.cols {
            return None;
        }
        let mut out = vec![0.0; self.rows];
        for r in 0..self.rows {
            let row = self.row(r);
            let mut acc = 0.0;
            for (a, b) in row.iter().zip(v.iter()) {
                acc += a * b;
            }
            out[r] = acc;
        }
        Some(out)
    }

    /// All entries finite and non-negative.
    pub fn is_nonnegative_finite(&self) -> bool {
        self.data.iter().all(|x| x.is_finite() && *x >= 0.0)
    }

    /// Every column sums to 1 within `tol`.
    pub fn is_column_stochastic(&self, tol: f64) -> bool {
        if !self.is_nonnegative_finite() {
            return false;
        }
        (0..self.cols).all(|c| {
            let sum: f64 = (0..self.rows).map(|r| self.get(r, c)).sum();
            (sum - 1.0).abs() <= tol
        })
    }

    /// Index of the first column whose sum deviates from 1 by more than
    /// `tol`, if any. Used for invariant-violation reporting.
    pub fn first_bad_column(&self, tol: f64) -> Option<(usize, f64)> {
        for c in 0..self.cols {
            if (0..self.rows).any(|r| {
                let x = self.get(r, c);
                !x.is_finite() || x < 0.0
            }) {
                return Some((c, f64::NAN));
            }
            let sum: f64 = (0..self.rows).map(|r| self.get(r, c)).sum();
            if (sum - 1.0).abs() > tol {
                return Some((c, sum));
            }
        }
        None
    }

    /// Normalize every column to sum to 1, flooring entries at [`EPS`].
    ///
    /// Columns that sum to zero become uniform.
    pub fn normalize_columns(&mut self) {
        for c in 0..self.cols {
            let sum: f64 = (0..self.rows).map(|r| self.get(r, c)).sum();
            if sum > 0.0 && sum.is_finite() {
                for r in 0..self.rows {
                    let v = (self.get(r, c) / sum).max(EPS);
                    self.set(r, c, v);
                }
                let sum2: f64 = (0..self.rows).map(|r| self.get(r, c)).sum();
                for r in 0..self.rows {
                    let v = self.get(r, c) / sum2;
                    self.set(r, c, v);
                }
            } else {
                let p = 1.0 / self.rows as f64;
                for r in 0..self.rows {
                    self.set(r, c, p);
                }
            }
        }
    }

    /// Flat row-major view.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Mutable flat row-major view.
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }
}

/// Stack of per-action transition matrices: `B[s_next, s, u]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor3 {
    states: usize,
    actions: usize,
    slices: Vec<Matrix>,
}

impl Tensor3 {
    /// Identity transitions for every action.
    pub fn identity(states: usize, actions: usize) -> Self {
        let mut eye = Matrix::zeros(states, states);
        for s in 0..states {
            eye.set(s, s, 1.0);
        }
        Tensor3 {
            states,
            actions,
            slices: vec![eye; actions],
        }
    }

    /// Uniform transitions for every action.
    pub fn uniform_stochastic(states: usize, actions: usize) -> Self {
        Tensor3 {
            states,
            actions,
            slices: vec![Matrix::uniform_stochastic(states, states); actions],
        }
    }

    /// Build from one `S x S` matrix per action. Returns None when the
    /// slices disagree on shape or the list is empty.
    pub fn from_slices(slices: Vec<Matrix>) -> Option<Self> {
        let first = slices.first()?;
        let states = first.rows();
        if first.cols() != states {
            return None;
        }
        if slices.iter().any(|m| m.rows() != states || m.cols() != states) {
            return None;
        }
        Some(Tensor3 {
            states,
            actions: slices.len(),
            slices,
        })
    }

    pub fn states(&self) -> usize {
        self.states
    }

    pub fn actions(&self) -> usize {
        self.actions
    }

    /// The `S x S` transition matrix for action `u`.
    pub fn slice(&self, u: usize) -> &Matrix {
        &self.slices[u]
    }

    /// Mutable transition matrix for action `u`.
    pub fn slice_mut(&mut self, u: usize) -> &mut Matrix {
        &mut self.slices[u]
    }

    /// Every per-action slice is column stochastic within `tol`.
    pub fn is_column_stochastic(&self, tol: f64) -> bool {
        self.slices.iter().all(|m| m.is_column_stochastic(tol))
    }

    /// First (action, column, sum) triple violating stochasticity.
    pub fn first_bad_column(&self, tol: f64) -> Option<(usize, usize, f64)> {
        for (u, m) in self.slices.iter().enumerate() {
            if let Some((c, sum)) = m.first_bad_column(tol) {
                return Some((u, c, sum));
            }
        }
        None
    }

    /// Propagate a belief through action `u`: `b' = B[:,:,u] * b`.
    pub fn propagate(&self, u: usize, belief: &[f64]) -> Option<Vec<f64>> {
        self.slices.get(u)?.matvec(belief)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn shift_right(states: usize) -> Matrix {
        // Column s maps to state s+1 (clamped at the boundary).
        let mut m = Matrix::zeros(states, states);
        for s in 0..states {
            let next = (s + 1).min(states - 1);
            m.set(next, s, 1.0);
        }
        m
    }

    #[test]
    fn from_rows_rejects_ragged() {
        assert!(Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0]]).is_none());
    }

    #[test]
    fn matvec_matches_hand_computation() {
        let m = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(m.matvec(&[1.0, 1.0]).unwrap(), vec![3.0, 7.0]);
    }

    #[test]
    fn uniform_stochastic_passes_check() {
        let m = Matrix::uniform_stochastic(3, 5);
        assert!(m.is_column_stochastic(STOCHASTIC_TOL));
    }

    #[test]
    fn bad_column_is_reported() {
        let mut m = Matrix::uniform_stochastic(3, 3);
        m.set(0, 1, 0.9);
        let (col, _) = m.first_bad_column(STOCHASTIC_TOL).unwrap();
        assert_eq!(col, 1);
    }

    #[test]
    fn normalize_columns_fixes_scale() {
        let mut m = Matrix::from_rows(&[vec![2.0, 0.0], vec![2.0, 0.0]]).unwrap();
        m.normalize_columns();
        assert!(m.is_column_stochastic(STOCHASTIC_TOL));
        // Zero column becomes uniform.
        assert!((m.get(0, 1) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn tensor_propagate_shifts_mass() {
        let b = Tensor3::from_slices(vec![shift_right(4)]).unwrap();
        let belief = vec![1.0, 0.0, 0.0, 0.0];
        let next = b.propagate(0, &belief).unwrap();
        assert_eq!(next, vec![0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn tensor_identity_is_stochastic() {
        let b = Tensor3::identity(5, 3);
        assert!(b.is_column_stochastic(STOCHASTIC_TOL));
    }

    proptest! {
        #[test]
        fn normalized_columns_always_stochastic(
            rows in 1usize..6,
            cols in 1usize..6,
            seed in proptest::collection::vec(0.0f64..10.0, 36),
        ) {
            let data: Vec<f64> = seed.iter().cloned().take(rows * cols).collect();
            prop_assume!(data.len() == rows * cols);
            let mut m = Matrix::from_row_major(rows, cols, data).unwrap();
            m.normalize_columns();
            prop_assert!(m.is_column_stochastic(STOCHASTIC_TOL));
        }

        #[test]
        fn propagate_preserves_total_mass(
            states in 2usize..6,
            mass in proptest::collection::vec(0.01f64..1.0, 6),
        ) {
            let mut belief: Vec<f64> = mass.iter().cloned().take(states).collect();
            prop_assume!(belief.len() == states);
            let sum: f64 = belief.iter().sum();
            for b in belief.iter_mut() {
                *b /= sum;
            }
            let b = Tensor3::uniform_stochastic(states, 2);
            let next = b.propagate(1, &belief).unwrap();
            let next_sum: f64 = next.iter().sum();
            prop_assert!((next_sum - 1.0).abs() < 1e-9);
        }
    }
}
