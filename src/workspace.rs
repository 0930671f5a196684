//! Local work blocks.
//!
//! Each assembly call fills a small dense patch together with the global row
//! (and column) indices it maps to. The patch never outlives the call; the
//! assembler scatters it and drops it.

use crate::prelude::*;

/// Residual contribution of one element.
#[derive(Debug, Clone, PartialEq)]
pub struct SubVector {
    rows: Vec<usize>,
    values: VectorD,
}

impl SubVector {
    pub fn new(num_rows: usize) -> Self {
        SubVector {
            rows: vec![0; num_rows],
            values: VectorD::zeros(num_rows),
        }
    }

    pub fn empty() -> Self {
        Self::new(0)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    pub fn values(&self) -> &VectorD {
        &self.values
    }

    pub fn put_row_index(&mut self, i: usize, row: usize) {
        self.rows[i] = row;
    }

    /// Maps `count` consecutive local rows starting at `i` to consecutive
    /// global rows starting at `first`.
    pub fn put_rows(&mut self, i: usize, first: usize, count: usize) {
        for k in 0..count {
            self.rows[i + k] = first + k;
        }
    }

    pub fn put_coef(&mut self, i: usize, value: f64) {
        self.values[i] = value;
    }

    pub fn add3(&mut self, i: usize, value: &Vector3) {
        self.values.fixed_rows_mut::<3>(i).add_assign(value);
    }

    /// Value at a global row, summing duplicated rows.
    pub fn at(&self, row: usize) -> f64 {
        self.rows
            .iter()
            .zip(self.values.iter())
            .filter(|(&r, _)| r == row)
            .map(|(_, &v)| v)
            .sum()
    }

    /// Adds the block into a global vector.
    pub fn scatter(&self, global: &mut VectorD) {
        for (&r, &v) in self.rows.iter().zip(self.values.iter()) {
            global[r] += v;
        }
    }
}

/// Jacobian contribution of one element.
#[derive(Debug, Clone, PartialEq)]
pub struct SubMatrix {
    rows: Vec<usize>,
    cols: Vec<usize>,
    data: MatrixD,
}

impl SubMatrix {
    pub fn new(num_rows: usize, num_cols: usize) -> Self {
        SubMatrix {
            rows: vec![0; num_rows],
            cols: vec![0; num_cols],
            data: MatrixD::zeros(num_rows, num_cols),
        }
    }

    pub fn empty() -> Self {
        Self::new(0, 0)
    }

    /// Patch dimension, (rows, cols).
    pub fn dims(&self) -> (usize, usize) {
        (self.rows.len(), self.cols.len())
    }

    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    pub fn cols(&self) -> &[usize] {
        &self.cols
    }

    pub fn data(&self) -> &MatrixD {
        &self.data
    }

    pub fn put_row_index(&mut self, i: usize, row: usize) {
        self.rows[i] = row;
    }

    pub fn put_col_index(&mut self, j: usize, col: usize) {
        self.cols[j] = col;
    }

    pub fn put_rows(&mut self, i: usize, first: usize, count: usize) {
        for k in 0..count {
            self.rows[i + k] = first + k;
        }
    }

    pub fn put_cols(&mut self, j: usize, first: usize, count: usize) {
        for k in 0..count {
            self.cols[j + k] = first + k;
        }
    }

    pub fn put_coef(&mut self, i: usize, j: usize, value: f64) {
        self.data[(i, j)] = value;
    }

    pub fn add3x3(&mut self, i: usize, j: usize, m: &Matrix3) {
        self.data.fixed_view_mut::<3, 3>(i, j).add_assign(m);
    }

    /// Adds `v` as a column segment starting at `(i, j)`.
    pub fn add_col3(&mut self, i: usize, j: usize, v: &Vector3) {
        self.data.fixed_view_mut::<3, 1>(i, j).add_assign(v);
    }

    /// Adds `v` as a row segment starting at `(i, j)`.
    pub fn add_row3(&mut self, i: usize, j: usize, v: &Vector3) {
        self.data
            .fixed_view_mut::<1, 3>(i, j)
            .add_assign(&v.transpose());
    }

    /// Entry at global coordinates, summing duplicated rows and columns.
    pub fn at(&self, row: usize, col: usize) -> f64 {
        let mut value = 0.;
        for (i, &r) in self.rows.iter().enumerate() {
            if r != row {
                continue;
            }
            for (j, &c) in self.cols.iter().enumerate() {
                if c == col {
                    value += self.data[(i, j)];
                }
            }
        }
        value
    }

    /// Non-zero entries as global triplets.
    pub fn triplets(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.rows.iter().enumerate().flat_map(move |(i, &r)| {
            self.cols
                .iter()
                .enumerate()
                .map(move |(j, &c)| (r, c, self.data[(i, j)]))
                .filter(|&(_, _, v)| v != 0.)
        })
    }
}

//------------------------------------------------------------------------------
// Testing
//------------------------------------------------------------------------------
