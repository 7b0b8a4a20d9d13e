//! Batched beliefs over hidden-state factors.
//!
//! A [`Beliefs`] value holds one `(batch, num_states[f])` matrix per factor.
//! Each row is a categorical distribution for one agent in the batch. Beliefs
//! are transient values produced by inference and prediction; the agent never
//! stores them.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Beliefs {
    factors: Vec<Array2<f64>>,
}

impl Beliefs {
    /// Wrap per-factor `(batch, num_states)` matrices. All factors must share
    /// the same batch size.
    pub fn new(factors: Vec<Array2<f64>>) -> Result<Self> {
        let Some(first) = factors.first() else {
            return Err(Error::config("beliefs need at least one factor"));
        };
        let batch = first.nrows();
        for factor in &factors {
            if factor.nrows() != batch {
                return Err(Error::LengthMismatch {
                    what: "belief batch rows".to_string(),
                    expected: batch,
                    got: factor.nrows(),
                });
            }
        }
        Ok(Self { factors })
    }

    /// Wrap matrices already known to share a batch size.
    pub(crate) fn from_matrices(factors: Vec<Array2<f64>>) -> Self {
        Self { factors }
    }

    /// Uniform beliefs for every factor.
    pub fn uniform(batch_size: usize, num_states: &[usize]) -> Self {
        let factors = num_states
            .iter()
            .map(|&n| Array2::from_elem((batch_size, n), 1.0 / n as f64))
            .collect();
        Self { factors }
    }

    /// Repeat a single agent's beliefs across `batch_size` rows.
    pub fn broadcast(single: &[Array1<f64>], batch_size: usize) -> Self {
        let factors = single
            .iter()
            .map(|q| Array2::from_shape_fn((batch_size, q.len()), |(_, s)| q[s]))
            .collect();
        Self { factors }
    }

    /// Stack per-batch-element factor vectors back into batched matrices.
    ///
    /// `slices[b][f]` is the belief of batch element `b` over factor `f`.
    pub(crate) fn from_batch_slices(slices: &[Vec<Array1<f64>>]) -> Self {
        let num_factors = slices.first().map(Vec::len).unwrap_or(0);
        let factors = (0..num_factors)
            .map(|f| {
                let n = slices[0][f].len();
                Array2::from_shape_fn((slices.len(), n), |(b, s)| slices[b][f][s])
            })
            .collect();
        Self { factors }
    }

    pub fn num_factors(&self) -> usize {
        self.factors.len()
    }

    pub fn batch_size(&self) -> usize {
        self.factors.first().map(|f| f.nrows()).unwrap_or(0)
    }

    /// State counts implied by the stored matrices.
    pub fn num_states(&self) -> Vec<usize> {
        self.factors.iter().map(|f| f.ncols()).collect()
    }

    /// Batched belief over factor `f`.
    pub fn factor(&self, f: usize) -> ArrayView2<'_, f64> {
        self.factors[f].view()
    }

    pub fn factors(&self) -> &[Array2<f64>] {
        &self.factors
    }

    pub fn into_factors(self) -> Vec<Array2<f64>> {
        self.factors
    }

    /// Per-factor beliefs of a single batch element.
    pub fn slice(&self, batch: usize) -> Vec<ArrayView1<'_, f64>> {
        self.factors
            .iter()
            .map(|f| f.index_axis(Axis(0), batch))
            .collect()
    }

    /// True when every row of every factor sums to one within `tolerance`.
    pub fn is_normalized(&self, tolerance: f64) -> bool {
        self.factors.iter().all(|factor| {
            factor
                .sum_axis(Axis(1))
                .iter()
                .all(|total| (total - 1.0).abs() <= tolerance)
        })
    }
}
