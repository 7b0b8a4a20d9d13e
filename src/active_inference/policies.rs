//! Policy enumeration and multi-action flattening.
//!
//! A policy is a `(policy_len, num_factors)` block of action indices; the
//! full policy set is stored as `(num_policies, policy_len, num_factors)`.
//! When several control factors jointly drive one transition tensor, their
//! action axes are flattened into a single mixed-radix index per tensor and
//! an [`ActionMap`] records how to go back and forth.

use ndarray::{Array3, ArrayD, Axis, IxDyn};

use crate::{
    Error, Result,
    utils::{combination_index, index_to_combination},
};

/// Enumerate every policy over the control factors.
///
/// Non-control factors always take action 0. Policies are ordered like a
/// row-major odometer: the last factor of the last step varies fastest.
///
/// # Examples
///
/// ```
/// use actinf::active_inference::policies::construct_policies;
///
/// let policies = construct_policies(&[2, 3], 1, &[0, 1]);
/// assert_eq!(policies.shape(), &[6, 1, 2]);
/// assert_eq!(policies[[5, 0, 0]], 1);
/// assert_eq!(policies[[5, 0, 1]], 2);
/// ```
pub fn construct_policies(
    num_controls: &[usize],
    policy_len: usize,
    control_fac_idx: &[usize],
) -> Array3<usize> {
    let num_factors = num_controls.len();
    let per_step: Vec<usize> = (0..num_factors)
        .map(|f| {
            if control_fac_idx.contains(&f) {
                num_controls[f]
            } else {
                1
            }
        })
        .collect();
    let dims = per_step.repeat(policy_len);
    let total: usize = dims.iter().product();
    let combos: Vec<Vec<usize>> = (0..total)
        .map(|index| index_to_combination(index, &dims))
        .collect();

    Array3::from_shape_fn((total, policy_len, num_factors), |(p, t, f)| {
        combos[p][t * num_factors + f]
    })
}

/// Mapping between the actions of a group of control factors and the single
/// flat action axis of one transition tensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionMap {
    /// Multi-action factors that drive this tensor, in axis order
    pub multi_dependency: Vec<usize>,
    /// Action counts of `multi_dependency`
    pub multi_dims: Vec<usize>,
}

impl ActionMap {
    pub fn new(multi_dependency: Vec<usize>, num_controls_multi: &[usize]) -> Self {
        let multi_dims = multi_dependency
            .iter()
            .map(|&d| num_controls_multi[d])
            .collect();
        Self {
            multi_dependency,
            multi_dims,
        }
    }

    /// Size of the flat action axis (1 for a group with no action dependency).
    pub fn flat_dim(&self) -> usize {
        self.multi_dims.iter().product()
    }

    /// Flat index of the actions selected by `multi_action` for this group.
    pub fn encode(&self, multi_action: &[usize]) -> usize {
        if self.multi_dependency.is_empty() {
            return 0;
        }
        let values: Vec<usize> = self
            .multi_dependency
            .iter()
            .map(|&d| multi_action[d])
            .collect();
        combination_index(&values, &self.multi_dims)
    }

    /// Write the actions encoded by `flat` into `multi_action`.
    pub fn decode(&self, flat: usize, multi_action: &mut [usize]) {
        if self.multi_dependency.is_empty() {
            return;
        }
        let values = index_to_combination(flat, &self.multi_dims);
        for (&d, value) in self.multi_dependency.iter().zip(values) {
            multi_action[d] = value;
        }
    }
}

/// Collapse the trailing action axes of a batched transition tensor into one.
pub(crate) fn flatten_action_axes(
    b: ArrayD<f64>,
    map: &ActionMap,
    factor: usize,
) -> Result<ArrayD<f64>> {
    if map.multi_dependency.is_empty() {
        let ndim = b.ndim();
        return Ok(b.insert_axis(Axis(ndim)));
    }

    let k = map.multi_dependency.len();
    let shape = b.shape().to_vec();
    if shape.len() < k + 2 || shape[shape.len() - k..] != map.multi_dims[..] {
        return Err(Error::TransitionShapeMismatch {
            tensor: "B",
            factor,
            expected: map.multi_dims.clone(),
            got: shape[shape.len().saturating_sub(k)..].to_vec(),
        });
    }

    let mut target = shape[..shape.len() - k].to_vec();
    target.push(map.flat_dim());
    let b = b.as_standard_layout().into_owned();
    Ok(b.into_shape_with_order(IxDyn(&target))?)
}

/// Translate policies over multi-actions into policies over flat actions.
pub(crate) fn flatten_policies(policies_multi: &Array3<usize>, maps: &[ActionMap]) -> Array3<usize> {
    let (num_policies, policy_len, _) = policies_multi.dim();
    Array3::from_shape_fn((num_policies, policy_len, maps.len()), |(p, t, f)| {
        let row: Vec<usize> = policies_multi
            .index_axis(Axis(0), p)
            .index_axis(Axis(0), t)
            .to_vec();
        maps[f].encode(&row)
    })
}

#[cfg(test)]
mod tests {
    use ndarray::Array;

    use super::*;

    #[test]
    fn non_control_factors_stay_at_zero() {
        let policies = construct_policies(&[3, 4], 2, &[0]);
        assert_eq!(policies.shape(), &[9, 2, 2]);
        assert!(policies.index_axis(Axis(2), 1).iter().all(|&a| a == 0));
    }

    #[test]
    fn policies_enumerate_every_sequence_once() {
        let policies = construct_policies(&[2], 3, &[0]);
        assert_eq!(policies.shape(), &[8, 3, 1]);
        let mut seen: Vec<Vec<usize>> = (0..8)
            .map(|p| policies.index_axis(Axis(0), p).iter().copied().collect())
            .collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 8);
        assert_eq!(
            policies.index_axis(Axis(0), 1).iter().copied().collect::<Vec<_>>(),
            vec![0, 0, 1]
        );
    }

    #[test]
    fn action_map_round_trip() {
        let map = ActionMap::new(vec![0, 2], &[2, 5, 3]);
        assert_eq!(map.flat_dim(), 6);
        for flat in 0..6 {
            let mut multi = vec![0; 3];
            map.decode(flat, &mut multi);
            assert_eq!(map.encode(&multi), flat);
        }
    }

    #[test]
    fn flattening_action_axes_is_row_major() {
        // (batch=1, ns=2, u0=2, u1=3)
        let b = Array::from_shape_fn(IxDyn(&[1, 2, 2, 3]), |idx| {
            (idx[1] * 100 + idx[2] * 10 + idx[3]) as f64
        });
        let map = ActionMap::new(vec![0, 1], &[2, 3]);
        let flat = flatten_action_axes(b.clone(), &map, 0).expect("dims match");
        assert_eq!(flat.shape(), &[1, 2, 6]);
        for u0 in 0..2 {
            for u1 in 0..3 {
                let idx = map.encode(&[u0, u1]);
                assert_eq!(flat[[0, 1, idx]], b[[0, 1, u0, u1]]);
            }
        }
    }

    #[test]
    fn flattening_rejects_wrong_action_dims() {
        let b = ArrayD::<f64>::zeros(IxDyn(&[1, 2, 4]));
        let map = ActionMap::new(vec![0], &[3]);
        let err = flatten_action_axes(b, &map, 1).unwrap_err();
        assert!(err.is_structural_mismatch());
    }
}
