//! Tests for action selection and multi-action factors

mod common;

use actinf::{ActionSelection, Agent, AgentConfig, Error, SamplingMode};
use common::{goto_transition, identity_likelihood, rng};
use ndarray::{Array, Array2, IxDyn, array};
use rand::RngCore;

fn stochastic_agent(batch_size: usize, mode: SamplingMode) -> Agent {
    Agent::builder(vec![identity_likelihood(3)], vec![goto_transition(3)])
        .batch_size(batch_size)
        .config(
            AgentConfig::default()
                .with_alpha(1.0)
                .with_action_selection(ActionSelection::Stochastic)
                .with_sampling_mode(mode),
        )
        .build()
        .expect("valid model")
}

/// Two binary state factors driven by two binary control factors. Factor 0
/// moves to the state named by control 0 whatever control 1 does; factor 1
/// follows control 1.
fn multi_action_agent(mode: SamplingMode) -> Agent {
    let b0 = Array::from_shape_fn(IxDyn(&[2, 2, 2, 2]), |idx| {
        if idx[0] == idx[2] { 1.0 } else { 0.0 }
    });
    Agent::builder(vec![identity_likelihood(2)], vec![b0, goto_transition(2)])
        .a_dependencies(vec![vec![0]])
        .b_action_dependencies(vec![vec![0, 1], vec![1]])
        .num_controls(vec![2, 2])
        .config(AgentConfig::default().with_sampling_mode(mode))
        .build()
        .expect("valid multi-action model")
}

#[test]
fn deterministic_full_mode_takes_the_best_policy() {
    let agent = Agent::builder(vec![identity_likelihood(3)], vec![goto_transition(3)])
        .build()
        .expect("valid model");

    let sample = agent
        .sample_action(&array![[0.2, 0.5, 0.3]], None)
        .expect("no randomness needed");

    assert_eq!(sample.action, array![[1]]);
    assert_eq!(sample.probabilities[0], array![[0.2, 0.5, 0.3]]);
}

#[test]
fn deterministic_marginal_mode_takes_each_factor_mode() {
    let agent = Agent::builder(
        vec![identity_likelihood(2)],
        vec![goto_transition(2), goto_transition(3)],
    )
    .a_dependencies(vec![vec![0]])
    .config(AgentConfig::default().with_sampling_mode(SamplingMode::Marginal))
    .build()
    .expect("valid model");
    assert_eq!(agent.structure().num_policies(), 6);

    // Policy order: (0,0) (0,1) (0,2) (1,0) (1,1) (1,2)
    let q_pi = array![[0.0, 0.3, 0.0, 0.1, 0.0, 0.6]];
    let sample = agent.sample_action(&q_pi, None).expect("selection");

    assert_eq!(sample.action, array![[1, 2]]);
    assert!((sample.probabilities[0][[0, 1]] - 0.7).abs() < 1e-12);
    assert!((sample.probabilities[1][[0, 1]] - 0.3).abs() < 1e-12);
}

#[test]
fn stochastic_selection_without_random_source_fails() {
    let agent = stochastic_agent(1, SamplingMode::Full);
    let err = agent
        .sample_action(&array![[0.2, 0.5, 0.3]], None)
        .unwrap_err();
    assert!(matches!(err, Error::MissingRandomSource));
}

#[test]
fn same_seed_reproduces_the_same_actions() {
    let agent = stochastic_agent(32, SamplingMode::Marginal);
    let q_pi = Array2::from_shape_fn((32, 3), |(_, p)| [0.2, 0.3, 0.5][p]);

    let mut first = rng(7);
    let mut second = rng(7);
    let a = agent
        .sample_action(&q_pi, Some(&mut first as &mut dyn RngCore))
        .expect("sampling");
    let b = agent
        .sample_action(&q_pi, Some(&mut second as &mut dyn RngCore))
        .expect("sampling");

    assert_eq!(a.action, b.action);
}

#[test]
fn different_seeds_draw_different_actions() {
    let agent = stochastic_agent(64, SamplingMode::Full);
    let q_pi = Array2::from_elem((64, 3), 1.0 / 3.0);

    let mut first = rng(1);
    let mut second = rng(2);
    let a = agent
        .sample_action(&q_pi, Some(&mut first as &mut dyn RngCore))
        .expect("sampling");
    let b = agent
        .sample_action(&q_pi, Some(&mut second as &mut dyn RngCore))
        .expect("sampling");

    assert_ne!(a.action, b.action);
}

#[test]
fn stochastic_frequencies_follow_the_policy_posterior() {
    let batch = 4000;
    let agent = stochastic_agent(batch, SamplingMode::Full);
    let q_pi = Array2::from_shape_fn((batch, 3), |(_, p)| [0.2, 0.3, 0.5][p]);
    let mut rng = rng(99);

    let sample = agent
        .sample_action(&q_pi, Some(&mut rng as &mut dyn RngCore))
        .expect("sampling");

    let mut counts = [0usize; 3];
    for &a in sample.action.iter() {
        counts[a] += 1;
    }
    for (count, expected) in counts.iter().zip([0.2, 0.3, 0.5]) {
        let frequency = *count as f64 / batch as f64;
        assert!(
            (frequency - expected).abs() < 0.05,
            "frequency {frequency} vs {expected}"
        );
    }
}

#[test]
fn multi_action_models_force_full_sampling() {
    let agent = multi_action_agent(SamplingMode::Marginal);
    let structure = agent.structure();

    assert_eq!(structure.config.sampling_mode, SamplingMode::Full);
    assert_eq!(structure.num_controls, vec![4, 2]);
    assert_eq!(structure.num_controls_multi, vec![2, 2]);
    assert_eq!(structure.control_fac_idx, vec![0, 1]);
    assert_eq!(structure.num_policies(), 4);
    assert_eq!(agent.model().b[0].shape(), &[1, 2, 2, 4]);
}

#[test]
fn multi_actions_round_trip_through_flat_actions() {
    let agent = multi_action_agent(SamplingMode::Full);
    let multi: Array2<usize> = array![[1, 0]];

    let flat = agent.encode_multi_actions(&multi).expect("in range");
    assert_eq!(flat, array![[2, 0]]);
    let decoded = agent.decode_multi_actions(&flat).expect("in range");
    assert_eq!(decoded, multi);
}

#[test]
fn sampled_flat_actions_decode_to_the_chosen_policy() {
    let agent = multi_action_agent(SamplingMode::Full);
    let q_pi = array![[0.1, 0.2, 0.3, 0.4]];

    let sample = agent.sample_action(&q_pi, None).expect("selection");
    assert_eq!(sample.action, array![[3, 1]]);
    let multi = agent
        .decode_multi_actions(&sample.action)
        .expect("decodable");
    assert_eq!(multi, array![[1, 1]]);

    let predicted = agent
        .infer_empirical_prior(&sample.action, &agent.initial_prior())
        .expect("prediction");
    assert!((predicted.factor(0)[[0, 1]] - 1.0).abs() < 1e-12);
    assert!((predicted.factor(1)[[0, 1]] - 1.0).abs() < 1e-12);
}

#[test]
fn multiaction_probabilities_cover_every_joint_action() {
    let agent = multi_action_agent(SamplingMode::Full);
    assert_eq!(
        agent.unique_multiactions(),
        vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]
    );

    let q_pi = array![[0.1, 0.2, 0.3, 0.4]];
    let joint = agent.multiaction_probabilities(&q_pi).expect("valid posterior");
    assert_eq!(joint.shape(), &[1, 4]);
    for (x, y) in joint.iter().zip(q_pi.iter()) {
        assert!((x - y).abs() < 1e-12);
    }
    assert!((joint.row(0).sum() - 1.0).abs() < 1e-12);
}

#[test]
fn out_of_range_multi_action_is_rejected() {
    let agent = multi_action_agent(SamplingMode::Full);
    let err = agent.encode_multi_actions(&array![[2, 0]]).unwrap_err();
    assert!(matches!(err, Error::ActionOutOfRange { .. } | Error::TensorShapeMismatch { .. }));
}

#[test]
fn deterministic_selection_is_repeatable() {
    let agent = Agent::builder(
        vec![identity_likelihood(2)],
        vec![goto_transition(2), goto_transition(3)],
    )
    .a_dependencies(vec![vec![0]])
    .batch_size(2)
    .config(AgentConfig::default().with_sampling_mode(SamplingMode::Marginal))
    .build()
    .expect("valid model");
    let q_pi = array![
        [0.05, 0.3, 0.05, 0.1, 0.2, 0.3],
        [0.4, 0.1, 0.1, 0.1, 0.1, 0.2]
    ];

    let first = agent.sample_action(&q_pi, None).expect("selection");
    let second = agent.sample_action(&q_pi, None).expect("selection");

    assert_eq!(first.action, second.action);
    for (p, q) in first.probabilities.iter().zip(&second.probabilities) {
        assert!(p.iter().zip(q.iter()).all(|(x, y)| x.to_bits() == y.to_bits()));
    }
}

/// Factor 0 is driven by both control factors (2 × 3 actions); factor 1 has
/// no action dependency and keeps its state.
fn mixed_group_agent() -> Agent {
    let b0 = Array::from_shape_fn(IxDyn(&[2, 2, 2, 3]), |idx| {
        if idx[0] == idx[2] { 1.0 } else { 0.0 }
    });
    Agent::builder(vec![identity_likelihood(2)], vec![b0, identity_likelihood(2)])
        .a_dependencies(vec![vec![0]])
        .b_action_dependencies(vec![vec![0, 1], vec![]])
        .num_controls(vec![2, 3])
        .build()
        .expect("valid multi-action model")
}

#[test]
fn every_multi_action_survives_encoding() {
    let agent = mixed_group_agent();
    assert_eq!(agent.structure().num_controls, vec![6, 1]);

    let grid = agent.unique_multiactions();
    assert_eq!(grid.len(), 6);
    for multi in grid {
        let row = Array2::from_shape_vec((1, 2), multi.clone()).expect("one row");
        let flat = agent.encode_multi_actions(&row).expect("in range");
        assert_eq!(flat[[0, 0]], multi[0] * 3 + multi[1]);
        assert_eq!(flat[[0, 1]], 0, "empty group encodes to 0");
        let decoded = agent.decode_multi_actions(&flat).expect("in range");
        assert_eq!(decoded, row);
    }
}

#[test]
fn every_flat_action_survives_decoding() {
    let agent = mixed_group_agent();
    for index in 0..6 {
        let flat: Array2<usize> = array![[index, 0]];
        let multi = agent.decode_multi_actions(&flat).expect("in range");
        let encoded = agent.encode_multi_actions(&multi).expect("in range");
        assert_eq!(encoded, flat);
    }
}
