//! Tests for fixed-point state inference and state prediction

mod common;

use actinf::{Agent, AgentConfig, Beliefs, Error, FpiParams, Observation};
use common::{assert_normalized, identity_likelihood, random_likelihood, random_transition, rng};
use ndarray::{Array2, array};

#[test]
fn identity_likelihood_yields_certain_posterior() {
    let agent = Agent::builder(vec![identity_likelihood(2)], vec![common::swap_transition()])
        .build()
        .expect("valid model");

    let qs = agent
        .infer_states(
            &[Observation::Indices(vec![0])],
            &agent.initial_prior(),
            None,
        )
        .expect("inference succeeds");

    let q = qs.factor(0);
    assert!((q[[0, 0]] - 1.0).abs() < 1e-6, "posterior: {q:?}");
    assert!(q[[0, 1]] < 1e-6);
}

#[test]
fn posteriors_are_normalized_for_random_factorised_models() {
    let mut rng = rng(11);
    let num_states = [3, 2];
    let a = vec![
        random_likelihood(4, &num_states, &[0, 1], &mut rng),
        random_likelihood(2, &num_states, &[1], &mut rng),
    ];
    let b = vec![random_transition(3, 2, &mut rng), random_transition(2, 1, &mut rng)];
    let agent = Agent::builder(a, b)
        .a_dependencies(vec![vec![0, 1], vec![1]])
        .batch_size(3)
        .build()
        .expect("valid model");

    let observations = [
        Observation::Indices(vec![0, 3, 1]),
        Observation::Indices(vec![1, 0, 1]),
    ];
    let result = agent
        .infer_states_with_trace(&observations, &agent.initial_prior(), None)
        .expect("inference succeeds");

    assert_normalized(&result.posterior);
    assert_eq!(result.posterior.num_states(), vec![3, 2]);
    assert_eq!(
        result.free_energy.shape(),
        &[3, agent.config().inference.num_iter]
    );
    assert!(result.free_energy.iter().all(|f| f.is_finite()));
}

#[test]
fn distribution_observation_matches_index_observation() {
    let mut rng = rng(5);
    let a = vec![random_likelihood(3, &[4], &[0], &mut rng)];
    let b = vec![random_transition(4, 2, &mut rng)];
    let agent = Agent::builder(a, b).build().expect("valid model");
    let prior = agent.initial_prior();

    let by_index = agent
        .infer_states(&[Observation::Indices(vec![2])], &prior, None)
        .expect("index observation");
    let by_distribution = agent
        .infer_states(
            &[Observation::Distribution(array![[0.0, 0.0, 1.0]])],
            &prior,
            None,
        )
        .expect("distribution observation");

    for (x, y) in by_index
        .factor(0)
        .iter()
        .zip(by_distribution.factor(0).iter())
    {
        assert!((x - y).abs() < 1e-12);
    }
}

#[test]
fn fully_masked_modality_leaves_the_prior() {
    let agent = Agent::builder(vec![identity_likelihood(2)], vec![common::swap_transition()])
        .build()
        .expect("valid model");
    let prior = Beliefs::new(vec![array![[0.3, 0.7]]]).expect("one factor");

    let qs = agent
        .infer_states(&[Observation::Indices(vec![0])], &prior, Some(&[0.0]))
        .expect("inference succeeds");

    let q = qs.factor(0);
    assert!((q[[0, 0]] - 0.3).abs() < 1e-9, "posterior: {q:?}");
}

#[test]
fn early_stopping_freezes_later_iterations() {
    let mut rng = rng(21);
    let a = vec![random_likelihood(3, &[3], &[0], &mut rng)];
    let b = vec![random_transition(3, 2, &mut rng)];
    let params = FpiParams {
        num_iter: 12,
        ..FpiParams::default()
    };
    let agent = Agent::builder(a, b)
        .config(AgentConfig::default().with_inference(params))
        .build()
        .expect("valid model");

    let result = agent
        .infer_states_with_trace(&[Observation::Indices(vec![1])], &agent.initial_prior(), None)
        .expect("inference succeeds");

    let trace = result.free_energy.row(0);
    assert_eq!(trace.len(), 12);
    assert_eq!(trace[10], trace[11]);
}

#[test]
fn out_of_range_observation_is_rejected() {
    let agent = Agent::builder(vec![identity_likelihood(2)], vec![common::swap_transition()])
        .build()
        .expect("valid model");

    let err = agent
        .infer_states(&[Observation::Indices(vec![2])], &agent.initial_prior(), None)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::ObservationOutOfRange {
            modality: 0,
            observation: 2,
            ..
        }
    ));
}

#[test]
fn empirical_prior_applies_chosen_transition() {
    let agent = Agent::builder(vec![identity_likelihood(2)], vec![common::swap_transition()])
        .batch_size(2)
        .build()
        .expect("valid model");
    let qs = Beliefs::new(vec![array![[0.9, 0.1], [0.9, 0.1]]]).expect("one factor");

    let action: Array2<usize> = array![[0], [1]];
    let prior = agent
        .infer_empirical_prior(&action, &qs)
        .expect("prediction succeeds");

    let q = prior.factor(0);
    assert!((q[[0, 0]] - 0.9).abs() < 1e-12);
    assert!((q[[1, 0]] - 0.1).abs() < 1e-12);
}

#[test]
fn mask_weights_outside_unit_interval_are_rejected() {
    let agent = Agent::builder(vec![identity_likelihood(2)], vec![common::swap_transition()])
        .build()
        .expect("valid model");
    let prior = agent.initial_prior();

    for weight in [1.5, -0.1, f64::NAN] {
        let err = agent
            .infer_states(&[Observation::Indices(vec![0])], &prior, Some(&[weight]))
            .unwrap_err();
        assert!(
            matches!(err, Error::InvalidConfiguration { .. }),
            "weight {weight}: {err}"
        );
    }
}
