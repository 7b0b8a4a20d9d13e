//! T-maze navigation with an epistemic cue
//!
//! The agent starts in the centre of a T-shaped maze. One arm holds a reward
//! and the other a punishment; which is which is hidden. A cue location
//! reveals the context. Policies are scored on open-loop rollouts, so the
//! predicted beliefs never condition on the cue and the agent may head
//! straight for an arm. After the episode the agent refines its likelihood
//! counts from what it saw.

use actinf::{ActionSelection, Agent, AgentConfig, Observation};
use anyhow::Result;
use ndarray::{Array, Array2, Array3, ArrayD, Axis, IxDyn, array};
use rand::{Rng, RngCore, SeedableRng, rngs::StdRng};

const LOCATIONS: [&str; 4] = ["centre", "left arm", "right arm", "cue"];
const CONTEXTS: [&str; 2] = ["reward left", "reward right"];

/// Outcome `o` of a modality given location and context.
fn outcome(modality: usize, location: usize, context: usize) -> usize {
    match modality {
        0 => location,
        // none, reward, punishment
        1 => match location {
            1 | 2 if location - 1 == context => 1,
            1 | 2 => 2,
            _ => 0,
        },
        // none, cue left, cue right
        _ => {
            if location == 3 {
                1 + context
            } else {
                0
            }
        }
    }
}

fn likelihood(modality: usize, num_obs: usize) -> ArrayD<f64> {
    Array::from_shape_fn(IxDyn(&[num_obs, 4, 2]), |idx| {
        if outcome(modality, idx[1], idx[2]) == idx[0] {
            1.0
        } else {
            0.0
        }
    })
}

fn build_agent() -> Result<Agent> {
    let a = vec![likelihood(0, 4), likelihood(1, 3), likelihood(2, 3)];
    let pa = a.iter().map(|a_m| a_m.mapv(|x| 4.0 * x + 0.5)).collect();
    let location = Array::from_shape_fn(IxDyn(&[4, 4, 4]), |idx| {
        if idx[0] == idx[2] { 1.0 } else { 0.0 }
    });
    let context = Array::from_shape_fn((2, 2), |(i, j)| if i == j { 1.0 } else { 0.0 })
        .insert_axis(Axis(2))
        .into_dyn();

    let agent = Agent::builder(a, vec![location, context])
        .pa(pa)
        .c(vec![
            Array::zeros(IxDyn(&[4])),
            array![0.0, 3.0, -3.0].into_dyn(),
            Array::zeros(IxDyn(&[3])),
        ])
        .d(vec![
            array![1.0, 0.0, 0.0, 0.0].into_dyn(),
            array![0.5, 0.5].into_dyn(),
        ])
        .config(
            AgentConfig::default()
                .with_policy_len(2)
                .with_action_selection(ActionSelection::Stochastic)
                .with_learning(true, false),
        )
        .build()?;
    Ok(agent)
}

fn main() -> Result<()> {
    println!("T-maze active inference");
    println!("=======================\n");

    let agent = build_agent()?;
    println!(
        "Agent: {} factors, {} modalities, {} policies\n",
        agent.structure().num_factors(),
        agent.structure().num_modalities(),
        agent.structure().num_policies()
    );

    let mut rng = StdRng::seed_from_u64(42);
    let context = rng.random_range(0..2);
    println!("Hidden context: {}\n", CONTEXTS[context]);

    let mut location = 0;
    let mut prior = agent.initial_prior();
    let mut history = Vec::new();
    let mut observed: Vec<Vec<usize>> = vec![Vec::new(); 3];
    for t in 0..3 {
        let observations: Vec<Observation> = (0..3)
            .map(|m| {
                let o = outcome(m, location, context);
                observed[m].push(o);
                Observation::Indices(vec![o])
            })
            .collect();
        let qs = agent.infer_states(&observations, &prior, None)?;
        let posterior = agent.infer_policies(&qs)?;
        let sample = agent.sample_action(&posterior.q_pi, Some(&mut rng as &mut dyn RngCore))?;

        let belief = qs.factor(1);
        println!(
            "t={t}: at {:<9} P(reward left) = {:.3}  best G = {:.3}",
            LOCATIONS[location],
            belief[[0, 0]],
            posterior
                .efe
                .row(0)
                .iter()
                .copied()
                .fold(f64::INFINITY, f64::min)
        );

        location = sample.action[[0, 0]];
        println!("      moving to {}", LOCATIONS[location]);
        prior = agent.infer_empirical_prior(&sample.action, &qs)?;
        history.push(qs);
    }

    let reward = outcome(1, location, context);
    println!(
        "\nFinal outcome: {}",
        ["nothing", "reward", "punishment"][reward]
    );

    let outcomes = observed
        .into_iter()
        .map(|o| Array2::from_shape_vec((1, o.len()), o))
        .collect::<Result<Vec<_>, _>>()?;
    let learned = agent.infer_parameters(
        &history,
        &outcomes,
        &Array3::zeros((1, 0, 2)),
        None,
        1.0,
        0.0,
    )?;
    let before: f64 = agent.model().pa.iter().flatten().map(|p| p.sum()).sum();
    let after: f64 = learned.model().pa.iter().flatten().map(|p| p.sum()).sum();
    println!("Likelihood counts: {before:.1} -> {after:.1}");
    Ok(())
}
