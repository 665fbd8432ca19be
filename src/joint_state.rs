//! Joint states and their generation: zero, limit and random configurations of the
//! controlled joints.

use std::collections::BTreeMap;
use std::f64::consts::PI;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use crate::kinematic_graph::KinematicGraph;

/// Random sampling range for joints with very wide or no limits (like prismatic base joints)
const RANDOM_RANGE_CLAMP: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SingleJointState {
    pub position: f64,
    pub velocity: f64,
}

/// Position and velocity per joint name. Created fresh for every sampling, never part of the model.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JointState {
    joints: BTreeMap<String, SingleJointState>,
}

impl JointState {
    pub fn new() -> Self {
        JointState::default()
    }

    pub fn set_position(&mut self, joint: &str, position: f64) {
        self.joints.entry(joint.to_string()).or_default().position = position;
    }

    pub fn set(&mut self, joint: &str, state: SingleJointState) {
        self.joints.insert(joint.to_string(), state);
    }

    pub fn get(&self, joint: &str) -> Option<&SingleJointState> {
        self.joints.get(joint)
    }

    pub fn position(&self, joint: &str) -> Option<f64> {
        self.joints.get(joint).map(|s| s.position)
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    /// Entries sorted by joint name.
    pub fn iter(&self) -> impl Iterator<Item=(&str, &SingleJointState)> {
        self.joints.iter().map(|(name, state)| (name.as_str(), state))
    }
}

impl FromIterator<(String, f64)> for JointState {
    fn from_iter<T: IntoIterator<Item=(String, f64)>>(iter: T) -> Self {
        JointState {
            joints: iter.into_iter()
                .map(|(name, position)| (name, SingleJointState { position, velocity: 0.0 }))
                .collect(),
        }
    }
}

/// Builds the joint state of all controlled joints that are controllable, asking the policy
/// for the position of each. Velocities are zero.
pub fn generate_joint_state<F>(graph: &KinematicGraph, mut policy: F) -> JointState
where
    F: FnMut(&str) -> f64,
{
    graph.get_controlled_joints()
        .into_iter()
        .filter(|joint| graph.is_joint_controllable(joint).unwrap_or(false))
        .map(|joint| {
            let position = policy(joint.as_str());
            (joint, position)
        })
        .collect()
}

/// All joints at 0. Zero may be outside the limits of some joints; this is accepted and
/// not corrected, as it changes which link pairs are found to be always colliding.
pub fn zero_joint_state(graph: &KinematicGraph) -> JointState {
    generate_joint_state(graph, |_| 0.0)
}

/// All joints at their upper limit, 2π if there is none.
pub fn max_joint_state(graph: &KinematicGraph) -> JointState {
    generate_joint_state(graph, |joint| {
        let (_, upper) = graph.get_joint_limits(joint).unwrap_or((None, None));
        upper.unwrap_or(2.0 * PI)
    })
}

/// All joints at their lower limit, -2π if there is none.
pub fn min_joint_state(graph: &KinematicGraph) -> JointState {
    generate_joint_state(graph, |joint| {
        let (lower, _) = graph.get_joint_limits(joint).unwrap_or((None, None));
        lower.unwrap_or(-2.0 * PI)
    })
}

/// Uniform sample within the limits clamped to ±10, or within [0, 2π) for joints without limits.
pub fn random_joint_state<R: Rng>(graph: &KinematicGraph, rng: &mut R) -> JointState {
    generate_joint_state(graph, |joint| {
        let unit: f64 = rng.gen_range(0.0..1.0);
        match graph.get_joint_limits(joint).unwrap_or((None, None)) {
            (Some(lower), Some(upper)) => {
                let lower = lower.max(-RANDOM_RANGE_CLAMP);
                let upper = upper.min(RANDOM_RANGE_CLAMP);
                lower + unit * (upper - lower)
            }
            _ => unit * 2.0 * PI,
        }
    })
}

/// Source of the sampled joint states, with a seeded random generator so that the
/// sequence of random states is reproducible.
pub struct JointStateGenerator<'a> {
    graph: &'a KinematicGraph,
    rng: StdRng,
}

impl<'a> JointStateGenerator<'a> {
    pub fn new(graph: &'a KinematicGraph, seed: u64) -> Self {
        JointStateGenerator {
            graph,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn zero(&self) -> JointState {
        zero_joint_state(self.graph)
    }

    pub fn min(&self) -> JointState {
        min_joint_state(self.graph)
    }

    pub fn max(&self) -> JointState {
        max_joint_state(self.graph)
    }

    pub fn random(&mut self) -> JointState {
        random_joint_state(self.graph, &mut self.rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Joint, JointType, Link, Mimic};

    fn robot() -> KinematicGraph {
        KinematicGraph::from_parts(
            "sampler",
            vec![Link::new("world"), Link::new("base"), Link::new("upper"), Link::new("lower"),
                 Link::new("finger"), Link::new("tool")],
            vec![
                Joint::new("rail", JointType::Prismatic, "world", "base").with_limits(-1000.0, 1000.0),
                Joint::new("turn", JointType::Continuous, "base", "upper").with_axis([0.0, 0.0, 1.0]),
                Joint::new("elbow", JointType::Revolute, "upper", "lower").with_limits(0.5, 2.0),
                Joint::new("finger_joint", JointType::Revolute, "lower", "finger")
                    .with_limits(0.0, 1.0)
                    .with_mimic(Mimic::new("elbow")),
                Joint::fixed("tool_joint", "lower", "tool"),
            ],
        ).expect("valid model")
    }

    #[test]
    fn test_only_controllable_joints() {
        let robot = robot();
        let state = zero_joint_state(&robot);
        let names: Vec<&str> = state.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["elbow", "rail", "turn"]);
    }

    #[test]
    fn test_zero_is_not_corrected() {
        let state = zero_joint_state(&robot());
        // 0 is outside [0.5, 2.0] but still used
        assert_eq!(state.position("elbow"), Some(0.0));
    }

    #[test]
    fn test_limit_states() {
        let robot = robot();
        let max = max_joint_state(&robot);
        assert_eq!(max.position("elbow"), Some(2.0));
        assert_eq!(max.position("rail"), Some(1000.0));
        assert_eq!(max.position("turn"), Some(2.0 * PI));
        let min = min_joint_state(&robot);
        assert_eq!(min.position("elbow"), Some(0.5));
        assert_eq!(min.position("turn"), Some(-2.0 * PI));
    }

    #[test]
    fn test_random_within_range() {
        let robot = robot();
        let mut generator = JointStateGenerator::new(&robot, 1337);
        for _ in 0..200 {
            let state = generator.random();
            let rail = state.position("rail").unwrap();
            assert!((-10.0..=10.0).contains(&rail), "rail {} outside clamped range", rail);
            let elbow = state.position("elbow").unwrap();
            assert!((0.5..=2.0).contains(&elbow));
            let turn = state.position("turn").unwrap();
            assert!((0.0..2.0 * PI).contains(&turn));
            assert_eq!(state.get("turn").unwrap().velocity, 0.0);
        }
    }

    #[test]
    fn test_random_is_reproducible() {
        let robot = robot();
        let mut first = JointStateGenerator::new(&robot, 7);
        let mut second = JointStateGenerator::new(&robot, 7);
        for _ in 0..10 {
            assert_eq!(first.random(), second.random());
        }
    }

    #[test]
    fn test_controlled_joint_override() {
        let robot = robot().with_controlled_joints(&["elbow", "tool_joint"]).unwrap();
        let state = max_joint_state(&robot);
        // Fixed joint is listed but not controllable
        assert_eq!(state.len(), 1);
        assert_eq!(state.position("elbow"), Some(2.0));
    }
}
