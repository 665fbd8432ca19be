//! Self-collision matrix: the link pairs that need distance checks at runtime.
//!
//! The matrix is computed by staged sampling of joint states against a pairwise distance
//! oracle:
//!
//! 1. Pairs of links directly connected by a joint are excluded. They touch at the joint.
//! 2. At the zero joint state, pairs closer than `always_threshold` are treated as always
//!    colliding and excluded as well. These are fused or unresolvable by motion.
//! 3. Minimum, maximum and `num_rnd_tries` random joint states are applied. Every pair found
//!    closer than `sometimes_threshold` in any of them is kept. A kept pair is never tested again.
//!
//! Pairs never found colliding are omitted. This is a probabilistic approximation: more random
//! tries cost more time and can only add pairs. As the random states come from a seeded
//! generator, extending the number of tries keeps all pairs found with fewer tries.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};
use crate::joint_state::{JointState, JointStateGenerator};
use crate::kinematic_graph::KinematicGraph;
use crate::model_error::ModelError;

/// Unordered pair of link names. The names are stored sorted, so `(a, b)` and `(b, a)`
/// are the same pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkPair {
    first: String,
    second: String,
}

impl LinkPair {
    pub fn new(link_a: &str, link_b: &str) -> Self {
        let (first, second) = if link_a <= link_b { (link_a, link_b) } else { (link_b, link_a) };
        LinkPair {
            first: first.to_string(),
            second: second.to_string(),
        }
    }

    pub fn first(&self) -> &str {
        &self.first
    }

    pub fn second(&self) -> &str {
        &self.second
    }

    pub fn contains(&self, link: &str) -> bool {
        self.first == link || self.second == link
    }

    /// The other link of the pair if `link` is one of them.
    pub fn other(&self, link: &str) -> Option<&str> {
        if self.first == link {
            Some(&self.second)
        } else if self.second == link {
            Some(&self.first)
        } else {
            None
        }
    }
}

/// Set of link pairs needing runtime distance checks, each with an optional minimum allowed
/// distance. Pairs without an explicit distance use the runtime default.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelfCollisionMatrix {
    entries: BTreeMap<LinkPair, Option<f64>>,
}

impl SelfCollisionMatrix {
    pub fn new() -> Self {
        SelfCollisionMatrix::default()
    }

    pub fn insert(&mut self, pair: LinkPair, min_distance: Option<f64>) {
        self.entries.insert(pair, min_distance);
    }

    pub fn contains(&self, link_a: &str, link_b: &str) -> bool {
        self.entries.contains_key(&LinkPair::new(link_a, link_b))
    }

    /// Minimum allowed distance of the pair: `None` if the pair is not in the matrix,
    /// `Some(default)` if it is but carries no explicit value.
    pub fn min_distance(&self, link_a: &str, link_b: &str, default: f64) -> Option<f64> {
        self.entries.get(&LinkPair::new(link_a, link_b))
            .map(|distance| distance.unwrap_or(default))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item=(&LinkPair, Option<f64>)> {
        self.entries.iter().map(|(pair, distance)| (pair, *distance))
    }

    pub fn pairs(&self) -> BTreeSet<LinkPair> {
        self.entries.keys().cloned().collect()
    }

    /// Adds all entries of the other matrix, overriding distances of pairs present in both.
    pub fn extend(&mut self, other: SelfCollisionMatrix) {
        self.entries.extend(other.entries);
    }

    /// Drops every entry involving any of the links. Returns the number of removed entries.
    pub fn remove_links<S: AsRef<str>>(&mut self, links: &[S]) -> usize {
        let before = self.entries.len();
        self.entries.retain(|pair, _| !links.iter().any(|link| pair.contains(link.as_ref())));
        before - self.entries.len()
    }

    /// Links that may collide with the given one.
    pub fn get_possible_collisions(&self, link: &str) -> BTreeSet<String> {
        self.entries.keys()
            .filter_map(|pair| pair.other(link))
            .map(str::to_string)
            .collect()
    }
}

impl FromIterator<LinkPair> for SelfCollisionMatrix {
    fn from_iter<T: IntoIterator<Item=LinkPair>>(iter: T) -> Self {
        SelfCollisionMatrix {
            entries: iter.into_iter().map(|pair| (pair, None)).collect(),
        }
    }
}

/// Pairwise distance between the collision geometry of two links, in the pose
/// given by the last applied joint state.
pub trait DistanceOracle {
    /// Signed distance: positive when apart, zero when touching, negative when penetrating.
    fn distance(&self, link_a: &str, link_b: &str) -> Result<f64, ModelError>;

    /// Distances for a batch of pairs, in the same order. Implementations may run these
    /// in parallel.
    fn distances(&self, pairs: &[LinkPair]) -> Result<Vec<f64>, ModelError> {
        pairs.iter()
            .map(|pair| self.distance(pair.first(), pair.second()))
            .collect()
    }
}

/// Receives joint states, changing the pose the distance oracle observes.
pub trait JointStateSink {
    fn apply(&mut self, joint_state: &JointState) -> Result<(), ModelError>;
}

/// Settings of the self-collision matrix computation.
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionMatrixConfig {
    /// Pairs closer than this at the zero joint state are always colliding (d).
    pub always_threshold: f64,
    /// Pairs closer than this in any sampled state are sometimes colliding (d2).
    pub sometimes_threshold: f64,
    /// Number of random joint states to sample.
    pub num_rnd_tries: usize,
    /// Seed of the random joint state sequence.
    pub seed: u64,
    /// Minimum allowed distance stored with the produced pairs. `None` leaves the
    /// runtime default in effect.
    pub min_allowed_distance: Option<f64>,
}

impl Default for CollisionMatrixConfig {
    fn default() -> Self {
        Self {
            always_threshold: 0.05,
            sometimes_threshold: 0.0,
            num_rnd_tries: 1000,
            seed: 1337,
            min_allowed_distance: None,
        }
    }
}

/// Outcome of the staged classification of the candidate pairs. Every candidate pair
/// ends up in exactly one set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CollisionClassification {
    /// Directly connected by a joint
    pub adjacent: BTreeSet<LinkPair>,
    /// In collision at the zero joint state
    pub always: BTreeSet<LinkPair>,
    /// In collision in at least one sampled state
    pub sometimes: BTreeSet<LinkPair>,
    /// Never found in collision
    pub never: BTreeSet<LinkPair>,
}

impl CollisionClassification {
    /// The sometimes colliding pairs, annotated with the given minimum distance.
    pub fn into_matrix(self, min_allowed_distance: Option<f64>) -> SelfCollisionMatrix {
        let mut matrix = SelfCollisionMatrix::new();
        for pair in self.sometimes {
            matrix.insert(pair, min_allowed_distance);
        }
        matrix
    }
}

#[derive(Debug, Clone, Default)]
pub struct SelfCollisionMatrixBuilder {
    pub config: CollisionMatrixConfig,
}

impl SelfCollisionMatrixBuilder {
    pub fn new(config: CollisionMatrixConfig) -> Self {
        SelfCollisionMatrixBuilder { config }
    }

    /// All unordered pairs of distinct links that have collision geometry.
    pub fn candidate_pairs(graph: &KinematicGraph) -> BTreeSet<LinkPair> {
        let links = graph.get_link_names_with_collision();
        let mut pairs = BTreeSet::new();
        for (i, link_a) in links.iter().enumerate() {
            for link_b in &links[i + 1..] {
                pairs.insert(LinkPair::new(link_a, link_b));
            }
        }
        pairs
    }

    /// Computes the matrix over all candidate pairs of the graph.
    pub fn build<W>(&self, graph: &KinematicGraph, world: &mut W) -> Result<SelfCollisionMatrix, ModelError>
    where
        W: DistanceOracle + JointStateSink,
    {
        self.build_for_pairs(graph, Self::candidate_pairs(graph), world)
    }

    /// Computes the matrix over the given pairs only, like the pairs between a newly attached
    /// object and the rest of the body.
    pub fn build_for_pairs<W>(&self, graph: &KinematicGraph, pairs: BTreeSet<LinkPair>, world: &mut W)
                              -> Result<SelfCollisionMatrix, ModelError>
    where
        W: DistanceOracle + JointStateSink,
    {
        Ok(self.classify(graph, pairs, world)?.into_matrix(self.config.min_allowed_distance))
    }

    /// Runs the staged classification. The world is left in the last sampled joint state.
    pub fn classify<W>(&self, graph: &KinematicGraph, pairs: BTreeSet<LinkPair>, world: &mut W)
                       -> Result<CollisionClassification, ModelError>
    where
        W: DistanceOracle + JointStateSink,
    {
        for pair in &pairs {
            graph.get_link(pair.first())?;
            graph.get_link(pair.second())?;
        }
        info!("calculating self collision matrix for {} link pairs, {} random tries",
            pairs.len(), self.config.num_rnd_tries);

        let mut result = CollisionClassification::default();
        let (adjacent, mut rest): (BTreeSet<LinkPair>, BTreeSet<LinkPair>) = pairs.into_iter()
            .partition(|pair| graph.are_linked(pair.first(), pair.second()));
        result.adjacent = adjacent;
        debug!("{} adjacent pairs excluded", result.adjacent.len());

        let mut generator = JointStateGenerator::new(graph, self.config.seed);

        world.apply(&generator.zero())?;
        result.always = Self::check_collisions(world, &rest, self.config.always_threshold)?;
        rest.retain(|pair| !result.always.contains(pair));
        debug!("{} pairs always colliding", result.always.len());

        let threshold = self.config.sometimes_threshold;
        for state in [generator.min(), generator.max()] {
            world.apply(&state)?;
            Self::move_colliding(world, &mut rest, &mut result.sometimes, threshold)?;
        }
        for _ in 0..self.config.num_rnd_tries {
            if rest.is_empty() {
                // Nothing left to discover
                break;
            }
            world.apply(&generator.random())?;
            Self::move_colliding(world, &mut rest, &mut result.sometimes, threshold)?;
        }

        result.never = rest;
        info!("self collision matrix: {} adjacent, {} always, {} sometimes, {} never colliding",
            result.adjacent.len(), result.always.len(), result.sometimes.len(), result.never.len());
        Ok(result)
    }

    fn move_colliding<W: DistanceOracle>(world: &W, rest: &mut BTreeSet<LinkPair>,
                                         sometimes: &mut BTreeSet<LinkPair>, threshold: f64)
                                         -> Result<(), ModelError> {
        let found = Self::check_collisions(world, rest, threshold)?;
        if !found.is_empty() {
            rest.retain(|pair| !found.contains(pair));
            sometimes.extend(found);
        }
        Ok(())
    }

    fn check_collisions<W: DistanceOracle>(world: &W, pairs: &BTreeSet<LinkPair>, threshold: f64)
                                           -> Result<BTreeSet<LinkPair>, ModelError> {
        let batch: Vec<LinkPair> = pairs.iter().cloned().collect();
        let distances = world.distances(&batch)?;
        Ok(batch.into_iter()
            .zip(distances)
            .filter(|(_, distance)| *distance < threshold)
            .map(|(pair, _)| pair)
            .collect())
    }
}
