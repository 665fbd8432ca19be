//! Persistent store of computed self-collision matrices, keyed by the content hash of the
//! robot description.
//!
//! Every distinct description gets its own entry. Entries are written once and never updated:
//! a changed model hashes to a new key, so a stale matrix is never returned for it. Reading is
//! best effort. A missing, unreadable or malformed entry is a cache miss and the matrix is
//! recomputed.
//!
//! The entry is a small YAML document:
//! ```yaml
//! ---
//! robot: pr2
//! hash: 5d41402abc4b2a76b9719d911017c592...
//! pairs:
//!   - - l_forearm_link
//!     - r_forearm_link
//!     - ~
//!   - - base_link
//!     - l_gripper_palm_link
//!     - 0.02
//! ```
//! The third element of a pair is its minimum allowed distance, `~` if the runtime default applies.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use yaml_rust2::yaml::Hash;
use yaml_rust2::{Yaml, YamlEmitter, YamlLoader};
use crate::collision_matrix::{DistanceOracle, JointStateSink, LinkPair, SelfCollisionMatrix, SelfCollisionMatrixBuilder};
use crate::kinematic_graph::KinematicGraph;
use crate::model_error::ModelError;
use crate::model_hash::ModelHash;

/// Key to text store. Any content addressed store satisfies it.
pub trait CacheStorage {
    fn exists(&self, key: &str) -> bool;
    fn read(&self, key: &str) -> Result<String, ModelError>;
    fn write(&mut self, key: &str, content: &str) -> Result<(), ModelError>;
}

/// One file per key under the base directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    base_path: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        FileStorage { base_path: base_path.as_ref().to_path_buf() }
    }

    pub fn path_of(&self, key: &str) -> PathBuf {
        self.base_path.join(key)
    }
}

impl CacheStorage for FileStorage {
    fn exists(&self, key: &str) -> bool {
        self.path_of(key).is_file()
    }

    fn read(&self, key: &str) -> Result<String, ModelError> {
        Ok(fs::read_to_string(self.path_of(key))?)
    }

    /// Creates the base directory if needed. Concurrent writers of the same key may overwrite
    /// each other; they write the same content for the same description.
    fn write(&mut self, key: &str, content: &str) -> Result<(), ModelError> {
        fs::create_dir_all(&self.base_path)?;
        fs::write(self.path_of(key), content)?;
        Ok(())
    }
}

/// Volatile store, for tests and for embedding without a filesystem.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    entries: BTreeMap<String, String>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        InMemoryStorage::default()
    }
}

impl CacheStorage for InMemoryStorage {
    fn exists(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn read(&self, key: &str) -> Result<String, ModelError> {
        self.entries.get(key)
            .cloned()
            .ok_or_else(|| ModelError::CacheError(format!("no entry {}", key)))
    }

    fn write(&mut self, key: &str, content: &str) -> Result<(), ModelError> {
        self.entries.insert(key.to_string(), content.to_string());
        Ok(())
    }
}

pub struct CollisionMatrixCache<S: CacheStorage> {
    storage: S,
}

impl<S: CacheStorage> CollisionMatrixCache<S> {
    pub fn new(storage: S) -> Self {
        CollisionMatrixCache { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Matrix stored for this model, `None` on a miss. Read and parse failures are logged
    /// and reported as a miss.
    pub fn load(&self, graph: &KinematicGraph) -> Option<SelfCollisionMatrix> {
        let hash = ModelHash::of_graph(graph);
        if !self.storage.exists(hash.as_str()) {
            debug!("no cached self collision matrix for {} ({})", graph.get_name(), hash);
            return None;
        }
        let loaded = self.storage.read(hash.as_str())
            .and_then(|content| matrix_from_yaml(&content, &hash));
        match loaded {
            Ok(matrix) => {
                info!("loaded self collision matrix for {} ({}) with {} pairs",
                    graph.get_name(), hash, matrix.len());
                Some(matrix)
            }
            Err(err) => {
                warn!("cached self collision matrix {} unusable, recomputing: {}", hash, err);
                None
            }
        }
    }

    pub fn save(&mut self, graph: &KinematicGraph, matrix: &SelfCollisionMatrix) -> Result<(), ModelError> {
        let hash = ModelHash::of_graph(graph);
        let content = matrix_to_yaml(graph.get_name(), &hash, matrix)?;
        self.storage.write(hash.as_str(), &content)?;
        info!("saved self collision matrix for {} ({}) with {} pairs", graph.get_name(), hash, matrix.len());
        Ok(())
    }

    /// Cached matrix if present, otherwise computes it with the builder and stores it.
    /// A failure to store the computed matrix is logged, the matrix is still returned.
    pub fn load_or_build<W>(&mut self, graph: &KinematicGraph, builder: &SelfCollisionMatrixBuilder,
                            world: &mut W) -> Result<SelfCollisionMatrix, ModelError>
    where
        W: DistanceOracle + JointStateSink,
    {
        if let Some(matrix) = self.load(graph) {
            return Ok(matrix);
        }
        let matrix = builder.build(graph, world)?;
        if let Err(err) = self.save(graph, &matrix) {
            warn!("failed to cache self collision matrix of {}: {}", graph.get_name(), err);
        }
        Ok(matrix)
    }
}

fn matrix_to_yaml(robot: &str, hash: &ModelHash, matrix: &SelfCollisionMatrix) -> Result<String, ModelError> {
    let pairs = matrix.iter()
        .map(|(pair, distance)| Yaml::Array(vec![
            Yaml::String(pair.first().to_string()),
            Yaml::String(pair.second().to_string()),
            match distance {
                Some(d) => Yaml::Real(format!("{:?}", d)),
                None => Yaml::Null,
            },
        ]))
        .collect();

    let mut root = Hash::new();
    root.insert(Yaml::String("robot".into()), Yaml::String(robot.to_string()));
    root.insert(Yaml::String("hash".into()), Yaml::String(hash.to_string()));
    root.insert(Yaml::String("pairs".into()), Yaml::Array(pairs));

    let mut out = String::new();
    YamlEmitter::new(&mut out).dump(&Yaml::Hash(root))
        .map_err(|e| ModelError::CacheError(format!("{:?}", e)))?;
    out.push('\n');
    Ok(out)
}

fn matrix_from_yaml(content: &str, expected: &ModelHash) -> Result<SelfCollisionMatrix, ModelError> {
    let docs = YamlLoader::load_from_str(content)
        .map_err(|e| ModelError::ParseError(e.to_string()))?;
    let doc = docs.first()
        .ok_or_else(|| ModelError::CacheError("empty cache entry".into()))?;

    let hash = doc["hash"].as_str()
        .ok_or_else(|| ModelError::MissingField("hash".into()))?;
    if hash != expected.as_str() {
        return Err(ModelError::CacheError(format!("entry belongs to {}, expected {}", hash, expected)));
    }

    let pairs = doc["pairs"].as_vec()
        .ok_or_else(|| ModelError::MissingField("pairs".into()))?;
    let mut matrix = SelfCollisionMatrix::new();
    for entry in pairs {
        let fields = entry.as_vec()
            .filter(|fields| fields.len() == 3)
            .ok_or_else(|| ModelError::ParseError(format!("malformed pair {:?}", entry)))?;
        let (Some(first), Some(second)) = (fields[0].as_str(), fields[1].as_str()) else {
            return Err(ModelError::ParseError(format!("pair without link names: {:?}", entry)));
        };
        let distance = match &fields[2] {
            Yaml::Null => None,
            Yaml::Real(_) => fields[2].as_f64(),
            Yaml::Integer(value) => Some(*value as f64),
            other => return Err(ModelError::ParseError(format!("bad distance {:?}", other))),
        };
        matrix.insert(LinkPair::new(first, second), distance);
    }
    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::collections::BTreeSet;
    use super::*;
    use crate::joint_state::JointState;
    use crate::model::{Geometry, Joint, JointType, Link, LinkGeometry};

    /// Pairs are apart at the zero state and collide in every other. Counts distance queries.
    struct Grinder {
        moved: bool,
        queries: Cell<usize>,
    }

    impl DistanceOracle for Grinder {
        fn distance(&self, _: &str, _: &str) -> Result<f64, ModelError> {
            self.queries.set(self.queries.get() + 1);
            Ok(if self.moved { -0.01 } else { 1.0 })
        }
    }

    impl JointStateSink for Grinder {
        fn apply(&mut self, joint_state: &JointState) -> Result<(), ModelError> {
            self.moved = joint_state.iter().any(|(_, state)| state.position != 0.0);
            Ok(())
        }
    }

    fn robot(upper: f64) -> KinematicGraph {
        let solid = |name: &str| Link::new(name)
            .with_collision(LinkGeometry::new(Geometry::Box { size: [0.1, 0.1, 0.1] }));
        KinematicGraph::from_parts(
            "trio",
            vec![solid("base"), solid("mid"), solid("tip")],
            vec![
                Joint::new("j1", JointType::Revolute, "base", "mid").with_limits(-1.0, upper),
                Joint::new("j2", JointType::Revolute, "mid", "tip").with_limits(-1.0, 1.0),
            ],
        ).unwrap()
    }

    fn sample_matrix() -> SelfCollisionMatrix {
        let mut matrix = SelfCollisionMatrix::new();
        matrix.insert(LinkPair::new("tip", "base"), None);
        matrix.insert(LinkPair::new("base", "mid"), Some(0.025));
        matrix
    }

    #[test]
    fn test_save_and_load() {
        let trio = robot(1.0);
        let mut cache = CollisionMatrixCache::new(InMemoryStorage::new());
        assert!(cache.load(&trio).is_none());
        cache.save(&trio, &sample_matrix()).unwrap();
        assert_eq!(cache.load(&trio), Some(sample_matrix()));
        // Another description is another key
        assert!(cache.load(&robot(1.5)).is_none());
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() {
        let robot = robot(1.0);
        let mut storage = InMemoryStorage::new();
        let key = ModelHash::of_graph(&robot);
        storage.write(key.as_str(), "pairs: [[unterminated").unwrap();
        let cache = CollisionMatrixCache::new(storage);
        assert!(cache.load(&robot).is_none());
    }

    #[test]
    fn test_entry_of_other_model_is_a_miss() {
        let trio = robot(1.0);
        let other = robot(2.0);
        let mut storage = InMemoryStorage::new();
        let content = matrix_to_yaml("trio", &ModelHash::of_graph(&other), &sample_matrix()).unwrap();
        storage.write(ModelHash::of_graph(&trio).as_str(), &content).unwrap();
        assert!(CollisionMatrixCache::new(storage).load(&trio).is_none());
    }

    #[test]
    fn test_load_or_build_computes_once() {
        let robot = robot(1.0);
        let builder = SelfCollisionMatrixBuilder::default();
        let mut cache = CollisionMatrixCache::new(InMemoryStorage::new());
        let mut world = Grinder { moved: false, queries: Cell::new(0) };

        let first = cache.load_or_build(&robot, &builder, &mut world).unwrap();
        assert_eq!(first.pairs(), BTreeSet::from([LinkPair::new("base", "tip")]));
        let queries = world.queries.get();
        assert!(queries > 0);

        let second = cache.load_or_build(&robot, &builder, &mut world).unwrap();
        assert_eq!(first, second);
        assert_eq!(world.queries.get(), queries, "second call must be served from the cache");
    }

    #[test]
    fn test_file_storage() {
        let dir = std::env::temp_dir().join(format!("scm_cache_test_{}", std::process::id()));
        let mut storage = FileStorage::new(&dir);
        assert!(!storage.exists("abc"));
        storage.write("abc", "content").unwrap();
        assert!(storage.exists("abc"));
        assert_eq!(storage.read("abc").unwrap(), "content");
        assert_eq!(storage.path_of("abc"), dir.join("abc"));
        let _ = fs::remove_dir_all(&dir);
    }
}
