//! Kinematic graph: a rooted tree of links connected by joints, with chain and sub-tree queries.
//!
//! The graph is immutable once built. Structural edits (grafting or removing a sub-tree)
//! produce a new graph, leaving the original untouched. This makes it possible to keep the
//! previous version as a baseline and to swap versions atomically
//! (see [`crate::attachment::ArticulatedBody`]).
//!
//! ```
//! use rs_wholebody_model::kinematic_graph::{ChainFilter, KinematicGraph};
//! use rs_wholebody_model::model::{Joint, JointType, Link};
//!
//! let graph = KinematicGraph::from_parts(
//!     "arm",
//!     vec![Link::new("base"), Link::new("upper"), Link::new("lower")],
//!     vec![
//!         Joint::new("shoulder", JointType::Revolute, "base", "upper").with_limits(-1.0, 1.0),
//!         Joint::new("elbow", JointType::Revolute, "upper", "lower").with_limits(-2.0, 2.0),
//!     ],
//! ).unwrap();
//!
//! assert_eq!(graph.get_root().unwrap(), "base");
//! assert_eq!(graph.get_chain("base", "lower", ChainFilter::JOINTS | ChainFilter::FIXED).unwrap(),
//!            vec!["shoulder", "elbow"]);
//! ```

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use bitflags::bitflags;
use crate::model::{Joint, JointLimit, JointType, Link, Mimic};
use crate::model_error::ModelError;

/// Mimic joints may follow other mimic joints, but not endlessly.
pub(crate) const MAX_MIMIC_DEPTH: usize = 16;

bitflags! {
    /// Selects which elements [`KinematicGraph::get_chain`] returns.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ChainFilter: u8 {
        /// Include joint names
        const JOINTS = 0b001;
        /// Include link names
        const LINKS = 0b010;
        /// Include fixed joints (only relevant together with JOINTS)
        const FIXED = 0b100;
    }
}

impl Default for ChainFilter {
    /// Links and all joints, including fixed ones.
    fn default() -> Self {
        ChainFilter::all()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KinematicGraph {
    name: String,
    links: BTreeMap<String, Link>,
    joints: BTreeMap<String, Joint>,
    /// child link -> the joint that has it as a child
    parent_joint_of_link: BTreeMap<String, String>,
    /// link -> joints that have it as a parent, sorted by joint name
    child_joints_of_link: BTreeMap<String, Vec<String>>,
    /// Explicit override of the controlled joint set
    controlled_joints: Option<Vec<String>>,
}

impl KinematicGraph {
    /// Builds the graph from its parts, validating the tree invariants: unique names,
    /// joints referencing existing links, at most one parent joint per link, exactly one root,
    /// and every link reachable from the root.
    pub fn from_parts(name: &str, links: Vec<Link>, joints: Vec<Joint>) -> Result<Self, ModelError> {
        let mut link_map = BTreeMap::new();
        for link in links {
            if link_map.contains_key(&link.name) {
                return Err(ModelError::NameCollision(format!("duplicate link '{}'", link.name)));
            }
            link_map.insert(link.name.clone(), link);
        }

        let mut joint_map = BTreeMap::new();
        for joint in joints {
            if joint_map.contains_key(&joint.name) {
                return Err(ModelError::NameCollision(format!("duplicate joint '{}'", joint.name)));
            }
            joint_map.insert(joint.name.clone(), joint);
        }

        let graph = Self::index(name.to_string(), link_map, joint_map, None)?;
        graph.validate_tree()?;
        Ok(graph)
    }

    /// Same graph, but with the controlled joint set explicitly given instead of derived
    /// from the joint types. All named joints must exist.
    pub fn with_controlled_joints(mut self, names: &[&str]) -> Result<Self, ModelError> {
        for name in names {
            self.get_joint(name)?;
        }
        self.controlled_joints = Some(names.iter().map(|n| n.to_string()).collect());
        Ok(self)
    }

    fn index(
        name: String,
        links: BTreeMap<String, Link>,
        joints: BTreeMap<String, Joint>,
        controlled_joints: Option<Vec<String>>,
    ) -> Result<Self, ModelError> {
        let mut parent_joint_of_link = BTreeMap::new();
        let mut child_joints_of_link: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for joint in joints.values() {
            for link in [&joint.parent, &joint.child] {
                if !links.contains_key(link) {
                    return Err(ModelError::Structural(format!(
                        "joint '{}' references missing link '{}'", joint.name, link)));
                }
            }
            if let Some(other) = parent_joint_of_link.insert(joint.child.clone(), joint.name.clone()) {
                return Err(ModelError::Structural(format!(
                    "link '{}' has more than one parent joint ('{}' and '{}')",
                    joint.child, other, joint.name)));
            }
            // BTreeMap iteration keeps child joints sorted by name
            child_joints_of_link.entry(joint.parent.clone()).or_default().push(joint.name.clone());
        }

        Ok(KinematicGraph {
            name,
            links,
            joints,
            parent_joint_of_link,
            child_joints_of_link,
            controlled_joints,
        })
    }

    fn validate_tree(&self) -> Result<(), ModelError> {
        let root = self.get_root()?;
        let reachable = self.descendants(root).len();
        if reachable != self.links.len() {
            return Err(ModelError::Structural(format!(
                "only {} of {} links are reachable from root '{}' (cycle or disconnected part)",
                reachable, self.links.len(), root)));
        }
        self.validate_mimics()
    }

    /// Every mimic joint must lead to an existing master joint that is not a mimic itself.
    fn validate_mimics(&self) -> Result<(), ModelError> {
        for joint in self.joints.values() {
            let mut current = joint;
            let mut depth = 0;
            while let Some(Mimic { joint: master, .. }) = &current.mimic {
                let Some(next) = self.joints.get(master) else {
                    return Err(ModelError::Structural(format!(
                        "joint '{}' mimics missing joint '{}'", current.name, master)));
                };
                depth += 1;
                if depth > MAX_MIMIC_DEPTH {
                    return Err(ModelError::Structural(format!("mimic cycle at joint '{}'", joint.name)));
                }
                current = next;
            }
        }
        Ok(())
    }

    /// Name of the model (robot name in URDF).
    pub fn get_name(&self) -> &str {
        &self.name
    }

    /// The unique link without a parent joint.
    pub fn get_root(&self) -> Result<&str, ModelError> {
        let mut roots = self.links.keys()
            .filter(|link| !self.parent_joint_of_link.contains_key(*link));
        match (roots.next(), roots.next()) {
            (Some(root), None) => Ok(root.as_str()),
            (None, _) => Err(ModelError::Structural(format!(
                "model '{}' has no root link", self.name))),
            (Some(first), Some(second)) => Err(ModelError::Structural(format!(
                "model '{}' has multiple roots, including '{}' and '{}'", self.name, first, second))),
        }
    }

    pub fn get_link_names(&self) -> Vec<&str> {
        self.links.keys().map(String::as_str).collect()
    }

    pub fn get_joint_names(&self) -> Vec<&str> {
        self.joints.keys().map(String::as_str).collect()
    }

    pub fn links(&self) -> impl Iterator<Item=&Link> {
        self.links.values()
    }

    pub fn joints(&self) -> impl Iterator<Item=&Joint> {
        self.joints.values()
    }

    pub fn has_link(&self, name: &str) -> bool {
        self.links.contains_key(name)
    }

    pub fn has_joint(&self, name: &str) -> bool {
        self.joints.contains_key(name)
    }

    pub fn get_link(&self, name: &str) -> Result<&Link, ModelError> {
        self.links.get(name).ok_or_else(|| ModelError::UnknownLink(name.to_string()))
    }

    pub fn get_joint(&self, name: &str) -> Result<&Joint, ModelError> {
        self.joints.get(name).ok_or_else(|| ModelError::UnknownJoint(name.to_string()))
    }

    /// Joint that has this link as a child, `None` for the root.
    pub fn get_parent_joint_of_link(&self, link: &str) -> Result<Option<&str>, ModelError> {
        self.get_link(link)?;
        Ok(self.parent_joint_of_link.get(link).map(String::as_str))
    }

    /// Parent link of the link, `None` for the root.
    pub fn get_parent_link(&self, link: &str) -> Result<Option<&str>, ModelError> {
        Ok(match self.get_parent_joint_of_link(link)? {
            Some(joint) => Some(self.joints[joint].parent.as_str()),
            None => None,
        })
    }

    /// Joint one level closer to the root than this joint, `None` if the joint hangs
    /// directly on the root link.
    pub fn get_parent_joint(&self, joint: &str) -> Result<Option<&str>, ModelError> {
        let parent_link = &self.get_joint(joint)?.parent;
        self.get_parent_joint_of_link(parent_link)
    }

    pub fn get_parent_link_of_joint(&self, joint: &str) -> Result<&str, ModelError> {
        Ok(&self.get_joint(joint)?.parent)
    }

    pub fn get_child_link_of_joint(&self, joint: &str) -> Result<&str, ModelError> {
        Ok(&self.get_joint(joint)?.child)
    }

    pub fn get_child_joints_of_link(&self, link: &str) -> Result<&[String], ModelError> {
        self.get_link(link)?;
        Ok(self.child_joints_of_link.get(link).map(Vec::as_slice).unwrap_or(&[]))
    }

    /// Ordered path between two links. Walks up from `root` to the lowest common ancestor
    /// and down to `tip`, so `root` does not need to be an ancestor of `tip`.
    /// Joints are reported in the direction of travel. Without [`ChainFilter::FIXED`], fixed
    /// joints are skipped while links stay in place. A chain from a link to itself is empty.
    pub fn get_chain(&self, root: &str, tip: &str, filter: ChainFilter) -> Result<Vec<String>, ModelError> {
        self.get_link(root)?;
        self.get_link(tip)?;
        if root == tip {
            return Ok(Vec::new());
        }

        let root_path = self.path_to_root(root);
        let tip_path = self.path_to_root(tip);
        let on_root_path: HashSet<&str> = root_path.iter().copied().collect();
        let lca = tip_path.iter()
            .copied()
            .find(|link| on_root_path.contains(link))
            .ok_or_else(|| ModelError::Structural(format!(
                "links '{}' and '{}' share no common ancestor", root, tip)))?;

        let mut chain = Vec::new();

        // Up: root .. lca, each link followed by the joint connecting it to its parent
        for link in root_path.iter().take_while(|link| **link != lca) {
            if filter.contains(ChainFilter::LINKS) {
                chain.push(link.to_string());
            }
            self.push_joint(&mut chain, &self.parent_joint_of_link[*link], filter);
        }
        if filter.contains(ChainFilter::LINKS) {
            chain.push(lca.to_string());
        }

        // Down: lca .. tip
        let down: Vec<&str> = tip_path.iter().copied().take_while(|link| *link != lca).collect();
        for link in down.iter().rev() {
            self.push_joint(&mut chain, &self.parent_joint_of_link[*link], filter);
            if filter.contains(ChainFilter::LINKS) {
                chain.push(link.to_string());
            }
        }

        Ok(chain)
    }

    fn push_joint(&self, chain: &mut Vec<String>, joint: &str, filter: ChainFilter) {
        if filter.contains(ChainFilter::JOINTS)
            && (filter.contains(ChainFilter::FIXED) || self.joints[joint].joint_type != JointType::Fixed) {
            chain.push(joint.to_string());
        }
    }

    /// The link itself followed by all its ancestors up to the root.
    fn path_to_root<'a>(&'a self, link: &'a str) -> Vec<&'a str> {
        let mut path = vec![link];
        let mut current = link;
        while let Some(joint) = self.parent_joint_of_link.get(current) {
            current = &self.joints[joint].parent;
            path.push(current);
        }
        path
    }

    /// All joints (fixed included) on the chain from `root` to `tip`.
    pub fn get_joint_names_from_chain(&self, root: &str, tip: &str) -> Result<Vec<String>, ModelError> {
        self.get_chain(root, tip, ChainFilter::JOINTS | ChainFilter::FIXED)
    }

    pub fn get_joint_names_from_chain_controllable(&self, root: &str, tip: &str) -> Result<Vec<String>, ModelError> {
        Ok(self.get_joint_names_from_chain(root, tip)?
            .into_iter()
            .filter(|joint| self.is_controllable(&self.joints[joint]))
            .collect())
    }

    /// The link and everything below it, breadth first.
    fn descendants<'a>(&'a self, link: &'a str) -> Vec<&'a str> {
        let mut result = Vec::new();
        let mut queue = VecDeque::from([link]);
        let mut visited = HashSet::new();
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            result.push(current);
            if let Some(children) = self.child_joints_of_link.get(current) {
                for joint in children {
                    queue.push_back(self.joints[joint].child.as_str());
                }
            }
        }
        result
    }

    /// Names of the child link of the joint and all links below it.
    pub fn get_sub_tree_link_names(&self, joint: &str) -> Result<Vec<&str>, ModelError> {
        let child = &self.get_joint(joint)?.child;
        Ok(self.descendants(child))
    }

    /// Links moved by the joint that carry collision geometry.
    pub fn get_sub_tree_link_names_with_collision(&self, joint: &str) -> Result<BTreeSet<String>, ModelError> {
        Ok(self.get_sub_tree_link_names(joint)?
            .into_iter()
            .filter(|link| self.links[*link].has_collision())
            .map(str::to_string)
            .collect())
    }

    /// Independent copy of the part of the graph below the joint, rooted at its child link
    /// and named after it.
    pub fn get_sub_tree_at_joint(&self, joint: &str) -> Result<KinematicGraph, ModelError> {
        let root = self.get_child_link_of_joint(joint)?.to_string();
        let link_names: BTreeSet<&str> = self.get_sub_tree_link_names(joint)?.into_iter().collect();

        let links = link_names.iter()
            .map(|name| (name.to_string(), self.links[*name].clone()))
            .collect();
        let joints: BTreeMap<String, Joint> = self.joints.values()
            .filter(|j| link_names.contains(j.parent.as_str()))
            .map(|j| (j.name.clone(), j.clone()))
            .collect();
        let controlled = self.controlled_joints.as_ref().map(|names| names.iter()
            .filter(|name| joints.contains_key(*name))
            .cloned()
            .collect());

        Self::index(root, links, joints, controlled)
    }

    /// New graph with `sub_tree` grafted below `joint.parent` through `joint`, which must have
    /// the sub-tree root as its child. Fails without side effects on any name clash.
    pub fn with_sub_tree(&self, sub_tree: &KinematicGraph, joint: Joint) -> Result<KinematicGraph, ModelError> {
        self.get_link(&joint.parent)?;
        let sub_root = sub_tree.get_root()?;
        if joint.child != sub_root {
            return Err(ModelError::Structural(format!(
                "attachment joint '{}' must have the sub-tree root '{}' as a child, not '{}'",
                joint.name, sub_root, joint.child)));
        }
        for link in sub_tree.links.keys() {
            if self.links.contains_key(link) {
                return Err(ModelError::NameCollision(format!("link '{}' already exists", link)));
            }
        }
        for name in sub_tree.joints.keys().chain(std::iter::once(&joint.name)) {
            if self.joints.contains_key(name) {
                return Err(ModelError::NameCollision(format!("joint '{}' already exists", name)));
            }
        }
        if sub_tree.joints.contains_key(&joint.name) {
            return Err(ModelError::NameCollision(format!("joint '{}' already exists", joint.name)));
        }

        let mut links = self.links.clone();
        links.extend(sub_tree.links.iter().map(|(k, v)| (k.clone(), v.clone())));
        let mut joints = self.joints.clone();
        joints.extend(sub_tree.joints.iter().map(|(k, v)| (k.clone(), v.clone())));
        joints.insert(joint.name.clone(), joint);

        let graph = Self::index(self.name.clone(), links, joints, self.controlled_joints.clone())?;
        graph.validate_tree()?;
        Ok(graph)
    }

    /// New graph without the joint and everything below it. Also returns the removed link names.
    pub fn without_sub_tree(&self, joint: &str) -> Result<(KinematicGraph, Vec<String>), ModelError> {
        let removed_links: BTreeSet<String> = self.get_sub_tree_link_names(joint)?
            .into_iter()
            .map(str::to_string)
            .collect();

        let links = self.links.iter()
            .filter(|(name, _)| !removed_links.contains(*name))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let joints: BTreeMap<String, Joint> = self.joints.iter()
            .filter(|(name, j)| name.as_str() != joint && !removed_links.contains(&j.parent))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let controlled = self.controlled_joints.as_ref().map(|names| names.iter()
            .filter(|name| joints.contains_key(*name))
            .cloned()
            .collect());

        let graph = Self::index(self.name.clone(), links, joints, controlled)?;
        // a remaining joint may still mimic a removed one
        graph.validate_mimics()?;
        Ok((graph, removed_links.into_iter().collect()))
    }

    fn is_controllable(&self, joint: &Joint) -> bool {
        joint.joint_type.has_scalar_position() && !joint.is_mimic()
    }

    /// Joint can be commanded: revolute, continuous or prismatic, and not a mimic joint.
    pub fn is_joint_controllable(&self, name: &str) -> Result<bool, ModelError> {
        Ok(self.is_controllable(self.get_joint(name)?))
    }

    pub fn get_joint_names_controllable(&self) -> Vec<String> {
        self.joints.values()
            .filter(|joint| self.is_controllable(joint))
            .map(|joint| joint.name.clone())
            .collect()
    }

    /// Explicitly configured controlled joints, or all controllable joints otherwise.
    pub fn get_controlled_joints(&self) -> Vec<String> {
        match &self.controlled_joints {
            Some(names) => names.clone(),
            None => self.get_joint_names_controllable(),
        }
    }

    /// Position limits. Continuous joints and joints without a limit element report `(None, None)`.
    pub fn get_joint_limits(&self, name: &str) -> Result<(Option<f64>, Option<f64>), ModelError> {
        let joint = self.get_joint(name)?;
        if joint.joint_type == JointType::Continuous {
            return Ok((None, None));
        }
        Ok(joint.limit.map_or((None, None), |limit| (limit.lower, limit.upper)))
    }

    /// Limits of all movable joints that declare any. Position limits of continuous joints are dropped.
    pub fn get_all_joint_limits(&self) -> BTreeMap<String, JointLimit> {
        self.joints.values()
            .filter(|joint| joint.joint_type != JointType::Fixed)
            .filter_map(|joint| joint.limit.map(|limit| {
                let mut limit = limit;
                if joint.joint_type == JointType::Continuous {
                    limit.lower = None;
                    limit.upper = None;
                }
                (joint.name.clone(), limit)
            }))
            .collect()
    }

    pub fn get_joint_type(&self, name: &str) -> Result<JointType, ModelError> {
        Ok(self.get_joint(name)?.joint_type)
    }

    pub fn is_joint_continuous(&self, name: &str) -> Result<bool, ModelError> {
        Ok(self.get_joint_type(name)? == JointType::Continuous)
    }

    pub fn is_joint_mimic(&self, name: &str) -> Result<bool, ModelError> {
        Ok(self.get_joint(name)?.is_mimic())
    }

    pub fn is_rotational_joint(&self, name: &str) -> Result<bool, ModelError> {
        Ok(self.get_joint_type(name)?.is_rotational())
    }

    pub fn is_translational_joint(&self, name: &str) -> Result<bool, ModelError> {
        Ok(self.get_joint_type(name)?.is_translational())
    }

    pub fn has_link_collision(&self, name: &str) -> Result<bool, ModelError> {
        Ok(self.get_link(name)?.has_collision())
    }

    pub fn has_link_visuals(&self, name: &str) -> Result<bool, ModelError> {
        Ok(self.get_link(name)?.has_visuals())
    }

    /// Links carrying collision geometry, sorted by name.
    pub fn get_link_names_with_collision(&self) -> Vec<&str> {
        self.links.values()
            .filter(|link| link.has_collision())
            .map(|link| link.name.as_str())
            .collect()
    }

    /// True if a single joint connects the two links, in either direction.
    pub fn are_linked(&self, link_a: &str, link_b: &str) -> bool {
        let connects = |child: &str, parent: &str| self.parent_joint_of_link.get(child)
            .is_some_and(|joint| self.joints[joint].parent == parent);
        connects(link_a, link_b) || connects(link_b, link_a)
    }

    /// Links without child joints.
    pub fn get_leaves(&self) -> Vec<&str> {
        self.links.keys()
            .filter(|link| !self.child_joints_of_link.contains_key(*link))
            .map(String::as_str)
            .collect()
    }

    /// The link closest to the root (breadth first) that has collision geometry.
    pub fn get_first_link_with_collision(&self) -> Option<&str> {
        let root = self.get_root().ok()?;
        self.descendants(root)
            .into_iter()
            .find(|link| self.links[*link].has_collision())
    }

    /// First link below the virtual joints that move the whole robot around (like the
    /// x, y and yaw joints of a mobile base). This is the child of the last movable joint on
    /// the way from the root to the first link with collision, or the root if there is none.
    pub fn get_non_base_movement_root(&self) -> Result<&str, ModelError> {
        let root = self.get_root()?;
        let Some(body) = self.get_first_link_with_collision() else {
            return Ok(root);
        };
        let chain = self.get_joint_names_from_chain(root, body)?;
        Ok(chain.iter()
            .rev()
            .find(|joint| self.joints[*joint].joint_type != JointType::Fixed)
            .map(|joint| self.joints[joint].child.as_str())
            .unwrap_or(root))
    }
}
