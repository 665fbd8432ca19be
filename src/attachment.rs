//! Attaching and detaching sub-trees (grasped objects, tools) to a robot body.
//!
//! All edits are copy-on-write: the new graph and matrix are fully built first and then swapped
//! in, so a failing edit leaves the body exactly as it was. Before the first edit since the last
//! [`ArticulatedBody::reset`], the current graph and matrix are kept as the baseline that reset
//! restores. The baseline is a saved version, not an undo log.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};
use crate::collision_matrix::{DistanceOracle, JointStateSink, LinkPair, SelfCollisionMatrix, SelfCollisionMatrixBuilder};
use crate::kinematic_graph::KinematicGraph;
use crate::model::{Joint, JointType, Origin};
use crate::model_error::ModelError;

/// A sub-tree grafted onto the body.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    /// Joint connecting the sub-tree to the body
    pub joint: String,
    /// Root link of the sub-tree
    pub root_link: String,
    pub parent_link: String,
}

#[derive(Debug, Clone)]
struct Snapshot {
    graph: Arc<KinematicGraph>,
    matrix: Arc<SelfCollisionMatrix>,
    attachments: Vec<Attachment>,
}

/// Kinematic graph together with its self-collision matrix and attachment records.
/// The graph and matrix are shared immutable versions; readers holding an `Arc` keep seeing
/// the version they obtained.
#[derive(Debug, Clone)]
pub struct ArticulatedBody {
    graph: Arc<KinematicGraph>,
    matrix: Arc<SelfCollisionMatrix>,
    attachments: Vec<Attachment>,
    baseline: Option<Snapshot>,
}

impl ArticulatedBody {
    pub fn new(graph: KinematicGraph, matrix: SelfCollisionMatrix) -> Self {
        ArticulatedBody {
            graph: Arc::new(graph),
            matrix: Arc::new(matrix),
            attachments: Vec::new(),
            baseline: None,
        }
    }

    pub fn graph(&self) -> &Arc<KinematicGraph> {
        &self.graph
    }

    pub fn matrix(&self) -> &Arc<SelfCollisionMatrix> {
        &self.matrix
    }

    /// Replaces the matrix, like after computing it for the current graph.
    pub fn set_matrix(&mut self, matrix: SelfCollisionMatrix) {
        self.matrix = Arc::new(matrix);
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// True if there are edits that [`ArticulatedBody::reset`] would revert.
    pub fn is_modified(&self) -> bool {
        self.baseline.is_some()
    }

    /// Attaches the sub-tree to `parent_link` with a fixed joint at `origin`. The joint is named
    /// after the sub-tree root link. Returns the joint name.
    pub fn attach(&mut self, sub_tree: &KinematicGraph, parent_link: &str, origin: Origin)
                  -> Result<String, ModelError> {
        let root = sub_tree.get_root()?;
        let joint = Joint::new(root, JointType::Fixed, parent_link, root).with_origin(origin);
        self.attach_with_joint(sub_tree, joint)
    }

    /// Attaches the sub-tree through the given joint, that may be of any type. The joint must
    /// have the sub-tree root as child. Duplicate link or joint names are rejected with
    /// [`ModelError::NameCollision`] before anything changes.
    pub fn attach_with_joint(&mut self, sub_tree: &KinematicGraph, joint: Joint) -> Result<String, ModelError> {
        let attachment = Attachment {
            joint: joint.name.clone(),
            root_link: joint.child.clone(),
            parent_link: joint.parent.clone(),
        };
        let graph = self.graph.with_sub_tree(sub_tree, joint)?;

        self.ensure_baseline();
        self.graph = Arc::new(graph);
        info!("attached {} to {} with joint {}", attachment.root_link, attachment.parent_link, attachment.joint);
        let name = attachment.joint.clone();
        self.attachments.push(attachment);
        Ok(name)
    }

    /// Detaches an attached sub-tree, given by its attachment joint or its root link name.
    /// Attachments made onto the detached sub-tree go with it. Matrix entries of the removed
    /// links are dropped.
    pub fn detach(&mut self, name: &str) -> Result<Vec<String>, ModelError> {
        let joint = self.attachments.iter()
            .find(|a| a.joint == name || a.root_link == name)
            .map(|a| a.joint.clone())
            .ok_or_else(|| ModelError::UnknownLink(name.to_string()))?;
        self.remove_sub_tree(&joint)
    }

    /// Removes the joint and everything below it, attached or not. The removal is reverted
    /// by [`ArticulatedBody::reset`].
    pub fn detach_sub_tree(&mut self, joint: &str) -> Result<Vec<String>, ModelError> {
        self.remove_sub_tree(joint)
    }

    fn remove_sub_tree(&mut self, joint: &str) -> Result<Vec<String>, ModelError> {
        let (graph, removed) = self.graph.without_sub_tree(joint)?;
        let mut matrix = (*self.matrix).clone();
        let dropped = matrix.remove_links(&removed);

        self.ensure_baseline();
        self.graph = Arc::new(graph);
        self.matrix = Arc::new(matrix);
        let graph = &self.graph;
        self.attachments.retain(|a| graph.has_joint(&a.joint));
        info!("detached {} with {} links, {} matrix entries dropped", joint, removed.len(), dropped);
        Ok(removed)
    }

    /// Restores graph, matrix and attachments as they were before the first edit since
    /// the previous reset. Does nothing if there were no edits.
    pub fn reset(&mut self) {
        if let Some(snapshot) = self.baseline.take() {
            self.graph = snapshot.graph;
            self.matrix = snapshot.matrix;
            self.attachments = snapshot.attachments;
            info!("reset {} to baseline", self.graph.get_name());
        } else {
            debug!("reset of unmodified {}", self.graph.get_name());
        }
    }

    /// Extends the matrix with the pairs between the links of an attached sub-tree (given by
    /// its joint or root link) and all other links with collision geometry. Uses the same
    /// staged classification as for the whole body. Any other link with a parent joint is taken
    /// as the root of the sub-tree below that joint. The world must reflect the current graph.
    /// The extension is reverted by [`ArticulatedBody::reset`]. Returns the number of added pairs.
    pub fn add_self_collision_entries<W>(&mut self, name: &str, builder: &SelfCollisionMatrixBuilder,
                                         world: &mut W) -> Result<usize, ModelError>
    where
        W: DistanceOracle + JointStateSink,
    {
        let joint = match self.attachments.iter().find(|a| a.joint == name || a.root_link == name) {
            Some(attachment) => attachment.joint.clone(),
            None => self.graph.get_parent_joint_of_link(name)?
                .ok_or_else(|| ModelError::UnknownJoint(name.to_string()))?
                .to_string(),
        };
        let object_links = self.graph.get_sub_tree_link_names_with_collision(&joint)?;
        let pairs: BTreeSet<LinkPair> = self.graph.get_link_names_with_collision()
            .into_iter()
            .filter(|link| !object_links.contains(*link))
            .flat_map(|link| object_links.iter().map(move |object| LinkPair::new(object, link)))
            .collect();

        let added = builder.build_for_pairs(&self.graph, pairs, world)?;
        let count = added.len();
        let mut matrix = (*self.matrix).clone();
        matrix.extend(added);

        self.ensure_baseline();
        self.matrix = Arc::new(matrix);
        info!("{} self collision entries added for {}", count, name);
        Ok(count)
    }

    fn ensure_baseline(&mut self) {
        if self.baseline.is_none() {
            self.baseline = Some(Snapshot {
                graph: Arc::clone(&self.graph),
                matrix: Arc::clone(&self.matrix),
                attachments: self.attachments.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::joint_state::JointState;
    use crate::model::{Geometry, Link, LinkGeometry};

    fn solid(name: &str) -> Link {
        Link::new(name).with_collision(LinkGeometry::new(Geometry::Box { size: [0.1, 0.1, 0.1] }))
    }

    fn arm() -> ArticulatedBody {
        let graph = KinematicGraph::from_parts(
            "arm",
            vec![solid("base"), solid("upper"), solid("lower"), Link::new("gripper")],
            vec![
                Joint::new("shoulder", JointType::Revolute, "base", "upper").with_limits(-1.0, 1.0),
                Joint::new("elbow", JointType::Revolute, "upper", "lower").with_limits(-2.0, 2.0),
                Joint::fixed("wrist", "lower", "gripper"),
            ],
        ).expect("valid arm");
        let matrix = [LinkPair::new("base", "lower")].into_iter().collect();
        ArticulatedBody::new(graph, matrix)
    }

    fn cup() -> KinematicGraph {
        KinematicGraph::from_parts(
            "cup",
            vec![solid("cup"), solid("handle")],
            vec![Joint::fixed("cup_handle", "cup", "handle")],
        ).unwrap()
    }

    fn names(graph: &KinematicGraph) -> (Vec<String>, Vec<String>) {
        (graph.get_link_names().into_iter().map(String::from).collect(),
         graph.get_joint_names().into_iter().map(String::from).collect())
    }

    #[test]
    fn test_attach_and_reset() {
        let mut body = arm();
        let before = names(body.graph());
        let matrix_before = body.matrix().pairs();

        let joint = body.attach(&cup(), "gripper", Origin::from_xyz(0.0, 0.0, 0.1)).unwrap();
        assert_eq!(joint, "cup");
        assert!(body.graph().has_link("handle"));
        assert_eq!(body.graph().get_parent_link("cup").unwrap(), Some("gripper"));
        assert_eq!(body.graph().get_chain("base", "handle",
                   crate::kinematic_graph::ChainFilter::JOINTS).unwrap(),
                   vec!["shoulder", "elbow"]);

        body.reset();
        assert_eq!(names(body.graph()), before);
        assert_eq!(body.matrix().pairs(), matrix_before);
        assert!(body.attachments().is_empty());
        assert!(!body.is_modified());
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut body = arm();
        body.attach(&cup(), "gripper", Origin::identity()).unwrap();
        body.reset();
        let after_first = body.graph().clone();
        body.reset();
        assert_eq!(body.graph(), &after_first);
    }

    #[test]
    fn test_baseline_is_before_first_attach() {
        let mut body = arm();
        let original = Arc::clone(body.graph());
        body.attach(&cup(), "gripper", Origin::identity()).unwrap();
        let lid = KinematicGraph::from_parts("lid", vec![solid("lid")], vec![]).unwrap();
        body.attach(&lid, "cup", Origin::from_xyz(0.0, 0.0, 0.05)).unwrap();
        assert_eq!(body.attachments().len(), 2);
        body.reset();
        assert!(Arc::ptr_eq(body.graph(), &original));
    }

    #[test]
    fn test_name_collision_leaves_body_unchanged() {
        let mut body = arm();
        let graph = Arc::clone(body.graph());
        let clash = KinematicGraph::from_parts("clash", vec![solid("upper")], vec![]).unwrap();
        let result = body.attach(&clash, "gripper", Origin::identity());
        assert!(matches!(result, Err(ModelError::NameCollision(_))));
        assert!(Arc::ptr_eq(body.graph(), &graph));
        assert!(!body.is_modified());

        let result = body.attach(&cup(), "no_such_link", Origin::identity());
        assert!(matches!(result, Err(ModelError::UnknownLink(_))));
    }

    #[test]
    fn test_detach() {
        let mut body = arm();
        let before = names(body.graph());
        body.attach(&cup(), "gripper", Origin::identity()).unwrap();
        let mut removed = body.detach("cup").unwrap();
        removed.sort();
        assert_eq!(removed, vec!["cup", "handle"]);
        assert_eq!(names(body.graph()), before);
        assert!(body.attachments().is_empty());

        assert!(matches!(body.detach("elbow"), Err(ModelError::UnknownLink(_))));
        assert!(matches!(body.detach("cup"), Err(ModelError::UnknownLink(_))));
    }

    #[test]
    fn test_detach_nested_attachment() {
        let mut body = arm();
        body.attach(&cup(), "gripper", Origin::identity()).unwrap();
        let lid = KinematicGraph::from_parts("lid", vec![solid("lid")], vec![]).unwrap();
        body.attach(&lid, "handle", Origin::identity()).unwrap();
        body.detach("cup").unwrap();
        assert!(!body.graph().has_link("lid"));
        assert!(body.attachments().is_empty());
    }

    #[test]
    fn test_detach_sub_tree_drops_matrix_entries() {
        let mut body = arm();
        body.detach_sub_tree("elbow").unwrap();
        assert!(!body.graph().has_link("lower"));
        assert!(body.matrix().is_empty());
        body.reset();
        assert!(body.graph().has_link("lower"));
        assert!(body.matrix().contains("lower", "base"));
    }

    /// Objects come close to the base in any moved state.
    struct ReachWorld {
        moved: bool,
    }

    impl DistanceOracle for ReachWorld {
        fn distance(&self, link_a: &str, link_b: &str) -> Result<f64, ModelError> {
            let pair = LinkPair::new(link_a, link_b);
            Ok(if self.moved && pair.contains("base") { -0.02 } else { 0.5 })
        }
    }

    impl JointStateSink for ReachWorld {
        fn apply(&mut self, joint_state: &JointState) -> Result<(), ModelError> {
            self.moved = joint_state.iter().any(|(_, s)| s.position != 0.0);
            Ok(())
        }
    }

    #[test]
    fn test_add_self_collision_entries() {
        let mut body = arm();
        body.attach(&cup(), "gripper", Origin::identity()).unwrap();
        let mut world = ReachWorld { moved: false };
        let added = body.add_self_collision_entries("cup", &SelfCollisionMatrixBuilder::default(), &mut world)
            .unwrap();
        assert_eq!(added, 2);
        assert!(body.matrix().contains("cup", "base"));
        assert!(body.matrix().contains("handle", "base"));
        assert!(body.matrix().contains("base", "lower"));

        body.detach("cup").unwrap();
        assert_eq!(body.matrix().pairs(), BTreeSet::from([LinkPair::new("base", "lower")]));
    }

    #[test]
    fn test_reset_reverts_added_entries() {
        let graph = (**arm().graph()).clone();
        let mut body = ArticulatedBody::new(graph, SelfCollisionMatrix::new());
        let mut world = ReachWorld { moved: false };

        let added = body.add_self_collision_entries("lower", &SelfCollisionMatrixBuilder::default(), &mut world)
            .unwrap();
        assert_eq!(added, 1);
        assert!(body.matrix().contains("base", "lower"));
        assert!(body.is_modified());

        body.reset();
        assert!(body.matrix().is_empty());
        assert!(!body.is_modified());
    }
}
