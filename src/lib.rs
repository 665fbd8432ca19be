//! Kinematic tree model of a robot body with attachable sub-trees and a precomputed
//! self-collision matrix, for whole-body motion control.
//!
//! The robot is described as a rooted tree of links connected by joints, usually read from URDF.
//! On top of this tree the crate provides:
//!
//! # Features
//!
//! - Chain and sub-tree queries, with lowest common ancestor resolution so that chains can run
//!   between any two links (see [`kinematic_graph::KinematicGraph::get_chain`]).
//! - Attaching and detaching objects at runtime. Edits are copy-on-write and can always be
//!   reverted to the state before the first edit.
//! - Zero, limit and seeded random joint states of the controllable joints.
//! - Self-collision matrix computation by staged sampling: adjacent link pairs and pairs that are
//!   in contact already at the zero state are excluded, pairs found colliding in any sampled state
//!   are kept. Distances come from a pluggable oracle, a parry3d based one is included.
//! - Caching of computed matrices, keyed by the SHA-256 of the canonical robot description.
//! - A key-path data bus to pass joint states and other values between processing stages.
//!
//! ## Cargo features
//!
//! - **allow_filesystem**: URDF reading, the YAML matrix cache and the `self-collision-matrix` tool.
//! - **collisions**: the parry3d distance oracle, with parallel distance queries.
//!
//! ```
//! use rs_wholebody_model::collision_matrix::{LinkPair, SelfCollisionMatrix};
//! use rs_wholebody_model::attachment::ArticulatedBody;
//! use rs_wholebody_model::kinematic_graph::KinematicGraph;
//! use rs_wholebody_model::model::{Joint, JointType, Link, Origin};
//!
//! let arm = KinematicGraph::from_parts(
//!     "arm",
//!     vec![Link::new("base"), Link::new("hand")],
//!     vec![Joint::new("wrist", JointType::Continuous, "base", "hand")],
//! ).unwrap();
//! let mut body = ArticulatedBody::new(arm, SelfCollisionMatrix::new());
//!
//! let tool = KinematicGraph::from_parts("tool", vec![Link::new("tool")], vec![]).unwrap();
//! body.attach(&tool, "hand", Origin::from_xyz(0.0, 0.0, 0.1)).unwrap();
//! assert_eq!(body.graph().get_parent_link("tool").unwrap(), Some("hand"));
//!
//! body.reset();
//! assert!(!body.graph().has_link("tool"));
//! ```

pub mod model_error;
pub mod model;
pub mod kinematic_graph;
mod description;
mod forward_kinematics;

pub mod joint_state;
pub mod collision_matrix;
pub mod model_hash;
pub mod attachment;
pub mod databus;

#[path = "utils/utils.rs"]
pub mod utils;

#[cfg(feature = "allow_filesystem")]
pub mod urdf;

#[cfg(feature = "allow_filesystem")]
pub mod cache;

#[cfg(feature = "collisions")]
pub mod parry_world;

#[cfg(test)]
#[cfg(feature = "allow_filesystem")]
mod tests;
