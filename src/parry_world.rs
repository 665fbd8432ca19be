//! Distance oracle backed by parry3d, using the primitive collision shapes of the links.
//!
//! Boxes, spheres and cylinders are supported. Mesh geometry is not loaded; links that only
//! have meshes are reported at infinite distance from everything, so they never enter the
//! self-collision matrix.

use std::collections::BTreeMap;
use std::f32::consts::FRAC_PI_2;
use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use parry3d::shape::SharedShape;
use rayon::prelude::{IntoParallelRefIterator, ParallelIterator};
use tracing::debug;
use crate::collision_matrix::{DistanceOracle, JointStateSink, LinkPair};
use crate::joint_state::JointState;
use crate::kinematic_graph::KinematicGraph;
use crate::model::{Geometry, LinkGeometry};
use crate::model_error::ModelError;

/// Collision shape with its pose in the link frame.
struct LinkShape {
    local: Isometry3<f32>,
    shape: SharedShape,
}

/// Collision scene of a single robot. Applying a joint state moves the links, distances are
/// then measured between the shapes in their new poses.
pub struct ParryWorld {
    graph: KinematicGraph,
    shapes: BTreeMap<String, Vec<LinkShape>>,
    poses: BTreeMap<String, Isometry3<f32>>,
}

impl ParryWorld {
    /// Builds the scene with all joints at 0.
    pub fn new(graph: &KinematicGraph) -> Result<Self, ModelError> {
        let mut shapes = BTreeMap::new();
        for link in graph.links() {
            let link_shapes: Vec<LinkShape> = link.collision.iter()
                .filter_map(|element| {
                    let shape = to_shape(element);
                    if shape.is_none() {
                        debug!("link {}: mesh collision geometry skipped", link.name);
                    }
                    shape
                })
                .collect();
            if !link_shapes.is_empty() {
                shapes.insert(link.name.clone(), link_shapes);
            }
        }
        let mut world = ParryWorld {
            graph: graph.clone(),
            shapes,
            poses: BTreeMap::new(),
        };
        world.apply(&JointState::new())?;
        Ok(world)
    }

    pub fn graph(&self) -> &KinematicGraph {
        &self.graph
    }

    /// Current pose of the link in the root frame.
    pub fn link_pose(&self, link: &str) -> Result<Isometry3<f32>, ModelError> {
        self.poses.get(link)
            .copied()
            .ok_or_else(|| ModelError::UnknownLink(link.to_string()))
    }
}

fn to_shape(element: &LinkGeometry) -> Option<LinkShape> {
    let origin = element.origin.to_isometry().cast::<f32>();
    let (shape, local) = match &element.geometry {
        Geometry::Box { size } => (
            SharedShape::cuboid(size[0] as f32 / 2.0, size[1] as f32 / 2.0, size[2] as f32 / 2.0),
            origin,
        ),
        Geometry::Sphere { radius } => (SharedShape::ball(*radius as f32), origin),
        Geometry::Cylinder { radius, length } => (
            SharedShape::cylinder(*length as f32 / 2.0, *radius as f32),
            // parry3d cylinders are along y, URDF cylinders along z
            origin * Isometry3::from_parts(
                Translation3::identity(),
                UnitQuaternion::from_axis_angle(&Vector3::x_axis(), FRAC_PI_2),
            ),
        ),
        Geometry::Mesh { .. } => return None,
    };
    Some(LinkShape { local, shape })
}

/// Signed distance between two shapes: negative penetration depth if they overlap.
fn signed_distance(pose_a: &Isometry3<f32>, a: &LinkShape,
                   pose_b: &Isometry3<f32>, b: &LinkShape) -> Result<f64, ModelError> {
    let iso_a = pose_a * a.local;
    let iso_b = pose_b * b.local;
    let distance = parry3d::query::distance(&iso_a, &*a.shape, &iso_b, &*b.shape)
        .map_err(|e| ModelError::Unsupported(format!("{:?}", e)))?;
    if distance > 0.0 {
        return Ok(distance as f64);
    }
    let contact = parry3d::query::contact(&iso_a, &*a.shape, &iso_b, &*b.shape, 0.0)
        .map_err(|e| ModelError::Unsupported(format!("{:?}", e)))?;
    Ok(contact.map(|c| c.dist.min(0.0)).unwrap_or(0.0) as f64)
}

impl DistanceOracle for ParryWorld {
    fn distance(&self, link_a: &str, link_b: &str) -> Result<f64, ModelError> {
        let pose_a = self.link_pose(link_a)?;
        let pose_b = self.link_pose(link_b)?;
        let (Some(shapes_a), Some(shapes_b)) = (self.shapes.get(link_a), self.shapes.get(link_b)) else {
            return Ok(f64::INFINITY);
        };
        let mut closest = f64::INFINITY;
        for a in shapes_a {
            for b in shapes_b {
                closest = closest.min(signed_distance(&pose_a, a, &pose_b, b)?);
            }
        }
        Ok(closest)
    }

    fn distances(&self, pairs: &[LinkPair]) -> Result<Vec<f64>, ModelError> {
        pairs.par_iter()
            .map(|pair| self.distance(pair.first(), pair.second()))
            .collect()
    }
}

impl JointStateSink for ParryWorld {
    fn apply(&mut self, joint_state: &JointState) -> Result<(), ModelError> {
        self.poses = self.graph.link_poses(joint_state)?
            .into_iter()
            .map(|(link, pose)| (link, pose.cast::<f32>()))
            .collect();
        Ok(())
    }
}
