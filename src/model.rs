//! Links and joints of the articulated body. Joints reference links by name only,
//! the structure itself is owned by [`crate::kinematic_graph::KinematicGraph`].

use nalgebra::{Isometry3, Translation3, Unit, UnitQuaternion, Vector3};
use crate::model_error::ModelError;

/// Offset of a joint frame or a geometry relative to the parent frame, as found in URDF:
/// translation and roll, pitch, yaw (fixed axes, X then Y then Z).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Origin {
    pub xyz: [f64; 3],
    pub rpy: [f64; 3],
}

impl Origin {
    pub fn identity() -> Self {
        Origin::default()
    }

    pub fn from_xyz(x: f64, y: f64, z: f64) -> Self {
        Origin {
            xyz: [x, y, z],
            rpy: [0.0; 3],
        }
    }

    pub fn new(xyz: [f64; 3], rpy: [f64; 3]) -> Self {
        Origin { xyz, rpy }
    }

    pub fn to_isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(
            Translation3::new(self.xyz[0], self.xyz[1], self.xyz[2]),
            UnitQuaternion::from_euler_angles(self.rpy[0], self.rpy[1], self.rpy[2]),
        )
    }
}

/// Geometric primitive of a visual or collision element.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    /// Box with full side lengths along x, y, z.
    Box { size: [f64; 3] },
    /// Cylinder aligned with the local z axis.
    Cylinder { radius: f64, length: f64 },
    Sphere { radius: f64 },
    Mesh { filename: String, scale: [f64; 3] },
}

/// Geometry placed in the link frame.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkGeometry {
    pub origin: Origin,
    pub geometry: Geometry,
}

impl LinkGeometry {
    pub fn new(geometry: Geometry) -> Self {
        LinkGeometry {
            origin: Origin::identity(),
            geometry,
        }
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }
}

/// Rigid body frame of the articulated model.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub name: String,
    pub collision: Vec<LinkGeometry>,
    pub visual: Vec<LinkGeometry>,
}

impl Link {
    pub fn new(name: &str) -> Self {
        Link {
            name: name.to_string(),
            collision: Vec::new(),
            visual: Vec::new(),
        }
    }

    /// Adds collision geometry. Visual geometry is set to the same shape if not yet defined,
    /// as this is what nearly every hand-built body wants.
    pub fn with_collision(mut self, geometry: LinkGeometry) -> Self {
        if self.visual.is_empty() {
            self.visual.push(geometry.clone());
        }
        self.collision.push(geometry);
        self
    }

    pub fn with_visual(mut self, geometry: LinkGeometry) -> Self {
        self.visual.push(geometry);
        self
    }

    pub fn has_collision(&self) -> bool {
        !self.collision.is_empty()
    }

    pub fn has_visuals(&self) -> bool {
        !self.visual.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JointType {
    Fixed,
    Revolute,
    Continuous,
    Prismatic,
    Planar,
    Floating,
}

impl JointType {
    pub fn parse(value: &str) -> Result<Self, ModelError> {
        match value {
            "fixed" => Ok(JointType::Fixed),
            "revolute" => Ok(JointType::Revolute),
            "continuous" => Ok(JointType::Continuous),
            "prismatic" => Ok(JointType::Prismatic),
            "planar" => Ok(JointType::Planar),
            "floating" => Ok(JointType::Floating),
            other => Err(ModelError::ParseError(format!("Unknown joint type '{}'", other))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JointType::Fixed => "fixed",
            JointType::Revolute => "revolute",
            JointType::Continuous => "continuous",
            JointType::Prismatic => "prismatic",
            JointType::Planar => "planar",
            JointType::Floating => "floating",
        }
    }

    pub fn is_rotational(&self) -> bool {
        matches!(self, JointType::Revolute | JointType::Continuous)
    }

    pub fn is_translational(&self) -> bool {
        matches!(self, JointType::Prismatic)
    }

    /// Joint is described by a single position value that can be commanded.
    pub fn has_scalar_position(&self) -> bool {
        self.is_rotational() || self.is_translational()
    }
}

/// Joint limits as in URDF. Each value may be independently absent.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JointLimit {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub velocity: Option<f64>,
    pub effort: Option<f64>,
}

impl JointLimit {
    pub fn position(lower: f64, upper: f64) -> Self {
        JointLimit {
            lower: Some(lower),
            upper: Some(upper),
            ..JointLimit::default()
        }
    }
}

/// Joint slaved to another: position = multiplier * master + offset.
#[derive(Debug, Clone, PartialEq)]
pub struct Mimic {
    pub joint: String,
    pub multiplier: f64,
    pub offset: f64,
}

impl Mimic {
    pub fn new(joint: &str) -> Self {
        Mimic {
            joint: joint.to_string(),
            multiplier: 1.0,
            offset: 0.0,
        }
    }

    pub fn position(&self, master_position: f64) -> f64 {
        self.multiplier * master_position + self.offset
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    pub name: String,
    pub joint_type: JointType,
    /// Parent link name
    pub parent: String,
    /// Child link name
    pub child: String,
    pub origin: Origin,
    /// Rotation or translation axis in the joint frame. URDF default is x.
    pub axis: [f64; 3],
    pub limit: Option<JointLimit>,
    pub mimic: Option<Mimic>,
}

impl Joint {
    pub fn new(name: &str, joint_type: JointType, parent: &str, child: &str) -> Self {
        Joint {
            name: name.to_string(),
            joint_type,
            parent: parent.to_string(),
            child: child.to_string(),
            origin: Origin::identity(),
            axis: [1.0, 0.0, 0.0],
            limit: None,
            mimic: None,
        }
    }

    pub fn fixed(name: &str, parent: &str, child: &str) -> Self {
        Joint::new(name, JointType::Fixed, parent, child)
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_axis(mut self, axis: [f64; 3]) -> Self {
        self.axis = axis;
        self
    }

    pub fn with_limits(mut self, lower: f64, upper: f64) -> Self {
        let velocity = self.limit.and_then(|l| l.velocity);
        let effort = self.limit.and_then(|l| l.effort);
        self.limit = Some(JointLimit {
            lower: Some(lower),
            upper: Some(upper),
            velocity,
            effort,
        });
        self
    }

    pub fn with_limit(mut self, limit: JointLimit) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_mimic(mut self, mimic: Mimic) -> Self {
        self.mimic = Some(mimic);
        self
    }

    pub fn is_mimic(&self) -> bool {
        self.mimic.is_some()
    }

    /// Transform of the child frame relative to the parent frame at the given joint position.
    /// Planar and floating joints cannot be driven by a single value and stay at their origin.
    pub fn transform(&self, position: f64) -> Isometry3<f64> {
        self.origin.to_isometry() * self.motion(position)
    }

    fn motion(&self, position: f64) -> Isometry3<f64> {
        let axis = Vector3::new(self.axis[0], self.axis[1], self.axis[2]);
        if axis.norm() == 0.0 {
            return Isometry3::identity();
        }
        match self.joint_type {
            JointType::Revolute | JointType::Continuous => Isometry3::from_parts(
                Translation3::identity(),
                UnitQuaternion::from_axis_angle(&Unit::new_normalize(axis), position),
            ),
            JointType::Prismatic => {
                let shift = axis.normalize() * position;
                Isometry3::translation(shift.x, shift.y, shift.z)
            }
            _ => Isometry3::identity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;
    use super::*;

    const SMALL: f64 = 1e-9;

    #[test]
    fn test_joint_type_parse() {
        assert_eq!(JointType::parse("continuous").unwrap(), JointType::Continuous);
        assert_eq!(JointType::parse("prismatic").unwrap(), JointType::Prismatic);
        assert!(JointType::parse("ball").is_err());
        for t in [JointType::Fixed, JointType::Revolute, JointType::Continuous,
            JointType::Prismatic, JointType::Planar, JointType::Floating] {
            assert_eq!(JointType::parse(t.as_str()).unwrap(), t);
        }
    }

    #[test]
    fn test_revolute_transform() {
        let joint = Joint::new("j", JointType::Revolute, "a", "b")
            .with_origin(Origin::from_xyz(0.0, 0.0, 1.0))
            .with_axis([0.0, 0.0, 1.0]);
        let pose = joint.transform(PI / 2.0);
        // Point one meter along x in the child frame ends up along y in the parent frame
        let p = pose.transform_point(&nalgebra::Point3::new(1.0, 0.0, 0.0));
        assert!((p.x - 0.0).abs() < SMALL);
        assert!((p.y - 1.0).abs() < SMALL);
        assert!((p.z - 1.0).abs() < SMALL);
    }

    #[test]
    fn test_prismatic_transform() {
        let joint = Joint::new("j", JointType::Prismatic, "a", "b")
            .with_axis([0.0, 2.0, 0.0]);
        let pose = joint.transform(0.25);
        assert!((pose.translation.vector.y - 0.25).abs() < SMALL);
    }

    #[test]
    fn test_mimic_position() {
        let mimic = Mimic { joint: "master".to_string(), multiplier: -2.0, offset: 0.5 };
        assert_eq!(mimic.position(1.0), -1.5);
    }

    #[test]
    fn test_with_limits_keeps_velocity() {
        let joint = Joint::new("j", JointType::Revolute, "a", "b")
            .with_limit(JointLimit { velocity: Some(3.0), ..JointLimit::default() })
            .with_limits(-1.0, 1.0);
        let limit = joint.limit.unwrap();
        assert_eq!(limit.lower, Some(-1.0));
        assert_eq!(limit.upper, Some(1.0));
        assert_eq!(limit.velocity, Some(3.0));
    }
}
