//! Link poses of a kinematic graph at a given joint state.

use std::collections::{BTreeMap, VecDeque};
use nalgebra::Isometry3;
use crate::joint_state::JointState;
use crate::kinematic_graph::{KinematicGraph, MAX_MIMIC_DEPTH};
use crate::model_error::ModelError;

impl KinematicGraph {
    /// Position of the joint in the state. Joints missing from the state are at 0. Mimic joints
    /// follow their master through multiplier and offset, whatever the state says about them.
    pub fn joint_position(&self, state: &JointState, joint: &str) -> Result<f64, ModelError> {
        let mut name = joint;
        let mut chain = Vec::new();
        loop {
            let current = self.get_joint(name)?;
            match &current.mimic {
                Some(mimic) => {
                    if chain.len() >= MAX_MIMIC_DEPTH {
                        return Err(ModelError::Structural(format!("mimic cycle at joint '{}'", joint)));
                    }
                    chain.push(mimic);
                    name = &mimic.joint;
                }
                None => break,
            }
        }
        let master = state.position(name).unwrap_or(0.0);
        Ok(chain.iter().rev().fold(master, |position, mimic| mimic.position(position)))
    }

    /// Pose of every link in the root frame, computed breadth first from the root.
    pub fn link_poses(&self, state: &JointState) -> Result<BTreeMap<String, Isometry3<f64>>, ModelError> {
        let root = self.get_root()?;
        let mut poses = BTreeMap::new();
        poses.insert(root.to_string(), Isometry3::identity());
        let mut queue = VecDeque::from([root]);
        while let Some(link) = queue.pop_front() {
            let parent_pose = poses[link];
            for joint_name in self.get_child_joints_of_link(link)? {
                let joint = self.get_joint(joint_name)?;
                let position = self.joint_position(state, joint_name)?;
                poses.insert(joint.child.clone(), parent_pose * joint.transform(position));
                queue.push_back(joint.child.as_str());
            }
        }
        Ok(poses)
    }
}
