use crate::kinematic_graph::ChainFilter;
use crate::model_hash::ModelHash;
use crate::tests::test_utils::{load_robot, MOBILE_ROBOT, TWO_LINK};
use crate::urdf::from_urdf;

#[test]
fn test_two_link() {
    let robot = load_robot(TWO_LINK).unwrap();
    assert_eq!(robot.get_name(), "two_link");
    assert_eq!(robot.get_root().unwrap(), "link1");
    assert_eq!(robot.get_link_names_with_collision(), vec!["link1", "link2"]);
    let (lower, upper) = robot.get_joint_limits("joint1").unwrap();
    assert!((lower.unwrap() + 170f64.to_radians()).abs() < 1e-12);
    assert!((upper.unwrap() - 170f64.to_radians()).abs() < 1e-12);
}

#[test]
fn test_chain_to_self_is_empty() {
    let robot = load_robot(MOBILE_ROBOT).unwrap();
    for link in robot.get_link_names() {
        for filter in [ChainFilter::all(), ChainFilter::JOINTS, ChainFilter::LINKS, ChainFilter::empty()] {
            assert!(robot.get_chain(link, link, filter).unwrap().is_empty(), "{} {:?}", link, filter);
        }
    }
}

#[test]
fn test_arm_chain_reverses() {
    let robot = load_robot(MOBILE_ROBOT).unwrap();
    let joints = ChainFilter::JOINTS | ChainFilter::FIXED;
    let down = robot.get_chain("torso", "l_tool_frame", joints).unwrap();
    assert_eq!(down, vec!["l_shoulder_joint", "l_elbow_joint", "l_tool_joint"]);
    let mut up = robot.get_chain("l_tool_frame", "torso", joints).unwrap();
    up.reverse();
    assert_eq!(up, down);
}

#[test]
fn test_chain_across_arms() {
    let robot = load_robot(MOBILE_ROBOT).unwrap();
    let chain = robot.get_chain("l_forearm", "r_forearm", ChainFilter::LINKS).unwrap();
    assert_eq!(chain, vec!["l_forearm", "l_upper_arm", "torso", "r_upper_arm", "r_forearm"]);
    let controllable = robot.get_joint_names_from_chain_controllable("l_tool_frame", "r_tool_frame").unwrap();
    assert_eq!(controllable, vec!["l_elbow_joint", "l_shoulder_joint", "r_shoulder_joint", "r_elbow_joint"]);
}

#[test]
fn test_base_queries() {
    let robot = load_robot(MOBILE_ROBOT).unwrap();
    assert_eq!(robot.get_root().unwrap(), "odom");
    assert_eq!(robot.get_first_link_with_collision(), Some("base_link"));
    assert_eq!(robot.get_non_base_movement_root().unwrap(), "base_footprint");
    assert!(robot.is_joint_continuous("odom_z_joint").unwrap());
    assert_eq!(robot.get_joint_limits("odom_z_joint").unwrap(), (None, None));

    let mut leaves = robot.get_leaves();
    leaves.sort();
    assert_eq!(leaves, vec!["head", "l_tool_frame", "r_tool_frame"]);

    let arm = robot.get_sub_tree_link_names_with_collision("l_shoulder_joint").unwrap();
    assert_eq!(arm.into_iter().collect::<Vec<_>>(), vec!["l_forearm", "l_upper_arm"]);
}

#[test]
fn test_description_hash_survives_reparse() {
    let robot = load_robot(MOBILE_ROBOT).unwrap();
    let reparsed = from_urdf(&robot.to_urdf()).unwrap();
    assert_eq!(reparsed, robot);
    assert_eq!(ModelHash::of_graph(&reparsed), ModelHash::of_graph(&robot));
    assert_ne!(ModelHash::of_graph(&robot), ModelHash::of_graph(&load_robot(TWO_LINK).unwrap()));
}
