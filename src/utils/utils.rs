//! Helper functions

use crate::collision_matrix::SelfCollisionMatrix;
use crate::joint_state::JointState;

/// Joint state as text, one `name: position (velocity)` line per joint. Rotational positions
/// are shown in degrees when the joint name is listed in `rotational`.
pub fn format_joint_state(state: &JointState, rotational: &[&str]) -> String {
    if state.is_empty() {
        return "No joints".to_string();
    }
    let width = state.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    let mut rows = Vec::with_capacity(state.len());
    for (name, joint) in state.iter() {
        let row = if rotational.contains(&name) {
            format!("{:width$}: {:8.2}° ({:.3})", name, joint.position.to_degrees(), joint.velocity)
        } else {
            format!("{:width$}: {:8.4}  ({:.3})", name, joint.position, joint.velocity)
        };
        rows.push(row);
    }
    rows.join("\n")
}

/// Print the joint state, converting rotational positions to degrees.
#[allow(dead_code)]
pub fn dump_joint_state(state: &JointState, rotational: &[&str]) {
    println!("{}", format_joint_state(state, rotational));
}

/// Print the link pairs of the matrix, one per line.
pub fn dump_self_collision_matrix(matrix: &SelfCollisionMatrix) {
    if matrix.is_empty() {
        println!("No link pairs");
    }
    for (pair, distance) in matrix.iter() {
        match distance {
            Some(distance) => println!("{} - {} ({:.3})", pair.first(), pair.second(), distance),
            None => println!("{} - {}", pair.first(), pair.second()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_joint_state() {
        let mut state = JointState::new();
        state.set_position("shoulder", std::f64::consts::FRAC_PI_2);
        state.set_position("rail", 0.25);
        let text = format_joint_state(&state, &["shoulder"]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("rail    :"));
        assert!(lines[0].contains("0.2500"));
        assert!(lines[1].contains("90.00°"));
        assert_eq!(format_joint_state(&JointState::new(), &[]), "No joints");
    }
}
