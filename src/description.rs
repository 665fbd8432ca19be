//! Canonical URDF text of a kinematic graph. Links and joints are written sorted by name with
//! every number in full precision, so equal graphs always produce byte-identical descriptions.

use std::fmt::Write;
use crate::kinematic_graph::KinematicGraph;
use crate::model::{Geometry, Joint, Link, LinkGeometry, Origin};

impl KinematicGraph {
    /// Serialize to URDF. The result can be read back with [`crate::urdf::from_urdf`].
    pub fn to_urdf(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "<?xml version=\"1.0\"?>");
        let _ = writeln!(out, "<robot name=\"{}\">", escape(self.get_name()));
        for link in self.links() {
            write_link(&mut out, link);
        }
        for joint in self.joints() {
            write_joint(&mut out, joint);
        }
        out.push_str("</robot>\n");
        out
    }
}

fn write_link(out: &mut String, link: &Link) {
    if link.visual.is_empty() && link.collision.is_empty() {
        let _ = writeln!(out, "  <link name=\"{}\"/>", escape(&link.name));
        return;
    }
    let _ = writeln!(out, "  <link name=\"{}\">", escape(&link.name));
    for visual in &link.visual {
        write_geometry(out, "visual", visual);
    }
    for collision in &link.collision {
        write_geometry(out, "collision", collision);
    }
    out.push_str("  </link>\n");
}

fn write_geometry(out: &mut String, tag: &str, element: &LinkGeometry) {
    let _ = writeln!(out, "    <{}>", tag);
    write_origin(out, "      ", &element.origin);
    out.push_str("      <geometry>\n");
    let _ = match &element.geometry {
        Geometry::Box { size } =>
            writeln!(out, "        <box size=\"{}\"/>", triple(size)),
        Geometry::Cylinder { radius, length } =>
            writeln!(out, "        <cylinder radius=\"{:?}\" length=\"{:?}\"/>", radius, length),
        Geometry::Sphere { radius } =>
            writeln!(out, "        <sphere radius=\"{:?}\"/>", radius),
        Geometry::Mesh { filename, scale } =>
            writeln!(out, "        <mesh filename=\"{}\" scale=\"{}\"/>", escape(filename), triple(scale)),
    };
    out.push_str("      </geometry>\n");
    let _ = writeln!(out, "    </{}>", tag);
}

fn write_joint(out: &mut String, joint: &Joint) {
    let _ = writeln!(out, "  <joint name=\"{}\" type=\"{}\">",
                     escape(&joint.name), joint.joint_type.as_str());
    write_origin(out, "    ", &joint.origin);
    let _ = writeln!(out, "    <parent link=\"{}\"/>", escape(&joint.parent));
    let _ = writeln!(out, "    <child link=\"{}\"/>", escape(&joint.child));
    let _ = writeln!(out, "    <axis xyz=\"{}\"/>", triple(&joint.axis));
    if let Some(limit) = &joint.limit {
        out.push_str("    <limit");
        for (name, value) in [("lower", limit.lower), ("upper", limit.upper),
            ("effort", limit.effort), ("velocity", limit.velocity)] {
            if let Some(value) = value {
                let _ = write!(out, " {}=\"{:?}\"", name, value);
            }
        }
        out.push_str("/>\n");
    }
    if let Some(mimic) = &joint.mimic {
        let _ = writeln!(out, "    <mimic joint=\"{}\" multiplier=\"{:?}\" offset=\"{:?}\"/>",
                         escape(&mimic.joint), mimic.multiplier, mimic.offset);
    }
    out.push_str("  </joint>\n");
}

fn write_origin(out: &mut String, indent: &str, origin: &Origin) {
    let _ = writeln!(out, "{}<origin xyz=\"{}\" rpy=\"{}\"/>",
                     indent, triple(&origin.xyz), triple(&origin.rpy));
}

fn triple(values: &[f64; 3]) -> String {
    format!("{:?} {:?} {:?}", values[0], values[1], values[2])
}

fn escape(value: &str) -> String {
    value.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
