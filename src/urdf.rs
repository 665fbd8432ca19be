//! Reads the kinematic graph from URDF (optional, requires `allow_filesystem`)

extern crate sxd_document;

use std::fs::read_to_string;
use std::path::Path;
use regex::Regex;
use sxd_document::{dom, parser};
use crate::kinematic_graph::KinematicGraph;
use crate::model::{Geometry, Joint, JointLimit, JointType, Link, LinkGeometry, Mimic, Origin};
use crate::model_error::ModelError;

/// Reads the URDF file into the kinematic graph. XACRO files with already expanded macros
/// may also work, as links and joints are collected at any nesting depth.
///
/// # Example
/// ```
/// let robot = rs_wholebody_model::urdf::from_urdf_file("src/tests/data/two_link.urdf")
///     .expect("Failed to read two link robot");
/// assert_eq!(robot.get_root().unwrap(), "link1");
/// ```
pub fn from_urdf_file<P: AsRef<Path>>(path: P) -> Result<KinematicGraph, ModelError> {
    let xml_content = read_to_string(path)?;
    from_urdf(&xml_content)
}

/// Parses URDF XML content. Links carry their visual and collision geometry, joints
/// their type, origin, axis, limits and mimic relationship. Elements inside `transmission`
/// and `gazebo` blocks are ignored.
///
/// # Returns
/// - The validated kinematic graph, or a detailed error. Broken tree structure is reported
///   as [`ModelError::Structural`].
pub fn from_urdf(xml_content: &str) -> Result<KinematicGraph, ModelError> {
    let package = parser::parse(xml_content)
        .map_err(|e| ModelError::XmlProcessingError(format!("Failed to parse XML: {:?}", e)))?;
    let document = package.as_document();

    let root_element = document.root().children().into_iter()
        .find_map(|e| e.element())
        .ok_or_else(|| ModelError::XmlProcessingError("No root element found".into()))?;

    if root_element.name().local_part() != "robot" {
        return Err(ModelError::XmlProcessingError(format!(
            "Root element must be 'robot', not '{}'", root_element.name().local_part())));
    }
    let name = root_element.attribute("name")
        .map(|attr| attr.value().to_string())
        .unwrap_or_else(|| "robot".to_string());

    let mut links = Vec::new();
    let mut joints = Vec::new();
    collect_elements(root_element, &mut links, &mut joints)?;

    KinematicGraph::from_parts(&name, links, joints)
}

// Recursive function to collect links and joints
fn collect_elements(element: dom::Element, links: &mut Vec<Link>, joints: &mut Vec<Joint>) -> Result<(), ModelError> {
    for child in element.children().into_iter().filter_map(|e| e.element()) {
        match child.name().local_part() {
            "link" => links.push(read_link(child)?),
            "joint" => joints.push(read_joint(child)?),
            "transmission" | "gazebo" => {}
            _ => collect_elements(child, links, joints)?,
        }
    }
    Ok(())
}

fn children_named<'d>(element: dom::Element<'d>, tag: &'d str) -> impl Iterator<Item=dom::Element<'d>> + 'd {
    element.children().into_iter()
        .filter_map(|e| e.element())
        .filter(move |el| el.name().local_part() == tag)
}

fn child_named<'d>(element: dom::Element<'d>, tag: &'d str) -> Option<dom::Element<'d>> {
    children_named(element, tag).next()
}

fn required_attribute(element: dom::Element, name: &str) -> Result<String, ModelError> {
    element.attribute(name)
        .map(|attr| attr.value().to_string())
        .ok_or_else(|| ModelError::MissingField(format!(
            "'{}' attribute of <{}>", name, element.name().local_part())))
}

fn read_link(element: dom::Element) -> Result<Link, ModelError> {
    let mut link = Link::new(&required_attribute(element, "name")?);
    for visual in children_named(element, "visual") {
        link.visual.push(read_link_geometry(visual)?);
    }
    for collision in children_named(element, "collision") {
        link.collision.push(read_link_geometry(collision)?);
    }
    Ok(link)
}

fn read_link_geometry(element: dom::Element) -> Result<LinkGeometry, ModelError> {
    let origin = child_named(element, "origin").map_or(Ok(Origin::identity()), read_origin)?;
    let geometry_element = child_named(element, "geometry")
        .ok_or_else(|| ModelError::MissingField("<geometry> in visual or collision".into()))?;
    let shape = geometry_element.children().into_iter()
        .find_map(|e| e.element())
        .ok_or_else(|| ModelError::MissingField("shape inside <geometry>".into()))?;

    let geometry = match shape.name().local_part() {
        "box" => Geometry::Box {
            size: parse_triple(&required_attribute(shape, "size")?)?,
        },
        "cylinder" => Geometry::Cylinder {
            radius: parse_number(&required_attribute(shape, "radius")?)?,
            length: parse_number(&required_attribute(shape, "length")?)?,
        },
        "sphere" => Geometry::Sphere {
            radius: parse_number(&required_attribute(shape, "radius")?)?,
        },
        "mesh" => Geometry::Mesh {
            filename: required_attribute(shape, "filename")?,
            scale: match shape.attribute("scale") {
                Some(scale) => parse_triple(scale.value())?,
                None => [1.0; 3],
            },
        },
        other => return Err(ModelError::ParseError(format!("Unsupported geometry <{}>", other))),
    };

    Ok(LinkGeometry { origin, geometry })
}

fn read_joint(element: dom::Element) -> Result<Joint, ModelError> {
    let name = required_attribute(element, "name")?;
    let joint_type = JointType::parse(&required_attribute(element, "type")?)?;
    let parent = child_named(element, "parent")
        .ok_or_else(|| ModelError::MissingField(format!("<parent> of joint {}", name)))?;
    let child = child_named(element, "child")
        .ok_or_else(|| ModelError::MissingField(format!("<child> of joint {}", name)))?;

    let mut joint = Joint::new(
        &name,
        joint_type,
        &required_attribute(parent, "link")?,
        &required_attribute(child, "link")?,
    );

    if let Some(origin) = child_named(element, "origin") {
        joint.origin = read_origin(origin)?;
    }
    if let Some(axis) = child_named(element, "axis") {
        joint.axis = parse_triple(&required_attribute(axis, "xyz")?)?;
    }
    if let Some(limit) = child_named(element, "limit") {
        joint.limit = Some(JointLimit {
            lower: optional_angle(limit, "lower")?,
            upper: optional_angle(limit, "upper")?,
            velocity: optional_number(limit, "velocity")?,
            effort: optional_number(limit, "effort")?,
        });
    }
    if let Some(mimic) = child_named(element, "mimic") {
        joint.mimic = Some(Mimic {
            joint: required_attribute(mimic, "joint")?,
            multiplier: optional_number(mimic, "multiplier")?.unwrap_or(1.0),
            offset: optional_number(mimic, "offset")?.unwrap_or(0.0),
        });
    }

    Ok(joint)
}

fn read_origin(element: dom::Element) -> Result<Origin, ModelError> {
    let xyz = match element.attribute("xyz") {
        Some(attr) => parse_triple(attr.value())?,
        None => [0.0; 3],
    };
    let rpy = match element.attribute("rpy") {
        Some(attr) => parse_triple(attr.value())?,
        None => [0.0; 3],
    };
    Ok(Origin { xyz, rpy })
}

fn parse_number(value: &str) -> Result<f64, ModelError> {
    value.trim().parse()
        .map_err(|_| ModelError::ParseError(format!("Not a number: '{}'", value)))
}

fn parse_triple(value: &str) -> Result<[f64; 3], ModelError> {
    let values: Vec<f64> = value.split_whitespace()
        .map(parse_number)
        .collect::<Result<_, _>>()?;

    if values.len() != 3 {
        return Err(ModelError::ParseError(format!(
            "Expected exactly three values, found '{}'", value)));
    }
    Ok([values[0], values[1], values[2]])
}

fn optional_number(element: dom::Element, name: &str) -> Result<Option<f64>, ModelError> {
    element.attribute(name)
        .map(|attr| parse_number(attr.value()))
        .transpose()
}

fn optional_angle(element: dom::Element, name: &str) -> Result<Option<f64>, ModelError> {
    element.attribute(name)
        .map(|attr| parse_angle(attr.value()))
        .transpose()
}

fn parse_angle(attr_value: &str) -> Result<f64, ModelError> {
    // Regular expression to match the ${radians(<number>)} format that is common in xacro
    let re = Regex::new(r"^\$\{radians\((-?\d+(\.\d+)?)\)\}$")
        .map_err(|_| ModelError::ParseError("Invalid regex pattern".to_string()))?;

    if let Some(caps) = re.captures(attr_value) {
        let degrees_str = caps.get(1)
            .ok_or_else(|| ModelError::WrongAngle(format!("Bad representation: {}", attr_value)))?
            .as_str();
        let degrees: f64 = degrees_str.parse()
            .map_err(|_| ModelError::WrongAngle(attr_value.to_string()))?;
        Ok(degrees.to_radians())
    } else {
        // Plain number, in radians (or meters for prismatic joints)
        attr_value.trim().parse()
            .map_err(|_| ModelError::WrongAngle(attr_value.to_string()))
    }
}
