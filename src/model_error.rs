//! Error handling for the kinematic model, its readers and the collision matrix cache

use std::io;

/// Unified error to report failures of model construction, queries, structural edits,
/// URDF parsing and cache access.
#[derive(Debug)]
pub enum ModelError {
    /// Link name is not present in the model.
    UnknownLink(String),
    /// Joint name is not present in the model.
    UnknownJoint(String),
    /// Tree invariant violated: disconnected, multiple roots, cycle, dangling reference.
    Structural(String),
    /// Structural edit would introduce a duplicate link or joint name.
    NameCollision(String),
    IoError(io::Error),
    ParseError(String),
    MissingField(String),
    WrongAngle(String),
    XmlProcessingError(String),
    CacheError(String),
    KeyPath(String),
    Unsupported(String),
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            ModelError::UnknownLink(ref name) =>
                write!(f, "Unknown link: {}", name),
            ModelError::UnknownJoint(ref name) =>
                write!(f, "Unknown joint: {}", name),
            ModelError::Structural(ref msg) =>
                write!(f, "Structural error: {}", msg),
            ModelError::NameCollision(ref name) =>
                write!(f, "Name collision: {}", name),
            ModelError::IoError(ref err) =>
                write!(f, "IO Error: {}", err),
            ModelError::ParseError(ref msg) =>
                write!(f, "Parse Error: {}", msg),
            ModelError::MissingField(ref field) =>
                write!(f, "Missing Field: {}", field),
            ModelError::WrongAngle(ref msg) =>
                write!(f, "Wrong angle representation: {}", msg),
            ModelError::XmlProcessingError(ref err) =>
                write!(f, "XML Processing Error: {}", err),
            ModelError::CacheError(ref err) =>
                write!(f, "Cache Error: {}", err),
            ModelError::KeyPath(ref msg) =>
                write!(f, "Key path error: {}", msg),
            ModelError::Unsupported(ref msg) =>
                write!(f, "Unsupported: {}", msg),
        }
    }
}

impl std::error::Error for ModelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            ModelError::IoError(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ModelError {
    fn from(err: io::Error) -> Self {
        ModelError::IoError(err)
    }
}
