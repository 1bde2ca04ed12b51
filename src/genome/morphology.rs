//! Morphology data model: the declarative body-graph of blocks
//! and parent-relative attachments that the instantiator walks.

use serde::{Deserialize, Serialize};

use crate::vecmath::Vec3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum JointType {
    Revolute,
    Spherical,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointParams {
    pub speed: f64,
    pub phase: f64,
    pub amp: f64,
}

/// Tangential shift on an attachment face, in the face's own `(u, v)` basis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceOffset {
    pub u: f64,
    pub v: f64,
}

/// One block in the body graph.
///
/// `attach_face` indexes `{+X, -X, +Y, -Y, +Z, -Z}` as `{0, 1, 2, 3, 4, 5}`;
/// `axis_index = face / 2`, `dir = +1` if `face` is even else `-1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockNode {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub size: Vec3,
    pub attach_face: u8,
    pub rotation: Option<Vec3>,
    pub parent_offset: Option<FaceOffset>,
    pub child_offset: Option<FaceOffset>,
    pub joint_type: JointType,
    pub joint_params: Option<JointParams>,
}

impl BlockNode {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn rotation_or_identity(&self) -> Vec3 {
        self.rotation.unwrap_or(Vec3::ZERO)
    }

    pub fn parent_offset_or_zero(&self) -> FaceOffset {
        self.parent_offset.unwrap_or(FaceOffset { u: 0.0, v: 0.0 })
    }

    pub fn child_offset_or_zero(&self) -> FaceOffset {
        self.child_offset.unwrap_or(FaceOffset { u: 0.0, v: 0.0 })
    }
}

/// Ordered sequence of blocks; order doubles as the declaration order used
/// to break ties between same-face siblings and to reject forward
/// references (a `parent_id` must name a block earlier in this sequence).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Morphology {
    pub nodes: Vec<BlockNode>,
}

impl Morphology {
    pub fn root(&self) -> Option<&BlockNode> {
        self.nodes.iter().find(|n| n.is_root())
    }

    pub fn find(&self, id: i64) -> Option<&BlockNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Children of `parent_id`, grouped by attach face, preserving
    /// declaration order within each group.
    pub fn children_by_face(&self, parent_id: i64) -> Vec<(u8, Vec<&BlockNode>)> {
        let mut faces: Vec<u8> = Vec::new();
        let mut groups: std::collections::HashMap<u8, Vec<&BlockNode>> =
            std::collections::HashMap::new();
        for node in &self.nodes {
            if node.parent_id == Some(parent_id) {
                groups.entry(node.attach_face).or_insert_with(|| {
                    faces.push(node.attach_face);
                    Vec::new()
                });
                groups.get_mut(&node.attach_face).unwrap().push(node);
            }
        }
        faces.into_iter().map(|f| (f, groups.remove(&f).unwrap())).collect()
    }
}
