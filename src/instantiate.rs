//! Morph instantiator: realizes one genome's morphology into
//! `rapier3d` rigid bodies, colliders and joints inside a physics world the
//! scheduler owns.

use std::collections::{HashMap, VecDeque};

use rapier3d::prelude::*;

use crate::error::InstantiationError;
use crate::genome::{BlockNode, Genome, JointType};
use crate::vecmath::{Quat, Vec3};

/// Creature collision group; creatures never collide with each other, only
/// with the ground.
const CREATURE_GROUP: Group = Group::GROUP_2;
const GROUND_GROUP: Group = Group::GROUP_1;

const JOINT_LIMIT: f64 = std::f64::consts::PI / 1.5;

#[derive(Debug, Clone, Copy)]
struct Transform {
    pos: Vec3,
    rot: Quat,
}

/// Output of [`instantiate`]: everything the scheduler needs to drive and
/// tear down one individual's body.
pub struct InstantiatedBody {
    /// Stable index order equal to creation order, matching the transform
    /// broadcast stability requirement.
    pub block_order: Vec<i64>,
    pub body_by_block: HashMap<i64, RigidBodyHandle>,
    pub joint_by_block: HashMap<i64, ImpulseJointHandle>,
    pub root_block: i64,
}

impl InstantiatedBody {
    pub fn root_handle(&self) -> RigidBodyHandle {
        self.body_by_block[&self.root_block]
    }
}

fn node_lookup(genome: &Genome) -> Result<HashMap<i64, &BlockNode>, InstantiationError> {
    let mut by_id = HashMap::new();
    for node in &genome.morphology.nodes {
        if by_id.insert(node.id, node).is_some() {
            return Err(InstantiationError::DuplicateId(node.id));
        }
    }
    for node in &genome.morphology.nodes {
        if !node.size.is_finite() || node.rotation.map_or(false, |r| !r.is_finite()) {
            return Err(InstantiationError::NonFinite(node.id));
        }
        if let Some(parent_id) = node.parent_id {
            if !by_id.contains_key(&parent_id) {
                return Err(InstantiationError::OrphanParent(node.id));
            }
        }
    }
    check_acyclic(&genome.morphology.nodes, &by_id)?;
    Ok(by_id)
}

fn check_acyclic(
    nodes: &[BlockNode],
    by_id: &HashMap<i64, &BlockNode>,
) -> Result<(), InstantiationError> {
    for node in nodes {
        let mut current = node;
        let mut steps = 0usize;
        while let Some(parent_id) = current.parent_id {
            steps += 1;
            if steps > nodes.len() {
                return Err(InstantiationError::Cycle);
            }
            current = by_id[&parent_id];
        }
    }
    Ok(())
}

/// The two tangential axes for a main axis, in cyclic order: X -> (Y, Z),
/// Y -> (Z, X), Z -> (X, Y).
fn tangential_axes(axis_idx: usize) -> (usize, usize) {
    ((axis_idx + 1) % 3, (axis_idx + 2) % 3)
}

/// Pivot (world-space) and resulting child transform for one (parent,
/// child) attachment.
fn attachment_transform(
    parent: &Transform,
    parent_node: &BlockNode,
    child_node: &BlockNode,
    index_in_face: usize,
    count_in_face: usize,
) -> (Vec3, Transform) {
    let face = child_node.attach_face;
    let axis_idx = (face / 2) as usize;
    let dir = if face % 2 == 0 { 1.0 } else { -1.0 };
    let (u_idx, v_idx) = tangential_axes(axis_idx);

    let axis_unit = Vec3::axis(axis_idx);
    let u_unit = Vec3::axis(u_idx);
    let v_unit = Vec3::axis(v_idx);

    let parent_half = parent_node.size.component(axis_idx) / 2.0;
    let child_half = child_node.size.component(axis_idx) / 2.0;

    let spread_offset = if count_in_face > 1 {
        let t = index_in_face as f64 / (count_in_face as f64 - 1.0);
        (t - 0.5) * (parent_node.size.component(u_idx) * 0.8)
    } else {
        0.0
    };

    let parent_offset = parent_node.parent_offset_or_zero();
    let child_offset = child_node.child_offset_or_zero();

    let pivot_local = axis_unit
        .scale(dir * parent_half)
        .add(&u_unit.scale(spread_offset + parent_offset.u))
        .add(&v_unit.scale(parent_offset.v));
    let pivot_world = parent.pos.add(&parent.rot.rotate_vector(&pivot_local));

    let child_local_rot = {
        let r = child_node.rotation_or_identity();
        Quat::from_euler_xyz_degrees(r.x, r.y, r.z)
    };

    let child_offset_local = axis_unit
        .scale(dir * child_half)
        .sub(&u_unit.scale(child_offset.u))
        .sub(&v_unit.scale(child_offset.v));
    let rotated_child_offset =
        parent.rot.rotate_vector(&child_local_rot.rotate_vector(&child_offset_local));

    let child_pos = pivot_world.add(&rotated_child_offset);
    let child_rot = parent.rot.mul(&child_local_rot);

    (pivot_world, Transform { pos: child_pos, rot: child_rot })
}

/// Realizes `genome` into `bodies`/`colliders`/`joints`, spawning the root
/// at `spawn_pos` with its declared rotation.
pub fn instantiate(
    genome: &Genome,
    spawn_pos: Vec3,
    bodies: &mut RigidBodySet,
    colliders: &mut ColliderSet,
    joints: &mut ImpulseJointSet,
) -> Result<InstantiatedBody, InstantiationError> {
    let by_id = node_lookup(genome)?;
    let morph = &genome.morphology;
    let root_node = morph.root().expect("node_lookup guarantees reachability from a root");

    let mut transforms: HashMap<i64, Transform> = HashMap::new();
    let root_rot = {
        let r = root_node.rotation_or_identity();
        Quat::from_euler_xyz_degrees(r.x, r.y, r.z)
    };
    transforms.insert(root_node.id, Transform { pos: spawn_pos, rot: root_rot });

    let mut block_order = vec![root_node.id];
    let mut queue: VecDeque<i64> = VecDeque::new();
    queue.push_back(root_node.id);

    // Pivot-world position of the joint connecting each non-root block to
    // its parent, recorded alongside the child transform for step 5.
    let mut pivots: HashMap<i64, Vec3> = HashMap::new();

    while let Some(parent_id) = queue.pop_front() {
        let parent_node = by_id[&parent_id];
        let parent_transform = transforms[&parent_id];

        for (_face, children) in morph.children_by_face(parent_id) {
            let count = children.len();
            for (index, child_node) in children.into_iter().enumerate() {
                let (pivot_world, child_transform) =
                    attachment_transform(&parent_transform, parent_node, child_node, index, count);

                transforms.insert(child_node.id, child_transform);
                pivots.insert(child_node.id, pivot_world);
                block_order.push(child_node.id);
                queue.push_back(child_node.id);
            }
        }
    }

    let mut body_by_block = HashMap::new();
    for block_id in &block_order {
        let node = by_id[block_id];
        let transform = transforms[block_id];
        let body_handle = spawn_body(&transform, bodies);
        let collider = collider_for(node);
        colliders.insert_with_parent(collider, body_handle, bodies);
        body_by_block.insert(*block_id, body_handle);
    }

    let mut joint_by_block = HashMap::new();
    for block_id in &block_order {
        let node = by_id[block_id];
        let Some(parent_id) = node.parent_id else { continue };
        let parent_node = by_id[&parent_id];
        let parent_transform = transforms[&parent_id];
        let child_transform = transforms[block_id];
        let pivot_world = pivots[block_id];

        let anchor1 = parent_transform.rot.invert().rotate_vector(&pivot_world.sub(&parent_transform.pos));
        let anchor2 = child_transform.rot.invert().rotate_vector(&pivot_world.sub(&child_transform.pos));

        let axis_world = child_transform.rot.rotate_vector(&Vec3::axis(2));
        let axis_local1 = parent_transform.rot.invert().rotate_vector(&axis_world);
        let axis_local2 = child_transform.rot.invert().rotate_vector(&axis_world);

        // SPHERICAL arms of the body graph fall back to the same 1-DoF
        // revolute construction (recorded as an open-question decision).
        let joint = RevoluteJointBuilder::new(to_unit_vector(&axis_local1))
            .local_anchor1(to_point(&anchor1))
            .local_anchor2(to_point(&anchor2))
            .local_axis2(to_unit_vector(&axis_local2))
            .limits([-JOINT_LIMIT, JOINT_LIMIT])
            .motor_model(MotorModel::ForceBased)
            .build();

        let handle = joints.insert(
            body_by_block[&parent_id],
            body_by_block[block_id],
            joint,
            true,
        );
        joint_by_block.insert(*block_id, handle);
    }

    Ok(InstantiatedBody {
        block_order,
        body_by_block,
        joint_by_block,
        root_block: root_node.id,
    })
}

fn spawn_body(transform: &Transform, bodies: &mut RigidBodySet) -> RigidBodyHandle {
    let iso = Isometry::from_parts(
        Translation::from(to_vector(&transform.pos)),
        to_unit_quaternion(&transform.rot),
    );
    let rigid_body = RigidBodyBuilder::dynamic()
        .position(iso)
        .linear_damping(0.5)
        .angular_damping(1.0)
        .build();
    bodies.insert(rigid_body)
}

fn collider_for(node: &BlockNode) -> Collider {
    let half = node.size.scale(0.5 * 0.95);
    ColliderBuilder::cuboid(half.x, half.y, half.z)
        .friction(1.0)
        .restitution(0.0)
        .density(2.0)
        .collision_groups(InteractionGroups::new(CREATURE_GROUP, GROUND_GROUP))
        .build()
}

fn to_vector(v: &Vec3) -> Vector<f64> {
    vector![v.x, v.y, v.z]
}

fn to_point(v: &Vec3) -> Point<f64> {
    point![v.x, v.y, v.z]
}

fn to_unit_vector(v: &Vec3) -> UnitVector<f64> {
    let n = v.length();
    if n < 1e-12 {
        UnitVector::new_normalize(vector![0.0, 0.0, 1.0])
    } else {
        UnitVector::new_normalize(vector![v.x, v.y, v.z])
    }
}

fn to_unit_quaternion(q: &Quat) -> UnitQuaternion<f64> {
    UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(q.w, q.x, q.y, q.z))
}
