//! Structural nodes shared by the elements.
//!
//! A node owns a block of 12 unknowns. Elements refer to nodes through
//! [`NodeId`] and read their kinematics from the state vectors through an
//! [`AssemblyContext`](crate::context::AssemblyContext).

use serde::{Deserialize, Serialize};

use crate::dof::{DofHandle, DofOrder, DofRegistry};
use crate::error::{ConfigError, ConfigResult};
use crate::prelude::*;

/// Number of unknowns owned by a structural node.
pub const NODE_DOFS: usize = 12;

/// Offset of the momentum (force/moment balance) rows in the node block.
pub const MOMENTUM_OFFSET: usize = 6;

/// Offset of the velocity unknowns in the node block during initial assembly.
pub const VELOCITY_OFFSET: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
pub struct StructNode {
    pub label: u32,
    pub dofs: DofHandle,
    /// Reference orientation, the orientation parameter is measured from it
    pub r_ref: Rotation3,
    pub x0: Vector3,
    pub v0: Vector3,
    pub w0: Vector3,
}

/// Node configuration as read from the model description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub label: u32,
    pub position: [f64; 3],
    /// Orientation as a rotation vector
    #[serde(default)]
    pub orientation: [f64; 3],
    #[serde(default)]
    pub velocity: [f64; 3],
    #[serde(default)]
    pub angular_velocity: [f64; 3],
}

/// Kinematics of a node at the current iterate.
#[derive(Debug, Clone)]
pub struct NodeState {
    /// Position
    pub x: Vector3,
    /// Orientation parameter (rotation vector from the reference orientation)
    pub g: Vector3,
    /// Current orientation, `exp(g) * r_ref`
    pub r: Rotation3,
    /// Tangent operator of the orientation parameter
    pub t: Matrix3,
    /// Velocity
    pub v: Vector3,
    /// Angular velocity
    pub w: Vector3,
}

impl NodeState {
    pub fn new(x: Vector3, g: Vector3, r_ref: &Rotation3, v: Vector3, w: Vector3) -> Self {
        NodeState {
            r: g.rotation() * *r_ref,
            t: g.tangent_matrix(),
            x,
            g,
            v,
            w,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NodeSet {
    nodes: Vec<StructNode>,
}

impl NodeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a node and allocates its unknowns.
    pub fn add(&mut self, config: &NodeConfig, dofs: &mut DofRegistry) -> ConfigResult<NodeId> {
        if self.find(config.label).is_some() {
            return Err(ConfigError::DuplicateLabel {
                what: "node",
                label: config.label,
            });
        }
        let handle = dofs.allocate(config.label, NODE_DOFS, DofOrder::Differential);
        self.nodes.push(StructNode {
            label: config.label,
            dofs: handle,
            r_ref: Vector3::from(config.orientation).rotation(),
            x0: Vector3::from(config.position),
            v0: Vector3::from(config.velocity),
            w0: Vector3::from(config.angular_velocity),
        });
        Ok(NodeId(self.nodes.len() - 1))
    }

    pub fn find(&self, label: u32) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.label == label).map(NodeId)
    }

    /// Looks a node up on behalf of an element under construction.
    pub fn resolve(&self, label: u32, what: &'static str, element: u32) -> ConfigResult<NodeId> {
        self.find(label).ok_or(ConfigError::UnknownNode {
            what,
            label: element,
            node: label,
        })
    }

    pub fn get(&self, id: NodeId) -> &StructNode {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StructNode> {
        self.nodes.iter()
    }

    /// Writes the initial node positions and velocities into the state
    /// vectors of the regular phase.
    pub fn initial_state(&self, dofs: &DofRegistry, x: &mut VectorD, xp: &mut VectorD) {
        for node in &self.nodes {
            let p = dofs.first_index(node.dofs);
            x.fixed_rows_mut::<3>(p).copy_from(&node.x0);
            x.fixed_rows_mut::<3>(p + 3).fill(0.);
            xp.fixed_rows_mut::<3>(p).copy_from(&node.v0);
            xp.fixed_rows_mut::<3>(p + 3).copy_from(&node.w0);
        }
    }

    /// Writes the initial node positions and velocities into the state
    /// vector of the initial assembly, where velocities are unknowns.
    pub fn initial_assembly_state(&self, dofs: &DofRegistry, x: &mut VectorD) {
        for node in &self.nodes {
            let p = dofs.first_index(node.dofs);
            x.fixed_rows_mut::<3>(p).copy_from(&node.x0);
            x.fixed_rows_mut::<3>(p + 3).fill(0.);
            x.fixed_rows_mut::<3>(p + VELOCITY_OFFSET).copy_from(&node.v0);
            x.fixed_rows_mut::<3>(p + VELOCITY_OFFSET + 3).copy_from(&node.w0);
        }
    }
}

//------------------------------------------------------------------------------
// Testing
//------------------------------------------------------------------------------
