use crate::dof::{DofOrder, DofRegistry};
use crate::node::{NodeId, NodeSet, NodeState, MOMENTUM_OFFSET, VELOCITY_OFFSET};
use crate::prelude::*;

/// Assembly phase requested by the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Time step of the dynamic problem
    Regular,
    /// Kinematic assembly before integration starts, velocities are unknowns
    Initial,
    /// Inverse dynamics solve
    InverseDynamics,
}

/// Sub-problem of an inverse dynamics solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InverseDynamicsOrder {
    Position,
    Velocity,
    Acceleration,
    InverseDynamics,
}

/// Read-only view of everything an element may consult while assembling.
#[derive(Debug, Clone, Copy)]
pub struct AssemblyContext<'a> {
    pub nodes: &'a NodeSet,
    pub dofs: &'a DofRegistry,
    pub phase: Phase,
    pub time: f64,
    /// Current state
    pub x: &'a VectorD,
    /// Current state derivative
    pub xp: &'a VectorD,
}

impl<'a> AssemblyContext<'a> {
    pub fn new(
        nodes: &'a NodeSet,
        dofs: &'a DofRegistry,
        phase: Phase,
        time: f64,
        x: &'a VectorD,
        xp: &'a VectorD,
    ) -> Self {
        AssemblyContext {
            nodes,
            dofs,
            phase,
            time,
            x,
            xp,
        }
    }

    /// First index of the node block, position and orientation unknowns.
    pub fn position_index(&self, node: NodeId) -> usize {
        self.dofs.first_index(self.nodes.get(node).dofs)
    }

    /// First row of the node's force and moment balance in the regular phase.
    pub fn momentum_index(&self, node: NodeId) -> usize {
        self.position_index(node) + MOMENTUM_OFFSET
    }

    /// First velocity unknown of the node during initial assembly.
    pub fn velocity_index(&self, node: NodeId) -> usize {
        self.position_index(node) + VELOCITY_OFFSET
    }

    /// Rows receiving the node's force and moment balance in the current phase.
    pub fn equilibrium_index(&self, node: NodeId) -> usize {
        match self.phase {
            Phase::Regular => self.momentum_index(node),
            Phase::Initial | Phase::InverseDynamics => self.position_index(node),
        }
    }

    pub fn order_of(&self, index: usize) -> DofOrder {
        self.dofs.order_of(index)
    }

    /// Node kinematics at the current iterate.
    pub fn node_state(&self, node: NodeId) -> NodeState {
        let n = self.nodes.get(node);
        let p = self.dofs.first_index(n.dofs);
        let x = self.x.fixed_rows::<3>(p).into_owned();
        let g = self.x.fixed_rows::<3>(p + 3).into_owned();
        let (v, w) = match self.phase {
            Phase::Regular | Phase::InverseDynamics => (
                self.xp.fixed_rows::<3>(p).into_owned(),
                self.xp.fixed_rows::<3>(p + 3).into_owned(),
            ),
            Phase::Initial => (
                self.x.fixed_rows::<3>(p + VELOCITY_OFFSET).into_owned(),
                self.x.fixed_rows::<3>(p + VELOCITY_OFFSET + 3).into_owned(),
            ),
        };
        NodeState::new(x, g, &n.r_ref, v, w)
    }

    /// Reference orientation of the node.
    pub fn node_reference(&self, node: NodeId) -> Rotation3 {
        self.nodes.get(node).r_ref
    }

    /// Value of a scalar unknown.
    pub fn unknown(&self, index: usize) -> f64 {
        self.x[index]
    }
}
