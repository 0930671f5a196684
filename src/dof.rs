//! Global index space of the unknowns.
//!
//! Every owner of unknowns (structural nodes, constraint elements) receives a
//! [`DofHandle`] once during model construction. Handles are stable; the
//! registry maps them to the current first global index, which may change
//! when the registry is renumbered.

use serde::Serialize;

/// Whether an unknown is integrated in time or solved algebraically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DofOrder {
    /// Position-like unknown, its derivative enters the Jacobian scaled by the
    /// integration coefficient.
    Differential,
    /// Lagrange multiplier or other unknown without time derivative.
    Algebraic,
}

/// Stable handle to a contiguous block of unknowns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DofHandle(usize);

/// Per-owner record of the unknowns it introduces.
#[derive(Debug, Clone, Serialize)]
pub struct DofOwner {
    pub label: u32,
    pub num_dofs: usize,
    pub order: DofOrder,
    first_index: usize,
}

impl DofOwner {
    pub fn first_index(&self) -> usize {
        self.first_index
    }
}

#[derive(Debug, Clone, Default)]
pub struct DofRegistry {
    owners: Vec<DofOwner>,
    num_dofs: usize,
}

impl DofRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a block of `num_dofs` unknowns at the end of the index space.
    pub fn allocate(&mut self, label: u32, num_dofs: usize, order: DofOrder) -> DofHandle {
        let handle = DofHandle(self.owners.len());
        self.owners.push(DofOwner {
            label,
            num_dofs,
            order,
            first_index: self.num_dofs,
        });
        self.num_dofs += num_dofs;
        handle
    }

    /// Total number of unknowns.
    pub fn len(&self) -> usize {
        self.num_dofs
    }

    pub fn is_empty(&self) -> bool {
        self.num_dofs == 0
    }

    pub fn owner(&self, handle: DofHandle) -> &DofOwner {
        &self.owners[handle.0]
    }

    /// First global index of the block.
    pub fn first_index(&self, handle: DofHandle) -> usize {
        self.owners[handle.0].first_index
    }

    /// Global index of the `offset`-th unknown of the block.
    pub fn index(&self, handle: DofHandle, offset: usize) -> usize {
        let owner = &self.owners[handle.0];
        assert!(
            offset < owner.num_dofs,
            "dof owner {}: offset {} out of range ({} dofs)",
            owner.label,
            offset,
            owner.num_dofs
        );
        owner.first_index + offset
    }

    /// Order of the unknown at a global index.
    pub fn order_of(&self, index: usize) -> DofOrder {
        self.owners
            .iter()
            .find(|o| index >= o.first_index && index < o.first_index + o.num_dofs)
            .map(|o| o.order)
            .unwrap_or(DofOrder::Algebraic)
    }

    /// Orders of all unknowns, indexed by global index.
    pub fn orders(&self) -> Vec<DofOrder> {
        let mut orders = vec![DofOrder::Algebraic; self.num_dofs];
        for o in &self.owners {
            orders[o.first_index..o.first_index + o.num_dofs].fill(o.order);
        }
        orders
    }

    /// Lays the blocks out again in the order given by `sequence`, a
    /// permutation of all handles. Handles stay valid.
    pub fn renumber(&mut self, sequence: &[DofHandle]) {
        assert_eq!(
            sequence.len(),
            self.owners.len(),
            "renumbering must list every dof owner exactly once"
        );
        let mut seen = vec![false; self.owners.len()];
        let mut next = 0;
        for &DofHandle(i) in sequence {
            assert!(!seen[i], "dof owner {} listed twice", self.owners[i].label);
            seen[i] = true;
            self.owners[i].first_index = next;
            next += self.owners[i].num_dofs;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (DofHandle, &DofOwner)> {
        self.owners.iter().enumerate().map(|(i, o)| (DofHandle(i), o))
    }
}

//------------------------------------------------------------------------------
// Testing
//------------------------------------------------------------------------------
