//! Element assembly core of a multibody DAE solver.
//!
//! Elements (rods, prescribed velocity joints) evaluate their local residual
//! and Jacobian blocks against the global state, the [`assembly::Assembler`]
//! scatters them. Nodes own their unknowns through the [`dof::DofRegistry`],
//! prescribed values come from [`drive`]s, possibly fed by an external
//! process through a [`stream::StreamDrive`].

pub mod assembly;
pub mod config;
pub mod constitutive;
pub mod context;
pub mod dof;
pub mod drive;
pub mod element;
pub mod error;
pub mod model;
pub mod node;
pub mod output;
pub mod prelude;
pub mod restart;
pub mod stream;
pub mod workspace;
