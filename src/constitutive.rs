//! One-dimensional constitutive laws, axial force from strain and strain rate.

use serde::{Deserialize, Serialize};

/// Force and its partial derivatives at a given strain state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LawState {
    pub force: f64,
    /// ∂F/∂ε
    pub stiffness: f64,
    /// ∂F/∂ε'
    pub damping: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConstitutiveLaw {
    /// F = E ε
    LinearElastic { stiffness: f64 },
    /// F = E ε + E' ε'
    LinearViscoElastic { stiffness: f64, damping: f64 },
    /// F = E1 ε + E2 ε|ε| + E3 ε³
    CubicElastic { e1: f64, e2: f64, e3: f64 },
}

impl ConstitutiveLaw {
    pub fn evaluate(&self, eps: f64, eps_prime: f64) -> LawState {
        match *self {
            ConstitutiveLaw::LinearElastic { stiffness } => LawState {
                force: stiffness * eps,
                stiffness,
                damping: 0.,
            },
            ConstitutiveLaw::LinearViscoElastic { stiffness, damping } => LawState {
                force: stiffness * eps + damping * eps_prime,
                stiffness,
                damping,
            },
            ConstitutiveLaw::CubicElastic { e1, e2, e3 } => LawState {
                force: e1 * eps + e2 * eps * eps.abs() + e3 * eps.powi(3),
                stiffness: e1 + 2. * e2 * eps.abs() + 3. * e3 * eps * eps,
                damping: 0.,
            },
        }
    }

    /// Whether the force depends on the strain rate.
    pub fn has_rate(&self) -> bool {
        matches!(self, ConstitutiveLaw::LinearViscoElastic { .. })
    }

    /// Restart syntax.
    pub fn restart(&self) -> String {
        match *self {
            ConstitutiveLaw::LinearElastic { stiffness } => {
                format!("linear elastic, {:?}", stiffness)
            }
            ConstitutiveLaw::LinearViscoElastic { stiffness, damping } => {
                format!("linear viscoelastic, {:?}, {:?}", stiffness, damping)
            }
            ConstitutiveLaw::CubicElastic { e1, e2, e3 } => {
                format!("cubic elastic, {:?}, {:?}, {:?}", e1, e2, e3)
            }
        }
    }
}
