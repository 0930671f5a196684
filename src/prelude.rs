pub use itertools::Itertools;
pub use std::ops::AddAssign;

//------------------------------------------------------------------------------
// Types
//------------------------------------------------------------------------------

/// Matrix (3 x 3)
pub type Matrix3 = nalgebra::Matrix3<f64>;

/// Matrix (3 x DOFs)
pub type Matrix3xX = nalgebra::Matrix3xX<f64>;

/// Matrix (1 x DOFs)
pub type Matrix1xX = nalgebra::Matrix1xX<f64>;

/// Matrix (rows x cols), local work patches
pub type MatrixD = nalgebra::OMatrix<f64, nalgebra::Dyn, nalgebra::Dyn>;

pub type Vector3 = nalgebra::Vector3<f64>;

/// Column vector (Degrees of Freedom)
pub type VectorD = nalgebra::DVector<f64>;

pub type Rotation3 = nalgebra::Rotation3<f64>;

//------------------------------------------------------------------------------
// Traits
//------------------------------------------------------------------------------

pub trait RotVecExt {
    fn tangent_matrix(&self) -> Matrix3;
    fn tilde(&self) -> Matrix3;
    fn rotation(&self) -> Rotation3;
}

impl RotVecExt for Vector3 {
    fn tilde(&self) -> Matrix3 {
        Matrix3::new(
            0.0, -self[2], self[1], self[2], 0.0, -self[0], -self[1], self[0], 0.0,
        )
    }
    /// Maps a variation of the rotation vector to the spatial spin of `exp(g)`,
    /// `δR Rᵀ = tilde(T(g) δg)`.
    fn tangent_matrix(&self) -> Matrix3 {
        let phi = self.magnitude();
        if phi < 1e-8 {
            // second-order expansion near the origin
            Matrix3::identity() + 0.5 * self.tilde() + (self.tilde() * self.tilde()) / 6.
        } else {
            Matrix3::identity()
                + (1. - phi.cos()) / phi.powi(2) * self.tilde()
                + (1. - phi.sin() / phi) / phi.powi(2) * (self.tilde() * self.tilde())
        }
    }
    fn rotation(&self) -> Rotation3 {
        Rotation3::new(*self)
    }
}

//------------------------------------------------------------------------------
// Testing
//------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    #[test]
    fn test_tilde_is_cross_product() {
        let a = Vector3::new(1., -2., 0.5);
        let b = Vector3::new(0.3, 4., -1.);
        assert_relative_eq!(a.tilde() * b, a.cross(&b));
        assert_relative_eq!(a.tilde().transpose(), -a.tilde());
    }

    #[test]
    fn test_tangent_matrix_matches_perturbed_rotation() {
        let g = Vector3::new(0.3, -0.2, 0.7);
        let dg = Vector3::new(1e-7, -2e-7, 0.5e-7);
        let r = g.rotation();
        let r_pert = (g + dg).rotation();
        let spin = (r_pert.matrix() - r.matrix()) * r.matrix().transpose();
        let axial = Vector3::new(spin[(2, 1)], spin[(0, 2)], spin[(1, 0)]);
        assert_relative_eq!(axial, g.tangent_matrix() * dg, epsilon = 1e-12);
    }

    #[test]
    fn test_tangent_matrix_at_origin() {
        assert_relative_eq!(Vector3::zeros().tangent_matrix(), Matrix3::identity());
    }
}
