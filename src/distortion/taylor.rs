use super::{Distorted, FocalPlanePoint, Solver, SolverSettings, Undistorted};
use crate::{
    context::CameraContext,
    error::{Error, Result},
};
use nalgebra::{Matrix2, Vector2};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Third-order bivariate polynomial distortion.
///
/// Coefficients multiply `[1, x, y, x², xy, y², x³, x²y, xy², y³]` of the
/// undistorted position to give the distorted one. The reverse direction is
/// solved with Newton's method.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TaylorSeries {
    x_coefficients: [f64; 10],
    y_coefficients: [f64; 10],
    solver: Solver,
}

impl TaylorSeries {
    pub fn new(
        x_coefficients: [f64; 10],
        y_coefficients: [f64; 10],
        settings: SolverSettings,
    ) -> Self {
        Self {
            x_coefficients,
            y_coefficients,
            solver: Solver::new(settings),
        }
    }

    /// Builds a model from slices of ten coefficients each.
    pub fn from_slices(x: &[f64], y: &[f64], settings: SolverSettings) -> Result<Self> {
        let x_coefficients: [f64; 10] = x.try_into().map_err(|_| {
            Error::InvalidConfiguration(format!(
                "taylor series needs 10 x coefficients, got {}",
                x.len()
            ))
        })?;
        let y_coefficients: [f64; 10] = y.try_into().map_err(|_| {
            Error::InvalidConfiguration(format!(
                "taylor series needs 10 y coefficients, got {}",
                y.len()
            ))
        })?;

        Ok(Self::new(x_coefficients, y_coefficients, settings))
    }

    /// A series that leaves every point where it is.
    pub fn identity(settings: SolverSettings) -> Self {
        let mut x = [0.0; 10];
        let mut y = [0.0; 10];
        x[1] = 1.0;
        y[2] = 1.0;
        Self::new(x, y, settings)
    }

    pub fn x_coefficients(&self) -> &[f64; 10] {
        &self.x_coefficients
    }

    pub fn y_coefficients(&self) -> &[f64; 10] {
        &self.y_coefficients
    }

    pub fn last_iterations(&self) -> usize {
        self.solver.last_iterations()
    }

    fn terms(p: &Vector2<f64>) -> [f64; 10] {
        let (x, y) = (p.x, p.y);
        [
            1.0,
            x,
            y,
            x * x,
            x * y,
            y * y,
            x * x * x,
            x * x * y,
            x * y * y,
            y * y * y,
        ]
    }

    /// Partial derivatives of [`Self::terms`] by x and by y.
    fn term_derivatives(p: &Vector2<f64>) -> ([f64; 10], [f64; 10]) {
        let (x, y) = (p.x, p.y);
        (
            [0.0, 1.0, 0.0, 2.0 * x, y, 0.0, 3.0 * x * x, 2.0 * x * y, y * y, 0.0],
            [0.0, 0.0, 1.0, 0.0, x, 2.0 * y, 0.0, x * x, 2.0 * x * y, 3.0 * y * y],
        )
    }

    fn dot(coefficients: &[f64; 10], terms: &[f64; 10]) -> f64 {
        coefficients.iter().zip(terms).map(|(c, t)| c * t).sum()
    }

    fn evaluate(x: &[f64; 10], y: &[f64; 10], p: &Vector2<f64>) -> Vector2<f64> {
        let terms = Self::terms(p);
        Vector2::new(Self::dot(x, &terms), Self::dot(y, &terms))
    }

    fn jacobian(x: &[f64; 10], y: &[f64; 10], p: &Vector2<f64>) -> Matrix2<f64> {
        let (dx, dy) = Self::term_derivatives(p);
        Matrix2::new(
            Self::dot(x, &dx), Self::dot(x, &dy),
            Self::dot(y, &dx), Self::dot(y, &dy),
        )
    }

    pub fn distort(
        &mut self,
        _ctx: &CameraContext,
        point: FocalPlanePoint<Undistorted>,
    ) -> Option<FocalPlanePoint<Distorted>> {
        let d = Self::evaluate(&self.x_coefficients, &self.y_coefficients, &point.as_vec2());
        Some(FocalPlanePoint::from_vec2(d))
    }

    /// Newton iteration on `evaluate(u) = d`, starting from `u = d`.
    ///
    /// Returns `None` if the Jacobian becomes singular or the solver does
    /// not converge.
    pub fn undistort(
        &mut self,
        ctx: &CameraContext,
        point: FocalPlanePoint<Distorted>,
    ) -> Option<FocalPlanePoint<Undistorted>> {
        let target = point.as_vec2();
        let (x, y) = (self.x_coefficients, self.y_coefficients);

        let u = self.solver.run(ctx, target, |current| {
            let residual = Self::evaluate(&x, &y, current) - target;
            let step = Self::jacobian(&x, &y, current).try_inverse()? * residual;
            Some(current - step)
        })?;

        Some(FocalPlanePoint::from_vec2(u))
    }
}
