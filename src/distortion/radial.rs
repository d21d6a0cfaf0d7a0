use super::{ClosedForm, Distorted, FocalPlanePoint, Solver, SolverSettings, Undistorted};
use crate::context::CameraContext;
use nalgebra::Vector2;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Squared radius (mm²) inside which decentering distortion is ignored.
const NEAR_CENTRE_RADIUS_SQUARED: f64 = 1e-6;

/// Single-coefficient radial distortion, `p' = p·(1 + k1·r²)`.
///
/// The closed-form direction is configurable; the other is solved by fixed
/// point iteration.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Radial {
    k1: f64,
    closed_form: ClosedForm,
    solver: Solver,
}

impl Radial {
    /// A model with `undistorted = distorted·(1 + k1·r²)`, capped at 20
    /// iterations.
    pub fn new(k1: f64) -> Self {
        Self {
            k1,
            closed_form: ClosedForm::DistortedToUndistorted,
            solver: Solver::new(SolverSettings {
                max_iterations: 20,
                ..SolverSettings::default()
            }),
        }
    }

    pub fn with_closed_form(mut self, closed_form: ClosedForm) -> Self {
        self.closed_form = closed_form;
        self
    }

    pub fn with_settings(mut self, settings: SolverSettings) -> Self {
        self.solver = Solver::new(settings);
        self
    }

    pub fn k1(&self) -> f64 {
        self.k1
    }

    pub fn closed_form(&self) -> ClosedForm {
        self.closed_form
    }

    pub fn settings(&self) -> &SolverSettings {
        self.solver.settings()
    }

    pub fn last_iterations(&self) -> usize {
        self.solver.last_iterations()
    }

    fn forward(&self, p: Vector2<f64>) -> Vector2<f64> {
        p * (1.0 + self.k1 * p.norm_squared())
    }

    fn inverse(&mut self, ctx: &CameraContext, q: Vector2<f64>) -> Option<Vector2<f64>> {
        let k1 = self.k1;
        self.solver
            .run(ctx, q, |p| Some(q / (1.0 + k1 * p.norm_squared())))
    }

    pub fn undistort(
        &mut self,
        ctx: &CameraContext,
        point: FocalPlanePoint<Distorted>,
    ) -> Option<FocalPlanePoint<Undistorted>> {
        let p = point.as_vec2();
        let u = match self.closed_form {
            ClosedForm::DistortedToUndistorted => self.forward(p),
            ClosedForm::UndistortedToDistorted => self.inverse(ctx, p)?,
        };
        Some(FocalPlanePoint::from_vec2(u))
    }

    pub fn distort(
        &mut self,
        ctx: &CameraContext,
        point: FocalPlanePoint<Undistorted>,
    ) -> Option<FocalPlanePoint<Distorted>> {
        let p = point.as_vec2();
        let d = match self.closed_form {
            ClosedForm::DistortedToUndistorted => self.inverse(ctx, p)?,
            ClosedForm::UndistortedToDistorted => self.forward(p),
        };
        Some(FocalPlanePoint::from_vec2(d))
    }
}

/// Brown–Conrady distortion about a principal point: three radial and two
/// decentering coefficients.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RadialDecentering {
    principal_point: Vector2<f64>,
    k: [f64; 3],
    p: [f64; 2],
    closed_form: ClosedForm,
    solver: Solver,
}

impl RadialDecentering {
    /// A model that removes distortion in closed form.
    pub fn new(principal_point: (f64, f64), k: [f64; 3], p: [f64; 2]) -> Self {
        Self {
            principal_point: Vector2::new(principal_point.0, principal_point.1),
            k,
            p,
            closed_form: ClosedForm::DistortedToUndistorted,
            solver: Solver::new(SolverSettings::default()),
        }
    }

    pub fn with_closed_form(mut self, closed_form: ClosedForm) -> Self {
        self.closed_form = closed_form;
        self
    }

    pub fn with_settings(mut self, settings: SolverSettings) -> Self {
        self.solver = Solver::new(settings);
        self
    }

    pub fn principal_point(&self) -> (f64, f64) {
        (self.principal_point.x, self.principal_point.y)
    }

    pub fn radial_coefficients(&self) -> [f64; 3] {
        self.k
    }

    pub fn decentering_coefficients(&self) -> [f64; 2] {
        self.p
    }

    pub fn closed_form(&self) -> ClosedForm {
        self.closed_form
    }

    pub fn settings(&self) -> &SolverSettings {
        self.solver.settings()
    }

    pub fn last_iterations(&self) -> usize {
        self.solver.last_iterations()
    }

    /// Displacement added to a point by the closed-form direction.
    fn offset(
        principal_point: &Vector2<f64>,
        k: &[f64; 3],
        p: &[f64; 2],
        point: &Vector2<f64>,
    ) -> Vector2<f64> {
        let v = point - principal_point;
        let r2 = v.norm_squared();
        if r2 <= NEAR_CENTRE_RADIUS_SQUARED {
            return Vector2::zeros();
        }

        let radial = k[0] * r2 + k[1] * r2 * r2 + k[2] * r2 * r2 * r2;
        Vector2::new(
            v.x * radial + p[0] * (r2 + 2.0 * v.x * v.x) + 2.0 * p[1] * v.x * v.y,
            v.y * radial + p[1] * (r2 + 2.0 * v.y * v.y) + 2.0 * p[0] * v.x * v.y,
        )
    }

    fn forward(&self, point: Vector2<f64>) -> Vector2<f64> {
        point + Self::offset(&self.principal_point, &self.k, &self.p, &point)
    }

    fn inverse(&mut self, ctx: &CameraContext, target: Vector2<f64>) -> Option<Vector2<f64>> {
        if (target - self.principal_point).norm_squared() <= NEAR_CENTRE_RADIUS_SQUARED {
            self.solver_reset();
            return Some(target);
        }

        let (pp, k, p) = (self.principal_point, self.k, self.p);
        self.solver
            .run(ctx, target, |current| {
                Some(target - Self::offset(&pp, &k, &p, current))
            })
    }

    fn solver_reset(&mut self) {
        self.solver = Solver::new(*self.solver.settings());
    }

    pub fn undistort(
        &mut self,
        ctx: &CameraContext,
        point: FocalPlanePoint<Distorted>,
    ) -> Option<FocalPlanePoint<Undistorted>> {
        let p = point.as_vec2();
        let u = match self.closed_form {
            ClosedForm::DistortedToUndistorted => self.forward(p),
            ClosedForm::UndistortedToDistorted => self.inverse(ctx, p)?,
        };
        Some(FocalPlanePoint::from_vec2(u))
    }

    pub fn distort(
        &mut self,
        ctx: &CameraContext,
        point: FocalPlanePoint<Undistorted>,
    ) -> Option<FocalPlanePoint<Distorted>> {
        let p = point.as_vec2();
        let d = match self.closed_form {
            ClosedForm::DistortedToUndistorted => self.inverse(ctx, p)?,
            ClosedForm::UndistortedToDistorted => self.forward(p),
        };
        Some(FocalPlanePoint::from_vec2(d))
    }
}
