//! Optical distortion in the focal plane.
//!
//! Every model converts between distorted coordinates (where light actually
//! lands) and undistorted coordinates (where an ideal pinhole would put it),
//! both in millimetres. One direction is closed form and the other is solved
//! iteratively with the model's [`SolverSettings`].

mod piecewise;
mod radial;
mod taylor;

pub use piecewise::{PiecewiseRadial, RadialKnot};
pub use radial::{Radial, RadialDecentering};
pub use taylor::TaylorSeries;

use crate::context::CameraContext;
use nalgebra::Vector2;
use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub trait FocalPlaneKind: Copy + Clone {}

/// Marks coordinates that include lens distortion.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Distorted;
impl FocalPlaneKind for Distorted {}

/// Marks coordinates with lens distortion removed.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Undistorted;
impl FocalPlaneKind for Undistorted {}

/// A focal plane position in millimetres.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FocalPlanePoint<Kind: FocalPlaneKind> {
    x: f64,
    y: f64,
    _phan: std::marker::PhantomData<Kind>,
}

impl<Kind: FocalPlaneKind> FocalPlanePoint<Kind> {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            _phan: std::marker::PhantomData,
        }
    }

    fn from_vec2(v: Vector2<f64>) -> Self {
        Self::new(v.x, v.y)
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn as_vec2(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }
}

/// The direction a model evaluates without iterating.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ClosedForm {
    DistortedToUndistorted,
    UndistortedToDistorted,
}

/// Convergence threshold of an iterative inverse.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Tolerance {
    Millimetres(f64),

    /// The detector pixel pitch divided by this value.
    PixelPitchFraction(f64),
}

impl Tolerance {
    /// The threshold in millimetres.
    pub fn resolve(&self, ctx: &CameraContext) -> f64 {
        match *self {
            Tolerance::Millimetres(mm) => mm,
            Tolerance::PixelPitchFraction(n) => ctx.pixel_pitch_mm() / n,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolverSettings {
    pub tolerance: Tolerance,
    pub max_iterations: usize,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            tolerance: Tolerance::PixelPitchFraction(100.0),
            max_iterations: 50,
        }
    }
}

impl SolverSettings {
    pub fn new(tolerance: Tolerance, max_iterations: usize) -> Self {
        Self {
            tolerance,
            max_iterations,
        }
    }
}

/// Iterates a correction step until it settles below the tolerance.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub(crate) struct Solver {
    settings: SolverSettings,
    last_iterations: usize,
}

impl Solver {
    pub(crate) fn new(settings: SolverSettings) -> Self {
        Self {
            settings,
            last_iterations: 0,
        }
    }

    pub(crate) fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    pub(crate) fn last_iterations(&self) -> usize {
        self.last_iterations
    }

    /// Applies `step` starting from `start` until successive estimates differ
    /// by less than the tolerance.
    ///
    /// Returns `None` if `step` fails or `max_iterations` steps pass without
    /// converging.
    pub(crate) fn run<F>(
        &mut self,
        ctx: &CameraContext,
        start: Vector2<f64>,
        mut step: F,
    ) -> Option<Vector2<f64>>
    where
        F: FnMut(&Vector2<f64>) -> Option<Vector2<f64>>,
    {
        let tolerance = self.settings.tolerance.resolve(ctx);
        let mut current = start;
        self.last_iterations = 0;

        while self.last_iterations < self.settings.max_iterations {
            self.last_iterations += 1;

            let next = step(&current)?;
            if !(next.x.is_finite() && next.y.is_finite()) {
                debug!(iterations = self.last_iterations, "distortion solver diverged");
                return None;
            }

            let change = (next - current).norm();
            current = next;
            if change < tolerance {
                return Some(current);
            }
        }

        debug!(
            iterations = self.last_iterations,
            x = start.x,
            y = start.y,
            "distortion solver did not converge"
        );
        None
    }
}

/// The distortion models a camera can be built with.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DistortionMap {
    #[default]
    Identity,
    Radial(Radial),
    RadialDecentering(RadialDecentering),
    TaylorSeries(TaylorSeries),
    PiecewiseCustom(PiecewiseRadial),
}

impl DistortionMap {
    /// Removes distortion from a distorted focal plane position.
    ///
    /// Returns `None` when an iterative inverse fails to converge.
    pub fn set_focal_plane(
        &mut self,
        ctx: &CameraContext,
        dx: f64,
        dy: f64,
    ) -> Option<FocalPlanePoint<Undistorted>> {
        let distorted = FocalPlanePoint::<Distorted>::new(dx, dy);
        match self {
            DistortionMap::Identity => Some(FocalPlanePoint::new(dx, dy)),
            DistortionMap::Radial(model) => model.undistort(ctx, distorted),
            DistortionMap::RadialDecentering(model) => model.undistort(ctx, distorted),
            DistortionMap::TaylorSeries(model) => model.undistort(ctx, distorted),
            DistortionMap::PiecewiseCustom(model) => Some(model.undistort(distorted)),
        }
    }

    /// Applies distortion to an undistorted focal plane position.
    ///
    /// Returns `None` when an iterative inverse fails to converge.
    pub fn set_undistorted_focal_plane(
        &mut self,
        ctx: &CameraContext,
        ux: f64,
        uy: f64,
    ) -> Option<FocalPlanePoint<Distorted>> {
        let undistorted = FocalPlanePoint::<Undistorted>::new(ux, uy);
        match self {
            DistortionMap::Identity => Some(FocalPlanePoint::new(ux, uy)),
            DistortionMap::Radial(model) => model.distort(ctx, undistorted),
            DistortionMap::RadialDecentering(model) => model.distort(ctx, undistorted),
            DistortionMap::TaylorSeries(model) => model.distort(ctx, undistorted),
            DistortionMap::PiecewiseCustom(model) => Some(model.distort(undistorted)),
        }
    }

    pub fn closed_form(&self) -> ClosedForm {
        match self {
            DistortionMap::Identity | DistortionMap::PiecewiseCustom(_) => {
                ClosedForm::DistortedToUndistorted
            }
            DistortionMap::Radial(model) => model.closed_form(),
            DistortionMap::RadialDecentering(model) => model.closed_form(),
            DistortionMap::TaylorSeries(_) => ClosedForm::UndistortedToDistorted,
        }
    }

    /// Iterations spent by the most recent iterative conversion.
    pub fn last_iterations(&self) -> usize {
        match self {
            DistortionMap::Identity | DistortionMap::PiecewiseCustom(_) => 0,
            DistortionMap::Radial(model) => model.last_iterations(),
            DistortionMap::RadialDecentering(model) => model.last_iterations(),
            DistortionMap::TaylorSeries(model) => model.last_iterations(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DistortionMap::Identity => "identity",
            DistortionMap::Radial(_) => "radial",
            DistortionMap::RadialDecentering(_) => "radial decentering",
            DistortionMap::TaylorSeries(_) => "taylor series",
            DistortionMap::PiecewiseCustom(_) => "piecewise",
        }
    }
}

impl From<Radial> for DistortionMap {
    fn from(model: Radial) -> Self {
        DistortionMap::Radial(model)
    }
}

impl From<RadialDecentering> for DistortionMap {
    fn from(model: RadialDecentering) -> Self {
        DistortionMap::RadialDecentering(model)
    }
}

impl From<TaylorSeries> for DistortionMap {
    fn from(model: TaylorSeries) -> Self {
        DistortionMap::TaylorSeries(model)
    }
}

impl From<PiecewiseRadial> for DistortionMap {
    fn from(model: PiecewiseRadial) -> Self {
        DistortionMap::PiecewiseCustom(model)
    }
}
