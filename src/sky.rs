//! Undistorted focal plane ⇄ celestial look direction.

use crate::{
    context::CameraContext,
    ephemeris::Ephemeris,
    error::{Error, Result},
};
use nalgebra::Vector3;
use uom::si::{
    angle::{degree, radian},
    f64::Angle,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A unit look direction in both the instrument frame and J2000.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LookDirection {
    camera: Vector3<f64>,
    j2000: Vector3<f64>,
}

impl LookDirection {
    /// Unit vector in the instrument frame, +Z along the boresight.
    pub fn camera(&self) -> &Vector3<f64> {
        &self.camera
    }

    /// Unit vector in J2000.
    pub fn j2000(&self) -> &Vector3<f64> {
        &self.j2000
    }

    /// Right ascension in `[0, 360)` degrees.
    pub fn right_ascension(&self) -> Angle {
        let ra = self.j2000.y.atan2(self.j2000.x).to_degrees();
        Angle::new::<degree>(if ra < 0.0 { ra + 360.0 } else { ra })
    }

    pub fn declination(&self) -> Angle {
        Angle::new::<radian>(self.j2000.z.clamp(-1.0, 1.0).asin())
    }
}

/// Unit J2000 vector pointing at `(ra, dec)`.
pub fn celestial_unit_vector(ra: Angle, dec: Angle) -> Vector3<f64> {
    let (ra, dec) = (ra.get::<radian>(), dec.get::<radian>());
    Vector3::new(dec.cos() * ra.cos(), dec.cos() * ra.sin(), dec.sin())
}

/// Projects an instrument-frame direction onto the focal plane.
///
/// A direction nearly parallel to the focal plane produces very large
/// coordinates rather than a failure.
pub(crate) fn project(ctx: &CameraContext, look: &Vector3<f64>) -> (f64, f64) {
    let scale = ctx.focal_length_mm() / look.z;
    (look.x * scale, look.y * scale)
}

#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SkyMap {
    look: Option<LookDirection>,
}

impl SkyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// The look direction from the last successful conversion.
    pub fn look_direction(&self) -> Option<&LookDirection> {
        self.look.as_ref()
    }

    pub fn right_ascension_declination(&self) -> Option<(Angle, Angle)> {
        self.look
            .as_ref()
            .map(|look| (look.right_ascension(), look.declination()))
    }

    /// Normalises `(ux, uy, uz)` and rotates it to J2000 at the current time.
    pub fn set_focal_plane(
        &mut self,
        ctx: &CameraContext,
        ephemeris: &impl Ephemeris,
        ux: f64,
        uy: f64,
        uz: f64,
    ) -> Result<LookDirection> {
        let et = ctx.time().ok_or(Error::TimeNotSet)?;
        let camera = Vector3::new(ux, uy, uz).normalize();
        let j2000 = ephemeris.instrument_rotation(et)? * camera;

        let look = LookDirection { camera, j2000 };
        self.look = Some(look);
        Ok(look)
    }

    /// Undistorted focal plane position of the direction `(ra, dec)` at the
    /// current time.
    pub fn set_sky(
        &mut self,
        ctx: &CameraContext,
        ephemeris: &impl Ephemeris,
        ra: Angle,
        dec: Angle,
    ) -> Result<(f64, f64)> {
        let et = ctx.time().ok_or(Error::TimeNotSet)?;
        let j2000 = celestial_unit_vector(ra, dec);
        let camera = ephemeris.instrument_rotation(et)?.inverse() * j2000;

        self.look = Some(LookDirection { camera, j2000 });
        Ok(project(ctx, &camera))
    }
}
