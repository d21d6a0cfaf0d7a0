//! Undistorted focal plane ⇄ target surface.

use crate::{
    context::CameraContext,
    ephemeris::Ephemeris,
    error::{Error, Result},
    params::ParameterStore,
    sky::project,
};
use nalgebra::Vector3;
use uom::si::{
    angle::{degree, radian},
    f64::{Angle, Length},
    length::kilometer,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Relative distance by which another surface crossing must precede a
/// ground point for the point to count as hidden.
const OCCLUSION_TOLERANCE: f64 = 1e-9;

/// A planetocentric, east-positive surface location.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SurfacePoint {
    pub latitude: Angle,
    pub longitude: Angle,
    pub radius: Length,
}

impl SurfacePoint {
    pub fn new(latitude: Angle, longitude: Angle, radius: Length) -> Self {
        Self {
            latitude,
            longitude,
            radius,
        }
    }

    /// Body-fixed position in km. Longitude is wrapped to `[0, 360)`.
    pub fn from_body_fixed(p: &Vector3<f64>) -> Self {
        let longitude = p.y.atan2(p.x).to_degrees();
        Self {
            latitude: Angle::new::<radian>(p.z.atan2(p.x.hypot(p.y))),
            longitude: Angle::new::<degree>(if longitude < 0.0 {
                longitude + 360.0
            } else {
                longitude
            }),
            radius: Length::new::<kilometer>(p.norm()),
        }
    }

    /// Body-fixed position in km.
    pub fn to_body_fixed(&self) -> Vector3<f64> {
        let (lat, lon) = (self.latitude.get::<radian>(), self.longitude.get::<radian>());
        self.radius.get::<kilometer>()
            * Vector3::new(lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin())
    }
}

/// Target shape as a triaxial ellipsoid.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GroundMap {
    /// Semi-axes in km.
    radii: Vector3<f64>,
    point: Option<SurfacePoint>,
}

impl GroundMap {
    pub fn new(radii: [f64; 3]) -> Result<Self> {
        if radii.iter().any(|r| !(r.is_finite() && *r > 0.0)) {
            return Err(Error::InvalidConfiguration(format!(
                "target radii must be positive, got {radii:?}"
            )));
        }

        Ok(Self {
            radii: Vector3::from(radii),
            point: None,
        })
    }

    /// Reads `BODY<target>_RADII`.
    pub fn from_store(target: i32, store: &impl ParameterStore) -> Result<Self> {
        let key = format!("BODY{target}_RADII");
        let values = store.get_doubles(&key)?;
        let radii: [f64; 3] = values.try_into().map_err(|_| Error::ParameterIndex {
            key: key.clone(),
            index: 2,
            len: values.len(),
        })?;
        Self::new(radii)
    }

    pub fn radii(&self) -> [f64; 3] {
        [self.radii.x, self.radii.y, self.radii.z]
    }

    /// The surface point from the last successful conversion.
    pub fn surface_point(&self) -> Option<&SurfacePoint> {
        self.point.as_ref()
    }

    /// The point on the ellipsoid at a planetocentric latitude and longitude.
    pub fn point_on_surface(&self, latitude: Angle, longitude: Angle) -> SurfacePoint {
        let unit = SurfacePoint::new(latitude, longitude, Length::new::<kilometer>(1.0))
            .to_body_fixed();
        let radius = 1.0 / unit.component_div(&self.radii).norm();
        SurfacePoint::new(latitude, longitude, Length::new::<kilometer>(radius))
    }

    /// Distance along `direction` (unit) from `origin` to the first crossing
    /// of the ellipsoid in front of the origin.
    fn intersect(&self, origin: &Vector3<f64>, direction: &Vector3<f64>) -> Option<f64> {
        let o = origin.component_div(&self.radii);
        let d = direction.component_div(&self.radii);

        let a = d.norm_squared();
        let b = 2.0 * o.dot(&d);
        let c = o.norm_squared() - 1.0;
        let discriminant = b * b - 4.0 * a * c;
        if discriminant < 0.0 {
            return None;
        }

        let near = (-b - discriminant.sqrt()) / (2.0 * a);
        (near >= 0.0).then_some(near)
    }

    /// Intersects the look ray through `(ux, uy, uz)` with the target.
    ///
    /// Returns `None` when the ray misses the target.
    pub fn set_focal_plane(
        &mut self,
        ctx: &CameraContext,
        ephemeris: &impl Ephemeris,
        ux: f64,
        uy: f64,
        uz: f64,
    ) -> Result<Option<SurfacePoint>> {
        let et = ctx.time().ok_or(Error::TimeNotSet)?;
        let camera = Vector3::new(ux, uy, uz).normalize();
        let j2000 = ephemeris.instrument_rotation(et)? * camera;
        let body = ephemeris.body_rotation(et)? * j2000;
        let spacecraft = ephemeris.spacecraft_position(et)?;

        let Some(distance) = self.intersect(&spacecraft, &body) else {
            return Ok(None);
        };

        let point = SurfacePoint::from_body_fixed(&(spacecraft + body * distance));
        self.point = Some(point);
        Ok(Some(point))
    }

    /// Undistorted focal plane position of a surface point at the current
    /// time.
    ///
    /// Returns `None` when the point is behind the camera or hidden by the
    /// target's limb.
    pub fn set_ground(
        &mut self,
        ctx: &CameraContext,
        ephemeris: &impl Ephemeris,
        point: &SurfacePoint,
    ) -> Result<Option<(f64, f64)>> {
        let et = ctx.time().ok_or(Error::TimeNotSet)?;
        let spacecraft = ephemeris.spacecraft_position(et)?;
        let target = point.to_body_fixed();

        let to_target = target - spacecraft;
        let range = to_target.norm();
        let direction = to_target / range;
        let hidden = self
            .intersect(&spacecraft, &direction)
            .is_some_and(|crossing| {
                crossing < range * (1.0 - OCCLUSION_TOLERANCE) - OCCLUSION_TOLERANCE
            });
        if hidden {
            return Ok(None);
        }

        let j2000 = ephemeris.body_rotation(et)?.inverse() * direction;
        let camera = ephemeris.instrument_rotation(et)?.inverse() * j2000;
        if camera.z <= 0.0 {
            return Ok(None);
        }

        self.point = Some(*point);
        Ok(Some(project(ctx, &camera)))
    }
}
