use super::{Distorted, FocalPlanePoint, Undistorted};
use crate::error::{Error, Result};
use nalgebra::Vector2;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Paired distorted and undistorted radii (mm).
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RadialKnot {
    pub distorted: f64,
    pub undistorted: f64,
}

impl RadialKnot {
    pub fn new(distorted: f64, undistorted: f64) -> Self {
        Self {
            distorted,
            undistorted,
        }
    }
}

/// Radial distortion given by a measured table of radii.
///
/// The origin is an implicit first knot. Between knots the radius is
/// interpolated linearly; past the last knot the last segment is extended.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PiecewiseRadial {
    knots: Vec<RadialKnot>,
}

impl PiecewiseRadial {
    /// Fails unless both radii strictly increase from the origin.
    pub fn new(mut knots: Vec<RadialKnot>) -> Result<Self> {
        if knots.is_empty() {
            return Err(Error::InvalidConfiguration(
                "piecewise distortion needs at least one knot".into(),
            ));
        }

        let origin = RadialKnot::new(0.0, 0.0);
        if knots[0] != origin {
            knots.insert(0, origin);
        }

        let ascending = knots.windows(2).all(|pair| {
            pair[1].distorted > pair[0].distorted && pair[1].undistorted > pair[0].undistorted
        });
        if knots.len() < 2 || !ascending {
            return Err(Error::InvalidConfiguration(
                "piecewise distortion radii must strictly increase".into(),
            ));
        }

        Ok(Self { knots })
    }

    /// The knots including the origin.
    pub fn knots(&self) -> &[RadialKnot] {
        &self.knots
    }

    fn interpolate<F, G>(&self, radius: f64, from: F, to: G) -> f64
    where
        F: Fn(&RadialKnot) -> f64,
        G: Fn(&RadialKnot) -> f64,
    {
        let segment = self
            .knots
            .windows(2)
            .find(|pair| radius <= from(&pair[1]))
            .unwrap_or(&self.knots[self.knots.len() - 2..]);

        let (a, b) = (&segment[0], &segment[1]);
        to(a) + (radius - from(a)) * (to(b) - to(a)) / (from(b) - from(a))
    }

    fn rescale(p: Vector2<f64>, radius: f64, new_radius: f64) -> Vector2<f64> {
        match radius > 0.0 {
            true => p * (new_radius / radius),
            false => p,
        }
    }

    pub fn undistort(&self, point: FocalPlanePoint<Distorted>) -> FocalPlanePoint<Undistorted> {
        let p = point.as_vec2();
        let r = p.norm();
        let ru = self.interpolate(r, |k| k.distorted, |k| k.undistorted);
        FocalPlanePoint::from_vec2(Self::rescale(p, r, ru))
    }

    pub fn distort(&self, point: FocalPlanePoint<Undistorted>) -> FocalPlanePoint<Distorted> {
        let p = point.as_vec2();
        let r = p.norm();
        let rd = self.interpolate(r, |k| k.undistorted, |k| k.distorted);
        FocalPlanePoint::from_vec2(Self::rescale(p, r, rd))
    }
}
