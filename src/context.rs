use crate::error::{Error, Result};
use uom::{
    ConstZero,
    si::{f64::Length, length::millimeter},
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// State shared by every stage of one camera.
///
/// Detector maps are the only stages that move the clock. Every stage
/// receives the context as an argument instead of holding a reference to the
/// camera that owns it.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CameraContext {
    time: Option<f64>,
    focal_length: Length,
    pixel_pitch: Length,
}

impl CameraContext {
    /// Creates a context with no time established yet.
    ///
    /// Returns an error if either calibration constant is not positive.
    pub fn new(focal_length: Length, pixel_pitch: Length) -> Result<Self> {
        if !(focal_length > Length::ZERO) {
            return Err(Error::InvalidConfiguration(format!(
                "focal length must be positive, got {} mm",
                focal_length.get::<millimeter>()
            )));
        }

        if !(pixel_pitch > Length::ZERO) {
            return Err(Error::InvalidConfiguration(format!(
                "pixel pitch must be positive, got {} mm",
                pixel_pitch.get::<millimeter>()
            )));
        }

        Ok(Self {
            time: None,
            focal_length,
            pixel_pitch,
        })
    }

    pub fn focal_length(&self) -> Length {
        self.focal_length
    }

    pub fn pixel_pitch(&self) -> Length {
        self.pixel_pitch
    }

    /// Focal length in millimetres.
    pub fn focal_length_mm(&self) -> f64 {
        self.focal_length.get::<millimeter>()
    }

    /// Pixel pitch in millimetres.
    pub fn pixel_pitch_mm(&self) -> f64 {
        self.pixel_pitch.get::<millimeter>()
    }

    /// The current ephemeris time, if one has been established.
    pub fn time(&self) -> Option<f64> {
        self.time
    }

    pub fn is_time_set(&self) -> bool {
        self.time.is_some()
    }

    pub fn set_time(&mut self, et: f64) {
        self.time = Some(et);
    }

    /// Moves an established time by `delta` seconds. Does nothing when no
    /// time has been set.
    pub fn advance_time(&mut self, delta: f64) {
        if let Some(time) = self.time.as_mut() {
            *time += delta;
        }
    }
}
