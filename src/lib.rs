// #![warn(missing_docs)]

//! Camera Sensor Geometry for Planetary Images
//!
//! A [`Camera`] chains four stages to turn an image coordinate into a look
//! direction, and back:
//!
//! 1. [`detector::DetectorMap`] converts image (parent) pixels to detector
//!    pixels and, for scanning instruments, sets the acquisition time.
//! 2. [`focal_plane::FocalPlaneMap`] converts detector pixels to distorted
//!    focal plane millimetres.
//! 3. [`distortion::DistortionMap`] removes lens distortion.
//! 4. [`sky::SkyMap`] and [`ground::GroundMap`] rotate the undistorted ray into
//!    J2000 and intersect it with the target.
//!
//! Every stage receives the shared [`context::CameraContext`] explicitly.
//! Pointing and position come from an [`ephemeris::Ephemeris`], calibration
//! and label values from a [`params::ParameterStore`].

pub mod camera;
pub mod context;
pub mod detector;
pub mod distortion;
pub mod ephemeris;
#[allow(missing_docs)]
pub mod error;
pub mod focal_plane;
pub mod ground;
pub mod instrument;
pub mod params;
pub mod sky;
pub mod time;

pub use camera::{Camera, ImagePoint, ImageSize};
pub use error::{Error, Result};
