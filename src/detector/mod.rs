//! Parent image ⇄ detector coordinate maps.
//!
//! Coordinates are 1-based pixel centres: `(0.5, 0.5)` is the upper-left
//! corner of the first pixel. Time-dependent maps also move the
//! [`CameraContext`] clock when they resolve a parent coordinate.

mod framing;
mod pushframe;
mod sample_scan;

pub use framing::FramingDetectorMap;
pub use pushframe::{PushframeConfig, PushframeDetectorMap};
pub use sample_scan::{
    FiducialAffine, SampleRateChange, SampleRateTable, SampleScanDetectorMap, ScanReadout,
    VariableSampleScanDetectorMap,
};

use crate::{context::CameraContext, error::Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A coordinate in the (possibly summed and cropped) parent image.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParentCoordinate {
    pub sample: f64,
    pub line: f64,
}

impl ParentCoordinate {
    pub fn new(sample: f64, line: f64) -> Self {
        Self { sample, line }
    }
}

/// A coordinate on the physical detector.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DetectorCoordinate {
    pub sample: f64,
    pub line: f64,

    /// Set by framelet-based detectors only.
    pub framelet: Option<FrameletPosition>,
}

impl DetectorCoordinate {
    pub fn new(sample: f64, line: f64) -> Self {
        Self {
            sample,
            line,
            framelet: None,
        }
    }
}

/// Where a detector coordinate sits within a pushframe framelet.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FrameletPosition {
    /// 1-based framelet number.
    pub index: i64,

    /// Unsummed line within the framelet, in `[0.5, framelet_height + 0.5]`.
    pub line: f64,
}

/// The detector map variants a camera can be built with.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DetectorMap {
    Framing(FramingDetectorMap),
    Pushframe(PushframeDetectorMap),
    SampleScan(SampleScanDetectorMap),
    VariableSampleScan(VariableSampleScanDetectorMap),
}

impl DetectorMap {
    /// Converts a detector coordinate to a parent coordinate.
    ///
    /// Returns `None` if the detector coordinate does not correspond to a
    /// valid parent pixel at the current time.
    pub fn set_detector(
        &mut self,
        ctx: &CameraContext,
        sample: f64,
        line: f64,
    ) -> Option<ParentCoordinate> {
        match self {
            DetectorMap::Framing(map) => map.set_detector(sample, line),
            DetectorMap::Pushframe(map) => map.set_detector(sample, line),
            DetectorMap::SampleScan(map) => map.set_detector(ctx, sample, line),
            DetectorMap::VariableSampleScan(map) => map.set_detector(ctx, sample, line),
        }
    }

    /// Converts a parent coordinate to a detector coordinate, updating the
    /// context clock for time-dependent detectors.
    pub fn set_parent(
        &mut self,
        ctx: &mut CameraContext,
        sample: f64,
        line: f64,
        delta_t: f64,
    ) -> Option<DetectorCoordinate> {
        match self {
            DetectorMap::Framing(map) => map.set_parent(ctx, sample, line, delta_t),
            DetectorMap::Pushframe(map) => map.set_parent(ctx, sample, line, delta_t),
            DetectorMap::SampleScan(map) => map.set_parent(ctx, sample, line, delta_t),
            DetectorMap::VariableSampleScan(map) => map.set_parent(ctx, sample, line, delta_t),
        }
    }

    /// Time the parent pixel was acquired, for detectors that acquire
    /// pixels one sample at a time. Does not move the clock.
    pub fn acquisition_time(&self, sample: f64, line: f64) -> Option<f64> {
        match self {
            DetectorMap::SampleScan(map) => Some(map.sample_time(sample, line)),
            DetectorMap::VariableSampleScan(map) => map.sample_time(sample, line),
            DetectorMap::Framing(_) | DetectorMap::Pushframe(_) => None,
        }
    }

    /// Exposure duration of the pixel at a parent coordinate.
    ///
    /// Framing detectors return [`crate::Error::UnsupportedOperation`]. No
    /// variant varies its exposure by band yet.
    pub fn exposure_duration(&self, sample: f64, line: f64, _band: usize) -> Result<f64> {
        match self {
            DetectorMap::Framing(map) => map.exposure_duration(),
            DetectorMap::Pushframe(map) => Ok(map.exposure_duration()),
            DetectorMap::SampleScan(map) => Ok(map.exposure_duration()),
            DetectorMap::VariableSampleScan(map) => map.exposure_duration(sample, line),
        }
    }

    /// Selects the band used by band-dependent detectors.
    pub fn set_band(&mut self, band: usize) -> Result<()> {
        match self {
            DetectorMap::Pushframe(map) => map.set_band(band),
            _ => Ok(()),
        }
    }

    /// Returns `true` if resolving a parent coordinate moves the clock.
    pub fn is_time_dependent(&self) -> bool {
        !matches!(self, DetectorMap::Framing(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DetectorMap::Framing(_) => "framing",
            DetectorMap::Pushframe(_) => "pushframe",
            DetectorMap::SampleScan(_) => "sample scan",
            DetectorMap::VariableSampleScan(_) => "variable sample scan",
        }
    }

    /// The summing and starting-detector arithmetic shared by every variant.
    pub fn base(&self) -> &FramingDetectorMap {
        match self {
            DetectorMap::Framing(map) => map,
            DetectorMap::Pushframe(map) => map.base(),
            DetectorMap::SampleScan(map) => map.base(),
            DetectorMap::VariableSampleScan(map) => map.base(),
        }
    }

    pub fn base_mut(&mut self) -> &mut FramingDetectorMap {
        match self {
            DetectorMap::Framing(map) => map,
            DetectorMap::Pushframe(map) => map.base_mut(),
            DetectorMap::SampleScan(map) => map.base_mut(),
            DetectorMap::VariableSampleScan(map) => map.base_mut(),
        }
    }

    pub fn parent(&self) -> ParentCoordinate {
        self.base().parent()
    }

    pub fn detector(&self) -> DetectorCoordinate {
        self.base().detector()
    }

    pub fn sample_scale_factor(&self) -> f64 {
        self.base().sample_scale_factor()
    }

    pub fn line_scale_factor(&self) -> f64 {
        self.base().line_scale_factor()
    }
}

impl From<FramingDetectorMap> for DetectorMap {
    fn from(map: FramingDetectorMap) -> Self {
        DetectorMap::Framing(map)
    }
}

impl From<PushframeDetectorMap> for DetectorMap {
    fn from(map: PushframeDetectorMap) -> Self {
        DetectorMap::Pushframe(map)
    }
}

impl From<SampleScanDetectorMap> for DetectorMap {
    fn from(map: SampleScanDetectorMap) -> Self {
        DetectorMap::SampleScan(map)
    }
}

impl From<VariableSampleScanDetectorMap> for DetectorMap {
    fn from(map: VariableSampleScanDetectorMap) -> Self {
        DetectorMap::VariableSampleScan(map)
    }
}
