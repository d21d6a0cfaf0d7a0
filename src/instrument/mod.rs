//! The instruments a [`crate::camera::Camera`] can be built for, and how
//! each one assembles its stages from kernel and label parameters.

mod hayabusa2;
mod junocam;
mod mdis;
mod vims;
mod virtis;

use crate::{
    camera::ImageSize,
    context::CameraContext,
    detector::DetectorMap,
    distortion::DistortionMap,
    ephemeris::SpacecraftClock,
    error::{Error, Result},
    focal_plane::FocalPlaneMap,
    params::{ParameterStore, ins_key},
    time::LeapSeconds,
};
use tracing::debug;
use uom::si::{f64::Length, length::millimeter};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How a recorded observation time relates to the shutter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ShutterPolicy {
    /// The recorded time is the middle of the exposure.
    Symmetric,

    /// The recorded time is when the shutter opened.
    StartAnchored,
}

impl ShutterPolicy {
    /// Shutter open and close times for an exposure of `duration` seconds
    /// recorded at `time`.
    pub fn open_close(&self, time: f64, duration: f64) -> (f64, f64) {
        match self {
            ShutterPolicy::Symmetric => (time - duration / 2.0, time + duration / 2.0),
            ShutterPolicy::StartAnchored => (time, time + duration),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum InstrumentKind {
    Hayabusa2Onc,
    Mdis,
    JunoCam,
    VimsIr,
    VirtisIr,
}

/// Identity and timing conventions of one supported instrument.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Instrument {
    naif_code: i32,
    kind: InstrumentKind,
    name: &'static str,
    spacecraft_name: &'static str,
    spacecraft_code: i32,
    shutter: ShutterPolicy,
}

impl Instrument {
    /// Looks up a NAIF instrument code.
    pub fn from_naif_code(code: i32) -> Result<Self> {
        use InstrumentKind::*;

        let (kind, name, spacecraft_name, spacecraft_code, shutter) = match code {
            -37100 => (Hayabusa2Onc, "ONC-T", "Hayabusa2", -37, ShutterPolicy::StartAnchored),
            -37110 => (Hayabusa2Onc, "ONC-W1", "Hayabusa2", -37, ShutterPolicy::StartAnchored),
            -37120 => (Hayabusa2Onc, "ONC-W2", "Hayabusa2", -37, ShutterPolicy::StartAnchored),
            -236800 => (Mdis, "MDIS-WAC", "MESSENGER", -236, ShutterPolicy::StartAnchored),
            -236820 => (Mdis, "MDIS-NAC", "MESSENGER", -236, ShutterPolicy::StartAnchored),
            -61500 => (JunoCam, "JUNOCAM", "Juno", -61, ShutterPolicy::StartAnchored),
            -82370 => (VimsIr, "VIMS-IR", "Cassini", -82, ShutterPolicy::Symmetric),
            -226213 => (VirtisIr, "VIRTIS-M-IR", "Rosetta", -226, ShutterPolicy::Symmetric),
            _ => return Err(Error::UnknownInstrument { code }),
        };

        Ok(Self {
            naif_code: code,
            kind,
            name,
            spacecraft_name,
            spacecraft_code,
            shutter,
        })
    }

    pub fn naif_code(&self) -> i32 {
        self.naif_code
    }

    pub fn kind(&self) -> InstrumentKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn spacecraft_name(&self) -> &'static str {
        self.spacecraft_name
    }

    pub fn spacecraft_code(&self) -> i32 {
        self.spacecraft_code
    }

    pub fn shutter(&self) -> ShutterPolicy {
        self.shutter
    }

    /// Frame of the spacecraft bus pointing kernels.
    pub fn ck_frame_id(&self) -> i32 {
        self.spacecraft_code * 1000
    }

    /// J2000.
    pub fn ck_reference_id(&self) -> i32 {
        1
    }

    pub fn spk_target_id(&self) -> i32 {
        self.spacecraft_code
    }

    /// J2000.
    pub fn spk_reference_id(&self) -> i32 {
        1
    }

    /// Reads the instrument's calibration and builds its stages.
    pub(crate) fn build(
        &self,
        image: &ImageSize,
        label: &impl ParameterStore,
        kernels: &impl ParameterStore,
        clock: &impl SpacecraftClock,
    ) -> Result<Stages> {
        match self.kind {
            InstrumentKind::Hayabusa2Onc => hayabusa2::build(self, label, kernels, clock),
            InstrumentKind::Mdis => mdis::build(self, label, kernels, clock),
            InstrumentKind::JunoCam => junocam::build(self, image, label, kernels, clock),
            InstrumentKind::VimsIr => vims::build(self, image, label, kernels, clock),
            InstrumentKind::VirtisIr => virtis::build(self, image, label, kernels, clock),
        }
    }
}

/// Everything an instrument contributes to a camera.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Stages {
    pub ctx: CameraContext,
    pub detector: DetectorMap,
    pub focal_plane: FocalPlaneMap,
    pub distortion: DistortionMap,

    /// Time the camera starts at before any pixel is mapped.
    pub time: f64,

    /// Recorded start of the observation, as the shutter policy reads it.
    pub start_time: f64,

    /// Label exposure duration in seconds.
    pub exposure_duration: f64,
}

fn focal_length(code: i32, kernels: &impl ParameterStore) -> Result<f64> {
    kernels.get_double(&ins_key(code, "FOCAL_LENGTH"))
}

fn context(code: i32, focal_length: f64, kernels: &impl ParameterStore) -> Result<CameraContext> {
    let pixel_pitch = kernels.get_double(&ins_key(code, "PIXEL_PITCH"))?;
    CameraContext::new(
        Length::new::<millimeter>(focal_length),
        Length::new::<millimeter>(pixel_pitch),
    )
}

/// `TRANSX`/`TRANSY` with the detector origin at the kernel boresight.
fn focal_plane(code: i32, kernels: &impl ParameterStore) -> Result<FocalPlaneMap> {
    let mut map = FocalPlaneMap::from_store(code, kernels)?;
    map.set_detector_origin(
        kernels.get_double(&ins_key(code, "BORESIGHT_SAMPLE"))?,
        kernels.get_double(&ins_key(code, "BORESIGHT_LINE"))?,
    );
    Ok(map)
}

/// Converts the label's `SpacecraftClockStartCount`, or its UTC `StartTime`
/// when the label has no clock count.
fn clock_start(
    instrument: &Instrument,
    label: &impl ParameterStore,
    clock: &impl SpacecraftClock,
) -> Result<f64> {
    match label.contains("SpacecraftClockStartCount") {
        true => clock.clock_to_et(
            instrument.spacecraft_code(),
            label.get_string("SpacecraftClockStartCount")?,
        ),
        false => {
            let start_time = label.get_string("StartTime")?;
            debug!(start_time, "no spacecraft clock count, using the UTC start time");
            LeapSeconds::default().parse_utc_to_et(start_time)
        }
    }
}

/// The first `N` values of `key`.
fn doubles<const N: usize>(store: &impl ParameterStore, key: &str) -> Result<[f64; N]> {
    let mut values = [0.0; N];
    for (index, value) in values.iter_mut().enumerate() {
        *value = store.get_double_at(key, index)?;
    }
    Ok(values)
}

/// Like [`doubles`], zero-filled when the key is absent.
fn doubles_or_zero<const N: usize>(store: &impl ParameterStore, key: &str) -> Result<[f64; N]> {
    match store.contains(key) {
        true => doubles(store, key),
        false => Ok([0.0; N]),
    }
}
