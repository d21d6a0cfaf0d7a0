//! JunoCam: a pushframe imager whose filter strips share one detector.

use super::{Instrument, Stages, clock_start, context, focal_length, focal_plane};
use crate::{
    camera::ImageSize,
    detector::{PushframeConfig, PushframeDetectorMap},
    distortion::{ClosedForm, Radial, SolverSettings},
    ephemeris::SpacecraftClock,
    error::{Error, Result},
    params::{ParameterStore, ins_key},
};

/// Lines in one filter strip.
const FRAMELET_HEIGHT: f64 = 128.0;

/// Kernel code of filter `number` (1 blue, 2 green, 3 red, 4 methane).
fn filter_code(code: i32, number: f64) -> i32 {
    code - number as i32
}

pub(super) fn build(
    instrument: &Instrument,
    image: &ImageSize,
    label: &impl ParameterStore,
    kernels: &impl ParameterStore,
    clock: &impl SpacecraftClock,
) -> Result<Stages> {
    let code = instrument.naif_code();
    let ctx = context(code, focal_length(code, kernels)?, kernels)?;

    let filters = label.get_doubles("FilterNumber")?;
    if filters.len() != image.bands {
        return Err(Error::InvalidConfiguration(format!(
            "{} filters for {} bands",
            filters.len(),
            image.bands
        )));
    }

    let band_start_detectors = filters
        .iter()
        .map(|&number| kernels.get_double(&ins_key(filter_code(code, number), "FILTER_OFFSET")))
        .collect::<Result<Vec<_>>>()?;

    let exposure_duration = label.get_double("ExposureDuration")? / 1000.0;
    let start = clock_start(instrument, label, clock)?
        + kernels.get_double_or(&ins_key(code, "START_TIME_BIAS"), 0.0)?;
    let framelet_rate = label.get_double("InterFrameDelay")?
        + kernels.get_double_or(&ins_key(code, "INTERFRAME_DELTA"), 0.0)?;

    let mut detector = PushframeDetectorMap::new(PushframeConfig {
        et_start: start,
        framelet_rate,
        exposure_duration,
        framelet_height: FRAMELET_HEIGHT,
        framelet_offset: label.get_integer_or("FrameletOffset", 0)?,
        flipped_framelets: false,
        time_ascending_framelets: true,
        nframelets: None,
        parent_lines: image.lines as f64,
        band_start_detectors,
    })?;
    detector.set_band(1)?;

    let distortion = Radial::new(kernels.get_double(&ins_key(code, "DISTORTION_K1"))?)
        .with_closed_form(ClosedForm::UndistortedToDistorted)
        .with_settings(SolverSettings::default());

    Ok(Stages {
        ctx,
        detector: detector.into(),
        focal_plane: focal_plane(code, kernels)?,
        distortion: distortion.into(),
        time: start + exposure_duration / 2.0,
        start_time: start,
        exposure_duration,
    })
}
