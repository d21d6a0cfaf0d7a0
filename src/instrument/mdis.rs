//! MESSENGER Mercury Dual Imaging System.

use super::{Instrument, Stages, clock_start, context, focal_length, focal_plane};
use crate::{
    detector::FramingDetectorMap,
    distortion::{SolverSettings, TaylorSeries, Tolerance},
    ephemeris::SpacecraftClock,
    error::Result,
    params::{ParameterStore, ins_key},
};
use tracing::debug;

/// Focal length in mm, from the focal plane temperature polynomial when the
/// kernels and label carry one.
fn temperature_focal_length(
    code: i32,
    label: &impl ParameterStore,
    kernels: &impl ParameterStore,
) -> Result<f64> {
    let key = ins_key(code, "FL_TEMP_COEFFS");
    if !(kernels.contains(&key) && label.contains("FocalPlaneTemperature")) {
        return focal_length(code, kernels);
    }

    let temperature = label.get_double("FocalPlaneTemperature")?;
    let focal_length = kernels
        .get_doubles(&key)?
        .iter()
        .rev()
        .fold(0.0, |acc, c| acc * temperature + c);
    debug!(code, temperature, focal_length, "focal length from temperature");
    Ok(focal_length)
}

pub(super) fn build(
    instrument: &Instrument,
    label: &impl ParameterStore,
    kernels: &impl ParameterStore,
    clock: &impl SpacecraftClock,
) -> Result<Stages> {
    let code = instrument.naif_code();
    let ctx = context(code, temperature_focal_length(code, label, kernels)?, kernels)?;

    // FPU binning halves the 1024 array; pixel binning sums on top of it.
    let fpu = label.get_double_or("FpuBinningMode", 0.0)?;
    let pixel = label.get_double_or("PixelBinningMode", 0.0)?;
    let summing = (1.0 + fpu) * pixel.max(1.0);

    let mut detector = FramingDetectorMap::new();
    detector.set_detector_sample_summing(summing)?;
    detector.set_detector_line_summing(summing)?;

    let distortion = TaylorSeries::from_slices(
        kernels.get_doubles(&ins_key(code, "OD_T_X"))?,
        kernels.get_doubles(&ins_key(code, "OD_T_Y"))?,
        SolverSettings::new(Tolerance::Millimetres(1e-7), 50),
    )?;

    let start = clock_start(instrument, label, clock)?;
    let exposure_duration = label.get_double("ExposureDuration")? / 1000.0;

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
