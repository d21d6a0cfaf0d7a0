//! Hayabusa2 Optical Navigation Cameras: framing detectors with radial and
//! decentering lens distortion.

use super::{
    Instrument, Stages, clock_start, context, doubles, doubles_or_zero, focal_length, focal_plane,
};
use crate::{
    detector::FramingDetectorMap,
    distortion::{RadialDecentering, SolverSettings},
    ephemeris::SpacecraftClock,
    error::Result,
    params::{ParameterStore, ins_key},
};

pub(super) fn build(
    instrument: &Instrument,
    label: &impl ParameterStore,
    kernels: &impl ParameterStore,
    clock: &impl SpacecraftClock,
) -> Result<Stages> {
    let code = instrument.naif_code();
    let ctx = context(code, focal_length(code, kernels)?, kernels)?;

    let binning = label.get_double_or("Binning", 1.0)?;
    let mut detector = FramingDetectorMap::new();
    detector.set_detector_sample_summing(binning)?;
    detector.set_detector_line_summing(binning)?;
    detector.set_starting_detector_sample(label.get_double_or("SelectedImageAreaX1", 1.0)?);
    detector.set_starting_detector_line(label.get_double_or("SelectedImageAreaY1", 1.0)?);

    let k = doubles::<3>(kernels, &ins_key(code, "OD_K"))?;
    let p = doubles_or_zero::<2>(kernels, &ins_key(code, "OD_P"))?;
    let [cx, cy] = doubles_or_zero::<2>(kernels, &ins_key(code, "OD_CENTER"))?;
    let distortion =
        RadialDecentering::new((cx, cy), k, p).with_settings(SolverSettings::default());

    let start = clock_start(instrument, label, clock)?;
    let exposure_duration = label.get_double("ExposureDuration")?;

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
