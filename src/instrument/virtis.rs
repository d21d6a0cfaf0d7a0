//! Rosetta VIRTIS-M infrared channel, a scanning mirror spectrometer whose
//! scan rate can change during an observation.

use super::{Instrument, Stages, clock_start, context, doubles, focal_length, focal_plane};
use crate::{
    camera::ImageSize,
    detector::{
        FiducialAffine, SampleRateChange, SampleRateTable, VariableSampleScanDetectorMap,
    },
    distortion::Radial,
    ephemeris::SpacecraftClock,
    error::{Error, Result},
    params::{ParameterStore, ins_key},
};
use tracing::debug;

/// The rate table from `RateChangeSample`/`RateChangeEt`/`RateChangeRate`,
/// or a single stretch at the frame rate when the label has none.
fn rate_table(
    label: &impl ParameterStore,
    start: f64,
    scan_rate: f64,
) -> Result<SampleRateTable> {
    if !label.contains("RateChangeSample") {
        return SampleRateTable::new(vec![SampleRateChange::new(1.0, start, scan_rate)]);
    }

    let samples = label.get_doubles("RateChangeSample")?;
    let times = label.get_doubles("RateChangeEt")?;
    let rates = label.get_doubles("RateChangeRate")?;
    if samples.len() != times.len() || samples.len() != rates.len() {
        return Err(Error::InvalidConfiguration(format!(
            "rate change table has {} samples, {} times and {} rates",
            samples.len(),
            times.len(),
            rates.len()
        )));
    }

    debug!(entries = samples.len(), "reading rate change table");
    SampleRateTable::new(
        samples
            .iter()
            .zip(times)
            .zip(rates)
            .map(|((&sample, &et), &rate)| SampleRateChange::new(sample, et, rate))
            .collect(),
    )
}

/// Optional `FIDUCIAL_S`/`FIDUCIAL_L` kernel transform from parent pixels to
/// the scan frame, with `FIDUCIAL_IS`/`FIDUCIAL_IL` as its inverse.
fn fiducial(code: i32, kernels: &impl ParameterStore) -> Result<FiducialAffine> {
    let forward_keys = [ins_key(code, "FIDUCIAL_S"), ins_key(code, "FIDUCIAL_L")];
    if !forward_keys.iter().all(|key| kernels.contains(key)) {
        return Ok(FiducialAffine::default());
    }

    let forward = [doubles(kernels, &forward_keys[0])?, doubles(kernels, &forward_keys[1])?];
    let inverse_keys = [ins_key(code, "FIDUCIAL_IS"), ins_key(code, "FIDUCIAL_IL")];
    match inverse_keys.iter().all(|key| kernels.contains(key)) {
        true => Ok(FiducialAffine::from_coefficients(
            forward,
            [doubles(kernels, &inverse_keys[0])?, doubles(kernels, &inverse_keys[1])?],
        )),
        false => FiducialAffine::from_forward(forward),
    }
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

    let channel = label.get_string("ChannelId")?;
    if channel != "VIRTIS_M_IR" {
        return Err(Error::InvalidConfiguration(format!(
            "unsupported VIRTIS channel {channel}"
        )));
    }

    // [exposure ms, summing, scan rate s]
    let exposure_duration = label.get_double_at("FrameParameter", 0)? / 1000.0;
    let summing = label.get_double_at("FrameParameter", 1)?;
    let scan_rate = label.get_double_at("FrameParameter", 2)?;

    let start = clock_start(instrument, label, clock)?;
    let rates = rate_table(label, start, scan_rate)?;
    let last = rates.entries().last().map_or(1.0, |entry| entry.start_sample);
    if last > image.samples as f64 {
        return Err(Error::InvalidConfiguration(format!(
            "rate change at sample {last} is past the last sample {}",
            image.samples
        )));
    }
    let time = rates
        .entries()
        .first()
        .map_or(start, |entry| entry.time_at(1.0));

    let mut detector = VariableSampleScanDetectorMap::new(
        rates,
        kernels.get_double(&ins_key(code, "BORESIGHT_SAMPLE"))?,
    )
    .with_fiducial(fiducial(code, kernels)?);
    detector.base_mut().set_detector_line_summing(summing)?;

    Ok(Stages {
        ctx,
        detector: detector.into(),
        focal_plane: focal_plane(code, kernels)?,
        distortion: Radial::new(kernels.get_double_or(&ins_key(code, "OD_K1"), 0.0)?).into(),
        time,
        start_time: start,
        exposure_duration,
    })
}
