//! Cassini VIMS infrared channel: one spectrum per pixel, with a scan mirror
//! stepping the field of view sample by sample across each line.

use super::{Instrument, Stages, context, focal_length, focal_plane};
use crate::{
    camera::ImageSize,
    detector::{SampleScanDetectorMap, ScanReadout},
    distortion::DistortionMap,
    ephemeris::SpacecraftClock,
    error::{Error, Result},
    params::{ParameterStore, ins_key},
};

/// Fractional clock ticks per second of the native VIMS start time.
const NATIVE_TICKS_PER_SECOND: f64 = 15959.0;

/// Splits `"1294638283.11789"` into whole clock seconds and fractional
/// ticks, and converts the result to ephemeris time.
fn native_start_time(
    spacecraft: i32,
    native: &str,
    clock: &impl SpacecraftClock,
) -> Result<f64> {
    let (whole, fraction) = native.trim().split_once('.').unwrap_or((native.trim(), "0"));
    let ticks: f64 = fraction
        .parse()
        .map_err(|_| Error::Clock(format!("bad native start time {native:?}")))?;
    Ok(clock.clock_to_et(spacecraft, whole)? + ticks / NATIVE_TICKS_PER_SECOND)
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

    let mode = label.get_string("SamplingMode")?;
    if mode != "NORMAL" {
        return Err(Error::InvalidConfiguration(format!(
            "unsupported VIMS sampling mode {mode}"
        )));
    }

    let start = native_start_time(
        instrument.spacecraft_code(),
        label.get_string("NativeStartTime")?,
        clock,
    )?;
    let exposure_duration = label.get_double_at("ExposureDuration", 0)? / 1000.0;
    let interline_delay = label.get_double("InterlineDelayDuration")? / 1000.0;

    // Each line scans every sample of the cube, even when the swath is
    // narrower.
    let line_rate = image.samples as f64 * exposure_duration + interline_delay;

    let mut detector = SampleScanDetectorMap::new(start, exposure_duration, ScanReadout::Mirror)?
        .with_line_rate(line_rate)
        .with_exposure_duration(exposure_duration);
    detector
        .base_mut()
        .set_starting_detector_sample(label.get_double_or("XOffset", 1.0)?);
    detector
        .base_mut()
        .set_starting_detector_line(label.get_double_or("ZOffset", 1.0)?);

    Ok(Stages {
        ctx,
        detector: detector.into(),
        focal_plane: focal_plane(code, kernels)?,
        distortion: DistortionMap::Identity,
        time: start + exposure_duration / 2.0,
        start_time: start,
        exposure_duration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{detector::DetectorMap, ephemeris::LinearClock, params::KeywordPool};
    use approx::assert_relative_eq;
    use rstest::rstest;

    const CODE: i32 = -82370;

    fn kernels() -> KeywordPool {
        KeywordPool::new()
            .with_double(ins_key(CODE, "FOCAL_LENGTH"), 426.0)
            .with_double(ins_key(CODE, "PIXEL_PITCH"), 0.2)
            .with_doubles(ins_key(CODE, "TRANSX"), [0.0, 0.2, 0.0])
            .with_doubles(ins_key(CODE, "TRANSY"), [0.0, 0.0, 0.2])
            .with_double(ins_key(CODE, "BORESIGHT_SAMPLE"), 32.5)
            .with_double(ins_key(CODE, "BORESIGHT_LINE"), 32.5)
    }

    fn label() -> KeywordPool {
        KeywordPool::new()
            .with_string("SamplingMode", "NORMAL")
            .with_string("NativeStartTime", "1000.7979")
            .with_doubles("ExposureDuration", [80.0, 5120.0])
            .with_double("InterlineDelayDuration", 415.0)
            .with_double("SwathWidth", 32.0)
            .with_double("XOffset", 10.0)
            .with_double("ZOffset", 3.0)
    }

    fn build_with(label: &KeywordPool) -> Result<Stages> {
        Instrument::from_naif_code(CODE)?.build(
            &ImageSize::new(48, 64, 256),
            label,
            &kernels(),
            &LinearClock::new(0.0, 1.0).unwrap(),
        )
    }

    #[test]
    fn native_start_time_splits_ticks() {
        let clock = LinearClock::new(100.0, 1.0).unwrap();
        assert_relative_eq!(
            native_start_time(-82, "1000.15959", &clock).unwrap(),
            1101.0
        );
        assert_relative_eq!(native_start_time(-82, "1000", &clock).unwrap(), 1100.0);
    }

    #[test]
    fn reads_scan_timing() {
        let stages = build_with(&label()).unwrap();
        let DetectorMap::SampleScan(map) = &stages.detector else {
            panic!("expected a sample scan detector");
        };

        assert_relative_eq!(map.et_start(), 1000.0 + 7979.0 / 15959.0);
        assert_relative_eq!(map.sample_rate(), 0.08);
        assert_relative_eq!(map.line_rate(), 48.0 * 0.08 + 0.415, epsilon = 1e-12);
        assert_eq!(map.readout(), ScanReadout::Mirror);
        assert_eq!(map.base().starting_detector_sample(), 10.0);
        assert_eq!(map.base().starting_detector_line(), 3.0);
        assert_eq!(stages.distortion, DistortionMap::Identity);
    }

    #[test]
    fn offsets_place_the_mirror() {
        let stages = build_with(&label()).unwrap();
        let mut detector = stages.detector;
        let mut ctx = stages.ctx;

        let first = detector.set_parent(&mut ctx, 1.0, 1.0, 0.0).unwrap();
        assert_eq!((first.sample, first.line), (10.0, 3.0));

        let last = detector.set_parent(&mut ctx, 48.0, 1.0, 0.0).unwrap();
        assert_eq!(last.sample, 57.0);
    }

    #[test]
    fn offsets_default_to_the_first_pixel() {
        let label = KeywordPool::new()
            .with_string("SamplingMode", "NORMAL")
            .with_string("NativeStartTime", "1000.0")
            .with_doubles("ExposureDuration", [80.0, 5120.0])
            .with_double("InterlineDelayDuration", 415.0);
        let stages = build_with(&label).unwrap();
        assert_eq!(stages.detector.base().starting_detector_sample(), 1.0);
        assert_eq!(stages.detector.base().starting_detector_line(), 1.0);
    }

    #[rstest]
    #[case("HI-RES")]
    #[case("UNDER")]
    fn other_sampling_modes_rejected(#[case] mode: &str) {
        let label = label().with_string("SamplingMode", mode);
        assert!(matches!(
            build_with(&label),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn garbage_start_time() {
        let label = label().with_string("NativeStartTime", "1000.x");
        assert!(matches!(build_with(&label), Err(Error::Clock(_))));
    }
}
