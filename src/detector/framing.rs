use super::{DetectorCoordinate, ParentCoordinate};
use crate::{
    context::CameraContext,
    error::{Error, Result},
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Parent image ⇄ detector conversion for a static (framing) detector.
///
/// Every time-dependent map embeds one of these and reuses its summing and
/// starting-detector arithmetic.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FramingDetectorMap {
    sample_summing: f64,
    line_summing: f64,
    starting_sample: f64,
    starting_line: f64,

    /// First detector sample/line adjusted for summing.
    adjusted_start_sample: f64,
    adjusted_start_line: f64,

    parent: ParentCoordinate,
    detector: DetectorCoordinate,
}

impl Default for FramingDetectorMap {
    fn default() -> Self {
        Self::new()
    }
}

impl FramingDetectorMap {
    /// A map with no summing that starts at the first detector pixel.
    pub fn new() -> Self {
        let mut map = Self {
            sample_summing: 1.0,
            line_summing: 1.0,
            starting_sample: 1.0,
            starting_line: 1.0,
            adjusted_start_sample: 0.0,
            adjusted_start_line: 0.0,
            parent: ParentCoordinate::default(),
            detector: DetectorCoordinate::default(),
        };
        map.recompute();
        map
    }

    fn recompute(&mut self) {
        self.adjusted_start_sample = adjusted_start(self.sample_summing, self.starting_sample);
        self.adjusted_start_line = adjusted_start(self.line_summing, self.starting_line);
    }

    pub fn set_detector_sample_summing(&mut self, summing: f64) -> Result<()> {
        self.sample_summing = validate_summing(summing)?;
        self.recompute();
        Ok(())
    }

    pub fn set_detector_line_summing(&mut self, summing: f64) -> Result<()> {
        self.line_summing = validate_summing(summing)?;
        self.recompute();
        Ok(())
    }

    pub fn set_starting_detector_sample(&mut self, sample: f64) {
        self.starting_sample = sample;
        self.recompute();
    }

    pub fn set_starting_detector_line(&mut self, line: f64) {
        self.starting_line = line;
        self.recompute();
    }

    pub fn sample_scale_factor(&self) -> f64 {
        self.sample_summing
    }

    pub fn line_scale_factor(&self) -> f64 {
        self.line_summing
    }

    pub fn starting_detector_sample(&self) -> f64 {
        self.starting_sample
    }

    pub fn starting_detector_line(&self) -> f64 {
        self.starting_line
    }

    pub fn adjusted_starting_sample(&self) -> f64 {
        self.adjusted_start_sample
    }

    pub fn adjusted_starting_line(&self) -> f64 {
        self.adjusted_start_line
    }

    /// The parent coordinate produced by the last successful conversion.
    pub fn parent(&self) -> ParentCoordinate {
        self.parent
    }

    /// The detector coordinate produced by the last successful conversion.
    pub fn detector(&self) -> DetectorCoordinate {
        self.detector
    }

    pub(crate) fn parent_from_detector(&self, sample: f64, line: f64) -> (f64, f64) {
        (
            (sample - self.adjusted_start_sample) / self.sample_summing + 1.0,
            (line - self.adjusted_start_line) / self.line_summing + 1.0,
        )
    }

    pub(crate) fn detector_from_parent(&self, sample: f64, line: f64) -> (f64, f64) {
        (
            (sample - 1.0) * self.sample_summing + self.adjusted_start_sample,
            (line - 1.0) * self.line_summing + self.adjusted_start_line,
        )
    }

    pub(crate) fn record(&mut self, parent: ParentCoordinate, detector: DetectorCoordinate) {
        self.parent = parent;
        self.detector = detector;
    }

    /// Computes the parent coordinate of a detector coordinate.
    ///
    /// Succeeds for every finite input.
    pub fn set_detector(&mut self, sample: f64, line: f64) -> Option<ParentCoordinate> {
        if !(sample.is_finite() && line.is_finite()) {
            return None;
        }

        let (parent_sample, parent_line) = self.parent_from_detector(sample, line);
        let parent = ParentCoordinate::new(parent_sample, parent_line);
        self.record(parent, DetectorCoordinate::new(sample, line));
        Some(parent)
    }

    /// Computes the detector coordinate of a parent coordinate.
    ///
    /// A non-zero `delta_t` moves the context clock, but only once a time has
    /// been established.
    pub fn set_parent(
        &mut self,
        ctx: &mut CameraContext,
        sample: f64,
        line: f64,
        delta_t: f64,
    ) -> Option<DetectorCoordinate> {
        if !(sample.is_finite() && line.is_finite()) {
            return None;
        }

        if delta_t != 0.0 {
            ctx.advance_time(delta_t);
        }

        let (detector_sample, detector_line) = self.detector_from_parent(sample, line);
        let detector = DetectorCoordinate::new(detector_sample, detector_line);
        self.record(ParentCoordinate::new(sample, line), detector);
        Some(detector)
    }

    /// Framing detectors have no per-pixel exposure.
    pub fn exposure_duration(&self) -> Result<f64> {
        Err(Error::UnsupportedOperation {
            operation: "exposure duration",
            map: "framing",
        })
    }
}

fn adjusted_start(summing: f64, starting: f64) -> f64 {
    summing / 2.0 + 0.5 + (starting - 1.0)
}

fn validate_summing(summing: f64) -> Result<f64> {
    match summing.is_finite() && summing >= 1.0 {
        true => Ok(summing),
        false => Err(Error::InvalidConfiguration(format!(
            "detector summing must be at least 1, got {summing}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use quickcheck::quickcheck;
    use rstest::rstest;
    use uom::si::{f64::Length, length::millimeter};

    fn context() -> CameraContext {
        CameraContext::new(
            Length::new::<millimeter>(10.0),
            Length::new::<millimeter>(0.01),
        )
        .unwrap()
    }

    fn map(
        sample_summing: f64,
        line_summing: f64,
        start_sample: f64,
        start_line: f64,
    ) -> FramingDetectorMap {
        let mut map = FramingDetectorMap::new();
        map.set_detector_sample_summing(sample_summing).unwrap();
        map.set_detector_line_summing(line_summing).unwrap();
        map.set_starting_detector_sample(start_sample);
        map.set_starting_detector_line(start_line);
        map
    }

    #[test]
    fn unsummed_map_is_identity() {
        let mut map = FramingDetectorMap::new();
        assert_eq!(map.adjusted_starting_sample(), 1.0);
        let parent = map.set_detector(17.25, 300.5).unwrap();
        assert_eq!(parent, ParentCoordinate::new(17.25, 300.5));
    }

    #[rstest]
    #[case(2.0, 1.0, 1.5)]
    #[case(4.0, 1.0, 2.5)]
    #[case(2.0, 33.0, 33.5)]
    fn adjusted_start_follows_summing(
        #[case] summing: f64,
        #[case] start: f64,
        #[case] expected: f64,
    ) {
        let map = map(summing, summing, start, start);
        assert_eq!(map.adjusted_starting_sample(), expected);
        assert_eq!(map.adjusted_starting_line(), expected);
    }

    #[test]
    fn summed_pixel_edges() {
        // With 2x summing the first parent pixel spans detector 0.5..2.5.
        let mut map = map(2.0, 2.0, 1.0, 1.0);
        assert_relative_eq!(map.set_detector(0.5, 2.5).unwrap().sample, 0.5);
        assert_relative_eq!(map.set_detector(0.5, 2.5).unwrap().line, 1.5);
    }

    #[test]
    fn delta_t_moves_established_time_only() {
        let mut ctx = context();
        let mut map = FramingDetectorMap::new();

        map.set_parent(&mut ctx, 1.0, 1.0, 2.0).unwrap();
        assert_eq!(ctx.time(), None);

        ctx.set_time(50.0);
        map.set_parent(&mut ctx, 1.0, 1.0, 2.0).unwrap();
        assert_eq!(ctx.time(), Some(52.0));
    }

    #[test]
    fn exposure_duration_is_unsupported() {
        assert!(matches!(
            FramingDetectorMap::new().exposure_duration(),
            Err(Error::UnsupportedOperation { .. })
        ));
    }

    #[test]
    fn zero_summing_rejected() {
        assert!(FramingDetectorMap::new().set_detector_sample_summing(0.0).is_err());
    }

    #[test]
    fn non_finite_input_misses() {
        let mut map = FramingDetectorMap::new();
        assert_eq!(map.set_detector(f64::NAN, 1.0), None);
    }

    quickcheck! {
        fn detector_parent_roundtrip(
            sample_seed: u16,
            line_seed: u16,
            summing_seed: u8,
            start_seed: u8
        ) -> bool {
            let summing = [1.0, 2.0, 4.0, 8.0][summing_seed as usize % 4];
            let start = start_seed as f64 + 1.0;
            let mut map = map(summing, summing, start, start);
            let mut ctx = context();

            let sample = sample_seed as f64 / 16.0 + 0.5;
            let line = line_seed as f64 / 16.0 + 0.5;

            let parent = map.set_detector(sample, line).unwrap();
            let detector = map.set_parent(&mut ctx, parent.sample, parent.line, 0.0).unwrap();

            (detector.sample - sample).abs() < 1e-9 && (detector.line - line).abs() < 1e-9
        }
    }
}
