use super::{DetectorCoordinate, FrameletPosition, FramingDetectorMap, ParentCoordinate};
use crate::{
    context::CameraContext,
    error::{Error, Result},
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Timing and layout of a pushframe observation.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PushframeConfig {
    /// Start time of the first framelet.
    pub et_start: f64,

    /// Seconds between the starts of consecutive framelets.
    pub framelet_rate: f64,

    /// Per-framelet exposure. Zero or negative means "not known".
    pub exposure_duration: f64,

    /// Height of one framelet in unsummed detector lines.
    pub framelet_height: f64,

    /// Number of padding framelets preceding the first real framelet.
    pub framelet_offset: i64,

    /// Whether each framelet is read out upside down.
    pub flipped_framelets: bool,

    /// Whether framelet 1 is the earliest (rather than the latest) framelet.
    pub time_ascending_framelets: bool,

    /// Framelets in the observation, used when time runs against the
    /// framelet order. Defaults to [`PushframeDetectorMap::total_framelets`].
    pub nframelets: Option<i64>,

    /// Lines in the parent image.
    pub parent_lines: f64,

    /// First detector line (0-based) of each band, indexed by band - 1.
    pub band_start_detectors: Vec<f64>,
}

/// Detector map for instruments that read out a stack of framelets, each at
/// its own time.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PushframeDetectorMap {
    base: FramingDetectorMap,
    config: PushframeConfig,
    band_start_detector: f64,
    framelet: i64,
}

impl PushframeDetectorMap {
    pub fn new(config: PushframeConfig) -> Result<Self> {
        if !(config.framelet_height.is_finite() && config.framelet_height >= 1.0) {
            return Err(Error::InvalidConfiguration(format!(
                "framelet height must be at least one line, got {}",
                config.framelet_height
            )));
        }

        if !(config.framelet_rate.is_finite() && config.et_start.is_finite()) {
            return Err(Error::InvalidConfiguration(
                "framelet timing must be finite".into(),
            ));
        }

        let band_start_detector = config.band_start_detectors.first().copied().unwrap_or(0.0);

        Ok(Self {
            base: FramingDetectorMap::new(),
            config,
            band_start_detector,
            framelet: 1,
        })
    }

    pub fn base(&self) -> &FramingDetectorMap {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut FramingDetectorMap {
        &mut self.base
    }

    pub fn config(&self) -> &PushframeConfig {
        &self.config
    }

    /// The framelet selected by the last [`Self::set_parent`] or
    /// [`Self::set_framelet`].
    pub fn framelet(&self) -> i64 {
        self.framelet
    }

    pub fn band_start_detector(&self) -> f64 {
        self.band_start_detector
    }

    /// Height of one framelet in parent lines.
    pub fn actual_framelet_height(&self) -> f64 {
        self.config.framelet_height / self.base.line_scale_factor()
    }

    pub fn total_framelets(&self) -> i64 {
        (self.config.parent_lines / self.actual_framelet_height()).floor() as i64
    }

    fn nframelets(&self) -> i64 {
        self.config.nframelets.unwrap_or_else(|| self.total_framelets())
    }

    /// The framelet containing `parent_line`.
    pub fn framelet_of_parent_line(&self, parent_line: f64) -> i64 {
        ((parent_line - 0.5) / self.actual_framelet_height()).floor() as i64 + 1
    }

    /// Selects the first detector line of `band`.
    pub fn set_band(&mut self, band: usize) -> Result<()> {
        if self.config.band_start_detectors.is_empty() {
            return Ok(());
        }

        self.band_start_detector = band
            .checked_sub(1)
            .and_then(|index| self.config.band_start_detectors.get(index))
            .copied()
            .ok_or_else(|| {
                Error::InvalidConfiguration(format!(
                    "band {band} is outside 1..={}",
                    self.config.band_start_detectors.len()
                ))
            })?;

        Ok(())
    }

    /// Moves the clock to the middle of the exposure of framelet `index`.
    pub fn set_framelet(&mut self, ctx: &mut CameraContext, index: i64, delta_t: f64) {
        self.framelet = index;

        let adjusted = index - self.config.framelet_offset;
        let time = match self.config.time_ascending_framelets {
            true => self.config.et_start + (adjusted - 1) as f64 * self.config.framelet_rate,
            false => {
                let elapsed = (self.nframelets() - adjusted) as f64;
                self.config.et_start + elapsed * self.config.framelet_rate
            }
        };

        ctx.set_time(time + self.exposure_duration() / 2.0 + delta_t);
    }

    /// Converts a detector coordinate within the current framelet to a parent
    /// coordinate.
    ///
    /// Returns `None` if the line falls outside the framelet.
    pub fn set_detector(&mut self, sample: f64, line: f64) -> Option<ParentCoordinate> {
        let height = self.config.framelet_height;

        let mut framelet_line = line - self.band_start_detector;
        if self.config.flipped_framelets {
            framelet_line = height + 1.0 - framelet_line;
        }

        if !(0.5..=height + 0.5).contains(&framelet_line) {
            return None;
        }

        let local = self.base.set_detector(sample, framelet_line)?;
        let parent = ParentCoordinate::new(
            local.sample,
            local.line + (self.framelet - 1) as f64 * self.actual_framelet_height(),
        );

        let detector = self.detector(sample, line, framelet_line);
        self.base.record(parent, detector);
        Some(parent)
    }

    /// Converts a parent coordinate to a detector coordinate and moves the
    /// clock to the framelet containing it.
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

        let framelet = self.framelet_of_parent_line(line);
        self.set_framelet(ctx, framelet, delta_t);

        let local_line = line - (framelet - 1) as f64 * self.actual_framelet_height();
        let (detector_sample, mut framelet_line) =
            self.base.detector_from_parent(sample, local_line);

        if self.config.flipped_framelets {
            framelet_line = self.config.framelet_height + 1.0 - framelet_line;
        }

        let detector = self.detector(
            detector_sample,
            framelet_line + self.band_start_detector,
            framelet_line,
        );
        self.base.record(ParentCoordinate::new(sample, line), detector);
        Some(detector)
    }

    fn detector(&self, sample: f64, line: f64, framelet_line: f64) -> DetectorCoordinate {
        DetectorCoordinate {
            sample,
            line,
            framelet: Some(FrameletPosition {
                index: self.framelet,
                line: framelet_line,
            }),
        }
    }

    /// The configured exposure, or the framelet rate when none is known.
    pub fn exposure_duration(&self) -> f64 {
        match self.config.exposure_duration > 0.0 {
            true => self.config.exposure_duration,
            false => self.config.framelet_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;
    use uom::si::{f64::Length, length::millimeter};

    fn context() -> CameraContext {
        CameraContext::new(
            Length::new::<millimeter>(10.0),
            Length::new::<millimeter>(0.0074),
        )
        .unwrap()
    }

    fn config() -> PushframeConfig {
        PushframeConfig {
            et_start: 1000.0,
            framelet_rate: 0.4,
            exposure_duration: 0.004,
            framelet_height: 128.0,
            framelet_offset: 0,
            flipped_framelets: false,
            time_ascending_framelets: true,
            nframelets: None,
            parent_lines: 128.0 * 20.0,
            band_start_detectors: vec![291.0, 418.0, 546.0],
        }
    }

    fn map(config: PushframeConfig) -> PushframeDetectorMap {
        PushframeDetectorMap::new(config).unwrap()
    }

    #[test]
    fn framelet_index_is_monotonic() {
        let mut ctx = context();
        let mut map = map(config());
        let height = map.actual_framelet_height();

        let mut last_time = f64::NEG_INFINITY;
        for framelet in 1..=map.total_framelets() {
            let line = 10.25 + (framelet - 1) as f64 * height;
            let detector = map.set_parent(&mut ctx, 100.0, line, 0.0).unwrap();

            assert_eq!(detector.framelet.unwrap().index, framelet);
            let time = ctx.time().unwrap();
            assert!(time > last_time);
            last_time = time;
        }
    }

    #[test]
    fn framelet_time_is_mid_exposure() {
        let mut ctx = context();
        let mut map = map(config());
        map.set_framelet(&mut ctx, 3, 0.0);
        assert_relative_eq!(ctx.time().unwrap(), 1000.0 + 2.0 * 0.4 + 0.002);
    }

    #[test]
    fn descending_framelets_run_backwards() {
        let mut ctx = context();
        let mut map = map(PushframeConfig {
            time_ascending_framelets: false,
            exposure_duration: 0.0,
            ..config()
        });

        map.set_framelet(&mut ctx, 20, 0.0);
        // Exposure falls back to the framelet rate.
        assert_relative_eq!(ctx.time().unwrap(), 1000.0 + 0.2);

        map.set_framelet(&mut ctx, 1, 0.0);
        assert_relative_eq!(ctx.time().unwrap(), 1000.0 + 19.0 * 0.4 + 0.2);
    }

    #[test]
    fn framelet_offset_shifts_time() {
        let mut ctx = context();
        let mut map = map(PushframeConfig {
            framelet_offset: 2,
            ..config()
        });
        map.set_framelet(&mut ctx, 3, 0.5);
        assert_relative_eq!(ctx.time().unwrap(), 1000.0 + 0.002 + 0.5);
    }

    #[rstest]
    #[case(false, 1)]
    #[case(true, 1)]
    #[case(false, 2)]
    #[case(true, 3)]
    fn parent_detector_roundtrip(#[case] flipped: bool, #[case] band: usize) {
        let mut ctx = context();
        let mut map = map(PushframeConfig {
            flipped_framelets: flipped,
            ..config()
        });
        map.set_band(band).unwrap();

        for line in [0.5, 1.0, 64.0, 128.4, 129.0, 1000.75, 2559.5] {
            let detector = map.set_parent(&mut ctx, 800.0, line, 0.0).unwrap();
            let parent = map.set_detector(detector.sample, detector.line).unwrap();
            assert_relative_eq!(parent.line, line, epsilon = 1e-9);
            assert_relative_eq!(parent.sample, 800.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn summed_roundtrip() {
        let mut ctx = context();
        let mut map = map(config());
        map.base_mut().set_detector_line_summing(2.0).unwrap();
        map.base_mut().set_detector_sample_summing(2.0).unwrap();
        assert_eq!(map.actual_framelet_height(), 64.0);
        assert_eq!(map.total_framelets(), 40);

        let detector = map.set_parent(&mut ctx, 40.0, 100.0, 0.0).unwrap();
        assert_eq!(detector.framelet.unwrap().index, 2);
        let parent = map.set_detector(detector.sample, detector.line).unwrap();
        assert_relative_eq!(parent.line, 100.0, epsilon = 1e-9);
    }

    #[rstest]
    #[case(291.0 + 0.4)]
    #[case(291.0 + 128.6)]
    #[case(0.0)]
    fn line_outside_framelet_misses(#[case] line: f64) {
        let mut map = map(config());
        assert_eq!(map.set_detector(100.0, line), None);
    }

    #[test]
    fn flip_mirrors_framelet() {
        let mut ctx = context();
        let mut map = map(PushframeConfig {
            flipped_framelets: true,
            ..config()
        });
        let detector = map.set_parent(&mut ctx, 10.0, 1.0, 0.0).unwrap();
        assert_eq!(detector.framelet.unwrap().line, 128.0);
        assert_eq!(detector.line, 291.0 + 128.0);
    }

    #[test]
    fn exposure_duration_prefers_configured_value() {
        assert_eq!(map(config()).exposure_duration(), 0.004);
        let fallback = map(PushframeConfig {
            exposure_duration: 0.0,
            ..config()
        });
        assert_eq!(fallback.exposure_duration(), 0.4);
    }

    #[test]
    fn band_out_of_range() {
        assert!(map(config()).set_band(4).is_err());
        assert!(map(config()).set_band(0).is_err());
    }

    #[test]
    fn zero_height_rejected() {
        assert!(
            PushframeDetectorMap::new(PushframeConfig {
                framelet_height: 0.0,
                ..config()
            })
            .is_err()
        );
    }
}
