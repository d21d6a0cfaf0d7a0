use super::{DetectorCoordinate, FramingDetectorMap, ParentCoordinate};
use crate::{
    context::CameraContext,
    error::{Error, Result},
};
use nalgebra::{Matrix3, Vector3};
use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Where on the detector a parent pixel of a sample scan is read.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ScanReadout {
    /// Every parent sample passes through this one detector column.
    Column(f64),

    /// A scan mirror steps with the parent pixel, so both detector axes
    /// follow the base summing and starting-detector conversion.
    Mirror,
}

/// Detector map for instruments that acquire one parent sample at a time.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SampleScanDetectorMap {
    base: FramingDetectorMap,

    /// Time at the left edge of the first parent sample.
    et_start: f64,

    /// Seconds per parent sample.
    sample_rate: f64,

    readout: ScanReadout,

    /// Seconds between the starts of consecutive parent lines.
    line_rate: f64,

    exposure_duration: f64,
}

impl SampleScanDetectorMap {
    pub fn new(et_start: f64, sample_rate: f64, readout: ScanReadout) -> Result<Self> {
        if !(sample_rate.is_finite() && sample_rate != 0.0) {
            return Err(Error::InvalidConfiguration(format!(
                "sample rate must be finite and non-zero, got {sample_rate}"
            )));
        }

        Ok(Self {
            base: FramingDetectorMap::new(),
            et_start,
            sample_rate,
            readout,
            line_rate: 0.0,
            exposure_duration: 0.0,
        })
    }

    /// Starts every parent line `line_rate` seconds after the previous one.
    pub fn with_line_rate(mut self, line_rate: f64) -> Self {
        self.line_rate = line_rate;
        self
    }

    /// Sets the per-sample exposure reported by [`Self::exposure_duration`].
    pub fn with_exposure_duration(mut self, exposure_duration: f64) -> Self {
        self.exposure_duration = exposure_duration;
        self
    }

    pub fn base(&self) -> &FramingDetectorMap {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut FramingDetectorMap {
        &mut self.base
    }

    pub fn et_start(&self) -> f64 {
        self.et_start
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn readout(&self) -> ScanReadout {
        self.readout
    }

    /// The detector column every parent sample is read through, if the
    /// scan has one.
    pub fn scan_column(&self) -> Option<f64> {
        match self.readout {
            ScanReadout::Column(column) => Some(column),
            ScanReadout::Mirror => None,
        }
    }

    pub fn line_rate(&self) -> f64 {
        self.line_rate
    }

    /// Start time of the whole line containing parent `line`.
    fn line_start(&self, line: f64) -> f64 {
        self.et_start + self.line_rate * (line - 0.5).floor()
    }

    /// Time at which parent `(sample, line)` was acquired.
    pub fn sample_time(&self, sample: f64, line: f64) -> f64 {
        self.line_start(line) + self.sample_rate * (sample - 0.5)
    }

    /// Converts a detector coordinate to a parent coordinate.
    ///
    /// Through a scan column the parent sample comes from the time elapsed
    /// since the line started, and `None` is returned if no time has been
    /// established. Through a mirror the detector position alone fixes the
    /// parent pixel.
    pub fn set_detector(
        &mut self,
        ctx: &CameraContext,
        sample: f64,
        line: f64,
    ) -> Option<ParentCoordinate> {
        if !(sample.is_finite() && line.is_finite()) {
            return None;
        }

        let (parent_sample, parent_line) = self.base.parent_from_detector(sample, line);
        let parent = match self.readout {
            ScanReadout::Column(_) => {
                let time = ctx.time()?;
                ParentCoordinate::new(
                    (time - self.line_start(parent_line)) / self.sample_rate + 0.5,
                    parent_line,
                )
            }
            ScanReadout::Mirror => ParentCoordinate::new(parent_sample, parent_line),
        };
        self.base.record(parent, DetectorCoordinate::new(sample, line));
        Some(parent)
    }

    /// Converts a parent coordinate to a detector coordinate and moves the
    /// clock to the time the parent sample was acquired.
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

        ctx.set_time(self.sample_time(sample, line) + delta_t);

        let (detector_sample, detector_line) = self.base.detector_from_parent(sample, line);
        let detector = match self.readout {
            ScanReadout::Column(column) => DetectorCoordinate::new(column, detector_line),
            ScanReadout::Mirror => DetectorCoordinate::new(detector_sample, detector_line),
        };
        self.base.record(ParentCoordinate::new(sample, line), detector);
        Some(detector)
    }

    /// The configured exposure, or the sample rate when none is known.
    pub fn exposure_duration(&self) -> f64 {
        match self.exposure_duration > 0.0 {
            true => self.exposure_duration,
            false => self.sample_rate.abs(),
        }
    }
}

/// Start of a constant-rate stretch of a variable-rate scan.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SampleRateChange {
    /// First parent sample acquired at `rate`.
    pub start_sample: f64,

    /// Time at the left edge of `start_sample`.
    pub start_et: f64,

    /// Seconds per sample.
    pub rate: f64,
}

impl SampleRateChange {
    pub fn new(start_sample: f64, start_et: f64, rate: f64) -> Self {
        Self {
            start_sample,
            start_et,
            rate,
        }
    }

    /// Left edge of the first sample covered by this entry.
    fn start_edge(&self) -> f64 {
        self.start_sample - 0.5
    }

    pub fn time_at(&self, sample: f64) -> f64 {
        self.start_et + (sample - self.start_edge()) * self.rate
    }

    pub fn sample_at(&self, time: f64) -> f64 {
        self.start_edge() + (time - self.start_et) / self.rate
    }
}

/// Ordered rate changes of a variable-rate scan.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SampleRateTable {
    entries: Vec<SampleRateChange>,
}

impl SampleRateTable {
    /// Validates that the table is non-empty, that starting samples and
    /// times both strictly ascend and that every rate is positive.
    pub fn new(entries: Vec<SampleRateChange>) -> Result<Self> {
        if entries.is_empty() {
            return Err(Error::InvalidConfiguration(
                "sample rate table is empty".into(),
            ));
        }

        if let Some(bad) = entries
            .iter()
            .find(|e| !(e.rate.is_finite() && e.rate > 0.0 && e.start_et.is_finite()))
        {
            return Err(Error::InvalidConfiguration(format!(
                "invalid sample rate entry at sample {}",
                bad.start_sample
            )));
        }

        if let Some(pair) = entries.windows(2).find(|pair| {
            pair[1].start_sample <= pair[0].start_sample || pair[1].start_et <= pair[0].start_et
        }) {
            return Err(Error::InvalidConfiguration(format!(
                "sample rate table is not ascending at sample {}",
                pair[1].start_sample
            )));
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[SampleRateChange] {
        &self.entries
    }

    /// The last entry whose first sample starts at or before `sample`.
    pub fn for_sample(&self, sample: f64) -> Option<&SampleRateChange> {
        self.entries.iter().rev().find(|e| e.start_edge() <= sample)
    }

    /// The last entry starting at or before `time`.
    pub fn for_time(&self, time: f64) -> Option<&SampleRateChange> {
        self.entries.iter().rev().find(|e| e.start_et <= time)
    }
}

/// Affine relation between parent coordinates and fiducial detector
/// coordinates.
///
/// Each row holds `[c0, c1, c2]` for `out = c0 + c1 * a + c2 * b`.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FiducialAffine {
    forward: [[f64; 3]; 2],
    inverse: [[f64; 3]; 2],
}

impl Default for FiducialAffine {
    fn default() -> Self {
        let identity = [[0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        Self {
            forward: identity,
            inverse: identity,
        }
    }
}

impl FiducialAffine {
    /// Uses explicit forward (parent → fiducial) and inverse coefficients.
    pub fn from_coefficients(forward: [[f64; 3]; 2], inverse: [[f64; 3]; 2]) -> Self {
        Self { forward, inverse }
    }

    /// Derives the inverse coefficients from `forward`.
    pub fn from_forward(forward: [[f64; 3]; 2]) -> Result<Self> {
        let matrix = Matrix3::new(
            forward[0][1], forward[0][2], forward[0][0],
            forward[1][1], forward[1][2], forward[1][0],
            0.0, 0.0, 1.0,
        );
        let inv = matrix.try_inverse().ok_or_else(|| {
            Error::InvalidConfiguration("fiducial affine is singular".into())
        })?;

        Ok(Self {
            forward,
            inverse: [
                [inv[(0, 2)], inv[(0, 0)], inv[(0, 1)]],
                [inv[(1, 2)], inv[(1, 0)], inv[(1, 1)]],
            ],
        })
    }

    fn apply(rows: &[[f64; 3]; 2], a: f64, b: f64) -> (f64, f64) {
        let v = Vector3::new(1.0, a, b);
        (
            Vector3::from(rows[0]).dot(&v),
            Vector3::from(rows[1]).dot(&v),
        )
    }

    /// Parent `(sample, line)` to fiducial `(scan, line)`.
    pub fn to_fiducial(&self, sample: f64, line: f64) -> (f64, f64) {
        Self::apply(&self.forward, sample, line)
    }

    /// Fiducial `(scan, line)` to parent `(sample, line)`.
    pub fn to_parent(&self, scan: f64, line: f64) -> (f64, f64) {
        Self::apply(&self.inverse, scan, line)
    }
}

/// Sample-scan detector map whose scan rate changes during the observation.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VariableSampleScanDetectorMap {
    base: FramingDetectorMap,
    rates: SampleRateTable,
    fiducial: FiducialAffine,
    scan_column: f64,
}

impl VariableSampleScanDetectorMap {
    pub fn new(rates: SampleRateTable, scan_column: f64) -> Self {
        Self {
            base: FramingDetectorMap::new(),
            rates,
            fiducial: FiducialAffine::default(),
            scan_column,
        }
    }

    pub fn with_fiducial(mut self, fiducial: FiducialAffine) -> Self {
        self.fiducial = fiducial;
        self
    }

    pub fn base(&self) -> &FramingDetectorMap {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut FramingDetectorMap {
        &mut self.base
    }

    pub fn rates(&self) -> &SampleRateTable {
        &self.rates
    }

    pub fn fiducial(&self) -> &FiducialAffine {
        &self.fiducial
    }

    pub fn scan_column(&self) -> f64 {
        self.scan_column
    }

    /// Acquisition time of a parent pixel, `None` before the first rate
    /// entry.
    pub fn sample_time(&self, sample: f64, line: f64) -> Option<f64> {
        let (scan, _) = self.fiducial.to_fiducial(sample, line);
        self.rates.for_sample(scan).map(|entry| entry.time_at(scan))
    }

    /// Converts a detector coordinate at the current time to a parent
    /// coordinate.
    ///
    /// Returns `None` if no time is set or the time precedes the scan.
    pub fn set_detector(
        &mut self,
        ctx: &CameraContext,
        sample: f64,
        line: f64,
    ) -> Option<ParentCoordinate> {
        let time = ctx.time()?;
        if !(sample.is_finite() && line.is_finite()) {
            return None;
        }

        let Some(entry) = self.rates.for_time(time) else {
            debug!(time, "no sample rate entry covers time");
            return None;
        };

        let scan = entry.sample_at(time);
        let (_, fiducial_line) = self.base.parent_from_detector(sample, line);
        let (parent_sample, parent_line) = self.fiducial.to_parent(scan, fiducial_line);

        let parent = ParentCoordinate::new(parent_sample, parent_line);
        self.base.record(parent, DetectorCoordinate::new(sample, line));
        Some(parent)
    }

    /// Converts a parent coordinate to a detector coordinate and moves the
    /// clock to its acquisition time.
    ///
    /// Returns `None` if the sample precedes the first rate entry.
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

        let (scan, fiducial_line) = self.fiducial.to_fiducial(sample, line);
        let Some(entry) = self.rates.for_sample(scan) else {
            debug!(sample = scan, "no sample rate entry covers sample");
            return None;
        };

        ctx.set_time(entry.time_at(scan) + delta_t);

        let (_, detector_line) = self.base.detector_from_parent(scan, fiducial_line);
        let detector = DetectorCoordinate::new(self.scan_column, detector_line);
        self.base.record(ParentCoordinate::new(sample, line), detector);
        Some(detector)
    }

    /// The rate of the stretch containing the parent coordinate.
    pub fn exposure_duration(&self, sample: f64, line: f64) -> Result<f64> {
        let (scan, _) = self.fiducial.to_fiducial(sample, line);
        self.rates
            .for_sample(scan)
            .map(|entry| entry.rate)
            .ok_or(Error::NoCoveringInterval { sample })
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
            Length::new::<millimeter>(152.0),
            Length::new::<millimeter>(0.038),
        )
        .unwrap()
    }

    fn table() -> SampleRateTable {
        SampleRateTable::new(vec![
            SampleRateChange::new(1.0, 1000.0, 0.1),
            SampleRateChange::new(500.0, 1050.0, 0.2),
            SampleRateChange::new(900.0, 1130.0, 0.15),
        ])
        .unwrap()
    }

    #[test]
    fn sample_scan_time_follows_sample() {
        let mut ctx = context();
        let mut map = SampleScanDetectorMap::new(500.0, 0.25, ScanReadout::Column(32.0)).unwrap();

        let detector = map.set_parent(&mut ctx, 4.5, 10.0, 0.0).unwrap();
        assert_eq!(ctx.time(), Some(501.0));
        assert_eq!(detector.sample, 32.0);
        assert_eq!(detector.line, 10.0);
    }

    #[test]
    fn sample_scan_roundtrip() {
        let mut ctx = context();
        let mut map = SampleScanDetectorMap::new(500.0, 0.25, ScanReadout::Column(32.0)).unwrap();
        map.base_mut().set_detector_line_summing(2.0).unwrap();

        for (sample, line) in [(0.5, 0.5), (1.0, 1.0), (17.3, 40.2), (64.5, 32.0)] {
            let detector = map.set_parent(&mut ctx, sample, line, 0.0).unwrap();
            let parent = map.set_detector(&ctx, detector.sample, detector.line).unwrap();
            assert_relative_eq!(parent.sample, sample, epsilon = 1e-9);
            assert_relative_eq!(parent.line, line, epsilon = 1e-9);
        }
    }

    #[test]
    fn line_rate_delays_later_lines() {
        let mut ctx = context();
        let mut map = SampleScanDetectorMap::new(0.0, 0.5, ScanReadout::Column(1.0))
            .unwrap()
            .with_line_rate(40.0);

        map.set_parent(&mut ctx, 2.0, 3.2, 0.0).unwrap();
        assert_eq!(ctx.time(), Some(80.75));

        let detector = map.set_parent(&mut ctx, 7.25, 2.5, 0.0).unwrap();
        let parent = map.set_detector(&ctx, detector.sample, detector.line).unwrap();
        assert_relative_eq!(parent.sample, 7.25, epsilon = 1e-9);
    }

    #[test]
    fn sample_scan_needs_time() {
        let ctx = context();
        let mut map = SampleScanDetectorMap::new(500.0, 0.25, ScanReadout::Column(32.0)).unwrap();
        assert_eq!(map.set_detector(&ctx, 32.0, 1.0), None);
    }

    #[test]
    fn sample_scan_exposure() {
        let map = SampleScanDetectorMap::new(0.0, -0.25, ScanReadout::Column(1.0)).unwrap();
        assert_eq!(map.exposure_duration(), 0.25);
        assert_eq!(map.with_exposure_duration(0.1).exposure_duration(), 0.1);
    }

    #[test]
    fn mirror_follows_parent_pixel() {
        let mut ctx = context();
        let mut map = SampleScanDetectorMap::new(0.0, 0.08, ScanReadout::Mirror)
            .unwrap()
            .with_line_rate(5.535);
        map.base_mut().set_starting_detector_sample(10.0);
        map.base_mut().set_starting_detector_line(3.0);
        assert_eq!(map.scan_column(), None);

        let first = map.set_parent(&mut ctx, 1.0, 1.0, 0.0).unwrap();
        assert_eq!((first.sample, first.line), (10.0, 3.0));
        assert_relative_eq!(ctx.time().unwrap(), 0.04);

        let last = map.set_parent(&mut ctx, 64.0, 2.0, 0.0).unwrap();
        assert_eq!((last.sample, last.line), (73.0, 4.0));
        assert_relative_eq!(ctx.time().unwrap(), 5.535 + 63.5 * 0.08, epsilon = 1e-12);
    }

    #[test]
    fn mirror_detector_needs_no_time() {
        let ctx = context();
        let mut map = SampleScanDetectorMap::new(0.0, 0.08, ScanReadout::Mirror).unwrap();
        map.base_mut().set_starting_detector_sample(10.0);

        let parent = map.set_detector(&ctx, 41.5, 7.0).unwrap();
        assert_eq!((parent.sample, parent.line), (32.5, 7.0));
    }

    #[test]
    fn zero_rate_rejected() {
        assert!(SampleScanDetectorMap::new(0.0, 0.0, ScanReadout::Mirror).is_err());
    }

    #[rstest]
    #[case(600.0, 0.2)]
    #[case(1.0, 0.1)]
    #[case(499.4, 0.1)]
    #[case(499.5, 0.2)]
    #[case(4000.0, 0.15)]
    fn rate_lookup(#[case] sample: f64, #[case] rate: f64) {
        assert_eq!(table().for_sample(sample).unwrap().rate, rate);
    }

    #[test]
    fn lookup_before_first_entry_misses() {
        assert_eq!(table().for_sample(0.0), None);
        assert_eq!(table().for_time(999.0), None);

        let mut ctx = context();
        let mut map = VariableSampleScanDetectorMap::new(table(), 1.0);
        assert_eq!(map.set_parent(&mut ctx, 0.0, 5.0, 0.0), None);
        assert_eq!(ctx.time(), None);

        ctx.set_time(999.0);
        assert_eq!(map.set_detector(&ctx, 1.0, 5.0), None);
    }

    #[test]
    fn variable_time_within_interval() {
        let mut ctx = context();
        let mut map = VariableSampleScanDetectorMap::new(table(), 1.0);
        map.set_parent(&mut ctx, 600.0, 5.0, 0.0).unwrap();
        assert_relative_eq!(ctx.time().unwrap(), 1050.0 + 100.5 * 0.2, epsilon = 1e-9);
    }

    #[rstest]
    #[case(1.0)]
    #[case(250.25)]
    #[case(600.0)]
    #[case(899.0)]
    #[case(1200.75)]
    fn variable_roundtrip(#[case] sample: f64) {
        let mut ctx = context();
        let mut map = VariableSampleScanDetectorMap::new(table(), 1.0);
        let detector = map.set_parent(&mut ctx, sample, 12.5, 0.0).unwrap();
        let parent = map.set_detector(&ctx, detector.sample, detector.line).unwrap();
        assert_relative_eq!(parent.sample, sample, epsilon = 1e-9);
        assert_relative_eq!(parent.line, 12.5, epsilon = 1e-9);
    }

    #[test]
    fn variable_roundtrip_through_fiducials() {
        let fiducial =
            FiducialAffine::from_forward([[3.0, 1.002, 0.001], [-2.0, -0.0005, 0.998]]).unwrap();
        let mut ctx = context();
        let mut map = VariableSampleScanDetectorMap::new(table(), 1.0).with_fiducial(fiducial);

        let detector = map.set_parent(&mut ctx, 700.0, 40.0, 0.0).unwrap();
        let parent = map.set_detector(&ctx, detector.sample, detector.line).unwrap();
        assert_relative_eq!(parent.sample, 700.0, epsilon = 1e-8);
        assert_relative_eq!(parent.line, 40.0, epsilon = 1e-8);
    }

    #[test]
    fn singular_fiducial_rejected() {
        assert!(FiducialAffine::from_forward([[0.0, 1.0, 2.0], [0.0, 2.0, 4.0]]).is_err());
    }

    #[test]
    fn variable_exposure_is_interval_rate() {
        let map = VariableSampleScanDetectorMap::new(table(), 1.0);
        assert_eq!(map.exposure_duration(950.0, 1.0).unwrap(), 0.15);
        assert_eq!(
            map.exposure_duration(0.0, 1.0),
            Err(Error::NoCoveringInterval { sample: 0.0 })
        );
    }

    #[rstest]
    #[case(vec![])]
    #[case(vec![SampleRateChange::new(10.0, 5.0, 0.1), SampleRateChange::new(5.0, 6.0, 0.1)])]
    #[case(vec![SampleRateChange::new(1.0, 5.0, 0.1), SampleRateChange::new(5.0, 4.0, 0.1)])]
    #[case(vec![SampleRateChange::new(1.0, 5.0, -0.1)])]
    fn invalid_tables_rejected(#[case] entries: Vec<SampleRateChange>) {
        assert!(SampleRateTable::new(entries).is_err());
    }
}
