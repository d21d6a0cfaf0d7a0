//! A complete camera model: image ⇄ detector ⇄ focal plane ⇄ sky/ground.

use crate::{
    context::CameraContext,
    detector::{DetectorCoordinate, DetectorMap, ParentCoordinate, ScanReadout},
    distortion::DistortionMap,
    ephemeris::{Ephemeris, SpacecraftClock},
    error::{Error, Result},
    focal_plane::FocalPlaneMap,
    ground::{GroundMap, SurfacePoint},
    instrument::{Instrument, ShutterPolicy},
    params::ParameterStore,
    sky::{LookDirection, SkyMap},
};
use rayon::prelude::*;
use tracing::{debug, info};
use uom::si::f64::Angle;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Scan time searches stop once successive times agree this closely, in
/// seconds.
const TIME_TOLERANCE: f64 = 1e-7;
const MAX_TIME_ITERATIONS: usize = 30;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ImageSize {
    pub samples: usize,
    pub lines: usize,
    pub bands: usize,
}

impl ImageSize {
    pub fn new(samples: usize, lines: usize, bands: usize) -> Self {
        Self {
            samples,
            lines,
            bands,
        }
    }

    /// Returns `true` if `parent` lies on the image, edges included.
    pub fn contains(&self, parent: &ParentCoordinate) -> bool {
        (0.5..=self.samples as f64 + 0.5).contains(&parent.sample)
            && (0.5..=self.lines as f64 + 0.5).contains(&parent.line)
    }
}

/// Everything known about one image pixel after [`Camera::set_image`].
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ImagePoint {
    pub sample: f64,
    pub line: f64,
    pub detector: DetectorCoordinate,

    /// Ephemeris time the pixel was acquired.
    pub time: f64,
    pub look: LookDirection,

    /// Where the look ray meets the target, if the camera has one and the
    /// ray hits it.
    pub surface: Option<SurfacePoint>,
}

/// What to project back into the image.
#[derive(Clone, Copy, Debug)]
enum Projection {
    Ground(SurfacePoint),
    Sky { ra: Angle, dec: Angle },
}

/// How the acquisition time of a projected point is found.
#[derive(Clone, Copy, Debug)]
enum TimeSearch {
    /// The whole image shares one time.
    Fixed,

    /// Try each framelet in turn.
    Framelets(i64),

    /// Solve for the time the point crosses the scan column.
    ScanColumn(f64),

    /// Solve for the time the scan mirror pointed at the point, given the
    /// seconds per parent sample.
    ScanMirror(f64),
}

/// A camera for one image of one instrument.
#[derive(Clone, Debug)]
pub struct Camera<E> {
    instrument: Instrument,
    image: ImageSize,
    ctx: CameraContext,
    detector: DetectorMap,
    focal_plane: FocalPlaneMap,
    distortion: DistortionMap,
    sky: SkyMap,
    ground: Option<GroundMap>,
    ephemeris: E,
    band: usize,
    start_time: f64,
    exposure_duration: f64,
    cache_span: (f64, f64),
    cache_size: usize,
}

impl<E: Ephemeris> Camera<E> {
    /// Builds the camera for NAIF instrument `code`.
    ///
    /// The kernel pool supplies calibration (and `BODY<target>_RADII` when a
    /// target is given), the label supplies the observation. The ephemeris is
    /// asked to cache the span the image covers.
    pub fn new(
        code: i32,
        image: ImageSize,
        label: &impl ParameterStore,
        kernels: &impl ParameterStore,
        clock: &impl SpacecraftClock,
        target: Option<i32>,
        ephemeris: E,
    ) -> Result<Self> {
        let instrument = Instrument::from_naif_code(code)?;
        if image.samples == 0 || image.lines == 0 || image.bands == 0 {
            return Err(Error::InvalidConfiguration(format!(
                "image must have at least one pixel, got {image:?}"
            )));
        }

        let stages = instrument.build(&image, label, kernels, clock)?;
        let ground = target
            .map(|target| GroundMap::from_store(target, kernels))
            .transpose()?;

        let mut camera = Self {
            instrument,
            image,
            ctx: stages.ctx,
            detector: stages.detector,
            focal_plane: stages.focal_plane,
            distortion: stages.distortion,
            sky: SkyMap::new(),
            ground,
            ephemeris,
            band: 1,
            start_time: stages.start_time,
            exposure_duration: stages.exposure_duration,
            cache_span: (stages.time, stages.time),
            cache_size: 1,
        };

        camera.cache_span = camera.observation_span(stages.time)?;
        camera.cache_size = camera.cache_samples();
        camera.ctx.set_time(stages.time);

        let (start, end) = camera.cache_span;
        camera.ephemeris.load_cache(start, end, camera.cache_size)?;

        info!(
            instrument = camera.instrument.name(),
            detector = camera.detector.kind(),
            distortion = camera.distortion.kind(),
            start,
            end,
            cache_size = camera.cache_size,
            "camera ready"
        );
        Ok(camera)
    }

    /// First and last acquisition times over every band's image corners.
    ///
    /// Corners are taken at the outer sample edges and the first and last
    /// line centres.
    fn observation_span(&mut self, time: f64) -> Result<(f64, f64)> {
        if !self.detector.is_time_dependent() {
            return Ok(self.exposure_window_at(time));
        }

        let corners = [
            (0.5, 1.0),
            (self.image.samples as f64 + 0.5, self.image.lines as f64),
        ];

        let mut span = (f64::INFINITY, f64::NEG_INFINITY);
        for band in 1..=self.image.bands {
            self.detector.set_band(band)?;
            for (sample, line) in corners {
                if self.detector.set_parent(&mut self.ctx, sample, line, 0.0).is_none() {
                    continue;
                }
                if let Some(et) = self.ctx.time() {
                    span = (span.0.min(et), span.1.max(et));
                }
            }
        }
        self.detector.set_band(self.band)?;

        match span.0 <= span.1 {
            true => Ok(span),
            false => Err(Error::InvalidConfiguration(
                "no image corner maps to an acquisition time".into(),
            )),
        }
    }

    fn cache_samples(&self) -> usize {
        match &self.detector {
            DetectorMap::Framing(_) => 1,
            DetectorMap::Pushframe(map) => map.total_framelets().max(0) as usize + 1,
            DetectorMap::SampleScan(_) | DetectorMap::VariableSampleScan(_) => {
                self.image.samples + 1
            }
        }
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn naif_ik_code(&self) -> i32 {
        self.instrument.naif_code()
    }

    pub fn instrument_name(&self) -> &'static str {
        self.instrument.name()
    }

    pub fn ck_frame_id(&self) -> i32 {
        self.instrument.ck_frame_id()
    }

    pub fn ck_reference_id(&self) -> i32 {
        self.instrument.ck_reference_id()
    }

    pub fn spk_target_id(&self) -> i32 {
        self.instrument.spk_target_id()
    }

    pub fn spk_reference_id(&self) -> i32 {
        self.instrument.spk_reference_id()
    }

    pub fn image_size(&self) -> ImageSize {
        self.image
    }

    pub fn context(&self) -> &CameraContext {
        &self.ctx
    }

    pub fn detector_map(&self) -> &DetectorMap {
        &self.detector
    }

    pub fn focal_plane_map(&self) -> &FocalPlaneMap {
        &self.focal_plane
    }

    pub fn distortion_map(&self) -> &DistortionMap {
        &self.distortion
    }

    pub fn sky_map(&self) -> &SkyMap {
        &self.sky
    }

    pub fn ground_map(&self) -> Option<&GroundMap> {
        self.ground.as_ref()
    }

    pub fn ephemeris(&self) -> &E {
        &self.ephemeris
    }

    /// The span and sample count handed to [`Ephemeris::load_cache`].
    pub fn cache_span(&self) -> (f64, f64, usize) {
        (self.cache_span.0, self.cache_span.1, self.cache_size)
    }

    /// The time of the most recent conversion.
    pub fn time(&self) -> Option<f64> {
        self.ctx.time()
    }

    pub fn band(&self) -> usize {
        self.band
    }

    /// Selects the 1-based band later conversions use.
    pub fn set_band(&mut self, band: usize) -> Result<()> {
        if !(1..=self.image.bands).contains(&band) {
            return Err(Error::InvalidConfiguration(format!(
                "band {band} is outside 1..={}",
                self.image.bands
            )));
        }

        self.detector.set_band(band)?;
        self.band = band;
        Ok(())
    }

    /// Label exposure duration of the observation in seconds.
    pub fn exposure_duration(&self) -> f64 {
        self.exposure_duration
    }

    /// Exposure of the pixel at `(sample, line)` in the current band.
    ///
    /// Framing cameras return [`Error::UnsupportedOperation`]; use
    /// [`Camera::exposure_duration`] for them.
    pub fn pixel_exposure_duration(&self, sample: f64, line: f64) -> Result<f64> {
        self.detector.exposure_duration(sample, line, self.band)
    }

    pub fn shutter_policy(&self) -> ShutterPolicy {
        self.instrument.shutter()
    }

    pub fn shutter_open_close_times(&self, time: f64, duration: f64) -> (f64, f64) {
        self.instrument.shutter().open_close(time, duration)
    }

    fn exposure_window_at(&self, mid_time: f64) -> (f64, f64) {
        match self.instrument.shutter() {
            ShutterPolicy::StartAnchored => {
                self.shutter_open_close_times(self.start_time, self.exposure_duration)
            }
            ShutterPolicy::Symmetric => {
                self.shutter_open_close_times(mid_time, self.exposure_duration)
            }
        }
    }

    /// Maps an image coordinate to its look direction and, when the camera
    /// has a target, its surface point.
    ///
    /// Returns `None` when the coordinate does not fall on the detector or
    /// the distortion inverse fails to converge.
    pub fn set_image(&mut self, sample: f64, line: f64) -> Result<Option<ImagePoint>> {
        let Some(detector) = self.detector.set_parent(&mut self.ctx, sample, line, 0.0) else {
            return Ok(None);
        };

        let distorted = self.focal_plane.set_detector(detector.sample, detector.line);
        let Some(undistorted) =
            self.distortion
                .set_focal_plane(&self.ctx, distorted.x(), distorted.y())
        else {
            debug!(sample, line, "distortion removal did not converge");
            return Ok(None);
        };

        let (ux, uy, uz) = (undistorted.x(), undistorted.y(), self.ctx.focal_length_mm());
        let look = self.sky.set_focal_plane(&self.ctx, &self.ephemeris, ux, uy, uz)?;
        let surface = match self.ground.as_mut() {
            Some(ground) => ground.set_focal_plane(&self.ctx, &self.ephemeris, ux, uy, uz)?,
            None => None,
        };

        Ok(Some(ImagePoint {
            sample,
            line,
            detector,
            time: self.ctx.time().ok_or(Error::TimeNotSet)?,
            look,
            surface,
        }))
    }

    /// Maps many image coordinates in parallel, each worker using its own
    /// copy of the camera.
    pub fn par_set_images(&self, coordinates: &[(f64, f64)]) -> Result<Vec<Option<ImagePoint>>>
    where
        E: Clone + Send + Sync,
    {
        coordinates
            .par_iter()
            .map_init(|| self.clone(), |camera, &(sample, line)| camera.set_image(sample, line))
            .collect()
    }

    /// Image coordinate of a planetocentric surface location.
    ///
    /// Returns `None` when the location is hidden, behind the camera or off
    /// the image. A camera built without a target returns
    /// [`Error::InvalidConfiguration`].
    pub fn set_ground(&mut self, latitude: Angle, longitude: Angle) -> Result<Option<(f64, f64)>> {
        let ground = self.ground.as_ref().ok_or_else(|| {
            Error::InvalidConfiguration("camera was built without a target".into())
        })?;
        let point = ground.point_on_surface(latitude, longitude);
        self.project(Projection::Ground(point))
    }

    /// Image coordinate of a J2000 right ascension and declination.
    ///
    /// Returns `None` when the direction is behind the camera or off the
    /// image.
    pub fn set_right_ascension_declination(
        &mut self,
        ra: Angle,
        dec: Angle,
    ) -> Result<Option<(f64, f64)>> {
        self.project(Projection::Sky { ra, dec })
    }

    fn project(&mut self, projection: Projection) -> Result<Option<(f64, f64)>> {
        let search = match &self.detector {
            DetectorMap::Framing(_) => TimeSearch::Fixed,
            DetectorMap::Pushframe(map) => TimeSearch::Framelets(map.total_framelets()),
            DetectorMap::SampleScan(map) => match map.readout() {
                ScanReadout::Column(column) => TimeSearch::ScanColumn(column),
                ScanReadout::Mirror => TimeSearch::ScanMirror(map.sample_rate().abs()),
            },
            DetectorMap::VariableSampleScan(map) => TimeSearch::ScanColumn(map.scan_column()),
        };

        let parent = match search {
            TimeSearch::Fixed => self.parent_at_current_time(&projection)?,
            TimeSearch::Framelets(total) => self.parent_by_framelet(&projection, total)?,
            TimeSearch::ScanColumn(_) | TimeSearch::ScanMirror(_) => {
                self.parent_by_scan_time(&projection, search)?
            }
        };

        Ok(parent
            .filter(|parent| self.image.contains(parent))
            .map(|parent| (parent.sample, parent.line)))
    }

    /// Detector coordinate of the projection at the current time.
    fn detector_at_current_time(&mut self, projection: &Projection) -> Result<Option<(f64, f64)>> {
        let undistorted = match projection {
            Projection::Ground(point) => {
                let ground = self.ground.as_mut().ok_or_else(|| {
                    Error::InvalidConfiguration("camera was built without a target".into())
                })?;
                ground.set_ground(&self.ctx, &self.ephemeris, point)?
            }
            Projection::Sky { ra, dec } => {
                let (x, y) = self.sky.set_sky(&self.ctx, &self.ephemeris, *ra, *dec)?;
                self.sky
                    .look_direction()
                    .filter(|look| look.camera().z > 0.0)
                    .map(|_| (x, y))
            }
        };

        let Some((ux, uy)) = undistorted else {
            return Ok(None);
        };
        let Some(distorted) = self.distortion.set_undistorted_focal_plane(&self.ctx, ux, uy) else {
            debug!(ux, uy, "distortion did not converge");
            return Ok(None);
        };

        Ok(Some(self.focal_plane.set_focal_plane(distorted.x(), distorted.y())))
    }

    fn parent_at_current_time(
        &mut self,
        projection: &Projection,
    ) -> Result<Option<ParentCoordinate>> {
        Ok(self
            .detector_at_current_time(projection)?
            .and_then(|(sample, line)| self.detector.set_detector(&self.ctx, sample, line)))
    }

    /// The first framelet whose strip sees the projection.
    fn parent_by_framelet(
        &mut self,
        projection: &Projection,
        total: i64,
    ) -> Result<Option<ParentCoordinate>> {
        for framelet in 1..=total {
            if let DetectorMap::Pushframe(map) = &mut self.detector {
                map.set_framelet(&mut self.ctx, framelet, 0.0);
            }

            let parent = self.parent_at_current_time(projection)?;
            if let Some(parent) = parent.filter(|parent| self.image.contains(parent)) {
                return Ok(Some(parent));
            }
        }

        Ok(None)
    }

    /// How far, in samples, the projection at `time` is from the pixel the
    /// scan was acquiring at `time`.
    fn scan_offset(
        &mut self,
        projection: &Projection,
        search: TimeSearch,
        time: f64,
    ) -> Result<Option<f64>> {
        self.ctx.set_time(time);
        match search {
            TimeSearch::ScanColumn(column) => Ok(self
                .detector_at_current_time(projection)?
                .map(|(sample, _)| sample - column)),
            TimeSearch::ScanMirror(seconds_per_sample) => Ok(self
                .parent_at_current_time(projection)?
                .and_then(|parent| self.detector.acquisition_time(parent.sample, parent.line))
                .map(|acquired| (acquired - time) / seconds_per_sample)),
            TimeSearch::Fixed | TimeSearch::Framelets(_) => Ok(Some(0.0)),
        }
    }

    /// Secant search for the time at which the scan was acquiring the
    /// projection.
    fn parent_by_scan_time(
        &mut self,
        projection: &Projection,
        search: TimeSearch,
    ) -> Result<Option<ParentCoordinate>> {
        let (mut t0, mut t1) = self.cache_span;
        if t0 == t1 {
            t1 = t0 + 1.0;
        }

        let Some(mut f0) = self.scan_offset(projection, search, t0)? else {
            return Ok(None);
        };
        let Some(mut f1) = self.scan_offset(projection, search, t1)? else {
            return Ok(None);
        };

        for _ in 0..MAX_TIME_ITERATIONS {
            if f1 == f0 {
                if f1.abs() > 0.5 {
                    return Ok(None);
                }
                break;
            }

            let t2 = t1 - f1 * (t1 - t0) / (f1 - f0);
            if !t2.is_finite() {
                return Ok(None);
            }

            let Some(f2) = self.scan_offset(projection, search, t2)? else {
                return Ok(None);
            };
            (t0, f0, t1, f1) = (t1, f1, t2, f2);

            if (t1 - t0).abs() < TIME_TOLERANCE {
                break;
            }
        }

        if f1.abs() > 0.5 {
            debug!(offset = f1, "scan time search did not converge on a pixel");
            return Ok(None);
        }

        self.ctx.set_time(t1);
        self.parent_at_current_time(projection)
    }
}
