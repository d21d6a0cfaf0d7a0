use approx::assert_relative_eq;
use nalgebra::{UnitQuaternion, Vector3};
use rstest::rstest;
use sensorgeom::{
    Camera, ImageSize,
    detector::DetectorMap,
    ephemeris::{CachedEphemeris, FixedEphemeris, LinearClock},
    params::{KeywordPool, ins_key},
};
use uom::si::{angle::degree, f64::Angle};

const VIMS: i32 = -82370;
const VIRTIS: i32 = -226213;
const TITAN: i32 = 606;
const RADIUS: f64 = 2575.0;

/// A spacecraft 10000 km above Titan whose boresight sweeps along the
/// detector samples by one pixel every `seconds_per_pixel`, passing over the
/// sub-spacecraft point at `epoch`.
fn sweeping(ifov: f64, seconds_per_pixel: f64, epoch: f64) -> FixedEphemeris {
    FixedEphemeris::new(Vector3::new(RADIUS + 10000.0, 0.0, 0.0))
        .with_instrument_rotation(
            UnitQuaternion::rotation_between(&Vector3::z(), &-Vector3::x()).unwrap(),
        )
        .with_angular_velocity(Vector3::y() * (ifov / seconds_per_pixel), epoch)
}

fn degrees(value: f64) -> Angle {
    Angle::new::<degree>(value)
}

mod vims {
    use super::*;

    const IFOV: f64 = 0.2 / 426.0;
    const LINE_RATE: f64 = 64.0 * 0.08 + 0.415;

    fn kernels() -> KeywordPool {
        KeywordPool::new()
            .with_double(ins_key(VIMS, "FOCAL_LENGTH"), 426.0)
            .with_double(ins_key(VIMS, "PIXEL_PITCH"), 0.2)
            .with_doubles(ins_key(VIMS, "TRANSX"), [0.0, 0.2, 0.0])
            .with_doubles(ins_key(VIMS, "TRANSY"), [0.0, 0.0, 0.2])
            .with_double(ins_key(VIMS, "BORESIGHT_SAMPLE"), 32.5)
            .with_double(ins_key(VIMS, "BORESIGHT_LINE"), 32.5)
            .with_doubles(format!("BODY{TITAN}_RADII"), [RADIUS; 3])
    }

    fn label() -> KeywordPool {
        KeywordPool::new()
            .with_string("SamplingMode", "NORMAL")
            .with_string("NativeStartTime", "1000.0")
            .with_doubles("ExposureDuration", [80.0, 5120.0])
            .with_double("InterlineDelayDuration", 415.0)
            .with_double("SwathWidth", 64.0)
    }

    /// Hovering 10000 km above latitude 0, longitude 0, looking straight
    /// down.
    fn overhead() -> FixedEphemeris {
        FixedEphemeris::new(Vector3::new(RADIUS + 10000.0, 0.0, 0.0)).with_instrument_rotation(
            UnitQuaternion::rotation_between(&Vector3::z(), &-Vector3::x()).unwrap(),
        )
    }

    fn camera_with(label: &KeywordPool, ephemeris: FixedEphemeris) -> Camera<FixedEphemeris> {
        Camera::new(
            VIMS,
            ImageSize::new(64, 64, 256),
            label,
            &kernels(),
            &LinearClock::new(0.0, 1.0).unwrap(),
            Some(TITAN),
            ephemeris,
        )
        .unwrap()
    }

    fn camera() -> Camera<FixedEphemeris> {
        camera_with(&label(), overhead())
    }

    #[test]
    fn caches_every_sample() {
        let camera = camera();
        let (start, end, size) = camera.cache_span();
        assert_relative_eq!(start, 1000.0);
        assert_relative_eq!(end, 1000.0 + 63.0 * LINE_RATE + 64.0 * 0.08, epsilon = 1e-9);
        assert_eq!(size, 65);
    }

    #[rstest]
    #[case(0.5, 1.0, 1000.0)]
    #[case(20.0, 1.0, 1001.56)]
    #[case(20.0, 3.0, 1012.63)]
    fn pixel_time_steps_by_sample_and_line(
        #[case] sample: f64,
        #[case] line: f64,
        #[case] time: f64,
    ) {
        let mut camera = camera();
        let point = camera.set_image(sample, line).unwrap().unwrap();
        assert_relative_eq!(point.time, time, epsilon = 1e-9);
        assert_eq!(point.detector.sample, sample);
        assert_eq!(point.detector.line, line);
    }

    #[test]
    fn swath_edges_look_apart() {
        let mut camera = camera();
        let first = camera.set_image(1.0, 32.5).unwrap().unwrap().look;
        let last = camera.set_image(64.0, 32.5).unwrap().unwrap().look;

        assert_relative_eq!(first.camera().x, -last.camera().x, epsilon = 1e-12);
        assert!(first.camera().x < 0.0);
        assert_relative_eq!(
            first.camera().angle(last.camera()),
            63.0 * IFOV,
            epsilon = 1e-5
        );
    }

    #[test]
    fn x_offset_shifts_the_mirror() {
        let mut plain = camera();
        let mut shifted = camera_with(&label().with_double("XOffset", 10.0), overhead());

        let point = shifted.set_image(1.0, 32.5).unwrap().unwrap();
        assert_eq!(point.detector.sample, 10.0);
        assert_relative_eq!(
            *point.look.camera(),
            *plain.set_image(10.0, 32.5).unwrap().unwrap().look.camera(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn boresight_is_the_sub_spacecraft_point() {
        let mut camera = camera();
        let (s, l) = camera
            .set_ground(degrees(0.0), degrees(0.0))
            .unwrap()
            .unwrap();
        assert_relative_eq!(s, 32.5, epsilon = 1e-6);
        assert_relative_eq!(l, 32.5, epsilon = 1e-6);
    }

    #[rstest]
    #[case(20.0, 3.0)]
    #[case(5.25, 1.0)]
    #[case(60.0, 64.0)]
    #[case(41.7, 30.2)]
    fn ground_roundtrip(#[case] sample: f64, #[case] line: f64) {
        let mut camera = camera();
        let surface = camera.set_image(sample, line).unwrap().unwrap().surface.unwrap();

        let (s, l) = camera
            .set_ground(surface.latitude, surface.longitude)
            .unwrap()
            .unwrap();
        assert_relative_eq!(s, sample, epsilon = 1e-6);
        assert_relative_eq!(l, line, epsilon = 1e-6);
    }

    #[rstest]
    #[case(20.0, 32.0)]
    #[case(50.0, 33.0)]
    fn ground_roundtrip_while_turning(#[case] sample: f64, #[case] line: f64) {
        let mut camera = camera_with(&label(), sweeping(IFOV, 2.0, 1000.0));
        let point = camera.set_image(sample, line).unwrap().unwrap();
        let surface = point.surface.unwrap();

        let (s, l) = camera
            .set_ground(surface.latitude, surface.longitude)
            .unwrap()
            .unwrap();
        assert_relative_eq!(s, sample, epsilon = 1e-5);
        assert_relative_eq!(l, line, epsilon = 1e-5);
        assert_relative_eq!(camera.time().unwrap(), point.time, epsilon = 1e-5);
    }

    #[test]
    fn sky_roundtrip() {
        let mut camera = camera();
        let look = camera.set_image(40.0, 2.0).unwrap().unwrap().look;

        let (s, l) = camera
            .set_right_ascension_declination(look.right_ascension(), look.declination())
            .unwrap()
            .unwrap();
        assert_relative_eq!(s, 40.0, epsilon = 1e-6);
        assert_relative_eq!(l, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn ground_outside_the_field_misses() {
        let mut camera = camera();
        assert_eq!(camera.set_ground(degrees(10.0), degrees(0.0)).unwrap(), None);
    }

    #[test]
    fn every_pixel_shares_the_exposure() {
        let camera = camera();
        assert_relative_eq!(camera.pixel_exposure_duration(10.0, 2.0).unwrap(), 0.08);
        assert_relative_eq!(camera.exposure_duration(), 0.08);
    }
}

mod virtis {
    use super::*;

    const IFOV: f64 = 0.038 / 152.0;

    fn kernels() -> KeywordPool {
        KeywordPool::new()
            .with_double(ins_key(VIRTIS, "FOCAL_LENGTH"), 152.0)
            .with_double(ins_key(VIRTIS, "PIXEL_PITCH"), 0.038)
            .with_doubles(ins_key(VIRTIS, "TRANSX"), [0.0, 0.038, 0.0])
            .with_doubles(ins_key(VIRTIS, "TRANSY"), [0.0, 0.0, 0.038])
            .with_double(ins_key(VIRTIS, "BORESIGHT_SAMPLE"), 1.0)
            .with_double(ins_key(VIRTIS, "BORESIGHT_LINE"), 128.5)
            .with_doubles(format!("BODY{TITAN}_RADII"), [RADIUS; 3])
    }

    fn label() -> KeywordPool {
        KeywordPool::new()
            .with_string("ChannelId", "VIRTIS_M_IR")
            .with_string("SpacecraftClockStartCount", "1/300")
            .with_doubles("FrameParameter", [1000.0, 1.0, 20.0])
            .with_doubles("RateChangeSample", [1.0, 101.0, 201.0])
            .with_doubles("RateChangeEt", [300.0, 2300.0, 2800.0])
            .with_doubles("RateChangeRate", [20.0, 5.0, 10.0])
    }

    fn camera() -> Camera<CachedEphemeris<FixedEphemeris>> {
        Camera::new(
            VIRTIS,
            ImageSize::new(400, 256, 432),
            &label(),
            &kernels(),
            &LinearClock::new(0.0, 1.0).unwrap(),
            Some(TITAN),
            CachedEphemeris::new(sweeping(IFOV, 20.0, 2547.5)),
        )
        .unwrap()
    }

    #[test]
    fn caches_the_whole_scan() {
        let camera = camera();
        let (start, end, size) = camera.cache_span();
        assert_relative_eq!(start, 300.0);
        assert_relative_eq!(end, 4800.0);
        assert_eq!(size, 401);
        assert_eq!(camera.ephemeris().len(), 401);
        assert_eq!(camera.ephemeris().inner().cached_span(), Some((300.0, 4800.0)));
    }

    #[rstest]
    #[case(50.0, 20.0)]
    #[case(150.0, 5.0)]
    #[case(300.0, 10.0)]
    fn exposure_follows_the_rate_table(#[case] sample: f64, #[case] exposure: f64) {
        let camera = camera();
        assert_relative_eq!(camera.pixel_exposure_duration(sample, 1.0).unwrap(), exposure);
    }

    #[test]
    fn pixel_time_follows_the_rate_table() {
        let mut camera = camera();
        assert!(matches!(camera.detector_map(), DetectorMap::VariableSampleScan(_)));

        let point = camera.set_image(150.0, 40.0).unwrap().unwrap();
        assert_relative_eq!(point.time, 2547.5, epsilon = 1e-9);
        assert_eq!(point.detector.sample, 1.0);
    }

    #[rstest]
    #[case(150.0, 40.0)]
    #[case(20.0, 200.0)]
    #[case(350.0, 128.0)]
    fn ground_roundtrip(#[case] sample: f64, #[case] line: f64) {
        let mut camera = camera();
        let surface = camera.set_image(sample, line).unwrap().unwrap().surface.unwrap();

        let (s, l) = camera
            .set_ground(surface.latitude, surface.longitude)
            .unwrap()
            .unwrap();
        assert_relative_eq!(s, sample, epsilon = 1e-4);
        assert_relative_eq!(l, line, epsilon = 1e-4);
    }

    #[test]
    fn far_side_is_hidden() {
        let mut camera = camera();
        assert_eq!(camera.set_ground(degrees(0.0), degrees(180.0)).unwrap(), None);
    }
}
