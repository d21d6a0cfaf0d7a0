//! Affine conversion between detector pixels and focal plane millimetres.

use crate::{
    distortion::{Distorted, FocalPlanePoint},
    error::{Error, Result},
    params::{ParameterStore, ins_key},
};
use nalgebra::{Matrix2, Vector2};
use tracing::warn;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Detector ⇄ distorted focal plane transform.
///
/// Detector coordinates are first centred on the detector origin (the
/// boresight pixel) and shifted by the detector offset, then passed through
/// the `TRANSX`/`TRANSY` affine. `ITRANSS`/`ITRANSL` run the other way.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FocalPlaneMap {
    transx: [f64; 3],
    transy: [f64; 3],
    itranss: [f64; 3],
    itransl: [f64; 3],
    origin: Vector2<f64>,
    offset: Vector2<f64>,
}

impl FocalPlaneMap {
    /// Uses explicit forward and inverse coefficients.
    pub fn new(transx: [f64; 3], transy: [f64; 3], itranss: [f64; 3], itransl: [f64; 3]) -> Self {
        Self {
            transx,
            transy,
            itranss,
            itransl,
            origin: Vector2::zeros(),
            offset: Vector2::zeros(),
        }
    }

    /// Derives the inverse from the forward coefficients.
    pub fn from_forward(transx: [f64; 3], transy: [f64; 3]) -> Result<Self> {
        let (itranss, itransl) = invert(&transx, &transy)?;
        Ok(Self::new(transx, transy, itranss, itransl))
    }

    /// Square pixels of `pixel_pitch` mm with x along samples and y along
    /// lines.
    pub fn from_pixel_pitch(pixel_pitch: f64) -> Result<Self> {
        Self::from_forward([0.0, pixel_pitch, 0.0], [0.0, 0.0, pixel_pitch])
    }

    /// Reads `INS<code>_TRANSX`/`TRANSY` and, when both are present,
    /// `ITRANSS`/`ITRANSL`.
    pub fn from_store(code: i32, store: &impl ParameterStore) -> Result<Self> {
        let transx = read3(store, &ins_key(code, "TRANSX"))?;
        let transy = read3(store, &ins_key(code, "TRANSY"))?;

        let itranss_key = ins_key(code, "ITRANSS");
        let itransl_key = ins_key(code, "ITRANSL");
        match store.contains(&itranss_key) && store.contains(&itransl_key) {
            true => Ok(Self::new(
                transx,
                transy,
                read3(store, &itranss_key)?,
                read3(store, &itransl_key)?,
            )),
            false => {
                warn!(code, "no ITRANSS/ITRANSL for instrument, inverting TRANSX/TRANSY");
                Self::from_forward(transx, transy)
            }
        }
    }

    pub fn set_detector_origin(&mut self, sample: f64, line: f64) {
        self.origin = Vector2::new(sample, line);
    }

    pub fn set_detector_offset(&mut self, sample: f64, line: f64) {
        self.offset = Vector2::new(sample, line);
    }

    pub fn detector_origin(&self) -> (f64, f64) {
        (self.origin.x, self.origin.y)
    }

    pub fn detector_offset(&self) -> (f64, f64) {
        (self.offset.x, self.offset.y)
    }

    pub fn transx(&self) -> &[f64; 3] {
        &self.transx
    }

    pub fn transy(&self) -> &[f64; 3] {
        &self.transy
    }

    pub fn itranss(&self) -> &[f64; 3] {
        &self.itranss
    }

    pub fn itransl(&self) -> &[f64; 3] {
        &self.itransl
    }

    /// Detector pixel to distorted focal plane position.
    pub fn set_detector(&self, sample: f64, line: f64) -> FocalPlanePoint<Distorted> {
        let centred = Vector2::new(sample, line) - self.origin - self.offset;
        FocalPlanePoint::new(
            apply(&self.transx, centred.x, centred.y),
            apply(&self.transy, centred.x, centred.y),
        )
    }

    /// Distorted focal plane position to detector `(sample, line)`.
    pub fn set_focal_plane(&self, x: f64, y: f64) -> (f64, f64) {
        let centred = Vector2::new(apply(&self.itranss, x, y), apply(&self.itransl, x, y));
        let detector = centred + self.origin + self.offset;
        (detector.x, detector.y)
    }
}

fn apply(coefficients: &[f64; 3], a: f64, b: f64) -> f64 {
    coefficients[0] + coefficients[1] * a + coefficients[2] * b
}

fn read3(store: &impl ParameterStore, key: &str) -> Result<[f64; 3]> {
    let values = store.get_doubles(key)?;
    values.try_into().map_err(|_| Error::ParameterIndex {
        key: key.into(),
        index: 2,
        len: values.len(),
    })
}

fn invert(transx: &[f64; 3], transy: &[f64; 3]) -> Result<([f64; 3], [f64; 3])> {
    let linear = Matrix2::new(transx[1], transx[2], transy[1], transy[2]);
    let inverse = linear.try_inverse().ok_or_else(|| {
        Error::InvalidConfiguration("focal plane transform is singular".into())
    })?;

    let shift = inverse * Vector2::new(transx[0], transy[0]);
    Ok((
        [-shift.x, inverse[(0, 0)], inverse[(0, 1)]],
        [-shift.y, inverse[(1, 0)], inverse[(1, 1)]],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::KeywordPool;
    use approx::assert_relative_eq;
    use quickcheck::quickcheck;

    const CODE: i32 = -236820;

    fn mdis_like() -> FocalPlaneMap {
        let mut map =
            FocalPlaneMap::from_forward([0.0, 0.014, 0.0], [0.0, 0.0, 0.014]).unwrap();
        map.set_detector_origin(512.5, 512.5);
        map
    }

    #[test]
    fn boresight_is_origin() {
        let map = mdis_like();
        let p = map.set_detector(512.5, 512.5);
        assert_eq!((p.x(), p.y()), (0.0, 0.0));
        assert_eq!(map.set_focal_plane(0.0, 0.0), (512.5, 512.5));
    }

    #[test]
    fn offset_shifts_detector() {
        let mut map = mdis_like();
        map.set_detector_offset(2.0, -1.0);
        let p = map.set_detector(514.5, 511.5);
        assert_relative_eq!(p.x(), 0.0);
        assert_relative_eq!(p.y(), 0.0);
    }

    #[test]
    fn reads_store_and_inverts_missing_inverse() {
        let store = KeywordPool::new()
            .with_doubles(&ins_key(CODE, "TRANSX"), [0.1, 0.0, 0.014])
            .with_doubles(&ins_key(CODE, "TRANSY"), [-0.2, 0.014, 0.0]);

        let map = FocalPlaneMap::from_store(CODE, &store).unwrap();
        assert_relative_eq!(map.itranss()[0], 0.2 / 0.014, epsilon = 1e-9);
        assert_relative_eq!(map.itranss()[1], 0.0);
        assert_relative_eq!(map.itranss()[2], 1.0 / 0.014, epsilon = 1e-9);
        assert_relative_eq!(map.itransl()[0], -0.1 / 0.014, epsilon = 1e-9);
        assert_relative_eq!(map.itransl()[1], 1.0 / 0.014, epsilon = 1e-9);
    }

    #[test]
    fn store_inverse_used_verbatim() {
        let store = KeywordPool::new()
            .with_doubles(&ins_key(CODE, "TRANSX"), [0.0, 0.014, 0.0])
            .with_doubles(&ins_key(CODE, "TRANSY"), [0.0, 0.0, 0.014])
            .with_doubles(&ins_key(CODE, "ITRANSS"), [0.0, 71.0, 0.0])
            .with_doubles(&ins_key(CODE, "ITRANSL"), [0.0, 0.0, 71.0]);

        let map = FocalPlaneMap::from_store(CODE, &store).unwrap();
        assert_eq!(map.itranss(), &[0.0, 71.0, 0.0]);
    }

    #[test]
    fn singular_forward_rejected() {
        let store = KeywordPool::new()
            .with_doubles(&ins_key(CODE, "TRANSX"), [0.0, 0.014, 0.0])
            .with_doubles(&ins_key(CODE, "TRANSY"), [0.0, 0.028, 0.0]);
        assert!(matches!(
            FocalPlaneMap::from_store(CODE, &store),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn short_coefficients_rejected() {
        let store = KeywordPool::new()
            .with_doubles(&ins_key(CODE, "TRANSX"), [0.0, 0.014])
            .with_doubles(&ins_key(CODE, "TRANSY"), [0.0, 0.0, 0.014]);
        assert!(matches!(
            FocalPlaneMap::from_store(CODE, &store),
            Err(Error::ParameterIndex { len: 2, .. })
        ));
    }

    quickcheck! {
        fn detector_focal_plane_roundtrip(sample: u16, line: u16) -> bool {
            let map = mdis_like();
            let (s, l) = (sample as f64 / 32.0, line as f64 / 32.0);
            let p = map.set_detector(s, l);
            let (s2, l2) = map.set_focal_plane(p.x(), p.y());
            (s2 - s).abs() < 1e-9 && (l2 - l).abs() < 1e-9
        }
    }
}
