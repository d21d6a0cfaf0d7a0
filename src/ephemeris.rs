//! Interfaces to the pointing and position kernels a camera is evaluated
//! against, plus simple in-memory providers.

use crate::error::{Error, Result};
use nalgebra::{UnitQuaternion, Vector3};
use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Time-tagged spacecraft orientation and position.
///
/// All times are ephemeris seconds past J2000.
pub trait Ephemeris {
    /// Rotation from the instrument frame to J2000.
    fn instrument_rotation(&self, et: f64) -> Result<UnitQuaternion<f64>>;

    /// Rotation from J2000 to the target's body-fixed frame.
    fn body_rotation(&self, et: f64) -> Result<UnitQuaternion<f64>>;

    /// Spacecraft position relative to the target centre, body-fixed km.
    fn spacecraft_position(&self, et: f64) -> Result<Vector3<f64>>;

    /// Prepares for queries over `[start, end]` using `size` samples.
    fn load_cache(&mut self, start: f64, end: f64, size: usize) -> Result<()>;
}

/// Conversion from a spacecraft clock string to ephemeris time.
pub trait SpacecraftClock {
    fn clock_to_et(&self, naif_code: i32, clock: &str) -> Result<f64>;
}

/// Linear motion and a constant spin, mostly useful for tests and for
/// simulating a camera.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FixedEphemeris {
    instrument_to_j2000: UnitQuaternion<f64>,
    j2000_to_body: UnitQuaternion<f64>,
    position: Vector3<f64>,
    velocity: Vector3<f64>,

    /// Instrument spin in J2000, rad/s.
    angular_velocity: Vector3<f64>,
    epoch: f64,
    cached: Option<(f64, f64)>,
}

impl FixedEphemeris {
    /// A stationary spacecraft at `position` (body-fixed km) with all frames
    /// aligned to J2000.
    pub fn new(position: Vector3<f64>) -> Self {
        Self {
            instrument_to_j2000: UnitQuaternion::identity(),
            j2000_to_body: UnitQuaternion::identity(),
            position,
            velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
            epoch: 0.0,
            cached: None,
        }
    }

    pub fn with_instrument_rotation(mut self, rotation: UnitQuaternion<f64>) -> Self {
        self.instrument_to_j2000 = rotation;
        self
    }

    pub fn with_body_rotation(mut self, rotation: UnitQuaternion<f64>) -> Self {
        self.j2000_to_body = rotation;
        self
    }

    /// Moves the spacecraft at `velocity` km/s from `position` at `epoch`.
    pub fn with_velocity(mut self, velocity: Vector3<f64>, epoch: f64) -> Self {
        self.velocity = velocity;
        self.epoch = epoch;
        self
    }

    /// Spins the instrument at `angular_velocity` (J2000, rad/s) away from
    /// its attitude at `epoch`.
    pub fn with_angular_velocity(mut self, angular_velocity: Vector3<f64>, epoch: f64) -> Self {
        self.angular_velocity = angular_velocity;
        self.epoch = epoch;
        self
    }

    /// The span requested by the last [`Ephemeris::load_cache`] call.
    pub fn cached_span(&self) -> Option<(f64, f64)> {
        self.cached
    }
}

impl Ephemeris for FixedEphemeris {
    fn instrument_rotation(&self, et: f64) -> Result<UnitQuaternion<f64>> {
        let spin = UnitQuaternion::from_scaled_axis(self.angular_velocity * (et - self.epoch));
        Ok(spin * self.instrument_to_j2000)
    }

    fn body_rotation(&self, _et: f64) -> Result<UnitQuaternion<f64>> {
        Ok(self.j2000_to_body)
    }

    fn spacecraft_position(&self, et: f64) -> Result<Vector3<f64>> {
        Ok(self.position + self.velocity * (et - self.epoch))
    }

    fn load_cache(&mut self, start: f64, end: f64, _size: usize) -> Result<()> {
        self.cached = Some((start, end));
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
struct CacheSample {
    et: f64,
    instrument: UnitQuaternion<f64>,
    body: UnitQuaternion<f64>,
    position: Vector3<f64>,
}

/// Samples another provider over the observation and interpolates between
/// samples.
///
/// Attitude is spherically interpolated and position linearly. Queries
/// outside the cached span go to the inner provider.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CachedEphemeris<E> {
    inner: E,
    samples: Vec<CacheSample>,
}

impl<E: Ephemeris> CachedEphemeris<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            samples: Vec::new(),
        }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    pub fn into_inner(self) -> E {
        self.inner
    }

    /// Number of cached samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The bracketing samples of `et` and the fraction between them.
    fn bracket(&self, et: f64) -> Option<(&CacheSample, &CacheSample, f64)> {
        let first = self.samples.first()?;
        let last = self.samples.last()?;
        if et < first.et || et > last.et {
            return None;
        }

        if self.samples.len() == 1 {
            return Some((first, first, 0.0));
        }

        let upper = self
            .samples
            .partition_point(|s| s.et < et)
            .clamp(1, self.samples.len() - 1);
        let (a, b) = (&self.samples[upper - 1], &self.samples[upper]);
        Some((a, b, (et - a.et) / (b.et - a.et)))
    }
}

impl<E: Ephemeris> Ephemeris for CachedEphemeris<E> {
    fn instrument_rotation(&self, et: f64) -> Result<UnitQuaternion<f64>> {
        match self.bracket(et) {
            Some((a, b, t)) => Ok(a.instrument.slerp(&b.instrument, t)),
            None => self.inner.instrument_rotation(et),
        }
    }

    fn body_rotation(&self, et: f64) -> Result<UnitQuaternion<f64>> {
        match self.bracket(et) {
            Some((a, b, t)) => Ok(a.body.slerp(&b.body, t)),
            None => self.inner.body_rotation(et),
        }
    }

    fn spacecraft_position(&self, et: f64) -> Result<Vector3<f64>> {
        match self.bracket(et) {
            Some((a, b, t)) => Ok(a.position.lerp(&b.position, t)),
            None => self.inner.spacecraft_position(et),
        }
    }

    fn load_cache(&mut self, start: f64, end: f64, size: usize) -> Result<()> {
        if !(start.is_finite() && end.is_finite()) || end < start || size == 0 {
            return Err(Error::Ephemeris(format!(
                "cannot cache {size} samples over [{start}, {end}]"
            )));
        }

        self.inner.load_cache(start, end, size)?;

        let size = if start == end { 1 } else { size.max(2) };
        let step = match size {
            1 => 0.0,
            n => (end - start) / (n - 1) as f64,
        };

        self.samples = (0..size)
            .map(|i| {
                let et = if i + 1 == size { end } else { start + step * i as f64 };
                Ok(CacheSample {
                    et,
                    instrument: self.inner.instrument_rotation(et)?,
                    body: self.inner.body_rotation(et)?,
                    position: self.inner.spacecraft_position(et)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(start, end, size, "cached ephemeris");
        Ok(())
    }
}

/// A clock that ticks at a fixed rate from a known epoch.
///
/// Clock strings look like `1/0524123456.123`: an optional partition number
/// and a tick count.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LinearClock {
    /// Ephemeris time at tick zero.
    epoch: f64,
    ticks_per_second: f64,
}

impl LinearClock {
    pub fn new(epoch: f64, ticks_per_second: f64) -> Result<Self> {
        if !(ticks_per_second.is_finite() && ticks_per_second > 0.0) {
            return Err(Error::InvalidConfiguration(format!(
                "clock rate must be positive, got {ticks_per_second}"
            )));
        }

        Ok(Self {
            epoch,
            ticks_per_second,
        })
    }
}

impl SpacecraftClock for LinearClock {
    fn clock_to_et(&self, naif_code: i32, clock: &str) -> Result<f64> {
        let ticks = match clock.trim().split_once('/') {
            Some((partition, ticks)) => {
                partition
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| Error::Clock(format!("bad partition in {clock:?}")))?;
                ticks
            }
            None => clock.trim(),
        };

        let ticks: f64 = ticks
            .trim()
            .parse()
            .map_err(|_| Error::Clock(format!("bad tick count in {clock:?} for {naif_code}")))?;

        Ok(self.epoch + ticks / self.ticks_per_second)
    }
}
