//! UTC to ephemeris time conversion for labels that carry calendar times.

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// TT − TAI in seconds.
const TT_MINUS_TAI: f64 = 32.184;

/// Coefficients of the TDB − TT approximation used by NAIF leapseconds
/// kernels.
const DELTA_T_K: f64 = 1.657e-3;
const DELTA_T_EB: f64 = 1.671e-2;
const DELTA_T_M: [f64; 2] = [6.239996, 1.99096871e-7];

/// TAI − UTC steps since 1972, as `(year, month, seconds)`; each applies from
/// the first day of its month.
const DELTA_AT: [(i32, u32, f64); 28] = [
    (1972, 1, 10.0),
    (1972, 7, 11.0),
    (1973, 1, 12.0),
    (1974, 1, 13.0),
    (1975, 1, 14.0),
    (1976, 1, 15.0),
    (1977, 1, 16.0),
    (1978, 1, 17.0),
    (1979, 1, 18.0),
    (1980, 1, 19.0),
    (1981, 7, 20.0),
    (1982, 7, 21.0),
    (1983, 7, 22.0),
    (1985, 7, 23.0),
    (1988, 1, 24.0),
    (1990, 1, 25.0),
    (1991, 1, 26.0),
    (1992, 7, 27.0),
    (1993, 7, 28.0),
    (1994, 7, 29.0),
    (1996, 1, 30.0),
    (1997, 7, 31.0),
    (1999, 1, 32.0),
    (2006, 1, 33.0),
    (2009, 1, 34.0),
    (2012, 7, 35.0),
    (2015, 7, 36.0),
    (2017, 1, 37.0),
];

/// A leap second table.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LeapSeconds {
    steps: Vec<(NaiveDateTime, f64)>,
}

impl Default for LeapSeconds {
    fn default() -> Self {
        Self::builtin()
    }
}

impl LeapSeconds {
    /// Every leap second announced up to 2017.
    pub fn builtin() -> Self {
        let steps = DELTA_AT
            .iter()
            .filter_map(|&(year, month, delta)| {
                NaiveDate::from_ymd_opt(year, month, 1)
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
                    .map(|start| (start, delta))
            })
            .collect();
        Self { steps }
    }

    /// Appends a step taking effect at `start`; steps must be added in order.
    pub fn with_step(mut self, start: NaiveDateTime, delta_at: f64) -> Result<Self> {
        if self.steps.last().is_some_and(|&(last, _)| start <= last) {
            return Err(Error::Time(format!("leap second at {start} is out of order")));
        }

        self.steps.push((start, delta_at));
        Ok(self)
    }

    /// TAI − UTC at `utc`.
    pub fn delta_at(&self, utc: &NaiveDateTime) -> Result<f64> {
        self.steps
            .iter()
            .rev()
            .find(|(start, _)| start <= utc)
            .map(|&(_, delta)| delta)
            .ok_or_else(|| Error::Time(format!("{utc} precedes the leap second table")))
    }

    /// Ephemeris time (TDB seconds past J2000) of a UTC instant.
    pub fn utc_to_et(&self, utc: &DateTime<Utc>) -> Result<f64> {
        let naive = utc.naive_utc();
        let since_j2000 = (naive - j2000()).num_microseconds().ok_or_else(|| {
            Error::Time(format!("{utc} is too far from J2000"))
        })? as f64
            * 1e-6;

        let tt = since_j2000 + self.delta_at(&naive)? + TT_MINUS_TAI;
        let m = DELTA_T_M[0] + DELTA_T_M[1] * tt;
        let e = m + DELTA_T_EB * m.sin();
        Ok(tt + DELTA_T_K * e.sin())
    }

    /// UTC instant of an ephemeris time, accurate to well under a
    /// microsecond.
    pub fn et_to_utc(&self, et: f64) -> Result<DateTime<Utc>> {
        let mut utc = j2000().and_utc() + seconds(et - TT_MINUS_TAI - 32.0)?;
        for _ in 0..4 {
            utc += seconds(et - self.utc_to_et(&utc)?)?;
        }
        Ok(utc)
    }

    /// Parses a label time (`2015-12-03T10:00:00.123`, day-of-year
    /// `2015-337T10:00:00.123`, optionally with a trailing `Z`) and converts
    /// it to ephemeris time.
    pub fn parse_utc_to_et(&self, text: &str) -> Result<f64> {
        self.utc_to_et(&parse_utc(text)?)
    }
}

/// 2000-01-01T12:00:00, the J2000 epoch used as naive UTC.
fn j2000() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2000, 1, 1)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .unwrap_or_default()
}

fn seconds(s: f64) -> Result<TimeDelta> {
    match s.is_finite() {
        true if s.abs() < 1e12 => Some(TimeDelta::microseconds((s * 1e6).round() as i64)),
        _ => None,
    }
    .ok_or_else(|| Error::Time(format!("{s} s is out of range")))
}

/// Parses a label UTC time.
pub fn parse_utc(text: &str) -> Result<DateTime<Utc>> {
    let trimmed = text.trim().trim_end_matches('Z');
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%jT%H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| Error::Time(format!("unrecognized UTC time {text:?}")))
}
