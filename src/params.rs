//! Named calibration and label parameters.
//!
//! Camera constructors never parse labels or kernels themselves. They read
//! named values through [`ParameterStore`], keyed the way NAIF instrument
//! kernels are (`INS-61500_FOCAL_LENGTH`) or the way PDS labels are
//! (`ExposureDuration`).

use crate::error::{Error, Result};
use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Read access to named scalar and vector parameters.
pub trait ParameterStore {
    /// Returns the keyword values, or `None` if `key` is absent.
    fn keyword(&self, key: &str) -> Option<&Keyword>;

    fn contains(&self, key: &str) -> bool {
        self.keyword(key).is_some()
    }

    /// Returns the first numeric value of `key`.
    fn get_double(&self, key: &str) -> Result<f64> {
        self.get_double_at(key, 0)
    }

    /// Returns the numeric value of `key` at `index`.
    fn get_double_at(&self, key: &str, index: usize) -> Result<f64> {
        let values = self.get_doubles(key)?;
        values.get(index).copied().ok_or(Error::ParameterIndex {
            key: key.into(),
            index,
            len: values.len(),
        })
    }

    /// Returns every numeric value of `key`.
    fn get_doubles(&self, key: &str) -> Result<&[f64]> {
        match self.keyword(key) {
            Some(Keyword::Numbers(values)) => Ok(values.as_slice()),
            Some(Keyword::Text(_)) => Err(Error::ParameterType {
                key: key.into(),
                expected: "numeric",
            }),
            None => Err(Error::MissingParameter { key: key.into() }),
        }
    }

    /// Returns the first numeric value of `key`, which must be integral.
    fn get_integer(&self, key: &str) -> Result<i64> {
        let value = self.get_double(key)?;
        if value.fract() != 0.0 || !value.is_finite() {
            return Err(Error::ParameterType {
                key: key.into(),
                expected: "an integer",
            });
        }

        Ok(value as i64)
    }

    /// Returns the first text value of `key`.
    fn get_string(&self, key: &str) -> Result<&str> {
        match self.keyword(key) {
            Some(Keyword::Text(values)) => {
                values
                    .first()
                    .map(String::as_str)
                    .ok_or(Error::ParameterIndex {
                        key: key.into(),
                        index: 0,
                        len: 0,
                    })
            }
            Some(Keyword::Numbers(_)) => Err(Error::ParameterType {
                key: key.into(),
                expected: "text",
            }),
            None => Err(Error::MissingParameter { key: key.into() }),
        }
    }

    /// Like [`ParameterStore::get_double`] but returns `default` when `key`
    /// is absent. A present key with the wrong type is still an error.
    fn get_double_or(&self, key: &str, default: f64) -> Result<f64> {
        match self.contains(key) {
            true => self.get_double(key),
            false => Ok(default),
        }
    }

    /// Like [`ParameterStore::get_integer`] but returns `default` when `key`
    /// is absent.
    fn get_integer_or(&self, key: &str, default: i64) -> Result<i64> {
        match self.contains(key) {
            true => self.get_integer(key),
            false => Ok(default),
        }
    }
}

/// The values of a single keyword.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Keyword {
    Numbers(Vec<f64>),
    Text(Vec<String>),
}

/// An in-memory keyword pool, used for both kernel pools and image labels.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct KeywordPool {
    keywords: BTreeMap<String, Keyword>,
}

impl KeywordPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_double(self, key: impl Into<String>, value: f64) -> Self {
        self.with_doubles(key, [value])
    }

    pub fn with_doubles(
        mut self,
        key: impl Into<String>,
        values: impl IntoIterator<Item = f64>,
    ) -> Self {
        self.insert(key, Keyword::Numbers(values.into_iter().collect()));
        self
    }

    pub fn with_integer(self, key: impl Into<String>, value: i64) -> Self {
        self.with_double(key, value as f64)
    }

    pub fn with_string(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, Keyword::Text(vec![value.into()]));
        self
    }

    /// Inserts or replaces `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: Keyword) {
        self.keywords.insert(key.into(), value);
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }
}

impl ParameterStore for KeywordPool {
    fn keyword(&self, key: &str) -> Option<&Keyword> {
        self.keywords.get(key)
    }
}

/// Builds the kernel key `INS<code>_<suffix>`.
pub fn ins_key(code: i32, suffix: &str) -> String {
    format!("INS{code}_{suffix}")
}
