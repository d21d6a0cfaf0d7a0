use thiserror::Error;

/// Errors raised while building or misusing a camera model.
///
/// Geometric misses (a pixel that does not land on the detector, a ray that
/// misses the target) are never errors; they are reported as `None`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("unrecognized instrument code {code}")]
    UnknownInstrument { code: i32 },

    #[error("missing parameter {key}")]
    MissingParameter { key: String },

    #[error("parameter {key} is not {expected}")]
    ParameterType { key: String, expected: &'static str },

    #[error("parameter {key} has {len} values but index {index} was requested")]
    ParameterIndex { key: String, index: usize, len: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("{operation} is not supported by the {map} detector map")]
    UnsupportedOperation {
        operation: &'static str,
        map: &'static str,
    },

    #[error("no sample rate entry covers sample {sample}")]
    NoCoveringInterval { sample: f64 },

    #[error("no time has been established for the camera")]
    TimeNotSet,

    #[error("ephemeris lookup failed: {0}")]
    Ephemeris(String),

    #[error("spacecraft clock conversion failed: {0}")]
    Clock(String),

    #[error("time conversion failed: {0}")]
    Time(String),
}

pub type Result<T> = std::result::Result<T, Error>;
