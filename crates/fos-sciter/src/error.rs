//! Error handling
//!
//! Native result codes as reported across the engine ABI, and the crate error
//! they are folded into.

use std::fmt;

use crate::value::ConvertMode;

/// Crate result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Binding error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The value API rejected a parameter or a type
    #[error("{op}: {result}")]
    Value { result: ValueResult, op: &'static str },

    /// The DOM API rejected a window, a handle or a parameter
    #[error("{op}: {result}")]
    Dom { result: DomResult, op: &'static str },

    /// The request API failed
    #[error("{op}: {result}")]
    Request { result: RequestResult, op: &'static str },

    /// The engine reported the feature as unavailable on this platform
    #[error("{0}: not supported on this platform")]
    NotSupported(&'static str),

    /// A selection expected exactly one match
    #[error("selector `{selector}` matched {count} elements, expected exactly one")]
    NotUnique { selector: String, count: usize },

    /// The engine delivered an event group this binding does not know
    #[error("unhandled event group 0x{0:04X}")]
    UnknownEventGroup(u32),

    /// Engine call made from a thread that never installed an engine
    #[error("no engine installed on this thread")]
    NoEngine,

    /// String to value conversion stopped early
    #[error("cannot parse {how:?} value: stopped at character {position}")]
    Parse { how: ConvertMode, position: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// `VALUE_RESULT`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ValueResult {
    OkTrue = -1,
    Ok = 0,
    BadParameter = 1,
    IncompatibleType = 2,
}

impl ValueResult {
    /// Decode a raw code; unknown codes count as a bad parameter
    pub fn from_raw(code: i32) -> Self {
        match code {
            -1 => Self::OkTrue,
            0 => Self::Ok,
            2 => Self::IncompatibleType,
            _ => Self::BadParameter,
        }
    }

    pub fn is_ok(self) -> bool {
        matches!(self, Self::Ok | Self::OkTrue)
    }

    /// Turn the code into a `Result`, naming the failed operation
    pub fn check(self, op: &'static str) -> Result<()> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(Error::Value { result: self, op })
        }
    }
}

impl fmt::Display for ValueResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OkTrue => "HV_OK_TRUE",
            Self::Ok => "HV_OK",
            Self::BadParameter => "HV_BAD_PARAMETER",
            Self::IncompatibleType => "HV_INCOMPATIBLE_TYPE",
        })
    }
}

/// `SCDOM_RESULT`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum DomResult {
    OkNotHandled = -1,
    Ok = 0,
    InvalidHwnd = 1,
    InvalidHandle = 2,
    PassiveHandle = 3,
    InvalidParameter = 4,
    OperationFailed = 5,
}

impl DomResult {
    pub fn from_raw(code: i32) -> Self {
        match code {
            -1 => Self::OkNotHandled,
            0 => Self::Ok,
            1 => Self::InvalidHwnd,
            2 => Self::InvalidHandle,
            3 => Self::PassiveHandle,
            4 => Self::InvalidParameter,
            _ => Self::OperationFailed,
        }
    }

    pub fn is_ok(self) -> bool {
        matches!(self, Self::Ok | Self::OkNotHandled)
    }

    pub fn check(self, op: &'static str) -> Result<()> {
        if self.is_ok() {
            Ok(())
        } else {
            tracing::debug!("{} failed: {}", op, self);
            Err(Error::Dom { result: self, op })
        }
    }
}

impl fmt::Display for DomResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OkNotHandled => "SCDOM_OK_NOT_HANDLED",
            Self::Ok => "SCDOM_OK",
            Self::InvalidHwnd => "SCDOM_INVALID_HWND",
            Self::InvalidHandle => "SCDOM_INVALID_HANDLE",
            Self::PassiveHandle => "SCDOM_PASSIVE_HANDLE",
            Self::InvalidParameter => "SCDOM_INVALID_PARAMETER",
            Self::OperationFailed => "SCDOM_OPERATION_FAILED",
        })
    }
}

/// `REQUEST_RESULT`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum RequestResult {
    /// e.g. not enough memory
    Panic = -1,
    Ok = 0,
    BadParam = 1,
    /// e.g. index out of bounds
    Failure = 2,
    NotSupported = 3,
}

impl RequestResult {
    pub fn from_raw(code: i32) -> Self {
        match code {
            -1 => Self::Panic,
            0 => Self::Ok,
            1 => Self::BadParam,
            3 => Self::NotSupported,
            _ => Self::Failure,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    /// "Not supported" maps to its own error variant
    pub fn check(self, op: &'static str) -> Result<()> {
        match self {
            Self::Ok => Ok(()),
            Self::NotSupported => Err(Error::NotSupported(op)),
            result => Err(Error::Request { result, op }),
        }
    }
}

impl fmt::Display for RequestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Panic => "REQUEST_PANIC",
            Self::Ok => "REQUEST_OK",
            Self::BadParam => "REQUEST_BAD_PARAM",
            Self::Failure => "REQUEST_FAILURE",
            Self::NotSupported => "REQUEST_NOTSUPPORTED",
        })
    }
}
