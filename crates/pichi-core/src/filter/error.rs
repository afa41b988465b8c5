use thiserror::Error;

/// Errors returned while parsing a filter expression.
///
/// # Examples
/// ```
/// use pichi_core::FilterSet;
/// use pichi_core::IndexFormat;
///
/// let err = FilterSet::parse("vlan==3", IndexFormat::Binary).unwrap_err();
/// assert!(err.to_string().contains("unknown filter variable"));
/// ```
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("malformed filter {atom:?}: expected <variable><comparator><value>")]
    Malformed { atom: String },
    #[error("unknown filter variable {name:?}")]
    UnknownVariable { name: String },
    #[error("comparator {comparator} cannot be used with a network")]
    NetworkComparator { comparator: &'static str },
    #[error("invalid address {value:?}")]
    InvalidAddress { value: String },
    #[error("invalid network {value:?}: {message}")]
    InvalidNetwork { value: String, message: String },
    #[error("invalid number {value:?} for {variable}")]
    InvalidNumber {
        variable: &'static str,
        value: String,
    },
    #[error("value {value} out of range for {variable}")]
    OutOfRange { variable: &'static str, value: u64 },
    #[error("cannot resolve host {name:?}")]
    UnresolvedHost { name: String },
    #[error("unknown service {name:?}")]
    UnknownService { name: String },
    #[error("unknown protocol {name:?}")]
    UnknownProtocol { name: String },
}
