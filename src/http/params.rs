//! Query and path parameter helpers.
//!
//! Missing or unconvertible parameters raise `ArgumentError`, which carries
//! the parameter name so handlers can map it to a 400 response.

use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;

use crate::http::context::RequestContext;

/// A client-supplied parameter was missing or malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    #[error("parameter `{name}` not found")]
    Missing { name: String },

    #[error("cannot convert value {value:?} of parameter `{name}`: {reason}")]
    Invalid {
        name: String,
        value: String,
        reason: String,
    },
}

impl ArgumentError {
    pub fn missing(name: &str) -> Self {
        Self::Missing {
            name: name.to_string(),
        }
    }

    /// Name of the offending parameter.
    pub fn name(&self) -> &str {
        match self {
            Self::Missing { name } | Self::Invalid { name, .. } => name,
        }
    }
}

/// Convert a raw parameter value, naming the parameter on failure.
pub fn convert<T>(name: &str, value: &str) -> Result<T, ArgumentError>
where
    T: FromStr,
    T::Err: Display,
{
    value.parse::<T>().map_err(|e| ArgumentError::Invalid {
        name: name.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

impl RequestContext {
    /// First value of a query parameter, decoded. `None` when absent.
    pub fn query_value(&self, name: &str) -> Option<String> {
        let query = self.query()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    /// Required query parameter as a string.
    pub fn query_str(&self, name: &str) -> Result<String, ArgumentError> {
        self.query_value(name)
            .ok_or_else(|| ArgumentError::missing(name))
    }

    /// Required query parameter converted to `T`.
    pub fn query_param<T>(&self, name: &str) -> Result<T, ArgumentError>
    where
        T: FromStr,
        T::Err: Display,
    {
        let value = self.query_str(name)?;
        convert(name, &value)
    }

    /// Optional query parameter converted to `T`, `default` when absent.
    ///
    /// A present but unconvertible value is still an error.
    pub fn query_param_or<T>(&self, name: &str, default: T) -> Result<T, ArgumentError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.query_value(name) {
            Some(value) => convert(name, &value),
            None => Ok(default),
        }
    }
}
