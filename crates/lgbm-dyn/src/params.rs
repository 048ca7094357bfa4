//! Native parameter strings.
//!
//! LightGBM receives its configuration as a single string of `key=value`
//! tokens separated by spaces. [`Parameters`] keeps the pairs in insertion
//! order and renders that wire format through [`Display`](std::fmt::Display).
//! Values cannot contain spaces; no escaping is performed.
//!
//! # Example
//!
//! ```
//! use lgbm_dyn::Parameters;
//!
//! let params = Parameters::new()
//!     .with("objective", "binary")
//!     .with("num_leaves", 31)
//!     .with("learning_rate", 0.1);
//!
//! assert_eq!(params.to_string(), "objective=binary num_leaves=31 learning_rate=0.1");
//! ```

use std::ffi::CString;
use std::fmt;
use std::str::FromStr;

use serde_with::{DeserializeFromStr, SerializeDisplay};

use crate::error::{Error, Result};

/// Ordered `key=value` parameter set.
///
/// Serializes as its wire string, so it can be embedded in configuration
/// documents as `"params": "objective=regression metric=rmse"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, SerializeDisplay, DeserializeFromStr)]
pub struct Parameters {
    pairs: Vec<(String, String)>,
}

impl Parameters {
    /// Create an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a list of `key=value` tokens.
    pub fn from_tokens<I, S>(tokens: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut params = Self::new();
        for token in tokens {
            let token = token.as_ref();
            let (key, value) = token
                .split_once('=')
                .filter(|(key, _)| !key.is_empty())
                .ok_or_else(|| Error::InvalidParameter(token.to_string()))?;
            params.set(key, value);
        }
        Ok(params)
    }

    /// Set `key` to `value`, replacing an existing value in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) -> &mut Self {
        let key = key.into();
        let value = value.to_string();
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.pairs.push((key, value)),
        }
        self
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.set(key, value);
        self
    }

    /// Look up the value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Iterate over `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Render the wire string as a C string.
    pub(crate) fn to_cstring(&self) -> Result<CString> {
        CString::new(self.to_string()).map_err(|_| Error::InteriorNul { what: "parameters" })
    }
}

impl fmt::Display for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.pairs.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}

impl FromStr for Parameters {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_tokens(s.split_whitespace())
    }
}

impl<K, V> FromIterator<(K, V)> for Parameters
where
    K: Into<String>,
    V: ToString,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (key, value) in iter {
            params.set(key, value);
        }
        params
    }
}
