/*
[INPUT]:  Caller-supplied subscription parameters
[OUTPUT]: Validated subscription descriptors
[POS]:    Data layer - subscription request types and normalization
[UPDATE]: When a channel kind gains new subscription parameters
*/

use serde::{Deserialize, Serialize};

use crate::http::{Result, StreamError};

/// Depth levels served by the partial book channel
pub const PARTIAL_DEPTH_LEVELS: [u8; 3] = [5, 10, 20];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialDepthParams {
    pub symbol: String,
    pub level: u8,
}

impl PartialDepthParams {
    pub fn new(symbol: impl Into<String>, level: u8) -> Self {
        Self {
            symbol: symbol.into(),
            level,
        }
    }
}

/// One subscription descriptor or an ordered collection of them.
///
/// Implemented for single values as well as `Vec`, slices and arrays so every
/// subscribe call accepts either shape.
pub trait IntoSubscriptions<T> {
    fn into_subscriptions(self) -> Vec<T>;
}

impl IntoSubscriptions<String> for &str {
    fn into_subscriptions(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl IntoSubscriptions<String> for String {
    fn into_subscriptions(self) -> Vec<String> {
        vec![self]
    }
}

impl IntoSubscriptions<String> for &String {
    fn into_subscriptions(self) -> Vec<String> {
        vec![self.clone()]
    }
}

impl<S: AsRef<str>> IntoSubscriptions<String> for Vec<S> {
    fn into_subscriptions(self) -> Vec<String> {
        self.iter().map(|symbol| symbol.as_ref().to_string()).collect()
    }
}

impl<S: AsRef<str>> IntoSubscriptions<String> for &[S] {
    fn into_subscriptions(self) -> Vec<String> {
        self.iter().map(|symbol| symbol.as_ref().to_string()).collect()
    }
}

impl<S: AsRef<str>, const N: usize> IntoSubscriptions<String> for [S; N] {
    fn into_subscriptions(self) -> Vec<String> {
        self.iter().map(|symbol| symbol.as_ref().to_string()).collect()
    }
}

impl IntoSubscriptions<PartialDepthParams> for PartialDepthParams {
    fn into_subscriptions(self) -> Vec<PartialDepthParams> {
        vec![self]
    }
}

impl IntoSubscriptions<PartialDepthParams> for Vec<PartialDepthParams> {
    fn into_subscriptions(self) -> Vec<PartialDepthParams> {
        self
    }
}

impl IntoSubscriptions<PartialDepthParams> for &[PartialDepthParams] {
    fn into_subscriptions(self) -> Vec<PartialDepthParams> {
        self.to_vec()
    }
}

impl<const N: usize> IntoSubscriptions<PartialDepthParams> for [PartialDepthParams; N] {
    fn into_subscriptions(self) -> Vec<PartialDepthParams> {
        self.into()
    }
}

/// Lowercase a symbol for use in a channel path
pub fn normalize_symbol(symbol: &str) -> Result<String> {
    let symbol = symbol.trim();
    if symbol.is_empty() {
        return Err(StreamError::config("symbol must not be empty"));
    }
    if !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(StreamError::config(format!("invalid symbol: {symbol:?}")));
    }
    Ok(symbol.to_ascii_lowercase())
}

pub fn validate_depth_level(level: u8) -> Result<u8> {
    if PARTIAL_DEPTH_LEVELS.contains(&level) {
        Ok(level)
    } else {
        Err(StreamError::config(format!(
            "partial depth level must be one of {PARTIAL_DEPTH_LEVELS:?}, got {level}"
        )))
    }
}
