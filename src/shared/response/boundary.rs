use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use rand::RngCore;

use crate::shared::response::BOUNDARY_RAND_BYTES;

const BOUNDARY_PREFIX: &str = "BATCH-";

/// Per-response token delimiting multipart parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundary(String);

impl Boundary {
    /// `BATCH-` plus URL-safe base64, so the token is a valid unquoted
    /// header parameter.
    pub fn random() -> Self {
        let mut bytes = [0u8; BOUNDARY_RAND_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(format!("{BOUNDARY_PREFIX}{}", URL_SAFE.encode(bytes)))
    }

    /// Uses a caller-chosen token as is.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value for the response `Content-Type` header.
    pub fn content_type(&self) -> String {
        format!("multipart/mixed; boundary={}", self.0)
    }

    pub(crate) fn delimiter(&self) -> String {
        format!("--{}", self.0)
    }

    pub(crate) fn terminator(&self) -> String {
        format!("--{}--\r\n", self.0)
    }
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
