//! Session token payloads.

use serde::{Deserialize, Serialize};

/// JWT claims for an app session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Stable user id; also names the user's rule and device files.
    #[serde(default)]
    pub sub: String,
    #[serde(default)]
    pub session_id: String,
    pub iat: usize,
    pub exp: usize,
}
