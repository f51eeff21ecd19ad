// Authentication types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};

/// Current access/refresh token pair
///
/// This is both the in-memory state and the on-disk format
/// (`{"access": .., "refresh": .., "expires": <rfc3339>}`).
/// The default value is the "not registered yet" pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Bearer token for all authenticated calls
    pub access: String,

    /// Bearer token accepted only by the refresh endpoint
    pub refresh: String,

    /// Absolute expiry, derived when the pair was issued
    pub expires: DateTime<Utc>,
}

impl TokenPair {
    /// Whether a register call has ever produced this pair
    pub fn is_registered(&self) -> bool {
        !self.refresh.is_empty()
    }

    /// Time left before expiry (negative once expired)
    pub fn remaining(&self) -> Duration {
        self.expires - Utc::now()
    }

    /// Check if the pair expires within the given margin
    pub fn expires_within(&self, margin: Duration) -> bool {
        self.remaining() <= margin
    }
}

/// Token response from the register and refresh endpoints
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access: String,
    pub refresh: String,

    /// Time to live in seconds, relative to receipt
    pub ttl: i64,
}

impl TokenResponse {
    /// Convert into a domain pair received at `now`
    ///
    /// A ttl that does not fit a timestamp is rejected, not clamped.
    pub fn issue_at(self, now: DateTime<Utc>) -> Result<TokenPair> {
        let expires = Duration::try_seconds(self.ttl)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| AuthError::invalid(format!("token ttl out of range: {}", self.ttl)))?;

        Ok(TokenPair {
            access: self.access,
            refresh: self.refresh,
            expires,
        })
    }
}
