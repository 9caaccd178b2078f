//! Identifier newtypes carried in message headers.

use std::fmt;

use crate::enums::EUniverse;

/// Correlation identifier pairing an asynchronous request with its response.
///
/// `JobId::INVALID` (all bits set) is the wire value for "no job".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl JobId {
    /// The "no job" sentinel.
    pub const INVALID: JobId = JobId(u64::MAX);

    /// Create a new [`JobId`] with the provided value.
    #[must_use]
    pub const fn new(id: u64) -> Self { Self(id) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub const fn as_u64(self) -> u64 { self.0 }

    /// Returns `true` unless this is [`JobId::INVALID`].
    #[must_use]
    pub const fn is_valid(self) -> bool { self.0 != u64::MAX }
}

impl Default for JobId {
    fn default() -> Self { Self::INVALID }
}

impl From<u64> for JobId {
    fn from(value: u64) -> Self { Self(value) }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "JobId({})", self.0)
        } else {
            f.write_str("JobId(invalid)")
        }
    }
}

/// 64-bit account identity as it appears on the wire.
///
/// Layout, high to low: universe (8 bits), account type (4 bits), instance
/// (20 bits), account id (32 bits).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SteamId(u64);

impl SteamId {
    /// Create a [`SteamId`] from its raw 64-bit form.
    #[must_use]
    pub const fn new(raw: u64) -> Self { Self(raw) }

    /// Assemble an identity from its components.
    #[must_use]
    pub fn from_parts(account_id: u32, instance: u32, account_type: u8, universe: EUniverse) -> Self {
        let raw = u64::from(account_id)
            | (u64::from(instance & 0x000F_FFFF) << 32)
            | (u64::from(account_type & 0x0F) << 52)
            | (u64::from(universe.code() & 0xFF) << 56);
        Self(raw)
    }

    /// Return the raw 64-bit form.
    #[must_use]
    pub const fn as_u64(self) -> u64 { self.0 }

    /// Lower 32 bits: the account number.
    #[must_use]
    #[expect(clippy::cast_possible_truncation, reason = "masked to 32 bits")]
    pub const fn account_id(self) -> u32 { (self.0 & 0xFFFF_FFFF) as u32 }

    /// 20-bit instance field.
    #[must_use]
    #[expect(clippy::cast_possible_truncation, reason = "masked to 20 bits")]
    pub const fn instance(self) -> u32 { ((self.0 >> 32) & 0x000F_FFFF) as u32 }

    /// 4-bit account type field.
    #[must_use]
    #[expect(clippy::cast_possible_truncation, reason = "masked to 4 bits")]
    pub const fn account_type(self) -> u8 { ((self.0 >> 52) & 0x0F) as u8 }

    /// Universe the account lives in.
    #[must_use]
    #[expect(clippy::cast_possible_truncation, reason = "top byte")]
    pub fn universe(self) -> EUniverse { EUniverse::from_code((self.0 >> 56) as u32) }

    /// Returns `true` for a non-zero identity in a known universe.
    #[must_use]
    pub fn is_valid(self) -> bool { self.0 != 0 && self.universe() != EUniverse::Invalid }
}

impl From<u64> for SteamId {
    fn from(value: u64) -> Self { Self(value) }
}

impl fmt::Display for SteamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}:{}:{}]",
            self.universe().code(),
            self.account_type(),
            self.account_id()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steam_id_components_round_trip() {
        let id = SteamId::from_parts(12_345, 1, 1, EUniverse::Public);
        assert_eq!(id.as_u64(), 76_561_197_960_278_073);
        assert_eq!(id.account_id(), 12_345);
        assert_eq!(id.instance(), 1);
        assert_eq!(id.account_type(), 1);
        assert_eq!(id.universe(), EUniverse::Public);
        assert!(id.is_valid());
    }

    #[test]
    fn default_job_is_invalid() {
        assert_eq!(JobId::default(), JobId::INVALID);
        assert!(!JobId::INVALID.is_valid());
        assert!(JobId::new(3).is_valid());
        assert_eq!(JobId::INVALID.to_string(), "JobId(invalid)");
    }
}
