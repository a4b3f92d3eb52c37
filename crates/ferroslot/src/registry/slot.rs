use core::fmt;

use crate::{Error, MAX_BUSINESS_FLAG, Result, SnowflakeId};

/// A worker slot as granted by the registry, cached locally while issuing.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WorkerSlot {
    slot_id: u16,
    group_name: String,
    business_flag: u8,
}

impl WorkerSlot {
    /// Validates a raw registration result.
    ///
    /// # Errors
    ///
    /// - [`Error::Registration`] if `slot_id` is negative or doesn't fit the
    ///   10-bit worker field.
    /// - [`Error::Configuration`] if the group name carries a malformed
    ///   business flag, see [`parse_business_flag`].
    pub fn new(slot_id: i64, group_name: impl Into<String>) -> Result<Self> {
        let slot_id = u16::try_from(slot_id)
            .ok()
            .filter(|id| u64::from(*id) <= SnowflakeId::MAX_WORKER_ID)
            .ok_or_else(|| {
                Error::registration(format!(
                    "failed to get worker id, registry returned {slot_id}"
                ))
            })?;
        let group_name = group_name.into();
        let business_flag = parse_business_flag(&group_name)?;
        Ok(Self {
            slot_id,
            group_name,
            business_flag,
        })
    }

    pub const fn slot_id(&self) -> u16 {
        self.slot_id
    }

    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    pub const fn business_flag(&self) -> u8 {
        self.business_flag
    }
}

impl fmt::Display for WorkerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{} (flag {})",
            self.group_name, self.slot_id, self.business_flag
        )
    }
}

/// Extracts the business flag from a group name.
///
/// The flag is the decimal suffix after the last `_`. A name without `_`
/// (including the empty name) has flag `0`.
///
/// # Errors
///
/// Returns [`Error::Configuration`] if the suffix is empty, not a decimal
/// number, or greater than [`MAX_BUSINESS_FLAG`].
///
/// # Example
///
/// ```
/// use ferroslot::parse_business_flag;
///
/// assert_eq!(parse_business_flag("orders_7").unwrap(), 7);
/// assert_eq!(parse_business_flag("orders").unwrap(), 0);
/// assert!(parse_business_flag("x_abc").is_err());
/// ```
pub fn parse_business_flag(group_name: &str) -> Result<u8> {
    let Some((_, suffix)) = group_name.rsplit_once('_') else {
        return Ok(0);
    };
    let invalid = || {
        Error::configuration(format!(
            "group {group_name:?} must end in a business flag within 0..={MAX_BUSINESS_FLAG}"
        ))
    };
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    suffix
        .parse::<u8>()
        .ok()
        .filter(|flag| *flag <= MAX_BUSINESS_FLAG)
        .ok_or_else(invalid)
}
