use chrono::{DateTime, TimeZone, Utc};

/// The instant all six timestamp fields default to when absent.
pub fn epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(0, 0).unwrap()
}

/// Timestamps and usage bookkeeping shared by groups and entries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Times {
    pub last_modification_time: DateTime<Utc>,
    pub creation_time: DateTime<Utc>,
    pub last_access_time: DateTime<Utc>,
    pub expiry_time: DateTime<Utc>,
    pub expires: bool,
    pub usage_count: u32,
    pub location_changed: DateTime<Utc>,
}

impl Default for Times {
    fn default() -> Self {
        Self {
            last_modification_time: epoch(),
            creation_time: epoch(),
            last_access_time: epoch(),
            expiry_time: epoch(),
            expires: false,
            usage_count: 0,
            location_changed: epoch(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_epoch() {
        let times = Times::default();
        assert_eq!(times.creation_time.timestamp(), 0);
        assert_eq!(times.expiry_time, epoch());
        assert!(!times.expires);
        assert_eq!(times.usage_count, 0);
    }
}
