//! Shared AWS SDK configuration.

use aws_config::{BehaviorVersion, Region, SdkConfig};
use chrono::{DateTime, Utc};

/// Load SDK configuration from the environment, pinning `region` when given.
pub async fn load_sdk_config(region: Option<&str>) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = region.filter(|r| !r.is_empty()) {
        loader = loader.region(Region::new(region.to_string()));
    }
    loader.load().await
}

/// Convert an SDK timestamp; `None` when out of chrono's range.
#[must_use]
pub fn to_utc(ts: &aws_smithy_types::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts.secs(), ts.subsec_nanos())
}
