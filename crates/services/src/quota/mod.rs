pub mod ports;

pub use ports::*;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::auth::{User, UserId};

pub const DEFAULT_DAILY_REQUEST_LIMIT: i64 = 10;

/// `[start of the UTC day containing now, start of the next UTC day)`
pub fn day_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let midnight = now.date_naive().and_time(chrono::NaiveTime::MIN);
    let start = Utc.from_utc_datetime(&midnight);
    (start, start + Duration::days(1))
}

pub struct QuotaServiceImpl {
    usage_repository: Arc<dyn UsageRepository>,
    daily_limit: i64,
}

impl QuotaServiceImpl {
    pub fn new(usage_repository: Arc<dyn UsageRepository>, daily_limit: i64) -> Self {
        Self {
            usage_repository,
            daily_limit,
        }
    }

    pub async fn authorize_at(
        &self,
        user: &User,
        now: DateTime<Utc>,
    ) -> Result<QuotaDecision, QuotaError> {
        if user.is_admin {
            debug!(user_id = %user.id, "Admin user exempt from quota");
            return Ok(QuotaDecision::Exempt);
        }

        let (start, end) = day_window(now);
        let used = self
            .usage_repository
            .count_between(user.id, start, end)
            .await
            .map_err(|e| QuotaError::InternalError(format!("Failed to count usage: {e}")))?;

        if used >= self.daily_limit {
            warn!(
                user_id = %user.id,
                used,
                limit = self.daily_limit,
                "Daily request quota exceeded"
            );
            Ok(QuotaDecision::LimitExceeded {
                used,
                limit: self.daily_limit,
            })
        } else {
            Ok(QuotaDecision::Allowed {
                remaining: self.daily_limit - used,
            })
        }
    }

    pub async fn record_at(&self, user_id: UserId, now: DateTime<Utc>) -> Result<(), QuotaError> {
        self.usage_repository
            .record(user_id, now)
            .await
            .map_err(|e| QuotaError::InternalError(format!("Failed to record usage: {e}")))
    }
}

#[async_trait]
impl QuotaGate for QuotaServiceImpl {
    async fn authorize(&self, user: &User) -> Result<QuotaDecision, QuotaError> {
        self.authorize_at(user, Utc::now()).await
    }

    async fn record(&self, user_id: UserId) -> Result<(), QuotaError> {
        self.record_at(user_id, Utc::now()).await
    }
}
