//! AI 解析回数の日次上限
//!
//! 「1日」は設定したタイムゾーン（既定 Asia/Taipei）の暦日。
//! 試行ごとにカウンタを加算し、加算後の値が上限を超えたら拒否する。

use crate::error::AppError;
use crate::repository::UsageRepository;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// 利用日のキー（YYYY-MM-DD）
pub fn usage_date(now: DateTime<Utc>, tz: Tz) -> String {
    now.with_timezone(&tz).format("%Y-%m-%d").to_string()
}

/// 1回分の枠を消費する。`daily_limit == 0` なら無制限
///
/// # Returns
/// 消費後のカウント（無制限のときは 0）
pub async fn consume_daily_quota<U>(
    repo: &U,
    user_id: &str,
    now: DateTime<Utc>,
    daily_limit: u32,
    tz: Tz,
) -> Result<i64, AppError>
where
    U: UsageRepository + ?Sized,
{
    if daily_limit == 0 {
        return Ok(0);
    }

    let date = usage_date(now, tz);
    let count = repo.increment_daily_usage(user_id, &date).await?;

    if count > i64::from(daily_limit) {
        log::warn!("Daily AI quota exceeded for a user on {date} ({count}/{daily_limit})");
        return Err(AppError::RateLimited { limit: daily_limit });
    }

    log::debug!("AI quota used on {date}: {count}/{daily_limit}");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MockUsageRepository;
    use chrono::TimeZone;
    use mockall::predicate::eq;

    fn taipei() -> Tz {
        chrono_tz::Asia::Taipei
    }

    #[test]
    fn test_usage_date_uses_local_calendar_day() {
        // UTC 16:30 は台北の翌日 00:30
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 16, 30, 0).unwrap();
        assert_eq!(usage_date(now, taipei()), "2025-06-02");
        assert_eq!(usage_date(now, chrono_tz::UTC), "2025-06-01");
    }

    #[tokio::test]
    async fn test_within_limit() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 3, 0, 0).unwrap();
        let mut repo = MockUsageRepository::new();
        repo.expect_increment_daily_usage()
            .with(eq("u1"), eq("2025-06-01"))
            .times(1)
            .returning(|_, _| Ok(20));

        assert_eq!(consume_daily_quota(&repo, "u1", now, 20, taipei()).await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_over_limit_is_rejected() {
        let now = Utc::now();
        let mut repo = MockUsageRepository::new();
        repo.expect_increment_daily_usage()
            .times(1)
            .returning(|_, _| Ok(21));

        match consume_daily_quota(&repo, "u1", now, 20, taipei()).await {
            Err(AppError::RateLimited { limit }) => assert_eq!(limit, 20),
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_zero_limit_disables_check() {
        let mut repo = MockUsageRepository::new();
        repo.expect_increment_daily_usage().times(0);

        assert_eq!(
            consume_daily_quota(&repo, "u1", Utc::now(), 0, taipei()).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_repository_error_propagates() {
        let mut repo = MockUsageRepository::new();
        repo.expect_increment_daily_usage()
            .returning(|_, _| Err(AppError::Database("boom".into())));

        assert!(matches!(
            consume_daily_quota(&repo, "u1", Utc::now(), 5, taipei()).await,
            Err(AppError::Database(_))
        ));
    }
}
