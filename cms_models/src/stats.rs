//! Aggregates shown by the admin dashboard widgets

use std::ops::DerefMut;

use authz::Role;
use chrono::DateTime;
use chrono::Datelike as _;
use chrono::Months;
use chrono::NaiveDate;
use chrono::Utc;
use database::DbConnection;
use database::tables::post_tag;
use database::tables::posts;
use database::tables::tags;
use database::tables::users;
use diesel::dsl;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use itertools::Itertools as _;

use crate::Error;
use crate::Membership;
use crate::TeamScope;
use crate::tag::CATEGORIES;

pub const DAILY_CHART_DAYS: u32 = 7;
pub const MONTHLY_CHART_MONTHS: u32 = 6;
pub const TOP_CATEGORIES: usize = 6;

#[derive(Debug, Clone, PartialEq)]
pub struct UserStats {
    pub total: i64,
    /// New users per day, oldest first, ending today
    pub daily_new: Vec<i64>,
    pub verified: i64,
    pub verified_percentage: i64,
    pub new_this_month: i64,
    /// Empty when teams are disabled
    pub per_role: Vec<(Role, i64)>,
}

/// Share of `part` in `total` rounded to the nearest integer, 0 when `total` is 0
pub fn percentage(part: i64, total: i64) -> i64 {
    if total <= 0 {
        return 0;
    }
    (part as f64 * 100.0 / total as f64).round() as i64
}

/// Counts the dates falling on each of the `days` days ending `today`
pub fn daily_buckets(today: NaiveDate, days: u32, dates: &[NaiveDate]) -> Vec<i64> {
    (0..days)
        .rev()
        .map(|ago| {
            let day = today - chrono::Days::new(ago.into());
            dates.iter().filter(|date| **date == day).count() as i64
        })
        .collect()
}

fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Counts the dates falling in each of the `months` months ending with the month of `today`
///
/// Months are labelled like `Jan 2026` and empty months count 0.
pub fn monthly_buckets(today: NaiveDate, months: u32, dates: &[NaiveDate]) -> Vec<(String, i64)> {
    let current = month_start(today);
    (0..months)
        .rev()
        .filter_map(|ago| current.checked_sub_months(Months::new(ago)))
        .map(|start| {
            let count = dates
                .iter()
                .filter(|date| date.year() == start.year() && date.month() == start.month())
                .count() as i64;
            (start.format("%b %Y").to_string(), count)
        })
        .collect()
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

async fn users_created_since(
    conn: &mut DbConnection,
    since: NaiveDate,
) -> Result<Vec<NaiveDate>, Error> {
    let created: Vec<DateTime<Utc>> = users::table
        .filter(users::created_at.ge(start_of_day(since)))
        .select(users::created_at)
        .load(conn.write().await.deref_mut())
        .await?;
    Ok(created.into_iter().map(|at| at.date_naive()).collect())
}

impl UserStats {
    #[tracing::instrument(skip(conn), err)]
    pub async fn compute(
        conn: &mut DbConnection,
        today: NaiveDate,
        teams_enabled: bool,
    ) -> Result<UserStats, Error> {
        let total: i64 = users::table
            .count()
            .get_result(conn.write().await.deref_mut())
            .await?;
        let verified: i64 = users::table
            .filter(users::email_verified_at.is_not_null())
            .count()
            .get_result(conn.write().await.deref_mut())
            .await?;
        let new_this_month: i64 = users::table
            .filter(users::created_at.ge(start_of_day(month_start(today))))
            .count()
            .get_result(conn.write().await.deref_mut())
            .await?;
        let window_start = today - chrono::Days::new((DAILY_CHART_DAYS - 1).into());
        let recent = users_created_since(conn, window_start).await?;
        let per_role = if teams_enabled {
            Membership::users_per_role(conn).await?
        } else {
            Vec::new()
        };
        Ok(UserStats {
            total,
            daily_new: daily_buckets(today, DAILY_CHART_DAYS, &recent),
            verified,
            verified_percentage: percentage(verified, total),
            new_this_month,
            per_role,
        })
    }
}

/// Users created per month over the chart window
#[tracing::instrument(skip(conn), err)]
pub async fn users_per_month(
    conn: &mut DbConnection,
    today: NaiveDate,
) -> Result<Vec<(String, i64)>, Error> {
    let window_start = month_start(today)
        .checked_sub_months(Months::new(MONTHLY_CHART_MONTHS - 1))
        .unwrap_or(today);
    let created = users_created_since(conn, window_start).await?;
    Ok(monthly_buckets(today, MONTHLY_CHART_MONTHS, &created))
}

/// Live posts of the scope per category name, most used first
#[tracing::instrument(skip(conn), err)]
pub async fn posts_per_category(
    conn: &mut DbConnection,
    scope: TeamScope,
) -> Result<Vec<(String, i64)>, Error> {
    let post_ids: Vec<i64> = scope
        .filter_posts(posts::table.into_boxed())
        .filter(posts::deleted_at.is_null())
        .select(posts::id)
        .load(conn.write().await.deref_mut())
        .await?;
    if post_ids.is_empty() {
        return Ok(Vec::new());
    }
    let counts: Vec<(String, i64)> = post_tag::table
        .inner_join(tags::table)
        .filter(tags::tag_type.eq(CATEGORIES))
        .filter(post_tag::post_id.eq_any(&post_ids))
        .group_by(tags::name)
        .select((tags::name, dsl::count(post_tag::post_id)))
        .load(conn.write().await.deref_mut())
        .await?;
    Ok(top_counts(counts, TOP_CATEGORIES))
}

/// Sorts by count descending then label, keeps the first `limit`
pub fn top_counts(counts: Vec<(String, i64)>, limit: usize) -> Vec<(String, i64)> {
    counts
        .into_iter()
        .sorted_by(|(a_label, a), (b_label, b)| b.cmp(a).then_with(|| a_label.cmp(b_label)))
        .take(limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[rstest]
    #[case::no_users(0, 0, 0)]
    #[case::all(4, 4, 100)]
    #[case::rounded_up(2, 3, 67)]
    #[case::rounded_down(1, 3, 33)]
    fn verified_percentage(#[case] part: i64, #[case] total: i64, #[case] expected: i64) {
        assert_eq!(percentage(part, total), expected);
    }

    #[test]
    fn daily_chart_ends_today() {
        let today = date(2026, 3, 10);
        let dates = [date(2026, 3, 10), date(2026, 3, 10), date(2026, 3, 4), date(2026, 3, 1)];
        assert_eq!(daily_buckets(today, 7, &dates), vec![1, 0, 0, 0, 0, 0, 2]);
    }

    #[test]
    fn monthly_chart_is_zero_filled_and_crosses_years() {
        let today = date(2026, 2, 14);
        let dates = [date(2026, 2, 1), date(2025, 12, 31), date(2025, 12, 1), date(2025, 8, 5)];
        assert_eq!(
            monthly_buckets(today, 6, &dates),
            vec![
                ("Sep 2025".to_owned(), 0),
                ("Oct 2025".to_owned(), 0),
                ("Nov 2025".to_owned(), 0),
                ("Dec 2025".to_owned(), 2),
                ("Jan 2026".to_owned(), 0),
                ("Feb 2026".to_owned(), 1),
            ]
        );
    }

    #[test]
    fn top_categories() {
        let counts = (1..=8).map(|i| (format!("c{i}"), i % 4)).collect();
        let top = top_counts(counts, 6);
        assert_eq!(top.len(), 6);
        assert_eq!(top[0], ("c3".to_owned(), 3));
        assert_eq!(top[1], ("c7".to_owned(), 3));
        assert_eq!(top[5], ("c5".to_owned(), 1));
    }
}
