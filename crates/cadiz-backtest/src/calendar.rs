//! Rebalance calendar generation.

use chrono::{Datelike, Duration, Months};

use cadiz_traits::{config::RebalanceFrequency, Date};

/// Last calendar day of the month containing `date`.
#[must_use]
pub fn month_end(date: Date) -> Date {
    let first = date.with_day(1).expect("day 1 always valid");
    first
        .checked_add_months(Months::new(1))
        .expect("date within chrono range")
        - Duration::days(1)
}

/// Last calendar day of the quarter containing `date`.
#[must_use]
pub fn quarter_end(date: Date) -> Date {
    let quarter_last_month = ((date.month() - 1) / 3) * 3 + 3;
    let anchor = Date::from_ymd_opt(date.year(), quarter_last_month, 1).expect("valid month");
    month_end(anchor)
}

/// Ordered rebalance dates in `[start, end]` at the given frequency.
///
/// Each calendar month- or quarter-end is aligned to the last trading day
/// on or before it, using the supplied trading calendar (typically the
/// benchmark's observation dates). Period ends that align before `start`
/// or after `end` are excluded; duplicates collapse.
#[must_use]
pub fn rebalance_dates(
    start: Date,
    end: Date,
    frequency: RebalanceFrequency,
    trading_days: &[Date],
) -> Vec<Date> {
    if start > end || trading_days.is_empty() {
        return Vec::new();
    }

    let align = |period_end: Date| -> Option<Date> {
        let idx = trading_days.partition_point(|&d| d <= period_end);
        idx.checked_sub(1).map(|i| trading_days[i])
    };

    let mut period_end = match frequency {
        RebalanceFrequency::Monthly => month_end(start),
        RebalanceFrequency::Quarterly => quarter_end(start),
    };

    let mut dates = Vec::new();
    while period_end <= month_end(end) {
        if let Some(aligned) = align(period_end) {
            if aligned >= start && aligned <= end && dates.last() != Some(&aligned) {
                dates.push(aligned);
            }
        }
        let next_anchor = period_end
            .with_day(1)
            .expect("day 1 always valid")
            .checked_add_months(Months::new(frequency.months()))
            .expect("date within chrono range");
        period_end = month_end(next_anchor);
        if period_end > end && *dates.last().unwrap_or(&start) >= end {
            break;
        }
    }
    dates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> Date {
        Date::from_ymd_opt(y, m, day).unwrap()
    }

    /// Weekday-only trading calendar over a date range.
    fn weekdays(from: Date, to: Date) -> Vec<Date> {
        let mut days = Vec::new();
        let mut date = from;
        while date <= to {
            if date.weekday().number_from_monday() <= 5 {
                days.push(date);
            }
            date += Duration::days(1);
        }
        days
    }

    #[test]
    fn test_month_end() {
        assert_eq!(month_end(d(2023, 1, 15)), d(2023, 1, 31));
        assert_eq!(month_end(d(2023, 2, 1)), d(2023, 2, 28));
        assert_eq!(month_end(d(2024, 2, 10)), d(2024, 2, 29));
        assert_eq!(month_end(d(2023, 12, 31)), d(2023, 12, 31));
    }

    #[test]
    fn test_quarter_end() {
        assert_eq!(quarter_end(d(2023, 1, 15)), d(2023, 3, 31));
        assert_eq!(quarter_end(d(2023, 5, 1)), d(2023, 6, 30));
        assert_eq!(quarter_end(d(2023, 12, 31)), d(2023, 12, 31));
    }

    #[test]
    fn test_monthly_two_dates() {
        let calendar = weekdays(d(2023, 1, 1), d(2023, 3, 15));
        let dates = rebalance_dates(
            d(2023, 1, 31),
            d(2023, 2, 28),
            RebalanceFrequency::Monthly,
            &calendar,
        );
        // 2023-01-31 is a Tuesday, 2023-02-28 a Tuesday.
        assert_eq!(dates, vec![d(2023, 1, 31), d(2023, 2, 28)]);
    }

    #[test]
    fn test_weekend_month_end_aligns_to_friday() {
        let calendar = weekdays(d(2023, 8, 1), d(2023, 10, 15));
        let dates = rebalance_dates(
            d(2023, 9, 1),
            d(2023, 10, 10),
            RebalanceFrequency::Monthly,
            &calendar,
        );
        // 2023-09-30 is a Saturday; the prior trading day is Friday 29th.
        assert_eq!(dates, vec![d(2023, 9, 29)]);
    }

    #[test]
    fn test_quarterly_spacing() {
        let calendar = weekdays(d(2022, 12, 1), d(2024, 1, 15));
        let dates = rebalance_dates(
            d(2023, 1, 1),
            d(2023, 12, 31),
            RebalanceFrequency::Quarterly,
            &calendar,
        );
        assert_eq!(
            dates,
            vec![d(2023, 3, 31), d(2023, 6, 30), d(2023, 9, 29), d(2023, 12, 29)]
        );
    }

    #[test]
    fn test_empty_when_range_inverted() {
        let calendar = weekdays(d(2023, 1, 1), d(2023, 3, 15));
        assert!(rebalance_dates(
            d(2023, 3, 1),
            d(2023, 1, 1),
            RebalanceFrequency::Monthly,
            &calendar
        )
        .is_empty());
    }

    #[test]
    fn test_dates_strictly_increasing() {
        let calendar = weekdays(d(2020, 1, 1), d(2023, 12, 31));
        let dates = rebalance_dates(
            d(2020, 6, 1),
            d(2023, 6, 30),
            RebalanceFrequency::Monthly,
            &calendar,
        );
        assert!(dates.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(dates.len(), 37);
    }
}
