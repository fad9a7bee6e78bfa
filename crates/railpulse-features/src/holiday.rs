//! UK bank holiday calendar.
//!
//! Scotland follows its own calendar (2 January, first Monday of August, St Andrew's
//! Day, no Easter Monday); every other region follows England and Wales. Holidays that
//! fall on a weekend move to the next weekday not already taken by another holiday.
//! One-off holidays (jubilees, coronations) are not included.

use chrono::{Datelike as _, Days, NaiveDate, Weekday};
use railpulse_dataset::region::Region;

/// Easter Sunday of `year` (anonymous Gregorian algorithm).
#[must_use]
pub fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, u32::try_from(month).ok()?, u32::try_from(day).ok()?)
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

fn first_monday(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, Weekday::Mon, 1)
}

fn last_monday(year: i32, month: u32) -> Option<NaiveDate> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    let mut date = first_of_next.pred_opt()?;
    while date.weekday() != Weekday::Mon {
        date = date.pred_opt()?;
    }
    Some(date)
}

/// Moves each nominal date to the first weekday at or after it that is still free.
fn with_substitutes(nominal: &[NaiveDate]) -> Vec<NaiveDate> {
    let mut taken: Vec<NaiveDate> = vec![];
    for &date in nominal {
        let mut day = date;
        while is_weekend(day) || taken.contains(&day) {
            let Some(next) = day.checked_add_days(Days::new(1)) else {
                break;
            };
            day = next;
        }
        taken.push(day);
    }
    taken
}

/// Observed bank holidays of `year` for `region`, in ascending order.
#[must_use]
pub fn bank_holidays(year: i32, region: Region) -> Vec<NaiveDate> {
    let ymd = |m, d| NaiveDate::from_ymd_opt(year, m, d);
    let scotland = region == Region::Scotland;

    let mut fixed = vec![ymd(1, 1)];
    if scotland {
        fixed.push(ymd(1, 2));
    }
    let mut holidays = with_substitutes(&fixed.into_iter().flatten().collect::<Vec<_>>());

    if let Some(easter) = easter_sunday(year) {
        holidays.extend(easter.checked_sub_days(Days::new(2)));
        if !scotland {
            holidays.extend(easter.checked_add_days(Days::new(1)));
        }
    }
    holidays.extend(first_monday(year, 5));
    holidays.extend(last_monday(year, 5));
    holidays.extend(if scotland {
        first_monday(year, 8)
    } else {
        last_monday(year, 8)
    });
    if scotland {
        holidays.extend(with_substitutes(&ymd(11, 30).into_iter().collect::<Vec<_>>()));
    }
    let christmas = [ymd(12, 25), ymd(12, 26)]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>();
    holidays.extend(with_substitutes(&christmas));

    holidays.sort_unstable();
    holidays.dedup();
    holidays
}

#[must_use]
pub fn is_bank_holiday(date: NaiveDate, region: Region) -> bool {
    bank_holidays(date.year(), region).contains(&date)
}
