//! Temporal coordinate encoder.
//!
//! Maps a UTC timestamp onto the 9-character token used as the `t` axis of
//! a coordinate: `YYYY` `M` `W` `D` `H` `F`, where each field after the year
//! is a single digit, with values above nine spelled `A`, `B`, `C`, ...
//!
//! | Field | Meaning | Range |
//! |-------|---------|-------|
//! | `YYYY` | year digits | 0000-9999 |
//! | `M` | month | 1-C |
//! | `W` | week of month, `(day - 1) / 7 + 1` | 1-5 |
//! | `D` | ISO weekday, Monday = 1 | 1-7 |
//! | `H` | hour | 0-N |
//! | `F` | five-minute slot | 0-B |

use chrono::{DateTime, Datelike, Timelike, Utc};

fn digit(v: u32) -> char {
    if v < 10 {
        char::from(b'0' + v as u8)
    } else {
        char::from(b'A' + (v - 10) as u8)
    }
}

/// Encode a timestamp as a temporal coordinate.
pub fn encode(dt: DateTime<Utc>) -> String {
    let year = dt.year().rem_euclid(10_000) as u32;
    let mut t = String::with_capacity(9);
    t.push(digit(year / 1000));
    t.push(digit((year % 1000) / 100));
    t.push(digit((year % 100) / 10));
    t.push(digit(year % 10));
    t.push(digit(dt.month()));
    t.push(digit((dt.day() - 1) / 7 + 1));
    t.push(digit(dt.weekday().number_from_monday()));
    t.push(digit(dt.hour()));
    t.push(digit(dt.minute() / 5));
    t
}

/// Temporal coordinate for the current instant.
pub fn now() -> String {
    encode(Utc::now())
}
