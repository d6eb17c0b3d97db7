//! Calendar and tariff-period encoder.
//!
//! Maps every step of the horizon to exactly one power period and one energy
//! period of the access tariff. Periods are numbered from 0 here (`P1` is 0).
//! Off days (weekends and holidays) always fall in the last, cheapest period.

use std::str::FromStr;

use strum::{Display, EnumString};

use crate::domain::Calendar;
use crate::error::ModelError;

pub const MAX_PERIODS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Territory {
    Peninsula,
    Canarias,
    Baleares,
    Ceuta,
    Melilla,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum TariffCode {
    #[strum(serialize = "2.0TD")]
    Td20,
    #[strum(serialize = "3.0TD")]
    Td30,
    #[strum(serialize = "6.1TD")]
    Td61,
    #[strum(serialize = "6.2TD")]
    Td62,
    #[strum(serialize = "6.3TD")]
    Td63,
    #[strum(serialize = "6.4TD")]
    Td64,
}

impl TariffCode {
    /// Flat tariffs have two power periods, no excess power, and no ordering
    /// requirement on hired power.
    pub fn is_flat(self) -> bool {
        self == TariffCode::Td20
    }

    pub fn power_periods(self) -> usize {
        if self.is_flat() {
            2
        } else {
            6
        }
    }

    pub fn energy_periods(self) -> usize {
        if self.is_flat() {
            3
        } else {
            6
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Season {
    Low,
    Medium,
    MediumHigh,
    High,
}

fn season(territory: Territory, month: u32) -> Season {
    use Season::*;
    match territory {
        Territory::Peninsula => match month {
            4 | 5 | 10 => Low,
            6 | 8 | 9 => Medium,
            3 | 11 => MediumHigh,
            _ => High,
        },
        Territory::Canarias => match month {
            1..=3 => Medium,
            4..=6 => Low,
            11 | 12 => MediumHigh,
            _ => High,
        },
        Territory::Baleares => match month {
            3 | 4 | 11 => Low,
            12 | 1 | 2 => Medium,
            5 | 10 => MediumHigh,
            _ => High,
        },
        Territory::Ceuta => match month {
            4..=6 => Low,
            3 | 11 | 12 => Medium,
            7 | 10 => MediumHigh,
            _ => High,
        },
        Territory::Melilla => match month {
            3..=5 => Low,
            6 | 10 | 11 => Medium,
            2 | 12 => MediumHigh,
            _ => High,
        },
    }
}

/// Weekday period for six-period tariffs.
fn six_period(territory: Territory, season: Season, hour: u32) -> usize {
    let bounds: [u32; 4] = match territory {
        Territory::Peninsula => [9, 14, 18, 22],
        Territory::Canarias | Territory::Baleares => [10, 15, 18, 22],
        Territory::Ceuta | Territory::Melilla => [10, 15, 19, 23],
    };
    // (shoulder, peak), 1-based
    let (shoulder, peak) = match (territory, season) {
        (_, Season::Low) if territory == Territory::Ceuta => (5, 3),
        (_, Season::Low) => (5, 4),
        (Territory::Canarias | Territory::Ceuta, Season::Medium) => (4, 2),
        (_, Season::Medium) => (4, 3),
        (_, Season::MediumHigh) => (3, 2),
        (Territory::Canarias, Season::High) => (3, 1),
        (Territory::Ceuta, Season::High) => (4, 1),
        (_, Season::High) => (2, 1),
    };
    let p = if hour < 8 {
        6
    } else if hour < bounds[0] {
        shoulder
    } else if hour < bounds[1] {
        peak
    } else if hour < bounds[2] {
        shoulder
    } else if hour < bounds[3] {
        peak
    } else {
        shoulder
    };
    p - 1
}

/// Weekday period for the three-period energy schedule of flat tariffs.
fn three_period(territory: Territory, hour: u32) -> usize {
    let bounds: [u32; 5] = match territory {
        Territory::Ceuta | Territory::Melilla => [8, 11, 15, 19, 23],
        _ => [8, 10, 14, 18, 22],
    };
    let p = if hour < bounds[0] {
        3
    } else if hour < bounds[1] {
        2
    } else if hour < bounds[2] {
        1
    } else if hour < bounds[3] {
        2
    } else if hour < bounds[4] {
        1
    } else {
        2
    };
    p - 1
}

fn two_period(hour: u32) -> usize {
    if hour < 8 {
        1
    } else {
        0
    }
}

/// Assignment of each step to one period, or to none for unsupported
/// tariffs.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodSchedule {
    periods: usize,
    assignment: Vec<Option<usize>>,
}

impl PeriodSchedule {
    fn empty(horizon: usize) -> Self {
        Self {
            periods: 0,
            assignment: vec![None; horizon],
        }
    }

    pub fn horizon(&self) -> usize {
        self.assignment.len()
    }

    pub fn periods(&self) -> usize {
        self.periods
    }

    pub fn period_of(&self, t: usize) -> Option<usize> {
        self.assignment.get(t).copied().flatten()
    }

    /// 0/1 membership of step `t` in period `n`.
    pub fn membership(&self, n: usize, t: usize) -> f64 {
        if self.period_of(t) == Some(n) {
            1.0
        } else {
            0.0
        }
    }

    pub fn steps_in(&self, n: usize) -> impl Iterator<Item = usize> + '_ {
        self.assignment
            .iter()
            .enumerate()
            .filter(move |(_, p)| **p == Some(n))
            .map(|(t, _)| t)
    }

    /// True when every step belongs to exactly one period.
    pub fn is_partition(&self) -> bool {
        self.periods > 0 && self.assignment.iter().all(|p| p.is_some())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TariffSchedule {
    pub code: Option<TariffCode>,
    pub power: PeriodSchedule,
    pub energy: PeriodSchedule,
}

impl TariffSchedule {
    pub fn is_flat(&self) -> bool {
        self.code.map(TariffCode::is_flat).unwrap_or(false)
    }
}

/// Encodes the tariff periods for every step. Unknown tariff codes or
/// territories yield an all-zero schedule; see [`encode_checked`].
pub fn encode(tariff: &str, territory: &str, calendar: &Calendar) -> TariffSchedule {
    let horizon = calendar.len();
    let (Ok(code), Ok(territory)) = (TariffCode::from_str(tariff), Territory::from_str(territory))
    else {
        return TariffSchedule {
            code: None,
            power: PeriodSchedule::empty(horizon),
            energy: PeriodSchedule::empty(horizon),
        };
    };

    let assign = |periods: usize, weekday: &dyn Fn(usize) -> usize| PeriodSchedule {
        periods,
        assignment: (0..horizon)
            .map(|t| {
                if calendar.step(t).is_off_day() {
                    Some(periods - 1)
                } else {
                    Some(weekday(t))
                }
            })
            .collect(),
    };

    if code.is_flat() {
        TariffSchedule {
            code: Some(code),
            power: assign(2, &|t| two_period(calendar.hour(t))),
            energy: assign(3, &|t| three_period(territory, calendar.hour(t))),
        }
    } else {
        let six = assign(6, &|t| {
            let s = season(territory, calendar.step(t).month);
            six_period(territory, s, calendar.hour(t))
        });
        TariffSchedule {
            code: Some(code),
            power: six.clone(),
            energy: six,
        }
    }
}

/// [`encode`], rejecting schedules that do not partition the horizon.
pub fn encode_checked(
    tariff: &str,
    territory: &str,
    calendar: &Calendar,
) -> Result<TariffSchedule, ModelError> {
    let schedule = encode(tariff, territory, calendar);
    if schedule.power.is_partition() && schedule.energy.is_partition() {
        Ok(schedule)
    } else {
        Err(ModelError::InvalidTariff {
            tariff: tariff.to_string(),
            territory: territory.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Weekday;
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;
    use crate::domain::CalendarStep;

    fn day(month: u32, weekday: Weekday, holiday: bool) -> Calendar {
        Calendar::new(
            (0..24)
                .map(|_| CalendarStep {
                    month,
                    weekday,
                    holiday,
                })
                .collect(),
        )
    }

    fn periods(s: &PeriodSchedule) -> Vec<usize> {
        (0..s.horizon()).map(|t| s.period_of(t).unwrap() + 1).collect()
    }

    #[test]
    fn flat_tariff_weekday_hours() {
        let s = encode("2.0TD", "peninsula", &day(1, Weekday::Wed, false));
        let power = periods(&s.power);
        assert_eq!(&power[..8], &[2; 8]);
        assert_eq!(&power[8..], &[1; 16]);

        let energy = periods(&s.energy);
        assert_eq!(energy[7], 3);
        assert_eq!(energy[8], 2);
        assert_eq!(energy[10], 1);
        assert_eq!(energy[14], 2);
        assert_eq!(energy[18], 1);
        assert_eq!(energy[22], 2);
    }

    #[test]
    fn ceuta_shifts_three_period_boundaries() {
        let s = encode("2.0TD", "ceuta", &day(1, Weekday::Wed, false));
        let energy = periods(&s.energy);
        assert_eq!(energy[10], 2);
        assert_eq!(energy[11], 1);
        assert_eq!(energy[22], 1);
        assert_eq!(energy[23], 2);
    }

    #[rstest]
    #[case("2.0TD", 2, 3)]
    #[case("3.0TD", 6, 6)]
    #[case("6.1TD", 6, 6)]
    fn off_days_use_the_last_period(#[case] code: &str, #[case] power: usize, #[case] energy: usize) {
        for cal in [day(7, Weekday::Sat, false), day(7, Weekday::Tue, true)] {
            let s = encode(code, "peninsula", &cal);
            assert!(periods(&s.power).iter().all(|p| *p == power));
            assert!(periods(&s.energy).iter().all(|p| *p == energy));
        }
    }

    #[rstest]
    #[case("peninsula", 7, [6, 2, 1, 2, 1, 2])]
    #[case("peninsula", 4, [6, 5, 4, 5, 4, 5])]
    #[case("canarias", 8, [6, 3, 1, 3, 1, 3])]
    #[case("ceuta", 1, [6, 4, 1, 4, 1, 4])]
    #[case("ceuta", 5, [6, 5, 3, 5, 3, 5])]
    #[case("melilla", 6, [6, 4, 3, 4, 3, 4])]
    #[case("baleares", 10, [6, 3, 2, 3, 2, 3])]
    fn six_period_weekday_blocks(
        #[case] territory: &str,
        #[case] month: u32,
        #[case] blocks: [usize; 6],
    ) {
        let s = encode("6.1TD", territory, &day(month, Weekday::Thu, false));
        let p = periods(&s.power);
        let t: Territory = territory.parse().unwrap();
        let bounds = match t {
            Territory::Peninsula => [9, 14, 18, 22],
            Territory::Canarias | Territory::Baleares => [10, 15, 18, 22],
            _ => [10, 15, 19, 23],
        };
        assert_eq!(p[0], blocks[0]);
        assert_eq!(p[8], blocks[1]);
        assert_eq!(p[bounds[0]], blocks[2]);
        assert_eq!(p[bounds[1]], blocks[3]);
        assert_eq!(p[bounds[2]], blocks[4]);
        assert_eq!(p[bounds[3]], blocks[5]);
    }

    #[test]
    fn unknown_codes_yield_empty_schedule_and_error() {
        let cal = day(1, Weekday::Mon, false);
        let s = encode("9.9XX", "peninsula", &cal);
        assert!(!s.power.is_partition());
        assert_eq!(s.power.membership(0, 0), 0.0);
        assert!(matches!(
            encode_checked("2.0TD", "atlantis", &cal),
            Err(ModelError::InvalidTariff { .. })
        ));
    }

    fn weekday_strategy() -> impl Strategy<Value = Weekday> {
        (0u8..7).prop_map(|d| Weekday::try_from(d).unwrap())
    }

    proptest! {
        #[test]
        fn every_step_is_in_exactly_one_period(
            steps in prop::collection::vec((1u32..=12, weekday_strategy(), any::<bool>()), 1..120),
            code in prop::sample::select(vec!["2.0TD", "3.0TD", "6.1TD", "6.2TD", "6.3TD", "6.4TD"]),
            territory in prop::sample::select(vec!["peninsula", "canarias", "baleares", "ceuta", "melilla"]),
        ) {
            let cal = Calendar::new(
                steps
                    .into_iter()
                    .map(|(month, weekday, holiday)| CalendarStep { month, weekday, holiday })
                    .collect(),
            );
            let s = encode(code, territory, &cal);
            for schedule in [&s.power, &s.energy] {
                prop_assert!(schedule.is_partition());
                for t in 0..cal.len() {
                    let total: f64 = (0..MAX_PERIODS).map(|n| schedule.membership(n, t)).sum();
                    prop_assert_eq!(total, 1.0);
                }
            }
        }
    }
}
