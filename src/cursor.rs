/*
 * The contents of this file are subject to the terms of the
 * Common Development and Distribution License, Version 1.0 only
 * (the "License").  You may not use this file except in compliance
 * with the License.
 *
 * See the file LICENSE in this distribution for details.
 * A copy of the CDDL is also available via the Internet at
 * http://www.opensource.org/licenses/cddl1.txt
 *
 * When distributing Covered Code, include this CDDL HEADER in each
 * file and include the contents of the LICENSE file from this
 * distribution.
 */

// Replay Downloader
// - cursor.rs file -

use crate::unit::SavedUnit;
use crate::week::Week;

use serde::Deserialize;
use std::{collections::HashMap, fmt};

/// Teams on bye per season and week, as far as known.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ByeSchedule(HashMap<String, HashMap<Week, usize>>);

impl ByeSchedule {
    #[cfg(test)]
    pub fn insert(&mut self, season: &str, week: Week, teams_on_bye: usize) {
        self.0
            .entry(season.to_string())
            .or_default()
            .insert(week, teams_on_bye);
    }

    pub fn teams_on_bye(&self, season: &str, week: Week) -> usize {
        self.0
            .get(season)
            .and_then(|weeks| weeks.get(&week))
            .copied()
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(HashMap::is_empty)
    }
}

/// The known season x week space the crawl walks through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeasonCalendar {
    seasons: Vec<String>,
    byes: ByeSchedule,
}

impl SeasonCalendar {
    /// `seasons` is the crawl order and must not be empty.
    pub fn new(seasons: Vec<String>, byes: ByeSchedule) -> Self {
        SeasonCalendar { seasons, byes }
    }

    pub fn seasons(&self) -> &[String] {
        &self.seasons
    }

    pub fn is_known(&self, season: &str) -> bool {
        self.seasons.iter().any(|s| s == season)
    }

    pub fn is_last_season(&self, season: &str) -> bool {
        self.seasons.last().is_some_and(|s| s == season)
    }

    pub fn first_cursor(&self) -> Cursor {
        Cursor {
            season: self.seasons.first().cloned().unwrap_or_default(),
            week: Week::first(),
        }
    }

    pub fn has_no_byes(&self) -> bool {
        self.byes.is_empty()
    }

    /// Number of (season, week) slots in the space.
    pub fn slot_count(&self) -> usize {
        self.seasons.len() * Week::ALL.len()
    }

    /// Games a week should hold, lowered by the byes known for it.
    pub fn expected_count(&self, season: &str, week: Week) -> usize {
        let byes = self.byes.teams_on_bye(season, week);
        week.default_game_count().saturating_sub(byes / 2)
    }
}

/// The (season, week) the crawl is looking at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cursor {
    pub season: String,
    pub week: Week,
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.season, self.week)
    }
}

/// Saved units per known (season, week).
pub fn count_saved<'a>(
    calendar: &SeasonCalendar,
    saved: impl IntoIterator<Item = &'a SavedUnit>,
) -> HashMap<(String, Week), usize> {
    let mut counts = HashMap::new();
    for unit in saved {
        if calendar.is_known(&unit.season) {
            *counts.entry((unit.season.clone(), unit.week)).or_insert(0) += 1;
        }
    }
    counts
}

/// Where to start looking, derived from what is already saved.
///
/// Only slots still missing games count. Of those, the latest season (by
/// year) wins and within it the earliest week. With nothing missing the
/// crawl starts over at the first season's first week. This is a heuristic:
/// the per-week diff against the site corrects a poor guess.
pub fn compute_resume_point<'a>(
    calendar: &SeasonCalendar,
    saved: impl IntoIterator<Item = &'a SavedUnit>,
) -> Cursor {
    let counts = count_saved(calendar, saved);
    let missing = |season: &str, week: Week| {
        let actual = counts
            .get(&(season.to_string(), week))
            .copied()
            .unwrap_or(0);
        actual < calendar.expected_count(season, week)
    };

    let mut best: Option<(&str, Week)> = None;
    for season in calendar.seasons() {
        let season = season.as_str();
        let Some(week) = Week::ALL.into_iter().find(|w| missing(season, *w)) else {
            continue;
        };
        match best {
            Some((leader, _)) if year(season) <= year(leader) => {}
            _ => best = Some((season, week)),
        }
    }

    match best {
        Some((season, week)) => Cursor {
            season: season.to_string(),
            week,
        },
        None => calendar.first_cursor(),
    }
}

/// The next slot in crawl order. After the last season's Super Bowl this
/// wraps to the first season's first week.
pub fn advance_week(calendar: &SeasonCalendar, current: &Cursor) -> Cursor {
    if let Some(week) = current.week.next() {
        return Cursor {
            season: current.season.clone(),
            week,
        };
    }

    let seasons = calendar.seasons();
    match seasons.iter().position(|s| *s == current.season) {
        Some(i) if i + 1 < seasons.len() => Cursor {
            season: seasons[i + 1].clone(),
            week: Week::first(),
        },
        _ => calendar.first_cursor(),
    }
}

fn year(season: &str) -> Option<u32> {
    season.trim().parse().ok()
}
