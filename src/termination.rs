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
// - termination.rs file -

use crate::cursor::{count_saved, SeasonCalendar};
use crate::unit::SavedUnit;
use crate::week::{Week, GAMES_PER_WEEK};

use clap::ValueEnum;
use std::fmt;

/// How "every game is saved" is decided.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum CompletionPolicy {
    /// Every week holds at least its expected count, byes and the smaller
    /// postseason rounds included. Same counts as the resume cursor.
    #[default]
    Schedule,
    /// Total count reaches seasons x weeks x 16. Never fires for a real
    /// season, where byes and the postseason hold fewer games.
    Uniform,
}

impl fmt::Display for CompletionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionPolicy::Schedule => f.write_str("schedule"),
            CompletionPolicy::Uniform => f.write_str("uniform"),
        }
    }
}

/// True once the ledger covers the whole known season x week space.
/// Sidecars of seasons outside the calendar are not counted.
pub fn is_complete<'a>(
    policy: CompletionPolicy,
    calendar: &SeasonCalendar,
    saved: impl IntoIterator<Item = &'a SavedUnit>,
) -> bool {
    let counts = count_saved(calendar, saved);
    match policy {
        CompletionPolicy::Uniform => {
            let total: usize = counts.values().sum();
            total >= calendar.seasons().len() * Week::ALL.len() * GAMES_PER_WEEK
        }
        CompletionPolicy::Schedule => calendar.seasons().iter().all(|season| {
            Week::ALL.into_iter().all(|week| {
                let actual = counts.get(&(season.clone(), week)).copied().unwrap_or(0);
                actual >= calendar.expected_count(season, week)
            })
        }),
    }
}
