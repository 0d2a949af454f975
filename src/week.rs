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
// - week.rs file -

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Number of games in a full regular-season week (32 teams, nobody on bye).
pub const GAMES_PER_WEEK: usize = 16;

/// One slot of a season. The declaration order is the crawl order:
/// eighteen regular-season weeks, then the four postseason rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Week {
    Week1,
    Week2,
    Week3,
    Week4,
    Week5,
    Week6,
    Week7,
    Week8,
    Week9,
    Week10,
    Week11,
    Week12,
    Week13,
    Week14,
    Week15,
    Week16,
    Week17,
    Week18,
    WildCard,
    Divisional,
    ConferenceChampionships,
    SuperBowl,
}

const REGULAR_WEEKS: usize = 18;

const LABELS: [&str; 22] = [
    "Week 1",
    "Week 2",
    "Week 3",
    "Week 4",
    "Week 5",
    "Week 6",
    "Week 7",
    "Week 8",
    "Week 9",
    "Week 10",
    "Week 11",
    "Week 12",
    "Week 13",
    "Week 14",
    "Week 15",
    "Week 16",
    "Week 17",
    "Week 18",
    "Wild Card",
    "Divisional",
    "Conference Championships",
    "Super Bowl",
];

#[derive(Debug, thiserror::Error)]
#[error("unknown week label: {0:?}")]
pub struct UnknownWeek(pub String);

impl Week {
    pub const ALL: [Week; 22] = [
        Week::Week1,
        Week::Week2,
        Week::Week3,
        Week::Week4,
        Week::Week5,
        Week::Week6,
        Week::Week7,
        Week::Week8,
        Week::Week9,
        Week::Week10,
        Week::Week11,
        Week::Week12,
        Week::Week13,
        Week::Week14,
        Week::Week15,
        Week::Week16,
        Week::Week17,
        Week::Week18,
        Week::WildCard,
        Week::Divisional,
        Week::ConferenceChampionships,
        Week::SuperBowl,
    ];

    pub fn first() -> Week {
        Week::ALL[0]
    }

    pub fn last() -> Week {
        Week::ALL[Week::ALL.len() - 1]
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// The following week of the same season, `None` after the Super Bowl.
    pub fn next(self) -> Option<Week> {
        Week::ALL.get(self.index() + 1).copied()
    }

    pub fn is_postseason(self) -> bool {
        self.index() >= REGULAR_WEEKS
    }

    pub fn label(self) -> &'static str {
        LABELS[self.index()]
    }

    pub fn from_label(label: &str) -> Option<Week> {
        let label = label.trim();
        LABELS
            .iter()
            .position(|l| l.eq_ignore_ascii_case(label))
            .map(|i| Week::ALL[i])
    }

    // The site's own week slug: "reg-1" .. "reg-18", "post-1" .. "post-4".
    pub fn url_value(self) -> String {
        if self.is_postseason() {
            format!("post-{}", self.index() - REGULAR_WEEKS + 1)
        } else {
            format!("reg-{}", self.index() + 1)
        }
    }

    /// How many games the week holds when no bye information is known.
    pub fn default_game_count(self) -> usize {
        match self {
            Week::WildCard => 6,
            Week::Divisional => 4,
            Week::ConferenceChampionships => 2,
            Week::SuperBowl => 1,
            _ => GAMES_PER_WEEK,
        }
    }
}

impl fmt::Display for Week {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Week {
    type Err = UnknownWeek;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Week::from_label(s).ok_or_else(|| UnknownWeek(s.to_string()))
    }
}

impl TryFrom<String> for Week {
    type Error = UnknownWeek;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Week> for String {
    fn from(week: Week) -> Self {
        week.label().to_string()
    }
}
