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
// - unit.rs file -

use crate::rendition::Quality;
use crate::week::Week;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sidecar filename value that marks a unit as permanently skipped.
pub const UNAVAILABLE: &str = "UNAVAILABLE";

/// Identity of a unit. Unique within the ledger.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitKey {
    pub season: String,
    pub week: Week,
    pub away_team: String,
    pub home_team: String,
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} @ {}",
            self.season, self.week, self.away_team, self.home_team
        )
    }
}

/// A game as listed by the site for one week. Not downloaded yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailableUnit {
    pub season: String,
    pub week: Week,
    pub away_team: String,
    pub home_team: String,
    pub date: String,
}

impl AvailableUnit {
    pub fn key(&self) -> UnitKey {
        UnitKey {
            season: self.season.clone(),
            week: self.week,
            away_team: self.away_team.clone(),
            home_team: self.home_team.clone(),
        }
    }

    pub fn base_name(&self) -> String {
        slug(&format!(
            "{}-{}-{}-at-{}",
            self.season,
            self.week.url_value(),
            self.away_team,
            self.home_team
        ))
    }

    pub fn video_filename(&self) -> String {
        format!("{}.mp4", self.base_name())
    }

    pub fn sidecar_filename(&self) -> String {
        format!("{}.json", self.base_name())
    }
}

/// Where the video of a saved unit went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VideoFile {
    Unavailable,
    Saved(String),
}

impl From<String> for VideoFile {
    fn from(value: String) -> Self {
        if value == UNAVAILABLE {
            VideoFile::Unavailable
        } else {
            VideoFile::Saved(value)
        }
    }
}

impl From<VideoFile> for String {
    fn from(file: VideoFile) -> Self {
        match file {
            VideoFile::Unavailable => UNAVAILABLE.to_string(),
            VideoFile::Saved(name) => name,
        }
    }
}

/// The persisted sidecar record of a handled unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedUnit {
    pub season: String,
    pub week: Week,
    pub away_team: String,
    pub home_team: String,
    pub date: String,
    pub video_filename: VideoFile,
    pub resolution: Option<Quality>,
    // Older records carry no timestamp.
    #[serde(default)]
    pub downloaded_at: DateTime<Utc>,
}

impl SavedUnit {
    pub fn downloaded(unit: &AvailableUnit, filename: String, quality: Quality) -> Self {
        Self::from_unit(unit, VideoFile::Saved(filename), Some(quality))
    }

    pub fn unavailable(unit: &AvailableUnit) -> Self {
        Self::from_unit(unit, VideoFile::Unavailable, None)
    }

    fn from_unit(unit: &AvailableUnit, video_filename: VideoFile, resolution: Option<Quality>) -> Self {
        SavedUnit {
            season: unit.season.clone(),
            week: unit.week,
            away_team: unit.away_team.clone(),
            home_team: unit.home_team.clone(),
            date: unit.date.clone(),
            video_filename,
            resolution,
            downloaded_at: Utc::now(),
        }
    }

    pub fn key(&self) -> UnitKey {
        UnitKey {
            season: self.season.clone(),
            week: self.week,
            away_team: self.away_team.clone(),
            home_team: self.home_team.clone(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        self.video_filename == VideoFile::Unavailable
    }
}

// Lowercase, every run of non-alphanumerics collapsed into a single '-'.
pub fn slug(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}
