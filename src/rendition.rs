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
// - rendition.rs file -

use crate::manifest::StreamCandidate;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

pub const RESOLUTION_1080P: &str = "1920x1080";
pub const RESOLUTION_720P: &str = "1280x720";

/// Quality tier the crawl asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum Quality {
    #[serde(rename = "720p")]
    #[value(name = "720p")]
    Standard,
    #[serde(rename = "1080p")]
    #[value(name = "1080p")]
    High,
}

impl Quality {
    /// The literal manifest resolution this tier maps to.
    pub fn target_resolution(self) -> &'static str {
        match self {
            Quality::Standard => RESOLUTION_720P,
            Quality::High => RESOLUTION_1080P,
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quality::Standard => f.write_str("720p"),
            Quality::High => f.write_str("1080p"),
        }
    }
}

/// Picks the first stream whose resolution equals the tier's target exactly.
///
/// No fallback to a neighbouring resolution: `None` when the target is
/// missing.
pub fn select_stream(candidates: &[StreamCandidate], quality: Quality) -> Option<&str> {
    let target = quality.target_resolution();
    candidates
        .iter()
        .find(|c| c.resolution == target)
        .map(|c| c.url.as_str())
}

/// A video variant offered for a game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenditionKind {
    FullGame,
    Condensed,
    All22,
    /// A picker entry we do not know. Never matches a wanted kind.
    Unknown(String),
}

impl RenditionKind {
    pub const KNOWN: [RenditionKind; 3] = [
        RenditionKind::FullGame,
        RenditionKind::Condensed,
        RenditionKind::All22,
    ];

    pub fn from_label(label: &str) -> RenditionKind {
        let label = label.trim();
        RenditionKind::KNOWN
            .into_iter()
            .find(|k| k.label().eq_ignore_ascii_case(label))
            .unwrap_or_else(|| RenditionKind::Unknown(label.to_string()))
    }

    /// The picker label on the site.
    pub fn label(&self) -> &str {
        match self {
            RenditionKind::FullGame => "Full Game",
            RenditionKind::Condensed => "Condensed Game",
            RenditionKind::All22 => "All-22",
            RenditionKind::Unknown(label) => label,
        }
    }

    /// Same known kind. Unknown kinds fail closed.
    pub fn is(&self, wanted: &RenditionKind) -> bool {
        !matches!(self, RenditionKind::Unknown(_))
            && !matches!(wanted, RenditionKind::Unknown(_))
            && self == wanted
    }

    pub fn duration_bounds(&self) -> DurationBounds {
        const MINUTE: u64 = 60;
        match self {
            RenditionKind::Condensed => DurationBounds {
                min: None,
                max: Some(Duration::from_secs(75 * MINUTE)),
            },
            RenditionKind::FullGame => DurationBounds {
                min: Some(Duration::from_secs(90 * MINUTE)),
                max: None,
            },
            RenditionKind::All22 => DurationBounds {
                min: Some(Duration::from_secs(20 * MINUTE)),
                max: None,
            },
            RenditionKind::Unknown(_) => DurationBounds::default(),
        }
    }
}

impl fmt::Display for RenditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Command line form of a wanted rendition: "full-game", "condensed",
/// "all-22" or the site label itself.
pub fn parse_wanted_rendition(arg: &str) -> Result<RenditionKind, String> {
    let kind = match arg.trim().to_ascii_lowercase().as_str() {
        "full-game" | "full" => RenditionKind::FullGame,
        "condensed" => RenditionKind::Condensed,
        "all-22" | "all22" => RenditionKind::All22,
        _ => RenditionKind::from_label(arg),
    };
    match kind {
        RenditionKind::Unknown(label) => Err(format!(
            "unknown rendition {label:?} (expected full-game, condensed or all-22)"
        )),
        kind => Ok(kind),
    }
}

/// One entry of a game's rendition picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenditionOption {
    pub kind: RenditionKind,
    pub selected: bool,
}

/// Plausible playing time of a rendition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DurationBounds {
    pub min: Option<Duration>,
    pub max: Option<Duration>,
}

impl DurationBounds {
    pub fn contains(&self, duration: Duration) -> bool {
        self.min.map_or(true, |min| duration >= min) && self.max.map_or(true, |max| duration <= max)
    }
}

/// Parses a player clock like "2:41:07" or "47:12".
pub fn parse_clock(text: &str) -> Option<Duration> {
    let mut seconds = 0u64;
    let mut parts = 0;
    for part in text.trim().split(':') {
        seconds = seconds
            .checked_mul(60)?
            .checked_add(part.parse::<u64>().ok()?)?;
        parts += 1;
    }
    (2..=3).contains(&parts).then(|| Duration::from_secs(seconds))
}
