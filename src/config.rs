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
// - config.rs file -

use crate::cursor::{ByeSchedule, SeasonCalendar};
use crate::definitions::{fetcher_names, find_fetcher, FetcherDefinition};
use crate::handlers::nflplus::Credentials;
use crate::rendition::{parse_wanted_rendition, Quality, RenditionKind};
use crate::scheduler::CrawlOptions;
use crate::termination::CompletionPolicy;

use clap::Parser;
use std::{
    env, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

#[derive(Parser)]
#[clap(
    version,
    about = "Resumable downloader for NFL+ game replays",
    long_about = "Walks the replays of the given seasons week by week and saves one \
                  rendition of every game. Progress lives in the output directory: \
                  run it again to continue where it stopped."
)]
pub struct Args {
    #[clap(long, env = "REPLAYDL_USERNAME", help = "The e-mail address of your NFL+ account")]
    pub username: String,

    #[clap(
        long,
        env = "REPLAYDL_PASSWORD",
        hide_env_values = true,
        help = "The password of your NFL+ account"
    )]
    pub password: String,

    #[clap(
        long,
        short = 'o',
        env = "REPLAYDL_OUTPUT_DIR",
        help = "Sets the directory for videos and their .json records"
    )]
    pub output: PathBuf,

    #[clap(
        long,
        env = "REPLAYDL_DOWNLOADER",
        help = "The program the fetcher runs (yt-dlp for \"ytdlp\", ffmpeg for \"hls\")"
    )]
    pub downloader: PathBuf,

    #[clap(
        long,
        env = "REPLAYDL_FETCHER",
        default_value = "ytdlp",
        help = "Sets how streams are downloaded"
    )]
    pub fetcher: String,

    #[clap(long, env = "REPLAYDL_WEBDRIVER_PORT", help = "The port of your web driver")]
    pub webdriver: u16,

    #[clap(
        long = "season",
        default_values = ["2023", "2022"],
        help = "A season to download, repeat for more (crawl order)"
    )]
    pub seasons: Vec<String>,

    #[clap(
        long,
        default_value = "all-22",
        value_parser = parse_wanted_rendition,
        help = "Sets the rendition to download (full-game, condensed, all-22)"
    )]
    pub rendition: RenditionKind,

    #[clap(long, value_enum, default_value_t = Quality::High, help = "Sets the stream resolution")]
    pub resolution: Quality,

    #[clap(long = "bye-weeks", help = "A JSON file with the teams on bye per season and week")]
    pub bye_weeks: Option<PathBuf>,

    #[clap(
        long,
        value_enum,
        default_value_t = CompletionPolicy::Schedule,
        help = "Decides when every game counts as saved"
    )]
    pub completion: CompletionPolicy,

    #[clap(long, default_value_t = 120, help = "Seconds to wait for the site before giving up")]
    pub timeout: u64,

    #[clap(
        long = "fetch-timeout",
        default_value_t = 240,
        help = "Minutes a single download may take"
    )]
    pub fetch_timeout: u64,

    #[clap(
        long = "sanity-retries",
        default_value_t = 2,
        help = "How often a rendition with an implausible length is selected again"
    )]
    pub sanity_retries: u32,

    #[clap(
        long = "retry-unavailable",
        help = "Tries games marked unavailable by earlier runs once more"
    )]
    pub retry_unavailable: bool,

    #[clap(long, help = "Runs the browser without a window")]
    pub headless: bool,

    #[clap(long, short = 'v', help = "Talks more while the crawl runs")]
    pub verbose: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("output directory {} does not exist or is not a directory", .0.display())]
    OutputDir(PathBuf),
    #[error("downloader {} not found", .0.display())]
    Downloader(PathBuf),
    #[error("unknown fetcher {name:?} (known: {})", .known.join(", "))]
    UnknownFetcher { name: String, known: Vec<&'static str> },
    #[error("a web driver port is required")]
    NoWebDriver,
    #[error("at least one season is required")]
    NoSeasons,
    #[error("season {0:?} is given twice")]
    DuplicateSeason(String),
    #[error("cannot read bye weeks from {path}: {source}")]
    ByeRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("bad bye weeks in {path}: {source}")]
    ByeFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Validated settings of one run.
pub struct Config {
    pub output_dir: PathBuf,
    pub downloader: PathBuf,
    pub fetcher: &'static dyn FetcherDefinition,
    pub webdriver_port: u16,
    pub credentials: Credentials,
    pub headless: bool,
    pub timeout: Duration,
    pub fetch_timeout: Duration,
    pub crawl: CrawlOptions,
}

impl TryFrom<Args> for Config {
    type Error = ConfigError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        if !args.output.is_dir() {
            return Err(ConfigError::OutputDir(args.output));
        }
        let downloader = resolve_executable(&args.downloader)
            .ok_or_else(|| ConfigError::Downloader(args.downloader.clone()))?;
        let fetcher = find_fetcher(&args.fetcher).ok_or_else(|| ConfigError::UnknownFetcher {
            name: args.fetcher.clone(),
            known: fetcher_names(),
        })?;
        if args.webdriver == 0 {
            return Err(ConfigError::NoWebDriver);
        }

        let seasons: Vec<String> = args.seasons.iter().map(|s| s.trim().to_string()).collect();
        if seasons.is_empty() || seasons.iter().any(String::is_empty) {
            return Err(ConfigError::NoSeasons);
        }
        for (i, season) in seasons.iter().enumerate() {
            if seasons[..i].contains(season) {
                return Err(ConfigError::DuplicateSeason(season.clone()));
            }
        }

        let byes = match &args.bye_weeks {
            Some(path) => load_bye_schedule(path)?,
            None => ByeSchedule::default(),
        };

        Ok(Config {
            output_dir: args.output,
            downloader,
            fetcher,
            webdriver_port: args.webdriver,
            credentials: Credentials {
                username: args.username,
                password: args.password,
            },
            headless: args.headless,
            timeout: Duration::from_secs(args.timeout),
            fetch_timeout: Duration::from_secs(args.fetch_timeout * 60),
            crawl: CrawlOptions {
                calendar: SeasonCalendar::new(seasons, byes),
                rendition: args.rendition,
                quality: args.resolution,
                completion: args.completion,
                sanity_retries: args.sanity_retries,
                retry_unavailable: args.retry_unavailable,
            },
        })
    }
}

/// Reads `{"2023": {"Week 5": 4}}`: teams on bye per season and week.
pub fn load_bye_schedule(path: &Path) -> Result<ByeSchedule, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::ByeRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::ByeFormat {
        path: path.to_path_buf(),
        source,
    })
}

// A bare program name is looked up on PATH, anything else must exist.
fn resolve_executable(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 || program.is_absolute() {
        return program.is_file().then(|| program.to_path_buf());
    }
    env::var_os("PATH")
        .iter()
        .flat_map(env::split_paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}
