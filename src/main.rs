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
// - main.rs file -

use anyhow::Result;
use clap::Parser;
use log::{info, LevelFilter};

mod agent;
mod config;
mod cursor;
mod definitions;
mod download;
mod ffmpeg;
mod handlers;
mod ledger;
mod manifest;
mod rendition;
mod scheduler;
mod stop;
mod termination;
mod unit;
mod week;
mod ytdlp;

use config::{Args, Config};
use definitions::SiteSession;
use handlers::nflplus::NflPlusSession;
use ledger::Ledger;
use scheduler::{CrawlState, Scheduler};
use stop::StopFlag;

fn main() -> Result<()> {
    // Argument parsing:
    let args = Args::parse();

    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module(env!("CARGO_CRATE_NAME"), level)
        .parse_default_env()
        .format_timestamp_millis()
        .init();

    let config = Config::try_from(args)?;
    let crawl = &config.crawl;
    info!(
        "seasons {}, {} at {}, completion policy: {}",
        crawl.calendar.seasons().join(", "),
        crawl.rendition,
        crawl.quality,
        crawl.completion
    );

    if crawl.calendar.has_no_byes() {
        info!("no bye-week data, regular weeks expect 16 games");
    }

    // Broken sidecars stop us here, before a browser is started.
    let ledger = Ledger::load(&config.output_dir)?;
    if ledger.is_empty() {
        info!("nothing on record in {}, starting fresh", ledger.dir().display());
    } else {
        info!("{} games on record in {}", ledger.len(), ledger.dir().display());
    }

    let fetcher = config.fetcher.build(&config.downloader, config.fetch_timeout);
    info!(
        "downloading with {} ({})",
        config.fetcher.display_name(),
        config.downloader.display()
    );

    let mut session = NflPlusSession::connect(
        config.webdriver_port,
        config.headless,
        config.credentials,
        config.timeout,
    )?;
    info!("connected to the web driver, crawling {}", session.display_name());

    let stop = StopFlag::new();
    stop::watch_ctrlc(stop.clone());

    let state = CrawlState::new(ledger, &config.crawl.calendar);
    let summary = Scheduler::new(&mut session, fetcher.as_ref(), &config.crawl)
        .with_stop_flag(stop)
        .run(state)?;

    let reason = summary
        .stop_reason
        .map_or_else(|| "unknown".to_string(), |r| r.to_string());
    info!(
        "{} downloaded, {} marked unavailable, {} weeks examined ({reason})",
        summary.downloaded, summary.unavailable, summary.weeks_examined
    );
    Ok(())
}
