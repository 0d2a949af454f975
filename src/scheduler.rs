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
// - scheduler.rs file -

use crate::cursor::{advance_week, compute_resume_point, Cursor, SeasonCalendar};
use crate::definitions::{FetchError, ManifestResponse, MediaFetch, SessionError, SiteSession};
use crate::ledger::Ledger;
use crate::manifest::parse_manifest;
use crate::rendition::{select_stream, Quality, RenditionKind, RenditionOption};
use crate::stop::StopFlag;
use crate::termination::{is_complete, CompletionPolicy};
use crate::unit::{AvailableUnit, SavedUnit, UnitKey};
use crate::week::Week;

use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use std::{collections::HashSet, fmt, fs, io, path::PathBuf, time::Duration};
use url::Url;

/// What the crawl is after and when it may stop.
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub calendar: SeasonCalendar,
    pub rendition: RenditionKind,
    pub quality: Quality,
    pub completion: CompletionPolicy,
    /// How often a rendition with an implausible length is selected again.
    pub sanity_retries: u32,
    /// Attempt units marked unavailable by earlier runs once more.
    pub retry_unavailable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The ledger covers the whole calendar.
    Complete,
    /// A full pass over the calendar found nothing left to try.
    IdlePass,
    /// Ctrl-C.
    Stopped,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Complete => f.write_str("every game is saved"),
            StopReason::IdlePass => f.write_str("a full pass found nothing new"),
            StopReason::Stopped => f.write_str("stopped by the user"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    LoggingIn,
    ListingWeek,
    SelectingUnit(AvailableUnit),
    FetchingRendition {
        unit: AvailableUnit,
        stream_url: String,
    },
    Advancing,
    Done(StopReason),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub downloaded: usize,
    pub unavailable: usize,
    pub weeks_examined: usize,
    pub stop_reason: Option<StopReason>,
}

/// Everything the crawl knows between two steps. Owned by the driver loop
/// and handed from step to step.
#[derive(Debug)]
pub struct CrawlState {
    pub phase: Phase,
    pub cursor: Cursor,
    pub ledger: Ledger,
    /// Weeks advanced over since the last attempted unit.
    pub idle_weeks: usize,
    /// Units tried during this run, whatever the outcome.
    pub attempted: HashSet<UnitKey>,
    pub summary: CrawlSummary,
}

impl CrawlState {
    pub fn new(ledger: Ledger, calendar: &SeasonCalendar) -> Self {
        CrawlState {
            phase: Phase::LoggingIn,
            cursor: calendar.first_cursor(),
            ledger,
            idle_weeks: 0,
            attempted: HashSet::new(),
            summary: CrawlSummary::default(),
        }
    }
}

/// Why a single unit was given up on. Never stops the crawl by itself.
#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    #[error("no {0} rendition offered")]
    RenditionMissing(RenditionKind),
    #[error("manifest {0} lists no streams")]
    ManifestUnavailable(String),
    #[error("no {quality} stream ({target}) among {offered:?}")]
    ResolutionMissing {
        quality: Quality,
        target: &'static str,
        offered: Vec<String>,
    },
    #[error("{kind} plays for {} minutes, outside its expected length", .duration.as_secs() / 60)]
    DurationOutOfBounds {
        kind: RenditionKind,
        duration: Duration,
    },
    #[error("cannot remove stale video {path}: {source}")]
    StaleVideo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Walks the calendar one unit at a time, strictly sequentially.
pub struct Scheduler<'a> {
    session: &'a mut dyn SiteSession,
    fetcher: &'a dyn MediaFetch,
    options: &'a CrawlOptions,
    stop: StopFlag,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        session: &'a mut dyn SiteSession,
        fetcher: &'a dyn MediaFetch,
        options: &'a CrawlOptions,
    ) -> Self {
        Scheduler {
            session,
            fetcher,
            options,
            stop: StopFlag::new(),
        }
    }

    pub fn with_stop_flag(mut self, stop: StopFlag) -> Self {
        self.stop = stop;
        self
    }

    /// Drives `state` until `Done`, then ends the site session whatever the
    /// outcome. Errors returned here are systemic.
    pub fn run(&mut self, state: CrawlState) -> Result<CrawlSummary> {
        let outcome = self.drive(state);
        if let Err(err) = self.session.close() {
            warn!("could not close the {} session: {err}", self.session.display_name());
        }
        outcome
    }

    fn drive(&mut self, mut state: CrawlState) -> Result<CrawlSummary> {
        loop {
            if let Phase::Done(reason) = state.phase {
                info!("crawl finished: {reason}");
                let mut summary = state.summary;
                summary.stop_reason = Some(reason);
                return Ok(summary);
            }
            state = self.step(state)?;
        }
    }

    /// Performs one transition of the crawl state machine.
    pub fn step(&mut self, mut state: CrawlState) -> Result<CrawlState> {
        let phase = std::mem::replace(&mut state.phase, Phase::ListingWeek);
        let next = match phase {
            Phase::LoggingIn => self.log_in(&mut state)?,
            Phase::ListingWeek => self.list_week(&mut state)?,
            Phase::SelectingUnit(unit) => self.select_unit(&mut state, unit)?,
            Phase::FetchingRendition { unit, stream_url } => {
                self.fetch_unit(&mut state, unit, &stream_url)?
            }
            Phase::Advancing => self.advance(&mut state),
            Phase::Done(reason) => Phase::Done(reason),
        };
        state.phase = next;
        Ok(state)
    }

    fn log_in(&mut self, state: &mut CrawlState) -> Result<Phase> {
        let site = self.session.display_name();
        info!("login to {site}");
        self.session
            .log_in()
            .with_context(|| format!("could not sign in to {site}"))?;

        let auth = self
            .session
            .auth_state()
            .with_context(|| format!("could not confirm the {site} login"))?;
        if !auth.is_logged_in {
            return Err(anyhow!("{site} still shows the sign-in link after login"));
        }

        state.ledger.reload()?;
        state.cursor = compute_resume_point(&self.options.calendar, state.ledger.all());
        info!(
            "{} games on record, resuming at {}",
            state.ledger.len(),
            state.cursor
        );
        Ok(Phase::ListingWeek)
    }

    fn list_week(&mut self, state: &mut CrawlState) -> Result<Phase> {
        // Other processes or a crash may have touched the directory since
        // the last step.
        state.ledger.reload()?;

        if self.stop.is_requested() {
            return Ok(Phase::Done(StopReason::Stopped));
        }
        if is_complete(
            self.options.completion,
            &self.options.calendar,
            state.ledger.all(),
        ) {
            return Ok(Phase::Done(StopReason::Complete));
        }
        if state.idle_weeks >= self.options.calendar.slot_count() {
            return Ok(Phase::Done(StopReason::IdlePass));
        }

        let Cursor { season, week } = &state.cursor;
        info!("navigate to {}", state.cursor);
        let units = match self.session.list_units_for_week(season, *week) {
            Ok(units) => units,
            Err(err) if err.is_systemic() => {
                return Err(err)
                    .with_context(|| format!("could not list the games of {}", state.cursor));
            }
            Err(err) => {
                warn!("could not list the games of {}, moving on: {err}", state.cursor);
                return Ok(Phase::Advancing);
            }
        };
        info!("{} games listed for {}", units.len(), state.cursor);

        match units.into_iter().find(|unit| self.is_pending(state, unit)) {
            Some(unit) => {
                state.idle_weeks = 0;
                state.attempted.insert(unit.key());
                Ok(Phase::SelectingUnit(unit))
            }
            None => {
                info!("no more games to download for {}", state.cursor);
                Ok(Phase::Advancing)
            }
        }
    }

    fn is_pending(&self, state: &CrawlState, unit: &AvailableUnit) -> bool {
        let key = unit.key();
        if !state.ledger.contains(&key) {
            return true;
        }
        self.options.retry_unavailable
            && !state.attempted.contains(&key)
            && state.ledger.get(&key).is_some_and(SavedUnit::is_unavailable)
    }

    fn select_unit(&mut self, state: &mut CrawlState, unit: AvailableUnit) -> Result<Phase> {
        match self.find_stream(&unit) {
            Ok(stream_url) => Ok(Phase::FetchingRendition { unit, stream_url }),
            Err(UnitError::Session(err)) if err.is_systemic() => {
                Err(err).with_context(|| format!("lost the session while opening {}", unit.key()))
            }
            Err(err) => {
                self.give_up(state, &unit, &err)?;
                Ok(Phase::ListingWeek)
            }
        }
    }

    /// Opens the unit and returns the URL of the wanted stream.
    fn find_stream(&mut self, unit: &AvailableUnit) -> Result<String, UnitError> {
        info!("opening {}", unit.key());
        self.session.navigate_to_unit(unit)?;

        let wanted = &self.options.rendition;
        let renditions = self.session.list_renditions()?;
        debug!("{} renditions offered for {}", renditions.len(), unit.key());
        if !renditions.iter().any(|r| r.kind.is(wanted)) {
            return Err(UnitError::RenditionMissing(wanted.clone()));
        }

        let manifest = self.capture_manifest(&renditions, self.options.sanity_retries)?;
        let streams = parse_manifest(&manifest.text);
        if streams.is_empty() {
            return Err(UnitError::ManifestUnavailable(manifest.url));
        }

        let quality = self.options.quality;
        let url = select_stream(&streams, quality).ok_or_else(|| UnitError::ResolutionMissing {
            quality,
            target: quality.target_resolution(),
            offered: streams.iter().map(|s| s.resolution.clone()).collect(),
        })?;
        Ok(resolve(&manifest.url, url))
    }

    /// Selects the wanted rendition and checks its length. Implausible
    /// lengths are retried by switching away and back, at most
    /// `retries_left` times.
    fn capture_manifest(
        &mut self,
        renditions: &[RenditionOption],
        mut retries_left: u32,
    ) -> Result<ManifestResponse, UnitError> {
        let wanted = &self.options.rendition;
        let bounds = wanted.duration_bounds();
        let detour = renditions
            .iter()
            .map(|r| &r.kind)
            .find(|kind| !kind.is(wanted) && !matches!(kind, RenditionKind::Unknown(_)));

        loop {
            self.session.select_rendition(wanted)?;
            let manifest = self.session.await_manifest_response()?;

            let duration = match self.session.video_duration()? {
                Some(duration) if !bounds.contains(duration) => duration,
                _ => return Ok(manifest),
            };

            if retries_left == 0 {
                return Err(UnitError::DurationOutOfBounds {
                    kind: wanted.clone(),
                    duration,
                });
            }
            retries_left -= 1;
            warn!(
                "{wanted} plays for {} minutes, selecting it again ({retries_left} retries left)",
                duration.as_secs() / 60
            );
            if let Some(other) = detour {
                self.session.select_rendition(other)?;
            }
        }
    }

    fn fetch_unit(
        &mut self,
        state: &mut CrawlState,
        unit: AvailableUnit,
        stream_url: &str,
    ) -> Result<Phase> {
        match self.download(state, &unit, stream_url) {
            Ok(()) => {
                state.ledger.record_downloaded(
                    &unit,
                    unit.video_filename(),
                    self.options.quality,
                )?;
                state.summary.downloaded += 1;
            }
            // The interrupt may have reached the downloader too. Leave the
            // unit without a record so the next run picks it up.
            Err(err) if self.stop.is_requested() => {
                warn!("{} interrupted, leaving it for the next run: {err}", unit.key());
            }
            Err(err) => self.give_up(state, &unit, &err)?,
        }
        Ok(Phase::ListingWeek)
    }

    fn download(
        &self,
        state: &CrawlState,
        unit: &AvailableUnit,
        stream_url: &str,
    ) -> Result<(), UnitError> {
        let path = state.ledger.video_path(unit);

        // Without a sidecar any existing video is a leftover of an
        // interrupted download.
        if path.exists() {
            info!("video exists, deleting and redownloading: {}", path.display());
            fs::remove_file(&path).map_err(|source| UnitError::StaleVideo {
                path: path.clone(),
                source,
            })?;
        }

        info!("downloading {} to {}", unit.key(), path.display());
        self.fetcher.fetch(stream_url, &path)?;
        info!("download complete: {}", unit.key());
        Ok(())
    }

    fn give_up(&self, state: &mut CrawlState, unit: &AvailableUnit, err: &UnitError) -> Result<()> {
        warn!("skipping {}: {err}", unit.key());
        state.ledger.record_unavailable(unit)?;
        state.summary.unavailable += 1;
        Ok(())
    }

    fn advance(&mut self, state: &mut CrawlState) -> Phase {
        let calendar = &self.options.calendar;
        let next = advance_week(calendar, &state.cursor);
        if state.cursor.week == Week::last() && calendar.is_last_season(&state.cursor.season) {
            info!("reached the end of {}, wrapping around to {next}", state.cursor);
        } else {
            info!("moving on to {next}");
        }
        state.cursor = next;
        state.idle_weeks += 1;
        state.summary.weeks_examined += 1;
        Phase::ListingWeek
    }
}

// Variant URLs may be relative to the master manifest.
fn resolve(manifest_url: &str, stream_url: &str) -> String {
    Url::parse(manifest_url)
        .and_then(|base| base.join(stream_url))
        .map(String::from)
        .unwrap_or_else(|_| stream_url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::ByeSchedule;
    use crate::definitions::AuthState;
    use crate::unit::VideoFile;

    use std::{
        cell::RefCell,
        collections::{HashMap, VecDeque},
        path::Path,
    };
    use tempfile::TempDir;

    const MANIFEST: &str = "#EXTM3U\n\
        #EXT-X-STREAM-INF:BANDWIDTH=6000000,RESOLUTION=1920x1080\n\
        1080/index.m3u8?token=abc\n\
        #EXT-X-STREAM-INF:BANDWIDTH=3000000,RESOLUTION=1280x720\n\
        720/index.m3u8?token=abc\n";

    const MANIFEST_720_ONLY: &str = "#EXTM3U\n\
        #EXT-X-STREAM-INF:BANDWIDTH=3000000,RESOLUTION=1280x720\n\
        https://cdn.example.com/720/index.m3u8\n";

    fn game(week: Week, away: &str, home: &str) -> AvailableUnit {
        AvailableUnit {
            season: "2023".to_string(),
            week,
            away_team: away.to_string(),
            home_team: home.to_string(),
            date: "Sep 10".to_string(),
        }
    }

    #[derive(Default)]
    struct MockSite {
        weeks: HashMap<Week, Vec<AvailableUnit>>,
        renditions: HashMap<UnitKey, Vec<RenditionKind>>,
        manifests: HashMap<UnitKey, String>,
        durations: HashMap<UnitKey, VecDeque<Duration>>,
        failing_navigation: HashMap<UnitKey, fn() -> SessionError>,
        failing_weeks: HashMap<Week, fn() -> SessionError>,
        login_fails: bool,
        current: Option<AvailableUnit>,
        armed: bool,
        calls: Vec<String>,
        closed: bool,
    }

    impl MockSite {
        fn new(units: &[AvailableUnit]) -> Self {
            let mut site = MockSite::default();
            for unit in units {
                site.weeks.entry(unit.week).or_default().push(unit.clone());
            }
            site
        }

        fn current_key(&self) -> Result<UnitKey, SessionError> {
            self.current
                .as_ref()
                .map(AvailableUnit::key)
                .ok_or_else(|| SessionError::Page("no game open".to_string()))
        }

        fn offered(&self, key: &UnitKey) -> Vec<RenditionKind> {
            self.renditions
                .get(key)
                .cloned()
                .unwrap_or_else(|| vec![RenditionKind::FullGame, RenditionKind::All22])
        }
    }

    impl SiteSession for MockSite {
        fn log_in(&mut self) -> Result<(), SessionError> {
            self.calls.push("login".to_string());
            if self.login_fails {
                return Err(SessionError::NotSignedIn("wrong password".to_string()));
            }
            Ok(())
        }

        fn auth_state(&mut self) -> Result<AuthState, SessionError> {
            Ok(AuthState { is_logged_in: true })
        }

        fn list_units_for_week(
            &mut self,
            season: &str,
            week: Week,
        ) -> Result<Vec<AvailableUnit>, SessionError> {
            self.calls.push(format!("list {season} {week}"));
            if let Some(fail) = self.failing_weeks.get(&week) {
                return Err(fail());
            }
            Ok(self.weeks.get(&week).cloned().unwrap_or_default())
        }

        fn navigate_to_unit(&mut self, unit: &AvailableUnit) -> Result<(), SessionError> {
            self.calls.push(format!("open {}", unit.away_team));
            if let Some(fail) = self.failing_navigation.get(&unit.key()) {
                return Err(fail());
            }
            self.current = Some(unit.clone());
            Ok(())
        }

        fn list_renditions(&mut self) -> Result<Vec<RenditionOption>, SessionError> {
            let key = self.current_key()?;
            Ok(self
                .offered(&key)
                .into_iter()
                .enumerate()
                .map(|(i, kind)| RenditionOption {
                    kind,
                    selected: i == 0,
                })
                .collect())
        }

        fn select_rendition(&mut self, kind: &RenditionKind) -> Result<(), SessionError> {
            let key = self.current_key()?;
            self.calls.push(format!("select {kind}"));
            if !self.offered(&key).iter().any(|k| k.is(kind)) {
                return Err(SessionError::Page(format!("{kind} not in the picker")));
            }
            self.armed = true;
            Ok(())
        }

        fn await_manifest_response(&mut self) -> Result<ManifestResponse, SessionError> {
            let key = self.current_key()?;
            if !std::mem::take(&mut self.armed) {
                return Err(SessionError::Timeout("master.m3u8".to_string()));
            }
            match self.manifests.get(&key) {
                Some(text) if text.is_empty() => {
                    Err(SessionError::Timeout("master.m3u8".to_string()))
                }
                Some(text) => Ok(ManifestResponse {
                    url: "https://cdn.example.com/master.m3u8".to_string(),
                    text: text.clone(),
                }),
                None => Ok(ManifestResponse {
                    url: "https://cdn.example.com/master.m3u8".to_string(),
                    text: MANIFEST.to_string(),
                }),
            }
        }

        fn video_duration(&mut self) -> Result<Option<Duration>, SessionError> {
            let key = self.current_key()?;
            Ok(self.durations.get_mut(&key).and_then(VecDeque::pop_front))
        }

        fn close(&mut self) -> Result<(), SessionError> {
            self.closed = true;
            Ok(())
        }

        fn display_name(&self) -> String {
            "mock".to_string()
        }
    }

    #[derive(Default)]
    struct MockFetch {
        fetched: RefCell<Vec<(String, PathBuf)>>,
        failing: Vec<String>,
        saw_stale_file: RefCell<bool>,
        // Raised as if Ctrl-C hit during the download, which then fails.
        interrupts: Option<StopFlag>,
    }

    impl MediaFetch for MockFetch {
        fn fetch(&self, stream_url: &str, output: &Path) -> Result<(), FetchError> {
            if output.exists() {
                *self.saw_stale_file.borrow_mut() = true;
            }
            self.fetched
                .borrow_mut()
                .push((stream_url.to_string(), output.to_path_buf()));
            if let Some(stop) = &self.interrupts {
                stop.request();
                fs::write(output, b"half a vid").map_err(|source| FetchError::Io {
                    path: output.to_path_buf(),
                    source,
                })?;
                return Err(FetchError::Http {
                    url: stream_url.to_string(),
                    reason: "interrupted".to_string(),
                });
            }
            if self.failing.iter().any(|f| stream_url.contains(f.as_str())) {
                return Err(FetchError::Http {
                    url: stream_url.to_string(),
                    reason: "connection reset".to_string(),
                });
            }
            fs::write(output, b"video").map_err(|source| FetchError::Io {
                path: output.to_path_buf(),
                source,
            })
        }
    }

    fn options() -> CrawlOptions {
        CrawlOptions {
            calendar: SeasonCalendar::new(vec!["2023".to_string()], ByeSchedule::default()),
            rendition: RenditionKind::All22,
            quality: Quality::High,
            completion: CompletionPolicy::Schedule,
            sanity_retries: 1,
            retry_unavailable: false,
        }
    }

    fn crawl(
        dir: &Path,
        site: &mut MockSite,
        fetch: &MockFetch,
        options: &CrawlOptions,
    ) -> Result<CrawlSummary> {
        let state = CrawlState::new(Ledger::load(dir)?, &options.calendar);
        Scheduler::new(site, fetch, options).run(state)
    }

    fn sidecar_count(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .path()
                    .extension()
                    .is_some_and(|x| x == "json")
            })
            .count()
    }

    fn two_weeks() -> Vec<AvailableUnit> {
        vec![
            game(Week::Week1, "Lions", "Chiefs"),
            game(Week::Week1, "Packers", "Bears"),
            game(Week::Week2, "Bears", "Buccaneers"),
        ]
    }

    #[test]
    fn downloads_every_listed_game_in_site_order() {
        let tmp = TempDir::new().unwrap();
        let mut site = MockSite::new(&two_weeks());
        let fetch = MockFetch::default();

        let summary = crawl(tmp.path(), &mut site, &fetch, &options()).unwrap();

        assert_eq!(summary.downloaded, 3);
        assert_eq!(summary.unavailable, 0);
        assert_eq!(summary.stop_reason, Some(StopReason::IdlePass));
        assert!(site.closed);

        let opened: Vec<&str> = site
            .calls
            .iter()
            .filter_map(|c| c.strip_prefix("open "))
            .collect();
        assert_eq!(opened, ["Lions", "Packers", "Bears"]);

        let fetched = fetch.fetched.borrow();
        assert_eq!(
            fetched[0].0,
            "https://cdn.example.com/1080/index.m3u8?token=abc"
        );
        assert_eq!(
            fetched[0].1,
            tmp.path().join("2023-reg-1-lions-at-chiefs.mp4")
        );

        let ledger = Ledger::load(tmp.path()).unwrap();
        assert_eq!(ledger.len(), 3);
        assert!(ledger.all().all(|u| !u.is_unavailable()));
    }

    #[test]
    fn second_run_downloads_nothing_again() {
        let tmp = TempDir::new().unwrap();
        crawl(
            tmp.path(),
            &mut MockSite::new(&two_weeks()),
            &MockFetch::default(),
            &options(),
        )
        .unwrap();

        let fetch = MockFetch::default();
        let summary = crawl(
            tmp.path(),
            &mut MockSite::new(&two_weeks()),
            &fetch,
            &options(),
        )
        .unwrap();

        assert_eq!(summary.downloaded, 0);
        assert!(fetch.fetched.borrow().is_empty());
        assert_eq!(sidecar_count(tmp.path()), 3);
    }

    #[test]
    fn missing_rendition_marks_unavailable_and_stays_on_the_week() {
        let tmp = TempDir::new().unwrap();
        let units = two_weeks();
        let mut site = MockSite::new(&units);
        site.renditions
            .insert(units[0].key(), vec![RenditionKind::FullGame]);

        let summary = crawl(tmp.path(), &mut site, &MockFetch::default(), &options()).unwrap();

        assert_eq!(summary.unavailable, 1);
        assert_eq!(summary.downloaded, 2);
        let ledger = Ledger::load(tmp.path()).unwrap();
        assert!(ledger.get(&units[0].key()).unwrap().is_unavailable());

        // Week 1 is listed again right after the skip.
        let after_skip = site
            .calls
            .iter()
            .skip_while(|c| *c != "open Lions")
            .nth(1)
            .unwrap();
        assert_eq!(after_skip, "list 2023 Week 1");
    }

    #[test]
    fn unknown_picker_entries_never_match() {
        let tmp = TempDir::new().unwrap();
        let units = vec![game(Week::Week1, "Lions", "Chiefs")];
        let mut site = MockSite::new(&units);
        site.renditions.insert(
            units[0].key(),
            vec![RenditionKind::Unknown("All-22 (beta)".to_string())],
        );

        let summary = crawl(tmp.path(), &mut site, &MockFetch::default(), &options()).unwrap();
        assert_eq!(summary.unavailable, 1);
        assert!(!site.calls.iter().any(|c| c.starts_with("select")));
    }

    #[test]
    fn missing_resolution_marks_unavailable() {
        let tmp = TempDir::new().unwrap();
        let units = vec![game(Week::Week1, "Lions", "Chiefs")];
        let mut site = MockSite::new(&units);
        site.manifests
            .insert(units[0].key(), MANIFEST_720_ONLY.to_string());
        let fetch = MockFetch::default();

        let summary = crawl(tmp.path(), &mut site, &fetch, &options()).unwrap();

        assert_eq!(summary.unavailable, 1);
        assert!(fetch.fetched.borrow().is_empty());

        let standard = CrawlOptions {
            quality: Quality::Standard,
            retry_unavailable: true,
            ..options()
        };
        let summary = crawl(tmp.path(), &mut site, &fetch, &standard).unwrap();
        assert_eq!(summary.downloaded, 1);
        assert_eq!(
            fetch.fetched.borrow()[0].0,
            "https://cdn.example.com/720/index.m3u8"
        );
    }

    #[test]
    fn manifest_timeout_marks_unavailable() {
        let tmp = TempDir::new().unwrap();
        let units = vec![game(Week::Week1, "Lions", "Chiefs")];
        let mut site = MockSite::new(&units);
        site.manifests.insert(units[0].key(), String::new());

        let summary = crawl(tmp.path(), &mut site, &MockFetch::default(), &options()).unwrap();
        assert_eq!(summary.unavailable, 1);
    }

    #[test]
    fn fetch_failure_is_final_for_the_run() {
        let tmp = TempDir::new().unwrap();
        let units = two_weeks();
        let mut site = MockSite::new(&units);
        site.manifests.insert(
            units[1].key(),
            MANIFEST.replace("1080/index", "broken/index"),
        );
        let fetch = MockFetch {
            failing: vec!["broken".to_string()],
            ..MockFetch::default()
        };

        let summary = crawl(tmp.path(), &mut site, &fetch, &options()).unwrap();

        assert_eq!(summary.downloaded, 2);
        assert_eq!(summary.unavailable, 1);
        let broken_attempts = fetch
            .fetched
            .borrow()
            .iter()
            .filter(|(url, _)| url.contains("broken"))
            .count();
        assert_eq!(broken_attempts, 1);
    }

    #[test]
    fn unavailable_unit_is_downloaded_on_a_later_retry_run() {
        let tmp = TempDir::new().unwrap();
        let units = vec![game(Week::Week1, "Lions", "Chiefs")];
        let mut site = MockSite::new(&units);
        site.manifests.insert(units[0].key(), String::new());
        crawl(tmp.path(), &mut site, &MockFetch::default(), &options()).unwrap();

        let before = Ledger::load(tmp.path()).unwrap();
        let marked = before.get(&units[0].key()).unwrap().clone();
        assert_eq!(marked.video_filename, VideoFile::Unavailable);

        // Without the retry option the unit stays skipped.
        let mut fixed = MockSite::new(&units);
        let fetch = MockFetch::default();
        crawl(tmp.path(), &mut fixed, &fetch, &options()).unwrap();
        assert!(fetch.fetched.borrow().is_empty());

        let retry = CrawlOptions {
            retry_unavailable: true,
            ..options()
        };
        let summary = crawl(tmp.path(), &mut fixed, &fetch, &retry).unwrap();
        assert_eq!(summary.downloaded, 1);

        let after = Ledger::load(tmp.path()).unwrap();
        let saved: &SavedUnit = after.get(&units[0].key()).unwrap();
        assert_eq!(
            saved.video_filename,
            VideoFile::Saved("2023-reg-1-lions-at-chiefs.mp4".to_string())
        );
        assert!(saved.downloaded_at >= marked.downloaded_at);
        assert_eq!(sidecar_count(tmp.path()), 1);
    }

    #[test]
    fn retry_run_tries_each_unavailable_unit_once() {
        let tmp = TempDir::new().unwrap();
        let units = vec![game(Week::Week1, "Lions", "Chiefs")];
        let mut site = MockSite::new(&units);
        site.manifests.insert(units[0].key(), String::new());
        let retry = CrawlOptions {
            retry_unavailable: true,
            ..options()
        };

        crawl(tmp.path(), &mut site, &MockFetch::default(), &options()).unwrap();
        site.calls.clear();
        let summary = crawl(tmp.path(), &mut site, &MockFetch::default(), &retry).unwrap();

        assert_eq!(summary.unavailable, 1);
        assert_eq!(summary.stop_reason, Some(StopReason::IdlePass));
        let opened = site.calls.iter().filter(|c| c.starts_with("open")).count();
        assert_eq!(opened, 1);
    }

    #[test]
    fn implausible_length_is_reselected_within_budget() {
        let tmp = TempDir::new().unwrap();
        let units = vec![
            game(Week::Week1, "Lions", "Chiefs"),
            game(Week::Week1, "Packers", "Bears"),
        ];
        let mut site = MockSite::new(&units);
        site.durations.insert(
            units[0].key(),
            VecDeque::from([Duration::from_secs(5 * 60), Duration::from_secs(70 * 60)]),
        );
        site.durations.insert(
            units[1].key(),
            VecDeque::from([Duration::from_secs(5 * 60), Duration::from_secs(6 * 60)]),
        );

        let summary = crawl(tmp.path(), &mut site, &MockFetch::default(), &options()).unwrap();

        assert_eq!(summary.downloaded, 1);
        assert_eq!(summary.unavailable, 1);
        let ledger = Ledger::load(tmp.path()).unwrap();
        assert!(!ledger.get(&units[0].key()).unwrap().is_unavailable());
        assert!(ledger.get(&units[1].key()).unwrap().is_unavailable());

        let selections: Vec<&str> = site
            .calls
            .iter()
            .skip_while(|c| *c != "open Lions")
            .take_while(|c| *c != "open Packers")
            .filter_map(|c| c.strip_prefix("select "))
            .collect();
        assert_eq!(selections, ["All-22", "Full Game", "All-22"]);
    }

    #[test]
    fn login_failure_halts_the_crawl() {
        let tmp = TempDir::new().unwrap();
        let mut site = MockSite::new(&two_weeks());
        site.login_fails = true;

        let err = crawl(tmp.path(), &mut site, &MockFetch::default(), &options()).unwrap_err();

        assert!(format!("{err:#}").contains("wrong password"));
        assert!(site.closed);
        assert_eq!(sidecar_count(tmp.path()), 0);
    }

    #[test]
    fn lost_login_mid_crawl_is_systemic() {
        let tmp = TempDir::new().unwrap();
        let units = two_weeks();
        let mut site = MockSite::new(&units);
        site.failing_navigation.insert(units[1].key(), || {
            SessionError::NotSignedIn("profile marker gone".to_string())
        });

        let err = crawl(tmp.path(), &mut site, &MockFetch::default(), &options()).unwrap_err();

        assert!(format!("{err:#}").contains("profile marker gone"));
        let ledger = Ledger::load(tmp.path()).unwrap();
        assert_eq!(ledger.len(), 1);
        assert!(ledger.get(&units[1].key()).is_none());
    }

    #[test]
    fn navigation_timeout_is_per_unit() {
        let tmp = TempDir::new().unwrap();
        let units = two_weeks();
        let mut site = MockSite::new(&units);
        site.failing_navigation.insert(units[1].key(), || {
            SessionError::Timeout("game page".to_string())
        });

        let summary = crawl(tmp.path(), &mut site, &MockFetch::default(), &options()).unwrap();
        assert_eq!(summary.downloaded, 2);
        assert_eq!(summary.unavailable, 1);
    }

    #[test]
    fn week_listing_timeout_moves_on_to_the_next_week() {
        let tmp = TempDir::new().unwrap();
        let units = vec![
            game(Week::Week1, "Lions", "Chiefs"),
            game(Week::Week3, "Colts", "Ravens"),
        ];
        let mut site = MockSite::new(&units);
        site.failing_weeks.insert(Week::Week2, || {
            SessionError::Timeout("the Week 2 replays".to_string())
        });

        let summary = crawl(tmp.path(), &mut site, &MockFetch::default(), &options()).unwrap();

        assert_eq!(summary.downloaded, 2);
        assert_eq!(summary.unavailable, 0);
        let ledger = Ledger::load(tmp.path()).unwrap();
        assert!(ledger.contains(&units[1].key()));
        assert!(site.calls.iter().any(|c| c == "list 2023 Week 3"));
    }

    #[test]
    fn lost_login_on_a_week_listing_is_systemic() {
        let tmp = TempDir::new().unwrap();
        let mut site = MockSite::new(&two_weeks());
        site.failing_weeks.insert(Week::Week2, || {
            SessionError::AuthUnknown("sign-in link and profile both missing".to_string())
        });

        let err = crawl(tmp.path(), &mut site, &MockFetch::default(), &options()).unwrap_err();

        assert!(format!("{err:#}").contains("could not list the games of 2023 Week 2"));
        assert_eq!(Ledger::load(tmp.path()).unwrap().len(), 2);
    }

    #[test]
    fn interrupted_download_is_not_marked_unavailable() {
        let tmp = TempDir::new().unwrap();
        let units = two_weeks();
        let mut site = MockSite::new(&units);
        let opts = options();
        let stop = StopFlag::new();
        let fetch = MockFetch {
            interrupts: Some(stop.clone()),
            ..MockFetch::default()
        };

        let state = CrawlState::new(Ledger::load(tmp.path()).unwrap(), &opts.calendar);
        let summary = Scheduler::new(&mut site, &fetch, &opts)
            .with_stop_flag(stop)
            .run(state)
            .unwrap();

        assert_eq!(summary.stop_reason, Some(StopReason::Stopped));
        assert_eq!(summary.unavailable, 0);
        assert_eq!(fetch.fetched.borrow().len(), 1);
        assert_eq!(sidecar_count(tmp.path()), 0);

        // The next run starts the same game over.
        let fetch = MockFetch::default();
        let summary = crawl(tmp.path(), &mut MockSite::new(&units), &fetch, &opts).unwrap();
        assert_eq!(summary.downloaded, 3);
        assert!(!*fetch.saw_stale_file.borrow());
    }

    #[test]
    fn resumes_at_the_first_incomplete_week() {
        let tmp = TempDir::new().unwrap();
        let mut ledger = Ledger::load(tmp.path()).unwrap();
        for i in 0..16 {
            let unit = game(Week::Week1, &format!("Away{i}"), &format!("Home{i}"));
            ledger.record_unavailable(&unit).unwrap();
        }
        let mut site = MockSite::new(&two_weeks());

        crawl(tmp.path(), &mut site, &MockFetch::default(), &options()).unwrap();

        let first_listing = site.calls.iter().find(|c| c.starts_with("list")).unwrap();
        assert_eq!(first_listing, "list 2023 Week 2");
    }

    #[test]
    fn complete_ledger_stops_before_listing() {
        let tmp = TempDir::new().unwrap();
        let mut ledger = Ledger::load(tmp.path()).unwrap();
        for week in Week::ALL {
            for i in 0..week.default_game_count() {
                let unit = game(week, &format!("Away{i}"), &format!("Home{i}"));
                ledger.record_unavailable(&unit).unwrap();
            }
        }
        let mut site = MockSite::new(&two_weeks());

        let summary = crawl(tmp.path(), &mut site, &MockFetch::default(), &options()).unwrap();

        assert_eq!(summary.stop_reason, Some(StopReason::Complete));
        assert!(!site.calls.iter().any(|c| c.starts_with("list")));
    }

    #[test]
    fn stop_request_ends_the_crawl_gracefully() {
        let tmp = TempDir::new().unwrap();
        let mut site = MockSite::new(&two_weeks());
        let fetch = MockFetch::default();
        let opts = options();
        let stop = StopFlag::new();
        stop.request();

        let state = CrawlState::new(Ledger::load(tmp.path()).unwrap(), &opts.calendar);
        let summary = Scheduler::new(&mut site, &fetch, &opts)
            .with_stop_flag(stop)
            .run(state)
            .unwrap();

        assert_eq!(summary.stop_reason, Some(StopReason::Stopped));
        assert!(fetch.fetched.borrow().is_empty());
        assert!(site.closed);
    }

    #[test]
    fn stale_video_without_sidecar_is_replaced() {
        let tmp = TempDir::new().unwrap();
        let units = vec![game(Week::Week1, "Lions", "Chiefs")];
        let stale = tmp.path().join(units[0].video_filename());
        fs::write(&stale, b"half a video").unwrap();
        let fetch = MockFetch::default();

        crawl(tmp.path(), &mut MockSite::new(&units), &fetch, &options()).unwrap();

        assert!(!*fetch.saw_stale_file.borrow());
        assert_eq!(fs::read(&stale).unwrap(), b"video");
    }

    #[test]
    fn cursor_wraps_instead_of_failing() {
        let tmp = TempDir::new().unwrap();
        let opts = options();
        let mut site = MockSite::new(&[]);
        let fetch = MockFetch::default();
        let mut state = CrawlState::new(Ledger::load(tmp.path()).unwrap(), &opts.calendar);
        state.phase = Phase::Advancing;
        state.cursor = Cursor {
            season: "2023".to_string(),
            week: Week::SuperBowl,
        };

        let state = Scheduler::new(&mut site, &fetch, &opts).step(state).unwrap();

        assert_eq!(state.phase, Phase::ListingWeek);
        assert_eq!(
            state.cursor,
            Cursor {
                season: "2023".to_string(),
                week: Week::Week1
            }
        );
    }

    #[test]
    fn relative_variants_resolve_against_the_manifest() {
        assert_eq!(
            resolve("https://cdn.example.com/a/master.m3u8?t=1", "1080/index.m3u8"),
            "https://cdn.example.com/a/1080/index.m3u8"
        );
        assert_eq!(
            resolve("https://cdn.example.com/a/master.m3u8", "https://other.example.com/x.m3u8"),
            "https://other.example.com/x.m3u8"
        );
    }
}
