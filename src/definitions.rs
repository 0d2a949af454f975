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
// - definitions.rs file -

use crate::rendition::{RenditionKind, RenditionOption};
use crate::unit::AvailableUnit;
use crate::week::Week;

use std::{
    io,
    path::{Path, PathBuf},
    process::ExitStatus,
    time::Duration,
};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to determine auth state: {0}")]
    AuthUnknown(String),
    #[error("not signed in: {0}")]
    NotSignedIn(String),
    #[error("timed out waiting for {0}")]
    Timeout(String),
    #[error("web driver: {0}")]
    WebDriver(String),
    #[error("{0}")]
    Page(String),
}

impl SessionError {
    // Auth problems are not about one game: the whole crawl stops.
    pub fn is_systemic(&self) -> bool {
        matches!(
            self,
            SessionError::AuthUnknown(_) | SessionError::NotSignedIn(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthState {
    pub is_logged_in: bool,
}

/// A captured master manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestResponse {
    /// Where the browser loaded it from.
    pub url: String,
    pub text: String,
}

// Define the public interface of the replay site, as driven by the crawl.
// Every call blocks until it completes or its own timeout fires.
pub trait SiteSession {
    // signs in unless already signed in.
    fn log_in(&mut self) -> Result<(), SessionError>;

    fn auth_state(&mut self) -> Result<AuthState, SessionError>;

    // returns the games of one week, in the order the site lists them.
    fn list_units_for_week(
        &mut self,
        season: &str,
        week: Week,
    ) -> Result<Vec<AvailableUnit>, SessionError>;

    fn navigate_to_unit(&mut self, unit: &AvailableUnit) -> Result<(), SessionError>;

    // returns the entries of the current game's rendition picker.
    fn list_renditions(&mut self) -> Result<Vec<RenditionOption>, SessionError>;

    // arms the manifest capture, then switches the player to <kind>.
    fn select_rendition(&mut self, kind: &RenditionKind) -> Result<(), SessionError>;

    // returns the manifest loaded by the last selection.
    fn await_manifest_response(&mut self) -> Result<ManifestResponse, SessionError>;

    // returns the playing time shown by the player, if it shows one.
    fn video_duration(&mut self) -> Result<Option<Duration>, SessionError>;

    fn close(&mut self) -> Result<(), SessionError>;

    // returns the name of the site (e.g. "NFL+").
    fn display_name(&self) -> String;
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("could not start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} exited with {status}")]
    ExitStatus { program: String, status: ExitStatus },
    #[error("{program} did not finish within {} minutes", .timeout.as_secs() / 60)]
    Timeout { program: String, timeout: Duration },
    #[error("request to {url} failed: {reason}")]
    Http { url: String, reason: String },
    #[error("unusable playlist {url}: {reason}")]
    Playlist { url: String, reason: String },
    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

// Acquires one stream into one file.
pub trait MediaFetch {
    fn fetch(&self, stream_url: &str, output: &Path) -> Result<(), FetchError>;
}

// Define the public interface for fetch backends:
pub trait FetcherDefinition: Sync {
    // the name used on the command line (e.g. "ytdlp").
    fn name(&self) -> &'static str;

    fn display_name(&self) -> String;

    // builds the backend around the executable it drives.
    fn build(&self, executable: &Path, timeout: Duration) -> Box<dyn MediaFetch>;
}

inventory::collect!(&'static dyn FetcherDefinition);

pub fn find_fetcher(name: &str) -> Option<&'static dyn FetcherDefinition> {
    inventory::iter::<&'static dyn FetcherDefinition>
        .into_iter()
        .find(|def| def.name() == name)
        .copied()
}

pub fn fetcher_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = inventory::iter::<&'static dyn FetcherDefinition>
        .into_iter()
        .map(|def| def.name())
        .collect();
    names.sort_unstable();
    names
}
