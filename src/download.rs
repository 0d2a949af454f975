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
// - download.rs file -

use crate::agent::{AgentBase, ReplayAgent};
use crate::definitions::{FetchError, FetcherDefinition, MediaFetch};
use crate::ffmpeg;

use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use log::{debug, info};
use m3u8_rs::{KeyMethod, MediaPlaylist};
use nom::Finish;
use std::{
    fs,
    io::{self, copy, Read},
    path::{Path, PathBuf},
    time::{Duration, Instant},
};
use url::Url;

struct DownloadProgress<'a, R> {
    inner: R,
    progress_bar: &'a ProgressBar,
}

impl<R: Read> Read for DownloadProgress<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf).map(|n| {
            self.progress_bar.inc(n as u64);
            n
        })
    }
}

/// Fetches a media playlist segment by segment and remuxes the result.
pub struct HlsFetcher {
    ffmpeg: PathBuf,
    timeout: Duration,
}

impl HlsFetcher {
    fn get_text(&self, agent: &ureq::Agent, url: &Url) -> Result<String, FetchError> {
        let http = |reason: String| FetchError::Http {
            url: url.to_string(),
            reason,
        };
        agent
            .get(url.as_str())
            .set("Referer", url.as_str())
            .call()
            .map_err(|err| http(err.to_string()))?
            .into_string()
            .map_err(|err| http(err.to_string()))
    }

    fn media_playlist(&self, agent: &ureq::Agent, url: &Url) -> Result<MediaPlaylist, FetchError> {
        let text = self.get_text(agent, url)?;
        let (_, playlist) = m3u8_rs::parse_media_playlist(text.as_bytes())
            .finish()
            .map_err(|err| FetchError::Playlist {
                url: url.to_string(),
                reason: format!("{:?}", err.code),
            })?;

        if playlist.segments.is_empty() {
            return Err(FetchError::Playlist {
                url: url.to_string(),
                reason: "no segments".to_string(),
            });
        }
        let encrypted = playlist
            .segments
            .iter()
            .filter_map(|s| s.key.as_ref())
            .any(|key| !matches!(key.method, KeyMethod::None));
        if encrypted {
            return Err(FetchError::Playlist {
                url: url.to_string(),
                reason: "encrypted segments are not supported".to_string(),
            });
        }
        Ok(playlist)
    }

    // Concatenates the init section (if any) and every segment into <dest>.
    fn download_segments(
        &self,
        agent: &ureq::Agent,
        playlist_url: &Url,
        playlist: &MediaPlaylist,
        dest: &Path,
    ) -> Result<(), FetchError> {
        let io_err = |source| FetchError::Io {
            path: dest.to_path_buf(),
            source,
        };
        let mut file = fs::File::create(dest).map_err(io_err)?;

        let init = playlist.segments.first().and_then(|s| s.map.as_ref());
        let uris = init
            .map(|map| map.uri.as_str())
            .into_iter()
            .chain(playlist.segments.iter().map(|s| s.uri.as_str()));

        // Display a progress bar:
        let pb = ProgressBar::new(playlist.segments.len() as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.green/blue}] {pos}/{len} {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
        );

        let started = Instant::now();
        let bytes = ProgressBar::hidden();
        for uri in uris {
            if started.elapsed() > self.timeout {
                pb.abandon();
                return Err(FetchError::Timeout {
                    program: "segment download".to_string(),
                    timeout: self.timeout,
                });
            }

            let url = segment_url(playlist_url, uri)?;
            let resp = agent
                .get(url.as_str())
                .set("Referer", playlist_url.as_str())
                .call()
                .map_err(|err| FetchError::Http {
                    url: url.to_string(),
                    reason: err.to_string(),
                })?;

            let mut source = DownloadProgress {
                progress_bar: &bytes,
                inner: resp.into_reader(),
            };
            copy(&mut source, &mut file).map_err(io_err)?;

            if uri != init.map_or("", |m| m.uri.as_str()) {
                pb.inc(1);
            }
            pb.set_message(HumanBytes(bytes.position()).to_string());
        }

        pb.finish_and_clear();
        debug!("{} bytes of segments in {}", bytes.position(), dest.display());
        Ok(())
    }
}

impl MediaFetch for HlsFetcher {
    fn fetch(&self, stream_url: &str, output: &Path) -> Result<(), FetchError> {
        let url = Url::parse(stream_url).map_err(|err| FetchError::Http {
            url: stream_url.to_string(),
            reason: err.to_string(),
        })?;
        let agent = ReplayAgent::init(&url)?;

        let playlist = self.media_playlist(&agent, &url)?;
        info!(
            "fetching {} segments ({} minutes of video)",
            playlist.segments.len(),
            playlist.segments.iter().map(|s| s.duration as u64).sum::<u64>() / 60
        );

        let ts = output.with_extension("ts");
        let result = self
            .download_segments(&agent, &url, &playlist, &ts)
            .and_then(|()| ffmpeg::ts_to_mp4(&self.ffmpeg, &ts, output));

        // Get rid of the evidence.
        if ts.exists() {
            fs::remove_file(&ts).map_err(|source| FetchError::Io { path: ts, source })?;
        }
        result
    }
}

// Playlist entries are usually relative to the playlist itself.
fn segment_url(playlist_url: &Url, uri: &str) -> Result<Url, FetchError> {
    playlist_url.join(uri).map_err(|err| FetchError::Playlist {
        url: playlist_url.to_string(),
        reason: format!("bad segment uri {uri:?}: {err}"),
    })
}

// Implement the fetcher definition:
struct HlsDefinition;
impl FetcherDefinition for HlsDefinition {
    fn name(&self) -> &'static str {
        "hls"
    }

    fn display_name(&self) -> String {
        "built-in HLS downloader (remuxed with ffmpeg)".to_string()
    }

    fn build(&self, executable: &Path, timeout: Duration) -> Box<dyn MediaFetch> {
        Box::new(HlsFetcher {
            ffmpeg: executable.to_path_buf(),
            timeout,
        })
    }
}

// Push the fetcher definition to the list of known backends:
inventory::submit! {
    &HlsDefinition as &dyn FetcherDefinition
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_resolve_against_the_playlist() {
        let base = Url::parse("https://cdn.example.com/game/1080/index.m3u8?token=abc").unwrap();
        assert_eq!(
            segment_url(&base, "seg-00001.ts").unwrap().as_str(),
            "https://cdn.example.com/game/1080/seg-00001.ts"
        );
        assert_eq!(
            segment_url(&base, "/other/seg.ts").unwrap().as_str(),
            "https://cdn.example.com/other/seg.ts"
        );
        assert_eq!(
            segment_url(&base, "https://edge.example.com/seg.ts?x=1")
                .unwrap()
                .as_str(),
            "https://edge.example.com/seg.ts?x=1"
        );
    }

    #[test]
    fn invalid_stream_url_is_an_http_error() {
        let fetcher = HlsDefinition.build(Path::new("ffmpeg"), Duration::from_secs(1));
        let err = fetcher
            .fetch("not a url", Path::new("/tmp/never.mp4"))
            .unwrap_err();
        assert!(matches!(err, FetchError::Http { .. }));
    }
}
