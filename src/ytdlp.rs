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
// - ytdlp.rs file -

use crate::definitions::{FetchError, FetcherDefinition, MediaFetch};

use log::{debug, warn};
use std::{
    io,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    thread,
    time::{Duration, Instant},
};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Hands the stream to an external downloader: `<program> <url> -o <output>`.
pub struct ExternalDownloader {
    program: PathBuf,
    timeout: Duration,
}

impl MediaFetch for ExternalDownloader {
    fn fetch(&self, stream_url: &str, output: &Path) -> Result<(), FetchError> {
        let program = self.program.display().to_string();
        debug!("running {program} for {}", output.display());

        let mut command = Command::new(&self.program);
        command
            .arg(stream_url)
            .arg("-o")
            .arg(output)
            .stdin(Stdio::null());
        let mut child = own_process_group(&mut command)
            .spawn()
            .map_err(|source| FetchError::Spawn {
                program: program.clone(),
                source,
            })?;

        let started = Instant::now();
        let status = loop {
            let polled = child.try_wait().map_err(|source| FetchError::Spawn {
                program: program.clone(),
                source,
            })?;
            if let Some(status) = polled {
                break status;
            }
            if started.elapsed() >= self.timeout {
                if let Err(err) = child.kill() {
                    warn!("could not stop {program}: {err}");
                }
                match child.wait() {
                    Ok(status) => debug!("{program} stopped: {status}"),
                    Err(err) => debug!("could not reap {program}: {err}"),
                }
                return Err(FetchError::Timeout {
                    program,
                    timeout: self.timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        };

        if !status.success() {
            return Err(FetchError::ExitStatus { program, status });
        }
        if !output.exists() {
            return Err(FetchError::Io {
                path: output.to_path_buf(),
                source: io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{program} exited cleanly without writing the video"),
                ),
            });
        }
        Ok(())
    }
}

/// Keeps the terminal's Ctrl-C away from `command`, so the first press only
/// asks the crawl to stop and the download in progress runs to its end.
pub fn own_process_group(command: &mut Command) -> &mut Command {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    command
}

// Implement the fetcher definition:
struct YtDlpDefinition;
impl FetcherDefinition for YtDlpDefinition {
    fn name(&self) -> &'static str {
        "ytdlp"
    }

    fn display_name(&self) -> String {
        "yt-dlp".to_string()
    }

    fn build(&self, executable: &Path, timeout: Duration) -> Box<dyn MediaFetch> {
        Box::new(ExternalDownloader {
            program: executable.to_path_buf(),
            timeout,
        })
    }
}

// Push the fetcher definition to the list of known backends:
inventory::submit! {
    &YtDlpDefinition as &dyn FetcherDefinition
}
