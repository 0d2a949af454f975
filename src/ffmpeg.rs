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
// - ffmpeg.rs file -

use crate::definitions::FetchError;
use crate::ytdlp::own_process_group;

use log::debug;
use std::path::Path;
use std::process::{Command, Stdio};

// Just use the system's ffmpeg (or the one the user points at).

pub fn ts_to_mp4(ffmpeg: &Path, inputfile: &Path, outputfile: &Path) -> Result<(), FetchError> {
    let program = ffmpeg.display().to_string();
    debug!("remuxing {} into {}", inputfile.display(), outputfile.display());

    let mut command = Command::new(ffmpeg);
    command
        .arg("-y")
        .arg("-loglevel")
        .arg("error")
        .arg("-i")
        .arg(inputfile)
        .arg("-c")
        .arg("copy") // No re-encoding.
        .arg(outputfile)
        .stdin(Stdio::null());
    let status = own_process_group(&mut command)
        .status()
        .map_err(|source| FetchError::Spawn {
            program: program.clone(),
            source,
        })?;

    if !status.success() {
        return Err(FetchError::ExitStatus { program, status });
    }
    Ok(())
}
