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
// - stop.rs file -

use log::{error, warn};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};
use tokio::{runtime, signal};

/// Set once the user asks the crawl to stop.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Watches for Ctrl-C on a thread of its own.
///
/// The first Ctrl-C raises `flag`; the crawl finishes the unit at hand and
/// stops before the next week listing. The second one exits at once.
pub fn watch_ctrlc(flag: StopFlag) {
    let spawned = thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || {
            let rt = match runtime::Builder::new_current_thread().enable_io().build() {
                Ok(rt) => rt,
                Err(err) => {
                    error!("cannot watch for Ctrl-C: {err}");
                    return;
                }
            };
            rt.block_on(async move {
                loop {
                    if signal::ctrl_c().await.is_err() {
                        return;
                    }
                    if flag.is_requested() {
                        // Second Ctrl-C: force stop.
                        std::process::exit(1);
                    }
                    warn!("stopping after the current game (press Ctrl-C again to abort)");
                    flag.request();
                }
            });
        });

    if let Err(err) = spawned {
        error!("cannot watch for Ctrl-C: {err}");
    }
}
