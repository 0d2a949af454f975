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
// - manifest.rs file -

use regex::Regex;
use std::sync::LazyLock;

const STREAM_TAG: &str = "#EXT-X-STREAM-INF:";

static RESOLUTION_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|,)RESOLUTION=([^,\s]+)").expect("static resolution pattern")
});

/// One variant stream declared by a master manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamCandidate {
    /// As written in the manifest, e.g. "1920x1080". Never normalized.
    pub resolution: String,
    pub url: String,
}

/// Lists the variant streams of a master manifest in document order.
///
/// Every `#EXT-X-STREAM-INF` tag carrying a `RESOLUTION` attribute is paired
/// with the next URI line. Tags without a resolution (audio-only variants)
/// and tags with no following URI are dropped. Anything else in the document
/// is ignored, so a text without stream declarations yields nothing.
pub fn parse_manifest(text: &str) -> Vec<StreamCandidate> {
    let mut candidates = Vec::new();
    let mut pending: Option<String> = None;

    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            continue;
        }

        if let Some(attributes) = line.strip_prefix(STREAM_TAG) {
            pending = RESOLUTION_ATTR
                .captures(attributes)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string());
            continue;
        }

        if line.starts_with('#') {
            continue;
        }

        // A URI line. It belongs to the last stream tag, if any.
        if let Some(resolution) = pending.take() {
            candidates.push(StreamCandidate {
                resolution,
                url: line.to_string(),
            });
        }
    }

    candidates
}
