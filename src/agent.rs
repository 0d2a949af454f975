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
// - agent.rs file -

use crate::definitions::FetchError;

use std::time::Duration;
use ureq::{Agent, AgentBuilder, Proxy};
use url::Url;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const READ_TIMEOUT: Duration = Duration::from_secs(120);

pub trait AgentBase {
    fn init(url: &Url) -> Result<Agent, FetchError>;
}

pub struct ReplayAgent;
impl AgentBase for ReplayAgent {
    // Default download agent. Goes through the proxy the environment
    // names for <url>, if any.
    fn init(url: &Url) -> Result<Agent, FetchError> {
        let mut builder = AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT);

        if let Some((host, port)) = env_proxy::for_url(url).host_port() {
            let proxy = Proxy::new(format!("{host}:{port}")).map_err(|err| FetchError::Http {
                url: url.to_string(),
                reason: format!("bad proxy {host}:{port}: {err}"),
            })?;
            builder = builder.proxy(proxy);
        }
        Ok(builder.build())
    }
}
