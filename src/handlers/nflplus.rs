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
// - NFL+ handler -

use crate::definitions::{AuthState, ManifestResponse, SessionError, SiteSession};
use crate::rendition::{parse_clock, RenditionKind, RenditionOption};
use crate::unit::AvailableUnit;
use crate::week::Week;

use fantoccini::{
    elements::Element, error::CmdError, wd::TimeoutConfiguration, Client, ClientBuilder, Locator,
};
use log::{debug, info, warn};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::{json, Value};
use std::{sync::LazyLock, time::Duration};
use tokio::{runtime, time::sleep};

const REPLAYS_URL: &str = "https://www.nfl.com/plus/replays/";
const POLL_INTERVAL: Duration = Duration::from_millis(500);
const SETTLE: Duration = Duration::from_secs(1);
// The player shows its clock a moment after the stream starts.
const CLOCK_WAIT: Duration = Duration::from_secs(15);

const PROFILE_MARKER: &str = "[data-is-logged-in]";
const SIGN_IN: &str = "//*[normalize-space(text())='Sign In']";
const ACCEPT_COOKIES: &str = "//*[normalize-space(text())='Accept Cookies']";
const CURRENTLY_PLAYING: &str = "//*[normalize-space(text())='Currently Playing']";
const VIDEO_PLAYER: &str = r#"[aria-label="Video Player"]"#;

const LATEST_MANIFEST_JS: &str = r#"
const hits = performance.getEntriesByType('resource')
    .map(e => e.name)
    .filter(name => { try { return new URL(name).pathname.endsWith('master.m3u8'); } catch (e) { return false; } });
return hits.length ? hits[hits.length - 1] : null;
"#;

const FETCH_TEXT_JS: &str = r#"
const url = arguments[0];
const done = arguments[arguments.length - 1];
fetch(url, { credentials: 'include' }).then(r => r.text()).then(done, () => done(null));
"#;

static CLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/ (\d+:\d+:\d+)").expect("static clock pattern"));
static CARD_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\w{3} \d+)").expect("static date pattern"));
static CARD: LazyLock<Selector> = LazyLock::new(|| selector(r#"[data-testid="replay-card"]"#));
static CARD_TEAM: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"[data-testid="replay-card-team-section"]"#));
static CARD_FOOTER: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"[data-testid="replay-card-footer"]"#));
static DIV: LazyLock<Selector> = LazyLock::new(|| selector("div"));

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// A signed-in browser on NFL+, driven through a web driver.
pub struct NflPlusSession {
    rt: runtime::Runtime,
    client: Client,
    credentials: Credentials,
    timeout: Duration,
}

impl NflPlusSession {
    /// Opens a browser session on the web driver listening on `port`.
    pub fn connect(
        port: u16,
        headless: bool,
        credentials: Credentials,
        timeout: Duration,
    ) -> Result<Self, SessionError> {
        let rt = runtime::Builder::new_current_thread()
            .enable_time()
            .enable_io()
            .build()
            .map_err(|err| SessionError::WebDriver(format!("cannot start the runtime: {err}")))?;

        let client = rt.block_on(async {
            let webdriver_url = format!("http://localhost:{port}");
            let mut builder = ClientBuilder::native();
            if headless {
                builder.capabilities(headless_capabilities());
            }
            let client = builder.connect(&webdriver_url).await.map_err(|err| {
                SessionError::WebDriver(format!("cannot connect to {webdriver_url}: {err}"))
            })?;
            client
                .update_timeouts(TimeoutConfiguration::new(
                    Some(timeout),
                    Some(timeout),
                    None,
                ))
                .await
                .map_err(webdriver)?;
            Ok::<_, SessionError>(client)
        })?;

        Ok(NflPlusSession {
            rt,
            client,
            credentials,
            timeout,
        })
    }

    fn wait_for(&self, what: &str, locator: Locator<'_>) -> Result<Element, SessionError> {
        self.rt.block_on(
            self.client
                .wait()
                .at_most(self.timeout)
                .every(POLL_INTERVAL)
                .for_element(locator),
        )
        .map_err(|err| waiting(what, err))
    }

    fn click(&self, what: &str, locator: Locator<'_>) -> Result<(), SessionError> {
        let element = self.wait_for(what, locator)?;
        self.rt.block_on(element.click()).map_err(webdriver)
    }

    fn fill(&self, what: &str, css: &str, text: &str) -> Result<(), SessionError> {
        let element = self.wait_for(what, Locator::Css(css))?;
        self.rt.block_on(element.send_keys(text)).map_err(webdriver)
    }

    fn goto(&self, url: &str) -> Result<(), SessionError> {
        debug!("navigate to {url}");
        self.rt
            .block_on(self.client.goto(url))
            .map_err(|err| waiting(url, err))
    }

    fn source(&self) -> Result<String, SessionError> {
        self.rt.block_on(self.client.source()).map_err(webdriver)
    }

    fn is_present(&self, locator: Locator<'_>) -> Result<bool, SessionError> {
        match self.rt.block_on(self.client.find(locator)) {
            Ok(_) => Ok(true),
            Err(err) if err.is_no_such_element() => Ok(false),
            Err(err) => Err(webdriver(err)),
        }
    }

    fn wait_for_url(&self, what: &str, fragment: &str) -> Result<(), SessionError> {
        self.rt.block_on(async {
            let deadline = tokio::time::Instant::now() + self.timeout;
            loop {
                let url = self.client.current_url().await.map_err(webdriver)?;
                if url.as_str().contains(fragment) {
                    return Ok(());
                }
                if tokio::time::Instant::now() >= deadline {
                    return Err(SessionError::Timeout(what.to_string()));
                }
                sleep(POLL_INTERVAL).await;
            }
        })
    }

    // Whichever shows up first, the profile marker or the sign-in link.
    fn wait_for_auth_state(&self, max_retries: u32) -> Result<AuthState, SessionError> {
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                info!("auth state unclear, reloading the page");
                self.rt.block_on(self.client.refresh()).map_err(webdriver)?;
            }

            let deadline = std::time::Instant::now() + self.timeout;
            while std::time::Instant::now() < deadline {
                if self.is_present(Locator::Css(PROFILE_MARKER))? {
                    return Ok(AuthState { is_logged_in: true });
                }
                if self.is_present(Locator::XPath(SIGN_IN))? {
                    return Ok(AuthState {
                        is_logged_in: false,
                    });
                }
                std::thread::sleep(POLL_INTERVAL);
            }

            attempt += 1;
            if attempt > max_retries {
                return Err(SessionError::AuthUnknown(format!(
                    "neither the profile nor the sign-in link appeared within {}s",
                    self.timeout.as_secs()
                )));
            }
        }
    }

    fn assert_signed_in(&self, max_retries: u32) -> Result<(), SessionError> {
        if self.wait_for_auth_state(max_retries)?.is_logged_in {
            Ok(())
        } else {
            Err(SessionError::NotSignedIn(
                "the page asks to sign in".to_string(),
            ))
        }
    }

    fn wait_for_selection(&self, kind: &RenditionKind) -> Result<(), SessionError> {
        let deadline = std::time::Instant::now() + self.timeout;
        loop {
            let renditions = parse_renditions(&self.source()?);
            if renditions.iter().any(|r| r.selected && r.kind.is(kind)) {
                return Ok(());
            }
            if std::time::Instant::now() >= deadline {
                return Err(SessionError::Timeout(format!("{kind} to start playing")));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl SiteSession for NflPlusSession {
    fn log_in(&mut self) -> Result<(), SessionError> {
        self.goto(REPLAYS_URL)?;
        std::thread::sleep(SETTLE);

        if self.is_present(Locator::XPath(ACCEPT_COOKIES))? {
            self.click("the cookie banner", Locator::XPath(ACCEPT_COOKIES))?;
            std::thread::sleep(SETTLE);
        }

        let before = self.wait_for_auth_state(0)?;
        info!(
            "user login state: {}",
            if before.is_logged_in { "logged in" } else { "anonymous" }
        );
        if before.is_logged_in {
            return Ok(());
        }

        debug!("navigate to sign in");
        self.click("the sign-in link", Locator::XPath(SIGN_IN))?;
        self.wait_for_url("the login page", "id.nfl.com")?;

        debug!("fill username");
        self.fill("the email field", r#"input[type="email"]"#, &self.credentials.username)?;
        self.click(
            "the continue button",
            Locator::XPath("//button[normalize-space()='Continue']"),
        )?;

        debug!("fill password");
        self.fill(
            "the password field",
            r#"input[autocomplete="current-password"]"#,
            &self.credentials.password,
        )?;
        self.click(
            "the sign-in button",
            Locator::XPath("//button[normalize-space()='Sign In']"),
        )?;

        debug!("wait for auth redirect");
        self.wait_for_url("the NFL+ redirect", "www.nfl.com/plus")
            .map_err(|_| SessionError::NotSignedIn("the login was not accepted".to_string()))?;

        if !self.wait_for_auth_state(0)?.is_logged_in {
            return Err(SessionError::NotSignedIn(
                "still signed out after submitting the credentials".to_string(),
            ));
        }
        Ok(())
    }

    fn auth_state(&mut self) -> Result<AuthState, SessionError> {
        self.wait_for_auth_state(1)
    }

    fn list_units_for_week(
        &mut self,
        season: &str,
        week: Week,
    ) -> Result<Vec<AvailableUnit>, SessionError> {
        self.goto(&week_url(season, week))?;
        let heading = format!("//*[contains(normalize-space(text()), 'Replay {week}')]");
        self.wait_for(&format!("the {week} replays"), Locator::XPath(&heading))?;
        self.assert_signed_in(1)?;

        let units = parse_week_cards(&self.source()?, season, week);
        info!("{} replay cards on {season} {week}", units.len());
        Ok(units)
    }

    fn navigate_to_unit(&mut self, unit: &AvailableUnit) -> Result<(), SessionError> {
        self.goto(&game_url(unit))?;
        self.assert_signed_in(0)?;
        self.wait_for("the rendition picker", Locator::XPath(CURRENTLY_PLAYING))?;
        Ok(())
    }

    fn list_renditions(&mut self) -> Result<Vec<RenditionOption>, SessionError> {
        let renditions = parse_renditions(&self.source()?);
        if renditions.is_empty() {
            return Err(SessionError::Page("no rendition picker on the page".to_string()));
        }
        Ok(renditions)
    }

    fn select_rendition(&mut self, kind: &RenditionKind) -> Result<(), SessionError> {
        let already = parse_renditions(&self.source()?)
            .iter()
            .any(|r| r.selected && r.kind.is(kind));
        if already {
            // Its manifest is already among the loaded resources.
            debug!("{kind} is already playing");
            return Ok(());
        }

        self.rt
            .block_on(
                self.client
                    .execute("performance.clearResourceTimings(); return true;", vec![]),
            )
            .map_err(webdriver)?;

        debug!("select {kind}");
        let entry = format!("//div[div/div[normalize-space(text())='{}']]", kind.label());
        self.click(&format!("the {kind} entry"), Locator::XPath(&entry))?;
        self.wait_for_selection(kind)
    }

    fn await_manifest_response(&mut self) -> Result<ManifestResponse, SessionError> {
        let url = self.rt.block_on(async {
            let deadline = tokio::time::Instant::now() + self.timeout;
            loop {
                let found = self
                    .client
                    .execute(LATEST_MANIFEST_JS, vec![])
                    .await
                    .map_err(webdriver)?;
                if let Value::String(url) = found {
                    return Ok(url);
                }
                if tokio::time::Instant::now() >= deadline {
                    return Err(SessionError::Timeout("the master manifest".to_string()));
                }
                sleep(POLL_INTERVAL).await;
            }
        })?;
        debug!("manifest loaded from {url}");

        let text = self
            .rt
            .block_on(self.client.execute_async(FETCH_TEXT_JS, vec![json!(url)]))
            .map_err(|err| waiting("the manifest body", err))?;
        match text {
            Value::String(text) => Ok(ManifestResponse { url, text }),
            _ => Err(SessionError::Page(format!("could not read the manifest at {url}"))),
        }
    }

    fn video_duration(&mut self) -> Result<Option<Duration>, SessionError> {
        let deadline = std::time::Instant::now() + CLOCK_WAIT;
        loop {
            if let Ok(player) = self.rt.block_on(self.client.find(Locator::Css(VIDEO_PLAYER))) {
                let text = self.rt.block_on(player.text()).map_err(webdriver)?;
                if let Some(clock) = CLOCK.captures(&text) {
                    return Ok(parse_clock(&clock[1]));
                }
            }
            if std::time::Instant::now() >= deadline {
                warn!("the player shows no playing time");
                return Ok(None);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn close(&mut self) -> Result<(), SessionError> {
        self.rt
            .block_on(self.client.clone().close())
            .map_err(webdriver)
    }

    fn display_name(&self) -> String {
        "NFL+".to_string()
    }
}

fn webdriver(err: CmdError) -> SessionError {
    SessionError::WebDriver(err.to_string())
}

fn waiting(what: &str, err: CmdError) -> SessionError {
    match err {
        CmdError::WaitTimeout => SessionError::Timeout(what.to_string()),
        err if err.is_no_such_element() => SessionError::Page(format!("{what} is missing")),
        err => webdriver(err),
    }
}

fn headless_capabilities() -> serde_json::Map<String, Value> {
    let mut caps = serde_json::Map::new();
    caps.insert(
        "goog:chromeOptions".to_string(),
        json!({ "args": ["--headless=new"] }),
    );
    caps.insert(
        "moz:firefoxOptions".to_string(),
        json!({ "args": ["-headless"] }),
    );
    caps
}

// https://www.nfl.com/plus/replays/2023/reg1
pub fn week_url(season: &str, week: Week) -> String {
    format!("{REPLAYS_URL}{season}/{}", week.url_value().replacen('-', "", 1))
}

// https://www.nfl.com/plus/games/lions-at-chiefs-2023-reg-1
pub fn game_url(unit: &AvailableUnit) -> String {
    let team = |name: &str| name.to_lowercase().replace(' ', "-");
    format!(
        "https://www.nfl.com/plus/games/{}-at-{}-{}-{}",
        team(&unit.away_team),
        team(&unit.home_team),
        unit.season,
        unit.week.url_value()
    )
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Reads the replay cards of a week page, in page order.
pub fn parse_week_cards(html: &str, season: &str, week: Week) -> Vec<AvailableUnit> {
    let doc = Html::parse_document(html);
    doc.select(&CARD)
        .filter_map(|card| {
            let teams: Vec<String> = card
                .select(&CARD_TEAM)
                .map(|team| {
                    // The final score trails the team name.
                    text_of(team)
                        .trim_end_matches(|c: char| c.is_ascii_digit())
                        .trim()
                        .to_string()
                })
                .collect();
            let (away, home) = match (teams.first(), teams.last()) {
                (Some(away), Some(home)) if teams.len() >= 2 => (away.clone(), home.clone()),
                _ => {
                    warn!("skipping a replay card without two teams");
                    return None;
                }
            };

            // "FINAL · Sun 9/10" or "FINAL · Sep 10 1:00 PM"
            let footer = card.select(&CARD_FOOTER).next().map(text_of).unwrap_or_default();
            let date = footer
                .split('·')
                .nth(1)
                .map(str::trim)
                .map(|d| CARD_DATE.captures(d).map_or(d, |c| c.get(1).map_or(d, |m| m.as_str())))
                .unwrap_or_default()
                .to_string();

            Some(AvailableUnit {
                season: season.to_string(),
                week,
                away_team: away,
                home_team: home,
                date,
            })
        })
        .collect()
}

/// Reads the rendition picker of a game page.
///
/// Every sibling of the first entry with a known label counts as an entry,
/// so labels the site adds later surface as unknown kinds.
pub fn parse_renditions(html: &str) -> Vec<RenditionOption> {
    let doc = Html::parse_document(html);

    let is_leaf = |el: &ElementRef<'_>| el.children().all(|c| !c.value().is_element());
    let Some(known) = doc.select(&DIV).find(|el| {
        is_leaf(el) && !matches!(RenditionKind::from_label(&text_of(*el)), RenditionKind::Unknown(_))
    }) else {
        return Vec::new();
    };

    fn grandparent<'b>(el: ElementRef<'b>) -> Option<ElementRef<'b>> {
        el.parent()
            .and_then(|p| p.parent())
            .and_then(ElementRef::wrap)
    }
    let Some(entry) = grandparent(known) else {
        return Vec::new();
    };
    let Some(picker) = entry.parent().and_then(ElementRef::wrap) else {
        return Vec::new();
    };

    picker
        .children()
        .filter_map(ElementRef::wrap)
        .filter_map(|entry| {
            let label = entry
                .children()
                .filter_map(ElementRef::wrap)
                .next()?
                .children()
                .filter_map(ElementRef::wrap)
                .next()?;
            Some(RenditionOption {
                kind: RenditionKind::from_label(&text_of(label)),
                selected: entry.text().any(|t| t.trim() == "Currently Playing"),
            })
        })
        .collect()
}
