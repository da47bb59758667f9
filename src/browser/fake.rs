//! In-memory scripted site
//!
//! `FakeSite` implements [`Launcher`] and hands out pages that render a fixed
//! set of elements per path. Clicks can navigate, reveal elements, bump
//! server-side counters, submit forms or hang forever, which is enough to
//! exercise the runner without a browser.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::common::config::BrowserConfig;
use crate::common::{Error, Result};
use crate::scenario::locator::{Locator, LocatorKind};

use super::{ElementRef, Launcher, Page};

/// Values filled into the current page, keyed by element id or name
pub type FormValues = HashMap<String, String>;

/// Decides what a submit does based on the filled values
pub type FormHandler = Arc<dyn Fn(&FormValues) -> ClickEffect + Send + Sync>;

/// What happens when an element is clicked
#[derive(Clone, Default)]
pub enum ClickEffect {
    #[default]
    None,
    /// Navigate to a path on the same origin
    Navigate(String),
    /// Reveal the element with this id
    Show(String),
    /// Increment a site-wide counter
    Bump(String),
    /// Never return
    Hang,
    /// Run a handler against the filled values and apply its effect
    Submit(FormHandler),
}

impl ClickEffect {
    pub fn submit(handler: impl Fn(&FormValues) -> ClickEffect + Send + Sync + 'static) -> Self {
        ClickEffect::Submit(Arc::new(handler))
    }
}

/// An element rendered by a fake page
#[derive(Clone)]
pub struct FakeElement {
    tag: String,
    id: Option<String>,
    attrs: Vec<(String, String)>,
    text: String,
    label: Option<String>,
    xpath: Option<String>,
    hidden: bool,
    appears_after: Duration,
    on_click: ClickEffect,
}

impl FakeElement {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            id: None,
            attrs: Vec::new(),
            text: String::new(),
            label: None,
            xpath: None,
            hidden: false,
            appears_after: Duration::ZERO,
            on_click: ClickEffect::None,
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.push((name.to_string(), value.to_string()));
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    /// Text of the `<label>` associated with this control
    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    /// Absolute document path this element answers to
    pub fn xpath(mut self, path: &str) -> Self {
        self.xpath = Some(path.to_string());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Attach the element only after the page has been loaded this long
    pub fn appears_after(mut self, delay: Duration) -> Self {
        self.appears_after = delay;
        self
    }

    pub fn on_click(mut self, effect: ClickEffect) -> Self {
        self.on_click = effect;
        self
    }

    fn attr_value(&self, name: &str) -> Option<&str> {
        if name == "id" {
            return self.id.as_deref();
        }
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn form_key(&self) -> String {
        self.id
            .clone()
            .or_else(|| self.attr_value("name").map(str::to_string))
            .unwrap_or_else(|| self.tag.clone())
    }

    fn is_editable(&self) -> bool {
        matches!(self.tag.as_str(), "input" | "textarea" | "select")
    }

    fn implicit_role(&self) -> Option<&str> {
        if let Some(role) = self.attr_value("role") {
            return Some(role);
        }
        match self.tag.as_str() {
            "button" => Some("button"),
            "a" => Some("link"),
            "textarea" => Some("textbox"),
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => Some("heading"),
            "input" => match self.attr_value("type").unwrap_or("text") {
                "submit" | "button" | "reset" => Some("button"),
                "checkbox" => Some("checkbox"),
                _ => Some("textbox"),
            },
            _ => None,
        }
    }

    fn accessible_names(&self) -> impl Iterator<Item = &str> {
        [
            Some(self.text.as_str()),
            self.attr_value("aria-label"),
            self.attr_value("value"),
            self.attr_value("placeholder"),
            self.label.as_deref(),
        ]
        .into_iter()
        .flatten()
    }

    fn matches(&self, kind: &LocatorKind) -> bool {
        match kind {
            LocatorKind::Css(selector) => selector
                .split(',')
                .any(|alternative| css_compound_matches(self, alternative)),
            LocatorKind::XPath(path) => self
                .xpath
                .as_deref()
                .is_some_and(|own| own.trim_start_matches('/') == path.trim_start_matches('/')),
            LocatorKind::Text(text) => self.text.contains(text.as_str()),
            LocatorKind::Role { role, name } => {
                self.implicit_role() == Some(role.as_str())
                    && name
                        .as_deref()
                        .map_or(true, |n| self.accessible_names().any(|a| a.contains(n)))
            }
            LocatorKind::Label(label) => {
                self.label.as_deref() == Some(label.as_str())
                    || self.attr_value("aria-label") == Some(label.as_str())
            }
            LocatorKind::TestId(id) => self.attr_value("data-testid") == Some(id.as_str()),
        }
    }

    fn attached(&self, since_load: Duration) -> bool {
        since_load >= self.appears_after
    }
}

/// Match the last compound selector of a CSS alternative against an element
///
/// Supports `tag`, `#id`, `.class`, `[attr]` and `[attr=value]`; combinators
/// only consider the rightmost compound.
fn css_compound_matches(element: &FakeElement, alternative: &str) -> bool {
    let Some(compound) = alternative
        .split(|c: char| c.is_whitespace() || c == '>' || c == '+' || c == '~')
        .filter(|s| !s.is_empty())
        .last()
    else {
        return false;
    };

    let is_ident = |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_';
    let mut rest = compound;

    let tag_len = rest.find(|c: char| !is_ident(c) && c != '*').unwrap_or(rest.len());
    let tag = &rest[..tag_len];
    if !tag.is_empty() && tag != "*" && !tag.eq_ignore_ascii_case(&element.tag) {
        return false;
    }
    rest = &rest[tag_len..];

    while let Some(c) = rest.chars().next() {
        match c {
            '#' | '.' => {
                let body = &rest[1..];
                let len = body.find(|c: char| !is_ident(c)).unwrap_or(body.len());
                let name = &body[..len];
                let ok = if c == '#' {
                    element.id.as_deref() == Some(name)
                } else {
                    element
                        .attr_value("class")
                        .is_some_and(|classes| classes.split_whitespace().any(|k| k == name))
                };
                if !ok {
                    return false;
                }
                rest = &body[len..];
            }
            '[' => {
                let Some(end) = rest.find(']') else {
                    return false;
                };
                let inner = &rest[1..end];
                let ok = match inner.split_once('=') {
                    Some((name, value)) => {
                        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
                        element.attr_value(name.trim()) == Some(value)
                    }
                    None => element.attr_value(inner.trim()).is_some(),
                };
                if !ok {
                    return false;
                }
                rest = &rest[end + 1..];
            }
            // Pseudo-classes are ignored
            ':' => break,
            _ => return false,
        }
    }
    true
}

/// Content served at one path
#[derive(Clone, Default)]
pub struct FakePage {
    elements: Vec<FakeElement>,
    ready_after: Duration,
    load_times_out: bool,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn element(mut self, element: FakeElement) -> Self {
        self.elements.push(element);
        self
    }

    /// Report `document.readyState == "loading"` for this long after navigation
    pub fn ready_after(mut self, delay: Duration) -> Self {
        self.ready_after = delay;
        self
    }

    /// Fail navigation the way a driver does when its page load timeout expires
    pub fn load_times_out(mut self) -> Self {
        self.load_times_out = true;
        self
    }
}

#[derive(Default)]
struct SiteState {
    pages: HashMap<String, FakePage>,
    counters: HashMap<String, u64>,
    visits: HashMap<String, usize>,
    launched: usize,
    closed: usize,
    open: usize,
    max_open: usize,
    fail_launch: Option<String>,
    launch_delay: Duration,
    fail_close: bool,
}

/// A scripted web application shared by all sessions launched from it
#[derive(Clone, Default)]
pub struct FakeSite {
    state: Arc<Mutex<SiteState>>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SiteState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Serve `page` at `path`
    pub fn page(self, path: &str, page: FakePage) -> Self {
        self.lock().pages.insert(path.to_string(), page);
        self
    }

    /// Make every launch fail with `message`
    pub fn fail_launch(self, message: &str) -> Self {
        self.lock().fail_launch = Some(message.to_string());
        self
    }

    /// Create the session immediately but answer the launch only after `delay`
    pub fn launch_delay(self, delay: Duration) -> Self {
        self.lock().launch_delay = delay;
        self
    }

    /// Make every page close report an error
    pub fn fail_close(self) -> Self {
        self.lock().fail_close = true;
        self
    }

    /// Sessions launched so far
    pub fn launched(&self) -> usize {
        self.lock().launched
    }

    /// Sessions closed so far, including closes that reported an error
    pub fn closed(&self) -> usize {
        self.lock().closed
    }

    /// Sessions currently open
    pub fn open_sessions(&self) -> usize {
        self.lock().open
    }

    /// Highest number of sessions open at the same time
    pub fn max_concurrent_sessions(&self) -> usize {
        self.lock().max_open
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.lock().counters.get(name).copied().unwrap_or(0)
    }

    /// Successful navigations to `path`
    pub fn visits(&self, path: &str) -> usize {
        self.lock().visits.get(path).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Launcher for FakeSite {
    async fn launch(&self, _browser: &BrowserConfig) -> Result<Box<dyn Page>> {
        let (session, delay) = {
            let mut state = self.lock();
            if let Some(message) = &state.fail_launch {
                return Err(Error::SessionCreate(message.clone()));
            }
            state.launched += 1;
            state.open += 1;
            state.max_open = state.max_open.max(state.open);
            (state.launched, state.launch_delay)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        Ok(Box::new(FakeBrowserPage {
            site: self.clone(),
            session,
            generation: 0,
            current: None,
            closed: false,
        }))
    }
}

struct LoadedPage {
    url: String,
    loaded_at: Instant,
    ready_after: Duration,
    elements: Vec<FakeElement>,
    values: FormValues,
}

/// A page launched from a [`FakeSite`]
pub struct FakeBrowserPage {
    site: FakeSite,
    session: usize,
    /// Bumped on every navigation; older element handles become stale
    generation: u64,
    current: Option<LoadedPage>,
    closed: bool,
}

impl FakeBrowserPage {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::SessionClosed)
        } else {
            Ok(())
        }
    }

    fn element_index(&self, element: &ElementRef) -> Result<usize> {
        self.ensure_open()?;
        let mut parts = element.0.split(':');
        let (Some(session), Some(generation), Some(index)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(wire_error("no such element", "unknown element handle"));
        };

        let current = session == self.session.to_string()
            && generation == self.generation.to_string()
            && self.current.is_some();
        if !current {
            return Err(wire_error(
                "stale element reference",
                "element is not attached to the page document",
            ));
        }
        index
            .parse()
            .map_err(|_| wire_error("no such element", "unknown element handle"))
    }

    fn loaded(&mut self) -> Result<&mut LoadedPage> {
        self.current
            .as_mut()
            .ok_or_else(|| wire_error("no such element", "no document loaded"))
    }

    fn is_displayed(&self, index: usize) -> bool {
        self.current.as_ref().is_some_and(|page| {
            page.elements.get(index).is_some_and(|e| {
                !e.hidden && e.attached(page.loaded_at.elapsed())
            })
        })
    }

    fn origin(&self) -> String {
        self.current
            .as_ref()
            .map(|page| split_url(&page.url).0.to_string())
            .unwrap_or_default()
    }

    fn apply(&mut self, mut effect: ClickEffect) -> EffectOutcome {
        loop {
            match effect {
                ClickEffect::None => return EffectOutcome::Done,
                ClickEffect::Navigate(path) => {
                    return EffectOutcome::Navigate(format!("{}{}", self.origin(), path))
                }
                ClickEffect::Show(id) => {
                    if let Some(page) = self.current.as_mut() {
                        for element in page.elements.iter_mut() {
                            if element.id.as_deref() == Some(id.as_str()) {
                                element.hidden = false;
                                element.appears_after = Duration::ZERO;
                            }
                        }
                    }
                    return EffectOutcome::Done;
                }
                ClickEffect::Bump(name) => {
                    *self.site.lock().counters.entry(name).or_insert(0) += 1;
                    return EffectOutcome::Done;
                }
                ClickEffect::Hang => return EffectOutcome::Hang,
                ClickEffect::Submit(handler) => {
                    let values = self
                        .current
                        .as_ref()
                        .map(|page| page.values.clone())
                        .unwrap_or_default();
                    effect = handler(&values);
                }
            }
        }
    }
}

enum EffectOutcome {
    Done,
    Navigate(String),
    Hang,
}

#[async_trait]
impl Page for FakeBrowserPage {
    async fn goto(&mut self, url: &str) -> Result<()> {
        self.ensure_open()?;
        let (_, path) = split_url(url);
        let path = path
            .split(['?', '#'])
            .next()
            .filter(|p| !p.is_empty())
            .unwrap_or("/")
            .to_string();

        let page = {
            let mut state = self.site.lock();
            let page = state.pages.get(&path).cloned();
            if page.is_some() {
                *state.visits.entry(path.clone()).or_insert(0) += 1;
            }
            page
        };
        let page = page.ok_or_else(|| Error::navigation_failed(url, "HTTP 404 Not Found"))?;
        if page.load_times_out {
            return Err(Error::WebDriver {
                command: "navigate".to_string(),
                code: "timeout".to_string(),
                message: "Timed out receiving message from renderer".to_string(),
            });
        }

        self.generation += 1;
        self.current = Some(LoadedPage {
            url: url.to_string(),
            loaded_at: Instant::now(),
            ready_after: page.ready_after,
            elements: page.elements,
            values: FormValues::new(),
        });
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String> {
        self.ensure_open()?;
        Ok(self
            .current
            .as_ref()
            .map(|page| page.url.clone())
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn ready_state(&mut self) -> Result<String> {
        self.ensure_open()?;
        let loading = self
            .current
            .as_ref()
            .is_some_and(|page| page.loaded_at.elapsed() < page.ready_after);
        Ok(if loading { "loading" } else { "complete" }.to_string())
    }

    async fn query(&mut self, locator: &Locator) -> Result<Vec<ElementRef>> {
        self.ensure_open()?;
        let Some(page) = self.current.as_ref() else {
            return Ok(Vec::new());
        };
        let since_load = page.loaded_at.elapsed();
        Ok(page
            .elements
            .iter()
            .enumerate()
            .filter(|(_, e)| e.attached(since_load) && e.matches(&locator.kind))
            .map(|(i, _)| ElementRef(format!("{}:{}:{}", self.session, self.generation, i)))
            .collect())
    }

    async fn is_visible(&mut self, element: &ElementRef) -> Result<bool> {
        let index = self.element_index(element)?;
        Ok(self.is_displayed(index))
    }

    async fn text(&mut self, element: &ElementRef) -> Result<String> {
        let index = self.element_index(element)?;
        let page = self.loaded()?;
        Ok(page
            .elements
            .get(index)
            .map(|e| e.text.clone())
            .unwrap_or_default())
    }

    async fn fill(&mut self, element: &ElementRef, value: &str) -> Result<()> {
        let index = self.element_index(element)?;
        if !self.is_displayed(index) {
            return Err(wire_error("element not interactable", "element is not visible"));
        }
        let page = self.loaded()?;
        let Some(target) = page.elements.get(index) else {
            return Err(wire_error("no such element", "unknown element handle"));
        };
        if !target.is_editable() {
            return Err(wire_error(
                "invalid element state",
                "element is not an editable form control",
            ));
        }
        let key = target.form_key();
        page.values.insert(key, value.to_string());
        Ok(())
    }

    async fn click(&mut self, element: &ElementRef) -> Result<()> {
        let index = self.element_index(element)?;
        if !self.is_displayed(index) {
            return Err(wire_error("element not interactable", "element is not visible"));
        }
        let effect = self
            .current
            .as_ref()
            .and_then(|page| page.elements.get(index))
            .map(|e| e.on_click.clone())
            .unwrap_or_default();

        match self.apply(effect) {
            EffectOutcome::Done => Ok(()),
            EffectOutcome::Navigate(url) => self.goto(&url).await,
            EffectOutcome::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.current = None;

        let fail = {
            let mut state = self.site.lock();
            state.closed += 1;
            state.open = state.open.saturating_sub(1);
            state.fail_close
        };
        if fail {
            return Err(wire_error("unknown error", "browser crashed during teardown"));
        }
        Ok(())
    }
}

fn wire_error(code: &str, message: &str) -> Error {
    Error::WebDriver {
        command: "fake".to_string(),
        code: code.to_string(),
        message: message.to_string(),
    }
}

/// Split an absolute URL into origin and path
fn split_url(url: &str) -> (&str, &str) {
    match url.find("://") {
        Some(scheme_end) => {
            let host_start = scheme_end + 3;
            match url[host_start..].find('/') {
                Some(path_start) => url.split_at(host_start + path_start),
                None => (url, "/"),
            }
        }
        None => ("", url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn login_page() -> FakePage {
        FakePage::new()
            .element(FakeElement::new("input").id("email").attr("type", "email").label("E-mail"))
            .element(
                FakeElement::new("input")
                    .attr("name", "password")
                    .attr("type", "password")
                    .attr("aria-label", "Senha"),
            )
            .element(
                FakeElement::new("button")
                    .attr("class", "btn primary")
                    .attr("data-testid", "login")
                    .text("Entrar")
                    .xpath("html/body/div/form/button"),
            )
    }

    async fn open(site: &FakeSite, url: &str) -> Box<dyn Page> {
        let mut page = site.launch(&BrowserConfig::default()).await.unwrap();
        page.goto(url).await.unwrap();
        page
    }

    async fn count(page: &mut Box<dyn Page>, locator: &str) -> usize {
        page.query(&locator.parse().unwrap()).await.unwrap().len()
    }

    #[tokio::test]
    async fn test_locator_matching() {
        let site = FakeSite::new().page("/login", login_page());
        let mut page = open(&site, "http://app.test/login").await;

        assert_eq!(count(&mut page, "#email").await, 1);
        assert_eq!(count(&mut page, "input").await, 2);
        assert_eq!(count(&mut page, "input[type=password]").await, 1);
        assert_eq!(count(&mut page, "form button.btn.primary").await, 1);
        assert_eq!(count(&mut page, "button.secondary").await, 0);
        assert_eq!(count(&mut page, "#email, button").await, 2);
        assert_eq!(count(&mut page, "xpath=/html/body/div/form/button").await, 1);
        assert_eq!(count(&mut page, "text=Entrar").await, 1);
        assert_eq!(count(&mut page, "role=button[name=\"Entrar\"]").await, 1);
        assert_eq!(count(&mut page, "role=textbox").await, 2);
        assert_eq!(count(&mut page, "label=E-mail").await, 1);
        assert_eq!(count(&mut page, "label=Senha").await, 1);
        assert_eq!(count(&mut page, "testid=login").await, 1);
    }

    #[tokio::test]
    async fn test_stale_handles_after_navigation() {
        let site = FakeSite::new().page("/login", login_page());
        let mut page = open(&site, "http://app.test/login").await;

        let button = page.query(&Locator::text("Entrar")).await.unwrap().remove(0);
        page.goto("http://app.test/login").await.unwrap();

        let err = page.click(&button).await.unwrap_err();
        assert!(err.is_transient_interaction());
        assert_eq!(site.visits("/login"), 2);
    }

    #[tokio::test]
    async fn test_unknown_path_fails_navigation() {
        let site = FakeSite::new();
        let mut page = site.launch(&BrowserConfig::default()).await.unwrap();
        let err = page.goto("http://app.test/missing").await.unwrap_err();
        assert!(matches!(err, Error::NavigationFailed { .. }));
        assert_eq!(page.current_url().await.unwrap(), "about:blank");
    }

    #[tokio::test]
    async fn test_submit_sees_filled_values() {
        let site = FakeSite::new()
            .page(
                "/login",
                login_page().element(FakeElement::new("button").text("Go").on_click(
                    ClickEffect::submit(|values| {
                        if values.get("password").map(String::as_str) == Some("s3cret") {
                            ClickEffect::Navigate("/dashboard".into())
                        } else {
                            ClickEffect::Show("error".into())
                        }
                    }),
                )),
            )
            .page("/dashboard", FakePage::new());
        let mut page = open(&site, "http://app.test/login").await;

        let password = page.query(&Locator::label("Senha")).await.unwrap().remove(0);
        page.fill(&password, "s3cret").await.unwrap();
        let go = page.query(&Locator::text("Go")).await.unwrap().remove(0);
        page.click(&go).await.unwrap();

        assert_eq!(page.current_url().await.unwrap(), "http://app.test/dashboard");
    }

    #[tokio::test]
    async fn test_hidden_elements_are_not_interactable() {
        let site = FakeSite::new().page(
            "/",
            FakePage::new()
                .element(FakeElement::new("div").id("toast").text("Salvo").hidden())
                .element(FakeElement::new("button").text("Salvar").on_click(ClickEffect::Show("toast".into()))),
        );
        let mut page = open(&site, "http://app.test/").await;

        let toast = page.query(&Locator::css("#toast")).await.unwrap().remove(0);
        assert!(!page.is_visible(&toast).await.unwrap());
        assert!(page.click(&toast).await.unwrap_err().is_transient_interaction());

        let save = page.query(&Locator::text("Salvar")).await.unwrap().remove(0);
        page.click(&save).await.unwrap();
        assert!(page.is_visible(&toast).await.unwrap());
    }

    #[tokio::test]
    async fn test_close_bookkeeping() {
        let site = FakeSite::new().page("/", FakePage::new());
        let mut page = open(&site, "http://app.test").await;
        assert_eq!(site.open_sessions(), 1);

        page.close().await.unwrap();
        page.close().await.unwrap();
        assert_eq!(site.closed(), 1);
        assert_eq!(site.open_sessions(), 0);
        assert!(matches!(page.current_url().await, Err(Error::SessionClosed)));
    }

    #[test]
    fn test_split_url() {
        assert_eq!(split_url("http://app.test/a/b?x=1"), ("http://app.test", "/a/b?x=1"));
        assert_eq!(split_url("http://app.test"), ("http://app.test", "/"));
    }
}
