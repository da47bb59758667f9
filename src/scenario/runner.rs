//! Scenario runner
//!
//! Executes a scenario's steps in order against one exclusively owned
//! browser session:
//!
//! ```text
//! Idle -> Launching -> Running(0) -> ... -> Running(n) -> Passed | Failed | Errored -> Closed
//! ```
//!
//! Element actions poll until their readiness condition holds or the step
//! deadline passes. Every step is additionally bounded by a hard timeout, so a
//! hung driver call can never stall the scenario. The session is closed
//! exactly once, whatever the outcome.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::{self, StreamExt};
use tokio::sync::watch;
use tracing::Instrument;

use crate::browser::{ElementRef, ElementState, Launcher, LoadState, Page, Session};
use crate::common::config::Config;
use crate::common::{resolve_url, Error, Result};

use super::config::{Action, Scenario, Step};
use super::locator::Locator;
use super::probe;
use super::report::{ActionRecord, ActionStatus, Outcome, ScenarioReport};

/// Slack on top of a step timeout before the step is cut off
const STEP_GRACE: Duration = Duration::from_millis(250);

/// Bound for reading the final URL after the last step
const FINAL_URL_TIMEOUT: Duration = Duration::from_secs(1);

/// Lifecycle phase of a scenario run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Launching,
    Running(usize),
    Passed,
    Failed,
    Errored,
    Closed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::Launching => write!(f, "launching"),
            Phase::Running(i) => write!(f, "running({})", i),
            Phase::Passed => write!(f, "passed"),
            Phase::Failed => write!(f, "failed"),
            Phase::Errored => write!(f, "errored"),
            Phase::Closed => write!(f, "closed"),
        }
    }
}

/// Aborts every run holding one of its signals
#[derive(Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for AbortHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of an [`AbortHandle`]
#[derive(Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once abort is requested; never if the handle is dropped first
    pub async fn aborted(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Deadline-bounded polling
struct Poller {
    deadline: Instant,
    interval: Duration,
}

impl Poller {
    fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            interval,
        }
    }

    /// Sleep until the next check. Returns `false` once the deadline has passed.
    async fn tick(&self) -> bool {
        let now = Instant::now();
        if now >= self.deadline {
            return false;
        }
        tokio::time::sleep(self.interval.min(self.deadline - now)).await;
        true
    }
}

/// Bookkeeping for one run
struct Progress {
    phases: Vec<Phase>,
    actions: Vec<ActionRecord>,
    current: Option<usize>,
    step_started: Instant,
}

impl Progress {
    fn new(scenario: &Scenario) -> Self {
        let actions = scenario
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| ActionRecord {
                index,
                action: step.action.describe(),
                status: ActionStatus::Skipped,
                duration_ms: 0,
                locator: step.action.locator().map(|l| l.to_string()),
                error: None,
                code: None,
            })
            .collect();

        Self {
            phases: vec![Phase::Idle],
            actions,
            current: None,
            step_started: Instant::now(),
        }
    }

    fn enter(&mut self, phase: Phase) {
        tracing::trace!("Phase {}", phase);
        self.phases.push(phase);
    }

    fn begin(&mut self, index: usize) {
        self.current = Some(index);
        self.step_started = Instant::now();
        self.enter(Phase::Running(index));
    }

    fn finish(&mut self, status: ActionStatus, error: Option<&Error>) {
        let Some(index) = self.current else {
            return;
        };
        if let Some(record) = self.actions.get_mut(index) {
            record.status = status;
            record.duration_ms = self.step_started.elapsed().as_millis() as u64;
            record.error = error.map(|e| e.to_string());
            record.code = error.map(Error::code);
        }
    }
}

/// Runs scenarios against sessions created by a [`Launcher`]
pub struct ScenarioRunner {
    config: Arc<Config>,
    launcher: Arc<dyn Launcher>,
    http: reqwest::Client,
    abort: AbortSignal,
}

impl ScenarioRunner {
    pub fn new(config: Config, launcher: Arc<dyn Launcher>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeouts.http())
            .build()?;

        Ok(Self {
            config: Arc::new(config),
            launcher,
            http,
            abort: AbortHandle::new().signal(),
        })
    }

    /// Abort runs when `handle` fires
    pub fn with_abort(mut self, handle: &AbortHandle) -> Self {
        self.abort = handle.signal();
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run up to `jobs` scenarios concurrently; reports keep input order
    pub async fn run_all(&self, scenarios: &[Scenario], jobs: usize) -> Vec<ScenarioReport> {
        self.run_all_with(scenarios, jobs, |_| {}).await
    }

    /// Like [`ScenarioRunner::run_all`], calling `on_report` as each scenario finishes
    pub async fn run_all_with(
        &self,
        scenarios: &[Scenario],
        jobs: usize,
        on_report: impl Fn(&ScenarioReport),
    ) -> Vec<ScenarioReport> {
        let on_report = &on_report;
        stream::iter(scenarios.iter().map(|scenario| async move {
            let report = self.run(scenario).await;
            on_report(&report);
            report
        }))
        .buffered(jobs.max(1))
        .collect()
        .await
    }

    /// Run one scenario in a fresh session
    pub async fn run(&self, scenario: &Scenario) -> ScenarioReport {
        let span = tracing::info_span!("scenario", name = %scenario.name);
        self.run_in_session(scenario).instrument(span).await
    }

    async fn run_in_session(&self, scenario: &Scenario) -> ScenarioReport {
        let started = Instant::now();
        let mut progress = Progress::new(scenario);
        tracing::info!(scenario = %scenario.name, steps = scenario.steps.len(), "Running scenario");

        for warning in scenario.warnings() {
            tracing::warn!(scenario = %scenario.name, "{}", warning);
        }

        progress.enter(Phase::Launching);
        let timeouts = &self.config.timeouts;
        let mut abort = self.abort.clone();
        let launch = tokio::select! {
            result = Session::open(
                self.launcher.clone(),
                &self.config.browser,
                timeouts.launch(),
                timeouts.teardown(),
            ) => result,
            _ = abort.aborted() => Err(Error::Aborted),
        };

        let mut session = match launch {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(scenario = %scenario.name, "Failed to start browser session: {}", e);
                let outcome = Outcome::from_error(&e, None);
                return self.finish(scenario, outcome, None, progress, started);
            }
        };

        enum Interrupt {
            Done(Outcome),
            Aborted,
            Expired,
        }

        let interrupt = tokio::select! {
            outcome = self.execute(&mut session, scenario, &mut progress) => Interrupt::Done(outcome),
            _ = abort.aborted() => Interrupt::Aborted,
            _ = tokio::time::sleep(timeouts.scenario()) => Interrupt::Expired,
        };

        let outcome = match interrupt {
            Interrupt::Done(outcome) => outcome,
            Interrupt::Aborted => {
                tracing::warn!(scenario = %scenario.name, "Scenario aborted");
                progress.finish(ActionStatus::Failed, Some(&Error::Aborted));
                Outcome::from_error(&Error::Aborted, progress.current)
            }
            Interrupt::Expired => {
                let error = Error::action_timeout("scenario", timeouts.scenario());
                tracing::warn!(scenario = %scenario.name, "{}", error);
                progress.finish(ActionStatus::Failed, Some(&error));
                Outcome::from_error(&error, progress.current)
            }
        };

        let final_url = match session.page() {
            Ok(page) => tokio::time::timeout(FINAL_URL_TIMEOUT, page.current_url())
                .await
                .ok()
                .and_then(|r| r.ok()),
            Err(_) => None,
        };

        session.close().await;
        self.finish(scenario, outcome, final_url, progress, started)
    }

    fn finish(
        &self,
        scenario: &Scenario,
        outcome: Outcome,
        final_url: Option<String>,
        mut progress: Progress,
        started: Instant,
    ) -> ScenarioReport {
        progress.enter(match outcome {
            Outcome::Pass => Phase::Passed,
            Outcome::Fail { .. } => Phase::Failed,
            Outcome::Error { .. } => Phase::Errored,
        });
        progress.enter(Phase::Closed);

        let elapsed = started.elapsed();
        match &outcome {
            Outcome::Pass => tracing::info!(
                scenario = %scenario.name,
                duration_ms = elapsed.as_millis() as u64,
                "Scenario passed"
            ),
            Outcome::Fail {
                reason,
                failed_action_index,
                ..
            } => tracing::warn!(
                scenario = %scenario.name,
                step = failed_action_index + 1,
                final_url = final_url.as_deref().unwrap_or("-"),
                "Scenario failed: {}",
                reason
            ),
            Outcome::Error { cause, .. } => tracing::error!(
                scenario = %scenario.name,
                "Scenario errored: {}",
                cause
            ),
        }

        ScenarioReport::new(
            &scenario.name,
            outcome,
            elapsed,
            final_url,
            progress.actions,
            progress.phases,
        )
    }

    /// Run every step in order, stopping at the first non-tolerated failure
    async fn execute(&self, session: &mut Session, scenario: &Scenario, progress: &mut Progress) -> Outcome {
        for (index, step) in scenario.steps.iter().enumerate() {
            progress.begin(index);
            tracing::debug!(step = index + 1, "{}", step.action.describe());

            let result = match session.page() {
                Ok(page) => self.perform(page, step).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => progress.finish(ActionStatus::Passed, None),
                Err(e) if step.best_effort && e.is_recoverable() => {
                    tracing::warn!(step = index + 1, "Best-effort step tolerated: {}", e);
                    progress.finish(ActionStatus::Tolerated, Some(&e));
                }
                Err(e) => {
                    tracing::debug!(step = index + 1, "Step failed: {}", e);
                    progress.finish(ActionStatus::Failed, Some(&e));
                    return Outcome::from_error(&e, Some(index));
                }
            }
        }
        Outcome::Pass
    }

    /// Timeout for a step: explicit override or the default for its action
    fn step_timeout(&self, step: &Step) -> Duration {
        if let Some(ms) = step.timeout_ms {
            return Duration::from_millis(ms);
        }
        let timeouts = &self.config.timeouts;
        match &step.action {
            Action::Navigate { .. } | Action::WaitForState { .. } | Action::ExpectJson { .. } => {
                timeouts.navigation()
            }
            Action::Sleep { ms } => Duration::from_millis(*ms) + timeouts.action(),
            _ => timeouts.action(),
        }
    }

    async fn perform(&self, page: &mut dyn Page, step: &Step) -> Result<()> {
        let timeout = self.step_timeout(step);
        let hard_limit = timeout + self.config.timeouts.poll_interval() + STEP_GRACE;

        match tokio::time::timeout(hard_limit, self.dispatch(page, &step.action, timeout)).await {
            Ok(Err(e)) if e.is_timeout() => {
                tracing::debug!("{} gave up waiting: {}", step.action.describe(), e);
                Err(Error::action_timeout(step.action.describe(), timeout))
            }
            Ok(result) => result,
            Err(_) => Err(Error::action_timeout(step.action.describe(), timeout)),
        }
    }

    async fn dispatch(&self, page: &mut dyn Page, action: &Action, timeout: Duration) -> Result<()> {
        let base_url = &self.config.target.base_url;
        let poller = || Poller::new(timeout, self.config.timeouts.poll_interval());

        match action {
            Action::Navigate { url } => {
                let url = resolve_url(base_url, url);
                page.goto(&url).await
            }

            Action::Fill { locator, value } => {
                let poller = poller();
                loop {
                    let element = actionable(page, locator, &poller, action, timeout).await?;
                    match page.fill(&element, value).await {
                        Err(e) if e.is_transient_interaction() => {
                            tracing::debug!("Retrying fill {}: {}", locator, e);
                            if !poller.tick().await {
                                return Err(Error::action_timeout(action.describe(), timeout));
                            }
                        }
                        result => return result,
                    }
                }
            }

            Action::Click { locator } => {
                let poller = poller();
                loop {
                    let element = actionable(page, locator, &poller, action, timeout).await?;
                    match page.click(&element).await {
                        Err(e) if e.is_transient_interaction() => {
                            tracing::debug!("Retrying click {}: {}", locator, e);
                            if !poller.tick().await {
                                return Err(Error::action_timeout(action.describe(), timeout));
                            }
                        }
                        result => return result,
                    }
                }
            }

            Action::WaitForState { state } => wait_for_load(page, *state, &poller(), action, timeout).await,

            Action::WaitFor { locator, state } => {
                let poller = poller();
                loop {
                    let matches = query(page, locator).await?;
                    let found = !matches.is_empty();
                    let satisfied = match state {
                        ElementState::Attached => locator.pick(matches).is_some(),
                        ElementState::Detached => locator.pick(matches).is_none(),
                        ElementState::Visible => visible(page, locator.pick(matches)).await?,
                        ElementState::Hidden => !visible(page, locator.pick(matches)).await?,
                    };
                    if satisfied {
                        return Ok(());
                    }
                    if !poller.tick().await {
                        let missing = matches!(state, ElementState::Attached | ElementState::Visible);
                        return Err(if missing && !found {
                            Error::locator_not_found(locator)
                        } else {
                            Error::action_timeout(action.describe(), timeout)
                        });
                    }
                }
            }

            Action::AssertVisible { .. } => {
                let Some(locator) = action.visible_target() else {
                    return Err(Error::Internal("assert_visible without a target".to_string()));
                };
                let poller = poller();
                loop {
                    let matches = query(page, &locator).await?;
                    let found = locator.nth < matches.len();
                    if visible(page, locator.pick(matches)).await? {
                        return Ok(());
                    }
                    if !poller.tick().await {
                        let actual = if found {
                            "element present but not visible"
                        } else {
                            "no matching element"
                        };
                        return Err(Error::assertion_failed(format!("{} to be visible", locator), actual));
                    }
                }
            }

            Action::AssertHidden { locator } => {
                let poller = poller();
                loop {
                    let matches = query(page, locator).await?;
                    if !visible(page, locator.pick(matches)).await? {
                        return Ok(());
                    }
                    if !poller.tick().await {
                        return Err(Error::assertion_failed(
                            format!("{} to be hidden", locator),
                            "element is visible",
                        ));
                    }
                }
            }

            Action::AssertText { locator, contains } => {
                let poller = poller();
                let mut last_seen: Option<String> = None;
                loop {
                    let matches = query(page, locator).await?;
                    if let Some(element) = locator.pick(matches) {
                        match page.text(&element).await {
                            Ok(text) if text.contains(contains.as_str()) => return Ok(()),
                            Ok(text) => last_seen = Some(text),
                            Err(e) if e.is_transient_interaction() => {}
                            Err(e) => return Err(e),
                        }
                    }
                    if !poller.tick().await {
                        return Err(Error::assertion_failed(
                            format!("{} to contain {:?}", locator, contains),
                            last_seen
                                .map(|t| format!("{:?}", t))
                                .unwrap_or_else(|| "no matching element".to_string()),
                        ));
                    }
                }
            }

            Action::AssertUrl { contains } => {
                let poller = poller();
                loop {
                    let url = page.current_url().await?;
                    if url.contains(contains.as_str()) {
                        return Ok(());
                    }
                    if !poller.tick().await {
                        return Err(Error::assertion_failed(format!("URL containing {:?}", contains), url));
                    }
                }
            }

            Action::ExpectJson { url, fields } => {
                let url = resolve_url(base_url, url);
                let body = probe::fetch_json(&self.http, &url).await?;
                let missing = probe::missing_fields(&body, fields);
                if missing.is_empty() {
                    Ok(())
                } else {
                    Err(Error::assertion_failed(
                        format!("fields {:?} in {}", fields, url),
                        format!("missing {}", missing.join(", ")),
                    ))
                }
            }

            Action::Sleep { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                Ok(())
            }
        }
    }
}

/// Resolve a locator, treating transient driver errors as "no match yet"
async fn query(page: &mut dyn Page, locator: &Locator) -> Result<Vec<ElementRef>> {
    match page.query(locator).await {
        Err(e) if e.is_transient_interaction() => Ok(Vec::new()),
        result => result,
    }
}

async fn visible(page: &mut dyn Page, element: Option<ElementRef>) -> Result<bool> {
    let Some(element) = element else {
        return Ok(false);
    };
    match page.is_visible(&element).await {
        Err(e) if e.is_transient_interaction() => Ok(false),
        result => result,
    }
}

/// Wait until the locator's match exists and is displayed
async fn actionable(
    page: &mut dyn Page,
    locator: &Locator,
    poller: &Poller,
    action: &Action,
    timeout: Duration,
) -> Result<ElementRef> {
    let mut found = false;
    loop {
        let matches = query(page, locator).await?;
        if let Some(element) = locator.pick(matches) {
            found = true;
            if visible(page, Some(element.clone())).await? {
                return Ok(element);
            }
        }
        if !poller.tick().await {
            return Err(if found {
                Error::action_timeout(action.describe(), timeout)
            } else {
                Error::locator_not_found(locator)
            });
        }
    }
}

async fn wait_for_load(
    page: &mut dyn Page,
    state: LoadState,
    poller: &Poller,
    action: &Action,
    timeout: Duration,
) -> Result<()> {
    loop {
        let ready_state = page.ready_state().await?;
        if state.satisfied_by(&ready_state) {
            return Ok(());
        }
        if !poller.tick().await {
            return Err(Error::action_timeout(action.describe(), timeout));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_abort_signal() {
        let handle = AbortHandle::new();
        let mut signal = handle.signal();
        assert!(!signal.is_aborted());

        let waiter = tokio::spawn(async move {
            signal.aborted().await;
        });
        handle.abort();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();

        // Signals taken after the abort see it immediately
        let mut late = handle.signal();
        assert!(late.is_aborted());
        late.aborted().await;
    }

    #[tokio::test]
    async fn test_dropped_handle_never_aborts() {
        let mut signal = AbortHandle::new().signal();
        let result = tokio::time::timeout(Duration::from_millis(50), signal.aborted()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_poller_respects_deadline() {
        let poller = Poller::new(Duration::from_millis(30), Duration::from_millis(10));
        let started = Instant::now();
        let mut ticks = 0;
        while poller.tick().await {
            ticks += 1;
        }
        assert!(ticks >= 2);
        assert!(started.elapsed() < Duration::from_millis(200));
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Running(3).to_string(), "running(3)");
        assert_eq!(Phase::Closed.to_string(), "closed");
    }
}
