//! [`Page`] and [`Launcher`] backed by a W3C WebDriver server
//!
//! Sessions are driven through `thirtyfour`. Element handles handed to the
//! runner are local keys into the elements of the latest query, so nothing
//! outlives the action that resolved it.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use thirtyfour::error::WebDriverError;
use thirtyfour::{By, WebDriver, WebElement};

use crate::common::config::BrowserConfig;
use crate::common::{Error, Result};
use crate::scenario::locator::Locator;

use super::{ElementRef, Launcher, Page};

/// Launches browser sessions through a running driver
pub struct WebDriverLauncher {
    endpoint: String,
}

impl WebDriverLauncher {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Launcher for WebDriverLauncher {
    async fn launch(&self, browser: &BrowserConfig) -> Result<Box<dyn Page>> {
        let driver = WebDriver::new(self.endpoint.as_str(), capabilities(browser))
            .await
            .map_err(|e| Error::SessionCreate(first_line(&e)))?;

        tracing::info!(
            endpoint = %self.endpoint,
            browser = %browser.name,
            headless = browser.headless,
            "Browser session started"
        );
        Ok(Box::new(WebDriverPage::new(driver)))
    }
}

/// Capabilities for the configured browser
fn capabilities(browser: &BrowserConfig) -> Map<String, Value> {
    let mut caps = Map::new();
    caps.insert("browserName".to_string(), json!(browser.name));
    caps.insert("pageLoadStrategy".to_string(), json!(browser.page_load_strategy));

    let mut args = browser.args.clone();
    match browser.name.as_str() {
        "firefox" => {
            if browser.headless {
                args.push("-headless".to_string());
            }
            args.push(format!("--width={}", browser.viewport.width));
            args.push(format!("--height={}", browser.viewport.height));
            caps.insert("moz:firefoxOptions".to_string(), json!({ "args": args }));
        }
        _ => {
            if browser.headless {
                args.push("--headless=new".to_string());
            }
            args.push(format!(
                "--window-size={},{}",
                browser.viewport.width, browser.viewport.height
            ));
            caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
        }
    }
    caps
}

/// W3C error code of a driver failure
fn w3c_code(err: &WebDriverError) -> &'static str {
    match err {
        WebDriverError::NoSuchElement(..) => "no such element",
        WebDriverError::StaleElementReference(..) => "stale element reference",
        WebDriverError::ElementClickIntercepted(..) => "element click intercepted",
        WebDriverError::ElementNotInteractable(..) => "element not interactable",
        WebDriverError::InvalidElementState(..) => "invalid element state",
        WebDriverError::InvalidSelector(..) => "invalid selector",
        WebDriverError::Timeout(..) => "timeout",
        WebDriverError::ScriptTimeout(..) => "script timeout",
        WebDriverError::InvalidSessionId(..) => "invalid session id",
        WebDriverError::NoSuchWindow(..) => "no such window",
        // Transport-level timeouts carry no W3C code
        other if other.to_string().to_lowercase().contains("timed out") => "timeout",
        _ => "unknown error",
    }
}

fn first_line(err: &WebDriverError) -> String {
    err.to_string().lines().next().unwrap_or_default().to_string()
}

fn driver_error(command: &str, err: WebDriverError) -> Error {
    Error::WebDriver {
        command: command.to_string(),
        code: w3c_code(&err).to_string(),
        message: first_line(&err),
    }
}

/// Navigation errors are page failures unless the driver gave up waiting
fn navigation_error(url: &str, err: Error) -> Error {
    if err.is_timeout() {
        return err;
    }
    match err {
        Error::WebDriver { message, .. } => Error::navigation_failed(url, message),
        other => other,
    }
}

/// A page in a live WebDriver session
pub struct WebDriverPage {
    driver: Option<WebDriver>,
    /// Elements of the latest query, keyed by handle
    elements: HashMap<String, WebElement>,
    next_handle: u64,
}

impl WebDriverPage {
    fn new(driver: WebDriver) -> Self {
        Self {
            driver: Some(driver),
            elements: HashMap::new(),
            next_handle: 0,
        }
    }

    fn driver(&self) -> Result<&WebDriver> {
        self.driver.as_ref().ok_or(Error::SessionClosed)
    }

    fn element(&self, element: &ElementRef) -> Result<&WebElement> {
        self.elements.get(&element.0).ok_or_else(|| Error::WebDriver {
            command: "element lookup".to_string(),
            code: "stale element reference".to_string(),
            message: format!("handle {} is no longer valid", element.0),
        })
    }
}

#[async_trait]
impl Page for WebDriverPage {
    async fn goto(&mut self, url: &str) -> Result<()> {
        self.elements.clear();
        self.driver()?
            .goto(url)
            .await
            .map_err(|e| navigation_error(url, driver_error("navigate", e)))
    }

    async fn current_url(&mut self) -> Result<String> {
        let url = self
            .driver()?
            .current_url()
            .await
            .map_err(|e| driver_error("get current url", e))?;
        Ok(url.to_string())
    }

    async fn ready_state(&mut self) -> Result<String> {
        let ret = self
            .driver()?
            .execute("return document.readyState", Vec::new())
            .await
            .map_err(|e| driver_error("execute script", e))?;
        Ok(ret.json().as_str().unwrap_or_default().to_string())
    }

    async fn query(&mut self, locator: &Locator) -> Result<Vec<ElementRef>> {
        let (using, value) = locator.to_webdriver();
        let by = match using {
            "xpath" => By::XPath(value.as_str()),
            _ => By::Css(value.as_str()),
        };

        let found = self.driver()?.find_all(by).await.map_err(|e| match w3c_code(&e) {
            "invalid selector" => Error::InvalidLocator {
                input: locator.to_string(),
                reason: first_line(&e),
            },
            _ => driver_error("find elements", e),
        })?;

        self.elements.clear();
        let mut handles = Vec::with_capacity(found.len());
        for element in found {
            self.next_handle += 1;
            let handle = self.next_handle.to_string();
            self.elements.insert(handle.clone(), element);
            handles.push(ElementRef(handle));
        }
        Ok(handles)
    }

    async fn is_visible(&mut self, element: &ElementRef) -> Result<bool> {
        self.element(element)?
            .is_displayed()
            .await
            .map_err(|e| driver_error("is element displayed", e))
    }

    async fn text(&mut self, element: &ElementRef) -> Result<String> {
        self.element(element)?
            .text()
            .await
            .map_err(|e| driver_error("get element text", e))
    }

    async fn fill(&mut self, element: &ElementRef, value: &str) -> Result<()> {
        let element = self.element(element)?;
        element
            .clear()
            .await
            .map_err(|e| driver_error("element clear", e))?;
        element
            .send_keys(value)
            .await
            .map_err(|e| driver_error("element send keys", e))
    }

    async fn click(&mut self, element: &ElementRef) -> Result<()> {
        self.element(element)?
            .click()
            .await
            .map_err(|e| driver_error("element click", e))
    }

    async fn close(&mut self) -> Result<()> {
        self.elements.clear();
        let Some(driver) = self.driver.take() else {
            return Ok(());
        };
        driver.quit().await.map_err(|e| driver_error("delete session", e))?;
        tracing::debug!("Browser session deleted");
        Ok(())
    }
}
