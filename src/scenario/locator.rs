//! Element locators
//!
//! Locators use a Playwright-like string syntax:
//!
//! ```text
//! css=#email              (also the default for unprefixed strings)
//! xpath=//button[1]       (also bare "//...", "/html/..." and "html/...")
//! text=Entrar
//! role=button[name="Entrar"]
//! label=Senha
//! testid=order-submit
//! text=Salvar >> nth=1    (pick the second match; default is the first)
//! ```
//!
//! Locators are resolved fresh by every action; nothing is cached.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::browser::ElementRef;
use crate::common::Error;

const NTH_SEPARATOR: &str = " >> ";

/// How an element is found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocatorKind {
    Css(String),
    XPath(String),
    /// Innermost element whose text contains the string
    Text(String),
    /// ARIA role with optional accessible-name substring
    Role { role: String, name: Option<String> },
    /// Form control by its label or `aria-label`
    Label(String),
    /// `data-testid` attribute
    TestId(String),
}

/// A parsed locator plus which match to use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Locator {
    pub kind: LocatorKind,
    pub nth: usize,
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self::from_kind(LocatorKind::Css(selector.into()))
    }

    pub fn xpath(path: impl Into<String>) -> Self {
        Self::from_kind(LocatorKind::XPath(path.into()))
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::from_kind(LocatorKind::Text(text.into()))
    }

    pub fn role(role: impl Into<String>, name: Option<&str>) -> Self {
        Self::from_kind(LocatorKind::Role {
            role: role.into(),
            name: name.map(str::to_string),
        })
    }

    pub fn label(label: impl Into<String>) -> Self {
        Self::from_kind(LocatorKind::Label(label.into()))
    }

    pub fn testid(id: impl Into<String>) -> Self {
        Self::from_kind(LocatorKind::TestId(id.into()))
    }

    fn from_kind(kind: LocatorKind) -> Self {
        Self { kind, nth: 0 }
    }

    /// Use the `n`th match (0-based) instead of the first
    pub fn nth(mut self, n: usize) -> Self {
        self.nth = n;
        self
    }

    /// Select this locator's match from a query result
    pub fn pick(&self, mut matches: Vec<ElementRef>) -> Option<ElementRef> {
        if self.nth < matches.len() {
            Some(matches.swap_remove(self.nth))
        } else {
            None
        }
    }

    /// Absolute document paths and index predicates break on any layout change
    pub fn is_positional(&self) -> bool {
        match &self.kind {
            LocatorKind::XPath(path) => {
                let path = path.trim_start_matches('/');
                path.starts_with("html/") || has_index_predicate(path)
            }
            _ => false,
        }
    }

    /// WebDriver location strategy and value
    pub fn to_webdriver(&self) -> (&'static str, String) {
        match &self.kind {
            LocatorKind::Css(selector) => ("css selector", selector.clone()),
            LocatorKind::XPath(path) => ("xpath", path.clone()),
            LocatorKind::Text(text) => {
                let lit = xpath_literal(text);
                (
                    "xpath",
                    format!(
                        "//body//*[contains(normalize-space(.), {lit})][not(.//*[contains(normalize-space(.), {lit})])]"
                    ),
                )
            }
            LocatorKind::Role { role, name } => ("xpath", role_xpath(role, name.as_deref())),
            LocatorKind::Label(label) => {
                let lit = xpath_literal(label);
                (
                    "xpath",
                    format!(
                        "//*[@id=//label[normalize-space(.)={lit}]/@for] \
                         | //label[normalize-space(.)={lit}]//*[self::input or self::textarea or self::select] \
                         | //*[@aria-label={lit}]"
                    ),
                )
            }
            LocatorKind::TestId(id) => ("css selector", format!("[data-testid={}]", css_string(id))),
        }
    }
}

impl FromStr for Locator {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| Error::InvalidLocator {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = input.trim();
        let (body, nth) = match trimmed.rsplit_once(NTH_SEPARATOR) {
            Some((body, suffix)) if suffix.trim_start().starts_with("nth=") => {
                let n = suffix.trim_start()["nth=".len()..]
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| invalid("nth= expects a non-negative integer"))?;
                (body.trim_end(), n)
            }
            _ => (trimmed, 0),
        };

        let kind = if let Some(rest) = body.strip_prefix("css=") {
            LocatorKind::Css(rest.trim().to_string())
        } else if let Some(rest) = body.strip_prefix("xpath=") {
            LocatorKind::XPath(rest.trim().to_string())
        } else if let Some(rest) = body.strip_prefix("text=") {
            LocatorKind::Text(unquote(rest.trim()).to_string())
        } else if let Some(rest) = body.strip_prefix("role=") {
            parse_role(rest.trim()).map_err(|reason| invalid(&reason))?
        } else if let Some(rest) = body.strip_prefix("label=") {
            LocatorKind::Label(unquote(rest.trim()).to_string())
        } else if let Some(rest) = body.strip_prefix("testid=") {
            LocatorKind::TestId(unquote(rest.trim()).to_string())
        } else if body.starts_with('/') || body.starts_with("html/") || body.starts_with("(/") {
            LocatorKind::XPath(body.to_string())
        } else {
            LocatorKind::Css(body.to_string())
        };

        let empty = match &kind {
            LocatorKind::Css(s)
            | LocatorKind::XPath(s)
            | LocatorKind::Text(s)
            | LocatorKind::Label(s)
            | LocatorKind::TestId(s) => s.is_empty(),
            LocatorKind::Role { role, .. } => role.is_empty(),
        };
        if empty {
            return Err(invalid("locator is empty"));
        }

        Ok(Self { kind, nth })
    }
}

impl TryFrom<String> for Locator {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Locator> for String {
    fn from(locator: Locator) -> Self {
        locator.to_string()
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            LocatorKind::Css(s) => write!(f, "css={}", s)?,
            LocatorKind::XPath(s) => write!(f, "xpath={}", s)?,
            LocatorKind::Text(s) => write!(f, "text={}", s)?,
            LocatorKind::Role { role, name: None } => write!(f, "role={}", role)?,
            LocatorKind::Role {
                role,
                name: Some(name),
            } => write!(f, "role={}[name=\"{}\"]", role, name)?,
            LocatorKind::Label(s) => write!(f, "label={}", s)?,
            LocatorKind::TestId(s) => write!(f, "testid={}", s)?,
        }
        if self.nth > 0 {
            write!(f, "{}nth={}", NTH_SEPARATOR, self.nth)?;
        }
        Ok(())
    }
}

/// Parse `button` or `button[name="Entrar"]`
fn parse_role(input: &str) -> Result<LocatorKind, String> {
    let (role, rest) = match input.find('[') {
        Some(i) => (&input[..i], Some(&input[i..])),
        None => (input, None),
    };

    if role.is_empty() || !role.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(format!("'{}' is not an ARIA role", role));
    }

    let name = match rest {
        None => None,
        Some(rest) => {
            let inner = rest
                .strip_prefix('[')
                .and_then(|r| r.strip_suffix(']'))
                .ok_or("unterminated role options")?;
            let value = inner
                .trim()
                .strip_prefix("name")
                .map(str::trim_start)
                .and_then(|r| r.strip_prefix('='))
                .ok_or("role options support only name=\"...\"")?;
            Some(unquote(value.trim()).to_string())
        }
    };

    Ok(LocatorKind::Role {
        role: role.to_ascii_lowercase(),
        name,
    })
}

fn unquote(s: &str) -> &str {
    for quote in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(quote) && s.ends_with(quote) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

fn has_index_predicate(path: &str) -> bool {
    path.as_bytes()
        .windows(2)
        .any(|w| w[0] == b'[' && w[1].is_ascii_digit())
}

/// Quote a string as an XPath 1.0 literal
pub(crate) fn xpath_literal(s: &str) -> String {
    if !s.contains('\'') {
        format!("'{}'", s)
    } else if !s.contains('"') {
        format!("\"{}\"", s)
    } else {
        let parts: Vec<String> = s.split('\'').map(|p| format!("'{}'", p)).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

fn css_string(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// XPath for elements with an ARIA role, explicit or implied by their tag
fn role_xpath(role: &str, name: Option<&str>) -> String {
    let explicit = format!("//*[@role='{}']", role);
    let candidates = match role {
        "button" => format!(
            "//button | //input[@type='submit' or @type='button' or @type='reset'] | {}",
            explicit
        ),
        "link" => format!("//a[@href] | {}", explicit),
        "textbox" => format!(
            "//input[not(@type) or @type='text' or @type='email' or @type='password' \
             or @type='search' or @type='tel' or @type='url' or @type='number'] | //textarea | {}",
            explicit
        ),
        "checkbox" => format!("//input[@type='checkbox'] | {}", explicit),
        "heading" => format!("//h1 | //h2 | //h3 | //h4 | //h5 | //h6 | {}", explicit),
        _ => explicit,
    };

    match name {
        None => candidates,
        Some(name) => {
            let lit = xpath_literal(name);
            format!(
                "({candidates})[contains(normalize-space(.), {lit}) or contains(@aria-label, {lit}) \
                 or contains(@value, {lit}) or contains(@placeholder, {lit}) \
                 or @id=//label[contains(normalize-space(.), {lit})]/@for]"
            )
        }
    }
}
