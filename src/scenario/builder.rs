//! Programmatic scenario construction and reusable fixtures

use std::time::Duration;

use crate::browser::{ElementState, LoadState};
use crate::common::Result;

use super::config::{Action, Scenario, Step};
use super::locator::Locator;

/// Builds a [`Scenario`] step by step
///
/// `timeout` and `best_effort` apply to the most recently added step.
#[derive(Debug, Clone)]
pub struct ScenarioBuilder {
    scenario: Scenario,
}

impl ScenarioBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            scenario: Scenario {
                name: name.to_string(),
                description: None,
                tags: Vec::new(),
                vars: Default::default(),
                uses: Vec::new(),
                steps: Vec::new(),
            },
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.scenario.description = Some(description.to_string());
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.scenario.tags.push(tag.to_string());
        self
    }

    pub fn step(mut self, action: Action) -> Self {
        self.scenario.steps.push(Step::from(action));
        self
    }

    pub fn navigate(self, url: &str) -> Self {
        self.step(Action::Navigate {
            url: url.to_string(),
        })
    }

    pub fn fill(self, locator: Locator, value: &str) -> Self {
        self.step(Action::Fill {
            locator,
            value: value.to_string(),
        })
    }

    pub fn click(self, locator: Locator) -> Self {
        self.step(Action::Click { locator })
    }

    pub fn wait_for_state(self, state: LoadState) -> Self {
        self.step(Action::WaitForState { state })
    }

    pub fn wait_for(self, locator: Locator, state: ElementState) -> Self {
        self.step(Action::WaitFor { locator, state })
    }

    pub fn assert_visible(self, locator: Locator) -> Self {
        self.step(Action::AssertVisible {
            locator: Some(locator),
            text: None,
        })
    }

    pub fn assert_text_visible(self, text: &str) -> Self {
        self.step(Action::AssertVisible {
            locator: None,
            text: Some(text.to_string()),
        })
    }

    pub fn assert_hidden(self, locator: Locator) -> Self {
        self.step(Action::AssertHidden { locator })
    }

    pub fn assert_text(self, locator: Locator, contains: &str) -> Self {
        self.step(Action::AssertText {
            locator,
            contains: contains.to_string(),
        })
    }

    pub fn assert_url(self, contains: &str) -> Self {
        self.step(Action::AssertUrl {
            contains: contains.to_string(),
        })
    }

    pub fn expect_json(self, url: &str, fields: &[&str]) -> Self {
        self.step(Action::ExpectJson {
            url: url.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        })
    }

    pub fn sleep(self, duration: Duration) -> Self {
        self.step(Action::Sleep {
            ms: duration.as_millis() as u64,
        })
    }

    /// Override the timeout of the last step
    pub fn timeout(mut self, timeout: Duration) -> Self {
        if let Some(step) = self.scenario.steps.last_mut() {
            step.timeout_ms = Some(timeout.as_millis() as u64);
        }
        self
    }

    /// Tolerate a missing element or timeout on the last step
    pub fn best_effort(mut self) -> Self {
        if let Some(step) = self.scenario.steps.last_mut() {
            step.best_effort = true;
        }
        self
    }

    /// Append the steps of a fixture
    pub fn fixture(mut self, fixture: &LoginFixture) -> Self {
        self.scenario.steps.extend(fixture.steps());
        self
    }

    pub fn build(self) -> Result<Scenario> {
        self.scenario.validate()?;
        Ok(self.scenario)
    }
}

/// The "authenticated session" prefix shared by most scenarios
#[derive(Debug, Clone)]
pub struct LoginFixture {
    /// Login page, relative to the base URL
    pub path: String,
    pub email_field: Locator,
    pub password_field: Locator,
    pub submit: Locator,
    pub email: String,
    pub password: String,
    /// URL fragment expected after a successful login
    pub landing: Option<String>,
}

impl LoginFixture {
    /// Fixture for a conventional `/login` form with labelled fields
    pub fn new(email: &str, password: &str) -> Self {
        Self {
            path: "/login".to_string(),
            email_field: Locator::label("E-mail"),
            password_field: Locator::label("Senha"),
            submit: Locator::role("button", Some("Entrar")),
            email: email.to_string(),
            password: password.to_string(),
            landing: None,
        }
    }

    pub fn path(mut self, path: &str) -> Self {
        self.path = path.to_string();
        self
    }

    pub fn fields(mut self, email: Locator, password: Locator, submit: Locator) -> Self {
        self.email_field = email;
        self.password_field = password;
        self.submit = submit;
        self
    }

    /// Assert the URL contains `landing` after submitting
    pub fn landing(mut self, landing: &str) -> Self {
        self.landing = Some(landing.to_string());
        self
    }

    pub fn steps(&self) -> Vec<Step> {
        let mut steps = vec![
            Step::from(Action::Navigate {
                url: self.path.clone(),
            }),
            Step::from(Action::Fill {
                locator: self.email_field.clone(),
                value: self.email.clone(),
            }),
            Step::from(Action::Fill {
                locator: self.password_field.clone(),
                value: self.password.clone(),
            }),
            Step::from(Action::Click {
                locator: self.submit.clone(),
            }),
        ];
        if let Some(landing) = &self.landing {
            steps.push(Step::from(Action::AssertUrl {
                contains: landing.clone(),
            }));
        }
        steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_options_apply_to_last_step() {
        let scenario = ScenarioBuilder::new("menu")
            .navigate("/menu")
            .click(Locator::text("Pizzas"))
            .timeout(Duration::from_millis(1500))
            .best_effort()
            .assert_text_visible("Margherita")
            .build()
            .unwrap();

        assert_eq!(scenario.steps.len(), 3);
        assert_eq!(scenario.steps[0].timeout_ms, None);
        assert_eq!(scenario.steps[1].timeout_ms, Some(1500));
        assert!(scenario.steps[1].best_effort);
        assert!(!scenario.steps[2].best_effort);
    }

    #[test]
    fn test_login_fixture_steps() {
        let fixture = LoginFixture::new("admin@example.com", "s3cret").landing("/dashboard");
        let scenario = ScenarioBuilder::new("login")
            .fixture(&fixture)
            .assert_visible(Locator::role("heading", Some("Dashboard")))
            .build()
            .unwrap();

        assert_eq!(scenario.steps.len(), 6);
        assert_eq!(
            scenario.steps[0].action,
            Action::Navigate {
                url: "/login".to_string()
            }
        );
        assert_eq!(
            scenario.steps[2].action,
            Action::Fill {
                locator: Locator::label("Senha"),
                value: "s3cret".to_string()
            }
        );
        assert_eq!(
            scenario.steps[4].action,
            Action::AssertUrl {
                contains: "/dashboard".to_string()
            }
        );
    }

    #[test]
    fn test_builder_metadata() {
        let scenario = ScenarioBuilder::new("checkout")
            .description("Cart goes to WhatsApp")
            .tag("smoke")
            .tag("pdv")
            .navigate("/carrinho")
            .build()
            .unwrap();

        assert_eq!(scenario.description.as_deref(), Some("Cart goes to WhatsApp"));
        assert!(scenario.has_tag("pdv"));
        assert!(!scenario.has_tag("nightly"));
    }

    #[test]
    fn test_empty_builder_is_invalid() {
        assert!(ScenarioBuilder::new("empty").build().is_err());
    }
}
