//! Scenario definitions
//!
//! Scenarios are YAML documents with an ordered list of steps, each tagged by
//! `action`:
//!
//! ```yaml
//! name: login
//! uses: [fixtures/login.yaml]
//! vars:
//!   landing: /dashboard
//! steps:
//!   - action: assert_url
//!     contains: ${landing}
//!   - action: click
//!     locator: role=link[name="Cardápio"]
//!     timeout_ms: 3000
//! ```
//!
//! String values may reference `${name}`; `$$` is a literal `$`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::browser::{ElementState, LoadState};
use crate::common::{Error, Result};

use super::locator::Locator;

/// A complete scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Name of the scenario, also used for the report file
    pub name: String,
    /// What the scenario verifies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Labels used to select scenarios in a suite
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Variables for `${name}` substitution
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vars: BTreeMap<String, String>,
    /// Step fragments spliced in front of `steps`, relative to the scenario file
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uses: Vec<PathBuf>,
    /// The sequence of steps to execute
    pub steps: Vec<Step>,
}

/// A reusable list of steps referenced through `uses`
#[derive(Debug, Deserialize)]
struct Fragment {
    steps: Vec<Step>,
}

/// One action plus its options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(flatten)]
    pub action: Action,
    /// Override of the default timeout for this action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Continue the scenario if this step cannot find or wait for its element
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub best_effort: bool,
}

impl From<Action> for Step {
    fn from(action: Action) -> Self {
        Self {
            action,
            timeout_ms: None,
            best_effort: false,
        }
    }
}

/// A single browser or HTTP action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Open a URL, absolute or relative to the base URL
    Navigate { url: String },
    /// Replace the value of a form control
    Fill { locator: Locator, value: String },
    /// Click an element once it is visible
    Click { locator: Locator },
    /// Wait for the document to reach a load milestone
    WaitForState { state: LoadState },
    /// Wait for an element condition
    WaitFor {
        locator: Locator,
        #[serde(default)]
        state: ElementState,
    },
    /// Assert that an element, or some element containing `text`, is visible
    AssertVisible {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        locator: Option<Locator>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    /// Assert that no matching element is visible
    AssertHidden { locator: Locator },
    /// Assert that an element's text contains a string
    AssertText { locator: Locator, contains: String },
    /// Assert that the current URL contains a string
    AssertUrl { contains: String },
    /// Fetch a JSON endpoint and check that fields are present
    ExpectJson {
        url: String,
        #[serde(default)]
        fields: Vec<String>,
    },
    /// Fixed delay
    Sleep { ms: u64 },
}

impl Action {
    /// Short human description, e.g. `click text=Entrar`
    pub fn describe(&self) -> String {
        match self {
            Action::Navigate { url } => format!("navigate {}", url),
            Action::Fill { locator, .. } => format!("fill {}", locator),
            Action::Click { locator } => format!("click {}", locator),
            Action::WaitForState { state } => format!("wait_for_state {}", state),
            Action::WaitFor { locator, state } => format!("wait_for {} {}", locator, state),
            Action::AssertVisible { .. } => match self.visible_target() {
                Some(locator) => format!("assert_visible {}", locator),
                None => "assert_visible".to_string(),
            },
            Action::AssertHidden { locator } => format!("assert_hidden {}", locator),
            Action::AssertText { locator, contains } => {
                format!("assert_text {} contains {:?}", locator, contains)
            }
            Action::AssertUrl { contains } => format!("assert_url contains {:?}", contains),
            Action::ExpectJson { url, .. } => format!("expect_json {}", url),
            Action::Sleep { ms } => format!("sleep {}ms", ms),
        }
    }

    /// The element locator this action operates on, if any
    pub fn locator(&self) -> Option<Locator> {
        match self {
            Action::Fill { locator, .. }
            | Action::Click { locator }
            | Action::WaitFor { locator, .. }
            | Action::AssertHidden { locator }
            | Action::AssertText { locator, .. } => Some(locator.clone()),
            Action::AssertVisible { .. } => self.visible_target(),
            _ => None,
        }
    }

    /// Locator checked by `assert_visible`; `text` becomes a text locator
    pub fn visible_target(&self) -> Option<Locator> {
        match self {
            Action::AssertVisible {
                locator: Some(locator),
                ..
            } => Some(locator.clone()),
            Action::AssertVisible {
                locator: None,
                text: Some(text),
            } => Some(Locator::text(text.as_str())),
            _ => None,
        }
    }
}

impl Scenario {
    /// Parse a scenario from YAML, substituting `vars` and the scenario's own
    /// variables. Fragments are resolved relative to the current directory.
    pub fn from_yaml_with(yaml: &str, vars: &HashMap<String, String>) -> Result<Self> {
        let mut scenario = Self::parse("<inline>", yaml, vars)?;
        scenario.splice_fragments(Path::new("."), vars)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Load a scenario file, resolving its fragments relative to the file
    pub fn from_file(path: &Path, vars: &HashMap<String, String>) -> Result<Self> {
        let content = read(path)?;
        let mut scenario = Self::parse(&path.display().to_string(), &content, vars)?;
        let base = path.parent().unwrap_or(Path::new("."));
        scenario.splice_fragments(base, vars)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Load every `*.yaml`/`*.yml` file directly inside `dir`, sorted by path
    ///
    /// Subdirectories are not searched; they hold fragments.
    pub fn load_all(dir: &Path, vars: &HashMap<String, String>) -> Result<Vec<Self>> {
        let entries = std::fs::read_dir(dir).map_err(|e| Error::FileRead {
            path: dir.display().to_string(),
            error: e.to_string(),
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == "yaml" || e == "yml");
            if path.is_file() && is_yaml {
                paths.push(path);
            }
        }
        paths.sort();

        paths
            .iter()
            .map(|path| Self::from_file(path, vars))
            .collect()
    }

    fn parse(source: &str, yaml: &str, vars: &HashMap<String, String>) -> Result<Self> {
        let mut document: Value =
            serde_yaml::from_str(yaml).map_err(|e| Error::scenario_parse(source, e.to_string()))?;

        let vars = scenario_vars(source, &document, vars)?;
        interpolate_value(&mut document, &vars).map_err(|reason| Error::scenario_parse(source, reason))?;

        serde_yaml::from_value(document).map_err(|e| Error::scenario_parse(source, e.to_string()))
    }

    fn splice_fragments(&mut self, base: &Path, vars: &HashMap<String, String>) -> Result<()> {
        if self.uses.is_empty() {
            return Ok(());
        }

        let mut vars = vars.clone();
        vars.extend(self.vars.iter().map(|(k, v)| (k.clone(), v.clone())));

        let mut steps = Vec::new();
        for relative in &self.uses {
            let path = base.join(relative);
            let source = path.display().to_string();
            let content = read(&path)?;

            let mut document: Value = serde_yaml::from_str(&content)
                .map_err(|e| Error::scenario_parse(&source, e.to_string()))?;
            interpolate_value(&mut document, &vars)
                .map_err(|reason| Error::scenario_parse(&source, reason))?;
            let fragment: Fragment = serde_yaml::from_value(document)
                .map_err(|e| Error::scenario_parse(&source, e.to_string()))?;

            tracing::debug!("Spliced {} steps from {}", fragment.steps.len(), source);
            steps.extend(fragment.steps);
        }

        steps.append(&mut self.steps);
        self.steps = steps;
        Ok(())
    }

    /// Check structural rules serde cannot express
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: String| Err(Error::scenario_parse(&self.name, reason));

        if self.name.trim().is_empty() {
            return Err(Error::scenario_parse("<unnamed>", "scenario name is empty"));
        }
        if self.steps.is_empty() {
            return fail("scenario has no steps".to_string());
        }

        for (index, step) in self.steps.iter().enumerate() {
            let n = index + 1;
            if step.timeout_ms == Some(0) {
                return fail(format!("step {}: timeout_ms must be positive", n));
            }
            match &step.action {
                Action::Navigate { url } | Action::ExpectJson { url, .. } if url.trim().is_empty() => {
                    return fail(format!("step {}: url is empty", n));
                }
                Action::AssertVisible { locator, text } => {
                    if locator.is_some() == text.is_some() {
                        return fail(format!(
                            "step {}: assert_visible needs exactly one of 'locator' or 'text'",
                            n
                        ));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Non-fatal findings: positional locators and fixed sleeps
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for (index, step) in self.steps.iter().enumerate() {
            let n = index + 1;
            if let Some(locator) = step.action.locator() {
                if locator.is_positional() {
                    warnings.push(format!(
                        "step {}: positional locator '{}' breaks on layout changes; prefer role=, label=, text= or testid=",
                        n, locator
                    ));
                }
            }
            if let Action::Sleep { ms } = step.action {
                warnings.push(format!(
                    "step {}: fixed sleep of {} ms; prefer wait_for or wait_for_state",
                    n, ms
                ));
            }
        }
        warnings
    }

    /// Whether the scenario carries `tag`
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.display().to_string(),
        error: e.to_string(),
    })
}

/// Config variables overridden by the document's own `vars`. Each entry may
/// reference config variables and the entries declared before it.
fn scenario_vars(
    source: &str,
    document: &Value,
    base: &HashMap<String, String>,
) -> Result<HashMap<String, String>> {
    let mut vars = base.clone();
    let Some(own) = document.get("vars") else {
        return Ok(vars);
    };
    let Some(own) = own.as_mapping() else {
        return Err(Error::scenario_parse(source, "'vars' must be a mapping"));
    };

    for (key, value) in own {
        let key = key
            .as_str()
            .ok_or_else(|| Error::scenario_parse(source, "variable names must be strings"))?;
        let value = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => {
                return Err(Error::scenario_parse(
                    source,
                    format!("variable '{}' must be a scalar", key),
                ))
            }
        };
        let value = interpolate(&value, &vars).map_err(|reason| Error::scenario_parse(source, reason))?;
        vars.insert(key.to_string(), value);
    }
    Ok(vars)
}

fn interpolate_value(value: &mut Value, vars: &HashMap<String, String>) -> std::result::Result<(), String> {
    match value {
        Value::String(s) => {
            if s.contains('$') {
                *s = interpolate(s, vars)?;
            }
        }
        Value::Sequence(items) => {
            for item in items {
                interpolate_value(item, vars)?;
            }
        }
        Value::Mapping(map) => {
            for (_, item) in map.iter_mut() {
                interpolate_value(item, vars)?;
            }
        }
        Value::Tagged(tagged) => interpolate_value(&mut tagged.value, vars)?,
        _ => {}
    }
    Ok(())
}

/// Substitute `${name}` references; `$$` escapes a dollar sign
pub fn interpolate(input: &str, vars: &HashMap<String, String>) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(stripped) = after.strip_prefix('$') {
            out.push('$');
            rest = stripped;
        } else if let Some(body) = after.strip_prefix('{') {
            let end = body
                .find('}')
                .ok_or_else(|| format!("unterminated '${{' in \"{}\"", input))?;
            let name = body[..end].trim();
            let value = vars
                .get(name)
                .ok_or_else(|| format!("undefined variable '{}'", name))?;
            out.push_str(value);
            rest = &body[end + 1..];
        } else {
            out.push('$');
            rest = after;
        }
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> HashMap<String, String> {
        HashMap::from([
            ("base_url".to_string(), "http://localhost:3000".to_string()),
            ("email".to_string(), "admin@example.com".to_string()),
            ("password".to_string(), "s3cret".to_string()),
        ])
    }

    #[test]
    fn test_interpolate() {
        let vars = vars();
        assert_eq!(interpolate("${email}", &vars).unwrap(), "admin@example.com");
        assert_eq!(interpolate("R$$ 10,00", &vars).unwrap(), "R$ 10,00");
        assert_eq!(interpolate("R$ 10", &vars).unwrap(), "R$ 10");
        assert_eq!(
            interpolate("${base_url}/api/${ email }", &vars).unwrap(),
            "http://localhost:3000/api/admin@example.com"
        );
        assert!(interpolate("${missing}", &vars).unwrap_err().contains("missing"));
        assert!(interpolate("${email", &vars).is_err());
    }

    #[test]
    fn test_parse_all_actions() {
        let yaml = r##"
name: everything
tags: [smoke]
steps:
  - action: navigate
    url: /login
  - action: wait_for_state
    state: domcontentloaded
  - action: fill
    locator: label=E-mail
    value: ${email}
  - action: click
    locator: role=button[name="Entrar"]
    timeout_ms: 2000
  - action: wait_for
    locator: text=Carregando
    state: detached
  - action: assert_visible
    text: Dashboard
  - action: assert_hidden
    locator: "#error"
  - action: assert_text
    locator: testid=total
    contains: "R$$ 10"
  - action: assert_url
    contains: /dashboard
  - action: expect_json
    url: /api/fluxo-caixa
    fields: [data.total]
  - action: sleep
    ms: 500
    best_effort: true
"##;
        let scenario = Scenario::from_yaml_with(yaml, &vars()).unwrap();
        assert_eq!(scenario.steps.len(), 11);
        assert!(scenario.has_tag("smoke"));

        assert_eq!(
            scenario.steps[1].action,
            Action::WaitForState {
                state: LoadState::DomContentLoaded
            }
        );
        assert_eq!(
            scenario.steps[2].action,
            Action::Fill {
                locator: Locator::label("E-mail"),
                value: "admin@example.com".to_string()
            }
        );
        assert_eq!(scenario.steps[3].timeout_ms, Some(2000));
        assert_eq!(
            scenario.steps[4].action,
            Action::WaitFor {
                locator: Locator::text("Carregando"),
                state: ElementState::Detached
            }
        );
        assert_eq!(
            scenario.steps[5].action.visible_target(),
            Some(Locator::text("Dashboard"))
        );
        assert_eq!(
            scenario.steps[7].action,
            Action::AssertText {
                locator: Locator::testid("total"),
                contains: "R$ 10".to_string()
            }
        );
        assert!(scenario.steps[10].best_effort);
        assert!(!scenario.steps[0].best_effort);
    }

    #[test]
    fn test_scenario_vars_override_config() {
        let yaml = r##"
name: vars
vars:
  email: cashier@example.com
  start: ${base_url}/pdv
steps:
  - action: navigate
    url: ${start}
  - action: fill
    locator: "#email"
    value: ${email}
"##;
        let scenario = Scenario::from_yaml_with(yaml, &vars()).unwrap();
        assert_eq!(
            scenario.steps[0].action,
            Action::Navigate {
                url: "http://localhost:3000/pdv".to_string()
            }
        );
        assert!(matches!(
            &scenario.steps[1].action,
            Action::Fill { value, .. } if value == "cashier@example.com"
        ));
    }

    #[test]
    fn test_scenario_vars_resolve_in_order() {
        let yaml = "name: chained\nvars:\n  host: http://pdv.test\n  start: ${host}/pdv\nsteps:\n  - action: navigate\n    url: ${start}\n";
        let scenario = Scenario::from_yaml_with(yaml, &HashMap::new()).unwrap();
        assert_eq!(
            scenario.steps[0].action,
            Action::Navigate {
                url: "http://pdv.test/pdv".to_string()
            }
        );

        // Later entries are not visible to earlier ones
        let yaml = "name: reversed\nvars:\n  start: ${host}/pdv\n  host: http://pdv.test\nsteps:\n  - action: navigate\n    url: ${start}\n";
        let err = Scenario::from_yaml_with(yaml, &HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("host"));
    }

    #[test]
    fn test_undefined_variable_is_error() {
        let yaml = "name: x\nsteps:\n  - action: navigate\n    url: ${nowhere}\n";
        let err = Scenario::from_yaml_with(yaml, &HashMap::new()).unwrap_err();
        assert!(matches!(err, Error::ScenarioParse { .. }));
        assert!(err.to_string().contains("nowhere"));
    }

    #[test]
    fn test_unknown_action_is_error() {
        let yaml = "name: x\nsteps:\n  - action: hover\n    locator: a\n";
        let err = Scenario::from_yaml_with(yaml, &HashMap::new()).unwrap_err();
        assert!(matches!(err, Error::ScenarioParse { .. }));
    }

    #[test]
    fn test_invalid_locator_is_error() {
        let yaml = "name: x\nsteps:\n  - action: click\n    locator: role=\n";
        assert!(Scenario::from_yaml_with(yaml, &HashMap::new()).is_err());
    }

    #[test]
    fn test_validate() {
        let both = "name: x\nsteps:\n  - action: assert_visible\n    locator: a\n    text: b\n";
        assert!(Scenario::from_yaml_with(both, &HashMap::new()).is_err());

        let neither = "name: x\nsteps:\n  - action: assert_visible\n";
        assert!(Scenario::from_yaml_with(neither, &HashMap::new()).is_err());

        let empty = "name: x\nsteps: []\n";
        assert!(Scenario::from_yaml_with(empty, &HashMap::new()).is_err());

        let zero = "name: x\nsteps:\n  - action: click\n    locator: a\n    timeout_ms: 0\n";
        assert!(Scenario::from_yaml_with(zero, &HashMap::new()).is_err());
    }

    #[test]
    fn test_warnings() {
        let yaml = r#"
name: brittle
steps:
  - action: click
    locator: xpath=html/body/div[2]/div/button
  - action: sleep
    ms: 3000
  - action: click
    locator: role=button[name="Salvar"]
"#;
        let warnings = Scenario::from_yaml_with(yaml, &HashMap::new()).unwrap().warnings();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].starts_with("step 1: positional locator"));
        assert!(warnings[1].starts_with("step 2: fixed sleep of 3000 ms"));
    }

    #[test]
    fn test_fragments_are_spliced_before_steps() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("fixtures")).unwrap();
        std::fs::write(
            dir.path().join("fixtures/login.yaml"),
            "steps:\n  - action: navigate\n    url: /login\n  - action: fill\n    locator: \"#email\"\n    value: ${email}\n",
        )
        .unwrap();
        let path = dir.path().join("orders.yaml");
        std::fs::write(
            &path,
            "name: orders\nuses: [fixtures/login.yaml]\nvars:\n  email: waiter@example.com\nsteps:\n  - action: click\n    locator: text=Pedidos\n",
        )
        .unwrap();

        let scenario = Scenario::from_file(&path, &vars()).unwrap();
        assert_eq!(scenario.steps.len(), 3);
        assert!(matches!(&scenario.steps[0].action, Action::Navigate { url } if url == "/login"));
        assert!(matches!(
            &scenario.steps[1].action,
            Action::Fill { value, .. } if value == "waiter@example.com"
        ));
        assert!(matches!(&scenario.steps[2].action, Action::Click { .. }));

        let all = Scenario::load_all(dir.path(), &vars()).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "orders");
    }

    #[test]
    fn test_missing_fragment_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.yaml");
        std::fs::write(&path, "name: x\nuses: [nope.yaml]\nsteps:\n  - action: sleep\n    ms: 1\n").unwrap();
        assert!(matches!(
            Scenario::from_file(&path, &HashMap::new()),
            Err(Error::FileRead { .. })
        ));
    }
}
