//! JSON endpoint probe for `expect_json`
//!
//! Fetches an endpoint outside the browser and checks that fields are
//! present. Values and schemas are not validated.

use serde_json::Value;

use crate::common::{Error, Result};

/// GET `url` and parse the body as JSON
///
/// Transport errors and non-2xx statuses are navigation failures; a body
/// that is not JSON is an assertion failure. Timeouts are passed through so
/// the runner reports them as the step's timeout.
pub async fn fetch_json(http: &reqwest::Client, url: &str) -> Result<Value> {
    let transport = |e: reqwest::Error| {
        if e.is_timeout() {
            Error::Http(e)
        } else {
            Error::navigation_failed(url, e.to_string())
        }
    };

    let response = http
        .get(url)
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .map_err(transport)?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::navigation_failed(url, format!("HTTP {}", status)));
    }

    let body = response.text().await.map_err(transport)?;

    serde_json::from_str(&body).map_err(|e| {
        Error::assertion_failed(
            format!("JSON body from {}", url),
            format!("unparseable body ({})", e),
        )
    })
}

/// Follow a dotted path; numeric segments index arrays
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

/// Paths from `fields` that are absent from `value`
pub fn missing_fields(value: &Value, fields: &[String]) -> Vec<String> {
    fields
        .iter()
        .filter(|field| lookup(value, field).is_none())
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup() {
        let value = json!({
            "data": {
                "saldo": 0,
                "movimentos": [{"valor": 10.5}, {"valor": null}]
            }
        });

        assert_eq!(lookup(&value, "data.saldo"), Some(&json!(0)));
        assert_eq!(lookup(&value, "data.movimentos.0.valor"), Some(&json!(10.5)));
        assert_eq!(lookup(&value, "data.movimentos.1.valor"), Some(&Value::Null));
        assert_eq!(lookup(&value, "data.movimentos.2"), None);
        assert_eq!(lookup(&value, "data.saldo.x"), None);
        assert_eq!(lookup(&value, "data.movimentos.first"), None);
    }

    #[test]
    fn test_missing_fields() {
        let value = json!({"plano": "pro", "status": "ativo"});
        let fields = vec![
            "plano".to_string(),
            "status".to_string(),
            "vencimento".to_string(),
        ];
        assert_eq!(missing_fields(&value, &fields), vec!["vencimento".to_string()]);
    }
}
