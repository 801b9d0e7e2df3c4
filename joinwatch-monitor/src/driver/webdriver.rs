//! W3C WebDriver implementation of [`Page`]
//!
//! Talks to a WebDriver server (chromedriver, geckodriver) over HTTP with
//! `reqwest`. Locator chains are resolved one step at a time: the first step
//! searches the document, later steps search inside each element the previous
//! step matched.

use super::{DriverError, DriverResult, Locator, Page, Query};
use async_trait::async_trait;
use joinwatch_common::config::DriverConfig;
use reqwest::Method;
use serde_json::{json, Value};
use std::time::Duration;

/// Key under which W3C WebDriver returns element references
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
const ESCAPE_KEY: &str = "\u{E00C}";
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// One browser session on a WebDriver server
pub struct WebDriverPage {
    http_client: reqwest::Client,
    base_url: String,
    session_id: String,
}

impl WebDriverPage {
    /// Open a new browser session
    pub async fn connect(config: &DriverConfig) -> DriverResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| DriverError::Network(e.to_string()))?;
        let base_url = config.webdriver_url.trim_end_matches('/').to_string();

        tracing::debug!(url = %base_url, browser = %config.browser, "Creating WebDriver session");

        let response = http_client
            .post(format!("{}/session", base_url))
            .json(&capabilities(config))
            .send()
            .await
            .map_err(|e| DriverError::Network(e.to_string()))?;
        let value = read_value(response).await?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Parse("sessionId missing from new session".to_string()))?
            .to_string();

        tracing::info!(session = %session_id, "WebDriver session created");

        Ok(Self {
            http_client,
            base_url,
            session_id,
        })
    }

    /// End the browser session
    pub async fn close(&self) -> DriverResult<()> {
        self.command(Method::DELETE, "", None, None).await?;
        tracing::info!(session = %self.session_id, "WebDriver session closed");
        Ok(())
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        timeout: Option<Duration>,
    ) -> DriverResult<Value> {
        let url = format!("{}/session/{}{}", self.base_url, self.session_id, path);
        let mut request = self.http_client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DriverError::Timeout(url.clone())
            } else {
                DriverError::Network(e.to_string())
            }
        })?;

        read_value(response).await
    }

    async fn find_elements(&self, parent: Option<&str>, query: &Query) -> DriverResult<Vec<String>> {
        let (using, selector) = selector_for(query, parent.is_some());
        let path = match parent {
            Some(id) => format!("/element/{}/elements", id),
            None => "/elements".to_string(),
        };
        let value = self
            .command(
                Method::POST,
                &path,
                Some(json!({ "using": using, "value": selector })),
                None,
            )
            .await?;
        element_ids(&value)
    }

    async fn resolve(&self, locator: &Locator) -> DriverResult<Vec<String>> {
        let mut scope: Option<Vec<String>> = None;

        for step in locator.steps() {
            let mut found = match &scope {
                None => self.find_elements(None, &step.query).await?,
                Some(parents) => {
                    let mut all = Vec::new();
                    for parent in parents {
                        all.extend(self.find_elements(Some(parent), &step.query).await?);
                    }
                    all
                }
            };
            if let Some(n) = step.nth {
                found = found.into_iter().nth(n).into_iter().collect();
            }
            scope = Some(found);
        }

        Ok(scope.unwrap_or_default())
    }

    async fn resolve_first(&self, locator: &Locator) -> DriverResult<String> {
        self.resolve(locator)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DriverError::NoMatch(locator.to_string()))
    }
}

#[async_trait]
impl Page for WebDriverPage {
    async fn goto(&self, url: &str, timeout: Duration) -> DriverResult<()> {
        tracing::debug!(url = %url, "Navigating");
        self.command(Method::POST, "/url", Some(json!({ "url": url })), Some(timeout))
            .await?;
        Ok(())
    }

    async fn reload(&self) -> DriverResult<()> {
        self.command(Method::POST, "/refresh", Some(json!({})), None).await?;
        Ok(())
    }

    async fn title(&self) -> DriverResult<String> {
        let value = self.command(Method::GET, "/title", None, None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn count(&self, locator: &Locator) -> DriverResult<usize> {
        Ok(self.resolve(locator).await?.len())
    }

    async fn inner_text(&self, locator: &Locator) -> DriverResult<String> {
        let id = self.resolve_first(locator).await?;
        let value = self
            .command(Method::GET, &format!("/element/{}/text", id), None, None)
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn click(&self, locator: &Locator) -> DriverResult<()> {
        let id = self.resolve_first(locator).await?;
        self.command(
            Method::POST,
            &format!("/element/{}/click", id),
            Some(json!({})),
            None,
        )
        .await?;
        Ok(())
    }

    async fn press_escape(&self) -> DriverResult<()> {
        let actions = json!({
            "actions": [{
                "type": "key",
                "id": "keyboard",
                "actions": [
                    { "type": "keyDown", "value": ESCAPE_KEY },
                    { "type": "keyUp", "value": ESCAPE_KEY }
                ]
            }]
        });
        self.command(Method::POST, "/actions", Some(actions), None).await?;
        Ok(())
    }
}

/// Unwrap the `value` member of a WebDriver response, mapping error payloads
async fn read_value(response: reqwest::Response) -> DriverResult<Value> {
    let status = response.status();
    let mut payload: Value = response
        .json()
        .await
        .map_err(|e| DriverError::Parse(e.to_string()))?;
    let value = payload.get_mut("value").map(Value::take).unwrap_or(Value::Null);

    if status.is_success() {
        return Ok(value);
    }

    let error = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    if error == "timeout" {
        Err(DriverError::Timeout(message))
    } else {
        Err(DriverError::Protocol(error, message))
    }
}

fn element_ids(value: &Value) -> DriverResult<Vec<String>> {
    let items = value
        .as_array()
        .ok_or_else(|| DriverError::Parse("expected an element list".to_string()))?;
    Ok(items
        .iter()
        .filter_map(|item| item.get(ELEMENT_KEY).and_then(Value::as_str))
        .map(str::to_string)
        .collect())
}

/// New-session payload for the configured browser
pub fn capabilities(config: &DriverConfig) -> Value {
    if config.browser.eq_ignore_ascii_case("firefox") {
        let mut args = Vec::new();
        if config.headless {
            args.push("-headless".to_string());
        }
        return json!({
            "capabilities": { "alwaysMatch": {
                "browserName": "firefox",
                "moz:firefoxOptions": { "args": args }
            }}
        });
    }

    let mut args = vec![
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--window-size=1280,720".to_string(),
    ];
    if config.headless {
        args.push("--headless=new".to_string());
    }
    if let Some(dir) = &config.user_data_dir {
        args.push(format!("--user-data-dir={}", dir.display()));
    }
    if let Some(agent) = &config.user_agent {
        args.push(format!("--user-agent={}", agent));
    }

    json!({
        "capabilities": { "alwaysMatch": {
            "browserName": config.browser,
            "goog:chromeOptions": { "args": args }
        }}
    })
}

/// Elements that carry an ARIA role without an explicit attribute
fn implicit_role_tags(role: &str) -> &'static [&'static str] {
    match role {
        "list" => &["ul", "ol"],
        "listitem" => &["li"],
        "dialog" => &["dialog"],
        "button" => &["button"],
        _ => &[],
    }
}

fn css_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn xpath_literal(value: &str) -> String {
    if value.contains('\'') {
        format!("\"{}\"", value)
    } else {
        format!("'{}'", value)
    }
}

/// Translate a query into a WebDriver location strategy and selector
///
/// `scoped` is true when searching inside another element, which makes XPath
/// selectors relative.
pub fn selector_for(query: &Query, scoped: bool) -> (&'static str, String) {
    match query {
        Query::Role { role, name } => {
            let name_filter = name
                .as_ref()
                .map(|n| format!("[aria-label*=\"{}\" i]", css_string(n)))
                .unwrap_or_default();
            let mut selectors = vec![format!("[role=\"{}\"]{}", css_string(role), name_filter)];
            for tag in implicit_role_tags(role) {
                selectors.push(format!("{}{}", tag, name_filter));
            }
            ("css selector", selectors.join(", "))
        }
        Query::Label(label) => (
            "css selector",
            format!("[aria-label=\"{}\"]", css_string(label)),
        ),
        Query::AttrContains { attr, value } => (
            "css selector",
            format!("[{}*=\"{}\" i]", attr, css_string(value)),
        ),
        Query::Css(selector) => ("css selector", selector.clone()),
        Query::TextPrefix(prefix) => {
            let axis = if scoped { ".//" } else { "//" };
            (
                "xpath",
                format!(
                    "{}*[starts-with(normalize-space(text()), {})]",
                    axis,
                    xpath_literal(prefix)
                ),
            )
        }
    }
}
