use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::browser::{Locator, PageDriver, SessionProvider};
use crate::error::{AppError, Result};

/// W3C key under which element references are returned.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const HTTP_TIMEOUT_SECS: u64 = 60;

/// Collects `innerText` for a CSS selector in a single round-trip.
const TEXTS_SCRIPT: &str =
    "return Array.from(document.querySelectorAll(arguments[0])).map(e => e.innerText || '');";
const SCROLL_SCRIPT: &str = "arguments[0].scrollIntoView({block: 'center'});";

/// Starts Chrome sessions on a chromedriver-compatible endpoint.
#[derive(Debug, Clone)]
pub struct WebDriverProvider {
    client: reqwest::Client,
    base_url: String,
    headless: bool,
}

impl WebDriverProvider {
    pub fn new(base_url: &str, headless: bool) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            headless,
        })
    }

    fn capabilities(&self) -> Value {
        let mut args = vec!["--window-size=1920,1080", "--disable-gpu"];
        if self.headless {
            args.push("--headless=new");
        }
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args }
                }
            }
        })
    }
}

#[async_trait]
impl SessionProvider for WebDriverProvider {
    type Page = WebDriverSession;

    async fn open(&self) -> Result<WebDriverSession> {
        let url = format!("{}/session", self.base_url);
        let resp = self.client.post(&url).json(&self.capabilities()).send().await?;
        let value = unwrap_value(resp).await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::WebDriver("new session response had no sessionId".to_string()))?
            .to_string();
        debug!(session_id = %session_id, "WebDriver session opened");
        Ok(WebDriverSession {
            client: self.client.clone(),
            session_url: format!("{}/session/{}", self.base_url, session_id),
            closed: false,
        })
    }
}

/// One browser session. Dropped sessions are not deleted on the driver;
/// call [`PageDriver::close`].
#[derive(Debug)]
pub struct WebDriverSession {
    client: reqwest::Client,
    session_url: String,
    closed: bool,
}

impl WebDriverSession {
    async fn get(&self, path: &str) -> Result<Value> {
        let resp = self
            .client
            .get(format!("{}{}", self.session_url, path))
            .send()
            .await?;
        unwrap_value(resp).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value> {
        let resp = self
            .client
            .post(format!("{}{}", self.session_url, path))
            .json(&body)
            .send()
            .await?;
        unwrap_value(resp).await
    }

    async fn find_all(&self, scope: Option<&str>, locator: &Locator) -> Result<Vec<String>> {
        let path = match scope {
            Some(element_id) => format!("/element/{element_id}/elements"),
            None => "/elements".to_string(),
        };
        let value = self.post(&path, locator_body(locator)).await?;
        Ok(value
            .as_array()
            .map(|items| items.iter().filter_map(element_id).collect())
            .unwrap_or_default())
    }

    async fn nth(&self, locator: &Locator, index: usize) -> Result<String> {
        self.find_all(None, locator)
            .await?
            .into_iter()
            .nth(index)
            .ok_or_else(|| AppError::ElementMissing {
                locator: locator.to_string(),
                index,
            })
    }

    async fn element_text(&self, element_id: &str) -> Result<String> {
        let value = self.get(&format!("/element/{element_id}/text")).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }
}

#[async_trait]
impl PageDriver for WebDriverSession {
    async fn goto(&mut self, url: &str) -> Result<()> {
        self.post("/url", json!({ "url": url })).await?;
        Ok(())
    }

    async fn go_back(&mut self) -> Result<()> {
        self.post("/back", json!({})).await?;
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String> {
        let value = self.get("/url").await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AppError::WebDriver("current url was not a string".to_string()))
    }

    async fn count(&mut self, locator: &Locator) -> Result<usize> {
        Ok(self.find_all(None, locator).await?.len())
    }

    async fn click(&mut self, locator: &Locator, index: usize) -> Result<()> {
        let id = self.nth(locator, index).await?;
        self.post(&format!("/element/{id}/click"), json!({})).await?;
        Ok(())
    }

    async fn scroll_into_view(&mut self, locator: &Locator, index: usize) -> Result<()> {
        let id = self.nth(locator, index).await?;
        self.post(
            "/execute/sync",
            json!({ "script": SCROLL_SCRIPT, "args": [{ ELEMENT_KEY: id }] }),
        )
        .await?;
        Ok(())
    }

    async fn child_texts(
        &mut self,
        parent: &Locator,
        index: usize,
        child: &Locator,
    ) -> Result<Vec<String>> {
        let parent_id = self.nth(parent, index).await?;
        let mut texts = Vec::new();
        for id in self.find_all(Some(&parent_id), child).await? {
            texts.push(self.element_text(&id).await?);
        }
        Ok(texts)
    }

    async fn texts(&mut self, locator: &Locator) -> Result<Vec<String>> {
        match locator {
            Locator::Css(selector) => {
                let value = self
                    .post("/execute/sync", json!({ "script": TEXTS_SCRIPT, "args": [selector] }))
                    .await?;
                Ok(serde_json::from_value(value)?)
            }
            Locator::XPath(_) => {
                let mut texts = Vec::new();
                for id in self.find_all(None, locator).await? {
                    texts.push(self.element_text(&id).await?);
                }
                Ok(texts)
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let resp = self.client.delete(&self.session_url).send().await?;
        if let Err(e) = unwrap_value(resp).await {
            warn!("WebDriver session delete failed: {e}");
        }
        Ok(())
    }
}

fn locator_body(locator: &Locator) -> Value {
    match locator {
        Locator::Css(s) => json!({ "using": "css selector", "value": s }),
        Locator::XPath(s) => json!({ "using": "xpath", "value": s }),
    }
}

fn element_id(item: &Value) -> Option<String> {
    item.get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Strip the `{"value": ...}` envelope, turning protocol errors into `AppError::WebDriver`.
async fn unwrap_value(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    let body: Value = resp.json().await?;
    let value = body.get("value").cloned().unwrap_or(Value::Null);

    if !status.is_success() {
        let kind = value.get("error").and_then(Value::as_str).unwrap_or("unknown error");
        let message = value.get("message").and_then(Value::as_str).unwrap_or_default();
        return Err(AppError::WebDriver(format!("{status} {kind}: {message}")));
    }
    Ok(value)
}
