//! Page-driving seam.
//!
//! Elements are only ever addressed as `(locator, index)` and re-resolved on
//! every call: a click can navigate away and invalidate whatever the browser
//! handed out before, so nothing here hands out element handles.

pub mod webdriver;

#[cfg(test)]
pub mod fake;

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::{AppError, Result};

pub use webdriver::WebDriverProvider;

/// Poll interval used by the default [`PageDriver::wait_for`].
const WAIT_POLL_MS: u64 = 250;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl Locator {
    pub fn css(selector: &str) -> Self {
        Locator::Css(selector.to_string())
    }

    pub fn xpath(expr: &str) -> Self {
        Locator::XPath(expr.to_string())
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locator::Css(s) => write!(f, "css `{s}`"),
            Locator::XPath(s) => write!(f, "xpath `{s}`"),
        }
    }
}

#[async_trait]
pub trait PageDriver: Send {
    async fn goto(&mut self, url: &str) -> Result<()>;

    async fn go_back(&mut self) -> Result<()>;

    async fn current_url(&mut self) -> Result<String>;

    /// Number of elements currently matching `locator`.
    async fn count(&mut self, locator: &Locator) -> Result<usize>;

    async fn click(&mut self, locator: &Locator, index: usize) -> Result<()>;

    async fn scroll_into_view(&mut self, locator: &Locator, index: usize) -> Result<()>;

    /// Rendered text of every `child` inside the `index`-th `parent`.
    async fn child_texts(
        &mut self,
        parent: &Locator,
        index: usize,
        child: &Locator,
    ) -> Result<Vec<String>>;

    /// Rendered text of every element matching `locator`, in document order.
    async fn texts(&mut self, locator: &Locator) -> Result<Vec<String>>;

    async fn close(&mut self) -> Result<()>;

    /// Block until at least one element matches, or fail with `RenderTimeout`.
    async fn wait_for(&mut self, locator: &Locator, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.count(locator).await? > 0 {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(AppError::RenderTimeout {
                    locator: locator.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(Duration::from_millis(WAIT_POLL_MS).min(timeout)).await;
        }
    }
}

/// Opens private browser sessions. Each caller owns the page it gets.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    type Page: PageDriver;

    async fn open(&self) -> Result<Self::Page>;
}
