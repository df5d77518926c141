//! In-memory site for exercising page-driving code without a browser.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::browser::{Locator, PageDriver, SessionProvider};
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Default)]
pub struct FakeElement {
    pub text: String,
    pub children: HashMap<Locator, Vec<String>>,
    /// Clicking navigates here.
    pub href: Option<String>,
}

impl FakeElement {
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Self::default()
        }
    }

    pub fn link(href: &str) -> Self {
        Self {
            href: Some(href.to_string()),
            ..Self::default()
        }
    }

    pub fn with_child(mut self, locator: &Locator, texts: &[&str]) -> Self {
        self.children
            .insert(locator.clone(), texts.iter().map(|t| t.to_string()).collect());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakePage {
    pub elements: HashMap<Locator, Vec<FakeElement>>,
}

impl FakePage {
    pub fn with(mut self, locator: &Locator, elements: Vec<FakeElement>) -> Self {
        self.elements.insert(locator.clone(), elements);
        self
    }
}

#[derive(Debug, Default)]
pub struct FakeSite {
    pub pages: HashMap<String, FakePage>,
    /// 1-based `goto` call numbers that fail with a WebDriver error.
    pub failing_gotos: HashSet<usize>,
    pub goto_calls: usize,
    /// 1-based `go_back` call numbers that fail with a WebDriver error.
    pub failing_backs: HashSet<usize>,
    pub back_calls: usize,
    /// Page replacements applied one per successful `go_back`, so a page
    /// can change while the caller is away from it.
    pub after_back: VecDeque<(String, FakePage)>,
    pub sessions_opened: usize,
    pub sessions_closed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FakeProvider {
    pub site: Arc<Mutex<FakeSite>>,
}

impl FakeProvider {
    pub fn new(site: FakeSite) -> Self {
        Self {
            site: Arc::new(Mutex::new(site)),
        }
    }
}

#[async_trait]
impl SessionProvider for FakeProvider {
    type Page = FakeBrowser;

    async fn open(&self) -> Result<FakeBrowser> {
        self.site.lock().unwrap().sessions_opened += 1;
        Ok(FakeBrowser {
            site: Arc::clone(&self.site),
            history: Vec::new(),
        })
    }
}

pub struct FakeBrowser {
    site: Arc<Mutex<FakeSite>>,
    history: Vec<String>,
}

impl FakeBrowser {
    fn current(&self) -> Option<&String> {
        self.history.last()
    }

    fn elements(&self, locator: &Locator) -> Vec<FakeElement> {
        let site = self.site.lock().unwrap();
        self.current()
            .and_then(|url| site.pages.get(url))
            .and_then(|page| page.elements.get(locator))
            .cloned()
            .unwrap_or_default()
    }

    fn nth(&self, locator: &Locator, index: usize) -> Result<FakeElement> {
        self.elements(locator)
            .into_iter()
            .nth(index)
            .ok_or_else(|| AppError::ElementMissing {
                locator: locator.to_string(),
                index,
            })
    }
}

#[async_trait]
impl PageDriver for FakeBrowser {
    async fn goto(&mut self, url: &str) -> Result<()> {
        {
            let mut site = self.site.lock().unwrap();
            site.goto_calls += 1;
            if site.failing_gotos.contains(&site.goto_calls) {
                return Err(AppError::WebDriver(format!(
                    "net::ERR_CONNECTION_RESET loading {url}\nstack trace follows"
                )));
            }
        }
        self.history.push(url.to_string());
        Ok(())
    }

    async fn go_back(&mut self) -> Result<()> {
        {
            let mut site = self.site.lock().unwrap();
            site.back_calls += 1;
            if site.failing_backs.contains(&site.back_calls) {
                return Err(AppError::WebDriver("no such window".to_string()));
            }
            if let Some((url, page)) = site.after_back.pop_front() {
                site.pages.insert(url, page);
            }
        }
        self.history.pop();
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String> {
        Ok(self.current().cloned().unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn count(&mut self, locator: &Locator) -> Result<usize> {
        Ok(self.elements(locator).len())
    }

    async fn click(&mut self, locator: &Locator, index: usize) -> Result<()> {
        if let Some(href) = self.nth(locator, index)?.href {
            self.history.push(href);
        }
        Ok(())
    }

    async fn scroll_into_view(&mut self, locator: &Locator, index: usize) -> Result<()> {
        self.nth(locator, index).map(|_| ())
    }

    async fn child_texts(
        &mut self,
        parent: &Locator,
        index: usize,
        child: &Locator,
    ) -> Result<Vec<String>> {
        Ok(self
            .nth(parent, index)?
            .children
            .get(child)
            .cloned()
            .unwrap_or_default())
    }

    async fn texts(&mut self, locator: &Locator) -> Result<Vec<String>> {
        Ok(self.elements(locator).into_iter().map(|e| e.text).collect())
    }

    async fn close(&mut self) -> Result<()> {
        self.site.lock().unwrap().sessions_closed += 1;
        Ok(())
    }
}
