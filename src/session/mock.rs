//! Mock page driver for testing
//!
//! A deterministic, scriptable fake page: tests declare which selectors
//! exist, what they contain, and which interactions should fail or crash the
//! session. Every interaction is appended to a log so tests can assert on
//! ordering.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use crate::session::traits::{DriverFactory, PageDriver, SelectOption};
use crate::{Error, Result};

/// One scripted element of the fake page.
#[derive(Debug, Clone, Default)]
pub struct MockElement {
    pub text: String,
    pub value: String,
    pub visible: bool,
    pub options: Vec<SelectOption>,
    pub attrs: HashMap<String, String>,
}

impl MockElement {
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self {
            text: text.into(),
            visible: true,
            ..Default::default()
        }
    }

    pub fn input() -> Self {
        Self {
            visible: true,
            ..Default::default()
        }
    }

    pub fn select(options: &[(&str, &str)]) -> Self {
        Self {
            visible: true,
            options: options
                .iter()
                .map(|(value, label)| SelectOption {
                    value: (*value).to_string(),
                    label: (*label).to_string(),
                })
                .collect(),
            ..Default::default()
        }
    }
}

/// Scriptable mock page driver.
#[derive(Debug, Default)]
pub struct MockPage {
    url: RwLock<String>,
    elements: RwLock<HashMap<String, MockElement>>,
    focused: RwLock<Option<String>>,
    log: Mutex<Vec<String>>,
    alive: AtomicBool,
    /// Next N page interactions fail with `SessionCrashed`
    crashes_pending: AtomicU32,
    /// Next N navigations fail transiently
    failing_navigations: AtomicU32,
}

impl MockPage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            url: RwLock::new("about:blank".to_string()),
            alive: AtomicBool::new(true),
            ..Default::default()
        })
    }

    /// Script an element into existence.
    pub fn put(&self, selector: &str, element: MockElement) {
        self.elements
            .write()
            .unwrap()
            .insert(selector.to_string(), element);
    }

    /// Replace an element's text.
    pub fn set_text(&self, selector: &str, text: &str) {
        self.put(selector, MockElement::text(text));
    }

    /// Make the next `n` interactions report a crashed session.
    pub fn crash_next(&self, n: u32) {
        self.crashes_pending.store(n, Ordering::SeqCst);
    }

    /// Bring a closed page back. The factory calls this when a shared page is
    /// reopened, so one scripted page can serve a whole test scenario.
    pub fn revive(&self) {
        self.alive.store(true, Ordering::SeqCst);
    }

    /// Make the next `n` navigations fail transiently.
    pub fn fail_navigations(&self, n: u32) {
        self.failing_navigations.store(n, Ordering::SeqCst);
    }

    /// Interaction log, in order.
    pub fn interactions(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Current value of a scripted element.
    pub fn value_of(&self, selector: &str) -> Option<String> {
        self.elements
            .read()
            .unwrap()
            .get(selector)
            .map(|el| el.value.clone())
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }

    fn check_alive(&self) -> Result<()> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(Error::session_crashed("page already closed"));
        }
        Ok(())
    }

    /// Element interactions consume pending crash injections; navigation and
    /// read-only probes do not, so recovery paths stay deterministic.
    fn check_health(&self) -> Result<()> {
        self.check_alive()?;
        let pending = self.crashes_pending.load(Ordering::SeqCst);
        if pending > 0 {
            self.crashes_pending.store(pending - 1, Ordering::SeqCst);
            return Err(Error::session_crashed("target detached"));
        }
        Ok(())
    }

    fn with_element<T>(
        &self,
        selector: &str,
        f: impl FnOnce(&mut MockElement) -> T,
    ) -> Result<T> {
        let mut elements = self.elements.write().unwrap();
        match elements.get_mut(selector) {
            Some(element) if element.visible => Ok(f(element)),
            _ => Err(Error::selector_not_found(selector)),
        }
    }
}

#[async_trait]
impl PageDriver for MockPage {
    async fn navigate(&self, url: &str, _wait_for_load: bool, _timeout: Duration) -> Result<()> {
        self.check_alive()?;
        let pending = self.failing_navigations.load(Ordering::SeqCst);
        if pending > 0 {
            self.failing_navigations.store(pending - 1, Ordering::SeqCst);
            return Err(Error::navigation(format!("net::ERR_CONNECTION_RESET {}", url)));
        }
        *self.url.write().unwrap() = url.to_string();
        self.record(format!("navigate {}", url));
        Ok(())
    }

    async fn reload(&self, _wait_for_load: bool, _timeout: Duration) -> Result<()> {
        self.check_alive()?;
        self.record("reload".to_string());
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.url.read().unwrap().clone())
    }

    async fn wait_for_selector(&self, selector: &str, _timeout: Duration) -> Result<()> {
        self.check_health()?;
        self.with_element(selector, |_| ())
    }

    async fn is_present(&self, selector: &str) -> Result<bool> {
        self.check_alive()?;
        Ok(self
            .elements
            .read()
            .unwrap()
            .get(selector)
            .map(|el| el.visible)
            .unwrap_or(false))
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.check_health()?;
        self.with_element(selector, |_| ())?;
        *self.focused.write().unwrap() = Some(selector.to_string());
        self.record(format!("click {}", selector));
        Ok(())
    }

    async fn set_value(&self, selector: &str, value: &str, clear_first: bool) -> Result<()> {
        self.check_health()?;
        self.with_element(selector, |el| {
            if clear_first {
                el.value.clear();
            }
            el.value.push_str(value);
        })?;
        *self.focused.write().unwrap() = Some(selector.to_string());
        self.record(format!("input {} = {}", selector, value));
        Ok(())
    }

    async fn read_value(&self, selector: &str) -> Result<String> {
        self.check_health()?;
        self.with_element(selector, |el| el.value.clone())
    }

    async fn select_by_value(&self, selector: &str, value: &str) -> Result<bool> {
        self.check_health()?;
        let matched = self.with_element(selector, |el| {
            if el.options.iter().any(|opt| opt.value == value) {
                el.value = value.to_string();
                true
            } else {
                false
            }
        })?;
        if matched {
            self.record(format!("select {} = {}", selector, value));
        }
        Ok(matched)
    }

    async fn option_list(&self, selector: &str) -> Result<Vec<SelectOption>> {
        self.check_health()?;
        self.with_element(selector, |el| el.options.clone())
    }

    async fn text_content(&self, selector: &str) -> Result<String> {
        self.check_health()?;
        self.with_element(selector, |el| el.text.clone())
    }

    async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>> {
        self.check_alive()?;
        Ok(self
            .elements
            .read()
            .unwrap()
            .get(selector)
            .and_then(|el| el.attrs.get(name).cloned()))
    }

    async fn blur(&self, selector: Option<&str>) -> Result<()> {
        self.check_alive()?;
        let target = selector
            .map(str::to_string)
            .or_else(|| self.focused.read().unwrap().clone());
        *self.focused.write().unwrap() = None;
        self.record(format!("blur {}", target.unwrap_or_else(|| "<active>".to_string())));
        Ok(())
    }

    async fn run_element_script(&self, selector: &str, script: &str) -> Result<()> {
        self.check_health()?;
        self.with_element(selector, |_| ())?;
        if script.contains("throw") {
            return Err(Error::script("script raised"));
        }
        self.record(format!("script {}", selector));
        Ok(())
    }

    async fn inject_init_script(&self, script: &str) -> Result<()> {
        self.record(format!("init_script {} bytes", script.len()));
        Ok(())
    }

    async fn set_user_agent(&self, user_agent: &str) -> Result<()> {
        self.record(format!("user_agent {}", user_agent));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.alive.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

type PageBuilder = dyn Fn() -> Arc<MockPage> + Send + Sync;

/// Mock driver factory. Counts how many pages it opened so tests can assert
/// on session recreation.
pub struct MockDriverFactory {
    build: Box<PageBuilder>,
    opened: AtomicUsize,
}

impl MockDriverFactory {
    /// Every `open` yields a fresh page built by `build`.
    pub fn new<F>(build: F) -> Self
    where
        F: Fn() -> Arc<MockPage> + Send + Sync + 'static,
    {
        Self {
            build: Box::new(build),
            opened: AtomicUsize::new(0),
        }
    }

    /// Every `open` yields a fresh empty page.
    pub fn blank() -> Self {
        Self::new(MockPage::new)
    }

    /// Every `open` yields the same shared page.
    pub fn shared(page: Arc<MockPage>) -> Self {
        Self::new(move || page.clone())
    }

    /// Number of pages opened so far.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DriverFactory for MockDriverFactory {
    async fn open(&self, _domain: &str) -> Result<Arc<dyn PageDriver>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let page = (self.build)();
        page.revive();
        Ok(page as Arc<dyn PageDriver>)
    }
}
