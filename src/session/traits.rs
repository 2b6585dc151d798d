//! Session layer traits
//!
//! `PageDriver` is the seam between the step-execution engine and a concrete
//! browser. The production implementation speaks the DevTools protocol
//! (`crate::cdp`); tests script a `MockPage`.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// One option of a select-like control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    /// The option's `value` attribute
    pub value: String,
    /// The visible label text
    pub label: String,
}

/// A live page in a browser, driven by the step executor.
///
/// Every method that touches the page may fail with `SessionCrashed` when the
/// underlying target detached; the workflow runner routes that to the session
/// manager instead of treating it as a step failure.
#[async_trait]
pub trait PageDriver: Send + Sync + std::fmt::Debug {
    /// Navigate to an absolute URL.
    async fn navigate(&self, url: &str, wait_for_load: bool, timeout: Duration)
        -> crate::Result<()>;

    /// Reload the current page.
    async fn reload(&self, wait_for_load: bool, timeout: Duration) -> crate::Result<()>;

    /// URL of the current page.
    async fn current_url(&self) -> crate::Result<String>;

    /// Wait until an element matching `selector` is present and visible.
    /// `SelectorNotFound` when the timeout expires first.
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> crate::Result<()>;

    /// Non-waiting presence probe.
    async fn is_present(&self, selector: &str) -> crate::Result<bool>;

    /// Click the first element matching `selector`.
    async fn click(&self, selector: &str) -> crate::Result<()>;

    /// Set the value of an input-like element, dispatching `input` and
    /// `change` events so page-side handlers fire.
    async fn set_value(&self, selector: &str, value: &str, clear_first: bool)
        -> crate::Result<()>;

    /// Current value of an input-like element.
    async fn read_value(&self, selector: &str) -> crate::Result<String>;

    /// Select the option whose `value` attribute equals `value`. Returns
    /// `false` when no option matched exactly (the executor then falls back
    /// to fuzzy matching over `option_list`).
    async fn select_by_value(&self, selector: &str, value: &str) -> crate::Result<bool>;

    /// All options of a select-like control.
    async fn option_list(&self, selector: &str) -> crate::Result<Vec<SelectOption>>;

    /// Text content of the first element matching `selector`.
    async fn text_content(&self, selector: &str) -> crate::Result<String>;

    /// Attribute value of the first element matching `selector`, `None` when
    /// the element or the attribute is absent.
    async fn attribute(&self, selector: &str, name: &str) -> crate::Result<Option<String>>;

    /// Defocus `selector`, or the active element when `None`.
    async fn blur(&self, selector: Option<&str>) -> crate::Result<()>;

    /// Run a script with the element matching `selector` bound as `el`.
    /// The script sees nothing else; variables are substituted before the
    /// text crosses this boundary.
    async fn run_element_script(&self, selector: &str, script: &str) -> crate::Result<()>;

    /// Register a script evaluated on every new document before page scripts.
    async fn inject_init_script(&self, script: &str) -> crate::Result<()>;

    /// Override the user agent for this page.
    async fn set_user_agent(&self, user_agent: &str) -> crate::Result<()>;

    /// Tear the page down.
    async fn close(&self) -> crate::Result<()>;

    /// Whether the underlying target is still attached.
    fn is_alive(&self) -> bool;
}

/// Creates page drivers. Injected into the session manager so the engine,
/// tests and embedders control what a "browser" is.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    /// Open a fresh page for the given domain.
    async fn open(&self, domain: &str) -> crate::Result<Arc<dyn PageDriver>>;
}
