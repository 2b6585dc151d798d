//! Action executor
//!
//! Translates resolved steps into concrete page interactions against the
//! active session's driver. One operation per step type; each returns a
//! `StepOutcome` and leaves its traces (focus, price, switch request) in the
//! `ExecutionContext`.

pub mod price;
pub mod select;

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::collaborators::{CaptchaChallenge, CaptchaSolver, CountryRates};
use crate::config::EngineConfig;
use crate::model::{Step, StepOutcome, Unit, WaitDuration};
use crate::resolver;
use crate::runner::context::ExecutionContext;
use crate::stealth::{InteractionKind, PacingPolicy};
use crate::{Error, Result};

/// Selectors that betray an anti-bot challenge standing in front of content.
const CHALLENGE_MARKERS: &[&str] = &[
    ".g-recaptcha",
    "iframe[src*='recaptcha']",
    ".h-captcha",
    "#challenge-form",
];

/// Executes resolved steps against a page.
pub struct ActionExecutor {
    config: EngineConfig,
    pacing: Arc<dyn PacingPolicy>,
    rates: Arc<dyn CountryRates>,
    solver: Arc<dyn CaptchaSolver>,
}

impl ActionExecutor {
    pub fn new(
        config: EngineConfig,
        pacing: Arc<dyn PacingPolicy>,
        rates: Arc<dyn CountryRates>,
        solver: Arc<dyn CaptchaSolver>,
    ) -> Self {
        Self {
            config,
            pacing,
            rates,
            solver,
        }
    }

    /// Execute one step. Session-level failures (`SessionCrashed`) pass
    /// through inside `Recoverable` for the workflow runner to route to the
    /// session manager; a captcha obstacle outside an explicit captcha step
    /// is fatal.
    pub async fn execute(&self, step: &Step, ctx: &mut ExecutionContext) -> StepOutcome {
        let result = match step {
            Step::Click { selector, .. } => self.click(selector, ctx).await,
            Step::Input {
                selector,
                value,
                unit,
                clear_first,
                ..
            } => self.input(selector, value, *unit, *clear_first, ctx).await,
            Step::Select {
                selector,
                value,
                unit,
                ..
            } => self.select(selector, value, *unit, ctx).await,
            Step::Wait { duration, .. } => self.wait(*duration).await,
            Step::ReadPrice {
                selector,
                includes_vat,
                calculation,
                ..
            } => {
                self.read_price(selector, *includes_vat, calculation.as_deref(), ctx)
                    .await
            }
            Step::Blur { selector, .. } => self.blur(selector.as_deref(), ctx).await,
            Step::Modify {
                selector, script, ..
            } => self.modify(selector, script, ctx).await,
            Step::Navigate {
                url,
                wait_for_load,
                timeout,
                ..
            } => self.navigate(url, *wait_for_load, *timeout, ctx).await,
            Step::Reload {
                wait_for_load,
                timeout,
                ..
            } => self.reload(*wait_for_load, *timeout, ctx).await,
            Step::DecideConfig {
                selector,
                timeout,
                fallback_config,
            } => {
                self.decide_config(selector, *timeout, fallback_config, ctx)
                    .await
            }
            Step::Captcha { selector, .. } => self.captcha(selector.as_deref(), ctx).await,
        };

        match result {
            Ok(()) => StepOutcome::Ok,
            Err(error @ Error::CaptchaRequired(_)) if !matches!(step, Step::Captcha { .. }) => {
                StepOutcome::Fatal(error)
            }
            Err(error) => StepOutcome::Recoverable(error),
        }
    }

    fn wait_duration(&self, duration: WaitDuration) -> Duration {
        let ms = match duration {
            WaitDuration::Short => self.config.wait_short_ms,
            WaitDuration::Default => self.config.wait_default_ms,
            WaitDuration::Long => self.config.wait_long_ms,
            WaitDuration::Longest => self.config.wait_longest_ms,
        };
        Duration::from_millis(ms)
    }

    #[instrument(skip(self, ctx))]
    async fn click(&self, selector: &str, ctx: &mut ExecutionContext) -> Result<()> {
        let selector = resolver::resolve(
            selector,
            Unit::Mm,
            &ctx.dims,
            self.config.unit_precision,
        )?;

        self.pacing.pause_before(InteractionKind::Click).await;
        ctx.driver()
            .wait_for_selector(&selector, self.config.selector_wait())
            .await?;
        ctx.driver().click(&selector).await?;
        ctx.last_focused = Some(selector);
        Ok(())
    }

    #[instrument(skip(self, ctx))]
    async fn input(
        &self,
        selector: &str,
        value: &str,
        unit: Unit,
        clear_first: bool,
        ctx: &mut ExecutionContext,
    ) -> Result<()> {
        let resolved = resolver::resolve(value, unit, &ctx.dims, self.config.unit_precision)?;

        self.pacing.pause_before(InteractionKind::Type).await;
        ctx.driver()
            .wait_for_selector(selector, self.config.selector_wait())
            .await?;
        ctx.driver()
            .set_value(selector, &resolved, clear_first)
            .await?;

        // Some pages reformat on input; a changed value is worth knowing
        // about but not worth failing over.
        match ctx.driver().read_value(selector).await {
            Ok(actual) if actual != resolved && !actual.contains(&resolved) => {
                warn!(selector, expected = %resolved, actual = %actual, "Input value was reshaped by the page");
            }
            _ => {}
        }

        ctx.last_focused = Some(selector.to_string());
        Ok(())
    }

    #[instrument(skip(self, ctx))]
    async fn select(
        &self,
        selector: &str,
        value: &str,
        unit: Unit,
        ctx: &mut ExecutionContext,
    ) -> Result<()> {
        let resolved = resolver::resolve(value, unit, &ctx.dims, self.config.unit_precision)?;

        self.pacing.pause_before(InteractionKind::Select).await;
        ctx.driver()
            .wait_for_selector(selector, self.config.selector_wait())
            .await?;

        if ctx.driver().select_by_value(selector, &resolved).await? {
            ctx.last_focused = Some(selector.to_string());
            return Ok(());
        }

        // No exact value hit; fall back to fuzzy matching over the options.
        let options = ctx.driver().option_list(selector).await?;
        let matched = select::best_match(&options, &resolved).ok_or_else(|| {
            Error::selector_not_found(format!(
                "no option matching '{}' in {} ({} options)",
                resolved,
                selector,
                options.len()
            ))
        })?;

        debug!(selector, wanted = %resolved, chosen = %matched, "Fuzzy option match");
        if !ctx.driver().select_by_value(selector, &matched).await? {
            return Err(Error::selector_not_found(format!(
                "option '{}' vanished from {}",
                matched, selector
            )));
        }
        ctx.last_focused = Some(selector.to_string());
        Ok(())
    }

    async fn wait(&self, duration: WaitDuration) -> Result<()> {
        tokio::time::sleep(self.wait_duration(duration)).await;
        Ok(())
    }

    #[instrument(skip(self, ctx))]
    async fn read_price(
        &self,
        selector: &str,
        includes_vat: bool,
        calculation: Option<&str>,
        ctx: &mut ExecutionContext,
    ) -> Result<()> {
        ctx.driver()
            .wait_for_selector(selector, self.config.selector_wait())
            .await?;
        let text = ctx.driver().text_content(selector).await?;

        let mut amount = price::extract_price(&text)?;
        if let Some(expression) = calculation {
            amount = price::evaluate_calculation(expression, amount, &ctx.dims)?;
        }

        let vat = self.rates.vat_rate(&ctx.country).await?;
        let result = price::normalize_vat(amount, includes_vat, &vat);
        debug!(
            selector,
            amount, net = result.net, gross = result.gross, "Price extracted"
        );
        ctx.price = Some(result);
        Ok(())
    }

    async fn blur(&self, selector: Option<&str>, ctx: &mut ExecutionContext) -> Result<()> {
        let target = selector
            .map(str::to_string)
            .or_else(|| ctx.last_focused.clone());
        ctx.driver().blur(target.as_deref()).await?;
        ctx.last_focused = None;
        Ok(())
    }

    #[instrument(skip(self, script, ctx))]
    async fn modify(
        &self,
        selector: &str,
        script: &str,
        ctx: &mut ExecutionContext,
    ) -> Result<()> {
        // Variables are substituted before the script crosses the execution
        // boundary; the page never sees a placeholder.
        let substituted =
            resolver::resolve(script, Unit::Mm, &ctx.dims, self.config.unit_precision)?;

        ctx.driver()
            .wait_for_selector(selector, self.config.selector_wait())
            .await?;
        ctx.driver()
            .run_element_script(selector, &substituted)
            .await
            .map_err(|e| {
                // Session and selector failures keep their class; anything
                // else the script did wrong is a script failure.
                if e.is_session_fatal() || matches!(e, Error::SelectorNotFound(_)) {
                    e
                } else if matches!(e, Error::ScriptExecution(_)) {
                    e
                } else {
                    Error::script(e.to_string())
                }
            })
    }

    #[instrument(skip(self, ctx))]
    async fn navigate(
        &self,
        url: &str,
        wait_for_load: bool,
        timeout_secs: Option<u64>,
        ctx: &mut ExecutionContext,
    ) -> Result<()> {
        let target = self.absolute_url(url, ctx).await?;
        let timeout = timeout_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.config.default_timeout());

        self.pacing.pause_before(InteractionKind::Navigate).await;
        ctx.driver()
            .navigate(&target, wait_for_load, timeout)
            .await?;
        ctx.last_focused = None;

        // A challenge page instead of the shop is fatal unless a solver
        // clears it right here.
        if let Some(marker) = self.detect_challenge(ctx).await? {
            debug!(marker, "Challenge detected after navigation");
            self.clear_challenge(ctx).await?;
        }
        Ok(())
    }

    async fn reload(
        &self,
        wait_for_load: bool,
        timeout_secs: Option<u64>,
        ctx: &mut ExecutionContext,
    ) -> Result<()> {
        let timeout = timeout_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.config.default_timeout());
        ctx.driver().reload(wait_for_load, timeout).await?;
        ctx.last_focused = None;
        Ok(())
    }

    #[instrument(skip(self, ctx))]
    async fn decide_config(
        &self,
        selector: &str,
        timeout_secs: Option<u64>,
        fallback_config: &str,
        ctx: &mut ExecutionContext,
    ) -> Result<()> {
        let timeout = Duration::from_secs(timeout_secs.unwrap_or(10));

        match ctx.driver().wait_for_selector(selector, timeout).await {
            Ok(()) => {
                debug!(selector, "Probe present, keeping current configuration");
                Ok(())
            }
            Err(Error::SelectorNotFound(_)) | Err(Error::Timeout(_)) => {
                debug!(
                    selector,
                    fallback_config, "Probe absent, switching configuration"
                );
                ctx.switch_request = Some(fallback_config.to_string());
                Ok(())
            }
            Err(other) => Err(other),
        }
    }

    async fn captcha(&self, selector: Option<&str>, ctx: &mut ExecutionContext) -> Result<()> {
        // Checkbox challenges want a click before (or instead of) solving.
        if let Some(selector) = selector {
            ctx.driver()
                .wait_for_selector(selector, self.config.selector_wait())
                .await?;
            ctx.driver().click(selector).await?;
        }

        if self.detect_challenge(ctx).await?.is_some() {
            self.clear_challenge(ctx).await?;
        }
        Ok(())
    }

    async fn detect_challenge(&self, ctx: &ExecutionContext) -> Result<Option<&'static str>> {
        for marker in CHALLENGE_MARKERS {
            if ctx.driver().is_present(marker).await? {
                return Ok(Some(marker));
            }
        }
        Ok(None)
    }

    /// Hand the challenge to the solver and inject the returned token. Any
    /// failure here surfaces as `CaptchaRequired`.
    async fn clear_challenge(&self, ctx: &ExecutionContext) -> Result<()> {
        let page_url = ctx.driver().current_url().await?;
        let site_key = ctx
            .driver()
            .attribute("[data-sitekey]", "data-sitekey")
            .await
            .unwrap_or(None);

        let challenge = CaptchaChallenge { page_url, site_key };
        let token = self.solver.solve(&challenge).await?;

        ctx.driver()
            .set_value("#g-recaptcha-response", &token, true)
            .await
            .map_err(|e| Error::captcha(format!("token injection failed: {}", e)))?;
        Ok(())
    }

    async fn absolute_url(&self, url: &str, ctx: &ExecutionContext) -> Result<String> {
        if url.starts_with("http://") || url.starts_with("https://") {
            return Ok(url.to_string());
        }
        let current = ctx.driver().current_url().await?;
        let base = Url::parse(&current)
            .map_err(|e| Error::navigation(format!("no base for relative url '{}': {}", url, e)))?;
        let joined = base
            .join(url)
            .map_err(|e| Error::navigation(format!("cannot resolve '{}': {}", url, e)))?;
        Ok(joined.to_string())
    }
}
