//! Session provider
//!
//! A session is one freshly launched page driver plus its login state. It is
//! created at batch start, owned by exactly one worker, and released at batch
//! end whatever the outcome.

use crate::config::{Credentials, RetryPolicy, TimeoutConfig};
use crate::driver::{Condition, DriverError, DriverFactory, DriverResult, Locator, PageDriver};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while opening a session
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to start browser session: {0}")]
    Init(#[source] DriverError),
}

/// One page driver owned by one batch
pub struct Session {
    driver: Box<dyn PageDriver>,
    authenticated: bool,
    label: String,
}

impl Session {
    /// The driver this session owns
    pub fn driver(&mut self) -> &mut dyn PageDriver {
        self.driver.as_mut()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

/// The UI-driven password login sequence
#[derive(Debug, Clone)]
pub struct LoginFlow {
    pub login_url: String,
    pub password_mode: Locator,
    pub username_field: Locator,
    pub password_field: Locator,
    pub submit_button: Locator,

    /// Fragment whose absence from the location confirms the login
    pub login_fragment: String,

    pub ready_timeout: Duration,
    pub step_timeout: Duration,
    pub confirm_timeout: Duration,
}

impl LoginFlow {
    /// The login sequence of the nutrition database site
    pub fn for_site(base_url: &str, timeouts: &TimeoutConfig) -> Self {
        Self {
            login_url: format!("{}/login", base_url.trim_end_matches('/')),
            password_mode: Locator::link_text("密码登录"),
            username_field: Locator::css(r#"input[placeholder="请输入用户名或手机号"]"#),
            password_field: Locator::css(r#"input[placeholder="请输入密码"]"#),
            submit_button: Locator::xpath(
                r#"//button[contains(@class, "primary-btn") and .//span[text()="登 录"]]"#,
            ),
            login_fragment: "login".to_string(),
            ready_timeout: timeouts.login_ready(),
            step_timeout: timeouts.login_step(),
            confirm_timeout: timeouts.login_confirm(),
        }
    }

    /// Runs the sequence once; any step failing fails the attempt
    async fn attempt(&self, driver: &mut dyn PageDriver, credentials: &Credentials) -> DriverResult<()> {
        driver.navigate(&self.login_url, self.ready_timeout).await?;
        driver
            .wait_until(&Condition::DocumentReady, self.ready_timeout)
            .await?;

        self.present(driver, &self.password_mode).await?;
        driver.click(&self.password_mode).await?;

        self.present(driver, &self.username_field).await?;
        driver
            .type_text(&self.username_field, &credentials.username)
            .await?;

        self.present(driver, &self.password_field).await?;
        driver
            .type_text(&self.password_field, &credentials.password)
            .await?;

        self.present(driver, &self.submit_button).await?;
        driver.click(&self.submit_button).await?;

        driver
            .wait_until(
                &Condition::LocationExcludes(self.login_fragment.clone()),
                self.confirm_timeout,
            )
            .await
    }

    async fn present(&self, driver: &mut dyn PageDriver, locator: &Locator) -> DriverResult<()> {
        driver
            .wait_until(&Condition::Present(locator.clone()), self.step_timeout)
            .await
    }
}

/// Opens, authenticates and closes sessions
pub struct SessionProvider {
    factory: Arc<dyn DriverFactory>,
    login: LoginFlow,
    policy: RetryPolicy,
}

impl SessionProvider {
    /// Creates a provider
    ///
    /// # Arguments
    ///
    /// * `factory` - Launches one driver per session
    /// * `login` - The login sequence to run in `authenticate`
    /// * `policy` - Login attempts and the pause between them
    pub fn new(factory: Arc<dyn DriverFactory>, login: LoginFlow, policy: RetryPolicy) -> Self {
        Self {
            factory,
            login,
            policy,
        }
    }

    /// Launches a fresh driver for one batch or crawl
    pub async fn acquire(&self, label: impl Into<String>) -> Result<Session, SessionError> {
        let label = label.into();
        tracing::debug!("Launching browser for {}", label);

        let driver = self.factory.launch().await.map_err(SessionError::Init)?;
        Ok(Session {
            driver,
            authenticated: false,
            label,
        })
    }

    /// Logs the session in
    ///
    /// # Returns
    ///
    /// `true` once an attempt succeeds, `false` after the retry budget is
    /// spent or the browser is gone
    pub async fn authenticate(&self, session: &mut Session, credentials: &Credentials) -> bool {
        let attempts = self.policy.attempts.max(1);

        for attempt in 1..=attempts {
            match self.login.attempt(session.driver(), credentials).await {
                Ok(()) => {
                    tracing::info!("{}: logged in (attempt {}/{})", session.label, attempt, attempts);
                    session.authenticated = true;
                    return true;
                }
                Err(e) if e.is_fatal() => {
                    tracing::error!("{}: login aborted: {}", session.label, e);
                    return false;
                }
                Err(e) => {
                    tracing::warn!(
                        "{}: login failed (attempt {}/{}): {}",
                        session.label,
                        attempt,
                        attempts,
                        e
                    );
                    if attempt < attempts {
                        tokio::time::sleep(self.policy.delay).await;
                    }
                }
            }
        }

        tracing::error!("{}: login attempts exhausted", session.label);
        false
    }

    /// Closes the session's browser
    ///
    /// Close errors are logged; the session is consumed either way.
    pub async fn release(&self, mut session: Session) {
        match session.driver.close().await {
            Ok(()) => tracing::debug!("{}: browser closed", session.label),
            Err(e) => tracing::warn!("{}: failed to close browser cleanly: {}", session.label, e),
        }
    }
}
