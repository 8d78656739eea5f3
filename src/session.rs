//! Login state tracking for the live session
//!
//! ```text
//! Unknown ──chat list──────────────────────────────▶ Authenticated
//!    │                                                    ▲
//!    └─login code──▶ AwaitingAuth ──code gone + list──────┘
//!    │                    └─auth timeout─────────────▶ AuthTimeout
//!    └─neither, reload, still no code────────────────▶ AuthTimeout
//! ```
//!
//! Reaching `Authenticated` is followed by a verification pass (bounded retries with a
//! single reload) since the chat list can lag behind the login code disappearing.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::LoginConfig;
use crate::error::{DigestError, Result};
use crate::events::ExtractionEvent;
use crate::locator::ElementLocator;
use crate::retry::RetryPolicy;
use crate::selectors::{CHAT_LIST_CASCADE, LOGIN_MARKER_CASCADE, LOGIN_MARKER_PRESENT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthState {
    Unknown,
    AwaitingAuth,
    Authenticated,
    AuthTimeout,
}

impl AuthState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AuthState::Authenticated | AuthState::AuthTimeout)
    }
}

pub struct SessionMonitor<'a> {
    locator: ElementLocator<'a>,
    config: &'a LoginConfig,
    state: AuthState,
}

impl<'a> SessionMonitor<'a> {
    pub fn new(locator: ElementLocator<'a>, config: &'a LoginConfig) -> Self {
        Self {
            locator,
            config,
            state: AuthState::Unknown,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Drive the state machine to a terminal state.
    ///
    /// Returns `AuthTimeout` when the session could not be authenticated within the
    /// configured bounds; it is never retried beyond them.
    pub async fn establish(&mut self) -> Result<()> {
        if self
            .locator
            .exists(&CHAT_LIST_CASCADE, None, self.config.initial_probe())
            .await
        {
            info!("Already logged in");
            self.transition(AuthState::Authenticated);
        } else if self.find_login_marker().await {
            self.await_login().await?;
        } else if self
            .locator
            .exists(&CHAT_LIST_CASCADE, None, self.config.marker_probe())
            .await
        {
            info!("Chat list appeared late, already logged in");
            self.transition(AuthState::Authenticated);
        } else {
            self.reload("neither chat list nor login code found").await;
            if !self.find_login_marker().await {
                return self.time_out("login code not found even after reload");
            }
            self.await_login().await?;
        }

        self.verify().await
    }

    async fn find_login_marker(&self) -> bool {
        self.locator
            .exists(&LOGIN_MARKER_CASCADE, None, self.config.marker_probe())
            .await
    }

    /// Poll until the login code is gone and the chat list is present
    async fn await_login(&mut self) -> Result<()> {
        self.transition(AuthState::AwaitingAuth);
        info!("Please scan the login code displayed in the browser window");

        let deadline = Instant::now() + self.config.auth_timeout();
        loop {
            let marker_gone = !self
                .locator
                .exists(&LOGIN_MARKER_PRESENT, None, Duration::ZERO)
                .await;
            if marker_gone
                && self
                    .locator
                    .exists(&CHAT_LIST_CASCADE, None, self.config.poll_interval())
                    .await
            {
                info!("Successfully logged in");
                self.transition(AuthState::Authenticated);
                return Ok(());
            }

            if Instant::now() >= deadline {
                return self.time_out("login code was not scanned in time");
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    /// Re-check the chat list a bounded number of times, reloading once after repeated
    /// failures
    async fn verify(&mut self) -> Result<()> {
        let policy = RetryPolicy::fixed(self.config.verify_attempts, Duration::ZERO);
        let this = &*self;
        let verified = policy
            .retry_until(
                "verify_login",
                this.locator.observer(),
                |ok: &bool| *ok,
                move |attempt| this.verify_attempt(attempt),
            )
            .await;

        if verified {
            info!("Login verified");
            Ok(())
        } else {
            self.time_out("login could not be verified")
        }
    }

    async fn verify_attempt(&self, attempt: u32) -> bool {
        if attempt == self.config.reload_after_failures + 1 {
            self.reload("login verification keeps failing").await;
        }
        self.locator
            .exists(&CHAT_LIST_CASCADE, None, self.config.verify_probe())
            .await
    }

    async fn reload(&self, reason: &'static str) {
        self.locator
            .observer()
            .on_event(ExtractionEvent::PageReloaded { reason });
        if let Err(e) = self.locator.driver().reload().await {
            warn!("Page reload failed: {}", e);
        }
        tokio::time::sleep(self.config.reload_settle()).await;
    }

    fn time_out(&mut self, reason: &str) -> Result<()> {
        warn!("Authentication failed: {}", reason);
        self.transition(AuthState::AuthTimeout);
        Err(DigestError::AuthTimeout(reason.to_string()))
    }

    fn transition(&mut self, to: AuthState) {
        if self.state == to {
            return;
        }
        let from = self.state;
        self.state = to;
        self.locator
            .observer()
            .on_event(ExtractionEvent::AuthStateChanged { from, to });
    }
}
