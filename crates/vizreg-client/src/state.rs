//! Enabled/failed state and the connection-failure rescue policy
//!
//! Every remote call the lifecycle makes goes through
//! [`ClientState::rescue_connection_failures`]. A connection-class failure
//! turns the client off for the rest of the session so that an outage of the
//! review service never fails the test suite driving it.
//!
//! DO NOT rescue:
//! - Usage errors (no build, missing name)
//! - Bad requests for a single snapshot (handled by the caller)

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use tracing::{error, warn};
use vizreg_core::config::{parse_flag, CI_ENV, ENABLE_ENV, TOKEN_ENV};
use vizreg_core::{Result, VizregConfig};

const UNRESOLVED: u8 = 0;
const ENABLED: u8 = 1;
const DISABLED: u8 = 2;

/// Environment facts that decide whether the client is enabled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnvSignals {
    pub token_present: bool,
    /// `VIZREG_ENABLE`, when set to a recognized value
    pub enable_override: Option<bool>,
    pub ci: bool,
}

impl EnvSignals {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            token_present: lookup(TOKEN_ENV).is_some_and(|t| !t.is_empty()),
            enable_override: lookup(ENABLE_ENV).and_then(|v| parse_flag(&v)),
            ci: lookup(CI_ENV).is_some_and(|v| !v.is_empty() && parse_flag(&v) != Some(false)),
        }
    }

    /// Signals from an env-layered config; CI detection still reads the process env
    pub fn from_config(config: &VizregConfig) -> Self {
        Self {
            token_present: config.token.as_deref().is_some_and(|t| !t.is_empty()),
            enable_override: config.enabled,
            ci: Self::from_env().ci,
        }
    }
}

/// Session-scoped enabled/failed flags
///
/// `enabled` is resolved on first query and memoized; `failed` is sticky.
#[derive(Debug)]
pub struct ClientState {
    explicit: Option<bool>,
    signals: EnvSignals,
    enabled: AtomicU8,
    failed: AtomicBool,
}

impl ClientState {
    pub fn new(explicit: Option<bool>, signals: EnvSignals) -> Self {
        Self {
            explicit,
            signals,
            enabled: AtomicU8::new(UNRESOLVED),
            failed: AtomicBool::new(false),
        }
    }

    /// Explicit override, then `VIZREG_ENABLE`, then token presence
    pub fn is_enabled(&self) -> bool {
        match self.enabled.load(Ordering::SeqCst) {
            ENABLED => return true,
            DISABLED => return false,
            _ => {}
        }

        let resolved = self.resolve();
        let value = if resolved { ENABLED } else { DISABLED };
        match self
            .enabled
            .compare_exchange(UNRESOLVED, value, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => {
                if !resolved && self.signals.ci && !self.signals.token_present {
                    warn!("{} is not set; visual snapshots will be skipped", TOKEN_ENV);
                }
                resolved
            }
            // Resolved or disabled concurrently
            Err(current) => current == ENABLED,
        }
    }

    fn resolve(&self) -> bool {
        self.explicit
            .or(self.signals.enable_override)
            .unwrap_or(self.signals.token_present)
    }

    /// Turn the client off for the rest of the session
    pub fn disable(&self) {
        self.enabled.store(DISABLED, Ordering::SeqCst);
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    /// Run a remote operation, absorbing connection-class failures
    ///
    /// On server, quota, connection, or timeout errors this logs the error,
    /// disables the client, marks it failed, and returns `Ok(None)`. Any
    /// other error propagates unchanged.
    pub async fn rescue_connection_failures<F, Fut, T>(
        &self,
        operation_name: &str,
        f: F,
    ) -> Result<Option<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match f().await {
            Ok(val) => Ok(Some(val)),
            Err(e) if e.is_connection_failure() => {
                error!(
                    "{} failed, disabling visual snapshots for this session: {}",
                    operation_name, e
                );
                self.disable();
                self.failed.store(true, Ordering::SeqCst);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;
    use vizreg_core::{ApiError, VizregError};

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn with_env_vars<F, R>(vars: &[(&str, Option<&str>)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = ENV_LOCK.lock().unwrap();

        let originals: Vec<_> = vars.iter().map(|(k, _)| (*k, env::var(k).ok())).collect();

        for (key, value) in vars {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }

        let result = f();

        for (key, original) in originals {
            match original {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }

        result
    }

    fn signals(token_present: bool, enable_override: Option<bool>) -> EnvSignals {
        EnvSignals {
            token_present,
            enable_override,
            ci: false,
        }
    }

    #[test]
    fn test_signals_from_env() {
        let signals = with_env_vars(
            &[
                (TOKEN_ENV, Some("abc")),
                (ENABLE_ENV, Some("0")),
                (CI_ENV, Some("true")),
            ],
            EnvSignals::from_env,
        );
        assert_eq!(
            signals,
            EnvSignals {
                token_present: true,
                enable_override: Some(false),
                ci: true,
            }
        );

        let signals = with_env_vars(
            &[(TOKEN_ENV, Some("")), (ENABLE_ENV, Some("maybe")), (CI_ENV, None)],
            EnvSignals::from_env,
        );
        assert_eq!(signals, EnvSignals::default());
    }

    #[test]
    fn test_precedence() {
        assert!(ClientState::new(None, signals(true, None)).is_enabled());
        assert!(!ClientState::new(None, signals(false, None)).is_enabled());
        assert!(!ClientState::new(None, signals(true, Some(false))).is_enabled());
        assert!(ClientState::new(None, signals(false, Some(true))).is_enabled());
        assert!(ClientState::new(Some(true), signals(false, Some(false))).is_enabled());
        assert!(!ClientState::new(Some(false), signals(true, Some(true))).is_enabled());
    }

    #[test]
    fn test_enabled_is_memoized() {
        let state = ClientState::new(None, signals(true, None));
        assert!(state.is_enabled());
        assert!(state.is_enabled());

        state.disable();
        assert!(!state.is_enabled());
        state.disable();
        assert!(!state.is_enabled());
    }

    #[test]
    fn test_disable_before_first_query() {
        let state = ClientState::new(Some(true), EnvSignals::default());
        state.disable();
        assert!(!state.is_enabled());
    }

    #[tokio::test]
    async fn test_rescue_passes_success_through() {
        let state = ClientState::new(Some(true), EnvSignals::default());
        let result = state
            .rescue_connection_failures("op", || async { Ok::<_, VizregError>(7) })
            .await
            .unwrap();
        assert_eq!(result, Some(7));
        assert!(!state.is_failed());
        assert!(state.is_enabled());
    }

    #[tokio::test]
    async fn test_rescue_absorbs_connection_failures() {
        for error in [
            ApiError::ConnectionFailed("refused".into()),
            ApiError::Timeout("30s".into()),
            ApiError::from_status(503, "POST", "/builds", ""),
            ApiError::from_status(402, "POST", "/builds", ""),
        ] {
            let state = ClientState::new(Some(true), EnvSignals::default());
            let result = state
                .rescue_connection_failures("op", || async move { Err::<(), _>(VizregError::Api(error)) })
                .await
                .unwrap();
            assert!(result.is_none());
            assert!(state.is_failed());
            assert!(!state.is_enabled());
        }
    }

    #[tokio::test]
    async fn test_rescue_propagates_other_errors() {
        let state = ClientState::new(Some(true), EnvSignals::default());
        let err = state
            .rescue_connection_failures("op", || async {
                Err::<(), _>(VizregError::Api(ApiError::from_status(400, "POST", "/", "")))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, VizregError::Api(ApiError::BadRequest { .. })));
        assert!(!state.is_failed());

        let err = state
            .rescue_connection_failures("op", || async { Err::<(), _>(VizregError::BuildNotInitialized) })
            .await
            .unwrap_err();
        assert!(matches!(err, VizregError::BuildNotInitialized));
        assert!(state.is_enabled());
    }

    #[tokio::test]
    async fn test_failed_is_sticky() {
        let state = ClientState::new(Some(true), EnvSignals::default());
        let _ = state
            .rescue_connection_failures("op", || async {
                Err::<(), _>(VizregError::Api(ApiError::Timeout("slow".into())))
            })
            .await;
        let _ = state
            .rescue_connection_failures("op", || async { Ok::<_, VizregError>(()) })
            .await;
        assert!(state.is_failed());
    }
}
