//! The authentication loop.
//!
//! [`AccessController`] owns the reader and the actuator, checks presented
//! keys against a read-only view of the credential store and reports every
//! attempt on the log queue. It never mutates the store.

use std::fmt;
use std::time::Duration;

use latchkey_core::constants::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_SECTOR_BLOCK};
use latchkey_core::{AccessKey, SectorKey};
use latchkey_hardware::{Actuator, CredentialReader, HardwareError, OutputPin, TargetId};
use latchkey_protocol::{LogEvent, LogPublisher};
use latchkey_storage::{KeyNamespace, StoreReader};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::state::{AccessState, AuthCycle};

/// Reader settings for the authentication loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerConfig {
    /// Data block holding the access key.
    pub sector_block: u8,
    /// Key A of the sector holding `sector_block`.
    pub secret: SectorKey,
    pub poll_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            sector_block: DEFAULT_SECTOR_BLOCK,
            secret: SectorKey::default(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

/// Why a presented tag was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Credential ID is not 4 bytes long.
    UnsupportedTag { uid_len: usize },
    AuthenticationFailed,
    ReadFailed,
    /// Key read but not on the allow-list.
    NotAllowed,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::UnsupportedTag { uid_len } => {
                write!(f, "unsupported tag ({uid_len}-byte UID)")
            }
            DenyReason::AuthenticationFailed => f.write_str("sector authentication failed"),
            DenyReason::ReadFailed => f.write_str("data block unreadable"),
            DenyReason::NotAllowed => f.write_str("key not allowed"),
        }
    }
}

/// Result of one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessOutcome {
    /// Field empty.
    NoTarget,
    Granted { key: AccessKey },
    /// `key` is set when the data block was read.
    Denied {
        reason: DenyReason,
        key: Option<AccessKey>,
    },
}

impl AccessOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, AccessOutcome::Granted { .. })
    }

    /// The key read from the tag, if any.
    pub fn key(&self) -> Option<&AccessKey> {
        match self {
            AccessOutcome::Granted { key } => Some(key),
            AccessOutcome::Denied { key, .. } => key.as_ref(),
            AccessOutcome::NoTarget => None,
        }
    }
}

/// Authentication loop for one reader.
pub struct AccessController<R, N, P>
where
    R: CredentialReader,
    N: KeyNamespace,
    P: OutputPin,
{
    reader: R,
    store: StoreReader<N>,
    actuator: Actuator<P>,
    log: LogPublisher,
    cycle: AuthCycle,
    config: ControllerConfig,
}

impl<R, N, P> AccessController<R, N, P>
where
    R: CredentialReader,
    N: KeyNamespace,
    P: OutputPin,
{
    /// Wrap an opened reader. The actuator is put in its locked state.
    pub fn new(
        reader: R,
        store: StoreReader<N>,
        mut actuator: Actuator<P>,
        log: LogPublisher,
        config: ControllerConfig,
    ) -> Self {
        actuator.set_default_states();
        Self {
            reader,
            store,
            actuator,
            log,
            cycle: AuthCycle::new(),
            config,
        }
    }

    pub fn state(&self) -> AccessState {
        self.cycle.current_state()
    }

    pub fn cycle(&self) -> &AuthCycle {
        &self.cycle
    }

    pub fn actuator(&self) -> &Actuator<P> {
        &self.actuator
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Run one authentication cycle.
    ///
    /// Tag-level failures (bad UID, wrong secret, unreadable block) end the
    /// cycle as [`AccessOutcome::Denied`].
    ///
    /// # Errors
    ///
    /// Returns the reader error if polling itself fails.
    pub async fn poll_once(&mut self) -> Result<AccessOutcome, HardwareError> {
        let Some(target) = self.reader.poll_for_target().await? else {
            return Ok(AccessOutcome::NoTarget);
        };

        self.advance(AccessState::TagPresent);
        self.actuator.acknowledge();
        debug!(uid = %target, "Tag detected");

        let outcome = self.evaluate(&target).await;

        match &outcome {
            AccessOutcome::Granted { key } => {
                info!(uid = %target, key = %key, "Access granted");
                self.actuator.unlock_sequence().await;
            }
            AccessOutcome::Denied { reason, key } => {
                match key {
                    Some(key) => info!(uid = %target, key = %key, %reason, "Access denied"),
                    None => info!(uid = %target, %reason, "Access denied"),
                }
                self.actuator.deny_sequence().await;
            }
            AccessOutcome::NoTarget => {}
        }

        if let Some(key) = outcome.key() {
            self.log
                .publish(LogEvent::access_attempt(key, outcome.is_granted()));
        }

        self.advance(AccessState::Idle);
        Ok(outcome)
    }

    async fn evaluate(&mut self, target: &TargetId) -> AccessOutcome {
        if !target.is_supported() {
            warn!(uid = %target, uid_len = target.len(), "Unsupported tag");
            return self.deny(DenyReason::UnsupportedTag {
                uid_len: target.len(),
            });
        }

        let block = self.config.sector_block;
        if let Err(e) = self
            .reader
            .authenticate_sector(target, block, &self.config.secret)
            .await
        {
            warn!(uid = %target, block, error = %e, "Sector authentication failed");
            self.advance(AccessState::AuthFailed);
            return self.deny(DenyReason::AuthenticationFailed);
        }
        self.advance(AccessState::Authenticated);

        let data = match self.reader.read_block(block).await {
            Ok(data) => data,
            Err(e) => {
                warn!(uid = %target, block, error = %e, "Block read failed");
                self.advance(AccessState::ReadFailed);
                return self.deny(DenyReason::ReadFailed);
            }
        };
        self.advance(AccessState::DataRead);

        let key = AccessKey::new(data);
        if self.store.contains(&key).await {
            self.advance(AccessState::Granted);
            AccessOutcome::Granted { key }
        } else {
            self.advance(AccessState::Denied);
            AccessOutcome::Denied {
                reason: DenyReason::NotAllowed,
                key: Some(key),
            }
        }
    }

    fn deny(&mut self, reason: DenyReason) -> AccessOutcome {
        self.advance(AccessState::Denied);
        AccessOutcome::Denied { reason, key: None }
    }

    fn advance(&mut self, to: AccessState) {
        if let Err(e) = self.cycle.transition_to(to) {
            error!(error = %e, "Authentication cycle out of sync, resetting");
            self.cycle.reset();
        }
    }

    /// Poll forever at the configured interval.
    ///
    /// Returns only when the reader fails fatally.
    pub async fn run(&mut self) -> HardwareError {
        self.actuator.set_default_states();
        info!(
            block = self.config.sector_block,
            interval_ms = self.config.poll_interval.as_millis() as u64,
            "Authentication loop started"
        );

        loop {
            if let Err(e) = self.poll_once().await {
                if e.is_fatal() {
                    error!(error = %e, "Reader failed");
                    return e;
                }
                warn!(error = %e, "Reader poll failed");
            }
            sleep(self.config.poll_interval).await;
        }
    }
}
