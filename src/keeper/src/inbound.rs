//! The keeper's single inbound slot.
//!
//! A data connection carries only bytes, so a SaveFile call must first tell
//! the keeper what the next stream is. The slot moves
//! `Idle -> Primed -> Receiving -> Idle`; a second SaveFile while the slot is
//! taken is refused instead of silently overwriting the first.

use anyhow::anyhow;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use common::constants::DEFAULT_INBOUND_NAME;
use common::error::ApiError;
use common::key_utils::FileName;
use common::schemas::TransferKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundSpec {
    pub name: FileName,
    pub kind: TransferKind,
    pub expected_size: Option<u64>,
}

impl InboundSpec {
    /// What an unannounced stream is stored as.
    pub fn unprimed() -> Result<Self, ApiError> {
        Ok(Self {
            name: FileName::parse(DEFAULT_INBOUND_NAME)?,
            kind: TransferKind::Original,
            expected_size: None,
        })
    }
}

#[derive(Debug)]
enum Slot {
    Idle,
    Primed { spec: InboundSpec, since: Instant },
    Receiving { name: FileName },
}

#[derive(Debug)]
pub struct InboundSlot {
    slot: Mutex<Slot>,
    prime_ttl: Duration,
}

impl InboundSlot {
    pub fn new(prime_ttl: Duration) -> Self {
        Self {
            slot: Mutex::new(Slot::Idle),
            prime_ttl,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Slot>, ApiError> {
        self.slot
            .lock()
            .map_err(|e| ApiError::Any(anyhow!("failed to acquire inbound lock: {}", e)))
    }

    /// Announce the next inbound stream. A primed slot that never saw its
    /// stream is replaced once it is older than the prime TTL.
    pub fn prime(&self, spec: InboundSpec, now: Instant) -> Result<(), ApiError> {
        let mut slot = self.lock()?;

        match &*slot {
            Slot::Idle => {}
            Slot::Primed { since, .. }
                if now.saturating_duration_since(*since) > self.prime_ttl => {}
            Slot::Primed { .. } | Slot::Receiving { .. } => return Err(ApiError::InboundBusy),
        }

        *slot = Slot::Primed { spec, since: now };
        Ok(())
    }

    /// Claim the slot for an accepted data connection. The slot returns to
    /// idle when the lease is dropped.
    pub fn begin(self: &Arc<Self>) -> Result<InboundLease, ApiError> {
        let mut slot = self.lock()?;

        let spec = match std::mem::replace(&mut *slot, Slot::Idle) {
            Slot::Idle => InboundSpec::unprimed()?,
            Slot::Primed { spec, .. } => spec,
            receiving @ Slot::Receiving { .. } => {
                *slot = receiving;
                return Err(ApiError::InboundBusy);
            }
        };

        *slot = Slot::Receiving {
            name: spec.name.clone(),
        };

        Ok(InboundLease {
            slot: Arc::clone(self),
            spec,
        })
    }

    /// Name of the file currently being received, if any.
    pub fn receiving(&self) -> Option<String> {
        match &*self.lock().ok()? {
            Slot::Receiving { name } => Some(name.to_string()),
            _ => None,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.lock().map(|s| matches!(*s, Slot::Idle)).unwrap_or(false)
    }

    fn release(&self) {
        let mut slot = match self.slot.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Slot::Idle;
    }
}

/// Exclusive hold on the inbound slot for one stream.
#[derive(Debug)]
pub struct InboundLease {
    slot: Arc<InboundSlot>,
    spec: InboundSpec,
}

impl InboundLease {
    pub fn spec(&self) -> &InboundSpec {
        &self.spec
    }
}

impl Drop for InboundLease {
    fn drop(&mut self) {
        self.slot.release();
    }
}
