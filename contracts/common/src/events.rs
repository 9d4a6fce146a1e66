//! Protocol Events for LoopVault
//!
//! Events are collected during engine execution and can be indexed
//! off-engine for dashboards, keeper bots, and notifications.

use crate::types::{Address, RebalanceKind};
use crate::Vec;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Event types for indexing and filtering
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum EventType {
    // Share flow events (0x01 - 0x0F)
    DepositLooped = 0x01,
    WithdrawUnwound = 0x02,
    SharesTransferred = 0x03,
    SharesApproved = 0x04,

    // Position events (0x10 - 0x1F)
    Rebalanced = 0x10,
    EmergencyDeleveraged = 0x11,

    // Admin events (0x20 - 0x2F)
    VaultPaused = 0x20,
    VaultUnpaused = 0x21,
    ParametersUpdated = 0x22,
    LoopCapUpdated = 0x23,
    AssetCapUpdated = 0x24,
    DeleverageFallbackUpdated = 0x25,
}

/// Main event enum containing all possible protocol events
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub enum LoopVaultEvent {
    // ============ Share Flow Events ============

    /// Emitted when a deposit has been looped into the position
    DepositLooped {
        caller: Address,
        receiver: Address,
        assets: u64,
        shares: u64,
        /// Borrow/re-supply cycles executed
        iterations: u32,
        collateral_value: u64,
        debt_value: u64,
        health_factor: u128,
    },

    /// Emitted when a withdrawal has been unwound and paid out
    WithdrawUnwound {
        caller: Address,
        receiver: Address,
        owner: Address,
        assets: u64,
        shares: u64,
        debt_repaid: u64,
        health_factor: u128,
    },

    /// Emitted on a share transfer between holders
    SharesTransferred {
        from: Address,
        to: Address,
        amount: u64,
    },

    /// Emitted when a holder sets a spender allowance
    SharesApproved {
        owner: Address,
        spender: Address,
        amount: u64,
    },

    // ============ Position Events ============

    /// Emitted when a rebalance moved the position
    Rebalanced {
        kind: RebalanceKind,
        health_factor_before: u128,
        health_factor_after: u128,
        /// Debt repaid (deleverage) or added (re-leverage)
        debt_delta: u64,
    },

    /// Emitted when the owner force-closed the position
    EmergencyDeleveraged {
        caller: Address,
        debt_repaid: u64,
        collateral_withdrawn: u64,
    },

    // ============ Admin Events ============

    /// Emitted when deposits are paused
    VaultPaused { by: Address },

    /// Emitted when deposits are resumed
    VaultUnpaused { by: Address },

    /// Emitted when the health-factor band or leverage target changes
    ParametersUpdated {
        target_health_factor: u128,
        min_health_factor: u128,
        max_health_factor: u128,
        target_ltv_bps: u64,
    },

    /// Emitted when the loop iteration cap changes
    LoopCapUpdated { max_loop_iterations: u32 },

    /// Emitted when the asset cap changes
    AssetCapUpdated { max_total_assets: u64 },

    /// Emitted when the deleverage fallback fraction changes
    DeleverageFallbackUpdated { fallback_bps: u64 },
}

impl LoopVaultEvent {
    /// Get the event type for filtering
    pub fn event_type(&self) -> EventType {
        match self {
            Self::DepositLooped { .. } => EventType::DepositLooped,
            Self::WithdrawUnwound { .. } => EventType::WithdrawUnwound,
            Self::SharesTransferred { .. } => EventType::SharesTransferred,
            Self::SharesApproved { .. } => EventType::SharesApproved,
            Self::Rebalanced { .. } => EventType::Rebalanced,
            Self::EmergencyDeleveraged { .. } => EventType::EmergencyDeleveraged,
            Self::VaultPaused { .. } => EventType::VaultPaused,
            Self::VaultUnpaused { .. } => EventType::VaultUnpaused,
            Self::ParametersUpdated { .. } => EventType::ParametersUpdated,
            Self::LoopCapUpdated { .. } => EventType::LoopCapUpdated,
            Self::AssetCapUpdated { .. } => EventType::AssetCapUpdated,
            Self::DeleverageFallbackUpdated { .. } => EventType::DeleverageFallbackUpdated,
        }
    }

    /// Serialize event to bytes for storage/transmission
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).unwrap_or_default()
    }

    /// Deserialize event from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        borsh::from_slice(bytes).ok()
    }
}

/// Event log for collecting multiple events during execution
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<LoopVaultEvent>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Emit an event (add to log)
    pub fn emit(&mut self, event: LoopVaultEvent) {
        self.events.push(event);
    }

    /// Get all events
    pub fn events(&self) -> &[LoopVaultEvent] {
        &self.events
    }

    /// Take ownership of all events
    pub fn into_events(self) -> Vec<LoopVaultEvent> {
        self.events
    }

    /// Filter events by type
    pub fn filter_by_type(&self, event_type: EventType) -> Vec<&LoopVaultEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Check if any events were emitted
    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Get number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when no events have been emitted
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Clear all events
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::token::ONE;

    #[test]
    fn test_event_type() {
        let event = LoopVaultEvent::DepositLooped {
            caller: [1u8; 32],
            receiver: [2u8; 32],
            assets: 100 * ONE,
            shares: 100 * ONE,
            iterations: 4,
            collateral_value: 230 * ONE,
            debt_value: 130 * ONE,
            health_factor: 1_415_000_000_000_000_000,
        };

        assert_eq!(event.event_type(), EventType::DepositLooped);
    }

    #[test]
    fn test_event_serialization() {
        let event = LoopVaultEvent::Rebalanced {
            kind: crate::types::RebalanceKind::Releverage,
            health_factor_before: 1_600_000_000_000_000_000,
            health_factor_after: 1_466_000_000_000_000_000,
            debt_delta: 20 * ONE,
        };

        let bytes = event.to_bytes();
        let restored = LoopVaultEvent::from_bytes(&bytes).unwrap();

        assert_eq!(event, restored);
    }

    #[test]
    fn test_event_log() {
        let mut log = EventLog::new();

        log.emit(LoopVaultEvent::VaultPaused { by: [1u8; 32] });
        log.emit(LoopVaultEvent::VaultUnpaused { by: [1u8; 32] });
        log.emit(LoopVaultEvent::VaultPaused { by: [2u8; 32] });

        assert_eq!(log.len(), 3);
        assert!(log.has_events());

        let pauses = log.filter_by_type(EventType::VaultPaused);
        assert_eq!(pauses.len(), 2);

        log.clear();
        assert!(log.is_empty());
    }
}
