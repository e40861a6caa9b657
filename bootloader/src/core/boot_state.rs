// Boot state tracking for debugging and diagnostics

use core::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum BootPhase {
    Idle = 0,
    Classified = 1,
    Loaded = 2,
    FixedUp = 3,
    Transferred = 4,
    Failed = 0xFFFF_FFFF,
}

impl BootPhase {
    fn from_u32(v: u32) -> Self {
        match v {
            0 => BootPhase::Idle,
            1 => BootPhase::Classified,
            2 => BootPhase::Loaded,
            3 => BootPhase::FixedUp,
            4 => BootPhase::Transferred,
            _ => BootPhase::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BootPhase::Idle => "idle",
            BootPhase::Classified => "classified",
            BootPhase::Loaded => "loaded",
            BootPhase::FixedUp => "fixed up",
            BootPhase::Transferred => "transferred",
            BootPhase::Failed => "failed",
        }
    }

    /// Whether `next` may follow `self` within one boot attempt.
    ///
    /// Fixup is skipped when no device tree is supplied, so `Loaded` may go
    /// straight to `Transferred`. `Failed` is absorbing.
    pub fn can_advance_to(&self, next: BootPhase) -> bool {
        use BootPhase::*;
        matches!(
            (*self, next),
            (Idle, Classified)
                | (Classified, Loaded)
                | (Loaded, FixedUp)
                | (Loaded, Transferred)
                | (FixedUp, Transferred)
        ) || (*self != Failed && next == Failed)
    }
}

pub struct BootState {
    current_phase: AtomicU32,
}

impl BootState {
    pub const fn new() -> Self {
        Self {
            current_phase: AtomicU32::new(BootPhase::Idle as u32),
        }
    }

    /// Move to `phase`; illegal transitions leave the state unchanged
    pub fn set_phase(&self, phase: BootPhase) -> bool {
        let current = self.get_phase();
        if !current.can_advance_to(phase) {
            log::warn!("boot state: {} -> {} rejected", current.as_str(), phase.as_str());
            return false;
        }
        log::debug!("boot state: {} -> {}", current.as_str(), phase.as_str());
        self.current_phase.store(phase as u32, Ordering::Release);
        true
    }

    pub fn get_phase(&self) -> BootPhase {
        BootPhase::from_u32(self.current_phase.load(Ordering::Acquire))
    }

    pub fn set_error(&self) {
        self.current_phase
            .store(BootPhase::Failed as u32, Ordering::Release);
    }

    pub fn is_error(&self) -> bool {
        self.get_phase() == BootPhase::Failed
    }

    /// Start a fresh attempt
    pub fn reset(&self) {
        self.current_phase
            .store(BootPhase::Idle as u32, Ordering::Release);
    }
}

impl Default for BootState {
    fn default() -> Self {
        Self::new()
    }
}
