//! Accessibility state of a cataloged item.
//!
//! A record is `Accessible` when its file was confirmed on disk under a
//! currently configured library root by the most recent scan. There is no
//! terminal state and no transition removes a record or its tags.
//!
//! ```text
//!               Rediscovered
//!   Inaccessible ───────────▶ Accessible
//!        ▲                        │
//!        └────────────────────────┘
//!     PrePass | MissingFromConfiguredRoot
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accessibility {
    Accessible,
    Inaccessible,
}

/// Events a scan pass can raise for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessEvent {
    /// Global marking at the start of a pass, committed before discovery.
    PrePass,
    /// The file was found by the walk under a configured root.
    Rediscovered,
    /// The record's root is still configured but the walk did not see it.
    MissingFromConfiguredRoot,
    /// The record's root is no longer configured. It stays where the
    /// pre-pass left it and cannot be brought back by the missing-file pass.
    RootUnconfigured,
}

impl Accessibility {
    pub fn is_accessible(self) -> bool {
        self == Accessibility::Accessible
    }

    pub fn from_flag(accessible: bool) -> Self {
        if accessible {
            Accessibility::Accessible
        } else {
            Accessibility::Inaccessible
        }
    }

    /// Initial state of a freshly inserted record.
    pub fn initial() -> Self {
        Accessibility::Accessible
    }

    pub fn apply(self, event: AccessEvent) -> Self {
        match event {
            AccessEvent::PrePass => Accessibility::Inaccessible,
            AccessEvent::Rediscovered => Accessibility::Accessible,
            AccessEvent::MissingFromConfiguredRoot => Accessibility::Inaccessible,
            AccessEvent::RootUnconfigured => Accessibility::Inaccessible,
        }
    }

    /// Whether `event` moves a record out of the accessible state.
    pub fn is_loss(self, event: AccessEvent) -> bool {
        self.is_accessible() && !self.apply(event).is_accessible()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rediscovery_always_restores_access() {
        for start in [Accessibility::Accessible, Accessibility::Inaccessible] {
            assert_eq!(start.apply(AccessEvent::Rediscovered), Accessibility::Accessible);
        }
    }

    #[test]
    fn test_prepass_and_missing_revoke_access() {
        let start = Accessibility::Accessible;
        assert_eq!(start.apply(AccessEvent::PrePass), Accessibility::Inaccessible);
        assert_eq!(
            start.apply(AccessEvent::MissingFromConfiguredRoot),
            Accessibility::Inaccessible
        );
        assert!(start.is_loss(AccessEvent::MissingFromConfiguredRoot));
        assert!(!Accessibility::Inaccessible.is_loss(AccessEvent::MissingFromConfiguredRoot));
    }

    #[test]
    fn test_unconfigured_root_is_never_rediscovered() {
        assert_eq!(
            Accessibility::Inaccessible.apply(AccessEvent::RootUnconfigured),
            Accessibility::Inaccessible
        );
    }

    #[test]
    fn test_flag_conversion() {
        assert_eq!(Accessibility::from_flag(true), Accessibility::Accessible);
        assert!(!Accessibility::from_flag(false).is_accessible());
        assert_eq!(Accessibility::initial(), Accessibility::Accessible);
    }
}
