//! Per-unit lifecycle

use std::fmt;

use crate::domain::DomainError;

/// Lifecycle of one unit within a single invocation.
///
/// `Unspecified → Rendered → Written → (Enabled) → (Started)`.
/// Transitions only move forward; a new invocation starts over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum UnitState {
    #[default]
    Unspecified,
    Rendered,
    Written,
    Enabled,
    Started,
}

impl UnitState {
    /// Move to `next`, rejecting backward moves and skipped mandatory states.
    pub fn advance(self, unit: &str, next: UnitState) -> Result<UnitState, DomainError> {
        let allowed = matches!(
            (self, next),
            (UnitState::Unspecified, UnitState::Rendered)
                | (UnitState::Rendered, UnitState::Written)
                | (UnitState::Written, UnitState::Enabled)
                | (UnitState::Written, UnitState::Started)
                | (UnitState::Enabled, UnitState::Started)
        );
        if allowed {
            Ok(next)
        } else {
            Err(DomainError::InvalidTransition {
                unit: unit.to_string(),
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnitState::Unspecified => "unspecified",
            UnitState::Rendered => "rendered",
            UnitState::Written => "written",
            UnitState::Enabled => "enabled",
            UnitState::Started => "started",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_full_path_when_advancing_then_reaches_started() {
        let s = UnitState::default()
            .advance("u", UnitState::Rendered)
            .and_then(|s| s.advance("u", UnitState::Written))
            .and_then(|s| s.advance("u", UnitState::Enabled))
            .and_then(|s| s.advance("u", UnitState::Started))
            .unwrap();
        assert_eq!(s, UnitState::Started);
    }

    #[test]
    fn given_written_when_starting_without_enable_then_allowed() {
        assert_eq!(
            UnitState::Written.advance("u", UnitState::Started).unwrap(),
            UnitState::Started
        );
    }

    #[test]
    fn given_backward_or_skipping_move_then_rejected() {
        assert!(UnitState::Written.advance("u", UnitState::Rendered).is_err());
        assert!(UnitState::Started.advance("u", UnitState::Unspecified).is_err());
        assert!(UnitState::Rendered.advance("u", UnitState::Started).is_err());
        assert!(UnitState::Unspecified.advance("u", UnitState::Written).is_err());
        assert!(UnitState::Written.advance("u", UnitState::Written).is_err());
    }
}
