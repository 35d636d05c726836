//! Host lifecycle events
//!
//! The host environment (mobile shell, desktop window manager) reports
//! foreground/background transitions as plain events consumed by
//! [`SessionController::handle_lifecycle`](crate::session::SessionController::handle_lifecycle).
//! A single handler function replaces any observer hierarchy.

/// Foreground/background-equivalent signal from the host environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The app moved to the background; hardware resources must be released
    Suspended,
    /// The app returned to the foreground
    Resumed,
}

impl LifecycleEvent {
    /// Check if this event releases resources
    pub fn is_suspend(&self) -> bool {
        matches!(self, LifecycleEvent::Suspended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_classification() {
        assert!(LifecycleEvent::Suspended.is_suspend());
        assert!(!LifecycleEvent::Resumed.is_suspend());
    }
}
