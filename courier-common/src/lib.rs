pub mod logging;

pub use tracing;

/// Lifecycle signal broadcast from the host to long-running services
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Finalised,
}

impl Signal {
    /// Returns `true` if the receiver should stop taking on new work.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Shutdown | Self::Finalised)
    }
}
