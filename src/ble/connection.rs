//! Connection lifecycle states.

/// State of the connection lifecycle controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LifecycleState {
    /// No device handle is held.
    #[default]
    Idle,
    /// Opening the device handle.
    Connecting,
    /// Looking for the oximetry service and characteristic.
    Discovering,
    /// Enabling notifications.
    Subscribing,
    /// Connected with a discovered characteristic.
    Active,
    /// Unsubscribing and releasing the device handle.
    TearingDown,
}

impl LifecycleState {
    /// Check if a session is established.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Check if in a transitional state.
    pub fn is_transitioning(&self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Discovering | Self::Subscribing | Self::TearingDown
        )
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Discovering => write!(f, "Discovering"),
            Self::Subscribing => write!(f, "Subscribing"),
            Self::Active => write!(f, "Active"),
            Self::TearingDown => write!(f, "TearingDown"),
        }
    }
}

/// Event for lifecycle state changes.
#[derive(Debug, Clone)]
pub struct LifecycleEvent {
    /// Identifier of the device involved, if any.
    pub device_id: Option<String>,
    /// The previous state.
    pub from: LifecycleState,
    /// The new state.
    pub to: LifecycleState,
}
