use derive_more::Display;

/// The lifecycle state of a motor.
///
/// ```text
/// Unstarted -> Starting -> Running -> Finished
///                 |           |
///                 |           +-----> Stopping -> Stopped
///                 |           |           |
///                 +-----------+-----------+-----> Errored
/// ```
///
/// Transitions only move forward. `Stopped`, `Finished` and `Errored` are terminal.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(u8)]
#[expect(
    clippy::exhaustive_enums,
    reason = "the lifecycle is a fixed state machine and new states would be a breaking change"
)]
pub enum RunState {
    /// Created but its thread has not begun running it.
    Unstarted = 0,

    /// Initializing its action.
    Starting = 1,

    /// Claiming and executing cycles.
    Running = 2,

    /// A stop was requested and the motor is winding down.
    Stopping = 3,

    /// Stopped on request before the input was exhausted.
    Stopped = 4,

    /// Executed every cycle it could claim.
    Finished = 5,

    /// Stopped because of a fatal error.
    Errored = 6,
}

impl RunState {
    /// Every state, in lifecycle order.
    pub const ALL: [Self; 7] = [
        Self::Unstarted,
        Self::Starting,
        Self::Running,
        Self::Stopping,
        Self::Stopped,
        Self::Finished,
        Self::Errored,
    ];

    /// The states a motor never leaves.
    pub const TERMINAL: [Self; 3] = [Self::Stopped, Self::Finished, Self::Errored];

    /// A one-character code for compact status strings.
    #[must_use]
    pub fn code(self) -> char {
        match self {
            Self::Unstarted => '_',
            Self::Starting => 's',
            Self::Running => 'R',
            Self::Stopping => 'x',
            Self::Stopped => 'X',
            Self::Finished => 'F',
            Self::Errored => 'E',
        }
    }

    /// Whether the state is one a motor never leaves.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Finished | Self::Errored)
    }

    /// Whether a motor in this state may move to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Unstarted, Self::Starting)
                | (Self::Starting, Self::Running | Self::Errored)
                | (
                    Self::Running,
                    Self::Stopping | Self::Finished | Self::Errored
                )
                | (Self::Stopping, Self::Stopped | Self::Errored)
        )
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        Self::ALL
            .get(usize::from(value))
            .copied()
            .expect("state cells only ever hold valid state discriminants")
    }
}

/// How soon a motor should stop once asked to.
///
/// Ordered by urgency, so concurrent requests combine to the most urgent one.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[repr(u8)]
pub(crate) enum StopMode {
    /// Finish every cycle of the claimed segment, then stop without claiming another.
    AfterSegment = 1,

    /// Finish the in-flight cycle, then stop. The rest of the claimed segment is abandoned.
    AfterCycle = 2,
}

impl StopMode {
    pub(crate) fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::AfterSegment),
            2 => Some(Self::AfterCycle),
            _ => None,
        }
    }
}
