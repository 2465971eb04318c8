//! Onboarding state machine.
//!
//! This module provides a pure, side-effect-free state machine for the
//! first-run flow: role selection, then either the child path (permission
//! grant → code generation → paired) or the parent path (code redemption
//! → paired), ending in a terminal `Complete`.
//!
//! The machine takes events as input and produces a new state plus a list
//! of actions to execute. The actual I/O (issuing codes through the
//! pairing registry, persisting completion) is performed by the caller,
//! which enables instant unit testing without mocks.
//!
//! `Complete` carries an explicit [`CompletionPath`]: a fresh pairing and
//! a restored session are distinct, testable outcomes, so presentation
//! can render a first-time confirmation versus a steady-state "connected"
//! view without inferring anything.

use famlink_types::{PairCode, Relationship, Role};

/// Onboarding state machine - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnboardingState {
    /// No role selected yet.
    RoleUnselected,
    /// Child path: waiting for the device permission grant.
    ChildPermissionPending,
    /// Child path: a pairing code is on screen, waiting for the parent
    /// to redeem it.
    ChildCodeGenerated {
        /// The code currently displayed.
        code: PairCode,
    },
    /// Child path: the code was redeemed; showing the confirmation.
    ChildPaired {
        /// The relationship created by redemption.
        relationship: Relationship,
    },
    /// Parent path: waiting for a successful code redemption.
    ParentPairingPending,
    /// Parent path: redemption succeeded; showing the confirmation.
    ParentPaired {
        /// The relationship created by redemption.
        relationship: Relationship,
    },
    /// Terminal. Re-entering the app with `Complete` persisted skips the
    /// machine entirely via [`OnboardingState::restored`].
    Complete {
        /// The role the account finished onboarding as.
        role: Role,
        /// How this terminal state was reached.
        path: CompletionPath,
    },
}

/// How onboarding reached `Complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionPath {
    /// The pairing happened in this session; presentation may celebrate.
    FreshPairing,
    /// A previously completed onboarding was restored; presentation
    /// renders the steady-state connected view.
    RestoredSession,
}

/// Events that drive the onboarding flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnboardingEvent {
    /// The identity provider's role claim was chosen/confirmed.
    RoleChosen(Role),
    /// The child device granted the required permission.
    PermissionGranted,
    /// The pairing registry issued a code for this child.
    CodeIssued {
        /// The issued code.
        code: PairCode,
    },
    /// The pairing registry reports this child's code was redeemed.
    CodeRedeemed {
        /// The relationship created by redemption.
        relationship: Relationship,
    },
    /// The parent's redemption succeeded.
    PairingConfirmed {
        /// The relationship created by redemption.
        relationship: Relationship,
    },
    /// The user acknowledged the pairing confirmation screen.
    ConfirmationAcknowledged,
}

/// Actions to be executed by the caller.
///
/// These are instructions, not side effects: the embedding layer
/// interprets them against the pairing registry and its persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnboardingAction {
    /// Request a pairing code from the registry for this child.
    RequestCode,
    /// Persist that onboarding completed for this role.
    PersistCompletion {
        /// The completed role.
        role: Role,
    },
}

impl OnboardingState {
    /// Create a new machine at the start of the flow.
    pub fn new() -> Self {
        Self::RoleUnselected
    }

    /// Restore a previously completed onboarding.
    ///
    /// The only constructor of `CompletionPath::RestoredSession`; a
    /// returning user lands here and never replays the machine.
    pub fn restored(role: Role) -> Self {
        Self::Complete {
            role,
            path: CompletionPath::RestoredSession,
        }
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function. Invalid transitions leave the state
    /// unchanged and produce no actions.
    pub fn on_event(self, event: OnboardingEvent) -> (Self, Vec<OnboardingAction>) {
        match (self, event) {
            // Role selection
            (Self::RoleUnselected, OnboardingEvent::RoleChosen(Role::Child)) => {
                (Self::ChildPermissionPending, vec![])
            }
            (Self::RoleUnselected, OnboardingEvent::RoleChosen(Role::Parent)) => {
                (Self::ParentPairingPending, vec![])
            }

            // Child path
            (Self::ChildPermissionPending, OnboardingEvent::PermissionGranted) => (
                Self::ChildPermissionPending,
                vec![OnboardingAction::RequestCode],
            ),
            (Self::ChildPermissionPending, OnboardingEvent::CodeIssued { code }) => {
                (Self::ChildCodeGenerated { code }, vec![])
            }
            // Reissue (previous code expired) replaces the displayed code
            (Self::ChildCodeGenerated { .. }, OnboardingEvent::CodeIssued { code }) => {
                (Self::ChildCodeGenerated { code }, vec![])
            }
            (Self::ChildCodeGenerated { .. }, OnboardingEvent::CodeRedeemed { relationship }) => {
                (Self::ChildPaired { relationship }, vec![])
            }
            (Self::ChildPaired { .. }, OnboardingEvent::ConfirmationAcknowledged) => (
                Self::Complete {
                    role: Role::Child,
                    path: CompletionPath::FreshPairing,
                },
                vec![OnboardingAction::PersistCompletion { role: Role::Child }],
            ),

            // Parent path
            (Self::ParentPairingPending, OnboardingEvent::PairingConfirmed { relationship }) => {
                (Self::ParentPaired { relationship }, vec![])
            }
            (Self::ParentPaired { .. }, OnboardingEvent::ConfirmationAcknowledged) => (
                Self::Complete {
                    role: Role::Parent,
                    path: CompletionPath::FreshPairing,
                },
                vec![OnboardingAction::PersistCompletion { role: Role::Parent }],
            ),

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Whether the flow reached its terminal state.
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete { .. })
    }

    /// How `Complete` was reached, if it has been.
    pub fn completion_path(&self) -> Option<CompletionPath> {
        match self {
            Self::Complete { path, .. } => Some(*path),
            _ => None,
        }
    }
}

impl Default for OnboardingState {
    fn default() -> Self {
        Self::new()
    }
}
