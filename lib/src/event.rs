// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Session events, broadcast to subscribers for progress display

/// Secure element session states
#[derive(Copy, Clone, Debug, PartialEq, Eq, strum::Display)]
pub enum SessionState {
    Idle,
    AppletSelected,
    AttestationKeyVerified,
    AddressResolved,
    AssetResolved,
    Complete,
    Failed,
    Cancelled,
}

impl SessionState {
    /// Check whether the state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Complete | SessionState::Failed | SessionState::Cancelled
        )
    }
}

/// Events emitted by a [SecureChannel][crate::SecureChannel]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// Waiting for the user to present a card
    AwaitingTap,
    /// Card connected
    SessionOpened,
    /// Session state changed
    State(SessionState),
    /// Card released
    SessionClosed,
}
