use uuid::Uuid;

use crate::frames::InboundFrame;

/// Mint the process-unique session token at controller startup.
pub fn mint_session_token() -> String {
    Uuid::new_v4().to_string()
}

/// The token is applied at most once per page lifetime: only when no token
/// is held yet and the incoming one is nonempty.
pub fn should_apply_session_init_token(current: Option<&str>, incoming: &str) -> bool {
    current.map_or(true, str::is_empty) && !incoming.is_empty()
}

/// One-shot bootstrap slot the page context reads its token from.
///
/// The first `take()` returns the token and clears the slot; later reads
/// get nothing, so a script injected after the handoff cannot recover it.
#[derive(Debug, Default)]
pub struct BootstrapSlot {
    token: Option<String>,
}

impl BootstrapSlot {
    pub fn stage(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// Read and clear.
    pub fn take(&mut self) -> Option<String> {
        self.token.take()
    }
}

/// Controller-side frame admission: page origin plus session token.
#[derive(Debug, Clone)]
pub struct FrameGate {
    origin: String,
    session_token: String,
}

impl FrameGate {
    pub fn new(origin: impl Into<String>, session_token: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            session_token: session_token.into(),
        }
    }

    pub fn session_token(&self) -> &str {
        &self.session_token
    }

    /// A frame is admitted only when it arrives from the page's own origin
    /// carrying the current session token.
    pub fn admits(&self, origin: &str, frame: &InboundFrame) -> bool {
        if origin != self.origin {
            return false;
        }
        match frame.session_token.as_deref() {
            Some(token) => token == self.session_token,
            None => false,
        }
    }
}
