//! Mitigation actions and handler dispatch.

use serde::Serialize;

/// Final decision for a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MitigationAction {
    /// Let the request through
    #[default]
    None,
    /// Serve a challenge (captcha)
    Challenge,
    /// Refuse the request
    Block,
}

impl MitigationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            MitigationAction::None => "none",
            MitigationAction::Challenge => "challenge",
            MitigationAction::Block => "block",
        }
    }
}

/// One handler per mitigation action.
///
/// Handlers are closures, so they run with whatever request-scoped state
/// they capture. Exactly one is invoked per dispatch.
pub struct ActionHandlers<N, B, C> {
    pub on_none: N,
    pub on_block: B,
    pub on_challenge: C,
}

impl<T, N, B, C> ActionHandlers<N, B, C>
where
    N: FnOnce() -> T,
    B: FnOnce() -> T,
    C: FnOnce() -> T,
{
    pub fn new(on_none: N, on_block: B, on_challenge: C) -> Self {
        Self {
            on_none,
            on_block,
            on_challenge,
        }
    }

    /// Run the handler selected by `action`.
    pub fn dispatch(self, action: MitigationAction) -> T {
        match action {
            MitigationAction::None => (self.on_none)(),
            MitigationAction::Block => (self.on_block)(),
            MitigationAction::Challenge => (self.on_challenge)(),
        }
    }
}
