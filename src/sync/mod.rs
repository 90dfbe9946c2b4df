//! Cross-process coordination: single-instance claims per role and the
//! update/quit/show notification bus.
//!
//! Object names are shared by both processes of a build and must not change
//! between them.

pub mod channel;
pub mod guard;

pub use channel::{QuitStatus, SignalListener, UpdateChannel};
pub use guard::{ClaimResult, InstanceGuard};

use crate::model::ProcessRole;
use crate::platform::SignalName;

pub const MAIN_MUTEX: SignalName = SignalName::global("TodoBallMainMutex_v2");
pub const BALL_MUTEX: SignalName = SignalName::global("TodoBallFloatMutex_v2");
pub const UPDATE_EVENT: SignalName = SignalName::session("TodoBallUpdateEvent");
pub const QUIT_EVENT: SignalName = SignalName::session("TodoBallQuitEvent");
/// Asks the main process to show its window.
pub const SHOW_EVENT: SignalName = SignalName::session("TodoBallShowEvent");

/// Machine-wide mutex guarding one running instance of `role`.
pub fn instance_mutex_name(role: ProcessRole) -> SignalName {
    match role {
        ProcessRole::Main => MAIN_MUTEX,
        ProcessRole::Ball => BALL_MUTEX,
    }
}
