pub mod controller;
pub mod session;
pub mod store;

pub use controller::{ControllerConfig, EventOutcome, PendingTurn, SessionController, SessionEvent};
pub use session::{LookupState, Session, SessionId, SessionSnapshot};
pub use store::{SessionStore, SharedSession};

pub mod prelude {
    pub use super::{LookupState, Session, SessionController, SessionEvent, SessionId, SessionStore};
    pub use cp_core::{Article, ChatTurn, Error, Result, Role};
}
