// Session module
// Silent session refresh and the notifications it produces

mod events;
mod refresh;
mod state;
mod types;

pub use events::{SessionEvents, SessionSubscription, DEFAULT_EVENT_CAPACITY, MAX_EVENT_CAPACITY};
pub use refresh::{RefreshMode, SessionRefresher, REFRESH_PATH};
pub use state::{AuthStatus, SessionSnapshot, SessionState};
pub use types::{RefreshResponse, SessionEvent};

pub(crate) use refresh::Recovery;
