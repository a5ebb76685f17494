mod session_registry;
mod stream_session;

pub use session_registry::{SessionHandle, SessionRegistry};
pub use stream_session::{SessionCanceller, SessionSettings, SessionStats, StreamSession};
