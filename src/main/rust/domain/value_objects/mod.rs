mod connection_id;
mod destination;
mod encoder_profile;
mod exit_report;
mod relay_event;
mod session_state;

pub use connection_id::ConnectionId;
pub use destination::Destination;
pub use encoder_profile::EncoderProfile;
pub use exit_report::ExitReport;
pub use relay_event::{ClientEvent, ErrorKind, ServerEvent};
pub use session_state::SessionState;
