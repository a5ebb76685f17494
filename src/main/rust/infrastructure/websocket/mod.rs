mod channel_notifier;
pub mod protocol;
mod ws_server;

pub use channel_notifier::ChannelNotifier;
pub use ws_server::{handle_connection, relay_routes};
