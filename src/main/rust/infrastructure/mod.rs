pub mod ffmpeg;
pub mod metrics;
pub mod shutdown;
pub mod websocket;
