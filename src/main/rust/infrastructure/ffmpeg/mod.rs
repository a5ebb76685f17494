mod command_builder;
mod ffmpeg_transcoder;
mod stderr_tail;
mod stdin_pump;

pub use command_builder::CommandBuilder;
pub use ffmpeg_transcoder::{FfmpegLauncher, FfmpegProcess, TranscoderSettings};
pub use stderr_tail::StderrTail;
pub use stdin_pump::StdinPump;
