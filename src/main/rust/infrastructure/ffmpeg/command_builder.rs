use crate::domain::value_objects::{Destination, EncoderProfile};

pub struct CommandBuilder;

impl CommandBuilder {
    /// Build the ffmpeg argument list for a stdin-to-RTMP relay.
    ///
    /// Media arrives on stdin, is re-encoded to H.264/AAC and muxed as FLV
    /// to the destination. Every value is a separate argument; no shell is
    /// involved.
    pub fn build_args(profile: &EncoderProfile, destination: &Destination) -> Vec<String> {
        vec![
            "-i".to_string(),
            "-".to_string(),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            profile.preset().to_string(),
            "-tune".to_string(),
            profile.tune().to_string(),
            "-r".to_string(),
            profile.frame_rate().to_string(),
            "-g".to_string(),
            profile.keyframe_interval().to_string(),
            "-keyint_min".to_string(),
            profile.min_keyframe_interval().to_string(),
            "-crf".to_string(),
            profile.crf().to_string(),
            "-pix_fmt".to_string(),
            profile.pixel_format().to_string(),
            // Keyframes only on the fixed interval
            "-sc_threshold".to_string(),
            "0".to_string(),
            "-profile:v".to_string(),
            profile.profile().to_string(),
            "-level".to_string(),
            profile.level().to_string(),
            "-c:a".to_string(),
            profile.audio_codec().to_string(),
            "-b:a".to_string(),
            profile.audio_bitrate().to_string(),
            "-ar".to_string(),
            profile.audio_sample_rate().to_string(),
            "-f".to_string(),
            profile.output_format().to_string(),
            destination.url(),
        ]
    }
}
