use crate::domain::errors::{DomainError, Result};

const MAX_CRF: u8 = 51;
const MAX_FRAME_RATE: u32 = 240;

/// Fixed encode parameters passed to the transcoder.
///
/// Operators may tune these; clients only choose the destination.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderProfile {
    frame_rate: u32,
    crf: u8,
    preset: String,
    tune: String,
    pixel_format: String,
    profile: String,
    level: String,
    audio_codec: String,
    audio_bitrate: String,
    audio_sample_rate: u32,
    output_format: String,
}

impl EncoderProfile {
    pub fn new(frame_rate: u32, crf: u8) -> Result<Self> {
        if frame_rate == 0 || frame_rate > MAX_FRAME_RATE {
            return Err(DomainError::InvalidEncoderProfile(format!(
                "frame rate {} out of range 1..={}",
                frame_rate, MAX_FRAME_RATE
            )));
        }

        if crf > MAX_CRF {
            return Err(DomainError::InvalidEncoderProfile(format!(
                "CRF {} out of range 0..={}",
                crf, MAX_CRF
            )));
        }

        Ok(Self {
            frame_rate,
            crf,
            ..Self::default()
        })
    }

    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    /// Keyframe interval: two seconds of frames
    pub fn keyframe_interval(&self) -> u32 {
        self.frame_rate * 2
    }

    pub fn min_keyframe_interval(&self) -> u32 {
        self.frame_rate
    }

    pub fn crf(&self) -> u8 {
        self.crf
    }

    pub fn preset(&self) -> &str {
        &self.preset
    }

    pub fn tune(&self) -> &str {
        &self.tune
    }

    pub fn pixel_format(&self) -> &str {
        &self.pixel_format
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn level(&self) -> &str {
        &self.level
    }

    pub fn audio_codec(&self) -> &str {
        &self.audio_codec
    }

    pub fn audio_bitrate(&self) -> &str {
        &self.audio_bitrate
    }

    pub fn audio_sample_rate(&self) -> u32 {
        self.audio_sample_rate
    }

    pub fn output_format(&self) -> &str {
        &self.output_format
    }
}

impl Default for EncoderProfile {
    fn default() -> Self {
        Self {
            frame_rate: 25,
            crf: 25,
            preset: "ultrafast".to_string(),
            tune: "zerolatency".to_string(),
            pixel_format: "yuv420p".to_string(),
            profile: "main".to_string(),
            level: "3.1".to_string(),
            audio_codec: "aac".to_string(),
            audio_bitrate: "128k".to_string(),
            audio_sample_rate: 32_000,
            output_format: "flv".to_string(),
        }
    }
}
