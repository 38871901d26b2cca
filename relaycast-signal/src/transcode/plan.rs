use serde::Serialize;

use relaycast_core::config::TranscodeConfig;
use relaycast_core::models::ClientId;

use crate::sink::MediaLayout;

/// What the encoder reads
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TranscodePlan {
    /// One client's video and audio
    Single { client: ClientId },
    /// Two clients' video side by side, with the primary's audio
    Composite { primary: ClientId, secondary: ClientId },
}

impl TranscodePlan {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Single { .. } => "single",
            Self::Composite { .. } => "composite",
        }
    }

    /// Client whose audio is published
    #[must_use]
    pub const fn primary(&self) -> &ClientId {
        match self {
            Self::Single { client } => client,
            Self::Composite { primary, .. } => primary,
        }
    }

    #[must_use]
    pub fn clients(&self) -> Vec<&ClientId> {
        match self {
            Self::Single { client } => vec![client],
            Self::Composite { primary, secondary } => vec![primary, secondary],
        }
    }

    /// ffmpeg argument list for this plan
    #[must_use]
    pub fn args(&self, config: &TranscodeConfig, layout: &MediaLayout) -> Vec<String> {
        let mut args: Vec<String> = vec!["-y".into()];

        for client in self.clients() {
            args.extend(["-re", "-f", "h264", "-i"].map(String::from));
            args.push(layout.video_annexb(client).display().to_string());
        }
        args.extend(["-re", "-i"].map(String::from));
        args.push(layout.audio(self.primary()).display().to_string());

        if let Self::Composite { .. } = self {
            args.extend(
                [
                    "-filter_complex",
                    "[0:v][1:v]hstack=inputs=2[v]",
                    "-map",
                    "[v]",
                    "-map",
                    "2:a",
                ]
                .map(String::from),
            );
        }

        args.extend([
            "-c:v".into(),
            config.video_codec.clone(),
            "-preset".into(),
            config.video_preset.clone(),
            "-tune".into(),
            "zerolatency".into(),
            "-c:a".into(),
            config.audio_codec.clone(),
            "-b:a".into(),
            config.audio_bitrate.clone(),
            "-f".into(),
            "hls".into(),
            "-hls_time".into(),
            config.segment_seconds.to_string(),
            "-hls_list_size".into(),
            config.playlist_size.to_string(),
            "-hls_flags".into(),
            "delete_segments".into(),
            config.playlist_path().display().to_string(),
        ]);

        args
    }
}

impl std::fmt::Display for TranscodePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single { client } => write!(f, "single({client})"),
            Self::Composite { primary, secondary } => write!(f, "composite({primary}+{secondary})"),
        }
    }
}
