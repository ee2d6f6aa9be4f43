//! Claim and stream type codes as persisted in the index.

use serde::{Deserialize, Serialize};

/// Top-level claim type (stored as an integer column).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimType {
    Stream,
    Channel,
    Repost,
}

impl ClaimType {
    pub fn code(self) -> i64 {
        match self {
            Self::Stream => 1,
            Self::Channel => 2,
            Self::Repost => 3,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "stream" => Some(Self::Stream),
            "channel" => Some(Self::Channel),
            "repost" => Some(Self::Repost),
            _ => None,
        }
    }
}

/// Coarse stream classification derived from the media type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamType {
    Video,
    Audio,
    Image,
    Document,
    Binary,
    Model,
}

impl StreamType {
    pub fn code(self) -> i64 {
        match self {
            Self::Video => 1,
            Self::Audio => 2,
            Self::Image => 3,
            Self::Document => 4,
            Self::Binary => 5,
            Self::Model => 6,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "video" => Some(Self::Video),
            "audio" => Some(Self::Audio),
            "image" => Some(Self::Image),
            "document" => Some(Self::Document),
            "binary" => Some(Self::Binary),
            "model" => Some(Self::Model),
            _ => None,
        }
    }
}

/// Media types whose stream type is not implied by their top-level type.
const EXPLICIT_TYPES: &[(&str, StreamType)] = &[
    ("application/pdf", StreamType::Document),
    ("application/epub+zip", StreamType::Document),
    ("application/msword", StreamType::Document),
    ("application/json", StreamType::Document),
    ("application/xml", StreamType::Document),
    ("application/postscript", StreamType::Document),
    ("application/x-ext-mkv", StreamType::Video),
    ("application/x-ext-mp4", StreamType::Video),
    ("application/x-mpegurl", StreamType::Video),
    ("application/vnd.ms-powerpoint", StreamType::Document),
    ("application/vnd.ms-excel", StreamType::Document),
    ("message/rfc822", StreamType::Document),
];

/// Guess the stream type of a media type; unknown types are binary.
pub fn guess_stream_type(media_type: &str) -> StreamType {
    let media_type = media_type.trim().to_ascii_lowercase();
    if let Some((_, stream_type)) = EXPLICIT_TYPES.iter().find(|(m, _)| *m == media_type) {
        return *stream_type;
    }
    match media_type.split('/').next().unwrap_or_default() {
        "video" => StreamType::Video,
        "audio" => StreamType::Audio,
        "image" => StreamType::Image,
        "text" => StreamType::Document,
        "model" => StreamType::Model,
        _ => StreamType::Binary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_by_prefix() {
        assert_eq!(guess_stream_type("video/mp4"), StreamType::Video);
        assert_eq!(guess_stream_type("audio/mpeg"), StreamType::Audio);
        assert_eq!(guess_stream_type("image/png"), StreamType::Image);
        assert_eq!(guess_stream_type("text/markdown"), StreamType::Document);
        assert_eq!(guess_stream_type("model/stl"), StreamType::Model);
    }

    #[test]
    fn test_guess_explicit_and_unknown() {
        assert_eq!(guess_stream_type("application/pdf"), StreamType::Document);
        assert_eq!(guess_stream_type("application/octet-stream"), StreamType::Binary);
        assert_eq!(guess_stream_type(""), StreamType::Binary);
    }

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(ClaimType::Stream.code(), 1);
        assert_eq!(ClaimType::Channel.code(), 2);
        assert_eq!(StreamType::Model.code(), 6);
        assert_eq!(StreamType::from_name("binary"), Some(StreamType::Binary));
        assert_eq!(ClaimType::from_name("nope"), None);
    }
}
