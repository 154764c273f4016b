// FormatSelector - picks the representations to fetch
//
// Video-only streams are ranked by quality (height, then fps), audio-only
// streams by bitrate. Ties keep the first stream in catalog order, so the
// result only depends on the catalog contents.

use super::errors::SelectionError;
use super::models::{OutputKind, StreamCatalog, StreamDescriptor, StreamRole};

/// Streams chosen for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Audio(StreamDescriptor),
    AudioVideo {
        video: StreamDescriptor,
        audio: StreamDescriptor,
    },
}

impl Selection {
    /// (role, descriptor) pairs in fetch order
    pub fn parts(&self) -> Vec<(StreamRole, &StreamDescriptor)> {
        match self {
            Self::Audio(audio) => vec![(StreamRole::Audio, audio)],
            Self::AudioVideo { video, audio } => {
                vec![(StreamRole::Video, video), (StreamRole::Audio, audio)]
            }
        }
    }
}

pub struct FormatSelector;

impl FormatSelector {
    /// Choose the streams needed for `output_kind`.
    ///
    /// For audio+video both roles are checked before failing so the error
    /// lists every missing role.
    pub fn select(
        catalog: &StreamCatalog,
        output_kind: OutputKind,
    ) -> Result<Selection, SelectionError> {
        match output_kind {
            OutputKind::AudioOnly => Self::find_best_audio(&catalog.streams)
                .cloned()
                .map(Selection::Audio)
                .ok_or_else(|| SelectionError::new(vec![StreamRole::Audio])),
            OutputKind::AudioVideo => {
                let video = Self::find_best_video(&catalog.streams);
                let audio = Self::find_best_audio(&catalog.streams);

                match (video, audio) {
                    (Some(video), Some(audio)) => Ok(Selection::AudioVideo {
                        video: video.clone(),
                        audio: audio.clone(),
                    }),
                    (video, audio) => {
                        let mut missing = Vec::new();
                        if video.is_none() {
                            missing.push(StreamRole::Video);
                        }
                        if audio.is_none() {
                            missing.push(StreamRole::Audio);
                        }
                        Err(SelectionError::new(missing))
                    }
                }
            }
        }
    }

    /// Highest quality video-only stream
    pub fn find_best_video(streams: &[StreamDescriptor]) -> Option<&StreamDescriptor> {
        first_max_by_key(streams, StreamDescriptor::video_quality)
    }

    /// Highest bitrate audio-only stream
    pub fn find_best_audio(streams: &[StreamDescriptor]) -> Option<&StreamDescriptor> {
        first_max_by_key(streams, StreamDescriptor::audio_bitrate)
    }
}

// `Iterator::max_by_key` returns the last of equal maxima; we need the first.
fn first_max_by_key<T, K, F>(items: &[T], key: F) -> Option<&T>
where
    K: Ord,
    F: Fn(&T) -> Option<K>,
{
    let mut best: Option<(&T, K)> = None;
    for item in items {
        let Some(k) = key(item) else { continue };
        let better = match &best {
            Some((_, best_key)) => k > *best_key,
            None => true,
        };
        if better {
            best = Some((item, k));
        }
    }
    best.map(|(item, _)| item)
}
