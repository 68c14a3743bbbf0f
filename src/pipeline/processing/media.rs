use crate::types::{MediaKind, MediaMix, MediaRef};

/// Classify the media attached to an ad by the kinds present.
pub fn classify_media_mix(media_refs: &[MediaRef]) -> MediaMix {
    let has_video = media_refs.iter().any(|m| m.kind == MediaKind::Video);
    let has_image = media_refs.iter().any(|m| m.kind == MediaKind::Image);

    match (has_video, has_image) {
        (true, true) => MediaMix::Both,
        (true, false) => MediaMix::Video,
        (false, true) => MediaMix::Image,
        (false, false) => MediaMix::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_mix_classification() {
        assert_eq!(classify_media_mix(&[]), MediaMix::None);
        assert_eq!(
            classify_media_mix(&[MediaRef::video(None), MediaRef::video(None)]),
            MediaMix::Video
        );
        assert_eq!(classify_media_mix(&[MediaRef::image(None)]), MediaMix::Image);
        assert_eq!(
            classify_media_mix(&[MediaRef::image(None), MediaRef::video(None)]),
            MediaMix::Both
        );
    }
}
