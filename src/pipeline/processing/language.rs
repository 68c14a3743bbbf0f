/// Identify the language of ad copy.
///
/// Returns the ISO 639-3 code (e.g. `eng`) only when the detector is
/// confident; empty text and inconclusive detections yield `None`.
pub fn detect_language(text: &str) -> Option<String> {
    if text.trim().is_empty() {
        return None;
    }

    whatlang::detect(text)
        .filter(|info| info.is_reliable())
        .map(|info| info.lang().code().to_string())
}
