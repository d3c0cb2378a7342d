use seqface_core::FormatTag;

/// Substrings that route a key to the general-purpose codec. Checked before
/// `ppm`, so a key matching both is treated as a standard raster.
const STANDARD_MARKERS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];
const PPM_MARKER: &str = "ppm";

/// Decide which decoder applies to a record, from its key alone.
///
/// Matching is a case-insensitive substring test, not a strict extension
/// check: `frames.ppm.0001` is a PPM raster.
pub fn classify(key: &str) -> FormatTag {
    let key = key.to_lowercase();
    if STANDARD_MARKERS.iter().any(|m| key.contains(m)) {
        FormatTag::StandardRaster
    } else if key.contains(PPM_MARKER) {
        FormatTag::PpmRaster
    } else {
        FormatTag::Unsupported
    }
}
