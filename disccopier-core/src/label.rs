//! Volume label extraction from the first block of a disc.

/// Byte offset of the volume identifier: sector 16 (the ISO-9660 Primary
/// Volume Descriptor, 2048-byte sectors) plus 40.
pub const LABEL_OFFSET: usize = 0x8028;

/// Length of the volume identifier field.
pub const LABEL_LENGTH: usize = 32;

/// Returns the trimmed volume label candidate from the first buffer read
/// from a disc.
///
/// `first_block` is the filled part of the first buffer. If it is too short
/// to hold the whole label field the label is blank. No check is made that
/// the medium is actually ISO-9660; anything that decodes to whitespace or
/// control bytes yields an empty string.
pub fn extract_volume_label(first_block: &[u8]) -> String {
    let Some(field) = first_block.get(LABEL_OFFSET..LABEL_OFFSET + LABEL_LENGTH) else {
        return String::new();
    };

    String::from_utf8_lossy(field)
        .trim_matches(|c: char| c.is_whitespace() || c.is_control())
        .to_string()
}
