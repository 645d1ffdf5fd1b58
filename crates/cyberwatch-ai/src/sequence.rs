/// Fixed input length the classifier was trained with.
pub const SEQUENCE_LENGTH: usize = 100;

/// Post-pad with zeros or post-truncate `indices` to exactly `len` entries.
///
/// Matches `pad_sequences(..., padding='post', truncating='post')`: content
/// stays at the front, the first `len` indices survive truncation.
pub fn pad_sequence(indices: &[u32], len: usize) -> Vec<i64> {
    let mut padded: Vec<i64> = indices.iter().take(len).map(|&i| i64::from(i)).collect();
    padded.resize(len, 0);
    padded
}
