use uuid::Uuid;

use crate::SHORT_ID_LEN;

const SHORT_ID_ALPHABET: &[u8; 64] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz_-";

/// Splits `text` into pieces of at most `max_units` UTF-16 code units (the
/// unit rich-text limits are measured in), never cutting a character in half.
/// An empty input yields no chunks.
pub fn chunk_text(text: &str, max_units: usize) -> Vec<String> {
    // a surrogate pair must fit in one chunk
    let max_units = max_units.max(2);
    let mut chunks = Vec::with_capacity(text.len() / max_units + 1);
    let mut current = String::new();
    let mut count = 0;

    for ch in text.chars() {
        let units = ch.len_utf16();
        if count + units > max_units {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
        current.push(ch);
        count += units;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Reassembles chunks in the order they were written.
pub fn join_chunks<I, S>(chunks: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    chunks
        .into_iter()
        .fold(String::new(), |mut acc, chunk| {
            acc.push_str(chunk.as_ref());
            acc
        })
}

/// Eight URL-safe characters drawn from a fresh v4 UUID.
pub fn short_id() -> String {
    let bytes = Uuid::new_v4().into_bytes();
    // bytes 6 and 8 carry the version and variant bits
    bytes
        .iter()
        .enumerate()
        .filter(|(index, _)| *index != 6 && *index != 8)
        .take(SHORT_ID_LEN)
        .map(|(_, byte)| SHORT_ID_ALPHABET[(*byte & 0x3f) as usize] as char)
        .collect()
}
