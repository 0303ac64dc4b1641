//! Stable content hash submitted to the store when initiating an upload.

use std::io::{self, Read};

use xxhash_rust::xxh3::Xxh3;

const READ_CHUNK: usize = 64 * 1024;

/// Hash every remaining byte of `reader` with xxh3-128 and return it as lowercase hex. The reader
/// is left at its end; callers that transmit the same content afterwards must rewind it.
pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Xxh3::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&chunk[..n]);
    }
    Ok(hex::encode(hasher.digest128().to_be_bytes()))
}

#[cfg(test)]
mod test_hash_reader {
    use super::*;

    #[test]
    fn streaming_hash_matches_one_shot_hash() {
        let data = vec![7u8; READ_CHUNK * 3 + 17];
        let streamed = hash_reader(data.as_slice()).unwrap();
        let one_shot = hex::encode(xxhash_rust::xxh3::xxh3_128(&data).to_be_bytes());
        assert_eq!(streamed, one_shot);
    }

    #[test]
    fn different_content_hashes_differ() {
        assert_ne!(
            hash_reader(&b"first"[..]).unwrap(),
            hash_reader(&b"second"[..]).unwrap()
        );
    }

    #[test]
    fn hash_is_32_hex_digits() {
        let h = hash_reader(&b""[..]).unwrap();
        assert_eq!(h.len(), 32);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
