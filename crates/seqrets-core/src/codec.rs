//! Payload compression (gzip, best level).

use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use std::io::{Read, Write};
use zeroize::Zeroizing;

use crate::error::CoreError;

/// Gzip-compress at the best level; output size matters more than speed for QR density.
pub fn compress(data: &[u8]) -> Result<Zeroizing<Vec<u8>>, CoreError> {
    gzip_into(Vec::new(), data).map(Zeroizing::new)
}

fn gzip_into<W: Write>(sink: W, data: &[u8]) -> Result<W, CoreError> {
    let mut encoder = GzEncoder::new(sink, Compression::best());
    encoder
        .write_all(data)
        .map_err(|e| CoreError::Compression(format!("gzip write: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| CoreError::Compression(format!("gzip finish: {}", e)))
}

/// Decompress a gzip stream. Corrupt input is a [`CoreError::Decode`].
pub fn decompress(data: &[u8]) -> Result<Zeroizing<Vec<u8>>, CoreError> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Zeroizing::new(Vec::new());
    decoder
        .read_to_end(&mut out)
        .map_err(|e| CoreError::Decode(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let data = b"{\"fileName\":\"notes.txt\",\"fileContent\":\"aGVsbG8=\"}".repeat(8);
        let compressed = compress(&data).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(decompress(&compressed).unwrap().as_slice(), data.as_slice());
    }

    #[test]
    fn test_empty_roundtrip() {
        let compressed = compress(b"").unwrap();
        assert!(decompress(&compressed).unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_input_is_decode_error() {
        let result = decompress(&[0x00, 0x01, 0x02, 0x03]);
        assert!(matches!(result, Err(CoreError::Decode(_))));

        let mut compressed = compress(b"some payload bytes that compress").unwrap().to_vec();
        compressed.truncate(compressed.len() / 2);
        assert!(matches!(decompress(&compressed), Err(CoreError::Decode(_))));
    }

    struct FullDisk;

    impl Write for FullDisk {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "no space left"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_sink_failure_is_compression_error() {
        let err = gzip_into(FullDisk, &[0x42; 4096]).err().unwrap();
        assert!(matches!(err, CoreError::Compression(_)), "{:?}", err);
        assert!(err.to_string().starts_with("Compression failed"));
    }
}
