use super::BodyError;
use std::io::Read;

fn inflate<R: Read>(encoding: &str, mut reader: R, limit: usize, out: &mut Vec<u8>) -> Result<(), BodyError> {
    out.clear();
    let read = reader
        .by_ref()
        .take(limit as u64 + 1)
        .read_to_end(out)
        .map_err(|e| BodyError::Decompression {
            encoding: encoding.to_string(),
            reason: e.to_string(),
        })?;
    if read > limit {
        return Err(BodyError::TooLarge { limit });
    }
    Ok(())
}

/// Undo `Content-Encoding` into `out`.
///
/// Encodings listed in the header are removed last-applied first.
/// `identity` is skipped. The decoded size is capped at `limit`. When the
/// header names no real encoding `out` receives a copy of `body`.
pub fn decode_content_encoding(
    header: &str,
    body: &[u8],
    limit: usize,
    out: &mut Vec<u8>,
) -> Result<(), BodyError> {
    let encodings: Vec<String> = header
        .split(',')
        .map(|e| e.trim().to_ascii_lowercase())
        .filter(|e| !e.is_empty() && e != "identity")
        .collect();

    out.clear();
    out.extend_from_slice(body);
    let mut scratch = Vec::new();
    for encoding in encodings.iter().rev() {
        let input = std::mem::take(out);
        match encoding.as_str() {
            "gzip" | "x-gzip" => inflate(encoding, flate2::read::MultiGzDecoder::new(input.as_slice()), limit, &mut scratch)?,
            "deflate" => inflate(encoding, flate2::read::ZlibDecoder::new(input.as_slice()), limit, &mut scratch)?,
            "br" => inflate(encoding, brotli::Decompressor::new(input.as_slice(), 4096), limit, &mut scratch)?,
            "zstd" => {
                let decoder = zstd::stream::read::Decoder::new(input.as_slice()).map_err(|e| {
                    BodyError::Decompression {
                        encoding: encoding.clone(),
                        reason: e.to_string(),
                    }
                })?;
                inflate(encoding, decoder, limit, &mut scratch)?
            }
            other => return Err(BodyError::UnsupportedEncoding(other.to_string())),
        }
        std::mem::swap(out, &mut scratch);
        scratch = input;
    }
    if out.len() > limit {
        return Err(BodyError::TooLarge { limit });
    }
    Ok(())
}
