use std::io::{Cursor, Read};

use flate2::bufread::GzDecoder;

use crate::reader::ReadError;

const MAX_DEPTH: usize = 10;

/// Entry preferred when a ZIP archive holds more than one file.
const PREFERRED_ZIP_ENTRY: &str = "GFG_filtered_unphased_genotypes_23andMe.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Zip,
}

/// Identifies the outer container from its magic bytes.
pub fn detect_compression(bytes: &[u8]) -> Compression {
    if bytes.starts_with(&[0x1f, 0x8b]) {
        Compression::Gzip
    } else if bytes.starts_with(b"PK\x03\x04") {
        Compression::Zip
    } else {
        Compression::None
    }
}

/// Peels compression layers off an in-memory buffer.
pub fn decompress(mut bytes: Vec<u8>) -> Result<Vec<u8>, ReadError> {
    for _ in 0..MAX_DEPTH {
        bytes = match detect_compression(&bytes) {
            Compression::Gzip => {
                tracing::debug!("detected GZIP layer");
                gunzip_members(&bytes)?
            }
            Compression::Zip => {
                tracing::debug!("detected ZIP layer");
                unzip_entry(&bytes)?
            }
            Compression::None => break,
        };
    }
    Ok(bytes)
}

/// Decodes every concatenated gzip member. Bytes after the last member that do
/// not start another member are ignored.
fn gunzip_members(mut input: &[u8]) -> Result<Vec<u8>, ReadError> {
    let mut out = Vec::new();
    let mut members = 0usize;

    while detect_compression(input) == Compression::Gzip {
        let mut decoder = GzDecoder::new(input);
        decoder
            .read_to_end(&mut out)
            .map_err(|e| ReadError::CorruptInput {
                reason: format!("gzip member {}: {e}", members + 1),
            })?;
        input = decoder.into_inner();
        members += 1;
    }

    if !input.is_empty() {
        tracing::debug!(
            members,
            trailing_bytes = input.len(),
            "ignoring trailing bytes after gzip stream"
        );
    }
    Ok(out)
}

fn unzip_entry(bytes: &[u8]) -> Result<Vec<u8>, ReadError> {
    let corrupt = |e: zip::result::ZipError| ReadError::CorruptInput {
        reason: format!("zip archive: {e}"),
    };

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(corrupt)?;

    let preferred = archive
        .file_names()
        .position(|name| name.contains(PREFERRED_ZIP_ENTRY));
    let index = match preferred {
        Some(index) => index,
        None => (0..archive.len())
            .find(|&i| archive.by_index(i).is_ok_and(|entry| entry.is_file()))
            .ok_or_else(|| ReadError::CorruptInput {
                reason: String::from("zip archive has no file entries"),
            })?,
    };

    let mut entry = archive.by_index(index).map_err(corrupt)?;
    tracing::debug!(entry = entry.name(), "reading zip entry");
    let mut out = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
    entry
        .read_to_end(&mut out)
        .map_err(|e| ReadError::CorruptInput {
            reason: format!("zip entry: {e}"),
        })?;
    Ok(out)
}

/// Decodes text, replacing invalid UTF-8 and dropping a leading byte-order mark.
pub fn to_text(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    match text.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => text.into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{Compression as Level, write::GzEncoder};
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Level::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn plain_bytes_pass_through() {
        let data = b"rs1\t1\t100\tAA\n".to_vec();
        assert_eq!(decompress(data.clone()).unwrap(), data);
    }

    #[test]
    fn concatenated_members_are_joined() {
        let mut bytes = gzip(b"first\n");
        bytes.extend(gzip(b"second\n"));
        assert_eq!(decompress(bytes).unwrap(), b"first\nsecond\n");
    }

    #[test]
    fn trailing_garbage_is_ignored() {
        let mut bytes = gzip(b"payload\n");
        bytes.extend_from_slice(b"\0\0junk");
        assert_eq!(decompress(bytes).unwrap(), b"payload\n");
    }

    #[test]
    fn byte_order_mark_is_stripped() {
        assert_eq!(to_text("\u{feff}# header".as_bytes()), "# header");
    }
}
