//! Archive fixtures.

use bytes::Bytes;
use logvault_core::KeyParser;
use std::io::{Cursor, Write};
use time::OffsetDateTime;
use zip::write::SimpleFileOptions;

/// Object key of the archive written for `prefix` at `ts`.
#[allow(dead_code)]
pub fn archive_key(prefix: &str, ts: OffsetDateTime) -> String {
    KeyParser::default().object_key(prefix, ts)
}

/// A deflated zip holding one entry with `contents`.
#[allow(dead_code)]
pub fn single_entry_zip(name: &str, contents: &str) -> Bytes {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    writer.start_file(name, options).unwrap();
    writer.write_all(contents.as_bytes()).unwrap();
    Bytes::from(writer.finish().unwrap().into_inner())
}
