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

/// A deflated zip holding the given entries in order.
#[allow(dead_code)]
pub fn zip_archive(entries: &[(&str, &str)]) -> Bytes {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, contents) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }
    Bytes::from(writer.finish().unwrap().into_inner())
}

/// Two-entry archive whose decoded text identifies archive `n`.
#[allow(dead_code)]
pub fn archive_text(n: usize) -> (Bytes, String) {
    let first = format!("archive {n} part a\n");
    let second = format!("archive {n} part b\n");
    let data = zip_archive(&[("a.log", first.as_str()), ("b.log", second.as_str())]);
    (data, format!("{first}{second}"))
}
