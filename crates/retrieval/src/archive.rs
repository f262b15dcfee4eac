//! Decoding fetched archives onto an output sink.

use crate::error::{RetrievalError, RetrievalResult};
use crate::fetch::FetchedArchive;
use bytes::Bytes;
use std::io::{Cursor, Read};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use zip::ZipArchive;
use zip::result::ZipError;

/// Bytes decompressed per read.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Chunks decoded ahead of the sink.
const CHUNKS_IN_FLIGHT: usize = 4;

/// What one archive contributed to the output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamedArchive {
    pub entries: usize,
    pub bytes_written: u64,
}

enum Decoded {
    EntryStart(String),
    Chunk(Bytes),
    EntryDone,
}

enum DecodeError {
    Corrupt(ZipError),
    Entry { entry: String, source: std::io::Error },
}

/// Write every entry of `archive`, decompressed, to `sink` in directory order.
///
/// Entries are decompressed on a blocking thread in chunks of [`CHUNK_SIZE`],
/// at most a few chunks ahead of the sink, so memory stays bounded however
/// large an entry inflates. A failure aborts at the failing entry; bytes
/// already written stay written.
pub async fn stream_archive<W>(
    archive: &FetchedArchive,
    sink: &mut W,
) -> RetrievalResult<StreamedArchive>
where
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    let key = archive.key.as_str();
    let data = archive.data.clone();
    let (tx, mut rx) = mpsc::channel(CHUNKS_IN_FLIGHT);
    let decoder = tokio::task::spawn_blocking(move || decode_entries(data, &tx));

    let mut entry = String::new();
    let mut streamed = StreamedArchive::default();
    while let Some(decoded) = rx.recv().await {
        match decoded {
            Decoded::EntryStart(name) => entry = name,
            Decoded::Chunk(data) => {
                // Returning drops `rx`, which stops the decoder at its next send.
                sink.write_all(&data)
                    .await
                    .map_err(|source| RetrievalError::CopyFailed {
                        key: key.to_string(),
                        entry: entry.clone(),
                        source,
                    })?;
                streamed.bytes_written += data.len() as u64;
            }
            Decoded::EntryDone => {
                streamed.entries += 1;
                tracing::trace!(key, entry = %entry, "copied entry");
            }
        }
    }

    let outcome = decoder
        .await
        .map_err(|e| RetrievalError::EntryReadFailed {
            key: key.to_string(),
            entry: entry.clone(),
            source: std::io::Error::other(e),
        })?;
    match outcome {
        Ok(()) => Ok(streamed),
        Err(DecodeError::Corrupt(source)) => Err(RetrievalError::ArchiveCorrupt {
            key: key.to_string(),
            source,
        }),
        Err(DecodeError::Entry { entry, source }) => Err(RetrievalError::EntryReadFailed {
            key: key.to_string(),
            entry,
            source,
        }),
    }
}

/// Runs on a blocking thread. Each entry handle is dropped before the next
/// entry is opened. Returns early, without error, once the receiver is gone.
fn decode_entries(data: Bytes, tx: &mpsc::Sender<Decoded>) -> Result<(), DecodeError> {
    let mut zip = ZipArchive::new(Cursor::new(data)).map_err(DecodeError::Corrupt)?;
    let mut buf = vec![0u8; CHUNK_SIZE];

    for index in 0..zip.len() {
        let mut file = zip.by_index(index).map_err(|e| DecodeError::Entry {
            entry: format!("#{index}"),
            source: std::io::Error::other(e),
        })?;
        let name = file.name().to_string();
        if tx.blocking_send(Decoded::EntryStart(name.clone())).is_err() {
            return Ok(());
        }

        loop {
            let n = file.read(&mut buf).map_err(|source| DecodeError::Entry {
                entry: name.clone(),
                source,
            })?;
            if n == 0 {
                break;
            }
            if tx
                .blocking_send(Decoded::Chunk(Bytes::copy_from_slice(&buf[..n])))
                .is_err()
            {
                return Ok(());
            }
        }

        if tx.blocking_send(Decoded::EntryDone).is_err() {
            return Ok(());
        }
    }
    Ok(())
}
