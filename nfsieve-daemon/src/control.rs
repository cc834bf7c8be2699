//! Control channel input.
//!
//! `tokio::io::stdin()` reads on the runtime's blocking pool, and runtime
//! shutdown waits for an in-flight read to return. With a controller that
//! keeps stdin open and idle, a shutdown signal would leave the process
//! hanging until the next line arrives. The reader here runs on a detached
//! OS thread instead and forwards bytes into an in-memory pipe, so the
//! runtime can exit while that thread is still blocked.

use std::io::{self, Read};
use std::thread;

use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::runtime::Handle;

/// In-memory pipe capacity between the reader thread and the distributor.
const PIPE_CAPACITY: usize = 64 * 1024;

/// Bytes requested from the source per read.
const READ_CHUNK: usize = 8 * 1024;

/// Forward `source` into an in-memory pipe from a detached reader thread.
///
/// The returned stream reaches EOF when `source` does or when a read fails.
/// The thread exits after the stream is dropped and its next read returns.
///
/// # Errors
///
/// Returns an error if the reader thread cannot be spawned.
pub fn spawn_reader_pipe<S>(source: S, handle: Handle) -> io::Result<DuplexStream>
where
    S: Read + Send + 'static,
{
    let (reader, mut writer) = tokio::io::duplex(PIPE_CAPACITY);
    thread::Builder::new()
        .name("nfsieve-control".to_owned())
        .spawn(move || forward(source, &mut writer, &handle))?;
    Ok(reader)
}

fn forward<S: Read>(mut source: S, writer: &mut DuplexStream, handle: &Handle) {
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = match source.read(&mut chunk) {
            Ok(0) => {
                tracing::debug!("control input reached end of stream");
                return;
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                // dropping the writer turns this into EOF for the distributor
                tracing::error!(error = %e, "failed to read control input");
                return;
            }
        };

        if handle.block_on(writer.write_all(&chunk[..n])).is_err() {
            tracing::debug!("control pipe closed, reader thread exiting");
            return;
        }
    }
}
