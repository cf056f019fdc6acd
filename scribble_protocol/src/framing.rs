// Length-delimited message framing over TCP.
//
// Wire format for `message.rs` types: a 4-byte big-endian length prefix
// followed by a JSON-serialized message body. `write_message` and
// `read_message` operate on raw bytes; callers serialize separately, which
// keeps this module format-agnostic.
//
// `MAX_MESSAGE_SIZE` (1 MiB) bounds allocation from a corrupt or hostile
// length prefix. The largest expected frames are room snapshots with a full
// player list; stroke batches are a few hundred bytes.

use std::io::{self, Read, Write};

/// Maximum allowed frame body size (1 MiB).
pub const MAX_MESSAGE_SIZE: u32 = 1024 * 1024;

/// Write a length-delimited message: 4-byte big-endian length, then payload.
pub fn write_message<W: Write>(writer: &mut W, msg: &[u8]) -> io::Result<()> {
    let len = match u32::try_from(msg.len()) {
        Ok(len) if len <= MAX_MESSAGE_SIZE => len,
        _ => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("message too large: {} bytes (max {MAX_MESSAGE_SIZE})", msg.len()),
            ));
        }
    };
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(msg)?;
    writer.flush()?;
    Ok(())
}

/// Read a length-delimited message: 4-byte big-endian length, then payload.
///
/// Returns `UnexpectedEof` if the stream closes before or during a frame and
/// `InvalidData` if the length exceeds `MAX_MESSAGE_SIZE`.
pub fn read_message<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("message too large: {len} bytes (max {MAX_MESSAGE_SIZE})"),
        ));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}
