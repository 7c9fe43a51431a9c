//! Byte-level worker protocol.
//!
//! Three messages flow over a worker's stdin/stdout pipes: the child's
//! 1-byte `R` (result ready), the parent's 1-byte `C` (clear to report),
//! and framed records: a 4-byte magic plus a u32 LE length plus payload.
//! A completed worker ships a `Done` record (the encoded diagnostic set),
//! a `Grph` record (the encoded inclusion graph) and one auto-include
//! flag byte.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const READY: u8 = b'R';
pub const CLEAR: u8 = b'C';

pub const DONE_MAGIC: &[u8; 4] = b"Done";
pub const GRAPH_MAGIC: &[u8; 4] = b"Grph";

/// Upper bound on a record payload; anything bigger is a corrupt stream.
const MAX_RECORD_LEN: u32 = 256 * 1024 * 1024;

pub async fn write_record<W: AsyncWrite + Unpin>(
    writer: &mut W,
    magic: &[u8; 4],
    payload: &[u8],
) -> io::Result<()> {
    writer.write_all(magic).await?;
    writer.write_all(&(payload.len() as u32).to_le_bytes()).await?;
    writer.write_all(payload).await?;
    Ok(())
}

pub async fn read_record<R: AsyncRead + Unpin>(
    reader: &mut R,
    magic: &[u8; 4],
) -> io::Result<Vec<u8>> {
    let mut header = [0u8; 8];
    reader.read_exact(&mut header).await?;
    if &header[..4] != magic {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "bad record magic: expected {:?}, got {:?}",
                magic,
                &header[..4]
            ),
        ));
    }
    let len = u32::from_le_bytes(header[4..].try_into().expect("4-byte slice"));
    if len > MAX_RECORD_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("record length {len} exceeds limit"),
        ));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

pub async fn write_byte<W: AsyncWrite + Unpin>(writer: &mut W, byte: u8) -> io::Result<()> {
    writer.write_all(&[byte]).await
}

pub async fn read_byte<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf).await?;
    Ok(buf[0])
}
