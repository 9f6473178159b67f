//! Minimal length-prefixed JSON framing shared by both engines' TCP
//! listeners and callers.
//!
//! Per spec.md §1, the wire framing itself is non-normative ("a
//! request/response transport is assumed; only message semantics are
//! normative"). We pick the simplest concrete framing that lets the rest of
//! the crate be exercised end to end: a 4-byte big-endian length prefix
//! followed by a JSON body.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{self, Read, Write};

const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

pub fn write_frame<W: Write, T: Serialize>(w: &mut W, value: &T) -> io::Result<()> {
    let body = serde_json::to_vec(value).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if body.len() as u64 > MAX_FRAME_LEN as u64 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "frame too large"));
    }
    w.write_all(&(body.len() as u32).to_be_bytes())?;
    w.write_all(&body)?;
    w.flush()
}

pub fn read_frame<R: Read, T: DeserializeOwned>(r: &mut R) -> io::Result<T> {
    let mut len_bytes = [0u8; 4];
    r.read_exact(&mut len_bytes)?;
    let len = u32::from_be_bytes(len_bytes);
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "frame too large"));
    }
    let mut body = vec![0u8; len as usize];
    r.read_exact(&mut body)?;
    serde_json::from_slice(&body).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Cursor;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Ping {
        n: u32,
    }

    #[test]
    fn round_trips_a_frame() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &Ping { n: 7 }).unwrap();
        let mut cursor = Cursor::new(buf);
        let decoded: Ping = read_frame(&mut cursor).unwrap();
        assert_eq!(decoded, Ping { n: 7 });
    }
}
