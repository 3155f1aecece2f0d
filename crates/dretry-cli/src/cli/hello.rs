//! Greeter `HelloRequest { string name = 1; }` / `HelloReply { string message = 1; }`
//! encoding, enough for `dretry call --name`.

use anyhow::{bail, Context, Result};

const WIRE_VARINT: u64 = 0;
const WIRE_I64: u64 = 1;
const WIRE_LEN: u64 = 2;
const WIRE_I32: u64 = 5;

pub fn encode_request(name: &str) -> Vec<u8> {
    let mut out = Vec::new();
    if name.is_empty() {
        return out;
    }
    put_varint(&mut out, (1 << 3) | WIRE_LEN);
    put_varint(&mut out, name.len() as u64);
    out.extend_from_slice(name.as_bytes());
    out
}

/// Extract `message` (field 1) from a HelloReply; unknown fields are skipped.
pub fn decode_reply(mut buf: &[u8]) -> Result<String> {
    let mut message = String::new();
    while !buf.is_empty() {
        let tag = take_varint(&mut buf)?;
        let (field, wire) = (tag >> 3, tag & 7);
        match wire {
            WIRE_VARINT => {
                take_varint(&mut buf)?;
            }
            WIRE_I64 => {
                take(&mut buf, 8)?;
            }
            WIRE_I32 => {
                take(&mut buf, 4)?;
            }
            WIRE_LEN => {
                let len = usize::try_from(take_varint(&mut buf)?).context("field too long")?;
                let bytes = take(&mut buf, len)?;
                if field == 1 {
                    message = String::from_utf8(bytes.to_vec()).context("reply message is not UTF-8")?;
                }
            }
            other => bail!("unsupported wire type {} in reply", other),
        }
    }
    Ok(message)
}

fn put_varint(out: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        out.push((v as u8) | 0x80);
        v >>= 7;
    }
    out.push(v as u8);
}

fn take_varint(buf: &mut &[u8]) -> Result<u64> {
    let mut value = 0u64;
    for shift in (0..64).step_by(7) {
        let current: &[u8] = *buf;
        let (&byte, rest) = current.split_first().context("truncated varint")?;
        *buf = rest;
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    bail!("varint too long")
}

fn take<'a>(buf: &mut &'a [u8], n: usize) -> Result<&'a [u8]> {
    if buf.len() < n {
        bail!("truncated field: need {} bytes, have {}", n, buf.len());
    }
    let current: &'a [u8] = *buf;
    let (head, rest) = current.split_at(n);
    *buf = rest;
    Ok(head)
}
