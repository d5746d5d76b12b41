//! Header encodings for the unit format.
//!
//! - [`Tag4`]: one byte `[flag:4][large:1][size:3]`; sizes of 8 or more
//!   spill into `small + 1` trailing little-endian bytes.
//! - [`put_uint`]/[`get_uint`]: a flagless variant, `[large:1][size:7]`.

use super::error::SerializeError;

/// Bytes needed for `x` in trimmed little-endian form.
fn byte_count(x: u64) -> u8 {
  (8 - x.leading_zeros() / 8) as u8
}

fn put_trimmed_le(x: u64, buf: &mut Vec<u8>) {
  let n = byte_count(x) as usize;
  buf.extend_from_slice(&x.to_le_bytes()[..n]);
}

fn get_trimmed_le(len: usize, buf: &mut &[u8]) -> Result<u64, SerializeError> {
  if len > 8 {
    return Err(SerializeError::Malformed { context: "integer wider than 8 bytes" });
  }
  let (head, rest) = buf
    .split_at_checked(len)
    .ok_or(SerializeError::UnexpectedEof { expected: "integer bytes" })?;
  let mut bytes = [0u8; 8];
  bytes[..len].copy_from_slice(head);
  *buf = rest;
  Ok(u64::from_le_bytes(bytes))
}

pub fn get_u8(buf: &mut &[u8], expected: &'static str) -> Result<u8, SerializeError> {
  match buf.split_first() {
    Some((&x, rest)) => {
      *buf = rest;
      Ok(x)
    },
    None => Err(SerializeError::UnexpectedEof { expected }),
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tag4 {
  pub flag: u8,
  pub size: u64,
}

impl Tag4 {
  pub fn new(flag: u8, size: u64) -> Self {
    debug_assert!(flag < 16, "Tag4 flag must be < 16");
    Tag4 { flag, size }
  }

  pub fn put(&self, buf: &mut Vec<u8>) {
    if self.size < 8 {
      buf.push((self.flag << 4) | self.size as u8);
    } else {
      buf.push((self.flag << 4) | 0b1000 | (byte_count(self.size) - 1));
      put_trimmed_le(self.size, buf);
    }
  }

  pub fn get(buf: &mut &[u8]) -> Result<Self, SerializeError> {
    let head = get_u8(buf, "tag")?;
    let flag = head >> 4;
    let small = head & 0b0111;
    let size = if head & 0b1000 != 0 {
      get_trimmed_le(small as usize + 1, buf)?
    } else {
      u64::from(small)
    };
    Ok(Tag4 { flag, size })
  }
}

pub fn put_uint(x: u64, buf: &mut Vec<u8>) {
  if x < 128 {
    buf.push(x as u8);
  } else {
    buf.push(0b1000_0000 | (byte_count(x) - 1));
    put_trimmed_le(x, buf);
  }
}

pub fn get_uint(buf: &mut &[u8]) -> Result<u64, SerializeError> {
  let head = get_u8(buf, "integer")?;
  if head & 0b1000_0000 != 0 {
    get_trimmed_le((head & 0b0111_1111) as usize + 1, buf)
  } else {
    Ok(u64::from(head))
  }
}
