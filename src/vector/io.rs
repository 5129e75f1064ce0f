//! Binary artifact format for a [`FlatIndex`].
//!
//! Layout, all little-endian:
//!
//! ```text
//! magic     4 bytes  "PXDX"
//! version   u32
//! dimension u32
//! count     u64
//! ids       i64 * count
//! vectors   f32 * count * dimension
//! checksum  u32      CRC32 of every preceding byte
//! ```

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{PixdexError, Result};
use crate::vector::flat::FlatIndex;

/// Leading bytes of every index artifact.
pub const MAGIC: &[u8; 4] = b"PXDX";

/// Current artifact format version.
pub const FORMAT_VERSION: u32 = 1;

const HEADER_LEN: usize = 4 + 4 + 4 + 8;
const TRAILER_LEN: usize = 4;

/// Encode an index into its artifact bytes.
pub fn to_bytes(index: &FlatIndex) -> Result<Vec<u8>> {
    let dimension = u32::try_from(index.dimension()).map_err(|_| {
        PixdexError::invalid_argument(format!("dimension {} too large", index.dimension()))
    })?;
    let capacity = HEADER_LEN + index.len() * 8 + index.data().len() * 4 + TRAILER_LEN;

    let mut buffer = Vec::with_capacity(capacity);
    buffer.extend_from_slice(MAGIC);
    buffer.write_u32::<LittleEndian>(FORMAT_VERSION)?;
    buffer.write_u32::<LittleEndian>(dimension)?;
    buffer.write_u64::<LittleEndian>(index.len() as u64)?;
    for &id in index.ids() {
        buffer.write_i64::<LittleEndian>(id)?;
    }
    for &value in index.data() {
        buffer.write_f32::<LittleEndian>(value)?;
    }

    let checksum = crc32fast::hash(&buffer);
    buffer.write_u32::<LittleEndian>(checksum)?;
    Ok(buffer)
}

/// Decode artifact bytes. Any structural problem is reported as
/// [`PixdexError::Corrupted`].
pub fn from_bytes(bytes: &[u8]) -> Result<FlatIndex> {
    if bytes.len() < HEADER_LEN + TRAILER_LEN {
        return Err(PixdexError::corrupted(format!(
            "artifact is {} bytes, shorter than the header",
            bytes.len()
        )));
    }

    let (body, trailer) = bytes.split_at(bytes.len() - TRAILER_LEN);
    let stored = Cursor::new(trailer).read_u32::<LittleEndian>()?;
    let computed = crc32fast::hash(body);
    if stored != computed {
        return Err(PixdexError::corrupted(format!(
            "checksum mismatch: stored {stored:#010x}, computed {computed:#010x}"
        )));
    }

    let mut reader = Cursor::new(body);
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(PixdexError::corrupted("bad magic"));
    }

    let version = reader.read_u32::<LittleEndian>()?;
    if version != FORMAT_VERSION {
        return Err(PixdexError::corrupted(format!(
            "unsupported format version {version}"
        )));
    }

    let dimension = reader.read_u32::<LittleEndian>()? as usize;
    let count = usize::try_from(reader.read_u64::<LittleEndian>()?)
        .map_err(|_| PixdexError::corrupted("vector count overflows"))?;

    let expected = count
        .checked_mul(dimension)
        .and_then(|values| values.checked_mul(4))
        .and_then(|data| count.checked_mul(8).and_then(|ids| ids.checked_add(data)))
        .and_then(|payload| payload.checked_add(HEADER_LEN));
    if expected != Some(body.len()) {
        return Err(PixdexError::corrupted(format!(
            "{count} vectors of dimension {dimension} do not fit {} bytes",
            body.len()
        )));
    }

    let mut ids = Vec::with_capacity(count);
    for _ in 0..count {
        ids.push(reader.read_i64::<LittleEndian>()?);
    }
    let mut data = vec![0f32; count * dimension];
    reader.read_f32_into::<LittleEndian>(&mut data)?;

    FlatIndex::from_parts(dimension, ids, data)
}
