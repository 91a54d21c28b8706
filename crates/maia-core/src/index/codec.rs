//! Binary wire format shared by the index files.
//!
//! Both index files are little-endian with length-prefixed UTF-8 strings,
//! a 32-bit magic, and an explicit integer version. Unknown magic fails with
//! `InvalidFormat`; known magic with an unknown version fails with
//! `VersionMismatch`.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{IndexError, Result};

/// Magic for the vector index file ("MAIA").
pub const VECTOR_MAGIC: u32 = 0x4D41_4941;

/// Magic for the graph index file ("MAIG").
pub const GRAPH_MAGIC: u32 = 0x4D41_4947;

/// Current vector index format version.
pub const VECTOR_FORMAT_VERSION: u32 = 1;

/// Current graph index format version.
pub const GRAPH_FORMAT_VERSION: u16 = 1;

/// Index type tag for HNSW in the vector file header.
pub const INDEX_TYPE_HNSW: u32 = 1;

/// Index type tag for the brute-force variant.
pub const INDEX_TYPE_BRUTE_FORCE: u32 = 2;

// ============================================================================
// VECTOR FILE HEADER
// ============================================================================

/// Write the common vector-file header: magic, version, index type, dimension.
pub fn write_vector_header<W: Write>(w: &mut W, index_type: u32, dimension: usize) -> Result<()> {
    w.write_u32::<LittleEndian>(VECTOR_MAGIC)?;
    w.write_u32::<LittleEndian>(VECTOR_FORMAT_VERSION)?;
    w.write_u32::<LittleEndian>(index_type)?;
    w.write_i32::<LittleEndian>(dimension as i32)?;
    Ok(())
}

/// Read and validate the common vector-file header.
/// Returns `(index_type, dimension)`.
pub fn read_vector_header<R: Read>(r: &mut R) -> Result<(u32, usize)> {
    let magic = r.read_u32::<LittleEndian>()?;
    if magic != VECTOR_MAGIC {
        return Err(IndexError::InvalidFormat(format!(
            "bad magic {magic:#010x}, expected {VECTOR_MAGIC:#010x}"
        )));
    }
    let version = r.read_u32::<LittleEndian>()?;
    if version != VECTOR_FORMAT_VERSION {
        return Err(IndexError::VersionMismatch(version));
    }
    let index_type = r.read_u32::<LittleEndian>()?;
    let dimension = r.read_i32::<LittleEndian>()?;
    if dimension < 0 {
        return Err(IndexError::InvalidFormat(format!(
            "negative dimension {dimension}"
        )));
    }
    Ok((index_type, dimension as usize))
}

// ============================================================================
// GRAPH FILE HEADER
// ============================================================================

/// Write the graph-file header: magic, version.
pub fn write_graph_header<W: Write>(w: &mut W) -> Result<()> {
    w.write_u32::<LittleEndian>(GRAPH_MAGIC)?;
    w.write_u16::<LittleEndian>(GRAPH_FORMAT_VERSION)?;
    Ok(())
}

/// Read and validate the graph-file header.
pub fn read_graph_header<R: Read>(r: &mut R) -> Result<()> {
    let magic = r.read_u32::<LittleEndian>()?;
    if magic != GRAPH_MAGIC {
        return Err(IndexError::InvalidFormat(format!(
            "bad magic {magic:#010x}, expected {GRAPH_MAGIC:#010x}"
        )));
    }
    let version = r.read_u16::<LittleEndian>()?;
    if version != GRAPH_FORMAT_VERSION {
        return Err(IndexError::VersionMismatch(version as u32));
    }
    Ok(())
}

// ============================================================================
// STRINGS AND VECTORS
// ============================================================================

/// Write an i32-length-prefixed UTF-8 string (vector file convention).
pub fn write_string_i32<W: Write>(w: &mut W, s: &str) -> Result<()> {
    w.write_i32::<LittleEndian>(s.len() as i32)?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

/// Read an i32-length-prefixed UTF-8 string.
pub fn read_string_i32<R: Read>(r: &mut R) -> Result<String> {
    let len = r.read_i32::<LittleEndian>()?;
    if len < 0 {
        return Err(IndexError::InvalidFormat(format!(
            "negative string length {len}"
        )));
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| IndexError::InvalidFormat(format!("invalid utf-8: {e}")))
}

/// Write a u16-length-prefixed UTF-8 string (graph file convention).
pub fn write_string_u16<W: Write>(w: &mut W, s: &str) -> Result<()> {
    if s.len() > u16::MAX as usize {
        return Err(IndexError::InvalidFormat(format!(
            "string too long for u16 prefix: {} bytes",
            s.len()
        )));
    }
    w.write_u16::<LittleEndian>(s.len() as u16)?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

/// Read a u16-length-prefixed UTF-8 string.
pub fn read_string_u16<R: Read>(r: &mut R) -> Result<String> {
    let len = r.read_u16::<LittleEndian>()?;
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| IndexError::InvalidFormat(format!("invalid utf-8: {e}")))
}

/// Write an i32-length-prefixed f32 vector.
pub fn write_vector<W: Write>(w: &mut W, v: &[f32]) -> Result<()> {
    w.write_i32::<LittleEndian>(v.len() as i32)?;
    for &x in v {
        w.write_f32::<LittleEndian>(x)?;
    }
    Ok(())
}

/// Read an i32-length-prefixed f32 vector.
pub fn read_vector<R: Read>(r: &mut R) -> Result<Vec<f32>> {
    let len = r.read_i32::<LittleEndian>()?;
    if len < 0 {
        return Err(IndexError::InvalidFormat(format!(
            "negative vector length {len}"
        )));
    }
    let mut v = Vec::with_capacity(len as usize);
    for _ in 0..len {
        v.push(r.read_f32::<LittleEndian>()?);
    }
    Ok(v)
}

// ============================================================================
// TESTS
// ============================================================================
