//! Parsing for the ZIM header and its derived tables.
//!
//! The header is a fixed 80-byte little-endian block. It is followed (at
//! positions it declares) by the MIME type list and two pointer arrays:
//! one `u64` per directory entry and one `u64` per cluster.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};
use log::debug;

use super::error::{Result, ZimError};
use super::models::ZimHeader;

/// ZIM magic number, little-endian.
pub const ZIM_MAGIC: u32 = 0x044D_495A;

/// Reads and validates the header at the start of the file.
pub fn parse(file: &mut File) -> Result<ZimHeader> {
    file.seek(SeekFrom::Start(0))?;
    let mut r = BufReader::new(&mut *file);

    let magic = r.read_u32::<LittleEndian>()?;
    if magic != ZIM_MAGIC {
        return Err(ZimError::InvalidArchive(format!(
            "magic number mismatch: expected {ZIM_MAGIC:#010x}, got {magic:#010x}"
        )));
    }

    let major_version = r.read_u16::<LittleEndian>()?;
    let minor_version = r.read_u16::<LittleEndian>()?;
    let mut uuid = [0u8; 16];
    r.read_exact(&mut uuid)?;

    let header = ZimHeader {
        major_version,
        minor_version,
        uuid,
        entry_count: r.read_u32::<LittleEndian>()?,
        cluster_count: r.read_u32::<LittleEndian>()?,
        url_ptr_pos: r.read_u64::<LittleEndian>()?,
        title_ptr_pos: r.read_u64::<LittleEndian>()?,
        cluster_ptr_pos: r.read_u64::<LittleEndian>()?,
        mime_list_pos: r.read_u64::<LittleEndian>()?,
        main_page: r.read_u32::<LittleEndian>()?,
        layout_page: r.read_u32::<LittleEndian>()?,
        checksum_pos: r.read_u64::<LittleEndian>()?,
    };

    debug!(
        "ZIM header v{}.{}: {} entries, {} clusters",
        header.major_version, header.minor_version, header.entry_count, header.cluster_count
    );
    Ok(header)
}

/// Reads the content-type list: null-terminated strings, terminated by an
/// empty string.
pub fn read_mime_types(file: &mut File, mime_list_pos: u64) -> Result<Vec<String>> {
    file.seek(SeekFrom::Start(mime_list_pos))?;
    let mut r = BufReader::new(&mut *file);

    let mut mime_types = Vec::new();
    loop {
        let bytes = read_cstring(&mut r)?;
        if bytes.is_empty() {
            break;
        }
        mime_types.push(String::from_utf8_lossy(&bytes).into_owned());
    }
    Ok(mime_types)
}

/// Reads `count` little-endian `u64` pointers starting at `pos`.
pub fn read_pointers(file: &mut File, pos: u64, count: u32) -> Result<Vec<u64>> {
    file.seek(SeekFrom::Start(pos))?;
    let mut r = BufReader::new(&mut *file);

    let mut ptrs = Vec::with_capacity(count as usize);
    for _ in 0..count {
        ptrs.push(r.read_u64::<LittleEndian>()?);
    }
    Ok(ptrs)
}

/// Reads bytes up to (and consuming) the next null terminator.
pub fn read_cstring(r: &mut impl Read) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let mut buf = [0u8; 1];
    loop {
        r.read_exact(&mut buf)?;
        if buf[0] == 0 {
            return Ok(bytes);
        }
        bytes.push(buf[0]);
    }
}
