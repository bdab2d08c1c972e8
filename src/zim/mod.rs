//! Core ZIM archive reader module.
//!
//! Parses the ZIM binary format: header, content-type list, URL and
//! cluster pointer tables, directory entries, and compressed clusters.
//! Read-only and thread-safe.

mod cache;
mod compression;
pub mod error;
mod header;
mod models;

pub use error::{Result, ZimError};
pub use models::{namespace, DirectoryEntry, EntryKind, ZimHeader};

use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Mutex;

use byteorder::{LittleEndian, ReadBytesExt};
use log::info;

use cache::{ClusterCache, DEFAULT_CACHE_CAPACITY, LOW_MEMORY_CACHE_CAPACITY};

/// Content-type value marking a directory entry as a redirect.
const REDIRECT_SENTINEL: u16 = 0xFFFF;

/// Maximum archive-internal redirect hops before the chain is declared a loop.
pub const MAX_REDIRECT_DEPTH: u32 = 16;

/// The main reader for ZIM archive files.
///
/// Opens one archive, loads its structural tables eagerly, and serves
/// directory lookups and blob reads against it. The file handle is
/// serialized behind a mutex; the pointer tables are immutable after
/// construction; the cluster cache carries its own lock. The reader is
/// therefore `Send + Sync` and can be shared across threads.
///
/// The file is closed when the reader is dropped.
#[derive(Debug)]
pub struct ZimReader {
    file: Mutex<File>,
    header: ZimHeader,
    mime_types: Vec<String>,
    url_ptrs: Vec<u64>,
    cluster_ptrs: Vec<u64>,
    cluster_cache: ClusterCache,
    low_memory: bool,
}

impl ZimReader {
    /// Opens a ZIM archive and parses its header and pointer tables.
    ///
    /// `low_memory` shrinks the decompressed-cluster cache (10 clusters
    /// instead of 50) and biases decoders toward a minimal working set.
    ///
    /// # Errors
    /// Returns [`ZimError::InvalidArchive`] when the magic number does not
    /// match, or [`ZimError::Io`] on any underlying read failure.
    pub fn open(path: impl AsRef<Path>, low_memory: bool) -> Result<Self> {
        let path = path.as_ref();
        info!(
            "Opening ZIM file: {} (low memory mode: {})",
            path.display(),
            low_memory
        );
        let mut file = File::open(path)?;

        let header = header::parse(&mut file)?;
        let mime_types = header::read_mime_types(&mut file, header.mime_list_pos)?;
        let url_ptrs = header::read_pointers(&mut file, header.url_ptr_pos, header.entry_count)?;
        let cluster_ptrs =
            header::read_pointers(&mut file, header.cluster_ptr_pos, header.cluster_count)?;

        let cache_capacity = if low_memory {
            LOW_MEMORY_CACHE_CAPACITY
        } else {
            DEFAULT_CACHE_CAPACITY
        };

        info!(
            "ZIM file loaded: {} entries, {} clusters, {} content types",
            header.entry_count,
            header.cluster_count,
            mime_types.len()
        );

        Ok(Self {
            file: Mutex::new(file),
            header,
            mime_types,
            url_ptrs,
            cluster_ptrs,
            cluster_cache: ClusterCache::new(cache_capacity),
            low_memory,
        })
    }

    /// The parsed archive header.
    pub fn header(&self) -> &ZimHeader {
        &self.header
    }

    /// Number of directory entries (articles, resources, and redirects).
    pub fn entry_count(&self) -> u32 {
        self.header.entry_count
    }

    /// Number of clusters in the archive.
    pub fn cluster_count(&self) -> u32 {
        self.header.cluster_count
    }

    /// Directory index of the archive's designated main page.
    pub fn main_page_index(&self) -> u32 {
        self.header.main_page
    }

    /// Directory index of the archive's layout page.
    pub fn layout_page_index(&self) -> u32 {
        self.header.layout_page
    }

    /// The archive's 16-byte UUID.
    pub fn uuid(&self) -> &[u8; 16] {
        &self.header.uuid
    }

    /// `(major, minor)` format version from the header.
    pub fn version(&self) -> (u16, u16) {
        (self.header.major_version, self.header.minor_version)
    }

    /// The content-type string for a directory entry's `mime_type` field.
    pub fn mime_type(&self, idx: u16) -> Option<&str> {
        self.mime_types.get(idx as usize).map(String::as_str)
    }

    /// Reads the directory entry at the given index.
    ///
    /// This is a cheap random seek; no caching happens at this layer.
    ///
    /// # Errors
    /// [`ZimError::OutOfRange`] when `index >= entry_count`.
    pub fn lookup_entry(&self, index: u32) -> Result<DirectoryEntry> {
        if index >= self.header.entry_count {
            return Err(ZimError::OutOfRange {
                kind: "entry",
                index,
                max: self.header.entry_count.saturating_sub(1),
            });
        }
        let ptr = self.url_ptrs[index as usize];

        let mut file = self.file.lock().map_err(|_| ZimError::LockPoisoned)?;
        file.seek(SeekFrom::Start(ptr))?;
        // Buffered parse is safe here: every file access seeks to an
        // absolute position first, so over-reading cannot desync anything.
        parse_entry(&mut BufReader::new(&mut *file))
    }

    /// Finds a directory entry by `(namespace, url)` via binary search.
    ///
    /// Entries are sorted by namespace byte, then by URL bytes, so each
    /// probe costs one directory read: `O(log n)` seeks per lookup.
    ///
    /// # Errors
    /// [`ZimError::NotFound`] when no entry matches exactly.
    pub fn find_entry(&self, namespace: u8, url: &str) -> Result<u32> {
        let mut left = 0u32;
        let mut right = self.header.entry_count;

        while left < right {
            let mid = left + (right - left) / 2;
            let entry = self.lookup_entry(mid)?;
            match (entry.namespace, entry.url.as_bytes()).cmp(&(namespace, url.as_bytes())) {
                Ordering::Equal => return Ok(mid),
                Ordering::Less => left = mid + 1,
                Ordering::Greater => right = mid,
            }
        }

        Err(ZimError::NotFound {
            namespace: namespace as char,
            url: url.to_string(),
        })
    }

    /// Reads one blob out of a cluster, decompressing and caching the
    /// cluster on a miss.
    ///
    /// # Errors
    /// [`ZimError::OutOfRange`] for a bad cluster or blob index,
    /// [`ZimError::UnsupportedCompression`] / [`ZimError::DecompressionFailed`]
    /// for cluster codec problems, and [`ZimError::InvalidArchive`] for an
    /// inconsistent blob offset table.
    pub fn read_blob(&self, cluster: u32, blob: u32) -> Result<Vec<u8>> {
        if cluster >= self.header.cluster_count {
            return Err(ZimError::OutOfRange {
                kind: "cluster",
                index: cluster,
                max: self.header.cluster_count.saturating_sub(1),
            });
        }

        if let Some(data) = self.cluster_cache.get(cluster) {
            return extract_blob(&data, cluster, blob);
        }

        let (start, end) = self.cluster_extent(cluster)?;
        let payload_len = (end - start - 1) as usize;

        // Seek and read under the file lock; decompress after releasing it.
        let (tag, compressed) = {
            let mut file = self.file.lock().map_err(|_| ZimError::LockPoisoned)?;
            file.seek(SeekFrom::Start(start))?;
            let mut info = [0u8; 1];
            file.read_exact(&mut info)?;
            let mut compressed = vec![0u8; payload_len];
            file.read_exact(&mut compressed)?;
            (info[0] & 0x0F, compressed)
        };

        let data = compression::decompress_cluster(tag, &compressed, self.low_memory)?;
        let data = self.cluster_cache.insert(cluster, data);
        extract_blob(&data, cluster, blob)
    }

    /// Retrieves an entry's content bytes and content-type string,
    /// transparently following archive-internal redirects.
    ///
    /// The content-type falls back to an empty string when the entry's
    /// index points outside the archive's content-type list.
    ///
    /// # Errors
    /// [`ZimError::RedirectLoop`] when the chain exceeds
    /// [`MAX_REDIRECT_DEPTH`] hops, plus anything [`Self::lookup_entry`]
    /// and [`Self::read_blob`] can fail with.
    pub fn read_content(&self, index: u32) -> Result<(Vec<u8>, String)> {
        let mut entry = self.lookup_entry(index)?;

        let mut depth = 0;
        let (cluster, blob) = loop {
            match entry.kind {
                EntryKind::Content { cluster, blob } => break (cluster, blob),
                EntryKind::Redirect { target } => {
                    depth += 1;
                    if depth > MAX_REDIRECT_DEPTH {
                        return Err(ZimError::RedirectLoop(MAX_REDIRECT_DEPTH));
                    }
                    entry = self.lookup_entry(target)?;
                }
            }
        };

        let content = self.read_blob(cluster, blob)?;
        let mime_type = self.mime_type(entry.mime_type).unwrap_or("").to_string();
        Ok((content, mime_type))
    }

    // On-disk extent of a cluster. The last cluster ends at checksum_pos.
    fn cluster_extent(&self, cluster: u32) -> Result<(u64, u64)> {
        let start = self.cluster_ptrs[cluster as usize];
        let end = if cluster + 1 < self.header.cluster_count {
            self.cluster_ptrs[cluster as usize + 1]
        } else {
            self.header.checksum_pos
        };
        if end <= start {
            return Err(ZimError::InvalidArchive(format!(
                "cluster {cluster} has non-positive extent ({start}..{end})"
            )));
        }
        Ok((start, end))
    }
}

// Parses one directory entry at the reader's current position.
//
// Layout: u16 content type | u8 param_len | u8 namespace | u32 revision,
// then u32 redirect target (content type 0xFFFF) or u32 cluster + u32
// blob, then param_len bytes of parameter data, then two null-terminated
// strings (url, title).
fn parse_entry(r: &mut impl Read) -> Result<DirectoryEntry> {
    let mime_type = r.read_u16::<LittleEndian>()?;
    let param_len = r.read_u8()?;
    let namespace = r.read_u8()?;
    let revision = r.read_u32::<LittleEndian>()?;

    let kind = if mime_type == REDIRECT_SENTINEL {
        EntryKind::Redirect {
            target: r.read_u32::<LittleEndian>()?,
        }
    } else {
        EntryKind::Content {
            cluster: r.read_u32::<LittleEndian>()?,
            blob: r.read_u32::<LittleEndian>()?,
        }
    };

    // Parameter data sits between the fixed prefix and the URL and must be
    // skipped even though nothing downstream consumes it.
    if param_len > 0 {
        let mut params = vec![0u8; param_len as usize];
        r.read_exact(&mut params)?;
    }

    let url = String::from_utf8_lossy(&header::read_cstring(r)?).into_owned();
    let mut title = String::from_utf8_lossy(&header::read_cstring(r)?).into_owned();
    if title.is_empty() {
        title = url.clone();
    }

    Ok(DirectoryEntry {
        mime_type,
        namespace,
        revision,
        kind,
        url,
        title,
    })
}

// Slices one blob out of decompressed cluster bytes.
//
// The cluster begins with a table of little-endian u32 offsets. The first
// offset doubles as the table size (n = first / 4); the cluster length
// serves as the final boundary.
fn extract_blob(data: &[u8], cluster: u32, blob: u32) -> Result<Vec<u8>> {
    if data.len() < 4 {
        return Err(ZimError::InvalidArchive(format!(
            "cluster {cluster} too small to hold a blob offset table"
        )));
    }

    let first = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    let blob_count = first / 4;
    if first % 4 != 0 || blob_count == 0 || first as usize > data.len() {
        return Err(ZimError::InvalidArchive(format!(
            "cluster {cluster} has an inconsistent blob offset table (first offset {first})"
        )));
    }
    if blob >= blob_count {
        return Err(ZimError::OutOfRange {
            kind: "blob",
            index: blob,
            max: blob_count - 1,
        });
    }

    let offset_at = |i: u32| -> u32 {
        if i == blob_count {
            data.len() as u32
        } else {
            let at = i as usize * 4;
            u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
        }
    };

    let start = offset_at(blob) as usize;
    let end = offset_at(blob + 1) as usize;
    if start > end || end > data.len() {
        return Err(ZimError::InvalidArchive(format!(
            "blob {blob} of cluster {cluster} has offsets {start}..{end} outside {} bytes",
            data.len()
        )));
    }

    Ok(data[start..end].to_vec())
}
