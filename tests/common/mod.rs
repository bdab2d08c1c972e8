//! Synthetic ZIM archive construction for tests.
//!
//! Packs a small set of directory entries into a structurally valid ZIM
//! file: header, content-type list, sorted directory, URL and cluster
//! pointer tables, and compressed clusters with blob offset tables.

#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

const ZIM_MAGIC: u32 = 0x044D_495A;
const REDIRECT_SENTINEL: u16 = 0xFFFF;

/// Cluster compression used by the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Deflate,
    Xz,
    Zstd,
    /// zstd payload stored under the XZ tag, as mislabeled archives do.
    ZstdUnderXzTag,
}

impl Compression {
    fn tag(self) -> u8 {
        match self {
            Compression::None => 1,
            Compression::Deflate => 4,
            Compression::Xz | Compression::ZstdUnderXzTag => 5,
            Compression::Zstd => 6,
        }
    }

    fn compress(self, data: &[u8]) -> Vec<u8> {
        match self {
            Compression::None => data.to_vec(),
            Compression::Deflate => {
                let mut encoder = flate2::write::DeflateEncoder::new(
                    Vec::new(),
                    flate2::Compression::default(),
                );
                encoder.write_all(data).unwrap();
                encoder.finish().unwrap()
            }
            Compression::Xz => {
                let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
                encoder.write_all(data).unwrap();
                encoder.finish().unwrap()
            }
            Compression::Zstd | Compression::ZstdUnderXzTag => {
                zstd::encode_all(data, 3).unwrap()
            }
        }
    }
}

enum Payload {
    Content(Vec<u8>),
    Redirect { namespace: u8, url: String },
}

struct EntrySpec {
    namespace: u8,
    url: String,
    title: String,
    mime: u16,
    param: Vec<u8>,
    payload: Payload,
}

/// Builds ZIM archive bytes from a declarative entry list.
pub struct ArchiveBuilder {
    mime_types: Vec<String>,
    entries: Vec<EntrySpec>,
    compression: Compression,
    blobs_per_cluster: usize,
    main_page: u32,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self {
            mime_types: Vec::new(),
            entries: Vec::new(),
            compression: Compression::Zstd,
            blobs_per_cluster: usize::MAX,
            main_page: 0,
        }
    }

    /// Registers a content type and returns its index.
    pub fn mime(&mut self, mime_type: &str) -> u16 {
        self.mime_types.push(mime_type.to_string());
        (self.mime_types.len() - 1) as u16
    }

    pub fn compression(&mut self, compression: Compression) -> &mut Self {
        self.compression = compression;
        self
    }

    /// Limits how many blobs share one cluster (default: all in one).
    pub fn blobs_per_cluster(&mut self, n: usize) -> &mut Self {
        self.blobs_per_cluster = n.max(1);
        self
    }

    pub fn main_page(&mut self, index: u32) -> &mut Self {
        self.main_page = index;
        self
    }

    pub fn entry(
        &mut self,
        namespace: u8,
        url: &str,
        title: &str,
        mime: u16,
        content: &[u8],
    ) -> &mut Self {
        self.entries.push(EntrySpec {
            namespace,
            url: url.to_string(),
            title: title.to_string(),
            mime,
            param: Vec::new(),
            payload: Payload::Content(content.to_vec()),
        });
        self
    }

    /// Like [`Self::entry`] but with non-empty parameter data between the
    /// entry's fixed prefix and its URL.
    pub fn entry_with_param(
        &mut self,
        namespace: u8,
        url: &str,
        title: &str,
        mime: u16,
        param: &[u8],
        content: &[u8],
    ) -> &mut Self {
        self.entries.push(EntrySpec {
            namespace,
            url: url.to_string(),
            title: title.to_string(),
            mime,
            param: param.to_vec(),
            payload: Payload::Content(content.to_vec()),
        });
        self
    }

    /// Adds a redirect entry pointing at `(target_namespace, target_url)`.
    pub fn redirect(
        &mut self,
        namespace: u8,
        url: &str,
        title: &str,
        target_namespace: u8,
        target_url: &str,
    ) -> &mut Self {
        self.entries.push(EntrySpec {
            namespace,
            url: url.to_string(),
            title: title.to_string(),
            mime: REDIRECT_SENTINEL,
            param: Vec::new(),
            payload: Payload::Redirect {
                namespace: target_namespace,
                url: target_url.to_string(),
            },
        });
        self
    }

    /// Sorted directory position of `(namespace, url)`, as the archive
    /// will lay it out. Panics when the entry does not exist.
    pub fn index_of(&self, namespace: u8, url: &str) -> u32 {
        let order = self.sorted_order();
        order
            .iter()
            .position(|&i| {
                self.entries[i].namespace == namespace && self.entries[i].url == url
            })
            .expect("entry not found in builder") as u32
    }

    fn sorted_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.entries.len()).collect();
        order.sort_by(|&a, &b| {
            let ea = &self.entries[a];
            let eb = &self.entries[b];
            (ea.namespace, ea.url.as_bytes()).cmp(&(eb.namespace, eb.url.as_bytes()))
        });
        order
    }

    /// Serializes the archive into bytes.
    pub fn build(&self) -> Vec<u8> {
        let order = self.sorted_order();

        // Directory position per original entry, for redirect resolution.
        let position_of = |namespace: u8, url: &str| -> u32 {
            order
                .iter()
                .position(|&i| {
                    self.entries[i].namespace == namespace && self.entries[i].url == url
                })
                .expect("redirect target not found in builder") as u32
        };

        // Assign content entries to clusters in directory order.
        let mut placements: Vec<Option<(u32, u32)>> = vec![None; self.entries.len()];
        let mut clusters: Vec<Vec<Vec<u8>>> = Vec::new();
        for &i in &order {
            if let Payload::Content(bytes) = &self.entries[i].payload {
                if clusters
                    .last()
                    .map_or(true, |c| c.len() >= self.blobs_per_cluster)
                {
                    clusters.push(Vec::new());
                }
                let cluster = clusters.len() as u32 - 1;
                let blob = clusters.last().unwrap().len() as u32;
                clusters.last_mut().unwrap().push(bytes.clone());
                placements[i] = Some((cluster, blob));
            }
        }

        // Serialize directory entries, recording offsets relative to the
        // directory start.
        let mut directory = Vec::new();
        let mut entry_offsets = Vec::with_capacity(order.len());
        for &i in &order {
            let spec = &self.entries[i];
            entry_offsets.push(directory.len() as u64);
            directory.extend_from_slice(&spec.mime.to_le_bytes());
            directory.push(spec.param.len() as u8);
            directory.push(spec.namespace);
            directory.extend_from_slice(&0u32.to_le_bytes()); // revision
            match &spec.payload {
                Payload::Content(_) => {
                    let (cluster, blob) = placements[i].unwrap();
                    directory.extend_from_slice(&cluster.to_le_bytes());
                    directory.extend_from_slice(&blob.to_le_bytes());
                }
                Payload::Redirect { namespace, url } => {
                    let target = position_of(*namespace, url);
                    directory.extend_from_slice(&target.to_le_bytes());
                }
            }
            directory.extend_from_slice(&spec.param);
            directory.extend_from_slice(spec.url.as_bytes());
            directory.push(0);
            directory.extend_from_slice(spec.title.as_bytes());
            directory.push(0);
        }

        // Serialize clusters: blob offset table + blob bytes, compressed.
        let cluster_blobs: Vec<Vec<u8>> = clusters
            .iter()
            .map(|blobs| {
                let table_len = 4 * (blobs.len() as u32 + 1);
                let mut offsets = Vec::with_capacity(blobs.len() + 1);
                let mut at = table_len;
                offsets.push(at);
                for blob in blobs {
                    at += blob.len() as u32;
                    offsets.push(at);
                }
                let mut raw = Vec::new();
                for offset in &offsets {
                    raw.extend_from_slice(&offset.to_le_bytes());
                }
                for blob in blobs {
                    raw.extend_from_slice(blob);
                }

                let mut serialized = vec![self.compression.tag()];
                serialized.extend_from_slice(&self.compression.compress(&raw));
                serialized
            })
            .collect();

        // Layout: header, mime list, directory, url pointers, cluster
        // pointers, clusters, checksum.
        let mime_list_pos = 80u64;
        let mut mime_list = Vec::new();
        for mime_type in &self.mime_types {
            mime_list.extend_from_slice(mime_type.as_bytes());
            mime_list.push(0);
        }
        mime_list.push(0);

        let directory_pos = mime_list_pos + mime_list.len() as u64;
        let url_ptr_pos = directory_pos + directory.len() as u64;
        let cluster_ptr_pos = url_ptr_pos + 8 * order.len() as u64;
        let clusters_pos = cluster_ptr_pos + 8 * cluster_blobs.len() as u64;

        let mut cluster_ptrs = Vec::with_capacity(cluster_blobs.len());
        let mut at = clusters_pos;
        for serialized in &cluster_blobs {
            cluster_ptrs.push(at);
            at += serialized.len() as u64;
        }
        let checksum_pos = at;

        let mut archive = Vec::new();
        archive.extend_from_slice(&ZIM_MAGIC.to_le_bytes());
        archive.extend_from_slice(&6u16.to_le_bytes()); // major version
        archive.extend_from_slice(&1u16.to_le_bytes()); // minor version
        archive.extend_from_slice(&[0xAB; 16]); // uuid
        archive.extend_from_slice(&(order.len() as u32).to_le_bytes());
        archive.extend_from_slice(&(cluster_blobs.len() as u32).to_le_bytes());
        archive.extend_from_slice(&url_ptr_pos.to_le_bytes());
        archive.extend_from_slice(&url_ptr_pos.to_le_bytes()); // title ptrs unused
        archive.extend_from_slice(&cluster_ptr_pos.to_le_bytes());
        archive.extend_from_slice(&mime_list_pos.to_le_bytes());
        archive.extend_from_slice(&self.main_page.to_le_bytes());
        archive.extend_from_slice(&0u32.to_le_bytes()); // layout page
        archive.extend_from_slice(&checksum_pos.to_le_bytes());
        assert_eq!(archive.len(), 80);

        archive.extend_from_slice(&mime_list);
        archive.extend_from_slice(&directory);
        for &offset in &entry_offsets {
            archive.extend_from_slice(&(directory_pos + offset).to_le_bytes());
        }
        for &ptr in &cluster_ptrs {
            archive.extend_from_slice(&ptr.to_le_bytes());
        }
        for serialized in &cluster_blobs {
            archive.extend_from_slice(serialized);
        }
        // 16 bytes standing in for the trailing checksum.
        archive.extend_from_slice(&[0u8; 16]);

        archive
    }

    /// Writes the archive to a fresh temporary file.
    pub fn write_temp(&self) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("create temp archive");
        file.write_all(&self.build()).expect("write temp archive");
        file.flush().expect("flush temp archive");
        file
    }

    /// Writes the archive to the given path.
    pub fn write_to(&self, path: impl AsRef<Path>) {
        fs::write(path, self.build()).expect("write archive");
    }
}

/// A canonical three-article fixture: Apple, Banana, Cherry in namespace
/// `A`, all HTML, packed into one zstd cluster.
pub fn fruit_archive() -> ArchiveBuilder {
    let mut builder = ArchiveBuilder::new();
    let html = builder.mime("text/html");
    builder.entry(b'A', "Apple", "Apple", html, &article_html("Apple"));
    builder.entry(b'A', "Banana", "Banana", html, &article_html("Banana"));
    builder.entry(b'A', "Cherry", "Cherry", html, &article_html("Cherry"));
    builder
}

/// A plausible article body, long enough to pass HTML-plausibility checks.
pub fn article_html(title: &str) -> Vec<u8> {
    format!(
        "<html><head><title>{title}</title></head><body><h1>{title}</h1>\
         <p>The {title} is a well documented subject with a long and \
         storied history.</p></body></html>"
    )
    .into_bytes()
}
