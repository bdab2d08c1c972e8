//! Parallel title index construction.
//!
//! A three-stage pipeline with bounded back-pressure:
//! 1. one scanner walks the archive directory and emits indexable entries
//! 2. a pool of workers turns entries into tantivy documents
//! 3. one writer batches documents into the index, committing per batch
//!
//! Any stage failure short-circuits the build; the first error wins, no
//! further batch is committed, and the output directory is removed so a
//! partial index never survives. The build also deletes a pre-existing
//! index at the output path first, so rebuilding is idempotent.

use std::fs;
use std::path::Path;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Mutex;
use std::thread;

use log::info;
use tantivy::directory::MmapDirectory;
use tantivy::{doc, Index, IndexWriter, TantivyDocument};

use crate::engine::classify;
use crate::zim::{Result, ZimError, ZimReader};

use super::{build_schema, TitleFields};

/// Documents per commit in the writer stage.
const BATCH_SIZE: usize = 10_000;
/// Per-worker capacity of each pipeline channel.
const CHANNEL_CAPACITY_PER_WORKER: usize = 1000;
/// Heap budget handed to the tantivy writer.
const WRITER_MEMORY_BUDGET: usize = 50_000_000;

/// An indexable entry on its way through the pipeline.
struct IndexRecord {
    idx: u32,
    title: String,
    url: String,
}

/// Builds the title index for `zim_path` at `index_path`, replacing any
/// index already there. Returns the number of documents indexed.
///
/// A failed build aborts the whole operation: the index directory is
/// removed again, so a partial index is never left discoverable at the
/// output path.
pub fn build_index(zim_path: impl AsRef<Path>, index_path: impl AsRef<Path>) -> Result<u64> {
    let zim_path = zim_path.as_ref();
    let index_path = index_path.as_ref();

    // Fail before touching any pre-existing index at the output path.
    let reader = ZimReader::open(zim_path, false)?;

    if index_path.exists() {
        info!("Removing existing index at {}", index_path.display());
        fs::remove_dir_all(index_path)?;
    }
    fs::create_dir_all(index_path)?;

    let result = run_build(&reader, zim_path, index_path);
    if result.is_err() {
        // The directory only holds this build's output; remove it so an
        // aborted build is not discoverable as a complete index.
        let _ = fs::remove_dir_all(index_path);
    }
    result
}

fn run_build(reader: &ZimReader, zim_path: &Path, index_path: &Path) -> Result<u64> {
    let schema = build_schema();
    let directory = MmapDirectory::open(index_path).map_err(tantivy::TantivyError::from)?;
    let index = Index::open_or_create(directory, schema.clone())?;
    let fields = TitleFields::resolve(&schema)?;
    let mut writer: IndexWriter = index.writer(WRITER_MEMORY_BUDGET)?;

    let workers = num_cpus::get().max(1);
    let capacity = workers * CHANNEL_CAPACITY_PER_WORKER;
    info!(
        "Building title index from {}: {} entries, {} workers",
        zim_path.display(),
        reader.entry_count(),
        workers
    );

    let (entry_tx, entry_rx) = sync_channel::<IndexRecord>(capacity);
    let (doc_tx, doc_rx) = sync_channel::<TantivyDocument>(capacity);
    // One slot, non-blocking send: the first failure wins, later ones drop.
    let (err_tx, err_rx) = sync_channel::<ZimError>(1);
    let entry_rx = Mutex::new(entry_rx);

    let indexed = thread::scope(|scope| -> Result<u64> {
        let scanner_err = err_tx.clone();
        scope.spawn(move || scan_entries(reader, entry_tx, scanner_err));

        for _ in 0..workers {
            let doc_tx = doc_tx.clone();
            let entry_rx = &entry_rx;
            let fields = &fields;
            scope.spawn(move || build_documents(entry_rx, doc_tx, fields));
        }
        // The writer stage holds no senders; dropping these lets channel
        // closure propagate stage by stage.
        drop(doc_tx);
        drop(err_tx);

        let mut indexed = 0u64;
        let mut batched = 0usize;
        for document in doc_rx {
            writer.add_document(document)?;
            indexed += 1;
            batched += 1;
            if batched >= BATCH_SIZE {
                // A failed stage must not become durable: stop before
                // committing once an error is pending.
                if let Ok(e) = err_rx.try_recv() {
                    return Err(e);
                }
                writer.commit()?;
                batched = 0;
            }
        }
        // The scanner reports its error before closing the pipeline, so a
        // drained document channel means any failure is visible here.
        if let Ok(e) = err_rx.try_recv() {
            return Err(e);
        }
        if batched > 0 {
            writer.commit()?;
        }
        Ok(indexed)
    })?;

    writer.wait_merging_threads()?;
    info!(
        "Index complete: {indexed} articles indexed to {}",
        index_path.display()
    );
    Ok(indexed)
}

// Stage 1: walk the directory, keep article entries, report progress at
// ~5% increments of entries scanned.
fn scan_entries(reader: &ZimReader, tx: SyncSender<IndexRecord>, err_tx: SyncSender<ZimError>) {
    let entry_count = reader.entry_count();
    let log_interval = (entry_count / 20).max(1);

    for i in 0..entry_count {
        let entry = match reader.lookup_entry(i) {
            Ok(entry) => entry,
            Err(e) => {
                let _ = err_tx.try_send(e);
                return;
            }
        };

        if classify::is_article(&entry) {
            let record = IndexRecord {
                idx: i,
                title: entry.title,
                url: entry.url,
            };
            if tx.send(record).is_err() {
                // Downstream hung up; its error is already reported.
                return;
            }
        }

        if (i + 1) % log_interval == 0 {
            info!(
                "Scanning archive: {}% ({} of {entry_count} entries)",
                (i as u64 + 1) * 100 / entry_count as u64,
                i + 1
            );
        }
    }
}

// Stage 2: turn entries into documents. Workers share the receiver behind
// a mutex and run until the scanner closes the channel. After the writer
// hangs up they keep draining so the scanner never blocks on a full
// channel with nobody reading.
fn build_documents(
    rx: &Mutex<Receiver<IndexRecord>>,
    tx: SyncSender<TantivyDocument>,
    fields: &TitleFields,
) {
    let mut downstream_open = true;
    loop {
        let received = {
            let Ok(guard) = rx.lock() else { return };
            guard.recv()
        };
        let Ok(record) = received else { return };
        if !downstream_open {
            continue;
        }

        let document = doc!(
            fields.id => record.idx.to_string(),
            fields.title => record.title.as_str(),
            fields.title_exact => record.title.to_lowercase(),
            fields.url => record.url.as_str(),
            fields.idx => record.idx as u64,
        );
        if tx.send(document).is_err() {
            downstream_open = false;
        }
    }
}
