//! On-disk index layout.
//!
//! ```text
//! <root>/CURRENT            name of the live generation
//! <root>/gen-00000001/      one complete index
//!     meta.json             format version, creation time, statistics
//!     vocab.bin             sorted terms
//!     docs.bin              document keys and lengths
//!     term_doc.bin          postings per term
//!     doc_term.bin          term frequencies per document
//! ```
//!
//! A save always writes a fresh generation and only then replaces `CURRENT`
//! (temp file + rename), so a failed save never disturbs the live index.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use time::format_description::well_known::Rfc3339;

use crate::config::{BuildMode, StoreConfig};
use crate::diagnostics::Diagnostics;
use crate::error::{IndexError, IndexResult};
use crate::index::{DocMeta, Index, IndexStats, Posting, TermId, Vocabulary};

pub const FORMAT_VERSION: u32 = 1;

const CURRENT: &str = "CURRENT";
const GENERATION_PREFIX: &str = "gen-";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaFile {
    pub version: u32,
    pub created_at: String,
    pub stats: IndexStats,
    pub build_mode: Option<BuildMode>,
    /// File name to size in bytes, for the binary components.
    pub files: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreReport {
    pub path: PathBuf,
    pub bytes_on_disk: u64,
    pub elapsed: Duration,
    /// Metadata of the generation that was written or read.
    pub meta: MetaFile,
}

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn current(&self) -> PathBuf { self.root.join(CURRENT) }
    fn generation(&self, n: u64) -> PathBuf { self.root.join(format!("{GENERATION_PREFIX}{n:08}")) }

    /// Directory of the live generation.
    pub fn current_generation(&self) -> IndexResult<PathBuf> {
        let current = self.current();
        let name = match fs::read_to_string(&current) {
            Ok(name) => name,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(IndexError::NoCurrentGeneration { root: self.root.clone() })
            }
            Err(e) => return Err(IndexError::io("load", current, e)),
        };
        let dir = self.root.join(name.trim());
        if !dir.is_dir() {
            return Err(IndexError::NoCurrentGeneration { root: self.root.clone() });
        }
        Ok(dir)
    }

    pub fn exists(&self) -> bool {
        self.current_generation().is_ok()
    }

    /// Existing generation numbers, ascending.
    fn generations(&self) -> IndexResult<Vec<u64>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(IndexError::io("save", &self.root, e)),
        };
        let mut gens: Vec<u64> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().to_str().and_then(|n| n.strip_prefix(GENERATION_PREFIX)?.parse().ok()))
            .collect();
        gens.sort_unstable();
        Ok(gens)
    }
}

struct GenerationPaths(PathBuf);

impl GenerationPaths {
    fn meta(&self) -> PathBuf { self.0.join("meta.json") }
    fn vocab(&self) -> PathBuf { self.0.join("vocab.bin") }
    fn docs(&self) -> PathBuf { self.0.join("docs.bin") }
    fn term_doc(&self) -> PathBuf { self.0.join("term_doc.bin") }
    fn doc_term(&self) -> PathBuf { self.0.join("doc_term.bin") }
}

/// Stream `value` into `path` without building the encoded bytes in memory.
fn write_bin<T: Serialize + ?Sized>(path: &Path, component: &'static str, value: &T) -> IndexResult<u64> {
    let f = File::create(path).map_err(|e| IndexError::io("save", path, e))?;
    let mut w = BufWriter::new(f);
    bincode::serialize_into(&mut w, value)
        .map_err(|source| IndexError::Encode { stage: "save", component, source })?;
    let f = w.into_inner().map_err(|e| IndexError::io("save", path, e.into_error()))?;
    f.sync_all().map_err(|e| IndexError::io("save", path, e))?;
    let len = f.metadata().map_err(|e| IndexError::io("save", path, e))?.len();
    Ok(len)
}

fn read_bin<T: serde::de::DeserializeOwned>(path: &Path, component: &'static str) -> IndexResult<T> {
    let f = File::open(path).map_err(|e| IndexError::io("load", path, e))?;
    bincode::deserialize_from(BufReader::new(f))
        .map_err(|source| IndexError::Decode { stage: "load", component, source })
}

fn write_generation(dir: &GenerationPaths, index: &Index, build_mode: Option<BuildMode>) -> IndexResult<(MetaFile, u64)> {
    fs::create_dir_all(&dir.0).map_err(|e| IndexError::io("save", &dir.0, e))?;
    let mut files = BTreeMap::new();
    files.insert("vocab.bin".to_string(), write_bin(&dir.vocab(), "vocabulary", index.vocabulary().terms())?);
    files.insert("docs.bin".to_string(), write_bin(&dir.docs(), "documents", index.docs())?);
    files.insert("term_doc.bin".to_string(), write_bin(&dir.term_doc(), "term-doc index", index.term_doc())?);
    files.insert("doc_term.bin".to_string(), write_bin(&dir.doc_term(), "doc-term index", index.doc_term())?);

    let meta = MetaFile {
        version: FORMAT_VERSION,
        created_at: time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| "".into()),
        stats: index.stats().clone(),
        build_mode,
        files,
    };
    let meta_path = dir.meta();
    let json = serde_json::to_string_pretty(&meta)
        .map_err(|source| IndexError::Json { stage: "save", path: meta_path.clone(), source })?;
    fs::write(&meta_path, json.as_bytes()).map_err(|e| IndexError::io("save", &meta_path, e))?;
    let bytes = meta.files.values().sum::<u64>() + json.len() as u64;
    Ok((meta, bytes))
}

/// Persist `index` as a new generation and make it the live one.
pub fn save_index(
    paths: &IndexPaths,
    index: &Index,
    build_mode: Option<BuildMode>,
    config: &StoreConfig,
    diagnostics: &Diagnostics,
) -> IndexResult<StoreReport> {
    let started = Instant::now();
    let _t = diagnostics.timer("Saving Index");
    fs::create_dir_all(&paths.root).map_err(|e| IndexError::io("save", &paths.root, e))?;

    let existing = paths.generations()?;
    let number = existing.last().map_or(1, |n| n + 1);
    let dir = GenerationPaths(paths.generation(number));

    let (meta, bytes_on_disk) = match write_generation(&dir, index, build_mode) {
        Ok(written) => written,
        Err(err) => {
            let _ = fs::remove_dir_all(&dir.0);
            return Err(err);
        }
    };

    // swap: CURRENT.tmp -> CURRENT
    let current = paths.current();
    let tmp = paths.root.join(format!("{CURRENT}.tmp"));
    let name = format!("{GENERATION_PREFIX}{number:08}\n");
    let swap = fs::write(&tmp, name.as_bytes())
        .and_then(|_| fs::rename(&tmp, &current))
        .map_err(|e| IndexError::io("save", &current, e));
    if let Err(err) = swap {
        let _ = fs::remove_dir_all(&dir.0);
        return Err(err);
    }

    let stale = existing.len().saturating_sub(config.keep_generations);
    for old in &existing[..stale] {
        let old_dir = paths.generation(*old);
        if let Err(err) = fs::remove_dir_all(&old_dir) {
            tracing::warn!(path = %old_dir.display(), %err, "could not remove old index generation");
        }
    }

    let report = StoreReport { path: dir.0, bytes_on_disk, elapsed: started.elapsed(), meta };
    tracing::info!(
        path = %report.path.display(),
        bytes = report.bytes_on_disk,
        elapsed_s = report.elapsed.as_secs_f64(),
        "index saved"
    );
    diagnostics.note(format!("saved index to {} ({} bytes)", report.path.display(), report.bytes_on_disk));
    Ok(report)
}

fn read_meta(dir: &GenerationPaths) -> IndexResult<MetaFile> {
    let path = dir.meta();
    let f = File::open(&path).map_err(|e| IndexError::io("load", &path, e))?;
    let meta: MetaFile = serde_json::from_reader(BufReader::new(f))
        .map_err(|source| IndexError::Json { stage: "load", path: path.clone(), source })?;
    if meta.version != FORMAT_VERSION {
        return Err(IndexError::UnsupportedFormat { found: meta.version, expected: FORMAT_VERSION });
    }
    Ok(meta)
}

/// Load only the metadata of the live generation.
pub fn load_meta(paths: &IndexPaths) -> IndexResult<MetaFile> {
    read_meta(&GenerationPaths(paths.current_generation()?))
}

/// Load the live generation.
pub fn load_index(paths: &IndexPaths, config: &StoreConfig, diagnostics: &Diagnostics) -> IndexResult<(Index, StoreReport)> {
    let started = Instant::now();
    let _t = diagnostics.timer("Loading Index");
    let dir = GenerationPaths(paths.current_generation()?);
    let meta = read_meta(&dir)?;

    let terms: Vec<String> = read_bin(&dir.vocab(), "vocabulary")?;
    let docs: Vec<DocMeta> = read_bin(&dir.docs(), "documents")?;
    let term_doc: Vec<Vec<Posting>> = read_bin(&dir.term_doc(), "term-doc index")?;
    let doc_term: Vec<Vec<(TermId, u32)>> = read_bin(&dir.doc_term(), "doc-term index")?;

    let index = Index::from_parts(Vocabulary::from_sorted(terms)?, term_doc, doc_term, docs);
    if index.stats() != &meta.stats {
        return Err(IndexError::inconsistent(
            "load",
            format!("statistics in meta.json {:?} do not match the loaded index {:?}", meta.stats, index.stats()),
        ));
    }
    if config.verify_on_load {
        index.verify("load")?;
    }

    let bytes_on_disk = meta.files.values().sum::<u64>()
        + fs::metadata(dir.meta()).map(|m| m.len()).unwrap_or(0);
    let report = StoreReport { path: dir.0, bytes_on_disk, elapsed: started.elapsed(), meta };
    tracing::info!(
        path = %report.path.display(),
        documents = index.num_docs(),
        terms = index.vocabulary().len(),
        elapsed_s = report.elapsed.as_secs_f64(),
        "index loaded"
    );
    Ok((index, report))
}

#[derive(Serialize)]
struct JsonExport<'a> {
    term_doc_freqs: BTreeMap<&'a str, BTreeMap<&'a str, u32>>,
    document_count: u32,
    vocabulary_size: usize,
    top_terms: Vec<(String, u64)>,
    documents: BTreeMap<&'a str, u64>,
}

/// Human-readable dump for inspection; not meant for large indexes.
pub fn export_json<W: Write>(index: &Index, writer: W, top_n: usize) -> serde_json::Result<()> {
    let term_doc_freqs = index
        .vocabulary()
        .terms()
        .iter()
        .enumerate()
        .map(|(term_id, term)| {
            let docs = index
                .postings(term_id as TermId)
                .iter()
                .filter_map(|p| index.doc(p.doc_id).map(|d| (d.external_id.as_str(), p.tf)))
                .collect();
            (term.as_str(), docs)
        })
        .collect();
    let export = JsonExport {
        term_doc_freqs,
        document_count: index.num_docs(),
        vocabulary_size: index.vocabulary().len(),
        top_terms: index.most_frequent_terms(top_n),
        documents: index.docs().iter().map(|d| (d.external_id.as_str(), d.length)).collect(),
    };
    serde_json::to_writer_pretty(writer, &export)
}
