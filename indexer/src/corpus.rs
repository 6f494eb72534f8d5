use anyhow::{bail, Context, Result};
use reviewdex_core::Document;
use serde::Deserialize;
use serde_json::Value;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::ZipArchive;

/// One record of a JSON or JSONL input file.
#[derive(Debug, Deserialize)]
struct InputDoc {
    #[serde(alias = "review_id")]
    id: Value,
    #[serde(default, alias = "body", alias = "review_text")]
    text: Option<String>,
}

impl InputDoc {
    fn into_document(self) -> Document {
        let key = match self.id {
            Value::String(s) => s,
            other => other.to_string(),
        };
        Document::new(key, self.text.unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// One review per file, keyed by the file stem.
    Text(PathBuf),
    JsonLines(PathBuf),
    Json(PathBuf),
    /// An archive of `.txt` reviews, one per entry.
    Zip(PathBuf),
}

impl Source {
    fn from_path(path: &Path) -> Option<Source> {
        match path.extension().and_then(|s| s.to_str()) {
            Some("txt") => Some(Source::Text(path.to_path_buf())),
            Some("jsonl") => Some(Source::JsonLines(path.to_path_buf())),
            Some("json") => Some(Source::Json(path.to_path_buf())),
            Some("zip") => Some(Source::Zip(path.to_path_buf())),
            _ => None,
        }
    }

    fn documents(self) -> Box<dyn Iterator<Item = Document>> {
        match self {
            Source::Text(path) => Box::new(std::iter::once(read_text(&path))),
            Source::JsonLines(path) => read_json_lines(path),
            Source::Json(path) => Box::new(read_json(&path).into_iter()),
            Source::Zip(path) => read_zip(path),
        }
    }
}

/// The input files of a build, in a stable order.
#[derive(Debug)]
pub struct Corpus {
    sources: Vec<Source>,
}

impl Corpus {
    /// A single supported file, or every supported file below a directory.
    pub fn discover(input: &Path) -> Result<Self> {
        let mut sources = Vec::new();
        if input.is_dir() {
            for entry in WalkDir::new(input).sort_by_file_name() {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        tracing::warn!(%err, "skipping unreadable directory entry");
                        continue;
                    }
                };
                if entry.file_type().is_file() {
                    sources.extend(Source::from_path(entry.path()));
                }
            }
        } else if input.is_file() {
            match Source::from_path(input) {
                Some(source) => sources.push(source),
                None => bail!("unsupported input file {} (expected .txt, .json, .jsonl or .zip)", input.display()),
            }
        } else {
            bail!("input {} does not exist", input.display());
        }
        tracing::info!(input = %input.display(), files = sources.len(), "discovered corpus files");
        Ok(Self { sources })
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// Exact document count when it is known without reading any file.
    pub fn size_hint(&self) -> Option<usize> {
        self.sources
            .iter()
            .all(|s| matches!(s, Source::Text(_)))
            .then_some(self.sources.len())
    }

    /// Stream every document; files are opened lazily, one at a time.
    pub fn documents(self) -> impl Iterator<Item = Document> {
        self.sources.into_iter().flat_map(Source::documents)
    }
}

fn read_text(path: &Path) -> Document {
    let key = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    match fs::read(path) {
        Ok(bytes) => Document::from_bytes(key, bytes),
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "unreadable review file, indexing it as empty");
            Document::new(key, "")
        }
    }
}

fn read_json_lines(path: PathBuf) -> Box<dyn Iterator<Item = Document>> {
    let file = match File::open(&path) {
        Ok(file) => file,
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "skipping unreadable corpus file");
            return Box::new(std::iter::empty());
        }
    };
    Box::new(BufReader::new(file).lines().enumerate().filter_map(move |(n, line)| {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                tracing::warn!(path = %path.display(), line = n + 1, %err, "skipping unreadable line");
                return None;
            }
        };
        if line.trim().is_empty() {
            return None;
        }
        match serde_json::from_str::<InputDoc>(&line) {
            Ok(doc) => Some(doc.into_document()),
            Err(err) => {
                tracing::warn!(path = %path.display(), line = n + 1, %err, "skipping malformed record");
                None
            }
        }
    }))
}

/// Entries are read in name order, one at a time; directories and
/// non-`.txt` entries are skipped.
fn read_zip(path: PathBuf) -> Box<dyn Iterator<Item = Document>> {
    let opened = File::open(&path)
        .with_context(|| format!("opening {}", path.display()))
        .and_then(|f| ZipArchive::new(BufReader::new(f)).context("reading zip archive"));
    let mut archive = match opened {
        Ok(archive) => archive,
        Err(err) => {
            tracing::warn!(path = %path.display(), err = %format!("{err:#}"), "skipping unreadable corpus file");
            return Box::new(std::iter::empty());
        }
    };
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|name| !name.ends_with('/') && name.ends_with(".txt"))
        .map(str::to_string)
        .collect();
    names.sort();
    tracing::debug!(path = %path.display(), entries = names.len(), "reading zip archive");

    Box::new(names.into_iter().map(move |name| {
        let key = Path::new(&name).file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        let mut bytes = Vec::new();
        let read = archive.by_name(&name).map_err(anyhow::Error::from).and_then(|mut entry| {
            entry.read_to_end(&mut bytes)?;
            Ok(())
        });
        match read {
            Ok(()) => Document::from_bytes(key, bytes),
            Err(err) => {
                tracing::warn!(path = %path.display(), entry = %name, %err, "unreadable archive entry, indexing it as empty");
                Document::new(key, "")
            }
        }
    }))
}

fn read_json(path: &Path) -> Vec<Document> {
    let parsed = File::open(path)
        .with_context(|| format!("opening {}", path.display()))
        .and_then(|f| serde_json::from_reader::<_, Value>(BufReader::new(f)).context("parsing json"));
    let json = match parsed {
        Ok(json) => json,
        Err(err) => {
            tracing::warn!(path = %path.display(), err = %format!("{err:#}"), "skipping unreadable corpus file");
            return Vec::new();
        }
    };
    let records = match json {
        Value::Array(records) => records,
        record @ Value::Object(_) => vec![record],
        _ => {
            tracing::warn!(path = %path.display(), "expected a record or an array of records");
            return Vec::new();
        }
    };
    records
        .into_iter()
        .enumerate()
        .filter_map(|(i, record)| match serde_json::from_value::<InputDoc>(record) {
            Ok(doc) => Some(doc.into_document()),
            Err(err) => {
                tracing::warn!(path = %path.display(), record = i, %err, "skipping malformed record");
                None
            }
        })
        .collect()
}
