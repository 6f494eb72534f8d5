//! Indexing and retrieval over a corpus of short review texts.
//!
//! A corpus is streamed through an [`IndexBuilder`] (sequential or parallel,
//! identical output) into an immutable [`Index`] holding both the term-doc and
//! doc-term views. Indexes are persisted with [`persist`], queried with
//! [`QueryEngine`] and exposed to learners through [`vsm`].

pub mod builder;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod index;
pub mod persist;
pub mod prune;
pub mod query;
pub mod stats;
pub mod tokenizer;
pub mod vsm;
pub mod weighting;

pub use builder::{select_builder, BuildContext, BuildOutput, BuildReport, CancelToken, IndexBuilder};
pub use config::{BuildMode, EngineConfig};
pub use diagnostics::Diagnostics;
pub use error::{IndexError, IndexResult};
pub use index::{DocId, DocMeta, Document, Index, IndexStats, Posting, TermId, Vocabulary};
pub use prune::{DfBand, DfLimit};
pub use query::{Query, QueryEngine, RetrievalModel, ScoredDoc, SearchResults};
pub use tokenizer::Tokenizer;
pub use vsm::{select_vector_space, TermVector, VectorSpace, VsmPreference};
pub use weighting::Weighting;
