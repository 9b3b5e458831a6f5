//! Service layer: the corpus-building passes.
//!
//! Each pass works against a `CorpusRepository` and is driven by a
//! `BatchCursor` or a `FanOut` pool. Services are used by the CLI but hold no
//! UI concerns.

pub mod archive;
pub mod attribute;
pub mod conllu;
pub mod enrich;
pub mod tagset;
pub mod text_export;
pub mod vertical;

pub use archive::{export_archives, ArchiveBuilder, ArchiveSelector, BuildOutcome};
pub use attribute::{AttributeJob, AttributeSummary, AttributeSynthesizer};
pub use conllu::{verify_doc_counts, ConlluNormalizer, ConlluReport, MwtLayout};
pub use enrich::{EnrichOptions, EnrichReport, Enricher, RefPolicy};
pub use tagset::{export_tagset, TagsetReport};
pub use text_export::{TextChunk, TextExportReport, TextExporter};
pub use vertical::{
    Annotator, LanguageFilter, PrecomputedAnnotator, VerticalCodec, VerticalJob, VerticalOptions,
    VerticalSummary,
};
