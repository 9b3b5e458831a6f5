//! Data models for the corpus pipeline.

mod archive;
mod attribute;
mod record;
mod vertical;

pub use archive::{Archive, ArchiveMode, ArchiveSummary, ArchiveVersion, Compression, NewArchive};
pub use attribute::{
    flatten_fields, AttrValue, AttributeBag, AttributeRule, AttributeSchema, Multiplicity,
};
pub use record::{LanguageDistribution, Record, RecordSelection};
pub use vertical::{join_document, AnnotatedDocument, DocumentRow, Sentence, Token};
