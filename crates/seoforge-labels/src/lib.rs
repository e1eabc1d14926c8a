//! # SEOForge Labels
//!
//! Label/taxonomy subsystem: generates a page-label taxonomy for a project
//! with the LLM, assigns labels to pages against it, and validates label
//! sets. The validator is shared between AI assignment and user edits so both
//! paths enforce the same rules.

pub mod taxonomy;
pub mod validator;

pub use taxonomy::{
    GeneratedTaxonomy, LabelAssignment, LabelTaxonomyService, TaxonomyLabel,
};
pub use validator::{validate_labels, LabelValidationError, LabelValidationResult};
