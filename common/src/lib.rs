//! CompetitorIQ Common Library
//!
//! CLIとライブラリ本体で共有される、I/Oを持たない中核ロジック

pub mod error;
pub mod normalize;
pub mod parser;
pub mod pricing;
pub mod prompts;
pub mod reconcile;
pub mod schema;
pub mod types;

pub use error::{Error, Result};
pub use normalize::{collapse_whitespace, dedup_topics, normalize_topic};
pub use parser::{extract_json, extract_json_object, parse_classification_response, parse_extraction_response};
pub use prompts::{build_classification_prompt, build_extraction_prompt};
pub use reconcile::{reconcile, Reconciliation};
pub use schema::ColumnSchema;
pub use types::{Decision, DecisionMap, FieldMap, ReconcileReport, TopicRecord, TopicVerdict, VerdictOrigin};
