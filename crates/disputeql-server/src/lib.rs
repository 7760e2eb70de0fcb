//! Natural-language querying over the payment disputes dataset
//!
//! Questions are translated into a pandas-style expression by a text
//! generation backend, reduced to a single expression and evaluated in a
//! sandbox that only knows the combined dataset, `pd` and `len`.

pub mod catalog;
pub mod config;
pub mod extract;
pub mod llm;
pub mod logging;
pub mod mcp;
pub mod prompt;
pub mod query;
pub mod render;

pub use catalog::SchemaDescription;
pub use extract::{extract, QueryExpression, FALLBACK_EXPRESSION};
pub use llm::{OpenAiTranslator, TranslationError, TranslationProvider, TranslationRequest};
pub use prompt::{build_system_prompt, PromptBuilder};
pub use query::{QueryEngine, QueryResponse, EXAMPLE_QUERIES};
