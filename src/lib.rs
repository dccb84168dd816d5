//! urlforms - reactive multi-form orchestration with templated artifacts

pub mod aggregate;
pub mod artifacts;
pub mod config;
pub mod error;
pub mod filters;
pub mod instance;
pub mod loader;
pub mod props;
pub mod reactive;
pub mod render;
pub mod store;
pub mod template;
pub mod validate;

pub use aggregate::{ErrorEntry, ErrorSource, ErrorSummary};
pub use artifacts::CheckResult;
pub use config::{Config, DocumentFormat, FormSpec, Source, TemplateText};
pub use error::{FilterError, FixSuggestion, TemplateError, TemplateErrorKind, UrlformsError};
pub use filters::{FilterBundle, FilterRegistry};
pub use instance::Instance;
pub use loader::{DocumentLoader, LocationLoader};
pub use render::{RenderModel, TerminalAction};
pub use store::{FormState, ValidationError};
pub use template::{Environment, TemplateSource, VirtualSource};
pub use validate::{FormValidator, JsonSchemaValidator};
