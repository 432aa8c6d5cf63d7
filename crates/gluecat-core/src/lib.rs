// gluecat-core - typed resource graph for the Glue catalog demo stack
//
// Builders register CloudFormation resources on an explicit `Stack` and hand
// back immutable descriptors. Synthesis checks every reference and produces
// a `Template`. No I/O, no async.

pub mod intrinsic;

pub mod app;
pub mod catalog;
pub mod compute;
pub mod database;
pub mod error;
pub mod iam;
pub mod network;
pub mod stack;
pub mod template;
pub mod verify;

// Re-export commonly used types
pub use app::GlueCatalogStack;
pub use error::{ErrorCode, Result, StackError};
pub use intrinsic::{Properties, Value};
pub use stack::{LogicalId, Stack};
pub use template::{Template, TemplateFormat};
pub use verify::{verify, Expectations, Finding, Report, Severity};
