//! Default collaborators for the orchestrator.

pub mod directory;
pub mod router;
pub mod template;

pub use directory::{NoPreferences, StaticDirectory};
pub use router::StaticRouter;
pub use template::TemplateFormatter;
