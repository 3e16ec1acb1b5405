//! Ports for the collaborators around the orchestrator.

pub mod directory;
pub mod formatter;
pub mod router;

pub use directory::CallerDirectory;
pub use formatter::ResponseFormatter;
pub use router::IntentRouter;

#[cfg(test)]
pub use directory::MockCallerDirectory;
#[cfg(test)]
pub use formatter::MockResponseFormatter;
#[cfg(test)]
pub use router::MockIntentRouter;
