//! Command-line front end over the repository and settings.
mod app;
mod args;

pub use app::*;
pub use args::*;
