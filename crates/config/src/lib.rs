//! Configuration for the doiuse language server.
//!
//! Two kinds of configuration live here:
//! - [`ValidationSettings`], pushed by the editor through the language server protocol
//! - browserslist declarations discovered on disk (`package.json`, `browserslist`,
//!   `.browserslistrc`), which define the browser targets for a directory scope

mod browserslist;
mod error;
mod settings;

pub use browserslist::{
    is_declaration_file, load_declaration, parse_browserslist, parse_package_browserslist,
    queries_from_env, Declaration, DeclarationKind, DECLARATION_FILES, PACKAGE_MANIFEST,
};
pub use error::{ConfigError, Result};
pub use settings::{Severity, TriggerMode, ValidationSettings, SETTINGS_SECTION};
