//! Template rendering.
//!
//! Built-in templates ship inside the binary under the `builtin` origin.
//! Every subdirectory of the configured templates directory is an extra
//! origin, addressed as `<origin>/<source>`.

mod engine;
mod xml;

pub use engine::{TemplateEngine, SYSTEMD_UNIT_TEMPLATE, SYSVINIT_SCRIPT_TEMPLATE};
pub use xml::{escape_xml, is_xml_name, xml_filter};
