//! Tera template engine wrapper.

use std::path::Path;
use std::sync::Arc;

use tera::{Context, Tera};
use tracing::{debug, info};

use crate::attributes::{TemplateSource, BUILTIN_ORIGIN};
use crate::error::ConvergeError;

use super::xml::xml_filter;

/// Built-in source for systemd unit files.
pub const SYSTEMD_UNIT_TEMPLATE: &str = "systemd.service.tera";
/// Built-in source for sysvinit scripts.
pub const SYSVINIT_SCRIPT_TEMPLATE: &str = "sysvinit.sh.tera";

const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    ("config.xml.tera", include_str!("builtin/config.xml.tera")),
    ("users.xml.tera", include_str!("builtin/users.xml.tera")),
    ("zookeeper.xml.tera", include_str!("builtin/zookeeper.xml.tera")),
    (SYSTEMD_UNIT_TEMPLATE, include_str!("builtin/systemd.service.tera")),
    (SYSVINIT_SCRIPT_TEMPLATE, include_str!("builtin/sysvinit.sh.tera")),
];

/// Template engine for rendering configuration files and service units.
#[derive(Clone)]
pub struct TemplateEngine {
    tera: Arc<Tera>,
}

impl TemplateEngine {
    /// Load the built-in templates plus every `**/*.tera` file under
    /// `template_dir`. The first path component below `template_dir` is the
    /// origin. A missing directory just means there are no custom origins.
    pub fn new(template_dir: &Path) -> Result<Self, ConvergeError> {
        let mut tera = if template_dir.is_dir() {
            let pattern = template_dir.join("**/*.tera");
            let pattern_str = pattern.to_string_lossy();
            debug!(pattern = %pattern_str, "Loading custom templates");

            Tera::new(&pattern_str).map_err(|e| ConvergeError::Template {
                message: format!(
                    "Failed to load templates from '{}': {}",
                    template_dir.display(),
                    e
                ),
            })?
        } else {
            debug!(directory = %template_dir.display(), "No custom template directory");
            Tera::default()
        };

        add_builtins(&mut tera)?;

        info!(
            directory = %template_dir.display(),
            count = tera.get_template_names().count(),
            "Template engine initialized"
        );

        Ok(Self {
            tera: Arc::new(tera),
        })
    }

    /// Engine holding only the built-in templates.
    pub fn builtin() -> Result<Self, ConvergeError> {
        let mut tera = Tera::default();
        add_builtins(&mut tera)?;
        Ok(Self {
            tera: Arc::new(tera),
        })
    }

    /// Render `source` from its origin with the given variables.
    pub fn render(
        &self,
        source: &TemplateSource,
        context: &serde_json::Value,
    ) -> Result<String, ConvergeError> {
        let name = template_name(source);
        if !self.has_template(&name) {
            return Err(ConvergeError::Template {
                message: format!(
                    "Template '{}' not found in origin '{}'",
                    source.source, source.origin
                ),
            });
        }

        let tera_context = Context::from_serialize(context).map_err(|e| ConvergeError::Template {
            message: format!("Invalid template context: {}", e),
        })?;

        self.tera
            .render(&name, &tera_context)
            .map_err(|e| ConvergeError::Template {
                message: format!("Failed to render template '{}': {}", name, render_chain(&e)),
            })
    }

    /// Check if a template exists under its full `<origin>/<source>` name.
    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|n| n == name)
    }
}

fn add_builtins(tera: &mut Tera) -> Result<(), ConvergeError> {
    let builtins: Vec<(String, &str)> = BUILTIN_TEMPLATES
        .iter()
        .map(|(source, body)| (format!("{}/{}", BUILTIN_ORIGIN, source), *body))
        .collect();

    tera.add_raw_templates(builtins)
        .map_err(|e| ConvergeError::Template {
            message: format!("Failed to load built-in templates: {}", render_chain(&e)),
        })?;

    // The xml filter escapes text itself; HTML autoescaping would double it.
    tera.autoescape_on(vec![]);
    tera.register_filter("xml", xml_filter);
    Ok(())
}

fn template_name(source: &TemplateSource) -> String {
    format!("{}/{}", source.origin, source.source)
}

/// Tera nests the useful message in the error source chain.
fn render_chain(err: &tera::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    fn custom_template_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("site")).unwrap();
        fs::write(
            dir.path().join("site/config.xml.tera"),
            "<clickhouse><path>{{ data_path }}</path></clickhouse>\n",
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_builtin_templates_registered() {
        let engine = TemplateEngine::builtin().unwrap();
        for (source, _) in BUILTIN_TEMPLATES {
            assert!(engine.has_template(&format!("builtin/{}", source)));
        }
    }

    #[test]
    fn test_custom_origin() {
        let dir = custom_template_dir();
        let engine = TemplateEngine::new(dir.path()).unwrap();

        assert!(engine.has_template("site/config.xml.tera"));
        assert!(engine.has_template("builtin/config.xml.tera"));

        let out = engine
            .render(
                &TemplateSource::new("config.xml.tera", "site"),
                &json!({"data_path": "/var/lib/ch/"}),
            )
            .unwrap();
        assert_eq!(out, "<clickhouse><path>/var/lib/ch/</path></clickhouse>\n");
    }

    #[test]
    fn test_missing_directory_is_builtin_only() {
        let engine = TemplateEngine::new(Path::new("/nonexistent/templates")).unwrap();
        assert_eq!(
            engine.tera.get_template_names().count(),
            BUILTIN_TEMPLATES.len()
        );
        assert!(engine.has_template("builtin/config.xml.tera"));
    }

    #[test]
    fn test_unknown_origin() {
        let engine = TemplateEngine::builtin().unwrap();
        let err = engine
            .render(&TemplateSource::new("config.xml.tera", "nowhere"), &json!({}))
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("nowhere"));
    }

    #[test]
    fn test_render_zookeeper_include() {
        let engine = TemplateEngine::builtin().unwrap();
        let out = engine
            .render(
                &TemplateSource::builtin("zookeeper.xml.tera"),
                &json!({
                    "include_name": "zookeeper-servers",
                    "nodes": [
                        {"index": 1, "host": "zk1", "port": 2181},
                        {"index": null, "host": "zk2", "port": 2182}
                    ]
                }),
            )
            .unwrap();

        assert!(out.contains("<zookeeper-servers>"));
        assert!(out.contains("<node index=\"1\">"));
        assert!(out.contains("<host>zk2</host>"));
        assert!(out.contains("<port>2182</port>"));
        assert!(out.contains("<node>\n"));
    }

    #[test]
    fn test_render_config_uses_paths_and_skips_managed_keys() {
        let engine = TemplateEngine::builtin().unwrap();
        let out = engine
            .render(
                &TemplateSource::builtin("config.xml.tera"),
                &json!({
                    "config": {
                        "http_port": 8123,
                        "path": "/ignored/",
                        "users_config": "users.xml",
                        "zookeeper": {"incl": "zookeeper-servers"}
                    },
                    "log_path": "/var/log/ch/",
                    "data_path": "/var/lib/ch/",
                    "temp_data_path": "/var/lib/ch/tmp/",
                    "format_schema_path": "/var/lib/ch/format_schemas/",
                    "user_files_path": "/var/lib/ch/user_files/",
                    "zookeeper_include": "zookeeper-servers",
                    "zookeeper_config_file_path": "/etc/ch/ch/zookeeper-servers.xml"
                }),
            )
            .unwrap();

        assert!(out.contains("<path>/var/lib/ch/</path>"));
        assert!(!out.contains("/ignored/"));
        assert!(out.contains("<http_port>8123</http_port>"));
        assert!(out.contains("<users_config>users.xml</users_config>"));
        assert!(out.contains("<log>/var/log/ch/clickhouse-server.log</log>"));
        assert!(out.contains("<include_from>/etc/ch/ch/zookeeper-servers.xml</include_from>"));
        assert!(out.contains("<zookeeper incl=\"zookeeper-servers\""));
    }

    #[test]
    fn test_render_config_without_zookeeper() {
        let engine = TemplateEngine::builtin().unwrap();
        let out = engine
            .render(
                &TemplateSource::builtin("config.xml.tera"),
                &json!({
                    "config": {"users_config": "users.xml"},
                    "log_path": "/var/log/ch/",
                    "data_path": "/var/lib/ch/",
                    "temp_data_path": "/var/lib/ch/tmp/",
                    "format_schema_path": "/var/lib/ch/format_schemas/",
                    "user_files_path": "/var/lib/ch/user_files/"
                }),
            )
            .unwrap();
        assert!(!out.contains("include_from"));
        assert!(!out.contains("<zookeeper"));
    }
}
