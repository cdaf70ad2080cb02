//! Application configuration snapshot (`app/etc/config.php`).
//!
//! The snapshot is an arbitrarily nested structure. The build only needs a
//! few facts from it (locales, whether any website/store scopes exist), so it
//! is flattened into `path/to/leaf -> value` and queried by path prefix or
//! suffix.

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{IoContext, Result};
use crate::shell::{CommandRunner, shell_quote};

/// Locale that is always generated
pub const FALLBACK_LOCALE: &str = "en_US";

const GENERAL_LOCALE_SUFFIX: &str = "general/locale/code";
const ADMIN_LOCALE_PREFIX: &str = "admin_user/locale/code";
const WEBSITES_PREFIX: &str = "scopes/websites";
const STORES_PREFIX: &str = "scopes/stores";

/// Slash-joined key path to leaf value
pub type FlattenedConfig = BTreeMap<String, Value>;

/// Flatten nested objects and arrays. Array indices become path segments and
/// empty containers produce no entries.
pub fn flatten(value: &Value) -> FlattenedConfig {
    let mut flat = FlattenedConfig::new();
    flatten_into(value, "", &mut flat);
    flat
}

fn flatten_into(value: &Value, prefix: &str, flat: &mut FlattenedConfig) {
    let mut descend = |key: &str, child: &Value| {
        let path = format!("{prefix}{key}");
        match child {
            Value::Object(_) | Value::Array(_) => flatten_into(child, &format!("{path}/"), flat),
            leaf => {
                flat.insert(path, leaf.clone());
            }
        }
    };

    match value {
        Value::Object(map) => map.iter().for_each(|(k, v)| descend(k, v)),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .for_each(|(i, v)| descend(&i.to_string(), v)),
        _ => {}
    }
}

/// Entries whose path starts with `prefix`
pub fn with_prefix<'a>(
    flat: &'a FlattenedConfig,
    prefix: &'a str,
) -> impl Iterator<Item = (&'a String, &'a Value)> + 'a {
    flat.iter().filter(move |(path, _)| path.starts_with(prefix))
}

/// Entries whose path ends with `suffix`
pub fn with_suffix<'a>(
    flat: &'a FlattenedConfig,
    suffix: &'a str,
) -> impl Iterator<Item = (&'a String, &'a Value)> + 'a {
    flat.iter().filter(move |(path, _)| path.ends_with(suffix))
}

/// Flattened view of the configuration snapshot
#[derive(Debug, Clone, Default)]
pub struct ConfigSnapshot {
    flat: FlattenedConfig,
}

impl ConfigSnapshot {
    pub fn from_value(value: &Value) -> Self {
        Self {
            flat: flatten(value),
        }
    }

    /// Load the snapshot at `path`.
    ///
    /// A `.json` file is read directly. Anything else is treated as the PHP
    /// array file the application writes and dumped to JSON through `php`.
    pub fn load<R: CommandRunner + ?Sized>(path: &Path, runner: &mut R) -> Result<Self> {
        let json = if path.extension().is_some_and(|ext| ext == "json") {
            std::fs::read_to_string(path).at_path(path)?
        } else {
            let script = format!(
                "echo json_encode(require {});",
                php_string_literal(&path.display().to_string())
            );
            runner
                .execute(&format!("php -r {}", shell_quote(&script)))?
                .join("\n")
        };

        let value: Value = serde_json::from_str(&json)?;
        Ok(Self::from_value(&value))
    }

    pub fn flattened(&self) -> &FlattenedConfig {
        &self.flat
    }

    /// Locales to generate: global/store `general/locale/code` values, then
    /// admin user interface locales, then the fallback. Each code appears once,
    /// in order of first appearance. Codes with inner whitespace or control
    /// characters are dropped; each locale becomes one line of the fan-out.
    pub fn locales(&self) -> Vec<String> {
        let general = with_suffix(&self.flat, GENERAL_LOCALE_SUFFIX);
        let admin = with_prefix(&self.flat, ADMIN_LOCALE_PREFIX);

        let mut locales: Vec<String> = Vec::new();
        let candidates = general
            .chain(admin)
            .filter_map(|(_, value)| value.as_str())
            .chain(std::iter::once(FALLBACK_LOCALE));
        for code in candidates {
            let code = code.trim();
            if code.chars().any(|c| c.is_whitespace() || c.is_control()) {
                tracing::warn!("Ignoring malformed locale code {:?}", code);
                continue;
            }
            if !code.is_empty() && !locales.iter().any(|known| known == code) {
                locales.push(code.to_string());
            }
        }
        locales
    }

    pub fn website_entries(&self) -> usize {
        with_prefix(&self.flat, WEBSITES_PREFIX).count()
    }

    pub fn store_entries(&self) -> usize {
        with_prefix(&self.flat, STORES_PREFIX).count()
    }

    /// True when at least one website or store scope is configured
    pub fn has_scopes(&self) -> bool {
        self.website_entries() > 0 || self.store_entries() > 0
    }
}

fn php_string_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', r"\\").replace('\'', r"\'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "modules": {"Magento_Store": 1, "Magento_Theme": 1},
            "scopes": {
                "websites": {"admin": {"code": "admin"}, "base": {"code": "base"}},
                "stores": {"default": {"code": "default", "website_id": "1"}}
            },
            "system": {
                "default": {"general": {"locale": {"code": "de_DE"}}},
                "stores": {"french": {"general": {"locale": {"code": "fr_FR"}}}}
            },
            "admin_user": {"locale": {"code": ["en_GB", "de_DE"]}}
        })
    }

    #[test]
    fn test_flatten_joins_paths() {
        let flat = flatten(&sample());
        assert_eq!(flat["system/default/general/locale/code"], "de_DE");
        assert_eq!(flat["admin_user/locale/code/0"], "en_GB");
        assert_eq!(flat["admin_user/locale/code/1"], "de_DE");
        assert_eq!(flat["modules/Magento_Store"], 1);
    }

    #[test]
    fn test_flatten_drops_empty_containers() {
        let flat = flatten(&json!({"scopes": {"websites": {}, "stores": []}, "x": null}));
        assert_eq!(flat.len(), 1);
        assert!(flat.contains_key("x"));
    }

    #[test]
    fn test_flatten_scalar_root_is_empty() {
        assert!(flatten(&json!("just a string")).is_empty());
    }

    #[test]
    fn test_locales_deduplicated_with_fallback() {
        let snapshot = ConfigSnapshot::from_value(&sample());
        assert_eq!(snapshot.locales(), vec!["de_DE", "fr_FR", "en_GB", "en_US"]);
    }

    #[test]
    fn test_fallback_not_duplicated_when_configured() {
        let snapshot = ConfigSnapshot::from_value(&json!({
            "system": {"default": {"general": {"locale": {"code": "en_US"}}}},
            "admin_user": {"locale": {"code": "en_US"}}
        }));
        assert_eq!(snapshot.locales(), vec!["en_US"]);
    }

    #[test]
    fn test_locales_with_embedded_whitespace_dropped() {
        let snapshot = ConfigSnapshot::from_value(&json!({
            "system": {
                "default": {"general": {"locale": {"code": "de_DE\necho injected"}}},
                "stores": {
                    "a": {"general": {"locale": {"code": "fr FR"}}},
                    "b": {"general": {"locale": {"code": "nl_NL\t"}}},
                    "c": {"general": {"locale": {"code": "it_IT\u{7}"}}}
                }
            }
        }));
        assert_eq!(snapshot.locales(), vec!["nl_NL", "en_US"]);
    }

    #[test]
    fn test_scopes_detected() {
        let snapshot = ConfigSnapshot::from_value(&sample());
        assert_eq!(snapshot.website_entries(), 2);
        assert_eq!(snapshot.store_entries(), 2);
        assert!(snapshot.has_scopes());
    }

    #[test]
    fn test_no_scopes() {
        let snapshot = ConfigSnapshot::from_value(&json!({"modules": {"Magento_Store": 1}}));
        assert!(!snapshot.has_scopes());
        assert_eq!(snapshot.locales(), vec![FALLBACK_LOCALE]);
    }

    #[test]
    fn test_load_json_snapshot() {
        struct NoCommands;
        impl CommandRunner for NoCommands {
            fn execute(&mut self, command: &str) -> Result<Vec<String>> {
                panic!("unexpected command {command}");
            }
            fn background_execute(&mut self, _command: &str) {}
        }

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, sample().to_string()).unwrap();

        let snapshot = ConfigSnapshot::load(&path, &mut NoCommands).unwrap();
        assert!(snapshot.has_scopes());
    }

    #[test]
    fn test_load_php_snapshot_dumps_through_php() {
        struct FakePhp(Vec<String>);
        impl CommandRunner for FakePhp {
            fn execute(&mut self, command: &str) -> Result<Vec<String>> {
                self.0.push(command.to_string());
                Ok(vec![r#"{"scopes":{"stores":{"default":{"code":"default"}}}}"#.to_string()])
            }
            fn background_execute(&mut self, _command: &str) {}
        }

        let mut php = FakePhp(Vec::new());
        let snapshot = ConfigSnapshot::load(Path::new("app/etc/config.php"), &mut php).unwrap();

        assert_eq!(php.0.len(), 1);
        assert!(php.0[0].starts_with("php -r "));
        assert!(php.0[0].contains("app/etc/config.php"));
        assert_eq!(snapshot.store_entries(), 1);
    }
}
