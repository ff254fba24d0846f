//! Translations
//!
//! Messages live in YAML files under the locales directory, one file per
//! language with the locale as top-level key:
//!
//! ```yaml
//! en:
//!   tickets:
//!     not_found: "Ticket not found"
//! ```
//!
//! Nested keys are flattened to dotted keys (`tickets.not_found`). Lookups
//! fall back to the default locale and finally to the key itself.

use anyhow::{Context, Result};
use serde_yaml::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::config::I18nConfig;

/// English messages compiled into the binary, used when the locales
/// directory is missing.
const BUILTIN_EN: &str = include_str!("../../locales/en.yml");

/// Loaded translations for every locale
#[derive(Debug, Clone)]
pub struct Translator {
    default_locale: String,
    /// locale -> dotted key -> message
    messages: HashMap<String, HashMap<String, String>>,
}

impl Translator {
    /// An empty translator
    pub fn new(default_locale: impl Into<String>) -> Self {
        Self {
            default_locale: default_locale.into(),
            messages: HashMap::new(),
        }
    }

    /// Load every `*.yml` / `*.yaml` file of the configured directory.
    ///
    /// Falls back to the built-in English messages when the directory does
    /// not exist. A file that fails to parse is an error.
    pub fn load(config: &I18nConfig) -> Result<Self> {
        let mut translator = Self::new(config.default_locale.clone());

        if !config.locales_path.exists() {
            warn!(
                "Locales directory {:?} not found; using built-in messages",
                config.locales_path
            );
            translator.add_yaml(BUILTIN_EN)?;
            return Ok(translator);
        }

        translator.load_dir(&config.locales_path)?;
        if !translator.has_locale(&translator.default_locale) {
            warn!(
                "Default locale '{}' has no messages",
                translator.default_locale
            );
        }
        Ok(translator)
    }

    /// Translator with only the built-in English messages
    pub fn builtin() -> Self {
        let mut translator = Self::new("en");
        // Compiled-in file; covered by tests
        if let Err(e) = translator.add_yaml(BUILTIN_EN) {
            warn!("Built-in locale failed to parse: {}", e);
        }
        translator
    }

    fn load_dir(&mut self, dir: &Path) -> Result<()> {
        let entries = fs::read_dir(dir)
            .with_context(|| format!("Failed to read locales directory {:?}", dir))?;

        let mut paths: Vec<_> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .is_some_and(|ext| ext == "yml" || ext == "yaml")
            })
            .collect();
        // Later files override earlier ones for the same key
        paths.sort();

        for path in paths {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read locale file {:?}", path))?;
            self.add_yaml(&content)
                .with_context(|| format!("Invalid locale file {:?}", path))?;
            info!("Loaded locale file {:?}", path);
        }
        Ok(())
    }

    /// Merge messages from a YAML document into the translator
    pub fn add_yaml(&mut self, content: &str) -> Result<()> {
        let doc: Value = serde_yaml::from_str(content).context("Failed to parse YAML")?;
        let Value::Mapping(locales) = doc else {
            anyhow::bail!("Locale file must be a mapping of locale to messages");
        };

        for (locale, tree) in locales {
            let Some(locale) = scalar_to_string(&locale) else {
                continue;
            };
            let table = self.messages.entry(locale).or_default();
            flatten(String::new(), &tree, table);
        }
        Ok(())
    }

    pub fn default_locale(&self) -> &str {
        &self.default_locale
    }

    pub fn has_locale(&self, locale: &str) -> bool {
        self.messages.contains_key(locale)
    }

    /// Look up a message without interpolation
    pub fn t(&self, locale: &str, key: &str) -> String {
        self.translate(locale, key, &[])
    }

    /// Look up a message and replace `%{name}` placeholders with `args`.
    pub fn translate(&self, locale: &str, key: &str, args: &[(&str, &str)]) -> String {
        let message = self
            .lookup(locale, key)
            .or_else(|| self.lookup(&self.default_locale, key))
            .unwrap_or(key);

        args.iter().fold(message.to_string(), |acc, (name, value)| {
            acc.replace(&format!("%{{{}}}", name), value)
        })
    }

    fn lookup(&self, locale: &str, key: &str) -> Option<&str> {
        self.messages
            .get(locale)
            .and_then(|table| table.get(key))
            .map(String::as_str)
    }

    /// Choose a locale from an `Accept-Language` header.
    ///
    /// Only the first language tag is considered. `es-AR` matches `es` when
    /// there is no `es-AR` table. Anything else yields the default locale.
    pub fn negotiate(&self, accept_language: Option<&str>) -> String {
        let Some(first) = accept_language
            .and_then(|header| header.split(',').next())
            .map(|tag| tag.split(';').next().unwrap_or(tag).trim())
            .filter(|tag| !tag.is_empty() && *tag != "*")
        else {
            return self.default_locale.clone();
        };

        if self.has_locale(first) {
            return first.to_string();
        }
        let primary = first.split('-').next().unwrap_or(first).to_lowercase();
        if self.has_locale(&primary) {
            return primary;
        }
        self.default_locale.clone()
    }
}

fn flatten(prefix: String, value: &Value, out: &mut HashMap<String, String>) {
    match value {
        Value::Mapping(map) => {
            for (key, child) in map {
                let Some(key) = scalar_to_string(key) else {
                    continue;
                };
                let path = if prefix.is_empty() {
                    key
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten(path, child, out);
            }
        }
        other => {
            if let Some(text) = scalar_to_string(other) {
                if !prefix.is_empty() {
                    out.insert(prefix, text);
                }
            }
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
