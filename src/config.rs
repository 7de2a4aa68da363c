//! Service configuration.
//!
//! The only configurable behaviour is the removable-section rule set: which
//! class names, RDFa `typeof` values, and templates mark a subtree as
//! editorially irrelevant. The rules are loaded once at startup from a YAML
//! mapping and compiled into their matching form before the server accepts
//! requests; after that they are read-only and shared across workers.

use crate::lineardoc::{self, RemovableRules};
use serde::Deserialize;
use std::{path::Path, sync::Arc};

/// The configuration file schema.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Config {
    /// The removable-section rules.
    #[serde(default)]
    pub removable_sections: RemovableSections,
}

/// The `removableSections` mapping.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RemovableSections {
    /// Literal class names.
    #[serde(default)]
    pub classes: Vec<String>,
    /// Literal `typeof` values.
    #[serde(default)]
    pub rdfa: Vec<String>,
    /// Template names; `/…/`-bracketed entries are patterns.
    #[serde(default)]
    pub templates: Vec<String>,
}

/// A configuration error.
#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    /// The file could not be read.
    #[error("config read error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not a valid mapping.
    #[error("config parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A rule entry failed to compile.
    #[error(transparent)]
    Rules(#[from] lineardoc::Error),
}

impl Config {
    /// Loads the configuration from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        Ok(serde_yaml::from_str(&std::fs::read_to_string(path)?)?)
    }

    /// The compiled-in default rule set.
    pub fn builtin() -> Self {
        serde_yaml::from_str(include_str!("../res/config.yaml"))
            .expect("builtin config is valid")
    }

    /// Compiles the rules into their matching form.
    pub fn compile(&self) -> Result<Arc<RemovableRules>, Error> {
        Ok(Arc::new(RemovableRules::compile(
            self.removable_sections.classes.iter().cloned(),
            self.removable_sections.rdfa.iter().cloned(),
            &self.removable_sections.templates,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_config_compiles() {
        let config = Config::builtin();
        assert!(
            config
                .removable_sections
                .classes
                .iter()
                .any(|class| class == "ambox")
        );
        config.compile().unwrap();
    }

    #[test]
    fn test_partial_mapping_parses() {
        let config: Config =
            serde_yaml::from_str("removableSections:\n  classes: [navbox]\n").unwrap();
        assert_eq!(config.removable_sections.classes, vec!["navbox"]);
        assert!(config.removable_sections.templates.is_empty());
    }
}
