// Copyright 2026 The tbx2cmake Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Schema for the autogen YAML file: externally maintained data about
//! generated sources, forced dependencies and include paths that cannot be
//! recovered from the build scripts alone.

use std::collections::BTreeMap;
use std::fs::read_to_string;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// A YAML value that may be written as a single string or a list of them.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum StringOrList {
    One(String),
    Many(Vec<String>),
}

impl StringOrList {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        match self {
            StringOrList::One(value) => std::slice::from_ref(value).iter(),
            StringOrList::Many(values) => values.iter(),
        }
        .map(|value| value.as_str())
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AutogenSpec {
    /// module name → source paths produced by that module's refresh step.
    #[serde(default)]
    pub libtbx_refresh: BTreeMap<String, Vec<String>>,

    /// Extra generated source paths not tied to a refresh step.
    #[serde(default)]
    pub other_generated: Vec<String>,

    /// target name → dependency names to union into its link set.
    #[serde(default)]
    pub dependencies: BTreeMap<String, StringOrList>,

    /// target or module name → include path entries. Entries may start with
    /// `!` for private, `#base` for the distribution root and `#build` for
    /// the build root.
    #[serde(default)]
    pub target_includes: BTreeMap<String, StringOrList>,
}

impl AutogenSpec {
    pub fn load(path: &Path) -> Result<Self> {
        let text = read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_yaml::from_str(&text)
            .with_context(|| format!("failed to parse {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::write_files;

    #[test]
    fn parses_the_schema() {
        let dir = tempfile::tempdir().unwrap();
        write_files(
            dir.path(),
            [(
                "autogen.yaml",
                "libtbx_refresh:\n\
                 \x20 scitbx: [generated/foo.cpp]\n\
                 other_generated:\n\
                 \x20 - extra/bar.cpp\n\
                 dependencies:\n\
                 \x20 cctbx: boost_python\n\
                 \x20 scitbx:\n\
                 \x20   - tiff\n\
                 \x20   - GL\n\
                 target_includes:\n\
                 \x20 annlib: '!include'\n",
            )],
        )
        .unwrap();
        let spec = AutogenSpec::load(&dir.path().join("autogen.yaml")).unwrap();
        assert_eq!(spec.libtbx_refresh["scitbx"], vec!["generated/foo.cpp"]);
        assert_eq!(
            spec.dependencies["cctbx"].iter().collect::<Vec<_>>(),
            vec!["boost_python"]
        );
        assert_eq!(
            spec.dependencies["scitbx"].iter().collect::<Vec<_>>(),
            vec!["tiff", "GL"]
        );
        assert_eq!(spec.other_generated, vec!["extra/bar.cpp"]);
        assert_eq!(
            spec.target_includes["annlib"].iter().collect::<Vec<_>>(),
            vec!["!include"]
        );
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        write_files(dir.path(), [("autogen.yaml", "other_generated: []\n")]).unwrap();
        let spec = AutogenSpec::load(&dir.path().join("autogen.yaml")).unwrap();
        assert!(spec.libtbx_refresh.is_empty());
        assert!(spec.dependencies.is_empty());
    }
}
