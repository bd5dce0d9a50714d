// Copyright 2026 The tbx2cmake Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Builds the output tree of CMakeLists files from a processed
//! distribution and writes it out.

mod blocks;

use std::{
    collections::BTreeMap,
    fs::{create_dir_all, File},
    io::Write,
    path::{Component, Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use lazy_static::lazy_static;
use serde::Serialize;
use tera::Tera;

use crate::distribution::{Distribution, Module, Target};

lazy_static! {
    static ref TEMPLATES: Tera = {
        let mut tera: Tera = Default::default();
        tera.add_raw_template(
            "CMakeLists.txt",
            include_str!("templates/CMakeLists.txt.tera"),
        )
        .unwrap();
        tera
    };
}

#[derive(Serialize)]
struct CmakeListsContext {
    blocks: Vec<String>,
}

/// One output directory, keyed by its path segment.
struct OutputNode<'a> {
    children: BTreeMap<String, OutputNode<'a>>,
    module: Option<&'a Module>,
    targets: Vec<&'a Target>,
}

impl<'a> OutputNode<'a> {
    fn new() -> Self {
        OutputNode {
            children: BTreeMap::new(),
            module: None,
            targets: Vec::new(),
        }
    }

    /// Descends to (and creates) the node for a relative path.
    fn get_path(&mut self, relpath: &Path) -> Result<&mut OutputNode<'a>> {
        if relpath.is_absolute() {
            bail!("absolute path in output tree: {}", relpath.display());
        }
        let mut node = self;
        for component in relpath.components() {
            match component {
                Component::CurDir => {}
                Component::Normal(segment) => {
                    let segment = segment.to_string_lossy().into_owned();
                    node = node.children.entry(segment).or_insert_with(OutputNode::new);
                }
                _ => bail!(
                    "no relative referencing in output tree: {}",
                    relpath.display()
                ),
            }
        }
        Ok(node)
    }

    fn render(&self) -> Result<String> {
        let mut blocks: Vec<String> = Vec::new();

        if let Some(module) = self.module {
            let mut root_block = blocks::render_module_banner(module);
            if let Some(includes) = blocks::render_module_includes(module) {
                root_block.push_str("\n\n");
                root_block.push_str(&includes);
            }
            for target in &self.targets {
                if target.name == module.name {
                    root_block.push_str("\n\n");
                    root_block.push_str(&blocks::render_target(target));
                }
            }
            blocks.push(root_block);
        }

        for target in &self.targets {
            let inside_root = self
                .module
                .map(|module| target.name == module.name)
                .unwrap_or(false);
            if !inside_root {
                blocks.push(blocks::render_target(target));
            }
        }

        if !self.children.is_empty() {
            blocks.push(blocks::render_subdirectories(
                self.children.keys().map(|name| name.as_str()),
            ));
        }

        let context = CmakeListsContext { blocks };
        TEMPLATES
            .render(
                "CMakeLists.txt",
                &tera::Context::from_serialize(context)?,
            )
            .context("failed to render CMakeLists template")
    }

    fn write(&self, dir: &Path, is_root: bool) -> Result<()> {
        create_dir_all(dir).with_context(|| format!("mkdir -p {}", dir.display()))?;
        let filename = if is_root {
            "autogen_CMakeLists.txt"
        } else {
            "CMakeLists.txt"
        };
        let path = dir.join(filename);
        let mut file =
            File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;
        file.write_all(self.render()?.as_bytes())?;

        for (segment, child) in &self.children {
            child.write(&dir.join(segment), false)?;
        }
        Ok(())
    }

    fn draw(&self, label: &str, indent: &str, last: bool, out: &mut String) {
        let (marker, next_indent) = if indent.is_empty() {
            ("".to_string(), String::new())
        } else if last {
            (format!("{indent} └ "), format!("{indent}   "))
        } else {
            (format!("{indent} ├ "), format!("{indent} │ "))
        };
        out.push_str(&format!(
            "{marker}{label} ({} targets)\n",
            self.targets.len()
        ));
        let count = self.children.len();
        for (index, (segment, child)) in self.children.iter().enumerate() {
            child.draw(segment, &format!("{next_indent} "), index + 1 == count, out);
        }
    }
}

/// The assembled output tree for one distribution.
pub struct OutputTree<'a> {
    root: OutputNode<'a>,
}

/// Attaches every module at its root directory and every target at its
/// origin directory.
pub fn build_tree(dist: &Distribution) -> Result<OutputTree<'_>> {
    let mut root = OutputNode::new();

    for module in dist.modules() {
        let node = root.get_path(&module.path)?;
        node.module = Some(module);
    }

    for (_, target) in dist.targets() {
        let node = root.get_path(&target.origin_path)?;
        node.targets.push(target);
    }

    Ok(OutputTree { root })
}

impl OutputTree<'_> {
    /// Writes the whole tree under `output_dir`, overwriting existing
    /// files. The root file is named `autogen_CMakeLists.txt`; no
    /// root-orchestration file is emitted.
    pub fn write(&self, output_dir: &Path) -> Result<()> {
        self.root.write(output_dir, true)
    }

    /// A text sketch of the tree, for diagnostics.
    pub fn draw(&self) -> String {
        let mut out = String::new();
        self.root.draw("ROOT", "", true, &mut out);
        out
    }

    /// Renders the file for a relative directory without writing anything.
    pub fn render_path(&mut self, relpath: &Path) -> Result<String> {
        self.root.get_path(relpath)?.render()
    }
}

/// Convenience wrapper: builds the tree and writes it out.
pub fn write_distribution(dist: &Distribution, output_dir: &Path) -> Result<PathBuf> {
    let tree = build_tree(dist)?;
    tracing::debug!("Output tree:\n{}", tree.draw());
    tree.write(output_dir)?;
    Ok(output_dir.join("autogen_CMakeLists.txt"))
}
