// Copyright 2026 The tbx2cmake Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Rendering of the individual declaration blocks inside a CMakeLists file.

use itertools::Itertools;

use crate::distribution::{Module, Target, TargetType};

/// Dependency names differ between the legacy build and the imported
/// packages of the emitted one.
const DEPENDENCY_RENAMES: &[(&str, &str)] = &[
    ("boost_python", "Boost::python"),
    ("boost_thread", "Boost::thread"),
    ("tiff", "TIFF::TIFF"),
    ("GL", "OpenGL::GL"),
    ("GLU", "OpenGL::GLU"),
    ("hdf5_c", "HDF5::C"),
    ("boost", "Boost::boost"),
    ("eigen", "Eigen::Eigen"),
];

/// Dependencies that may be absent from the build; targets linking them are
/// guarded.
const OPTIONAL_DEPENDENCIES: &[&str] = &["boost_thread", "GL", "GLU"];

const MAX_LINE: usize = 78;

pub fn rename_dependency(name: &str) -> &str {
    DEPENDENCY_RENAMES
        .iter()
        .find(|(from, _)| *from == name)
        .map(|(_, to)| *to)
        .unwrap_or(name)
}

/// Renders one command invocation; long invocations wrap with the items on
/// continuation lines and the closing bracket on its own line.
fn format_command(command: &str, head: &[&str], items: &[String]) -> String {
    let single = format!(
        "{}({})",
        command,
        head.iter()
            .copied()
            .map(str::to_string)
            .chain(items.iter().cloned())
            .join(" ")
    );
    if single.len() <= MAX_LINE {
        return single;
    }
    let mut out = format!("{}({}", command, head.join(" "));
    for item in items {
        out.push_str("\n    ");
        out.push_str(item);
    }
    out.push_str("\n)");
    out
}

fn map_include_path(entry: &str) -> String {
    if entry == "#base" {
        return "${CMAKE_SOURCE_DIR}".to_string();
    }
    if let Some(rest) = entry.strip_prefix("#base/") {
        return format!("${{CMAKE_SOURCE_DIR}}/{rest}");
    }
    if entry == "#build" {
        return "${CMAKE_BINARY_DIR}".to_string();
    }
    if let Some(rest) = entry.strip_prefix("#build/") {
        return format!("${{CMAKE_BINARY_DIR}}/{rest}");
    }
    entry.to_string()
}

/// The banner that opens a module's root CMakeLists file.
pub fn render_module_banner(module: &Module) -> String {
    format!("# === module {} ===", module.name)
}

/// Module-level include paths apply to the whole module directory, so they
/// render as a directory-scoped declaration in the module's root file
/// regardless of which targets the module carries. The `!` private marker
/// has no meaning at directory scope and is dropped.
pub fn render_module_includes(module: &Module) -> Option<String> {
    if module.include_paths.is_empty() {
        return None;
    }
    let paths: Vec<String> = module
        .include_paths
        .iter()
        .map(|entry| map_include_path(entry.trim_start_matches('!')))
        .collect();
    Some(format_command("include_directories", &[], &paths))
}

/// Renders the full declaration block for one target.
pub fn render_target(target: &Target) -> String {
    let mut commands: Vec<String> = Vec::new();

    let sources: Vec<String> = target.sources.clone();
    match target.target_type {
        TargetType::Program => {
            commands.push(format_command("add_executable", &[&target.name], &sources));
        }
        TargetType::Module => {
            commands.push(format_command(
                "add_python_library",
                &[&target.name],
                &sources,
            ));
        }
        TargetType::Shared => {
            commands.push(format_command(
                "add_library",
                &[&target.name, "SHARED"],
                &sources,
            ));
        }
        TargetType::Static => {
            commands.push(format_command(
                "add_library",
                &[&target.name, "STATIC"],
                &sources,
            ));
        }
    }

    if !target.generated_sources.is_empty() {
        let generated: Vec<String> = target
            .generated_sources
            .iter()
            .map(|path| format!("${{CMAKE_BINARY_DIR}}/{path}"))
            .collect();
        commands.push(format_command(
            "target_sources",
            &[&target.name, "PRIVATE"],
            &generated,
        ));
    }

    let (private, public): (Vec<&str>, Vec<&str>) = target
        .include_paths
        .iter()
        .map(|entry| entry.as_str())
        .partition(|entry| entry.starts_with('!'));
    if !public.is_empty() || !private.is_empty() {
        let mut args: Vec<String> = Vec::new();
        if !public.is_empty() {
            args.push("PUBLIC".to_string());
            args.extend(public.iter().map(|entry| map_include_path(entry)));
        }
        if !private.is_empty() {
            args.push("PRIVATE".to_string());
            args.extend(
                private
                    .iter()
                    .map(|entry| map_include_path(entry.trim_start_matches('!'))),
            );
        }
        commands.push(format_command(
            "target_include_directories",
            &[&target.name],
            &args,
        ));
    }

    if target.filename != target.name {
        commands.push(format_command(
            "set_target_properties",
            &[&target.name, "PROPERTIES", "OUTPUT_NAME"],
            &[target.filename.clone()],
        ));
    }

    let deps: Vec<String> = target
        .extra_libs
        .iter()
        // A python extension's python linkage is implied by its form.
        .filter(|dep| {
            !(target.target_type == TargetType::Module && dep.as_str() == "boost_python")
        })
        .map(|dep| rename_dependency(dep).to_string())
        .collect();
    if !deps.is_empty() {
        commands.push(format_command(
            "target_link_libraries",
            &[&target.name, "PUBLIC"],
            &deps,
        ));
    }

    let guards: Vec<String> = target
        .extra_libs
        .iter()
        .filter(|dep| OPTIONAL_DEPENDENCIES.contains(&dep.as_str()))
        .map(|dep| format!("TARGET {}", rename_dependency(dep)))
        .collect();

    let body = commands.join("\n");
    if guards.is_empty() {
        body
    } else {
        format!("if({})\n{}\nendif()", guards.join(" AND "), body)
    }
}

/// The subdirectory traversal block.
pub fn render_subdirectories<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names
        .map(|name| format!("add_subdirectory({name})"))
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn module(name: &str) -> Module {
        Module::new(name, PathBuf::from(name))
    }

    fn shared_target(name: &str) -> Target {
        let mut target = Target::new(name, TargetType::Shared, PathBuf::from("mod"));
        target.prefix = "lib".to_string();
        target
    }

    #[test]
    fn short_declarations_stay_on_one_line() {
        let mut target = shared_target("util");
        target.sources = vec!["a.cpp".to_string()];
        assert_eq!(
            render_target(&target),
            "add_library(util SHARED a.cpp)"
        );
    }

    #[test]
    fn long_declarations_wrap_at_78_columns() {
        let mut target = shared_target("a_library_with_a_fairly_long_name");
        target.sources = (0..4)
            .map(|i| format!("some/deeply/nested/source_file_{i}.cpp"))
            .collect();
        let rendered = render_target(&target);
        let expected = "add_library(a_library_with_a_fairly_long_name SHARED\n    \
                        some/deeply/nested/source_file_0.cpp\n    \
                        some/deeply/nested/source_file_1.cpp\n    \
                        some/deeply/nested/source_file_2.cpp\n    \
                        some/deeply/nested/source_file_3.cpp\n)";
        assert_eq!(rendered, expected);
        assert!(rendered.lines().all(|line| line.len() <= 78));
    }

    #[test]
    fn python_extensions_use_the_python_form_and_drop_the_python_link() {
        let mut target = Target::new("ext", TargetType::Module, PathBuf::from("mod"));
        target.sources = vec!["ext.cpp".to_string()];
        target.extra_libs =
            ["boost_python".to_string(), "cctbx".to_string()].into_iter().collect();
        let rendered = render_target(&target);
        assert!(rendered.contains("add_python_library(ext ext.cpp)"));
        assert!(rendered.contains("target_link_libraries(ext PUBLIC cctbx)"));
        assert!(!rendered.contains("Boost::python"));
    }

    #[test]
    fn optional_dependencies_guard_the_block() {
        let mut target = shared_target("gl_helper");
        target.sources = vec!["gl.cpp".to_string()];
        target.extra_libs = ["GL".to_string(), "GLU".to_string()].into_iter().collect();
        let rendered = render_target(&target);
        assert!(rendered.starts_with("if(TARGET OpenGL::GL AND TARGET OpenGL::GLU)\n"));
        assert!(rendered.ends_with("\nendif()"));
        assert!(rendered.contains("target_link_libraries(gl_helper PUBLIC OpenGL::GL OpenGL::GLU)"));
    }

    #[test]
    fn include_paths_split_public_and_private() {
        let mut target = shared_target("inc");
        target.sources = vec!["i.cpp".to_string()];
        target.include_paths = ["!secret".to_string(), "#base/inc".to_string()]
            .into_iter()
            .collect();
        let rendered = render_target(&target);
        assert!(rendered.contains(
            "target_include_directories(inc PUBLIC ${CMAKE_SOURCE_DIR}/inc PRIVATE secret)"
        ));
    }

    #[test]
    fn generated_sources_reference_the_build_root() {
        let mut target = shared_target("gen");
        target.sources = vec!["g.cpp".to_string()];
        target
            .generated_sources
            .insert("generated/foo.cpp".to_string());
        let rendered = render_target(&target);
        assert!(rendered
            .contains("target_sources(gen PRIVATE ${CMAKE_BINARY_DIR}/generated/foo.cpp)"));
    }

    #[test]
    fn module_includes_render_directory_scoped() {
        let mut quiet = module("quiet");
        assert_eq!(render_module_includes(&quiet), None);
        quiet.include_paths = ["!private_inc".to_string(), "#build/include".to_string()]
            .into_iter()
            .collect();
        assert_eq!(
            render_module_includes(&quiet).unwrap(),
            "include_directories(private_inc ${CMAKE_BINARY_DIR}/include)"
        );
    }

    #[test]
    fn renamed_output_files_keep_their_stem() {
        let mut target = shared_target("util_alpha");
        target.filename = "util".to_string();
        target.sources = vec!["u.cpp".to_string()];
        let rendered = render_target(&target);
        assert!(rendered
            .contains("set_target_properties(util_alpha PROPERTIES OUTPUT_NAME util)"));
    }
}
