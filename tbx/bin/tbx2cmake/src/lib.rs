// Copyright 2026 The tbx2cmake Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Converts a libtbx/SCons-driven source distribution into a declarative
//! CMakeLists tree.
//!
//! The legacy build is script-driven: each module's `SConscript`
//! programmatically registers libraries, programs and flags against a
//! mutable environment. The converter therefore *executes* those scripts —
//! inside an embedded interpreter whose injected surface impersonates the
//! legacy runtime — records every declaration, post-processes the recorded
//! graph, and renders it as CMake files.
//!
//! Executing build scripts means running developer-authored code from disk;
//! that is the point, not an accident, and nothing here tries to sandbox it
//! beyond the limits of the script dialect itself.

pub mod autogen;
pub mod discovery;
pub mod distribution;
pub mod emulator;
pub mod output;
pub mod pathutil;
pub mod postprocess;
pub mod reader;
pub mod script;
pub mod testutils;
