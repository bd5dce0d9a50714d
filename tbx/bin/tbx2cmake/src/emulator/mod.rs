// Copyright 2026 The tbx2cmake Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The legacy-build emulation surface: a sandboxed impersonation of the
//! SCons/libtbx runtime that records target declarations instead of
//! building anything.

pub mod configure;
pub mod dispatcher;
pub mod env;
pub mod stubs;

pub use dispatcher::SconsEmulator;
