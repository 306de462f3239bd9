// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Configuration module for Slaick
//!
//! Handles loading, saving, and layering environment variables over user settings.

pub mod settings;

pub use settings::*;
