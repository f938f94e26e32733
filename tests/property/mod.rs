// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests Module
//!
//! Laws of rehydration and persistence that must hold for every event
//! sequence an aggregate can produce.

mod rehydration;
