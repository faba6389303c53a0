// ABOUTME: Selector DSL, filter registries and record extraction.
// ABOUTME: Everything that turns a parsed page plus selector strings into values and records.

//! Extraction module.
//!
//! Submodules:
//! - `directive`: the selector DSL compiler.
//! - `select`: evaluates one directive against an element or document.
//! - `records`: scope scanning into records, field maps, the emptiness filter.
//! - `filters`: instance/global filter registries.
//! - `builtin`: the built-in filter set.
//! - `compiled`: cache for scope selectors.

pub mod builtin;
pub mod compiled;
pub mod directive;
pub mod filters;
pub mod records;
pub mod select;
