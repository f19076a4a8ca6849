#![doc = include_str!("../README.md")]

//! Weft intermediate representation.
//!
//! This crate defines the connector data model (ports, values, terms,
//! formulas, memory cells), the rules-based automaton with its synchronous
//! product, the hierarchical connector tree with the structural normalization
//! chain, and the diagnostics monitor threaded through every compilation
//! stage.

pub mod automaton;
pub mod connector;
pub mod formula;
pub mod monitor;
pub mod port;
#[cfg(any(test, feature = "proptest"))]
pub mod proptest_generators;
pub mod term;
pub mod value;
