#![doc = include_str!("../README.md")]

//! Weft synthesis engine.
//!
//! The passes in this crate take a normalized connector, compose the protocol
//! automaton, rewrite each rule into a deterministic guarded command,
//! partition the commands into protocol components, and assemble the
//! component list consumed by the template assembler.

pub mod command;
pub mod component;
pub mod emit;
pub mod partition;
pub mod pipeline;
