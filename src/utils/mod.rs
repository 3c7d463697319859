// src/utils/mod.rs
mod deadline;

pub(crate) use deadline::*;
