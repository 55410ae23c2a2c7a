//! Compile type-hint trees into reusable runtime checks.
//!
//! The pipeline: build a [`hint::HintNode`] tree (directly or from the JSON
//! form in [`hint_de`]), compile it once into a parameter-agnostic
//! [`plan::CheckPlan`], bind the plan to a call-site name, then evaluate the
//! bound check against as many values as you like. Compilation is memoized by
//! tree identity in a bounded LRU cache behind [`checker::HintCompiler`].
//!
//! Checks run in O(1) relative to container size: a sequence check inspects
//! one pseudo-randomly sampled element per call rather than walking the whole
//! container, so non-conforming elements are caught probabilistically across
//! repeated calls instead of deterministically on the first.

pub mod cache;
pub mod checker;
pub mod cli;
pub mod compile;
pub mod hint;
pub mod hint_de;
pub mod plan;
pub mod snip;
pub mod value;
