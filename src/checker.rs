//! Front API: memoizing compiler facade.
//!
//! `HintCompiler` owns the shared LRU plan cache behind a mutex, providing
//! the get / miss / compile / put discipline the bare cache does not. Keys
//! are hint-tree identities: recompiling the very same `Arc` hits, while a
//! structurally equal but distinct tree may compile again (documented,
//! acceptable duplication).

use std::sync::{Arc, Mutex, PoisonError};

use once_cell::sync::Lazy;

use crate::cache::{CapacityError, LruCache};
use crate::compile::{compile_hint, CompileError};
use crate::hint::{HintId, HintRef};
use crate::plan::CheckPlan;

/// Capacity of the process-wide default compiler.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

pub struct HintCompiler {
    cache: Mutex<LruCache<HintId, Arc<CheckPlan>>>,
}

impl HintCompiler {
    pub fn new(capacity: usize) -> Result<Self, CapacityError> {
        Ok(HintCompiler { cache: Mutex::new(LruCache::new(capacity)?) })
    }

    /// Compile a hint tree, memoized by tree identity.
    ///
    /// The actual compilation runs outside the cache lock: two threads that
    /// miss on the same tree may both compile it, and the later put refreshes
    /// recency. Duplicate work, never a corrupt or partial entry.
    pub fn compile(&self, hint: &HintRef) -> Result<Arc<CheckPlan>, CompileError> {
        let key = HintId::of(hint);
        {
            let mut cache = self.lock();
            if let Some(plan) = cache.get(&key) {
                return Ok(plan.clone());
            }
        }
        let plan = Arc::new(compile_hint(hint)?);
        self.lock().put(key, plan.clone());
        Ok(plan)
    }

    pub fn cached_len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<HintId, Arc<CheckPlan>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Process-wide compiler shared by the CLI and any embedder that does not
/// need its own capacity.
pub fn default_compiler() -> &'static HintCompiler {
    static COMPILER: Lazy<HintCompiler> = Lazy::new(|| {
        match HintCompiler::new(DEFAULT_CACHE_CAPACITY) {
            Ok(c) => c,
            // Unreachable: the default capacity is a positive constant.
            Err(err) => unreachable!("default compiler capacity rejected: {err}"),
        }
    });
    &COMPILER
}

// ------------------------------- Tests ------------------------------------ //
