//! Compiled check plans: a typed predicate tree plus its cached source
//! rendering. Plans are parameter-agnostic; `bind` specializes one to a named
//! call site and resolves forward references, after which the bound check can
//! be evaluated any number of times, from any thread.

use std::cell::Cell;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::hint::{HintRef, Validator};
use crate::snip;
use crate::value::{isinstance, Builtin, ClassHandle, Pith, Scope, TyCon, TypeRegistry};

// ------------------------------ Plan tree --------------------------------- //

#[derive(Debug)]
pub enum PlanNode {
    Instance(TyCon),
    /// Plain members are tested as one batched membership check before any
    /// polymorphic member runs. Short-circuits left to right.
    Union { plain: Vec<TyCon>, poly: Vec<PlanNode> },
    /// Kind membership first (cheap), then equality per literal.
    Literal { kinds: Vec<Builtin>, values: Vec<Pith> },
    Generic { origin: TyCon, supers: Vec<PlanNode> },
    /// Exactly one pseudo-randomly sampled element is checked; empty
    /// sequences pass vacuously.
    Sequence { item: Box<PlanNode> },
    /// Zero elements is the explicit empty-tuple form.
    TupleFixed { elems: Vec<PlanNode> },
    Subclass { origin: ClassHandle },
    Annotated { wrapped: Box<PlanNode>, validators: Vec<Validator> },
    /// Index into the bound check's resolved-type table.
    ForwardRef { slot: usize },
}

struct CheckCtx<'a> {
    /// Single draw shared by every sequence node in one top-level check.
    random: u64,
    /// Set when a sequence node actually samples an element, so violations
    /// only report the draw on paths where it participated.
    sampled: Cell<bool>,
    resolved: &'a [TyCon],
    registry: &'a TypeRegistry,
}

impl PlanNode {
    fn matches(&self, pith: &Pith, ctx: &CheckCtx<'_>) -> bool {
        match self {
            PlanNode::Instance(ty) => isinstance(pith, ty, ctx.registry),
            PlanNode::Union { plain, poly } => {
                plain.iter().any(|ty| isinstance(pith, ty, ctx.registry))
                    || poly.iter().any(|child| child.matches(pith, ctx))
            }
            PlanNode::Literal { kinds, values } => {
                pith.kind().is_some_and(|k| kinds.contains(&k))
                    && values.iter().any(|v| v == pith)
            }
            PlanNode::Generic { origin, supers } => {
                isinstance(pith, origin, ctx.registry)
                    && supers.iter().all(|child| child.matches(pith, ctx))
            }
            PlanNode::Sequence { item } => match pith {
                Pith::List(xs) => {
                    xs.is_empty() || {
                        ctx.sampled.set(true);
                        let idx = (ctx.random % xs.len() as u64) as usize;
                        item.matches(&xs[idx], ctx)
                    }
                }
                _ => false,
            },
            PlanNode::TupleFixed { elems } => match pith {
                Pith::List(xs) => {
                    xs.len() == elems.len()
                        && elems.iter().zip(xs).all(|(e, x)| e.matches(x, ctx))
                }
                _ => false,
            },
            PlanNode::Subclass { origin } => match pith {
                Pith::Class(id) => ctx.registry.is_subclass(*id, origin.id),
                _ => false,
            },
            PlanNode::Annotated { wrapped, validators } => {
                wrapped.matches(pith, ctx) && validators.iter().all(|v| (v.test)(pith))
            }
            PlanNode::ForwardRef { slot } => isinstance(pith, &ctx.resolved[*slot], ctx.registry),
        }
    }
}

// ------------------------------ CheckPlan --------------------------------- //

/// Finished compilation artifact for one hint tree. Owns the `HintRef` it was
/// compiled from, so an identity cache key can never dangle while the plan is
/// cached.
#[derive(Debug)]
pub struct CheckPlan {
    pub(crate) hint: HintRef,
    pub(crate) root: PlanNode,
    pub(crate) source: String,
    pub(crate) slot_names: Vec<String>,
    pub(crate) needs_random: bool,
}

impl CheckPlan {
    pub fn hint(&self) -> &HintRef {
        &self.hint
    }

    /// Parameter-agnostic rendering: root pith and forward references are
    /// still placeholders, child slots are already spliced.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Forward-reference names in slot order.
    pub fn forward_names(&self) -> &[String] {
        &self.slot_names
    }

    pub fn needs_random(&self) -> bool {
        self.needs_random
    }

    /// Specialize this plan to a call site: resolve every forward reference
    /// against `scope` and substitute the root pith name into the rendering.
    /// Both substitutions are pure string replacement over the cached source,
    /// so one plan serves any number of call sites.
    pub fn bind(self: &Arc<Self>, root_name: &str, scope: &Scope) -> Result<BoundCheck, BindError> {
        let mut resolved = Vec::with_capacity(self.slot_names.len());
        let mut source = snip::substitute_root(&self.source, root_name);
        for name in &self.slot_names {
            let ty = scope
                .resolve(name)
                .ok_or_else(|| BindError::UnresolvedForwardRef(name.clone()))?;
            source = source.replace(snip::forwardref_slot(name).as_str(), &ty.to_string());
            resolved.push(ty.clone());
        }
        Ok(BoundCheck {
            plan: self.clone(),
            resolved,
            root_name: root_name.to_string(),
            source,
        })
    }
}

#[derive(Debug, Error)]
pub enum BindError {
    #[error("unresolved forward reference `{0}`")]
    UnresolvedForwardRef(String),
}

// ------------------------------ BoundCheck -------------------------------- //

/// A plan specialized to one parameter or return name. Evaluation is
/// read-only and freely parallel.
#[derive(Debug)]
pub struct BoundCheck {
    plan: Arc<CheckPlan>,
    resolved: Vec<TyCon>,
    root_name: String,
    source: String,
}

impl BoundCheck {
    /// Fully substituted rendering for this call site.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root_name(&self) -> &str {
        &self.root_name
    }

    /// Check a value, drawing the shared random integer for this call.
    pub fn check(&self, pith: &Pith, registry: &TypeRegistry) -> Result<(), Violation> {
        self.check_with_random(pith, registry, rand::random::<u64>())
    }

    /// Deterministic entry point: the caller supplies the draw that every
    /// sequence node in this check will share. Mixed-conformance sequences
    /// pass or fail depending on which element the draw selects; fully
    /// conforming and fully non-conforming sequences are draw-independent.
    pub fn check_with_random(
        &self,
        pith: &Pith,
        registry: &TypeRegistry,
        random: u64,
    ) -> Result<(), Violation> {
        let ctx = CheckCtx {
            random,
            sampled: Cell::new(false),
            resolved: &self.resolved,
            registry,
        };
        if self.plan.root.matches(pith, &ctx) {
            Ok(())
        } else {
            Err(Violation {
                name: self.root_name.clone(),
                value: pith.to_string(),
                random: ctx.sampled.get().then_some(random),
            })
        }
    }
}

// ------------------------------ Violation --------------------------------- //

/// A conformance failure. Deliberately not an error type: generated checks
/// never raise, they evaluate false, and the caller decides how to surface
/// that. Carries the sampling draw so messages can name the exact element
/// that was inspected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub name: String,
    pub value: String,
    pub random: Option<u64>,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {} does not satisfy its type hint", self.name, self.value)?;
        if let Some(r) = self.random {
            write!(f, " (sampled with random integer {r})")?;
        }
        Ok(())
    }
}

// ------------------------------- Tests ------------------------------------ //
