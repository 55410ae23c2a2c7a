// Strongly-typed hint tree consumed by the compiler. No serde_json::Value here.

use std::fmt;
use std::sync::Arc;

use crate::value::{ClassHandle, Pith, TyCon};

/// Shared, immutable hint tree node. Trees are built once and never mutated;
/// the compiler caches plans keyed by the `Arc`'s pointer identity.
pub type HintRef = Arc<HintNode>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HintKind {
    /// Leaf: plain `isinstance` test against `origin`.
    Instance,
    /// Disjunction of child hints.
    Union,
    /// Equality against a fixed set of scalar sentinel values.
    Literal,
    /// Nominal composite: `origin` instance test plus every unerased
    /// pseudo-superclass child check.
    Generic,
    /// Single-parameter container; one pseudo-randomly sampled element is
    /// checked against the sole child.
    Sequence,
    /// Fixed-arity positional container; zero children is the explicit
    /// empty-tuple form.
    TupleFixed,
    /// Pith must be a class object subclassing `origin`.
    Subclass,
    /// Wrapped child hint plus caller-supplied validator predicates.
    Annotated,
    /// Leaf: named reference resolved against a `Scope` at bind time.
    ForwardRef,
}

/// Caller-supplied predicate attached to an `Annotated` hint. `expr` is the
/// rendering of the predicate; any `{pith}` marker inside it is substituted
/// with the depth-scoped variable during compilation. Distinct validator
/// objects yield distinct hint nodes and therefore distinct cached plans.
#[derive(Clone)]
pub struct Validator {
    pub expr: String,
    pub test: Arc<dyn Fn(&Pith) -> bool + Send + Sync>,
}

impl Validator {
    pub fn new(expr: impl Into<String>, test: impl Fn(&Pith) -> bool + Send + Sync + 'static) -> Self {
        Validator { expr: expr.into(), test: Arc::new(test) }
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator").field("expr", &self.expr).finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
pub struct HintNode {
    pub kind: HintKind,
    pub origin: Option<TyCon>,
    pub children: Vec<HintRef>,
    pub literals: Vec<Pith>,
    pub validators: Vec<Validator>,
    pub forward: Option<String>,
}

impl HintNode {
    fn leaf(kind: HintKind) -> HintNode {
        HintNode {
            kind,
            origin: None,
            children: Vec::new(),
            literals: Vec::new(),
            validators: Vec::new(),
            forward: None,
        }
    }

    pub fn instance(ty: TyCon) -> HintRef {
        let mut node = HintNode::leaf(HintKind::Instance);
        node.origin = Some(ty);
        Arc::new(node)
    }

    pub fn union(children: Vec<HintRef>) -> HintRef {
        let mut node = HintNode::leaf(HintKind::Union);
        node.children = children;
        Arc::new(node)
    }

    pub fn literal(values: Vec<Pith>) -> HintRef {
        let mut node = HintNode::leaf(HintKind::Literal);
        node.literals = values;
        Arc::new(node)
    }

    pub fn generic(origin: TyCon, supers: Vec<HintRef>) -> HintRef {
        let mut node = HintNode::leaf(HintKind::Generic);
        node.origin = Some(origin);
        node.children = supers;
        Arc::new(node)
    }

    /// Homogeneous sequence hint over the builtin `list` type.
    pub fn sequence(item: HintRef) -> HintRef {
        let mut node = HintNode::leaf(HintKind::Sequence);
        node.origin = Some(TyCon::Builtin(crate::value::Builtin::List));
        node.children = vec![item];
        Arc::new(node)
    }

    pub fn tuple(items: Vec<HintRef>) -> HintRef {
        let mut node = HintNode::leaf(HintKind::TupleFixed);
        node.origin = Some(TyCon::Builtin(crate::value::Builtin::List));
        node.children = items;
        Arc::new(node)
    }

    /// The explicit empty-tuple form: only a zero-length sequence conforms.
    pub fn empty_tuple() -> HintRef {
        HintNode::tuple(Vec::new())
    }

    pub fn subclass(of: ClassHandle) -> HintRef {
        let mut node = HintNode::leaf(HintKind::Subclass);
        node.origin = Some(TyCon::Class(of));
        Arc::new(node)
    }

    pub fn annotated(wrapped: HintRef, validators: Vec<Validator>) -> HintRef {
        let mut node = HintNode::leaf(HintKind::Annotated);
        node.children = vec![wrapped];
        node.validators = validators;
        Arc::new(node)
    }

    pub fn forward_ref(name: impl Into<String>) -> HintRef {
        let mut node = HintNode::leaf(HintKind::ForwardRef);
        node.forward = Some(name.into());
        Arc::new(node)
    }
}

/// Stable identity token for one hint tree object. Two structurally equal but
/// distinct trees have distinct ids; the same `Arc` always hashes the same.
/// Safe against allocator reuse because every cached plan owns its `HintRef`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HintId(usize);

impl HintId {
    pub fn of(hint: &HintRef) -> HintId {
        HintId(Arc::as_ptr(hint) as usize)
    }
}
