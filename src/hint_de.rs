//! Declarative JSON form of hint trees, for the CLI and config files.
//!
//! The compiler itself consumes already-built `HintNode` trees; this module
//! is the thin boundary that turns a JSON description into one. Parsing goes
//! through `serde_path_to_error` so a malformed spec reports the JSON path
//! that broke, not just the line/column.
//!
//! Nominal kinds (`subclass`, `generic`, class-valued `ref`) resolve their
//! names against a `Scope`; a bare builtins scope rejects them. Class
//! declarations have their own JSON form (`TypeDecls`) from which a
//! `TypeRegistry` and its scope are built.

use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;

use crate::hint::{HintNode, HintRef, Validator};
use crate::value::{Pith, RegistryError, Scope, TyCon, TypeRegistry};

#[derive(Debug, Error)]
pub enum HintSpecError {
    #[error("at JSON path {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown type name `{0}`")]
    UnknownType(String),
    #[error("literal value {0} is not a scalar (null, bool, int, or str)")]
    BadLiteral(String),
    #[error("`{0}` must name a registered class, not a builtin")]
    NotAClass(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

// ------------------------------- Spec form -------------------------------- //

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum HintSpec {
    /// `{"kind": "instance", "of": "int"}`
    Instance { of: String },
    /// `{"kind": "union", "any": [..]}`
    Union { any: Vec<HintSpec> },
    /// `{"kind": "literal", "values": [1, "a"]}`
    Literal { values: Vec<serde_json::Value> },
    /// `{"kind": "sequence", "item": {..}}`
    Sequence { item: Box<HintSpec> },
    /// `{"kind": "tuple", "items": [..]}`; empty `items` is the empty-tuple form
    Tuple { items: Vec<HintSpec> },
    /// `{"kind": "subclass", "of": "Animal"}`
    Subclass { of: String },
    /// `{"kind": "generic", "of": "Window", "supers": [..]}`
    Generic { of: String, supers: Vec<HintSpec> },
    /// `{"kind": "annotated", "base": {..}, "rules": [..]}`
    Annotated { base: Box<HintSpec>, rules: Vec<RuleSpec> },
    /// `{"kind": "ref", "name": "Widget"}`: resolved at bind time
    Ref { name: String },
}

/// Named validator rules expressible in JSON.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "rule", rename_all = "kebab-case")]
pub enum RuleSpec {
    NonEmpty,
    Ge { bound: f64 },
    Le { bound: f64 },
    LenEq { len: usize },
}

/// Deserialize a hint spec with JSON-path context in error messages.
pub fn parse_hint_spec(src: &str) -> Result<HintSpec, HintSpecError> {
    let de = &mut serde_json::Deserializer::from_str(src);
    serde_path_to_error::deserialize::<_, HintSpec>(de).map_err(|err| {
        let path = err.path().to_string();
        HintSpecError::Parse { path, source: err.into_inner() }
    })
}

// ---------------------------- Class declarations -------------------------- //

/// Nominal class declarations: class name to base-class names, applied in
/// file order, so every base must be declared before its subclasses.
pub type TypeDecls = IndexMap<String, Vec<String>>;

/// Deserialize a class-declaration file with JSON-path context in errors.
pub fn parse_type_decls(src: &str) -> Result<TypeDecls, HintSpecError> {
    let de = &mut serde_json::Deserializer::from_str(src);
    serde_path_to_error::deserialize::<_, TypeDecls>(de).map_err(|err| {
        let path = err.path().to_string();
        HintSpecError::Parse { path, source: err.into_inner() }
    })
}

/// Build a registry from declarations, resolving base names as they appear.
pub fn build_registry(decls: &TypeDecls) -> Result<TypeRegistry, HintSpecError> {
    let mut registry = TypeRegistry::new();
    for (name, bases) in decls {
        let handles = bases
            .iter()
            .map(|base| {
                registry
                    .handle(base)
                    .ok_or_else(|| HintSpecError::UnknownType(base.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        registry.declare(name, &handles)?;
    }
    Ok(registry)
}

// ------------------------------- Lowering --------------------------------- //

impl HintSpec {
    /// Lower to a hint tree, resolving type names against `scope` now.
    /// `Ref` nodes stay symbolic; they resolve when the plan is bound.
    pub fn build(&self, scope: &Scope) -> Result<HintRef, HintSpecError> {
        match self {
            HintSpec::Instance { of } => Ok(HintNode::instance(lookup(scope, of)?)),
            HintSpec::Union { any } => {
                let children = any.iter().map(|s| s.build(scope)).collect::<Result<_, _>>()?;
                Ok(HintNode::union(children))
            }
            HintSpec::Literal { values } => {
                let mut lits = Vec::with_capacity(values.len());
                for v in values {
                    lits.push(scalar_literal(v)?);
                }
                Ok(HintNode::literal(lits))
            }
            HintSpec::Sequence { item } => Ok(HintNode::sequence(item.build(scope)?)),
            HintSpec::Tuple { items } => {
                let children = items.iter().map(|s| s.build(scope)).collect::<Result<_, _>>()?;
                Ok(HintNode::tuple(children))
            }
            HintSpec::Subclass { of } => match lookup(scope, of)? {
                TyCon::Class(handle) => Ok(HintNode::subclass(handle)),
                TyCon::Builtin(_) => Err(HintSpecError::NotAClass(of.clone())),
            },
            HintSpec::Generic { of, supers } => {
                let origin = match lookup(scope, of)? {
                    ty @ TyCon::Class(_) => ty,
                    TyCon::Builtin(_) => return Err(HintSpecError::NotAClass(of.clone())),
                };
                let children = supers.iter().map(|s| s.build(scope)).collect::<Result<_, _>>()?;
                Ok(HintNode::generic(origin, children))
            }
            HintSpec::Annotated { base, rules } => {
                let wrapped = base.build(scope)?;
                let validators = rules.iter().map(RuleSpec::to_validator).collect();
                Ok(HintNode::annotated(wrapped, validators))
            }
            HintSpec::Ref { name } => Ok(HintNode::forward_ref(name.clone())),
        }
    }
}

impl RuleSpec {
    fn to_validator(&self) -> Validator {
        match self {
            RuleSpec::NonEmpty => Validator::new("len({pith}) > 0", |p| match p {
                Pith::Str(s) => !s.is_empty(),
                Pith::List(xs) => !xs.is_empty(),
                Pith::Map(m) => !m.is_empty(),
                _ => false,
            }),
            RuleSpec::Ge { bound } => {
                let bound = *bound;
                Validator::new(format!("{{pith}} >= {bound}"), move |p| match p {
                    Pith::Int(i) => *i as f64 >= bound,
                    Pith::Float(x) => *x >= bound,
                    _ => false,
                })
            }
            RuleSpec::Le { bound } => {
                let bound = *bound;
                Validator::new(format!("{{pith}} <= {bound}"), move |p| match p {
                    Pith::Int(i) => *i as f64 <= bound,
                    Pith::Float(x) => *x <= bound,
                    _ => false,
                })
            }
            RuleSpec::LenEq { len } => {
                let len = *len;
                Validator::new(format!("len({{pith}}) == {len}"), move |p| match p {
                    Pith::Str(s) => s.chars().count() == len,
                    Pith::List(xs) => xs.len() == len,
                    Pith::Map(m) => m.len() == len,
                    _ => false,
                })
            }
        }
    }
}

fn lookup(scope: &Scope, name: &str) -> Result<TyCon, HintSpecError> {
    scope
        .resolve(name)
        .cloned()
        .ok_or_else(|| HintSpecError::UnknownType(name.to_string()))
}

fn scalar_literal(v: &serde_json::Value) -> Result<Pith, HintSpecError> {
    match v {
        serde_json::Value::Null => Ok(Pith::Null),
        serde_json::Value::Bool(b) => Ok(Pith::Bool(*b)),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(Pith::Int)
            .ok_or_else(|| HintSpecError::BadLiteral(n.to_string())),
        serde_json::Value::String(s) => Ok(Pith::Str(s.clone())),
        other => Err(HintSpecError::BadLiteral(other.to_string())),
    }
}

// ------------------------------- Tests ------------------------------------ //
