//! Runtime value universe for hint checking.
//!
//! `Pith` is the dynamic value under test (a parameter, return value, or a
//! sub-element reached while descending a hint tree). Checks are expressed
//! over `TyCon` type expressions: either a fixed `Builtin` kind or a nominal
//! class registered in a `TypeRegistry` with explicit base classes.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use thiserror::Error;

// ------------------------------- Values ---------------------------------- //

/// A dynamic runtime value. JSON documents map onto the first seven variants;
/// `Class`/`Instance` exist for nominal (registry-backed) checks.
#[derive(Clone, Debug, PartialEq)]
pub enum Pith {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Pith>),
    Map(BTreeMap<String, Pith>),
    /// A class object, as produced by a registry. Satisfies `isinstance(_, type)`.
    Class(TypeId),
    /// An instance of a registered nominal class.
    Instance(TypeId),
}

impl Pith {
    /// Convert a parsed JSON document. Whole numbers stay `Int`; everything
    /// else that `serde_json` calls a number becomes `Float`.
    pub fn from_json(v: &serde_json::Value) -> Pith {
        match v {
            serde_json::Value::Null => Pith::Null,
            serde_json::Value::Bool(b) => Pith::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Pith::Int(i)
                } else {
                    Pith::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Pith::Str(s.clone()),
            serde_json::Value::Array(xs) => Pith::List(xs.iter().map(Pith::from_json).collect()),
            serde_json::Value::Object(m) => Pith::Map(
                m.iter().map(|(k, v)| (k.clone(), Pith::from_json(v))).collect(),
            ),
        }
    }

    /// The builtin kind of this value, if it has one. `Instance` values are
    /// outside the builtin lattice and only match nominal checks.
    pub fn kind(&self) -> Option<Builtin> {
        match self {
            Pith::Null => Some(Builtin::Null),
            Pith::Bool(_) => Some(Builtin::Bool),
            Pith::Int(_) => Some(Builtin::Int),
            Pith::Float(_) => Some(Builtin::Float),
            Pith::Str(_) => Some(Builtin::Str),
            Pith::List(_) => Some(Builtin::List),
            Pith::Map(_) => Some(Builtin::Map),
            Pith::Class(_) => Some(Builtin::Type),
            Pith::Instance(_) => None,
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Pith::Null | Pith::Bool(_) | Pith::Int(_) | Pith::Str(_))
    }
}

impl fmt::Display for Pith {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pith::Null => write!(f, "null"),
            Pith::Bool(b) => write!(f, "{b}"),
            Pith::Int(i) => write!(f, "{i}"),
            Pith::Float(x) => write!(f, "{x}"),
            Pith::Str(s) => write!(f, "{s:?}"),
            Pith::List(xs) => {
                write!(f, "[")?;
                for (i, x) in xs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{x}")?;
                }
                write!(f, "]")
            }
            Pith::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k:?}: {v}")?;
                }
                write!(f, "}}")
            }
            Pith::Class(id) => write!(f, "<class #{}>", id.0),
            Pith::Instance(id) => write!(f, "<instance of #{}>", id.0),
        }
    }
}

// ------------------------------- Builtins -------------------------------- //

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Builtin {
    Null,
    Bool,
    Int,
    Float,
    Str,
    List,
    Map,
    Type,
}

impl Builtin {
    pub const ALL: [Builtin; 8] = [
        Builtin::Null,
        Builtin::Bool,
        Builtin::Int,
        Builtin::Float,
        Builtin::Str,
        Builtin::List,
        Builtin::Map,
        Builtin::Type,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Null => "null",
            Builtin::Bool => "bool",
            Builtin::Int => "int",
            Builtin::Float => "float",
            Builtin::Str => "str",
            Builtin::List => "list",
            Builtin::Map => "map",
            Builtin::Type => "type",
        }
    }

    pub fn from_name(name: &str) -> Option<Builtin> {
        Builtin::ALL.iter().copied().find(|b| b.name() == name)
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ------------------------------ Registry --------------------------------- //

/// Index of a class inside its `TypeRegistry`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeId(pub(crate) usize);

/// A class reference that renders as its declared name.
#[derive(Clone, Debug)]
pub struct ClassHandle {
    pub id: TypeId,
    pub name: Arc<str>,
}

impl PartialEq for ClassHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Display for ClassHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A checkable type expression: builtin kind or nominal class.
#[derive(Clone, Debug, PartialEq)]
pub enum TyCon {
    Builtin(Builtin),
    Class(ClassHandle),
}

impl fmt::Display for TyCon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TyCon::Builtin(b) => write!(f, "{b}"),
            TyCon::Class(h) => write!(f, "{h}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("class `{0}` already declared")]
    Duplicate(String),
}

/// Nominal classes declared by name, each with zero or more base classes.
/// Bases must exist at declaration time, so the subclass graph is acyclic.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    classes: IndexMap<Arc<str>, Vec<TypeId>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, name: &str, bases: &[ClassHandle]) -> Result<ClassHandle, RegistryError> {
        if self.classes.contains_key(name) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }
        let name: Arc<str> = Arc::from(name);
        let id = TypeId(self.classes.len());
        self.classes.insert(name.clone(), bases.iter().map(|h| h.id).collect());
        Ok(ClassHandle { id, name })
    }

    pub fn handle(&self, name: &str) -> Option<ClassHandle> {
        let (id, key, _) = self.classes.get_full(name)?;
        Some(ClassHandle { id: TypeId(id), name: key.clone() })
    }

    pub fn name_of(&self, id: TypeId) -> Option<&str> {
        self.classes.get_index(id.0).map(|(k, _)| k.as_ref())
    }

    /// Reflexive-transitive subclass test over declared bases.
    pub fn is_subclass(&self, sub: TypeId, sup: TypeId) -> bool {
        if sub == sup {
            return true;
        }
        let mut stack = vec![sub];
        while let Some(cur) = stack.pop() {
            let Some((_, bases)) = self.classes.get_index(cur.0) else {
                continue;
            };
            for &base in bases {
                if base == sup {
                    return true;
                }
                stack.push(base);
            }
        }
        false
    }

    /// Name scope for forward-reference resolution: builtins plus every
    /// registered class.
    pub fn scope(&self) -> Scope {
        let mut scope = Scope::builtins();
        for (name, _) in &self.classes {
            if let Some(h) = self.handle(name) {
                scope.define(name, TyCon::Class(h));
            }
        }
        scope
    }
}

/// Shallow type test. Never panics; a pith that cannot possibly satisfy the
/// given type expression simply fails the test.
pub fn isinstance(pith: &Pith, ty: &TyCon, registry: &TypeRegistry) -> bool {
    match ty {
        TyCon::Builtin(b) => pith.kind() == Some(*b),
        TyCon::Class(h) => match pith {
            Pith::Instance(c) => registry.is_subclass(*c, h.id),
            _ => false,
        },
    }
}

// -------------------------------- Scope ---------------------------------- //

/// Name-to-type mapping used to resolve forward references at bind time.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    names: IndexMap<String, TyCon>,
}

impl Scope {
    pub fn builtins() -> Scope {
        let mut scope = Scope::default();
        for b in Builtin::ALL {
            scope.define(b.name(), TyCon::Builtin(b));
        }
        scope
    }

    pub fn define(&mut self, name: &str, ty: TyCon) {
        self.names.insert(name.to_string(), ty);
    }

    pub fn resolve(&self, name: &str) -> Option<&TyCon> {
        self.names.get(name)
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_numbers_split_int_float() {
        let v = serde_json::json!([1, 2.5, "x", null]);
        let p = Pith::from_json(&v);
        assert_eq!(
            p,
            Pith::List(vec![
                Pith::Int(1),
                Pith::Float(2.5),
                Pith::Str("x".into()),
                Pith::Null,
            ])
        );
    }

    #[test]
    fn subclass_walk_is_transitive_and_reflexive() {
        let mut reg = TypeRegistry::new();
        let animal = reg.declare("Animal", &[]).unwrap();
        let dog = reg.declare("Dog", &[animal.clone()]).unwrap();
        let puppy = reg.declare("Puppy", &[dog.clone()]).unwrap();
        let rock = reg.declare("Rock", &[]).unwrap();

        assert!(reg.is_subclass(puppy.id, animal.id));
        assert!(reg.is_subclass(dog.id, dog.id));
        assert!(!reg.is_subclass(rock.id, animal.id));
        assert!(!reg.is_subclass(animal.id, puppy.id));
    }

    #[test]
    fn isinstance_nominal_and_builtin() {
        let mut reg = TypeRegistry::new();
        let animal = reg.declare("Animal", &[]).unwrap();
        let dog = reg.declare("Dog", &[animal.clone()]).unwrap();

        let fido = Pith::Instance(dog.id);
        assert!(isinstance(&fido, &TyCon::Class(animal.clone()), &reg));
        assert!(!isinstance(&fido, &TyCon::Builtin(Builtin::Map), &reg));

        let class_obj = Pith::Class(dog.id);
        assert!(isinstance(&class_obj, &TyCon::Builtin(Builtin::Type), &reg));
        assert!(!isinstance(&Pith::Int(3), &TyCon::Class(animal), &reg));
    }

    #[test]
    fn duplicate_class_is_rejected() {
        let mut reg = TypeRegistry::new();
        reg.declare("A", &[]).unwrap();
        assert!(matches!(reg.declare("A", &[]), Err(RegistryError::Duplicate(_))));
    }

    #[test]
    fn registry_scope_resolves_builtins_and_classes() {
        let mut reg = TypeRegistry::new();
        reg.declare("Widget", &[]).unwrap();
        let scope = reg.scope();
        assert_eq!(scope.resolve("int"), Some(&TyCon::Builtin(Builtin::Int)));
        assert!(matches!(scope.resolve("Widget"), Some(TyCon::Class(_))));
        assert!(scope.resolve("Gadget").is_none());
    }
}
