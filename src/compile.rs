//! Hint-tree compiler.
//!
//! `compile_hint` walks a hint tree once and produces a `CheckPlan`: the
//! predicate tree that evaluation runs, plus the source rendering assembled
//! by splicing each child's finished code into its parent template's child
//! slot. The result is a pure function of the tree's structure; nothing about
//! the eventual call site leaks in, which is what makes plans cacheable.
//!
//! The compiler never rejects a value. Conformance failures are boolean-false
//! outcomes at check time; the only errors raised here are for malformed
//! trees, and no partial plan ever escapes.

use thiserror::Error;

use crate::hint::{HintKind, HintNode, HintRef};
use crate::plan::{CheckPlan, PlanNode};
use crate::snip;
use crate::value::{Builtin, TyCon};

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{kind:?} hint requires at least one child")]
    MissingChildren { kind: HintKind },
    #[error("sequence hint requires exactly one child, got {got}")]
    SequenceArity { got: usize },
    #[error("{kind:?} hint requires an origin type")]
    MissingOrigin { kind: HintKind },
    #[error("literal hint requires at least one value")]
    EmptyLiteral,
    #[error("literal hint value {0} is not a scalar")]
    NonScalarLiteral(String),
    #[error("subclass hint requires a class origin, got `{got}`")]
    NotAClass { got: String },
    #[error("annotated hint requires at least one validator")]
    MissingValidators,
    #[error("forward-reference hint is missing its target name")]
    MissingForwardName,
}

#[derive(Default)]
struct Emitter {
    /// Forward-reference names, in slot order.
    slots: Vec<String>,
    needs_random: bool,
}

/// Compile one hint tree into a finished, parameter-agnostic plan.
pub fn compile_hint(hint: &HintRef) -> Result<CheckPlan, CompileError> {
    let mut emitter = Emitter::default();
    let (root, source) = emit(hint, 0, snip::ROOT_PITH, &mut emitter)?;
    Ok(CheckPlan {
        hint: hint.clone(),
        root,
        source,
        slot_names: emitter.slots,
        needs_random: emitter.needs_random,
    })
}

/// Recursive arm dispatch. `pith_expr` is the access expression the emitted
/// code reads the current pith through; composite kinds immediately rebind it
/// to the depth-scoped variable so their children read the binding instead of
/// re-evaluating the access.
fn emit(
    node: &HintNode,
    depth: usize,
    pith_expr: &str,
    emitter: &mut Emitter,
) -> Result<(PlanNode, String), CompileError> {
    match node.kind {
        HintKind::Instance => {
            let ty = require_origin(node)?;
            let code = snip::instance_check(pith_expr, &ty.to_string());
            Ok((PlanNode::Instance(ty.clone()), code))
        }

        HintKind::Union => {
            if node.children.is_empty() {
                return Err(CompileError::MissingChildren { kind: node.kind });
            }
            // Plain instance members collapse into one membership test; the
            // polymorphic rest are tried individually afterward. The ordering
            // is load-bearing: N leaf tests become one.
            let mut plain = Vec::new();
            let mut poly_nodes = Vec::new();
            for child in &node.children {
                match (child.kind, &child.origin) {
                    (HintKind::Instance, Some(ty)) => plain.push(ty.clone()),
                    _ => poly_nodes.push(child),
                }
            }
            let plain_tys = match plain.len() {
                0 => None,
                1 => Some(plain[0].to_string()),
                _ => Some(format!(
                    "({})",
                    plain.iter().map(TyCon::to_string).collect::<Vec<_>>().join(", ")
                )),
            };
            let mut code = snip::union_check(depth, pith_expr, plain_tys.as_deref(), poly_nodes.len());
            let mut poly = Vec::with_capacity(poly_nodes.len());
            for (i, child) in poly_nodes.iter().enumerate() {
                // Union members read the parent's access expression directly;
                // no fresh binding is introduced at this level.
                let (child_plan, child_code) = emit(child, depth + 1, pith_expr, emitter)?;
                code = snip::splice_child(&code, i, &child_code);
                poly.push(child_plan);
            }
            Ok((PlanNode::Union { plain, poly }, code))
        }

        HintKind::Literal => {
            if node.literals.is_empty() {
                return Err(CompileError::EmptyLiteral);
            }
            let mut kinds: Vec<Builtin> = Vec::new();
            let mut lits = Vec::with_capacity(node.literals.len());
            for value in &node.literals {
                if !value.is_scalar() {
                    return Err(CompileError::NonScalarLiteral(value.to_string()));
                }
                if let Some(kind) = value.kind() {
                    if !kinds.contains(&kind) {
                        kinds.push(kind);
                    }
                }
                // Value-derived text is escaped so a string literal spelling
                // out a placeholder cannot forge a slot in the rendering.
                lits.push(snip::escape_value_text(&value.to_string()));
            }
            let var = snip::pith_var(depth);
            let assign = snip::assign_expr(depth, pith_expr);
            let kinds_expr = match kinds.len() {
                1 => kinds[0].to_string(),
                _ => format!(
                    "({})",
                    kinds.iter().map(Builtin::to_string).collect::<Vec<_>>().join(", ")
                ),
            };
            let code = snip::literal_check(depth, &assign, &var, &kinds_expr, &lits);
            Ok((PlanNode::Literal { kinds, values: node.literals.clone() }, code))
        }

        HintKind::Generic => {
            let ty = require_origin(node)?;
            if node.children.is_empty() {
                return Err(CompileError::MissingChildren { kind: node.kind });
            }
            let var = snip::pith_var(depth);
            let assign = snip::assign_expr(depth, pith_expr);
            let mut code = snip::generic_check(depth, &assign, &ty.to_string(), node.children.len());
            let mut supers = Vec::with_capacity(node.children.len());
            for (i, child) in node.children.iter().enumerate() {
                let (child_plan, child_code) = emit(child, depth + 1, &var, emitter)?;
                code = snip::splice_child(&code, i, &child_code);
                supers.push(child_plan);
            }
            Ok((PlanNode::Generic { origin: ty.clone(), supers }, code))
        }

        HintKind::Sequence => {
            if node.children.len() != 1 {
                return Err(CompileError::SequenceArity { got: node.children.len() });
            }
            let ty = require_origin(node)?;
            emitter.needs_random = true;
            let var = snip::pith_var(depth);
            let assign = snip::assign_expr(depth, pith_expr);
            let item_expr = snip::sequence_item_expr(&var);
            let (item_plan, item_code) = emit(&node.children[0], depth + 1, &item_expr, emitter)?;
            let code = snip::sequence_check(depth, &assign, &ty.to_string(), &var);
            let code = snip::splice_child(&code, 0, &item_code);
            Ok((PlanNode::Sequence { item: Box::new(item_plan) }, code))
        }

        HintKind::TupleFixed => {
            let var = snip::pith_var(depth);
            let assign = snip::assign_expr(depth, pith_expr);
            let mut code = snip::tuple_check(depth, &assign, &var, node.children.len());
            let mut elems = Vec::with_capacity(node.children.len());
            for (i, child) in node.children.iter().enumerate() {
                let item_expr = snip::tuple_item_expr(&var, i);
                let (child_plan, child_code) = emit(child, depth + 1, &item_expr, emitter)?;
                code = snip::splice_child(&code, i, &child_code);
                elems.push(child_plan);
            }
            Ok((PlanNode::TupleFixed { elems }, code))
        }

        HintKind::Subclass => {
            let ty = require_origin(node)?;
            let TyCon::Class(handle) = ty else {
                return Err(CompileError::NotAClass { got: ty.to_string() });
            };
            let var = snip::pith_var(depth);
            let assign = snip::assign_expr(depth, pith_expr);
            let code = snip::subclass_check(depth, &assign, &var, &handle.to_string());
            Ok((PlanNode::Subclass { origin: handle.clone() }, code))
        }

        HintKind::Annotated => {
            if node.children.len() != 1 {
                return Err(CompileError::MissingChildren { kind: node.kind });
            }
            if node.validators.is_empty() {
                return Err(CompileError::MissingValidators);
            }
            let var = snip::pith_var(depth);
            let assign = snip::assign_expr(depth, pith_expr);
            // The wrapped hint embeds the binding; validators read it.
            let (wrapped_plan, wrapped_code) = emit(&node.children[0], depth + 1, &assign, emitter)?;
            let validator_exprs: Vec<String> = node
                .validators
                .iter()
                .map(|v| snip::escape_value_text(&v.expr.replace("{pith}", &var)))
                .collect();
            let code = snip::annotated_check(depth, &validator_exprs);
            let code = snip::splice_child(&code, 0, &wrapped_code);
            Ok((
                PlanNode::Annotated {
                    wrapped: Box::new(wrapped_plan),
                    validators: node.validators.clone(),
                },
                code,
            ))
        }

        HintKind::ForwardRef => {
            let name = node.forward.as_deref().ok_or(CompileError::MissingForwardName)?;
            let slot = emitter.slots.len();
            emitter.slots.push(name.to_string());
            let code = snip::instance_check(pith_expr, &snip::forwardref_slot(name));
            Ok((PlanNode::ForwardRef { slot }, code))
        }
    }
}

fn require_origin(node: &HintNode) -> Result<&TyCon, CompileError> {
    node.origin.as_ref().ok_or(CompileError::MissingOrigin { kind: node.kind })
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::hint::{HintNode, Validator};
    use crate::plan::BoundCheck;
    use crate::value::{Pith, Scope, TypeRegistry};

    fn bound(hint: &HintRef) -> BoundCheck {
        let plan = Arc::new(compile_hint(hint).unwrap());
        plan.bind("x", &Scope::builtins()).unwrap()
    }

    fn int_hint() -> HintRef {
        HintNode::instance(TyCon::Builtin(Builtin::Int))
    }

    fn str_hint() -> HintRef {
        HintNode::instance(TyCon::Builtin(Builtin::Str))
    }

    #[test]
    fn compiling_the_same_tree_twice_is_byte_identical() {
        let hint = HintNode::union(vec![
            int_hint(),
            HintNode::sequence(HintNode::literal(vec![Pith::Int(1), Pith::Str("a".into())])),
        ]);
        let a = compile_hint(&hint).unwrap();
        let b = compile_hint(&hint).unwrap();
        assert_eq!(a.source(), b.source());
    }

    #[test]
    fn structurally_equal_trees_compile_identically() {
        // Distinct Arcs are permitted to miss the cache, but their plans must
        // render the same.
        let a = compile_hint(&HintNode::sequence(int_hint())).unwrap();
        let b = compile_hint(&HintNode::sequence(int_hint())).unwrap();
        assert_eq!(a.source(), b.source());
    }

    #[test]
    fn union_of_plain_types_accepts_either_and_rejects_neither() {
        let reg = TypeRegistry::new();
        let check = bound(&HintNode::union(vec![int_hint(), str_hint()]));
        assert!(check.check_with_random(&Pith::Int(7), &reg, 0).is_ok());
        assert!(check.check_with_random(&Pith::Str("s".into()), &reg, 0).is_ok());
        assert!(check.check_with_random(&Pith::Float(1.5), &reg, 0).is_err());
        assert!(check.check_with_random(&Pith::Null, &reg, 0).is_err());
    }

    #[test]
    fn union_batches_plain_members_into_one_membership_test() {
        let plan = compile_hint(&HintNode::union(vec![int_hint(), str_hint()])).unwrap();
        assert!(plan.source().contains("(int, str)"));
    }

    #[test]
    fn union_mixes_plain_and_polymorphic_members() {
        let reg = TypeRegistry::new();
        let hint = HintNode::union(vec![int_hint(), HintNode::sequence(str_hint())]);
        let check = bound(&hint);
        assert!(check.check_with_random(&Pith::Int(1), &reg, 0).is_ok());
        let strings = Pith::List(vec![Pith::Str("a".into())]);
        assert!(check.check_with_random(&strings, &reg, 0).is_ok());
        assert!(check.check_with_random(&Pith::Bool(true), &reg, 0).is_err());
    }

    #[test]
    fn literal_checks_kind_then_equality() {
        let reg = TypeRegistry::new();
        let check = bound(&HintNode::literal(vec![Pith::Int(1), Pith::Str("a".into())]));
        assert!(check.check_with_random(&Pith::Int(1), &reg, 0).is_ok());
        assert!(check.check_with_random(&Pith::Str("a".into()), &reg, 0).is_ok());
        assert!(check.check_with_random(&Pith::Int(2), &reg, 0).is_err());
        assert!(check.check_with_random(&Pith::Str("b".into()), &reg, 0).is_err());
        assert!(check.check_with_random(&Pith::Float(1.0), &reg, 0).is_err());
    }

    #[test]
    fn fixed_tuple_enforces_arity_and_positions() {
        let reg = TypeRegistry::new();
        let check = bound(&HintNode::tuple(vec![int_hint(), str_hint()]));

        let ok = Pith::List(vec![Pith::Int(1), Pith::Str("x".into())]);
        assert!(check.check_with_random(&ok, &reg, 0).is_ok());

        let wrong_elem = Pith::List(vec![Pith::Int(1), Pith::Int(2)]);
        assert!(check.check_with_random(&wrong_elem, &reg, 0).is_err());

        let short = Pith::List(vec![Pith::Int(1)]);
        assert!(check.check_with_random(&short, &reg, 0).is_err());

        let empty = Pith::List(vec![]);
        assert!(check.check_with_random(&empty, &reg, 0).is_err());
    }

    #[test]
    fn empty_tuple_form_accepts_only_zero_length() {
        let reg = TypeRegistry::new();
        let check = bound(&HintNode::empty_tuple());
        assert!(check.check_with_random(&Pith::List(vec![]), &reg, 0).is_ok());
        assert!(check.check_with_random(&Pith::List(vec![Pith::Int(1)]), &reg, 0).is_err());
        assert!(check.check_with_random(&Pith::Null, &reg, 0).is_err());
    }

    #[test]
    fn sequence_sampling_is_draw_independent_at_the_extremes() {
        let reg = TypeRegistry::new();
        let check = bound(&HintNode::sequence(int_hint()));

        let all_ints = Pith::List(vec![Pith::Int(1), Pith::Int(2), Pith::Int(3)]);
        let no_ints = Pith::List(vec![Pith::Str("a".into()), Pith::Null]);
        for draw in 0..64u64 {
            assert!(check.check_with_random(&all_ints, &reg, draw).is_ok());
            assert!(check.check_with_random(&no_ints, &reg, draw).is_err());
        }

        // Empty sequences pass vacuously, whatever the draw.
        assert!(check.check_with_random(&Pith::List(vec![]), &reg, 41).is_ok());
    }

    #[test]
    fn sequence_sampling_depends_on_draw_for_mixed_contents() {
        let reg = TypeRegistry::new();
        let check = bound(&HintNode::sequence(int_hint()));
        let mixed = Pith::List(vec![Pith::Int(1), Pith::Int(2), Pith::Str("x".into())]);

        // len == 3: draws 0 and 1 sample ints, draw 2 samples the string.
        assert!(check.check_with_random(&mixed, &reg, 0).is_ok());
        assert!(check.check_with_random(&mixed, &reg, 1).is_ok());
        assert!(check.check_with_random(&mixed, &reg, 2).is_err());
        assert!(check.check_with_random(&mixed, &reg, 5).is_err());
    }

    #[test]
    fn nested_sequences_share_one_draw() {
        let reg = TypeRegistry::new();
        // list of (list of int); inner lists have matching layout so a single
        // shared draw is observable: index 1 is bad in both.
        let check = bound(&HintNode::sequence(HintNode::sequence(int_hint())));
        let value = Pith::List(vec![
            Pith::List(vec![Pith::Int(0), Pith::Str("bad".into())]),
            Pith::List(vec![Pith::Int(0), Pith::Str("bad".into())]),
        ]);
        assert!(check.check_with_random(&value, &reg, 0).is_ok());
        assert!(check.check_with_random(&value, &reg, 1).is_err());
    }

    #[test]
    fn generic_requires_origin_and_all_pseudo_superclasses() {
        let mut reg = TypeRegistry::new();
        let drawable = reg.declare("Drawable", &[]).unwrap();
        let sized = reg.declare("Sized", &[]).unwrap();
        let window = reg
            .declare("Window", &[drawable.clone(), sized.clone()])
            .unwrap();
        let toy = reg.declare("Toy", &[drawable.clone()]).unwrap();

        let hint = HintNode::generic(
            TyCon::Class(drawable.clone()),
            vec![
                HintNode::instance(TyCon::Class(drawable)),
                HintNode::instance(TyCon::Class(sized)),
            ],
        );
        let plan = Arc::new(compile_hint(&hint).unwrap());
        let check = plan.bind("widget", &reg.scope()).unwrap();

        assert!(check.check_with_random(&Pith::Instance(window.id), &reg, 0).is_ok());
        // Toy is Drawable but not Sized: the second pseudo-superclass fails.
        assert!(check.check_with_random(&Pith::Instance(toy.id), &reg, 0).is_err());
        assert!(check.check_with_random(&Pith::Int(0), &reg, 0).is_err());
    }

    #[test]
    fn subclass_accepts_class_objects_only() {
        let mut reg = TypeRegistry::new();
        let animal = reg.declare("Animal", &[]).unwrap();
        let dog = reg.declare("Dog", &[animal.clone()]).unwrap();
        let rock = reg.declare("Rock", &[]).unwrap();

        let plan = Arc::new(compile_hint(&HintNode::subclass(animal.clone())).unwrap());
        let check = plan.bind("cls", &reg.scope()).unwrap();

        assert!(check.check_with_random(&Pith::Class(dog.id), &reg, 0).is_ok());
        assert!(check.check_with_random(&Pith::Class(animal.id), &reg, 0).is_ok());
        assert!(check.check_with_random(&Pith::Class(rock.id), &reg, 0).is_err());
        // An instance is not a class object.
        assert!(check.check_with_random(&Pith::Instance(dog.id), &reg, 0).is_err());
    }

    #[test]
    fn annotated_conjoins_wrapped_hint_and_validators_in_order() {
        let reg = TypeRegistry::new();
        let hint = HintNode::annotated(
            int_hint(),
            vec![
                Validator::new("{pith} >= 0", |p| matches!(p, Pith::Int(i) if *i >= 0)),
                Validator::new("{pith} <= 10", |p| matches!(p, Pith::Int(i) if *i <= 10)),
            ],
        );
        let check = bound(&hint);
        assert!(check.check_with_random(&Pith::Int(5), &reg, 0).is_ok());
        assert!(check.check_with_random(&Pith::Int(-1), &reg, 0).is_err());
        assert!(check.check_with_random(&Pith::Int(11), &reg, 0).is_err());
        assert!(check.check_with_random(&Pith::Str("5".into()), &reg, 0).is_err());

        let plan = compile_hint(&hint).unwrap();
        assert!(plan.source().contains("pith_0 >= 0"));
        assert!(plan.source().contains("pith_0 <= 10"));
    }

    #[test]
    fn malformed_trees_fail_with_specific_errors() {
        let empty_union = HintNode::union(vec![]);
        assert!(matches!(
            compile_hint(&empty_union),
            Err(CompileError::MissingChildren { kind: HintKind::Union })
        ));

        let empty_literal = HintNode::literal(vec![]);
        assert!(matches!(compile_hint(&empty_literal), Err(CompileError::EmptyLiteral)));

        let bad_literal = HintNode::literal(vec![Pith::List(vec![])]);
        assert!(matches!(compile_hint(&bad_literal), Err(CompileError::NonScalarLiteral(_))));

        let bare_annotated = HintNode::annotated(int_hint(), vec![]);
        assert!(matches!(compile_hint(&bare_annotated), Err(CompileError::MissingValidators)));
    }

    #[test]
    fn depth_scoped_variables_appear_per_nesting_level() {
        let hint = HintNode::sequence(HintNode::sequence(int_hint()));
        let plan = compile_hint(&hint).unwrap();
        assert!(plan.source().contains("pith_0 :="));
        assert!(plan.source().contains("pith_1 :="));
        assert!(plan.needs_random());
    }

    #[test]
    fn literal_strings_spelling_out_placeholders_cannot_forge_slots() {
        let reg = TypeRegistry::new();
        // The string literal spells out the sibling's child slot; splicing
        // must target only the slot the union template introduced.
        let hint = HintNode::union(vec![
            HintNode::literal(vec![Pith::Str("@{1}@".into())]),
            HintNode::sequence(int_hint()),
        ]);
        let plan = compile_hint(&hint).unwrap();
        assert!(!plan.source().contains(snip::CHILD_OPEN));

        let check = bound(&hint);
        assert!(check.check_with_random(&Pith::Str("@{1}@".into()), &reg, 0).is_ok());
        assert!(check.check_with_random(&Pith::Str("other".into()), &reg, 0).is_err());
        assert!(check
            .check_with_random(&Pith::List(vec![Pith::Int(1)]), &reg, 0)
            .is_ok());
    }

    #[test]
    fn literal_strings_survive_bind_time_substitution_unchanged() {
        let hint = HintNode::union(vec![
            HintNode::literal(vec![Pith::Str("?{ROOT}? and ${int}$".into())]),
            HintNode::forward_ref("int"),
        ]);
        let plan = Arc::new(compile_hint(&hint).unwrap());
        let bound = plan.bind("arg", &Scope::builtins()).unwrap();
        // Only the template's own tokens were rewritten; the escaped literal
        // text is untouched by root and forward-ref substitution.
        assert!(bound.source().contains("?\\{ROOT}? and $\\{int}$"));
        assert!(!bound.source().contains(snip::ROOT_PITH));
    }

    #[test]
    fn finished_source_contains_no_unresolved_child_slots() {
        let hint = HintNode::union(vec![
            HintNode::tuple(vec![int_hint(), str_hint()]),
            HintNode::sequence(HintNode::forward_ref("float")),
        ]);
        let plan = compile_hint(&hint).unwrap();
        assert!(!plan.source().contains(snip::CHILD_OPEN));
        assert!(plan.source().contains(snip::ROOT_PITH));
        assert_eq!(plan.forward_names(), ["float"]);
    }
}
