//! Source snippet catalogue for plan rendering.
//!
//! Every compiled plan carries a textual rendering of its boolean structure,
//! assembled from the templates below. Three placeholder families, each with
//! its own delimiter pair so one global replace can never confuse them:
//!
//! - child slot `@{N}@`: spliced exactly once with a child's finished code
//!   while the plan is being compiled;
//! - forward reference `${name}$`: substituted at bind time with the resolved
//!   class name;
//! - root pith token `?{ROOT}?`: substituted at bind time with the checked
//!   parameter or return identifier.
//!
//! Structural splicing happens once and is cached with the plan; bind-time
//! substitution is a pure string replace, which is what makes one cached
//! rendering sound across every call site. Indentation is cosmetic only.

// ----------------------------- Placeholders ------------------------------- //

pub const CHILD_OPEN: &str = "@{";
pub const CHILD_CLOSE: &str = "}@";

pub const FORWARDREF_OPEN: &str = "${";
pub const FORWARDREF_CLOSE: &str = "}$";

pub const ROOT_PITH: &str = "?{ROOT}?";

/// Name of the per-call shared random integer in rendered code. One draw per
/// top-level check, reused by every sequence node in that check.
pub const VAR_RANDOM_INT: &str = "__hint_random_int";

pub fn child_slot(index: usize) -> String {
    format!("{CHILD_OPEN}{index}{CHILD_CLOSE}")
}

pub fn forwardref_slot(name: &str) -> String {
    format!("{FORWARDREF_OPEN}{name}{FORWARDREF_CLOSE}")
}

/// Splice a child's finished code into its slot. Each slot is resolved
/// exactly once, by exactly one child.
pub fn splice_child(template: &str, index: usize, code: &str) -> String {
    let slot = child_slot(index);
    debug_assert_eq!(template.matches(slot.as_str()).count(), 1);
    template.replacen(slot.as_str(), code, 1)
}

pub fn substitute_root(source: &str, root_name: &str) -> String {
    source.replace(ROOT_PITH, root_name)
}

/// Break placeholder openers in value-derived text (rendered literals,
/// validator expressions) with a backslash. Delimiter sequences then only ever
/// appear where a template put them, so neither splicing nor bind-time
/// substitution can be forged by a string value that spells out a marker.
pub fn escape_value_text(text: &str) -> String {
    text.replace(CHILD_OPEN, "@\\{")
        .replace(FORWARDREF_OPEN, "$\\{")
        .replace("?{", "?\\{")
}

// ---------------------------- Naming protocol ----------------------------- //

/// Depth-scoped pith variable. Pure convention: unique per depth within one
/// compilation and byte-stable across compilations, so cached renderings stay
/// valid for every later call site.
pub fn pith_var(depth: usize) -> String {
    format!("pith_{depth}")
}

pub fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Assignment expression binding the current pith access to its depth-scoped
/// variable, letting child checks read the variable instead of re-evaluating
/// the access expression.
pub fn assign_expr(depth: usize, pith_expr: &str) -> String {
    format!("{} := {pith_expr}", pith_var(depth))
}

// ------------------------------ Templates --------------------------------- //

pub fn instance_check(pith_expr: &str, ty: &str) -> String {
    format!("isinstance({pith_expr}, {ty})")
}

/// Disjunction. Plain (non-polymorphic) members collapse into one membership
/// test up front; polymorphic members each get a child slot after it.
pub fn union_check(depth: usize, pith_expr: &str, plain_tys: Option<&str>, n_poly: usize) -> String {
    let ind = indent(depth);
    let mut arms = Vec::new();
    if let Some(tys) = plain_tys {
        arms.push(format!("{ind}    isinstance({pith_expr}, {tys})"));
    }
    for i in 0..n_poly {
        arms.push(format!("{ind}    {}", child_slot(i)));
    }
    format!("(\n{}\n{ind})", arms.join(" or\n"))
}

/// Membership test against the literal kinds first, then equality per value.
pub fn literal_check(depth: usize, assign: &str, var: &str, kinds: &str, lits: &[String]) -> String {
    let ind = indent(depth);
    let eqs = lits
        .iter()
        .map(|lit| format!("{ind}        {var} == {lit}"))
        .collect::<Vec<_>>()
        .join(" or\n");
    format!("(\n{ind}    isinstance({assign}, {kinds}) and (\n{eqs}\n{ind}    )\n{ind})")
}

pub fn generic_check(depth: usize, assign: &str, ty: &str, n_supers: usize) -> String {
    let ind = indent(depth);
    let mut arms = vec![format!("{ind}    isinstance({assign}, {ty})")];
    for i in 0..n_supers {
        arms.push(format!("{ind}    {}", child_slot(i)));
    }
    format!("(\n{}\n{ind})", arms.join(" and\n"))
}

/// Empty sequences pass vacuously; otherwise one sampled element is checked.
pub fn sequence_check(depth: usize, assign: &str, ty: &str, var: &str) -> String {
    let ind = indent(depth);
    format!(
        "(\n{ind}    isinstance({assign}, {ty}) and\n{ind}    (not {var} or {})\n{ind})",
        child_slot(0),
    )
}

pub fn sequence_item_expr(var: &str) -> String {
    format!("{var}[{VAR_RANDOM_INT} % len({var})]")
}

pub fn tuple_check(depth: usize, assign: &str, var: &str, arity: usize) -> String {
    let ind = indent(depth);
    let mut arms = vec![
        format!("{ind}    isinstance({assign}, list)"),
        format!("{ind}    len({var}) == {arity}"),
    ];
    for i in 0..arity {
        arms.push(format!("{ind}    {}", child_slot(i)));
    }
    format!("(\n{}\n{ind})", arms.join(" and\n"))
}

pub fn tuple_item_expr(var: &str, index: usize) -> String {
    format!("{var}[{index}]")
}

pub fn subclass_check(depth: usize, assign: &str, var: &str, ty: &str) -> String {
    let ind = indent(depth);
    format!(
        "(\n{ind}    isinstance({assign}, type) and\n{ind}    issubclass({var}, {ty})\n{ind})"
    )
}

/// Wrapped hint first, then each validator expression in declaration order.
pub fn annotated_check(depth: usize, validator_exprs: &[String]) -> String {
    let ind = indent(depth);
    let mut arms = vec![format!("{ind}    {}", child_slot(0))];
    for expr in validator_exprs {
        arms.push(format!("{ind}    {expr}"));
    }
    format!("(\n{}\n{ind})", arms.join(" and\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pith_naming_is_stable_and_depth_unique() {
        assert_eq!(pith_var(0), "pith_0");
        assert_eq!(pith_var(3), "pith_3");
        assert_ne!(pith_var(1), pith_var(2));
    }

    #[test]
    fn placeholder_families_do_not_collide() {
        let child = child_slot(0);
        let fwd = forwardref_slot("0");
        assert_ne!(child, fwd);
        assert!(!child.contains(FORWARDREF_OPEN));
        assert!(!fwd.contains(CHILD_OPEN));
        assert!(!ROOT_PITH.contains(CHILD_OPEN));
    }

    #[test]
    fn splice_resolves_slot_once() {
        let t = sequence_check(0, "pith_0 := x", "list", "pith_0");
        assert_eq!(t.matches(child_slot(0).as_str()).count(), 1);
        let spliced = splice_child(&t, 0, "isinstance(pith_0[0], int)");
        assert!(!spliced.contains(CHILD_OPEN));
        assert!(spliced.contains("isinstance(pith_0[0], int)"));
    }

    #[test]
    fn escaped_value_text_contains_no_placeholder_openers() {
        let hostile = format!("{} {} {ROOT_PITH}", child_slot(1), forwardref_slot("int"));
        let escaped = escape_value_text(&hostile);
        assert!(!escaped.contains(CHILD_OPEN));
        assert!(!escaped.contains(FORWARDREF_OPEN));
        assert!(!escaped.contains(ROOT_PITH));
        assert_eq!(escape_value_text("isinstance(x, int)"), "isinstance(x, int)");
    }

    #[test]
    fn root_substitution_is_idempotent() {
        let t = instance_check(ROOT_PITH, "int");
        let once = substitute_root(&t, "return");
        let twice = substitute_root(&once, "return");
        assert_eq!(once, "isinstance(return, int)");
        assert_eq!(once, twice);
    }
}
