//! The heuristic sub-mutators.
//!
//! Each one is a tree-sitter query plus a rewrite rule, producing candidate
//! replacement batches. Sites where a rewrite does not statically apply (a
//! scalar lvalue, a module instantiated once) are skipped without noise.

use itertools::Itertools;
use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tree_sitter::{Node, Tree};

use crate::editor::Replacement;
use crate::helpers::{decl_insert_location, parent_of, random_id, range_of, shape_of, type_of};
use crate::mutator::{MutationError, SkipOrError};
use crate::queries::{self, mentions_clock, pattern_match, single, text};

pub(crate) const UNARY_OPERATORS: &[&str] =
    &["+", "-", "!", "~", "&", "~&", "|", "~|", "^", "~^", "^~"];

pub(crate) const BINARY_OPERATORS: &[&str] = &[
    "**", "*", "/", "%", "+", "-", "<<", ">>", "<<<", ">>>", "<", "<=", ">", ">=", "==", "!=",
    "===", "!==", "&", "^", "^~", "~^", "|", "&&", "||",
];

/// One site-specific rewrite: a batch of byte replacements.
pub(crate) type Plan = Vec<Replacement>;

/// A sub-mutator walks its query over the tree and yields candidate plans.
pub(crate) trait SubMutator {
    /// Display name (used in logs).
    fn name(&self) -> &'static str;

    /// All candidate plans over the current tree.
    fn plans(&self, tree: &Tree, src: &[u8], rng: &mut StdRng) -> Result<Vec<Plan>, MutationError>;
}

fn choose<'a>(rng: &mut StdRng, items: &[&'a str]) -> &'a str {
    items.choose(rng).expect("static operator tables are non-empty")
}

fn node_string(node: Node<'_>, src: &[u8]) -> String {
    String::from_utf8_lossy(text(node, src)).into_owned()
}

/// Replaces a unary operator and parenthesizes the expression.
pub(crate) struct ChangeUnaryOp;

impl SubMutator for ChangeUnaryOp {
    fn name(&self) -> &'static str {
        "ChangeUnaryOp"
    }

    fn plans(&self, tree: &Tree, src: &[u8], rng: &mut StdRng) -> Result<Vec<Plan>, MutationError> {
        let mut plans = Vec::new();
        for m in pattern_match(queries::UNARY_EXPRESSIONS, tree.root_node(), src)? {
            let uop = single(&m, "uop")?;
            let expr = single(&m, "expr")?;
            plans.push(vec![
                Replacement::insert(expr.start_byte(), "("),
                Replacement::new(uop.start_byte(), uop.end_byte(), choose(rng, UNARY_OPERATORS)),
                Replacement::insert(expr.end_byte(), ")"),
            ]);
        }
        Ok(plans)
    }
}

/// Replaces a binary operator.
pub(crate) struct ChangeBinaryOp;

impl SubMutator for ChangeBinaryOp {
    fn name(&self) -> &'static str {
        "ChangeBinaryOp"
    }

    fn plans(&self, tree: &Tree, src: &[u8], rng: &mut StdRng) -> Result<Vec<Plan>, MutationError> {
        let mut plans = Vec::new();
        for m in pattern_match(queries::BINARY_EXPRESSIONS, tree.root_node(), src)? {
            let bop = single(&m, "bop")?;
            plans.push(vec![Replacement::new(
                bop.start_byte(),
                bop.end_byte(),
                choose(rng, BINARY_OPERATORS),
            )]);
        }
        Ok(plans)
    }
}

/// Replaces a sub-expression `e` with `(e OP e)`.
pub(crate) struct DuplicateExpr;

impl SubMutator for DuplicateExpr {
    fn name(&self) -> &'static str {
        "DuplicateExpr"
    }

    fn plans(&self, tree: &Tree, src: &[u8], rng: &mut StdRng) -> Result<Vec<Plan>, MutationError> {
        let mut plans = Vec::new();
        for m in pattern_match(queries::RHS_EXPRESSIONS, tree.root_node(), src)? {
            let outer = single(&m, "expr")?;
            let sub_exprs: Vec<Node<'_>> = pattern_match(queries::ALL_EXPRESSIONS, outer, src)?
                .into_iter()
                .filter_map(|sub| sub.get("expr").and_then(|n| n.first()).copied())
                .filter(|n| !mentions_clock(*n, src))
                .collect();
            if let Some(expr) = sub_exprs.choose(rng) {
                let operand = node_string(*expr, src);
                let inserted = format!("({operand} {} {operand})", choose(rng, BINARY_OPERATORS));
                plans.push(vec![Replacement::new(
                    expr.start_byte(),
                    expr.end_byte(),
                    inserted,
                )]);
            }
        }
        Ok(plans)
    }
}

/// Wraps an existing statement with `repeat(PARAM)`, injecting the
/// parameter.
pub(crate) struct MakeRepeat;

impl SubMutator for MakeRepeat {
    fn name(&self) -> &'static str {
        "MakeRepeat"
    }

    fn plans(&self, tree: &Tree, src: &[u8], rng: &mut StdRng) -> Result<Vec<Plan>, MutationError> {
        let mut plans = Vec::new();
        for m in pattern_match(queries::ALL_STATEMENT_OR_NULL, tree.root_node(), src)? {
            let stmt = single(&m, "stmt")?;
            let decl_location = decl_insert_location(parent_of(stmt, tree)?)?;
            let param = random_id(rng, 5);
            plans.push(vec![
                Replacement::insert(decl_location, format!("parameter {param} = 1;\n")),
                Replacement::insert(stmt.start_byte(), format!("repeat ({param}) ")),
            ]);
        }
        Ok(plans)
    }
}

/// Wraps a module item in a length-1 `generate for` block.
pub(crate) struct MakeLoopGenerate;

impl SubMutator for MakeLoopGenerate {
    fn name(&self) -> &'static str {
        "MakeLoopGenerate"
    }

    fn plans(&self, tree: &Tree, src: &[u8], rng: &mut StdRng) -> Result<Vec<Plan>, MutationError> {
        let mut plans = Vec::new();
        for m in pattern_match(queries::MODULE_OR_GENERATE_ITEMS, tree.root_node(), src)? {
            let item = single(&m, "item")?;
            let decl_location = decl_insert_location(parent_of(item, tree)?)?;
            let genvar = random_id(rng, 3);
            let body = node_string(item, src);
            let generate = format!(
                "\ngenerate\n    for ({genvar}=0; {genvar}<1; {genvar}={genvar}+1) begin\n        {body}\n    end\nendgenerate\n"
            );
            plans.push(vec![
                Replacement::insert(decl_location, format!("genvar {genvar};\n")),
                Replacement::new(item.start_byte(), item.end_byte(), generate),
            ]);
        }
        Ok(plans)
    }
}

fn conditionals<'t>(
    module: Node<'t>,
    src: &[u8],
) -> Result<Vec<queries::CaptureMap<'t>>, MutationError> {
    let mut matches = pattern_match(queries::COND_STATEMENT_1, module, src)?;
    matches.extend(pattern_match(queries::COND_STATEMENT_2, module, src)?);
    Ok(matches)
}

/// Fuses the predicates of two conditionals with a random binary operator.
pub(crate) struct DuplicateCond1;

impl SubMutator for DuplicateCond1 {
    fn name(&self) -> &'static str {
        "DuplicateCond1"
    }

    fn plans(&self, tree: &Tree, src: &[u8], rng: &mut StdRng) -> Result<Vec<Plan>, MutationError> {
        let mut plans = Vec::new();
        for m in pattern_match(queries::ALL_MODULE_DECLARATIONS, tree.root_node(), src)? {
            let module = single(&m, "module")?;
            let conds: Vec<Node<'_>> = conditionals(module, src)?
                .iter()
                .map(|c| single(c, "cond"))
                .collect::<Result<_, _>>()?;
            for pair in conds.iter().combinations(2) {
                let (a, b) = (*pair[0], *pair[1]);
                let fused = format!(
                    "{} {} {}",
                    node_string(a, src),
                    choose(rng, BINARY_OPERATORS),
                    node_string(b, src),
                );
                plans.push(vec![
                    Replacement::new(a.start_byte(), a.end_byte(), fused.clone()),
                    Replacement::new(b.start_byte(), b.end_byte(), fused),
                ]);
            }
        }
        Ok(plans)
    }
}

/// Lifts a nonblocking assignment out of an `if` into a fresh conditional
/// with the same predicate, inserted right after the branch.
pub(crate) struct DuplicateCond2;

impl DuplicateCond2 {
    fn extract_nba(
        cond: Node<'_>,
        stmt: Node<'_>,
        if_location: usize,
        src: &[u8],
        plans: &mut Vec<Plan>,
    ) -> Result<(), MutationError> {
        for m in pattern_match(queries::NONBLOCKING_ASSIGNMENTS, stmt, src)? {
            let nba = single(&m, "nba")?;
            let hoisted = format!(
                "\nif ({}) begin\n    {}\nend\n",
                node_string(cond, src),
                node_string(nba, src),
            );
            plans.push(vec![
                Replacement::new(nba.start_byte(), nba.end_byte(), ""),
                Replacement::insert(if_location, hoisted),
            ]);
        }
        Ok(())
    }
}

impl SubMutator for DuplicateCond2 {
    fn name(&self) -> &'static str {
        "DuplicateCond2"
    }

    fn plans(&self, tree: &Tree, src: &[u8], _rng: &mut StdRng) -> Result<Vec<Plan>, MutationError> {
        let mut plans = Vec::new();
        for m in pattern_match(queries::ALL_MODULE_DECLARATIONS, tree.root_node(), src)? {
            let module = single(&m, "module")?;

            for cond_match in pattern_match(queries::COND_STATEMENT_1, module, src)? {
                let cond = single(&cond_match, "cond")?;
                let stmt = single(&cond_match, "stmt")?;
                Self::extract_nba(cond, stmt, stmt.end_byte(), src, &mut plans)?;
            }

            for cond_match in pattern_match(queries::COND_STATEMENT_2, module, src)? {
                let cond = single(&cond_match, "cond")?;
                let stmts = cond_match
                    .get("stmt")
                    .filter(|s| s.len() == 2)
                    .ok_or_else(|| {
                        MutationError::Generator("if-else match without two branches".into())
                    })?;
                // The insertion lands at the branch's end even for the then
                // branch, so the new conditional may capture the else.
                for stmt in stmts {
                    Self::extract_nba(cond, *stmt, stmt.end_byte(), src, &mut plans)?;
                }
            }
        }
        Ok(plans)
    }
}

/// Unwraps an `if` into its branch bodies.
pub(crate) struct RemoveCond;

impl SubMutator for RemoveCond {
    fn name(&self) -> &'static str {
        "RemoveCond"
    }

    fn plans(&self, tree: &Tree, src: &[u8], _rng: &mut StdRng) -> Result<Vec<Plan>, MutationError> {
        let mut plans = Vec::new();
        for m in pattern_match(queries::COND_STATEMENT_1, tree.root_node(), src)? {
            let if_node = single(&m, "if")?;
            let stmt = single(&m, "stmt")?;
            plans.push(vec![Replacement::new(
                if_node.start_byte(),
                if_node.end_byte(),
                text(stmt, src),
            )]);
        }
        for m in pattern_match(queries::COND_STATEMENT_2, tree.root_node(), src)? {
            let if_node = single(&m, "if")?;
            let stmts = m
                .get("stmt")
                .filter(|s| s.len() == 2)
                .ok_or_else(|| MutationError::Generator("if-else match without two branches".into()))?;
            let mut unwrapped = text(stmts[0], src).to_vec();
            unwrapped.push(b'\n');
            unwrapped.extend_from_slice(text(stmts[1], src));
            plans.push(vec![Replacement::new(
                if_node.start_byte(),
                if_node.end_byte(),
                unwrapped,
            )]);
        }
        Ok(plans)
    }
}

fn assignments<'t>(
    root: Node<'t>,
    src: &[u8],
) -> Result<Vec<queries::CaptureMap<'t>>, MutationError> {
    let mut matches = pattern_match(queries::CA_NO_SELECT_IN_LHS, root, src)?;
    matches.extend(pattern_match(queries::NBA_NO_SELECT_IN_LHS, root, src)?);
    Ok(matches)
}

/// Concatenation right-hand sides split into constant assignments; skip
/// them.
fn is_concatenation(rvalue: Node<'_>) -> bool {
    rvalue
        .child(0)
        .filter(|c| c.kind() == "primary")
        .and_then(|c| c.child(0))
        .is_some_and(|c| c.kind() == "concatenation")
}

/// Rewrites an assignment into per-bit assignments over the lvalue range.
pub(crate) struct SplitAssignment;

impl SplitAssignment {
    fn bit_assignments(
        assign: Node<'_>,
        lvalue: Node<'_>,
        rvalue: Node<'_>,
        msb: i64,
        lsb: i64,
        is_nba: bool,
        src: &[u8],
    ) -> Vec<u8> {
        let assign_text = text(assign, src);
        let base = assign.start_byte();
        let cuts = [
            lvalue.end_byte() - base,
            rvalue.start_byte() - base,
            rvalue.end_byte() - base,
        ];
        let pieces = [
            &assign_text[..cuts[0]],
            &assign_text[cuts[0]..cuts[1]],
            &assign_text[cuts[1]..cuts[2]],
            &assign_text[cuts[2]..],
        ];

        let mut lines = Vec::new();
        for index in msb.min(lsb)..=msb.max(lsb) {
            let mut line = Vec::new();
            line.extend_from_slice(pieces[0]);
            line.extend_from_slice(format!("[{index}]").as_bytes());
            line.extend_from_slice(pieces[1]);
            line.push(b'(');
            line.extend_from_slice(pieces[2]);
            line.extend_from_slice(format!(") >> {index}").as_bytes());
            line.extend_from_slice(pieces[3]);
            lines.push(line);
        }
        let mut joined = lines.join(&b'\n');
        if is_nba {
            let mut wrapped = b"\nbegin\n".to_vec();
            wrapped.append(&mut joined);
            wrapped.extend_from_slice(b"\nend\n");
            return wrapped;
        }
        joined
    }
}

impl SubMutator for SplitAssignment {
    fn name(&self) -> &'static str {
        "SplitAssignment"
    }

    fn plans(&self, tree: &Tree, src: &[u8], _rng: &mut StdRng) -> Result<Vec<Plan>, MutationError> {
        let mut plans = Vec::new();
        for m in assignments(tree.root_node(), src)? {
            let rvalue = single(&m, "rvalue")?;
            if is_concatenation(rvalue) {
                continue;
            }
            let assign = single(&m, "assignment")?;
            let lvalue = single(&m, "lvalue")?;

            let (msb, lsb) = match shape_of(text(lvalue, src), parent_of(lvalue, tree)?, src) {
                Ok(shape) => shape,
                Err(SkipOrError::Skip) => continue,
                Err(SkipOrError::Error(e)) => return Err(e),
            };

            plans.push(vec![Replacement::new(
                assign.start_byte(),
                assign.end_byte(),
                Self::bit_assignments(
                    assign,
                    lvalue,
                    rvalue,
                    msb,
                    lsb,
                    assign.kind() == "statement_item",
                    src,
                ),
            )]);
        }
        Ok(plans)
    }
}

/// Wraps a continuous assignment in a generate for-loop over the lvalue
/// range.
pub(crate) struct LoopAssignment;

impl SubMutator for LoopAssignment {
    fn name(&self) -> &'static str {
        "LoopAssignment"
    }

    fn plans(&self, tree: &Tree, src: &[u8], rng: &mut StdRng) -> Result<Vec<Plan>, MutationError> {
        let mut plans = Vec::new();
        for m in pattern_match(queries::CA_NO_SELECT_IN_LHS, tree.root_node(), src)? {
            let rvalue = single(&m, "rvalue")?;
            if is_concatenation(rvalue) {
                continue;
            }
            let assign = single(&m, "assignment")?;
            let lvalue = single(&m, "lvalue")?;

            // Loop bounds from the lvalue's range; msb is assumed highest.
            let (end, start) = match range_of(text(lvalue, src), parent_of(lvalue, tree)?, src) {
                Ok(range) => range,
                Err(SkipOrError::Skip) => continue,
                Err(SkipOrError::Error(e)) => return Err(e),
            };

            let genvar = random_id(rng, 5);
            let header = format!(
                "\nfor ({genvar}=({start}); {genvar}<=({end}); {genvar}={genvar}+1)\n"
            );
            plans.push(vec![
                Replacement::insert(
                    decl_insert_location(parent_of(assign, tree)?)?,
                    format!("genvar {genvar};\n"),
                ),
                Replacement::insert(assign.start_byte(), header),
                Replacement::insert(lvalue.end_byte(), format!("[{genvar}]")),
                Replacement::insert(rvalue.start_byte(), "("),
                Replacement::insert(rvalue.end_byte(), format!(") >> {genvar}")),
            ]);
        }
        Ok(plans)
    }
}

/// Duplicates an assignment, adding a bit-select inside the lvalue's range
/// to the copy's identifiers.
pub(crate) struct RedundantAssignment;

impl SubMutator for RedundantAssignment {
    fn name(&self) -> &'static str {
        "RedundantAssignment"
    }

    fn plans(&self, tree: &Tree, src: &[u8], rng: &mut StdRng) -> Result<Vec<Plan>, MutationError> {
        let mut plans = Vec::new();
        for m in assignments(tree.root_node(), src)? {
            let assign = single(&m, "assignment")?;
            let lvalue = single(&m, "lvalue")?;

            let (msb, lsb) = match range_of(text(lvalue, src), parent_of(lvalue, tree)?, src) {
                Ok(range) => range,
                Err(SkipOrError::Skip) => continue,
                Err(SkipOrError::Error(e)) => return Err(e),
            };
            let index = if rng.r#gen::<bool>() { msb } else { lsb };

            let is_nba = assign.kind() == "statement_item";
            let (prefix, suffix) = if is_nba {
                ("\nbegin\n", "\nend\n")
            } else {
                ("", "")
            };

            let mut plan = Vec::new();
            for id_match in pattern_match(queries::ALL_IDENTIFIERS_WITHOUT_SELECT, assign, src)? {
                if let Some(id) = id_match.get("identifier").and_then(|n| n.first()) {
                    plan.push(Replacement::insert(id.end_byte(), format!("[{index}]")));
                }
            }
            let mut duplicate = prefix.as_bytes().to_vec();
            duplicate.extend_from_slice(text(assign, src));
            plan.push(Replacement::insert(assign.start_byte(), duplicate));
            plan.push(Replacement::insert(assign.end_byte(), suffix));
            plans.push(plan);
        }
        Ok(plans)
    }
}

/// Extends a scalar declaration into an array and rewrites its references.
pub(crate) struct MakeArray;

impl MakeArray {
    fn all_references(identifier: &str, shape: &[usize], extra: usize) -> Vec<String> {
        let mut refs = vec![identifier.to_owned()];
        for size in shape {
            refs = refs
                .into_iter()
                .cartesian_product(0..size + extra)
                .map(|(base, index)| format!("{base}[{index}]"))
                .collect();
        }
        refs
    }

    fn partial_ref(rng: &mut StdRng, identifier: &str, shape: &[usize]) -> String {
        let refs = Self::all_references(identifier, shape, 0);
        let total: usize = shape.iter().product();
        let picked: Vec<String> = (0..rng.gen_range(1..=total.max(1)))
            .filter_map(|_| refs.choose(rng).cloned())
            .collect();
        format!("{{{}}}", picked.join(","))
    }

    fn complete_ref(rng: &mut StdRng, identifier: &str, shape: &[usize]) -> String {
        let mut refs = Self::all_references(identifier, shape, 1);
        refs.shuffle(rng);
        format!("{{{}}}", refs.join(","))
    }

    fn declaration_suffix(rng: &mut StdRng, shape: &[usize]) -> String {
        shape
            .iter()
            .map(|size| {
                if rng.r#gen::<bool>() {
                    format!("[0:{size}]")
                } else {
                    format!("[{size}:0]")
                }
            })
            .collect()
    }
}

impl SubMutator for MakeArray {
    fn name(&self) -> &'static str {
        "MakeArray"
    }

    fn plans(&self, tree: &Tree, src: &[u8], rng: &mut StdRng) -> Result<Vec<Plan>, MutationError> {
        let mut plans = Vec::new();
        for m in pattern_match(queries::ALL_NON_ARRAY_ITEM_DECLARATIONS, tree.root_node(), src)? {
            let identifier = single(&m, "identifier")?;
            let decl_assignment = single(&m, "decl_assignment")?;
            if mentions_clock(identifier, src) {
                continue;
            }
            let module = parent_of(identifier, tree)?;
            if module.kind() != "module_declaration" {
                continue;
            }

            let shape: Vec<usize> = (0..rng.gen_range(1..=2))
                .map(|_| rng.gen_range(2..=5))
                .collect();
            let id_text = node_string(identifier, src);

            let mut plan = vec![Replacement::new(
                identifier.end_byte(),
                decl_assignment.end_byte(),
                Self::declaration_suffix(rng, &shape),
            )];
            for ref_match in pattern_match(queries::ALL_REFERENCES, module, src)? {
                if let Some(node) = ref_match.get("id_lhs").and_then(|n| n.first()) {
                    if text(*node, src) == id_text.as_bytes() {
                        plan.push(Replacement::new(
                            node.start_byte(),
                            node.end_byte(),
                            Self::complete_ref(rng, &id_text, &shape),
                        ));
                    }
                } else if let Some(node) = ref_match.get("id_in_expr").and_then(|n| n.first()) {
                    if text(*node, src) == id_text.as_bytes() {
                        plan.push(Replacement::new(
                            node.start_byte(),
                            node.end_byte(),
                            Self::partial_ref(rng, &id_text, &shape),
                        ));
                    }
                }
            }
            plans.push(plan);
        }
        Ok(plans)
    }
}

/// Synthesizes a function from an existing right-hand side and substitutes
/// calls for some expressions.
pub(crate) struct MakeFunction;

impl MakeFunction {
    fn replaceable_exprs<'t>(
        module: Node<'t>,
        src: &[u8],
    ) -> Result<Vec<Node<'t>>, MutationError> {
        let mut search_space: Vec<Node<'t>> = pattern_match(queries::RHS_EXPRESSIONS, module, src)?
            .into_iter()
            .filter_map(|m| m.get("expr").and_then(|n| n.first()).copied())
            .collect();
        for cond in conditionals(module, src)? {
            if let Ok(if_node) = single(&cond, "if") {
                search_space.push(if_node);
            }
        }

        let mut result = Vec::new();
        for space in search_space {
            for m in pattern_match(queries::ALL_EXPRESSIONS, space, src)? {
                if let Some(expr) = m.get("expr").and_then(|n| n.first()) {
                    if !mentions_clock(*expr, src) {
                        result.push(*expr);
                    }
                }
            }
        }
        Ok(result)
    }

    fn non_overlapping<'t>(mut chosen: Vec<Node<'t>>) -> Vec<Node<'t>> {
        chosen.sort_by_key(Node::start_byte);
        let mut kept: Vec<Node<'t>> = Vec::new();
        let mut min_start = 0usize;
        for node in chosen {
            if node.start_byte() >= min_start {
                min_start = node.end_byte();
                kept.push(node);
            }
        }
        kept
    }
}

impl SubMutator for MakeFunction {
    fn name(&self) -> &'static str {
        "MakeFunction"
    }

    fn plans(&self, tree: &Tree, src: &[u8], rng: &mut StdRng) -> Result<Vec<Plan>, MutationError> {
        let mut plans = Vec::new();
        for m in pattern_match(queries::ALL_MODULE_DECLARATIONS, tree.root_node(), src)? {
            let module = single(&m, "module")?;
            let func_location = decl_insert_location(module)?;
            let function_name = random_id(rng, 5);

            let replaceable = Self::replaceable_exprs(module, src)?;
            if replaceable.is_empty() {
                continue;
            }

            // The function body is an existing right-hand side; its free
            // identifiers become the inputs.
            let rhs: Vec<Node<'_>> = pattern_match(queries::RHS_EXPRESSIONS, module, src)?
                .into_iter()
                .filter_map(|rm| rm.get("expr").and_then(|n| n.first()).copied())
                .collect();
            let Some(body) = rhs.choose(rng) else {
                continue;
            };
            let mut inputs: Vec<String> = pattern_match(queries::ALL_IDENTIFIERS_IN_EXPR, *body, src)?
                .into_iter()
                .filter_map(|im| im.get("identifier").and_then(|n| n.first()).copied())
                .map(|n| node_string(n, src))
                .collect();
            inputs.sort();
            inputs.dedup();

            let mut input_declarations = Vec::new();
            for input in &inputs {
                let fragment = type_of(input.as_bytes(), module, src)?;
                input_declarations.push(format!("input {fragment} {input};"));
            }
            let func_decl = format!(
                "\nfunction {function_name};\n    {}\n    {function_name} = {};\nendfunction\n",
                input_declarations.join("\n"),
                node_string(*body, src),
            );

            let mut plan = vec![Replacement::insert(func_location, func_decl)];
            let max_replacements = ((replaceable.len() as f64).log10().ceil() as usize) + 1;
            let call_sites = rng.gen_range(1..=max_replacements);
            let picked: Vec<Node<'_>> = replaceable
                .choose_multiple(rng, call_sites)
                .copied()
                .collect();
            for expr in Self::non_overlapping(picked) {
                let arguments = (0..inputs.len())
                    .filter_map(|_| replaceable.choose(rng))
                    .map(|arg| format!("({})", node_string(*arg, src)))
                    .collect::<Vec<_>>()
                    .join(", ");
                plan.push(Replacement::new(
                    expr.start_byte(),
                    expr.end_byte(),
                    format!("{function_name}({arguments})"),
                ));
            }
            plans.push(plan);
        }
        Ok(plans)
    }
}

/// Renames a module and rewrites a random subset of its instantiations,
/// keeping the original declaration under its old name.
pub(crate) struct DuplicateModule;

impl SubMutator for DuplicateModule {
    fn name(&self) -> &'static str {
        "DuplicateModule"
    }

    fn plans(&self, tree: &Tree, src: &[u8], rng: &mut StdRng) -> Result<Vec<Plan>, MutationError> {
        let mut plans = Vec::new();
        for m in pattern_match(queries::ALL_MODULE_DECLARATIONS, tree.root_node(), src)? {
            let module = single(&m, "module")?;
            let module_name = single(&m, "module_name")?;
            let old_name = node_string(module_name, src);
            let new_name = format!("{old_name}{}", random_id(rng, 3));

            let instantiations: Vec<Node<'_>> =
                pattern_match(queries::ALL_MODULE_INSTANTIATIONS, tree.root_node(), src)?
                    .into_iter()
                    .filter_map(|im| im.get("module_name").and_then(|n| n.first()).copied())
                    .filter(|n| text(*n, src) == old_name.as_bytes())
                    .collect();
            if instantiations.len() < 2 {
                continue;
            }

            let rewrite_count = rng.gen_range(1..instantiations.len());
            let rewritten = instantiations.choose_multiple(rng, rewrite_count).copied();

            let mut plan = vec![Replacement::new(
                module_name.start_byte(),
                module_name.end_byte(),
                new_name.clone(),
            )];
            for instantiation in rewritten {
                plan.push(Replacement::new(
                    instantiation.start_byte(),
                    instantiation.end_byte(),
                    new_name.clone(),
                ));
            }
            let mut appended = b"\n".to_vec();
            appended.extend_from_slice(text(module, src));
            plan.push(Replacement::insert(tree.root_node().end_byte(), appended));
            plans.push(plan);
        }
        Ok(plans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::BytesEditor;
    use rand::SeedableRng;
    use rtlcross_common::verilog;

    const ADDER: &str = "
module adder(input [3:0] a, input [3:0] b, output [3:0] sum);
  wire [3:0] partial;
  assign partial = a + b;
  assign sum = partial;
endmodule
";

    const SEQUENTIAL: &str = "
module seq(input clk, input rst, output [1:0] q);
  reg [1:0] state;
  assign q = state;
  always @(posedge clk)
    if (rst)
      state <= 0;
    else
      state <= state + 1;
endmodule
";

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    fn apply_first(src: &str, plans: Vec<Plan>) -> String {
        let plan = plans.into_iter().next().expect("at least one plan");
        let mut editor = BytesEditor::new(src.as_bytes().to_vec(), plan).unwrap();
        editor.apply();
        String::from_utf8(editor.into_data()).unwrap()
    }

    #[test]
    fn binary_operator_sites_are_found() {
        let tree = verilog::parse(ADDER.as_bytes()).unwrap();
        let plans = ChangeBinaryOp.plans(&tree, ADDER.as_bytes(), &mut rng()).unwrap();

        // Exactly one binary expression: `a + b`.
        assert_eq!(plans.len(), 1);
        let replacement = &plans[0][0];
        assert_eq!(
            &ADDER.as_bytes()[replacement.start_byte..replacement.end_byte],
            b"+"
        );
        assert!(BINARY_OPERATORS.contains(&std::str::from_utf8(&replacement.substitute).unwrap()));
    }

    #[test]
    fn remove_cond_unwraps_branches() {
        let tree = verilog::parse(SEQUENTIAL.as_bytes()).unwrap();
        let plans = RemoveCond.plans(&tree, SEQUENTIAL.as_bytes(), &mut rng()).unwrap();

        assert!(!plans.is_empty());
        let mutated = apply_first(SEQUENTIAL, plans);
        assert!(!mutated.contains("if (rst)"));
        assert!(mutated.contains("state <= 0;"));
        assert!(mutated.contains("state <= state + 1;"));
    }

    #[test]
    fn split_assignment_rewrites_per_bit() {
        let tree = verilog::parse(ADDER.as_bytes()).unwrap();
        let plans = SplitAssignment.plans(&tree, ADDER.as_bytes(), &mut rng()).unwrap();

        // Both continuous assignments have a 4-bit lvalue.
        assert_eq!(plans.len(), 2);
        let mutated = apply_first(ADDER, plans);
        assert!(mutated.contains("partial[0]"));
        assert!(mutated.contains("partial[3]"));
        assert!(mutated.contains(") >> 3"));
    }

    #[test]
    fn make_repeat_injects_a_parameter() {
        let tree = verilog::parse(SEQUENTIAL.as_bytes()).unwrap();
        let plans = MakeRepeat.plans(&tree, SEQUENTIAL.as_bytes(), &mut rng()).unwrap();

        assert!(!plans.is_empty());
        let mutated = apply_first(SEQUENTIAL, plans);
        assert!(mutated.contains("parameter _"));
        assert!(mutated.contains("repeat (_"));
    }

    #[test]
    fn loop_assignment_wraps_the_range() {
        let tree = verilog::parse(ADDER.as_bytes()).unwrap();
        let plans = LoopAssignment.plans(&tree, ADDER.as_bytes(), &mut rng()).unwrap();

        assert_eq!(plans.len(), 2);
        let mutated = apply_first(ADDER, plans);
        assert!(mutated.contains("genvar _"));
        assert!(mutated.contains("<=(3)"));
    }

    #[test]
    fn duplicate_module_needs_two_instantiations() {
        let tree = verilog::parse(ADDER.as_bytes()).unwrap();
        let plans = DuplicateModule.plans(&tree, ADDER.as_bytes(), &mut rng()).unwrap();
        assert!(plans.is_empty());

        let two_instances = "
module leaf(input a, output b);
  assign b = a;
endmodule
module top(input x, output y, output z);
  leaf u0(x, y);
  leaf u1(x, z);
endmodule
";
        let tree = verilog::parse(two_instances.as_bytes()).unwrap();
        let plans = DuplicateModule
            .plans(&tree, two_instances.as_bytes(), &mut rng())
            .unwrap();
        // Only `leaf` qualifies; `top` is never instantiated.
        assert_eq!(plans.len(), 1);
        let mutated = apply_first(two_instances, plans);
        // The original declaration is appended back under its old name.
        assert_eq!(mutated.matches("module leaf(").count(), 2);
    }

    #[test]
    fn scalar_lvalues_are_skipped_silently() {
        let scalar = "
module m(input a, output o);
  wire w;
  assign w = a;
  assign o = w;
endmodule
";
        let tree = verilog::parse(scalar.as_bytes()).unwrap();
        let plans = SplitAssignment.plans(&tree, scalar.as_bytes(), &mut rng()).unwrap();
        assert!(plans.is_empty());
    }
}

