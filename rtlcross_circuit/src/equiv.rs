//! The SMT equivalence engine.
//!
//! Given SMT circuits sharing an I/O contract, the engine builds a miter:
//! fresh current/next states per circuit, the negated conjunction of the
//! transition relations (or the overapproximation form when one circuit is
//! partial), and equality constraints over the aligned signals. UNSAT of the
//! whole system witnesses equivalence.

use rand::Rng;
use thiserror::Error;
use tracing::debug;

use rtlcross_common::Workspace;
use rtlcross_common::consts::REPORT_FILENAME;
use rtlcross_ir::crossbar::SignalValues;
use rtlcross_ir::{HierarchicalPath, IrError, ViewKind};
use rtlcross_smt::{SatResult, SmtError, SmtSession, Term, TypedTerm};

use crate::circuit::CircuitError;
use crate::smt::SmtCircuit;

/// Options of one equivalence check.
#[derive(Debug, Clone, Copy)]
pub struct EquivOptions {
    /// Concretize shared signals to specific values instead of asserting
    /// structural equality (faster, incomplete for non-equivalence).
    pub quick: bool,
    /// On SAT, extract and persist a human-readable counterexample report.
    pub counterexample: bool,
}

/// Failures of equivalence checking.
#[derive(Debug, Error)]
pub enum EquivError {
    /// Solver session failure.
    #[error(transparent)]
    Smt(#[from] SmtError),
    /// Model lookup failure.
    #[error(transparent)]
    Ir(#[from] IrError),
    /// Circuit-level signal lookup failure.
    #[error(transparent)]
    Circuit(#[from] CircuitError),
    /// Tool failure (the Verilog-vs-Verilog checker).
    #[error(transparent)]
    Tool(#[from] rtlcross_common::ToolError),
    /// Filesystem failure while persisting the report.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The requested comparison is outside the engine's contract.
    #[error("{0}")]
    Unsupported(String),
    /// The solver returned `unknown` (resource bound hit).
    #[error("solver returned unknown")]
    SolverUnknown,
    /// Two circuits disagree on the element count of a shared signal.
    #[error("misaligned value streams for signal '{item}'")]
    Misaligned {
        /// The signal name.
        item: String,
    },
}

struct CircuitState<'a> {
    circuit: &'a SmtCircuit,
    state: Term,
}

/// One aligned signal between two circuit states.
struct AlignedSignal {
    name: String,
    left: SignalValues,
    right: SignalValues,
}

impl AlignedSignal {
    /// Width-aligned `(left, right)` term pairs. A stream that the backend
    /// optimized out pairs every element of the finite side with a 1-bit
    /// zero.
    fn pairs(&self) -> Vec<(TypedTerm, TypedTerm)> {
        let zero = || TypedTerm::new(Term::atom("#b0"), 1);
        let raw: Vec<(TypedTerm, TypedTerm)> = match (&self.left, &self.right) {
            (SignalValues::Values(ls), SignalValues::Values(rs)) => {
                ls.iter().cloned().zip(rs.iter().cloned()).collect()
            }
            (SignalValues::Values(ls), SignalValues::ZeroStream) => {
                ls.iter().cloned().map(|l| (l, zero())).collect()
            }
            (SignalValues::ZeroStream, SignalValues::Values(rs)) => {
                rs.iter().cloned().map(|r| (zero(), r)).collect()
            }
            (SignalValues::ZeroStream, SignalValues::ZeroStream) => Vec::new(),
        };
        raw.into_iter()
            .map(|(l, r)| {
                let width = l.width.max(r.width);
                (l.zero_extend_to(width), r.zero_extend_to(width))
            })
            .collect()
    }
}

/// Compares the signals of two circuit states.
struct BinaryComparator<'a> {
    this: &'a CircuitState<'a>,
    that: &'a CircuitState<'a>,
}

impl<'a> BinaryComparator<'a> {
    const fn new(this: &'a CircuitState<'a>, that: &'a CircuitState<'a>) -> Self {
        Self { this, that }
    }

    /// The paths compared for one view: the whole view on a self-comparison,
    /// the intersection of both models' views across distinct circuits.
    fn common_paths(&self, kind: ViewKind) -> Vec<HierarchicalPath> {
        let this_paths: Vec<HierarchicalPath> = self
            .this
            .circuit
            .model()
            .view(kind)
            .into_iter()
            .map(|(p, _)| p)
            .collect();
        if std::ptr::eq(self.this.circuit, self.that.circuit) {
            return this_paths;
        }
        let that_paths: std::collections::HashSet<HierarchicalPath> = self
            .that
            .circuit
            .model()
            .view(kind)
            .into_iter()
            .map(|(p, _)| p)
            .collect();
        this_paths
            .into_iter()
            .filter(|p| that_paths.contains(p))
            .collect()
    }

    fn aligned(&self, kind: ViewKind) -> Result<Vec<AlignedSignal>, EquivError> {
        let mut signals = Vec::new();
        for path in self.common_paths(kind) {
            let left = self.this.circuit.signal_values(&path, &self.this.state)?;
            let right = self.that.circuit.signal_values(&path, &self.that.state)?;

            if let (SignalValues::Values(ls), SignalValues::Values(rs)) = (&left, &right) {
                if ls.len() != rs.len() {
                    return Err(EquivError::Misaligned {
                        item: path.item.clone(),
                    });
                }
            }
            if matches!(
                (&left, &right),
                (SignalValues::ZeroStream, SignalValues::ZeroStream)
            ) {
                continue;
            }
            signals.push(AlignedSignal {
                name: path.item,
                left,
                right,
            });
        }
        Ok(signals)
    }

    /// Structural equality of every aligned signal.
    fn always_equal(&self, kind: ViewKind) -> Result<Vec<Term>, EquivError> {
        let mut equations = Vec::new();
        for signal in self.aligned(kind)? {
            for (l, r) in signal.pairs() {
                equations.push(Term::eq(l.term, r.term));
            }
        }
        Ok(equations)
    }

    /// Equality with the signals additionally pinned to a value (given, or
    /// random per signal). Constant operands keep plain equality.
    fn equal_to_specific_value(
        &self,
        kind: ViewKind,
        value: Option<u64>,
        rng: &mut impl Rng,
    ) -> Result<Vec<Term>, EquivError> {
        let mut equations = Vec::new();
        for signal in self.aligned(kind)? {
            for (l, r) in signal.pairs() {
                let equal = Term::eq(l.term.clone(), r.term.clone());
                if l.term.is_literal() || r.term.is_literal() {
                    equations.push(equal);
                } else {
                    let pinned = match value {
                        Some(v) => Term::bv(v, l.width),
                        None => Term::random_bv(rng, l.width),
                    };
                    equations.push(Term::and(vec![Term::eq(pinned, r.term), equal]));
                }
            }
        }
        Ok(equations)
    }

    /// `(signal, left values, right values)` rows under the current model.
    fn extract_rows(
        &self,
        kind: ViewKind,
        session: &mut SmtSession,
    ) -> Result<Vec<(String, String, String)>, EquivError> {
        let mut rows = Vec::new();
        for signal in self.aligned(kind)? {
            let format_side = |side: &SignalValues, session: &mut SmtSession| -> Result<String, EquivError> {
                match side {
                    SignalValues::ZeroStream => Ok("OPT_OUT".to_owned()),
                    SignalValues::Values(values) => {
                        let terms: Vec<Term> = values.iter().map(|v| v.term.clone()).collect();
                        let evaluated = session.get_value(&terms)?;
                        Ok(evaluated
                            .iter()
                            .map(|(_, value)| match value.literal_value() {
                                Some(v) => format!("{v:#x}"),
                                None => value.to_string(),
                            })
                            .collect::<Vec<_>>()
                            .join(","))
                    }
                }
            };
            let left = format_side(&signal.left, session)?;
            let right = format_side(&signal.right, session)?;
            rows.push((signal.name, left, right));
        }
        Ok(rows)
    }
}

/// Pairwise comparison across a whole list of circuit states.
struct PairwiseComparator<'a> {
    subs: Vec<BinaryComparator<'a>>,
}

impl<'a> PairwiseComparator<'a> {
    fn new(states: &'a [CircuitState<'a>]) -> Result<Self, EquivError> {
        if states.len() < 2 {
            return Err(EquivError::Unsupported(
                "expects 2 or more comparees".to_owned(),
            ));
        }
        Ok(Self {
            subs: states
                .windows(2)
                .map(|pair| BinaryComparator::new(&pair[0], &pair[1]))
                .collect(),
        })
    }

    fn always_equal(&self, kind: ViewKind) -> Result<Vec<Term>, EquivError> {
        let mut equations = Vec::new();
        for sub in &self.subs {
            equations.extend(sub.always_equal(kind)?);
        }
        Ok(equations)
    }

    fn equal_to_specific_value(
        &self,
        kind: ViewKind,
        value: Option<u64>,
        rng: &mut impl Rng,
    ) -> Result<Vec<Term>, EquivError> {
        let mut equations = Vec::new();
        for sub in &self.subs {
            equations.extend(sub.equal_to_specific_value(kind, value, rng)?);
        }
        Ok(equations)
    }

    fn extract_rows(
        &self,
        kind: ViewKind,
        session: &mut SmtSession,
    ) -> Result<Vec<(String, String, String)>, EquivError> {
        self.subs[0].extract_rows(kind, session)
    }
}

fn markdown_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    out.push_str(&format!("| {} |\n", headers.join(" | ")));
    out.push_str(&format!(
        "|{}\n",
        "---|".repeat(headers.len())
    ));
    for row in rows {
        out.push_str(&format!("| {} |\n", row.join(" | ")));
    }
    out
}

/// Decides pairwise equivalence of the given circuits.
pub fn check_equivalence(
    circuits: &[&SmtCircuit],
    options: EquivOptions,
    ws: &Workspace,
) -> Result<bool, EquivError> {
    if circuits.is_empty() {
        return Err(EquivError::Unsupported(
            "equivalence of an empty circuit list".to_owned(),
        ));
    }

    let mut session = SmtSession::spawn()?;
    let mut rng = rand::thread_rng();

    // A circuit compared against itself shares its symbol namespace; its
    // definitions must enter the session only once.
    let mut loaded_tags = std::collections::HashSet::new();
    for circuit in circuits {
        if loaded_tags.insert(circuit.renamer.tag().to_owned()) {
            session.send_raw(&circuit.preamble)?;
        }
    }

    // Two fresh states per circuit.
    let mut currents = Vec::new();
    let mut nexts = Vec::new();
    for (i, circuit) in circuits.iter().enumerate() {
        currents.push(CircuitState {
            circuit: *circuit,
            state: session.declare_const(&format!("cur{i}"), &circuit.state_sort)?,
        });
        nexts.push(CircuitState {
            circuit: *circuit,
            state: session.declare_const(&format!("next{i}"), &circuit.state_sort)?,
        });
    }

    let transitions: Vec<Term> = circuits
        .iter()
        .enumerate()
        .map(|(i, c)| c.transition(&currents[i].state, &nexts[i].state))
        .collect();

    let partial_indices: Vec<usize> = circuits
        .iter()
        .enumerate()
        .filter(|(_, c)| c.is_partial)
        .map(|(i, _)| i)
        .collect();

    match partial_indices.as_slice() {
        [] => {
            // Full equivalence: some circuit must disagree on validity.
            let agreements: Vec<Term> = transitions
                .windows(2)
                .map(|pair| Term::eq(pair[0].clone(), pair[1].clone()))
                .collect();
            session.assert(&Term::not(Term::and(agreements)))?;
        }
        [p] => {
            // One overapproximation: a transition it claims valid must be
            // rejected by some total circuit.
            let dissent: Vec<Term> = transitions
                .iter()
                .enumerate()
                .filter(|(i, _)| i != p)
                .map(|(_, t)| Term::not(t.clone()))
                .collect();
            session.assert(&Term::and(vec![
                Term::or(dissent),
                transitions[*p].clone(),
            ]))?;
        }
        _ => {
            return Err(EquivError::Unsupported(
                "comparing >=2 partial models is not supported".to_owned(),
            ));
        }
    }

    let current_comparator = PairwiseComparator::new(&currents)?;
    let next_comparator = PairwiseComparator::new(&nexts)?;

    let mut equations = Vec::new();
    {
        let collect_pairwise = |comparator: &PairwiseComparator<'_>,
                                    kind: ViewKind,
                                    rng: &mut rand::rngs::ThreadRng|
         -> Result<Vec<Term>, EquivError> {
            if options.quick {
                comparator.equal_to_specific_value(kind, None, rng)
            } else {
                comparator.always_equal(kind)
            }
        };

        // Registers and wires agree at both states. Wires are included to
        // catch yosys corner cases where an internal net becomes an
        // uninterpreted function.
        for comparator in [&current_comparator, &next_comparator] {
            equations.extend(collect_pairwise(comparator, ViewKind::InternalRegisters, &mut rng)?);
            equations.extend(collect_pairwise(comparator, ViewKind::InternalWires, &mut rng)?);
        }

        // Output ports agree at the next state.
        equations.extend(collect_pairwise(&next_comparator, ViewKind::OutputPorts, &mut rng)?);
    }

    // Input ports hold across the two cycles of each circuit, and agree
    // between circuits at the current state.
    for i in 0..circuits.len() {
        let self_comparator = BinaryComparator::new(&currents[i], &nexts[i]);
        equations.extend(if options.quick {
            self_comparator.equal_to_specific_value(ViewKind::InputPorts, None, &mut rng)?
        } else {
            self_comparator.always_equal(ViewKind::InputPorts)?
        });
    }
    equations.extend(if options.quick {
        current_comparator.equal_to_specific_value(ViewKind::InputPorts, None, &mut rng)?
    } else {
        current_comparator.always_equal(ViewKind::InputPorts)?
    });

    session.assert(&Term::and(equations))?;

    for (i, circuit) in circuits.iter().enumerate() {
        session.assert(&circuit.precondition(&currents[i].state, &nexts[i].state))?;
    }

    let verdict = session.check_sat()?;
    debug!(?verdict, circuits = circuits.len(), "equivalence check solved");

    match verdict {
        SatResult::Unsat => Ok(true),
        SatResult::Unknown => Err(EquivError::SolverUnknown),
        SatResult::Sat => {
            if options.counterexample {
                write_report(
                    circuits,
                    &transitions,
                    &current_comparator,
                    &next_comparator,
                    &mut session,
                    &mut rng,
                    ws,
                )?;
            }
            Ok(false)
        }
    }
}

/// Greedily pins signal classes to zero (keeping only pins that stay SAT, as
/// a formatting stabilizer), then renders the counterexample tables.
fn write_report(
    circuits: &[&SmtCircuit],
    transitions: &[Term],
    current_comparator: &PairwiseComparator<'_>,
    next_comparator: &PairwiseComparator<'_>,
    session: &mut SmtSession,
    rng: &mut impl Rng,
    ws: &Workspace,
) -> Result<(), EquivError> {
    for kind in [
        ViewKind::InputPorts,
        ViewKind::InternalRegisters,
        ViewKind::InternalWires,
    ] {
        for equation in current_comparator.equal_to_specific_value(kind, Some(0), rng)? {
            session.push()?;
            session.assert(&equation)?;
            if session.check_sat()? != SatResult::Sat {
                session.pop()?;
            }
        }
    }
    // Re-solve so the model reflects the retained pins.
    if session.check_sat()? != SatResult::Sat {
        return Err(EquivError::Unsupported(
            "counterexample vanished while pinning signals".to_owned(),
        ));
    }

    let mut report = String::from("This file was generated after a non-equivalence case found.\n");

    report.push_str("\n# Transformation validity:\n");
    let validity = session.get_value(transitions)?;
    let headers: Vec<String> = circuits
        .iter()
        .enumerate()
        .map(|(i, c)| {
            format!(
                "({i}) {}",
                match c.flavor {
                    crate::smt::SmtFlavor::Yosys => "YosysSmtCircuit",
                    crate::smt::SmtFlavor::Klee => "KleeSmtCircuit",
                }
            )
        })
        .collect();
    let row: Vec<String> = validity.iter().map(|(_, v)| v.to_string()).collect();
    report.push_str(&markdown_table(&headers, &[row]));

    let sections: [(&str, ViewKind, &PairwiseComparator<'_>); 4] = [
        ("`internal_registers` of **current** state", ViewKind::InternalRegisters, current_comparator),
        ("`input_ports` of **current/next** state", ViewKind::InputPorts, current_comparator),
        ("`internal_registers` of **next** state", ViewKind::InternalRegisters, next_comparator),
        ("`output_ports` of **next** state", ViewKind::OutputPorts, next_comparator),
    ];
    for (title, kind, comparator) in sections {
        report.push_str(&format!("\n# {title}:\n"));
        let rows: Vec<Vec<String>> = comparator
            .extract_rows(kind, session)?
            .into_iter()
            .map(|(name, left, right)| vec![name, left, right])
            .collect();
        let headers = ["Signal", "Value(0)", "Value(1)"].map(String::from);
        report.push_str(&markdown_table(&headers, &rows));
    }

    ws.save_to_file(report, REPORT_FILENAME)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_tables_render_github_style() {
        let table = markdown_table(
            &["Signal".to_owned(), "Value(0)".to_owned()],
            &[vec!["count".to_owned(), "0x3".to_owned()]],
        );
        assert_eq!(table, "| Signal | Value(0) |\n|---|---|\n| count | 0x3 |\n");
    }

    #[test]
    fn aligned_pairs_zero_extend_to_the_wider_side() {
        let signal = AlignedSignal {
            name: "count".to_owned(),
            left: SignalValues::Values(vec![TypedTerm::new(Term::atom("a"), 4)]),
            right: SignalValues::Values(vec![TypedTerm::new(Term::atom("b"), 8)]),
        };
        let pairs = signal.pairs();

        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0.term.to_string(), "((_ zero_extend 4) a)");
        assert_eq!(pairs[0].1.term.to_string(), "b");
    }

    #[test]
    fn optimized_out_sides_read_as_one_bit_zeros() {
        let signal = AlignedSignal {
            name: "dead".to_owned(),
            left: SignalValues::ZeroStream,
            right: SignalValues::Values(vec![
                TypedTerm::new(Term::atom("x"), 1),
                TypedTerm::new(Term::atom("y"), 1),
            ]),
        };
        let pairs = signal.pairs();

        // The endless zero stream is bounded by the finite side.
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].0.term.to_string(), "#b0");

        let both_gone = AlignedSignal {
            name: "gone".to_owned(),
            left: SignalValues::ZeroStream,
            right: SignalValues::ZeroStream,
        };
        assert!(both_gone.pairs().is_empty());
    }
}
