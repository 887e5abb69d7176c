//! SMT circuits: a design as a transition relation over symbolic states.

use rtlcross_ir::crossbar::{KleeSmtCrossbar, SignalValues, YosysSmtCrossbar};
use rtlcross_ir::{HierarchicalPath, IrError, ModelTreeView};
use rtlcross_smt::{FunctionTable, SymbolRenamer, Term};

use crate::circuit::CircuitError;
use crate::equiv::{EquivError, EquivOptions, check_equivalence};
use rtlcross_common::Workspace;

/// Which backend produced the transition relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtFlavor {
    /// yosys `write_smt2`.
    Yosys,
    /// KLEE path conditions over a compiled C++ model.
    Klee,
}

/// How the transition relation is expressed in the preamble.
#[derive(Debug, Clone)]
pub enum TransitionKind {
    /// `(|<top>_t| state next_state)` plus `|<top>_h|` well-formedness used
    /// as the precondition.
    Function,
    /// A disjunction of per-path functions `(path_k state next_state)`.
    Paths(Vec<String>),
}

/// A circuit encoded as SMT: raw definitions replayed into the solver, plus
/// everything needed to build state terms and signal accessors on top.
#[derive(Debug, Clone)]
pub struct SmtCircuit {
    /// The producing backend.
    pub flavor: SmtFlavor,
    /// Structured view of the design.
    pub model: ModelTreeView,
    /// SMT-LIBv2 definitions, already namespaced by the renamer.
    pub preamble: String,
    /// Sort of a state value.
    pub state_sort: Term,
    /// Original top module name (before renaming).
    pub top: String,
    /// Per-circuit symbol namespacing.
    pub renamer: SymbolRenamer,
    /// Return sorts of the accessor functions in the preamble.
    pub functions: FunctionTable,
    /// Shape of the transition relation.
    pub transition_kind: TransitionKind,
    /// Accessor-name prefix of the KLEE flavor (empty for yosys).
    pub symbol_prefix: String,
    /// Whether the relation only overapproximates (`f' ⇒ f`); KLEE results
    /// are partial because unexplored paths are missing.
    pub is_partial: bool,
}

impl SmtCircuit {
    /// The transition relation applied to two states.
    #[must_use]
    pub fn transition(&self, state: &Term, next_state: &Term) -> Term {
        match &self.transition_kind {
            TransitionKind::Function => Term::app(
                self.renamer.rename(&format!("{}_t", self.top)),
                vec![state.clone(), next_state.clone()],
            ),
            TransitionKind::Paths(paths) => Term::or(
                paths
                    .iter()
                    .map(|p| Term::app(p.clone(), vec![state.clone(), next_state.clone()]))
                    .collect(),
            ),
        }
    }

    /// The state-space normalization assumed for both states.
    #[must_use]
    pub fn precondition(&self, state: &Term, next_state: &Term) -> Term {
        match &self.transition_kind {
            TransitionKind::Function => {
                let h = self.renamer.rename(&format!("{}_h", self.top));
                Term::and(vec![
                    Term::app(h.clone(), vec![state.clone()]),
                    Term::app(h, vec![next_state.clone()]),
                ])
            }
            TransitionKind::Paths(_) => Term::bool(true),
        }
    }

    /// The value stream of one item path at one state.
    ///
    /// A lookup miss is tolerated exactly when the item exists as a
    /// non-register declaration: the backend optimized it out, and it reads
    /// as an endless stream of 1-bit zeros.
    pub fn signal_values(
        &self,
        path: &HierarchicalPath,
        state: &Term,
    ) -> Result<SignalValues, CircuitError> {
        let lookup = self.signal_values_inner(path, state);
        match lookup {
            Err(IrError::ItemNotFound { decl: Some(decl), .. }) if !decl.is_register() => {
                Ok(SignalValues::ZeroStream)
            }
            other => Ok(other?),
        }
    }

    fn signal_values_inner(
        &self,
        path: &HierarchicalPath,
        state: &Term,
    ) -> Result<SignalValues, IrError> {
        match self.flavor {
            SmtFlavor::Yosys => {
                let crossbar = YosysSmtCrossbar::from_model(vec![path.clone()]);
                let mut per_path =
                    crossbar.to_data(&self.model, &self.functions, &self.renamer)?;
                match per_path.pop().expect("one path in, one result out") {
                    Some(accessors) => Ok(SignalValues::Values(
                        accessors.iter().map(|a| a.at_state(state)).collect(),
                    )),
                    None => Ok(SignalValues::ZeroStream),
                }
            }
            SmtFlavor::Klee => {
                let crossbar = KleeSmtCrossbar::from_model(vec![path.clone()]);
                let accessors = crossbar.to_data(&self.model, &self.symbol_prefix)?;
                Ok(SignalValues::Values(
                    accessors.iter().map(|a| a.at_state(state)).collect(),
                ))
            }
        }
    }

    /// Decides equivalence of this circuit against the others with the miter
    /// protocol.
    pub fn is_equivalent_to(
        &self,
        others: &[&SmtCircuit],
        options: EquivOptions,
        ws: &Workspace,
    ) -> Result<bool, EquivError> {
        let mut circuits = vec![self];
        circuits.extend_from_slice(others);
        check_equivalence(&circuits, options, ws)
    }

    /// View of the model (used by the comparators).
    #[must_use]
    pub const fn model(&self) -> &ModelTreeView {
        &self.model
    }
}
