#![allow(missing_docs)]

use rand::SeedableRng;
use rand::rngs::StdRng;

use rtlcross_circuit::{CircuitClass, CircuitKind};
use rtlcross_pipeline::translator::all_instances;
use rtlcross_pipeline::{
    Conversion, StrategyFile, Translator, WorldMap, registry, sample::all_conversions,
};

fn names(chain: &[std::sync::Arc<dyn Translator>]) -> Vec<&'static str> {
    chain.iter().map(|t| t.name()).collect()
}

#[test]
fn travel_finds_every_verilog_to_smt_pipeline() {
    let world = WorldMap::full();
    let paths = world.travel(CircuitKind::Verilog, CircuitClass::Smt);
    let found: Vec<Vec<&str>> = paths.iter().map(|p| names(p)).collect();

    assert!(found.contains(&vec!["YosysWriteSmt2"]));
    assert!(found.contains(&vec!["VerilatorTransformer", "KleeSymbolicExecution"]));
    assert!(found.contains(&vec!["YosysWriteCxx", "KleeSymbolicExecution"]));
}

#[test]
fn travel_respects_the_sink_class() {
    let world = WorldMap::full();

    let to_verilog = world.travel(CircuitKind::SystemVerilog, CircuitClass::Kind(CircuitKind::Verilog));
    let found: Vec<Vec<&str>> = to_verilog.iter().map(|p| names(p)).collect();
    assert!(found.contains(&vec!["Sv2v"]));
    assert!(found.contains(&vec!["SurelogPlugin"]));

    // No edge leads back from SMT.
    assert!(world.travel(CircuitKind::YosysSmt, CircuitClass::Cpp).is_empty());
}

#[test]
fn edge_dump_names_every_translator() {
    let mut out = Vec::new();
    WorldMap::full().dump_edges(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();

    assert!(text.contains("VerilogCircuit-YosysWriteSmt2->YosysSmtCircuit: 1"));
    assert!(text.contains("SystemVerilogCircuit-Sv2v->VerilogCircuit: 4"));
}

#[test]
fn instance_enumeration_counts_combinations() {
    let mut rng = StdRng::seed_from_u64(3);
    let sv2v = registry()
        .into_iter()
        .find(|t| t.name() == "Sv2v")
        .unwrap();

    // Two options: op counts 0, 1, 2 give 1 + 2 + 1 combinations.
    let instances = all_instances(&sv2v, 3, &mut rng);
    assert_eq!(instances.len(), 4);
    assert!(instances[0].policy.extra_args.is_empty());

    // Translators without options expose a single default instance.
    let write_smt2 = registry()
        .into_iter()
        .find(|t| t.name() == "YosysWriteSmt2")
        .unwrap();
    assert_eq!(all_instances(&write_smt2, 3, &mut rng).len(), 1);
}

#[test]
fn conversion_space_multiplies_per_step_instances() {
    let mut rng = StdRng::seed_from_u64(11);
    let conversions = all_conversions(
        CircuitKind::SystemVerilog,
        CircuitClass::Kind(CircuitKind::Verilog),
        2,
        &mut rng,
    );

    // sv2v and surelog, each with op counts 0 and 1: 3 + 18 instances.
    assert_eq!(conversions.len(), 21);
}

#[test]
fn surelog_only_participates_in_direct_lowering() {
    let mut rng = StdRng::seed_from_u64(11);
    let to_smt = all_conversions(CircuitKind::SystemVerilog, CircuitClass::Smt, 1, &mut rng);

    assert!(
        to_smt
            .iter()
            .flat_map(|c| &c.chain)
            .all(|step| step.translator.name() != "SurelogPlugin")
    );
}

#[test]
fn strategies_round_trip_through_json() {
    let mut rng = StdRng::seed_from_u64(5);
    let conversions = all_conversions(
        CircuitKind::SystemVerilog,
        CircuitClass::Kind(CircuitKind::Verilog),
        2,
        &mut rng,
    );

    let json = serde_json::to_string(&StrategyFile::from_conversions(&conversions)).unwrap();
    let parsed: StrategyFile = serde_json::from_str(&json).unwrap();
    let restored = parsed.conversions().unwrap();

    assert_eq!(restored.len(), conversions.len());
    for (restored, original) in restored.iter().zip(&conversions) {
        assert_eq!(restored.to_steps(), original.to_steps());
    }
}

#[test]
fn single_conversion_strategies_are_accepted() {
    let json = r#"[{"translator": "YosysWriteSmt2", "extra_args": []}]"#;
    let parsed: StrategyFile = serde_json::from_str(json).unwrap();
    let conversions = parsed.conversions().unwrap();

    assert_eq!(conversions.len(), 1);
    assert_eq!(conversions[0].chain.len(), 1);
    assert_eq!(conversions[0].to_string(), "Conversion(YosysWriteSmt2([]))");
}

#[test]
fn unknown_translators_are_rejected() {
    let json = r#"[{"translator": "NoSuchTool"}]"#;
    let parsed: StrategyFile = serde_json::from_str(json).unwrap();
    assert!(parsed.conversions().is_err());
}

#[test]
fn conversions_render_their_chain() {
    let parsed: StrategyFile = serde_json::from_str(
        r#"[[{"translator": "Sv2v", "extra_args": ["--siloed"]},
             {"translator": "YosysWriteSmt2", "extra_args": []}]]"#,
    )
    .unwrap();
    let conversion: Conversion = parsed.conversions().unwrap().remove(0);

    assert_eq!(
        conversion.to_string(),
        "Conversion(Sv2v([\"--siloed\"]), YosysWriteSmt2([]))"
    );
}
