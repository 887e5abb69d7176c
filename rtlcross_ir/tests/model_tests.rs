#![allow(missing_docs)]

use std::collections::HashSet;
use std::sync::Arc;

use ahash::AHashMap;

use rtlcross_ir::crossbar::{KleeSmtCrossbar, YosysSmtCrossbar};
use rtlcross_ir::{HierarchicalPath, IrError, Layout, ModelDesign, ModelTreeView, ModuleItem, ViewKind};
use rtlcross_smt::{FunctionTable, SymbolRenamer, Term};

const COUNTER_JSON: &str = r#"{
  "modules": {
    "top": {
      "ports": {
        "clk": {"direction": "input", "bits": [2]},
        "q": {"direction": "output", "bits": [3, 4, 5, 6]}
      },
      "netnames": {
        "clk": {"hide_name": 0, "bits": [2]},
        "q": {"hide_name": 0, "bits": [3, 4, 5, 6]},
        "count": {"hide_name": 0, "bits": [3, 4, 5, 6]},
        "$aux$1": {"hide_name": 1, "bits": [9]},
        "buf[0]": {"hide_name": 0, "bits": [10, 11]},
        "buf[1]": {"hide_name": 0, "bits": [12, 13]}
      },
      "cells": {
        "u0": {"hide_name": 0, "type": "sub"},
        "$add$1": {"hide_name": 1, "type": "$add"}
      }
    },
    "sub": {
      "ports": {
        "d": {"direction": "input", "bits": [2]}
      },
      "netnames": {
        "r": {"hide_name": 0, "bits": [2]}
      },
      "cells": {}
    }
  }
}"#;

fn registers() -> AHashMap<String, HashSet<String>> {
    let mut map = AHashMap::new();
    map.insert(
        "top".to_owned(),
        HashSet::from(["count".to_owned(), "buf".to_owned()]),
    );
    map.insert("sub".to_owned(), HashSet::from(["r".to_owned()]));
    map
}

fn load() -> ModelTreeView {
    let design = ModelDesign::from_json(COUNTER_JSON, &registers()).unwrap();
    ModelTreeView::from_design(Arc::new(design))
}

#[test]
fn detects_the_single_top_module() {
    let design = ModelDesign::from_json(COUNTER_JSON, &registers()).unwrap();
    assert_eq!(design.get(design.top()).name(), "top");
    assert_eq!(design.module_names(), vec!["sub", "top"]);
}

#[test]
fn rejects_designs_without_a_unique_top() {
    let json = r#"{
      "modules": {
        "a": {"ports": {}, "netnames": {}, "cells": {}},
        "b": {"ports": {}, "netnames": {}, "cells": {}}
      }
    }"#;
    let err = ModelDesign::from_json(json, &AHashMap::new()).unwrap_err();
    assert!(matches!(err, IrError::MultipleTops { tops } if tops.len() == 2));
}

#[test]
fn rejects_memories() {
    let json = r#"{
      "modules": {
        "m": {"ports": {}, "netnames": {}, "cells": {}, "memories": {"mem": {}}}
      }
    }"#;
    let err = ModelDesign::from_json(json, &AHashMap::new()).unwrap_err();
    assert!(matches!(err, IrError::MemoriesUnsupported { module } if module == "m"));
}

#[test]
fn groups_array_elements_into_one_compound_item() {
    let model = load();
    let root = model.root();
    let node = model.nodes_on_path(&HierarchicalPath::new(root, "buf")).unwrap();
    let decl = model.find_decl(node.last().unwrap(), "buf").unwrap();

    let ModuleItem::Compound(array) = decl else {
        panic!("buf should be compound");
    };
    assert_eq!(array.capacity(), 2);
    assert_eq!(array.element_width, 2);
    assert!(array.is_reg);
}

#[test]
fn views_split_registers_and_wires() {
    let mut model = load();
    model.instantiate_all();

    let names = |kind| {
        model
            .view(kind)
            .into_iter()
            .map(|(p, _)| p.item)
            .collect::<Vec<_>>()
    };

    assert_eq!(names(ViewKind::InputPorts), vec!["clk"]);
    assert_eq!(names(ViewKind::OutputPorts), vec!["q"]);
    // The hidden net and the ports stay out of the internals.
    assert_eq!(names(ViewKind::InternalRegisters), vec!["buf", "count", "r"]);
    assert_eq!(names(ViewKind::InternalWires), Vec::<String>::new());
    assert_eq!(names(ViewKind::CombinationInputs), vec!["clk", "buf", "count", "r"]);
}

#[test]
fn hidden_submodules_do_not_create_nodes() {
    let model = load();
    assert_eq!(model.filter_nodes(|_| true).len(), 2);
}

#[test]
fn klee_crossbar_round_trips_paths() {
    let model = load();
    let path = model.match_path(&["top".to_owned(), "count".to_owned()]).remove(0);

    let crossbar = KleeSmtCrossbar::from_model(vec![path.clone()]);
    assert_eq!(crossbar.to_model(), &[path.clone()]);

    // The backend name recovers the same path, with and without a word
    // suffix.
    let by_name = KleeSmtCrossbar::from_data("top__DOT__count", &model);
    assert_eq!(by_name.to_model(), &[path.clone()]);
    let by_word = KleeSmtCrossbar::from_data("top__DOT__count_1", &model);
    assert_eq!(by_word.to_model(), &[path]);
}

#[test]
fn klee_atoms_cover_primitives_and_arrays() {
    let mut model = load();
    let count = model.match_path(&["top".to_owned(), "count".to_owned()]).remove(0);
    let buf = model.match_path(&["top".to_owned(), "buf".to_owned()]).remove(0);
    model
        .instantiate_item(&count, Some(Layout { offset: 0, bytes: 1 }))
        .unwrap();
    model
        .instantiate_item(&buf, Some(Layout { offset: 4, bytes: 2 }))
        .unwrap();

    let atoms = KleeSmtCrossbar::from_model(vec![count, buf])
        .to_data_split(&model)
        .unwrap();

    let names: Vec<&str> = atoms.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["top__DOT__count", "top__DOT__buf_0", "top__DOT__buf_1"]
    );
    assert_eq!(atoms[1].offset, 4);
    assert_eq!(atoms[2].offset, 5);
    assert_eq!(atoms[2].bytes, 1);
}

#[test]
fn yosys_smt_crossbar_parses_backend_names() {
    let model = load();

    let by_name = YosysSmtCrossbar::from_data("top", "count", &model);
    let expected = model.match_path(&["top".to_owned(), "count".to_owned()]);
    assert_eq!(by_name.to_model(), expected.as_slice());

    // Array element names collapse onto the compound item.
    let by_element = YosysSmtCrossbar::from_data("top", "buf[1]", &model);
    assert_eq!(by_element.to_model()[0].item, "buf");

    // Submodule items resolve through the instance, not the type name.
    let sub_item = YosysSmtCrossbar::from_data("sub", "r", &model);
    assert_eq!(sub_item.to_model().len(), 1);
}

#[test]
fn yosys_smt_accessors_compose_hierarchy_functions() {
    let mut model = load();
    model.instantiate_all();

    let table = FunctionTable::parse(
        "(define-fun |sub_n r| ((state |sub_s|)) Bool true)\n\
         (define-fun |top_h u0| ((state |top_s|)) |sub_s| state)\n",
    );
    let renamer = SymbolRenamer::new("c0", &[]);

    let path = model.match_path(&["top".to_owned(), "u0".to_owned(), "r".to_owned()]).remove(0);
    let accessors = YosysSmtCrossbar::from_model(vec![path])
        .to_data(&model, &table, &renamer)
        .unwrap();

    let streams = accessors[0].as_ref().expect("r is defined");
    let value = streams[0].at_state(&Term::atom("s0"));
    assert_eq!(value.width, 1);
    assert_eq!(
        value.term.to_string(),
        "(ite (|sub_n r| (|top_h u0| s0)) #b1 #b0)"
    );
}

#[test]
fn optimized_out_wires_are_tolerated() {
    let mut model = load();
    model.instantiate_all();

    // `q` is a non-register port; an empty function table means the backend
    // dropped it, which must not error.
    let table = FunctionTable::parse("");
    let renamer = SymbolRenamer::new("c0", &[]);
    let path = model.match_path(&["top".to_owned(), "q".to_owned()]).remove(0);

    let accessors = YosysSmtCrossbar::from_model(vec![path])
        .to_data(&model, &table, &renamer)
        .unwrap();
    assert!(accessors[0].is_none());

    // A register with no backend function is a hard error.
    let count = model.match_path(&["top".to_owned(), "count".to_owned()]).remove(0);
    let err = YosysSmtCrossbar::from_model(vec![count])
        .to_data(&model, &table, &renamer)
        .unwrap_err();
    assert!(matches!(err, IrError::ItemNotFound { .. }));
}
