// Copyright 2022 Jeremy Wall (Jeremy@marzhilsltudios.com)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Round-trip properties over randomly generated graphs, plus the literal
//! end-to-end scenarios a handwritten test suite would enumerate:
//! sharing, cycles, chunked blobs, and corruption detection.

use proptest::prelude::*;

use pyser::config::SerializeConfig;
use pyser::testutil::{ReplayBuilder, TestRegistry};
use pyser::value::{handle, structural_eq, BigInt, Callable, CodeBody, Handle, Value};

/// A plain-data tree with no sharing, used to generate arbitrary acyclic
/// graphs. Converted to a fresh `Handle` graph via `into_handle`; sharing
/// and cycles are exercised separately below since they are structural
/// properties a tree-shaped generator can't produce on its own.
#[derive(Debug, Clone)]
enum Gen {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Gen>),
    Tuple(Vec<Gen>),
    Map(Vec<(Gen, Gen)>),
}

impl Gen {
    fn into_handle(self) -> Handle {
        match self {
            Gen::Null => handle(Value::Null),
            Gen::Bool(v) => handle(Value::Bool(v)),
            Gen::Int(v) => handle(Value::Int(BigInt::from_i64(v))),
            Gen::Float(v) => handle(Value::Float(v)),
            Gen::Str(v) => handle(Value::Str(v)),
            Gen::Bytes(v) => handle(Value::Bytes(v)),
            Gen::List(items) => {
                handle(Value::List(items.into_iter().map(Gen::into_handle).collect()))
            }
            Gen::Tuple(items) => {
                handle(Value::Tuple(items.into_iter().map(Gen::into_handle).collect()))
            }
            Gen::Map(entries) => handle(Value::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into_handle(), v.into_handle()))
                    .collect(),
            )),
        }
    }
}

fn arb_leaf() -> impl Strategy<Value = Gen> {
    prop_oneof![
        Just(Gen::Null),
        any::<bool>().prop_map(Gen::Bool),
        any::<i64>().prop_map(Gen::Int),
        any::<f64>().prop_map(Gen::Float),
        ".{0,16}".prop_map(Gen::Str),
        prop::collection::vec(any::<u8>(), 0..32).prop_map(Gen::Bytes),
    ]
}

fn arb_value() -> impl Strategy<Value = Gen> {
    arb_leaf().prop_recursive(4, 64, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Gen::List),
            prop::collection::vec(inner.clone(), 0..6).prop_map(Gen::Tuple),
            prop::collection::vec((inner.clone(), inner), 0..6).prop_map(Gen::Map),
        ]
    })
}

fn round_trip(root: &Handle, config: &SerializeConfig) -> Handle {
    let bytes = pyser::serialize(root, config).unwrap();
    let registry = TestRegistry::new();
    let builder = ReplayBuilder::default();
    pyser::deserialize(&bytes, &registry, &builder).unwrap()
}

proptest! {
    #[test]
    fn arbitrary_acyclic_graphs_round_trip(gen in arb_value()) {
        let config = SerializeConfig::default();
        let root = gen.into_handle();
        let back = round_trip(&root, &config);
        prop_assert!(structural_eq(&root, &back));
    }

    #[test]
    fn re_encoding_a_decoded_graph_is_idempotent(gen in arb_value()) {
        let config = SerializeConfig::default();
        let root = gen.into_handle();
        let once = round_trip(&root, &config);
        let twice = round_trip(&once, &config);
        prop_assert!(structural_eq(&once, &twice));
    }

    #[test]
    fn blobs_round_trip_through_arbitrary_chunk_thresholds(
        bytes in prop::collection::vec(any::<u8>(), 0..4096),
        threshold in 1usize..2048,
    ) {
        let config = SerializeConfig {
            chunk_threshold: threshold,
            ..SerializeConfig::default()
        };
        let root = handle(Value::Bytes(bytes.clone()));
        let back = round_trip(&root, &config);
        match &*back.borrow() {
            Value::Bytes(out) => prop_assert_eq!(out, &bytes),
            _ => prop_assert!(false, "expected bytes"),
        }
    }
}

#[test]
fn shared_reference_decodes_to_one_identical_instance() {
    let shared = Value::str("shared-payload");
    let root = Value::list(vec![shared.clone(), shared.clone(), shared]);
    let config = SerializeConfig::default();
    let back = round_trip(&root, &config);
    match &*back.borrow() {
        Value::List(items) => {
            assert!(std::rc::Rc::ptr_eq(&items[0], &items[1]));
            assert!(std::rc::Rc::ptr_eq(&items[1], &items[2]));
        }
        _ => panic!("expected list"),
    }
}

#[test]
fn self_referential_graph_round_trips_without_overflow() {
    let list = Value::list(vec![]);
    match &mut *list.borrow_mut() {
        Value::List(items) => items.push(list.clone()),
        _ => unreachable!(),
    }
    let config = SerializeConfig::default();
    let back = round_trip(&list, &config);
    match &*back.borrow() {
        Value::List(items) => {
            assert_eq!(items.len(), 1);
            assert!(std::rc::Rc::ptr_eq(&items[0], &back));
        }
        _ => panic!("expected list"),
    }
}

#[test]
fn mutual_cycle_between_two_lists_round_trips() {
    let a = Value::list(vec![]);
    let b = Value::list(vec![a.clone()]);
    match &mut *a.borrow_mut() {
        Value::List(items) => items.push(b.clone()),
        _ => unreachable!(),
    }
    let config = SerializeConfig::default();
    let back = round_trip(&a, &config);
    match &*back.borrow() {
        Value::List(items) => match &*items[0].borrow() {
            Value::List(inner) => assert!(std::rc::Rc::ptr_eq(&inner[0], &back)),
            _ => panic!("expected inner list"),
        },
        _ => panic!("expected list"),
    }
}

#[test]
fn tuple_kind_is_preserved_across_the_round_trip() {
    let root = Value::tuple(vec![Value::int(1), Value::int(2)]);
    let config = SerializeConfig::default();
    let back = round_trip(&root, &config);
    assert!(matches!(&*back.borrow(), Value::Tuple(_)));
    assert!(!matches!(&*back.borrow(), Value::List(_)));
}

#[test]
fn a_large_blob_is_split_into_multiple_chunks_and_reassembles() {
    let payload: Vec<u8> = (0u8..=255).collect::<Vec<u8>>().repeat(16);
    let config = SerializeConfig {
        chunk_threshold: 512,
        ..SerializeConfig::default()
    };
    let root = handle(Value::Bytes(payload.clone()));
    let bytes = pyser::serialize(&root, &config).unwrap();
    let document = pyser::envelope::unframe(&bytes).unwrap();
    assert!(document.chunks.len() > 1);

    let registry = TestRegistry::new();
    let builder = ReplayBuilder::default();
    let back = pyser::deserialize(&bytes, &registry, &builder).unwrap();
    match &*back.borrow() {
        Value::Bytes(out) => assert_eq!(out, &payload),
        _ => panic!("expected bytes"),
    }
}

#[test]
fn callable_with_code_freevar_and_default_round_trips() {
    let code = handle(Value::Code(CodeBody {
        bytecode: vec![0x64, 0x00, 0x53, 0x00],
        consts: vec![Value::int(5)],
        names: vec![],
        varnames: vec!["x".to_string()],
        freevars: vec!["captured".to_string()],
        cellvars: vec![],
        filename: "<closure>".to_string(),
        qualname: "make_closure.<locals>.inner".to_string(),
        argcount: 1,
        posonlyargcount: 0,
        kwonlyargcount: 0,
        nlocals: 1,
        stacksize: 2,
        flags: 0,
        firstlineno: 1,
        lnotab: vec![],
        exception_table: None,
        runtime_version: pyser::code::RUNTIME_VERSION.to_string(),
    }));
    let root = handle(Value::Callable(Callable {
        code,
        free_cells: vec![Value::int(5)],
        defaults: vec![Value::int(3)],
        kwdefaults: vec![],
        qualname: "make_closure.<locals>.inner".to_string(),
        module: "pkg".to_string(),
    }));

    let config = SerializeConfig::default();
    let back = round_trip(&root, &config);
    assert!(structural_eq(&root, &back));
    match &*back.borrow() {
        Value::Callable(c) => {
            assert_eq!(c.free_cells.len(), 1);
            assert_eq!(c.defaults.len(), 1);
            match &*c.code.borrow() {
                Value::Code(body) => assert_eq!(body.consts.len(), 1),
                _ => panic!("expected code"),
            }
        }
        _ => panic!("expected callable"),
    }
}

#[test]
fn unknown_aggregate_type_is_rejected_rather_than_silently_dropped() {
    let root = handle(Value::Aggregate(pyser::value::Aggregate {
        module: "does_not_exist".to_string(),
        qualname: "Thing".to_string(),
        attrs: vec![],
    }));
    let config = SerializeConfig::default();
    let bytes = pyser::serialize(&root, &config).unwrap();
    let registry = TestRegistry::new();
    let builder = ReplayBuilder::default();
    let err = pyser::deserialize(&bytes, &registry, &builder).unwrap_err();
    assert!(matches!(err, pyser::error::PyserError::UnknownType { .. }));
}

#[test]
fn corrupted_envelope_bytes_are_rejected_rather_than_silently_misparsed() {
    let root = Value::list(vec![Value::int(1), Value::int(2), Value::int(3)]);
    let config = SerializeConfig::default();
    let mut bytes = pyser::serialize(&root, &config).unwrap();
    for byte in bytes.iter_mut().take(16) {
        *byte ^= 0xFF;
    }
    let registry = TestRegistry::new();
    let builder = ReplayBuilder::default();
    assert!(pyser::deserialize(&bytes, &registry, &builder).is_err());
}
