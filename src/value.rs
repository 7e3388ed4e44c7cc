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
//! `Value`: the in-memory stand-in for "an object graph from a
//! dynamically-typed host runtime". A real embedding (e.g. a PyO3 binding)
//! would walk its own object model directly; this crate models that model
//! abstractly so the encoder/decoder core is testable in pure Rust.
//!
//! Graphs are built from [`Handle`]s (`Rc<RefCell<Value>>`) so that shared
//! references and cycles are representable in safe Rust: two positions
//! holding the same `Handle`
//! (`Rc::ptr_eq`) are the same source object.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

/// A reference-counted, mutable cell holding a graph node. Equality of two
/// handles as *source objects* is `Rc::ptr_eq`, not structural equality.
pub type Handle = Rc<RefCell<Value>>;

pub fn handle(value: Value) -> Handle {
    Rc::new(RefCell::new(value))
}

/// Stable identity for a handle, usable as a hash map key during encode.
pub fn identity(h: &Handle) -> usize {
    Rc::as_ptr(h) as usize
}

/// Arbitrary-precision integer stored as sign + big-endian magnitude bytes,
/// an arbitrary-precision int stored as sign + magnitude bytes. This crate
/// never needs to do bignum arithmetic --
/// only to carry bytes the host runtime produced and hand them back
/// unchanged -- so no external bignum dependency is pulled in.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BigInt {
    pub negative: bool,
    /// Big-endian, no leading zero byte (zero itself is an empty magnitude).
    pub magnitude: Vec<u8>,
}

impl BigInt {
    pub fn zero() -> Self {
        Self {
            negative: false,
            magnitude: Vec::new(),
        }
    }

    pub fn from_i64(v: i64) -> Self {
        if v == 0 {
            return Self::zero();
        }
        let negative = v < 0;
        let magnitude_val = v.unsigned_abs();
        let mut bytes = magnitude_val.to_be_bytes().to_vec();
        while bytes.len() > 1 && bytes[0] == 0 {
            bytes.remove(0);
        }
        Self {
            negative,
            magnitude: bytes,
        }
    }

    pub fn to_i64(&self) -> Option<i64> {
        if self.magnitude.len() > 8 {
            return None;
        }
        let mut buf = [0u8; 8];
        let start = 8 - self.magnitude.len();
        buf[start..].copy_from_slice(&self.magnitude);
        let unsigned = u64::from_be_bytes(buf);
        if self.negative {
            if unsigned > (i64::MAX as u64) + 1 {
                return None;
            }
            Some((unsigned as i128 * -1) as i64)
        } else {
            i64::try_from(unsigned).ok()
        }
    }
}

impl From<i64> for BigInt {
    fn from(v: i64) -> Self {
        BigInt::from_i64(v)
    }
}

/// A user-defined record: fully-qualified type name plus the ordered
/// attribute list snapshotted at encode time.
#[derive(Debug, Clone)]
pub struct Aggregate {
    pub module: String,
    pub qualname: String,
    pub attrs: Vec<(String, Handle)>,
}

/// A code body: bytecode plus the structural fields a host runtime needs to
/// reconstruct a callable's code object.
/// `consts` are handles rather than raw bytes because a constant may
/// itself be a nested code body, a tuple, a string, or a number.
#[derive(Debug, Clone)]
pub struct CodeBody {
    pub bytecode: Vec<u8>,
    pub consts: Vec<Handle>,
    pub names: Vec<String>,
    pub varnames: Vec<String>,
    pub freevars: Vec<String>,
    pub cellvars: Vec<String>,
    pub filename: String,
    pub qualname: String,
    pub argcount: u32,
    pub posonlyargcount: u32,
    pub kwonlyargcount: u32,
    pub nlocals: u32,
    pub stacksize: u32,
    pub flags: u32,
    pub firstlineno: u32,
    pub lnotab: Vec<u8>,
    pub exception_table: Option<Vec<u8>>,
    pub runtime_version: String,
}

/// A function value: a reference to its code body, its captured
/// free-variable cell contents, parameter defaults, and keyword-only
/// defaults.
#[derive(Debug, Clone)]
pub struct Callable {
    pub code: Handle,
    pub free_cells: Vec<Handle>,
    pub defaults: Vec<Handle>,
    pub kwdefaults: Vec<(String, Handle)>,
    pub qualname: String,
    pub module: String,
}

/// The host graph's node kinds.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(BigInt),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    ByteArray(Vec<u8>),
    BufferView(Vec<u8>),
    List(Vec<Handle>),
    Tuple(Vec<Handle>),
    Set(Vec<Handle>),
    FrozenSet(Vec<Handle>),
    Map(Vec<(Handle, Handle)>),
    Aggregate(Aggregate),
    Code(CodeBody),
    Callable(Callable),
    /// A value with no well-defined encoding -- the encoder rejects it
    /// with `UnserializableValue` rather than emitting a node for it.
    Uninit,
}

impl Value {
    pub fn null() -> Handle {
        handle(Value::Null)
    }

    pub fn bool(v: bool) -> Handle {
        handle(Value::Bool(v))
    }

    pub fn int(v: i64) -> Handle {
        handle(Value::Int(BigInt::from_i64(v)))
    }

    pub fn float(v: f64) -> Handle {
        handle(Value::Float(v))
    }

    pub fn str(v: impl Into<String>) -> Handle {
        handle(Value::Str(v.into()))
    }

    pub fn bytes(v: impl Into<Vec<u8>>) -> Handle {
        handle(Value::Bytes(v.into()))
    }

    pub fn list(items: Vec<Handle>) -> Handle {
        handle(Value::List(items))
    }

    pub fn tuple(items: Vec<Handle>) -> Handle {
        handle(Value::Tuple(items))
    }

    pub fn map(entries: Vec<(Handle, Handle)>) -> Handle {
        handle(Value::Map(entries))
    }

    /// `tag` used for error messages and CLI `inspect` output.
    pub fn tag(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::ByteArray(_) => "bytearray",
            Value::BufferView(_) => "bufferview",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Set(_) => "set",
            Value::FrozenSet(_) => "frozenset",
            Value::Map(_) => "map",
            Value::Aggregate(_) => "aggregate",
            Value::Code(_) => "code",
            Value::Callable(_) => "callable",
            Value::Uninit => "uninit",
        }
    }
}

/// Structural equality with cycle protection: two handles are considered
/// equal if they describe isomorphic graphs, regardless of identity. Used
/// by round-trip tests, where recursive `PartialEq`
/// would loop forever on a cyclic graph.
pub fn structural_eq(a: &Handle, b: &Handle) -> bool {
    let mut seen = HashSet::new();
    structural_eq_inner(a, b, &mut seen)
}

fn structural_eq_inner(a: &Handle, b: &Handle, seen: &mut HashSet<(usize, usize)>) -> bool {
    let pair = (identity(a), identity(b));
    if seen.contains(&pair) {
        // Already comparing this pair further up the call stack: assume
        // equal so the recursion can bottom out on a cycle.
        return true;
    }
    seen.insert(pair);

    let (av, bv) = (a.borrow(), b.borrow());
    match (&*av, &*bv) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x.to_bits() == y.to_bits(),
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Bytes(x), Value::Bytes(y)) => x == y,
        (Value::ByteArray(x), Value::ByteArray(y)) => x == y,
        (Value::BufferView(x), Value::BufferView(y)) => x == y,
        (Value::List(x), Value::Tuple(y)) | (Value::Tuple(x), Value::List(y)) => {
            // Different node kinds are never structurally equal even if
            // the ordering matches: a list and a tuple of the same elements
            // are still distinct kinds.
            let _ = (x, y);
            false
        }
        (Value::List(x), Value::List(y)) | (Value::Tuple(x), Value::Tuple(y)) => {
            x.len() == y.len()
                && x.iter()
                    .zip(y.iter())
                    .all(|(xi, yi)| structural_eq_inner(xi, yi, seen))
        }
        (Value::Set(x), Value::Set(y)) | (Value::FrozenSet(x), Value::FrozenSet(y)) => {
            x.len() == y.len()
                && x.iter().all(|xi| {
                    y.iter().any(|yi| structural_eq_inner(xi, yi, seen))
                })
        }
        (Value::Map(x), Value::Map(y)) => {
            x.len() == y.len()
                && x.iter().all(|(xk, xv)| {
                    y.iter().any(|(yk, yv)| {
                        structural_eq_inner(xk, yk, seen) && structural_eq_inner(xv, yv, seen)
                    })
                })
        }
        (Value::Aggregate(x), Value::Aggregate(y)) => {
            x.module == y.module
                && x.qualname == y.qualname
                && x.attrs.len() == y.attrs.len()
                && x.attrs.iter().zip(y.attrs.iter()).all(|((xn, xv), (yn, yv))| {
                    xn == yn && structural_eq_inner(xv, yv, seen)
                })
        }
        (Value::Code(x), Value::Code(y)) => {
            x.bytecode == y.bytecode
                && x.names == y.names
                && x.varnames == y.varnames
                && x.freevars == y.freevars
                && x.cellvars == y.cellvars
                && x.filename == y.filename
                && x.qualname == y.qualname
                && x.consts.len() == y.consts.len()
                && x.consts
                    .iter()
                    .zip(y.consts.iter())
                    .all(|(xc, yc)| structural_eq_inner(xc, yc, seen))
        }
        (Value::Callable(x), Value::Callable(y)) => {
            x.qualname == y.qualname
                && x.module == y.module
                && structural_eq_inner(&x.code, &y.code, seen)
                && x.free_cells.len() == y.free_cells.len()
                && x.free_cells
                    .iter()
                    .zip(y.free_cells.iter())
                    .all(|(xc, yc)| structural_eq_inner(xc, yc, seen))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bigint_round_trips_through_i64() {
        for v in [0i64, 1, -1, 42, -42, i64::MAX, i64::MIN + 1] {
            let big = BigInt::from_i64(v);
            assert_eq!(big.to_i64(), Some(v), "failed for {v}");
        }
    }

    #[test]
    fn structural_eq_handles_cycles() {
        let list = Value::list(vec![]);
        list.borrow_mut().as_list_mut().push(list.clone());
        assert!(structural_eq(&list, &list));
    }

    #[test]
    fn tuple_and_list_are_not_structurally_equal() {
        let a = Value::list(vec![Value::int(1)]);
        let b = Value::tuple(vec![Value::int(1)]);
        assert!(!structural_eq(&a, &b));
    }

    trait AsListMut {
        fn as_list_mut(&mut self) -> &mut Vec<Handle>;
    }

    impl AsListMut for Value {
        fn as_list_mut(&mut self) -> &mut Vec<Handle> {
            match self {
                Value::List(items) => items,
                _ => panic!("not a list"),
            }
        }
    }
}
