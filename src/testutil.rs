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
//! Test-only [`TypeRegistry`](crate::aggregate::TypeRegistry) and
//! [`CodeObjectBuilder`](crate::code::CodeObjectBuilder) backed by plain
//! `HashMap`s, standing in for a real host-runtime module registry and
//! code-body constructor. Used by this crate's own tests and available to
//! downstream embeddings that want a quick in-memory registry for their
//! own integration tests.

use std::collections::HashMap;

use crate::aggregate::{AggregateFactory, TypeRegistry};
use crate::code::CodeObjectBuilder;
use crate::error::Result;
use crate::value::{handle, Aggregate, CodeBody, Handle, Value};

struct BlankFactory {
    module: String,
    qualname: String,
}

impl AggregateFactory for BlankFactory {
    fn allocate_blank(&self) -> Option<Handle> {
        Some(handle(Value::Aggregate(Aggregate {
            module: self.module.clone(),
            qualname: self.qualname.clone(),
            attrs: Vec::new(),
        })))
    }
}

/// A `HashMap`-backed registry of `(module, qualname)` pairs the test
/// suite has declared as constructible.
#[derive(Default)]
pub struct TestRegistry {
    known: HashMap<(String, String), ()>,
}

impl TestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module: &str, qualname: &str) -> &mut Self {
        self.known
            .insert((module.to_string(), qualname.to_string()), ());
        self
    }
}

impl TypeRegistry for TestRegistry {
    fn resolve(&self, module: &str, qualname: &str) -> Option<Box<dyn AggregateFactory>> {
        if self.known.contains_key(&(module.to_string(), qualname.to_string())) {
            Some(Box::new(BlankFactory {
                module: module.to_string(),
                qualname: qualname.to_string(),
            }))
        } else {
            None
        }
    }
}

/// Reconstructs a [`CodeBody`] value in place. Pure Rust has no bytecode
/// VM to synthesize a real callable body for, so this builder's job is to
/// faithfully carry the recorded fields back into a `Value::Code`, which
/// is exactly what the round-trip and structural-equality tests check.
#[derive(Default)]
pub struct ReplayBuilder {
    pub target_runtime_version: Option<String>,
}

impl CodeObjectBuilder for ReplayBuilder {
    fn build(&self, body: CodeBody) -> Result<Handle> {
        if let Some(expected) = &self.target_runtime_version {
            if expected != &body.runtime_version {
                return Err(crate::error::PyserError::IncompatibleCodeVersion {
                    field: "runtime_version".to_string(),
                    expected: expected.clone(),
                    found: body.runtime_version,
                });
            }
        }
        Ok(handle(Value::Code(body)))
    }
}
