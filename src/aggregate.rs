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
//! Resolves a recorded `(module, qualname)` pair to a blank instance the
//! decoder can fill attributes into. "Module registry" is a
//! host-runtime concept this crate does not itself embed; [`TypeRegistry`]
//! is the seam a real binding plugs into. `crate::testutil::TestRegistry`
//! backs it with a plain `HashMap` for this crate's own tests.

use crate::error::{PyserError, Result};
use crate::value::Handle;

/// Knows how to allocate a blank instance of one aggregate type without
/// running its normal construction protocol, since the encoded graph
/// already captures post-construction state.
pub trait AggregateFactory {
    /// Allocate a blank instance, bypassing construction if the runtime
    /// allows it, falling back to zero-argument construction otherwise.
    /// Returns `None` only if neither bypass nor zero-arg construction is
    /// possible -- the caller turns that into `UninstantiableType`.
    fn allocate_blank(&self) -> Option<Handle>;
}

/// Resolves `(module, qualname)` pairs to [`AggregateFactory`]s. Modeled
/// directly on a three-step resolution: module lookup, then
/// qualname lookup within the module.
pub trait TypeRegistry {
    fn resolve(&self, module: &str, qualname: &str) -> Option<Box<dyn AggregateFactory>>;
}

/// The first steps of reconstruction: resolve the type and allocate a
/// blank instance, leaving attributes empty. Split out from [`reconstruct`]
/// so the decoder's Phase 1 (allocate) can hand out a `Handle` for every
/// node -- including aggregates -- before Phase 2 fills any attribute
/// content. Filling is then just a `RefCell` mutation on the handle this
/// returns, which is what lets an already-allocated cyclic reference to
/// this instance observe the final attributes once Phase 2 runs.
pub fn allocate(registry: &dyn TypeRegistry, module: &str, qualname: &str) -> Result<Handle> {
    let factory = registry.resolve(module, qualname).ok_or_else(|| {
        // We can't distinguish "module missing" from "type missing within
        // a present module" through this trait object alone, so a
        // registry that wants the finer-grained UnknownModule/UnknownType
        // split should implement it internally and never return None for
        // a module it does recognize. The default path reports the
        // type as unknown, which is the common case.
        PyserError::UnknownType {
            module: module.to_string(),
            qualname: qualname.to_string(),
        }
    })?;

    factory.allocate_blank().ok_or_else(|| PyserError::UninstantiableType {
        module: module.to_string(),
        qualname: qualname.to_string(),
    })
}

/// The full resolve-allocate-assign sequence, parameterized over any
/// [`TypeRegistry`]: allocate via [`allocate`], then assign `attrs` (already
/// in recorded order; attributes unrecognized by the type are still set,
/// permissively) in one call. Used where allocation and fill don't need to
/// be split across decoder phases.
pub fn reconstruct(
    registry: &dyn TypeRegistry,
    module: &str,
    qualname: &str,
    attrs: Vec<(String, Handle)>,
) -> Result<Handle> {
    let instance = allocate(registry, module, qualname)?;

    {
        let mut value = instance.borrow_mut();
        match &mut *value {
            crate::value::Value::Aggregate(agg) => {
                agg.attrs = attrs;
            }
            other => {
                // A factory that doesn't hand back an Aggregate is a
                // TypeRegistry bug, not a data problem; surface it the
                // same way an uninstantiable type would be surfaced.
                let _ = other;
                return Err(PyserError::UninstantiableType {
                    module: module.to_string(),
                    qualname: qualname.to_string(),
                });
            }
        }
    }

    Ok(instance)
}
