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
//! Code-object codec: decomposes a callable's code body into
//! its structural fields rather than relying on the host runtime's opaque
//! marshal format, which is version-sensitive and a security hazard. On
//! decode, the recorded fields are handed to a [`CodeObjectBuilder`] that
//! calls the runtime's documented code-body constructor.

use crate::error::Result;
use crate::node::CodePayload;
use crate::value::{CodeBody, Handle};

/// Version string this build targets. A real embedding would derive this
/// from the host runtime it links against (e.g. `sys.version_info`); this
/// crate has no such runtime, so it is a fixed marker used to exercise the
/// version-mismatch path in tests.
pub const RUNTIME_VERSION: &str = "pyser-core-1";

/// Calls the runtime's documented code-body constructor with the recorded
/// fields in the exact argument order that runtime version expects. The
/// pure-Rust test builder (`crate::testutil::ReplayBuilder`) just carries
/// the fields back into a `Value::Code`; a real embedding would call into
/// e.g. `PyCode_NewWithPosOnlyArgs`.
pub trait CodeObjectBuilder {
    fn build(&self, body: CodeBody) -> Result<Handle>;
}

/// Fields that ride directly on the node (no `consts` -- those are
/// pointer-edge children since a constant may itself be a code body).
pub fn payload_from_body(body: &CodeBody) -> CodePayload {
    CodePayload {
        bytecode: body.bytecode.clone(),
        names: body.names.clone(),
        varnames: body.varnames.clone(),
        freevars: body.freevars.clone(),
        cellvars: body.cellvars.clone(),
        filename: body.filename.clone(),
        qualname: body.qualname.clone(),
        argcount: body.argcount,
        posonlyargcount: body.posonlyargcount,
        kwonlyargcount: body.kwonlyargcount,
        nlocals: body.nlocals,
        stacksize: body.stacksize,
        flags: body.flags,
        firstlineno: body.firstlineno,
        lnotab: body.lnotab.clone(),
        exception_table: body.exception_table.clone(),
        runtime_version: body.runtime_version.clone(),
    }
}

/// The inverse of [`payload_from_body`]; `consts` must be supplied
/// separately once the decoder has resolved the node's pointer edges.
pub fn body_from_payload(payload: CodePayload, consts: Vec<Handle>) -> CodeBody {
    CodeBody {
        bytecode: payload.bytecode,
        consts,
        names: payload.names,
        varnames: payload.varnames,
        freevars: payload.freevars,
        cellvars: payload.cellvars,
        filename: payload.filename,
        qualname: payload.qualname,
        argcount: payload.argcount,
        posonlyargcount: payload.posonlyargcount,
        kwonlyargcount: payload.kwonlyargcount,
        nlocals: payload.nlocals,
        stacksize: payload.stacksize,
        flags: payload.flags,
        firstlineno: payload.firstlineno,
        lnotab: payload.lnotab,
        exception_table: payload.exception_table,
        runtime_version: payload.runtime_version,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ReplayBuilder;
    use crate::value::Value;

    fn sample_body() -> CodeBody {
        CodeBody {
            bytecode: vec![1, 2, 3],
            consts: vec![],
            names: vec!["print".into()],
            varnames: vec!["x".into()],
            freevars: vec![],
            cellvars: vec![],
            filename: "<test>".into(),
            qualname: "f".into(),
            argcount: 1,
            posonlyargcount: 0,
            kwonlyargcount: 0,
            nlocals: 1,
            stacksize: 2,
            flags: 0,
            firstlineno: 1,
            lnotab: vec![],
            exception_table: None,
            runtime_version: RUNTIME_VERSION.to_string(),
        }
    }

    #[test]
    fn payload_round_trips_through_body() {
        let body = sample_body();
        let payload = payload_from_body(&body);
        let back = body_from_payload(payload, vec![]);
        assert_eq!(back.bytecode, body.bytecode);
        assert_eq!(back.qualname, body.qualname);
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let builder = ReplayBuilder {
            target_runtime_version: Some("other-version".to_string()),
        };
        let err = builder.build(sample_body()).unwrap_err();
        assert!(matches!(
            err,
            crate::error::PyserError::IncompatibleCodeVersion { .. }
        ));
    }

    #[test]
    fn matching_version_builds_a_code_value() {
        let builder = ReplayBuilder {
            target_runtime_version: Some(RUNTIME_VERSION.to_string()),
        };
        let handle = builder.build(sample_body()).unwrap();
        assert!(matches!(&*handle.borrow(), Value::Code(_)));
    }
}
