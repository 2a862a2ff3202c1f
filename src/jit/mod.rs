//! JIT intermediate representation and register allocator (`SPEC_FULL.md` §4.4).
//!
//! The SH-4 frontend that lowers guest instructions into this IR, and the host code generator
//! that consumes allocated temporaries to emit x86-64/AArch64 machine code, are acknowledged by
//! `SPEC_FULL.md` §1 but are not specified in detail here; `ir` and `regalloc` are the
//! target-agnostic core both would sit on top of.

pub mod ir;
pub mod regalloc;
