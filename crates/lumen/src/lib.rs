//! Front-end and semantic core for the Lumen language.
//!
//! The pipeline is parse → elaborate → build: a recursive-descent parser
//! produces an arena-allocated AST, the elaborator resolves names, infers
//! types bidirectionally, monomorphizes static-parameter functions, and
//! evaluates compile-time constants, and a [`Codegen`] handle consumes the
//! decorated tree. Compilation state is owned by a per-compilation
//! [`Context`]; multiple compilations in one process are independent.

mod arena;
mod ast;
mod codegen;
mod compile;
mod context;
mod data;
mod elaborate;
mod error;
mod evaluate;
mod intern;
mod io;
mod lexer;
mod parser;
mod scope;
mod value;

pub use crate::{
    arena::{Arena, Id},
    ast::{
        BinaryOp, FunctionParam, GenericParam, InternalKind, Node, NodeId, NodeKind, NumberValue, OperatorOverload,
        ReturnKind, SourceLoc, StructureMember, StructureValue, SwitchCase,
    },
    codegen::{CAbiType, Codegen, HostLayout},
    compile::{compile_file, compile_file_with, compile_source, Compilation},
    context::Context,
    data::{IdentifierKind, NodeData, Variation},
    error::{CompileError, CompileResult, ErrorKind},
    intern::NameId,
    io::{CollectStringPrint, NoPrint, PrintWriter, StdPrint},
    scope::{Binding, Scope, TypedValue},
    value::{ParamValue, ValueData, ValueId, Values},
};
