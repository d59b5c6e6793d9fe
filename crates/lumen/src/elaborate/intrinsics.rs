//! The `@`-intrinsics: primitive type constructors, reflection, compile-time
//! I/O, and the import machinery.

use std::path::PathBuf;

use crate::{
    ast::{InternalKind, NodeId, NodeKind},
    context::{Context, TemporaryContext},
    data::NodeData,
    error::{CompileResult, ErrorKind},
    intern::NameId,
    value::{struct_member_name, ValueData, ValueId},
};

impl Context<'_> {
    fn intrinsic_arity(&self, node: NodeId, kind: InternalKind, inputs: &[NodeId], expected: usize) -> CompileResult<()> {
        if inputs.len() == expected {
            return Ok(());
        }
        Err(self.error(
            node,
            ErrorKind::Intrinsic,
            format!("Expected {expected} inputs to @{kind}, but got {}", inputs.len()),
        ))
    }

    pub(crate) fn elaborate_internal(&mut self, node: NodeId) -> CompileResult<()> {
        let NodeKind::Internal { kind, ref inputs } = self.node(node).kind else {
            unreachable!("elaborate_internal on a non-intrinsic");
        };
        let inputs = inputs.clone();

        let mut value = None;
        let mut embed = None;
        match kind {
            InternalKind::Uint => {
                self.intrinsic_arity(node, kind, &inputs, 0)?;
                let bits = self.codegen.default_integer_size();
                value = Some(self.values.integer_type(false, bits));
                let ty = self.values.type_type();
                self.set_type(node, ty);
            }
            InternalKind::Uint8 => {
                self.intrinsic_arity(node, kind, &inputs, 0)?;
                value = Some(self.values.integer_type(false, 8));
                let ty = self.values.type_type();
                self.set_type(node, ty);
            }
            InternalKind::Type => {
                self.intrinsic_arity(node, kind, &inputs, 0)?;
                value = Some(self.values.type_type());
                let ty = self.values.type_type();
                self.set_type(node, ty);
                // Anything mentioning the type of types never reaches codegen.
                self.compile_only = true;
            }
            InternalKind::Byte => {
                self.intrinsic_arity(node, kind, &inputs, 0)?;
                value = Some(self.values.byte_type());
                let ty = self.values.type_type();
                self.set_type(node, ty);
            }
            InternalKind::Flt64 => {
                self.intrinsic_arity(node, kind, &inputs, 0)?;
                value = Some(self.values.float_type(64));
                let ty = self.values.type_type();
                self.set_type(node, ty);
            }
            InternalKind::Bool => {
                self.intrinsic_arity(node, kind, &inputs, 0)?;
                value = Some(self.values.boolean_type());
                let ty = self.values.type_type();
                self.set_type(node, ty);
            }
            InternalKind::Void => {
                self.intrinsic_arity(node, kind, &inputs, 0)?;
                value = Some(self.values.none());
                let ty = self.values.type_type();
                self.set_type(node, ty);
            }
            InternalKind::Int => {
                self.intrinsic_arity(node, kind, &inputs, 2)?;
                self.elaborate(inputs[0])?;
                self.elaborate(inputs[1])?;
                let signed = self.evaluate_for_elaboration(inputs[0])?;
                let size = self.evaluate_for_elaboration(inputs[1])?;
                let (ValueData::Boolean(signed), ValueData::Integer(size)) =
                    (self.values.get(signed), self.values.get(size))
                else {
                    return Err(self.error(
                        node,
                        ErrorKind::Intrinsic,
                        "@int expects a boolean signedness and an integer size".to_owned(),
                    ));
                };
                let (signed, size) = (*signed, *size);
                let bits = u32::try_from(size).map_err(|_| {
                    self.error(node, ErrorKind::Intrinsic, "@int size out of range".to_owned())
                })?;
                value = Some(self.values.integer_type(signed, bits));
                let ty = self.values.type_type();
                self.set_type(node, ty);
            }
            InternalKind::TypeOf => {
                self.intrinsic_arity(node, kind, &inputs, 1)?;
                self.elaborate(inputs[0])?;
                value = Some(self.require_type(inputs[0])?);
                let ty = self.values.type_type();
                self.set_type(node, ty);
            }
            InternalKind::CCharSize | InternalKind::CShortSize | InternalKind::CIntSize | InternalKind::CLongSize => {
                self.intrinsic_arity(node, kind, &inputs, 0)?;
                let abi = match kind {
                    InternalKind::CCharSize => crate::codegen::CAbiType::Char,
                    InternalKind::CShortSize => crate::codegen::CAbiType::Short,
                    InternalKind::CIntSize => crate::codegen::CAbiType::Int,
                    _ => crate::codegen::CAbiType::Long,
                };
                let size = self.codegen.c_size(abi);
                value = Some(self.values.integer(i64::try_from(size).unwrap_or(0)));
                let ty = self.values.integer_type(false, 8);
                self.set_type(node, ty);
            }
            InternalKind::Print => {
                for &input in &inputs {
                    self.elaborate(input)?;
                }
            }
            InternalKind::SelfType => {
                self.intrinsic_arity(node, kind, &inputs, 0)?;
                // The nearest enclosing type being defined.
                let current = self
                    .scopes
                    .iter()
                    .rev()
                    .find_map(|scope| scope.current_type);
                let Some(current) = current else {
                    return Err(self.error(
                        node,
                        ErrorKind::Intrinsic,
                        "@self outside of a type definition".to_owned(),
                    ));
                };
                value = Some(current);
                let ty = self.values.type_type();
                self.set_type(node, ty);
            }
            InternalKind::SizeOf => {
                self.intrinsic_arity(node, kind, &inputs, 1)?;
                self.elaborate(inputs[0])?;
                let queried = self.evaluate_for_elaboration(inputs[0])?;
                let size = self.codegen.size_of(&self.values, queried);
                value = Some(self.values.integer(i64::try_from(size).unwrap_or(0)));
                let bits = self.codegen.default_integer_size();
                let ty = self.values.integer_type(false, bits);
                self.set_type(node, ty);
            }
            InternalKind::Embed => {
                embed = Some(self.elaborate_embed(node, &inputs)?);
                if let Some(ty) = embed.and_then(|inner| self.get_type(inner)) {
                    self.set_type(node, ty);
                }
            }
            InternalKind::Import => {
                self.intrinsic_arity(node, kind, &inputs, 1)?;
                value = Some(self.elaborate_import(node, inputs[0])?);
                let ty = self.values.module_type();
                self.set_type(node, ty);
            }
            InternalKind::TypeInfoOf => {
                self.intrinsic_arity(node, kind, &inputs, 1)?;
                self.elaborate(inputs[0])?;
                let queried = self.evaluate_for_elaboration(inputs[0])?;
                value = Some(self.build_type_info(node, queried)?);
                let ty = self.type_info_type(node)?;
                self.set_type(node, ty);
            }
            InternalKind::CompileError => {
                self.intrinsic_arity(node, kind, &inputs, 1)?;
                self.elaborate(inputs[0])?;
                let message = self.evaluate_for_elaboration(inputs[0])?;
                let text = self
                    .values
                    .byte_payload(message)
                    .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                    .unwrap_or_else(|| "compile error".to_owned());
                return Err(self.error(node, ErrorKind::Intrinsic, text));
            }
        }

        self.set_data(node, NodeData::Internal { value, embed });
        Ok(())
    }

    /// `@embed`: concatenates byte-like compile-time values into a source
    /// string, parses it as an expression, and elaborates the splice in the
    /// current wanted-type context.
    fn elaborate_embed(&mut self, node: NodeId, inputs: &[NodeId]) -> CompileResult<NodeId> {
        let mut source = Vec::new();
        for &input in inputs {
            self.elaborate(input)?;
            let value = self.evaluate_for_elaboration(input)?;
            let Some(bytes) = self.values.byte_payload(value) else {
                return Err(self.error(
                    node,
                    ErrorKind::Intrinsic,
                    "@embed expects byte or byte-view inputs".to_owned(),
                ));
            };
            source.extend_from_slice(&bytes);
        }
        let source = String::from_utf8(source).map_err(|_| {
            self.error(node, ErrorKind::Intrinsic, "@embed produced invalid source".to_owned())
        })?;
        let inner = self.parse_expression_source("<embed>", &source)?;
        let wanted = self.temporary.wanted_type;
        self.elaborate_with(TemporaryContext::wanting(wanted), inner)?;
        Ok(inner)
    }

    /// `@import`: `"core"` resolves to `<cwd>/core/core.lang`; anything else
    /// resolves relative to the importing file's directory. Files are parsed
    /// and elaborated once per absolute path.
    fn elaborate_import(&mut self, node: NodeId, input: NodeId) -> CompileResult<ValueId> {
        self.elaborate(input)?;
        let value = self.evaluate_for_elaboration(input)?;
        let Some(bytes) = self.values.byte_payload(value) else {
            return Err(self.error(
                node,
                ErrorKind::Intrinsic,
                "@import expects a string path".to_owned(),
            ));
        };
        let request = String::from_utf8_lossy(&bytes).into_owned();

        let mut path = if request == "core" {
            let cwd = std::env::current_dir().map_err(|_| {
                self.error(node, ErrorKind::Io, "Failed to resolve working directory".to_owned())
            })?;
            cwd.join("core").join("core.lang")
        } else {
            let importer = self.sources.path(self.loc(node).path_ref);
            let directory = std::path::Path::new(importer)
                .parent()
                .map_or_else(PathBuf::new, std::path::Path::to_path_buf);
            directory.join(&request)
        };
        if let Ok(canonical) = path.canonicalize() {
            path = canonical;
        }

        if let Some(&cached) = self.cached_files.get(&path) {
            return Ok(cached);
        }

        let file_root = self.parse_file(&path)?;
        // Imported files elaborate in their own scope world.
        let saved_scopes = std::mem::take(&mut self.scopes);
        let result = (|| {
            self.elaborate(file_root)?;
            self.evaluate_for_elaboration(file_root)
        })();
        self.scopes = saved_scopes;
        let module = result?;
        self.cached_files.insert(path, module);
        Ok(module)
    }

    /// The prelude's `Type_Info` type, elaborated on demand.
    fn type_info_type(&mut self, node: NodeId) -> CompileResult<ValueId> {
        let name = self.interns.intern("Type_Info");
        let define = self
            .internal_root
            .and_then(|root| match self.node(root).kind {
                NodeKind::Module { body } => self.find_define(body, name),
                _ => None,
            })
            .ok_or_else(|| {
                self.error(
                    node,
                    ErrorKind::Intrinsic,
                    "The internal prelude does not define Type_Info".to_owned(),
                )
            })?;
        match self.get_data(define) {
            Some(NodeData::Define { value, .. }) => Ok(*value),
            _ => Err(self.error(
                node,
                ErrorKind::Intrinsic,
                "The internal prelude does not define Type_Info".to_owned(),
            )),
        }
    }

    fn name_bytes(&mut self, name: NameId) -> ValueId {
        let bytes = self.interns.get(name).as_bytes().to_vec();
        self.values.bytes_view(&bytes)
    }

    fn named_item_views(&mut self, items: &[(NameId, ValueId)]) -> ValueId {
        let entries: Vec<ValueId> = items
            .iter()
            .map(|&(name, ty)| {
                let name_view = self.name_bytes(name);
                self.values.alloc(ValueData::Struct(vec![name_view, ty]))
            })
            .collect();
        self.values.alloc(ValueData::ArrayView(entries))
    }

    /// Builds the `Type_Info` reflection value: a tagged union whose tag
    /// encodes the type kind and whose payload carries the field/item arrays.
    fn build_type_info(&mut self, node: NodeId, ty: ValueId) -> CompileResult<ValueId> {
        let (tag, payload) = match self.values.get(ty).clone() {
            ValueData::IntegerType { signed, bits } => {
                let size = self.values.integer(i64::from(bits));
                let signed = self.values.boolean(signed);
                (0, self.values.alloc(ValueData::Struct(vec![size, signed])))
            }
            ValueData::StructType { members, node: declaration, .. } => {
                let items: Vec<(NameId, ValueId)> = members
                    .iter()
                    .enumerate()
                    .map(|(index, &member)| {
                        let name = struct_member_name(&self.nodes, declaration, index)
                            .unwrap_or_else(|| self.interns.intern(&format!("_{index}")));
                        (name, member)
                    })
                    .collect();
                let view = self.named_item_views(&items);
                (1, self.values.alloc(ValueData::Struct(vec![view])))
            }
            ValueData::UnionType { items } => {
                let view = self.named_item_views(&items);
                (2, self.values.alloc(ValueData::Struct(vec![view])))
            }
            ValueData::TaggedUnionType { items, .. } => {
                let view = self.named_item_views(&items);
                (3, self.values.alloc(ValueData::Struct(vec![view])))
            }
            ValueData::EnumType { items } => {
                let names: Vec<ValueId> = items.iter().map(|&item| self.name_bytes(item)).collect();
                let view = self.values.alloc(ValueData::ArrayView(names));
                (4, self.values.alloc(ValueData::Struct(vec![view])))
            }
            ValueData::OptionalType { inner } => (5, self.values.alloc(ValueData::Struct(vec![inner]))),
            ValueData::ArrayType { inner, size } => {
                let size = size.unwrap_or_else(|| self.values.integer(0));
                (6, self.values.alloc(ValueData::Struct(vec![size, inner])))
            }
            ValueData::ArrayViewType { inner } => (7, self.values.alloc(ValueData::Struct(vec![inner]))),
            ValueData::TupleType { members } => {
                let view = self.values.alloc(ValueData::ArrayView(members));
                (8, self.values.alloc(ValueData::Struct(vec![view])))
            }
            ValueData::ByteType => (9, self.values.alloc(ValueData::Struct(Vec::new()))),
            _ => {
                let rendered = self.values.format_type_outer(&self.nodes, &self.interns, Some(ty));
                return Err(self.error(
                    node,
                    ErrorKind::Intrinsic,
                    format!("No type info for {rendered}"),
                ));
            }
        };
        let tag = self.values.enum_value(tag);
        Ok(self.values.alloc(ValueData::TaggedUnion { tag, payload }))
    }
}
