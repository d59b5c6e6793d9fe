//! Expression elaboration: literals, accesses, operators, and declarations.

use crate::{
    ast::{BinaryOp, NodeId, NodeKind, NumberValue, StructureValue},
    context::{Context, TemporaryContext},
    data::NodeData,
    error::{CompileResult, ErrorKind},
    intern::NameId,
    value::{struct_member_name, ValueData, ValueId},
};

/// Expands `\n`, `\0`, `\\`, `\'`, and `\"` escapes in raw literal bytes.
fn expand_escapes(raw: &str) -> Result<Vec<u8>, char> {
    let mut bytes = Vec::with_capacity(raw.len());
    let mut iter = raw.bytes();
    while let Some(byte) = iter.next() {
        if byte != b'\\' {
            bytes.push(byte);
            continue;
        }
        match iter.next() {
            Some(b'n') => bytes.push(b'\n'),
            Some(b'0') => bytes.push(b'\0'),
            Some(b'\\') => bytes.push(b'\\'),
            Some(b'\'') => bytes.push(b'\''),
            Some(b'"') => bytes.push(b'"'),
            Some(other) => return Err(char::from(other)),
            None => return Err('\\'),
        }
    }
    Ok(bytes)
}

impl Context<'_> {
    fn expand_literal(&self, node: NodeId, text: NameId) -> CompileResult<Vec<u8>> {
        expand_escapes(self.interns.get(text)).map_err(|escape| {
            self.error(
                node,
                ErrorKind::Lex,
                format!("Unknown escape sequence '\\{escape}'"),
            )
        })
    }

    pub(crate) fn elaborate_number(&mut self, node: NodeId, value: NumberValue) -> CompileResult<()> {
        // An integer or float wanted type wins; otherwise the literal picks
        // the default width for its kind.
        let wanted = self.temporary.wanted_type.filter(|&wanted| {
            matches!(
                self.values.get(wanted),
                ValueData::IntegerType { .. } | ValueData::FloatType { .. }
            )
        });
        let ty = match wanted {
            Some(wanted) => wanted,
            None => match value {
                NumberValue::Integer(_) => {
                    let bits = self.codegen.default_integer_size();
                    self.values.integer_type(true, bits)
                }
                NumberValue::Decimal(_) => self.values.float_type(64),
            },
        };
        self.set_data(node, NodeData::Number { ty });
        self.set_type(node, ty);
        Ok(())
    }

    pub(crate) fn elaborate_string(&mut self, node: NodeId, text: NameId) -> CompileResult<()> {
        let bytes = self.expand_literal(node, text)?;

        // Acceptable wanted shapes: a pointer to a byte array, or a byte
        // array view. Anything else falls back to the view.
        let wanted = self.temporary.wanted_type.filter(|&wanted| match self.values.get(wanted) {
            ValueData::PointerType { inner } => match self.values.get(*inner) {
                ValueData::ArrayType { inner, .. } => matches!(self.values.get(*inner), ValueData::ByteType),
                _ => false,
            },
            ValueData::ArrayViewType { inner } => matches!(self.values.get(*inner), ValueData::ByteType),
            _ => false,
        });
        let ty = match wanted {
            Some(wanted) => wanted,
            None => self.values.str_type(),
        };
        self.set_data(node, NodeData::String { ty, bytes });
        self.set_type(node, ty);
        Ok(())
    }

    pub(crate) fn elaborate_character(&mut self, node: NodeId, text: NameId) -> CompileResult<()> {
        let bytes = self.expand_literal(node, text)?;
        let [value] = bytes[..] else {
            return Err(self.error(
                node,
                ErrorKind::Lex,
                "Expected only one character".to_owned(),
            ));
        };
        self.set_data(node, NodeData::Character { value });
        let ty = self.values.byte_type();
        self.set_type(node, ty);
        Ok(())
    }

    pub(crate) fn elaborate_null(&mut self, node: NodeId) -> CompileResult<()> {
        let Some(wanted) = self.temporary.wanted_type else {
            return Err(self.error(
                node,
                ErrorKind::TypeMismatch,
                "Cannot infer a type for null".to_owned(),
            ));
        };
        self.set_data(node, NodeData::Null { ty: wanted });
        self.set_type(node, wanted);
        Ok(())
    }

    pub(crate) fn elaborate_range(&mut self, node: NodeId, start: NodeId, end: Option<NodeId>) -> CompileResult<()> {
        let mut wanted = self.temporary.wanted_type.and_then(|wanted| match self.values.get(wanted) {
            ValueData::RangeType { element } => Some(*element),
            _ => None,
        });
        self.elaborate_with(TemporaryContext::wanting(wanted), start)?;
        if wanted.is_none() {
            wanted = Some(self.require_type(start)?);
        }
        if let Some(end) = end {
            self.elaborate_with(TemporaryContext::wanting(wanted), end)?;
        }
        let element = wanted.unwrap_or_else(|| self.values.none());
        let ty = self.values.range_type(element);
        self.set_type(node, ty);
        Ok(())
    }

    pub(crate) fn elaborate_run(&mut self, node: NodeId, value: NodeId) -> CompileResult<()> {
        let wanted = self.temporary.wanted_type;
        self.elaborate_with(TemporaryContext::wanting(wanted), value)?;
        let result = self.evaluate_for_elaboration(value)?;
        self.set_data(node, NodeData::Run { value: result });
        if let Some(ty) = self.get_type(value) {
            self.set_type(node, ty);
        }
        Ok(())
    }

    pub(crate) fn elaborate_cast(&mut self, node: NodeId, value: NodeId, ty: Option<NodeId>) -> CompileResult<()> {
        self.elaborate(value)?;
        let from = self.require_type(value)?;

        let to = match ty {
            Some(ty) => {
                self.elaborate(ty)?;
                self.evaluate_for_elaboration(ty)?
            }
            None => self.temporary.wanted_type.ok_or_else(|| {
                self.error(
                    node,
                    ErrorKind::TypeMismatch,
                    "Cannot infer a cast target type".to_owned(),
                )
            })?,
        };

        // Only pointer-to-pointer and integer-to-byte casts exist.
        let cast_ok = matches!(
            (self.values.get(from), self.values.get(to)),
            (ValueData::PointerType { .. }, ValueData::PointerType { .. })
                | (ValueData::IntegerType { .. }, ValueData::ByteType)
        );
        if !cast_ok {
            let from_rendered = self.values.format_type_outer(&self.nodes, &self.interns, Some(from));
            let to_rendered = self.values.format_type_outer(&self.nodes, &self.interns, Some(to));
            return Err(self.error(
                node,
                ErrorKind::TypeMismatch,
                format!("Cannot cast from {from_rendered} to {to_rendered}"),
            ));
        }

        self.set_data(node, NodeData::Cast { from, to });
        self.set_type(node, to);
        Ok(())
    }

    pub(crate) fn elaborate_binary_op(
        &mut self,
        node: NodeId,
        left: NodeId,
        right: NodeId,
        op: BinaryOp,
    ) -> CompileResult<()> {
        self.elaborate(left)?;
        let left_type = self.require_type(left)?;
        self.elaborate_with(TemporaryContext::wanting(Some(left_type)), right)?;
        let right_type = self.require_type(right)?;

        if !self.values.assignable(left_type, right_type) {
            return Err(self.mismatched_type_error(node, Some(left_type), Some(right_type)));
        }

        let operand = self.values.get(left_type);
        let supported = match operand {
            ValueData::IntegerType { .. } | ValueData::FloatType { .. } => !matches!(op, BinaryOp::And | BinaryOp::Or),
            ValueData::BooleanType => matches!(
                op,
                BinaryOp::And | BinaryOp::Or | BinaryOp::Equals | BinaryOp::NotEquals
            ),
            ValueData::ByteType | ValueData::EnumType { .. } | ValueData::TypeType => {
                matches!(op, BinaryOp::Equals | BinaryOp::NotEquals)
            }
            _ => false,
        };
        if !supported {
            let rendered = self.values.format_type_outer(&self.nodes, &self.interns, Some(left_type));
            return Err(self.error(
                node,
                ErrorKind::TypeMismatch,
                format!("Cannot operate on {rendered}"),
            ));
        }

        let result_type = if op.is_comparison() || matches!(op, BinaryOp::And | BinaryOp::Or) {
            self.values.boolean_type()
        } else {
            left_type
        };
        self.set_data(node, NodeData::BinaryOp { operand_type: left_type });
        self.set_type(node, result_type);
        Ok(())
    }

    pub(crate) fn elaborate_is(&mut self, node: NodeId, value: NodeId, check: NodeId) -> CompileResult<()> {
        self.elaborate(value)?;
        let ty = self.require_type(value)?;
        let ValueData::TaggedUnionType { items, enum_type } = self.values.get(ty) else {
            let rendered = self.values.format_type_outer(&self.nodes, &self.interns, Some(ty));
            return Err(self.error(
                node,
                ErrorKind::TypeMismatch,
                format!("Expected tagged union, but got {rendered}"),
            ));
        };
        let items = items.clone();
        let enum_type = *enum_type;

        self.elaborate_with(TemporaryContext::wanting(Some(enum_type)), check)?;
        let tag = self.evaluate_for_elaboration(check)?;
        let ValueData::Enum(index) = self.values.get(tag) else {
            return Err(self.error(
                node,
                ErrorKind::TypeMismatch,
                "Expected an enum item to check against".to_owned(),
            ));
        };
        let payload_type = items[*index].1;
        let optional = self.values.optional_type(payload_type);
        self.set_data(node, NodeData::Is { tag, ty: optional });
        self.set_type(node, optional);
        Ok(())
    }

    pub(crate) fn elaborate_dereference(
        &mut self,
        node: NodeId,
        value: NodeId,
        assign_value: Option<NodeId>,
    ) -> CompileResult<()> {
        self.elaborate(value)?;
        let ty = self.require_type(value)?;
        let ValueData::PointerType { inner } = self.values.get(ty) else {
            let rendered = self.values.format_type_outer(&self.nodes, &self.interns, Some(ty));
            return Err(self.error(
                node,
                ErrorKind::TypeMismatch,
                format!("Expected pointer, but got {rendered}"),
            ));
        };
        let inner = *inner;
        self.set_data(node, NodeData::Dereference { ty: inner });
        if let Some(assign) = assign_value {
            self.elaborate_assign(node, inner, assign)?;
        } else if self.temporary.want_pointer {
            // The address of `p.*` is `p` itself.
            self.set_type(node, ty);
        } else {
            self.set_type(node, inner);
        }
        Ok(())
    }

    pub(crate) fn elaborate_deoptional(
        &mut self,
        node: NodeId,
        value: NodeId,
        assign_value: Option<NodeId>,
    ) -> CompileResult<()> {
        let ty = self.enforce_pointer(value)?;
        let inner = match self.values.get(ty) {
            ValueData::PointerType { inner } => match self.values.get(*inner) {
                ValueData::OptionalType { inner } => Some(*inner),
                _ => None,
            },
            _ => None,
        };
        let Some(inner) = inner else {
            let rendered = self.values.format_type_outer(&self.nodes, &self.interns, Some(ty));
            return Err(self.error(
                node,
                ErrorKind::TypeMismatch,
                format!("Expected optional, but got {rendered}"),
            ));
        };
        self.set_data(node, NodeData::Deoptional { ty: inner });
        if let Some(assign) = assign_value {
            self.elaborate_assign(node, inner, assign)?;
        } else {
            self.set_type(node, inner);
        }
        Ok(())
    }

    pub(crate) fn elaborate_structure(
        &mut self,
        node: NodeId,
        ty: Option<NodeId>,
        entries: &[StructureValue],
    ) -> CompileResult<()> {
        // A type prefix (`T.{…}`) overrides the contextual wanted type.
        let wanted = match ty {
            Some(ty) => {
                self.elaborate(ty)?;
                Some(self.evaluate_for_elaboration(ty)?)
            }
            None => self.temporary.wanted_type,
        };

        let mut tuple_members = Vec::new();
        for (index, entry) in entries.iter().enumerate() {
            let item_wanted = match wanted {
                Some(wanted) => Some(self.structure_item_wanted(node, wanted, entry, index, entries.len())?),
                None => None,
            };
            self.elaborate_with(TemporaryContext::wanting(item_wanted), entry.value)?;
            if wanted.is_none() {
                tuple_members.push(self.require_type(entry.value)?);
            }
        }

        let result_type = match wanted {
            Some(wanted) => match self.values.get(wanted) {
                // `[_]T.{…}` completes the array type with the entry count.
                ValueData::ArrayType { inner, size: None } => {
                    let inner = *inner;
                    let count = i64::try_from(entries.len()).unwrap_or(i64::MAX);
                    let size = self.values.integer(count);
                    self.values.array_type(inner, Some(size))
                }
                _ => wanted,
            },
            None => self.values.alloc(ValueData::TupleType {
                members: tuple_members,
            }),
        };
        self.set_data(node, NodeData::Structure { ty: result_type });
        self.set_type(node, result_type);
        Ok(())
    }

    fn structure_item_wanted(
        &mut self,
        node: NodeId,
        wanted: ValueId,
        entry: &StructureValue,
        index: usize,
        count: usize,
    ) -> CompileResult<ValueId> {
        let arity_error = |this: &Self, expected: usize| {
            this.error(
                node,
                ErrorKind::TypeMismatch,
                format!("Expected {expected} values, but got {count}"),
            )
        };
        match self.values.get(wanted) {
            ValueData::StructType { members, .. } => {
                if members.len() != count {
                    return Err(arity_error(self, members.len()));
                }
                Ok(members[index])
            }
            ValueData::TupleType { members } => {
                if members.len() != count {
                    return Err(arity_error(self, members.len()));
                }
                Ok(members[index])
            }
            ValueData::ArrayType { inner, .. } | ValueData::ArrayViewType { inner } => Ok(*inner),
            ValueData::TaggedUnionType { items, .. } | ValueData::UnionType { items } => {
                let Some(name) = entry.name else {
                    return Err(self.error(
                        node,
                        ErrorKind::TypeMismatch,
                        "Union construction requires a named item".to_owned(),
                    ));
                };
                items
                    .iter()
                    .find(|(item, _)| *item == name)
                    .map(|(_, item_type)| *item_type)
                    .ok_or_else(|| {
                        self.error(
                            node,
                            ErrorKind::UnresolvedIdentifier,
                            format!("Item '{}' not found", self.interns.get(name)),
                        )
                    })
            }
            _ => {
                let rendered = self.values.format_type_outer(&self.nodes, &self.interns, Some(wanted));
                Err(self.error(
                    node,
                    ErrorKind::TypeMismatch,
                    format!("Cannot construct {rendered} from a structure literal"),
                ))
            }
        }
    }

    pub(crate) fn elaborate_structure_access(
        &mut self,
        node: NodeId,
        parent: NodeId,
        name: NameId,
        assign_value: Option<NodeId>,
    ) -> CompileResult<()> {
        let raw_type = self.enforce_pointer_sometimes(parent, assign_value.is_some())?;
        let pointer_access = matches!(self.values.get(raw_type), ValueData::PointerType { .. });
        let structure_type = match self.values.get(raw_type) {
            ValueData::PointerType { inner } => *inner,
            _ => raw_type,
        };

        let found = self.structure_member(structure_type, name);
        let Some((index, item_type)) = found else {
            if matches!(
                self.values.get(structure_type),
                ValueData::StructType { .. }
                    | ValueData::TupleType { .. }
                    | ValueData::UnionType { .. }
                    | ValueData::ArrayViewType { .. }
            ) {
                return Err(self.error(
                    node,
                    ErrorKind::UnresolvedIdentifier,
                    format!("Item '{}' not found", self.interns.get(name)),
                ));
            }
            let rendered = self.values.format_type_outer(&self.nodes, &self.interns, Some(structure_type));
            return Err(self.error(
                node,
                ErrorKind::TypeMismatch,
                format!("Cannot perform structure access operation on {rendered}"),
            ));
        };

        let want_pointer = self.temporary.want_pointer;
        self.set_data(
            node,
            NodeData::StructureAccess {
                structure_type,
                item_type,
                index,
                pointer_access,
                want_pointer,
            },
        );
        if let Some(assign) = assign_value {
            self.elaborate_assign(node, item_type, assign)?;
        } else {
            let ty = if want_pointer {
                self.values.pointer_type(item_type)
            } else {
                item_type
            };
            self.set_type(node, ty);
        }
        Ok(())
    }

    /// Resolves a member name against a struct, tuple (`_0`, `_1`, …), union,
    /// or array view (`len`, `ptr`).
    fn structure_member(&mut self, structure_type: ValueId, name: NameId) -> Option<(usize, ValueId)> {
        match self.values.get(structure_type) {
            ValueData::StructType { members, node, .. } => {
                let members = members.clone();
                let node = *node;
                (0..members.len()).find_map(|index| {
                    (struct_member_name(&self.nodes, node, index) == Some(name)).then_some((index, members[index]))
                })
            }
            ValueData::TupleType { members } => {
                let members = members.clone();
                let text = self.interns.get(name);
                let index: usize = text.strip_prefix('_')?.parse().ok()?;
                members.get(index).map(|&member| (index, member))
            }
            ValueData::UnionType { items } => {
                let items = items.clone();
                items
                    .iter()
                    .position(|(item, _)| *item == name)
                    .map(|index| (index, items[index].1))
            }
            ValueData::ArrayViewType { inner } => {
                let inner = *inner;
                let text = self.interns.get(name);
                match text {
                    "len" => {
                        let bits = self.codegen.default_integer_size();
                        Some((0, self.values.integer_type(false, bits)))
                    }
                    "ptr" => {
                        let array = self.values.array_type(inner, None);
                        Some((1, self.values.pointer_type(array)))
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }

    pub(crate) fn elaborate_slice(
        &mut self,
        node: NodeId,
        parent: NodeId,
        start: NodeId,
        end: Option<NodeId>,
    ) -> CompileResult<()> {
        let array_type = self.enforce_pointer(parent)?;
        let inner = match self.values.get(array_type) {
            ValueData::PointerType { inner } => match self.values.get(*inner) {
                ValueData::ArrayType { inner, .. } | ValueData::ArrayViewType { inner } => Some(*inner),
                _ => None,
            },
            _ => None,
        };
        let Some(inner) = inner else {
            let rendered = self.values.format_type_outer(&self.nodes, &self.interns, Some(array_type));
            return Err(self.error(
                node,
                ErrorKind::TypeMismatch,
                format!("Cannot slice {rendered}"),
            ));
        };

        let bits = self.codegen.default_integer_size();
        let index_type = self.values.integer_type(false, bits);
        self.elaborate_with(TemporaryContext::wanting(Some(index_type)), start)?;
        if let Some(end) = end {
            let index_type = self.values.integer_type(false, bits);
            self.elaborate_with(TemporaryContext::wanting(Some(index_type)), end)?;
        }

        self.set_data(
            node,
            NodeData::Slice {
                array_like_type: array_type,
            },
        );
        let ty = self.values.array_view_type(inner);
        self.set_type(node, ty);
        Ok(())
    }

    pub(crate) fn elaborate_variable(&mut self, node: NodeId) -> CompileResult<()> {
        let NodeKind::Variable {
            name,
            ty,
            value,
            is_static,
        } = self.node(node).kind
        else {
            unreachable!("elaborate_variable on a non-variable");
        };

        let mut declared = None;
        let mut temporary = TemporaryContext::default();
        if let Some(ty) = ty {
            self.elaborate(ty)?;
            let evaluated = self.evaluate_for_elaboration(ty)?;
            declared = Some(evaluated);
            temporary = TemporaryContext::wanting(declared);
        }

        if let Some(value) = value {
            self.elaborate_with(temporary, value)?;
            let value_type = self.require_type(value)?;
            match declared {
                None => declared = Some(value_type),
                Some(wanted) => {
                    if !self.values.assignable(wanted, value_type) {
                        return Err(self.expected_type_error(node, Some(wanted), Some(value_type)));
                    }
                }
            }
        }
        let Some(declared) = declared else {
            return Err(self.error(node, ErrorKind::TypeMismatch, "Expected value".to_owned()));
        };

        self.set_data(node, NodeData::Variable { ty: declared });
        if is_static {
            let Some(value) = value else {
                return Err(self.error(
                    node,
                    ErrorKind::TypeMismatch,
                    "A static variable requires an initial value".to_owned(),
                ));
            };
            let initial = self.evaluate_for_elaboration(value)?;
            self.store_static_variable(node, initial);
            self.last_scope_mut().static_variables.insert(name, node);
        } else {
            self.last_scope_mut().variables.insert(name, node);
        }
        Ok(())
    }

    pub(crate) fn elaborate_global(&mut self, node: NodeId) -> CompileResult<()> {
        let NodeKind::Global { name, ty, value, .. } = self.node(node).kind else {
            unreachable!("elaborate_global on a non-global");
        };
        self.elaborate(ty)?;
        let declared = self.evaluate_for_elaboration(ty)?;
        if let Some(value) = value {
            self.elaborate_with(TemporaryContext::wanting(Some(declared)), value)?;
            let value_type = self.require_type(value)?;
            if !self.values.assignable(declared, value_type) {
                return Err(self.expected_type_error(node, Some(declared), Some(value_type)));
            }
        }
        self.set_data(node, NodeData::Global { ty: declared });
        self.last_scope_mut().variables.insert(name, node);
        Ok(())
    }

}
