//! Control-flow forms: `if`, `while`, `for`, `switch`, `break`, `return`,
//! and `catch`, with divergence tracking.

use crate::{
    ast::{NodeId, NodeKind, ReturnKind, SwitchCase},
    context::{Context, TemporaryContext},
    data::NodeData,
    error::{CompileResult, ErrorKind},
    intern::NameId,
    scope::{Binding, Scope, TypedValue},
    value::{ValueData, ValueId},
};

impl Context<'_> {
    pub(crate) fn elaborate_if(&mut self, node: NodeId) -> CompileResult<()> {
        let NodeKind::If {
            condition,
            then_body,
            else_body,
            is_static,
            binding,
        } = self.node(node).kind
        else {
            unreachable!("elaborate_if on a non-if");
        };

        self.elaborate(condition)?;
        let condition_type = self.require_type(condition)?;
        if !matches!(
            self.values.get(condition_type),
            ValueData::BooleanType | ValueData::OptionalType { .. } | ValueData::ResultType { .. }
        ) {
            let rendered = self.values.format_type_outer(&self.nodes, &self.interns, Some(condition_type));
            return Err(self.error(
                node,
                ErrorKind::TypeMismatch,
                format!("Expected boolean, optional, or result condition, but got {rendered}"),
            ));
        }

        if is_static {
            return self.elaborate_if_static(node, condition, condition_type, then_body, else_body, binding);
        }
        self.elaborate_if_runtime(node, condition_type, then_body, else_body, binding)
    }

    /// `if static`: the condition is evaluated now and only the taken branch
    /// is elaborated. An optional condition exposes its unwrapped value to
    /// the taken branch as a static binding.
    fn elaborate_if_static(
        &mut self,
        node: NodeId,
        condition: NodeId,
        condition_type: ValueId,
        then_body: NodeId,
        else_body: Option<NodeId>,
        binding: Option<NameId>,
    ) -> CompileResult<()> {
        let evaluated = self.evaluate_for_elaboration(condition)?;
        let (truthy, unwrapped) = match self.values.get(evaluated) {
            ValueData::Boolean(value) => (*value, None),
            ValueData::Optional { present, value } => (*present, *value),
            _ => {
                return Err(self.error(
                    node,
                    ErrorKind::TypeMismatch,
                    "Expected a boolean or optional static condition".to_owned(),
                ));
            }
        };

        let wanted = self.temporary.wanted_type;
        if truthy {
            let mut scope = Scope::for_node(node);
            if let (Some(binding), Some(unwrapped)) = (binding, unwrapped) {
                let inner_type = match self.values.get(condition_type) {
                    ValueData::OptionalType { inner } => *inner,
                    _ => condition_type,
                };
                scope.static_bindings.insert(
                    binding,
                    TypedValue {
                        value: unwrapped,
                        ty: inner_type,
                    },
                );
            }
            self.push_scope(scope);
            let result = self.elaborate_with(TemporaryContext::wanting(wanted), then_body);
            self.pop_scope();
            result?;
            if let Some(ty) = self.get_type(then_body) {
                self.set_type(node, ty);
            }
        } else if let Some(else_body) = else_body {
            self.elaborate_with(TemporaryContext::wanting(wanted), else_body)?;
            if let Some(ty) = self.get_type(else_body) {
                self.set_type(node, ty);
            }
        }

        self.set_data(
            node,
            NodeData::If {
                condition_type,
                static_condition: Some(truthy),
                then_returned: false,
                else_returned: false,
                returned: false,
                result_type: self.get_type(node),
            },
        );
        Ok(())
    }

    fn elaborate_if_runtime(
        &mut self,
        node: NodeId,
        condition_type: ValueId,
        then_body: NodeId,
        else_body: Option<NodeId>,
        binding: Option<NameId>,
    ) -> CompileResult<()> {
        let saved_returned = self.returned;
        self.returned = false;

        let mut scope = Scope::for_node(node);
        if let Some(binding) = binding {
            // The capture sees the optional's inner or the result's success.
            let bound_type = match self.values.get(condition_type) {
                ValueData::OptionalType { inner } => *inner,
                ValueData::ResultType { value, .. } => value.unwrap_or_else(|| self.values.none()),
                _ => condition_type,
            };
            scope.bindings.insert(
                binding,
                Binding {
                    ty: bound_type,
                    index: 0,
                },
            );
        }
        self.push_scope(scope);
        let then_result = self.elaborate(then_body);
        self.pop_scope();
        then_result?;

        let then_type = self.get_type(then_body);
        let mut result_type = None;
        let mut then_returned = false;
        let mut else_returned = false;

        if let Some(else_body) = else_body {
            then_returned = self.returned;
            self.returned = false;

            self.elaborate_with(TemporaryContext::wanting(then_type), else_body)?;
            else_returned = self.returned;
            self.returned = saved_returned;

            // Both arms diverging makes the whole if diverge.
            if then_returned && else_returned {
                self.returned = true;
            }

            let else_type = self.get_type(else_body);
            if else_type.is_some() && then_type.is_none() {
                return Err(self.error(
                    node,
                    ErrorKind::TypeMismatch,
                    "Expected value from if".to_owned(),
                ));
            }
            if let Some(then_type) = then_type {
                // A diverging arm is exempt from the agreement requirement.
                if !else_returned {
                    let Some(else_type) = else_type else {
                        return Err(self.error(
                            node,
                            ErrorKind::TypeMismatch,
                            "Expected value from else".to_owned(),
                        ));
                    };
                    if !self.values.equal(then_type, else_type) {
                        return Err(self.mismatched_type_error(node, Some(then_type), Some(else_type)));
                    }
                }
                result_type = Some(then_type);
                self.set_type(node, then_type);
            }
        } else {
            self.returned = saved_returned;
            if then_type.is_some() {
                return Err(self.error(node, ErrorKind::TypeMismatch, "Expected else".to_owned()));
            }
        }

        self.set_data(
            node,
            NodeData::If {
                condition_type,
                static_condition: None,
                then_returned,
                else_returned,
                returned: self.returned,
                result_type,
            },
        );
        Ok(())
    }

    pub(crate) fn elaborate_while(&mut self, node: NodeId) -> CompileResult<()> {
        let NodeKind::While {
            condition,
            body,
            else_body,
        } = self.node(node).kind
        else {
            unreachable!("elaborate_while on a non-while");
        };

        // Break statements accumulate their agreed type here.
        self.set_data(
            node,
            NodeData::While {
                wanted_type: self.temporary.wanted_type,
                break_type: None,
            },
        );

        self.push_scope(Scope::for_node(node));
        let result = (|| {
            self.elaborate(condition)?;
            let condition_type = self.require_type(condition)?;
            if !matches!(self.values.get(condition_type), ValueData::BooleanType) {
                let rendered = self.values.format_type_outer(&self.nodes, &self.interns, Some(condition_type));
                return Err(self.error(
                    node,
                    ErrorKind::TypeMismatch,
                    format!("Expected boolean condition, but got {rendered}"),
                ));
            }
            self.elaborate(body)?;

            if let Some(else_body) = else_body {
                let wanted = self.temporary.wanted_type;
                self.elaborate_with(TemporaryContext::wanting(wanted), else_body)?;
                let else_type = self.get_type(else_body);
                if let Some(NodeData::While {
                    break_type: Some(agreed),
                    ..
                }) = self.get_data(node)
                {
                    let agreed = *agreed;
                    match (agreed, else_type) {
                        (None, Some(_)) => {
                            return Err(self.error(
                                node,
                                ErrorKind::TypeMismatch,
                                "Expected no value in else".to_owned(),
                            ));
                        }
                        (Some(_), None) => {
                            return Err(self.error(
                                node,
                                ErrorKind::TypeMismatch,
                                "Expected value in else".to_owned(),
                            ));
                        }
                        (Some(agreed), Some(else_type)) => {
                            if !self.values.equal(agreed, else_type) {
                                return Err(self.mismatched_type_error(node, Some(else_type), Some(agreed)));
                            }
                        }
                        (None, None) => {}
                    }
                }
            }
            Ok(())
        })();
        self.pop_scope();
        result?;

        // The loop produces a value only when breaks carry one and the else
        // arm provides the fallthrough result.
        if else_body.is_some() {
            if let Some(NodeData::While {
                break_type: Some(Some(agreed)),
                ..
            }) = self.get_data(node)
            {
                let agreed = *agreed;
                self.set_type(node, agreed);
            }
        }
        Ok(())
    }

    pub(crate) fn elaborate_break(&mut self, node: NodeId, value: Option<NodeId>) -> CompileResult<()> {
        let target = self
            .scopes
            .iter()
            .rev()
            .find_map(|scope| {
                scope
                    .node
                    .filter(|&owner| matches!(self.node(owner).kind, NodeKind::While { .. }))
            })
            .ok_or_else(|| self.error(node, ErrorKind::ControlFlow, "No surrounding while".to_owned()))?;

        let (while_wanted, agreed) = match self.get_data(target) {
            Some(NodeData::While {
                wanted_type,
                break_type,
            }) => (*wanted_type, *break_type),
            _ => (None, None),
        };

        let mut break_type = None;
        if let Some(value) = value {
            self.elaborate_with(TemporaryContext::wanting(while_wanted), value)?;
            break_type = self.get_type(value);
        }

        // The first break fixes the loop's value type; later ones must agree.
        if let Some(agreed) = agreed {
            match (agreed, break_type) {
                (None, Some(_)) => {
                    return Err(self.error(node, ErrorKind::TypeMismatch, "Expected no value".to_owned()));
                }
                (Some(_), None) => {
                    return Err(self.error(node, ErrorKind::TypeMismatch, "Expected value".to_owned()));
                }
                (Some(agreed), Some(given)) => {
                    if !self.values.equal(agreed, given) {
                        return Err(self.mismatched_type_error(node, Some(given), Some(agreed)));
                    }
                }
                (None, None) => {}
            }
        }
        if let Some(NodeData::While { break_type: slot, .. }) = self.get_data_mut(target) {
            *slot = Some(break_type);
        }

        self.set_data(node, NodeData::Break { target });
        Ok(())
    }

    pub(crate) fn elaborate_return(&mut self, node: NodeId, value: Option<NodeId>, kind: ReturnKind) -> CompileResult<()> {
        self.returned = true;

        let function_type = self
            .scopes
            .iter()
            .rev()
            .find_map(|scope| {
                scope.node.and_then(|owner| {
                    matches!(self.node(owner).kind, NodeKind::Function { .. }).then_some(scope.function_type)
                })
            })
            .flatten()
            .ok_or_else(|| self.error(node, ErrorKind::ControlFlow, "No surrounding function".to_owned()))?;

        let return_type = match self.values.get(function_type) {
            ValueData::FunctionType { return_type, .. } => *return_type,
            _ => None,
        };

        if let Some(value) = value {
            // `return ok`/`return err` project into the result type's arms.
            let mut wanted = return_type;
            if let Some(result_type) = return_type {
                if let ValueData::ResultType { value: success, error } = self.values.get(result_type) {
                    match kind {
                        ReturnKind::Ok => wanted = *success,
                        ReturnKind::Err => wanted = Some(*error),
                        ReturnKind::Plain => {}
                    }
                }
            }
            self.elaborate_with(TemporaryContext::wanting(wanted), value)?;
            let value_type = self.get_type(value);
            if let Some(wanted) = wanted {
                let ok = value_type.is_some_and(|value_type| self.values.assignable(wanted, value_type));
                if !ok {
                    return Err(self.expected_type_error(node, Some(wanted), value_type));
                }
            }
        }

        self.set_data(node, NodeData::Return { return_type });
        Ok(())
    }

    pub(crate) fn elaborate_catch(
        &mut self,
        node: NodeId,
        value: NodeId,
        binding: Option<NameId>,
        error: NodeId,
    ) -> CompileResult<()> {
        self.elaborate(value)?;
        let result_type = self.require_type(value)?;
        let ValueData::ResultType { value: success, error: error_type } = self.values.get(result_type) else {
            let rendered = self.values.format_type_outer(&self.nodes, &self.interns, Some(result_type));
            return Err(self.error(
                node,
                ErrorKind::TypeMismatch,
                format!("Expected result, but got {rendered}"),
            ));
        };
        let (success, error_type) = (*success, *error_type);

        let saved_returned = self.returned;
        self.returned = false;

        let mut scope = Scope::for_node(node);
        if let Some(binding) = binding {
            scope.bindings.insert(
                binding,
                Binding {
                    ty: error_type,
                    index: 0,
                },
            );
        }
        self.push_scope(scope);
        let arm_result = self.elaborate_with(TemporaryContext::wanting(success), error);
        self.pop_scope();
        arm_result?;

        let arm_returned = self.returned;
        self.returned = saved_returned;

        // The catch arm either produces the success value or diverges.
        if !arm_returned {
            let arm_type = self.get_type(error);
            match success {
                Some(success) => {
                    let ok = arm_type.is_some_and(|arm_type| self.values.assignable(success, arm_type));
                    if !ok {
                        return Err(self.expected_type_error(node, Some(success), arm_type));
                    }
                }
                None => {
                    if arm_type.is_some() {
                        return Err(self.error(
                            node,
                            ErrorKind::TypeMismatch,
                            "Expected no value from catch".to_owned(),
                        ));
                    }
                }
            }
        }

        self.set_data(
            node,
            NodeData::Catch {
                result_type,
                returned: arm_returned,
            },
        );
        if let Some(success) = success {
            self.set_type(node, success);
        }
        Ok(())
    }

    pub(crate) fn elaborate_for(
        &mut self,
        node: NodeId,
        items: &[NodeId],
        bindings: &[NameId],
        body: NodeId,
        is_static: bool,
    ) -> CompileResult<()> {
        self.push_scope(Scope::for_node(node));
        let result = self.elaborate_for_inner(node, items, bindings, body, is_static);
        self.pop_scope();
        result
    }

    fn elaborate_for_inner(
        &mut self,
        node: NodeId,
        items: &[NodeId],
        bindings: &[NameId],
        body: NodeId,
        is_static: bool,
    ) -> CompileResult<()> {
        let mut item_types = Vec::with_capacity(items.len());
        let mut element_types = Vec::with_capacity(items.len());
        for &item in items {
            self.elaborate(item)?;
            let item_type = self.require_type(item)?;
            let element = match self.values.get(item_type) {
                ValueData::ArrayViewType { inner } => *inner,
                ValueData::RangeType { element } => *element,
                // Array literals may drive a static unroll directly.
                ValueData::ArrayType { inner, .. } if is_static => *inner,
                _ => {
                    let rendered = self.values.format_type_outer(&self.nodes, &self.interns, Some(item_type));
                    return Err(self.error(
                        node,
                        ErrorKind::TypeMismatch,
                        format!("Cannot iterate over {rendered}"),
                    ));
                }
            };
            item_types.push(item_type);
            element_types.push(element);
        }

        let mut static_ids = Vec::new();
        if is_static {
            // One sequence, finitely known: unroll with a fresh static id per
            // iteration so each body copy elaborates independently.
            let [item] = items else {
                return Err(self.error(
                    node,
                    ErrorKind::ControlFlow,
                    "Expected exactly one sequence in a static for".to_owned(),
                ));
            };
            if !matches!(
                self.values.get(item_types[0]),
                ValueData::ArrayViewType { .. } | ValueData::ArrayType { .. }
            ) {
                let rendered = self.values.format_type_outer(&self.nodes, &self.interns, Some(item_types[0]));
                return Err(self.error(
                    node,
                    ErrorKind::TypeMismatch,
                    format!("Expected an array view to unroll, but got {rendered}"),
                ));
            }
            let Some(&element_binding) = bindings.first() else {
                return Err(self.error(
                    node,
                    ErrorKind::ControlFlow,
                    "Expected a binding in a static for".to_owned(),
                ));
            };
            let looped = self.evaluate_for_elaboration(*item)?;
            let (ValueData::ArrayView(values) | ValueData::Array(values)) = self.values.get(looped) else {
                return Err(self.error(
                    node,
                    ErrorKind::ControlFlow,
                    "Expected a compile-time array view to unroll".to_owned(),
                ));
            };
            let values = values.clone();

            let saved_static_id = self.static_id;
            for (index, element) in values.iter().enumerate() {
                let static_id = self.fresh_static_id();
                self.static_id = static_id;
                static_ids.push(static_id);

                self.last_scope_mut().static_bindings.insert(
                    element_binding,
                    TypedValue {
                        value: *element,
                        ty: element_types[0],
                    },
                );
                if let Some(&index_binding) = bindings.get(1) {
                    let index_value = self.values.integer(i64::try_from(index).unwrap_or(i64::MAX));
                    let bits = self.codegen.default_integer_size();
                    let index_type = self.values.integer_type(false, bits);
                    self.last_scope_mut().static_bindings.insert(
                        index_binding,
                        TypedValue {
                            value: index_value,
                            ty: index_type,
                        },
                    );
                }

                let iteration = self.elaborate(body);
                self.static_id = saved_static_id;
                iteration?;
            }
        } else {
            if items.len() != bindings.len() {
                return Err(self.error(
                    node,
                    ErrorKind::ControlFlow,
                    format!("Expected {} bindings, but got {}", items.len(), bindings.len()),
                ));
            }
            for (index, &binding) in bindings.iter().enumerate() {
                self.last_scope_mut().bindings.insert(
                    binding,
                    Binding {
                        ty: element_types[index],
                        index,
                    },
                );
            }
            self.elaborate(body)?;
        }

        self.set_data(node, NodeData::For { item_types, static_ids });
        Ok(())
    }

    pub(crate) fn elaborate_switch(&mut self, node: NodeId) -> CompileResult<()> {
        let NodeKind::Switch {
            condition,
            ref cases,
            is_static,
        } = self.node(node).kind
        else {
            unreachable!("elaborate_switch on a non-switch");
        };
        let cases = cases.clone();

        self.elaborate(condition)?;
        let condition_type = self.require_type(condition)?;
        if !matches!(
            self.values.get(condition_type),
            ValueData::EnumType { .. } | ValueData::TaggedUnionType { .. }
        ) {
            let rendered = self.values.format_type_outer(&self.nodes, &self.interns, Some(condition_type));
            return Err(self.error(
                node,
                ErrorKind::TypeMismatch,
                format!("Expected enum, but got {rendered}"),
            ));
        }
        let enum_type = match self.values.get(condition_type) {
            ValueData::TaggedUnionType { enum_type, .. } => *enum_type,
            _ => condition_type,
        };

        for case in &cases {
            if let Some(value) = case.value {
                self.elaborate_with(TemporaryContext::wanting(Some(enum_type)), value)?;
                let value_type = self.require_type(value)?;
                if !self.values.assignable(enum_type, value_type) {
                    return Err(self.expected_type_error(value, Some(enum_type), Some(value_type)));
                }
            }
        }

        if is_static {
            self.elaborate_switch_static(node, condition, condition_type, &cases)
        } else {
            self.elaborate_switch_runtime(node, condition_type, enum_type, &cases)
        }
    }

    /// `switch static` selects exactly one case at compile time: the first
    /// value match, or the no-value case as the default.
    fn elaborate_switch_static(
        &mut self,
        node: NodeId,
        condition: NodeId,
        condition_type: ValueId,
        cases: &[SwitchCase],
    ) -> CompileResult<()> {
        let switched = self.evaluate_for_elaboration(condition)?;
        let (tag, payload) = match self.values.get(switched) {
            ValueData::TaggedUnion { tag, payload } => (*tag, Some(*payload)),
            _ => (switched, None),
        };

        let mut selected = None;
        for (index, case) in cases.iter().enumerate() {
            match case.value {
                Some(value) => {
                    let case_value = self.evaluate_for_elaboration(value)?;
                    if self.values.equal(case_value, tag) {
                        selected = Some(index);
                        break;
                    }
                }
                None => selected = Some(index),
            }
        }

        if let Some(index) = selected {
            let case = &cases[index];
            let mut scope = Scope::for_node(node);
            if let (Some(binding), Some(payload)) = (case.binding, payload) {
                let payload_type = match (self.values.get(condition_type), self.values.get(tag)) {
                    (ValueData::TaggedUnionType { items, .. }, ValueData::Enum(tag_index)) => items[*tag_index].1,
                    _ => condition_type,
                };
                scope.static_bindings.insert(
                    binding,
                    TypedValue {
                        value: payload,
                        ty: payload_type,
                    },
                );
            }
            self.push_scope(scope);
            let wanted = self.temporary.wanted_type;
            let result = self.elaborate_with(TemporaryContext::wanting(wanted), case.body);
            self.pop_scope();
            result?;
            if let Some(ty) = self.get_type(case.body) {
                self.set_type(node, ty);
            }
        }

        self.set_data(
            node,
            NodeData::Switch {
                static_case: selected,
                cases_returned: Vec::new(),
                returned: false,
                ty: self.get_type(node),
            },
        );
        Ok(())
    }

    fn elaborate_switch_runtime(
        &mut self,
        node: NodeId,
        condition_type: ValueId,
        enum_type: ValueId,
        cases: &[SwitchCase],
    ) -> CompileResult<()> {
        let saved_returned = self.returned;
        let wanted = self.temporary.wanted_type;

        let mut switch_type = None;
        let mut saw_valueless_case = false;
        let mut case_count = 0usize;
        let mut else_case = false;
        let mut cases_returned = Vec::with_capacity(cases.len());

        for (index, case) in cases.iter().enumerate() {
            let mut binding_type = None;
            match case.value {
                Some(value) => {
                    case_count += 1;
                    if let ValueData::TaggedUnionType { items, .. } = self.values.get(condition_type) {
                        let items = items.clone();
                        let checked = self.evaluate_for_elaboration(value)?;
                        if let ValueData::Enum(tag_index) = self.values.get(checked) {
                            binding_type = Some(items[*tag_index].1);
                        }
                    }
                }
                None => else_case = true,
            }

            let mut scope = Scope::for_node(node);
            if let Some(binding) = case.binding {
                scope.bindings.insert(
                    binding,
                    Binding {
                        ty: binding_type.unwrap_or_else(|| self.values.none()),
                        index: 0,
                    },
                );
            }

            let previous_returned = self.returned;
            self.returned = false;
            self.push_scope(scope);
            let case_result = self.elaborate_with(TemporaryContext::wanting(wanted), case.body);
            self.pop_scope();
            case_result?;

            let case_returned = self.returned;
            self.returned = saved_returned;
            cases_returned.push(case_returned);
            // The switch diverges only when every case so far diverges.
            if (previous_returned || index == 0) && case_returned {
                self.returned = true;
            }

            let case_type = self.get_type(case.body);
            match case_type {
                Some(case_type) => {
                    match switch_type {
                        None if saw_valueless_case => {
                            return Err(self.error(
                                node,
                                ErrorKind::TypeMismatch,
                                "Expected value from case".to_owned(),
                            ));
                        }
                        None => switch_type = Some(case_type),
                        Some(agreed) => {
                            if !self.values.equal(agreed, case_type) {
                                return Err(self.mismatched_type_error(node, Some(agreed), Some(case_type)));
                            }
                        }
                    }
                }
                None => {
                    if !case_returned {
                        if switch_type.is_some() {
                            return Err(self.error(
                                node,
                                ErrorKind::TypeMismatch,
                                "Expected value from case".to_owned(),
                            ));
                        }
                        saw_valueless_case = true;
                    }
                }
            }
        }

        // Exhaustiveness is counted against the enum's item list.
        let item_count = match self.values.get(enum_type) {
            ValueData::EnumType { items } => items.len(),
            _ => 0,
        };
        if case_count < item_count && !else_case {
            self.returned = saved_returned;
            return Err(self.error(
                node,
                ErrorKind::Exhaustiveness,
                format!(
                    "Switch covers {case_count} of {item_count} enum items and has no else case"
                ),
            ));
        }

        if let Some(switch_type) = switch_type {
            self.set_type(node, switch_type);
        }
        self.set_data(
            node,
            NodeData::Switch {
                static_case: None,
                cases_returned,
                returned: self.returned,
                ty: switch_type,
            },
        );
        Ok(())
    }
}
