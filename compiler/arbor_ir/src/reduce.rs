//! Reduction of extension nodes to primitive subtrees.
//!
//! Each extension kind defines exactly one reduction step. The result has the
//! same type as the reduced node and may itself contain extension nodes
//! (a query reduces to `foreach` loops, which reduce further); callers that
//! need a primitive-only tree use [`reduce_fully`](crate::rewrite::reduce_fully).

use crate::extension::{
    DoWhileLoop, Extension, ForEachLoop, ForLoop, FormatString, LockBlock, TupleNode, UsingBlock,
    WhileLoop,
};
use crate::node::{AssignOp, BinaryOp, ConstValue, Node, UnaryOp};
use crate::types::{CurrentAccess, TypeData};
use crate::{IrError, IrResult, LabelId, NodeArena, NodeId, TypeId};

/// Upper bound on reduction steps applied to a single node before the
/// reduction chain is assumed to be cyclic.
pub const MAX_REDUCTION_STEPS: usize = 64;

impl NodeArena {
    /// Apply one reduction step to an extension node.
    ///
    /// Reducing a primitive node is an invariant violation.
    #[tracing::instrument(level = "trace", skip(self), fields(kind = tracing::field::Empty))]
    pub fn reduce(&mut self, id: NodeId) -> IrResult<NodeId> {
        self.check_node("id", id)?;
        let Node::Extension(ext) = *self.node(id) else {
            return Err(IrError::invariant(format!(
                "reduce called on primitive node {} ({id:?})",
                self.tag(id)
            )));
        };
        let ext = self.extension(ext).clone();
        tracing::Span::current().record("kind", ext.kind_name());
        let reduced = match &ext {
            Extension::While(w) => self.reduce_while(w),
            Extension::DoWhile(d) => self.reduce_do_while(d),
            Extension::For(f) => self.reduce_for(f),
            Extension::ForEach(f) => self.reduce_for_each(f),
            Extension::Using(u) => self.reduce_using(u, id),
            Extension::Lock(l) => self.reduce_lock(l, id),
            Extension::Tuple(t) => self.reduce_tuple(t, id),
            Extension::Format(f) => self.reduce_format(f),
            Extension::TypeLiteral(t) => Ok(self.constant(ConstValue::Type(t.target))),
            Extension::Slot(slot) => {
                let target = self.slot_target(*slot);
                if target.is_valid() {
                    Ok(target)
                } else {
                    Err(IrError::invariant(format!(
                        "{slot:?} reduced before it was assigned"
                    )))
                }
            }
            Extension::Custom(custom) => custom.reduce(self, id),
        }?;
        if reduced == id {
            return Err(IrError::invariant(format!(
                "{} reduced to itself",
                ext.kind_name()
            )));
        }
        Ok(reduced)
    }

    /// Reduce a single node until it is primitive.
    ///
    /// Only the root is reduced; children may still be extension nodes.
    pub fn reduce_to_primitive(&mut self, id: NodeId) -> IrResult<NodeId> {
        let mut current = id;
        for _ in 0..MAX_REDUCTION_STEPS {
            if !self.can_reduce(current) {
                return Ok(current);
            }
            current = self.reduce(current)?;
        }
        Err(IrError::invariant(format!(
            "{id:?} did not reach a primitive node within {MAX_REDUCTION_STEPS} steps"
        )))
    }

    /// `loop { if (test) body else break }`
    fn reduce_while(&mut self, w: &WhileLoop) -> IrResult<NodeId> {
        let exit = self.break_to(w.break_label)?;
        let step = self.if_then(w.test, w.body, exit)?;
        self.loop_node(step, w.break_label, w.continue_label)
    }

    /// `loop { body; continue: if (test) {} else break }`
    fn reduce_do_while(&mut self, d: &DoWhileLoop) -> IrResult<NodeId> {
        let resume = self.label_node(d.continue_label, NodeId::INVALID)?;
        let exit = self.break_to(d.break_label)?;
        let nothing = self.empty();
        let check = self.if_then(d.test, nothing, exit)?;
        let body = self.block_typed(TypeId::UNIT, &[], &[d.body, resume, check])?;
        self.loop_node(body, d.break_label, LabelId::INVALID)
    }

    /// `{ vars; inits; loop { if (!test) break; body; continue: steps } }`
    fn reduce_for(&mut self, f: &ForLoop) -> IrResult<NodeId> {
        let mut body = Vec::with_capacity(f.steps.len() + 3);
        if f.test.is_valid() {
            let exit = self.break_to(f.break_label)?;
            let nothing = self.empty();
            body.push(self.if_then(f.test, nothing, exit)?);
        }
        body.push(f.body);
        body.push(self.label_node(f.continue_label, NodeId::INVALID)?);
        body.extend_from_slice(self.get_list(f.steps));
        let body = self.block_typed(TypeId::UNIT, &[], &body)?;
        let repeat = self.loop_node(body, f.break_label, LabelId::INVALID)?;

        let mut outer: Vec<NodeId> = self.get_list(f.initializers).to_vec();
        outer.push(repeat);
        let variables = self.get_vars(f.variables).to_vec();
        self.block_typed(TypeId::UNIT, &variables, &outer)
    }

    fn reduce_for_each(&mut self, f: &ForEachLoop) -> IrResult<NodeId> {
        let collection_ty = self.ty(f.collection);
        if let TypeData::Array(element) = *self.pool().get(collection_ty) {
            tracing::debug!(strategy = "index", "lowering foreach over array");
            return self.reduce_for_each_array(f, collection_ty, element);
        }
        self.reduce_for_each_enumerator(f)
    }

    /// Index loop over an array, avoiding the enumerator protocol.
    fn reduce_for_each_array(
        &mut self,
        f: &ForEachLoop,
        array_ty: TypeId,
        element: TypeId,
    ) -> IrResult<NodeId> {
        let array = self.local("$array", array_ty);
        let index = self.local("$index", TypeId::INT);
        let array_ref = self.parameter(array);
        let index_ref = self.parameter(index);

        let store_array = self.assign(array_ref, f.collection)?;
        let zero = self.int(0);
        let store_index = self.assign(index_ref, zero)?;

        let length = self.unary(UnaryOp::ArrayLength, array_ref)?;
        let in_bounds = self.binary(BinaryOp::LessThan, index_ref, length)?;
        let item = self.index(array_ref, &[index_ref])?;
        let item = self.coerce(item, element, self.variable(f.variable).ty)?;
        let var_ref = self.parameter(f.variable);
        let bind = self.assign(var_ref, item)?;
        let iteration = self.block_typed(TypeId::UNIT, &[f.variable], &[bind, f.body])?;
        let exit = self.break_to(f.break_label)?;
        let step = self.if_then(in_bounds, iteration, exit)?;
        let resume = self.label_node(f.continue_label, NodeId::INVALID)?;
        let advance = self.increment(AssignOp::PreIncrement, index_ref)?;
        let body = self.block_typed(TypeId::UNIT, &[], &[step, resume, advance])?;
        let repeat = self.loop_node(body, f.break_label, LabelId::INVALID)?;

        self.block_typed(
            TypeId::UNIT,
            &[array, index],
            &[store_array, store_index, repeat],
        )
    }

    /// Enumerator loop, guarded by `dispose` when the enumerator is disposable.
    fn reduce_for_each_enumerator(&mut self, f: &ForEachLoop) -> IrResult<NodeId> {
        let collection_ty = self.ty(f.collection);
        let Some(shape) = self.pool_mut().enumerator_shape(collection_ty) else {
            return Err(IrError::NotEnumerable {
                param: "collection",
                ty: self.display_type(collection_ty),
            });
        };
        tracing::debug!(
            source = ?shape.source,
            enumerator = %self.display_type(shape.enumerator),
            "lowering foreach through enumerator"
        );
        let names = *self.names();
        let cursor = self.local("$enumerator", shape.enumerator);
        let cursor_ref = self.parameter(cursor);

        let acquire = self.call(f.collection, names.get_enumerator, &[], shape.enumerator)?;
        let store = self.assign(cursor_ref, acquire)?;

        let advance = self.call(cursor_ref, names.move_next, &[], TypeId::BOOL)?;
        let current = match shape.current {
            CurrentAccess::Member => self.member(cursor_ref, names.current, shape.element)?,
            CurrentAccess::Method => self.call(cursor_ref, names.current, &[], shape.element)?,
        };
        let current = self.coerce(current, shape.element, self.variable(f.variable).ty)?;
        let var_ref = self.parameter(f.variable);
        let bind = self.assign(var_ref, current)?;
        let iteration = self.block_typed(TypeId::UNIT, &[f.variable], &[bind, f.body])?;
        let exit = self.break_to(f.break_label)?;
        let step = self.if_then(advance, iteration, exit)?;
        let repeat = self.loop_node(step, f.break_label, f.continue_label)?;

        let protected = if self.pool().is_disposable(shape.enumerator) {
            tracing::debug!("enumerator is disposable, adding release guard");
            let release = self.call(cursor_ref, names.dispose, &[], TypeId::UNIT)?;
            self.try_finally(repeat, release)?
        } else {
            repeat
        };
        self.block_typed(TypeId::UNIT, &[cursor], &[store, protected])
    }

    /// `{ v = resource; try { body } finally { if (v != null) v.dispose() } }`
    fn reduce_using(&mut self, u: &UsingBlock, id: NodeId) -> IrResult<NodeId> {
        let resource_ty = self.ty(u.resource);
        let variable = if u.variable.is_valid() {
            u.variable
        } else {
            self.local("$resource", resource_ty)
        };
        let var_ref = self.parameter(variable);
        let store = self.assign(var_ref, u.resource)?;

        let dispose = self.names().dispose;
        let release = self.call(var_ref, dispose, &[], TypeId::UNIT)?;
        let var_ty = self.variable(variable).ty;
        let guard = if self.pool().is_reference(var_ty) {
            let null = self.null(var_ty)?;
            let present = self.binary(BinaryOp::NotEqual, var_ref, null)?;
            let nothing = self.empty();
            self.if_then(present, release, nothing)?
        } else {
            release
        };
        let protected = self.try_finally(u.body, guard)?;
        self.block_typed(self.ty(id), &[variable], &[store, protected])
    }

    /// `{ l = lock; monitor.enter(l); try { body } finally { monitor.exit(l) } }`
    fn reduce_lock(&mut self, l: &LockBlock, id: NodeId) -> IrResult<NodeId> {
        let names = *self.names();
        let held = self.local("$lock", self.ty(l.lock));
        let held_ref = self.parameter(held);
        let store = self.assign(held_ref, l.lock)?;
        let enter = self.static_call(names.monitor_enter, &[held_ref], TypeId::UNIT)?;
        let exit = self.static_call(names.monitor_exit, &[held_ref], TypeId::UNIT)?;
        let protected = self.try_finally(l.body, exit)?;
        self.block_typed(self.ty(id), &[held], &[store, enter, protected])
    }

    fn reduce_tuple(&mut self, t: &TupleNode, id: NodeId) -> IrResult<NodeId> {
        let elements = self.get_list(t.elements).to_vec();
        self.new_object(self.ty(id), &elements)
    }

    /// `string.concat(seg0, seg1.to_str(), ...)`
    fn reduce_format(&mut self, f: &FormatString) -> IrResult<NodeId> {
        let names = *self.names();
        let segments = self.get_list(f.segments).to_vec();
        let mut parts = Vec::with_capacity(segments.len());
        for segment in segments {
            if self.ty(segment) == TypeId::STR {
                parts.push(segment);
            } else {
                parts.push(self.call(segment, names.to_str, &[], TypeId::STR)?);
            }
        }
        self.static_call(names.concat, &parts, TypeId::STR)
    }

    /// Convert `value` from `from` to `to` when they differ.
    fn coerce(&mut self, value: NodeId, from: TypeId, to: TypeId) -> IrResult<NodeId> {
        if from == to {
            Ok(value)
        } else {
            self.convert(UnaryOp::Convert, value, to)
        }
    }
}
