//! Node arena.
//!
//! [`NodeArena`] owns every node of a family of trees together with the
//! side tables nodes index into. Nodes are append-only: once pushed, a node
//! never changes, so a [`NodeId`] is a stable identity and "same instance"
//! means "same id". The one exception is the slot table, which backs the
//! mutable wrapper extension.
//!
//! # Index Spaces
//!
//! - `nodes`/`types`: parallel arrays indexed by [`NodeId`]
//! - `node_lists`: flat `Vec<NodeId>` indexed by [`NodeRange`]
//! - `var_lists`: flat `Vec<VarId>` indexed by [`VarRange`]
//! - `catches`: indexed by [`CatchRange`]
//! - `extensions`: indexed by [`ExtId`]
//! - `slots`: indexed by [`SlotId`], the only mutable table

use rustc_hash::FxHashMap;

use crate::extension::Extension;
use crate::ids::{to_u16, to_u32};
use crate::known::KnownNames;
use crate::node::{CatchBlock, LabelTarget, Node, NodeTag, Variable};
use crate::{
    CatchRange, ExtId, IrError, IrResult, LabelId, Name, NodeId, NodeRange, SharedInterner,
    SlotId, StringInterner, TypeId, TypePool, VarId, VarRange,
};

/// Storage for nodes and their side tables.
#[derive(Clone, Debug)]
pub struct NodeArena {
    nodes: Vec<Node>,
    types: Vec<TypeId>,
    node_lists: Vec<NodeId>,
    var_lists: Vec<VarId>,
    variables: Vec<Variable>,
    labels: Vec<LabelTarget>,
    catches: Vec<CatchBlock>,
    extensions: Vec<Extension>,
    /// Current target of each slot.
    slots: Vec<NodeId>,
    /// Extension node wrapping each slot.
    slot_nodes: Vec<NodeId>,
    /// One shared placeholder node per variable.
    placeholders: FxHashMap<VarId, NodeId>,
    pool: TypePool,
    interner: SharedInterner,
    names: KnownNames,
}

impl NodeArena {
    /// Create an empty arena with its own interner.
    pub fn new() -> Self {
        Self::with_interner(StringInterner::shared())
    }

    /// Create an empty arena sharing the host's interner.
    pub fn with_interner(interner: SharedInterner) -> Self {
        let names = KnownNames::new(&interner);
        NodeArena {
            nodes: Vec::new(),
            types: Vec::new(),
            node_lists: Vec::new(),
            var_lists: Vec::new(),
            variables: Vec::new(),
            labels: Vec::new(),
            catches: Vec::new(),
            extensions: Vec::new(),
            slots: Vec::new(),
            slot_nodes: Vec::new(),
            placeholders: FxHashMap::default(),
            pool: TypePool::new(interner.clone()),
            interner,
            names,
        }
    }

    // ── Accessors ───────────────────────────────────────────────

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    #[inline]
    pub fn ty(&self, id: NodeId) -> TypeId {
        self.types[id.index()]
    }

    #[inline]
    pub fn tag(&self, id: NodeId) -> NodeTag {
        self.node(id).tag()
    }

    /// Whether `id` is an extension node that must be reduced before emission.
    #[inline]
    pub fn can_reduce(&self, id: NodeId) -> bool {
        self.node(id).can_reduce()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get_list(&self, range: NodeRange) -> &[NodeId] {
        if range.is_empty() {
            return &[];
        }
        let start = range.start as usize;
        &self.node_lists[start..start + range.len()]
    }

    pub fn get_vars(&self, range: VarRange) -> &[VarId] {
        if range.is_empty() {
            return &[];
        }
        let start = range.start as usize;
        &self.var_lists[start..start + range.len()]
    }

    pub fn get_catches(&self, range: CatchRange) -> &[CatchBlock] {
        if range.is_empty() {
            return &[];
        }
        let start = range.start as usize;
        &self.catches[start..start + range.len()]
    }

    #[inline]
    pub fn variable(&self, var: VarId) -> &Variable {
        &self.variables[var.index()]
    }

    #[inline]
    pub fn label(&self, label: LabelId) -> &LabelTarget {
        &self.labels[label.index()]
    }

    #[inline]
    pub fn extension(&self, ext: ExtId) -> &Extension {
        &self.extensions[ext.index()]
    }

    /// The extension payload of `id`, if it is an extension node.
    pub fn extension_of(&self, id: NodeId) -> Option<&Extension> {
        match self.node(id) {
            Node::Extension(ext) => Some(self.extension(*ext)),
            _ => None,
        }
    }

    /// Current target of a slot. `NodeId::INVALID` until assigned, and for
    /// slots this arena never allocated.
    #[inline]
    pub fn slot_target(&self, slot: SlotId) -> NodeId {
        self.slots.get(slot.index()).copied().unwrap_or(NodeId::INVALID)
    }

    /// The extension node wrapping `slot`, `NodeId::INVALID` for a foreign slot.
    #[inline]
    pub fn slot_node(&self, slot: SlotId) -> NodeId {
        self.slot_nodes
            .get(slot.index())
            .copied()
            .unwrap_or(NodeId::INVALID)
    }

    pub fn pool(&self) -> &TypePool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut TypePool {
        &mut self.pool
    }

    pub fn interner(&self) -> &SharedInterner {
        &self.interner
    }

    pub fn names(&self) -> &KnownNames {
        &self.names
    }

    pub fn intern(&self, s: &str) -> Name {
        self.interner.intern(s)
    }

    pub fn name_str(&self, name: Name) -> &'static str {
        self.interner.lookup(name)
    }

    /// Render a type for diagnostics.
    pub fn display_type(&self, ty: TypeId) -> String {
        self.pool.display(ty)
    }

    // ── Raw allocation ──────────────────────────────────────────

    /// Allocate a node without validation. Factories in `build` validate first.
    pub(crate) fn push(&mut self, node: Node, ty: TypeId) -> NodeId {
        let id = NodeId::new(to_u32(self.nodes.len(), "nodes"));
        self.nodes.push(node);
        self.types.push(ty);
        id
    }

    pub(crate) fn push_list(&mut self, ids: &[NodeId]) -> NodeRange {
        if ids.is_empty() {
            return NodeRange::EMPTY;
        }
        let start = to_u32(self.node_lists.len(), "node lists");
        self.node_lists.extend_from_slice(ids);
        NodeRange::new(start, to_u16(ids.len(), "node list"))
    }

    pub(crate) fn push_vars(&mut self, vars: &[VarId]) -> VarRange {
        if vars.is_empty() {
            return VarRange::EMPTY;
        }
        let start = to_u32(self.var_lists.len(), "variable lists");
        self.var_lists.extend_from_slice(vars);
        VarRange::new(start, to_u16(vars.len(), "variable list"))
    }

    pub(crate) fn push_catches(&mut self, handlers: &[CatchBlock]) -> CatchRange {
        if handlers.is_empty() {
            return CatchRange::EMPTY;
        }
        let start = to_u32(self.catches.len(), "catch handlers");
        self.catches.extend_from_slice(handlers);
        CatchRange::new(start, to_u16(handlers.len(), "catch list"))
    }

    pub(crate) fn push_extension(&mut self, ext: Extension, ty: TypeId) -> NodeId {
        let ext_id = ExtId::new(to_u32(self.extensions.len(), "extensions"));
        self.extensions.push(ext);
        self.push(Node::Extension(ext_id), ty)
    }

    pub(crate) fn push_slot(&mut self, target: NodeId, ty: TypeId) -> (SlotId, NodeId) {
        let slot = SlotId::new(to_u32(self.slots.len(), "slots"));
        self.slots.push(target);
        let node = self.push_extension(Extension::Slot(slot), ty);
        self.slot_nodes.push(node);
        (slot, node)
    }

    pub(crate) fn retarget_slot(&mut self, slot: SlotId, target: NodeId) {
        self.slots[slot.index()] = target;
    }

    // ── Declarations ────────────────────────────────────────────

    /// Declare a variable. Variables are identities; two declarations with
    /// the same name are distinct.
    pub fn declare_variable(&mut self, name: Name, ty: TypeId) -> VarId {
        let var = VarId::new(to_u32(self.variables.len(), "variables"));
        self.variables.push(Variable { name, ty });
        var
    }

    /// Declare a variable by string name.
    pub fn local(&mut self, name: &str, ty: TypeId) -> VarId {
        let name = self.intern(name);
        self.declare_variable(name, ty)
    }

    /// Declare a jump target carrying values of type `ty`.
    pub fn declare_label(&mut self, name: &str, ty: TypeId) -> LabelId {
        let name = self.intern(name);
        let label = LabelId::new(to_u32(self.labels.len(), "labels"));
        self.labels.push(LabelTarget { name, ty });
        label
    }

    /// The placeholder node reading `var`. Every read of a variable shares it.
    pub fn parameter(&mut self, var: VarId) -> NodeId {
        if let Some(&id) = self.placeholders.get(&var) {
            return id;
        }
        let ty = self.variable(var).ty;
        let id = self.push(Node::Parameter(var), ty);
        self.placeholders.insert(var, id);
        id
    }

    // ── Validation helpers ──────────────────────────────────────
    //
    // Shared with custom node kinds defined outside this crate.

    /// Check that `id` refers to an allocated node.
    pub fn check_node(&self, param: &'static str, id: NodeId) -> IrResult<()> {
        if id.is_valid() && id.index() < self.nodes.len() {
            Ok(())
        } else {
            Err(IrError::invalid(param, format!("{id:?} is not a node of this arena")))
        }
    }

    pub fn check_optional(&self, param: &'static str, id: NodeId) -> IrResult<()> {
        if id.is_valid() {
            self.check_node(param, id)
        } else {
            Ok(())
        }
    }

    pub fn check_var(&self, param: &'static str, var: VarId) -> IrResult<()> {
        if var.is_valid() && var.index() < self.variables.len() {
            Ok(())
        } else {
            Err(IrError::invalid(param, format!("{var:?} is not declared")))
        }
    }

    pub fn check_label(&self, param: &'static str, label: LabelId) -> IrResult<()> {
        if label.is_valid() && label.index() < self.labels.len() {
            Ok(())
        } else {
            Err(IrError::invalid(param, format!("{label:?} is not declared")))
        }
    }

    pub fn check_slot(&self, param: &'static str, slot: SlotId) -> IrResult<()> {
        if slot.is_valid() && slot.index() < self.slot_nodes.len() {
            Ok(())
        } else {
            Err(IrError::invalid(param, "slot not allocated in this arena"))
        }
    }

    /// Check that a node's type can be stored where `expected` is wanted.
    pub fn check_assignable(
        &self,
        param: &'static str,
        id: NodeId,
        expected: TypeId,
    ) -> IrResult<()> {
        let found = self.ty(id);
        if self.pool.is_assignable(found, expected) {
            Ok(())
        } else {
            Err(IrError::TypeMismatch {
                param,
                expected: self.display_type(expected),
                found: self.display_type(found),
            })
        }
    }
}

impl Default for NodeArena {
    fn default() -> Self {
        Self::new()
    }
}
