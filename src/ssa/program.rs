//! The SSA program container.
//!
//! A [`Program`] is an append-only arena of [`Node`]s addressed by [`ValueId`]. Nodes
//! reference their operands by index, so the graph is a DAG whose edges always point at
//! nodes of the same program. Three nodes exist in every program:
//!
//! | Index | Node | Meaning |
//! |-------|------|---------|
//! | 0 | `init` | all lanes valid |
//! | 1 | `false` | no lane valid |
//! | 2 | `mem` | initial memory token |
//!
//! # Construction
//!
//! [`Program::ssa`] is the single construction primitive. It checks the operands
//! against the operator's [`Signature`], returns an existing node when an identical one
//! was already built, and (unless disabled) applies the peephole rules at the new site.
//! Operands that do not fit the signature do not panic: the result is an `invalid` node
//! whose immediate explains the mismatch, and invalid operands propagate unchanged. The
//! compiler's coercion helpers turn such a node into an [`crate::Error::Invalid`].
//!
//! # Masks
//!
//! Every node has a validity mask, derived by [`Program::mask`]: boolean nodes and
//! self-masked values are their own mask, everything else is masked by its last boolean
//! operand. Boolean nodes additionally have a not-missing set ([`Program::not_missing`]),
//! which is what three-valued logic needs to tell FALSE from MISSING.
//!
//! # Rewriting
//!
//! [`Program::clobber`] replaces a node's contents while keeping its index, so every
//! reference to the node stays valid.

use std::{collections::HashMap, fmt};

use crate::{
    config::CompileConfig,
    events::{EventKind, EventLog},
    rewrite,
    ssa::{
        opcode::{ImmKind, Op, Opcode, Signature},
        types::SsaType,
        value::{Datum, Immediate, MaskedValue, ValueId},
    },
    Result,
};

/// One operation in the program graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    op: Op,
    args: Vec<ValueId>,
    imm: Option<Immediate>,
    not_missing: Option<ValueId>,
}

impl Node {
    /// The operator.
    #[must_use]
    pub const fn op(&self) -> Op {
        self.op
    }

    /// The operands, in signature order.
    #[must_use]
    pub fn args(&self) -> &[ValueId] {
        &self.args
    }

    /// The immediate, if the operator carries one.
    #[must_use]
    pub fn imm(&self) -> Option<&Immediate> {
        self.imm.as_ref()
    }

    /// Explicit not-missing set of a boolean node, if one was attached.
    #[must_use]
    pub const fn not_missing_override(&self) -> Option<ValueId> {
        self.not_missing
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct NodeKey {
    op: Op,
    args: Vec<ValueId>,
    imm: Option<Immediate>,
    not_missing: Option<ValueId>,
}

/// An SSA program: the compiled form of one expression.
#[derive(Debug, Clone)]
pub struct Program {
    nodes: Vec<Node>,
    dedup: HashMap<NodeKey, ValueId>,
    nm_cache: HashMap<ValueId, ValueId>,
    root: Option<ValueId>,
    config: CompileConfig,
    events: EventLog,
}

impl Default for Program {
    fn default() -> Self {
        Self::new(CompileConfig::default())
    }
}

impl Program {
    /// The all-valid mask.
    pub const INIT: ValueId = ValueId::new(0);
    /// The all-false mask.
    pub const FALSE: ValueId = ValueId::new(1);
    /// The initial memory token.
    pub const MEM: ValueId = ValueId::new(2);

    /// Creates an empty program holding only the predefined nodes.
    #[must_use]
    pub fn new(config: CompileConfig) -> Self {
        let events = if config.record_events {
            EventLog::new()
        } else {
            EventLog::disabled()
        };
        let mut program = Self {
            nodes: Vec::new(),
            dedup: HashMap::new(),
            nm_cache: HashMap::new(),
            root: None,
            config,
            events,
        };
        program.intern(Op::Init, None);
        program.intern(Op::False, None);
        program.intern(Op::Mem, None);
        program
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Number of nodes in the arena, including unreachable ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the arena holds only the predefined nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 3
    }

    /// The node stored at `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this program.
    #[must_use]
    pub fn node(&self, id: ValueId) -> &Node {
        &self.nodes[id.index()]
    }

    /// The operator of `id`.
    #[must_use]
    pub fn op(&self, id: ValueId) -> Op {
        self.node(id).op
    }

    /// The operands of `id`.
    #[must_use]
    pub fn args(&self, id: ValueId) -> &[ValueId] {
        &self.node(id).args
    }

    /// The immediate of `id`.
    #[must_use]
    pub fn imm(&self, id: ValueId) -> Option<&Immediate> {
        self.node(id).imm.as_ref()
    }

    /// The constant carried by `id` if it is a literal.
    #[must_use]
    pub fn literal_value(&self, id: ValueId) -> Option<&Datum> {
        match self.node(id) {
            Node {
                op: Op::Literal,
                imm: Some(Immediate::Datum(d)),
                ..
            } => Some(d),
            _ => None,
        }
    }

    /// Returns true if `id` is a literal.
    #[must_use]
    pub fn is_literal(&self, id: ValueId) -> bool {
        self.op(id) == Op::Literal
    }

    /// Returns true if `id` is an all-false mask (the singleton or a copy of it carrying
    /// a not-missing set).
    #[must_use]
    pub fn is_false(&self, id: ValueId) -> bool {
        self.op(id) == Op::False
    }

    /// Returns true if `id` is the all-valid mask.
    #[must_use]
    pub fn is_init(&self, id: ValueId) -> bool {
        self.op(id) == Op::Init
    }

    /// The diagnostic stored on an invalid node.
    #[must_use]
    pub fn invalid_message(&self, id: ValueId) -> Option<&str> {
        match self.node(id) {
            Node {
                op: Op::Invalid,
                imm: Some(Immediate::Text(msg)),
                ..
            } => Some(msg),
            _ => None,
        }
    }

    /// The declared return type of `id`.
    #[must_use]
    pub fn ret_type(&self, id: ValueId) -> SsaType {
        let node = self.node(id);
        match node.op {
            Op::Literal => node
                .imm
                .as_ref()
                .and_then(Immediate::as_datum)
                .map_or(SsaType::VALUE, Datum::ssa_type),
            Op::Invalid => SsaType::empty(),
            Op::Vk => {
                let inner = self.ret_type(node.args[0]);
                if inner == SsaType::BOOL {
                    inner
                } else {
                    inner.difference(SsaType::BOOL)
                }
            }
            op => op.signature().ret,
        }
    }

    /// The primary type of `id`.
    #[must_use]
    pub fn primary(&self, id: ValueId) -> SsaType {
        self.ret_type(id).primary()
    }

    /// The root `ret` node, once set.
    #[must_use]
    pub const fn root(&self) -> Option<ValueId> {
        self.root
    }

    /// The configuration this program was created with.
    #[must_use]
    pub fn config(&self) -> &CompileConfig {
        &self.config
    }

    /// The program's event log.
    #[must_use]
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    // =========================================================================
    // Construction
    // =========================================================================

    /// Creates (or reuses) a node.
    ///
    /// Returns an `invalid` node if the operands do not fit the operator's signature, or
    /// the first invalid operand if any operand is itself invalid.
    pub fn ssa(&mut self, op: impl Into<Op>, args: &[ValueId], imm: Option<Immediate>) -> ValueId {
        self.build(op.into(), args, imm, None)
    }

    /// Like [`Program::ssa`], attaching an explicit not-missing set to a boolean node.
    pub fn ssa_not_missing(
        &mut self,
        op: impl Into<Op>,
        args: &[ValueId],
        imm: Option<Immediate>,
        not_missing: ValueId,
    ) -> ValueId {
        self.build(op.into(), args, imm, Some(not_missing))
    }

    /// A literal node carrying `datum`.
    pub fn literal(&mut self, datum: Datum) -> ValueId {
        self.intern(Op::Literal, Some(Immediate::Datum(datum)))
    }

    /// An invalid placeholder carrying `message`.
    pub fn invalid(&mut self, message: impl Into<String>) -> ValueId {
        self.intern(Op::Invalid, Some(Immediate::Text(message.into())))
    }

    fn build(
        &mut self,
        op: Op,
        args: &[ValueId],
        imm: Option<Immediate>,
        not_missing: Option<ValueId>,
    ) -> ValueId {
        if let Some(bad) = args.iter().find(|a| self.op(**a) == Op::Invalid) {
            return *bad;
        }
        if let Some(problem) = self.operand_problem(op, args, imm.as_ref()) {
            return self.invalid(problem);
        }

        let key = Self::cacheable(imm.as_ref()).then(|| NodeKey {
            op,
            args: args.to_vec(),
            imm: imm.clone(),
            not_missing,
        });
        if let Some(&existing) = key.as_ref().and_then(|k| self.dedup.get(k)) {
            if self.config.record_events {
                self.record(
                    EventKind::NodeDeduplicated,
                    existing,
                    format!("{op} reuses {existing}"),
                );
            }
            return existing;
        }

        let id = self.push(Node {
            op,
            args: args.to_vec(),
            imm,
            not_missing,
        });

        let result = if self.config.rewrite_on_build {
            rewrite::simplify_site(self, id)
        } else {
            id
        };

        if let Some(key) = key {
            self.dedup.insert(key, result);
        }
        if result == id {
            self.index_node(id);
        }
        result
    }

    fn intern(&mut self, op: Op, imm: Option<Immediate>) -> ValueId {
        let key = NodeKey {
            op,
            args: Vec::new(),
            imm: imm.clone(),
            not_missing: None,
        };
        if let Some(existing) = self.dedup.get(&key) {
            return *existing;
        }
        let id = self.push(Node {
            op,
            args: Vec::new(),
            imm,
            not_missing: None,
        });
        self.dedup.insert(key, id);
        id
    }

    fn push(&mut self, node: Node) -> ValueId {
        let id = ValueId::new(self.nodes.len());
        self.nodes.push(node);
        id
    }

    fn cacheable(imm: Option<&Immediate>) -> bool {
        !matches!(imm, Some(Immediate::Table(_)))
    }

    /// Registers the current contents of `id` for deduplication.
    fn index_node(&mut self, id: ValueId) {
        let node = self.node(id);
        if !Self::cacheable(node.imm.as_ref()) {
            return;
        }
        let key = NodeKey {
            op: node.op,
            args: node.args.clone(),
            imm: node.imm.clone(),
            not_missing: node.not_missing,
        };
        self.dedup.entry(key).or_insert(id);
    }

    /// Describes why `op(args) [imm]` violates the operator's contract, if it does.
    fn operand_problem(&self, op: Op, args: &[ValueId], imm: Option<&Immediate>) -> Option<String> {
        let sig = op.signature();
        if !sig.accepts_arity(args.len()) {
            return Some(format!("{op} cannot take {} operands", args.len()));
        }
        for (i, arg) in args.iter().enumerate() {
            if arg.index() >= self.nodes.len() {
                return Some(format!("{op}: operand {i} ({arg}) is out of range"));
            }
            let slot = sig.operand(i, args.len()).unwrap_or(SsaType::empty());
            if !self.fits(*arg, slot) {
                return Some(format!(
                    "{op}: operand {i} is {}, expected {}",
                    self.ret_type(*arg),
                    slot
                ));
            }
        }
        if !Self::imm_matches(&sig, imm) {
            return Some(format!("{op}: unexpected immediate"));
        }
        None
    }

    fn fits(&self, arg: ValueId, slot: SsaType) -> bool {
        if slot == SsaType::ANY {
            return self.op(arg) != Op::Mem;
        }
        if let Some(datum) = self.literal_value(arg) {
            let boxable = slot.intersects(SsaType::VALUE);
            return !slot.intersects(SsaType::BOOL | SsaType::MEM | SsaType::HASH)
                && (boxable || datum.ssa_type().satisfies(slot));
        }
        self.ret_type(arg).satisfies(slot)
    }

    fn imm_matches(sig: &Signature, imm: Option<&Immediate>) -> bool {
        let kind = match imm {
            None => ImmKind::None,
            Some(Immediate::Int(_)) => ImmKind::Int,
            Some(Immediate::Float(_)) => ImmKind::Float,
            Some(Immediate::Datum(_)) => ImmKind::Datum,
            Some(Immediate::Types(_)) => ImmKind::Types,
            Some(Immediate::Field(_)) => ImmKind::Field,
            Some(Immediate::Text(_)) => ImmKind::Text,
            Some(Immediate::Like(_)) => ImmKind::Like,
            Some(Immediate::Regex(_)) => ImmKind::Regex,
            Some(Immediate::Ip4(..)) => ImmKind::Ip4,
            Some(Immediate::Table(_)) => ImmKind::Table,
        };
        kind == sig.imm
    }

    // =========================================================================
    // Masks
    // =========================================================================

    /// The validity mask of `id`.
    #[must_use]
    pub fn mask(&self, id: ValueId) -> ValueId {
        let node = self.node(id);
        match node.op {
            Op::Init | Op::False => return id,
            Op::Literal | Op::Mem | Op::Invalid => return Self::INIT,
            _ => {}
        }
        if self.ret_type(id).contains(SsaType::BOOL) {
            return id;
        }
        let sig = node.op.signature();
        let n = node.args.len();
        (0..n)
            .rev()
            .find(|i| sig.operand(*i, n) == Some(SsaType::BOOL))
            .map_or(Self::INIT, |i| node.args[i])
    }

    /// Pairs `id` with its validity mask.
    #[must_use]
    pub fn masked(&self, id: ValueId) -> MaskedValue {
        MaskedValue::new(id, self.mask(id))
    }

    /// The lanes where the boolean `id` is TRUE or FALSE (as opposed to MISSING).
    ///
    /// For non-boolean nodes this is the validity mask.
    pub fn not_missing(&mut self, id: ValueId) -> ValueId {
        if let Some(nm) = self.node(id).not_missing {
            return nm;
        }
        if let Some(nm) = self.nm_cache.get(&id) {
            return *nm;
        }
        let op = self.op(id);
        let nm = match op {
            Op::Init | Op::Literal => Self::INIT,
            Op::False => Self::FALSE,
            Op::Machine(logic) if op.is_mask_logic() => {
                let (a, b) = (self.args(id)[0], self.args(id)[1]);
                self.derive_not_missing(logic, a, b)
            }
            _ => self.mask_operand(id),
        };
        self.nm_cache.insert(id, nm);
        nm
    }

    /// For a boolean node, the mask operand; for anything else, its mask.
    fn mask_operand(&self, id: ValueId) -> ValueId {
        if self.ret_type(id) != SsaType::BOOL {
            return self.mask(id);
        }
        let node = self.node(id);
        let sig = node.op.signature();
        let n = node.args.len();
        (0..n)
            .rev()
            .find(|i| sig.operand(*i, n) == Some(SsaType::BOOL))
            .map_or(Self::INIT, |i| node.args[i])
    }

    /// The not-missing set that a replacement of `id` has to reproduce: the explicit
    /// override, or the mask operand of a predicate. Plain mask logic pins nothing.
    pub(crate) fn pinned_not_missing(&self, id: ValueId) -> Option<ValueId> {
        let node = self.node(id);
        if node.not_missing.is_some() {
            return node.not_missing;
        }
        match node.op {
            Op::Machine(_) if !node.op.is_mask_logic() && self.ret_type(id) == SsaType::BOOL => {
                Some(self.mask_operand(id))
            }
            _ => None,
        }
    }

    /// Returns a node computing the same truth lanes as `id` with not-missing set `nm`.
    pub fn with_not_missing(&mut self, id: ValueId, nm: ValueId) -> ValueId {
        if self.not_missing(id) == nm {
            return id;
        }
        let node = self.node(id).clone();
        self.build(node.op, &node.args, node.imm, Some(nm))
    }

    // =========================================================================
    // In-place mutation
    // =========================================================================

    /// Replaces the contents of `id`, keeping its index and its not-missing set.
    pub fn clobber(&mut self, id: ValueId, op: Op, args: Vec<ValueId>, imm: Option<Immediate>) {
        let node = &mut self.nodes[id.index()];
        node.op = op;
        node.args = args;
        node.imm = imm;
        self.nm_cache.clear();
        self.index_node(id);
    }

    /// Replaces the operands of `id`.
    pub fn set_args(&mut self, id: ValueId, args: Vec<ValueId>) {
        if self.nodes[id.index()].args == args {
            return;
        }
        self.nodes[id.index()].args = args;
        self.nm_cache.clear();
        self.index_node(id);
    }

    /// Replaces the root.
    pub fn set_root(&mut self, root: ValueId) {
        self.root = Some(root);
    }

    // =========================================================================
    // Returns
    // =========================================================================

    /// Terminates the program with the lanes of `mask`.
    pub fn return_mask(&mut self, mask: ValueId) -> ValueId {
        let ret = self.ssa(Opcode::RetK, &[Self::MEM, mask], None);
        self.root = Some(ret);
        ret
    }

    /// Terminates the program with the boxed `value` valid on `mask`.
    pub fn return_value(&mut self, value: ValueId, mask: ValueId) -> ValueId {
        let ret = self.ssa(Opcode::RetV, &[Self::MEM, value, mask], None);
        self.root = Some(ret);
        ret
    }

    // =========================================================================
    // Traversal and validation
    // =========================================================================

    /// Nodes reachable from the root in post-order (operands before users).
    ///
    /// Without a root every node is returned in index order.
    #[must_use]
    pub fn reachable(&self) -> Vec<ValueId> {
        let Some(root) = self.root else {
            return (0..self.nodes.len()).map(ValueId::new).collect();
        };
        let mut visited = vec![false; self.nodes.len()];
        let mut order = Vec::new();
        let mut stack = vec![(root, 0usize)];
        visited[root.index()] = true;
        while let Some((id, next)) = stack.pop() {
            let args = self.args(id);
            if next < args.len() {
                stack.push((id, next + 1));
                let arg = args[next];
                if !visited[arg.index()] {
                    visited[arg.index()] = true;
                    stack.push((arg, 0));
                }
            } else {
                order.push(id);
            }
        }
        order
    }

    /// Number of reachable nodes whose operator is `op`.
    #[must_use]
    pub fn count_op(&self, op: impl Into<Op>) -> usize {
        let op = op.into();
        self.reachable()
            .into_iter()
            .filter(|id| self.op(*id) == op)
            .count()
    }

    /// Checks the structural invariants of the program.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if there is no `ret` root, if the reachable
    /// graph has a cycle, if a reachable node violates its operator's signature, or if
    /// an invalid node is reachable.
    pub fn validate(&self) -> Result<()> {
        let root = self
            .root
            .ok_or_else(|| malformed_error!("program has no return"))?;
        if !matches!(
            self.op(root),
            Op::Machine(Opcode::RetK) | Op::Machine(Opcode::RetV)
        ) {
            return Err(malformed_error!("root {} is not a return", root));
        }

        // 0 = unseen, 1 = on the current path, 2 = done
        let mut state = vec![0u8; self.nodes.len()];
        let mut stack = vec![(root, 0usize)];
        state[root.index()] = 1;
        while let Some((id, next)) = stack.pop() {
            let args = self.args(id);
            if next == 0 {
                if let Some(msg) = self.invalid_message(id) {
                    return Err(malformed_error!("reachable invalid node {}: {}", id, msg));
                }
                if let Some(problem) = self.operand_problem(self.op(id), args, self.imm(id)) {
                    return Err(malformed_error!("{}: {}", id, problem));
                }
            }
            if next < args.len() {
                stack.push((id, next + 1));
                let arg = args[next];
                match state[arg.index()] {
                    0 => {
                        state[arg.index()] = 1;
                        stack.push((arg, 0));
                    }
                    1 => return Err(malformed_error!("cycle through {} and {}", id, arg)),
                    _ => {}
                }
            } else {
                state[id.index()] = 2;
            }
        }
        Ok(())
    }

    /// Renders one node as `vN = op args [imm]`.
    #[must_use]
    pub fn display_node(&self, id: ValueId) -> String {
        let node = self.node(id);
        let mut out = format!("{id} = {}", node.op);
        for (i, arg) in node.args.iter().enumerate() {
            out.push_str(if i == 0 { " " } else { ", " });
            out.push_str(&arg.to_string());
        }
        if let Some(imm) = &node.imm {
            out.push_str(&format!(" [{imm}]"));
        }
        if let Some(nm) = node.not_missing {
            out.push_str(&format!(" !{nm}"));
        }
        out
    }

    pub(crate) fn record(&self, kind: EventKind, location: ValueId, message: String) {
        self.events
            .record(kind)
            .location(location.index())
            .message(message);
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids = self.reachable();
        ids.sort();
        for id in ids {
            writeln!(f, "{}", self.display_node(id))?;
        }
        Ok(())
    }
}
