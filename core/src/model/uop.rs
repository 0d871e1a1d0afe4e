//! The micro-op (uop): one unit the execution core schedules.
//!
//! Mirrors §3's uop invariants:
//! 1. `action_id` is bumped on every squash so stale callbacks are
//!    filtered (see [`crate::common::action_id`]).
//! 2. `idep` handles point only to uops still in the machine — cleared on
//!    commit of the producer.
//! 3. A fused group has exactly one head (`fusion_head == None` on the
//!    head itself); every member's `fusion_head` points to it.
//! 4. A store is a paired STA/STD; the STD's `idep` on the address input
//!    names the STA via a named temporary register (see [`ArchReg`]).

use crate::common::action_id::{ActionId, Handle};

/// A handle to a live uop in the oracle's uop arena.
pub type UopHandle = Handle;

/// Opaque architectural register name.
///
/// The instruction decoder owns the concrete register numbering; the core
/// only needs identity/equality over these names plus one reserved value
/// for "no register" and one reserved range for STA→STD named temporaries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ArchReg(pub u16);

impl ArchReg {
    /// Sentinel meaning "this input/output slot is unused".
    pub const NONE: Self = Self(u16::MAX);

    /// True if this slot names a real register.
    #[must_use]
    pub fn is_present(self) -> bool {
        self != Self::NONE
    }
}

/// Functional-unit class, used for port binding and per-class
/// latency/issue-rate lookups (§6 external config surface).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FuClass {
    /// Simple integer ALU op.
    IntAlu,
    /// Integer multiply.
    IntMul,
    /// Integer divide.
    IntDiv,
    /// Address generation (AGEN) for a load or store.
    Agen,
    /// Load data-cache access.
    Load,
    /// Store data-cache access.
    Store,
    /// Branch/jump resolution.
    Branch,
    /// Floating-point add/sub/compare.
    FpAdd,
    /// Floating-point multiply.
    FpMul,
    /// Floating-point divide/sqrt.
    FpDiv,
}

/// Which fusion family (if any) a uop belongs to, per §4.3.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FusionKind {
    /// Not part of a fused group.
    None,
    /// load-op (e.g. ADD reg, [mem]).
    LoadOp,
    /// load-op-store (read-modify-write memory operand).
    LoadOpStore,
    /// STA/STD pair for a single store instruction.
    StaStd,
    /// fp-load-op.
    FpLoadOp,
    /// Partial-register merge (writing AL after writing EAX, etc).
    PartialRegMerge,
}

/// A node in the singly linked output-consumer list (`odep_list`).
///
/// Allocated from [`OdepArena`] with freelist reuse, per design note §9.
#[derive(Clone, Copy, Debug)]
pub struct OdepNode {
    /// The consumer uop.
    pub consumer: UopHandle,
    /// Which of the consumer's three input slots this producer feeds.
    pub input_slot: u8,
    /// Next node in this producer's consumer list.
    pub next: Option<u32>,
}

/// Freelist-backed arena of [`OdepNode`]s, shared by all uops in a core.
///
/// Every uop stores only the head index of its own consumer list; nodes
/// are returned to the freelist when a producer commits or is squashed.
#[derive(Default)]
pub struct OdepArena {
    nodes: Vec<Option<OdepNode>>,
    free: Vec<u32>,
}

impl OdepArena {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepends a new consumer edge, returning the new head index.
    pub fn push_front(&mut self, head: Option<u32>, consumer: UopHandle, input_slot: u8) -> u32 {
        let node = OdepNode {
            consumer,
            input_slot,
            next: head,
        };
        if let Some(idx) = self.free.pop() {
            self.nodes[idx as usize] = Some(node);
            idx
        } else {
            self.nodes.push(Some(node));
            (self.nodes.len() - 1) as u32
        }
    }

    /// Iterates the consumer list starting at `head`, in insertion order
    /// (most-recently-linked first).
    pub fn iter(&self, head: Option<u32>) -> OdepIter<'_> {
        OdepIter {
            arena: self,
            cur: head,
        }
    }

    /// Frees every node in the list rooted at `head` (called on commit or
    /// squash of the owning producer).
    pub fn free_list(&mut self, head: Option<u32>) {
        let mut cur = head;
        while let Some(idx) = cur {
            let next = self.nodes[idx as usize].and_then(|n| n.next);
            self.nodes[idx as usize] = None;
            self.free.push(idx);
            cur = next;
        }
    }
}

/// Iterator over an [`OdepArena`] consumer list.
pub struct OdepIter<'a> {
    arena: &'a OdepArena,
    cur: Option<u32>,
}

impl Iterator for OdepIter<'_> {
    type Item = OdepNode;

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.cur?;
        let node = self.arena.nodes[idx as usize]?;
        self.cur = node.next;
        Some(node)
    }
}

/// Cycle timestamps tracked per uop (§3).
#[derive(Clone, Copy, Debug, Default)]
pub struct UopTimestamps {
    /// Cycle the uop was allocated into the ROB/LDQ/STQ/RS.
    pub allocated: Option<u64>,
    /// Cycle each input's *tag* (producer identity) became known.
    pub idep_tag_ready: [Option<u64>; 3],
    /// Cycle this uop's own output tag became known to consumers.
    pub odep_tag_ready: Option<u64>,
    /// Cycle each input *value* became available.
    pub idep_value_ready: [Option<u64>; 3],
    /// Cycle all inputs were ready (derived, cached for convenience).
    pub ready: Option<u64>,
    /// Cycle the uop issued to a functional unit.
    pub issued: Option<u64>,
    /// Cycle execution began.
    pub exec: Option<u64>,
    /// Cycle execution completed (result available to consumers).
    pub completed: Option<u64>,
}

/// Up to 12 speculative-memory byte records produced by one uop, per §3.
pub const MAX_SPEC_BYTES_PER_UOP: usize = 12;

/// One micro-op.
pub struct Uop {
    /// Decoded opcode (opaque to the core; compared only by the uop
    /// cracker / functional-unit dispatch table).
    pub opcode: u32,
    /// Up to three input register names ([`ArchReg::NONE`] if unused).
    pub ireg: [ArchReg; 3],
    /// Up to two output register names.
    pub oreg: [ArchReg; 2],

    /// True if this uop reads memory.
    pub is_load: bool,
    /// True if this uop computes a store address (paired with `is_std`).
    pub is_sta: bool,
    /// True if this uop supplies a store's data (paired with `is_sta`).
    pub is_std: bool,
    /// True if this uop is a control-flow (branch/jump) uop.
    pub is_ctrl: bool,
    /// True if this uop is an architectural no-op.
    pub is_nop: bool,
    /// True if this uop is a memory fence.
    pub is_fence: bool,
    /// True if this uop only computes an address (no memory access).
    pub is_agen: bool,
    /// True if this uop is a floating-point operation.
    pub is_fpop: bool,

    /// Functional-unit class, for port binding and latency lookup.
    pub fu_class: FuClass,
    /// Fusion membership.
    pub fusion: FusionKind,
    /// If part of a fused group and not the head, the head's handle.
    pub fusion_head: Option<UopHandle>,

    /// Reorder-buffer slot index, once allocated.
    pub rob_index: Option<u32>,
    /// Load-queue slot index, for loads.
    pub ldq_index: Option<u32>,
    /// Store-queue slot index, for STA/STD uops.
    pub stq_index: Option<u32>,
    /// Reservation-station slot index.
    pub rs_index: Option<u32>,
    /// Execution port assigned by the port-binding policy.
    pub exec_port: Option<u32>,

    /// Producer uops for each input slot, or `None` if the value is
    /// already architecturally committed.
    pub idep: [Option<UopHandle>; 3],
    /// Head of this uop's output-consumer list, in the shared
    /// [`OdepArena`].
    pub odep_head: Option<u32>,
    /// Whether each input value has arrived (vs. only the tag).
    pub ivalue_valid: [bool; 3],

    /// Generation tag, bumped on every squash.
    pub action_id: ActionId,

    /// Virtual address for loads/stores/agens.
    pub vaddr: Option<u64>,
    /// Physical address, once translated.
    pub paddr: Option<u64>,
    /// Access size in bytes, for memory uops.
    pub access_size: u8,
    /// For a store-data (STD) uop, the value to write, read from the
    /// oracle's register snapshot at build time (execution-driven: the
    /// value is already known, never computed by this uop).
    pub store_value: Option<u64>,
    /// Speculative-memory byte records this uop produced (stores only).
    pub spec_bytes: heapless_vec::SpecByteList,

    /// Cycle timestamps.
    pub ts: UopTimestamps,
}

/// A tiny fixed-capacity vector, avoiding a heap allocation for the
/// common case of zero or a handful of speculative store bytes per uop.
pub mod heapless_vec {
    use super::MAX_SPEC_BYTES_PER_UOP;

    /// Index of a speculative-memory byte record (see
    /// [`crate::model::spec_mem`]), stored inline up to the per-uop cap.
    #[derive(Clone, Copy, Debug)]
    pub struct SpecByteRef(pub u32);

    /// Fixed-capacity list of speculative-memory byte references.
    #[derive(Clone, Debug, Default)]
    pub struct SpecByteList {
        items: [Option<SpecByteRef>; MAX_SPEC_BYTES_PER_UOP],
        len: usize,
    }

    impl SpecByteList {
        /// Appends a reference. Returns `false` if the per-uop cap
        /// (`MAX_SPEC_BYTES_PER_UOP`) is already full.
        pub fn push(&mut self, r: SpecByteRef) -> bool {
            if self.len >= MAX_SPEC_BYTES_PER_UOP {
                return false;
            }
            self.items[self.len] = Some(r);
            self.len += 1;
            true
        }

        /// Iterates the stored references.
        pub fn iter(&self) -> impl Iterator<Item = SpecByteRef> + '_ {
            self.items[..self.len].iter().filter_map(|x| *x)
        }

        /// Number of references stored.
        #[must_use]
        pub fn len(&self) -> usize {
            self.len
        }

        /// True if no references are stored.
        #[must_use]
        pub fn is_empty(&self) -> bool {
            self.len == 0
        }
    }
}

impl Uop {
    /// Creates a fresh, all-default uop with the given action id.
    #[must_use]
    pub fn new(action_id: ActionId) -> Self {
        Self {
            opcode: 0,
            ireg: [ArchReg::NONE; 3],
            oreg: [ArchReg::NONE; 2],
            is_load: false,
            is_sta: false,
            is_std: false,
            is_ctrl: false,
            is_nop: false,
            is_fence: false,
            is_agen: false,
            is_fpop: false,
            fu_class: FuClass::IntAlu,
            fusion: FusionKind::None,
            fusion_head: None,
            rob_index: None,
            ldq_index: None,
            stq_index: None,
            rs_index: None,
            exec_port: None,
            idep: [None; 3],
            odep_head: None,
            ivalue_valid: [false; 3],
            action_id,
            vaddr: None,
            paddr: None,
            access_size: 0,
            store_value: None,
            spec_bytes: heapless_vec::SpecByteList::default(),
            ts: UopTimestamps::default(),
        }
    }

    /// True once every input slot that names a producer has its value.
    #[must_use]
    pub fn inputs_ready(&self) -> bool {
        (0..3).all(|i| self.idep[i].is_none() || self.ivalue_valid[i])
    }

    /// Bumps the action id (on squash), invalidating any stale in-flight
    /// callback that stamped the old id.
    pub fn squash(&mut self) {
        self.action_id = self.action_id.next();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn odep_arena_freelist_reuse() {
        let mut arena = OdepArena::new();
        let consumer = UopHandle {
            slot: 1,
            action_id: ActionId::FIRST,
        };
        let head = arena.push_front(None, consumer, 0);
        assert_eq!(arena.iter(Some(head)).count(), 1);
        arena.free_list(Some(head));
        // Reuse: the freed slot should be handed back out.
        let head2 = arena.push_front(None, consumer, 1);
        assert_eq!(head, head2);
    }

    #[test]
    fn odep_iter_order_is_most_recent_first() {
        let mut arena = OdepArena::new();
        let c = |slot| UopHandle {
            slot,
            action_id: ActionId::FIRST,
        };
        let mut head = arena.push_front(None, c(1), 0);
        head = arena.push_front(Some(head), c(2), 0);
        let seen: Vec<u32> = arena.iter(Some(head)).map(|n| n.consumer.slot).collect();
        assert_eq!(seen, vec![2, 1]);
    }

    #[test]
    fn inputs_ready_true_with_no_producers() {
        let u = Uop::new(ActionId::FIRST);
        assert!(u.inputs_ready());
    }

    #[test]
    fn inputs_ready_false_until_value_arrives() {
        let mut u = Uop::new(ActionId::FIRST);
        u.idep[0] = Some(UopHandle {
            slot: 0,
            action_id: ActionId::FIRST,
        });
        assert!(!u.inputs_ready());
        u.ivalue_valid[0] = true;
        assert!(u.inputs_ready());
    }

    #[test]
    fn spec_byte_list_caps_at_twelve() {
        let mut list = heapless_vec::SpecByteList::default();
        for i in 0..MAX_SPEC_BYTES_PER_UOP {
            assert!(list.push(heapless_vec::SpecByteRef(i as u32)));
        }
        assert!(!list.push(heapless_vec::SpecByteRef(999)));
        assert_eq!(list.len(), MAX_SPEC_BYTES_PER_UOP);
    }
}
