//! Core replicated sequence engine.
//!
//! This module contains the Sequence struct: an ordered container of atoms
//! anchored by a sentinel head, with an identifier index for O(1) lookup,
//! an orphan buffer for atoms that arrive before their origin, a
//! pending-delete set for deletes that arrive before their target, and
//! tombstone-based deletion with two garbage-collection strategies.
//!
//! # Design
//!
//! - Atoms live in an arena of doubly linked slots, giving stable positions
//!   that survive insertions anywhere in the sequence. The identifier index
//!   maps `OpId` to a slot, so remote placement starts at the origin in O(1).
//! - Local inserts and remote merges share one placement algorithm, so the
//!   order every peer computes is identical for the same set of operations.
//! - Deletion is logical (tombstones); physical removal happens only through
//!   garbage collection once a frontier proves every peer has seen both the
//!   atom and its deletion.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{self, Read, Write};
use std::mem;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::codec::document;
use crate::codec::{AtomCodec, FixedCodec};
use crate::crdt::atom::{Atom, OpId};
use crate::crdt::stats::{GcStats, MemoryStats};
use crate::crdt::types::{LamportClock, PeerId, VectorClock};

/// Sentinel slot-link value meaning "no neighbor".
const NIL: usize = usize::MAX;

/// Configuration for automatic tombstone collection.
///
/// When enabled, crossing `tombstone_threshold` on an insert or delete runs
/// age-based local collection with `min_age_threshold`. Age-based collection
/// ignores what other peers have seen, so it is only sound for single-peer
/// or offline use; distributed deployments should rely on the coordinated
/// frontier instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcConfig {
    /// Run local collection automatically when the threshold is crossed.
    pub auto_gc_enabled: bool,
    /// Tombstone count that triggers an automatic run.
    pub tombstone_threshold: usize,
    /// Minimum tombstone age, in Lamport ticks, for automatic removal.
    pub min_age_threshold: u64,
}

impl Default for GcConfig {
    fn default() -> Self {
        GcConfig {
            auto_gc_enabled: false,
            tombstone_threshold: 1000,
            min_age_threshold: 100,
        }
    }
}

/// Configuration for the orphan buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrphanConfig {
    /// Upper bound on buffered atoms before oldest-clock eviction.
    pub max_orphan_buffer_size: usize,
    /// Advisory age bound in Lamport ticks; eviction itself is size-triggered.
    pub max_orphan_age: u64,
}

impl Default for OrphanConfig {
    fn default() -> Self {
        OrphanConfig {
            max_orphan_buffer_size: 10_000,
            max_orphan_age: 1000,
        }
    }
}

/// One arena cell: an atom plus its neighbors in sequence order.
#[derive(Debug, Clone, Copy)]
struct Slot {
    atom: Atom,
    prev: usize,
    next: usize,
}

/// The replicated character sequence.
///
/// Multiple peers edit the same logical string concurrently and exchange
/// atoms over an unreliable, reordering transport; peers that have received
/// the same set of operations observe byte-identical visible text.
///
/// All mutating operations assume exclusive access; only the embedded
/// Lamport clock is safe to read from other threads.
pub struct Sequence {
    peer_id: PeerId,
    clock: LamportClock,
    vector: VectorClock,

    /// Arena of linked slots; slot 0 is always the sentinel head.
    slots: Vec<Slot>,
    head: usize,
    tail: usize,
    free: Vec<usize>,

    /// Identifier index over every atom currently in the sequence.
    index: HashMap<OpId, usize>,
    /// Atoms whose origin has not arrived yet, keyed by the missing origin.
    orphans: HashMap<OpId, Vec<Atom>>,
    orphan_total: usize,
    /// Deletes received before their target atom.
    pending_deletes: HashSet<OpId>,

    tombstones: usize,
    gc_config: GcConfig,
    orphan_config: OrphanConfig,
    gc_stats: GcStats,
}

impl Sequence {
    /// Creates an empty sequence owned by `peer_id`, anchored by the sentinel.
    pub fn new(peer_id: PeerId) -> Self {
        let sentinel = Slot {
            atom: Atom::sentinel(),
            prev: NIL,
            next: NIL,
        };
        let mut index = HashMap::new();
        index.insert(OpId::SENTINEL, 0);

        Sequence {
            peer_id,
            clock: LamportClock::new(),
            vector: VectorClock::new(peer_id),
            slots: vec![sentinel],
            head: 0,
            tail: 0,
            free: Vec::new(),
            index,
            orphans: HashMap::new(),
            orphan_total: 0,
            pending_deletes: HashSet::new(),
            tombstones: 0,
            gc_config: GcConfig::default(),
            orphan_config: OrphanConfig::default(),
            gc_stats: GcStats::default(),
        }
    }

    /// The peer that owns this sequence.
    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// Current Lamport clock value.
    pub fn current_clock(&self) -> u64 {
        self.clock.peek()
    }

    /// Inserts `content` at visible index `index`.
    ///
    /// The index counts non-tombstoned atoms strictly to the left of the
    /// insertion point; an index past the end clamps to the last visible
    /// position. The call never fails.
    ///
    /// # Returns
    ///
    /// The freshly created atom, ready for transmission to other peers.
    pub fn local_insert(&mut self, index: usize, content: u8) -> Atom {
        let clock = self.clock.tick();
        self.vector.update(self.peer_id, clock);

        let id = OpId::new(self.peer_id, clock);
        let origin = self.visible_predecessor(index);
        let atom = Atom::new(id, origin, content);

        // Local placement goes through the same path as a remote atom, so a
        // single algorithm governs the order on every peer.
        self.integrate(atom);
        atom
    }

    /// Deletes the atom at visible index `index`, marking it as a tombstone.
    ///
    /// # Returns
    ///
    /// The identifier of the deleted atom, for transmission to other peers,
    /// or the sentinel identifier when the index is out of range.
    pub fn local_delete(&mut self, index: usize) -> OpId {
        let mut pos = self.slots[self.head].next;
        let mut seen = 0usize;

        while pos != NIL {
            if self.slots[pos].atom.is_visible() {
                if seen == index {
                    let clock = self.clock.tick();
                    self.vector.update(self.peer_id, clock);

                    self.slots[pos].atom.deleted = true;
                    self.tombstones += 1;
                    let id = self.slots[pos].atom.id;

                    self.maybe_auto_gc();
                    return id;
                }
                seen += 1;
            }
            pos = self.slots[pos].next;
        }

        OpId::SENTINEL
    }

    /// Merges an atom received from another peer.
    ///
    /// Duplicate deliveries are ignored, making the merge idempotent. An atom
    /// whose origin has not arrived yet is buffered as an orphan and placed
    /// once the origin shows up.
    pub fn remote_merge(&mut self, atom: Atom) {
        self.clock.merge(atom.id.clock);
        self.vector.update(atom.id.peer, atom.id.clock);
        self.integrate(atom);
    }

    /// Applies a delete received from another peer.
    ///
    /// A delete whose target has not arrived yet is remembered and applied
    /// when the target merges.
    pub fn remote_delete(&mut self, target: OpId) {
        if target.is_sentinel() {
            return;
        }

        if let Some(&pos) = self.index.get(&target) {
            let atom = &mut self.slots[pos].atom;
            if !atom.deleted {
                atom.deleted = true;
                self.tombstones += 1;
            }
        } else {
            self.pending_deletes.insert(target);
        }

        self.maybe_auto_gc();
    }

    /// Collects every atom the remote peer, summarized by its vector clock,
    /// has not seen yet.
    ///
    /// The returned atoms are copies in sequence order; the receiver applies
    /// them with [`apply_delta`](Self::apply_delta).
    pub fn get_delta(&self, remote: &VectorClock) -> Vec<Atom> {
        let mut delta = Vec::new();
        let mut pos = self.slots[self.head].next;

        while pos != NIL {
            let atom = &self.slots[pos].atom;
            if atom.id.clock > remote.get(atom.id.peer) {
                delta.push(*atom);
            }
            pos = self.slots[pos].next;
        }

        delta
    }

    /// Applies a delta produced by [`get_delta`](Self::get_delta) on another peer.
    pub fn apply_delta(&mut self, delta: &[Atom]) {
        for atom in delta {
            if atom.deleted {
                self.remote_delete(atom.id);
            } else {
                self.remote_merge(*atom);
            }
        }
    }

    /// Physically removes tombstones at or below the stable frontier.
    ///
    /// An atom is removed when it is deleted and its clock does not exceed
    /// the frontier's entry for its peer, which proves every peer that
    /// contributed to the frontier has observed both the atom and its
    /// deletion. A peer with no frontier entry blocks removal of all its
    /// atoms.
    ///
    /// # Returns
    ///
    /// The number of atoms removed.
    pub fn garbage_collect(&mut self, frontier: &VectorClock) -> usize {
        self.sweep_tombstones(|atom| atom.id.clock <= frontier.get(atom.id.peer))
    }

    /// Physically removes tombstones older than `min_age` Lamport ticks.
    ///
    /// Uses only the local clock, ignoring what other peers have seen: sound
    /// for a single peer or offline editing, unsound in a distributed setting
    /// where a lagging peer may still reference a pruned atom.
    pub fn garbage_collect_local(&mut self, min_age: u64) -> usize {
        let safe = self.clock.peek().saturating_sub(min_age);
        self.sweep_tombstones(|atom| atom.id.clock <= safe)
    }

    /// Returns the visible text: every non-deleted payload in sequence order.
    pub fn to_string(&self) -> String {
        let mut bytes = Vec::new();
        let mut pos = self.slots[self.head].next;

        while pos != NIL {
            let atom = &self.slots[pos].atom;
            if atom.is_visible() {
                bytes.push(atom.content);
            }
            pos = self.slots[pos].next;
        }

        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Number of visible (non-tombstoned) atoms.
    pub fn visible_len(&self) -> usize {
        let mut count = 0;
        let mut pos = self.slots[self.head].next;
        while pos != NIL {
            if self.slots[pos].atom.is_visible() {
                count += 1;
            }
            pos = self.slots[pos].next;
        }
        count
    }

    /// Snapshot of every non-sentinel atom in sequence order, tombstones included.
    pub fn atoms(&self) -> Vec<Atom> {
        let mut atoms = Vec::with_capacity(self.index.len().saturating_sub(1));
        let mut pos = self.slots[self.head].next;
        while pos != NIL {
            atoms.push(self.slots[pos].atom);
            pos = self.slots[pos].next;
        }
        atoms
    }

    /// Number of tombstoned atoms currently retained.
    pub fn tombstone_count(&self) -> usize {
        self.tombstones
    }

    /// Number of atoms waiting for their origin to arrive.
    pub fn orphan_count(&self) -> usize {
        self.orphan_total
    }

    /// Number of deletes waiting for their target to arrive.
    pub fn pending_delete_count(&self) -> usize {
        self.pending_deletes.len()
    }

    /// Copy of this peer's causal summary.
    pub fn vector_clock(&self) -> VectorClock {
        self.vector.clone()
    }

    /// Folds another peer's causal summary into this one (pointwise max).
    pub fn merge_vector_clock(&mut self, other: &VectorClock) {
        self.vector.merge(other);
    }

    /// Current garbage-collection configuration.
    pub fn gc_config(&self) -> &GcConfig {
        &self.gc_config
    }

    /// Replaces the garbage-collection configuration.
    pub fn set_gc_config(&mut self, config: GcConfig) {
        self.gc_config = config;
    }

    /// Current orphan-buffer configuration.
    pub fn orphan_config(&self) -> &OrphanConfig {
        &self.orphan_config
    }

    /// Replaces the orphan-buffer configuration.
    pub fn set_orphan_config(&mut self, config: OrphanConfig) {
        self.orphan_config = config;
    }

    /// Point-in-time memory usage snapshot.
    pub fn memory_stats(&self) -> MemoryStats {
        let now = self.clock.peek();
        let mut atom_count = 0usize;
        let mut atom_age_sum = 0u64;
        let mut tombstone_age_sum = 0u64;

        let mut pos = self.slots[self.head].next;
        while pos != NIL {
            let atom = &self.slots[pos].atom;
            let age = now.saturating_sub(atom.id.clock);
            atom_count += 1;
            atom_age_sum += age;
            if atom.deleted {
                tombstone_age_sum += age;
            }
            pos = self.slots[pos].next;
        }

        MemoryStats {
            atom_count,
            tombstone_count: self.tombstones,
            orphan_count: self.orphan_total,
            pending_delete_count: self.pending_deletes.len(),
            atom_list_bytes: self.slots.capacity() * mem::size_of::<Slot>(),
            index_bytes: self.index.len() * (mem::size_of::<OpId>() + mem::size_of::<usize>()),
            orphan_buffer_bytes: self.orphan_total * mem::size_of::<Atom>(),
            vector_clock_bytes: self.vector.len() * (mem::size_of::<PeerId>() + mem::size_of::<u64>()),
            avg_atom_age: if atom_count > 0 {
                atom_age_sum as f64 / atom_count as f64
            } else {
                0.0
            },
            avg_tombstone_age: if self.tombstones > 0 {
                tombstone_age_sum as f64 / self.tombstones as f64
            } else {
                0.0
            },
            gc: self.gc_stats.clone(),
        }
    }

    /// Writes a persistent snapshot of the document.
    ///
    /// Layout: magic, version, owner peer id, Lamport clock, vector clock
    /// table, atom count, then every non-sentinel atom in sequence order in
    /// fixed-codec form. Orphan and pending-delete buffers are not persisted.
    pub fn save<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(document::MAGIC)?;
        writer.write_all(&[document::FORMAT_VERSION])?;
        document::write_u64(writer, self.peer_id)?;
        document::write_u64(writer, self.clock.peek())?;

        let entries: Vec<(PeerId, u64)> = self.vector.entries().collect();
        writer.write_all(&(entries.len() as u32).to_le_bytes())?;
        for (peer, clock) in entries {
            document::write_u64(writer, peer)?;
            document::write_u64(writer, clock)?;
        }

        let count = self.index.len() - 1;
        document::write_u64(writer, count as u64)?;

        let mut buf = Vec::with_capacity(FixedCodec::ATOM_SIZE);
        let mut pos = self.slots[self.head].next;
        while pos != NIL {
            buf.clear();
            FixedCodec::pack(&self.slots[pos].atom, &mut buf);
            writer.write_all(&buf)?;
            pos = self.slots[pos].next;
        }

        Ok(())
    }

    /// Restores a document written by [`save`](Self::save).
    ///
    /// All existing state is cleared first. Atoms are rebuilt in file order,
    /// which the writer guarantees is a valid sequence order; the file's
    /// Lamport value is merged into the local clock, and the vector clock is
    /// loaded when the format version carries one.
    ///
    /// # Returns
    ///
    /// `false` on bad magic, unsupported version, or truncation; the sequence
    /// is left cleared in that case.
    pub fn load<R: Read>(&mut self, reader: &mut R) -> bool {
        let mut magic = [0u8; 4];
        if reader.read_exact(&mut magic).is_err() || &magic != document::MAGIC {
            self.clear_state();
            return false;
        }

        let mut version = [0u8; 1];
        if reader.read_exact(&mut version).is_err()
            || (version[0] != 1 && version[0] != document::FORMAT_VERSION)
        {
            self.clear_state();
            return false;
        }

        self.clear_state();

        let Ok(owner) = document::read_u64(reader) else {
            return false;
        };
        let Ok(file_clock) = document::read_u64(reader) else {
            return false;
        };
        debug!(owner, file_clock, version = version[0], "loading document snapshot");

        if version[0] >= 2 {
            let mut count_buf = [0u8; 4];
            if reader.read_exact(&mut count_buf).is_err() {
                return false;
            }
            for _ in 0..u32::from_le_bytes(count_buf) {
                let (Ok(peer), Ok(clock)) =
                    (document::read_u64(reader), document::read_u64(reader))
                else {
                    self.clear_state();
                    return false;
                };
                self.vector.update(peer, clock);
            }
        }

        let Ok(atom_count) = document::read_u64(reader) else {
            self.clear_state();
            return false;
        };

        let mut buf = [0u8; FixedCodec::ATOM_SIZE];
        for _ in 0..atom_count {
            if reader.read_exact(&mut buf).is_err() {
                self.clear_state();
                return false;
            }
            let mut offset = 0;
            let Some(atom) = FixedCodec::unpack(&buf, &mut offset) else {
                self.clear_state();
                return false;
            };
            if atom.is_sentinel() {
                continue;
            }
            self.append_tail(atom);
        }

        self.clock.merge(file_clock);
        true
    }

    /// Finds the origin for an insert at visible index `index`: the atom at
    /// visible position `index - 1`, the sentinel for a head insert, or the
    /// last visible atom when the index runs past the end.
    fn visible_predecessor(&self, index: usize) -> OpId {
        if index == 0 {
            return OpId::SENTINEL;
        }

        let mut pos = self.slots[self.head].next;
        let mut seen = 0usize;
        let mut last_visible = NIL;

        while pos != NIL {
            let slot = &self.slots[pos];
            if slot.atom.is_visible() {
                seen += 1;
                last_visible = pos;
                if seen == index {
                    return slot.atom.id;
                }
            }
            pos = slot.next;
        }

        if last_visible != NIL {
            self.slots[last_visible].atom.id
        } else {
            OpId::SENTINEL
        }
    }

    /// Places an atom and drains any orphans that were waiting on it.
    ///
    /// The drain is an iterative walk over a work queue rather than
    /// recursion, so a long chain of buffered descendants cannot overflow
    /// the stack.
    fn integrate(&mut self, first: Atom) {
        let mut queue = VecDeque::new();
        queue.push_back(first);

        while let Some(atom) = queue.pop_front() {
            if self.index.contains_key(&atom.id) {
                // Duplicate delivery
                continue;
            }

            let Some(&origin_pos) = self.index.get(&atom.origin) else {
                self.buffer_orphan(atom);
                continue;
            };

            let id = atom.id;
            self.place(origin_pos, atom);

            if let Some(children) = self.orphans.remove(&id) {
                self.orphan_total -= children.len();
                queue.extend(children);
            }
        }

        self.maybe_auto_gc();
    }

    /// The placement algorithm: scans rightward from the origin and inserts
    /// before the first atom that is either outside the origin's descendant
    /// region (its origin clock is older) or a concurrent sibling with a
    /// smaller identifier. Siblings of one origin therefore sit in descending
    /// identifier order, which keeps a fresh local insert adjacent to its
    /// predecessor while concurrent runs of atoms stay contiguous.
    fn place(&mut self, origin_pos: usize, mut atom: Atom) {
        let mut cursor = self.slots[origin_pos].next;

        while cursor != NIL {
            let c = &self.slots[cursor].atom;
            if c.origin.clock < atom.origin.clock {
                break;
            }
            if c.origin == atom.origin && atom.id > c.id {
                break;
            }
            cursor = self.slots[cursor].next;
        }

        if self.pending_deletes.remove(&atom.id) {
            atom.deleted = true;
        }
        if atom.deleted {
            self.tombstones += 1;
        }

        let id = atom.id;
        let pos = self.insert_before(cursor, atom);
        self.index.insert(id, pos);
    }

    /// Buffers an atom whose origin is not present, evicting the oldest
    /// orphans first when the buffer is full.
    fn buffer_orphan(&mut self, atom: Atom) {
        if let Some(bucket) = self.orphans.get(&atom.origin) {
            if bucket.iter().any(|a| a.id == atom.id) {
                // Duplicate delivery of a still-orphaned atom
                return;
            }
        }

        if self.orphan_total >= self.orphan_config.max_orphan_buffer_size {
            self.evict_orphans();
        }

        self.orphans.entry(atom.origin).or_default().push(atom);
        self.orphan_total += 1;
    }

    /// Drops roughly the oldest 10% of buffered orphans (at least one).
    /// Evicted atoms are lost to this peer unless retransmitted.
    fn evict_orphans(&mut self) {
        let mut clocks: Vec<u64> = self
            .orphans
            .values()
            .flat_map(|bucket| bucket.iter().map(|a| a.id.clock))
            .collect();
        if clocks.is_empty() {
            return;
        }
        clocks.sort_unstable();

        let drop_target = (self.orphan_total / 10).max(1);
        let cutoff = clocks[drop_target.min(clocks.len()) - 1];

        let mut evicted = 0usize;
        self.orphans.retain(|_, bucket| {
            bucket.retain(|a| {
                if a.id.clock <= cutoff {
                    evicted += 1;
                    false
                } else {
                    true
                }
            });
            !bucket.is_empty()
        });
        self.orphan_total -= evicted;

        warn!(
            evicted,
            remaining = self.orphan_total,
            "orphan buffer full, evicted oldest atoms"
        );
    }

    /// Runs age-based collection when the auto-GC threshold is crossed.
    fn maybe_auto_gc(&mut self) {
        if self.gc_config.auto_gc_enabled && self.tombstones >= self.gc_config.tombstone_threshold
        {
            let min_age = self.gc_config.min_age_threshold;
            self.garbage_collect_local(min_age);
        }
    }

    /// Removes every tombstone matching `condition` and records the run.
    fn sweep_tombstones<F: Fn(&Atom) -> bool>(&mut self, condition: F) -> usize {
        let start = Instant::now();
        let mut removed = 0usize;

        let mut pos = self.slots[self.head].next;
        while pos != NIL {
            let next = self.slots[pos].next;
            let matches = {
                let atom = &self.slots[pos].atom;
                atom.deleted && condition(atom)
            };
            if matches {
                self.remove_slot(pos);
                removed += 1;
            }
            pos = next;
        }

        self.gc_stats.record_run(start.elapsed(), removed);
        if removed > 0 {
            debug!(removed, "garbage collection removed tombstones");
        }
        removed
    }

    fn alloc(&mut self, atom: Atom) -> usize {
        let slot = Slot {
            atom,
            prev: NIL,
            next: NIL,
        };
        if let Some(pos) = self.free.pop() {
            self.slots[pos] = slot;
            pos
        } else {
            self.slots.push(slot);
            self.slots.len() - 1
        }
    }

    /// Links a new atom before `cursor`, or at the tail when `cursor` is NIL.
    fn insert_before(&mut self, cursor: usize, atom: Atom) -> usize {
        let pos = self.alloc(atom);

        if cursor == NIL {
            let tail = self.tail;
            self.slots[pos].prev = tail;
            self.slots[tail].next = pos;
            self.tail = pos;
        } else {
            let prev = self.slots[cursor].prev;
            self.slots[pos].prev = prev;
            self.slots[pos].next = cursor;
            self.slots[prev].next = pos;
            self.slots[cursor].prev = pos;
        }

        pos
    }

    /// Unlinks a tombstone from the sequence and releases its slot.
    fn remove_slot(&mut self, pos: usize) {
        let Slot { prev, next, atom } = self.slots[pos];

        if prev != NIL {
            self.slots[prev].next = next;
        }
        if next != NIL {
            self.slots[next].prev = prev;
        } else {
            self.tail = prev;
        }

        self.index.remove(&atom.id);
        self.tombstones -= 1;
        self.free.push(pos);
    }

    /// Appends a loaded atom at the tail without running placement;
    /// file order is trusted as a valid sequence order.
    fn append_tail(&mut self, atom: Atom) {
        if atom.deleted {
            self.tombstones += 1;
        }
        self.vector.update(atom.id.peer, atom.id.clock);

        let id = atom.id;
        let pos = self.insert_before(NIL, atom);
        self.index.insert(id, pos);
    }

    /// Resets to a freshly created sequence, keeping peer id and configs.
    fn clear_state(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.slots.push(Slot {
            atom: Atom::sentinel(),
            prev: NIL,
            next: NIL,
        });
        self.head = 0;
        self.tail = 0;

        self.index.clear();
        self.index.insert(OpId::SENTINEL, 0);
        self.orphans.clear();
        self.orphan_total = 0;
        self.pending_deletes.clear();
        self.tombstones = 0;
        self.vector = VectorClock::new(self.peer_id);
        self.gc_stats = GcStats::default();
    }
}
