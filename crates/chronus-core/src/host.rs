//! Module host: drives a patch per block.
//!
//! The host owns a [`PatchRouter`] plus everything the per-block path needs
//! pre-allocated: one output block per module, an input-mix scratch block, a
//! silent block, the command FIFO, and the `last_good` fallback copy of the
//! sink output. After a module is added (edit plane), rendering a block
//! allocates nothing.
//!
//! Commands queue into the FIFO as they arrive and are applied wholesale at
//! the next block boundary, in arrival order — a later `set` for the same
//! parameter overwrites the earlier target, and a `set_param` staged
//! mid-block is never audible mid-block.

#[cfg(not(feature = "std"))]
use alloc::{boxed::Box, collections::VecDeque, vec, vec::Vec};
#[cfg(feature = "std")]
use std::collections::VecDeque;

use crate::command::{CommandRecord, Opcode};
use crate::ident::Ident;
use crate::module::Module;
use crate::router::{PatchRouter, RouterError};

/// Commands the FIFO will hold before dropping (well above ring capacity).
const PENDING_CAPACITY: usize = 256;

/// Per-host command accounting, exposed through engine status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostStats {
    /// Commands applied to modules.
    pub commands_applied: u64,
    /// Commands dropped because the module id was unknown.
    pub unknown_module: u64,
    /// `Set` commands dropped because the parameter was unknown.
    pub unknown_param: u64,
    /// Reserved `PatchSignal` records seen and dropped.
    pub patch_signals: u64,
    /// Commands dropped because the FIFO overflowed.
    pub fifo_overflow: u64,
}

/// Owns a patch and renders it one block at a time.
pub struct ModuleHost {
    router: PatchRouter,
    sample_rate: f32,
    block_size: usize,
    /// Output work block per module, keyed in parallel with lookups by id.
    blocks: Vec<(Ident, Box<[f32]>)>,
    /// Input sum/copy scratch, reused every node.
    in_scratch: Box<[f32]>,
    /// All-zero block for sourceless nodes and the empty patch.
    silent: Box<[f32]>,
    /// Copy of the most recent sink output.
    last_good: Box<[f32]>,
    /// Copy of the processing order, detached from the router borrow.
    order_scratch: Vec<Ident>,
    pending: VecDeque<CommandRecord>,
    stats: HostStats,
}

impl ModuleHost {
    /// Creates an empty host for the given rates.
    pub fn new(sample_rate: f32, block_size: usize) -> Self {
        Self {
            router: PatchRouter::new(),
            sample_rate,
            block_size,
            blocks: Vec::with_capacity(crate::router::MAX_MODULES),
            in_scratch: vec![0.0; block_size].into_boxed_slice(),
            silent: vec![0.0; block_size].into_boxed_slice(),
            last_good: vec![0.0; block_size].into_boxed_slice(),
            order_scratch: Vec::with_capacity(crate::router::MAX_MODULES),
            pending: VecDeque::with_capacity(PENDING_CAPACITY),
            stats: HostStats::default(),
        }
    }

    /// Block size in samples.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// The routing graph (shared).
    pub fn router(&self) -> &PatchRouter {
        &self.router
    }

    /// Command accounting.
    pub fn stats(&self) -> HostStats {
        self.stats
    }

    /// The most recent sink output (or silence before the first block).
    pub fn last_good(&self) -> &[f32] {
        &self.last_good
    }

    // --- Edit plane ---

    /// Prepares `module` and adds it to the patch with its work block.
    ///
    /// This is the allocation point for the module's render path; the
    /// steady-state loop never allocates afterwards.
    pub fn add_module(
        &mut self,
        id: Ident,
        mut module: Box<dyn Module + Send>,
    ) -> Result<(), RouterError> {
        module.prepare(self.sample_rate, self.block_size);
        self.router.add_module(id, module)?;
        self.blocks
            .push((id, vec![0.0; self.block_size].into_boxed_slice()));
        Ok(())
    }

    /// Removes a disconnected module and releases its work block.
    pub fn remove_module(&mut self, id: Ident) -> Result<(), RouterError> {
        self.router.remove_module(id)?;
        self.blocks.retain(|(bid, _)| *bid != id);
        Ok(())
    }

    /// Adds the edge `src → dst`.
    pub fn connect(&mut self, src: Ident, dst: Ident) -> Result<(), RouterError> {
        self.router.connect(src, dst)
    }

    /// Removes the edge `src → dst`.
    pub fn disconnect(&mut self, src: Ident, dst: Ident) -> Result<(), RouterError> {
        self.router.disconnect(src, dst)
    }

    /// Drops the whole patch. `last_good` is kept for fallback continuity.
    pub fn clear(&mut self) {
        self.router.clear();
        self.blocks.clear();
        self.pending.clear();
    }

    /// Applies a parameter value immediately (patch priming path).
    pub fn set_param_immediate(&mut self, module: Ident, param: &str, value: f32) -> bool {
        match self.router.module_mut(module) {
            Some(m) => m.set_param(param, value, true),
            None => false,
        }
    }

    /// Sets a gate immediately (patch priming path).
    pub fn set_gate(&mut self, module: Ident, on: bool) -> bool {
        match self.router.module_mut(module) {
            Some(m) => {
                m.set_gate(on);
                true
            }
            None => false,
        }
    }

    // --- Block boundary ---

    /// Queues a command for the next block boundary.
    pub fn enqueue(&mut self, record: CommandRecord) {
        if self.pending.len() >= PENDING_CAPACITY {
            self.stats.fifo_overflow += 1;
            return;
        }
        self.pending.push_back(record);
    }

    /// Applies the whole FIFO in arrival order.
    ///
    /// Later writes to the same `(module, param)` overwrite earlier targets
    /// by construction. Unknown ids are counted and dropped, never fatal.
    pub fn apply_pending(&mut self) {
        while let Some(record) = self.pending.pop_front() {
            match record.op {
                Opcode::Set => match self.router.module_mut(record.module) {
                    Some(m) => {
                        if m.set_param(record.param.as_str(), record.value.as_f32(), false) {
                            self.stats.commands_applied += 1;
                        } else {
                            self.stats.unknown_param += 1;
                        }
                    }
                    None => self.stats.unknown_module += 1,
                },
                Opcode::Gate => match self.router.module_mut(record.module) {
                    Some(m) => {
                        m.set_gate(record.value.as_gate());
                        self.stats.commands_applied += 1;
                    }
                    None => self.stats.unknown_module += 1,
                },
                Opcode::PatchSignal => self.stats.patch_signals += 1,
            }
        }
    }

    /// Renders one block through the patch in topological order.
    ///
    /// Queued commands apply first. Each node reads either silence (no
    /// upstream edge), its single upstream output, or — for combiners — the
    /// sum of all upstream outputs. Returns the sink output, which is also
    /// copied into `last_good`. An empty patch yields silence and leaves
    /// `last_good` untouched.
    pub fn process_chain(&mut self) -> &[f32] {
        self.apply_pending();

        let Ok(order) = self.router.processing_order() else {
            // connect() rejects cycles, so this is unreachable in practice.
            return &self.silent;
        };
        if order.is_empty() {
            return &self.silent;
        }
        self.order_scratch.clear();
        self.order_scratch.extend_from_slice(order);

        for i in 0..self.order_scratch.len() {
            let id = self.order_scratch[i];

            // Mix (or copy) upstream outputs into the input scratch.
            self.in_scratch.fill(0.0);
            let mut first = true;
            for src_idx in 0..self.blocks.len() {
                let src_id = self.blocks[src_idx].0;
                let feeds = self.router.incoming(id).any(|s| s == src_id);
                if !feeds {
                    continue;
                }
                let (_, src_block) = &self.blocks[src_idx];
                if first {
                    self.in_scratch.copy_from_slice(src_block);
                    first = false;
                } else {
                    for (acc, s) in self.in_scratch.iter_mut().zip(src_block.iter()) {
                        *acc += *s;
                    }
                }
            }

            let Some(block_idx) = self.blocks.iter().position(|(bid, _)| *bid == id) else {
                continue;
            };
            let Some(module) = self.router.module_mut(id) else {
                continue;
            };
            module.process(&self.in_scratch, &mut self.blocks[block_idx].1);
        }

        let sink = self.order_scratch[self.order_scratch.len() - 1];
        if let Some(idx) = self.blocks.iter().position(|(bid, _)| *bid == sink) {
            self.last_good.copy_from_slice(&self.blocks[idx].1);
        }
        &self.last_good
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandValue;
    use crate::schema::{ModuleSchema, ParamSpec};

    fn id(s: &str) -> Ident {
        Ident::new(s).unwrap()
    }

    /// Emits a constant level; `set_gate` toggles output on/off.
    struct Source {
        level: f32,
        target: f32,
        on: bool,
    }

    const SOURCE_SCHEMA: ModuleSchema = ModuleSchema {
        type_name: "const_src",
        max_inputs: 1,
        params: &[ParamSpec::raw("level", 0.0, 1.0, 0.0)],
    };

    impl Module for Source {
        fn schema(&self) -> &'static ModuleSchema {
            &SOURCE_SCHEMA
        }
        fn prepare(&mut self, _: f32, _: usize) {
            self.level = 0.0;
            self.target = 0.0;
            self.on = true;
        }
        fn set_param(&mut self, name: &str, value: f32, immediate: bool) -> bool {
            if name != "level" {
                return false;
            }
            self.target = value;
            if immediate {
                self.level = value;
            }
            true
        }
        fn set_gate(&mut self, on: bool) {
            self.on = on;
        }
        fn process(&mut self, _input: &[f32], output: &mut [f32]) {
            // Target lands at the block boundary (start of this call).
            self.level = self.target;
            let v = if self.on { self.level } else { 0.0 };
            output.fill(v);
        }
        fn reset(&mut self) {
            self.level = 0.0;
        }
    }

    struct Doubler;

    const DOUBLER_SCHEMA: ModuleSchema = ModuleSchema {
        type_name: "doubler",
        max_inputs: 1,
        params: &[],
    };

    impl Module for Doubler {
        fn schema(&self) -> &'static ModuleSchema {
            &DOUBLER_SCHEMA
        }
        fn prepare(&mut self, _: f32, _: usize) {}
        fn set_param(&mut self, _: &str, _: f32, _: bool) -> bool {
            false
        }
        fn process(&mut self, input: &[f32], output: &mut [f32]) {
            for (o, i) in output.iter_mut().zip(input) {
                *o = i * 2.0;
            }
        }
        fn reset(&mut self) {}
    }

    struct Sum;

    const SUM_SCHEMA: ModuleSchema = ModuleSchema {
        type_name: "sum",
        max_inputs: 4,
        params: &[],
    };

    impl Module for Sum {
        fn schema(&self) -> &'static ModuleSchema {
            &SUM_SCHEMA
        }
        fn prepare(&mut self, _: f32, _: usize) {}
        fn set_param(&mut self, _: &str, _: f32, _: bool) -> bool {
            false
        }
        fn process(&mut self, input: &[f32], output: &mut [f32]) {
            output.copy_from_slice(input);
        }
        fn reset(&mut self) {}
    }

    fn host_with_source(level: f32) -> ModuleHost {
        let mut host = ModuleHost::new(48000.0, 8);
        host.add_module(id("src"), Box::new(Source { level: 0.0, target: 0.0, on: true }))
            .unwrap();
        host.set_param_immediate(id("src"), "level", level);
        host
    }

    #[test]
    fn empty_patch_renders_silence() {
        let mut host = ModuleHost::new(48000.0, 8);
        assert!(host.process_chain().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn chain_processes_in_order() {
        let mut host = host_with_source(0.25);
        host.add_module(id("dbl"), Box::new(Doubler)).unwrap();
        host.connect(id("src"), id("dbl")).unwrap();

        let out = host.process_chain();
        assert!(out.iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn last_good_tracks_sink_output() {
        let mut host = host_with_source(0.5);
        host.process_chain();
        assert!(host.last_good().iter().all(|&s| (s - 0.5).abs() < 1e-6));

        // A later silent render overwrites it; clear() does not.
        host.set_gate(id("src"), false);
        host.process_chain();
        assert!(host.last_good().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn commands_apply_at_block_boundary_in_arrival_order() {
        let mut host = host_with_source(0.1);
        host.enqueue(CommandRecord::set(
            id("src"),
            id("level"),
            CommandValue::Float(0.3),
        ));
        host.enqueue(CommandRecord::set(
            id("src"),
            id("level"),
            CommandValue::Float(0.9),
        ));

        // Nothing audible before the boundary.
        assert_eq!(host.stats().commands_applied, 0);

        let out = host.process_chain();
        // Last write wins.
        assert!(out.iter().all(|&s| (s - 0.9).abs() < 1e-6));
        assert_eq!(host.stats().commands_applied, 2);
    }

    #[test]
    fn gate_commands_toggle_modules() {
        let mut host = host_with_source(0.7);
        host.enqueue(CommandRecord::gate(id("src"), false));
        let out = host.process_chain();
        assert!(out.iter().all(|&s| s == 0.0));

        host.enqueue(CommandRecord::gate(id("src"), true));
        let out = host.process_chain();
        assert!(out.iter().all(|&s| (s - 0.7).abs() < 1e-6));
    }

    #[test]
    fn unknown_targets_counted_not_fatal() {
        let mut host = host_with_source(0.5);
        host.enqueue(CommandRecord::set(
            id("ghost"),
            id("level"),
            CommandValue::Float(1.0),
        ));
        host.enqueue(CommandRecord::set(
            id("src"),
            id("ghost"),
            CommandValue::Float(1.0),
        ));
        host.process_chain();
        let stats = host.stats();
        assert_eq!(stats.unknown_module, 1);
        assert_eq!(stats.unknown_param, 1);
    }

    #[test]
    fn combiner_sums_fan_in() {
        let mut host = ModuleHost::new(48000.0, 4);
        host.add_module(id("a"), Box::new(Source { level: 0.0, target: 0.0, on: true }))
            .unwrap();
        host.add_module(id("b"), Box::new(Source { level: 0.0, target: 0.0, on: true }))
            .unwrap();
        host.add_module(id("mix"), Box::new(Sum)).unwrap();
        host.set_param_immediate(id("a"), "level", 0.25);
        host.set_param_immediate(id("b"), "level", 0.5);
        host.connect(id("a"), id("mix")).unwrap();
        host.connect(id("b"), id("mix")).unwrap();

        let out = host.process_chain();
        assert!(out.iter().all(|&s| (s - 0.75).abs() < 1e-6));
    }

    #[test]
    fn sourceless_node_reads_silence() {
        let mut host = ModuleHost::new(48000.0, 4);
        host.add_module(id("dbl"), Box::new(Doubler)).unwrap();
        let out = host.process_chain();
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn immediate_set_twice_equals_once() {
        let mut host = host_with_source(0.0);
        host.set_param_immediate(id("src"), "level", 0.4);
        host.set_param_immediate(id("src"), "level", 0.4);
        let out = host.process_chain();
        assert!(out.iter().all(|&s| (s - 0.4).abs() < 1e-6));
    }
}
