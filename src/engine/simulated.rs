//! In-process deterministic engine
//!
//! [`SimulatedEngine`] stands in for the real block runtime in the CLI and in
//! tests. It is intentionally small: machines run a handful of stack
//! instructions, MIDI inputs forward routed events along their wires, sinks
//! drain their inbox one message per step. Every command it receives is
//! recorded so tests can assert on exactly what the bridge sent.
//!
//! Clones share state, so a test can keep one handle while the
//! [`EngineClient`](crate::engine::EngineClient) owns another.
//!
//! # Machine source
//!
//! One instruction per line, blank lines and `;` comments ignored:
//!
//! | Instruction | Effect                                          |
//! |-------------|-------------------------------------------------|
//! | `push N`    | push `N` (decimal or `0x` hex)                  |
//! | `pop`       | discard the top of stack                        |
//! | `add`       | pop two, push their wrapping sum                |
//! | `receive`   | pop the inbox onto the stack, waits when empty  |
//! | `send`      | pop and emit on every outgoing wire             |
//! | `halt`      | stop                                            |

use crate::engine::{Command, Engine};
use crate::error::{BridgeError, Result};
use crate::registry::{BlockConfig, BlockKind};
use crate::types::{BlockId, BlockStatus, OutputState, Wire};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// Words of addressable memory per machine
pub const MACHINE_MEMORY_WORDS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Instruction {
    Push(u16),
    Pop,
    Add,
    Receive,
    Send,
    Halt,
}

fn parse_number(token: &str) -> Option<u16> {
    match token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16).ok(),
        None => token.parse().ok(),
    }
}

fn parse_program(source: &str) -> std::result::Result<Vec<Instruction>, String> {
    let mut program = Vec::new();

    for (line_no, line) in source.lines().enumerate() {
        let line = line.split(';').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }

        let mut tokens = line.split_whitespace();
        let op = tokens.next().unwrap_or_default().to_ascii_lowercase();
        let arg = tokens.next();

        let instruction = match (op.as_str(), arg) {
            ("push", Some(arg)) => Instruction::Push(
                parse_number(arg).ok_or_else(|| format!("line {}: bad operand {}", line_no + 1, arg))?,
            ),
            ("pop", None) => Instruction::Pop,
            ("add", None) => Instruction::Add,
            ("receive", None) => Instruction::Receive,
            ("send", None) => Instruction::Send,
            ("halt", None) => Instruction::Halt,
            _ => return Err(format!("line {}: cannot parse '{}'", line_no + 1, line)),
        };
        program.push(instruction);
    }

    if program.is_empty() {
        return Err("empty program".to_string());
    }
    Ok(program)
}

#[derive(Debug)]
struct MachineState {
    source: Option<String>,
    program: Vec<Instruction>,
    pc: usize,
    stack: Vec<u16>,
    memory: Vec<u16>,
}

impl MachineState {
    fn new() -> Self {
        Self {
            source: None,
            program: Vec::new(),
            pc: 0,
            stack: Vec::new(),
            memory: vec![0; MACHINE_MEMORY_WORDS],
        }
    }
}

#[derive(Debug)]
struct SimBlock {
    config: Option<BlockConfig>,
    kind: BlockKind,
    status: BlockStatus,
    inbox: VecDeque<u16>,
    outbox: u32,
    machine: Option<MachineState>,
}

impl SimBlock {
    fn new(kind: BlockKind, config: Option<BlockConfig>) -> Self {
        Self {
            machine: (kind == BlockKind::Machine).then(MachineState::new),
            config,
            kind,
            status: BlockStatus::Idle,
            inbox: VecDeque::new(),
            outbox: 0,
        }
    }

    /// Run one step; returns words to emit on outgoing wires
    fn step(&mut self) -> Vec<u16> {
        self.outbox = 0;
        match self.kind {
            BlockKind::Machine => self.step_machine(),
            BlockKind::MidiIn => self.inbox.pop_front().into_iter().collect(),
            BlockKind::Pixel | BlockKind::Plotter | BlockKind::MidiOut | BlockKind::ValueView => {
                self.inbox.pop_front();
                Vec::new()
            }
            BlockKind::Tap | BlockKind::Oscillator | BlockKind::Clock => Vec::new(),
        }
    }

    fn step_machine(&mut self) -> Vec<u16> {
        if matches!(self.status, BlockStatus::Invalid | BlockStatus::Halted) {
            return Vec::new();
        }
        let Some(machine) = self.machine.as_mut() else {
            return Vec::new();
        };
        let Some(instruction) = machine.program.get(machine.pc).copied() else {
            self.status = BlockStatus::Halted;
            return Vec::new();
        };

        let mut emitted = Vec::new();
        match instruction {
            Instruction::Push(value) => machine.stack.push(value),
            Instruction::Pop => {
                machine.stack.pop();
            }
            Instruction::Add => {
                let a = machine.stack.pop().unwrap_or(0);
                let b = machine.stack.pop().unwrap_or(0);
                machine.stack.push(a.wrapping_add(b));
            }
            Instruction::Receive => match self.inbox.pop_front() {
                Some(word) => machine.stack.push(word),
                None => {
                    self.status = BlockStatus::Awaiting;
                    return emitted;
                }
            },
            Instruction::Send => emitted.push(machine.stack.pop().unwrap_or(0)),
            Instruction::Halt => {
                self.status = BlockStatus::Halted;
                return emitted;
            }
        }

        machine.pc += 1;
        self.status = BlockStatus::Idle;
        emitted
    }

    fn output(&self) -> OutputState {
        let state = OutputState::new(self.status, self.inbox.len() as u32, self.outbox);
        match &self.machine {
            Some(machine) => state.with_payload(machine.stack.clone()),
            None => state,
        }
    }
}

#[derive(Debug)]
struct SimState {
    next_id: u32,
    blocks: BTreeMap<BlockId, SimBlock>,
    wires: Vec<Wire>,
    log: Vec<(BlockId, Command)>,
    steps: u64,
    refuse_allocations: bool,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            next_id: 1,
            blocks: BTreeMap::new(),
            wires: Vec::new(),
            log: Vec::new(),
            steps: 0,
            refuse_allocations: false,
        }
    }
}

impl SimState {
    fn allocate(&mut self, kind: BlockKind, config: Option<BlockConfig>) -> Result<BlockId> {
        if self.refuse_allocations {
            return Err(BridgeError::Allocation {
                kind: kind.to_string(),
            });
        }
        let id = BlockId(self.next_id);
        self.next_id += 1;
        self.blocks.insert(id, SimBlock::new(kind, config));
        Ok(id)
    }

    fn block_mut(&mut self, id: BlockId) -> Result<&mut SimBlock> {
        self.blocks.get_mut(&id).ok_or(BridgeError::UnknownBlock(id))
    }

    fn machine_mut(&mut self, id: BlockId) -> Result<&mut MachineState> {
        let block = self.block_mut(id)?;
        let kind = block.kind;
        block.machine.as_mut().ok_or_else(|| BridgeError::KindMismatch {
            id,
            expected: BlockKind::Machine.to_string(),
            actual: kind.to_string(),
        })
    }

    fn write_memory(&mut self, id: BlockId, offset: u16, values: &[u16]) -> Result<()> {
        let machine = self.machine_mut(id)?;
        let start = offset as usize;
        let end = start + values.len();
        if end > MACHINE_MEMORY_WORDS {
            return Err(BridgeError::Engine(format!(
                "write of {} word(s) at {} exceeds machine memory",
                values.len(),
                offset
            )));
        }
        machine.memory[start..end].copy_from_slice(values);
        Ok(())
    }

    fn apply(&mut self, id: BlockId, command: &Command) -> Result<()> {
        let block = self.block_mut(id)?;
        let kind = block.kind;
        let mismatch = |expected: BlockKind| BridgeError::KindMismatch {
            id,
            expected: expected.to_string(),
            actual: kind.to_string(),
        };

        match command {
            Command::SetMidiInputEvent { event } => match &mut block.config {
                Some(BlockConfig::MidiIn(config)) => config.on = *event,
                _ => return Err(mismatch(BlockKind::MidiIn)),
            },
            Command::SetMidiPort { port } => match &mut block.config {
                Some(BlockConfig::MidiIn(config)) => config.port = *port,
                Some(BlockConfig::MidiOut(config)) => config.port = *port,
                _ => return Err(mismatch(BlockKind::MidiIn)),
            },
            Command::SetMidiChannels { channels } => match &mut block.config {
                Some(BlockConfig::MidiIn(config)) => config.channels = channels.clone(),
                Some(BlockConfig::MidiOut(config)) => config.channels = channels.clone(),
                _ => return Err(mismatch(BlockKind::MidiIn)),
            },
            Command::Midi { value, .. } => {
                if kind != BlockKind::MidiIn {
                    return Err(mismatch(BlockKind::MidiIn));
                }
                block.inbox.push_back(*value as u16);
            }
            Command::SetMachineMemory { offset, values } => {
                self.write_memory(id, *offset, values)?;
            }
        }
        Ok(())
    }

    fn step(&mut self) {
        let mut deliveries: Vec<(BlockId, u16)> = Vec::new();

        for (id, block) in self.blocks.iter_mut() {
            let emitted = block.step();
            if emitted.is_empty() {
                continue;
            }
            for wire in self.wires.iter().filter(|w| w.source == *id) {
                for word in &emitted {
                    deliveries.push((wire.target, *word));
                    block.outbox += 1;
                }
            }
        }

        // Deliver after every block stepped so ordering does not depend on ids
        for (target, word) in deliveries {
            if let Some(block) = self.blocks.get_mut(&target) {
                block.inbox.push_back(word);
            }
        }
        self.steps += 1;
    }
}

/// Deterministic in-process [`Engine`]
#[derive(Debug, Clone, Default)]
pub struct SimulatedEngine {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every following allocation fail (or succeed again)
    pub fn refuse_allocations(&self, refuse: bool) {
        self.lock().refuse_allocations = refuse;
    }

    /// Every command received, in order
    pub fn commands(&self) -> Vec<(BlockId, Command)> {
        self.lock().log.clone()
    }

    /// Commands received by one block, in order
    pub fn commands_for(&self, id: BlockId) -> Vec<Command> {
        self.lock()
            .log
            .iter()
            .filter(|(target, _)| *target == id)
            .map(|(_, command)| command.clone())
            .collect()
    }

    pub fn step_count(&self) -> u64 {
        self.lock().steps
    }

    pub fn block_count(&self) -> usize {
        self.lock().blocks.len()
    }

    pub fn contains(&self, id: BlockId) -> bool {
        self.lock().blocks.contains_key(&id)
    }

    pub fn wires(&self) -> Vec<Wire> {
        self.lock().wires.clone()
    }

    pub fn status(&self, id: BlockId) -> Option<BlockStatus> {
        self.lock().blocks.get(&id).map(|b| b.status)
    }

    /// Last source loaded into a machine
    pub fn loaded_source(&self, id: BlockId) -> Option<String> {
        self.lock()
            .blocks
            .get(&id)
            .and_then(|b| b.machine.as_ref())
            .and_then(|m| m.source.clone())
    }

    /// Engine-side configuration of a non-machine block
    pub fn config(&self, id: BlockId) -> Option<BlockConfig> {
        self.lock().blocks.get(&id).and_then(|b| b.config.clone())
    }
}

impl Engine for SimulatedEngine {
    fn add_machine(&mut self) -> Result<BlockId> {
        self.lock().allocate(BlockKind::Machine, None)
    }

    fn add_block(&mut self, config: &BlockConfig) -> Result<BlockId> {
        if config.kind() == BlockKind::Machine {
            return Err(BridgeError::Engine(
                "machines are allocated with add_machine".to_string(),
            ));
        }
        self.lock().allocate(config.kind(), Some(config.clone()))
    }

    fn remove_block(&mut self, id: BlockId) -> Result<()> {
        let mut state = self.lock();
        state
            .blocks
            .remove(&id)
            .ok_or(BridgeError::UnknownBlock(id))?;
        state.wires.retain(|w| !w.touches(id));
        Ok(())
    }

    fn connect(&mut self, wire: &Wire) -> Result<()> {
        let mut state = self.lock();
        for id in [wire.source, wire.target] {
            if !state.blocks.contains_key(&id) {
                return Err(BridgeError::UnknownBlock(id));
            }
        }
        if !state.wires.contains(wire) {
            state.wires.push(*wire);
        }
        Ok(())
    }

    fn disconnect(&mut self, wire: &Wire) -> Result<()> {
        let mut state = self.lock();
        let before = state.wires.len();
        state.wires.retain(|w| w != wire);
        if state.wires.len() == before {
            return Err(BridgeError::Engine(format!(
                "no wire {}:{} -> {}:{}",
                wire.source, wire.source_port, wire.target, wire.target_port
            )));
        }
        Ok(())
    }

    fn send(&mut self, id: BlockId, command: &Command) -> Result<()> {
        let mut state = self.lock();
        state.apply(id, command)?;
        state.log.push((id, command.clone()));
        Ok(())
    }

    fn set_memory(&mut self, id: BlockId, offset: u16, values: &[u16]) -> Result<()> {
        self.lock().write_memory(id, offset, values)
    }

    fn read_memory(&mut self, id: BlockId, offset: u16, size: u16) -> Result<Vec<u16>> {
        let mut state = self.lock();
        let machine = state.machine_mut(id)?;
        let start = offset as usize;
        let end = start + size as usize;
        machine
            .memory
            .get(start..end)
            .map(|words| words.to_vec())
            .ok_or_else(|| {
                BridgeError::Engine(format!(
                    "read of {} word(s) at {} exceeds machine memory",
                    size, offset
                ))
            })
    }

    fn load(&mut self, id: BlockId, source: &str) -> Result<()> {
        let mut state = self.lock();
        let block = state.block_mut(id)?;
        let kind = block.kind;
        let Some(machine) = block.machine.as_mut() else {
            return Err(BridgeError::KindMismatch {
                id,
                expected: BlockKind::Machine.to_string(),
                actual: kind.to_string(),
            });
        };

        machine.source = Some(source.to_string());
        machine.pc = 0;
        machine.stack.clear();
        block.inbox.clear();

        // A bad program is reported through the status, not as an error
        match parse_program(source) {
            Ok(program) => {
                machine.program = program;
                block.status = BlockStatus::Idle;
            }
            Err(reason) => {
                tracing::debug!("Machine {} failed to compile: {}", id, reason);
                machine.program.clear();
                block.status = BlockStatus::Invalid;
            }
        }
        Ok(())
    }

    fn step(&mut self) -> Result<()> {
        self.lock().step();
        Ok(())
    }

    fn read_outputs(&mut self) -> Result<HashMap<BlockId, OutputState>> {
        Ok(self
            .lock()
            .blocks
            .iter()
            .map(|(id, block)| (*id, block.output()))
            .collect())
    }
}
