//! Assembly registers and the recycling pool.
//!
//! Each syntax-tree value that reaches code generation is bound to an
//! `AssemblyRegister`, which tracks where the value currently lives and
//! whether a global-backed value is dirty (written in a register but not
//! yet flushed to its backing memory).
//!
//! State machine:
//!
//! ```text
//! Unloaded -> ActiveRegister | LoadedMemoryLocation
//! ActiveRegister -> DirtyGlobalRegister   (write to a global-backed value)
//! ActiveRegister | LoadedMemoryLocation | DirtyGlobalRegister -> ReusableRegister
//! ```
//!
//! `ReusableRegister` returns the physical slot to the pool; a later,
//! unrelated node may pick it up, bounding register pressure independent
//! of program size.

use crate::inst::{MemAddr, Slot};
use snex_ir::Types;

/// Number of physical slots in the pool. Exhaustion is an internal error;
/// aggressive recycling keeps real programs far below it.
pub const SLOT_COUNT: u8 = 32;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum RegState {
    /// Created, not yet holding a value anywhere.
    Unloaded,
    /// Value lives in the assigned slot.
    ActiveRegister,
    /// Value lives in memory; no slot assigned.
    LoadedMemoryLocation,
    /// Value in the slot is newer than its backing memory location and
    /// must be flushed before a call, branch join, or return.
    DirtyGlobalRegister,
    /// Terminal: last use observed, slot returned to the pool.
    ReusableRegister,
}

/// Handle to an assembly register within one function's pool.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[repr(transparent)]
pub struct RegId(pub u32);

#[derive(Clone, Debug)]
pub struct AssemblyRegister {
    pub ty: Types,
    pub state: RegState,
    pub slot: Option<Slot>,
    /// Backing memory location for globals/class members and stack locals.
    pub memory: Option<MemAddr>,
}

/// Pool of assembly registers, scoped to one function's code generation.
pub struct RegisterPool {
    regs: Vec<AssemblyRegister>,
    free_slots: Vec<Slot>,
}

impl RegisterPool {
    pub fn new() -> Self {
        RegisterPool {
            regs: Vec::new(),
            // Reverse order so slot 0 pops first.
            free_slots: (0..SLOT_COUNT).rev().map(Slot).collect(),
        }
    }

    /// Create an unloaded register for a value of type `ty`.
    pub fn create(&mut self, ty: Types) -> RegId {
        let id = RegId(self.regs.len() as u32);
        self.regs.push(AssemblyRegister {
            ty,
            state: RegState::Unloaded,
            slot: None,
            memory: None,
        });
        id
    }

    pub fn get(&self, id: RegId) -> &AssemblyRegister {
        &self.regs[id.0 as usize]
    }

    /// Assign a physical slot, transitioning to `ActiveRegister`.
    ///
    /// # Panics
    /// Panics on pool exhaustion; that is an internal error, never a
    /// user-facing diagnostic.
    pub fn materialize(&mut self, id: RegId) -> Slot {
        let reg = &mut self.regs[id.0 as usize];
        if let Some(slot) = reg.slot {
            debug_assert!(matches!(
                reg.state,
                RegState::ActiveRegister | RegState::DirtyGlobalRegister
            ));
            return slot;
        }
        let slot = self
            .free_slots
            .pop()
            .unwrap_or_else(|| panic!("register pool exhausted"));
        reg.slot = Some(slot);
        if reg.state != RegState::DirtyGlobalRegister {
            reg.state = RegState::ActiveRegister;
        }
        slot
    }

    /// Record that the value lives at `addr` without loading it.
    pub fn bind_memory(&mut self, id: RegId, addr: MemAddr) {
        let reg = &mut self.regs[id.0 as usize];
        reg.memory = Some(addr);
        if reg.state == RegState::Unloaded {
            reg.state = RegState::LoadedMemoryLocation;
        }
    }

    pub fn memory(&self, id: RegId) -> Option<MemAddr> {
        self.regs[id.0 as usize].memory
    }

    pub fn slot(&self, id: RegId) -> Option<Slot> {
        self.regs[id.0 as usize].slot
    }

    /// Mark a global-backed register dirty after a write.
    pub fn set_dirty(&mut self, id: RegId) {
        let reg = &mut self.regs[id.0 as usize];
        debug_assert!(reg.memory.is_some(), "dirty register needs a backing location");
        reg.state = RegState::DirtyGlobalRegister;
    }

    pub fn is_dirty(&self, id: RegId) -> bool {
        self.regs[id.0 as usize].state == RegState::DirtyGlobalRegister
    }

    /// Clear the dirty flag after a flush; the slot stays active.
    pub fn clear_dirty(&mut self, id: RegId) {
        let reg = &mut self.regs[id.0 as usize];
        if reg.state == RegState::DirtyGlobalRegister {
            reg.state = RegState::ActiveRegister;
        }
    }

    /// All dirty registers, in creation order.
    pub fn dirty_registers(&self) -> Vec<RegId> {
        self.regs
            .iter()
            .enumerate()
            .filter(|(_, r)| r.state == RegState::DirtyGlobalRegister)
            .map(|(i, _)| RegId(i as u32))
            .collect()
    }

    /// Release after the last use; the slot returns to the pool.
    pub fn release(&mut self, id: RegId) {
        let reg = &mut self.regs[id.0 as usize];
        debug_assert!(
            reg.state != RegState::DirtyGlobalRegister,
            "released a dirty register without flushing"
        );
        if reg.state == RegState::ReusableRegister {
            return;
        }
        if let Some(slot) = reg.slot.take() {
            self.free_slots.push(slot);
        }
        reg.state = RegState::ReusableRegister;
    }

    /// Count of slots currently handed out.
    pub fn live_slots(&self) -> usize {
        SLOT_COUNT as usize - self.free_slots.len()
    }
}

impl Default for RegisterPool {
    fn default() -> Self {
        Self::new()
    }
}
