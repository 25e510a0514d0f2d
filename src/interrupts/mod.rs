//! Interrupt table lifecycle and handler registry.
//!
//! The table is constructed in place, populated, then activated, in that
//! order:
//!
//! ```ignore
//! use crate::{cpu, interrupts};
//! interrupts::init();  // populate the table, hand it to the CPU
//! cpu::enable_int();   // accept delivery
//! ```
//!
//! ## Vector Layout
//!
//! | Vector | Type               | Wired to                     |
//! |--------|--------------------|------------------------------|
//! | 0-31   | CPU exceptions     | fault report, then halt      |
//! | 32-47  | Remapped IRQ lines | registered device handler    |
//! | 48-255 | Unused             | non-present                  |
//!
//! After activation [`install`] may still rewire a slot; it suppresses
//! delivery around the descriptor write so a vector firing mid-update can
//! never walk a half-encoded slot.

pub mod dispatch;
pub mod idt;

use spin::Mutex;

use crate::cpu;
use dispatch::ENTRY_STUBS;
use idt::{GateFlags, InterruptDescriptorTable};

/// Code segment every handler runs in. Matches the flat kernel code
/// descriptor the boot stage sets up at GDT slot 1.
pub const KERNEL_CODE_SELECTOR: u16 = 0x08;

/// The live table. Static, so its address never changes while active.
static IDT: Mutex<InterruptDescriptorTable> = Mutex::new(InterruptDescriptorTable::new());

/// Populates the exception and IRQ slots, then activates the table.
pub fn init() {
    {
        let mut idt = IDT.lock();
        for (vector, stub) in ENTRY_STUBS.iter().enumerate() {
            idt.set_gate(
                vector as u8,
                stub.addr(),
                KERNEL_CODE_SELECTOR,
                GateFlags::KERNEL_INTERRUPT,
            );
        }
    }
    activate();
}

/// Points `vector` at an entry stub. Every install uses the kernel code
/// selector and the present ring-0 interrupt-gate attribute. Installing
/// over a populated slot replaces it, last write wins.
pub fn install(vector: u8, entry_stub_addr: u32) {
    let was_enabled = cpu::disable_int_nested();
    IDT.lock().set_gate(
        vector,
        entry_stub_addr,
        KERNEL_CODE_SELECTOR,
        GateFlags::KERNEL_INTERRUPT,
    );
    cpu::enable_int_nested(was_enabled);
}

/// Hands the populated table to the CPU.
pub fn activate() {
    let idt = IDT.lock();
    // The table sits in a static, so the address stays valid after the
    // guard drops.
    unsafe { idt.load_unsafe() };
}

/// Copy of the descriptor currently installed for `vector`.
pub fn descriptor(vector: u8) -> idt::Entry {
    IDT.lock().entry(vector)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_encodes_fixed_selector_and_flags() {
        install(0x41, 0x00be_ef00);
        let entry = descriptor(0x41);
        assert_eq!(entry.selector(), KERNEL_CODE_SELECTOR);
        assert_eq!(entry.flags(), 0x8e);
        assert_eq!(entry.handler_addr(), 0x00be_ef00);
        assert!(entry.is_present());
    }

    #[test]
    fn install_replaces_previous_descriptor() {
        install(0x42, 0x1000_0000);
        install(0x42, 0x2000_0000);
        assert_eq!(descriptor(0x42).handler_addr(), 0x2000_0000);
    }

    #[test]
    fn install_preserves_interrupt_flag() {
        cpu::enable_int();
        install(0x43, 0x3000);
        assert!(cpu::is_int_enabled());

        cpu::disable_int();
        install(0x43, 0x4000);
        assert!(!cpu::is_int_enabled());
    }

    #[test]
    fn init_wires_exceptions_and_irq_lines() {
        init();
        assert!(descriptor(0).is_present());
        assert!(descriptor(14).is_present());
        assert!(descriptor(32).is_present());
        assert!(descriptor(47).is_present());
        assert!(!descriptor(48).is_present());
        assert!(!descriptor(255).is_present());
        assert_eq!(descriptor(33).selector(), KERNEL_CODE_SELECTOR);
        assert_eq!(descriptor(33).flags(), 0x8e);
    }
}
