//! Legacy 8259 interrupt controller pair.
//!
//! The power-on mapping parks IRQ 0-15 on top of the CPU exception
//! vectors, so both chips are remapped during init:
//!
//! - master: vectors `0x20`-`0x27` (IRQ 0-7)
//! - slave:  vectors `0x28`-`0x2f` (IRQ 8-15)
//!
//! Init leaves every line masked. A driver unmasks its own line once the
//! matching vector is installed in the interrupt table.

/// Remap base of the master chip. IRQ1 lands on vector `0x21`.
pub const PIC_1_OFFSET: u8 = 0x20;
/// Remap base of the slave chip.
pub const PIC_2_OFFSET: u8 = 0x28;

/// Vector numbers the remapped IRQ lines arrive on.
#[derive(Debug, Clone, Copy)]
#[repr(u8)]
pub enum InterruptIndex {
    Timer = PIC_1_OFFSET,        // IRQ0
    Keyboard = PIC_1_OFFSET + 1, // IRQ1
}

impl InterruptIndex {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn as_usize(self) -> usize {
        usize::from(self.as_u8())
    }
}

#[cfg(target_arch = "x86")]
mod imp {
    use x86::io::{inb, outb};

    use super::{PIC_1_OFFSET, PIC_2_OFFSET};

    const PIC_1_COMMAND: u16 = 0x20;
    const PIC_1_DATA: u16 = 0x21;
    const PIC_2_COMMAND: u16 = 0xa0;
    const PIC_2_DATA: u16 = 0xa1;

    const ICW1_INIT: u8 = 0x11;
    const ICW4_8086: u8 = 0x01;
    const EOI: u8 = 0x20;

    /// Runs the init sequence on both chips: remap, 8086 mode, all
    /// lines masked.
    pub fn init() {
        unsafe {
            // ICW1: start init, ICW4 follows
            outb(PIC_1_COMMAND, ICW1_INIT);
            outb(PIC_2_COMMAND, ICW1_INIT);
            // ICW2: vector offsets
            outb(PIC_1_DATA, PIC_1_OFFSET);
            outb(PIC_2_DATA, PIC_2_OFFSET);
            // ICW3: slave sits on master line 2
            outb(PIC_1_DATA, 0x04);
            outb(PIC_2_DATA, 0x02);
            // ICW4: 8086 mode
            outb(PIC_1_DATA, ICW4_8086);
            outb(PIC_2_DATA, ICW4_8086);
            // mask everything until a driver unmasks its line
            outb(PIC_1_DATA, 0xff);
            outb(PIC_2_DATA, 0xff);
        }
    }

    /// Unmasks one IRQ line, letting the controller forward it.
    pub fn clear_mask(irq: u8) {
        unsafe {
            if irq < 8 {
                outb(PIC_1_DATA, inb(PIC_1_DATA) & !(1 << irq));
            } else {
                outb(PIC_2_DATA, inb(PIC_2_DATA) & !(1 << (irq - 8)));
            }
        }
    }

    /// Masks one IRQ line.
    pub fn set_mask(irq: u8) {
        unsafe {
            if irq < 8 {
                outb(PIC_1_DATA, inb(PIC_1_DATA) | (1 << irq));
            } else {
                outb(PIC_2_DATA, inb(PIC_2_DATA) | (1 << (irq - 8)));
            }
        }
    }

    /// Signals end-of-interrupt for `vector`. Slave interrupts need an
    /// EOI on both chips, master interrupts only on the master.
    pub fn end_of_interrupt(vector: u8) {
        unsafe {
            if vector >= PIC_2_OFFSET && vector < PIC_2_OFFSET + 8 {
                outb(PIC_2_COMMAND, EOI);
            }
            outb(PIC_1_COMMAND, EOI);
        }
    }
}

// No controller to program off-target; the entry points stay callable so
// the boot path compiles everywhere.
#[cfg(not(target_arch = "x86"))]
mod imp {
    pub fn init() {}

    pub fn clear_mask(_irq: u8) {}

    pub fn set_mask(_irq: u8) {}

    pub fn end_of_interrupt(_vector: u8) {}
}

pub use imp::{clear_mask, end_of_interrupt, init, set_mask};
