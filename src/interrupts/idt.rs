//! Gate descriptor encoding and the interrupt descriptor table.
//!
//! ## Descriptor Layout
//!
//! Each of the 256 slots is an 8-byte interrupt gate:
//!
//! | Bits  | Field         | Content                         |
//! |-------|---------------|---------------------------------|
//! | 0-15  | `offset_low`  | handler address, low half       |
//! | 16-31 | `selector`    | GDT code segment selector       |
//! | 32-39 | `zero`        | reserved, always 0              |
//! | 40-47 | `type_attr`   | present, DPL and gate type      |
//! | 48-63 | `offset_high` | handler address, high half      |
//!
//! The table spans 256 * 8 = 2048 bytes and must keep a stable address
//! while active, so the live instance sits in a static and reaches the
//! CPU only through [`InterruptDescriptorTable::load`].

use bitflags::bitflags;

/// Number of gate descriptors the CPU indexes by vector number.
pub const IDT_ENTRIES: usize = 256;

bitflags! {
    /// The `type_attr` byte of a gate descriptor.
    pub struct GateFlags: u8 {
        const PRESENT = 1 << 7;
        const DPL_USER = 0x60;
        const INTERRUPT_GATE = 0x0e;
        const TRAP_GATE = 0x0f;
        /// Present ring-0 32-bit interrupt gate, the attribute every
        /// kernel handler is installed with.
        const KERNEL_INTERRUPT = Self::PRESENT.bits | Self::INTERRUPT_GATE.bits;
    }
}

/// One 8-byte interrupt gate, in the exact layout the CPU walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C, packed)]
pub struct Entry {
    offset_low: u16,
    selector: u16,
    zero: u8,
    type_attr: u8,
    offset_high: u16,
}

const _: () = assert!(core::mem::size_of::<Entry>() == 8);
const _: () = assert!(core::mem::offset_of!(Entry, offset_low) == 0);
const _: () = assert!(core::mem::offset_of!(Entry, selector) == 2);
const _: () = assert!(core::mem::offset_of!(Entry, zero) == 4);
const _: () = assert!(core::mem::offset_of!(Entry, type_attr) == 5);
const _: () = assert!(core::mem::offset_of!(Entry, offset_high) == 6);

impl Entry {
    /// Creates a cleared, non-present slot.
    #[inline]
    pub const fn missing() -> Self {
        Entry {
            offset_low: 0,
            selector: 0,
            zero: 0,
            type_attr: 0,
            offset_high: 0,
        }
    }

    /// Encodes a descriptor from a handler address, code segment selector
    /// and attribute byte. The 32-bit address is split into its two
    /// 16-bit halves; `flags` is stored verbatim.
    #[inline]
    pub const fn new(handler_addr: u32, selector: u16, flags: GateFlags) -> Self {
        Entry {
            offset_low: handler_addr as u16,
            selector,
            zero: 0,
            type_attr: flags.bits(),
            offset_high: (handler_addr >> 16) as u16,
        }
    }

    /// Reassembles the 32-bit handler address from its halves.
    #[inline]
    pub fn handler_addr(&self) -> u32 {
        (self.offset_high as u32) << 16 | self.offset_low as u32
    }

    #[inline]
    pub fn selector(&self) -> u16 {
        self.selector
    }

    /// The raw `type_attr` byte.
    #[inline]
    pub fn flags(&self) -> u8 {
        self.type_attr
    }

    #[inline]
    pub fn is_present(&self) -> bool {
        self.type_attr & GateFlags::PRESENT.bits() != 0
    }
}

/// The 256-slot table the CPU indexes by vector number.
///
/// Construct with [`new`](Self::new), fill slots with
/// [`set_gate`](Self::set_gate), then hand the table to the CPU with
/// [`load`](Self::load) once it sits at its final address.
#[repr(C, align(16))]
pub struct InterruptDescriptorTable {
    entries: [Entry; IDT_ENTRIES],
}

const _: () = assert!(core::mem::size_of::<InterruptDescriptorTable>() == IDT_ENTRIES * 8);

impl InterruptDescriptorTable {
    /// A table of 256 non-present slots.
    pub const fn new() -> Self {
        InterruptDescriptorTable {
            entries: [Entry::missing(); IDT_ENTRIES],
        }
    }

    /// Encodes one descriptor in place. Touches exactly the slot for
    /// `vector`. Once delivery is enabled the caller must suppress it
    /// around this multi-field write.
    pub fn set_gate(&mut self, vector: u8, handler_addr: u32, selector: u16, flags: GateFlags) {
        self.entries[vector as usize] = Entry::new(handler_addr, selector, flags);
    }

    /// Copy of the descriptor for `vector`.
    pub fn entry(&self, vector: u8) -> Entry {
        self.entries[vector as usize]
    }

    /// Activation record for `lidt`: limit is the table size in bytes
    /// minus one, base its linear address.
    pub fn pointer(&self) -> DescriptorTablePointer {
        DescriptorTablePointer {
            limit: (core::mem::size_of::<Self>() - 1) as u16,
            base: self as *const Self,
        }
    }

    /// Hands the table to the CPU.
    pub fn load(&'static self) {
        unsafe { self.load_unsafe() }
    }

    /// Loads the table with `lidt` without requiring a `'static` borrow.
    ///
    /// # Safety
    ///
    /// The table must stay at this address for as long as it is the
    /// active IDT.
    pub unsafe fn load_unsafe(&self) {
        let pointer = self.pointer();

        #[cfg(target_arch = "x86")]
        core::arch::asm!("lidt [{}]", in(reg) &pointer, options(readonly, nostack, preserves_flags));

        #[cfg(not(target_arch = "x86"))]
        let _ = pointer;
    }
}

/// Value handed to `lidt`: 16-bit limit followed by the table's linear
/// address, with no padding in between.
#[derive(Debug, Clone, Copy)]
#[repr(C, packed(2))]
pub struct DescriptorTablePointer {
    pub limit: u16,
    pub base: *const InterruptDescriptorTable,
}

#[cfg(target_arch = "x86")]
const _: () = assert!(core::mem::size_of::<DescriptorTablePointer>() == 6);

#[cfg(test)]
mod tests {
    use super::*;

    const STUB_ADDR: u32 = 0x0010_1234;

    #[test]
    fn entry_layout_is_the_8_byte_gate_format() {
        let entry = Entry::new(STUB_ADDR, 0x08, GateFlags::KERNEL_INTERRUPT);
        let raw: [u8; 8] = unsafe { core::mem::transmute(entry) };
        assert_eq!(raw, [0x34, 0x12, 0x08, 0x00, 0x00, 0x8e, 0x10, 0x00]);
    }

    #[test]
    fn handler_address_survives_the_split() {
        for addr in [0, 1, 0xffff, 0x0001_0000, 0x00ba_be00, 0xdead_beef, 0xffff_ffff] {
            let entry = Entry::new(addr, 0x08, GateFlags::KERNEL_INTERRUPT);
            assert_eq!(entry.handler_addr(), addr);
        }
    }

    #[test]
    fn fresh_table_has_no_present_slots() {
        let table = InterruptDescriptorTable::new();
        for vector in 0..=255u8 {
            assert!(!table.entry(vector).is_present());
            assert_eq!(table.entry(vector).flags(), 0);
        }
    }

    #[test]
    fn pointer_limit_covers_exactly_256_gates() {
        let table = InterruptDescriptorTable::new();
        let pointer = table.pointer();
        let limit = pointer.limit;
        assert_eq!(limit, 2047);
        let base = pointer.base;
        assert!(core::ptr::eq(base, &table));
    }

    #[test]
    fn keyboard_slot_install_is_bit_exact() {
        let mut table = InterruptDescriptorTable::new();
        table.set_gate(0x21, STUB_ADDR, 0x08, GateFlags::KERNEL_INTERRUPT);

        let entry = table.entry(0x21);
        assert_eq!(entry.selector(), 0x08);
        assert_eq!(entry.flags(), 0x8e);
        assert!(entry.is_present());
        assert_eq!(entry.handler_addr(), STUB_ADDR);

        assert!(!table.entry(0x20).is_present());
        assert!(!table.entry(0x22).is_present());
    }

    #[test]
    fn reinstalling_a_vector_takes_the_last_write() {
        let mut table = InterruptDescriptorTable::new();
        table.set_gate(0x21, 0x0010_0000, 0x08, GateFlags::KERNEL_INTERRUPT);
        table.set_gate(0x21, 0x00ca_fe00, 0x08, GateFlags::KERNEL_INTERRUPT);
        assert_eq!(table.entry(0x21).handler_addr(), 0x00ca_fe00);
    }

    #[test]
    fn kernel_interrupt_attribute_is_0x8e() {
        assert_eq!(GateFlags::KERNEL_INTERRUPT.bits(), 0x8e);
        assert_eq!(
            (GateFlags::PRESENT | GateFlags::INTERRUPT_GATE).bits(),
            GateFlags::KERNEL_INTERRUPT.bits()
        );
    }

    // Field-granular model of a slot rewrite: delivery may sample the
    // descriptor only while the interrupt flag allows it.
    fn sample(log: &mut Vec<u32>, delivery_enabled: bool, slot: &Entry) {
        if delivery_enabled {
            log.push(slot.handler_addr());
        }
    }

    #[test]
    fn guarded_rewrite_never_exposes_a_torn_slot() {
        const OLD: u32 = 0x0010_0000;
        const NEW: u32 = 0x00ca_fe00;

        let mut slot = Entry::new(OLD, 0x08, GateFlags::KERNEL_INTERRUPT);
        let mut log = Vec::new();

        let mut delivery = true;
        sample(&mut log, delivery, &slot);
        // the guard goes up before the first field store and drops only
        // after the last one, mirroring install()
        delivery = false;
        sample(&mut log, delivery, &slot);
        slot.offset_low = NEW as u16;
        sample(&mut log, delivery, &slot);
        slot.offset_high = (NEW >> 16) as u16;
        sample(&mut log, delivery, &slot);
        delivery = true;
        sample(&mut log, delivery, &slot);

        for addr in log {
            assert!(addr == OLD || addr == NEW, "torn descriptor observed: {addr:#010x}");
        }
    }

    #[test]
    fn unguarded_rewrite_can_expose_a_torn_slot() {
        const OLD: u32 = 0x0010_0000;
        const NEW: u32 = 0x00ca_fe00;

        let mut slot = Entry::new(OLD, 0x08, GateFlags::KERNEL_INTERRUPT);
        let mut log = Vec::new();

        slot.offset_low = NEW as u16;
        sample(&mut log, true, &slot);
        slot.offset_high = (NEW >> 16) as u16;
        sample(&mut log, true, &slot);

        assert!(
            log.contains(&0x0010_fe00),
            "mixed halves should be visible without the guard"
        );
    }
}
