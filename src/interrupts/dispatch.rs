//! Entry stubs and the single dispatcher behind every wired vector.
//!
//! Every populated gate points at one of the thin stubs generated here.
//! A stub forwards its vector number, the error code when the CPU pushed
//! one (zero otherwise) and the saved frame to [`dispatch`], which looks
//! the vector up in the handler map:
//!
//! | Map entry            | Action                                |
//! |----------------------|---------------------------------------|
//! | `Handler::Device(f)` | call `f`, return, the stub irets      |
//! | `Handler::Exception` | print a fault report, halt            |
//! | `Handler::None`      | print the unexpected vector, halt     |
//!
//! Register save and restore around the handler body is the compiler's
//! job via the `x86-interrupt` calling convention; nothing here touches
//! individual registers.

use spin::Mutex;

use crate::cpu;
use crate::devices::vga;
use crate::interrupts::idt::IDT_ENTRIES;
use crate::println;

/// Registers the CPU saves on interrupt entry.
#[derive(Clone, Copy)]
#[repr(C)]
pub struct InterruptStackFrame {
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
}

impl core::fmt::Debug for InterruptStackFrame {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InterruptStackFrame")
            .field("eip", &format_args!("{:#010x}", self.eip))
            .field("cs", &format_args!("{:#06x}", self.cs))
            .field("eflags", &format_args!("{:#010x}", self.eflags))
            .finish()
    }
}

pub type HandlerFunc = extern "x86-interrupt" fn(InterruptStackFrame);
pub type HandlerFuncWithErrCode = extern "x86-interrupt" fn(InterruptStackFrame, usize);

/// What the dispatcher does when a vector fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    /// Nothing registered. A vector arriving here is a configuration
    /// error and halts the machine.
    None,
    /// CPU exception: reported by name, then halted.
    Exception,
    /// Device interrupt service routine. Responsible for its own EOI.
    Device(fn()),
}

/// Vector-indexed handler map. The exception vectors are wired from the
/// start; device slots are filled through [`register`].
static HANDLERS: Mutex<[Handler; IDT_ENTRIES]> = Mutex::new(default_handlers());

const fn default_handlers() -> [Handler; IDT_ENTRIES] {
    let mut map = [Handler::None; IDT_ENTRIES];
    let mut vector = 0;
    while vector < EXCEPTION_NAMES.len() {
        map[vector] = Handler::Exception;
        vector += 1;
    }
    map
}

/// Architectural names for vectors 0-31.
const EXCEPTION_NAMES: [&str; 32] = [
    "divide error",
    "debug exception",
    "non-maskable interrupt",
    "breakpoint",
    "overflow",
    "bound range exceeded",
    "invalid opcode",
    "device not available",
    "double fault",
    "coprocessor segment overrun",
    "invalid TSS",
    "segment not present",
    "stack-segment fault",
    "general protection fault",
    "page fault",
    "reserved",
    "x87 floating-point exception",
    "alignment check",
    "machine check",
    "SIMD floating-point exception",
    "virtualization exception",
    "control protection exception",
    "reserved",
    "reserved",
    "reserved",
    "reserved",
    "reserved",
    "reserved",
    "hypervisor injection exception",
    "VMM communication exception",
    "security exception",
    "reserved",
];

/// Exception vectors for which the CPU pushes an error code.
const fn pushes_error_code(vector: u8) -> bool {
    matches!(vector, 8 | 10..=14 | 17 | 21 | 29 | 30)
}

/// Registers `handler` for `vector`, replacing whatever was there. The
/// map write runs with delivery suppressed so it cannot race a lookup.
pub fn register(vector: u8, handler: Handler) {
    let was_enabled = cpu::disable_int_nested();
    HANDLERS.lock()[vector as usize] = handler;
    cpu::enable_int_nested(was_enabled);
}

/// Copy of the handler registered for `vector`.
pub fn handler(vector: u8) -> Handler {
    HANDLERS.lock()[vector as usize]
}

/// The single funnel behind every entry stub.
extern "C" fn dispatch(vector: u32, error_code: u32, frame: &InterruptStackFrame) {
    match handler(vector as u8) {
        Handler::Device(isr) => isr(),
        Handler::Exception => fault(vector, error_code, frame),
        Handler::None => unexpected(vector),
    }
}

/// Prints a fault report and halts. The interrupted code may still hold
/// the writer lock, so it is broken before reporting.
fn fault(vector: u32, error_code: u32, frame: &InterruptStackFrame) -> ! {
    unsafe { vga::WRITER.force_unlock() };

    let name = EXCEPTION_NAMES
        .get(vector as usize)
        .copied()
        .unwrap_or("unknown exception");
    println!("EXCEPTION: {} (vector {})\n{:#?}", name, vector, frame);
    if pushes_error_code(vector as u8) {
        println!("error code: {:#x}", error_code);
    }
    println!("processor halted.");
    cpu::halt();
}

fn unexpected(vector: u32) -> ! {
    unsafe { vga::WRITER.force_unlock() };

    println!("unexpected interrupt nr = {} - processor halted.", vector);
    cpu::halt();
}

macro_rules! entry_stub {
    ($name:ident, $vector:expr) => {
        extern "x86-interrupt" fn $name(frame: InterruptStackFrame) {
            dispatch($vector, 0, &frame);
        }
    };
    ($name:ident, $vector:expr, error_code) => {
        extern "x86-interrupt" fn $name(frame: InterruptStackFrame, error_code: usize) {
            dispatch($vector, error_code as u32, &frame);
        }
    };
}

entry_stub!(divide_error_stub, 0);
entry_stub!(debug_stub, 1);
entry_stub!(non_maskable_interrupt_stub, 2);
entry_stub!(breakpoint_stub, 3);
entry_stub!(overflow_stub, 4);
entry_stub!(bound_range_exceeded_stub, 5);
entry_stub!(invalid_opcode_stub, 6);
entry_stub!(device_not_available_stub, 7);
entry_stub!(double_fault_stub, 8, error_code);
entry_stub!(coprocessor_segment_overrun_stub, 9);
entry_stub!(invalid_tss_stub, 10, error_code);
entry_stub!(segment_not_present_stub, 11, error_code);
entry_stub!(stack_segment_fault_stub, 12, error_code);
entry_stub!(general_protection_fault_stub, 13, error_code);
entry_stub!(page_fault_stub, 14, error_code);
entry_stub!(reserved_15_stub, 15);
entry_stub!(x87_floating_point_stub, 16);
entry_stub!(alignment_check_stub, 17, error_code);
entry_stub!(machine_check_stub, 18);
entry_stub!(simd_floating_point_stub, 19);
entry_stub!(virtualization_stub, 20);
entry_stub!(control_protection_stub, 21, error_code);
entry_stub!(reserved_22_stub, 22);
entry_stub!(reserved_23_stub, 23);
entry_stub!(reserved_24_stub, 24);
entry_stub!(reserved_25_stub, 25);
entry_stub!(reserved_26_stub, 26);
entry_stub!(reserved_27_stub, 27);
entry_stub!(hypervisor_injection_stub, 28);
entry_stub!(vmm_communication_stub, 29, error_code);
entry_stub!(security_exception_stub, 30, error_code);
entry_stub!(reserved_31_stub, 31);
entry_stub!(irq0_stub, 32);
entry_stub!(irq1_stub, 33);
entry_stub!(irq2_stub, 34);
entry_stub!(irq3_stub, 35);
entry_stub!(irq4_stub, 36);
entry_stub!(irq5_stub, 37);
entry_stub!(irq6_stub, 38);
entry_stub!(irq7_stub, 39);
entry_stub!(irq8_stub, 40);
entry_stub!(irq9_stub, 41);
entry_stub!(irq10_stub, 42);
entry_stub!(irq11_stub, 43);
entry_stub!(irq12_stub, 44);
entry_stub!(irq13_stub, 45);
entry_stub!(irq14_stub, 46);
entry_stub!(irq15_stub, 47);

/// Vectors with a generated stub: the 32 exception vectors plus the 16
/// remapped IRQ lines.
pub(crate) const WIRED_VECTORS: usize = 48;

/// A stub reference together with its error-code shape.
pub(crate) enum EntryStub {
    Plain(HandlerFunc),
    WithErrCode(HandlerFuncWithErrCode),
}

impl EntryStub {
    /// Address the registry encodes into the gate descriptor.
    pub(crate) fn addr(&self) -> u32 {
        match *self {
            EntryStub::Plain(stub) => stub as usize as u32,
            EntryStub::WithErrCode(stub) => stub as usize as u32,
        }
    }
}

/// Vector-ordered stub table: the index is the vector the stub reports.
pub(crate) static ENTRY_STUBS: [EntryStub; WIRED_VECTORS] = [
    EntryStub::Plain(divide_error_stub),
    EntryStub::Plain(debug_stub),
    EntryStub::Plain(non_maskable_interrupt_stub),
    EntryStub::Plain(breakpoint_stub),
    EntryStub::Plain(overflow_stub),
    EntryStub::Plain(bound_range_exceeded_stub),
    EntryStub::Plain(invalid_opcode_stub),
    EntryStub::Plain(device_not_available_stub),
    EntryStub::WithErrCode(double_fault_stub),
    EntryStub::Plain(coprocessor_segment_overrun_stub),
    EntryStub::WithErrCode(invalid_tss_stub),
    EntryStub::WithErrCode(segment_not_present_stub),
    EntryStub::WithErrCode(stack_segment_fault_stub),
    EntryStub::WithErrCode(general_protection_fault_stub),
    EntryStub::WithErrCode(page_fault_stub),
    EntryStub::Plain(reserved_15_stub),
    EntryStub::Plain(x87_floating_point_stub),
    EntryStub::WithErrCode(alignment_check_stub),
    EntryStub::Plain(machine_check_stub),
    EntryStub::Plain(simd_floating_point_stub),
    EntryStub::Plain(virtualization_stub),
    EntryStub::WithErrCode(control_protection_stub),
    EntryStub::Plain(reserved_22_stub),
    EntryStub::Plain(reserved_23_stub),
    EntryStub::Plain(reserved_24_stub),
    EntryStub::Plain(reserved_25_stub),
    EntryStub::Plain(reserved_26_stub),
    EntryStub::Plain(reserved_27_stub),
    EntryStub::Plain(hypervisor_injection_stub),
    EntryStub::WithErrCode(vmm_communication_stub),
    EntryStub::WithErrCode(security_exception_stub),
    EntryStub::Plain(reserved_31_stub),
    EntryStub::Plain(irq0_stub),
    EntryStub::Plain(irq1_stub),
    EntryStub::Plain(irq2_stub),
    EntryStub::Plain(irq3_stub),
    EntryStub::Plain(irq4_stub),
    EntryStub::Plain(irq5_stub),
    EntryStub::Plain(irq6_stub),
    EntryStub::Plain(irq7_stub),
    EntryStub::Plain(irq8_stub),
    EntryStub::Plain(irq9_stub),
    EntryStub::Plain(irq10_stub),
    EntryStub::Plain(irq11_stub),
    EntryStub::Plain(irq12_stub),
    EntryStub::Plain(irq13_stub),
    EntryStub::Plain(irq14_stub),
    EntryStub::Plain(irq15_stub),
];

/// Address of the wired entry stub for `vector`, if one exists.
pub fn entry_stub_addr(vector: u8) -> Option<u32> {
    ENTRY_STUBS.get(vector as usize).map(EntryStub::addr)
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    #[test]
    fn exception_names_follow_the_architectural_order() {
        assert_eq!(EXCEPTION_NAMES[0], "divide error");
        assert_eq!(EXCEPTION_NAMES[8], "double fault");
        assert_eq!(EXCEPTION_NAMES[13], "general protection fault");
        assert_eq!(EXCEPTION_NAMES[14], "page fault");
    }

    #[test]
    fn stub_table_marks_exactly_the_error_code_vectors() {
        assert_eq!(ENTRY_STUBS.len(), WIRED_VECTORS);
        for (vector, stub) in ENTRY_STUBS.iter().enumerate() {
            let with_code = matches!(stub, EntryStub::WithErrCode(_));
            assert_eq!(with_code, pushes_error_code(vector as u8), "vector {vector}");
        }
    }

    #[test]
    fn register_takes_the_last_write() {
        fn first() {}
        fn second() {}

        register(0x44, Handler::Device(first));
        register(0x44, Handler::Device(second));
        assert_eq!(handler(0x44), Handler::Device(second));
    }

    #[test]
    fn dispatch_routes_to_the_registered_device_handler() {
        static FIRED: AtomicBool = AtomicBool::new(false);

        fn mark_fired() {
            FIRED.store(true, Ordering::SeqCst);
        }

        register(0x45, Handler::Device(mark_fired));
        let frame = InterruptStackFrame {
            eip: 0x0010_2040,
            cs: 0x08,
            eflags: 0x0202,
        };
        dispatch(0x45, 0, &frame);
        assert!(FIRED.load(Ordering::SeqCst));
    }

    #[test]
    fn unwired_vectors_have_no_handler() {
        assert_eq!(handler(0x60), Handler::None);
        assert_eq!(handler(3), Handler::Exception);
    }
}
