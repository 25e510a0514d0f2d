//! Interrupt-flag control and CPU idling.
//!
//! The nested disable/enable pair lets a caller suppress delivery for a
//! critical section and afterwards restore whatever state it found, so
//! sections can nest without a caller accidentally re-enabling interrupts
//! inside an outer critical section.

#[cfg(target_arch = "x86")]
mod imp {
    use core::arch::asm;

    /// Checks the IF bit in EFLAGS.
    #[inline]
    pub fn is_int_enabled() -> bool {
        let eflags: u32;
        unsafe { asm!("pushfd; pop {}", out(reg) eflags, options(nomem, preserves_flags)) };
        eflags & (1 << 9) != 0
    }

    /// Sets the IF bit.
    #[inline]
    pub fn enable_int() {
        unsafe { x86::irq::enable() };
    }

    /// Clears the IF bit.
    #[inline]
    pub fn disable_int() {
        unsafe { x86::irq::disable() };
    }

    /// Stops the CPU until the next interrupt wakes it.
    #[inline]
    pub fn wait_for_interrupt() {
        unsafe { x86::halt() };
    }
}

// Host stand-in used by unit tests: the flag is modelled per thread so the
// guard discipline around table writes stays observable.
#[cfg(all(not(target_arch = "x86"), test))]
mod imp {
    use core::cell::Cell;

    std::thread_local! {
        static INT_ENABLED: Cell<bool> = Cell::new(false);
    }

    pub fn is_int_enabled() -> bool {
        INT_ENABLED.with(|flag| flag.get())
    }

    pub fn enable_int() {
        INT_ENABLED.with(|flag| flag.set(true));
    }

    pub fn disable_int() {
        INT_ENABLED.with(|flag| flag.set(false));
    }

    pub fn wait_for_interrupt() {
        core::hint::spin_loop();
    }
}

// Host stand-in for non-test builds on other architectures, so the crate
// still compiles where the real instructions do not exist.
#[cfg(all(not(target_arch = "x86"), not(test)))]
mod imp {
    use core::sync::atomic::{AtomicBool, Ordering};

    static INT_ENABLED: AtomicBool = AtomicBool::new(false);

    pub fn is_int_enabled() -> bool {
        INT_ENABLED.load(Ordering::SeqCst)
    }

    pub fn enable_int() {
        INT_ENABLED.store(true, Ordering::SeqCst);
    }

    pub fn disable_int() {
        INT_ENABLED.store(false, Ordering::SeqCst);
    }

    pub fn wait_for_interrupt() {
        core::hint::spin_loop();
    }
}

pub use imp::{disable_int, enable_int, is_int_enabled, wait_for_interrupt};

/// Clears the IF bit and returns whether it was set before.
#[inline]
pub fn disable_int_nested() -> bool {
    let was_enabled = is_int_enabled();
    disable_int();
    was_enabled
}

/// Sets the IF bit again, but only if [`disable_int_nested`] found it set.
#[inline]
pub fn enable_int_nested(was_enabled: bool) {
    if was_enabled {
        enable_int();
    }
}

/// Stops the CPU for good. An interrupt may still wake the core, so loop.
pub fn halt() -> ! {
    loop {
        wait_for_interrupt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_disable_restores_prior_state() {
        enable_int();
        let was_enabled = disable_int_nested();
        assert!(was_enabled);
        assert!(!is_int_enabled());
        enable_int_nested(was_enabled);
        assert!(is_int_enabled());

        disable_int();
        let was_enabled = disable_int_nested();
        assert!(!was_enabled);
        enable_int_nested(was_enabled);
        assert!(!is_int_enabled());
    }
}
