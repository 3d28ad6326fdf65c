//! Kernel-to-kernel context switch and the trap-return trampoline.
//!
//! `swtch` saves the four callee-saved registers and the return address
//! on the old stack, switches `esp`, and restores the same four
//! registers from the new stack before returning -- the new stack's
//! saved return address is what actually gets jumped to, which is how a
//! freshly created process's `Context.eip = forkret` takes effect the
//! first time it is switched into. `trapret` is the matching return path
//! out of the kernel on a ring-3 transition: it pops the `Trapframe`
//! fields pushed by the trap-entry stub and `iret`s to user mode.

core::arch::global_asm!(
    r#"
.global swtch
swtch:
    mov eax, [esp+4]
    mov edx, [esp+8]

    push ebp
    push ebx
    push esi
    push edi

    mov [eax], esp

    mov esp, edx
    pop edi
    pop esi
    pop ebx
    pop ebp
    ret

.global trapret
trapret:
    pop gs
    pop fs
    pop es
    pop ds
    popad
    add esp, 8
    iretd
"#
);

extern "C" {
    /// Save the current callee-saved registers and stack pointer into
    /// `*old`, then load callee-saved registers and stack pointer from
    /// `*new` and return into whatever `new.eip` points at.
    pub fn swtch(old: *mut crate::process::process::Context, new: *const crate::process::process::Context);

    /// Pop a `Trapframe` off the current stack and `iret` to user mode.
    /// The first time a freshly forked process's kernel stack is used,
    /// control reaches here straight out of `forkret` via the fake return
    /// address laid down at process-creation time.
    pub fn trapret();
}
