#![allow(non_camel_case_types)]
#![allow(non_upper_case_globals)]
#![allow(clippy::upper_case_acronyms)]

use enum_primitive_derive::Primitive;

/// Mach exception types reported in Apple crash diagnostics
///
/// Based on Darwin's mach/exception_types.h. This is what Apple calls an "exception",
/// not a "code".
#[repr(u32)]
#[derive(Copy, Clone, PartialEq, Eq, Debug, Primitive)]
pub enum ExceptionCodeMac {
    /// code can be a kern_return_t
    EXC_BAD_ACCESS = 1,
    /// code is CPU-specific
    EXC_BAD_INSTRUCTION = 2,
    /// code is CPU-specific
    EXC_ARITHMETIC = 3,
    /// code is CPU-specific
    EXC_EMULATION = 4,
    EXC_SOFTWARE = 5,
    /// code is CPU-specific
    EXC_BREAKPOINT = 6,
    EXC_SYSCALL = 7,
    EXC_MACH_SYSCALL = 8,
    EXC_RPC_ALERT = 9,
    /// Abnormal process exit. Watchdog terminations are reported with this type.
    EXC_CRASH = 10,
    EXC_RESOURCE = 11,
    EXC_GUARD = 12,
    EXC_CORPSE_NOTIFY = 13,
}

impl ExceptionCodeMac {
    /// The name Apple uses for this exception type, e.g. `EXC_BAD_ACCESS`.
    pub fn name(self) -> &'static str {
        use ExceptionCodeMac::*;
        match self {
            EXC_BAD_ACCESS => "EXC_BAD_ACCESS",
            EXC_BAD_INSTRUCTION => "EXC_BAD_INSTRUCTION",
            EXC_ARITHMETIC => "EXC_ARITHMETIC",
            EXC_EMULATION => "EXC_EMULATION",
            EXC_SOFTWARE => "EXC_SOFTWARE",
            EXC_BREAKPOINT => "EXC_BREAKPOINT",
            EXC_SYSCALL => "EXC_SYSCALL",
            EXC_MACH_SYSCALL => "EXC_MACH_SYSCALL",
            EXC_RPC_ALERT => "EXC_RPC_ALERT",
            EXC_CRASH => "EXC_CRASH",
            EXC_RESOURCE => "EXC_RESOURCE",
            EXC_GUARD => "EXC_GUARD",
            EXC_CORPSE_NOTIFY => "EXC_CORPSE_NOTIFY",
        }
    }
}

/// Signal numbers on Darwin (iOS, macOS)
///
/// From sys/signal.h. These differ from Linux above `SIGTRAP`, see
/// [`SignalLinux`](crate::SignalLinux).
#[repr(u32)]
#[derive(Copy, Clone, PartialEq, Eq, Debug, Primitive)]
pub enum SignalMac {
    SIGHUP = 1,
    SIGINT = 2,
    SIGQUIT = 3,
    SIGILL = 4,
    SIGTRAP = 5,
    SIGABRT = 6,
    SIGEMT = 7,
    SIGFPE = 8,
    SIGKILL = 9,
    SIGBUS = 10,
    SIGSEGV = 11,
    SIGSYS = 12,
    SIGPIPE = 13,
    SIGALRM = 14,
    SIGTERM = 15,
    SIGURG = 16,
    SIGSTOP = 17,
    SIGTSTP = 18,
    SIGCONT = 19,
    SIGCHLD = 20,
    SIGTTIN = 21,
    SIGTTOU = 22,
    SIGIO = 23,
    SIGXCPU = 24,
    SIGXFSZ = 25,
    SIGVTALRM = 26,
    SIGPROF = 27,
    SIGWINCH = 28,
    SIGINFO = 29,
    SIGUSR1 = 30,
    SIGUSR2 = 31,
}

impl SignalMac {
    pub fn name(self) -> &'static str {
        use SignalMac::*;
        match self {
            SIGHUP => "SIGHUP",
            SIGINT => "SIGINT",
            SIGQUIT => "SIGQUIT",
            SIGILL => "SIGILL",
            SIGTRAP => "SIGTRAP",
            SIGABRT => "SIGABRT",
            SIGEMT => "SIGEMT",
            SIGFPE => "SIGFPE",
            SIGKILL => "SIGKILL",
            SIGBUS => "SIGBUS",
            SIGSEGV => "SIGSEGV",
            SIGSYS => "SIGSYS",
            SIGPIPE => "SIGPIPE",
            SIGALRM => "SIGALRM",
            SIGTERM => "SIGTERM",
            SIGURG => "SIGURG",
            SIGSTOP => "SIGSTOP",
            SIGTSTP => "SIGTSTP",
            SIGCONT => "SIGCONT",
            SIGCHLD => "SIGCHLD",
            SIGTTIN => "SIGTTIN",
            SIGTTOU => "SIGTTOU",
            SIGIO => "SIGIO",
            SIGXCPU => "SIGXCPU",
            SIGXFSZ => "SIGXFSZ",
            SIGVTALRM => "SIGVTALRM",
            SIGPROF => "SIGPROF",
            SIGWINCH => "SIGWINCH",
            SIGINFO => "SIGINFO",
            SIGUSR1 => "SIGUSR1",
            SIGUSR2 => "SIGUSR2",
        }
    }

    /// The `strsignal(3)` text for this signal.
    pub fn description(self) -> &'static str {
        use SignalMac::*;
        match self {
            SIGHUP => "Hangup",
            SIGINT => "Interrupt",
            SIGQUIT => "Quit",
            SIGILL => "Illegal instruction",
            SIGTRAP => "Trace/BPT trap",
            SIGABRT => "Abort trap",
            SIGEMT => "EMT trap",
            SIGFPE => "Floating point exception",
            SIGKILL => "Killed",
            SIGBUS => "Bus error",
            SIGSEGV => "Segmentation fault",
            SIGSYS => "Bad system call",
            SIGPIPE => "Broken pipe",
            SIGALRM => "Alarm clock",
            SIGTERM => "Terminated",
            SIGURG => "Urgent I/O condition",
            SIGSTOP => "Suspended (signal)",
            SIGTSTP => "Suspended",
            SIGCONT => "Continued",
            SIGCHLD => "Child exited",
            SIGTTIN => "Stopped (tty input)",
            SIGTTOU => "Stopped (tty output)",
            SIGIO => "I/O possible",
            SIGXCPU => "Cputime limit exceeded",
            SIGXFSZ => "Filesize limit exceeded",
            SIGVTALRM => "Virtual timer expired",
            SIGPROF => "Profiling timer expired",
            SIGWINCH => "Window size changes",
            SIGINFO => "Information request",
            SIGUSR1 => "User defined signal 1",
            SIGUSR2 => "User defined signal 2",
        }
    }
}
