//! Process lifecycle through the syscall interface: exec, join, exit,
//! reparenting and fatal traps.

mod common;

use common::*;
use tkos_kernel::config::DEFAULT_PHYS_PAGES;
use tkos_kernel::machine::{Exception, TrapOutcome};
use tkos_kernel::process::{ProcessId, ProcessState};

const STATUS: u32 = SCRATCH + 0x800;

#[test]
fn test_join_reports_child_status() {
    let h = Harness::inline();
    let log = Log::default();

    let child_log = log.clone();
    h.install("child.coff", move |user| {
        let args = user.args();
        child_log.push(args.len() as i32);
        user.exit(args[1].parse().unwrap());
    });

    let root_log = log.clone();
    h.install("init.coff", move |user| {
        let pid = user.exec(SCRATCH, "child.coff", &["child.coff", "7"]);
        root_log.push(pid);
        let (code, status) = user.join(pid, STATUS);
        root_log.push(code);
        root_log.push(status);

        // Already reaped: no longer a child.
        root_log.push(user.join(pid, STATUS).0);
        root_log.push((user.exit(0) == TrapOutcome::Halt) as i32);
    });

    let root = h.boot("init.coff");
    assert_eq!(root, ProcessId::ROOT);
    assert_eq!(log.values(), [2, 2, 0, 7, -1, 1]);

    assert!(h.kernel.machine().is_halted());
    assert!(h.kernel.process(ProcessId(2)).is_none());
    let root = h.kernel.process(ProcessId::ROOT).unwrap();
    assert_eq!(root.state(), ProcessState::Exited(0));
    assert_eq!(h.kernel.frames().free_count(), DEFAULT_PHYS_PAGES);
}

#[test]
fn test_zombie_kept_until_join() {
    let h = Harness::inline();
    let kernel = h.kernel.clone();
    let log = Log::default();

    h.install("child.coff", |user| {
        user.exit(3);
    });

    let root_log = log.clone();
    h.install("init.coff", move |user| {
        let pid = user.exec(SCRATCH, "child.coff", &["child.coff"]);
        let child = kernel.process(ProcessId(pid as u32)).unwrap();
        root_log.push(matches!(child.state(), ProcessState::Exited(3)) as i32);
        root_log.push(child.frames().len() as i32);

        user.join(pid, STATUS);
        root_log.push(kernel.process(ProcessId(pid as u32)).is_none() as i32);
        root_log.push((child.state() == ProcessState::Reaped) as i32);
        user.exit(0);
    });

    h.boot("init.coff");
    assert_eq!(log.values(), [1, 0, 1, 1]);
}

#[test]
fn test_join_with_bad_status_pointer() {
    let h = Harness::inline();
    let log = Log::default();

    h.install("child.coff", |user| {
        user.exit(9);
    });

    let root_log = log.clone();
    h.install("init.coff", move |user| {
        let pid = user.exec(SCRATCH, "child.coff", &["child.coff"]);
        // Page 0 is read-only text.
        root_log.push(user.syscall(JOIN, &[pid, 0]).unwrap());
        let pid = user.exec(SCRATCH, "child.coff", &["child.coff"]);
        root_log.push(user.syscall(JOIN, &[pid, -4]).unwrap());
        root_log.push(user.syscall(JOIN, &[-1, STATUS as i32]).unwrap());
        user.exit(0);
    });

    h.boot("init.coff");
    assert_eq!(log.values(), [1, 1, -1]);
}

#[test]
fn test_orphans_reparented_to_root() {
    let h = Harness::inline();
    let log = Log::default();

    h.install("leaf.coff", |user| {
        user.exit(5);
    });

    let middle_log = log.clone();
    h.install("middle.coff", move |user| {
        middle_log.push(user.exec(SCRATCH, "leaf.coff", &["leaf.coff"]));
        middle_log.push(user.exec(SCRATCH, "leaf.coff", &["leaf.coff"]));
        user.exit(0);
    });

    let root_log = log.clone();
    h.install("init.coff", move |user| {
        let pid = user.exec(SCRATCH, "middle.coff", &["middle.coff"]);
        user.join(pid, STATUS);
        // Adoption only changes the parent; the root never tracked them.
        root_log.push(user.join(3, STATUS).0);
        user.syscall(HALT, &[]).unwrap_err();
    });

    h.boot("init.coff");
    assert_eq!(log.values(), [3, 4, -1]);

    for pid in [3, 4] {
        let orphan = h.kernel.process(ProcessId(pid)).unwrap();
        assert_eq!(orphan.parent(), ProcessId::ROOT);
        assert_eq!(orphan.exit_status(), Some(5));
    }
    assert!(h.kernel.process(ProcessId::ROOT).unwrap().children().is_empty());
}

#[test]
fn test_unknown_syscall_is_fatal() {
    let h = Harness::inline();
    let log = Log::default();

    h.install("sibling.coff", |user| {
        user.exit(3);
    });

    let bad_log = log.clone();
    h.install("bad.coff", move |user| {
        let outcome = user.syscall(42, &[1, 2, 3, 4]);
        bad_log.push((outcome == Err(TrapOutcome::Terminate)) as i32);
    });

    let root_log = log.clone();
    h.install("init.coff", move |user| {
        let sibling = user.exec(SCRATCH, "sibling.coff", &["sibling.coff"]);
        let bad = user.exec(SCRATCH, "bad.coff", &["bad.coff"]);
        let (code, status) = user.join(bad, STATUS);
        root_log.push(code);
        root_log.push(status);
        root_log.push(sibling);
        user.exit(0);
    });

    h.boot("init.coff");
    assert_eq!(log.values(), [1, 0, -1, 2]);

    let sibling = h.kernel.process(ProcessId(2)).unwrap();
    assert_eq!(sibling.state(), ProcessState::Exited(3));
    assert_eq!(sibling.parent(), ProcessId::ROOT);
    assert_eq!(h.kernel.registry().count(), 2);
}

#[test]
fn test_unexpected_exception_is_fatal() {
    let h = Harness::inline();
    let log = Log::default();

    let faulty_log = log.clone();
    h.install("faulty.coff", move |user| {
        faulty_log.push((user.fault(Exception::PageFault) == TrapOutcome::Terminate) as i32);
    });

    let root_log = log.clone();
    h.install("init.coff", move |user| {
        let pid = user.exec(SCRATCH, "faulty.coff", &["faulty.coff"]);
        root_log.push(user.join(pid, STATUS).1);
        user.exit(0);
    });

    h.boot("init.coff");
    assert_eq!(log.values(), [1, -1]);
}

#[test]
fn test_root_fault_halts_machine() {
    let h = Harness::inline();
    let log = Log::default();

    let root_log = log.clone();
    h.install("init.coff", move |user| {
        root_log.push((user.fault(Exception::IllegalInstruction) == TrapOutcome::Halt) as i32);
    });

    h.boot("init.coff");
    assert_eq!(log.values(), [1]);
    assert!(h.kernel.machine().is_halted());
    let root = h.kernel.process(ProcessId::ROOT).unwrap();
    assert_eq!(root.exit_status(), Some(-1));
}

#[test]
fn test_halt_from_child_terminates_child_only() {
    let h = Harness::inline();
    let kernel = h.kernel.clone();
    let log = Log::default();

    let child_log = log.clone();
    h.install("child.coff", move |user| {
        let outcome = user.syscall(HALT, &[]);
        child_log.push((outcome == Err(TrapOutcome::Terminate)) as i32);
    });

    let root_log = log.clone();
    h.install("init.coff", move |user| {
        let pid = user.exec(SCRATCH, "child.coff", &["child.coff"]);
        root_log.push(kernel.machine().is_halted() as i32);
        root_log.push(user.join(pid, STATUS).1);
        root_log.push((user.syscall(HALT, &[]) == Err(TrapOutcome::Halt)) as i32);
    });

    h.boot("init.coff");
    assert_eq!(log.values(), [1, 0, -1, 1]);
    assert!(h.kernel.machine().is_halted());
}

#[test]
fn test_exec_rejections() {
    let h = Harness::inline();
    let kernel = h.kernel.clone();
    let log = Log::default();

    h.fs.insert("junk.coff", b"not an executable");
    h.fs.insert(
        "huge.coff",
        &tkos_kernel::loader::ImageBuilder::new(0)
            .bss(".bss", 0, (DEFAULT_PHYS_PAGES * 1024) as u32)
            .build(),
    );

    let root_log = log.clone();
    h.install("init.coff", move |user| {
        let free_before = kernel.frames().free_count() as i32;

        root_log.push(user.exec(SCRATCH, "missing.coff", &["missing.coff"]));
        root_log.push(user.exec(SCRATCH, "init.txt", &["init.txt"]));
        root_log.push(user.exec(SCRATCH, "junk.coff", &["junk.coff"]));
        root_log.push(user.exec(SCRATCH, "huge.coff", &["huge.coff"]));

        let name = user.store_str(SCRATCH, "init.coff");
        root_log.push(user.syscall(EXEC, &[name, 0, STATUS as i32]).unwrap());
        root_log.push(user.syscall(EXEC, &[name, 1, -8]).unwrap());
        // argv[0] points outside the address space.
        user.store(STATUS, &0x0100_0000u32.to_le_bytes());
        root_log.push(user.syscall(EXEC, &[name, 1, STATUS as i32]).unwrap());
        root_log.push(user.syscall(EXEC, &[-1, 1, STATUS as i32]).unwrap());

        let root = kernel.process(ProcessId::ROOT).unwrap();
        root_log.push(root.children().len() as i32);
        root_log.push(kernel.registry().count() as i32);
        root_log.push(kernel.frames().free_count() as i32 - free_before);
        user.exit(0);
    });

    h.boot("init.coff");
    assert_eq!(log.values(), [-1, -1, -1, -1, -1, -1, -1, -1, 0, 1, 0]);
}

#[test]
fn test_arguments_too_long() {
    let h = Harness::inline();
    let log = Log::default();

    h.install("child.coff", |user| {
        user.exit(0);
    });

    let root_log = log.clone();
    h.install("init.coff", move |user| {
        let long = "x".repeat(200);
        let args: Vec<&str> = std::iter::once("child.coff")
            .chain(std::iter::repeat(long.as_str()).take(5))
            .collect();
        root_log.push(user.exec(SCRATCH, "child.coff", &args));
        root_log.push((user.exec(SCRATCH, "child.coff", &args[..4]) > 0) as i32);
        user.exit(0);
    });

    h.boot("init.coff");
    assert_eq!(log.values(), [-1, 1]);
}

#[test]
fn test_exec_argument_length_limit() {
    let h = Harness::inline();
    let log = Log::default();

    let child_log = log.clone();
    h.install("child.coff", move |user| {
        child_log.push(user.args()[1].len() as i32);
        user.exit(0);
    });

    let root_log = log.clone();
    h.install("init.coff", move |user| {
        let fits = "a".repeat(255);
        let pid = user.exec(SCRATCH, "child.coff", &["child.coff", &fits]);
        root_log.push((pid > 0) as i32);
        user.join(pid, SCRATCH + 0x800);

        let too_long = "a".repeat(256);
        root_log.push(user.exec(SCRATCH, "child.coff", &["child.coff", &too_long]));
        let far_too_long = "a".repeat(300);
        root_log.push(user.exec(SCRATCH, "child.coff", &["child.coff", &far_too_long]));
        user.exit(0);
    });

    h.boot("init.coff");
    assert_eq!(log.values(), [255, 1, -1, -1]);
}

#[test]
fn test_program_without_exit() {
    let h = Harness::inline();
    let log = Log::default();

    h.install("child.coff", |_user| {});

    let root_log = log.clone();
    h.install("init.coff", move |user| {
        let pid = user.exec(SCRATCH, "child.coff", &["child.coff"]);
        root_log.push(user.join(pid, STATUS).1);
        user.exit(0);
    });

    h.boot("init.coff");
    assert_eq!(log.values(), [0]);
}

#[test]
fn test_boot_once() {
    let h = Harness::inline();
    h.install("init.coff", |user| {
        user.exit(0);
    });

    h.boot("init.coff");
    assert!(h.kernel.boot("init.coff", &[]).is_err());
}

#[test]
fn test_boot_missing_image() {
    let h = Harness::inline();
    let err = h.kernel.boot("nothing.coff", &["nothing.coff".to_string()]);
    assert!(err.is_err());
    assert_eq!(h.kernel.registry().count(), 0);
    assert_eq!(h.kernel.frames().free_count(), DEFAULT_PHYS_PAGES);
}

#[test]
fn test_exec_without_execution_context() {
    let h = Harness::new(std::sync::Arc::new(NoContexts));
    h.install("init.coff", |user| {
        user.exit(0);
    });

    assert!(h.kernel.boot("init.coff", &["init.coff".to_string()]).is_err());
    assert_eq!(h.kernel.registry().count(), 0);
    assert_eq!(h.kernel.frames().free_count(), DEFAULT_PHYS_PAGES);
}

#[test]
fn test_registers_at_entry() {
    use tkos_kernel::config::{PAGE_SIZE, STACK_PAGES};
    use tkos_kernel::machine::processor::{REG_A0, REG_A1, REG_SP};

    let h = Harness::inline();
    let log = Log::default();

    let root_log = log.clone();
    h.install("init.coff", move |user| {
        root_log.push(user.register(REG_A0));
        root_log.push(user.register(REG_A1));
        root_log.push(user.register(REG_SP));
        root_log.push(user.args().len() as i32);
        user.exit(0);
    });

    h.kernel
        .boot("init.coff", &["init.coff".to_string(), "-v".to_string()])
        .unwrap();
    let top = ((1 + STACK_PAGES) * PAGE_SIZE) as i32;
    assert_eq!(log.values(), [2, top, top, 2]);
}
