//! Executes installed trampolines on the host.

#![cfg(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "aarch64")))]

use std::sync::Arc;

use stublink::install::ExecutableMemory;
use stublink::library::{LibraryLoader, NativeLibraries, NativeLibrary, PROCESS_IMAGE};
use stublink::metadata::{CodeDirective, HeapLayout, LinkDirective, ParamType, StubClass, StubMethod};
use stublink::platform::{current_arch, current_os};
use stublink::{LinkError, Linker};

extern "C" fn native_add(a: i32, b: i32) -> i32 {
    a + b
}

struct TestExports;

impl NativeLibrary for TestExports {
    fn symbol(&self, name: &str) -> Option<u64> {
        (name == "native_add").then_some(native_add as usize as u64)
    }
}

struct NoLoader;

impl LibraryLoader for NoLoader {
    fn load(&self, name: &str) -> stublink::Result<Arc<dyn NativeLibrary>> {
        Err(LinkError::LibraryLoad {
            name: name.to_string(),
            reason: "disabled".to_string(),
        })
    }
}

fn linker() -> Linker<ExecutableMemory> {
    let libs = Arc::new(NativeLibraries::new(Box::new(NoLoader)));
    libs.register("test", Arc::new(TestExports));
    Linker::with_platform(
        current_os(),
        current_arch(),
        libs,
        Box::new(HeapLayout::default()),
        ExecutableMemory::new(),
    )
    .unwrap()
}

#[test]
fn literal_return_runs() {
    let linker = linker();
    let method = StubMethod::new("noop")
        .param(ParamType::ObjectArray("String".into()))
        .code(CodeDirective::new("c3").on(None, Some(stublink::platform::Arch::Amd64)))
        .code(CodeDirective::new("c0 03 5f d6").on(None, Some(stublink::platform::Arch::AArch64)));
    linker.link_method(&StubClass::new("Stubs"), &method).unwrap();

    let entry = linker.installer().entry("noop").unwrap();
    let noop: extern "C" fn() = unsafe { std::mem::transmute(entry) };
    noop();
}

#[test]
fn links_getpid_from_process_image() {
    let libs = NativeLibraries::global();
    assert!(libs.is_loaded(PROCESS_IMAGE));

    let linker = Linker::new(ExecutableMemory::new()).unwrap();
    linker.link_method(&StubClass::new("Libc"), &StubMethod::new("getpid")).unwrap();

    let entry = linker.installer().entry("getpid").unwrap();
    let getpid: extern "C" fn() -> i32 = unsafe { std::mem::transmute(entry) };
    assert_eq!(getpid() as u32, std::process::id());
}

#[test]
fn managed_call_reaches_native_add() {
    let linker = linker();
    let method = StubMethod::new("add")
        .param(ParamType::Int)
        .param(ParamType::Int)
        .link(LinkDirective::named("native_add"));
    linker.link_method(&StubClass::new("Math"), &method).unwrap();

    let entry = linker.installer().entry("add").unwrap();
    assert_eq!(call_managed(entry, 10, 32), 42);
}

/// Calls `entry` with two integer arguments in the managed convention's registers.
#[cfg(target_arch = "x86_64")]
fn call_managed(entry: *const u8, a: i64, b: i64) -> i64 {
    let result: i64;
    unsafe {
        std::arch::asm!(
            "call {f}",
            f = in(reg) entry,
            in("rsi") a,
            in("rdx") b,
            lateout("rax") result,
            clobber_abi("C"),
        );
    }
    result as i32 as i64
}

#[cfg(target_arch = "aarch64")]
fn call_managed(entry: *const u8, a: i64, b: i64) -> i64 {
    let result: i64;
    unsafe {
        std::arch::asm!(
            "blr {f}",
            f = in(reg) entry,
            in("x1") a,
            in("x2") b,
            lateout("x0") result,
            clobber_abi("C"),
        );
    }
    result as i32 as i64
}
