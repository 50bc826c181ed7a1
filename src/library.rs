//! Native library loading.
//!
//! Libraries are loaded at most once per name for the life of the process and are never
//! unloaded, since installed trampolines jump straight into their code.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::ffi::c_void;
use std::sync::{Arc, LazyLock};
use tracing::{info, warn};

use crate::error::{LinkError, Result};

/// A loaded shared object that exported symbols can be looked up in.
pub trait NativeLibrary: Send + Sync {
    /// Absolute address of `name`, or `None` if this library does not export it.
    fn symbol(&self, name: &str) -> Option<u64>;
}

/// Loads a library by bare name or by path.
pub trait LibraryLoader: Send + Sync {
    fn load(&self, name: &str) -> Result<Arc<dyn NativeLibrary>>;
}

/// Name under which the running executable's own image is registered.
pub const PROCESS_IMAGE: &str = "<process>";

/// Process-wide registry of loaded libraries, searched in load order.
///
/// Each requested name owns a slot. The map only hands slots out; the load itself runs
/// under the slot's own lock, so loads of different names never wait on each other while
/// callers racing on the same name wait for the one load in flight.
pub struct NativeLibraries {
    loader: Box<dyn LibraryLoader>,
    loaded: DashMap<String, Arc<Slot>>,
    search_order: RwLock<Vec<Arc<dyn NativeLibrary>>>,
}

#[derive(Default)]
struct Slot(Mutex<Option<Arc<dyn NativeLibrary>>>);

impl NativeLibraries {
    pub fn new(loader: Box<dyn LibraryLoader>) -> Self {
        Self {
            loader,
            loaded: DashMap::new(),
            search_order: RwLock::new(Vec::new()),
        }
    }

    /// The shared registry, backed by the platform dynamic loader and seeded with the
    /// running process image.
    pub fn global() -> Arc<NativeLibraries> {
        static GLOBAL: LazyLock<Arc<NativeLibraries>> = LazyLock::new(|| {
            let libraries = NativeLibraries::new(Box::new(DynamicLoader));
            match DynamicLoader::process_image() {
                Ok(image) => libraries.register(PROCESS_IMAGE, image),
                Err(e) => warn!("process image is not searchable: {}", e),
            }
            Arc::new(libraries)
        });
        Arc::clone(&GLOBAL)
    }

    fn slot(&self, name: &str) -> Arc<Slot> {
        // the shard guard is released at the end of this statement
        let slot = Arc::clone(self.loaded.entry(name.to_string()).or_default().value());
        slot
    }

    /// Loads `name` unless a library of that name is already loaded.
    ///
    /// Returns whether a load actually happened. A failed load leaves the name unloaded,
    /// so a later call tries again.
    pub fn load(&self, name: &str) -> Result<bool> {
        let slot = self.slot(name);
        let mut library = slot.0.lock();
        if library.is_some() {
            return Ok(false);
        }

        let loaded = self.loader.load(name)?;
        self.search_order.write().push(Arc::clone(&loaded));
        *library = Some(loaded);
        info!(library = name, "loaded native library");
        Ok(true)
    }

    /// Adds an already opened library under `name`. Does nothing if the name is taken.
    pub fn register(&self, name: &str, library: Arc<dyn NativeLibrary>) {
        let slot = self.slot(name);
        let mut current = slot.0.lock();
        if current.is_none() {
            self.search_order.write().push(Arc::clone(&library));
            *current = Some(library);
        }
    }

    /// Whether `name` is loaded. Waits for a load of that name still in flight.
    pub fn is_loaded(&self, name: &str) -> bool {
        let slot = match self.loaded.get(name) {
            Some(slot) => Arc::clone(slot.value()),
            None => return false,
        };
        let loaded = slot.0.lock().is_some();
        loaded
    }

    /// First non-null address of `symbol` across loaded libraries.
    pub fn find(&self, symbol: &str) -> Option<u64> {
        self.search_order
            .read()
            .iter()
            .filter_map(|lib| lib.symbol(symbol))
            .find(|&addr| addr != 0)
    }
}

/// [`LibraryLoader`] over the platform dynamic loader.
pub struct DynamicLoader;

impl DynamicLoader {
    /// The running executable together with everything it links against.
    pub fn process_image() -> Result<Arc<dyn NativeLibrary>> {
        #[cfg(unix)]
        let lib = libloading::Library::from(libloading::os::unix::Library::this());
        #[cfg(windows)]
        let lib = libloading::os::windows::Library::this()
            .map(libloading::Library::from)
            .map_err(|e| LinkError::LibraryLoad {
                name: PROCESS_IMAGE.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Arc::new(DynamicLibrary { lib }))
    }
}

/// Names with a path separator are opened as paths; bare names are mapped to the platform's
/// file name convention and looked up on the system search path.
pub fn library_path(name: &str) -> std::ffi::OsString {
    if name.contains('/') || name.contains('\\') {
        name.into()
    } else {
        libloading::library_filename(name)
    }
}

impl LibraryLoader for DynamicLoader {
    fn load(&self, name: &str) -> Result<Arc<dyn NativeLibrary>> {
        let path = library_path(name);
        let lib = unsafe { libloading::Library::new(&path) }.map_err(|e| LinkError::LibraryLoad {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Arc::new(DynamicLibrary { lib }))
    }
}

struct DynamicLibrary {
    lib: libloading::Library,
}

impl NativeLibrary for DynamicLibrary {
    fn symbol(&self, name: &str) -> Option<u64> {
        let sym = unsafe { self.lib.get::<*const c_void>(name.as_bytes()) }.ok()?;
        Some(*sym as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    struct Table(HashMap<&'static str, u64>);

    impl NativeLibrary for Table {
        fn symbol(&self, name: &str) -> Option<u64> {
            self.0.get(name).copied()
        }
    }

    #[derive(Default)]
    struct CountingLoader {
        loads: Arc<AtomicUsize>,
    }

    impl LibraryLoader for CountingLoader {
        fn load(&self, name: &str) -> Result<Arc<dyn NativeLibrary>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if name == "missing" {
                return Err(LinkError::LibraryLoad {
                    name: name.into(),
                    reason: "not found".into(),
                });
            }
            Ok(Arc::new(Table(HashMap::from([("shared", 0x1000), (name_leak(name), 0x2000)]))))
        }
    }

    fn name_leak(name: &str) -> &'static str {
        Box::leak(format!("{}_fn", name).into_boxed_str())
    }

    #[test]
    fn loads_each_name_once() {
        let loader = CountingLoader::default();
        let loads = Arc::clone(&loader.loads);
        let libs = NativeLibraries::new(Box::new(loader));

        assert!(libs.load("a").unwrap());
        assert!(!libs.load("a").unwrap());
        assert!(libs.load("b").unwrap());
        assert_eq!(loads.load(Ordering::SeqCst), 2);
        assert!(libs.is_loaded("a"));
    }

    #[test]
    fn failed_load_is_not_recorded() {
        let loader = CountingLoader::default();
        let loads = Arc::clone(&loader.loads);
        let libs = NativeLibraries::new(Box::new(loader));

        assert!(libs.load("missing").is_err());
        assert!(!libs.is_loaded("missing"));
        assert!(libs.load("missing").is_err());
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn searches_in_load_order() {
        let libs = NativeLibraries::new(Box::new(CountingLoader::default()));
        libs.register("zero", Arc::new(Table(HashMap::from([("shared", 0)]))));
        libs.load("first").unwrap();
        libs.load("second").unwrap();

        assert_eq!(libs.find("shared"), Some(0x1000));
        assert_eq!(libs.find("second_fn"), Some(0x2000));
        assert_eq!(libs.find("nothing"), None);
    }

    #[test]
    fn concurrent_first_touch_loads_once() {
        let loader = CountingLoader::default();
        let loads = Arc::clone(&loader.loads);
        let libs = Arc::new(NativeLibraries::new(Box::new(loader)));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let libs = Arc::clone(&libs);
                std::thread::spawn(move || libs.load("crypto").unwrap())
            })
            .collect();
        let fresh = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&loaded| loaded)
            .count();

        assert_eq!(fresh, 1);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    /// Blocks the load of "slow" until released or until a deadline passes.
    struct GatedLoader {
        entered: Arc<AtomicBool>,
        released: Arc<AtomicBool>,
        timed_out: Arc<AtomicBool>,
    }

    impl LibraryLoader for GatedLoader {
        fn load(&self, name: &str) -> Result<Arc<dyn NativeLibrary>> {
            if name == "slow" {
                self.entered.store(true, Ordering::SeqCst);
                let deadline = Instant::now() + Duration::from_secs(5);
                while !self.released.load(Ordering::SeqCst) {
                    if Instant::now() > deadline {
                        self.timed_out.store(true, Ordering::SeqCst);
                        break;
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
            Ok(Arc::new(Table(HashMap::new())))
        }
    }

    #[test]
    fn slow_load_does_not_block_other_names() {
        let entered = Arc::new(AtomicBool::new(false));
        let released = Arc::new(AtomicBool::new(false));
        let timed_out = Arc::new(AtomicBool::new(false));
        let libs = Arc::new(NativeLibraries::new(Box::new(GatedLoader {
            entered: Arc::clone(&entered),
            released: Arc::clone(&released),
            timed_out: Arc::clone(&timed_out),
        })));

        let slow = {
            let libs = Arc::clone(&libs);
            std::thread::spawn(move || libs.load("slow").unwrap())
        };
        while !entered.load(Ordering::SeqCst) {
            std::thread::yield_now();
        }

        // every shard gets hit at least once while "slow" is still loading
        for i in 0..256 {
            assert!(libs.load(&format!("lib{}", i)).unwrap());
        }
        released.store(true, Ordering::SeqCst);

        assert!(slow.join().unwrap());
        assert!(!timed_out.load(Ordering::SeqCst));
        assert!(libs.is_loaded("slow"));
        assert!(libs.is_loaded("lib255"));
    }

    #[test]
    fn bare_names_follow_platform_convention() {
        assert_eq!(library_path("/usr/lib/libfoo.so"), "/usr/lib/libfoo.so");
        assert_eq!(library_path("crypto"), libloading::library_filename("crypto"));
    }

    #[cfg(unix)]
    #[test]
    fn process_image_exports_libc() {
        let image = DynamicLoader::process_image().unwrap();
        assert!(image.symbol("getpid").is_some_and(|addr| addr != 0));
        assert!(image.symbol("definitely_not_a_symbol_42").is_none());
    }
}
