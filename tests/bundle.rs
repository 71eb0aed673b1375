//! End-to-end bundling against a scripted dependency graph.

use dylib_bundler::{
    bundle_with, BundleConfig, BundleError, BundlingPolicy, LibraryReference, Platform, Relocator,
    SearchContext, SearchPath, TargetPlatform,
};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

/// Stands in for ldd/patchelf: dependencies come from a table keyed by file name.
#[derive(Default)]
struct FakeElf {
    deps: HashMap<String, Vec<String>>,
    search_paths: Mutex<HashMap<PathBuf, String>>,
}

impl FakeElf {
    fn new(edges: &[(&str, &str)]) -> Self {
        let mut deps: HashMap<String, Vec<String>> = HashMap::new();
        for (from, to) in edges {
            deps.entry(from.to_string()).or_default().push(to.to_string());
        }
        Self {
            deps,
            ..Default::default()
        }
    }

    fn search_path_of(&self, path: &Path) -> Option<String> {
        self.search_paths.lock().unwrap().get(path).cloned()
    }
}

impl Platform for FakeElf {
    fn name(&self) -> &'static str {
        "fake-elf"
    }

    fn enumerate(
        &self,
        binary: &Path,
        _context: &SearchContext,
    ) -> Result<Vec<LibraryReference>, BundleError> {
        assert!(binary.is_file(), "enumerated a missing file: {}", binary.display());
        let name = binary.file_name().unwrap().to_string_lossy().into_owned();
        Ok(self
            .deps
            .get(&name)
            .into_iter()
            .flatten()
            .map(|dep| LibraryReference::resolved(dep.as_str(), format!("/usr/lib/{dep}")))
            .collect())
    }

    fn set_search_path(
        &self,
        binary: &Path,
        search_path: SearchPath<'_>,
    ) -> Result<(), BundleError> {
        self.search_paths
            .lock()
            .unwrap()
            .insert(binary.to_path_buf(), dylib_bundler::origin_rpath(search_path));
        Ok(())
    }

    fn default_allow_list(&self) -> &'static [&'static str] {
        &["libruntime.so.1"]
    }

    fn debug_companion(&self, library: &Path) -> Option<PathBuf> {
        let mut name = library.file_name()?.to_os_string();
        name.push(".debug");
        Some(library.with_file_name(name))
    }
}

fn write_config(dir: &Path, extra: &str) -> BundleConfig {
    let path = dir.join("bundle.toml");
    fs::write(
        &path,
        format!(
            concat!(
                "app_name = \"Hello\"\n",
                "identifier = \"com.example.hello\"\n",
                "products_dir = \"products\"\n",
                "output_dir = \"dist\"\n",
                "executables = [\"hello\", \"hello-helper\"]\n",
                "resources = [\"assets\"]\n",
                "{}"
            ),
            extra
        ),
    )
    .unwrap();
    BundleConfig::load(&path).unwrap()
}

fn products(dir: &Path, files: &[&str]) -> PathBuf {
    let products = dir.join("products");
    fs::create_dir_all(&products).unwrap();
    for file in files {
        fs::write(products.join(file), file.as_bytes()).unwrap();
    }
    fs::create_dir_all(dir.join("assets/icons")).unwrap();
    fs::write(dir.join("assets/icons/hello.png"), b"png").unwrap();
    products
}

#[test]
fn test_bundle_copies_closure_and_relocates() {
    let temp = TempDir::new().unwrap();
    products(
        temp.path(),
        &["hello", "hello-helper", "libcore.so", "libcore.so.debug", "libui.so"],
    );
    let vendor = temp.path().join("vendor");
    fs::create_dir_all(&vendor).unwrap();
    fs::write(vendor.join("libruntime.so.1"), b"runtime").unwrap();

    let config = write_config(
        temp.path(),
        "[libraries]\nsearch_paths = [\"vendor\"]\n",
    );
    let platform = FakeElf::new(&[
        ("hello", "libui.so"),
        ("hello", "libc.so.6"),
        ("hello-helper", "libcore.so"),
        ("libui.so", "libcore.so"),
        ("libcore.so", "libruntime.so.1"),
        ("libcore.so", "libui.so"),
    ]);

    let report = bundle_with(&config, TargetPlatform::Linux, &platform).unwrap();
    let layout = &report.layout;
    let lib = &layout.library_dir;

    assert_eq!(layout.executable, temp.path().join("dist/Hello/bin/Hello"));
    assert!(layout.executable.is_file());
    assert!(layout.executable_dir.join("hello-helper").is_file());
    assert!(layout.resources_dir.join("assets/icons/hello.png").is_file());

    for name in ["libui.so", "libcore.so", "libruntime.so.1", "libcore.so.debug"] {
        assert!(lib.join(name).is_file(), "{name} missing from bundle");
    }
    assert!(!lib.join("libc.so.6").exists());
    assert_eq!(fs::read(lib.join("libruntime.so.1")).unwrap(), b"runtime");

    assert_eq!(platform.search_path_of(&lib.join("libcore.so")).as_deref(), Some("$ORIGIN"));
    assert_eq!(
        platform.search_path_of(&layout.executable).as_deref(),
        Some("$ORIGIN/../lib")
    );
    assert_eq!(
        platform
            .search_path_of(&layout.executable_dir.join("hello-helper"))
            .as_deref(),
        Some("$ORIGIN/../lib")
    );

    // Each executable gets a fresh visited set, so libcore.so is copied for both.
    let libcore_copies = report
        .libraries
        .iter()
        .filter(|r| r.destination == lib.join("libcore.so"))
        .count();
    assert_eq!(libcore_copies, 2);
}

#[test]
fn test_bundle_fails_on_unresolvable_allowed_library() {
    let temp = TempDir::new().unwrap();
    products(temp.path(), &["hello", "hello-helper", "libcore.so"]);
    let config = write_config(temp.path(), "");
    // libruntime.so.1 is allow-listed but exists in no search directory.
    let platform = FakeElf::new(&[("hello", "libcore.so"), ("libcore.so", "libruntime.so.1")]);

    let err = bundle_with(&config, TargetPlatform::Linux, &platform).unwrap_err();
    let bundle_err = err
        .downcast_ref::<BundleError>()
        .expect("error chain should carry a BundleError");
    assert!(matches!(
        bundle_err,
        BundleError::UnresolvableLibrary { name, .. } if name == "libruntime.so.1"
    ));
}

#[test]
fn test_missing_executable_is_reported() {
    let temp = TempDir::new().unwrap();
    products(temp.path(), &["hello"]);
    let config = write_config(temp.path(), "");

    let err = bundle_with(&config, TargetPlatform::Linux, &FakeElf::default()).unwrap_err();
    assert!(err.to_string().contains("hello-helper"));
}

#[test]
fn test_independent_relocations_run_in_parallel() {
    let temp = TempDir::new().unwrap();
    let products_dir = products(temp.path(), &["one", "two", "libshared.so"]);
    let platform = FakeElf::new(&[("one", "libshared.so"), ("two", "libshared.so")]);
    let policy =
        BundlingPolicy::new(&platform, &products_dir, Vec::<String>::new(), Vec::new()).unwrap();
    let relocator = Relocator::new(&platform, &policy);

    let bundles: Vec<PathBuf> = ["one", "two"]
        .iter()
        .map(|name| {
            let root = temp.path().join(format!("bundle-{name}"));
            fs::create_dir_all(&root).unwrap();
            fs::copy(products_dir.join(name), root.join(name)).unwrap();
            root
        })
        .collect();

    std::thread::scope(|scope| {
        for (root, name) in bundles.iter().zip(["one", "two"]) {
            let relocator = &relocator;
            scope.spawn(move || {
                let copied = relocator.relocate(&root.join(name), &root.join("lib")).unwrap();
                assert_eq!(copied.len(), 1);
            });
        }
    });

    for root in &bundles {
        assert!(root.join("lib/libshared.so").is_file());
    }
}
