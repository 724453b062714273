use once_cell::sync::OnceCell;

/// Read-only tree of source files compiled into the binary.
pub trait Files: Sync {
    fn read(&self, path: &str) -> Option<&'static str>;
    fn paths(&self) -> Vec<&'static str>;
}

pub struct EmbeddedFiles {
    files: &'static [(&'static str, &'static str)],
}

impl EmbeddedFiles {
    pub const fn new(files: &'static [(&'static str, &'static str)]) -> EmbeddedFiles {
        EmbeddedFiles { files }
    }
}

impl Files for EmbeddedFiles {
    fn read(&self, path: &str) -> Option<&'static str> {
        let path = path.trim_start_matches("./");
        self.files
            .iter()
            .find(|(name, _)| *name == path)
            .map(|(_, source)| *source)
    }

    fn paths(&self) -> Vec<&'static str> {
        self.files.iter().map(|(name, _)| *name).collect()
    }
}

/// Scripts of the standard library modules.
pub static STDLIB: EmbeddedFiles = EmbeddedFiles::new(&[
    ("math.b", include_str!("stdlib/math.b")),
    ("os.b", include_str!("stdlib/os.b")),
    ("time.b", include_str!("stdlib/time.b")),
]);

static BUNDLE: OnceCell<EmbeddedFiles> = OnceCell::new();

/// Installs the files of a bundled program; only the first call wins.
pub fn install_bundle(files: &'static [(&'static str, &'static str)]) -> bool {
    BUNDLE.set(EmbeddedFiles::new(files)).is_ok()
}

/// True when running as a bundled executable; imports then read from the
/// bundle instead of the file system.
pub fn is_embed() -> bool {
    BUNDLE.get().is_some()
}

pub fn bundle() -> Option<&'static dyn Files> {
    BUNDLE.get().map(|files| files as &dyn Files)
}
