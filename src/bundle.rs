use crate::error::{BlueError, Result};
use crate::interpreter::module::EXTENSION;

use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{self, Command};

use itertools::Itertools;
use tracing::{debug, info, warn};

/// Points at the source tree of this crate; bundled programs build against it.
pub const INSTALL_PATH: &str = "BLUE_INSTALL_PATH";

/// Compiles `script` and every script next to it into a standalone
/// executable. Returns the path of the written binary.
pub fn bundle(script: &Path, output: Option<&Path>) -> Result<PathBuf> {
    let install = env::var_os(INSTALL_PATH)
        .ok_or_else(|| BlueError::Bundle(format!("{} is not set", INSTALL_PATH)))?;
    bundle_with(Path::new(&install), script, output)
}

pub fn bundle_with(install: &Path, script: &Path, output: Option<&Path>) -> Result<PathBuf> {
    if !install.join("Cargo.toml").is_file() {
        return Err(BlueError::Bundle(format!(
            "{} does not contain the interpreter sources",
            install.display()
        )));
    }

    let script = script.canonicalize()?;
    let root = script.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let entry = relative_key(&root, &script)
        .ok_or_else(|| BlueError::Bundle(format!("cannot bundle {}", script.display())))?;
    let name = package_name(&script);

    let scripts = collect_scripts(&root)?;
    debug!(root = %root.display(), scripts = scripts.len(), "collected scripts");

    let workspace = env::temp_dir().join(format!("blue-bundle-{}-{}", process::id(), name));
    fs::create_dir_all(workspace.join("src"))?;
    fs::write(workspace.join("Cargo.toml"), manifest(&name, &install.canonicalize()?))?;
    fs::write(workspace.join("src/main.rs"), entry_point(&entry, &scripts))?;

    info!(workspace = %workspace.display(), "building bundle");
    let status = Command::new(env::var("CARGO").unwrap_or_else(|_| "cargo".to_string()))
        .arg("build")
        .arg("--release")
        .arg("--quiet")
        .current_dir(&workspace)
        .status()?;

    let result = if status.success() {
        let built = workspace
            .join("target/release")
            .join(name.clone() + env::consts::EXE_SUFFIX);
        let output = output.map_or_else(|| PathBuf::from(name + env::consts::EXE_SUFFIX), Path::to_path_buf);
        fs::copy(&built, &output).map(|_| output).map_err(BlueError::from)
    } else {
        Err(BlueError::Bundle(format!("cargo build failed with {}", status)))
    };

    if let Err(error) = fs::remove_dir_all(&workspace) {
        warn!(workspace = %workspace.display(), %error, "cannot remove bundle workspace");
    }

    result
}

/// Every script under `root`, keyed by its `/`-separated relative path.
fn collect_scripts(root: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut scripts = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let hidden = path
                .file_name()
                .and_then(|name| name.to_str())
                .map_or(true, |name| name.starts_with('.') || name == "target");

            if hidden {
                continue;
            }
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == EXTENSION) {
                if let Some(key) = relative_key(root, &path) {
                    scripts.push((key, path));
                }
            }
        }
    }

    scripts.sort();
    Ok(scripts)
}

fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    Some(relative.iter().map(|part| part.to_string_lossy()).join("/"))
}

fn package_name(script: &Path) -> String {
    let stem = script
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default();
    let name: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();

    match name.chars().next() {
        Some(c) if c.is_ascii_alphabetic() => name,
        _ => format!("blue_{}", name),
    }
}

fn manifest(name: &str, install: &Path) -> String {
    format!(
        "[package]\nname = {:?}\nversion = \"0.1.0\"\nedition = \"2021\"\n\n\
         [dependencies]\nblue_lang = {{ path = {:?} }}\n\n[workspace]\n",
        name,
        install.to_string_lossy(),
    )
}

fn entry_point(entry: &str, scripts: &[(String, PathBuf)]) -> String {
    let mut out = String::new();

    out.push_str("static FILES: &[(&str, &str)] = &[\n");
    for (key, path) in scripts {
        // infallible: writing into a String
        let _ = writeln!(out, "    ({:?}, include_str!({:?})),", key, path.to_string_lossy());
    }
    out.push_str("];\n\n");
    out.push_str("fn main() {\n");
    let _ = writeln!(out, "    std::process::exit(blue_lang::run_embedded({:?}, FILES));", entry);
    out.push_str("}\n");

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test]
    fn collects_scripts_recursively() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("util/deep")).unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        for file in ["main.b", "util/strings.b", "util/deep/x.b", "notes.txt", ".git/y.b"] {
            fs::write(dir.path().join(file), "").unwrap();
        }

        let keys: Vec<String> = collect_scripts(dir.path())
            .unwrap()
            .into_iter()
            .map(|(key, _)| key)
            .collect();

        assert_eq!(keys, vec!["main.b", "util/deep/x.b", "util/strings.b"]);
    }

    #[test]
    fn generated_entry_point() {
        let scripts = vec![
            ("main.b".to_string(), PathBuf::from("/src/main.b")),
            ("util/strings.b".to_string(), PathBuf::from("/src/util/strings.b")),
        ];

        assert_eq!(
            entry_point("main.b", &scripts),
            r#"static FILES: &[(&str, &str)] = &[
    ("main.b", include_str!("/src/main.b")),
    ("util/strings.b", include_str!("/src/util/strings.b")),
];

fn main() {
    std::process::exit(blue_lang::run_embedded("main.b", FILES));
}
"#
        );
    }

    #[test_case("hello.b", "hello")]
    #[test_case("My-App.b", "my_app")]
    #[test_case("1st.b", "blue_1st")]
    fn package_names(file: &str, expected: &str) {
        assert_eq!(package_name(Path::new(file)), expected);
    }

    #[test]
    fn install_path_must_hold_sources() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("main.b");
        fs::write(&script, "println(1)").unwrap();

        match bundle_with(dir.path(), &script, None) {
            Err(BlueError::Bundle(message)) => assert!(message.contains("interpreter sources")),
            other => panic!("expected a bundle error, got {:?}", other),
        }
    }
}
