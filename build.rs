use std::env;
use std::fs;
use std::path::{Path, PathBuf};

fn main() {
    // Copy the catalog and config next to the executable
    let Some(target_dir) = target_dir() else {
        println!("cargo:warning=could not locate target directory, skipping resource copy");
        return;
    };
    copy_resources(&target_dir);
    copy_config(&target_dir);
}

/// OUT_DIR is target/<profile>/build/deckscan-<hash>/out; the executable
/// lives three levels up.
fn target_dir() -> Option<PathBuf> {
    let out_dir = env::var("OUT_DIR").ok()?;
    Path::new(&out_dir).ancestors().nth(3).map(Path::to_path_buf)
}

fn copy_resources(target_dir: &Path) {
    let src = Path::new("resources");
    if src.exists() {
        copy_dir_recursive(src, &target_dir.join("resources"));
        println!("cargo:rerun-if-changed=resources/");
    }
}

fn copy_dir_recursive(src: &Path, dst: &Path) {
    let _ = fs::create_dir_all(dst);

    let Ok(entries) = fs::read_dir(src) else {
        return;
    };
    for entry in entries.flatten() {
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        if src_path.is_dir() {
            copy_dir_recursive(&src_path, &dst_path);
        } else {
            let _ = fs::copy(&src_path, &dst_path);
        }
    }
}

fn copy_config(target_dir: &Path) {
    let src = Path::new("config.json");
    if src.exists() {
        let _ = fs::copy(src, target_dir.join("config.json"));
        println!("cargo:rerun-if-changed=config.json");
    }
}
