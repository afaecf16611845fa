use std::{env, fs, io, path::PathBuf};

// Copies the SDL files under `schemas/` into OUT_DIR so the crate can embed
// them with `include_str!(concat!(env!("OUT_SCHEMAS"), ...))`.
fn main() -> io::Result<()> {
    println!("cargo:rerun-if-changed=schemas");

    let out_dir = PathBuf::from(env::var("OUT_DIR").map_err(io::Error::other)?);
    let out_schemas = out_dir.join("schemas");
    println!("cargo:rustc-env=OUT_SCHEMAS={}", out_schemas.display());
    fs::create_dir_all(&out_schemas)?;

    for entry in fs::read_dir("schemas")? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "graphql") {
            if let Some(file_name) = path.file_name() {
                fs::copy(&path, out_schemas.join(file_name))?;
            }
        }
    }

    Ok(())
}
