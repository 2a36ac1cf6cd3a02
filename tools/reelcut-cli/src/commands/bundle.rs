//! Pack a manifest and its payload into a sample bundle.

use std::path::PathBuf;

use reelcut_render_engine::bundle::{encode_bundle, load_manifest};

pub fn run(manifest: PathBuf, output: PathBuf) -> anyhow::Result<()> {
    let source =
        load_manifest(&manifest).map_err(|e| anyhow::anyhow!("Failed to load manifest: {e}"))?;
    let bundle = encode_bundle(&source)?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&output, &bundle)?;

    tracing::info!(output = %output.display(), bytes = bundle.len(), "Bundle written");
    println!("Wrote {} ({} bytes)", output.display(), bundle.len());
    Ok(())
}
