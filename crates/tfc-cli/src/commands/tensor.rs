//! Create-tensor command - build the input tensor and verify it.

use console::style;
use tfc_core::demos;

use super::GlobalOptions;

pub fn run(options: &GlobalOptions) -> anyhow::Result<()> {
    let config = options.load_config()?;
    let snapshot = demos::create_tensor(&config)?;

    println!(
        "{} Success create tensor: {} {:?}, {} bytes",
        style("✓").green(),
        snapshot.dtype,
        snapshot.dims,
        snapshot.byte_size
    );
    Ok(())
}
