//! Version command - print the runtime version.

use tfc_core::demos;

use super::GlobalOptions;

pub fn run(options: &GlobalOptions) -> anyhow::Result<()> {
    let config = options.load_config()?;
    let version = demos::version(&config)?;
    println!("TensorFlow Version: {}", version);
    Ok(())
}
