//! Predict command - run images through a model.

use std::path::PathBuf;

use clap::Args;
use console::style;
use tfc_core::demos::{self, OutputImages, PredictOptions};
use tfc_core::DemoError;
use tfc_core::image::{ChannelOrder, image_size, save_heatmap};

use super::{GlobalOptions, graph_path};

/// Arguments for the predict command.
#[derive(Args)]
pub struct PredictArgs {
    /// Image files, stacked into one batch
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// GraphDef file (defaults to graph.path from config)
    #[arg(short, long)]
    graph: Option<PathBuf>,

    /// Input operation name
    #[arg(long)]
    input_op: Option<String>,

    /// Output operation name
    #[arg(long)]
    output_op: Option<String>,

    /// Use the first and last graph operations as input and output
    #[arg(long)]
    infer_io: bool,

    /// Resize images before batching, as WIDTHxHEIGHT
    #[arg(long, value_parser = parse_size)]
    resize: Option<(u32, u32)>,

    /// Channel order of color images: bgr or rgb (defaults to the config)
    #[arg(long)]
    channel_order: Option<ChannelOrder>,

    /// Treat outputs as N x H x W x C images instead of vectors
    #[arg(long)]
    as_image: bool,

    /// With --as-image, write the first output map as a heatmap PNG
    #[arg(long, requires = "as_image")]
    heatmap: Option<PathBuf>,

    /// Fraction of GPU memory to allocate, overriding the config
    #[arg(long)]
    gpu_memory_fraction: Option<f64>,
}

pub fn run(args: PredictArgs, options: &GlobalOptions) -> anyhow::Result<()> {
    let mut config = options.load_config()?;
    if args.gpu_memory_fraction.is_some() {
        config.session.gpu_memory_fraction = args.gpu_memory_fraction;
    }
    let path = graph_path(args.graph.as_deref(), &config);

    let predict_options = PredictOptions {
        input_op: args.input_op,
        output_op: args.output_op,
        infer_io: args.infer_io,
        resize: args.resize,
        channel_order: args.channel_order,
    };

    if !args.as_image {
        let results = demos::predict(&config, path, &args.images, &predict_options)?;
        for (i, values) in results.iter().enumerate() {
            let row: Vec<String> = values.iter().map(|v| format!("{:.4}", v)).collect();
            println!("{} {}", style(format!("Output vector #{}:", i)).bold(), row.join("\t"));
        }
        return Ok(());
    }

    let outputs = demos::predict_images(&config, path, &args.images, &predict_options)?;
    for (i, output) in outputs.iter().enumerate() {
        for line in describe_images(i, output) {
            println!("{}", line);
        }
    }

    if let Some(heatmap) = &args.heatmap {
        let map = outputs
            .first()
            .and_then(|output| output.images.first())
            .ok_or_else(|| anyhow::anyhow!("model produced no output image"))?;
        // Match the size of the first input image.
        let size = args.resize.or_else(|| {
            args.images
                .first()
                .and_then(|image| image_size(image).ok())
        });
        save_heatmap(map, size, heatmap).map_err(DemoError::Image)?;
        println!(
            "{} Wrote heatmap to {}",
            style("✓").green(),
            heatmap.display()
        );
    }
    Ok(())
}

fn describe_images(index: usize, output: &OutputImages) -> Vec<String> {
    output
        .images
        .iter()
        .enumerate()
        .map(|(item, image)| {
            let (height, width, channels) = image.dim();
            let (min, max) = image
                .iter()
                .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                    (lo.min(v), hi.max(v))
                });
            format!(
                "Output image #{} ({}) [{}]: {}x{}x{} min {:.4} max {:.4}",
                index, output.name, item, height, width, channels, min, max
            )
        })
        .collect()
}

fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (width, height) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
    let width: u32 = width
        .trim()
        .parse()
        .map_err(|e| format!("invalid width '{}': {}", width, e))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|e| format!("invalid height '{}': {}", height, e))?;
    if width == 0 || height == 0 {
        return Err("width and height must be positive".to_string());
    }
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_describe_images() {
        let mut map = Array3::<f32>::zeros((2, 3, 5));
        map[[1, 2, 4]] = 0.75;
        let output = OutputImages {
            name: "heatmaps".to_string(),
            images: vec![map],
        };
        assert_eq!(
            describe_images(0, &output),
            vec!["Output image #0 (heatmaps) [0]: 2x3x5 min 0.0000 max 0.7500".to_string()]
        );
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("224x244"), Ok((224, 244)));
        assert_eq!(parse_size("32X16"), Ok((32, 16)));
        assert!(parse_size("224").is_err());
        assert!(parse_size("0x10").is_err());
        assert!(parse_size("ax10").is_err());
    }
}
