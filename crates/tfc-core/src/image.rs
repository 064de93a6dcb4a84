//! Image to NHWC float tensor conversion, and image-shaped model outputs.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use ndarray::{Array3, Array4, ArrayD, Axis, Ix3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, Result};

/// Order of the color channels fed to a model.
///
/// Models trained on OpenCV-decoded images expect blue first, which is the
/// default. Luma images are unaffected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    #[default]
    Bgr,
    Rgb,
}

impl FromStr for ChannelOrder {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bgr" => Ok(ChannelOrder::Bgr),
            "rgb" => Ok(ChannelOrder::Rgb),
            other => Err(format!("unknown channel order '{}', expected bgr or rgb", other)),
        }
    }
}

impl fmt::Display for ChannelOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelOrder::Bgr => f.write_str("bgr"),
            ChannelOrder::Rgb => f.write_str("rgb"),
        }
    }
}

/// Load an image, optionally resizing it to exactly `width x height`.
pub fn load_image(path: &Path, resize: Option<(u32, u32)>) -> Result<DynamicImage> {
    let image = image::open(path)?;
    debug!(
        "Loaded {} ({}x{}, {:?})",
        path.display(),
        image.width(),
        image.height(),
        image.color()
    );
    Ok(match resize {
        Some((width, height)) if (width, height) != image.dimensions() => {
            image.resize_exact(width, height, image::imageops::FilterType::Triangle)
        }
        _ => image,
    })
}

/// Width and height of the image at `path`, read from its header.
pub fn image_size(path: &Path) -> Result<(u32, u32)> {
    Ok(image::image_dimensions(path)?)
}

/// Convert an image to `H x W x C` floats holding the raw sample values.
///
/// Luma, luma+alpha, color and color+alpha images keep 1, 2, 3 and 4
/// channels. Samples are not normalized: 8-bit images give 0-255, 16-bit
/// images 0-65535 and float images their stored values.
pub fn image_to_array(image: &DynamicImage, order: ChannelOrder) -> Result<Array3<f32>> {
    let (width, height) = image.dimensions();
    let (mut samples, channels) = raw_samples(image);

    if order == ChannelOrder::Bgr && channels >= 3 {
        for pixel in samples.chunks_exact_mut(channels) {
            pixel.swap(0, 2);
        }
    }

    shape_samples(samples, width, height, channels)
}

fn shape_samples(
    samples: Vec<f32>,
    width: u32,
    height: u32,
    channels: usize,
) -> Result<Array3<f32>> {
    let shape = (height as usize, width as usize, channels);
    Array3::from_shape_vec(shape, samples).map_err(|e| {
        CoreError::InvalidImage(format!(
            "{}x{} image with {} channels: {}",
            width, height, channels, e
        ))
    })
}

fn raw_samples(image: &DynamicImage) -> (Vec<f32>, usize) {
    match image {
        DynamicImage::ImageLuma8(buf) => (widen(buf.as_raw()), 1),
        DynamicImage::ImageLumaA8(buf) => (widen(buf.as_raw()), 2),
        DynamicImage::ImageRgb8(buf) => (widen(buf.as_raw()), 3),
        DynamicImage::ImageRgba8(buf) => (widen(buf.as_raw()), 4),
        DynamicImage::ImageLuma16(buf) => (widen(buf.as_raw()), 1),
        DynamicImage::ImageLumaA16(buf) => (widen(buf.as_raw()), 2),
        DynamicImage::ImageRgb16(buf) => (widen(buf.as_raw()), 3),
        DynamicImage::ImageRgba16(buf) => (widen(buf.as_raw()), 4),
        DynamicImage::ImageRgb32F(buf) => (buf.as_raw().clone(), 3),
        DynamicImage::ImageRgba32F(buf) => (buf.as_raw().clone(), 4),
        other => match other.color().channel_count() {
            1 => (widen(other.to_luma8().as_raw()), 1),
            2 => (widen(other.to_luma_alpha8().as_raw()), 2),
            3 => (widen(other.to_rgb8().as_raw()), 3),
            _ => (widen(other.to_rgba8().as_raw()), 4),
        },
    }
}

fn widen<T: Copy + Into<f32>>(samples: &[T]) -> Vec<f32> {
    samples.iter().map(|&s| s.into()).collect()
}

/// Stack images of identical size and channel count into an `N x H x W x C` batch.
pub fn images_to_batch(images: &[DynamicImage], order: ChannelOrder) -> Result<Array4<f32>> {
    let first = images
        .first()
        .ok_or_else(|| CoreError::InvalidImage("no images to batch".to_string()))?;
    let first = image_to_array(first, order)?;
    let shape = first.raw_dim();

    let mut batch = Array4::<f32>::zeros((images.len(), shape[0], shape[1], shape[2]));
    batch.index_axis_mut(Axis(0), 0).assign(&first);

    for (i, image) in images.iter().enumerate().skip(1) {
        let array = image_to_array(image, order)?;
        if array.raw_dim() != shape {
            return Err(CoreError::InvalidImage(format!(
                "image {} is {:?} but the batch expects {:?}",
                i,
                array.shape(),
                first.shape()
            )));
        }
        batch.index_axis_mut(Axis(0), i).assign(&array);
    }

    debug!("Built {} image batch of shape {:?}", order, batch.shape());
    Ok(batch)
}

/// Load every image in `paths` and stack them into a batch.
pub fn load_batch<P: AsRef<Path>>(
    paths: &[P],
    resize: Option<(u32, u32)>,
    order: ChannelOrder,
) -> Result<Array4<f32>> {
    let images = paths
        .iter()
        .map(|path| load_image(path.as_ref(), resize))
        .collect::<Result<Vec<_>>>()?;
    images_to_batch(&images, order)
}

/// Split an `N x H x W x C` model output into one `H x W x C` image per batch item.
pub fn split_output_images(output: &ArrayD<f32>) -> Result<Vec<Array3<f32>>> {
    if output.ndim() != 4 {
        return Err(CoreError::InvalidImage(format!(
            "output of shape {:?} is not N x H x W x C",
            output.shape()
        )));
    }
    output
        .axis_iter(Axis(0))
        .map(|item| {
            item.to_owned()
                .into_dimensionality::<Ix3>()
                .map_err(|e| CoreError::InvalidImage(e.to_string()))
        })
        .collect()
}

/// Render a float map with any number of channels as a color heatmap.
///
/// Each channel is scaled by 180 and saturated to a byte; the channels are
/// OR-ed into an 8-bit hue (0-180 covers the full circle) shown at full
/// saturation and value.
pub fn heatmap(map: &Array3<f32>) -> RgbImage {
    let (height, width, _) = map.dim();
    RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let hue = map
            .slice(ndarray::s![y as usize, x as usize, ..])
            .iter()
            .fold(0u8, |hue, &v| hue | saturate_u8(v * 180.0));
        hue_to_rgb(hue)
    })
}

/// Write [`heatmap`] of `map` to `path`, resized to `size` when given.
pub fn save_heatmap(map: &Array3<f32>, size: Option<(u32, u32)>, path: &Path) -> Result<()> {
    let mut image = heatmap(map);
    if let Some((width, height)) = size {
        if (width, height) != image.dimensions() {
            image = image::imageops::resize(
                &image,
                width,
                height,
                image::imageops::FilterType::Triangle,
            );
        }
    }
    image.save(path)?;
    debug!("Wrote heatmap to {}", path.display());
    Ok(())
}

fn saturate_u8(value: f32) -> u8 {
    if value.is_nan() {
        0
    } else {
        value.round().clamp(0.0, 255.0) as u8
    }
}

/// Full-saturation, full-value color for an 8-bit hue in half degrees.
fn hue_to_rgb(hue: u8) -> Rgb<u8> {
    let h = f32::from(hue) / 30.0;
    let sector = (h.floor() as u32) % 6;
    let f = h - h.floor();
    let (r, g, b) = match sector {
        0 => (1.0, f, 0.0),
        1 => (1.0 - f, 1.0, 0.0),
        2 => (0.0, 1.0, f),
        3 => (0.0, 1.0 - f, 1.0),
        4 => (f, 0.0, 1.0),
        _ => (1.0, 0.0, 1.0 - f),
    };
    Rgb([saturate_u8(r * 255.0), saturate_u8(g * 255.0), saturate_u8(b * 255.0)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{
        GrayAlphaImage, GrayImage, ImageBuffer, Luma, LumaA, Rgb32FImage, Rgba, RgbaImage,
    };
    use ndarray::IxDyn;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_order_puts_blue_first() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([10, 128, 250]));
        img.put_pixel(1, 0, Rgb([1, 2, 3]));
        let img = DynamicImage::ImageRgb8(img);

        let array = image_to_array(&img, ChannelOrder::default()).unwrap();
        assert_eq!(array.shape(), &[1, 2, 3]);
        assert_eq!(array.slice(ndarray::s![0, 0, ..]).to_vec(), vec![250.0, 128.0, 10.0]);
        assert_eq!(array.slice(ndarray::s![0, 1, ..]).to_vec(), vec![3.0, 2.0, 1.0]);

        let array = image_to_array(&img, ChannelOrder::Rgb).unwrap();
        assert_eq!(array.slice(ndarray::s![0, 0, ..]).to_vec(), vec![10.0, 128.0, 250.0]);
    }

    #[test]
    fn test_bgra_keeps_alpha_last() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 2, Rgba([1, 2, 3, 4])));
        let array = image_to_array(&img, ChannelOrder::Bgr).unwrap();
        assert_eq!(array.shape(), &[2, 3, 4]);
        assert_eq!(array.slice(ndarray::s![1, 2, ..]).to_vec(), vec![3.0, 2.0, 1.0, 4.0]);
    }

    #[test]
    fn test_gray_channels_preserved() {
        let gray = DynamicImage::ImageLuma8(GrayImage::new(3, 2));
        let gray_alpha =
            DynamicImage::ImageLumaA8(GrayAlphaImage::from_pixel(3, 2, LumaA([7, 200])));

        assert_eq!(image_to_array(&gray, ChannelOrder::Bgr).unwrap().shape(), &[2, 3, 1]);
        let array = image_to_array(&gray_alpha, ChannelOrder::Bgr).unwrap();
        assert_eq!(array.shape(), &[2, 3, 2]);
        assert_eq!(array[[1, 2, 0]], 7.0);
        assert_eq!(array[[1, 2, 1]], 200.0);
    }

    #[test]
    fn test_high_depth_samples_are_not_reduced() {
        let img: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::from_pixel(2, 2, Luma([40000]));
        let array = image_to_array(&DynamicImage::ImageLuma16(img), ChannelOrder::Bgr).unwrap();
        assert_eq!(array[[1, 1, 0]], 40000.0);

        let img = Rgb32FImage::from_pixel(1, 1, Rgb([0.25, 1.5, -2.0]));
        let array = image_to_array(&DynamicImage::ImageRgb32F(img), ChannelOrder::Bgr).unwrap();
        assert_eq!(array.slice(ndarray::s![0, 0, ..]).to_vec(), vec![-2.0, 1.5, 0.25]);
    }

    #[test]
    fn test_short_sample_buffer_is_image_error() {
        assert!(matches!(
            shape_samples(vec![0.0; 5], 2, 1, 3),
            Err(CoreError::InvalidImage(_))
        ));
        let array = shape_samples(vec![0.0; 6], 2, 1, 3).unwrap();
        assert_eq!(array.shape(), &[1, 2, 3]);
    }

    #[test]
    fn test_batch_stacks_images() {
        let a = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 3, Rgb([1, 1, 1])));
        let b = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 3, Rgb([2, 2, 9])));

        let batch = images_to_batch(&[a, b], ChannelOrder::Bgr).unwrap();
        assert_eq!(batch.shape(), &[2, 3, 4, 3]);
        assert_eq!(batch[[0, 2, 3, 0]], 1.0);
        assert_eq!(batch[[1, 0, 0, 0]], 9.0);
        assert_eq!(batch[[1, 0, 0, 2]], 2.0);
    }

    #[test]
    fn test_batch_rejects_mismatched_sizes() {
        let a = DynamicImage::ImageRgb8(RgbImage::new(4, 3));
        let b = DynamicImage::ImageRgb8(RgbImage::new(3, 4));
        assert!(matches!(
            images_to_batch(&[a, b], ChannelOrder::Bgr),
            Err(CoreError::InvalidImage(_))
        ));
    }

    #[test]
    fn test_batch_rejects_mismatched_channels() {
        let a = DynamicImage::ImageRgb8(RgbImage::new(2, 2));
        let b = DynamicImage::ImageLuma8(GrayImage::new(2, 2));
        assert!(images_to_batch(&[a, b], ChannelOrder::Bgr).is_err());
    }

    #[test]
    fn test_empty_batch_is_error() {
        assert!(matches!(
            images_to_batch(&[], ChannelOrder::Bgr),
            Err(CoreError::InvalidImage(_))
        ));
    }

    #[test]
    fn test_load_image_with_resize() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.png");
        RgbImage::from_pixel(8, 6, Rgb([50, 60, 70])).save(&path).unwrap();

        let image = load_image(&path, Some((4, 3))).unwrap();
        assert_eq!(image.dimensions(), (4, 3));

        let batch = load_batch(&[&path, &path], None, ChannelOrder::Bgr).unwrap();
        assert_eq!(batch.shape(), &[2, 6, 8, 3]);
        assert_eq!(batch[[1, 5, 7, 0]], 70.0);
        assert_eq!(batch[[1, 5, 7, 2]], 50.0);
    }

    #[test]
    fn test_load_missing_image() {
        assert!(load_image(Path::new("/nonexistent/image.png"), None).is_err());
    }

    #[test]
    fn test_channel_order_parsing() {
        assert_eq!("BGR".parse::<ChannelOrder>(), Ok(ChannelOrder::Bgr));
        assert_eq!("rgb".parse::<ChannelOrder>(), Ok(ChannelOrder::Rgb));
        assert!("hsv".parse::<ChannelOrder>().is_err());
        assert_eq!(ChannelOrder::Rgb.to_string(), "rgb");
    }

    #[test]
    fn test_split_output_images() {
        let output = ArrayD::from_shape_fn(IxDyn(&[2, 3, 4, 5]), |ix| ix[0] as f32);
        let images = split_output_images(&output).unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[1].shape(), &[3, 4, 5]);
        assert!(images[1].iter().all(|&v| v == 1.0));

        let flat = ArrayD::<f32>::zeros(IxDyn(&[1, 10]));
        assert!(matches!(
            split_output_images(&flat),
            Err(CoreError::InvalidImage(_))
        ));
    }

    #[test]
    fn test_heatmap_hues() {
        assert_eq!(hue_to_rgb(0), Rgb([255, 0, 0]));
        assert_eq!(hue_to_rgb(60), Rgb([0, 255, 0]));
        assert_eq!(hue_to_rgb(120), Rgb([0, 0, 255]));
        assert_eq!(hue_to_rgb(180), Rgb([255, 0, 0]));

        // One channel at 1/3 maps to hue 60 (green); zero stays red.
        let mut map = Array3::<f32>::zeros((1, 2, 2));
        map[[0, 1, 1]] = 1.0 / 3.0;
        let image = heatmap(&map);
        assert_eq!(image.dimensions(), (2, 1));
        assert_eq!(*image.get_pixel(0, 0), Rgb([255, 0, 0]));
        assert_eq!(*image.get_pixel(1, 0), Rgb([0, 255, 0]));
    }

    #[test]
    fn test_save_heatmap_resizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heatmap.png");
        save_heatmap(&Array3::zeros((2, 2, 1)), Some((8, 6)), &path).unwrap();
        assert_eq!(image_size(&path).unwrap(), (8, 6));
    }
}
