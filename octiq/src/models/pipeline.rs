use image::{imageops::FilterType, DynamicImage, GenericImageView, RgbImage};
use ndarray::Array4;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Model input height and width in pixels.
pub const INPUT_SIZE: u32 = 224;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("image is {width}x{height} but this pipeline needs at least {min}x{min}")]
    ImageTooSmall { width: u32, height: u32, min: u32 },
}

/// Preprocessing and label recipe attached to a catalog entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PipelineKind {
    Gcipl,
    Ang3x3,
    Hd21,
    Onh45,
}

impl PipelineKind {
    /// Instantiate the pipeline for this kind.
    pub fn build(self) -> Box<dyn QualityPipeline> {
        match self {
            PipelineKind::Gcipl => Box::new(Gcipl),
            PipelineKind::Ang3x3 => Box::new(Ang3x3),
            PipelineKind::Hd21 => Box::new(Hd21),
            PipelineKind::Onh45 => Box::new(Onh45),
        }
    }
}

/// Grade of one image, derived from the model's single output logit.
#[derive(Debug, Clone)]
pub struct Prediction {
    /// Quality grade, "Good" or "Poor"
    pub label: &'static str,
    /// Raw output logit
    pub raw: f32,
    /// Sigmoid of the logit
    pub sigmoid: f32,
}

/// One model's image-to-tensor and logit-to-label recipe.
pub trait QualityPipeline: Send + Sync {
    /// Turn a decoded image into the `[1, 3, 224, 224]` input tensor.
    fn preprocess(&self, image: &DynamicImage) -> Result<Array4<f32>, PipelineError>;

    /// Turn the model's output logit into a labeled prediction.
    fn postprocess(&self, logit: f32) -> Prediction;
}

struct Gcipl;
struct Ang3x3;
struct Hd21;
struct Onh45;

impl QualityPipeline for Gcipl {
    fn preprocess(&self, image: &DynamicImage) -> Result<Array4<f32>, PipelineError> {
        let cropped = center_crop(image, INPUT_SIZE)?;
        Ok(to_tensor(&cropped, [0.485, 0.456, 0.406], [0.229, 0.224, 0.225]))
    }

    fn postprocess(&self, logit: f32) -> Prediction {
        // Label order is flipped relative to the other models.
        predict(logit, ["Good", "Poor"])
    }
}

impl QualityPipeline for Ang3x3 {
    fn preprocess(&self, image: &DynamicImage) -> Result<Array4<f32>, PipelineError> {
        let resized = resize(image, INPUT_SIZE);
        Ok(to_tensor(&resized, [0.2977059; 3], [0.26995874; 3]))
    }

    fn postprocess(&self, logit: f32) -> Prediction {
        predict(logit, ["Poor", "Good"])
    }
}

impl QualityPipeline for Hd21 {
    fn preprocess(&self, image: &DynamicImage) -> Result<Array4<f32>, PipelineError> {
        let resized = resize(image, INPUT_SIZE);
        Ok(to_tensor(
            &resized,
            [0.1365239, 0.13651993, 0.13652335],
            [0.10527499, 0.10530869, 0.10528071],
        ))
    }

    fn postprocess(&self, logit: f32) -> Prediction {
        predict(logit, ["Poor", "Good"])
    }
}

impl QualityPipeline for Onh45 {
    fn preprocess(&self, image: &DynamicImage) -> Result<Array4<f32>, PipelineError> {
        let resized = resize(image, INPUT_SIZE);
        Ok(to_tensor(&resized, [0.4014854; 3], [0.30258739; 3]))
    }

    fn postprocess(&self, logit: f32) -> Prediction {
        predict(logit, ["Poor", "Good"])
    }
}

/// Center crop without resampling. The crop origin rounds half up.
fn center_crop(image: &DynamicImage, side: u32) -> Result<RgbImage, PipelineError> {
    let (width, height) = image.dimensions();
    if width < side || height < side {
        return Err(PipelineError::ImageTooSmall {
            width,
            height,
            min: side,
        });
    }
    let x = (width - side + 1) / 2;
    let y = (height - side + 1) / 2;
    Ok(image.crop_imm(x, y, side, side).to_rgb8())
}

/// Bilinear resize to `side` x `side`, ignoring aspect ratio.
fn resize(image: &DynamicImage, side: u32) -> RgbImage {
    image.resize_exact(side, side, FilterType::Triangle).to_rgb8()
}

/// Rescale to [0, 1], normalize per channel, lay out as NCHW.
fn to_tensor(image: &RgbImage, mean: [f32; 3], std: [f32; 3]) -> Array4<f32> {
    let side = image.width() as usize;
    let mut tensor = Array4::zeros((1, 3, side, side));
    for (x, y, pixel) in image.enumerate_pixels() {
        for c in 0..3 {
            let value = pixel[c] as f32 / 255.0;
            tensor[[0, c, y as usize, x as usize]] = (value - mean[c]) / std[c];
        }
    }
    tensor
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// A sigmoid above one half picks the second label.
fn predict(logit: f32, labels: [&'static str; 2]) -> Prediction {
    let sigmoid = sigmoid(logit);
    Prediction {
        label: labels[usize::from(sigmoid > 0.5)],
        raw: logit,
        sigmoid,
    }
}
