use garde::Validate;
use rand::Rng;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::models::image::EncodedImage;

/// Garment categories understood by the generation model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Category {
    Auto,
    Tops,
    Bottoms,
    OnePieces,
}

/// Speed/quality trade-off for a generation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunMode {
    Balanced,
    Quality,
    Performance,
}

/// How the garment was photographed; "auto" lets the model decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum GarmentPhotoType {
    Auto,
    FlatLay,
    Model,
}

/// Model-specific inputs of a generation job.
#[derive(Debug, Clone, Serialize, Validate)]
pub struct JobInputs {
    #[garde(skip)]
    pub model_image: EncodedImage,

    #[garde(skip)]
    pub garment_image: EncodedImage,

    #[garde(skip)]
    pub garment_photo_type: GarmentPhotoType,

    #[garde(skip)]
    pub category: Category,

    #[garde(skip)]
    pub mode: RunMode,

    #[garde(skip)]
    pub segmentation_free: bool,

    #[garde(range(max = 999_999))]
    pub seed: u32,

    #[garde(range(min = 1, max = 4))]
    pub num_samples: u8,
}

/// Payload for `POST /run`. Built fresh for every submission attempt.
#[derive(Debug, Clone, Serialize, Validate)]
pub struct JobRequest {
    #[garde(length(min = 1))]
    pub model_name: String,

    #[garde(dive)]
    pub inputs: JobInputs,
}

impl JobRequest {
    /// Assemble a request with a freshly drawn random seed.
    pub fn new(
        model_name: &str,
        model_image: EncodedImage,
        garment_image: EncodedImage,
        category: Category,
        mode: RunMode,
        num_samples: u8,
    ) -> Self {
        Self {
            model_name: model_name.to_string(),
            inputs: JobInputs {
                model_image,
                garment_image,
                garment_photo_type: GarmentPhotoType::Auto,
                category,
                mode,
                segmentation_free: true,
                seed: rand::thread_rng().gen_range(0..1_000_000),
                num_samples,
            },
        }
    }
}
