//! retouch-pipeline: Pure pixel operations for photo edits (sans-IO).
//!
//! Every operation takes a decoded [`RgbaImage`] and returns a new one:
//!
//! - [`segment`]: automatic background removal (neighbor-similarity
//!   classification, outline detection, interior fill)
//! - [`flood`]: seeded tolerance flood fill
//! - [`composite`]: DST_IN masking, flattening, feathered overlays
//! - [`resize`]: aspect-ratio-aware resize and cover-crop
//! - [`crop`]: rectangular crop
//! - [`cartoon`]: cartoon stylization
//!
//! This crate has **no I/O dependencies**. Storage, versioning, and undo
//! live in `retouch-history`.

pub mod blur;
pub mod cartoon;
pub mod composite;
pub mod crop;
pub mod decode;
pub mod flood;
pub mod resize;
pub mod segment;
pub mod types;

pub use composite::FaceBox;
pub use decode::{decode, encode_png};
pub use resize::{ResizeFilter, ResizeOptions};
pub use segment::{BackgroundClassifier, Classifier};
pub use types::{
    BackgroundFill, CartoonConfig, CropRect, Dimensions, EditConfig, GrayImage, OverlayConfig,
    PipelineError, Point, RgbaImage, Seed, SegmentationConfig,
};
