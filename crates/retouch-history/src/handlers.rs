//! Edit operations: resolve the current version, run a pixel operation,
//! commit the result.
//!
//! Every new version records the lineage root of the version it was made
//! from, so crops can always be recomputed from the untouched upload.

use retouch_pipeline::cartoon::cartoonise;
use retouch_pipeline::composite::{blend_overlay, shoulder_quad};
use retouch_pipeline::crop::crop;
use retouch_pipeline::flood::flood_fill;
use retouch_pipeline::resize::resize_to_fit;
use retouch_pipeline::segment::remove_background;
use retouch_pipeline::{
    BackgroundClassifier, BackgroundFill, CropRect, FaceBox, PipelineError, Point, ResizeOptions,
    RgbaImage, Seed, decode,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::committer::PendingEdit;
use crate::editor::Editor;
use crate::error::Result;
use crate::id::ImageId;
use crate::store::{BlobStore, RowStore};
use crate::version::{CropData, ImageVersion, OperationKind};

/// Which stored buffer an operation reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    /// The current version.
    Current,
    /// The lineage root if the current version is a crop, so crops never
    /// compound.
    UncroppedCurrent,
}

/// Where the clothing overlay goes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// Explicit corners, clockwise from the top-left.
    Quad([Point; 4]),
    /// Below a detected face.
    Face(FaceBox),
}

impl Placement {
    fn quad(self) -> [Point; 4] {
        match self {
            Self::Quad(quad) => quad,
            Self::Face(face) => shoulder_quad(face),
        }
    }
}

impl<R: RowStore, B: BlobStore> Editor<R, B> {
    /// Apply `op` to the chosen source buffer of `image_id` and commit
    /// the result as a `kind` version.
    fn edit<F>(
        &self,
        image_id: ImageId,
        kind: OperationKind,
        source: Source,
        crop_data: Option<CropData>,
        op: F,
    ) -> Result<ImageVersion>
    where
        F: FnOnce(&RgbaImage) -> Result<RgbaImage, PipelineError>,
    {
        let lock = self.locks().handle(image_id);
        let _guard = lock.lock();

        let current = self.get_current_for_editing(image_id)?;
        let base = self.resolve_base_image_url(image_id, &current)?;

        let key = match source {
            Source::UncroppedCurrent if current.label == OperationKind::Crop => &base,
            _ => &current.current_image_url,
        };
        debug!(%image_id, version = current.version, %kind, source = %key, "editing");

        let input = decode(&self.blobs().get(key)?)?;
        let output = op(&input)?;

        let edit = PendingEdit {
            kind,
            buffer: &output,
            crop_data,
        };
        self.commit_locked(image_id, current.user_id, edit, Some(base))
    }

    /// Automatic background removal with the configured classifier
    /// unless `classifier` overrides it.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::ImageNotFound`](crate::HistoryError::ImageNotFound),
    /// a decode error, or a storage error.
    pub fn remove_background(
        &self,
        image_id: ImageId,
        fill: BackgroundFill,
        classifier: Option<BackgroundClassifier>,
    ) -> Result<ImageVersion> {
        let classifier = classifier.unwrap_or(self.config().classifier);
        let segmentation = self.config().segmentation;
        self.edit(
            image_id,
            OperationKind::BackgroundRemoval,
            Source::Current,
            None,
            |img| Ok(remove_background(img, classifier, &segmentation, fill)),
        )
    }

    /// Clear the regions connected to `seeds` within `tolerance`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::SeedOutOfBounds`] (wrapped) before any
    /// commit, or a storage error.
    pub fn flood_fill(&self, image_id: ImageId, seeds: &[Seed], tolerance: u8) -> Result<ImageVersion> {
        self.edit(
            image_id,
            OperationKind::FloodFill,
            Source::Current,
            None,
            |img| flood_fill(img, seeds, tolerance),
        )
    }

    /// Crop the current image, or its lineage root if the current version
    /// is already a crop.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidCropRectangle`] (wrapped) before
    /// any commit, or a storage error.
    pub fn crop(&self, image_id: ImageId, rect: CropRect) -> Result<ImageVersion> {
        self.edit(
            image_id,
            OperationKind::Crop,
            Source::UncroppedCurrent,
            Some(CropData::from(rect)),
            |img| crop(img, rect),
        )
    }

    /// Resize towards `width` x `height`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidDimensions`] (wrapped) before any
    /// commit, or a storage error.
    pub fn resize(
        &self,
        image_id: ImageId,
        width: u32,
        height: u32,
        options: ResizeOptions,
    ) -> Result<ImageVersion> {
        self.edit(
            image_id,
            OperationKind::Resized,
            Source::Current,
            None,
            |img| resize_to_fit(img, width, height, options),
        )
    }

    /// Cartoon stylization with the configured parameters.
    ///
    /// # Errors
    ///
    /// Returns a pipeline error for invalid configuration, or a storage
    /// error.
    pub fn cartoonise(&self, image_id: ImageId) -> Result<ImageVersion> {
        let config = self.config().cartoon;
        self.edit(
            image_id,
            OperationKind::Cartoonise,
            Source::Current,
            None,
            |img| cartoonise(img, &config),
        )
    }

    /// Blend a clothing image over the upper body.
    ///
    /// # Errors
    ///
    /// Returns a pipeline error if `clothes` cannot be decoded or the
    /// placement misses the image, or a storage error.
    pub fn overlay_clothes(
        &self,
        image_id: ImageId,
        clothes: &[u8],
        placement: Placement,
    ) -> Result<ImageVersion> {
        let overlay = decode(clothes)?;
        let quad = placement.quad();
        let config = self.config().overlay;
        self.edit(
            image_id,
            OperationKind::ClothesOverlay,
            Source::Current,
            None,
            |img| blend_overlay(img, &overlay, &quad, &config),
        )
    }
}
