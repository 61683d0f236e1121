//! Row builders: one pure function per operation kind.
//!
//! [`build_row`] looks the kind up in a static table instead of matching
//! on it, so adding an operation means adding one table entry.

use crate::error::{HistoryError, Result};
use crate::id::{ImageId, UserId, Version};
use crate::version::{CropData, ImageVersion, OperationKind};

/// Everything a builder needs that does not depend on the operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowContext {
    /// Image the new version belongs to.
    pub image_id: ImageId,
    /// Owner.
    pub user_id: UserId,
    /// Allocated version number.
    pub version: Version,
    /// Blob store key the new pixels were written under.
    pub current_image_url: String,
    /// Lineage root key, if known.
    pub base_image_url: Option<String>,
}

/// Operation-specific inputs recorded on the row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationParams {
    /// Kept region, meaningful for Crop only.
    pub crop_data: Option<CropData>,
}

/// Builds the row for one operation kind.
pub type RowBuilder = fn(RowContext, &OperationParams) -> ImageVersion;

const BUILDERS: [(OperationKind, RowBuilder); 7] = [
    (OperationKind::Original, original_row),
    (OperationKind::Crop, crop_row),
    (OperationKind::BackgroundRemoval, |ctx, _| {
        plain_row(OperationKind::BackgroundRemoval, ctx)
    }),
    (OperationKind::FloodFill, |ctx, _| plain_row(OperationKind::FloodFill, ctx)),
    (OperationKind::Cartoonise, |ctx, _| plain_row(OperationKind::Cartoonise, ctx)),
    (OperationKind::Resized, |ctx, _| plain_row(OperationKind::Resized, ctx)),
    (OperationKind::ClothesOverlay, |ctx, _| {
        plain_row(OperationKind::ClothesOverlay, ctx)
    }),
];

/// The upload: always version 1, its own lineage root.
fn original_row(ctx: RowContext, _params: &OperationParams) -> ImageVersion {
    ImageVersion {
        image_id: ctx.image_id,
        version: 1,
        user_id: ctx.user_id,
        label: OperationKind::Original,
        base_image_url: Some(ctx.current_image_url.clone()),
        current_image_url: ctx.current_image_url,
        crop_data: None,
    }
}

fn crop_row(ctx: RowContext, params: &OperationParams) -> ImageVersion {
    ImageVersion {
        image_id: ctx.image_id,
        version: ctx.version,
        user_id: ctx.user_id,
        label: OperationKind::Crop,
        current_image_url: ctx.current_image_url,
        base_image_url: ctx.base_image_url,
        crop_data: params.crop_data,
    }
}

/// Rows that only carry the lineage root.
fn plain_row(label: OperationKind, ctx: RowContext) -> ImageVersion {
    ImageVersion {
        image_id: ctx.image_id,
        version: ctx.version,
        user_id: ctx.user_id,
        label,
        current_image_url: ctx.current_image_url,
        base_image_url: ctx.base_image_url,
        crop_data: None,
    }
}

/// The registered builder for `kind`.
#[must_use]
pub fn builder_for(kind: OperationKind) -> Option<RowBuilder> {
    BUILDERS
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|&(_, builder)| builder)
}

/// Build the row for a committed `kind` operation.
///
/// # Errors
///
/// Returns [`HistoryError::UnknownOperation`] if no builder is
/// registered for `kind`.
pub fn build_row(kind: OperationKind, ctx: RowContext, params: &OperationParams) -> Result<ImageVersion> {
    let builder = builder_for(kind).ok_or_else(|| HistoryError::UnknownOperation(kind.to_string()))?;
    Ok(builder(ctx, params))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ctx(version: Version) -> RowContext {
        RowContext {
            image_id: ImageId::random(),
            user_id: UserId::random(),
            version,
            current_image_url: format!("img_{version}.png"),
            base_image_url: Some("img_1.png".to_owned()),
        }
    }

    const CROP: CropData = CropData {
        x: 1,
        y: 2,
        width: 3,
        height: 4,
    };

    #[test]
    fn every_kind_has_a_builder_with_its_label() {
        for kind in OperationKind::ALL {
            let row = build_row(kind, ctx(3), &OperationParams::default()).unwrap();
            assert_eq!(row.label, kind);
        }
    }

    #[test]
    fn original_is_version_one_and_its_own_root() {
        let row = build_row(OperationKind::Original, ctx(7), &OperationParams::default()).unwrap();
        assert_eq!(row.version, 1);
        assert_eq!(row.base_image_url.as_deref(), Some("img_7.png"));
    }

    #[test]
    fn only_crop_records_crop_data() {
        let params = OperationParams {
            crop_data: Some(CROP),
        };
        let crop = build_row(OperationKind::Crop, ctx(2), &params).unwrap();
        assert_eq!(crop.crop_data, Some(CROP));
        assert_eq!(crop.base_image_url.as_deref(), Some("img_1.png"));

        let resized = build_row(OperationKind::Resized, ctx(2), &params).unwrap();
        assert_eq!(resized.crop_data, None);
    }
}
