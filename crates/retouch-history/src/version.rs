//! Version rows: one immutable record per committed edit.

use std::fmt;
use std::str::FromStr;

use retouch_pipeline::CropRect;
use serde::{Deserialize, Serialize};

use crate::error::HistoryError;
use crate::id::{ImageId, UserId, Version};

/// The operation that produced a version.
///
/// Serializes as its human-readable label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    /// The uploaded photo.
    #[serde(rename = "Original")]
    Original,
    /// Rectangular crop of the lineage root.
    #[serde(rename = "Crop")]
    Crop,
    /// Automatic background removal.
    #[serde(rename = "Background Removal")]
    BackgroundRemoval,
    /// Seeded flood fill.
    #[serde(rename = "Flood Fill")]
    FloodFill,
    /// Cartoon stylization.
    #[serde(rename = "Cartoonise")]
    Cartoonise,
    /// Resize to a target size.
    #[serde(rename = "Resized")]
    Resized,
    /// Clothing overlay blended over the shoulders.
    #[serde(rename = "Upper Body Clothes Overlay")]
    ClothesOverlay,
}

impl OperationKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Original,
        Self::Crop,
        Self::BackgroundRemoval,
        Self::FloodFill,
        Self::Cartoonise,
        Self::Resized,
        Self::ClothesOverlay,
    ];

    /// Human-readable label stored on the row.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Original => "Original",
            Self::Crop => "Crop",
            Self::BackgroundRemoval => "Background Removal",
            Self::FloodFill => "Flood Fill",
            Self::Cartoonise => "Cartoonise",
            Self::Resized => "Resized",
            Self::ClothesOverlay => "Upper Body Clothes Overlay",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for OperationKind {
    type Err = HistoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.label() == s)
            .ok_or_else(|| HistoryError::UnknownOperation(s.to_owned()))
    }
}

/// Crop metadata recorded on Crop versions: the kept region of the
/// lineage root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropData {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
}

impl From<CropRect> for CropData {
    fn from(rect: CropRect) -> Self {
        Self {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
        }
    }
}

/// One immutable edit step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageVersion {
    /// Logical photo this version belongs to.
    pub image_id: ImageId,
    /// Position in the image's version sequence, starting at 1.
    pub version: Version,
    /// Owner.
    pub user_id: UserId,
    /// Operation that produced this version.
    pub label: OperationKind,
    /// Blob store key of this version's pixels.
    pub current_image_url: String,
    /// Blob store key of the lineage root.
    pub base_image_url: Option<String>,
    /// Kept region, for Crop versions only.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub crop_data: Option<CropData>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn labels_round_trip() {
        for kind in OperationKind::ALL {
            assert_eq!(kind.label().parse::<OperationKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_label_is_rejected() {
        assert!(matches!(
            "Sepia".parse::<OperationKind>(),
            Err(HistoryError::UnknownOperation(label)) if label == "Sepia"
        ));
    }

    #[test]
    fn row_serializes_with_camel_case_and_labels() {
        let row = ImageVersion {
            image_id: ImageId::random(),
            version: 2,
            user_id: UserId::random(),
            label: OperationKind::BackgroundRemoval,
            current_image_url: "a_2.png".to_owned(),
            base_image_url: Some("a_1.png".to_owned()),
            crop_data: None,
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["label"], "Background Removal");
        assert_eq!(json["currentImageUrl"], "a_2.png");
        assert_eq!(json["baseImageUrl"], "a_1.png");
        assert!(json.get("cropData").is_none());

        let back: ImageVersion = serde_json::from_value(json).unwrap();
        assert_eq!(back, row);
    }
}
