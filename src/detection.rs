//! Text boxes detected by an OCR engine, and the detections files that carry
//! them.
//!
//! We never run a recognizer ourselves. Instead, each input document points at
//! a detections file (JSON or TOML) listing the pages of the document, the
//! boxes found on each page, and enough information to recover each page's
//! pixel dimensions.

use schemars::JsonSchema;

use crate::prelude::*;

/// A point in page pixel coordinates, serialized as `[x, y]`.
#[derive(Clone, Copy, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
pub struct Point(pub f64, pub f64);

impl Point {
    pub fn x(&self) -> f64 {
        self.0
    }

    pub fn y(&self) -> f64 {
        self.1
    }
}

/// An axis-aligned envelope around a polygon.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

/// A single text fragment found by the recognizer.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DetectedBox {
    /// Four corners of the text region, normally clockwise from the top
    /// left. Rotated text produces non-axis-aligned quadrilaterals.
    pub polygon: [Point; 4],

    /// The recognized text. May be empty.
    #[serde(default)]
    pub text: String,

    /// Recognizer confidence, between 0.0 and 1.0.
    pub confidence: f64,
}

impl DetectedBox {
    /// The arithmetic mean of the four corners.
    pub fn center(&self) -> Point {
        let (sum_x, sum_y) = self
            .polygon
            .iter()
            .fold((0.0, 0.0), |(x, y), p| (x + p.x(), y + p.y()));
        let n = self.polygon.len() as f64;
        Point(sum_x / n, sum_y / n)
    }

    /// The smallest axis-aligned rectangle holding all four corners.
    pub fn bounds(&self) -> Bounds {
        let [first, rest @ ..] = &self.polygon;
        rest.iter().fold(
            Bounds {
                min_x: first.x(),
                min_y: first.y(),
                max_x: first.x(),
                max_y: first.y(),
            },
            |b, p| Bounds {
                min_x: b.min_x.min(p.x()),
                min_y: b.min_y.min(p.y()),
                max_x: b.max_x.max(p.x()),
                max_y: b.max_y.max(p.y()),
            },
        )
    }
}

/// Pixel dimensions of a page image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PageDimensions {
    pub width: u32,
    pub height: u32,
}

/// The contents of a detections file.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Detections {
    /// Pages in document order.
    pub pages: Vec<DetectedPage>,
}

/// One page of a detections file.
#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DetectedPage {
    /// Page width in pixels. Must be given together with `height`.
    #[serde(default)]
    pub width: Option<u32>,

    /// Page height in pixels.
    #[serde(default)]
    pub height: Option<u32>,

    /// The rendered page image. Used to find the page dimensions when
    /// `width` and `height` are not given. Relative paths are resolved
    /// against the directory containing the detections file.
    #[serde(default)]
    pub image_path: Option<PathBuf>,

    /// Boxes found on this page, in whatever order the recognizer produced.
    #[serde(default)]
    pub boxes: Vec<DetectedBox>,
}

impl DetectedPage {
    /// Dimensions given directly in the detections file, if any.
    pub fn explicit_dimensions(&self) -> Option<PageDimensions> {
        match (self.width, self.height) {
            (Some(width), Some(height)) => Some(PageDimensions { width, height }),
            _ => None,
        }
    }

    /// Find the dimensions of this page, reading the image header if needed.
    ///
    /// This may touch the filesystem, so call it from a blocking context.
    pub fn dimensions(&self, base_dir: &Path) -> Result<PageDimensions> {
        let dims = if let Some(dims) = self.explicit_dimensions() {
            dims
        } else if let Some(image_path) = &self.image_path {
            let image_path = base_dir.join(image_path);
            let (width, height) = image::image_dimensions(&image_path)
                .with_context(|| {
                    format!("failed to read image dimensions from {:?}", image_path)
                })?;
            PageDimensions { width, height }
        } else {
            return Err(anyhow!(
                "page has neither `width` and `height` nor an `image_path`"
            ));
        };
        if dims.width == 0 || dims.height == 0 {
            return Err(anyhow!(
                "page has zero-sized dimensions {}x{}",
                dims.width,
                dims.height
            ));
        }
        Ok(dims)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build an axis-aligned box with the given center and size.
    pub(crate) fn box_at(text: &str, cx: f64, cy: f64, confidence: f64) -> DetectedBox {
        let (hw, hh) = (10.0, 5.0);
        DetectedBox {
            polygon: [
                Point(cx - hw, cy - hh),
                Point(cx + hw, cy - hh),
                Point(cx + hw, cy + hh),
                Point(cx - hw, cy + hh),
            ],
            text: text.to_owned(),
            confidence,
        }
    }

    #[test]
    fn center_is_mean_of_corners() {
        let b = DetectedBox {
            polygon: [Point(0.0, 0.0), Point(4.0, 2.0), Point(6.0, 8.0), Point(2.0, 6.0)],
            text: "rotated".to_owned(),
            confidence: 1.0,
        };
        assert_eq!(b.center(), Point(3.0, 4.0));
    }

    #[test]
    fn bounds_enclose_rotated_polygon() {
        let b = DetectedBox {
            polygon: [Point(0.0, 0.0), Point(4.0, 2.0), Point(6.0, 8.0), Point(2.0, 6.0)],
            text: "rotated".to_owned(),
            confidence: 1.0,
        };
        assert_eq!(
            b.bounds(),
            Bounds {
                min_x: 0.0,
                min_y: 0.0,
                max_x: 6.0,
                max_y: 8.0,
            }
        );
        assert_eq!(
            box_at("axis", 50.0, 20.0, 0.9).bounds(),
            Bounds {
                min_x: 40.0,
                min_y: 15.0,
                max_x: 60.0,
                max_y: 25.0,
            }
        );
    }

    #[test]
    fn parses_polygon_as_nested_arrays() {
        let json = r#"{"polygon": [[0,0],[10,0],[10,10],[0,10]], "text": "X", "confidence": 0.9}"#;
        let b: DetectedBox = serde_json::from_str(json).unwrap();
        assert_eq!(b.polygon[2], Point(10.0, 10.0));
        assert_eq!(b.center(), Point(5.0, 5.0));
    }

    #[test]
    fn explicit_dimensions_win() {
        let page = DetectedPage {
            width: Some(200),
            height: Some(100),
            image_path: Some(PathBuf::from("does-not-exist.png")),
            ..Default::default()
        };
        let dims = page.dimensions(Path::new(".")).unwrap();
        assert_eq!(
            dims,
            PageDimensions {
                width: 200,
                height: 100
            }
        );
    }

    #[test]
    fn dimensions_are_read_from_image_header() {
        let dir = tempfile::TempDir::new().unwrap();
        image::RgbImage::new(40, 30)
            .save(dir.path().join("page.png"))
            .unwrap();
        let page = DetectedPage {
            image_path: Some(PathBuf::from("page.png")),
            ..Default::default()
        };
        let dims = page.dimensions(dir.path()).unwrap();
        assert_eq!(
            dims,
            PageDimensions {
                width: 40,
                height: 30
            }
        );
    }

    #[test]
    fn missing_or_zero_dimensions_are_errors() {
        let page = DetectedPage::default();
        assert!(page.dimensions(Path::new(".")).is_err());

        let page = DetectedPage {
            width: Some(0),
            height: Some(100),
            ..Default::default()
        };
        assert!(page.dimensions(Path::new(".")).is_err());
    }
}
