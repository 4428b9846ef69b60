//! Shared domain enumerations and the render artifact.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Paper formats accepted on the PDF route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageFormat {
    Letter,
    A4,
    Legal,
}

impl PageFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            PageFormat::Letter => "letter",
            PageFormat::A4 => "a4",
            PageFormat::Legal => "legal",
        }
    }

    /// Paper size in inches, width then height.
    pub fn paper_inches(self) -> (f64, f64) {
        match self {
            PageFormat::Letter => (8.5, 11.0),
            PageFormat::A4 => (8.27, 11.7),
            PageFormat::Legal => (8.5, 14.0),
        }
    }
}

impl TryFrom<&str> for PageFormat {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "letter" => Ok(PageFormat::Letter),
            "a4" => Ok(PageFormat::A4),
            "legal" => Ok(PageFormat::Legal),
            _ => Err(()),
        }
    }
}

/// Emulated device class for a render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    #[default]
    Desktop,
    Mobile,
}

impl DeviceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceKind::Desktop => "desktop",
            DeviceKind::Mobile => "mobile",
        }
    }
}

impl TryFrom<&str> for DeviceKind {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "desktop" => Ok(DeviceKind::Desktop),
            "mobile" => Ok(DeviceKind::Mobile),
            _ => Err(()),
        }
    }
}

/// Finished render artifact handed back to the HTTP layer.
///
/// `last_modified` carries the upstream `Last-Modified` header value when the
/// article response had one, otherwise the render completion time as an HTTP
/// date.
#[derive(Debug, Clone)]
pub struct PdfDocument {
    pub bytes: Bytes,
    pub last_modified: String,
}
