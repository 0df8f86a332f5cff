//! Image encoding: `DynamicImage` → base64 PNG for cloud requests.
//!
//! PNG keeps rendered glyph edges intact; JPEG artefacts around small text
//! measurably hurt transcription at scan resolutions.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// A page image ready to embed in a request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPage {
    pub mime_type: &'static str,
    pub data_b64: String,
}

impl EncodedPage {
    /// Attachment form used by `edgequake-llm` providers.
    pub fn to_image_data(&self) -> ImageData {
        ImageData::new(self.data_b64.clone(), self.mime_type).with_detail("high")
    }
}

/// Encode a rasterised page as base64 PNG.
pub fn encode_page(img: &DynamicImage) -> Result<EncodedPage, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let data_b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", data_b64.len());

    Ok(EncodedPage {
        mime_type: "image/png",
        data_b64,
    })
}
