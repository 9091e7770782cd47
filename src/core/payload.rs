//! Decoding of captured-image payloads. The boundary receives images as
//! data-URL-style text: an optional marker, a comma, then base64 image bytes.
//! The payload comes from the client and is not trusted; any decode failure
//! is an input error, reported before the pipeline runs.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::DynamicImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("unreadable image: {0}")]
    Image(#[from] image::ImageError),
}

/// Everything before the first comma is the marker and is discarded. A
/// payload without a marker is taken as bare base64.
pub fn decode_data_url(payload: &str) -> Result<DynamicImage, PayloadError> {
    let body = match payload.split_once(',') {
        Some((_marker, body)) => body,
        None => payload,
    };
    let bytes = STANDARD.decode(body.trim())?;
    Ok(image::load_from_memory(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(2, 2, image::Rgb([10, 200, 30]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageOutputFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn decodes_a_data_url() {
        let payload = format!("data:image/png;base64,{}", STANDARD.encode(png_bytes()));
        let image = decode_data_url(&payload).unwrap();
        assert_eq!((image.width(), image.height()), (2, 2));
    }

    #[test]
    fn decodes_bare_base64() {
        let payload = STANDARD.encode(png_bytes());
        assert!(decode_data_url(&payload).is_ok());
    }

    #[test]
    fn rejects_invalid_base64() {
        let err = decode_data_url("data:image/png;base64,!!!not-base64!!!").unwrap_err();
        assert!(matches!(err, PayloadError::Base64(_)));
    }

    #[test]
    fn rejects_bytes_that_are_not_an_image() {
        let payload = format!("data:image/png;base64,{}", STANDARD.encode(b"hello"));
        let err = decode_data_url(&payload).unwrap_err();
        assert!(matches!(err, PayloadError::Image(_)));
    }

    #[test]
    fn rejects_an_empty_body() {
        assert!(decode_data_url("data:image/png;base64,").is_err());
    }
}
