//! Image preconditioning before the upstream call.
//!
//! Large photos burn upstream tokens for no grading benefit. Anything whose
//! longest edge exceeds the configured limit is downscaled with bilinear
//! interpolation, composited onto opaque white (phone screenshots carry
//! alpha), and re-encoded as JPEG at quality 85. Input that fails to decode
//! falls through unchanged with a warning -- the upstream gets to reject it.

use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::imageops::FilterType;
use tracing::{debug, warn};

use inkstone_llm::ImagePayload;

/// JPEG re-encode quality (0.85 in the usual 0..1 scale).
const JPEG_QUALITY: u8 = 85;

/// Precondition raw upload bytes into the payload sent upstream.
///
/// Never fails: undecodable input is forwarded as-is.
pub fn precondition(bytes: &[u8], max_image_size: u32) -> ImagePayload {
    match compress(bytes, max_image_size) {
        Ok(jpeg) => {
            debug!(
                original = bytes.len(),
                compressed = jpeg.len(),
                "image preconditioned"
            );
            ImagePayload::jpeg(BASE64.encode(&jpeg))
        }
        Err(e) => {
            warn!(error = %e, "image preconditioning failed, sending original bytes");
            ImagePayload {
                base64: BASE64.encode(bytes),
                media_type: sniff_media_type(bytes).to_owned(),
            }
        }
    }
}

fn compress(bytes: &[u8], max_image_size: u32) -> image::ImageResult<Vec<u8>> {
    let img = image::load_from_memory(bytes)?;

    let img = if img.width().max(img.height()) > max_image_size {
        img.resize(max_image_size, max_image_size, FilterType::Triangle)
    } else {
        img
    };

    // Composite onto opaque white so transparency does not turn black in
    // the JPEG.
    let rgba = img.to_rgba8();
    let mut canvas = image::RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let a = a as u32;
        let blend = |c: u8| (((c as u32) * a + 255 * (255 - a)) / 255) as u8;
        canvas.put_pixel(x, y, image::Rgb([blend(r), blend(g), blend(b)]));
    }

    let mut out = Vec::new();
    let encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(Cursor::new(&mut out), JPEG_QUALITY);
    canvas.write_with_encoder(encoder)?;
    Ok(out)
}

/// Guess a media type from magic bytes for the fall-through path.
fn sniff_media_type(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(b"\x89PNG") {
        "image/png"
    } else if bytes.starts_with(b"GIF8") {
        "image/gif"
    } else if bytes.starts_with(b"BM") {
        "image/bmp"
    } else if bytes.len() > 11 && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "image/jpeg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 100, 50]));
        let mut out = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    fn decoded_size(payload: &ImagePayload) -> (u32, u32) {
        let bytes = BASE64.decode(&payload.base64).unwrap();
        let img = image::load_from_memory(&bytes).unwrap();
        (img.width(), img.height())
    }

    #[test]
    fn oversized_image_is_downscaled_preserving_aspect() {
        let payload = precondition(&png_bytes(1024, 768), 512);
        assert_eq!(payload.media_type, "image/jpeg");
        let (w, h) = decoded_size(&payload);
        assert_eq!(w, 512);
        assert_eq!(h, 384);
    }

    #[test]
    fn small_image_keeps_dimensions() {
        let payload = precondition(&png_bytes(300, 200), 512);
        let (w, h) = decoded_size(&payload);
        assert_eq!((w, h), (300, 200));
    }

    #[test]
    fn output_is_jpeg() {
        let payload = precondition(&png_bytes(64, 64), 512);
        let bytes = BASE64.decode(&payload.base64).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn alpha_flattens_to_white() {
        let img = image::RgbaImage::from_pixel(8, 8, image::Rgba([0, 0, 0, 0]));
        let mut png = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let payload = precondition(&png, 512);
        let bytes = BASE64.decode(&payload.base64).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgb8();
        let pixel = decoded.get_pixel(4, 4);
        // JPEG is lossy; fully transparent input must come out near-white.
        assert!(pixel.0.iter().all(|c| *c > 240), "pixel {:?}", pixel);
    }

    #[test]
    fn garbage_input_falls_through_unchanged() {
        let garbage = b"definitely not an image";
        let payload = precondition(garbage, 512);
        assert_eq!(BASE64.decode(&payload.base64).unwrap(), garbage);
        assert_eq!(payload.media_type, "image/jpeg");
    }

    #[test]
    fn png_magic_sniffed_on_fallthrough() {
        // Truncated PNG header decodes as nothing but sniffs as png.
        let broken = b"\x89PNG\r\n\x1a\nbroken";
        let payload = precondition(broken, 512);
        assert_eq!(payload.media_type, "image/png");
    }
}
