//! Raster image sources
//!
//! An image file becomes a single synthesized PDF page: the frame is
//! embedded as an image XObject and drawn to fill the page, whose size comes
//! from the descriptor's view size at the descriptor's resolution. JPEG data
//! is passed through untouched under a DCTDecode filter; every other format
//! is decoded and re-encoded as raw samples (flate-compressed with the rest
//! of the document).

use std::path::Path;

use image::{GenericImageView, ImageFormat};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::error::{Error, Result};
use crate::page::{PageDescriptor, PageSize, Resolution};

/// Pixel dimensions of an image file, read from the header without decoding
pub(crate) fn image_dimensions(path: &Path) -> Result<(u32, u32)> {
    image::image_dimensions(path).map_err(|_| Error::UnsupportedImage(path.to_path_buf()))
}

/// View size in points for an image at a given resolution
pub(crate) fn view_size(pixels: (u32, u32), resolution: Resolution) -> PageSize {
    PageSize {
        width: f64::from(pixels.0) * 72.0 / resolution.x_dpi,
        height: f64::from(pixels.1) * 72.0 / resolution.y_dpi,
    }
}

/// Is this a file extension the image importer handles?
pub fn is_image_path(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref(),
        Some("png" | "jpg" | "jpeg" | "bmp" | "tif" | "tiff" | "gif")
    )
}

struct EncodedImage {
    width: u32,
    height: u32,
    color_space: &'static [u8],
    filter: Option<&'static [u8]>,
    data: Vec<u8>,
}

fn encode_image(path: &Path) -> Result<EncodedImage> {
    let bytes = std::fs::read(path)?;
    let format = image::guess_format(&bytes)
        .map_err(|_| Error::UnsupportedImage(path.to_path_buf()))?;

    // JPEG frames already carry DCT-compressed data a PDF viewer decodes
    // natively; embed the file bytes as-is.
    if format == ImageFormat::Jpeg {
        let (width, height) = image::image_dimensions(path)
            .map_err(|_| Error::UnsupportedImage(path.to_path_buf()))?;
        return Ok(EncodedImage {
            width,
            height,
            color_space: b"DeviceRGB",
            filter: Some(b"DCTDecode"),
            data: bytes,
        });
    }

    let img = image::load_from_memory(&bytes)
        .map_err(|_| Error::UnsupportedImage(path.to_path_buf()))?;
    let (width, height) = img.dimensions();

    let (color_space, data): (&'static [u8], Vec<u8>) = match img {
        image::DynamicImage::ImageLuma8(gray) => (b"DeviceGray", gray.into_raw()),
        other => (b"DeviceRGB", other.to_rgb8().into_raw()),
    };

    Ok(EncodedImage {
        width,
        height,
        color_space,
        filter: None,
        data,
    })
}

/// Import one image file as a standalone page in the output document,
/// returning the new page object's id (with /Parent left unset).
pub(crate) fn import_image_page(out: &mut Document, descriptor: &PageDescriptor) -> Result<ObjectId> {
    let encoded = encode_image(&descriptor.file.path)?;

    let mut image_dict = Dictionary::new();
    image_dict.set("Type", Object::Name(b"XObject".to_vec()));
    image_dict.set("Subtype", Object::Name(b"Image".to_vec()));
    image_dict.set("Width", Object::Integer(i64::from(encoded.width)));
    image_dict.set("Height", Object::Integer(i64::from(encoded.height)));
    image_dict.set("ColorSpace", Object::Name(encoded.color_space.to_vec()));
    image_dict.set("BitsPerComponent", Object::Integer(8));

    let mut image_stream = Stream::new(image_dict, encoded.data);
    if let Some(filter) = encoded.filter {
        image_stream.dict.set("Filter", Object::Name(filter.to_vec()));
        // Already compressed; a second pass would only bloat it
        image_stream.allows_compression = false;
    }
    let image_id = out.add_object(Object::Stream(image_stream));

    let size = descriptor.size;
    let content = format!(
        "q\n{:.4} 0 0 {:.4} 0 0 cm\n/Im0 Do\nQ\n",
        size.width, size.height
    );
    let content_id = out.add_object(Object::Stream(Stream::new(
        Dictionary::new(),
        content.into_bytes(),
    )));

    let mut xobjects = Dictionary::new();
    xobjects.set("Im0", Object::Reference(image_id));
    let mut resources = Dictionary::new();
    resources.set("XObject", Object::Dictionary(xobjects));

    let mut page = Dictionary::new();
    page.set("Type", Object::Name(b"Page".to_vec()));
    page.set(
        "MediaBox",
        Object::Array(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Real(size.width as f32),
            Object::Real(size.height as f32),
        ]),
    );
    page.set("Resources", Object::Dictionary(resources));
    page.set("Contents", Object::Reference(content_id));
    let degrees = descriptor.rotation.degrees();
    if degrees != 0 {
        page.set("Rotate", Object::Integer(i64::from(degrees)));
    }

    Ok(out.add_object(Object::Dictionary(page)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_image_path() {
        assert!(is_image_path(Path::new("scan.png")));
        assert!(is_image_path(Path::new("photo.JPG")));
        assert!(is_image_path(Path::new("fax.tiff")));
        assert!(!is_image_path(Path::new("doc.pdf")));
        assert!(!is_image_path(Path::new("noext")));
    }

    #[test]
    fn test_view_size_scales_with_resolution() {
        let at_72 = view_size((720, 1440), Resolution::uniform(72.0));
        assert!((at_72.width - 720.0).abs() < 1e-9);
        assert!((at_72.height - 1440.0).abs() < 1e-9);

        let at_144 = view_size((720, 1440), Resolution::uniform(144.0));
        assert!((at_144.width - 360.0).abs() < 1e-9);
        assert!((at_144.height - 720.0).abs() < 1e-9);
    }
}
