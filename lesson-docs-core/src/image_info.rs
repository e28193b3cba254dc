//! Format and pixel size of embedded images, read from their header bytes.

/// Raster formats a DOCX package can embed directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
}

impl ImageFormat {
    pub fn detect(data: &[u8]) -> Option<Self> {
        if data.starts_with(&[0x89, b'P', b'N', b'G']) {
            Some(ImageFormat::Png)
        } else if data.starts_with(&[0xFF, 0xD8]) {
            Some(ImageFormat::Jpeg)
        } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            Some(ImageFormat::Gif)
        } else {
            None
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Gif => "gif",
        }
    }
}

/// Format and `(width, height)` in pixels, or `None` when the bytes are not
/// a recognisable PNG, JPEG or GIF.
pub fn inspect(data: &[u8]) -> Option<(ImageFormat, u32, u32)> {
    let format = ImageFormat::detect(data)?;
    let (width, height) = match format {
        ImageFormat::Png => {
            // IHDR width/height at bytes 16..24
            if data.len() < 24 {
                return None;
            }
            (
                u32::from_be_bytes([data[16], data[17], data[18], data[19]]),
                u32::from_be_bytes([data[20], data[21], data[22], data[23]]),
            )
        }
        ImageFormat::Gif => {
            if data.len() < 10 {
                return None;
            }
            (
                u32::from(u16::from_le_bytes([data[6], data[7]])),
                u32::from(u16::from_le_bytes([data[8], data[9]])),
            )
        }
        ImageFormat::Jpeg => jpeg_dimensions(data)?,
    };
    (width > 0 && height > 0).then_some((format, width, height))
}

/// Walks JPEG segments to the first start-of-frame marker.
fn jpeg_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    let mut i = 2;
    while i + 4 < data.len() {
        if data[i] != 0xFF {
            i += 1;
            continue;
        }
        let marker = data[i + 1];
        let is_sof = matches!(
            marker,
            0xC0 | 0xC1 | 0xC2 | 0xC3 | 0xC5 | 0xC6 | 0xC7 | 0xC9 | 0xCA | 0xCB | 0xCD | 0xCE
                | 0xCF
        );
        if is_sof && i + 9 < data.len() {
            let height = u16::from_be_bytes([data[i + 5], data[i + 6]]);
            let width = u16::from_be_bytes([data[i + 7], data[i + 8]]);
            return Some((u32::from(width), u32::from(height)));
        }
        let length = u16::from_be_bytes([data[i + 2], data[i + 3]]) as usize;
        i += 2 + length;
    }
    None
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// Minimal PNG header (signature + IHDR) for a `width` x `height` image.
    pub fn png_header(width: u32, height: u32) -> Vec<u8> {
        let mut data = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        data.extend_from_slice(&13u32.to_be_bytes());
        data.extend_from_slice(b"IHDR");
        data.extend_from_slice(&width.to_be_bytes());
        data.extend_from_slice(&height.to_be_bytes());
        data.extend_from_slice(&[8, 6, 0, 0, 0]);
        data
    }
}
