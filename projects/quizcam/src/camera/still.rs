use std::{io::Cursor, path::Path};

use anyhow::{Context, Result, bail};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use image::{ExtendedColorType, ImageReader, RgbImage, codecs::jpeg::JpegEncoder};

/// An encoded still image held as a `data:` URI, ready to be sent for analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    data_url: String,
    mime: String,
    width: u32,
    height: u32,
    approximate_size_bytes: usize,
}

impl CapturedImage {
    pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<Self, image::ImageError> {
        let mut encoded = Vec::new();
        JpegEncoder::new_with_quality(&mut encoded, quality).encode(
            frame.as_raw(),
            frame.width(),
            frame.height(),
            ExtendedColorType::Rgb8,
        )?;
        Ok(Self::wrap("image/jpeg", &encoded, frame.width(), frame.height()))
    }

    /// Wraps an already-encoded image file without re-encoding it.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let format = image::guess_format(bytes).context("unrecognized image format")?;
        let (width, height) = ImageReader::with_format(Cursor::new(bytes), format)
            .into_dimensions()
            .context("failed to read image dimensions")?;
        Ok(Self::wrap(format.to_mime_type(), bytes, width, height))
    }

    pub async fn from_file(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_bytes(&bytes).with_context(|| format!("{} is not a usable image", path.display()))
    }

    pub fn from_data_url(data_url: &str) -> Result<Self> {
        let Some((header, payload)) = data_url.split_once(',') else {
            bail!("data url has no payload");
        };
        let Some(mime) = header
            .strip_prefix("data:")
            .and_then(|rest| rest.strip_suffix(";base64"))
            .filter(|mime| mime.starts_with("image/"))
        else {
            bail!("not a base64 image data url: {header}");
        };

        let bytes = BASE64
            .decode(payload.trim())
            .context("data url payload is not valid base64")?;
        let (width, height) = ImageReader::new(Cursor::new(&bytes))
            .with_guessed_format()
            .context("failed to inspect image payload")?
            .into_dimensions()
            .context("failed to read image dimensions")?;

        Ok(Self {
            data_url: data_url.to_owned(),
            mime: mime.to_owned(),
            width,
            height,
            approximate_size_bytes: bytes.len(),
        })
    }

    fn wrap(mime: &str, encoded: &[u8], width: u32, height: u32) -> Self {
        Self {
            data_url: format!("data:{mime};base64,{}", BASE64.encode(encoded)),
            mime: mime.to_owned(),
            width,
            height,
            approximate_size_bytes: encoded.len(),
        }
    }

    pub fn data_url(&self) -> &str {
        &self.data_url
    }

    /// The base64 payload with the `data:<mime>;base64,` prefix removed.
    pub fn payload(&self) -> &str {
        let data_url = self.data_url();
        data_url
            .split_once(',')
            .map_or(data_url, |(_, payload)| payload)
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn approximate_size_bytes(&self) -> usize {
        self.approximate_size_bytes
    }
}
