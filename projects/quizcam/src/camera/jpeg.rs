const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];
const MAX_PENDING_BYTES: usize = 4 * 1024 * 1024;

/// Splits a multipart MJPEG byte stream into whole JPEG images.
#[derive(Default)]
pub struct MjpegSplitter {
    pending: Vec<u8>,
}

impl MjpegSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns the newest complete image it finished, if any.
    pub fn push(&mut self, chunk: &[u8]) -> Option<Vec<u8>> {
        self.pending.extend_from_slice(chunk);
        if self.pending.len() > MAX_PENDING_BYTES {
            let excess = self.pending.len() - MAX_PENDING_BYTES;
            self.pending.drain(..excess);
        }

        let mut newest = None;
        while let Some(start) = find(&self.pending, &SOI) {
            let body = start + SOI.len();
            let Some(end) = find(&self.pending[body..], &EOI).map(|at| body + at + EOI.len())
            else {
                self.pending.drain(..start);
                return newest;
            };
            newest = Some(self.pending[start..end].to_vec());
            self.pending.drain(..end);
        }

        // Nothing resembling a frame start is buffered; keep a trailing 0xFF in
        // case the next chunk begins with 0xD8.
        let keep = usize::from(self.pending.last() == Some(&0xFF));
        let drop_to = self.pending.len() - keep;
        self.pending.drain(..drop_to);
        newest
    }
}

fn find(haystack: &[u8], marker: &[u8; 2]) -> Option<usize> {
    haystack.windows(2).position(|pair| pair == marker)
}

/// Reads `(width, height)` from the first start-of-frame segment of a JPEG.
pub fn frame_dimensions(jpeg: &[u8]) -> Option<(u32, u32)> {
    if !jpeg.starts_with(&SOI) {
        return None;
    }

    let mut at = 2;
    while at + 4 <= jpeg.len() {
        if jpeg[at] != 0xFF {
            return None;
        }
        let marker = jpeg[at + 1];
        match marker {
            0xFF => {
                at += 1;
                continue;
            }
            0x01 | 0xD0..=0xD7 => {
                at += 2;
                continue;
            }
            0xD9 | 0xDA => return None,
            _ => {}
        }

        let length = u16::from_be_bytes([jpeg[at + 2], jpeg[at + 3]]) as usize;
        let is_sof = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_sof {
            if at + 9 > jpeg.len() {
                return None;
            }
            let height = u16::from_be_bytes([jpeg[at + 5], jpeg[at + 6]]) as u32;
            let width = u16::from_be_bytes([jpeg[at + 7], jpeg[at + 8]]) as u32;
            return Some((width, height));
        }
        at += 2 + length;
    }
    None
}

#[cfg(test)]
mod tests {
    use image::{RgbImage, codecs::jpeg::JpegEncoder};

    use super::{MjpegSplitter, frame_dimensions};

    fn fake_jpeg(payload: &[u8]) -> Vec<u8> {
        let mut out = vec![0xFF, 0xD8];
        out.extend_from_slice(payload);
        out.extend_from_slice(&[0xFF, 0xD9]);
        out
    }

    fn real_jpeg(width: u32, height: u32) -> Vec<u8> {
        let frame = RgbImage::from_fn(width, height, |x, y| image::Rgb([x as u8, y as u8, 96]));
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, 80)
            .encode_image(&frame)
            .expect("jpeg should encode");
        out
    }

    #[test]
    fn splits_frame_out_of_multipart_chunk() {
        let mut splitter = MjpegSplitter::new();
        let frame = fake_jpeg(b"quiz");
        let mut chunk = b"--quizcam\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        chunk.extend_from_slice(&frame);
        chunk.extend_from_slice(b"\r\n--quizcam\r\n");

        assert_eq!(splitter.push(&chunk), Some(frame));
    }

    #[test]
    fn joins_frame_split_across_chunks() {
        let mut splitter = MjpegSplitter::new();
        let frame = fake_jpeg(b"question-three");
        let (head, tail) = frame.split_at(7);

        assert!(splitter.push(head).is_none());
        assert_eq!(splitter.push(tail), Some(frame));
    }

    #[test]
    fn start_marker_split_between_chunks_is_not_lost() {
        let mut splitter = MjpegSplitter::new();
        let frame = fake_jpeg(b"abc");

        let mut first = b"header".to_vec();
        first.push(frame[0]);
        assert!(splitter.push(&first).is_none());
        assert_eq!(splitter.push(&frame[1..]), Some(frame));
    }

    #[test]
    fn returns_newest_of_several_frames() {
        let mut splitter = MjpegSplitter::new();
        let older = fake_jpeg(b"111");
        let newer = fake_jpeg(b"222");
        let mut chunk = older;
        chunk.extend_from_slice(&newer);

        assert_eq!(splitter.push(&chunk), Some(newer));
    }

    #[test]
    fn reads_dimensions_from_encoded_frame() {
        assert_eq!(frame_dimensions(&real_jpeg(640, 480)), Some((640, 480)));
        assert_eq!(frame_dimensions(&real_jpeg(33, 17)), Some((33, 17)));
    }

    #[test]
    fn dimensions_of_non_jpeg_are_unknown() {
        assert_eq!(frame_dimensions(b"\x89PNG\r\n\x1a\n"), None);
        assert_eq!(frame_dimensions(&fake_jpeg(b"")), None);
    }
}
