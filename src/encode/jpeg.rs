use crate::capture::source::RawFrame;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageBuffer, RgbImage};

/// 将 RGBA 帧独立编码为 JPEG（不做帧间压缩）
///
/// JPEG 没有 alpha 通道，编码前丢弃 A 分量。
pub fn encode_jpeg(frame: &RawFrame, quality: u8) -> Result<Vec<u8>, String> {
    let expected = RawFrame::expected_len(frame.width, frame.height);
    if frame.width == 0 || frame.height == 0 || frame.rgba.len() < expected {
        return Err(format!(
            "帧尺寸无效: {}x{}, 数据 {} 字节",
            frame.width,
            frame.height,
            frame.rgba.len()
        ));
    }

    let rgb = rgba_to_rgb(&frame.rgba[..expected]);
    let img: RgbImage = ImageBuffer::from_raw(frame.width, frame.height, rgb)
        .ok_or_else(|| "构造 RGB 图像失败".to_string())?;

    // 质量 1..=100，超出范围的值由编码器自行截断
    let mut out = Vec::with_capacity(expected / 8);
    let encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
    img.write_with_encoder(encoder)
        .map_err(|e| format!("JPEG 编码失败: {}", e))?;

    Ok(out)
}

fn rgba_to_rgb(rgba: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(rgba.len() / 4 * 3);
    for px in rgba.chunks_exact(4) {
        rgb.extend_from_slice(&px[..3]);
    }
    rgb
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: u32, height: u32) -> RawFrame {
        RawFrame {
            width,
            height,
            rgba: vec![0x80; RawFrame::expected_len(width, height)],
        }
    }

    #[test]
    fn output_is_a_jpeg() {
        let jpeg = encode_jpeg(&solid_frame(64, 48), 80).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8], "SOI marker");
        assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9], "EOI marker");
    }

    #[test]
    fn truncated_buffer_is_rejected() {
        let mut frame = solid_frame(16, 16);
        frame.rgba.truncate(10);
        assert!(encode_jpeg(&frame, 80).is_err());
    }
}
