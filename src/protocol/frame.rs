use bytes::Bytes;
use std::time::Instant;

/// 编码后的单帧（独立 JPEG，无帧间压缩）
///
/// 创建后不可变；下一帧到来时整体替换，而不是原地修改。
/// `bytes` 为引用计数缓冲区，克隆只增加计数，不拷贝像素数据。
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// 单调递增的帧序号，用于保证同一客户端按发布顺序接收
    pub sequence: u64,
    pub bytes: Bytes,
    pub produced_at: Instant,
}

impl EncodedFrame {
    pub fn new(sequence: u64, bytes: impl Into<Bytes>) -> Self {
        Self {
            sequence,
            bytes: bytes.into(),
            produced_at: Instant::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_shares_buffer() {
        let frame = EncodedFrame::new(7, vec![0xFF, 0xD8, 0xFF]);
        let copy = frame.clone();
        assert_eq!(copy.sequence, 7);
        assert_eq!(copy.bytes.as_ptr(), frame.bytes.as_ptr());
        assert_eq!(frame.len(), 3);
    }
}
