//! Chroma-key demo segmenter.
//!
//! Stands in for a real person-segmentation model: anything strongly green
//! is background, everything else is person. Green dominance doubles as the
//! background-class confidence, so the temporal gate downstream behaves the
//! way it would with model output.

use anyhow::Result;
use renderer::{SegmentationMasks, VideoFrame};

use pipeline::Segmenter;

const GREEN_DOMINANCE_THRESHOLD: i32 = 32;

#[derive(Debug, Default)]
pub struct ChromaKeySegmenter;

impl ChromaKeySegmenter {
    fn classify(r: u8, g: u8, b: u8) -> (u8, u8) {
        let dominance = i32::from(g) - i32::from(r.max(b));
        if dominance > GREEN_DOMINANCE_THRESHOLD {
            // Background: confidence scales with how green the pixel is.
            (0, (dominance * 2).min(255) as u8)
        } else {
            // Person: low background confidence inverts to high person
            // confidence in the state update.
            (1, (dominance.max(0) * 2).min(255) as u8)
        }
    }
}

impl Segmenter for ChromaKeySegmenter {
    fn segment(&mut self, frame: &VideoFrame) -> Result<Option<SegmentationMasks>> {
        let len = (frame.width * frame.height) as usize;
        let mut category = Vec::with_capacity(len);
        let mut confidence = Vec::with_capacity(len);
        for texel in frame.data.chunks_exact(4) {
            let (class, certainty) = Self::classify(texel[0], texel[1], texel[2]);
            category.push(class);
            confidence.push(certainty);
        }
        Ok(Some(SegmentationMasks {
            width: frame.width,
            height: frame.height,
            category,
            confidence,
        }))
    }
}
