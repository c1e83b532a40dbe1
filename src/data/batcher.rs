// ============================================================
// Layer 4 — Image Batcher
// ============================================================
// Stacks ImageSamples into the named values the demo classifier
// reads:
//
//   "images" — Float4 [batch, channels, height, width]
//   "labels" — Int1   [batch]
//
// Pixels are flattened into one Vec and reshaped, the same way
// token ids were stacked for the sequence model.

use burn::data::dataset::Dataset;
use burn::prelude::*;

use crate::data::dataset::ImageSample;
use crate::ml::model::{IMAGES, LABELS};
use crate::ml::value::NamedValues;

#[derive(Clone, Debug)]
pub struct ImageBatcher<B: Backend> {
    pub device:   B::Device,
    pub channels: usize,
    pub height:   usize,
    pub width:    usize,
}

impl<B: Backend> ImageBatcher<B> {
    pub fn new(device: B::Device, channels: usize, height: usize, width: usize) -> Self {
        Self { device, channels, height, width }
    }

    /// Stack `items` into one batch. Every sample must have
    /// `channels * height * width` pixels.
    pub fn batch(&self, items: &[ImageSample]) -> NamedValues<B> {
        let batch_size = items.len();

        let pixels: Vec<f32> = items.iter().flat_map(|s| s.pixels.iter().copied()).collect();
        let labels: Vec<i32> = items.iter().map(|s| s.label as i32).collect();

        let images = Tensor::<B, 1>::from_floats(pixels.as_slice(), &self.device)
            .reshape([batch_size, self.channels, self.height, self.width]);
        let labels = Tensor::<B, 1, Int>::from_ints(labels.as_slice(), &self.device);

        NamedValues::new().with(IMAGES, images).with(LABELS, labels)
    }

    /// Cut a dataset into consecutive batches; the last one may be short.
    pub fn batches(&self, dataset: &impl Dataset<ImageSample>, batch_size: usize) -> Vec<NamedValues<B>> {
        let samples: Vec<ImageSample> = (0..dataset.len()).filter_map(|i| dataset.get(i)).collect();
        samples
            .chunks(batch_size.max(1))
            .map(|chunk| self.batch(chunk))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::BlobDataset;
    use burn::backend::NdArray;

    type TB = NdArray;

    fn sample(label: usize, value: f32) -> ImageSample {
        ImageSample { pixels: vec![value; 4], label }
    }

    #[test]
    fn test_batch_shapes() {
        let batcher = ImageBatcher::<TB>::new(Default::default(), 1, 2, 2);
        let batch = batcher.batch(&[sample(0, 0.5), sample(2, 1.0)]);
        assert_eq!(batch.get(IMAGES).unwrap().dims(), vec![2, 1, 2, 2]);
        assert_eq!(batch.get(LABELS).unwrap().to_f32_vec().unwrap(), vec![0.0, 2.0]);
    }

    #[test]
    fn test_last_batch_is_short() {
        let dataset = BlobDataset::new((0..5).map(|i| sample(i % 2, 0.0)).collect());
        let batcher = ImageBatcher::<TB>::new(Default::default(), 1, 2, 2);
        let batches = batcher.batches(&dataset, 2);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2].get(LABELS).unwrap().dims(), vec![1]);
    }
}
