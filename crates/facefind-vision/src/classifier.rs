//! Identity classification over face crops.
//!
//! Two strategies sit behind [`FaceClassifier`]:
//! - direct: one model maps the crop to a distribution over labels
//! - embedding: a model maps the prewhitened crop to an embedding, and a
//!   separate classifier maps the embedding to a distribution
//!
//! Both yield the argmax label and its probability.

use facefind_models::{ClassificationResult, Labels};
use image::RgbImage;
use std::sync::Arc;

use crate::error::{VisionError, VisionResult};
use crate::extractor::FaceRegion;
use crate::model::TensorModel;

/// Classifies one face.
pub trait FaceClassifier: Send + Sync {
    fn classify(&self, face: &FaceRegion) -> VisionResult<ClassificationResult>;
}

/// Crop to distribution in one model. Input is NHWC RGB in `[0, 1]`.
#[derive(Clone)]
pub struct DirectClassifier {
    model: Arc<dyn TensorModel>,
    labels: Labels,
    input_size: u32,
}

impl DirectClassifier {
    pub fn new(model: Arc<dyn TensorModel>, labels: Labels, input_size: u32) -> Self {
        Self {
            model,
            labels,
            input_size,
        }
    }
}

impl FaceClassifier for DirectClassifier {
    fn classify(&self, face: &FaceRegion) -> VisionResult<ClassificationResult> {
        check_crop_size(&face.crop, self.input_size)?;

        let input: Vec<f32> = face.crop.as_raw().iter().map(|&v| v as f32 / 255.0).collect();
        let scores = self
            .model
            .run(input, nhwc_shape(self.input_size))
            .map_err(as_classification)?;

        interpret(&scores, &self.labels)
    }
}

/// Crop to embedding to distribution, over two models.
#[derive(Clone)]
pub struct EmbeddingClassifier {
    embedder: Arc<dyn TensorModel>,
    classifier: Arc<dyn TensorModel>,
    labels: Labels,
    input_size: u32,
}

impl EmbeddingClassifier {
    pub fn new(
        embedder: Arc<dyn TensorModel>,
        classifier: Arc<dyn TensorModel>,
        labels: Labels,
        input_size: u32,
    ) -> Self {
        Self {
            embedder,
            classifier,
            labels,
            input_size,
        }
    }

    /// Embedding vector for a crop.
    pub fn embed(&self, crop: &RgbImage) -> VisionResult<Vec<f32>> {
        check_crop_size(crop, self.input_size)?;

        let input: Vec<f32> = crop.as_raw().iter().map(|&v| v as f32).collect();
        let embedding = self
            .embedder
            .run(prewhiten(&input), nhwc_shape(self.input_size))
            .map_err(as_classification)?;

        if embedding.is_empty() {
            return Err(VisionError::classification("embedding model returned no values"));
        }
        Ok(embedding)
    }
}

impl FaceClassifier for EmbeddingClassifier {
    fn classify(&self, face: &FaceRegion) -> VisionResult<ClassificationResult> {
        let embedding = self.embed(&face.crop)?;
        let shape = vec![1, embedding.len()];
        let scores = self
            .classifier
            .run(embedding, shape)
            .map_err(as_classification)?;

        interpret(&scores, &self.labels)
    }
}

/// The active strategy. Callers only see [`FaceClassifier`].
#[derive(Clone)]
pub enum ClassificationStrategy {
    Direct(DirectClassifier),
    Embedding(EmbeddingClassifier),
}

impl ClassificationStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            ClassificationStrategy::Direct(_) => "direct",
            ClassificationStrategy::Embedding(_) => "embedding",
        }
    }
}

impl FaceClassifier for ClassificationStrategy {
    fn classify(&self, face: &FaceRegion) -> VisionResult<ClassificationResult> {
        match self {
            ClassificationStrategy::Direct(classifier) => classifier.classify(face),
            ClassificationStrategy::Embedding(classifier) => classifier.classify(face),
        }
    }
}

/// Standardize pixel values: `(x - mean) / max(std, 1 / sqrt(n))`.
pub fn prewhiten(values: &[f32]) -> Vec<f32> {
    if values.is_empty() {
        return Vec::new();
    }

    let n = values.len() as f64;
    let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
    let variance = values
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    let std_adj = variance.sqrt().max(1.0 / n.sqrt());

    values
        .iter()
        .map(|&v| ((v as f64 - mean) / std_adj) as f32)
        .collect()
}

fn nhwc_shape(size: u32) -> Vec<usize> {
    vec![1, size as usize, size as usize, 3]
}

fn check_crop_size(crop: &RgbImage, size: u32) -> VisionResult<()> {
    if crop.dimensions() != (size, size) {
        return Err(VisionError::classification(format!(
            "crop is {}x{}, model expects {}x{}",
            crop.width(),
            crop.height(),
            size,
            size
        )));
    }
    Ok(())
}

fn interpret(scores: &[f32], labels: &Labels) -> VisionResult<ClassificationResult> {
    ClassificationResult::from_distribution(scores, labels)
        .map_err(|e| VisionError::classification(e.to_string()))
}

fn as_classification(err: VisionError) -> VisionError {
    match err {
        VisionError::Inference(message) => VisionError::Classification(message),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facefind_models::PixelRect;
    use std::sync::Mutex;

    /// Returns fixed scores and records the input shapes it was given.
    struct FixedModel {
        output: Vec<f32>,
        shapes: Mutex<Vec<Vec<usize>>>,
    }

    impl FixedModel {
        fn new(output: Vec<f32>) -> Arc<Self> {
            Arc::new(Self {
                output,
                shapes: Mutex::new(Vec::new()),
            })
        }
    }

    impl TensorModel for FixedModel {
        fn run(&self, input: Vec<f32>, shape: Vec<usize>) -> VisionResult<Vec<f32>> {
            assert_eq!(input.len(), shape.iter().product::<usize>());
            self.shapes.lock().unwrap().push(shape);
            Ok(self.output.clone())
        }
    }

    fn labels() -> Labels {
        Labels::new(vec!["Alice".into(), "Bob".into(), "Carol".into()]).unwrap()
    }

    fn face(size: u32) -> FaceRegion {
        FaceRegion {
            bbox: PixelRect::new(0, 0, size, size),
            face_box: PixelRect::new(0, 0, size, size),
            confidence: 0.99,
            crop: RgbImage::from_pixel(size, size, image::Rgb([128, 64, 32])),
        }
    }

    #[test]
    fn test_direct_classifier() {
        let model = FixedModel::new(vec![0.1, 0.2, 0.7]);
        let classifier = DirectClassifier::new(model.clone(), labels(), 4);

        let result = classifier.classify(&face(4)).unwrap();
        assert_eq!(result.label, "Carol");
        assert_eq!(result.class_index, 2);
        assert_eq!(model.shapes.lock().unwrap()[0], vec![1, 4, 4, 3]);
    }

    #[test]
    fn test_embedding_classifier_chains_models() {
        let embedder = FixedModel::new(vec![0.5; 8]);
        let svm = FixedModel::new(vec![0.6, 0.3, 0.1]);
        let classifier = EmbeddingClassifier::new(embedder.clone(), svm.clone(), labels(), 4);

        let result = classifier.classify(&face(4)).unwrap();
        assert_eq!(result.label, "Alice");
        assert_eq!(embedder.shapes.lock().unwrap()[0], vec![1, 4, 4, 3]);
        assert_eq!(svm.shapes.lock().unwrap()[0], vec![1, 8]);
    }

    #[test]
    fn test_strategies_share_one_contract() {
        let strategies = [
            ClassificationStrategy::Direct(DirectClassifier::new(
                FixedModel::new(vec![0.2, 0.8, 0.0]),
                labels(),
                4,
            )),
            ClassificationStrategy::Embedding(EmbeddingClassifier::new(
                FixedModel::new(vec![1.0, 2.0]),
                FixedModel::new(vec![0.2, 0.8, 0.0]),
                labels(),
                4,
            )),
        ];

        for strategy in &strategies {
            let result = strategy.classify(&face(4)).unwrap();
            assert_eq!(result.label, "Bob");
            assert!((result.probability - 0.8).abs() < 1e-6);
        }
    }

    #[test]
    fn test_wrong_crop_size() {
        let classifier = DirectClassifier::new(FixedModel::new(vec![1.0, 0.0, 0.0]), labels(), 160);
        assert!(matches!(
            classifier.classify(&face(4)),
            Err(VisionError::Classification(_))
        ));
    }

    #[test]
    fn test_distribution_width_mismatch_is_classification_error() {
        let classifier = DirectClassifier::new(FixedModel::new(vec![0.5, 0.5]), labels(), 4);
        assert!(matches!(
            classifier.classify(&face(4)),
            Err(VisionError::Classification(_))
        ));
    }

    #[test]
    fn test_prewhiten() {
        let whitened = prewhiten(&[1.0, 2.0, 3.0, 4.0]);
        let mean: f32 = whitened.iter().sum::<f32>() / 4.0;
        let var: f32 = whitened.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / 4.0;
        assert!(mean.abs() < 1e-5);
        assert!((var - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_prewhiten_constant_input() {
        // Zero variance falls back to 1 / sqrt(n)
        let whitened = prewhiten(&[5.0; 16]);
        assert!(whitened.iter().all(|v| *v == 0.0));
        assert!(prewhiten(&[]).is_empty());
    }
}
