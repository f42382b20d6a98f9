//! Face extraction and identity classification.
//!
//! - [`FaceExtractor`]: detector invocation, confidence gate, margin
//!   expansion, crop and resize
//! - [`FaceClassifier`]: one contract over the direct and embedding
//!   strategies
//! - Detector backends: UltraFace over ONNX Runtime (`onnx`, default) and
//!   OpenCV YuNet (`opencv`)

pub mod classifier;
pub mod detector;
pub mod error;
pub mod extractor;
pub mod labels;
pub mod model;
pub mod session;
#[cfg(feature = "onnx")]
pub mod ultraface;
pub mod yunet;

pub use classifier::{
    prewhiten, ClassificationStrategy, DirectClassifier, EmbeddingClassifier, FaceClassifier,
};
pub use detector::{ChannelOrder, FaceDetector, RawDetection};
pub use error::{VisionError, VisionResult};
pub use extractor::{ExtractorConfig, FaceExtractor, FaceRegion};
pub use labels::load_labels;
#[cfg(feature = "onnx")]
pub use model::OnnxModel;
pub use model::TensorModel;
pub use session::{AnalysisSession, ClassifiedFace, FrameAnalysis};
#[cfg(feature = "onnx")]
pub use ultraface::UltraFaceDetector;
pub use yunet::YuNetDetector;
