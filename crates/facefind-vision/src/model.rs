//! Tensor model seam and its ONNX Runtime backend.

use crate::error::VisionResult;

/// A model taking one `f32` tensor and returning one flattened `f32` tensor.
pub trait TensorModel: Send + Sync {
    fn run(&self, input: Vec<f32>, shape: Vec<usize>) -> VisionResult<Vec<f32>>;
}

#[cfg(feature = "onnx")]
pub use onnx::OnnxModel;

#[cfg(feature = "onnx")]
mod onnx {
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    use ort::session::builder::GraphOptimizationLevel;
    use ort::session::Session;
    use ort::value::{Tensor, Value};
    use tracing::info;

    use super::TensorModel;
    use crate::error::{VisionError, VisionResult};

    /// ONNX Runtime session behind a lock.
    pub struct OnnxModel {
        session: Mutex<Session>,
        output_name: String,
        path: PathBuf,
    }

    impl std::fmt::Debug for OnnxModel {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("OnnxModel")
                .field("path", &self.path)
                .field("output_name", &self.output_name)
                .finish()
        }
    }

    impl OnnxModel {
        /// Load a model; its first declared output is the one returned by `run`.
        pub fn load(model_path: &Path) -> VisionResult<Self> {
            if !model_path.exists() {
                return Err(VisionError::ModelNotFound(model_path.to_path_buf()));
            }

            let model_bytes = std::fs::read(model_path)?;

            let session = Session::builder()
                .map_err(|e| VisionError::model_load(model_path, format!("ORT session builder: {e}")))?
                .with_optimization_level(GraphOptimizationLevel::Level3)
                .map_err(|e| VisionError::model_load(model_path, format!("ORT opt level: {e}")))?
                .commit_from_memory(model_bytes.as_slice())
                .map_err(|e| VisionError::model_load(model_path, format!("ORT load model: {e}")))?;

            let output_name = session
                .outputs
                .first()
                .map(|output| output.name.clone())
                .ok_or_else(|| VisionError::model_load(model_path, "model declares no outputs"))?;

            info!(
                model = %model_path.display(),
                output = %output_name,
                "ONNX model loaded"
            );

            Ok(Self {
                session: Mutex::new(session),
                output_name,
                path: model_path.to_path_buf(),
            })
        }

        /// Return a different named output from `run`.
        pub fn with_output_name(mut self, name: impl Into<String>) -> Self {
            self.output_name = name.into();
            self
        }

        pub fn path(&self) -> &Path {
            &self.path
        }

        /// Run the model and copy out each requested output, in order.
        pub fn run_outputs(
            &self,
            input: Vec<f32>,
            shape: Vec<usize>,
            output_names: &[&str],
        ) -> VisionResult<Vec<Vec<f32>>> {
            let tensor: Value = Tensor::from_array((shape, input.into_boxed_slice()))
                .map(Value::from)
                .map_err(|e| VisionError::inference(format!("ORT tensor: {e}")))?;

            let mut session = self
                .session
                .lock()
                .map_err(|_| VisionError::inference("ORT session poisoned"))?;

            let outputs = session
                .run(ort::inputs![tensor])
                .map_err(|e| VisionError::inference(format!("ORT run failed: {e}")))?;

            output_names
                .iter()
                .map(|name| {
                    let output = outputs
                        .get(*name)
                        .ok_or_else(|| VisionError::inference(format!("ORT output {name} missing")))?;
                    let (_, data) = output
                        .try_extract_tensor::<f32>()
                        .map_err(|e| VisionError::inference(format!("ORT extract {name}: {e}")))?;
                    Ok(data.to_vec())
                })
                .collect()
        }
    }

    impl TensorModel for OnnxModel {
        fn run(&self, input: Vec<f32>, shape: Vec<usize>) -> VisionResult<Vec<f32>> {
            let mut outputs = self.run_outputs(input, shape, &[self.output_name.as_str()])?;
            outputs
                .pop()
                .ok_or_else(|| VisionError::inference("ORT returned no outputs"))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_missing_model() {
            let err = OnnxModel::load(Path::new("/nonexistent/model.onnx")).unwrap_err();
            assert!(matches!(err, VisionError::ModelNotFound(_)));
            assert!(err.is_setup());
        }
    }
}
