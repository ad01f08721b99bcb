//! ONNX Runtime inference sessions as oracle runtimes.
//!
//! The host builds the `ort::Session` (choosing execution providers,
//! model path, threading) and wraps it here with a fixed batch capacity.
//! One `OrtBackend` per runtime profile; the oracle routes chunks to the
//! smallest profile that fits.

use ndarray::Array2;
use ort::session::Session;
use ort::value::Tensor;
use parking_lot::Mutex;

use super::backend::{Device, InferenceBackend, InferenceOutput};
use super::features::{BIN_CHANNELS, BOARD_SIZE, GLOBAL_FEATURES, POLICY_SIZE, VALUE_SIZE};
use super::oracle::OracleError;

pub struct OrtBackend {
    session: Mutex<Session>,
    capacity: usize,
    device: Device,
}

impl OrtBackend {
    /// Wraps a committed session. `capacity` must match the batch dimension
    /// the session was built for and be a power of two.
    pub fn new(session: Session, capacity: usize, device: Device) -> OrtBackend {
        assert!(capacity.is_power_of_two());
        OrtBackend {
            session: Mutex::new(session),
            capacity,
            device,
        }
    }
}

impl InferenceBackend for OrtBackend {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn device(&self) -> Device {
        self.device
    }

    fn run(
        &mut self,
        bin_inputs: &[f32],
        global_inputs: &[f32],
    ) -> Result<InferenceOutput, OracleError> {
        let bin_shape = [self.capacity, BIN_CHANNELS, BOARD_SIZE, BOARD_SIZE];
        let bin = Tensor::from_array((bin_shape, bin_inputs.to_vec()))
            .map_err(|e| OracleError::Inference(e.to_string()))?;
        let global = Array2::from_shape_vec((self.capacity, GLOBAL_FEATURES), global_inputs.to_vec())
            .map_err(|e| OracleError::Inference(e.to_string()))?;
        let global = Tensor::from_array(global).map_err(|e| OracleError::Inference(e.to_string()))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs!["bin_inputs" => bin, "global_inputs" => global])
            .map_err(|e| OracleError::Inference(e.to_string()))?;

        let (_, policy) = outputs["policy"]
            .try_extract_tensor::<f32>()
            .map_err(|e| OracleError::Inference(e.to_string()))?;
        let (_, value) = outputs["value"]
            .try_extract_tensor::<f32>()
            .map_err(|e| OracleError::Inference(e.to_string()))?;

        if policy.len() != self.capacity * POLICY_SIZE || value.len() != self.capacity * VALUE_SIZE {
            return Err(OracleError::Inference(format!(
                "unexpected head shapes: policy {} value {}",
                policy.len(),
                value.len()
            )));
        }

        Ok(InferenceOutput {
            policy: policy.to_vec(),
            value: value.to_vec(),
        })
    }
}
