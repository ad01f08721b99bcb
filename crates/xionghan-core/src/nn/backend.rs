//! The inference backend abstraction consumed by the oracle.

use super::oracle::OracleError;

/// Where a runtime executes; decides how many search threads are worth
/// feeding it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Device {
    Gpu,
    Cpu,
}

/// Raw model outputs for one padded batch.
pub struct InferenceOutput {
    /// `[capacity * POLICY_SIZE]` raw logits.
    pub policy: Vec<f32>,
    /// `[capacity * VALUE_SIZE]` raw logits.
    pub value: Vec<f32>,
}

/// One fixed-size inference session.
///
/// `run` receives input buffers sized for the full capacity; slots past the
/// live batch are zero padding and their outputs are ignored. Capacity must
/// be a power of two.
pub trait InferenceBackend: Send {
    fn capacity(&self) -> usize;

    fn device(&self) -> Device {
        Device::Cpu
    }

    /// `bin_inputs` is `[capacity, 25, 13, 13]` and `global_inputs` is
    /// `[capacity, 19]`, both row-major f32.
    fn run(
        &mut self,
        bin_inputs: &[f32],
        global_inputs: &[f32],
    ) -> Result<InferenceOutput, OracleError>;
}
