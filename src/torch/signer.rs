use crate::torch::Torch;

/// Seam for response-torch signing. The shipped implementation is a
/// placeholder marker with no cryptographic guarantee; a real signer slots
/// in here without touching the pipeline.
pub trait TorchSignerPort: Send + Sync {
    fn sign(&self, torch: &Torch) -> String;
}

#[derive(Default)]
pub struct PlaceholderSigner;

impl TorchSignerPort for PlaceholderSigner {
    fn sign(&self, _torch: &Torch) -> String {
        "placeholder_signature".to_string()
    }
}
