use crate::common::traits::{RandomnessOracle, RandomnessReceipt};
use crate::common::types::{GameId, RandomWord, RequestId};
use crate::errors::OracleError;
use dashmap::DashMap;
use schnorrkel::context::SigningContext;
use schnorrkel::{Keypair, PublicKey, Signature};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const VRF_SIGNING_CONTEXT: &[u8] = b"lottopool-draw";

/// Everything needed to check a draw's randomness after the fact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VrfProof {
    pub request_id: RequestId,
    pub vrf_output: String,
    pub vrf_proof: String,
    pub public_key: String,
    pub input_message: String,
}

/// Local oracle answering draw requests synchronously with VRF output
#[derive(Clone)]
pub struct VrfOracle {
    keypair: Arc<Keypair>,
    next_id: Arc<AtomicU64>,
    proofs: Arc<DashMap<RequestId, VrfProof>>,
}

impl VrfOracle {
    pub fn new(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
            next_id: Arc::new(AtomicU64::new(1)),
            proofs: Arc::new(DashMap::new()),
        }
    }

    /// Fresh random keypair (local rounds and tests)
    pub fn new_random() -> Self {
        use rand_core::OsRng;
        let keypair = Keypair::generate_with(OsRng);
        Self::new(keypair)
    }

    pub fn input_message(game_id: GameId, seed: u64) -> String {
        format!("{}:{}", game_id, seed)
    }

    /// Produce output and proof for a draw
    pub fn prove(&self, request_id: RequestId, game_id: GameId, seed: u64) -> VrfProof {
        let input_message = Self::input_message(game_id, seed);

        let ctx = SigningContext::new(VRF_SIGNING_CONTEXT);
        let signature = self.keypair.sign(ctx.bytes(input_message.as_bytes()));
        let signature_bytes = signature.to_bytes();

        // Output is the hash of the signature, the signature is the proof
        let vrf_output = Sha256::digest(signature_bytes);

        VrfProof {
            request_id,
            vrf_output: hex::encode(vrf_output),
            vrf_proof: hex::encode(signature_bytes),
            public_key: self.public_key_hex(),
            input_message,
        }
    }

    /// Public verification of a proof against the input it claims to cover
    pub fn verify_proof(proof: &VrfProof, expected_input: &str) -> Result<bool, OracleError> {
        if proof.input_message != expected_input {
            return Ok(false);
        }

        let vrf_output = hex::decode(&proof.vrf_output)
            .map_err(|e| OracleError::Vrf(format!("Invalid VRF output hex: {}", e)))?;
        let signature_bytes = hex::decode(&proof.vrf_proof)
            .map_err(|e| OracleError::Vrf(format!("Invalid VRF proof hex: {}", e)))?;
        let public_key_bytes = hex::decode(&proof.public_key)
            .map_err(|e| OracleError::Vrf(format!("Invalid public key hex: {}", e)))?;

        let public_key = PublicKey::from_bytes(&public_key_bytes)
            .map_err(|e| OracleError::Vrf(format!("Invalid public key: {:?}", e)))?;
        let signature = Signature::from_bytes(&signature_bytes)
            .map_err(|e| OracleError::Vrf(format!("Invalid signature: {:?}", e)))?;

        let ctx = SigningContext::new(VRF_SIGNING_CONTEXT);
        if public_key.verify(ctx.bytes(expected_input.as_bytes()), &signature).is_err() {
            return Ok(false);
        }

        let computed_output = Sha256::digest(&signature_bytes);
        Ok(computed_output.as_slice() == vrf_output.as_slice())
    }

    /// Random word carried by a proof
    pub fn word_from_proof(proof: &VrfProof) -> Result<RandomWord, OracleError> {
        let bytes = hex::decode(&proof.vrf_output)
            .map_err(|e| OracleError::Vrf(format!("Invalid VRF output hex: {}", e)))?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| OracleError::Vrf("VRF output must be 32 bytes".to_string()))?;
        Ok(RandomWord::new(array))
    }

    /// Proof recorded for an answered request
    pub fn proof(&self, request_id: RequestId) -> Option<VrfProof> {
        self.proofs.get(&request_id).map(|entry| entry.clone())
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.keypair.public.to_bytes())
    }
}

impl RandomnessOracle for VrfOracle {
    fn request(&self, game_id: GameId, seed: u64) -> Result<RandomnessReceipt, OracleError> {
        let request_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let proof = self.prove(request_id, game_id, seed);
        let word = Self::word_from_proof(&proof)?;

        tracing::debug!(game_id, request_id, output = %proof.vrf_output, "VRF draw produced");
        self.proofs.insert(request_id, proof);

        Ok(RandomnessReceipt {
            request_id,
            immediate: Some(word),
        })
    }
}
