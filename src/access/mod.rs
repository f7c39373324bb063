pub mod signature;

use tracing::warn;

use crate::decimal::FeeRate;
use crate::errors::{LedgerError, Result};
use crate::types::{Address, Role};

pub use signature::{fee_rate_digest, sign_fee_rate_update, Ed25519Verifier, SignatureVerifier};

/// role checks and governance signature checks
pub struct AccessController {
    servicer: Address,
    originator: Address,
    verifier: Box<dyn SignatureVerifier>,
}

impl AccessController {
    pub fn new(servicer: Address, originator: Address) -> Self {
        Self::with_verifier(servicer, originator, Box::new(Ed25519Verifier))
    }

    pub fn with_verifier(
        servicer: Address,
        originator: Address,
        verifier: Box<dyn SignatureVerifier>,
    ) -> Self {
        Self {
            servicer,
            originator,
            verifier,
        }
    }

    pub fn servicer(&self) -> Address {
        self.servicer
    }

    pub fn originator(&self) -> Address {
        self.originator
    }

    pub fn require_servicer(&self, caller: &Address) -> Result<()> {
        require_role(caller, &self.servicer, Role::Servicer)
    }

    /// only the current holder may hand the servicing rights on
    pub fn require_msr_holder(&self, caller: &Address, current_holder: &Address) -> Result<()> {
        require_role(caller, current_holder, Role::MsrHolder)
    }

    /// signature must come from the originator's key over (rate, ledger)
    pub fn verify_fee_rate_update(
        &self,
        new_rate: FeeRate,
        signature: &[u8],
        ledger_id: &Address,
    ) -> Result<()> {
        let digest = fee_rate_digest(new_rate, ledger_id);
        if self.verifier.verify(&digest, signature, &self.originator) {
            Ok(())
        } else {
            warn!(rate = %new_rate, "fee rate update rejected: signature not from originator");
            Err(LedgerError::InvalidSignature)
        }
    }
}

impl std::fmt::Debug for AccessController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessController")
            .field("servicer", &self.servicer)
            .field("originator", &self.originator)
            .finish_non_exhaustive()
    }
}

fn require_role(caller: &Address, holder: &Address, role: Role) -> Result<()> {
    if caller == holder {
        Ok(())
    } else {
        warn!(caller = %caller.short(), %role, "unauthorized caller");
        Err(LedgerError::Unauthorized {
            caller: *caller,
            required: role,
        })
    }
}
