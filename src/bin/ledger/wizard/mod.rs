mod claim_wizard;

pub use claim_wizard::run_claim_wizard;
