//! TLS trust material for the delivery channel.
//!
//! A root CA chain plus optional CRL, kept as a current generation and one
//! generation of rollback history.

mod manager;
mod validate;

pub use manager::{CertTrustManager, IMPORT_TYPE_TEXT, TrustGenerations, TrustMaterial};
pub use validate::{
    MAX_PEM_BYTES, RootCaInfo, TrustError, inspect_root, validate_crl, validate_root_chain,
};
